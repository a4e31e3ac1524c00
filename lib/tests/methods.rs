use jalc::compile::*;
use jalc::jvm::verifier::{FrameMismatch, InstructionId, StackElementType, StackMapFrame, VerificationType};
use jalc::jvm::*;

fn insn(mnemonic: &str) -> InstructionNode {
    InstructionNode::new(mnemonic)
}

fn label(name: &str) -> Statement {
    Statement::Label {
        name: name.to_owned(),
        position: SourcePosition::default(),
    }
}

fn local(index: u16) -> Operand {
    Operand::Local(LocalReference::Index(index))
}

fn target(name: &str) -> Operand {
    Operand::Label(name.to_owned())
}

fn method(access_flags: MethodAccessFlags, name: &str, descriptor: &str, body: Vec<Statement>) -> MethodSource {
    MethodSource {
        class: BinaryName::from_string(String::from("demo/Example")).unwrap(),
        access_flags,
        name: name.to_owned(),
        descriptor: descriptor.to_owned(),
        position: SourcePosition::new(1, 1, 0),
        body,
    }
}

fn static_method(descriptor: &str, body: Vec<Statement>) -> MethodSource {
    method(MethodAccessFlags::STATIC, "run", descriptor, body)
}

fn compile_with(source: &MethodSource, settings: &CompileSettings) -> Result<CompiledMethod, Error> {
    let mut pool = ConstantPool::new();
    MethodCompiler::new(settings).compile(source, &mut pool)
}

fn compile(source: &MethodSource) -> Result<CompiledMethod, Error> {
    compile_with(source, &CompileSettings::default())
}

fn code(body: Vec<InstructionNode>) -> Vec<Statement> {
    body.into_iter().map(Statement::Instruction).collect()
}

#[test]
fn straight_line_arithmetic() {
    let source = static_method(
        "(II)I",
        code(vec![insn("iload_0"), insn("iload_1"), insn("iadd"), insn("ireturn")]),
    );
    let compiled = compile(&source).unwrap();
    assert_eq!(compiled.max_stack, 2);
    assert_eq!(compiled.max_locals, 2);
    assert_eq!(compiled.code, vec![0x1a, 0x1b, 0x60, 0xac]);
    assert!(compiled.stack_map.is_empty());
}

#[test]
fn category_two_values() {
    let source = static_method(
        "(JI)J",
        code(vec![
            insn("lload_0"),
            insn("iload_2"),
            insn("i2l"),
            insn("ladd"),
            insn("lreturn"),
        ]),
    );
    let compiled = compile(&source).unwrap();
    assert_eq!(compiled.max_stack, 4);
    assert_eq!(compiled.max_locals, 3);
    assert_eq!(compiled.code, vec![0x1e, 0x1c, 0x85, 0x61, 0xad]);
}

#[test]
fn underflow() {
    let source = static_method("()V", code(vec![insn("iconst_1"), insn("iadd")]));
    match compile(&source) {
        Err(Error::StackUnderflow {
            instruction,
            mnemonic,
            ..
        }) => {
            assert_eq!(instruction, InstructionId(1));
            assert_eq!(mnemonic, "iadd");
        }
        other => panic!("unexpected {:?}", other),
    }

    for mnemonic in ["iadd", "pop", "dreturn"] {
        let source = static_method("()D", code(vec![insn(mnemonic)]));
        match compile(&source) {
            Err(Error::StackUnderflow { instruction, .. }) => {
                assert_eq!(instruction, InstructionId(0))
            }
            other => panic!("unexpected {:?} for {}", other, mnemonic),
        }
    }
}

#[test]
fn pop_does_not_split_long() {
    let source = static_method("()V", code(vec![insn("lconst_0"), insn("pop")]));
    match compile(&source) {
        Err(Error::StackElementMismatch {
            producer, actual, ..
        }) => {
            assert_eq!(producer, Some(InstructionId(0)));
            assert_eq!(actual, StackElementType::Long);
        }
        other => panic!("unexpected {:?}", other),
    }

    let fine = static_method("()V", code(vec![insn("lconst_0"), insn("pop2")]));
    assert!(compile(&fine).is_ok());
}

#[test]
fn counting_loop() {
    let source = static_method(
        "(I)I",
        vec![
            Statement::Instruction(insn("iconst_0")),
            Statement::Instruction(insn("istore_1")),
            label("loop"),
            Statement::Instruction(insn("iload_0")),
            Statement::Instruction(insn("ifle").with(target("done"))),
            Statement::Instruction(insn("iinc").with(local(1)).with(Operand::Number(1))),
            Statement::Instruction(insn("iinc").with(local(0)).with(Operand::Number(-1))),
            Statement::Instruction(insn("goto").with(target("loop"))),
            label("done"),
            Statement::Instruction(insn("iload_1")),
            Statement::Instruction(insn("ireturn")),
        ],
    );
    let compiled = compile(&source).unwrap();

    let loop_frame = compiled.label_frame("loop").unwrap();
    assert_eq!(loop_frame.stack_depth(), 0);
    assert_eq!(loop_frame.locals_len(), 2);
    assert_eq!(compiled.label_frame("done"), Some(loop_frame));
    assert_eq!(compiled.max_stack, 1);

    assert_eq!(
        compiled.code,
        vec![
            0x03, // iconst_0
            0x3c, // istore_1
            0x1a, // iload_0
            0x9e, 0x00, 0x0c, // ifle +12
            0x84, 0x01, 0x01, // iinc 1 1
            0x84, 0x00, 0xff, // iinc 0 -1
            0xa7, 0xff, 0xf6, // goto -10
            0x1b, // iload_1
            0xac, // ireturn
        ]
    );
    assert_eq!(
        compiled.stack_map,
        vec![
            StackMapFrame::AppendLocalsNoStack {
                offset_delta: 2,
                locals: vec![VerificationType::Integer],
            },
            StackMapFrame::SameLocalsNoStack { offset_delta: 12 },
        ]
    );
    assert_eq!(compiled.stack_map_bytes().unwrap(), vec![0x00, 0x02, 252, 0x00, 0x02, 0x01, 12]);
}

#[test]
fn stack_depth_conflict() {
    let source = static_method(
        "(I)V",
        vec![
            Statement::Instruction(insn("iload_0")),
            Statement::Instruction(insn("ifeq").with(target("skip"))),
            Statement::Instruction(insn("iconst_1")),
            label("skip"),
            Statement::Instruction(insn("return")),
        ],
    );
    match compile(&source) {
        Err(Error::StackSizeDifferent {
            name,
            expected,
            actual,
            ..
        }) => {
            assert_eq!(name, "skip");
            assert_eq!(expected.stack_depth(), 0);
            assert_eq!(actual.stack_depth(), 1);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn first_frame_wins() {
    let source = static_method(
        "(I)V",
        vec![
            Statement::Instruction(insn("iload_0")),
            Statement::Instruction(insn("ifeq").with(target("other"))),
            Statement::Instruction(insn("iconst_1")),
            Statement::Instruction(insn("goto").with(target("join"))),
            label("other"),
            Statement::Instruction(insn("fconst_1")),
            label("join"),
            Statement::Instruction(insn("pop")),
            Statement::Instruction(insn("return")),
        ],
    );

    // `other` is reached before the block after `ifeq`, so its float gets to `join` first
    match compile(&source) {
        Err(Error::PropagationMismatch {
            name,
            expected,
            actual,
            mismatch,
            ..
        }) => {
            assert_eq!(name, "join");
            assert_eq!(mismatch, FrameMismatch::StackElement(0));
            assert_eq!(expected.stack.last().unwrap().ty, StackElementType::Float);
            assert_eq!(actual.stack.last().unwrap().ty, StackElementType::Integer);
        }
        other => panic!("unexpected {:?}", other),
    }
}

/// Local 1 gets `first` before the branch, and `second` only on the fall-through path
fn reference_join(first: Vec<InstructionNode>, second: Vec<InstructionNode>) -> MethodSource {
    let mut body = first;
    body.push(insn("astore_1"));
    body.push(insn("iload_0"));
    body.push(insn("ifeq").with(target("join")));
    body.extend(second);
    body.push(insn("astore_1"));
    let mut statements = code(body);
    statements.push(label("join"));
    statements.push(Statement::Instruction(insn("return")));
    static_method("(I)V", statements)
}

#[test]
fn joined_references_widen() {
    let text = || insn("ldc").with(Operand::Text(String::from("s")));

    // `null` reaches the label first, then a string
    let compiled = compile(&reference_join(vec![insn("aconst_null")], vec![text()])).unwrap();
    let join = compiled.label_frame("join").unwrap();
    assert_eq!(
        join.local(1).unwrap().ty,
        StackElementType::Reference(RefType::Object(BinaryName::STRING))
    );
    match compiled.stack_map.as_slice() {
        [StackMapFrame::AppendLocalsNoStack {
            offset_delta: 9,
            locals,
        }] => assert!(matches!(locals.as_slice(), [VerificationType::Object(_)])),
        other => panic!("unexpected {:?}", other),
    }

    // Two unrelated classes only have `java/lang/Object` in common
    let throwable = vec![
        insn("aconst_null"),
        insn("checkcast").with(Operand::Type(String::from("java/lang/Throwable"))),
    ];
    let compiled = compile(&reference_join(vec![text()], throwable)).unwrap();
    let join = compiled.label_frame("join").unwrap();
    assert_eq!(join.local(1).unwrap().ty, StackElementType::ObjectRef);
}

#[test]
fn jumps_to_unknown_labels() {
    let source = static_method("()V", code(vec![insn("goto").with(target("nowhere"))]));
    match compile(&source) {
        Err(Error::UnknownJump { target, label, .. }) => {
            assert_eq!(target, "nowhere");
            assert_eq!(label, None);
        }
        other => panic!("unexpected {:?}", other),
    }

    // A label at the very end only has an instruction after it if a return gets appended
    let body = vec![Statement::Instruction(insn("goto").with(target("end"))), label("end")];
    let source = static_method("()V", body);
    let compiled = compile(&source).unwrap();
    assert_eq!(compiled.code, vec![0xa7, 0x00, 0x03, 0xb1]);

    let settings = CompileSettings {
        append_implicit_return: false,
        ..CompileSettings::default()
    };
    assert!(matches!(
        compile_with(&source, &settings),
        Err(Error::UnknownJump { label: Some(_), .. })
    ));
}

#[test]
fn falling_off_the_end() {
    let source = static_method("()I", code(vec![insn("iconst_0")]));
    assert!(matches!(
        compile(&source),
        Err(Error::FallOffEnd {
            instruction: Some(InstructionId(0)),
            ..
        })
    ));

    let source = static_method("()V", code(vec![insn("nop")]));
    assert_eq!(compile(&source).unwrap().code, vec![0x00, 0xb1]);

    let settings = CompileSettings {
        append_implicit_return: false,
        ..CompileSettings::default()
    };
    assert!(matches!(compile_with(&source, &settings), Err(Error::FallOffEnd { .. })));
}

#[test]
fn return_contract() {
    let source = static_method("()Ljava/lang/String;", code(vec![insn("aconst_null"), insn("areturn")]));
    assert!(compile(&source).is_ok());

    let source = static_method("()J", code(vec![insn("iconst_0"), insn("ireturn")]));
    match compile(&source) {
        Err(Error::ReturnTypeMismatch {
            expected, actual, ..
        }) => {
            assert_eq!(expected, ReturnType::Value(FieldType::long()));
            assert_eq!(actual, ReturnType::Value(FieldType::int()));
        }
        other => panic!("unexpected {:?}", other),
    }

    let source = static_method("()Z", code(vec![insn("iconst_1"), insn("ireturn")]));
    assert!(compile(&source).is_ok());
}

#[test]
fn loads_check_local_contents() {
    let source = static_method(
        "()V",
        code(vec![
            insn("iconst_0"),
            insn("istore_0"),
            insn("fload_0"),
            insn("pop"),
            insn("return"),
        ]),
    );
    match compile(&source) {
        Err(Error::LocalElementMismatch { index, actual, .. }) => {
            assert_eq!(index, 0);
            assert_eq!(actual, StackElementType::Integer);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn constructors() {
    let object_init = Operand::Member(MemberReference {
        owner: String::from("java/lang/Object"),
        name: String::from("<init>"),
        descriptor: String::from("()V"),
    });

    let source = method(
        MethodAccessFlags::PUBLIC,
        "<init>",
        "()V",
        code(vec![
            insn("aload_0"),
            insn("invokespecial").with(object_init.clone()),
            insn("return"),
        ]),
    );
    let compiled = compile(&source).unwrap();
    let entry = &compiled.label_frames[&LabelId::START];
    assert_eq!(entry.local(0).unwrap().ty, StackElementType::UninitializedThis);
    assert_eq!(compiled.code.len(), 5);
    assert_eq!(compiled.code[0], 0x2a);
    assert_eq!(compiled.code[1], 0xb7);
    assert_eq!(compiled.code[4], 0xb1);

    let source = static_method(
        "()Ljava/lang/Object;",
        code(vec![
            insn("new").with(Operand::Type(String::from("java/lang/Object"))),
            insn("dup"),
            insn("invokespecial").with(object_init),
            insn("areturn"),
        ]),
    );
    let compiled = compile(&source).unwrap();
    assert_eq!(compiled.max_stack, 2);

    // Returning the object before it is initialized is not allowed
    let source = static_method(
        "()Ljava/lang/Object;",
        code(vec![
            insn("new").with(Operand::Type(String::from("java/lang/Object"))),
            insn("areturn"),
        ]),
    );
    assert!(matches!(compile(&source), Err(Error::StackElementMismatch { .. })));
}

#[test]
fn locals_stay_below_the_slot_limit() {
    let source = static_method(
        "()V",
        code(vec![insn("lconst_0"), insn("lstore").with_wide().with(local(65535)), insn("return")]),
    );
    assert!(matches!(compile(&source), Err(Error::IllegalInstruction { .. })));

    // The long ends on the last slot, so there is no room left for `x`
    let named = Operand::Local(LocalReference::Name(String::from("x")));
    let source = static_method(
        "()V",
        code(vec![
            insn("lconst_0"),
            insn("lstore").with_wide().with(local(65533)),
            insn("iconst_0"),
            insn("istore").with(named),
            insn("return"),
        ]),
    );
    assert!(matches!(compile(&source), Err(Error::IllegalInstruction { .. })));

    let source = static_method(
        "()V",
        code(vec![insn("lconst_0"), insn("lstore").with_wide().with(local(65533)), insn("return")]),
    );
    assert_eq!(compile(&source).unwrap().max_locals, 65535);

    let descriptor = format!("({})V", "J".repeat(128));
    let source = static_method(&descriptor, code(vec![insn("return")]));
    assert!(matches!(compile(&source), Err(Error::BadDescriptor { .. })));
}

#[test]
fn duplicate_labels() {
    let source = static_method(
        "()V",
        vec![label("here"), Statement::Instruction(insn("nop")), label("here")],
    );
    assert!(matches!(compile(&source), Err(Error::DuplicateLabel { .. })));
}

#[test]
fn unreachable_code_is_replaced() {
    let source = static_method(
        "()V",
        vec![
            Statement::Instruction(insn("return")),
            label("dead"),
            Statement::Instruction(insn("iadd")),
            Statement::Instruction(insn("return")),
        ],
    );
    let compiled = compile(&source).unwrap();
    assert_eq!(compiled.label_frame("dead"), None);

    // The dead block still takes up its bytes, but now just throws
    assert_eq!(compiled.code, vec![0xb1, 0x00, 0xbf]);
    assert_eq!(compiled.max_stack, 1);
    match compiled.stack_map.as_slice() {
        [StackMapFrame::SameLocalsOneStack {
            offset_delta: 1,
            stack: VerificationType::Object(_),
        }] => (),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn diagnostics_point_at_the_source() {
    let source = static_method(
        "()V",
        code(vec![insn("iconst_1"), insn("iadd").at(SourcePosition::new(3, 5, 40))]),
    );
    let diagnostic = compile(&source).unwrap_err().diagnostic();
    assert_eq!((diagnostic.line, diagnostic.column, diagnostic.offset), (3, 5, 40));
}

//! Reader for `.jal` listings
//!
//! A listing is line oriented:
//!
//! ```text
//! // comments run to the end of the line
//! .class demo/Counter
//! .method public static count(I)I
//!     iconst_0
//!     istore 1 -> total:I
//! loop:
//!     iload_0
//!     ifle done
//!     iinc total 1
//!     iinc 0 -1
//!     goto loop
//! done:
//!     iload_1
//!     ireturn
//! .end
//! ```
//!
//! Operands are classified using the instruction they belong to: bare words are labels for jumps,
//! local variables for loads/stores/`iinc`, and types otherwise. `owner.name:descriptor` is a
//! member reference and `"..."` a string.

use jalc::compile::evaluator::{lookup, InstructionKind};
use jalc::compile::{
    InstructionNode, LocalReference, MemberReference, MethodSource, Operand, SourcePosition,
    Statement,
};
use jalc::jvm::{BinaryName, MethodAccessFlags, Name};
use std::fmt::{Display, Error as FmtError, Formatter};

/// Listing that could not be read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingError {
    pub position: SourcePosition,
    pub message: String,
}

impl Display for ListingError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}: {}", self.position, self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    text: String,
    quoted: bool,
    position: SourcePosition,
}

/// Split a line into tokens, dropping any comment
fn tokenize(line: &str, line_number: usize, line_offset: usize) -> Result<Vec<Token>, ListingError> {
    let position = |idx: usize| SourcePosition::new(line_number, idx + 1, line_offset + idx);
    let mut tokens = vec![];
    let mut chars = line.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if line[start..].starts_with("//") {
            break;
        } else if c == '"' {
            chars.next();
            let mut text = String::new();
            loop {
                match chars.next() {
                    None => {
                        return Err(ListingError {
                            position: position(start),
                            message: String::from("unterminated string"),
                        })
                    }
                    Some((_, '"')) => break,
                    Some((idx, '\\')) => match chars.next() {
                        Some((_, 'n')) => text.push('\n'),
                        Some((_, 't')) => text.push('\t'),
                        Some((_, 'r')) => text.push('\r'),
                        Some((_, '0')) => text.push('\0'),
                        Some((_, escaped @ ('\\' | '"'))) => text.push(escaped),
                        _ => {
                            return Err(ListingError {
                                position: position(idx),
                                message: String::from("unknown escape sequence"),
                            })
                        }
                    },
                    Some((_, other)) => text.push(other),
                }
            }
            tokens.push(Token {
                text,
                quoted: true,
                position: position(start),
            });
        } else {
            let mut end = line.len();
            while let Some(&(idx, c)) = chars.peek() {
                if c.is_whitespace() || c == '"' || line[idx..].starts_with("//") {
                    end = idx;
                    break;
                }
                chars.next();
            }
            tokens.push(Token {
                text: line[start..end].to_owned(),
                quoted: false,
                position: position(start),
            });
        }
    }
    Ok(tokens)
}

fn number(text: &str) -> Option<Operand> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if !digits.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let integer = match digits.strip_prefix("0x") {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => digits.parse::<i64>().ok(),
    };
    match integer {
        Some(n) => Some(Operand::Number(if negative { -n } else { n })),
        None => text.parse::<f64>().ok().map(Operand::Decimal),
    }
}

fn member(text: &str) -> Option<MemberReference> {
    let (qualified, descriptor) = text.split_once(':')?;
    let (owner, name) = qualified.rsplit_once('.')?;
    Some(MemberReference {
        owner: owner.to_owned(),
        name: name.to_owned(),
        descriptor: descriptor.to_owned(),
    })
}

/// Classify an operand based on the instruction it belongs to
fn operand(kind: Option<&InstructionKind>, idx: usize, token: &Token) -> Operand {
    if token.quoted {
        return Operand::Text(token.text.clone());
    }

    let local_operand = matches!(
        kind,
        Some(InstructionKind::Load(..) | InstructionKind::Store(..) | InstructionKind::Increment)
    ) && idx == 0;
    if local_operand {
        return match token.text.parse::<u16>() {
            Ok(index) => Operand::Local(LocalReference::Index(index)),
            Err(_) => Operand::Local(LocalReference::Name(token.text.clone())),
        };
    }

    if let Some(number) = number(&token.text) {
        return number;
    }
    match kind {
        Some(
            InstructionKind::Jump(_) | InstructionKind::TableSwitch | InstructionKind::LookupSwitch,
        ) => Operand::Label(token.text.clone()),
        _ => match member(&token.text) {
            Some(member) => Operand::Member(member),
            None => Operand::Type(token.text.clone()),
        },
    }
}

fn instruction(tokens: &[Token]) -> Result<InstructionNode, ListingError> {
    let (wide, tokens) = match tokens.split_first() {
        Some((first, rest)) if first.text == "wide" && !first.quoted => (true, rest),
        _ => (false, tokens),
    };
    let (mnemonic, rest) = match tokens.split_first() {
        Some(split) => split,
        None => {
            return Err(ListingError {
                position: SourcePosition::default(),
                message: String::from("`wide` must be followed by an instruction"),
            })
        }
    };

    let (operands, declaration) = match rest.iter().position(|token| token.text == "->") {
        Some(arrow) => (&rest[..arrow], Some(&rest[arrow + 1..])),
        None => (rest, None),
    };

    let kind = lookup(&mnemonic.text);
    let mut node = InstructionNode::new(mnemonic.text.clone()).at(mnemonic.position);
    if wide {
        node = node.with_wide();
    }
    for (idx, token) in operands.iter().enumerate() {
        node = node.with(operand(kind.as_ref(), idx, token));
    }

    if let Some(declaration) = declaration {
        match declaration {
            [local] => {
                node = match local.text.split_once(':') {
                    Some((name, descriptor)) => node.declaring(name, Some(descriptor.to_owned())),
                    None => node.declaring(local.text.clone(), None),
                }
            }
            _ => {
                return Err(ListingError {
                    position: mnemonic.position,
                    message: String::from("expected `-> name` or `-> name:Type`"),
                })
            }
        }
    }
    Ok(node)
}

/// Read every method in a listing
pub fn parse_listing(source: &str) -> Result<Vec<MethodSource>, ListingError> {
    let mut methods = vec![];
    let mut class: Option<BinaryName> = None;
    let mut current: Option<MethodSource> = None;

    let mut line_offset = 0;
    for (line_idx, line) in source.lines().enumerate() {
        let tokens = tokenize(line, line_idx + 1, line_offset)?;
        line_offset += line.len() + 1;
        let first = match tokens.first() {
            Some(first) => first,
            None => continue,
        };
        let error = |message: &str| ListingError {
            position: first.position,
            message: message.to_owned(),
        };

        match first.text.as_str() {
            ".class" => {
                let name = match tokens.as_slice() {
                    [_, name] => name.text.clone(),
                    _ => return Err(error("expected `.class <name>`")),
                };
                class = Some(BinaryName::from_string(name).map_err(|msg| error(&msg))?);
            }
            ".method" => {
                if current.is_some() {
                    return Err(error("missing `.end` for the previous method"));
                }
                let class = class
                    .clone()
                    .ok_or_else(|| error("`.method` before any `.class`"))?;
                let (signature, flags) = match tokens[1..].split_last() {
                    Some(split) => split,
                    None => return Err(error("expected `.method <flags> <name><descriptor>`")),
                };

                let mut access_flags = MethodAccessFlags::empty();
                for flag in flags {
                    access_flags |= MethodAccessFlags::from_keyword(&flag.text)
                        .ok_or_else(|| error(&format!("unknown access flag `{}`", flag.text)))?;
                }
                let split = signature
                    .text
                    .find('(')
                    .ok_or_else(|| error("method signature has no descriptor"))?;
                current = Some(MethodSource {
                    class,
                    access_flags,
                    name: signature.text[..split].to_owned(),
                    descriptor: signature.text[split..].to_owned(),
                    position: first.position,
                    body: vec![],
                });
            }
            ".end" => match current.take() {
                Some(method) => methods.push(method),
                None => return Err(error("`.end` outside of a method")),
            },
            _ => {
                let method = current
                    .as_mut()
                    .ok_or_else(|| error("instruction outside of a method"))?;
                match first.text.strip_suffix(':') {
                    Some(name) if tokens.len() == 1 && !first.quoted => {
                        method.body.push(Statement::Label {
                            name: name.to_owned(),
                            position: first.position,
                        });
                    }
                    _ => {
                        let node = instruction(&tokens).map_err(|err| ListingError {
                            position: if err.position == SourcePosition::default() {
                                first.position
                            } else {
                                err.position
                            },
                            message: err.message,
                        })?;
                        method.body.push(Statement::Instruction(node));
                    }
                }
            }
        }
    }

    if let Some(method) = current {
        return Err(ListingError {
            position: method.position,
            message: format!("method `{}` has no `.end`", method.name),
        });
    }
    Ok(methods)
}

#[cfg(test)]
mod test {
    use super::*;

    const LISTING: &str = r#"
// counts down
.class demo/Counter
.method public static count(I)I
    iconst_0
    istore 1 -> total:I   // declares `total`
loop:
    iload_0
    ifle done
    iinc total 1
    wide iinc 0 -1
    goto loop
done:
    iload_1
    ireturn
.end
.method static greet()V
    getstatic java/lang/System.out:Ljava/io/PrintStream;
    ldc "hi // \"there\""
    invokevirtual java/io/PrintStream.println:(Ljava/lang/String;)V
.end
"#;

    fn node(statement: &Statement) -> &InstructionNode {
        match statement {
            Statement::Instruction(node) => node,
            other => panic!("expected an instruction, got {:?}", other),
        }
    }

    #[test]
    fn methods() {
        let methods = parse_listing(LISTING).unwrap();
        assert_eq!(methods.len(), 2);

        let count = &methods[0];
        assert_eq!(count.name, "count");
        assert_eq!(count.descriptor, "(I)I");
        assert_eq!(count.access_flags, MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC);
        assert_eq!(count.body.len(), 11);
        assert_eq!(
            count.body[1],
            Statement::Instruction(
                InstructionNode::new("istore")
                    .with(Operand::Local(LocalReference::Index(1)))
                    .declaring("total", Some(String::from("I")))
                    .at(SourcePosition::new(6, 5, 85))
            )
        );
        assert!(matches!(&count.body[2], Statement::Label { name, .. } if name == "loop"));

        let jump = node(&count.body[4]);
        assert_eq!(jump.operands, vec![Operand::Label(String::from("done"))]);
        let wide = node(&count.body[6]);
        assert!(wide.wide);
        assert_eq!(
            wide.operands,
            vec![Operand::Local(LocalReference::Index(0)), Operand::Number(-1)]
        );

        let greet = &methods[1];
        let ldc = node(&greet.body[1]);
        assert_eq!(ldc.operands, vec![Operand::Text(String::from("hi // \"there\""))]);
        let invoke = node(&greet.body[2]);
        assert_eq!(
            invoke.operands,
            vec![Operand::Member(MemberReference {
                owner: String::from("java/io/PrintStream"),
                name: String::from("println"),
                descriptor: String::from("(Ljava/lang/String;)V"),
            })]
        );
    }

    #[test]
    fn operands() {
        assert_eq!(number("0x10"), Some(Operand::Number(16)));
        assert_eq!(number("-2.5"), Some(Operand::Decimal(-2.5)));
        assert_eq!(number("java/lang/Object"), None);
    }

    #[test]
    fn malformed() {
        assert!(parse_listing(".method static f()V\n.end").is_err());
        assert!(parse_listing(".class A\n.method static f()V\nnop").is_err());
        assert!(parse_listing(".class A\nnop").is_err());

        let err = parse_listing(".class A\n.method static f()V\n  ldc \"oops\n.end").unwrap_err();
        assert_eq!(err.position.line, 3);
        assert_eq!(err.position.column, 7);
    }
}

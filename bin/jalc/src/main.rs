mod listing;

use clap::{value_parser, Arg, ArgAction, Command};
use jalc::compile::{CompileSettings, CompiledMethod, MethodCompiler, MethodSource};
use jalc::jvm::ConstantPool;
use listing::parse_listing;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::exit;
use std::{fs, io};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use walkdir::WalkDir;

fn main() -> io::Result<()> {
    env_logger::init();

    let matches = Command::new("JVM assembly compiler")
        .version("0.1.0")
        .author("Alec Theriault <alec.theriault@gmail.com>")
        .about("Check the stack discipline of JVM assembly methods and encode their bytecode")
        .arg(
            Arg::new("output")
                .long("output-directory")
                .value_name("DIRECTORY")
                .required(false)
                .value_parser(value_parser!(PathBuf))
                .help("Write the code array of every method into this directory"),
        )
        .arg(
            Arg::new("no-implicit-return")
                .long("no-implicit-return")
                .action(ArgAction::SetTrue)
                .help("Don't add a `return` to void methods that fall off the end"),
        )
        .arg(
            Arg::new("dump")
                .long("dump")
                .action(ArgAction::SetTrue)
                .help("Print the encoded code and stack map of every method"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Sets the input file or folder")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .index(1),
        )
        .get_matches();

    let input_path: PathBuf = match matches.get_one::<PathBuf>("INPUT") {
        Some(path) => path.clone(),
        None => exit(2),
    };
    let output_path: Option<&PathBuf> = matches.get_one::<PathBuf>("output");
    let dump = matches.get_flag("dump");
    let settings = CompileSettings {
        append_implicit_return: !matches.get_flag("no-implicit-return"),
        ..CompileSettings::default()
    };

    // Find all of the listings
    let listings: Vec<PathBuf> = if input_path.is_file() {
        vec![input_path]
    } else {
        WalkDir::new(input_path)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|e| e.is_file() && e.extension().map_or(false, |ex| ex == "jal"))
            .collect()
    };

    let compiler = MethodCompiler::new(&settings);
    let stdout = StandardStream::stdout(ColorChoice::Auto);
    let mut count_fail = 0;
    for listing in listings {
        log::info!("Reading '{}'", listing.display());
        let text = fs::read_to_string(&listing)?;
        let methods = match parse_listing(&text) {
            Ok(methods) => methods,
            Err(err) => {
                count_fail += 1;
                log::error!("{}:{}", listing.display(), err);
                print_status(&stdout, &listing.to_string_lossy(), Color::Yellow, b"ERROR")?;
                continue;
            }
        };

        // Every listing holds a single class, so its methods share a constant pool
        let mut pool = ConstantPool::new();
        for (idx, method) in methods.iter().enumerate() {
            let title = format!("{}::{}{}", listing.display(), method.name, method.descriptor);
            match compiler.compile(method, &mut pool) {
                Ok(compiled) => {
                    print_status(&stdout, &title, Color::Green, b"OK")?;
                    if dump {
                        dump_method(&stdout, &compiled)?;
                    }
                    if let Some(output_path) = output_path {
                        write_code(output_path, &listing, idx, method, &compiled)?;
                    }
                }
                Err(err) => {
                    count_fail += 1;
                    log::error!("{}:{}", listing.display(), err.diagnostic());
                    print_status(&stdout, &title, Color::Red, b"FAILED")?;
                }
            }
        }
    }

    // Exit code
    exit(if count_fail > 0 { 1 } else { 0 })
}

fn print_status(stdout: &StandardStream, title: &str, color: Color, summary: &[u8]) -> io::Result<()> {
    let mut s = stdout.lock();
    s.write_all(b" - ")?;
    s.set_color(ColorSpec::new().set_bold(true))?;
    s.write_all(title.as_bytes())?;
    s.set_color(ColorSpec::new().set_dimmed(true))?;
    s.write_all(b" [")?;
    s.set_color(ColorSpec::new().set_fg(Some(color)))?;
    s.write_all(summary)?;
    s.set_color(ColorSpec::new().set_dimmed(true))?;
    s.write_all(b"]\n")?;
    s.reset()
}

fn dump_method(stdout: &StandardStream, compiled: &CompiledMethod) -> io::Result<()> {
    let mut s = stdout.lock();
    s.set_color(ColorSpec::new().set_dimmed(true))?;
    writeln!(
        s,
        "   max stack {}, max locals {}",
        compiled.max_stack, compiled.max_locals
    )?;
    for insn in &compiled.instructions {
        let end = insn.offset + insn.evaluated.size;
        let bytes: Vec<String> = compiled.code[insn.offset..end]
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect();
        writeln!(s, "   {:>5}: {:<16} {}", insn.offset, insn.mnemonic, bytes.join(" "))?;
    }
    for entry in &compiled.stack_map {
        writeln!(s, "   stack map: {:?}", entry)?;
    }
    s.reset()
}

/// Write the code array to `<output>/<listing>/<index>-<method>.code`
fn write_code(
    output_path: &Path,
    listing: &Path,
    idx: usize,
    method: &MethodSource,
    compiled: &CompiledMethod,
) -> io::Result<()> {
    let listing_name: String = match listing.file_stem() {
        None => String::from("unnamed"),
        Some(os_str) => os_str.to_string_lossy().into_owned(),
    };
    let directory = output_path.join(listing_name);
    fs::create_dir_all(&directory)?;

    let method_name: String = method
        .name
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    let file = directory.join(format!("{}-{}.code", idx, method_name));
    log::info!("Writing '{}'", file.display());
    fs::write(file, &compiled.code)
}

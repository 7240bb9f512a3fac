mod bytecode;
mod lang;
mod runtime;

use std::{env, fs, path::Path, process};

use crate::bytecode::disasm::disassemble;
use crate::bytecode::image;
use crate::bytecode::parse::parse_program;
use crate::bytecode::Program;
use crate::runtime::Vm;

fn main() {
    let args: Vec<String> = env::args().collect();

    let disasm = args.contains(&"--disasm".to_string());
    let trace = args.contains(&"--trace".to_string());
    let show_result = args.contains(&"--result".to_string());
    let emit_image = flag_value(&args, "--emit-image");

    // first non-flag argument is the filename
    let filename = args
        .iter()
        .skip(1)
        .filter(|a| Some(a.as_str()) != emit_image.as_deref())
        .find(|a| !a.starts_with('-'));

    let filename = match filename {
        Some(f) => f,
        None => {
            print_usage();
            return;
        }
    };

    let program = load_program(filename);

    if disasm {
        print!("{}", disassemble(&program));
        return;
    }

    if let Some(out) = emit_image {
        let bytes = match image::to_image(&program) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        };
        if let Err(e) = fs::write(&out, bytes) {
            eprintln!("Failed to write '{}': {}", out, e);
            process::exit(1);
        }
        return;
    }

    let mut vm = Vm::new();
    vm.set_trace(trace);
    match vm.exec(&program) {
        Ok(result) => {
            if show_result {
                println!("{}", result.borrow());
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

fn load_program(filename: &str) -> Program {
    let path = Path::new(filename);
    let extension = path.extension().and_then(|e| e.to_str());

    match extension {
        Some("spb") => {
            let source = read_or_exit(filename);
            match parse_program(&source) {
                Ok(program) => program,
                Err(e) => {
                    eprintln!("{}", e);
                    process::exit(1);
                }
            }
        }
        Some("spi") => {
            let bytes = match fs::read(filename) {
                Ok(bytes) => bytes,
                Err(e) => {
                    eprintln!("Failed to read '{}': {}", filename, e);
                    process::exit(1);
                }
            };
            match image::from_image(&bytes) {
                Ok(program) => program,
                Err(e) => {
                    eprintln!("{}", e);
                    process::exit(1);
                }
            }
        }
        _ => {
            eprintln!("Error: expected a .spb or .spi file, got {}", filename);
            process::exit(1);
        }
    }
}

fn read_or_exit(filename: &str) -> String {
    match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Failed to read '{}': {}", filename, e);
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("SPINEL - Bytecode VM for the Spinel language");
    println!();
    println!("Usage:");
    println!("  spinel <file.spb>                Run a textual bytecode bundle");
    println!("  spinel <file.spi>                Run a binary image");
    println!("  spinel --disasm <file>           Print the bundle and exit");
    println!("  spinel --emit-image <out> <file> Archive the bundle as a binary image");
    println!("  spinel --trace <file>            Dump each instruction and the stack");
    println!("  spinel --result <file>           Print the final stack top");
}

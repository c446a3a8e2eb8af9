use std::path::PathBuf;
use std::process;

use bytecode::{step, Cursor, Image, InstructionPrinter, Step};
use clap::Parser;

/// Linear disassembler for compiled Lumo images.
#[derive(Parser, Debug)]
#[command(name = "lumo-disasm", version, about)]
struct Cli {
    /// Compiled bytecode image to disassemble
    file: PathBuf,
}

fn main() {
    env_logger::init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            process::exit(1);
        }
    };

    let image = match Image::load(&cli.file) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("*** FAILURE: {}: {e}", e.kind());
            process::exit(255);
        }
    };

    let mut cur = Cursor::new(&image);
    while cur.offset() < image.code_size() {
        let at = cur.offset();
        let mut printer = InstructionPrinter::new();
        match step(&mut cur, &mut printer) {
            Ok(Step::Continue) => {
                println!("{at:#010x}:\t{}", printer.finish());
            }
            Ok(Step::Halt) => {
                println!("{at:#010x}:\t<end>");
                break;
            }
            Err(e) => {
                eprintln!("*** FAILURE: InvalidBytecode: {e}");
                process::exit(255);
            }
        }
    }
}

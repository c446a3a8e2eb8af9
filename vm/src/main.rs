use std::path::PathBuf;
use std::process;

use bytecode::Image;
use clap::Parser;
use runtime::Runtime;

/// Bytecode interpreter for compiled Lumo images.
#[derive(Parser, Debug)]
#[command(name = "lumo", version, about)]
struct Cli {
    /// Compiled bytecode image to execute
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

    let mut rt = Runtime::new();
    if let Err(diag) = vm::interp::run(&image, &mut rt) {
        eprintln!("*** FAILURE: {diag}");
        process::exit(255);
    }
}

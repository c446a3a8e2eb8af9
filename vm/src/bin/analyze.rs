use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use bytecode::Image;
use clap::Parser;

/// Reachability and idiom analyzer for compiled Lumo images.
///
/// Walks every instruction reachable from the public symbols and
/// prints the observed instruction idioms, most frequent first.
#[derive(Parser, Debug)]
#[command(name = "lumo-analyze", version, about)]
struct Cli {
    /// Compiled bytecode image to analyze
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

    let analysis = match vm::analyzer::analyze(&image) {
        Ok(analysis) => analysis,
        Err(e) => {
            eprintln!("*** FAILURE: InvalidBytecode: {e}");
            process::exit(255);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if let Err(e) = vm::analyzer::report(&image, &analysis, &mut out) {
        eprintln!("*** FAILURE: IOError: {e}");
        process::exit(255);
    }
    let _ = out.flush();
}

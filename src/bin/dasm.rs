//! Bytecode to assembly disassembler CLI.
//!
//! Writes `<file>.dasm` next to every input artifact. The listing re-assembles into the
//! same bytes.
//!
//! # Usage
//! ```text
//! dasm <file>...
//! ```

use dkvm::config::Config;
use dkvm::utils::log;
use dkvm::virtual_machine::disassembler::disassemble_file;
use dkvm::{error, info};
use std::env;
use std::path::Path;
use std::process;

fn main() {
    log::set_tool("dasm");
    let args: Vec<String> = env::args().collect();

    if args.iter().skip(1).any(|a| a == "-h" || a == "--help") {
        print_usage(&args[0]);
        process::exit(0);
    }

    let config = Config::from_env().unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1)
    });
    config.apply_logging();

    let inputs = &args[1..];
    if inputs.is_empty() {
        error!("no input files");
        process::exit(1);
    }

    let mut failed = 0usize;
    for input in inputs {
        match disassemble_file(Path::new(input)) {
            Ok(out) => info!("{} -> {}", input, out.display()),
            Err(e) => {
                error!("{input}: {e}");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        process::exit(1);
    }
}

const USAGE: &str = "\
Disassembler

USAGE:
    {program} <file>...

ARGS:
    <file>...    Bytecode artifacts, each listed to <file>.dasm

OPTIONS:
    -h, --help   Print this help message
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}

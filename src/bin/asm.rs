//! Assembly to bytecode compiler CLI.
//!
//! Assembles every input file into `<file>.dk`. A file that fails to assemble gets a
//! line-numbered diagnostic on stderr, its partial output is removed and the remaining
//! files are still processed.
//!
//! # Usage
//! ```text
//! asm <file>...
//! ```

use dkvm::config::Config;
use dkvm::utils::log;
use dkvm::virtual_machine::assembler::assemble_file;
use dkvm::{error, info};
use std::env;
use std::path::Path;
use std::process;

fn main() {
    log::set_tool("asm");
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
        // the diagnostic is logged by assemble_file
        match assemble_file(Path::new(input)) {
            Ok(out) => info!("{} -> {}", input, out.display()),
            Err(_) => failed += 1,
        }
    }

    if failed > 0 {
        error!("{failed} of {} file(s) failed to assemble", inputs.len());
        process::exit(1);
    }
}

const USAGE: &str = "\
Assembler

USAGE:
    {program} <file>...

ARGS:
    <file>...    Assembly sources, each compiled to <file>.dk

OPTIONS:
    -h, --help   Print this help message

ENVIRONMENT:
    DKVM_LOG             debug | info | warn | error
    DKVM_LOG_TIMESTAMP   prefix log lines with a UTC timestamp
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}

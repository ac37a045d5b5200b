//! Bytecode interpreter CLI.
//!
//! Verifies one artifact and executes it. `IN` reads numbers from stdin and `OUT` prints
//! them on stdout, `DRAW` writes a bitmap.
//!
//! # Usage
//! ```text
//! proc <file.dk> [--bmp <path>]
//! ```
//!
//! Exits with 1 when verification fails or execution stops on an error. A fatal error
//! (stack underflow) dumps the machine state and aborts the process.

use dkvm::config::Config;
use dkvm::utils::log;
use dkvm::virtual_machine::program::Program;
use dkvm::virtual_machine::vm::{VM, stdio};
use dkvm::{debug, error, info};
use std::env;
use std::path::{Path, PathBuf};
use std::process;

fn main() {
    log::set_tool("proc");
    let args: Vec<String> = env::args().collect();

    let mut config = Config::from_env().unwrap_or_else(|e| {
        error!("{e}");
        process::exit(1)
    });
    config.apply_logging();

    let mut input: Option<&String> = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            k @ "--bmp" => {
                i += 1;
                if i >= args.len() {
                    error!("{k} requires an argument");
                    process::exit(1);
                }
                config.bitmap_path = PathBuf::from(&args[i]);
            }
            other if input.is_none() && !other.starts_with('-') => input = Some(&args[i]),
            other => {
                error!("unexpected argument: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let Some(input) = input else {
        error!("no input file");
        process::exit(1);
    };

    let program = Program::read_from(Path::new(input)).unwrap_or_else(|e| {
        error!("{input}: {e}");
        process::exit(1)
    });

    let mut vm = VM::new(program, stdio(), &config).unwrap_or_else(|e| {
        error!("{input}: verification failed: {e}");
        process::exit(1)
    });

    debug!("running {input}");
    if let Err(e) = vm.run() {
        if e.is_fatal() {
            error!("fatal: {e}\n{}", vm.dump_state());
            process::abort();
        }
        error!("{input}: {e}");
        process::exit(1);
    }
}

const USAGE: &str = "\
Interpreter

USAGE:
    {program} <file.dk> [OPTIONS]

ARGS:
    <file.dk>    Bytecode artifact produced by asm

OPTIONS:
    --bmp <path>   Output path of DRAW (defaults to DKVM_BITMAP_PATH or proc_picture.bmp)
    -h, --help     Print this help message

ENVIRONMENT:
    DKVM_LOG              debug | info | warn | error
    DKVM_LOG_TIMESTAMP    prefix log lines with a UTC timestamp
    DKVM_STACK_CAPACITY   initial capacity of the value and call stacks
    DKVM_BITMAP_PATH      output path of DRAW
";

fn print_usage(program: &str) {
    info!("{}", USAGE.replace("{program}", program));
}

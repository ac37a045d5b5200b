//! Stack-based bytecode virtual machine.
//!
//! Provides the assembler, verifier, interpreter and disassembler behind the `asm`,
//! `proc` and `dasm` tools, plus the guarded stack they run on.

pub mod config;
pub mod types;
pub mod utils;
pub mod virtual_machine;

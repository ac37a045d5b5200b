//! Stack-based bytecode virtual machine.
//!
//! Programs are written in a small assembly language, assembled into a signed artifact of
//! fixed-width instructions, verified, and executed on a value stack of doubles.
//!
//! # Architecture
//!
//! - **Value stack**: a [`GuardedStack`](crate::types::guarded_stack::GuardedStack) of
//!   `f64` with sentinels and a checksum
//! - **Registers**: `rax`, `rbx`, `rcx`, `rdx`
//! - **RAM**: 10 000 cells addressed as `[reg+N]`, `[reg]` or `[N]`
//! - **Instruction format**: one opcode byte followed by one little-endian `f64` per
//!   operand
//! - **Functions**: `FUNC`/`FD` headers, `CALL`, and frames holding arguments and locals
//!
//! # Modules
//!
//! - [`assembler`]: three-pass assembler and source diagnostics
//! - [`disassembler`]: bytecode back to re-assemblable source
//! - [`errors`]: assembly, verification and execution error types
//! - [`isa`]: instruction set definition and opcode mappings
//! - [`operand`]: operand kinds and the `PUSH`/`POP` addressing modes
//! - [`program`]: artifact container and instruction decoding
//! - [`verifier`]: static checks run before execution
//! - [`vm`]: the interpreter

pub mod assembler;
pub mod disassembler;
pub mod errors;
pub mod isa;
#[cfg(test)]
mod isa_static_check;
pub mod operand;
pub mod program;
pub mod verifier;
pub mod vm;

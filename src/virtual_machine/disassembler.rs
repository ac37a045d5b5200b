//! Bytecode to assembly source.
//!
//! The output re-assembles into the same bytes: jump targets become `:L<offset>` labels
//! placed before their instruction, function headers are named `fn_<offset>` after their
//! own offset, and numbers are printed in their shortest round-trip form.

use crate::utils::reader::{read_file, with_suffix, write_file};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::operand::{OperandKind, StackOperand, format_number};
use crate::virtual_machine::program::{Decoded, Program};
use std::collections::BTreeSet;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Extension appended to disassembled files.
pub const LISTING_EXTENSION: &str = "dasm";

fn label_name(offset: usize) -> String {
    format!("L{offset}")
}

fn function_name(offset: usize) -> String {
    format!("fn_{offset}")
}

/// Disassembles a whole program.
pub fn disassemble(program: &Program) -> Result<String, VMError> {
    let decoded = program.instructions().collect::<Result<Vec<_>, _>>()?;

    let mut targets = BTreeSet::new();
    for d in &decoded {
        for (kind, &value) in d.instr.operands().iter().zip(d.operands()) {
            if *kind == OperandKind::Target {
                targets.insert(value as usize);
            }
        }
    }

    let mut out = String::new();
    for d in &decoded {
        if targets.contains(&d.offset) {
            let _ = writeln!(out, ":{}", label_name(d.offset));
        }
        let _ = writeln!(out, "{}", render(d)?);
    }
    Ok(out)
}

/// Renders one instruction as a source line.
fn render(d: &Decoded) -> Result<String, VMError> {
    let instruction = d.instr.mnemonic();
    let operands = d.operands();
    let mut parts: Vec<String> = Vec::with_capacity(operands.len());

    for (index, (kind, &value)) in d.instr.operands().iter().zip(operands).enumerate() {
        match kind {
            OperandKind::Mode => {
                let loc = operands.get(index + 1).copied().unwrap_or_default();
                let operand = StackOperand::decode(instruction, d.offset, value, loc)?;
                let discard = d.instr == Instruction::Pop && matches!(operand, StackOperand::Imm(_));
                if !discard {
                    parts.push(operand.to_string());
                }
            }
            OperandKind::Loc => {}
            OperandKind::Count
            | OperandKind::FrameSize
            | OperandKind::Slot
            | OperandKind::Len => {
                parts.push(format_number(value));
            }
            OperandKind::Target => parts.push(format!(":{}", label_name(value as usize))),
            OperandKind::Func => parts.push(function_name(value as usize)),
            OperandKind::End => parts.push(function_name(d.offset)),
        }
    }

    if parts.is_empty() {
        Ok(instruction.to_string())
    } else {
        Ok(format!("{instruction} {}", parts.join(" ")))
    }
}

/// Disassembles the artifact at `path` into `<path>.dasm`, returning the output path.
pub fn disassemble_file(path: &Path) -> Result<PathBuf, VMError> {
    let program = Program::from_bytes(read_file(path)?)?;
    let listing = disassemble(&program)?;
    let out_path = with_suffix(path, LISTING_EXTENSION);
    write_file(&out_path, listing.as_bytes())?;
    crate::debug!("disassembled {} -> {}", path.display(), out_path.display());
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::temp_path;
    use crate::virtual_machine::assembler::assemble_source;

    fn roundtrip(source: &str) -> String {
        let program = assemble_source(source).unwrap();
        let listing = disassemble(&program).unwrap();
        let again = assemble_source(&listing)
            .unwrap_or_else(|err| panic!("listing does not assemble: {err}\n{listing}"));
        assert_eq!(again.as_bytes(), program.as_bytes(), "listing:\n{listing}");
        listing
    }

    #[test]
    fn renders_operands_in_source_syntax() {
        let listing = roundtrip("PUSH 2.5\nPUSH rbx\nPUSH [rcx+4]\nPUSH [rdx]\nPUSH [9]\nPOP\nPOP rax\nPOP [1]\nEND\n");
        assert_eq!(
            listing,
            "PUSH 2.5\nPUSH rbx\nPUSH [rcx+4]\nPUSH [rdx]\nPUSH [9]\nPOP\nPOP rax\nPOP [1]\nEND\n"
        );
    }

    #[test]
    fn labels_are_named_by_offset() {
        let listing = roundtrip("PUSH 0\n:top\nINC\nPUSH 10\nJB :top\nEND\n");
        assert_eq!(listing, "PUSH 0\n:L23\nINC\nPUSH 10\nJB :L23\nEND\n");
    }

    #[test]
    fn functions_are_named_by_offset() {
        let listing = roundtrip("PUSH 1\nPUSH 2\nCALL add\nOUT\nEND\nFD add 2 0\nGET_ARG 0\nGET_ARG 1\nADD\nRET\nENDFUNC\n");
        assert!(listing.contains("CALL fn_51\n"));
        assert!(listing.contains("FD fn_51 2 0\n"));
    }

    #[test]
    fn roundtrip_full_program() {
        roundtrip(
            "\
# factorial of the input
IN
POP rax
PUSH 1
POP rbx
:loop
PUSH rax
PUSH 1
JBE :done
POP
POP
PUSH rbx
PUSH rax
MUL
POP rbx
PUSH rax
DEC
POP rax
JMP :loop
:done
PUSH rbx
OUT
FUNC unused
PUSH -0
PUSH 1e-7
SQRT
ENDFUNC
FD frame 1 2
SET_LOCAL 1
GET_LOCAL 1
GET_ARG 0
LEAVE
ENDFUNC
CALL frame
DRAW 4 2 24
END
",
        );
    }

    #[test]
    fn invalid_opcode_is_positioned() {
        let program = Program::from_code(&[Instruction::Out as u8, 0xF0]);
        assert!(matches!(
            disassemble(&program),
            Err(VMError::InvalidInstruction { offset: 7, .. })
        ));
    }

    #[test]
    fn bad_selector_is_positioned() {
        let mut code = vec![Instruction::Push as u8];
        code.extend_from_slice(&9.0f64.to_le_bytes());
        code.extend_from_slice(&0.0f64.to_le_bytes());
        assert!(matches!(
            disassemble(&Program::from_code(&code)),
            Err(VMError::InvalidSelector { offset: 6, .. })
        ));
    }

    #[test]
    fn file_roundtrip() {
        let path = temp_path("prog.dk");
        assemble_source("PUSH 1\nOUT\nEND").unwrap().write_to(&path).unwrap();
        let out = disassemble_file(&path).unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "PUSH 1\nOUT\nEND\n");
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(&out);
    }

    #[test]
    fn file_with_bad_signature() {
        let path = temp_path("junk.dk");
        std::fs::write(&path, b"not bytecode").unwrap();
        assert!(matches!(
            disassemble_file(&path),
            Err(VMError::BadSignature { .. })
        ));
        let _ = std::fs::remove_file(&path);
    }
}

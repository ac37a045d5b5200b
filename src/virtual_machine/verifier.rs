//! Structural verification of bytecode artifacts.
//!
//! [`verify`] accepts or rejects an artifact before it may be executed. It checks that
//! the instruction stream decodes cleanly and that every operand is in range for its
//! kind, so the interpreter never reads past the stream or jumps into the middle of an
//! instruction. Runs in time linear in the artifact and never panics.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::operand::{
    MAX_FRAME_SLOTS, OperandKind, RAM_SIZE, StackOperand, exact_index,
};
use crate::virtual_machine::program::{CODE_START, Decoded, Program};

/// Verifies `program`, returning the first violation found.
pub fn verify(program: &Program) -> Result<(), VMError> {
    let decoded = program.instructions().collect::<Result<Vec<_>, _>>()?;

    let mut boundary = vec![false; program.len()];
    let mut header = vec![false; program.len()];
    for d in &decoded {
        boundary[d.offset] = true;
        header[d.offset] = d.instr.is_function_header();
    }

    let checker = Checker {
        len: program.len(),
        boundary: &boundary,
        header: &header,
    };
    decoded.iter().try_for_each(|d| checker.check(d))
}

struct Checker<'a> {
    len: usize,
    boundary: &'a [bool],
    header: &'a [bool],
}

impl Checker<'_> {
    fn check(&self, d: &Decoded) -> Result<(), VMError> {
        let kinds = d.instr.operands();
        let operands = d.operands();
        let instruction = d.instr.mnemonic();

        for (index, (kind, &value)) in kinds.iter().zip(operands).enumerate() {
            match kind {
                OperandKind::Loc => {}
                OperandKind::Mode => {
                    let loc = operands.get(index + 1).copied().unwrap_or_default();
                    StackOperand::decode(instruction, d.offset, value, loc)?;
                }
                OperandKind::Target => {
                    let target = self.code_offset(d, value, false)?;
                    if !self.boundary[target] {
                        return Err(VMError::MisalignedTarget {
                            instruction,
                            offset: d.offset,
                            target,
                        });
                    }
                }
                OperandKind::Func => {
                    let target = self.code_offset(d, value, false)?;
                    if !self.header[target] {
                        return Err(VMError::NotAFunction {
                            offset: d.offset,
                            target,
                        });
                    }
                }
                OperandKind::End => {
                    let end = self.code_offset(d, value, true)?;
                    if end <= d.offset || (end < self.len && !self.boundary[end]) {
                        return Err(VMError::MisalignedTarget {
                            instruction,
                            offset: d.offset,
                            target: end,
                        });
                    }
                }
                OperandKind::Count | OperandKind::Slot => {
                    self.integer(d, value)?;
                }
                OperandKind::FrameSize => {
                    if self.integer(d, value)? > MAX_FRAME_SLOTS {
                        return Err(VMError::FrameSizeOutOfRange {
                            instruction,
                            offset: d.offset,
                            count: value,
                            max: MAX_FRAME_SLOTS,
                        });
                    }
                }
                OperandKind::Len => {
                    if self.integer(d, value)? >= RAM_SIZE {
                        return Err(VMError::RamIndexOutOfBounds {
                            instruction,
                            offset: d.offset,
                            index: value,
                            size: RAM_SIZE,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn integer(&self, d: &Decoded, value: f64) -> Result<usize, VMError> {
        exact_index(value).ok_or(VMError::NotAnInteger {
            instruction: d.instr.mnemonic(),
            offset: d.offset,
            value,
        })
    }

    /// Checks that `value` is a code offset in `[CODE_START, len)`, or `len` itself when
    /// `allow_end` is set.
    fn code_offset(&self, d: &Decoded, value: f64, allow_end: bool) -> Result<usize, VMError> {
        let in_range = |target: usize| {
            target >= CODE_START && (target < self.len || (allow_end && target == self.len))
        };
        match exact_index(value) {
            Some(target) if in_range(target) => Ok(target),
            _ => Err(VMError::InvalidTarget {
                instruction: d.instr.mnemonic(),
                offset: d.offset,
                target: value,
                len: self.len,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::virtual_machine::isa::Instruction;
    use arbtest::arbtest;

    /// Builds an artifact from `(instruction, operands)` pairs.
    fn build(instrs: &[(Instruction, &[f64])]) -> Program {
        let mut code = Vec::new();
        for (instr, operands) in instrs {
            assert_eq!(instr.operand_count(), operands.len());
            code.push(*instr as u8);
            for value in *operands {
                code.extend_from_slice(&value.to_le_bytes());
            }
        }
        Program::from_code(&code)
    }

    const START: f64 = CODE_START as f64;

    #[test]
    fn accepts_empty_program() {
        assert!(verify(&Program::from_code(&[])).is_ok());
    }

    #[test]
    fn accepts_well_formed_program() {
        // 6: PUSH 1   23: JMP 32   32: POP rax   49: END
        let program = build(&[
            (Instruction::Push, &[0.0, 1.0]),
            (Instruction::Jmp, &[32.0]),
            (Instruction::Pop, &[1.0, 0.0]),
            (Instruction::End, &[]),
        ]);
        assert!(verify(&program).is_ok());
    }

    #[test]
    fn rejects_invalid_opcode() {
        let program = Program::from_code(&[Instruction::COUNT as u8]);
        assert!(matches!(
            verify(&program),
            Err(VMError::InvalidInstruction { offset: 6, .. })
        ));
    }

    #[test]
    fn rejects_truncated_instruction() {
        let mut code = vec![Instruction::Push as u8];
        code.extend_from_slice(&0.0f64.to_le_bytes());
        let program = Program::from_code(&code);
        assert!(matches!(
            verify(&program),
            Err(VMError::TruncatedInstruction { offset: 6, .. })
        ));
    }

    #[test]
    fn rejects_jump_past_end() {
        let program = build(&[(Instruction::Jmp, &[15.0])]);
        assert!(matches!(
            verify(&program),
            Err(VMError::InvalidTarget { offset: 6, .. })
        ));
    }

    #[test]
    fn rejects_jump_into_signature() {
        let program = build(&[(Instruction::Jmp, &[0.0])]);
        assert!(matches!(verify(&program), Err(VMError::InvalidTarget { .. })));
    }

    #[test]
    fn rejects_misaligned_jump() {
        let program = build(&[(Instruction::Jmp, &[START + 1.0]), (Instruction::End, &[])]);
        assert!(matches!(
            verify(&program),
            Err(VMError::MisalignedTarget { target: 7, .. })
        ));
    }

    #[test]
    fn rejects_fractional_target() {
        let program = build(&[(Instruction::Jmp, &[START + 0.5])]);
        assert!(matches!(verify(&program), Err(VMError::InvalidTarget { .. })));
    }

    #[test]
    fn rejects_bad_selector_and_register() {
        let program = build(&[(Instruction::Push, &[5.0, 0.0])]);
        assert!(matches!(verify(&program), Err(VMError::InvalidSelector { .. })));

        let program = build(&[(Instruction::Pop, &[1.0, 4.0])]);
        assert!(matches!(
            verify(&program),
            Err(VMError::InvalidRegisterIndex { .. })
        ));
    }

    #[test]
    fn rejects_ram_displacement_out_of_range() {
        let program = build(&[(Instruction::Push, &[2.0, (RAM_SIZE * 5) as f64])]);
        assert!(matches!(
            verify(&program),
            Err(VMError::RamIndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn call_must_target_function_header() {
        // 6: CALL 15   15: END
        let program = build(&[(Instruction::Call, &[15.0]), (Instruction::End, &[])]);
        assert!(matches!(
            verify(&program),
            Err(VMError::NotAFunction {
                offset: 6,
                target: 15
            })
        ));

        // 6: CALL 15   15: FUNC 25   24: ENDFUNC   25: END
        let program = build(&[
            (Instruction::Call, &[15.0]),
            (Instruction::Func, &[25.0]),
            (Instruction::EndFunc, &[]),
            (Instruction::End, &[]),
        ]);
        assert!(verify(&program).is_ok());
    }

    #[test]
    fn function_end_may_equal_stream_length() {
        // 6: FUNC 16   15: ENDFUNC   (len 16)
        let program = build(&[(Instruction::Func, &[16.0]), (Instruction::EndFunc, &[])]);
        assert_eq!(program.len(), 16);
        assert!(verify(&program).is_ok());

        let program = build(&[(Instruction::Func, &[17.0]), (Instruction::EndFunc, &[])]);
        assert!(matches!(verify(&program), Err(VMError::InvalidTarget { .. })));
    }

    #[test]
    fn rejects_negative_counts_and_slots() {
        let program = build(&[(Instruction::Fd, &[31.0, -1.0, 0.0]), (Instruction::EndFunc, &[])]);
        assert!(matches!(verify(&program), Err(VMError::NotAnInteger { .. })));

        let program = build(&[(Instruction::GetLocal, &[1.5])]);
        assert!(matches!(verify(&program), Err(VMError::NotAnInteger { .. })));
    }

    #[test]
    fn rejects_oversized_frames() {
        // 6: FD 31 0 n   31: ENDFUNC
        let fd = |nargs: f64, nlocals: f64| {
            build(&[
                (Instruction::Fd, &[31.0, nargs, nlocals]),
                (Instruction::EndFunc, &[]),
            ])
        };
        let limit = MAX_FRAME_SLOTS as f64;
        assert!(verify(&fd(limit, limit)).is_ok());
        assert!(matches!(
            verify(&fd(0.0, 4e9)),
            Err(VMError::FrameSizeOutOfRange { offset: 6, max: MAX_FRAME_SLOTS, .. })
        ));
        assert!(matches!(
            verify(&fd(limit + 1.0, 0.0)),
            Err(VMError::FrameSizeOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_draw_length_outside_ram() {
        let program = build(&[(Instruction::Draw, &[1.0, 1.0, RAM_SIZE as f64])]);
        assert!(matches!(
            verify(&program),
            Err(VMError::RamIndexOutOfBounds { .. })
        ));
        let program = build(&[(Instruction::Draw, &[1.0, 1.0, (RAM_SIZE - 1) as f64])]);
        assert!(verify(&program).is_ok());
    }

    #[test]
    fn arbitrary_bytes_never_panic() {
        arbtest(|u| {
            let code: Vec<u8> = u.arbitrary()?;
            let program = Program::from_code(&code);
            if let Err(err) = verify(&program) {
                assert!(err.offset().is_some(), "unpositioned error: {err}");
            }
            Ok(())
        });
    }

    #[test]
    fn arbitrary_instruction_streams_never_panic() {
        // Valid opcodes with arbitrary operands exercise the per-kind checks.
        arbtest(|u| {
            let count: u8 = u.int_in_range(0..=16)?;
            let mut code = Vec::new();
            for _ in 0..count {
                let opcode: u8 = u.int_in_range(0..=(Instruction::COUNT as u8 - 1))?;
                code.push(opcode);
                let instr = Instruction::try_from(opcode).unwrap();
                for _ in 0..instr.operand_count() {
                    let value = if u.arbitrary()? {
                        u.int_in_range(0..=200u32)? as f64
                    } else {
                        u.arbitrary::<f64>()?
                    };
                    code.extend_from_slice(&value.to_le_bytes());
                }
            }
            let program = Program::from_code(&code);
            if let Err(err) = verify(&program) {
                assert!(err.offset().is_some(), "unpositioned error: {err}");
            }
            Ok(())
        });
    }
}

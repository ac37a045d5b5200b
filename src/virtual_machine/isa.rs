//! Instruction Set Architecture (ISA) definitions.
//!
//! Defines the VM's instruction set. The [`for_each_instruction!`](crate::for_each_instruction) macro holds
//! the canonical instruction definitions and invokes a callback macro for code
//! generation. The assembler, verifier and disassembler walk the operand kinds generated
//! here, and the interpreter generates its dispatch from the same list.
//!
//! This module generates:
//! - The [`Instruction`] enum with opcode mappings
//! - `TryFrom<u8>` for decoding opcodes
//! - Mnemonic lookup in both directions, operand kinds and encoded sizes
//!
//! # Bytecode Format
//!
//! An artifact is the signature [`SIGNATURE`](super::program::SIGNATURE) followed by
//! the instruction stream. Every instruction is:
//! - Opcode: 1 byte
//! - Operands: one little-endian `f64` (8 bytes) per entry of its operand list
//!
//! Code offsets stored in operands (jump targets, function entries and ends) are absolute
//! byte offsets into the artifact, signature included.

use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::operand::OperandKind;

/// Size in bytes of one encoded operand.
pub const OPERAND_SIZE: usize = 8;

/// Largest operand list in the instruction set.
pub const MAX_OPERANDS: usize = 3;

/// Invokes a callback macro with the complete instruction definition list.
///
/// Each entry is `Name = opcode, "MNEMONIC" => [field: Kind, ...], handler`, where
/// `Kind` is an [`OperandKind`] variant and `handler` the interpreter method that
/// executes the instruction.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // =========================
            // Stack and memory
            // =========================
            /// END ; halts execution
            End = 0x00, "END" => [], op_end,
            /// PUSH src ; pushes an immediate, a register or a RAM cell
            Push = 0x01, "PUSH" => [mode: Mode, loc: Loc], op_push,
            /// POP [dst] ; pops into a register or a RAM cell, or discards
            Pop = 0x02, "POP" => [mode: Mode, loc: Loc], op_pop,
            // =========================
            // Binary arithmetic (pops a then b, pushes b op a)
            // =========================
            /// ADD ; b + a
            Add = 0x03, "ADD" => [], op_add,
            /// SUB ; b - a
            Sub = 0x04, "SUB" => [], op_sub,
            /// MUL ; b * a
            Mul = 0x05, "MUL" => [], op_mul,
            /// DIV ; b / a (IEEE semantics)
            Div = 0x06, "DIV" => [], op_div,
            /// MOD ; floating remainder of b / a
            Mod = 0x07, "MOD" => [], op_mod,
            /// POW ; b raised to a
            Pow = 0x08, "POW" => [], op_pow,
            // =========================
            // I/O
            // =========================
            /// IN ; reads a number from the console and pushes it
            In = 0x09, "IN" => [], op_in,
            /// OUT ; pops and prints with six decimals
            Out = 0x0A, "OUT" => [], op_out,
            // =========================
            // Jumps (conditional ones peek: b and a stay on the stack)
            // =========================
            /// JMP :label ; unconditional jump
            Jmp = 0x0B, "JMP" => [target: Target], op_jmp,
            /// JA :label ; jump if b > a
            Ja = 0x0C, "JA" => [target: Target], op_ja,
            /// JAE :label ; jump if b >= a
            Jae = 0x0D, "JAE" => [target: Target], op_jae,
            /// JB :label ; jump if b < a
            Jb = 0x0E, "JB" => [target: Target], op_jb,
            /// JBE :label ; jump if b <= a
            Jbe = 0x0F, "JBE" => [target: Target], op_jbe,
            /// JE :label ; jump if b == a
            Je = 0x10, "JE" => [target: Target], op_je,
            /// JNE :label ; jump if b != a
            Jne = 0x11, "JNE" => [target: Target], op_jne,
            // =========================
            // Unary math
            // =========================
            /// INC ; x + 1
            Inc = 0x12, "INC" => [], op_inc,
            /// DEC ; x - 1
            Dec = 0x13, "DEC" => [], op_dec,
            /// SQRT ; square root
            Sqrt = 0x14, "SQRT" => [], op_sqrt,
            /// SQR ; x * x
            Sqr = 0x15, "SQR" => [], op_sqr,
            /// SIN
            Sin = 0x16, "SIN" => [], op_sin,
            /// COS
            Cos = 0x17, "COS" => [], op_cos,
            /// TAN
            Tan = 0x18, "TAN" => [], op_tan,
            /// ARCSIN
            Arcsin = 0x19, "ARCSIN" => [], op_arcsin,
            /// ARCCOS
            Arccos = 0x1A, "ARCCOS" => [], op_arccos,
            /// ARCTAN
            Arctan = 0x1B, "ARCTAN" => [], op_arctan,
            /// SINH
            Sinh = 0x1C, "SINH" => [], op_sinh,
            /// COSH
            Cosh = 0x1D, "COSH" => [], op_cosh,
            /// TANH
            Tanh = 0x1E, "TANH" => [], op_tanh,
            /// LN ; natural logarithm
            Ln = 0x1F, "LN" => [], op_ln,
            /// EXP ; e raised to x
            Exp = 0x20, "EXP" => [], op_exp,
            // =========================
            // Functions
            // =========================
            /// CALL name ; calls the function whose header is at `func`
            Call = 0x21, "CALL" => [func: Func], op_call,
            /// FUNC name ; function header without frame slots
            Func = 0x22, "FUNC" => [end: End], op_func,
            /// FD name, nargs, nlocals ; function header with a frame
            Fd = 0x23, "FD" => [end: End, nargs: FrameSize, nlocals: FrameSize], op_fd,
            /// ENDFUNC ; returns without touching the value stack
            EndFunc = 0x24, "ENDFUNC" => [], op_endfunc,
            /// RET ; pops the result, drops the frame and pushes the result back
            Ret = 0x25, "RET" => [], op_ret,
            /// LEAVE ; drops the frame without a result
            Leave = 0x26, "LEAVE" => [], op_leave,
            /// GET_LOCAL slot ; pushes local `slot`
            GetLocal = 0x27, "GET_LOCAL" => [slot: Slot], op_get_local,
            /// SET_LOCAL slot ; pops into local `slot`
            SetLocal = 0x28, "SET_LOCAL" => [slot: Slot], op_set_local,
            /// GET_ARG slot ; pushes argument `slot` (0 = last pushed)
            GetArg = 0x29, "GET_ARG" => [slot: Slot], op_get_arg,
            // =========================
            // Output
            // =========================
            /// DRAW width, height, length ; writes RAM[0..length) as a bitmap
            Draw = 0x2A, "DRAW" => [width: Count, height: Count, len: Len], op_draw,
        }
    };
}

#[macro_export]
macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $handler:ident
        ),* $(,)?
    ) => {
        // =========================
        // VM instruction enum
        // =========================
        #[repr(u8)]
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        pub enum Instruction {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl TryFrom<u8> for Instruction {
            type Error = VMError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $( $opcode => Ok(Instruction::$name), )*
                    _ => Err(VMError::InvalidInstruction {
                        opcode: value,
                        offset: 0,
                    }),
                }
            }
        }

        impl Instruction {
            /// Every instruction, in opcode order.
            pub const ALL: &'static [Instruction] = &[$( Instruction::$name ),*];

            /// Returns the assembly mnemonic for this instruction.
            pub const fn mnemonic(&self) -> &'static str {
                match self {
                    $( Instruction::$name => $mnemonic, )*
                }
            }

            /// Looks up an instruction by its (case-sensitive) mnemonic.
            pub fn from_mnemonic(mnemonic: &str) -> Option<Instruction> {
                match mnemonic {
                    $( $mnemonic => Some(Instruction::$name), )*
                    _ => None,
                }
            }

            /// Returns the kinds of the encoded operands, in stream order.
            pub const fn operands(&self) -> &'static [OperandKind] {
                match self {
                    $( Instruction::$name => &[$( OperandKind::$kind ),*], )*
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

impl Instruction {
    /// Number of instructions in the set.
    pub const COUNT: usize = Instruction::ALL.len();

    /// Returns the opcode byte.
    pub const fn opcode(&self) -> u8 {
        *self as u8
    }

    /// Number of encoded operands.
    pub const fn operand_count(&self) -> usize {
        self.operands().len()
    }

    /// Encoded size in bytes: the opcode plus eight bytes per operand.
    pub const fn size(&self) -> usize {
        1 + OPERAND_SIZE * self.operand_count()
    }

    /// Returns `true` for the two function header instructions.
    pub const fn is_function_header(&self) -> bool {
        matches!(self, Instruction::Func | Instruction::Fd)
    }
}

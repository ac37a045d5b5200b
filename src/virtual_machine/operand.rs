//! Operand kinds and the PUSH/POP addressing-mode encoding.
//!
//! Every operand in the bytecode is one little-endian `f64`. The kind attached to an
//! operand in the [instruction table](crate::for_each_instruction) decides how the
//! assembler parses it, how the verifier range-checks it and how the disassembler prints
//! it.
//!
//! PUSH and POP take a `(selector, value)` pair:
//!
//! | selector | source syntax              | value                                  |
//! |----------|----------------------------|----------------------------------------|
//! | `0`      | `3.5` (POP: no operand)    | the immediate                          |
//! | `1`      | `rax`                      | register index                         |
//! | `2`      | `[rbx+4]`, `[rbx]`, `[4]`  | `(reg + 1) + N * (REGISTER_COUNT + 1)` |

use crate::virtual_machine::errors::VMError;
use std::fmt;

/// Number of general purpose registers.
pub const REGISTER_COUNT: usize = 4;

/// Register names, indexed by register id.
pub const REGISTER_NAMES: [&str; REGISTER_COUNT] = ["rax", "rbx", "rcx", "rdx"];

/// Number of RAM cells addressable by indirect operands.
pub const RAM_SIZE: usize = 10_000;

/// Largest integer a double carries exactly (2^53).
///
/// Register ids, RAM indices, counts and code offsets are packed into doubles, so they
/// must stay at or below this value.
pub const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Largest argument or local count an `FD` header may declare.
///
/// `CALL` pushes one zero per local, so this also caps what one call can allocate.
pub const MAX_FRAME_SLOTS: usize = 4096;

/// Stride between displacements in the indirect encoding.
const MEMORY_STRIDE: usize = REGISTER_COUNT + 1;

/// What an operand slot means. Each kind occupies exactly one `f64`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperandKind {
    /// Addressing-mode selector of a PUSH/POP pair.
    Mode,
    /// Value half of a PUSH/POP pair, interpreted according to the preceding `Mode`.
    Loc,
    /// Absolute code offset of a jump target.
    Target,
    /// Absolute code offset of a function header.
    Func,
    /// Absolute code offset just past a function's `ENDFUNC`.
    End,
    /// Non-negative integer.
    Count,
    /// Argument or local count of a frame, at most [`MAX_FRAME_SLOTS`].
    FrameSize,
    /// Non-negative integer below [`RAM_SIZE`].
    Len,
    /// Non-negative frame slot.
    Slot,
}

impl OperandKind {
    /// Returns `true` if the kind is written as its own token in assembly source.
    ///
    /// `Loc` shares the token of the preceding `Mode`.
    pub const fn has_token(&self) -> bool {
        !matches!(self, OperandKind::Loc)
    }
}

/// Addressing-mode selector of a PUSH/POP operand.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Selector {
    Immediate = 0,
    Register = 1,
    Memory = 2,
}

impl TryFrom<f64> for Selector {
    type Error = f64;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        match exact_index(value) {
            Some(0) => Ok(Selector::Immediate),
            Some(1) => Ok(Selector::Register),
            Some(2) => Ok(Selector::Memory),
            _ => Err(value),
        }
    }
}

/// Returns `value` as an index if it is an exact, non-negative integer within
/// [`MAX_EXACT_INTEGER`].
pub fn exact_index(value: f64) -> Option<usize> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= MAX_EXACT_INTEGER
    {
        Some(value as usize)
    } else {
        None
    }
}

/// Returns `value` as a frame size if it is an exact integer no larger than
/// [`MAX_FRAME_SLOTS`].
pub fn frame_size(value: f64) -> Option<usize> {
    exact_index(value).filter(|&n| n <= MAX_FRAME_SLOTS)
}

/// Formats a double so that parsing it back yields the same bits.
pub fn format_number(value: f64) -> String {
    format!("{value}")
}

/// Decoded PUSH/POP operand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum StackOperand {
    /// Immediate value (PUSH) or plain discard (POP).
    Imm(f64),
    /// Register index.
    Reg(u8),
    /// RAM cell at `registers[reg] + disp`, or at `disp` without a register.
    Mem { reg: Option<u8>, disp: usize },
}

impl StackOperand {
    /// Encodes the operand as its `(selector, value)` pair.
    pub fn encode(&self) -> (f64, f64) {
        match *self {
            StackOperand::Imm(value) => (Selector::Immediate as u8 as f64, value),
            StackOperand::Reg(reg) => (Selector::Register as u8 as f64, reg as f64),
            StackOperand::Mem { reg, disp } => {
                let reg_part = reg.map(|r| r as usize + 1).unwrap_or(0);
                (
                    Selector::Memory as u8 as f64,
                    (reg_part + disp * MEMORY_STRIDE) as f64,
                )
            }
        }
    }

    /// Decodes a `(selector, value)` pair, validating register ids and displacements.
    ///
    /// `offset` is the byte offset of the instruction, used for diagnostics.
    pub fn decode(
        instruction: &'static str,
        offset: usize,
        mode: f64,
        value: f64,
    ) -> Result<StackOperand, VMError> {
        let selector = Selector::try_from(mode).map_err(|selector| VMError::InvalidSelector {
            instruction,
            offset,
            selector,
        })?;

        match selector {
            Selector::Immediate => Ok(StackOperand::Imm(value)),
            Selector::Register => match exact_index(value) {
                Some(index) if index < REGISTER_COUNT => Ok(StackOperand::Reg(index as u8)),
                _ => Err(VMError::InvalidRegisterIndex {
                    instruction,
                    offset,
                    index: value,
                }),
            },
            Selector::Memory => {
                let encoded = exact_index(value).ok_or(VMError::NotAnInteger {
                    instruction,
                    offset,
                    value,
                })?;
                let disp = encoded / MEMORY_STRIDE;
                if disp >= RAM_SIZE {
                    return Err(VMError::RamIndexOutOfBounds {
                        instruction,
                        offset,
                        index: disp as f64,
                        size: RAM_SIZE,
                    });
                }
                let reg = match encoded % MEMORY_STRIDE {
                    0 => None,
                    r => Some((r - 1) as u8),
                };
                Ok(StackOperand::Mem { reg, disp })
            }
        }
    }

    /// Parses a PUSH/POP operand token: a register, a bracketed RAM reference, or a number.
    pub fn parse(token: &str) -> Result<StackOperand, VMError> {
        if let Some(reg) = register_index(token) {
            return Ok(StackOperand::Reg(reg));
        }
        if token.starts_with('[') {
            return parse_memory(token);
        }
        if token.starts_with('r') && token.len() == 3 {
            return Err(VMError::InvalidRegister(token.to_string()));
        }
        token
            .parse::<f64>()
            .map(StackOperand::Imm)
            .map_err(|_| VMError::InvalidNumber(token.to_string()))
    }
}

impl fmt::Display for StackOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            StackOperand::Imm(value) => write!(f, "{}", format_number(value)),
            StackOperand::Reg(reg) => write!(f, "{}", REGISTER_NAMES[reg as usize]),
            StackOperand::Mem { reg: None, disp } => write!(f, "[{disp}]"),
            StackOperand::Mem {
                reg: Some(reg),
                disp: 0,
            } => write!(f, "[{}]", REGISTER_NAMES[reg as usize]),
            StackOperand::Mem {
                reg: Some(reg),
                disp,
            } => write!(f, "[{}+{disp}]", REGISTER_NAMES[reg as usize]),
        }
    }
}

/// Looks up a register by name.
pub fn register_index(name: &str) -> Option<u8> {
    REGISTER_NAMES
        .iter()
        .position(|r| *r == name)
        .map(|index| index as u8)
}

/// Character cursor with explicit rollback, used for the small operand grammar.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.text.len() - trimmed.len();
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.rest().starts_with(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// Runs `f`; on `None` the cursor is rewound to where it was.
    fn attempt<T>(&mut self, f: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        let saved = self.pos;
        let result = f(self);
        if result.is_none() {
            self.pos = saved;
        }
        result
    }

    fn register(&mut self) -> Option<u8> {
        self.attempt(|c| {
            c.skip_ws();
            let rest = c.rest();
            let name = rest.get(..3)?;
            let reg = register_index(name)?;
            c.pos += 3;
            Some(reg)
        })
    }

    fn unsigned(&mut self) -> Option<usize> {
        self.attempt(|c| {
            c.skip_ws();
            let digits = c.rest().chars().take_while(char::is_ascii_digit).count();
            if digits == 0 {
                return None;
            }
            let value = c.rest()[..digits].parse::<usize>().ok()?;
            c.pos += digits;
            Some(value)
        })
    }

    fn at_end(&mut self) -> bool {
        self.skip_ws();
        self.rest().is_empty()
    }
}

/// Parses `[reg+N]`, `[reg]` or `[N]`.
fn parse_memory(token: &str) -> Result<StackOperand, VMError> {
    let malformed = || VMError::InvalidMemoryOperand(token.to_string());

    let mut cursor = Cursor::new(token);
    if !cursor.eat('[') {
        return Err(malformed());
    }

    let with_register = cursor.attempt(|c| {
        let reg = c.register()?;
        let disp = if c.eat('+') { c.unsigned()? } else { 0 };
        c.eat(']').then_some(StackOperand::Mem {
            reg: Some(reg),
            disp,
        })
    });
    let operand = match with_register {
        Some(operand) => operand,
        None => cursor
            .attempt(|c| {
                let disp = c.unsigned()?;
                c.eat(']').then_some(StackOperand::Mem { reg: None, disp })
            })
            .ok_or_else(malformed)?,
    };

    if !cursor.at_end() {
        return Err(malformed());
    }
    if let StackOperand::Mem { disp, .. } = operand
        && disp >= RAM_SIZE
    {
        return Err(VMError::InvalidMemoryOperand(format!(
            "{token} (displacement {disp} is outside RAM of {RAM_SIZE} cells)"
        )));
    }
    Ok(operand)
}

//! Core virtual machine implementation.
//!
//! The VM executes verified bytecode on a value stack of doubles. Four registers and a
//! RAM of [`RAM_SIZE`] cells back the `PUSH`/`POP` addressing modes, and function calls
//! keep their [`Frame`]s on a second guarded stack owned by the interpreter.
//!
//! Dispatch is generated from [`for_each_instruction!`](crate::for_each_instruction):
//! every entry reads its operands as little-endian doubles and calls its handler with the
//! instruction mnemonic first.

mod console;
mod frame;
mod registers;

pub use console::{Console, StreamConsole, stdio};
pub use frame::Frame;
pub use registers::{Ram, Registers};

use crate::config::Config;
use crate::for_each_instruction;
use crate::types::guarded_stack::GuardedStack;
use crate::utils::bitmap::write_bitmap;
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::operand::{
    RAM_SIZE, REGISTER_COUNT, StackOperand, exact_index, frame_size,
};
use crate::virtual_machine::program::{CODE_START, Program};
use crate::virtual_machine::verifier::verify;
use std::fmt::Write;
use std::path::{Path, PathBuf};

/// Tolerance used by the conditional jumps when comparing the two top values.
pub const EPS: f64 = 1e-6;

/// Number of stack values shown by [`VM::dump_state`].
const DUMP_DEPTH: usize = 16;

macro_rules! exec_vm {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:expr, $mnemonic:literal => [
                $( $field:ident : $kind:ident ),* $(,)?
            ], $handler:ident
        ),* $(,)?
    ) => {
        impl<C: Console> VM<C> {
            /// Reads the operands of `instruction` and executes it.
            fn exec(&mut self, instruction: Instruction) -> Result<(), VMError> {
                match instruction {
                    $(
                        Instruction::$name => {
                            $( let $field = self.read_operand()?; )*
                            self.$handler($mnemonic, $( $field ),*)
                        }
                    )*
                }
            }
        }
    };
}

for_each_instruction!(exec_vm);

fn approx_eq(b: f64, a: f64) -> bool {
    (b - a).abs() < EPS
}

fn above(b: f64, a: f64) -> bool {
    a + EPS < b
}

fn below(b: f64, a: f64) -> bool {
    b + EPS < a
}

/// Bytecode virtual machine.
///
/// Executes instructions from the first byte after the signature until `END` or the end
/// of the stream.
pub struct VM<C: Console> {
    /// Verified artifact.
    program: Program,
    /// Instruction pointer (byte offset into the artifact).
    ip: usize,
    /// Offset of the instruction being executed, for diagnostics.
    instr_offset: usize,
    /// Set by `END`.
    halted: bool,
    stack: GuardedStack<f64>,
    frames: GuardedStack<Frame>,
    registers: Registers,
    ram: Ram,
    console: C,
    /// Output path of `DRAW`.
    bitmap_path: PathBuf,
}

impl<C: Console> VM<C> {
    /// Verifies `program` and prepares an interpreter for it.
    pub fn new(program: Program, console: C, config: &Config) -> Result<Self, VMError> {
        verify(&program)?;
        Ok(Self {
            program,
            ip: CODE_START,
            instr_offset: CODE_START,
            halted: false,
            stack: GuardedStack::with_capacity(config.stack_capacity),
            frames: GuardedStack::with_capacity(config.stack_capacity),
            registers: Registers::new(),
            ram: Ram::new(),
            console,
            bitmap_path: config.bitmap_path.clone(),
        })
    }

    /// Executes the bytecode until `END`, the end of the stream, or an error.
    pub fn run(&mut self) -> Result<(), VMError> {
        crate::debug!("executing {} bytes of code", self.program.code().len());
        while !self.halted && self.ip < self.program.len() {
            let opcode_offset = self.ip;
            let opcode = self.program.as_bytes()[opcode_offset];
            self.instr_offset = opcode_offset;
            self.ip += 1;
            let instr = Instruction::try_from(opcode).map_err(|_| VMError::InvalidInstruction {
                opcode,
                offset: opcode_offset,
            })?;
            self.exec(instr)?;
        }
        crate::debug!(
            "finished at byte {} with {} value(s) on the stack",
            self.ip,
            self.stack.size()
        );
        Ok(())
    }

    /// Values on the stack, bottom first.
    pub fn stack(&self) -> &[f64] {
        self.stack.as_slice()
    }

    pub fn registers(&self) -> &[f64; REGISTER_COUNT] {
        self.registers.as_array()
    }

    pub fn ram(&self, address: usize) -> Option<f64> {
        self.ram.get(address)
    }

    /// Number of active calls.
    pub fn frame_depth(&self) -> usize {
        self.frames.size()
    }

    pub fn ip(&self) -> usize {
        self.ip
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn bitmap_path(&self) -> &Path {
        &self.bitmap_path
    }

    pub fn into_console(self) -> C {
        self.console
    }

    /// Multi-line description of the machine state, printed before aborting on a fatal
    /// error.
    pub fn dump_state(&self) -> String {
        let mut out = String::new();
        let mnemonic = self
            .program
            .as_bytes()
            .get(self.instr_offset)
            .and_then(|&op| Instruction::try_from(op).ok())
            .map(|i| i.mnemonic())
            .unwrap_or("?");
        let _ = writeln!(out, "instruction: {mnemonic} at byte {}", self.instr_offset);

        let values = self.stack.as_slice();
        let shown = &values[values.len().saturating_sub(DUMP_DEPTH)..];
        let _ = write!(out, "stack ({} value(s)):", values.len());
        if shown.len() < values.len() {
            let _ = write!(out, " ...");
        }
        for v in shown {
            let _ = write!(out, " {v}");
        }
        let _ = writeln!(out);
        if let Err(fault) = self.stack.verify() {
            let _ = writeln!(out, "stack guard: {fault}");
        }

        let _ = writeln!(out, "frames ({}):", self.frames.size());
        for (depth, frame) in self.frames.as_slice().iter().enumerate().rev() {
            let _ = writeln!(
                out,
                "  #{depth} return {} base {} args {} locals {}",
                frame.return_address, frame.base, frame.arg_count, frame.local_count
            );
        }
        let _ = write!(out, "registers: {}", self.registers);
        out
    }

    /// Reads the next operand and advances the instruction pointer past it.
    fn read_operand(&mut self) -> Result<f64, VMError> {
        let value = self
            .program
            .read_f64(self.ip)
            .ok_or(VMError::InvalidIP(self.ip))?;
        self.ip += 8;
        Ok(value)
    }

    fn pop(&mut self, instr: &'static str) -> Result<f64, VMError> {
        self.stack.try_pop().ok_or(VMError::StackUnderflow {
            instruction: instr,
            ip: self.instr_offset,
        })
    }

    fn underflow(&self, instr: &'static str) -> VMError {
        VMError::StackUnderflow {
            instruction: instr,
            ip: self.instr_offset,
        }
    }

    fn operand(&self, instr: &'static str, mode: f64, loc: f64) -> Result<StackOperand, VMError> {
        StackOperand::decode(instr, self.instr_offset, mode, loc)
    }

    fn register(&self, instr: &'static str, reg: u8) -> Result<f64, VMError> {
        self.registers
            .get(reg)
            .ok_or(VMError::InvalidRegisterIndex {
                instruction: instr,
                offset: self.instr_offset,
                index: reg as f64,
            })
    }

    /// Resolves `[reg+disp]` to a RAM address.
    fn address(&self, instr: &'static str, reg: Option<u8>, disp: usize) -> Result<usize, VMError> {
        let base = match reg {
            Some(r) => self.register(instr, r)?,
            None => 0.0,
        };
        let address = base + disp as f64;
        exact_index(address)
            .filter(|&a| a < RAM_SIZE)
            .ok_or(VMError::MemoryOutOfBounds {
                instruction: instr,
                ip: self.instr_offset,
                address,
                size: RAM_SIZE,
            })
    }

    fn jump_target(&self, target: f64) -> Result<usize, VMError> {
        exact_index(target)
            .filter(|&t| t < self.program.len())
            .ok_or(VMError::InvalidIP(self.instr_offset))
    }

    fn binary(&mut self, instr: &'static str, op: fn(f64, f64) -> f64) -> Result<(), VMError> {
        let a = self.pop(instr)?;
        let b = self.pop(instr)?;
        self.stack.push(op(b, a));
        Ok(())
    }

    fn unary(&mut self, instr: &'static str, op: fn(f64) -> f64) -> Result<(), VMError> {
        let x = self.pop(instr)?;
        self.stack.push(op(x));
        Ok(())
    }

    /// Conditional jump on the two top values, which stay on the stack.
    fn branch(
        &mut self,
        instr: &'static str,
        target: f64,
        cond: fn(f64, f64) -> bool,
    ) -> Result<(), VMError> {
        let a = self.pop(instr)?;
        let b = self.pop(instr)?;
        self.stack.push(b);
        self.stack.push(a);
        if cond(b, a) {
            self.ip = self.jump_target(target)?;
        }
        Ok(())
    }

    fn current_frame(&self, instr: &'static str) -> Result<Frame, VMError> {
        self.frames.top().copied().ok_or(VMError::NoActiveFrame {
            instruction: instr,
            ip: self.instr_offset,
        })
    }

    fn pop_frame(&mut self, instr: &'static str) -> Result<Frame, VMError> {
        self.frames.try_pop().ok_or(VMError::NoActiveFrame {
            instruction: instr,
            ip: self.instr_offset,
        })
    }

    /// Checks `slot` against the `available` entries of the current frame.
    fn slot(&self, instr: &'static str, slot: f64, available: usize) -> Result<usize, VMError> {
        exact_index(slot)
            .filter(|&s| s < available)
            .ok_or(VMError::FrameAccessOutOfBounds {
                instruction: instr,
                ip: self.instr_offset,
                slot,
                available,
            })
    }

    /// Drops everything the callee and its arguments left on the stack.
    fn unwind(&mut self, instr: &'static str, frame: &Frame) -> Result<(), VMError> {
        let floor = frame.caller_depth();
        if self.stack.size() < floor {
            return Err(self.underflow(instr));
        }
        self.stack.truncate(floor);
        self.ip = frame.return_address;
        Ok(())
    }

    // ==================== Stack and memory ====================

    fn op_end(&mut self, _instr: &'static str) -> Result<(), VMError> {
        self.halted = true;
        Ok(())
    }

    fn op_push(&mut self, instr: &'static str, mode: f64, loc: f64) -> Result<(), VMError> {
        let value = match self.operand(instr, mode, loc)? {
            StackOperand::Imm(v) => v,
            StackOperand::Reg(r) => self.register(instr, r)?,
            StackOperand::Mem { reg, disp } => {
                let address = self.address(instr, reg, disp)?;
                self.ram.get(address).unwrap_or_default()
            }
        };
        self.stack.push(value);
        Ok(())
    }

    fn op_pop(&mut self, instr: &'static str, mode: f64, loc: f64) -> Result<(), VMError> {
        let operand = self.operand(instr, mode, loc)?;
        let value = self.pop(instr)?;
        match operand {
            StackOperand::Imm(_) => {}
            StackOperand::Reg(r) => {
                if !self.registers.set(r, value) {
                    return Err(VMError::InvalidRegisterIndex {
                        instruction: instr,
                        offset: self.instr_offset,
                        index: r as f64,
                    });
                }
            }
            StackOperand::Mem { reg, disp } => {
                let address = self.address(instr, reg, disp)?;
                self.ram.set(address, value);
            }
        }
        Ok(())
    }

    // ==================== Arithmetic ====================

    fn op_add(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |b, a| b + a)
    }

    fn op_sub(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |b, a| b - a)
    }

    fn op_mul(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |b, a| b * a)
    }

    fn op_div(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |b, a| b / a)
    }

    fn op_mod(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, |b, a| b % a)
    }

    fn op_pow(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.binary(instr, f64::powf)
    }

    fn op_inc(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, |x| x + 1.0)
    }

    fn op_dec(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, |x| x - 1.0)
    }

    fn op_sqrt(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::sqrt)
    }

    fn op_sqr(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, |x| x * x)
    }

    fn op_sin(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::sin)
    }

    fn op_cos(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::cos)
    }

    fn op_tan(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::tan)
    }

    fn op_arcsin(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::asin)
    }

    fn op_arccos(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::acos)
    }

    fn op_arctan(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::atan)
    }

    fn op_sinh(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::sinh)
    }

    fn op_cosh(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::cosh)
    }

    fn op_tanh(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::tanh)
    }

    fn op_ln(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::ln)
    }

    fn op_exp(&mut self, instr: &'static str) -> Result<(), VMError> {
        self.unary(instr, f64::exp)
    }

    // ==================== I/O ====================

    fn op_in(&mut self, _instr: &'static str) -> Result<(), VMError> {
        let value = self.console.read_number()?;
        self.stack.push(value);
        Ok(())
    }

    fn op_out(&mut self, instr: &'static str) -> Result<(), VMError> {
        let value = self.pop(instr)?;
        self.console.write_number(value)
    }

    fn op_draw(
        &mut self,
        instr: &'static str,
        width: f64,
        height: f64,
        len: f64,
    ) -> Result<(), VMError> {
        let cells = exact_index(len)
            .and_then(|n| self.ram.prefix(n))
            .ok_or(VMError::MemoryOutOfBounds {
                instruction: instr,
                ip: self.instr_offset,
                address: len,
                size: RAM_SIZE,
            })?;
        let data: Vec<u8> = cells.iter().map(|&v| v as u8).collect();
        let (width, height) = match (exact_index(width), exact_index(height)) {
            (Some(w), Some(h)) => (w, h),
            _ => {
                return Err(VMError::InvalidBitmap(format!(
                    "dimensions {width}x{height} are not integers"
                )));
            }
        };
        write_bitmap(&self.bitmap_path, width, height, &data)?;
        crate::debug!(
            "wrote {width}x{height} bitmap to {}",
            self.bitmap_path.display()
        );
        Ok(())
    }

    // ==================== Jumps ====================

    fn op_jmp(&mut self, _instr: &'static str, target: f64) -> Result<(), VMError> {
        self.ip = self.jump_target(target)?;
        Ok(())
    }

    fn op_ja(&mut self, instr: &'static str, target: f64) -> Result<(), VMError> {
        self.branch(instr, target, above)
    }

    fn op_jae(&mut self, instr: &'static str, target: f64) -> Result<(), VMError> {
        self.branch(instr, target, |b, a| !below(b, a))
    }

    fn op_jb(&mut self, instr: &'static str, target: f64) -> Result<(), VMError> {
        self.branch(instr, target, below)
    }

    fn op_jbe(&mut self, instr: &'static str, target: f64) -> Result<(), VMError> {
        self.branch(instr, target, |b, a| !above(b, a))
    }

    fn op_je(&mut self, instr: &'static str, target: f64) -> Result<(), VMError> {
        self.branch(instr, target, approx_eq)
    }

    fn op_jne(&mut self, instr: &'static str, target: f64) -> Result<(), VMError> {
        self.branch(instr, target, |b, a| !approx_eq(b, a))
    }

    // ==================== Functions ====================

    fn op_call(&mut self, instr: &'static str, func: f64) -> Result<(), VMError> {
        let entry = self.jump_target(func)?;
        let header = self.program.decode_at(entry)?;
        let (arg_count, local_count) = match header.instr {
            Instruction::Func => (0, 0),
            Instruction::Fd => {
                let counts = header.operands();
                match (frame_size(counts[1]), frame_size(counts[2])) {
                    (Some(args), Some(locals)) => (args, locals),
                    _ => return Err(VMError::InvalidIP(entry)),
                }
            }
            _ => {
                return Err(VMError::NotAFunction {
                    offset: self.instr_offset,
                    target: entry,
                });
            }
        };
        if self.stack.size() < arg_count {
            return Err(self.underflow(instr));
        }

        self.frames.push(Frame {
            return_address: self.ip,
            base: self.stack.size(),
            arg_count,
            local_count,
        });
        for _ in 0..local_count {
            self.stack.push(0.0);
        }
        self.ip = header.next_offset();
        Ok(())
    }

    /// Reached by falling through: skips the body.
    fn op_func(&mut self, _instr: &'static str, end: f64) -> Result<(), VMError> {
        self.ip = exact_index(end).ok_or(VMError::InvalidIP(self.instr_offset))?;
        Ok(())
    }

    fn op_fd(
        &mut self,
        instr: &'static str,
        end: f64,
        _nargs: f64,
        _nlocals: f64,
    ) -> Result<(), VMError> {
        self.op_func(instr, end)
    }

    fn op_endfunc(&mut self, instr: &'static str) -> Result<(), VMError> {
        let frame = self.pop_frame(instr)?;
        self.ip = frame.return_address;
        Ok(())
    }

    fn op_ret(&mut self, instr: &'static str) -> Result<(), VMError> {
        let frame = self.current_frame(instr)?;
        let result = self.pop(instr)?;
        self.pop_frame(instr)?;
        self.unwind(instr, &frame)?;
        self.stack.push(result);
        Ok(())
    }

    fn op_leave(&mut self, instr: &'static str) -> Result<(), VMError> {
        let frame = self.pop_frame(instr)?;
        self.unwind(instr, &frame)
    }

    fn op_get_local(&mut self, instr: &'static str, slot: f64) -> Result<(), VMError> {
        let frame = self.current_frame(instr)?;
        let s = self.slot(instr, slot, frame.local_count)?;
        let value = self.stack.get(frame.base + s).copied().ok_or(
            VMError::FrameAccessOutOfBounds {
                instruction: instr,
                ip: self.instr_offset,
                slot,
                available: self.stack.size().saturating_sub(frame.base),
            },
        )?;
        self.stack.push(value);
        Ok(())
    }

    fn op_set_local(&mut self, instr: &'static str, slot: f64) -> Result<(), VMError> {
        let frame = self.current_frame(instr)?;
        let s = self.slot(instr, slot, frame.local_count)?;
        let value = self.pop(instr)?;
        if !self.stack.set(frame.base + s, value) {
            return Err(VMError::FrameAccessOutOfBounds {
                instruction: instr,
                ip: self.instr_offset,
                slot,
                available: self.stack.size().saturating_sub(frame.base),
            });
        }
        Ok(())
    }

    /// Argument 0 is the last one pushed by the caller.
    fn op_get_arg(&mut self, instr: &'static str, slot: f64) -> Result<(), VMError> {
        let frame = self.current_frame(instr)?;
        let s = self.slot(instr, slot, frame.arg_count)?;
        let value = self.stack.get(frame.base - 1 - s).copied().ok_or(
            VMError::FrameAccessOutOfBounds {
                instruction: instr,
                ip: self.instr_offset,
                slot,
                available: frame.arg_count,
            },
        )?;
        self.stack.push(value);
        Ok(())
    }
}

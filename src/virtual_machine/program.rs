//! Bytecode artifact representation and instruction decoding.
//!
//! A [`Program`] is the signature [`SIGNATURE`] followed by the instruction stream.
//! Offsets used anywhere in the toolchain (jump targets, function entries, diagnostics)
//! index the whole artifact, signature included, so the first instruction lives at
//! `SIGNATURE.len()`.

use crate::utils::reader::{read_file, write_file};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::{Instruction, MAX_OPERANDS, OPERAND_SIZE};
use std::path::Path;

/// Format signature every artifact starts with.
pub const SIGNATURE: &[u8; 6] = b"DK24o5";

/// Offset of the first instruction.
pub const CODE_START: usize = SIGNATURE.len();

/// A bytecode artifact: signature plus instruction stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Program {
    bytes: Vec<u8>,
}

impl Program {
    /// Wraps an instruction stream, prepending the signature.
    pub fn from_code(code: &[u8]) -> Program {
        let mut bytes = Vec::with_capacity(CODE_START + code.len());
        bytes.extend_from_slice(SIGNATURE);
        bytes.extend_from_slice(code);
        Program { bytes }
    }

    /// Takes a full artifact, checking only the signature.
    ///
    /// Use [`verify`](super::verifier::verify) before executing the result.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Program, VMError> {
        if !bytes.starts_with(SIGNATURE) {
            let found = &bytes[..bytes.len().min(CODE_START)];
            return Err(VMError::BadSignature {
                expected: String::from_utf8_lossy(SIGNATURE).into_owned(),
                found: String::from_utf8_lossy(found).into_owned(),
            });
        }
        Ok(Program { bytes })
    }

    /// Reads an artifact from disk.
    pub fn read_from(path: &Path) -> Result<Program, VMError> {
        Program::from_bytes(read_file(path)?)
    }

    /// Writes the artifact to disk.
    pub fn write_to(&self, path: &Path) -> Result<(), VMError> {
        write_file(path, &self.bytes)
    }

    /// The whole artifact.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The instruction stream without the signature.
    pub fn code(&self) -> &[u8] {
        &self.bytes[CODE_START..]
    }

    /// Artifact length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns `true` if the instruction stream is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.len() == CODE_START
    }

    /// Reads the little-endian double at `offset`.
    pub fn read_f64(&self, offset: usize) -> Option<f64> {
        let end = offset.checked_add(OPERAND_SIZE)?;
        let bytes: [u8; OPERAND_SIZE] = self.bytes.get(offset..end)?.try_into().ok()?;
        Some(f64::from_le_bytes(bytes))
    }

    /// Decodes the instruction at `offset` along with its operands.
    pub fn decode_at(&self, offset: usize) -> Result<Decoded, VMError> {
        let opcode = *self.bytes.get(offset).ok_or(VMError::InvalidIP(offset))?;
        let instr = Instruction::try_from(opcode)
            .map_err(|_| VMError::InvalidInstruction { opcode, offset })?;

        let available = self.bytes.len() - offset;
        if available < instr.size() {
            return Err(VMError::TruncatedInstruction {
                instruction: instr.mnemonic(),
                offset,
                expected: instr.size(),
                available,
            });
        }

        let mut operands = [0.0; MAX_OPERANDS];
        for (index, slot) in operands.iter_mut().take(instr.operand_count()).enumerate() {
            let at = offset + 1 + index * OPERAND_SIZE;
            *slot = self.read_f64(at).ok_or(VMError::InvalidIP(at))?;
        }

        Ok(Decoded {
            offset,
            instr,
            operands,
        })
    }

    /// Iterates over the instruction stream front to back.
    ///
    /// Yields the first decoding error and then stops.
    pub fn instructions(&self) -> Instructions<'_> {
        Instructions {
            program: self,
            offset: CODE_START,
            failed: false,
        }
    }
}

/// One decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoded {
    /// Byte offset of the opcode.
    pub offset: usize,
    pub instr: Instruction,
    operands: [f64; MAX_OPERANDS],
}

impl Decoded {
    /// The decoded operands, one per entry of [`Instruction::operands`].
    pub fn operands(&self) -> &[f64] {
        &self.operands[..self.instr.operand_count()]
    }

    /// Offset of the following instruction.
    pub fn next_offset(&self) -> usize {
        self.offset + self.instr.size()
    }
}

/// Iterator returned by [`Program::instructions`].
pub struct Instructions<'a> {
    program: &'a Program,
    offset: usize,
    failed: bool,
}

impl Iterator for Instructions<'_> {
    type Item = Result<Decoded, VMError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.program.len() {
            return None;
        }
        match self.program.decode_at(self.offset) {
            Ok(decoded) => {
                self.offset = decoded.next_offset();
                Some(Ok(decoded))
            }
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}

use crate::virtual_machine::operand::{RAM_SIZE, REGISTER_COUNT, REGISTER_NAMES};
use std::fmt;

/// Register file: `rax`, `rbx`, `rcx`, `rdx`, all starting at zero.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Registers {
    regs: [f64; REGISTER_COUNT],
}

impl Registers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the value in register `idx`, or `None` if there is no such register.
    pub fn get(&self, idx: u8) -> Option<f64> {
        self.regs.get(idx as usize).copied()
    }

    /// Stores a value into register `idx`. Returns `false` if there is no such register.
    pub fn set(&mut self, idx: u8, value: f64) -> bool {
        match self.regs.get_mut(idx as usize) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn as_array(&self) -> &[f64; REGISTER_COUNT] {
        &self.regs
    }
}

impl fmt::Display for Registers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in REGISTER_NAMES.iter().zip(self.regs).enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Zero-initialized RAM of [`RAM_SIZE`] cells.
#[derive(Clone, Debug, PartialEq)]
pub struct Ram {
    cells: Vec<f64>,
}

impl Ram {
    pub fn new() -> Self {
        Self {
            cells: vec![0.0; RAM_SIZE],
        }
    }

    pub fn get(&self, address: usize) -> Option<f64> {
        self.cells.get(address).copied()
    }

    /// Stores `value` at `address`. Returns `false` if the address is outside RAM.
    pub fn set(&mut self, address: usize, value: f64) -> bool {
        match self.cells.get_mut(address) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    /// The first `len` cells.
    pub fn prefix(&self, len: usize) -> Option<&[f64]> {
        self.cells.get(..len)
    }
}

impl Default for Ram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_get_set() {
        let mut regs = Registers::new();
        assert_eq!(regs.get(0), Some(0.0));
        assert!(regs.set(3, 2.5));
        assert_eq!(regs.get(3), Some(2.5));
        assert!(!regs.set(4, 1.0));
        assert_eq!(regs.get(4), None);
    }

    #[test]
    fn registers_display() {
        let mut regs = Registers::new();
        regs.set(1, -1.5);
        assert_eq!(regs.to_string(), "rax=0 rbx=-1.5 rcx=0 rdx=0");
    }

    #[test]
    fn ram_bounds() {
        let mut ram = Ram::new();
        assert!(ram.set(RAM_SIZE - 1, 4.0));
        assert_eq!(ram.get(RAM_SIZE - 1), Some(4.0));
        assert!(!ram.set(RAM_SIZE, 1.0));
        assert_eq!(ram.get(RAM_SIZE), None);
        assert_eq!(ram.prefix(2), Some(&[0.0, 0.0][..]));
        assert_eq!(ram.prefix(RAM_SIZE + 1), None);
    }
}

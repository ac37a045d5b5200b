//! Self-checking LIFO container.
//!
//! [`GuardedStack`] wraps a growable buffer with three sentinel words and a checksum
//! over the bytes of its live elements. Every mutating call checks the guards before and
//! after it runs; a violation means memory corruption or a logic bug, so the container
//! dumps what it found and aborts the process.
//!
//! Both checks run in every build profile: sentinels and the full checksum are
//! recomputed before and after each mutation, which makes a mutation linear in the
//! stack size. [`GuardedStack::verify`] runs the same checks without aborting.

use dkvm_derive::Error;
use std::mem;

/// Value stored in every sentinel word.
pub const CANARY: u32 = 0xDEAD_BEEF;

/// Default initial capacity.
pub const DEFAULT_CAPACITY: usize = 128;

/// Element types that can contribute to the stack checksum.
pub trait Guarded: Clone {
    /// Sum of the element's little-endian bytes.
    fn byte_sum(&self) -> u64;
}

macro_rules! impl_guarded {
    ($($ty:ty),*) => {
        $(
            impl Guarded for $ty {
                fn byte_sum(&self) -> u64 {
                    self.to_le_bytes().iter().map(|b| *b as u64).sum()
                }
            }
        )*
    };
}

impl_guarded!(u8, u32, u64, i64, usize, f64);

/// Integrity violation detected by [`GuardedStack::verify`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StackFault {
    #[error("front sentinel is dead (expected 0xdeadbeef, found {found:#x})")]
    FrontSentinel { found: u32 },
    #[error("back sentinel is dead (expected 0xdeadbeef, found {found:#x})")]
    BackSentinel { found: u32 },
    #[error("redundant sentinel is dead (expected 0xdeadbeef, found {found:#x})")]
    RedundantSentinel { found: u32 },
    #[error("checksum mismatch (expected {expected}, found {found})")]
    Checksum { expected: u64, found: u64 },
}

/// LIFO stack guarded by sentinels and a byte-sum checksum.
#[derive(Debug)]
pub struct GuardedStack<T: Guarded> {
    front: u32,
    data: Vec<T>,
    capacity: usize,
    min_capacity: usize,
    checksum: u64,
    back: u32,
    redundant: u32,
}

impl<T: Guarded> GuardedStack<T> {
    /// Creates an empty stack with [`DEFAULT_CAPACITY`].
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates an empty stack whose capacity never shrinks below `capacity` (at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            front: CANARY,
            data: Vec::with_capacity(capacity),
            capacity,
            min_capacity: capacity,
            checksum: 0,
            back: CANARY,
            redundant: CANARY,
        }
    }

    /// Number of stored elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current logical capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pushes a value, doubling the capacity when full.
    pub fn push(&mut self, value: T) {
        self.check("push");
        if self.data.len() == self.capacity {
            self.resize(self.capacity * 2);
        }
        self.checksum = self.checksum.wrapping_add(value.byte_sum());
        self.data.push(value);
        self.check("push");
    }

    /// Pops the top value. Popping an empty stack is fatal.
    ///
    /// Use [`try_pop`](Self::try_pop) when emptiness is an expected condition.
    pub fn pop(&mut self) -> T {
        match self.try_pop() {
            Some(value) => value,
            None => self.die("pop", &["pop from an empty stack".to_string()]),
        }
    }

    /// Pops the top value, or returns `None` if the stack is empty.
    pub fn try_pop(&mut self) -> Option<T> {
        self.check("pop");
        let value = self.data.pop()?;
        self.checksum = self.checksum.wrapping_sub(value.byte_sum());
        self.maybe_shrink();
        self.check("pop");
        Some(value)
    }

    /// Returns the top value without removing it.
    pub fn top(&self) -> Option<&T> {
        self.data.last()
    }

    /// Returns the value at `index`, counted from the bottom.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.data.get(index)
    }

    /// Overwrites the value at `index`. Returns `false` if `index` is out of range.
    pub fn set(&mut self, index: usize, value: T) -> bool {
        self.check("set");
        let Some(slot) = self.data.get_mut(index) else {
            return false;
        };
        let old = mem::replace(slot, value);
        let new_sum = self.data[index].byte_sum();
        self.checksum = self
            .checksum
            .wrapping_sub(old.byte_sum())
            .wrapping_add(new_sum);
        self.check("set");
        true
    }

    /// Drops elements above `len`. No-op if the stack is already that short.
    pub fn truncate(&mut self, len: usize) {
        self.check("truncate");
        while self.data.len() > len {
            if let Some(value) = self.data.pop() {
                self.checksum = self.checksum.wrapping_sub(value.byte_sum());
            }
        }
        self.maybe_shrink();
        self.check("truncate");
    }

    /// Elements from bottom to top.
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Moves the contents out, leaving this stack empty and valid.
    pub fn take(&mut self) -> Self {
        self.check("take");
        let empty = Self::with_capacity(self.min_capacity);
        mem::replace(self, empty)
    }

    /// Checks sentinels and recomputes the checksum.
    pub fn verify(&self) -> Result<(), StackFault> {
        match self.faults().into_iter().next() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    fn faults(&self) -> Vec<StackFault> {
        let mut faults = Vec::new();
        if self.front != CANARY {
            faults.push(StackFault::FrontSentinel { found: self.front });
        }
        if self.back != CANARY {
            faults.push(StackFault::BackSentinel { found: self.back });
        }
        if self.redundant != CANARY {
            faults.push(StackFault::RedundantSentinel {
                found: self.redundant,
            });
        }
        let found = self.compute_checksum();
        if found != self.checksum {
            faults.push(StackFault::Checksum {
                expected: self.checksum,
                found,
            });
        }
        faults
    }

    fn compute_checksum(&self) -> u64 {
        self.data
            .iter()
            .fold(0u64, |sum, value| sum.wrapping_add(value.byte_sum()))
    }

    fn check(&self, operation: &str) {
        let faults = self.faults();
        if !faults.is_empty() {
            let lines: Vec<String> = faults.iter().map(ToString::to_string).collect();
            self.die(operation, &lines);
        }
    }

    fn resize(&mut self, capacity: usize) {
        self.check("resize");
        self.capacity = capacity;
        if capacity > self.data.capacity() {
            self.data.reserve_exact(capacity - self.data.len());
        } else {
            self.data.shrink_to(capacity);
        }
    }

    fn maybe_shrink(&mut self) {
        while self.capacity > self.min_capacity && self.data.len() <= self.capacity / 4 {
            self.resize((self.capacity / 2).max(self.min_capacity));
        }
    }

    /// Dumps the stack state and aborts the process.
    fn die(&self, operation: &str, problems: &[String]) -> ! {
        crate::error!(
            "guarded stack failure during {operation} (size {}, capacity {}, checksum {})",
            self.data.len(),
            self.capacity,
            self.checksum
        );
        for problem in problems {
            crate::error!("  {problem}");
        }
        std::process::abort()
    }
}

impl<T: Guarded> Default for GuardedStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Guarded> Clone for GuardedStack<T> {
    fn clone(&self) -> Self {
        self.check("clone");
        let mut data = Vec::with_capacity(self.capacity);
        data.extend(self.data.iter().cloned());
        Self {
            front: CANARY,
            data,
            capacity: self.capacity,
            min_capacity: self.min_capacity,
            checksum: self.checksum,
            back: CANARY,
            redundant: CANARY,
        }
    }
}

use crate::types::guarded_stack::Guarded;

/// Call stack frame created by `CALL` and destroyed by `RET`, `LEAVE` or `ENDFUNC`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Return address (bytecode offset to resume after the call).
    pub return_address: usize,
    /// Value-stack size when the callee was entered. Locals start here, arguments sit
    /// just below it.
    pub base: usize,
    /// Arguments declared by the callee's `FD` header.
    pub arg_count: usize,
    /// Locals declared by the callee's `FD` header.
    pub local_count: usize,
}

impl Frame {
    /// Value-stack size the caller had before pushing the arguments.
    pub fn caller_depth(&self) -> usize {
        self.base - self.arg_count
    }
}

impl Guarded for Frame {
    fn byte_sum(&self) -> u64 {
        self.return_address.byte_sum()
            + self.base.byte_sum()
            + self.arg_count.byte_sum()
            + self.local_count.byte_sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_sum_covers_all_fields() {
        let frame = Frame {
            return_address: 0x0101,
            base: 3,
            arg_count: 1,
            local_count: 0x0200,
        };
        assert_eq!(frame.byte_sum(), 2 + 3 + 1 + 2);
        assert_eq!(frame.caller_depth(), 2);
    }
}

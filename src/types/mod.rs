//! Container types shared by the virtual machine.
//!
//! - `GuardedStack`: LIFO stack with sentinels and a checksum, used for the value stack
//!   and the call-frame stack of the interpreter.

pub mod guarded_stack;

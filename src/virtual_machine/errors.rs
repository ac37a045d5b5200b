use dkvm_derive::Error;

/// Errors raised while assembling, verifying, disassembling or executing bytecode.
#[derive(Debug, Error)]
pub enum VMError {
    // ---------- assembly ----------
    /// Assembly error with source position context. Wraps every other assembly error.
    #[error("line {line}:{column}: {source}")]
    AssemblyError {
        line: usize,
        column: usize,
        source: String,
    },
    /// Unrecognized instruction mnemonic.
    #[error("invalid instruction name: {0}")]
    InvalidInstructionName(String),
    /// Wrong number of source operands.
    #[error("{instruction} expects {expected} operand(s), got {actual}")]
    ArityMismatch {
        instruction: &'static str,
        expected: usize,
        actual: usize,
    },
    /// Label defined more than once.
    #[error("duplicate label: {0}")]
    DuplicateLabel(String),
    /// Reference to an undefined label.
    #[error("undefined label: {0}")]
    UndefinedLabel(String),
    /// Label resolves to the end of the program, where no instruction lives.
    #[error("label {0} does not precede any instruction")]
    DanglingLabel(String),
    /// Jump operand that is not written as `:name`.
    #[error("expected a label reference like :name, got {0}")]
    ExpectedLabel(String),
    /// Label definition line with trailing tokens or an empty name.
    #[error("malformed label definition: {0}")]
    MalformedLabel(String),
    /// Function declared more than once.
    #[error("duplicate function: {0}")]
    DuplicateFunction(String),
    /// Call to an undefined function.
    #[error("undefined function: {0}")]
    UndefinedFunction(String),
    /// FUNC/FD inside another function body.
    #[error("function {0} declared inside another function")]
    NestedFunction(String),
    /// ENDFUNC without an open function.
    #[error("ENDFUNC without a matching FUNC or FD")]
    UnmatchedEndFunc,
    /// Source ended inside a function body.
    #[error("function {0} is missing its ENDFUNC")]
    UnterminatedFunction(String),
    /// Expected a register operand but got something else.
    #[error("invalid register {0}")]
    InvalidRegister(String),
    /// Malformed numeric literal.
    #[error("invalid number {0}")]
    InvalidNumber(String),
    /// Malformed non-negative integer operand.
    #[error("expected a non-negative integer, got {0}")]
    InvalidCount(String),
    /// FD argument or local count above the frame limit.
    #[error("frame size {count} exceeds the limit of {max} slots")]
    FrameTooLarge { count: String, max: usize },
    /// Malformed `[reg+N]` operand.
    #[error("invalid memory operand {0}")]
    InvalidMemoryOperand(String),
    /// Operand form not allowed for this instruction (e.g. `POP 5`).
    #[error("{instruction} cannot take operand {token}")]
    UnsupportedOperand {
        instruction: &'static str,
        token: String,
    },
    /// Unbalanced `[` in a source line.
    #[error("unterminated memory operand")]
    UnterminatedBracket,

    // ---------- bytecode ----------
    /// The artifact does not start with the format signature.
    #[error("bad signature: expected {expected:?}, found {found:?}")]
    BadSignature { expected: String, found: String },
    /// Unknown opcode in bytecode.
    #[error("byte {offset}: invalid instruction {opcode:#04x}")]
    InvalidInstruction { opcode: u8, offset: usize },
    /// Instruction operands run past the end of the stream.
    #[error("byte {offset}: {instruction} needs {expected} bytes, only {available} left")]
    TruncatedInstruction {
        instruction: &'static str,
        offset: usize,
        expected: usize,
        available: usize,
    },
    /// PUSH/POP selector outside {0, 1, 2}.
    #[error("byte {offset}: {instruction} has invalid addressing mode {selector}")]
    InvalidSelector {
        instruction: &'static str,
        offset: usize,
        selector: f64,
    },
    /// Register operand outside the register file.
    #[error("byte {offset}: {instruction} refers to register {index}, which does not exist")]
    InvalidRegisterIndex {
        instruction: &'static str,
        offset: usize,
        index: f64,
    },
    /// RAM reference or DRAW length outside RAM.
    #[error("byte {offset}: {instruction} RAM index {index} out of bounds (size {size})")]
    RamIndexOutOfBounds {
        instruction: &'static str,
        offset: usize,
        index: f64,
        size: usize,
    },
    /// Operand that must be an exact non-negative integer.
    #[error("byte {offset}: {instruction} expected a non-negative integer, got {value}")]
    NotAnInteger {
        instruction: &'static str,
        offset: usize,
        value: f64,
    },
    /// FD header whose argument or local count is above the frame limit.
    #[error("byte {offset}: {instruction} frame size {count} exceeds the limit of {max} slots")]
    FrameSizeOutOfRange {
        instruction: &'static str,
        offset: usize,
        count: f64,
        max: usize,
    },
    /// Code offset outside the program.
    #[error("byte {offset}: {instruction} target {target} is outside the program (length {len})")]
    InvalidTarget {
        instruction: &'static str,
        offset: usize,
        target: f64,
        len: usize,
    },
    /// Jump target inside another instruction's operands.
    #[error("byte {offset}: {instruction} target {target} is not an instruction boundary")]
    MisalignedTarget {
        instruction: &'static str,
        offset: usize,
        target: usize,
    },
    /// CALL target that is not a FUNC or FD header.
    #[error("byte {offset}: CALL target {target} is not a function header")]
    NotAFunction { offset: usize, target: usize },
    /// Artifact could not be decoded.
    #[error("decoding error: {0}")]
    DecodeError(String),

    // ---------- runtime ----------
    /// Pop from an empty value stack. Fatal.
    #[error("byte {ip}: {instruction} popped from an empty stack")]
    StackUnderflow { instruction: &'static str, ip: usize },
    /// Frame instruction executed outside any function call.
    #[error("byte {ip}: {instruction} executed outside a function call")]
    NoActiveFrame { instruction: &'static str, ip: usize },
    /// Local or argument slot outside the current frame.
    #[error("byte {ip}: {instruction} slot {slot} out of range ({available} available)")]
    FrameAccessOutOfBounds {
        instruction: &'static str,
        ip: usize,
        slot: f64,
        available: usize,
    },
    /// Effective RAM address outside RAM.
    #[error("byte {ip}: {instruction} address {address} out of bounds (size {size})")]
    MemoryOutOfBounds {
        instruction: &'static str,
        ip: usize,
        address: f64,
        size: usize,
    },
    /// Instruction pointer left the program.
    #[error("invalid instruction pointer {0}")]
    InvalidIP(usize),
    /// IN read something that is not a number.
    #[error("invalid input {0:?}: expected a number")]
    InvalidInput(String),
    /// IN reached end of input.
    #[error("unexpected end of input")]
    UnexpectedEndOfInput,
    /// DRAW could not produce a bitmap.
    #[error("cannot draw bitmap: {0}")]
    InvalidBitmap(String),

    // ---------- host ----------
    /// File or stream I/O failure.
    #[error("io error: {0}")]
    IoError(String),
    /// Environment variable with an unusable value.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl VMError {
    /// Returns `true` for errors that leave the machine in an undefined state.
    ///
    /// The `proc` tool aborts the process on these after dumping the machine state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VMError::StackUnderflow { .. })
    }

    /// Byte offset of the offending instruction, for errors that have one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            VMError::InvalidInstruction { offset, .. }
            | VMError::TruncatedInstruction { offset, .. }
            | VMError::InvalidSelector { offset, .. }
            | VMError::InvalidRegisterIndex { offset, .. }
            | VMError::RamIndexOutOfBounds { offset, .. }
            | VMError::NotAnInteger { offset, .. }
            | VMError::FrameSizeOutOfRange { offset, .. }
            | VMError::InvalidTarget { offset, .. }
            | VMError::MisalignedTarget { offset, .. }
            | VMError::NotAFunction { offset, .. } => Some(*offset),
            VMError::StackUnderflow { ip, .. }
            | VMError::NoActiveFrame { ip, .. }
            | VMError::FrameAccessOutOfBounds { ip, .. }
            | VMError::MemoryOutOfBounds { ip, .. } => Some(*ip),
            VMError::InvalidIP(ip) => Some(*ip),
            _ => None,
        }
    }
}

impl From<std::io::Error> for VMError {
    fn from(err: std::io::Error) -> Self {
        VMError::IoError(err.to_string())
    }
}

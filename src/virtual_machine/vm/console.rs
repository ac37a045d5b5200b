//! Console seam used by `IN` and `OUT`.

use crate::virtual_machine::errors::VMError;
use std::collections::VecDeque;
use std::io::{self, BufRead, StdinLock, Stdout, Write};

/// Number source and sink for the interpreter.
pub trait Console {
    /// Reads the next whitespace-separated number.
    fn read_number(&mut self) -> Result<f64, VMError>;

    /// Prints a number on its own line with six decimals.
    fn write_number(&mut self, value: f64) -> Result<(), VMError>;
}

/// Console over any buffered reader and writer.
pub struct StreamConsole<R, W> {
    input: R,
    output: W,
    pending: VecDeque<String>,
}

impl<R: BufRead, W: Write> StreamConsole<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            pending: VecDeque::new(),
        }
    }

    pub fn into_parts(self) -> (R, W) {
        (self.input, self.output)
    }
}

/// Console on the process's stdin and stdout.
pub fn stdio() -> StreamConsole<StdinLock<'static>, Stdout> {
    StreamConsole::new(io::stdin().lock(), io::stdout())
}

impl<R: BufRead, W: Write> Console for StreamConsole<R, W> {
    fn read_number(&mut self) -> Result<f64, VMError> {
        loop {
            if let Some(token) = self.pending.pop_front() {
                return token.parse::<f64>().map_err(|_| VMError::InvalidInput(token));
            }
            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Err(VMError::UnexpectedEndOfInput);
            }
            self.pending
                .extend(line.split_whitespace().map(str::to_string));
        }
    }

    /// NaN is written `nan`, or `-nan` when its sign bit is set, as C's `printf` does.
    fn write_number(&mut self, value: f64) -> Result<(), VMError> {
        if value.is_nan() {
            let sign = if value.is_sign_negative() { "-" } else { "" };
            writeln!(self.output, "{sign}nan")?;
        } else {
            writeln!(self.output, "{value:.6}")?;
        }
        self.output.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_numbers_across_lines() {
        let mut console = StreamConsole::new("1 2.5\n\n  -3\n".as_bytes(), Vec::new());
        assert_eq!(console.read_number().unwrap(), 1.0);
        assert_eq!(console.read_number().unwrap(), 2.5);
        assert_eq!(console.read_number().unwrap(), -3.0);
        assert!(matches!(
            console.read_number(),
            Err(VMError::UnexpectedEndOfInput)
        ));
    }

    #[test]
    fn rejects_garbage() {
        let mut console = StreamConsole::new("twelve".as_bytes(), Vec::new());
        assert!(matches!(
            console.read_number(),
            Err(VMError::InvalidInput(token)) if token == "twelve"
        ));
    }

    #[test]
    fn writes_six_decimals() {
        let mut console = StreamConsole::new("".as_bytes(), Vec::new());
        console.write_number(7.0).unwrap();
        console.write_number(10.0 / 3.0).unwrap();
        console.write_number(-0.5).unwrap();
        console.write_number(f64::NAN).unwrap();
        console.write_number(-f64::NAN).unwrap();
        console.write_number(f64::NEG_INFINITY).unwrap();
        let (_, out) = console.into_parts();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "7.000000\n3.333333\n-0.500000\nnan\n-nan\n-inf\n"
        );
    }
}

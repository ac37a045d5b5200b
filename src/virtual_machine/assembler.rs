//! Assembly language parser and bytecode compiler.
//!
//! Converts human-readable assembly source into a bytecode [`Program`].
//! Operand parsing is driven by the operand kinds of the
//! [instruction table](crate::for_each_instruction).
//!
//! # Syntax
//!
//! ```text
//! :loop                 # label for the next instruction
//! PUSH [rax+2]          # operands are separated by spaces (commas optional)
//! FD sum, 2, 1          # function with 2 arguments and 1 local
//! CALL sum              # or CALL :sum
//! JA :loop
//! ```
//!
//! - Instructions are uppercase (e.g., `PUSH`, `GET_LOCAL`)
//! - Registers are `rax`, `rbx`, `rcx`, `rdx`
//! - RAM operands are `[reg+N]`, `[reg]` or `[N]`
//! - Numbers are decimal doubles (e.g., `42`, `-1.5`, `1e3`)
//! - Comments start with `#`
//!
//! Assembly runs three passes over the source: label offsets, function bounds, then
//! emission. Any error aborts with the line and column of the offending token.

use crate::utils::reader::{read_source, with_suffix};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::isa::Instruction;
use crate::virtual_machine::operand::{
    MAX_FRAME_SLOTS, OperandKind, RAM_SIZE, StackOperand, exact_index,
};
use crate::virtual_machine::program::{CODE_START, Program};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

const COMMENT_CHAR: char = '#';
const LABEL_PREFIX: char = ':';

/// Extension appended to assembled files.
pub const ARTIFACT_EXTENSION: &str = "dk";

/// Formats a compiler-style diagnostic for assembly failures.
pub fn render_assembly_diagnostic(file: &str, source: &str, err: &VMError) -> String {
    let VMError::AssemblyError {
        line,
        column,
        source: message,
    } = err
    else {
        return format!("error: {file}: {err}");
    };

    let mut diag = String::new();
    let _ = writeln!(diag, "error: {message}");
    let _ = writeln!(diag, " --> {file}:{line}:{column}");

    if let Some(raw_line) = source.lines().nth(line.saturating_sub(1)) {
        let line_text = raw_line.trim_end_matches('\r');
        let underline = " ".repeat(column.saturating_sub(1));
        let _ = writeln!(diag, "  |");
        let _ = writeln!(diag, "{:>4} | {}", line, line_text);
        let _ = write!(diag, "  | {}^", underline);
    }

    diag
}

/// Function bounds recorded by the second pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionBounds {
    /// Offset of the FUNC/FD header.
    pub entry: usize,
    /// Offset just past the matching ENDFUNC.
    pub end: usize,
}

/// Label and function tables built during assembly.
#[derive(Debug, Default)]
pub struct AsmContext {
    labels: HashMap<String, usize>,
    functions: HashMap<String, FunctionBounds>,
}

impl AsmContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a label at the given artifact offset.
    pub(crate) fn define_label(&mut self, name: &str, offset: usize) -> Result<(), VMError> {
        if self.labels.contains_key(name) {
            return Err(VMError::DuplicateLabel(name.to_string()));
        }
        self.labels.insert(name.to_string(), offset);
        Ok(())
    }

    /// Resolves a label to its artifact offset.
    pub(crate) fn resolve_label(&self, name: &str) -> Result<usize, VMError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| VMError::UndefinedLabel(name.to_string()))
    }

    /// Resolves a function name.
    pub(crate) fn resolve_function(&self, name: &str) -> Result<FunctionBounds, VMError> {
        self.functions
            .get(name)
            .copied()
            .ok_or_else(|| VMError::UndefinedFunction(name.to_string()))
    }
}

#[derive(Debug, Clone)]
struct Token<'a> {
    text: &'a str,
    /// 1-based column in the line.
    column: usize,
}

/// Tokenize a single line of assembly.
///
/// Rules:
/// - `#` starts a comment
/// - commas are ignored
/// - whitespace-separated tokens, except inside `[...]`
fn tokenize(line_no: usize, line: &str) -> Result<Vec<Token<'_>>, VMError> {
    let mut out = Vec::with_capacity(4);

    let mut start: Option<usize> = None;
    let mut in_bracket = false;

    for (i, c) in line.char_indices() {
        if c == COMMENT_CHAR && !in_bracket {
            if let Some(s) = start.take() {
                out.push(Token {
                    text: &line[s..i],
                    column: s + 1,
                });
            }
            return finish(out, in_bracket, line_no, line);
        }

        match c {
            ',' | ' ' | '\t' | '\r' if !in_bracket => {
                if let Some(s) = start.take() {
                    out.push(Token {
                        text: &line[s..i],
                        column: s + 1,
                    });
                }
            }
            _ => {
                if c == '[' {
                    in_bracket = true;
                } else if c == ']' {
                    in_bracket = false;
                }
                if start.is_none() {
                    start = Some(i);
                }
            }
        }
    }

    if let Some(s) = start {
        out.push(Token {
            text: &line[s..],
            column: s + 1,
        });
    }
    finish(out, in_bracket, line_no, line)
}

fn finish<'a>(
    tokens: Vec<Token<'a>>,
    in_bracket: bool,
    line_no: usize,
    line: &str,
) -> Result<Vec<Token<'a>>, VMError> {
    if in_bracket {
        let column = line.rfind('[').map(|i| i + 1).unwrap_or(1);
        return Err(located(line_no, column, VMError::UnterminatedBracket));
    }
    Ok(tokens)
}

fn located(line: usize, column: usize, err: VMError) -> VMError {
    match err {
        VMError::AssemblyError { .. } => err,
        other => VMError::AssemblyError {
            line,
            column,
            source: other.to_string(),
        },
    }
}

/// Parses a non-negative integer within the exact range of a double.
pub(crate) fn parse_count(tok: &str) -> Result<usize, VMError> {
    tok.parse::<f64>()
        .ok()
        .and_then(exact_index)
        .ok_or_else(|| VMError::InvalidCount(tok.to_string()))
}

/// Strips the optional `:` in front of a function name.
fn function_name(tok: &str) -> &str {
    tok.strip_prefix(LABEL_PREFIX).unwrap_or(tok)
}

/// Number of source tokens an instruction takes after its mnemonic.
fn source_arity(instr: Instruction) -> usize {
    instr.operands().iter().filter(|k| k.has_token()).count()
}

/// One instruction line after the first pass.
struct SourceLine<'a> {
    line_no: usize,
    instr: Instruction,
    /// Artifact offset of the opcode.
    offset: usize,
    tokens: Vec<Token<'a>>,
}

impl SourceLine<'_> {
    fn operand_tokens(&self) -> &[Token<'_>] {
        &self.tokens[1..]
    }

    fn mnemonic_column(&self) -> usize {
        self.tokens[0].column
    }
}

/// First pass: tokenizes every line, records labels and instruction offsets.
///
/// Returns the instruction lines and the final artifact length.
fn collect_lines<'a>(
    source: &'a str,
    ctx: &mut AsmContext,
) -> Result<(Vec<SourceLine<'a>>, usize), VMError> {
    let mut lines = Vec::new();
    let mut offset = CODE_START;

    for (index, raw) in source.lines().enumerate() {
        let line_no = index + 1;
        let tokens = tokenize(line_no, raw)?;
        let Some(first) = tokens.first() else {
            continue;
        };

        if let Some(name) = first.text.strip_prefix(LABEL_PREFIX) {
            if name.is_empty() || tokens.len() > 1 {
                let column = tokens.get(1).unwrap_or(first).column;
                return Err(located(
                    line_no,
                    column,
                    VMError::MalformedLabel(raw.trim().to_string()),
                ));
            }
            ctx.define_label(name, offset)
                .map_err(|e| located(line_no, first.column, e))?;
            continue;
        }

        let instr = Instruction::from_mnemonic(first.text).ok_or_else(|| {
            located(
                line_no,
                first.column,
                VMError::InvalidInstructionName(first.text.to_string()),
            )
        })?;
        lines.push(SourceLine {
            line_no,
            instr,
            offset,
            tokens,
        });
        offset += instr.size();
    }

    Ok((lines, offset))
}

/// Second pass: matches FUNC/FD headers with their ENDFUNC.
fn collect_functions(lines: &[SourceLine<'_>], ctx: &mut AsmContext) -> Result<(), VMError> {
    // (name, entry offset, line, column) of the function being scanned
    let mut open: Option<(&str, usize, usize, usize)> = None;

    for line in lines {
        match line.instr {
            Instruction::Func | Instruction::Fd => {
                let Some(tok) = line.operand_tokens().first() else {
                    return Err(located(
                        line.line_no,
                        line.mnemonic_column(),
                        VMError::ArityMismatch {
                            instruction: line.instr.mnemonic(),
                            expected: source_arity(line.instr),
                            actual: 0,
                        },
                    ));
                };
                let name = function_name(tok.text);
                if name.is_empty() {
                    return Err(located(
                        line.line_no,
                        tok.column,
                        VMError::UndefinedFunction(tok.text.to_string()),
                    ));
                }
                if open.is_some() {
                    return Err(located(
                        line.line_no,
                        tok.column,
                        VMError::NestedFunction(name.to_string()),
                    ));
                }
                if ctx.functions.contains_key(name) {
                    return Err(located(
                        line.line_no,
                        tok.column,
                        VMError::DuplicateFunction(name.to_string()),
                    ));
                }
                open = Some((name, line.offset, line.line_no, tok.column));
            }
            Instruction::EndFunc => {
                let Some((name, entry, _, _)) = open.take() else {
                    return Err(located(
                        line.line_no,
                        line.mnemonic_column(),
                        VMError::UnmatchedEndFunc,
                    ));
                };
                let end = line.offset + line.instr.size();
                ctx.functions
                    .insert(name.to_string(), FunctionBounds { entry, end });
            }
            _ => {}
        }
    }

    match open {
        Some((name, _, line_no, column)) => Err(located(
            line_no,
            column,
            VMError::UnterminatedFunction(name.to_string()),
        )),
        None => Ok(()),
    }
}

/// Third pass helper: encodes one instruction line.
fn emit(
    line: &SourceLine<'_>,
    ctx: &AsmContext,
    len: usize,
    out: &mut Vec<u8>,
) -> Result<(), VMError> {
    let instr = line.instr;
    let tokens = line.operand_tokens();
    let expected = source_arity(instr);
    let pop_without_operand = instr == Instruction::Pop && tokens.is_empty();
    if tokens.len() != expected && !pop_without_operand {
        let column = tokens
            .get(expected)
            .map(|t| t.column)
            .unwrap_or(line.mnemonic_column());
        return Err(located(
            line.line_no,
            column,
            VMError::ArityMismatch {
                instruction: instr.mnemonic(),
                expected,
                actual: tokens.len(),
            },
        ));
    }

    out.push(instr.opcode());
    let mut tokens = tokens.iter();
    for kind in instr.operands() {
        if !kind.has_token() {
            continue;
        }
        let tok = tokens.next();
        let column = tok.map(|t| t.column).unwrap_or(line.mnemonic_column());
        let at = |err| located(line.line_no, column, err);

        match kind {
            OperandKind::Mode => {
                let operand = match tok {
                    None => StackOperand::Imm(0.0),
                    Some(tok) => {
                        let operand = StackOperand::parse(tok.text).map_err(at)?;
                        if instr == Instruction::Pop && matches!(operand, StackOperand::Imm(_)) {
                            return Err(at(VMError::UnsupportedOperand {
                                instruction: instr.mnemonic(),
                                token: tok.text.to_string(),
                            }));
                        }
                        operand
                    }
                };
                let (mode, loc) = operand.encode();
                out.extend_from_slice(&mode.to_le_bytes());
                out.extend_from_slice(&loc.to_le_bytes());
            }
            OperandKind::Target => {
                let text = tok.map(|t| t.text).unwrap_or_default();
                let name = text
                    .strip_prefix(LABEL_PREFIX)
                    .ok_or_else(|| at(VMError::ExpectedLabel(text.to_string())))?;
                let target = ctx.resolve_label(name).map_err(at)?;
                if target >= len {
                    return Err(at(VMError::DanglingLabel(name.to_string())));
                }
                out.extend_from_slice(&(target as f64).to_le_bytes());
            }
            OperandKind::Func => {
                let text = tok.map(|t| t.text).unwrap_or_default();
                let bounds = ctx.resolve_function(function_name(text)).map_err(at)?;
                out.extend_from_slice(&(bounds.entry as f64).to_le_bytes());
            }
            OperandKind::End => {
                let text = tok.map(|t| t.text).unwrap_or_default();
                let bounds = ctx.resolve_function(function_name(text)).map_err(at)?;
                out.extend_from_slice(&(bounds.end as f64).to_le_bytes());
            }
            OperandKind::Count | OperandKind::Slot | OperandKind::Len => {
                let text = tok.map(|t| t.text).unwrap_or_default();
                let value = parse_count(text).map_err(at)?;
                if *kind == OperandKind::Len && value >= RAM_SIZE {
                    return Err(at(VMError::RamIndexOutOfBounds {
                        instruction: instr.mnemonic(),
                        offset: line.offset,
                        index: value as f64,
                        size: RAM_SIZE,
                    }));
                }
                out.extend_from_slice(&(value as f64).to_le_bytes());
            }
            OperandKind::FrameSize => {
                let text = tok.map(|t| t.text).unwrap_or_default();
                let value = parse_count(text).map_err(at)?;
                if value > MAX_FRAME_SLOTS {
                    return Err(at(VMError::FrameTooLarge {
                        count: text.to_string(),
                        max: MAX_FRAME_SLOTS,
                    }));
                }
                out.extend_from_slice(&(value as f64).to_le_bytes());
            }
            OperandKind::Loc => {}
        }
    }

    Ok(())
}

/// Assemble a full source string into a program.
pub fn assemble_source(source: &str) -> Result<Program, VMError> {
    let mut ctx = AsmContext::new();
    let (lines, len) = collect_lines(source, &mut ctx)?;
    collect_functions(&lines, &mut ctx)?;

    let mut code = Vec::with_capacity(len - CODE_START);
    for line in &lines {
        emit(line, &ctx, len, &mut code)?;
    }
    debug_assert_eq!(code.len() + CODE_START, len);

    Ok(Program::from_code(&code))
}

/// Assembles `path` into `<path>.dk`, returning the output path.
///
/// The output file is created up front and removed again if assembly fails. A
/// compiler-style diagnostic is logged for assembly errors.
pub fn assemble_file(path: &Path) -> Result<PathBuf, VMError> {
    let source = read_source(path)?;
    let out_path = with_suffix(path, ARTIFACT_EXTENSION);
    let io_error = |err: std::io::Error| VMError::IoError(format!("{}: {err}", out_path.display()));

    let mut file = File::create(&out_path).map_err(io_error)?;
    let result = assemble_source(&source)
        .and_then(|program| file.write_all(program.as_bytes()).map_err(io_error));

    if let Err(err) = result {
        drop(file);
        let _ = fs::remove_file(&out_path);
        crate::error!(
            "{}",
            render_assembly_diagnostic(&path.display().to_string(), &source, &err)
        );
        return Err(err);
    }

    crate::debug!("assembled {} -> {}", path.display(), out_path.display());
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::temp_path;

    fn f(value: f64) -> [u8; 8] {
        value.to_le_bytes()
    }

    fn code(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }

    fn assemble_err(source: &str) -> (usize, usize, String) {
        match assemble_source(source) {
            Err(VMError::AssemblyError {
                line,
                column,
                source,
            }) => (line, column, source),
            other => panic!("expected assembly error, got {other:?}"),
        }
    }

    #[test]
    fn tokenize_splits_on_whitespace_and_commas() {
        let tokens = tokenize(1, "  FD  sum, 2,1 # two args").unwrap();
        let texts: Vec<_> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, ["FD", "sum", "2", "1"]);
        assert_eq!(tokens[0].column, 3);
        assert_eq!(tokens[1].column, 7);
    }

    #[test]
    fn tokenize_keeps_brackets_together() {
        let tokens = tokenize(1, "PUSH [ rax + 2 ]").unwrap();
        let texts: Vec<_> = tokens.iter().map(|t| t.text).collect();
        assert_eq!(texts, ["PUSH", "[ rax + 2 ]"]);
    }

    #[test]
    fn tokenize_comment_directly_after_token() {
        let tokens = tokenize(1, "OUT# print").unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].text, "OUT");
    }

    #[test]
    fn tokenize_unterminated_bracket() {
        assert!(matches!(
            tokenize(4, "PUSH [rax+1"),
            Err(VMError::AssemblyError {
                line: 4,
                column: 6,
                ..
            })
        ));
    }

    #[test]
    fn assemble_empty_source() {
        let program = assemble_source("").unwrap();
        assert!(program.is_empty());
        assert_eq!(program.as_bytes(), b"DK24o5");
    }

    #[test]
    fn assemble_comments_and_blank_lines() {
        let program = assemble_source("# header\n\n   \nEND # done\n").unwrap();
        assert_eq!(program.code(), &[Instruction::End as u8]);
    }

    #[test]
    fn assemble_push_forms() {
        let program = assemble_source("PUSH 2.5\nPUSH rcx\nPUSH [rbx+3]\nPUSH [7]").unwrap();
        let expected = code(&[
            &[Instruction::Push as u8],
            &f(0.0),
            &f(2.5),
            &[Instruction::Push as u8],
            &f(1.0),
            &f(2.0),
            &[Instruction::Push as u8],
            &f(2.0),
            &f(17.0),
            &[Instruction::Push as u8],
            &f(2.0),
            &f(35.0),
        ]);
        assert_eq!(program.code(), expected.as_slice());
    }

    #[test]
    fn assemble_pop_without_operand_discards() {
        let program = assemble_source("POP").unwrap();
        let expected = code(&[&[Instruction::Pop as u8], &f(0.0), &f(0.0)]);
        assert_eq!(program.code(), expected.as_slice());
    }

    #[test]
    fn pop_rejects_immediate() {
        let (line, column, message) = assemble_err("PUSH 1\nPOP 5");
        assert_eq!((line, column), (2, 5));
        assert!(message.contains("POP cannot take operand 5"));
    }

    #[test]
    fn push_requires_operand() {
        let (line, _, message) = assemble_err("PUSH");
        assert_eq!(line, 1);
        assert!(message.contains("expects 1 operand"));
    }

    #[test]
    fn assemble_invalid_instruction() {
        let (line, column, message) = assemble_err("PUSH 1\n  NOP\n");
        assert_eq!((line, column), (2, 3));
        assert!(message.contains("invalid instruction name: NOP"));
    }

    #[test]
    fn mnemonics_are_case_sensitive() {
        let (_, _, message) = assemble_err("push 1");
        assert!(message.contains("invalid instruction name"));
    }

    #[test]
    fn assemble_wrong_arity() {
        let (line, column, message) = assemble_err("ADD 1");
        assert_eq!((line, column), (1, 5));
        assert!(message.contains("ADD expects 0 operand(s), got 1"));
    }

    #[test]
    fn labels_resolve_to_absolute_offsets() {
        // PUSH at 6 (17 bytes), label at 23, JMP at 23
        let program = assemble_source("PUSH 1\n:loop\nJMP :loop\n").unwrap();
        let jmp = &program.code()[17..];
        assert_eq!(jmp[0], Instruction::Jmp as u8);
        assert_eq!(&jmp[1..9], &f(23.0));
    }

    #[test]
    fn forward_label_reference() {
        let program = assemble_source("JMP :end\nOUT\n:end\nEND").unwrap();
        assert_eq!(&program.code()[1..9], &f(16.0));
    }

    #[test]
    fn duplicate_label_error() {
        let (line, _, message) = assemble_err(":a\nEND\n:a\nEND");
        assert_eq!(line, 3);
        assert!(message.contains("duplicate label: a"));
    }

    #[test]
    fn undefined_label_error() {
        let (line, column, message) = assemble_err("END\nJE :nowhere");
        assert_eq!((line, column), (2, 4));
        assert!(message.contains("undefined label: nowhere"));
    }

    #[test]
    fn jump_operand_needs_colon() {
        let (_, _, message) = assemble_err(":x\nJMP x");
        assert!(message.contains("expected a label reference"));
    }

    #[test]
    fn label_at_end_of_program_is_rejected() {
        let (_, _, message) = assemble_err("JMP :end\n:end\n");
        assert!(message.contains("does not precede any instruction"));
    }

    #[test]
    fn malformed_label_lines() {
        let (_, _, message) = assemble_err(":\nEND");
        assert!(message.contains("malformed label"));
        let (line, column, _) = assemble_err(":x OUT");
        assert_eq!((line, column), (1, 4));
    }

    #[test]
    fn function_layout() {
        let source = "\
PUSH 1
CALL inc
END
FUNC inc
INC
RET
ENDFUNC
";
        let program = assemble_source(source).unwrap();
        // PUSH 6..23, CALL 23..32, END 32, FUNC 33..42, INC 42, RET 43, ENDFUNC 44
        let bytes = program.as_bytes();
        assert_eq!(bytes[23], Instruction::Call as u8);
        assert_eq!(&bytes[24..32], &f(33.0));
        assert_eq!(bytes[33], Instruction::Func as u8);
        assert_eq!(&bytes[34..42], &f(45.0));
        assert_eq!(program.len(), 45);
    }

    #[test]
    fn fd_encodes_counts() {
        let program = assemble_source("FD :f, 2, 1\nGET_ARG 1\nRET\nENDFUNC\nCALL :f").unwrap();
        let expected = code(&[
            &[Instruction::Fd as u8],
            &f(42.0),
            &f(2.0),
            &f(1.0),
            &[Instruction::GetArg as u8],
            &f(1.0),
            &[Instruction::Ret as u8],
            &[Instruction::EndFunc as u8],
            &[Instruction::Call as u8],
            &f(6.0),
        ]);
        assert_eq!(program.code(), expected.as_slice());
    }

    #[test]
    fn function_errors() {
        let (line, _, message) = assemble_err("FUNC a\nFUNC b\nENDFUNC\nENDFUNC");
        assert_eq!(line, 2);
        assert!(message.contains("declared inside another function"));

        let (line, _, message) = assemble_err("FUNC a\nENDFUNC\nFUNC a\nENDFUNC");
        assert_eq!(line, 3);
        assert!(message.contains("duplicate function: a"));

        let (line, _, message) = assemble_err("END\nENDFUNC");
        assert_eq!(line, 2);
        assert!(message.contains("ENDFUNC without a matching"));

        let (line, _, message) = assemble_err("END\nFUNC open\nRET");
        assert_eq!(line, 2);
        assert!(message.contains("open is missing its ENDFUNC"));

        let (line, _, message) = assemble_err("CALL ghost");
        assert_eq!(line, 1);
        assert!(message.contains("undefined function: ghost"));
    }

    #[test]
    fn counts_must_be_non_negative_integers() {
        let (_, _, message) = assemble_err("FD f -1 0\nENDFUNC");
        assert!(message.contains("expected a non-negative integer, got -1"));
        let (_, _, message) = assemble_err("GET_LOCAL 0.5");
        assert!(message.contains("0.5"));
        let (_, _, message) = assemble_err("GET_LOCAL 1e300");
        assert!(message.contains("1e300"));
    }

    #[test]
    fn frame_sizes_are_capped() {
        let source = format!("FD f 0 {MAX_FRAME_SLOTS}\nENDFUNC");
        assert!(assemble_source(&source).is_ok());

        let (line, column, message) = assemble_err("FD f 0 4000000000\nENDFUNC");
        assert_eq!((line, column), (1, 8));
        assert_eq!(
            message,
            format!("frame size 4000000000 exceeds the limit of {MAX_FRAME_SLOTS} slots")
        );
        let (_, column, _) = assemble_err("FD f 5000 0\nENDFUNC");
        assert_eq!(column, 6);
    }

    #[test]
    fn draw_length_must_fit_ram() {
        assert!(assemble_source("DRAW 10 10 100").is_ok());
        let (_, _, message) = assemble_err("DRAW 10 10 10000");
        assert!(message.contains("out of bounds"));
    }

    #[test]
    fn diagnostic_points_at_column() {
        let source = "PUSH 1\nJMP :missing\n";
        let err = assemble_source(source).unwrap_err();
        let diag = render_assembly_diagnostic("prog.asm", source, &err);
        assert_eq!(
            diag,
            "error: undefined label: missing\n --> prog.asm:2:5\n  |\n   2 | JMP :missing\n  |     ^"
        );
    }

    #[test]
    fn diagnostic_for_other_errors() {
        let diag = render_assembly_diagnostic("x.asm", "", &VMError::IoError("boom".into()));
        assert_eq!(diag, "error: x.asm: io error: boom");
    }

    #[test]
    fn assemble_file_writes_artifact() {
        let path = temp_path("ok.asm");
        fs::write(&path, "PUSH 3\nPUSH 4\nADD\nOUT\nEND\n").unwrap();
        let out = assemble_file(&path).unwrap();
        assert_eq!(out, with_suffix(&path, "dk"));
        let program = Program::read_from(&out).unwrap();
        assert_eq!(program, assemble_source("PUSH 3\nPUSH 4\nADD\nOUT\nEND").unwrap());
        let _ = fs::remove_file(&path);
        let _ = fs::remove_file(&out);
    }

    #[test]
    fn assemble_file_removes_output_on_error() {
        let path = temp_path("bad.asm");
        fs::write(&path, "PUSH 1\nBOGUS\n").unwrap();
        let out = with_suffix(&path, "dk");
        fs::write(&out, b"stale").unwrap();
        assert!(matches!(
            assemble_file(&path),
            Err(VMError::AssemblyError { line: 2, .. })
        ));
        assert!(!out.exists());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn assemble_missing_file() {
        let path = temp_path("missing.asm");
        assert!(matches!(assemble_file(&path), Err(VMError::IoError(_))));
        assert!(!with_suffix(&path, "dk").exists());
    }
}

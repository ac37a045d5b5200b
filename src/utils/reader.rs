//! Whole-file reads and writes shared by the command-line tools.

use crate::virtual_machine::errors::VMError;
use std::fs;
use std::path::{Path, PathBuf};

fn io_error(path: &Path, err: std::io::Error) -> VMError {
    VMError::IoError(format!("{}: {err}", path.display()))
}

/// Reads a whole file as bytes.
pub fn read_file(path: &Path) -> Result<Vec<u8>, VMError> {
    fs::read(path).map_err(|err| io_error(path, err))
}

/// Reads a whole file as UTF-8 text.
pub fn read_source(path: &Path) -> Result<String, VMError> {
    let bytes = read_file(path)?;
    String::from_utf8(bytes)
        .map_err(|_| VMError::DecodeError(format!("{}: not valid UTF-8", path.display())))
}

/// Writes `bytes` to `path`, replacing any existing file.
pub fn write_file(path: &Path, bytes: &[u8]) -> Result<(), VMError> {
    fs::write(path, bytes).map_err(|err| io_error(path, err))
}

/// Returns `path` with `extension` appended (`prog.asm` -> `prog.asm.dk`).
pub fn with_suffix(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::test_utils::utils::temp_path;

    #[test]
    fn write_then_read() {
        let path = temp_path("reader.bin");
        write_file(&path, b"\x00\x01hello").unwrap();
        assert_eq!(read_file(&path).unwrap(), b"\x00\x01hello");
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn read_missing_file_names_path() {
        let path = temp_path("does-not-exist.asm");
        let err = read_file(&path).unwrap_err();
        assert!(matches!(&err, VMError::IoError(msg) if msg.contains("does-not-exist.asm")));
    }

    #[test]
    fn read_source_rejects_invalid_utf8() {
        let path = temp_path("latin1.asm");
        write_file(&path, &[0x50, 0xff, 0xfe]).unwrap();
        assert!(matches!(read_source(&path), Err(VMError::DecodeError(_))));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn suffix_is_appended() {
        assert_eq!(
            with_suffix(Path::new("dir/prog.asm"), "dk"),
            PathBuf::from("dir/prog.asm.dk")
        );
    }
}

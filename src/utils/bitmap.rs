//! Minimal BMP writer used by the `DRAW` instruction.
//!
//! The output uses the 12-byte OS/2 `BITMAPCOREHEADER`, so the whole header is 26 bytes
//! and pixel data follows immediately. Bits per pixel are derived from the data length:
//! `len * 8 / width / height`.

use crate::utils::reader::write_file;
use crate::virtual_machine::errors::VMError;
use std::path::Path;

/// Size of the file header plus the core info header.
pub const HEADER_SIZE: usize = 26;

/// Size of the info header that follows the 14-byte file header.
const CORE_HEADER_SIZE: u32 = 12;

/// Encodes `data` as a bitmap of `width` x `height` pixels.
pub fn encode_bitmap(width: usize, height: usize, data: &[u8]) -> Result<Vec<u8>, VMError> {
    let width = u16::try_from(width)
        .map_err(|_| VMError::InvalidBitmap(format!("width {width} exceeds {}", u16::MAX)))?;
    let height = u16::try_from(height)
        .map_err(|_| VMError::InvalidBitmap(format!("height {height} exceeds {}", u16::MAX)))?;
    if width == 0 || height == 0 {
        return Err(VMError::InvalidBitmap(format!(
            "empty picture {width}x{height}"
        )));
    }

    let bits_per_pixel = data.len() * 8 / width as usize / height as usize;
    let bits_per_pixel = u16::try_from(bits_per_pixel).map_err(|_| {
        VMError::InvalidBitmap(format!("{bits_per_pixel} bits per pixel is too many"))
    })?;
    let file_size = (data.len() + HEADER_SIZE) as u32;

    let mut out = Vec::with_capacity(HEADER_SIZE + data.len());
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&file_size.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(HEADER_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&CORE_HEADER_SIZE.to_le_bytes());
    out.extend_from_slice(&width.to_le_bytes());
    out.extend_from_slice(&height.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&bits_per_pixel.to_le_bytes());
    out.extend_from_slice(data);
    Ok(out)
}

/// Encodes and writes a bitmap to `path`.
pub fn write_bitmap(path: &Path, width: usize, height: usize, data: &[u8]) -> Result<(), VMError> {
    let bytes = encode_bitmap(width, height, data)?;
    write_file(path, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::reader::read_file;
    use crate::utils::test_utils::utils::temp_path;

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    #[test]
    fn header_layout() {
        let data = [0xAAu8; 12];
        let bmp = encode_bitmap(2, 2, &data).unwrap();

        assert_eq!(&bmp[0..2], b"BM");
        assert_eq!(u32_at(&bmp, 2), 38);
        assert_eq!(u32_at(&bmp, 6), 0);
        assert_eq!(u32_at(&bmp, 10), 26);
        assert_eq!(u32_at(&bmp, 14), 12);
        assert_eq!(u16_at(&bmp, 18), 2);
        assert_eq!(u16_at(&bmp, 20), 2);
        assert_eq!(u16_at(&bmp, 22), 1);
        assert_eq!(u16_at(&bmp, 24), 24);
        assert_eq!(&bmp[26..], &data);
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(matches!(
            encode_bitmap(0, 4, &[1, 2, 3]),
            Err(VMError::InvalidBitmap(_))
        ));
        assert!(matches!(
            encode_bitmap(4, 0, &[]),
            Err(VMError::InvalidBitmap(_))
        ));
    }

    #[test]
    fn rejects_oversized_width() {
        assert!(matches!(
            encode_bitmap(70_000, 1, &[]),
            Err(VMError::InvalidBitmap(_))
        ));
    }

    #[test]
    fn writes_file() {
        let path = temp_path("picture.bmp");
        write_bitmap(&path, 1, 1, &[7, 8, 9]).unwrap();
        let bytes = read_file(&path).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + 3);
        assert_eq!(&bytes[26..], &[7, 8, 9]);
        let _ = std::fs::remove_file(&path);
    }
}

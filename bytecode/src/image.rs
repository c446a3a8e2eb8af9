//! Parsed, validated in-memory representation of a bytecode file.
//!
//! File layout, all words little-endian, tightly packed:
//!
//! ```text
//! i32  string_table_size          (bytes)
//! i32  global_area_size           (machine words)
//! i32  public_count
//! [public_count x (i32, i32)]     (name_offset, code_offset) pairs
//! [string_table_size bytes]       NUL-terminated strings
//! [remainder]                     code section
//! ```

use std::fs;
use std::path::Path;

use log::debug;

use crate::error::{BytecodeError, ImageError};
use crate::op::StrRef;

const HEADER_BYTES: usize = 12;
const PUBLIC_ENTRY_BYTES: usize = 8;

/// The entry symbol the loader resolves to an execution start offset.
pub const ENTRY_SYMBOL: &[u8] = b"main";

/// A loaded bytecode image.
///
/// Owns the raw file bytes; the public table, string table and code
/// section are addressed as validated slices of them.
#[derive(Debug)]
pub struct Image {
    bytes: Vec<u8>,
    string_table_size: usize,
    global_area_size: usize,
    public_count: usize,
    /// Byte offset of the string table within `bytes`.
    strings_at: usize,
    /// Byte offset of the code section within `bytes`.
    code_at: usize,
    entrypoint: usize,
}

impl Image {
    /// Read a bytecode file and validate it.
    pub fn load(path: &Path) -> Result<Image, ImageError> {
        let bytes = fs::read(path)?;
        Image::from_bytes(bytes)
    }

    /// Validate raw image bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Image, ImageError> {
        if bytes.len() < HEADER_BYTES {
            return Err(invalid(format!(
                "truncated header: {} bytes, expected at least {HEADER_BYTES}",
                bytes.len()
            )));
        }

        let string_table_size = read_header_word(&bytes, 0);
        let global_area_size = read_header_word(&bytes, 1);
        let public_count = read_header_word(&bytes, 2);

        if string_table_size < 0 {
            return Err(invalid(format!(
                "negative string table size {string_table_size}"
            )));
        }
        if global_area_size < 0 {
            return Err(invalid(format!(
                "negative global area size {global_area_size}"
            )));
        }
        if public_count < 0 {
            return Err(invalid(format!(
                "negative public symbol count {public_count}"
            )));
        }

        let string_table_size = string_table_size as usize;
        let public_count = public_count as usize;

        let publics_bytes = public_count
            .checked_mul(PUBLIC_ENTRY_BYTES)
            .ok_or_else(|| invalid(format!("public table of {public_count} entries overflows")))?;
        let strings_at = HEADER_BYTES + publics_bytes;
        let code_at = strings_at
            .checked_add(string_table_size)
            .ok_or_else(|| invalid("string table size overflows".to_string()))?;
        if code_at > bytes.len() {
            return Err(invalid(format!(
                "insufficient public or string section: need {code_at} bytes, file has {}",
                bytes.len()
            )));
        }

        let image = Image {
            bytes,
            string_table_size,
            global_area_size: global_area_size as usize,
            public_count,
            strings_at,
            code_at,
            entrypoint: 0,
        };

        let mut entrypoint = None;
        for i in 0..public_count {
            let name_off = image.public_name_offset(i);
            if name_off < 0 || name_off as usize >= string_table_size {
                return Err(invalid(format!(
                    "public symbol {i} names string offset {name_off}, table has {string_table_size} bytes"
                )));
            }
            let name = image
                .string_at(name_off as usize)
                .map_err(|e| invalid(format!("public symbol {i}: {e}")))?;
            if name == ENTRY_SYMBOL {
                // The last entry wins when the symbol is exported twice.
                entrypoint = Some(image.public_code_offset(i));
            }
        }

        let entrypoint = entrypoint.ok_or_else(|| invalid("entrypoint not found".to_string()))?;
        if entrypoint < 0 || entrypoint as usize >= image.code_size() {
            return Err(invalid(format!(
                "entrypoint offset {entrypoint} is out of range for {} bytes of code",
                image.code_size()
            )));
        }

        debug!(
            "image: {} publics, {} string bytes, {} global words, {} code bytes, entry {:#010x}",
            public_count,
            string_table_size,
            image.global_area_size,
            image.code_size(),
            entrypoint
        );

        Ok(Image {
            entrypoint: entrypoint as usize,
            ..image
        })
    }

    /// The code section, read end-to-end from the file.
    pub fn code(&self) -> &[u8] {
        &self.bytes[self.code_at..]
    }

    pub fn code_size(&self) -> usize {
        self.bytes.len() - self.code_at
    }

    /// Code offset of the `main` public symbol.
    pub fn entrypoint(&self) -> usize {
        self.entrypoint
    }

    /// Size of the global region in machine words. The region itself
    /// lives at the bottom of the value stack and starts zeroed.
    pub fn global_area_size(&self) -> usize {
        self.global_area_size
    }

    pub fn string_table_size(&self) -> usize {
        self.string_table_size
    }

    pub fn public_count(&self) -> usize {
        self.public_count
    }

    /// The NUL-terminated string starting at `offset`, without the NUL.
    pub fn string_at(&self, offset: usize) -> Result<&[u8], BytecodeError> {
        if offset > self.string_table_size {
            return Err(BytecodeError::StringOutOfBounds {
                offset: offset as i64,
                table_size: self.string_table_size,
            });
        }
        let table = &self.bytes[self.strings_at..self.code_at];
        let rest = &table[offset..];
        match rest.iter().position(|&b| b == 0) {
            Some(nul) => Ok(&rest[..nul]),
            None => Err(BytecodeError::UnterminatedString { offset }),
        }
    }

    /// Resolve a string reference produced by the decoder.
    pub fn str_bytes(&self, s: StrRef) -> Result<&[u8], BytecodeError> {
        self.string_at(s.offset())
    }

    /// Name of public symbol `i`.
    pub fn public_name(&self, i: usize) -> Result<&[u8], BytecodeError> {
        self.check_public_index(i)?;
        self.string_at(self.public_name_offset(i) as usize)
    }

    /// Code offset of public symbol `i`.
    pub fn public_offset(&self, i: usize) -> Result<usize, BytecodeError> {
        self.check_public_index(i)?;
        Ok(self.public_code_offset(i) as usize)
    }

    /// Code offsets of all public symbols, in table order.
    pub fn public_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.public_count).map(|i| self.public_code_offset(i) as usize)
    }

    fn check_public_index(&self, i: usize) -> Result<(), BytecodeError> {
        if i >= self.public_count {
            return Err(BytecodeError::BadPublicIndex {
                index: i,
                count: self.public_count,
            });
        }
        Ok(())
    }

    fn public_name_offset(&self, i: usize) -> i32 {
        self.public_word(2 * i)
    }

    fn public_code_offset(&self, i: usize) -> i32 {
        self.public_word(2 * i + 1)
    }

    fn public_word(&self, word: usize) -> i32 {
        let at = HEADER_BYTES + word * 4;
        i32::from_le_bytes(self.bytes[at..at + 4].try_into().expect("4-byte slice"))
    }
}

fn read_header_word(bytes: &[u8], word: usize) -> i32 {
    let at = word * 4;
    i32::from_le_bytes(bytes[at..at + 4].try_into().expect("4-byte slice"))
}

fn invalid(reason: String) -> ImageError {
    ImageError::Invalid(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;

    use std::io::Write;

    fn minimal() -> Vec<u8> {
        let mut b = ImageBuilder::new();
        b.public("main", 0);
        b.stop();
        b.build()
    }

    #[test]
    fn loads_minimal_image() {
        let image = Image::from_bytes(minimal()).expect("valid image");
        assert_eq!(image.entrypoint(), 0);
        assert_eq!(image.code(), &[0xF0]);
        assert_eq!(image.global_area_size(), 0);
        assert_eq!(image.public_name(0).unwrap(), b"main");
        assert_eq!(image.public_offset(0).unwrap(), 0);
    }

    #[test]
    fn loads_from_a_real_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(&minimal()).expect("write image");
        let image = Image::load(file.path()).expect("load image");
        assert_eq!(image.entrypoint(), 0);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Image::load(Path::new("/definitely/not/here.bc")).unwrap_err();
        assert_eq!(err.kind(), "IOError");
    }

    #[test]
    fn truncated_header_is_rejected() {
        let err = Image::from_bytes(vec![1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), "InvalidImage");
    }

    #[test]
    fn negative_sizes_are_rejected() {
        for word in 0..3 {
            let mut bytes = minimal();
            bytes[word * 4..word * 4 + 4].copy_from_slice(&(-1i32).to_le_bytes());
            let err = Image::from_bytes(bytes).unwrap_err();
            assert_eq!(err.kind(), "InvalidImage", "header word {word}");
        }
    }

    #[test]
    fn oversized_sections_are_rejected() {
        let mut bytes = minimal();
        // Claim a string table far larger than the file.
        bytes[0..4].copy_from_slice(&1_000_000i32.to_le_bytes());
        assert!(Image::from_bytes(bytes).is_err());
    }

    #[test]
    fn missing_entrypoint_is_rejected() {
        let mut b = ImageBuilder::new();
        b.public("helper", 0);
        b.stop();
        let err = Image::from_bytes(b.build()).unwrap_err();
        assert!(err.to_string().contains("entrypoint"));
    }

    #[test]
    fn entrypoint_outside_code_is_rejected() {
        let mut b = ImageBuilder::new();
        b.public("main", 9);
        b.stop();
        assert!(Image::from_bytes(b.build()).is_err());
    }

    #[test]
    fn last_duplicate_entry_symbol_wins() {
        let mut b = ImageBuilder::new();
        b.public("main", 0);
        b.public("main", 1);
        b.drop_top();
        b.stop();
        let image = Image::from_bytes(b.build()).expect("valid image");
        assert_eq!(image.entrypoint(), 1);
    }

    #[test]
    fn string_lookup_is_bounds_checked() {
        let image = Image::from_bytes(minimal()).expect("valid image");
        assert_eq!(image.string_at(0).unwrap(), b"main");
        assert!(matches!(
            image.string_at(1000),
            Err(BytecodeError::StringOutOfBounds { .. })
        ));
    }

    #[test]
    fn public_lookup_is_bounds_checked() {
        let image = Image::from_bytes(minimal()).expect("valid image");
        assert!(matches!(
            image.public_name(5),
            Err(BytecodeError::BadPublicIndex { .. })
        ));
    }

    #[test]
    fn public_name_offsets_are_validated_at_load() {
        let mut bytes = minimal();
        // Point the public name outside the string table.
        bytes[HEADER_BYTES..HEADER_BYTES + 4].copy_from_slice(&100i32.to_le_bytes());
        assert!(Image::from_bytes(bytes).is_err());
    }
}

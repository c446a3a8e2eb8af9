//! Streaming cursor over an image's code section.
//!
//! Every read is bounds-checked against the code section; a violation is
//! a fatal [`BytecodeError`]. The one-past-end offset is a valid jump
//! target so the outermost return can land there as a completion
//! sentinel, but nothing can be read from it.

use crate::error::BytecodeError;
use crate::image::Image;
use crate::op::{Loc, LocKind, StrRef};

#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    image: &'a Image,
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// A cursor at the start of the code section.
    pub fn new(image: &'a Image) -> Self {
        Cursor { image, pos: 0 }
    }

    /// A cursor at `offset`, which must not lie past the end of code.
    pub fn at(image: &'a Image, offset: usize) -> Result<Self, BytecodeError> {
        if offset > image.code_size() {
            return Err(BytecodeError::OutOfBounds {
                offset,
                len: image.code_size(),
            });
        }
        Ok(Cursor { image, pos: offset })
    }

    pub fn image(&self) -> &'a Image {
        self.image
    }

    /// Current byte offset within the code section.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Move to an absolute code offset. The one-past-end offset is
    /// allowed as the completion sentinel.
    pub fn jump(&mut self, target: i64) -> Result<(), BytecodeError> {
        let len = self.image.code_size();
        if target < 0 || target > len as i64 {
            return Err(BytecodeError::BadJumpTarget { target, len });
        }
        self.pos = target as usize;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, BytecodeError> {
        let code = self.image.code();
        let byte = *code.get(self.pos).ok_or(BytecodeError::OutOfBounds {
            offset: self.pos,
            len: code.len(),
        })?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_i32(&mut self) -> Result<i32, BytecodeError> {
        let code = self.image.code();
        let bytes = code
            .get(self.pos..self.pos + 4)
            .ok_or(BytecodeError::OutOfBounds {
                offset: self.pos,
                len: code.len(),
            })?;
        self.pos += 4;
        Ok(i32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    /// Read a string-table offset and validate its range.
    pub fn read_str(&mut self) -> Result<StrRef, BytecodeError> {
        let offset = self.read_i32()?;
        let table_size = self.image.string_table_size();
        if offset < 0 || offset as usize > table_size {
            return Err(BytecodeError::StringOutOfBounds {
                offset: offset as i64,
                table_size,
            });
        }
        Ok(StrRef(offset as u32))
    }

    /// Read a location descriptor whose kind byte has already been
    /// consumed (the low opcode nibble, or a byte of a capture list).
    pub fn read_loc(&mut self, kind_byte: u8) -> Result<Loc, BytecodeError> {
        let at = self.pos;
        let index = self.read_i32()?;
        let kind = LocKind::from_byte(kind_byte).ok_or(BytecodeError::BadLocKind {
            kind: kind_byte,
            offset: at,
        })?;
        Ok(Loc { kind, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ImageBuilder;

    fn image_with_code(code: &[u8]) -> Image {
        let mut b = ImageBuilder::new();
        b.public("main", 0);
        b.emit(code);
        Image::from_bytes(b.build()).expect("valid image")
    }

    #[test]
    fn reads_bytes_and_words() {
        let image = image_with_code(&[0xAB, 0x2A, 0x00, 0x00, 0x00, 0xF0]);
        let mut cur = Cursor::new(&image);
        assert_eq!(cur.read_u8().unwrap(), 0xAB);
        assert_eq!(cur.read_i32().unwrap(), 42);
        assert_eq!(cur.offset(), 5);
    }

    #[test]
    fn read_past_end_is_out_of_bounds() {
        let image = image_with_code(&[0xF0]);
        let mut cur = Cursor::new(&image);
        cur.read_u8().unwrap();
        assert!(matches!(
            cur.read_u8(),
            Err(BytecodeError::OutOfBounds { .. })
        ));
        // A 4-byte read near the end fails without advancing.
        let mut cur = Cursor::new(&image);
        assert!(cur.read_i32().is_err());
        assert_eq!(cur.offset(), 0);
    }

    #[test]
    fn jump_accepts_the_sentinel_and_rejects_beyond() {
        let image = image_with_code(&[0xF0, 0xF0]);
        let mut cur = Cursor::new(&image);
        cur.jump(2).expect("one-past-end is the completion sentinel");
        assert!(cur.jump(3).is_err());
        assert!(cur.jump(-1).is_err());
    }

    #[test]
    fn cursor_at_is_bounds_checked() {
        let image = image_with_code(&[0xF0]);
        assert!(Cursor::at(&image, 1).is_ok());
        assert!(Cursor::at(&image, 2).is_err());
    }

    #[test]
    fn read_str_validates_the_table_range() {
        let image = image_with_code(&[0xFF, 0xFF, 0xFF, 0x7F, 0xF0]);
        let mut cur = Cursor::new(&image);
        assert!(matches!(
            cur.read_str(),
            Err(BytecodeError::StringOutOfBounds { .. })
        ));
    }

    #[test]
    fn read_loc_rejects_unknown_kinds() {
        let image = image_with_code(&[0x01, 0x00, 0x00, 0x00, 0xF0]);
        let mut cur = Cursor::new(&image);
        let loc = cur.read_loc(2).unwrap();
        assert_eq!(loc.kind, LocKind::Arg);
        assert_eq!(loc.index, 1);

        let mut cur = Cursor::new(&image);
        assert!(matches!(
            cur.read_loc(9),
            Err(BytecodeError::BadLocKind { kind: 9, .. })
        ));
    }
}

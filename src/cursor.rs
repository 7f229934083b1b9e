use byteorder::{ByteOrder, LittleEndian};

use crate::consts;
use crate::error::Result;

/// A little-endian reader over an in-memory volume.  Every read that would
/// run past the end of the buffer fails with `Error::CorruptHeader`.
pub(crate) struct ByteCursor<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> ByteCursor<'a> {
        ByteCursor { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            corrupt_header!(
                "Offset 0x{:x} is past the end of the volume ({} bytes)",
                position,
                self.data.len()
            );
        }
        self.position = position;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.take(count).map(|_| ())
    }

    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let end = match self.position.checked_add(count) {
            Some(end) if end <= self.data.len() => end,
            _ => corrupt_header!(
                "Unexpected end of volume reading {} bytes at offset 0x{:x} \
                 (volume is {} bytes)",
                count,
                self.position,
                self.data.len()
            ),
        };
        let bytes = &self.data[self.position..end];
        self.position = end;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    /// Reads bytes up to (and consumes) the next NUL byte.  The terminator is
    /// not included in the result.
    pub fn read_null_terminated(&mut self) -> Result<&'a [u8]> {
        let rest = &self.data[self.position..];
        let length = match rest.iter().position(|&byte| byte == 0) {
            Some(length) => length,
            None => corrupt_header!(
                "Unterminated string at offset 0x{:x}",
                self.position
            ),
        };
        if length > consts::MAX_STRING_SIZE {
            corrupt_header!(
                "String longer than maximum of {} bytes",
                consts::MAX_STRING_SIZE
            );
        }
        let bytes = &rest[..length];
        self.position += length + 1;
        Ok(bytes)
    }

    /// Reads a NUL-terminated string, decoding it as UTF-8 when `is_utf8` is
    /// set and as Latin-1 otherwise.
    pub fn read_string(&mut self, is_utf8: bool) -> Result<String> {
        let bytes = self.read_null_terminated()?;
        if is_utf8 {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        } else {
            Ok(bytes.iter().map(|&byte| byte as char).collect())
        }
    }
}

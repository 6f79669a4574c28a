//! Sequential bytecode reader (component F decode side).
//!
//! A thin cursor over a [`Code`]'s bytes, matching spec §6's wire format:
//! big-endian ints/doubles, NUL-terminated strings. Every fetch can fail with
//! [`RuntimeError::TruncatedBytecode`] or [`RuntimeError::StringNotTerminated`]
//! if the stream ends mid-operand.

use crate::error::RuntimeError;

pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn set_pos(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn is_at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn read_u8(&mut self) -> Result<u8, RuntimeError> {
        let byte = *self.bytes.get(self.pos).ok_or(RuntimeError::TruncatedBytecode)?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_i32(&mut self) -> Result<i32, RuntimeError> {
        let slice = self.bytes.get(self.pos..self.pos + 4).ok_or(RuntimeError::TruncatedBytecode)?;
        self.pos += 4;
        Ok(i32::from_be_bytes(slice.try_into().expect("slice is exactly 4 bytes")))
    }

    pub fn read_u32(&mut self) -> Result<u32, RuntimeError> {
        let slice = self.bytes.get(self.pos..self.pos + 4).ok_or(RuntimeError::TruncatedBytecode)?;
        self.pos += 4;
        Ok(u32::from_be_bytes(slice.try_into().expect("slice is exactly 4 bytes")))
    }

    pub fn read_f64(&mut self) -> Result<f64, RuntimeError> {
        let slice = self.bytes.get(self.pos..self.pos + 8).ok_or(RuntimeError::TruncatedBytecode)?;
        self.pos += 8;
        Ok(f64::from_be_bytes(slice.try_into().expect("slice is exactly 8 bytes")))
    }

    /// Reads a raw `0x00`-terminated byte string, returning it lossily
    /// converted to UTF-8 (DM source text is ASCII-safe in practice; a
    /// strict round-trip encoding is out of scope here).
    pub fn read_string(&mut self) -> Result<String, RuntimeError> {
        let start = self.pos;
        loop {
            let byte = *self.bytes.get(self.pos).ok_or(RuntimeError::StringNotTerminated)?;
            self.pos += 1;
            if byte == 0 {
                return Ok(String::from_utf8_lossy(&self.bytes[start..self.pos - 1]).into_owned());
            }
        }
    }

    /// Reads `FormatString`'s length-prefixed raw template. Unlike
    /// [`Reader::read_string`], this can't use a `0x00` terminator: a
    /// sentinel's `FormatKind` tag byte legitimately is `0x00`.
    pub fn read_format_template(&mut self) -> Result<Vec<u8>, RuntimeError> {
        let len = self.read_i32()?.max(0) as usize;
        let slice = self.bytes.get(self.pos..self.pos + len).ok_or(RuntimeError::TruncatedBytecode)?;
        self.pos += len;
        Ok(slice.to_vec())
    }
}

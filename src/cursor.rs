//! Sequential readers and writers over byte buffers.
//!
//! [`ByteReader`](struct.ByteReader.html) walks a borrowed slice, and every read advances its
//! offset. [`ByteWriter`](struct.ByteWriter.html) appends to an owned buffer, and can patch
//! fixed-width values that were reserved earlier (chunk lengths are only known after the chunk
//! body has been written).
//!
//! Integers are big-endian, as everywhere in a Standard Midi File. Variable-length quantities
//! (VLQ) use 7 bits per byte, most significant group first, with the top bit of every byte
//! except the last one set.

use crate::prelude::*;

/// The maximum amount of bytes a variable-length quantity may occupy.
const VLQ_MAX_BYTES: usize = 4;

/// A positional reader over a byte slice.
#[derive(Copy, Clone, Debug)]
pub struct ByteReader<'a> {
    raw: &'a [u8],
    pos: usize,
    /// Absolute offset of `raw[0]` within the outermost buffer, so that sub-readers report
    /// offsets relative to the whole file.
    base: usize,
}
impl<'a> ByteReader<'a> {
    /// Create a reader positioned at the start of `raw`.
    #[inline]
    pub fn new(raw: &'a [u8]) -> ByteReader<'a> {
        ByteReader {
            raw,
            pos: 0,
            base: 0,
        }
    }

    /// Absolute offset of the next byte to be read.
    #[inline]
    pub fn position(&self) -> usize {
        self.base + self.pos
    }

    /// Amount of bytes left to read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.raw.len() - self.pos
    }

    /// Whether every byte has been consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread bytes.
    #[inline]
    pub fn unread(&self) -> &'a [u8] {
        &self.raw[self.pos..]
    }

    /// Look at the next byte without consuming it.
    #[inline]
    pub fn peek_u8(&self) -> Option<u8> {
        self.raw.get(self.pos).copied()
    }

    /// Step back `n` bytes.
    ///
    /// Rewinding past the start of the reader clamps to the start.
    #[inline]
    pub fn rewind(&mut self, n: usize) {
        self.pos = self.pos.saturating_sub(n);
    }

    fn truncated(&self, what: &'static str) -> Error {
        Error::at(self.position(), ErrorKind::TruncatedInput(what))
    }

    /// Consume the next `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(self.truncated("raw bytes"));
        }
        let bytes = &self.raw[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    /// Split off the next `n` bytes into their own reader, advancing past them.
    ///
    /// Offsets reported by the sub-reader stay relative to the outermost buffer.
    pub fn split_off(&mut self, n: usize) -> Result<ByteReader<'a>> {
        let base = self.position();
        let raw = self
            .read_bytes(n)
            .map_err(|_| self.truncated("chunk body"))?;
        Ok(ByteReader { raw, pos: 0, base })
    }

    /// Decode the next `n` bytes as text.
    ///
    /// Invalid UTF-8 sequences are replaced rather than rejected, since MIDI files routinely
    /// carry Latin-1 or Shift-JIS text.
    pub fn read_fixed_text(&mut self, n: usize) -> Result<String> {
        let bytes = self.read_bytes(n).map_err(|_| self.truncated("text"))?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Read a big-endian unsigned integer spanning the next `n` bytes, with `n` in `1..=4`.
    pub fn read_uint(&mut self, n: usize) -> Result<u32> {
        debug_assert!((1..=4).contains(&n), "integer width out of range");
        let bytes = self
            .read_bytes(n)
            .map_err(|_| self.truncated("the expected integer"))?;
        Ok(bytes
            .iter()
            .fold(0u32, |acc, byte| acc << 8 | u32::from(*byte)))
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_uint(1)? as u8)
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(self.read_uint(2)? as u16)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_uint(4)
    }

    /// Read a variable-length quantity.
    ///
    /// At most 4 bytes are accepted, giving a 28-bit result. A fifth continuation byte is a
    /// `MalformedVlq` error.
    pub fn read_vlq(&mut self) -> Result<u28> {
        let start = self.position();
        let mut int: u32 = 0;
        for _ in 0..VLQ_MAX_BYTES {
            let byte = match self.peek_u8() {
                Some(byte) => byte,
                None => return Err(self.truncated("variable-length quantity")),
            };
            self.pos += 1;
            int = int << 7 | u32::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                //At most 4 groups of 7 bits were read, so this fits in 28 bits
                return Ok(u28::from(int));
            }
        }
        Err(Error::at(start, ErrorKind::MalformedVlq))
    }
}

/// An appending writer over an owned byte buffer.
#[derive(Clone, Debug, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}
impl ByteWriter {
    #[inline]
    pub fn new() -> ByteWriter {
        ByteWriter { buf: Vec::new() }
    }

    #[inline]
    pub fn with_capacity(cap: usize) -> ByteWriter {
        ByteWriter {
            buf: Vec::with_capacity(cap),
        }
    }

    /// Amount of bytes written so far, which is also the offset of the next byte.
    #[inline]
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    #[inline]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write the raw bytes of `text`. The caller decides how many bytes this occupies.
    #[inline]
    pub fn write_fixed_text(&mut self, text: &str) {
        self.write_bytes(text.as_bytes());
    }

    /// Write the low `n` bytes of `value` in big-endian order, with `n` in `1..=4`.
    ///
    /// Bits above the `n` lowest bytes are discarded.
    pub fn write_uint(&mut self, n: usize, value: u32) {
        debug_assert!((1..=4).contains(&n), "integer width out of range");
        self.write_bytes(&value.to_be_bytes()[4 - n..]);
    }

    /// Write a variable-length quantity.
    ///
    /// Values that do not fit in 28 bits cannot be represented and produce an `InvalidInput`
    /// error without writing anything.
    pub fn write_vlq(&mut self, value: u32) -> Result<()> {
        let int = u28::try_from(value)
            .ok_or(ErrorKind::InvalidInput("variable-length quantity exceeds 28 bits"))?
            .as_int();
        let mut skipping = true;
        for i in (0..VLQ_MAX_BYTES as u32).rev() {
            let byte = ((int >> (i * 7)) & 0x7F) as u8;
            if skipping && byte == 0 && i != 0 {
                //Skip these leading zeros
            } else {
                skipping = false;
                let byte = if i == 0 { byte } else { byte | 0x80 };
                self.buf.push(byte);
            }
        }
        Ok(())
    }

    /// Overwrite a big-endian `u32` previously reserved at `pos`.
    pub(crate) fn patch_u32(&mut self, pos: usize, value: u32) -> Result<()> {
        let out = self
            .buf
            .get_mut(pos..pos + 4)
            .ok_or(ErrorKind::InvalidInput("invalid seekback"))?;
        out.copy_from_slice(&value.to_be_bytes());
        Ok(())
    }
}

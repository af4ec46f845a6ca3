//! LZ4 block decoder.

use std::io::{self, Read};

use super::{BACK_REFERENCE_SIZE_MASK, MIN_BACK_REFERENCE_LENGTH, SIZE_BITS};

/// A reader decoding the LZ4 *block* format.
///
/// Decodes pair by pair: token, extended lengths, literals, two-byte
/// little-endian offset, match copy (overlap-safe). The final pair of a
/// block carries literals only; the stream simply ends after them.
pub struct BlockLz4Reader<R: Read> {
    inner: R,
    /// Decoded output; doubles as the match window.
    buffer: Vec<u8>,
    /// How much of `buffer` has been handed to the caller.
    read_pos: usize,
    finished: bool,
}

impl<R: Read> BlockLz4Reader<R> {
    /// Creates a decoder over a compressed block.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            read_pos: 0,
            finished: false,
        }
    }

    /// Decodes the next pair into the buffer. Returns false at the end of
    /// the block.
    fn decode_pair(&mut self) -> io::Result<bool> {
        // EOF at a pair boundary is the end of the block.
        let token = match self.read_u8_opt()? {
            Some(token) => token,
            None => return Ok(false),
        };

        let mut literal_length = (token >> SIZE_BITS) as usize;
        if literal_length == BACK_REFERENCE_SIZE_MASK {
            literal_length += self.read_extended_length()?;
        }
        if literal_length > 0 {
            let start = self.buffer.len();
            self.buffer.resize(start + literal_length, 0);
            self.inner.read_exact(&mut self.buffer[start..])?;
        }

        // The final pair has no back-reference; the block ends after its
        // literals.
        let offset_low = match self.read_u8_opt()? {
            Some(byte) => byte,
            None => return Ok(false),
        };
        let offset_high = self.read_u8()?;
        let offset = u16::from_le_bytes([offset_low, offset_high]) as usize;
        if offset == 0 || offset > self.buffer.len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("invalid back-reference offset {}", offset),
            ));
        }

        let mut br_length = (token as usize) & BACK_REFERENCE_SIZE_MASK;
        if br_length == BACK_REFERENCE_SIZE_MASK {
            br_length += self.read_extended_length()?;
        }
        br_length += MIN_BACK_REFERENCE_LENGTH;

        // Byte-wise copy handles overlapping references.
        let start = self.buffer.len() - offset;
        for i in 0..br_length {
            let byte = self.buffer[start + i];
            self.buffer.push(byte);
        }
        Ok(true)
    }

    /// Reads the 255-continuation length extension.
    fn read_extended_length(&mut self) -> io::Result<usize> {
        let mut length = 0usize;
        loop {
            let byte = self.read_u8()?;
            length += byte as usize;
            if byte != 255 {
                return Ok(length);
            }
        }
    }

    fn read_u8(&mut self) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        self.inner.read_exact(&mut byte)?;
        Ok(byte[0])
    }

    fn read_u8_opt(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(byte[0])),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }
}

impl<R: Read> Read for BlockLz4Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.read_pos == self.buffer.len() {
            if self.finished {
                return Ok(0);
            }
            if !self.decode_pair()? {
                self.finished = true;
            }
        }
        let available = self.buffer.len() - self.read_pos;
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        Ok(n)
    }
}

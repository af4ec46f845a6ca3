//! LZMA and LZMA2 decoders.

use std::io::{self, Read};

use crate::{Error, Result};

use super::{method, Decoder};

/// LZMA decoder.
pub struct LzmaDecoder<R> {
    inner: lzma_rust2::LzmaReader<R>,
}

impl<R> std::fmt::Debug for LzmaDecoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LzmaDecoder").finish_non_exhaustive()
    }
}

impl<R: Read> LzmaDecoder<R> {
    /// Creates a new LZMA decoder.
    ///
    /// `properties` are the 5 coder property bytes from the folder: one
    /// lc/lp/pb byte followed by the little-endian dictionary size.
    pub fn new(input: R, properties: &[u8], uncompressed_size: u64) -> Result<Self> {
        if properties.len() < 5 {
            return Err(Error::corrupt(
                0,
                "LZMA properties too short (need 5 bytes)",
            ));
        }
        let props_byte = properties[0];
        let dict_size = u32::from_le_bytes(properties[1..5].try_into().unwrap());

        let reader = lzma_rust2::LzmaReader::new_with_props(
            input,
            uncompressed_size,
            props_byte,
            dict_size,
            None,
        )
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e.to_string())))?;

        Ok(Self { inner: reader })
    }
}

impl<R: Read> Read for LzmaDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> Decoder for LzmaDecoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA
    }
}

/// LZMA2 decoder.
pub struct Lzma2Decoder<R> {
    inner: lzma_rust2::Lzma2Reader<R>,
}

impl<R> std::fmt::Debug for Lzma2Decoder<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lzma2Decoder").finish_non_exhaustive()
    }
}

impl<R: Read> Lzma2Decoder<R> {
    /// Creates a new LZMA2 decoder.
    ///
    /// `properties` is the single byte encoding the dictionary size.
    pub fn new(input: R, properties: &[u8]) -> Result<Self> {
        let &dict_byte = properties
            .first()
            .ok_or_else(|| Error::corrupt(0, "LZMA2 properties missing"))?;
        let dict_size = decode_dict_size(dict_byte)?;
        Ok(Self {
            inner: lzma_rust2::Lzma2Reader::new(input, dict_size, None),
        })
    }
}

impl<R: Read> Read for Lzma2Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> Decoder for Lzma2Decoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::LZMA2
    }
}

/// Decodes the LZMA2 dictionary-size byte: `2 or 3 << (11 + bits/2)`,
/// with 40 meaning 4 GiB - 1.
fn decode_dict_size(byte: u8) -> Result<u32> {
    let bits = byte & 0x3F;
    if bits > 40 {
        return Err(Error::corrupt(0, "invalid LZMA2 dictionary size"));
    }
    if bits == 40 {
        return Ok(u32::MAX);
    }
    let base = 2 | (bits as u32 & 1);
    Ok(base << (bits / 2 + 11))
}

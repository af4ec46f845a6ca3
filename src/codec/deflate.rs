//! Deflate decoder.

use std::io::{self, BufReader, Read};

use flate2::bufread::DeflateDecoder as FlateDecoder;

use super::{method, Decoder};

/// Raw-deflate decoder as used inside 7z folders.
pub struct DeflateDecoder<R: Read> {
    inner: FlateDecoder<BufReader<R>>,
}

impl<R: Read> DeflateDecoder<R> {
    /// Creates a new deflate decoder.
    pub fn new(input: R) -> Self {
        Self {
            inner: FlateDecoder::new(BufReader::new(input)),
        }
    }
}

impl<R: Read> Read for DeflateDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read> Decoder for DeflateDecoder<R> {
    fn method_id(&self) -> &'static [u8] {
        method::DEFLATE
    }
}

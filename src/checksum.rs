//! CRC-32 computation and verification.
//!
//! 7z archives protect headers, pack streams, folders and entries with
//! CRC-32 using the IEEE 802.3 polynomial (the same checksum as ZIP and
//! Ethernet). This module wraps [`crc32fast`] with an incremental calculator
//! and a verifying reader shim used inside decoder stacks.

use std::io::{self, Read};

use crate::error::into_io_error;
use crate::Error;

/// Incremental CRC-32 calculator (IEEE 802.3 polynomial).
///
/// # Example
///
/// ```rust
/// use sieben::checksum::Crc32;
///
/// let mut crc = Crc32::new();
/// crc.update(b"Hello, ");
/// crc.update(b"World!");
/// assert_eq!(crc.finalize(), 0xEC4AC3D0);
///
/// assert_eq!(Crc32::compute(b"Hello, World!"), 0xEC4AC3D0);
/// ```
#[derive(Clone, Default)]
pub struct Crc32 {
    hasher: crc32fast::Hasher,
}

impl Crc32 {
    /// Creates a new calculator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds more data into the checksum.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Returns the checksum of everything fed so far.
    ///
    /// The calculator can keep accepting data afterwards.
    pub fn finalize(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    /// Resets to the initial state.
    pub fn reset(&mut self) {
        self.hasher.reset();
    }

    /// Computes the checksum of a slice in one call.
    pub fn compute(data: &[u8]) -> u32 {
        crc32fast::hash(data)
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32")
            .field("current", &self.finalize())
            .finish()
    }
}

/// A reader that enforces an exact byte count and an expected CRC-32.
///
/// Wraps a decoded stream, lets exactly `expected_size` bytes through, and
/// verifies the checksum once they have all been read. The verification
/// happens on the read *after* the last data byte, so the final bytes are
/// still delivered to the caller before the mismatch surfaces.
///
/// Used as the outermost shim of a folder's decoder stack when the folder
/// declares a CRC.
pub struct Crc32VerifyingReader<R> {
    inner: R,
    crc: Crc32,
    remaining: u64,
    expected_size: u64,
    expected_crc: u32,
    verified: bool,
    entry_index: usize,
    entry_name: Option<String>,
}

impl<R: Read> Crc32VerifyingReader<R> {
    /// Creates a verifying reader.
    ///
    /// `entry_index` and `entry_name` give the error context; for a folder
    /// stream this is the first entry of the folder.
    pub fn new(
        inner: R,
        expected_size: u64,
        expected_crc: u32,
        entry_index: usize,
        entry_name: Option<String>,
    ) -> Self {
        Self {
            inner,
            crc: Crc32::new(),
            remaining: expected_size,
            expected_size,
            expected_crc,
            verified: false,
            entry_index,
            entry_name,
        }
    }

    /// Bytes still expected before verification triggers.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn verify(&mut self) -> io::Result<()> {
        self.verified = true;
        let actual = self.crc.finalize();
        if actual != self.expected_crc {
            return Err(into_io_error(Error::CrcMismatch {
                entry_index: self.entry_index,
                entry_name: self.entry_name.clone(),
                expected: self.expected_crc,
                actual,
            }));
        }
        Ok(())
    }
}

impl<R: Read> Read for Crc32VerifyingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 {
            if !self.verified && self.expected_size > 0 {
                self.verify()?;
            }
            return Ok(0);
        }
        let max = (self.remaining as usize).min(buf.len());
        let n = self.inner.read(&mut buf[..max])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "stream ended before its declared size",
            ));
        }
        self.crc.update(&buf[..n]);
        self.remaining -= n as u64;
        Ok(n)
    }
}

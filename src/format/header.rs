//! Signature and start-header parsing.

use std::io::Read;

use crate::checksum::Crc32;
use crate::{Error, Result};

use super::reader::{read_u32_le, read_u8};
use super::{SIGNATURE, SIGNATURE_HEADER_SIZE, START_HEADER_SIZE};

/// The CRC-protected start header of a 7z archive.
///
/// Located right after the six-byte signature and two version bytes, it
/// points at the *next header* which holds the actual archive metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartHeader {
    /// Offset of the next header, relative to the end of the signature
    /// header (absolute position is `offset + 32`).
    pub next_header_offset: u64,
    /// Size of the next header in bytes.
    pub next_header_size: u64,
    /// CRC-32 of the next header bytes; zero during recovery.
    pub next_header_crc: u32,
}

impl StartHeader {
    /// Parses the signature header from a reader positioned at byte 0.
    ///
    /// `file_size` bounds the declared next-header range.
    ///
    /// # Errors
    ///
    /// - [`Error::BadSignature`] if the magic bytes are wrong
    /// - [`Error::UnsupportedVersion`] for any major version other than 0
    /// - [`Error::Recoverable`] when the start-header CRC is zero and the
    ///   20 protected bytes are all zero (truncated multi-volume archives)
    /// - [`Error::HeaderCrcMismatch`] when the CRC check fails
    /// - [`Error::NextHeaderOutOfBounds`] when the next header would fall
    ///   outside the file
    pub fn parse<R: Read>(r: &mut R, file_size: u64) -> Result<Self> {
        let mut signature = [0u8; 6];
        r.read_exact(&mut signature)
            .map_err(|_| Error::Truncated("7z signature"))?;
        if signature != *SIGNATURE {
            return Err(Error::BadSignature);
        }

        let major = read_u8(r)?;
        let minor = read_u8(r)?;
        if major != 0 {
            return Err(Error::UnsupportedVersion { major, minor });
        }

        let stored_crc = read_u32_le(r)?;

        let mut protected = [0u8; START_HEADER_SIZE];
        r.read_exact(&mut protected)
            .map_err(|_| Error::Truncated("start header"))?;

        if stored_crc == 0 && protected.iter().all(|&b| b == 0) {
            // Truncated multi-volume archives have a zeroed start header;
            // there may still be a usable end header further in the file.
            return Err(Error::Recoverable);
        }

        let actual_crc = Crc32::compute(&protected);
        if actual_crc != stored_crc {
            return Err(Error::HeaderCrcMismatch {
                expected: stored_crc,
                actual: actual_crc,
            });
        }

        let next_header_offset = u64::from_le_bytes(protected[0..8].try_into().unwrap());
        let next_header_size = u64::from_le_bytes(protected[8..16].try_into().unwrap());
        let next_header_crc = u32::from_le_bytes(protected[16..20].try_into().unwrap());

        let header = Self {
            next_header_offset,
            next_header_size,
            next_header_crc,
        };
        header.check_bounds(file_size)?;
        Ok(header)
    }

    /// Validates that the next header lies within the file.
    pub(crate) fn check_bounds(&self, file_size: u64) -> Result<()> {
        let out_of_bounds = Error::NextHeaderOutOfBounds {
            offset: self.next_header_offset,
            size: self.next_header_size,
        };
        let start = self
            .next_header_offset
            .checked_add(SIGNATURE_HEADER_SIZE)
            .ok_or_else(|| self.oob())?;
        if start > file_size {
            return Err(out_of_bounds);
        }
        let end = self
            .next_header_offset
            .checked_add(self.next_header_size)
            .and_then(|e| e.checked_add(SIGNATURE_HEADER_SIZE))
            .ok_or_else(|| self.oob())?;
        if end > file_size {
            return Err(out_of_bounds);
        }
        Ok(())
    }

    fn oob(&self) -> Error {
        Error::NextHeaderOutOfBounds {
            offset: self.next_header_offset,
            size: self.next_header_size,
        }
    }

    /// Absolute file position of the next header.
    pub fn next_header_position(&self) -> u64 {
        SIGNATURE_HEADER_SIZE + self.next_header_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn build_signature_header(offset: u64, size: u64, next_crc: u32) -> Vec<u8> {
        let mut data = Vec::with_capacity(32);
        data.extend_from_slice(SIGNATURE);
        data.extend_from_slice(&[0x00, 0x04]);

        let mut protected = Vec::with_capacity(20);
        protected.extend_from_slice(&offset.to_le_bytes());
        protected.extend_from_slice(&size.to_le_bytes());
        protected.extend_from_slice(&next_crc.to_le_bytes());

        data.extend_from_slice(&Crc32::compute(&protected).to_le_bytes());
        data.extend_from_slice(&protected);
        data
    }

    #[test]
    fn parse_valid() {
        let data = build_signature_header(100, 50, 0xDEADBEEF);
        let header = StartHeader::parse(&mut Cursor::new(&data), 200).unwrap();
        assert_eq!(header.next_header_offset, 100);
        assert_eq!(header.next_header_size, 50);
        assert_eq!(header.next_header_crc, 0xDEADBEEF);
        assert_eq!(header.next_header_position(), 132);
    }

    #[test]
    fn bad_signature() {
        let mut data = build_signature_header(0, 0, 0);
        data[0] = 0x50;
        let err = StartHeader::parse(&mut Cursor::new(&data), 32).unwrap_err();
        assert!(matches!(err, Error::BadSignature));
    }

    #[test]
    fn unsupported_major_version() {
        let mut data = build_signature_header(0, 0, 0);
        data[6] = 0x01;
        let err = StartHeader::parse(&mut Cursor::new(&data), 32).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedVersion { major: 1, minor: 4 }
        ));
    }

    #[test]
    fn crc_mismatch() {
        let mut data = build_signature_header(100, 50, 0);
        data[12] ^= 0xFF;
        let err = StartHeader::parse(&mut Cursor::new(&data), 200).unwrap_err();
        assert!(matches!(err, Error::HeaderCrcMismatch { .. }));
    }

    #[test]
    fn zeroed_start_header_is_recoverable() {
        let mut data = Vec::new();
        data.extend_from_slice(SIGNATURE);
        data.extend_from_slice(&[0x00, 0x04]);
        data.extend_from_slice(&[0u8; 24]);
        let err = StartHeader::parse(&mut Cursor::new(&data), 32).unwrap_err();
        assert!(matches!(err, Error::Recoverable));
    }

    #[test]
    fn zero_crc_with_nonzero_data_is_mismatch() {
        let mut data = Vec::new();
        data.extend_from_slice(SIGNATURE);
        data.extend_from_slice(&[0x00, 0x04]);
        data.extend_from_slice(&[0u8; 4]);
        let mut protected = [0u8; 20];
        protected[0] = 1;
        data.extend_from_slice(&protected);
        let err = StartHeader::parse(&mut Cursor::new(&data), 200).unwrap_err();
        assert!(matches!(err, Error::HeaderCrcMismatch { expected: 0, .. }));
    }

    #[test]
    fn next_header_out_of_bounds() {
        let data = build_signature_header(100, 50, 0);
        // File too small for offset + size + signature header.
        let err = StartHeader::parse(&mut Cursor::new(&data), 100).unwrap_err();
        assert!(matches!(err, Error::NextHeaderOutOfBounds { .. }));
    }

    #[test]
    fn empty_archive_boundary() {
        let data = build_signature_header(0, 0, 0);
        let header = StartHeader::parse(&mut Cursor::new(&data), 32).unwrap();
        assert_eq!(header.next_header_size, 0);
    }

    #[test]
    fn truncated_input() {
        let data = [0x37, 0x7A, 0xBC];
        let err = StartHeader::parse(&mut Cursor::new(&data), 3).unwrap_err();
        assert!(matches!(err, Error::Truncated(_)));
    }
}

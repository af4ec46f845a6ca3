//! Recovery of archives with a zeroed start header.
//!
//! When the first volume of a multi-volume archive is closed prematurely,
//! the signature header exists but the 20-byte start header is all zeros.
//! The end header is usually still present near the end of the file, so
//! this module scans backwards for a byte that could begin one and tries a
//! full parse from there.

use std::io::{Read, Seek};

use crate::format::header::StartHeader;
use crate::format::parser::{initialize_archive, Archive};
use crate::format::{nid, SIGNATURE_HEADER_SIZE};
use crate::password::Password;
use crate::stream::Channel;
use crate::{Error, Result};

/// Scans backwards from the end of the file for a plausible end header.
///
/// Every byte equal to `kHeader` or `kEncodedHeader` within `search_limit`
/// of the end is treated as a candidate: a start header is synthesised
/// (CRC checking off) and a full two-pass parse attempted. A candidate is
/// accepted only if it yields both pack streams and entries. Parse errors
/// while probing are swallowed; the scan budget guarantees termination.
pub(crate) fn try_to_locate_end_header<R: Read + Seek + 'static>(
    channel: &Channel<R>,
    file_size: u64,
    search_limit: u64,
    password: Option<&Password>,
    memory_limit_kib: u64,
) -> Result<Archive> {
    // The signature header occupies the first 32 bytes; no end header can
    // start inside it.
    let min_pos = if SIGNATURE_HEADER_SIZE + search_limit > file_size {
        SIGNATURE_HEADER_SIZE
    } else {
        file_size - search_limit
    };

    let mut pos = file_size.saturating_sub(1);
    while pos > min_pos {
        pos -= 1;
        let mut byte = [0u8; 1];
        channel
            .read_exact_at(pos, &mut byte)
            .map_err(|_| Error::Truncated("recovery scan"))?;
        if byte[0] != nid::HEADER && byte[0] != nid::ENCODED_HEADER {
            continue;
        }
        let candidate = StartHeader {
            next_header_offset: pos - SIGNATURE_HEADER_SIZE,
            next_header_size: file_size - pos,
            next_header_crc: 0,
        };
        match initialize_archive(
            channel,
            file_size,
            &candidate,
            false,
            password,
            memory_limit_kib,
        ) {
            Ok(archive) if !archive.pack_sizes.is_empty() && !archive.files.is_empty() => {
                return Ok(archive);
            }
            // Wrong guess, keep scanning.
            _ => {}
        }
    }

    Err(Error::corrupt(
        0,
        "start header corrupt and unable to guess end header",
    ))
}

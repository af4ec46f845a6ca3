//! Pass 1 of the header parser: sanity checks and a memory estimate.
//!
//! The raw header is walked once without allocating any archive structure.
//! Counts are tallied, every index and size is validated against the file,
//! and a conservative memory estimate gates pass 2 (materialisation). A
//! malicious header can therefore declare millions of entries without the
//! parser allocating anything for them.

use std::io::Cursor;

use crate::{Error, Result};

use super::nid;
use super::reader::{read_all_or_bits, read_bit_vector, read_u8, read_var_u64};
use super::SIGNATURE_HEADER_SIZE;

/// Counters collected by pass 1.
#[derive(Debug, Default)]
pub(crate) struct ArchiveStats {
    pub packed_streams: usize,
    pub coders: u64,
    pub out_streams: u64,
    pub in_streams: u64,
    pub unpack_sub_streams: u64,
    pub folders: usize,
    pub folder_has_crc: Option<Vec<bool>>,
    pub entries: usize,
    pub entries_with_stream: usize,
}

impl ArchiveStats {
    /// Conservative estimate of the heap needed to materialise the archive,
    /// in bytes. Doubled as a safety margin; the per-object constants cover
    /// the allocation overhead of the parsed structures.
    pub(crate) fn estimate_bytes(&self) -> u64 {
        const BIND_PAIR_SIZE: u64 = 16;
        const CODER_SIZE: u64 = 2 + 16 + 4; // method id + properties guess
        const FOLDER_SIZE: u64 = 30; // nested arrays accounted separately
        const ENTRY_SIZE: u64 = 100; // name length dominates real entries

        let p = self.packed_streams as u64;
        let f = self.folders as u64;
        let e = self.entries as u64;
        let stream_map = 8 * f + 8 * p + 4 * e;
        let lower_bound = 16 * p
            + p / 8
            + f * FOLDER_SIZE
            + self.coders * CODER_SIZE
            + (self.out_streams - f) * BIND_PAIR_SIZE
            + 8 * (self.in_streams - self.out_streams + f)
            + 8 * self.out_streams
            + e * ENTRY_SIZE
            + stream_map;
        2 * lower_bound
    }

    /// Checks the structural relations between the counters, then the
    /// memory estimate against the configured limit (in KiB).
    ///
    /// An estimate of exactly `limit_kib * 1024` bytes passes; one byte
    /// more fails.
    pub(crate) fn assert_validity(&self, limit_kib: u64) -> Result<()> {
        if self.entries_with_stream > 0 && self.folders == 0 {
            return Err(Error::corrupt(0, "archive with entries but no folders"));
        }
        if self.entries_with_stream as u64 > self.unpack_sub_streams {
            return Err(Error::corrupt(
                0,
                "archive doesn't contain enough substreams for entries",
            ));
        }
        let needed = self.estimate_bytes();
        if needed > limit_kib.saturating_mul(1024) {
            return Err(Error::MemoryLimit {
                needed_kib: needed.div_ceil(1024),
                limit_kib,
            });
        }
        Ok(())
    }
}

type HeaderCursor<'a> = Cursor<&'a [u8]>;

fn remaining(c: &HeaderCursor<'_>) -> u64 {
    (c.get_ref().len() as u64).saturating_sub(c.position())
}

fn skip(c: &mut HeaderCursor<'_>, count: u64, what: &str) -> Result<()> {
    if remaining(c) < count {
        return Err(Error::corrupt(c.position(), format!("incomplete {}", what)));
    }
    c.set_position(c.position() + count);
    Ok(())
}

/// Rejects values that cannot index an in-memory structure.
fn checked_usize(value: u64, what: &str) -> Result<usize> {
    if value > u32::MAX as u64 {
        return Err(Error::corrupt(0, format!("cannot handle {} {}", what, value)));
    }
    Ok(value as usize)
}

/// Walks a whole header (after the `kHeader` byte) and collects statistics.
pub(crate) fn sanity_check_header(
    c: &mut HeaderCursor<'_>,
    file_size: u64,
) -> Result<ArchiveStats> {
    let mut stats = ArchiveStats::default();
    let mut id = read_u8(c)?;
    if id == nid::ARCHIVE_PROPERTIES {
        sanity_check_archive_properties(c)?;
        id = read_u8(c)?;
    }
    if id == nid::ADDITIONAL_STREAMS_INFO {
        return Err(Error::UnsupportedFeature {
            feature: "additional streams",
        });
    }
    if id == nid::MAIN_STREAMS_INFO {
        sanity_check_streams_info(c, &mut stats, file_size)?;
        id = read_u8(c)?;
    }
    if id == nid::FILES_INFO {
        sanity_check_files_info(c, &mut stats)?;
        id = read_u8(c)?;
    }
    if id != nid::END {
        return Err(Error::corrupt(
            c.position(),
            format!("badly terminated header, found {:#x}", id),
        ));
    }
    Ok(stats)
}

/// The semantics of archive properties are undocumented; they are walked
/// and discarded, matching 7-Zip itself.
fn sanity_check_archive_properties(c: &mut HeaderCursor<'_>) -> Result<()> {
    let mut id = read_var_u64(c)?;
    while id != nid::END as u64 {
        let size = read_var_u64(c)?;
        skip(c, size, "archive property")?;
        id = read_var_u64(c)?;
    }
    Ok(())
}

/// Walks a StreamsInfo block (also used for encoded headers).
pub(crate) fn sanity_check_streams_info(
    c: &mut HeaderCursor<'_>,
    stats: &mut ArchiveStats,
    file_size: u64,
) -> Result<()> {
    let mut id = read_u8(c)?;
    if id == nid::PACK_INFO {
        sanity_check_pack_info(c, stats, file_size)?;
        id = read_u8(c)?;
    }
    if id == nid::UNPACK_INFO {
        sanity_check_unpack_info(c, stats)?;
        id = read_u8(c)?;
    }
    if id == nid::SUBSTREAMS_INFO {
        sanity_check_substreams_info(c, stats)?;
        id = read_u8(c)?;
    }
    if id != nid::END {
        return Err(Error::corrupt(c.position(), "badly terminated StreamsInfo"));
    }
    Ok(())
}

fn sanity_check_pack_info(
    c: &mut HeaderCursor<'_>,
    stats: &mut ArchiveStats,
    file_size: u64,
) -> Result<()> {
    let pack_pos = read_var_u64(c)?;
    if pack_pos.checked_add(SIGNATURE_HEADER_SIZE).is_none()
        || SIGNATURE_HEADER_SIZE + pack_pos > file_size
    {
        return Err(Error::corrupt(
            c.position(),
            format!("packPos ({}) is out of range", pack_pos),
        ));
    }
    stats.packed_streams = checked_usize(read_var_u64(c)?, "numPackStreams")?;
    let mut id = read_u8(c)?;
    if id == nid::SIZE {
        let mut total = 0u64;
        for _ in 0..stats.packed_streams {
            let pack_size = read_var_u64(c)?;
            total = total
                .checked_add(pack_size)
                .ok_or_else(|| Error::corrupt(c.position(), "pack sizes overflow"))?;
            let end = SIGNATURE_HEADER_SIZE
                .checked_add(pack_pos)
                .and_then(|v| v.checked_add(total));
            match end {
                Some(end) if end <= file_size => {}
                _ => {
                    return Err(Error::corrupt(
                        c.position(),
                        format!("packSize ({}) is out of range", pack_size),
                    ));
                }
            }
        }
        id = read_u8(c)?;
    }
    if id == nid::CRC {
        let defined = read_all_or_bits(c, stats.packed_streams)?;
        let crcs = defined.iter().filter(|&&d| d).count() as u64;
        skip(c, 4 * crcs, "CRCs in PackInfo")?;
        id = read_u8(c)?;
    }
    if id != nid::END {
        return Err(Error::corrupt(
            c.position(),
            format!("badly terminated PackInfo ({:#x})", id),
        ));
    }
    Ok(())
}

fn sanity_check_unpack_info(c: &mut HeaderCursor<'_>, stats: &mut ArchiveStats) -> Result<()> {
    let mut id = read_u8(c)?;
    if id != nid::FOLDER {
        return Err(Error::corrupt(
            c.position(),
            format!("expected kFolder, got {:#x}", id),
        ));
    }
    stats.folders = checked_usize(read_var_u64(c)?, "numFolders")?;
    let external = read_u8(c)?;
    if external != 0 {
        return Err(Error::corrupt(
            c.position(),
            "external folder definitions are unsupported",
        ));
    }
    let mut out_streams_per_folder = Vec::with_capacity(stats.folders.min(1024));
    for _ in 0..stats.folders {
        out_streams_per_folder.push(sanity_check_folder(c, stats)?);
    }
    let bind_pairs = stats.out_streams - stats.folders as u64;
    let packed_required = stats.in_streams - bind_pairs;
    if packed_required < stats.packed_streams as u64 {
        return Err(Error::corrupt(
            c.position(),
            "archive doesn't contain enough packed streams",
        ));
    }
    id = read_u8(c)?;
    if id != nid::CODERS_UNPACK_SIZE {
        return Err(Error::corrupt(
            c.position(),
            format!("expected kCodersUnpackSize, got {:#x}", id),
        ));
    }
    for &num_out in &out_streams_per_folder {
        for _ in 0..num_out {
            // The varint encoding cannot produce a negative value; reading
            // it is the size validation.
            read_var_u64(c)?;
        }
    }
    id = read_u8(c)?;
    if id == nid::CRC {
        let defined = read_all_or_bits(c, stats.folders)?;
        let crcs = defined.iter().filter(|&&d| d).count() as u64;
        skip(c, 4 * crcs, "CRCs in UnpackInfo")?;
        stats.folder_has_crc = Some(defined);
        id = read_u8(c)?;
    }
    if id != nid::END {
        return Err(Error::corrupt(c.position(), "badly terminated UnpackInfo"));
    }
    Ok(())
}

/// Checks one folder definition and returns its number of output streams.
fn sanity_check_folder(c: &mut HeaderCursor<'_>, stats: &mut ArchiveStats) -> Result<u64> {
    let num_coders = checked_usize(read_var_u64(c)?, "numCoders")?;
    if num_coders == 0 {
        return Err(Error::corrupt(c.position(), "folder without coders"));
    }
    stats.coders += num_coders as u64;

    let mut total_in = 0u64;
    let mut total_out = 0u64;
    for _ in 0..num_coders {
        let flags = read_u8(c)?;
        let id_size = (flags & 0x0F) as u64;
        let is_simple = flags & 0x10 == 0;
        let has_attributes = flags & 0x20 != 0;
        let more_alternative_methods = flags & 0x80 != 0;
        skip(c, id_size, "coder method id")?;
        if more_alternative_methods {
            return Err(Error::UnsupportedFeature {
                feature: "alternative methods",
            });
        }
        if is_simple {
            total_in += 1;
            total_out += 1;
        } else {
            // Only plain 1-in/1-out coder chains are in the supported
            // subset; BCJ2 and friends fall outside it.
            let num_in = read_var_u64(c)?;
            let num_out = read_var_u64(c)?;
            if num_in != 1 || num_out != 1 {
                return Err(Error::UnsupportedFeature {
                    feature: "coders with multiple input or output streams",
                });
            }
            total_in += 1;
            total_out += 1;
        }
        if has_attributes {
            let properties_size = read_var_u64(c)?;
            skip(c, properties_size, "coder properties")?;
        }
    }
    stats.out_streams += total_out;
    stats.in_streams += total_in;

    let bind_pairs = checked_usize(total_out - 1, "numBindPairs")?;
    if total_in < bind_pairs as u64 {
        return Err(Error::corrupt(
            c.position(),
            "total input streams can't be less than the number of bind pairs",
        ));
    }
    let mut in_stream_bound = vec![false; checked_usize(total_in, "totalInStreams")?];
    for _ in 0..bind_pairs {
        let in_index = checked_usize(read_var_u64(c)?, "inIndex")?;
        if in_index >= in_stream_bound.len() {
            return Err(Error::corrupt(
                c.position(),
                "inIndex is bigger than number of inStreams",
            ));
        }
        in_stream_bound[in_index] = true;
        let out_index = read_var_u64(c)?;
        if out_index >= total_out {
            return Err(Error::corrupt(
                c.position(),
                "outIndex is bigger than number of outStreams",
            ));
        }
    }
    let packed_streams = total_in - bind_pairs as u64;
    if packed_streams == 1 {
        if !in_stream_bound.contains(&false) {
            return Err(Error::corrupt(
                c.position(),
                "couldn't find stream's bind pair index",
            ));
        }
    } else {
        for _ in 0..packed_streams {
            let index = read_var_u64(c)?;
            if index >= total_in {
                return Err(Error::corrupt(
                    c.position(),
                    "packedStreamIndex is bigger than number of totalInStreams",
                ));
            }
        }
    }
    Ok(total_out)
}

fn sanity_check_substreams_info(c: &mut HeaderCursor<'_>, stats: &mut ArchiveStats) -> Result<()> {
    let mut id = read_u8(c)?;
    let mut per_folder = Vec::new();
    if id == nid::NUM_UNPACK_STREAM {
        let mut total = 0u64;
        for _ in 0..stats.folders {
            let streams = read_var_u64(c)?;
            checked_usize(streams, "numStreams")?;
            total = total
                .checked_add(streams)
                .ok_or_else(|| Error::corrupt(c.position(), "substream count overflow"))?;
            per_folder.push(streams as usize);
        }
        stats.unpack_sub_streams = total;
        id = read_u8(c)?;
    } else {
        stats.unpack_sub_streams = stats.folders as u64;
    }
    checked_usize(stats.unpack_sub_streams, "totalUnpackStreams")?;
    if id == nid::SIZE {
        for &streams in &per_folder {
            if streams == 0 {
                continue;
            }
            for _ in 0..streams - 1 {
                read_var_u64(c)?;
            }
        }
        id = read_u8(c)?;
    }
    let num_digests: u64 = if per_folder.is_empty() {
        match &stats.folder_has_crc {
            None => stats.folders as u64,
            Some(has_crc) => (stats.folders - has_crc.iter().filter(|&&b| b).count()) as u64,
        }
    } else {
        per_folder
            .iter()
            .enumerate()
            .filter(|&(folder, &streams)| {
                streams != 1
                    || !stats
                        .folder_has_crc
                        .as_ref()
                        .is_some_and(|crc| crc.get(folder).copied().unwrap_or(false))
            })
            .map(|(_, &streams)| streams as u64)
            .sum()
    };
    if id == nid::CRC {
        let num_digests = checked_usize(num_digests, "numDigests")?;
        let defined = read_all_or_bits(c, num_digests)?;
        let crcs = defined.iter().filter(|&&d| d).count() as u64;
        skip(c, 4 * crcs, "missing CRCs in SubStreamsInfo")?;
        id = read_u8(c)?;
    }
    if id != nid::END {
        return Err(Error::corrupt(
            c.position(),
            "badly terminated SubStreamsInfo",
        ));
    }
    Ok(())
}

fn sanity_check_files_info(c: &mut HeaderCursor<'_>, stats: &mut ArchiveStats) -> Result<()> {
    stats.entries = checked_usize(read_var_u64(c)?, "numFiles")?;
    let mut empty_streams: Option<usize> = None;
    loop {
        let property = read_u8(c)?;
        if property == nid::END {
            break;
        }
        let size = read_var_u64(c)?;
        match property {
            nid::EMPTY_STREAM => {
                let bits = read_bit_vector(c, stats.entries)?;
                empty_streams = Some(bits.iter().filter(|&&b| b).count());
            }
            nid::EMPTY_FILE => {
                let empty = empty_streams.ok_or_else(|| {
                    Error::corrupt(
                        c.position(),
                        "header format error: kEmptyStream must appear before kEmptyFile",
                    )
                })?;
                read_bit_vector(c, empty)?;
            }
            nid::ANTI => {
                let empty = empty_streams.ok_or_else(|| {
                    Error::corrupt(
                        c.position(),
                        "header format error: kEmptyStream must appear before kAnti",
                    )
                })?;
                read_bit_vector(c, empty)?;
            }
            nid::NAME => {
                let external = read_u8(c)?;
                if external != 0 {
                    // The flag is specified but has never been observed in
                    // the wild.
                    return Err(Error::corrupt(
                        c.position(),
                        "external file names are unsupported",
                    ));
                }
                let names_length = checked_usize(
                    size.checked_sub(1)
                        .ok_or_else(|| Error::corrupt(c.position(), "file names length invalid"))?,
                    "file names length",
                )?;
                if names_length % 2 != 0 {
                    return Err(Error::corrupt(c.position(), "file names length invalid"));
                }
                if remaining(c) < names_length as u64 {
                    return Err(Error::corrupt(c.position(), "incomplete file names"));
                }
                let start = c.position() as usize;
                let names = &c.get_ref()[start..start + names_length];
                let files_seen = names
                    .chunks_exact(2)
                    .filter(|pair| pair[0] == 0 && pair[1] == 0)
                    .count();
                if files_seen != stats.entries {
                    return Err(Error::corrupt(
                        c.position(),
                        format!(
                            "invalid number of file names ({} instead of {})",
                            files_seen, stats.entries
                        ),
                    ));
                }
                c.set_position((start + names_length) as u64);
            }
            nid::CTIME | nid::ATIME | nid::MTIME => {
                let defined = read_all_or_bits(c, stats.entries)?;
                let external = read_u8(c)?;
                if external != 0 {
                    return Err(Error::corrupt(
                        c.position(),
                        "external timestamps are unsupported",
                    ));
                }
                let count = defined.iter().filter(|&&d| d).count() as u64;
                skip(c, 8 * count, "timestamps")?;
            }
            nid::WIN_ATTRIBUTES => {
                let defined = read_all_or_bits(c, stats.entries)?;
                let external = read_u8(c)?;
                if external != 0 {
                    return Err(Error::corrupt(
                        c.position(),
                        "external attributes are unsupported",
                    ));
                }
                let count = defined.iter().filter(|&&d| d).count() as u64;
                skip(c, 4 * count, "windows attributes")?;
            }
            nid::START_POS => {
                return Err(Error::UnsupportedFeature {
                    feature: "kStartPos",
                });
            }
            nid::DUMMY => {
                skip(c, size, "kDummy property")?;
            }
            _ => {
                skip(c, size, "unknown file property")?;
            }
        }
    }
    stats.entries_with_stream = stats.entries - empty_streams.unwrap_or(0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::reader::write_var_u64;

    fn var(buf: &mut Vec<u8>, v: u64) {
        write_var_u64(buf, v).unwrap();
    }

    /// Header body (after kHeader) for one Copy folder with one stream.
    fn simple_header_body(pack_size: u64, unpack_size: u64) -> Vec<u8> {
        let mut h = Vec::new();
        h.push(nid::MAIN_STREAMS_INFO);
        h.push(nid::PACK_INFO);
        var(&mut h, 0); // pack pos
        var(&mut h, 1); // one pack stream
        h.push(nid::SIZE);
        var(&mut h, pack_size);
        h.push(nid::END);
        h.push(nid::UNPACK_INFO);
        h.push(nid::FOLDER);
        var(&mut h, 1); // one folder
        h.push(0x00); // not external
        var(&mut h, 1); // one coder
        h.push(0x01); // one-byte method id, simple, no attributes
        h.push(0x00); // Copy
        h.push(nid::CODERS_UNPACK_SIZE);
        var(&mut h, unpack_size);
        h.push(nid::END);
        h.push(nid::END);
        h.push(nid::END);
        h
    }

    #[test]
    fn simple_header_collects_counts() {
        let body = simple_header_body(5, 5);
        let mut c = Cursor::new(body.as_slice());
        let stats = sanity_check_header(&mut c, 1000).unwrap();
        assert_eq!(stats.packed_streams, 1);
        assert_eq!(stats.folders, 1);
        assert_eq!(stats.coders, 1);
        assert_eq!(stats.in_streams, 1);
        assert_eq!(stats.out_streams, 1);
        assert_eq!(stats.unpack_sub_streams, 1);
    }

    #[test]
    fn pack_size_out_of_range() {
        let body = simple_header_body(5000, 5000);
        let mut c = Cursor::new(body.as_slice());
        let err = sanity_check_header(&mut c, 100).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }

    #[test]
    fn additional_streams_rejected() {
        let body = vec![nid::ADDITIONAL_STREAMS_INFO, nid::END];
        let mut c = Cursor::new(body.as_slice());
        let err = sanity_check_header(&mut c, 1000).unwrap_err();
        assert!(matches!(err, Error::UnsupportedFeature { .. }));
    }

    #[test]
    fn folder_without_coders_rejected() {
        let mut h = Vec::new();
        h.push(nid::MAIN_STREAMS_INFO);
        h.push(nid::UNPACK_INFO);
        h.push(nid::FOLDER);
        var(&mut h, 1);
        h.push(0x00);
        var(&mut h, 0); // zero coders
        let mut c = Cursor::new(h.as_slice());
        let err = sanity_check_header(&mut c, 1000).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }

    #[test]
    fn alternative_methods_rejected() {
        let mut h = Vec::new();
        h.push(nid::MAIN_STREAMS_INFO);
        h.push(nid::UNPACK_INFO);
        h.push(nid::FOLDER);
        var(&mut h, 1);
        h.push(0x00);
        var(&mut h, 1);
        h.push(0x81); // alternative methods flag set
        h.push(0x00);
        let mut c = Cursor::new(h.as_slice());
        let err = sanity_check_header(&mut c, 1000).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedFeature {
                feature: "alternative methods"
            }
        ));
    }

    #[test]
    fn multi_stream_coder_rejected() {
        let mut h = Vec::new();
        h.push(nid::MAIN_STREAMS_INFO);
        h.push(nid::UNPACK_INFO);
        h.push(nid::FOLDER);
        var(&mut h, 1);
        h.push(0x00);
        var(&mut h, 1);
        h.push(0x11); // complex coder
        h.push(0x00);
        var(&mut h, 4); // four inputs
        var(&mut h, 1);
        let mut c = Cursor::new(h.as_slice());
        let err = sanity_check_header(&mut c, 1000).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedFeature {
                feature: "coders with multiple input or output streams"
            }
        ));
    }

    #[test]
    fn empty_file_without_empty_stream_rejected() {
        let mut h = Vec::new();
        h.push(nid::FILES_INFO);
        var(&mut h, 1);
        h.push(nid::EMPTY_FILE);
        var(&mut h, 1);
        h.push(0x80);
        h.push(nid::END);
        h.push(nid::END);
        let mut c = Cursor::new(h.as_slice());
        let err = sanity_check_header(&mut c, 1000).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }

    #[test]
    fn odd_name_block_rejected() {
        let mut h = Vec::new();
        h.push(nid::FILES_INFO);
        var(&mut h, 1);
        h.push(nid::NAME);
        var(&mut h, 4); // external byte + 3 name bytes (odd)
        h.push(0x00);
        h.extend_from_slice(&[0x61, 0x00, 0x00]);
        let mut c = Cursor::new(h.as_slice());
        let err = sanity_check_header(&mut c, 1000).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }

    #[test]
    fn wrong_name_count_rejected() {
        let mut h = Vec::new();
        h.push(nid::FILES_INFO);
        var(&mut h, 2); // two entries
        h.push(nid::NAME);
        var(&mut h, 5); // external + one name only
        h.push(0x00);
        h.extend_from_slice(&[0x61, 0x00, 0x00, 0x00]);
        let mut c = Cursor::new(h.as_slice());
        let err = sanity_check_header(&mut c, 1000).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }

    #[test]
    fn start_pos_rejected() {
        let mut h = Vec::new();
        h.push(nid::FILES_INFO);
        var(&mut h, 0);
        h.push(nid::START_POS);
        var(&mut h, 0);
        let mut c = Cursor::new(h.as_slice());
        let err = sanity_check_header(&mut c, 1000).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedFeature {
                feature: "kStartPos"
            }
        ));
    }

    #[test]
    fn dummy_and_unknown_properties_skipped() {
        let mut h = Vec::new();
        h.push(nid::FILES_INFO);
        var(&mut h, 0);
        h.push(nid::DUMMY);
        var(&mut h, 3);
        h.extend_from_slice(&[0, 0, 0]);
        h.push(0x16); // unknown property (archive comment extension)
        var(&mut h, 2);
        h.extend_from_slice(&[1, 2]);
        h.push(nid::END);
        h.push(nid::END);
        let mut c = Cursor::new(h.as_slice());
        let stats = sanity_check_header(&mut c, 1000).unwrap();
        assert_eq!(stats.entries, 0);
    }

    fn stats_with(packed: usize, coders: u64, folders: usize, entries: usize) -> ArchiveStats {
        ArchiveStats {
            packed_streams: packed,
            coders,
            out_streams: coders,
            in_streams: coders,
            unpack_sub_streams: entries as u64,
            folders,
            folder_has_crc: None,
            entries,
            entries_with_stream: entries,
        }
    }

    #[test]
    fn estimate_is_monotone_in_counts() {
        let base = stats_with(2, 3, 2, 4);
        assert!(stats_with(3, 3, 2, 4).estimate_bytes() > base.estimate_bytes());
        assert!(stats_with(2, 4, 2, 4).estimate_bytes() > base.estimate_bytes());
        assert!(stats_with(2, 4, 3, 4).estimate_bytes() > base.estimate_bytes());
        assert!(stats_with(2, 3, 2, 5).estimate_bytes() > base.estimate_bytes());
    }

    #[test]
    fn memory_limit_boundary() {
        let stats = stats_with(1, 1, 1, 1);
        let bytes = stats.estimate_bytes();
        // A limit that covers the estimate succeeds.
        assert!(stats.assert_validity(bytes.div_ceil(1024)).is_ok());
        // A zero limit fails with the estimate reported in KiB.
        match stats.assert_validity(0).unwrap_err() {
            Error::MemoryLimit {
                needed_kib,
                limit_kib,
            } => {
                assert_eq!(needed_kib, bytes.div_ceil(1024));
                assert_eq!(limit_kib, 0);
            }
            other => panic!("expected MemoryLimit, got {:?}", other),
        }
    }
}

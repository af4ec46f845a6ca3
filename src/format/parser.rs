//! Header orchestration: loading, decoding and materialising the archive.
//!
//! The next header is read into memory and walked twice. Pass 1
//! ([`stats`][super::stats]) validates it without allocating; pass 2 (this
//! module) builds the [`Archive`] structure and derives the
//! [`StreamMap`]. Compressed headers (`kEncodedHeader`) are decoded through
//! a regular coder pipeline first, bounded by the memory limit.

use std::io::{Cursor, Read, Seek};

use crate::checksum::Crc32;
use crate::codec;
use crate::password::Password;
use crate::read::Entry;
use crate::stream::{BoundedChannelReader, Channel};
use crate::{Error, Result};

use super::files::read_files_info;
use super::header::StartHeader;
use super::nid;
use super::reader::{read_all_or_bits, read_u32_le, read_u8, read_var_u64};
use super::stats::{sanity_check_header, sanity_check_streams_info, ArchiveStats};
use super::streams::{read_substreams_info, Folder, StreamMap, SubStreamsInfo};
use super::SIGNATURE_HEADER_SIZE;

/// Parsed archive metadata.
///
/// Created once from the headers and immutable afterwards, except for the
/// lazily populated per-entry content methods.
#[derive(Debug, Default)]
pub struct Archive {
    /// Offset of the first pack stream, relative to the end of the
    /// signature header.
    pub pack_pos: u64,
    /// Size of each pack stream.
    pub pack_sizes: Vec<u64>,
    /// Declared CRC-32 of each pack stream, when present.
    pub pack_crcs: Vec<Option<u32>>,
    /// Folders (coder pipelines) in order.
    pub folders: Vec<Folder>,
    /// Per-entry sizes and digests for solid folders.
    pub sub_streams: Option<SubStreamsInfo>,
    /// Entries in archive order.
    pub files: Vec<Entry>,
    /// Derived index maps.
    pub stream_map: StreamMap,
}

impl Archive {
    /// Absolute file offset of the first pack byte of `folder_index`.
    pub(crate) fn folder_offset(&self, folder_index: usize) -> u64 {
        let first_pack = self.stream_map.folder_first_pack_stream_index[folder_index];
        SIGNATURE_HEADER_SIZE + self.pack_pos + self.stream_map.pack_stream_offsets[first_pack]
    }
}

/// Reads the next header and materialises the archive.
///
/// `verify_crc` is false in recovery mode, where the synthesised start
/// header carries no checksum.
pub(crate) fn initialize_archive<R: Read + Seek + 'static>(
    channel: &Channel<R>,
    file_size: u64,
    start: &StartHeader,
    verify_crc: bool,
    password: Option<&Password>,
    memory_limit_kib: u64,
) -> Result<Archive> {
    if start.next_header_size == 0 {
        return Ok(Archive::default());
    }
    if start.next_header_size > file_size {
        return Err(Error::NextHeaderOutOfBounds {
            offset: start.next_header_offset,
            size: start.next_header_size,
        });
    }

    let mut header = vec![0u8; start.next_header_size as usize];
    channel
        .read_exact_at(start.next_header_position(), &mut header)
        .map_err(|_| Error::Truncated("next header"))?;

    if verify_crc {
        let actual = Crc32::compute(&header);
        if actual != start.next_header_crc {
            return Err(Error::HeaderCrcMismatch {
                expected: start.next_header_crc,
                actual,
            });
        }
    }

    let mut id = *header.first().ok_or(Error::Truncated("next header"))?;
    if id == nid::ENCODED_HEADER {
        header = read_encoded_header(
            channel,
            &header[1..],
            file_size,
            password,
            memory_limit_kib,
        )?;
        id = *header.first().ok_or(Error::Truncated("decoded header"))?;
    }
    if id != nid::HEADER {
        return Err(Error::corrupt(0, "broken or unsupported archive: no header"));
    }

    // Pass 1: sanity checks and the memory estimate, no allocation.
    let body = &header[1..];
    let stats = sanity_check_header(&mut Cursor::new(body), file_size)?;
    stats.assert_validity(memory_limit_kib)?;

    // Pass 2: materialise.
    read_header(&mut Cursor::new(body), memory_limit_kib)
}

/// Pass 2 over a plain header body (after the `kHeader` byte).
fn read_header(c: &mut Cursor<&[u8]>, memory_limit_kib: u64) -> Result<Archive> {
    let mut archive = Archive::default();

    let mut id = read_u8(c)?;
    if id == nid::ARCHIVE_PROPERTIES {
        read_archive_properties(c)?;
        id = read_u8(c)?;
    }
    if id == nid::MAIN_STREAMS_INFO {
        read_streams_info(c, &mut archive, memory_limit_kib)?;
        id = read_u8(c)?;
    }
    if id == nid::FILES_INFO {
        archive.files = read_files_info(c, archive.sub_streams.as_ref())?;
        calculate_stream_map(&mut archive)?;
    }

    Ok(archive)
}

/// Archive properties have no documented semantics; 7-Zip itself reads and
/// discards them, and so do we.
fn read_archive_properties(c: &mut Cursor<&[u8]>) -> Result<()> {
    let mut id = read_var_u64(c)?;
    while id != nid::END as u64 {
        let size = read_var_u64(c)?;
        let position = c.position() + size;
        if position > c.get_ref().len() as u64 {
            return Err(Error::corrupt(c.position(), "invalid property size"));
        }
        c.set_position(position);
        id = read_var_u64(c)?;
    }
    Ok(())
}

fn read_streams_info(
    c: &mut Cursor<&[u8]>,
    archive: &mut Archive,
    memory_limit_kib: u64,
) -> Result<()> {
    let mut id = read_u8(c)?;
    if id == nid::PACK_INFO {
        read_pack_info(c, archive)?;
        id = read_u8(c)?;
    }
    if id == nid::UNPACK_INFO {
        read_unpack_info(c, archive)?;
        id = read_u8(c)?;
    }
    if id == nid::SUBSTREAMS_INFO {
        ensure_allocation(memory_limit_kib, archive.folders.len() as u64, 16)?;
        archive.sub_streams =
            Some(read_substreams_info(c, &mut archive.folders, memory_limit_kib)?);
        read_u8(c)?; // StreamsInfo terminator
    }
    Ok(())
}

fn read_pack_info(c: &mut Cursor<&[u8]>, archive: &mut Archive) -> Result<()> {
    archive.pack_pos = read_var_u64(c)?;
    let num_pack_streams = read_var_u64(c)? as usize;
    let mut id = read_u8(c)?;
    if id == nid::SIZE {
        archive.pack_sizes = Vec::with_capacity(num_pack_streams);
        for _ in 0..num_pack_streams {
            archive.pack_sizes.push(read_var_u64(c)?);
        }
        id = read_u8(c)?;
    }
    if archive.pack_sizes.is_empty() && num_pack_streams > 0 {
        archive.pack_sizes = vec![0; num_pack_streams];
    }
    archive.pack_crcs = vec![None; num_pack_streams];
    if id == nid::CRC {
        let defined = read_all_or_bits(c, num_pack_streams)?;
        for (crc, has_crc) in archive.pack_crcs.iter_mut().zip(defined) {
            if has_crc {
                *crc = Some(read_u32_le(c)?);
            }
        }
        read_u8(c)?; // block terminator
    }
    Ok(())
}

fn read_unpack_info(c: &mut Cursor<&[u8]>, archive: &mut Archive) -> Result<()> {
    let id = read_u8(c)?;
    debug_assert_eq!(id, nid::FOLDER);
    let num_folders = read_var_u64(c)? as usize;
    read_u8(c)?; // external flag, rejected by pass 1 when set
    archive.folders = Vec::with_capacity(num_folders);
    for _ in 0..num_folders {
        archive.folders.push(Folder::parse(c)?);
    }
    let id = read_u8(c)?;
    debug_assert_eq!(id, nid::CODERS_UNPACK_SIZE);
    for folder in &mut archive.folders {
        let num_out = folder.coders.len();
        folder.unpack_sizes = Vec::with_capacity(num_out);
        for _ in 0..num_out {
            folder.unpack_sizes.push(read_var_u64(c)?);
        }
    }
    let id = read_u8(c)?;
    if id == nid::CRC {
        let defined = read_all_or_bits(c, num_folders)?;
        for (folder, has_crc) in archive.folders.iter_mut().zip(defined) {
            if has_crc {
                folder.crc = Some(read_u32_le(c)?);
            }
        }
        read_u8(c)?; // block terminator
    }
    Ok(())
}

/// Decodes a compressed header through its folder's coder pipeline.
fn read_encoded_header<R: Read + Seek + 'static>(
    channel: &Channel<R>,
    streams_info: &[u8],
    file_size: u64,
    password: Option<&Password>,
    memory_limit_kib: u64,
) -> Result<Vec<u8>> {
    // The StreamsInfo describing the compressed header gets its own pass 1.
    let mut stats = ArchiveStats::default();
    sanity_check_streams_info(&mut Cursor::new(streams_info), &mut stats, file_size)?;
    stats.assert_validity(memory_limit_kib)?;

    let mut archive = Archive::default();
    read_streams_info(&mut Cursor::new(streams_info), &mut archive, memory_limit_kib)?;
    let folder = archive
        .folders
        .first()
        .ok_or_else(|| Error::corrupt(0, "no folders, can't read encoded header"))?;
    let pack_size = *archive
        .pack_sizes
        .first()
        .ok_or_else(|| Error::corrupt(0, "no packed streams, can't read encoded header"))?;

    let unpack_size = folder.unpack_size();
    ensure_allocation(memory_limit_kib, unpack_size, 1)?;

    let offset = SIGNATURE_HEADER_SIZE + archive.pack_pos;
    let mut stack: Box<dyn Read> =
        Box::new(BoundedChannelReader::new(channel.clone(), offset, pack_size));
    for index in folder.ordered_coder_indices()? {
        stack = codec::add_decoder(
            stack,
            &folder.coders[index],
            folder.unpack_size_for_coder(index),
            password,
        )?;
    }

    let mut decoded = vec![0u8; unpack_size as usize];
    stack
        .read_exact(&mut decoded)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::Truncated("encoded header stream"),
            _ => crate::error::from_io_error(e),
        })?;

    if let Some(expected) = folder.crc {
        let actual = Crc32::compute(&decoded);
        if actual != expected {
            return Err(Error::HeaderCrcMismatch { expected, actual });
        }
    }
    Ok(decoded)
}

/// Guards a pass-2 allocation of `count` elements of `element_size` bytes
/// against the memory limit.
fn ensure_allocation(limit_kib: u64, count: u64, element_size: u64) -> Result<()> {
    let needed = count.saturating_mul(element_size);
    if needed > limit_kib.saturating_mul(1024) {
        return Err(Error::MemoryLimit {
            needed_kib: needed.div_ceil(1024),
            limit_kib,
        });
    }
    Ok(())
}

/// Derives the stream map from parsed folders, pack sizes and entries.
fn calculate_stream_map(archive: &mut Archive) -> Result<()> {
    let num_folders = archive.folders.len();

    let mut folder_first_pack_stream_index = Vec::with_capacity(num_folders);
    let mut next_pack_stream = 0usize;
    for folder in &archive.folders {
        folder_first_pack_stream_index.push(next_pack_stream);
        next_pack_stream += folder.packed_streams.len();
    }

    let mut pack_stream_offsets = Vec::with_capacity(archive.pack_sizes.len());
    let mut next_offset = 0u64;
    for &size in &archive.pack_sizes {
        pack_stream_offsets.push(next_offset);
        next_offset = next_offset
            .checked_add(size)
            .ok_or_else(|| Error::corrupt(0, "pack stream offsets overflow"))?;
    }

    let mut folder_first_file_index = vec![0usize; num_folders];
    let mut file_folder_index = vec![None; archive.files.len()];
    let mut next_folder = 0usize;
    let mut streams_seen_in_folder = 0u64;
    for (i, file) in archive.files.iter().enumerate() {
        if !file.has_stream && streams_seen_in_folder == 0 {
            // Empty entries before the first substream belong to no folder.
            continue;
        }
        if streams_seen_in_folder == 0 {
            // Advance to the next folder that actually holds substreams.
            while next_folder < num_folders {
                folder_first_file_index[next_folder] = i;
                if archive.folders[next_folder].num_unpack_sub_streams > 0 {
                    break;
                }
                next_folder += 1;
            }
            if next_folder >= num_folders {
                return Err(Error::corrupt(0, "too few folders in archive"));
            }
        }
        file_folder_index[i] = Some(next_folder);
        if !file.has_stream {
            continue;
        }
        streams_seen_in_folder += 1;
        if streams_seen_in_folder >= archive.folders[next_folder].num_unpack_sub_streams {
            next_folder += 1;
            streams_seen_in_folder = 0;
        }
    }

    archive.stream_map = StreamMap {
        folder_first_pack_stream_index,
        pack_stream_offsets,
        folder_first_file_index,
        file_folder_index,
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::streams::Coder;

    fn folder_with_streams(substreams: u64) -> Folder {
        Folder {
            coders: vec![Coder {
                method_id: vec![0x00],
                properties: None,
            }],
            bind_pairs: vec![],
            packed_streams: vec![0],
            unpack_sizes: vec![100],
            crc: None,
            num_unpack_sub_streams: substreams,
        }
    }

    fn entry(has_stream: bool) -> Entry {
        Entry {
            has_stream,
            ..Default::default()
        }
    }

    #[test]
    fn stream_map_offsets_and_folders() {
        let mut archive = Archive {
            pack_pos: 0,
            pack_sizes: vec![10, 20, 30],
            pack_crcs: vec![None; 3],
            folders: vec![folder_with_streams(2), folder_with_streams(1)],
            sub_streams: None,
            files: vec![entry(true), entry(true), entry(true)],
            stream_map: StreamMap::default(),
        };
        // Second folder starts at pack stream 1.
        archive.folders[1].packed_streams = vec![0, 1];
        archive.folders[0].packed_streams = vec![0];

        calculate_stream_map(&mut archive).unwrap();
        let map = &archive.stream_map;
        assert_eq!(map.folder_first_pack_stream_index, vec![0, 1]);
        assert_eq!(map.pack_stream_offsets, vec![0, 10, 30]);
        assert_eq!(map.folder_first_file_index, vec![0, 2]);
        assert_eq!(map.file_folder_index, vec![Some(0), Some(0), Some(1)]);
        assert_eq!(archive.folder_offset(1), 32 + 10);
    }

    #[test]
    fn empty_entries_before_first_stream_have_no_folder() {
        let mut archive = Archive {
            pack_pos: 0,
            pack_sizes: vec![5],
            pack_crcs: vec![None],
            folders: vec![folder_with_streams(1)],
            sub_streams: None,
            files: vec![entry(false), entry(true), entry(false)],
            stream_map: StreamMap::default(),
        };
        calculate_stream_map(&mut archive).unwrap();
        let map = &archive.stream_map;
        assert_eq!(map.file_folder_index, vec![None, Some(0), None]);
        assert_eq!(map.folder_first_file_index, vec![1]);
    }

    #[test]
    fn too_few_folders_rejected() {
        let mut archive = Archive {
            pack_pos: 0,
            pack_sizes: vec![5],
            pack_crcs: vec![None],
            folders: vec![folder_with_streams(1)],
            sub_streams: None,
            files: vec![entry(true), entry(true)],
            stream_map: StreamMap::default(),
        };
        let err = calculate_stream_map(&mut archive).unwrap_err();
        assert!(matches!(err, Error::CorruptHeader { .. }));
    }
}

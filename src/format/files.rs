//! Entry metadata parsing (the FilesInfo header block).

use std::io::Cursor;

use crate::read::Entry;
use crate::{Error, Result};

use super::nid;
use super::reader::{
    read_all_or_bits, read_bit_vector, read_bytes, read_u32_le, read_u64_le, read_u8, read_var_u64,
};
use super::streams::SubStreamsInfo;

/// Parses the FilesInfo block into entries.
///
/// `sub_streams` supplies the per-entry sizes and digests for entries that
/// carry a data stream; pass 1 has already verified the property layout.
pub(crate) fn read_files_info(
    c: &mut Cursor<&[u8]>,
    sub_streams: Option<&SubStreamsInfo>,
) -> Result<Vec<Entry>> {
    let num_files = read_var_u64(c)? as usize;
    let mut entries: Vec<Entry> = (0..num_files).map(|_| Entry::default()).collect();

    let mut is_empty_stream: Option<Vec<bool>> = None;
    let mut is_empty_file: Option<Vec<bool>> = None;
    let mut is_anti: Option<Vec<bool>> = None;

    loop {
        let property = read_u8(c)?;
        if property == nid::END {
            break;
        }
        let size = read_var_u64(c)?;
        match property {
            nid::EMPTY_STREAM => {
                is_empty_stream = Some(read_bit_vector(c, num_files)?);
            }
            nid::EMPTY_FILE => {
                let empty = count_set(&is_empty_stream);
                is_empty_file = Some(read_bit_vector(c, empty)?);
            }
            nid::ANTI => {
                let empty = count_set(&is_empty_stream);
                is_anti = Some(read_bit_vector(c, empty)?);
            }
            nid::NAME => {
                read_u8(c)?; // external flag, rejected by pass 1 when set
                let names = read_bytes(c, size as usize - 1)?;
                let mut next_file = 0;
                let mut next_name = 0;
                for i in (0..names.len()).step_by(2) {
                    if names[i] == 0 && names[i + 1] == 0 {
                        let units: Vec<u16> = names[next_name..i]
                            .chunks_exact(2)
                            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                            .collect();
                        let name = String::from_utf16(&units).map_err(|_| {
                            Error::corrupt(c.position(), "invalid UTF-16 file name")
                        })?;
                        entries[next_file].name = Some(name);
                        next_name = i + 2;
                        next_file += 1;
                    }
                }
                if next_name != names.len() || next_file != num_files {
                    return Err(Error::corrupt(c.position(), "error parsing file names"));
                }
            }
            nid::CTIME => read_times(c, &mut entries, |e, t| e.creation_time = Some(t))?,
            nid::ATIME => read_times(c, &mut entries, |e, t| e.access_time = Some(t))?,
            nid::MTIME => read_times(c, &mut entries, |e, t| e.modification_time = Some(t))?,
            nid::WIN_ATTRIBUTES => {
                let defined = read_all_or_bits(c, num_files)?;
                read_u8(c)?; // external
                for (entry, has_attributes) in entries.iter_mut().zip(defined) {
                    if has_attributes {
                        entry.attributes = Some(read_u32_le(c)?);
                    }
                }
            }
            _ => {
                // kDummy and unknown properties are skipped by size.
                read_bytes(c, size as usize)?;
            }
        }
    }

    let mut non_empty = 0usize;
    let mut empty = 0usize;
    for (i, entry) in entries.iter_mut().enumerate() {
        let empty_stream = is_empty_stream
            .as_ref()
            .map(|bits| bits[i])
            .unwrap_or(false);
        entry.has_stream = !empty_stream;
        if entry.has_stream {
            let sub_streams = sub_streams.ok_or_else(|| {
                Error::corrupt(
                    c.position(),
                    "archive contains entries with streams but no substreams info",
                )
            })?;
            entry.is_directory = false;
            entry.size = *sub_streams.unpack_sizes.get(non_empty).ok_or_else(|| {
                Error::corrupt(c.position(), "missing substream size for entry")
            })?;
            entry.crc = sub_streams.digests.get(non_empty).copied().flatten();
            non_empty += 1;
        } else {
            entry.is_directory = match &is_empty_file {
                Some(bits) => !bits.get(empty).copied().unwrap_or(false),
                None => true,
            };
            entry.is_anti = is_anti
                .as_ref()
                .map(|bits| bits.get(empty).copied().unwrap_or(false))
                .unwrap_or(false);
            entry.size = 0;
            empty += 1;
        }
    }

    Ok(entries)
}

fn count_set(bits: &Option<Vec<bool>>) -> usize {
    bits.as_ref()
        .map(|b| b.iter().filter(|&&x| x).count())
        .unwrap_or(0)
}

fn read_times(
    c: &mut Cursor<&[u8]>,
    entries: &mut [Entry],
    mut set: impl FnMut(&mut Entry, u64),
) -> Result<()> {
    let defined = read_all_or_bits(c, entries.len())?;
    read_u8(c)?; // external flag, rejected by pass 1 when set
    for (entry, has_time) in entries.iter_mut().zip(defined) {
        if has_time {
            set(entry, read_u64_le(c)?);
        }
    }
    Ok(())
}

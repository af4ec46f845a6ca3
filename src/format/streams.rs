//! Stream metadata structures: folders, coders, bind pairs, substreams.
//!
//! A *folder* is one coder pipeline: an ordered list of coders whose
//! streams are wired together by *bind pairs*, fed from one or more *pack
//! streams* on the channel. In the supported subset every coder has exactly
//! one input and one output, so a folder is a simple chain.

use std::io::Cursor;

use crate::{Error, Result};

use super::nid;
use super::reader::{read_all_or_bits, read_bytes, read_u32_le, read_u8, read_var_u64};

/// A single coder in a folder's pipeline.
#[derive(Debug, Clone)]
pub struct Coder {
    /// Method ID bytes (1-4 bytes, e.g. `[0x21]` for LZMA2).
    pub method_id: Vec<u8>,
    /// Opaque codec properties (e.g. the LZMA dictionary size).
    pub properties: Option<Vec<u8>>,
}

impl Coder {
    /// Packs the method ID into a `u64` for display and comparison.
    pub fn method_id_u64(&self) -> u64 {
        self.method_id
            .iter()
            .take(8)
            .fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }
}

/// A connection between one coder's output and another coder's input.
#[derive(Debug, Clone, Copy)]
pub struct BindPair {
    /// Global input-stream index consuming the output.
    pub in_index: u64,
    /// Global output-stream index being consumed.
    pub out_index: u64,
}

/// A folder: one unit of compression, possibly holding many entries
/// (solid compression).
#[derive(Debug, Clone)]
pub struct Folder {
    /// Coders in declared order.
    pub coders: Vec<Coder>,
    /// Bind pairs wiring coder outputs to coder inputs.
    pub bind_pairs: Vec<BindPair>,
    /// Input-stream indices fed from pack streams, in pack-stream order.
    pub packed_streams: Vec<u64>,
    /// Unpacked size of each coder output (one per output stream).
    pub unpack_sizes: Vec<u64>,
    /// CRC-32 of the folder's fully decoded stream, when declared.
    pub crc: Option<u32>,
    /// Number of entries decoded from this folder (default 1).
    pub num_unpack_sub_streams: u64,
}

impl Folder {
    /// Parses one folder definition.
    ///
    /// Pass 1 has already established that every coder is 1-in/1-out and
    /// every index is within range.
    pub(crate) fn parse(c: &mut Cursor<&[u8]>) -> Result<Self> {
        let num_coders = read_var_u64(c)? as usize;
        let mut coders = Vec::with_capacity(num_coders);
        let mut total_in = 0u64;
        let mut total_out = 0u64;
        for _ in 0..num_coders {
            let flags = read_u8(c)?;
            let id_size = (flags & 0x0F) as usize;
            let is_simple = flags & 0x10 == 0;
            let has_attributes = flags & 0x20 != 0;
            let method_id = read_bytes(c, id_size)?;
            if is_simple {
                total_in += 1;
                total_out += 1;
            } else {
                total_in += read_var_u64(c)?;
                total_out += read_var_u64(c)?;
            }
            let properties = if has_attributes {
                let size = read_var_u64(c)? as usize;
                Some(read_bytes(c, size)?)
            } else {
                None
            };
            coders.push(Coder {
                method_id,
                properties,
            });
        }

        let num_bind_pairs = total_out - 1;
        let mut bind_pairs = Vec::with_capacity(num_bind_pairs as usize);
        for _ in 0..num_bind_pairs {
            bind_pairs.push(BindPair {
                in_index: read_var_u64(c)?,
                out_index: read_var_u64(c)?,
            });
        }

        let num_packed = total_in - num_bind_pairs;
        let mut packed_streams = Vec::with_capacity(num_packed as usize);
        if num_packed == 1 {
            // The single pack-fed input is the one no bind pair supplies.
            let index = (0..total_in)
                .find(|&i| !bind_pairs.iter().any(|bp| bp.in_index == i))
                .ok_or_else(|| {
                    Error::corrupt(c.position(), "couldn't find stream's bind pair index")
                })?;
            packed_streams.push(index);
        } else {
            for _ in 0..num_packed {
                packed_streams.push(read_var_u64(c)?);
            }
        }

        Ok(Self {
            coders,
            bind_pairs,
            packed_streams,
            unpack_sizes: Vec::new(),
            crc: None,
            num_unpack_sub_streams: 1,
        })
    }

    /// Returns the bind pair consuming the given input stream, if any.
    pub fn find_bind_pair_for_in_stream(&self, in_index: u64) -> Option<&BindPair> {
        self.bind_pairs.iter().find(|bp| bp.in_index == in_index)
    }

    /// Returns the bind pair fed by the given output stream, if any.
    pub fn find_bind_pair_for_out_stream(&self, out_index: u64) -> Option<&BindPair> {
        self.bind_pairs.iter().find(|bp| bp.out_index == out_index)
    }

    /// Size of the folder's final decoded stream: the output no bind pair
    /// consumes.
    pub fn unpack_size(&self) -> u64 {
        for out_index in (0..self.unpack_sizes.len() as u64).rev() {
            if self.find_bind_pair_for_out_stream(out_index).is_none() {
                return self.unpack_sizes[out_index as usize];
            }
        }
        0
    }

    /// Unpacked output size of the coder at `index`.
    ///
    /// In the 1-in/1-out subset, output-stream indices coincide with coder
    /// indices.
    pub fn unpack_size_for_coder(&self, index: usize) -> u64 {
        self.unpack_sizes.get(index).copied().unwrap_or(0)
    }

    /// Coder indices in decode order: the pack-fed coder first, following
    /// bind pairs to the coder producing the final output.
    ///
    /// Errors if any coder is not 1-in/1-out or the chain is inconsistent.
    pub fn ordered_coder_indices(&self) -> Result<Vec<usize>> {
        if self.coders.len() != self.unpack_sizes.len() {
            return Err(Error::UnsupportedFeature {
                feature: "coders with multiple input or output streams",
            });
        }
        let mut order = Vec::with_capacity(self.coders.len());
        let first = *self.packed_streams.first().ok_or_else(|| {
            Error::corrupt(0, "folder has no packed streams")
        })?;
        let mut current = first as usize;
        loop {
            if current >= self.coders.len() || order.contains(&current) {
                return Err(Error::corrupt(0, "inconsistent coder chain in folder"));
            }
            order.push(current);
            match self.find_bind_pair_for_out_stream(current as u64) {
                Some(bp) => current = bp.in_index as usize,
                None => break,
            }
        }
        if order.len() != self.coders.len() {
            return Err(Error::corrupt(0, "inconsistent coder chain in folder"));
        }
        Ok(order)
    }
}

/// Per-entry stream sizes and digests for solid folders.
#[derive(Debug, Clone, Default)]
pub struct SubStreamsInfo {
    /// Unpacked size of each substream, across all folders.
    pub unpack_sizes: Vec<u64>,
    /// CRC-32 of each substream, when known.
    pub digests: Vec<Option<u32>>,
}

/// Parses the SubStreamsInfo block, updating each folder's substream count.
///
/// `memory_limit_kib` guards the per-substream allocations, which pass 1's
/// estimate does not cover.
pub(crate) fn read_substreams_info(
    c: &mut Cursor<&[u8]>,
    folders: &mut [Folder],
    memory_limit_kib: u64,
) -> Result<SubStreamsInfo> {
    for folder in folders.iter_mut() {
        folder.num_unpack_sub_streams = 1;
    }
    let mut total_streams = folders.len() as u64;
    let mut id = read_u8(c)?;
    if id == nid::NUM_UNPACK_STREAM {
        total_streams = 0;
        for folder in folders.iter_mut() {
            let streams = read_var_u64(c)?;
            folder.num_unpack_sub_streams = streams;
            total_streams += streams;
        }
        id = read_u8(c)?;
    }

    // 8 bytes per size plus the digest option.
    let needed = total_streams.saturating_mul(16);
    if needed > memory_limit_kib.saturating_mul(1024) {
        return Err(Error::MemoryLimit {
            needed_kib: needed.div_ceil(1024),
            limit_kib: memory_limit_kib,
        });
    }

    let total = total_streams as usize;
    let mut unpack_sizes = vec![0u64; total];
    let mut digests: Vec<Option<u32>> = vec![None; total];

    let mut next_stream = 0usize;
    for folder in folders.iter() {
        if folder.num_unpack_sub_streams == 0 {
            continue;
        }
        let mut sum = 0u64;
        if id == nid::SIZE {
            for _ in 0..folder.num_unpack_sub_streams - 1 {
                let size = read_var_u64(c)?;
                unpack_sizes[next_stream] = size;
                next_stream += 1;
                sum = sum
                    .checked_add(size)
                    .ok_or_else(|| Error::corrupt(c.position(), "substream sizes overflow"))?;
            }
        }
        if sum > folder.unpack_size() {
            return Err(Error::corrupt(
                c.position(),
                "sum of unpack sizes of folder exceeds total unpack size",
            ));
        }
        unpack_sizes[next_stream] = folder.unpack_size() - sum;
        next_stream += 1;
    }
    if id == nid::SIZE {
        id = read_u8(c)?;
    }

    let mut num_digests = 0usize;
    for folder in folders.iter() {
        if folder.num_unpack_sub_streams != 1 || folder.crc.is_none() {
            num_digests += folder.num_unpack_sub_streams as usize;
        }
    }
    if id == nid::CRC {
        let has_digest = read_all_or_bits(c, num_digests)?;
        let mut read_digests = vec![None; num_digests];
        for (digest, &defined) in read_digests.iter_mut().zip(has_digest.iter()) {
            if defined {
                *digest = Some(read_u32_le(c)?);
            }
        }
        let mut next = 0usize;
        let mut next_missing = 0usize;
        for folder in folders.iter() {
            if folder.num_unpack_sub_streams == 1 && folder.crc.is_some() {
                digests[next] = folder.crc;
                next += 1;
            } else {
                for _ in 0..folder.num_unpack_sub_streams {
                    digests[next] = read_digests[next_missing];
                    next += 1;
                    next_missing += 1;
                }
            }
        }
        id = read_u8(c)?;
    }
    if id != nid::END {
        return Err(Error::corrupt(
            c.position(),
            "badly terminated SubStreamsInfo",
        ));
    }

    Ok(SubStreamsInfo {
        unpack_sizes,
        digests,
    })
}

/// Index maps derived from the parsed metadata.
///
/// All lookups the entry cursor needs: where each folder's pack data
/// starts, which folder holds each entry, and where each folder's entries
/// begin.
#[derive(Debug, Clone, Default)]
pub struct StreamMap {
    /// First pack-stream index of each folder.
    pub folder_first_pack_stream_index: Vec<usize>,
    /// Byte offset of each pack stream, relative to the first pack byte.
    pub pack_stream_offsets: Vec<u64>,
    /// First entry index of each folder.
    pub folder_first_file_index: Vec<usize>,
    /// Folder index of each entry; `None` for entries without a stream
    /// before the first substream.
    pub file_folder_index: Vec<Option<usize>>,
}

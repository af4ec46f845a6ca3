//! LZ4 block encoder.
//!
//! Drives the [`lz77`][crate::lz77] matcher and serialises its blocks as
//! LZ4 pairs. Three properties of the block format shape the design:
//!
//! - literal runs and back-references come in pairs (except the final
//!   literal run), so consecutive literal blocks must merge into one pair;
//! - a pair's token encodes the back-reference length, so a pair cannot be
//!   written before its back-reference is known;
//! - the end-of-block rules (last 5 bytes literal, last match starting at
//!   least 12 bytes before the end) may force trailing back-references to
//!   be rewritten as literals.
//!
//! Pairs therefore stay buffered until enough data follows them, and a
//! deque of recently *expanded* bytes (literals plus materialised
//! back-references, at least one window's worth) is retained so the tail
//! can be rewritten at finish time.

use std::collections::VecDeque;
use std::io::{self, Write};

use crate::error::into_io_error;
use crate::lz77::{Block, Compressor, Parameters, ParametersBuilder};
use crate::{Error, Result};

use super::{
    BACK_REFERENCE_SIZE_MASK, MIN_BACK_REFERENCE_LENGTH, MIN_OFFSET_OF_LAST_BACK_REFERENCE,
    SIZE_BITS, WINDOW_SIZE,
};

/// A literal run plus an optional trailing back-reference.
struct Pair {
    literals: VecDeque<Vec<u8>>,
    literal_length: usize,
    br_offset: usize,
    br_length: usize,
    written: bool,
}

impl Pair {
    fn new() -> Self {
        Self {
            literals: VecDeque::new(),
            literal_length: 0,
            br_offset: 0,
            br_length: 0,
            written: false,
        }
    }

    fn has_back_reference(&self) -> bool {
        self.br_offset > 0
    }

    fn len(&self) -> usize {
        self.literal_length + self.br_length
    }

    /// A pair may be written once enough block data follows it to satisfy
    /// the end-of-block rules whatever comes next.
    fn can_be_written(&self, length_of_blocks_after_this_pair: usize) -> bool {
        self.has_back_reference()
            && length_of_blocks_after_this_pair
                >= MIN_OFFSET_OF_LAST_BACK_REFERENCE + MIN_BACK_REFERENCE_LENGTH
    }

    fn add_literal(&mut self, data: Vec<u8>) {
        self.literal_length += data.len();
        self.literals.push_back(data);
    }

    fn prepend_literal(&mut self, data: Vec<u8>) {
        self.literal_length += data.len();
        self.literals.push_front(data);
    }

    /// Moves this pair's literals to the front of `other`, keeping order.
    fn prepend_to(self, other: &mut Pair) {
        for data in self.literals.into_iter().rev() {
            other.prepend_literal(data);
        }
    }

    fn set_back_reference(&mut self, offset: usize, length: usize) {
        debug_assert!(!self.has_back_reference());
        self.br_offset = offset;
        self.br_length = length;
    }

    fn split_with_new_back_reference_length(&self, new_length: usize) -> Pair {
        Pair {
            literals: self.literals.clone(),
            literal_length: self.literal_length,
            br_offset: self.br_offset,
            br_length: new_length,
            written: false,
        }
    }

    fn write_to<W: Write>(&mut self, out: &mut W) -> Result<()> {
        let literal_length = self.literal_length;
        out.write_all(&[token(literal_length, self.br_length)])?;
        if literal_length >= BACK_REFERENCE_SIZE_MASK {
            write_length(literal_length - BACK_REFERENCE_SIZE_MASK, out)?;
        }
        for data in &self.literals {
            out.write_all(data)?;
        }
        if self.has_back_reference() {
            out.write_all(&(self.br_offset as u16).to_le_bytes())?;
            if self.br_length - MIN_BACK_REFERENCE_LENGTH >= BACK_REFERENCE_SIZE_MASK {
                write_length(
                    self.br_length - MIN_BACK_REFERENCE_LENGTH - BACK_REFERENCE_SIZE_MASK,
                    out,
                )?;
            }
        }
        self.written = true;
        Ok(())
    }
}

fn token(literal_length: usize, br_length: usize) -> u8 {
    let l = literal_length.min(BACK_REFERENCE_SIZE_MASK);
    let br = if br_length < MIN_BACK_REFERENCE_LENGTH {
        0
    } else if br_length < MIN_BACK_REFERENCE_LENGTH + BACK_REFERENCE_SIZE_MASK {
        br_length - MIN_BACK_REFERENCE_LENGTH
    } else {
        BACK_REFERENCE_SIZE_MASK
    };
    ((l << SIZE_BITS) | br) as u8
}

fn write_length<W: Write>(mut length: usize, out: &mut W) -> Result<()> {
    while length >= 255 {
        out.write_all(&[255])?;
        length -= 255;
    }
    out.write_all(&[length as u8])?;
    Ok(())
}

/// Pair buffering and the end-of-block rewriting machinery.
struct PairTracker {
    pairs: VecDeque<Pair>,
    /// Recently expanded byte runs, most recent first, covering at least
    /// the last window of output.
    expanded_blocks: VecDeque<Vec<u8>>,
}

impl PairTracker {
    fn new() -> Self {
        Self {
            pairs: VecDeque::new(),
            expanded_blocks: VecDeque::new(),
        }
    }

    fn accept<W: Write>(&mut self, block: Block<'_>, out: &mut W) -> Result<()> {
        match block {
            Block::Literal(data) => self.add_literal_block(data, out),
            Block::BackReference { offset, length } => {
                self.add_back_reference(offset, length, out)
            }
            Block::EndOfData => self.write_final_literal_block(out),
        }
    }

    fn add_literal_block<W: Write>(&mut self, data: &[u8], out: &mut W) -> Result<()> {
        let pair = self.writable_pair_index(data.len(), out)?;
        self.pairs[pair].add_literal(data.to_vec());
        self.record_literal(data.to_vec());
        self.clear_unused_blocks_and_pairs();
        Ok(())
    }

    fn add_back_reference<W: Write>(
        &mut self,
        offset: usize,
        length: usize,
        out: &mut W,
    ) -> Result<()> {
        let pair = self.writable_pair_index(length, out)?;
        self.pairs[pair].set_back_reference(offset, length);
        let expanded = self.expand(offset, length)?;
        self.expanded_blocks.push_front(expanded);
        self.clear_unused_blocks_and_pairs();
        Ok(())
    }

    fn record_literal(&mut self, data: Vec<u8>) {
        self.expanded_blocks.push_front(data);
    }

    /// Writes every pair that is safe to write given `length` more bytes
    /// of blocks, then returns the index of the open pair at the tail.
    fn writable_pair_index<W: Write>(&mut self, length: usize, out: &mut W) -> Result<usize> {
        self.write_writable_pairs(length, out)?;
        let needs_new = self
            .pairs
            .back()
            .is_none_or(|pair| pair.has_back_reference());
        if needs_new {
            self.pairs.push_back(Pair::new());
        }
        Ok(self.pairs.len() - 1)
    }

    fn write_writable_pairs<W: Write>(
        &mut self,
        length_of_blocks_after_last_pair: usize,
        out: &mut W,
    ) -> Result<()> {
        let mut unwritten_length = length_of_blocks_after_last_pair;
        for pair in self.pairs.iter().rev() {
            if pair.written {
                break;
            }
            unwritten_length += pair.len();
        }
        for index in 0..self.pairs.len() {
            if self.pairs[index].written {
                continue;
            }
            unwritten_length -= self.pairs[index].len();
            if !self.pairs[index].can_be_written(unwritten_length) {
                break;
            }
            self.pairs[index].write_to(out)?;
        }
        Ok(())
    }

    /// Materialises `length` bytes starting `offset` bytes back in the
    /// produced output.
    fn expand(&self, offset: usize, length: usize) -> Result<Vec<u8>> {
        let mut expanded = vec![0u8; length];
        if offset == 1 {
            // Surprisingly common special case: a run of one byte.
            let block = self
                .expanded_blocks
                .front()
                .and_then(|b| b.last())
                .copied()
                .ok_or_else(|| expand_error(offset))?;
            if block != 0 {
                expanded.fill(block);
            }
        } else {
            self.expand_from_list(&mut expanded, offset, length)?;
        }
        Ok(expanded)
    }

    fn expand_from_list(&self, expanded: &mut [u8], offset: usize, length: usize) -> Result<()> {
        let mut offset_remaining = offset as isize;
        let mut length_remaining = length;
        let mut write_offset = 0usize;
        while length_remaining > 0 {
            let copy_len;
            if offset_remaining > 0 {
                // Find the stored block containing the starting offset,
                // counting back from the most recent.
                let mut block_offset = 0usize;
                let mut found = None;
                for block in &self.expanded_blocks {
                    if block.len() + block_offset >= offset_remaining as usize {
                        found = Some(block);
                        break;
                    }
                    block_offset += block.len();
                }
                let block = found.ok_or_else(|| expand_error(offset))?;
                let copy_offset = block_offset + block.len() - offset_remaining as usize;
                copy_len = length_remaining.min(block.len() - copy_offset);
                expanded[write_offset..write_offset + copy_len]
                    .copy_from_slice(&block[copy_offset..copy_offset + copy_len]);
            } else {
                // The copy has reached the bytes materialised by this very
                // expansion (overlapping reference); keep reading from them.
                let copy_offset = (-offset_remaining) as usize;
                copy_len = length_remaining.min(write_offset - copy_offset);
                expanded.copy_within(copy_offset..copy_offset + copy_len, write_offset);
            }
            offset_remaining -= copy_len as isize;
            length_remaining -= copy_len;
            write_offset += copy_len;
        }
        Ok(())
    }

    fn clear_unused_blocks_and_pairs(&mut self) {
        self.clear_unused_blocks();
        self.clear_unused_pairs();
    }

    /// Drops expanded blocks beyond one window of retained output.
    fn clear_unused_blocks(&mut self) {
        let mut retained = 0usize;
        let mut keep = 0usize;
        for block in &self.expanded_blocks {
            keep += 1;
            retained += block.len();
            if retained >= WINDOW_SIZE {
                break;
            }
        }
        self.expanded_blocks.truncate(keep);
    }

    /// Drops written pairs beyond one window of block lengths.
    fn clear_unused_pairs(&mut self) {
        let mut retained = 0usize;
        let mut keep = 0usize;
        for pair in self.pairs.iter().rev() {
            keep += 1;
            retained += pair.len();
            if retained >= WINDOW_SIZE {
                break;
            }
        }
        while self.pairs.len() > keep {
            if !self.pairs.front().is_some_and(|pair| pair.written) {
                break;
            }
            self.pairs.pop_front();
        }
    }

    /// Rewrites the trailing pairs so the block ends with at least twelve
    /// bytes behind the last back-reference and a literal-only pair.
    ///
    /// All trailing pairs covering the last twelve bytes except the first
    /// are merged into a literal-only replacement by expanding their
    /// back-references. The first of them keeps a (shortened)
    /// back-reference when it can donate the still-needed bytes while
    /// staying at least four long; otherwise it is expanded as well.
    fn rewrite_last_pairs(&mut self) -> Result<()> {
        let mut tail_start = self.pairs.len();
        let mut covered = 0usize;
        while tail_start > 0 {
            if self.pairs[tail_start - 1].written {
                break;
            }
            covered += self.pairs[tail_start - 1].len();
            tail_start -= 1;
            if covered >= MIN_OFFSET_OF_LAST_BACK_REFERENCE {
                break;
            }
        }
        let mut last_pairs: Vec<Pair> = self.pairs.split_off(tail_start).into_iter().collect();
        if last_pairs.is_empty() {
            // Nothing unwritten at all (empty stream).
            return Ok(());
        }

        // Merging everything into a single literal would hurt compression
        // when the first tail pair holds a long back-reference, so that one
        // is split instead whenever possible.
        let to_expand: usize = last_pairs.iter().skip(1).map(Pair::len).sum();
        let mut replacement = Pair::new();
        if to_expand > 0 {
            replacement.prepend_literal(self.expand(to_expand, to_expand)?);
        }
        let split_candidate = last_pairs.remove(0);
        let still_needed = MIN_OFFSET_OF_LAST_BACK_REFERENCE - to_expand;
        let br_len = if split_candidate.has_back_reference() {
            split_candidate.br_length
        } else {
            0
        };
        if split_candidate.has_back_reference()
            && br_len >= MIN_BACK_REFERENCE_LENGTH + still_needed
        {
            replacement.prepend_literal(self.expand(to_expand + still_needed, still_needed)?);
            self.pairs
                .push_back(split_candidate.split_with_new_back_reference_length(br_len - still_needed));
        } else {
            if split_candidate.has_back_reference() {
                replacement.prepend_literal(self.expand(to_expand + br_len, br_len)?);
            }
            split_candidate.prepend_to(&mut replacement);
        }
        self.pairs.push_back(replacement);
        Ok(())
    }

    fn write_final_literal_block<W: Write>(&mut self, out: &mut W) -> Result<()> {
        self.rewrite_last_pairs()?;
        for index in 0..self.pairs.len() {
            if !self.pairs[index].written {
                self.pairs[index].write_to(out)?;
            }
        }
        self.pairs.clear();
        Ok(())
    }
}

fn expand_error(offset: usize) -> Error {
    Error::Io(io::Error::other(format!(
        "failed to find a block containing offset {}",
        offset
    )))
}

/// A writer producing the LZ4 *block* format.
///
/// ```rust
/// use sieben::lz4::{BlockLz4Reader, BlockLz4Writer};
/// use std::io::{Cursor, Read, Write};
///
/// # fn main() -> std::io::Result<()> {
/// let mut writer = BlockLz4Writer::new(Vec::new());
/// writer.write_all(b"to be or not to be, that is the question")?;
/// let block = writer.finish()?;
///
/// let mut decoded = Vec::new();
/// BlockLz4Reader::new(Cursor::new(block)).read_to_end(&mut decoded)?;
/// assert_eq!(decoded, b"to be or not to be, that is the question");
/// # Ok(())
/// # }
/// ```
pub struct BlockLz4Writer<W: Write> {
    compressor: Compressor,
    tracker: PairTracker,
    out: Option<W>,
    finished: bool,
}

impl<W: Write> BlockLz4Writer<W> {
    /// Creates a writer with the default block-format parameters.
    pub fn new(out: W) -> Self {
        let params = Self::parameter_builder()
            .build()
            .expect("block format parameters are valid");
        Self::with_parameters(out, params)
    }

    /// Creates a writer with custom matcher parameters.
    ///
    /// Use [`parameter_builder`][Self::parameter_builder] as the starting
    /// point to stay within the block format's limits.
    pub fn with_parameters(out: W, params: Parameters) -> Self {
        Self {
            compressor: Compressor::new(params),
            tracker: PairTracker::new(),
            out: Some(out),
            finished: false,
        }
    }

    /// A parameter builder preconfigured for the block format: 64 KiB
    /// window, matches of 4 to 65535 bytes, offsets up to 65535.
    pub fn parameter_builder() -> ParametersBuilder {
        Parameters::builder(WINDOW_SIZE)
            .min_back_ref_len(MIN_BACK_REFERENCE_LENGTH)
            .max_back_ref_len(WINDOW_SIZE - 1)
            .max_offset(WINDOW_SIZE - 1)
            .max_literal_len(WINDOW_SIZE - 1)
    }

    /// Seeds the match window with the tail of `data` (block-dependent
    /// frames). Only allowed before any data is written.
    pub fn prefill(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.compressor.prefill(data)?;
        self.tracker.record_literal(data.to_vec());
        Ok(())
    }

    /// Compresses all remaining data, writes the rewritten tail and
    /// returns the underlying writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.do_finish()?;
        Ok(self.out.take().expect("writer still present"))
    }

    fn do_finish(&mut self) -> io::Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        let tracker = &mut self.tracker;
        let out = self.out.as_mut().expect("writer still present");
        self.compressor
            .finish(&mut |block| tracker.accept(block, out))
            .map_err(into_io_error)
    }
}

impl<W: Write> Write for BlockLz4Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let tracker = &mut self.tracker;
        let out = self.out.as_mut().expect("writer still present");
        self.compressor
            .compress(buf, &mut |block| tracker.accept(block, out))
            .map_err(into_io_error)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.out {
            Some(out) => out.flush(),
            None => Ok(()),
        }
    }
}

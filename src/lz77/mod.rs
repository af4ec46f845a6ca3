//! LZ77 hash-chain string matcher.
//!
//! The core shared by LZ77-family encoders: input is split into literal
//! runs and back-references ("add `length` bytes equal to those `offset`
//! bytes back"). The matcher follows the scheme of RFC 1951 section 4 with
//! the three-byte rolling hash used by zlib: a `head` table maps each hash
//! to the most recent window position with that hash, and `prev` chains
//! all earlier positions sharing it.
//!
//! [`Compressor`] is fed bytes through [`compress`][Compressor::compress]
//! and emits [`Block`]s to a caller-supplied sink; [`finish`][Compressor::finish]
//! flushes the final literal run and emits [`Block::EndOfData`]. Literal
//! blocks borrow the sliding window directly and must be consumed before
//! the next call into the compressor.
//!
//! ```rust
//! use sieben::lz77::{Block, Compressor, Parameters};
//!
//! # fn main() -> sieben::Result<()> {
//! let params = Parameters::builder(16).min_back_ref_len(3).build()?;
//! let mut compressor = Compressor::new(params);
//! let mut blocks = Vec::new();
//! let mut sink = |block: Block<'_>| -> sieben::Result<()> {
//!     blocks.push(format!("{:?}", block));
//!     Ok(())
//! };
//! compressor.compress(b"abcdeabcdeabcde", &mut sink)?;
//! compressor.finish(&mut sink)?;
//! # Ok(())
//! # }
//! ```

use crate::{Error, Result};

/// Number of bytes hashed together.
const HASH_BYTES: usize = 3;

/// Sentinel for "no position" in `head` and `prev`.
const NO_MATCH: i32 = -1;

/// 15-bit hash table.
const HASH_SIZE: usize = 1 << 15;
const HASH_MASK: usize = HASH_SIZE - 1;

/// Hash shift: after three updates all influence of the first byte is gone.
const H_SHIFT: u32 = 5;

/// A block emitted by the compressor.
#[derive(Debug, PartialEq, Eq)]
pub enum Block<'a> {
    /// A run of bytes to copy verbatim.
    ///
    /// The slice is a live view into the sliding window; it is only valid
    /// until the next call to `compress` or `finish`.
    Literal(&'a [u8]),
    /// A reference to `length` bytes starting `offset` bytes back.
    BackReference {
        /// Distance back from the current position (1-based).
        offset: usize,
        /// Number of bytes to repeat.
        length: usize,
    },
    /// End of the data; always the last block.
    EndOfData,
}

/// Tuning parameters for the matcher.
///
/// Build with [`Parameters::builder`]; unset values get defaults derived
/// from the window size.
#[derive(Debug, Clone)]
pub struct Parameters {
    window_size: usize,
    min_back_ref_len: usize,
    max_back_ref_len: usize,
    max_offset: usize,
    max_literal_len: usize,
    nice_back_ref_len: usize,
    max_candidates: usize,
    lazy_matching: bool,
    lazy_threshold: usize,
}

impl Parameters {
    /// Starts building parameters for the given window size.
    ///
    /// The window size must be a power of two; it bounds the offset a
    /// back-reference can take.
    pub fn builder(window_size: usize) -> ParametersBuilder {
        ParametersBuilder {
            window_size,
            min_back_ref_len: HASH_BYTES,
            max_back_ref_len: None,
            max_offset: None,
            max_literal_len: None,
            nice_back_ref_len: None,
            max_candidates: 32,
            lazy_matching: true,
            lazy_threshold: None,
        }
    }

    /// The window size.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Minimal length of an emitted back-reference.
    pub fn min_back_ref_len(&self) -> usize {
        self.min_back_ref_len
    }

    /// Maximal length of an emitted back-reference.
    pub fn max_back_ref_len(&self) -> usize {
        self.max_back_ref_len
    }

    /// Maximal offset of an emitted back-reference.
    pub fn max_offset(&self) -> usize {
        self.max_offset
    }

    /// Maximal length of an emitted literal block.
    pub fn max_literal_len(&self) -> usize {
        self.max_literal_len
    }

    /// Match length past which the chain search stops early.
    pub fn nice_back_ref_len(&self) -> usize {
        self.nice_back_ref_len
    }

    /// Maximal number of chain candidates examined per position.
    pub fn max_candidates(&self) -> usize {
        self.max_candidates
    }

    /// Whether one-position lazy matching is enabled.
    pub fn lazy_matching(&self) -> bool {
        self.lazy_matching
    }

    /// Match length up to which lazy matching is attempted.
    pub fn lazy_threshold(&self) -> usize {
        self.lazy_threshold
    }
}

/// Builder for [`Parameters`].
#[derive(Debug, Clone)]
pub struct ParametersBuilder {
    window_size: usize,
    min_back_ref_len: usize,
    max_back_ref_len: Option<usize>,
    max_offset: Option<usize>,
    max_literal_len: Option<usize>,
    nice_back_ref_len: Option<usize>,
    max_candidates: usize,
    lazy_matching: bool,
    lazy_threshold: Option<usize>,
}

impl ParametersBuilder {
    /// Sets the minimal back-reference length. A true minimum of 3 is
    /// enforced; the matcher cannot hash shorter sequences.
    pub fn min_back_ref_len(mut self, len: usize) -> Self {
        self.min_back_ref_len = len.max(HASH_BYTES);
        self
    }

    /// Sets the maximal back-reference length, clamped to
    /// `window_size - 1`.
    pub fn max_back_ref_len(mut self, len: usize) -> Self {
        self.max_back_ref_len = Some(len);
        self
    }

    /// Sets the maximal back-reference offset, clamped to
    /// `window_size - 1`.
    pub fn max_offset(mut self, offset: usize) -> Self {
        self.max_offset = Some(offset);
        self
    }

    /// Sets the maximal literal block length, clamped to the window size.
    pub fn max_literal_len(mut self, len: usize) -> Self {
        self.max_literal_len = Some(len);
        self
    }

    /// Sets the match length past which the chain search stops.
    pub fn nice_back_ref_len(mut self, len: usize) -> Self {
        self.nice_back_ref_len = Some(len);
        self
    }

    /// Sets the chain-candidate budget per position.
    pub fn max_candidates(mut self, candidates: usize) -> Self {
        self.max_candidates = candidates.max(1);
        self
    }

    /// Enables or disables one-position lazy matching.
    pub fn lazy_matching(mut self, enabled: bool) -> Self {
        self.lazy_matching = enabled;
        self
    }

    /// Sets the match length up to which lazy matching is attempted.
    pub fn lazy_threshold(mut self, threshold: usize) -> Self {
        self.lazy_threshold = Some(threshold);
        self
    }

    /// Validates and builds the parameters.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParameters`] if the window size is not a power of
    /// two or smaller than the minimal back-reference length.
    pub fn build(self) -> Result<Parameters> {
        if self.window_size < 2 || !self.window_size.is_power_of_two() {
            return Err(Error::InvalidParameters(format!(
                "window size {} is not a power of two",
                self.window_size
            )));
        }
        if self.min_back_ref_len > self.window_size {
            return Err(Error::InvalidParameters(format!(
                "minimal back-reference length {} exceeds window size {}",
                self.min_back_ref_len, self.window_size
            )));
        }
        let max_back_ref_len = match self.max_back_ref_len {
            Some(len) if len < self.min_back_ref_len => self.min_back_ref_len,
            Some(len) => len.min(self.window_size - 1),
            None => self.window_size - 1,
        };
        let max_offset = match self.max_offset {
            Some(offset) if offset >= 1 => offset.min(self.window_size - 1),
            _ => self.window_size - 1,
        };
        let max_literal_len = match self.max_literal_len {
            Some(len) if len >= 1 => len.min(self.window_size),
            _ => self.window_size,
        };
        let nice_back_ref_len = self
            .nice_back_ref_len
            .unwrap_or_else(|| self.min_back_ref_len.max(max_back_ref_len / 2))
            .max(self.min_back_ref_len);
        let lazy_threshold = self
            .lazy_threshold
            .unwrap_or(nice_back_ref_len)
            .max(self.min_back_ref_len);
        Ok(Parameters {
            window_size: self.window_size,
            min_back_ref_len: self.min_back_ref_len,
            max_back_ref_len,
            max_offset,
            max_literal_len,
            nice_back_ref_len,
            max_candidates: self.max_candidates,
            lazy_matching: self.lazy_matching,
            lazy_threshold,
        })
    }
}

/// The sliding-window matcher.
///
/// Maintains a window of twice the configured size: the lower half is
/// history, the upper half receives new input. When the free tail becomes
/// too small, the upper half slides down and every stored position is
/// rebased.
pub struct Compressor {
    params: Parameters,
    /// The sliding window, twice the configured window size.
    window: Vec<u8>,
    /// Latest position per hash, `NO_MATCH` when empty.
    head: Vec<i32>,
    /// Previous position with the same hash, indexed by position modulo
    /// the window size.
    prev: Vec<i32>,
    w_mask: usize,
    initialized: bool,
    /// Position to be encoded next.
    current_position: isize,
    /// Bytes available from `current_position` on.
    lookahead: usize,
    /// Rolling hash of the three bytes at the current position.
    insert_hash: usize,
    /// Start of the pending literal block.
    block_start: isize,
    /// Start of the current match, set by the chain search.
    match_start: isize,
    /// Hash insertions for the tail of the last match that must wait for
    /// more data.
    missed_inserts: usize,
}

impl Compressor {
    /// Creates a compressor with the given parameters.
    pub fn new(params: Parameters) -> Self {
        let window_size = params.window_size();
        Self {
            window: vec![0; window_size * 2],
            head: vec![NO_MATCH; HASH_SIZE],
            prev: vec![0; window_size],
            w_mask: window_size - 1,
            initialized: false,
            current_position: 0,
            lookahead: 0,
            insert_hash: 0,
            block_start: 0,
            match_start: NO_MATCH as isize,
            missed_inserts: 0,
            params,
        }
    }

    /// Feeds bytes into the compressor.
    ///
    /// Zero or more blocks are emitted to `sink` during the call.
    pub fn compress<F>(&mut self, data: &[u8], sink: &mut F) -> Result<()>
    where
        F: FnMut(Block<'_>) -> Result<()>,
    {
        let window_size = self.params.window_size();
        let mut offset = 0;
        let mut len = data.len();
        while len > window_size {
            self.do_compress(&data[offset..offset + window_size], sink)?;
            offset += window_size;
            len -= window_size;
        }
        if len > 0 {
            self.do_compress(&data[offset..], sink)?;
        }
        Ok(())
    }

    /// Processes all remaining data and emits [`Block::EndOfData`].
    pub fn finish<F>(&mut self, sink: &mut F) -> Result<()>
    where
        F: FnMut(Block<'_>) -> Result<()>,
    {
        if self.block_start != self.current_position || self.lookahead > 0 {
            self.current_position += self.lookahead as isize;
            self.lookahead = 0;
            self.flush_literal_block(sink)?;
        }
        sink(Block::EndOfData)
    }

    /// Seeds the window with the tail of `data` so back-references can
    /// reach into it (block-dependent formats).
    ///
    /// # Errors
    ///
    /// [`Error::PrefillAfterStart`] once compression has started.
    pub fn prefill(&mut self, data: &[u8]) -> Result<()> {
        if self.current_position != 0 || self.lookahead != 0 {
            return Err(Error::PrefillAfterStart);
        }
        let len = self.params.window_size().min(data.len());
        self.window[..len].copy_from_slice(&data[data.len() - len..]);
        if len >= HASH_BYTES {
            self.initialize();
            let stop = len - HASH_BYTES + 1;
            for i in 0..stop {
                self.insert_string(i as isize);
            }
            self.missed_inserts = HASH_BYTES - 1;
        } else {
            // Not enough data to hash anything yet.
            self.missed_inserts = len;
        }
        self.block_start = len as isize;
        self.current_position = len as isize;
        Ok(())
    }

    // Precondition: data.len() <= window_size.
    fn do_compress<F>(&mut self, data: &[u8], sink: &mut F) -> Result<()>
    where
        F: FnMut(Block<'_>) -> Result<()>,
    {
        let space_left =
            self.window.len() as isize - self.current_position - self.lookahead as isize;
        if data.len() as isize > space_left {
            self.slide(sink)?;
        }
        let start = (self.current_position + self.lookahead as isize) as usize;
        self.window[start..start + data.len()].copy_from_slice(data);
        self.lookahead += data.len();
        if !self.initialized && self.lookahead >= self.params.min_back_ref_len() {
            self.initialize();
        }
        if self.initialized {
            self.compress_pending(sink)?;
        }
        Ok(())
    }

    fn compress_pending<F>(&mut self, sink: &mut F) -> Result<()>
    where
        F: FnMut(Block<'_>) -> Result<()>,
    {
        let min_match = self.params.min_back_ref_len();
        let lazy = self.params.lazy_matching();
        let lazy_threshold = self.params.lazy_threshold();

        while self.lookahead >= min_match {
            self.catch_up_missed_inserts();
            let mut match_length = 0;
            let hash_head = self.insert_string(self.current_position);
            if hash_head != NO_MATCH {
                // Sets match_start as a side effect.
                match_length = self.longest_match(hash_head as isize);
                if lazy && match_length <= lazy_threshold && self.lookahead > min_match {
                    match_length = self.longest_match_for_next_position(match_length);
                }
            }
            if match_length >= min_match {
                if self.block_start != self.current_position {
                    self.flush_literal_block(sink)?;
                }
                self.flush_back_reference(match_length, sink)?;
                self.insert_strings_in_match(match_length);
                self.lookahead -= match_length;
                self.current_position += match_length as isize;
                self.block_start = self.current_position;
            } else {
                // No usable match, extend the pending literal block.
                self.lookahead -= 1;
                self.current_position += 1;
                if self.current_position - self.block_start
                    >= self.params.max_literal_len() as isize
                {
                    self.flush_literal_block(sink)?;
                    self.block_start = self.current_position;
                }
            }
        }
        Ok(())
    }

    /// Walks the hash chain for the longest match within the offset and
    /// candidate budgets. Sets `match_start` as a side effect; the return
    /// value is below the minimal length when nothing usable was found.
    fn longest_match(&mut self, mut match_head: isize) -> usize {
        let min_length = self.params.min_back_ref_len();
        let mut longest = min_length - 1;
        let max_possible = self.params.max_back_ref_len().min(self.lookahead);
        let min_index = (self.current_position - self.params.max_offset() as isize).max(0);
        let nice = max_possible.min(self.params.nice_back_ref_len());

        let mut candidates = 0;
        while candidates < self.params.max_candidates() && match_head >= min_index {
            let mut current_length = 0;
            for i in 0..max_possible {
                if self.window[(match_head + i as isize) as usize]
                    != self.window[(self.current_position + i as isize) as usize]
                {
                    break;
                }
                current_length += 1;
            }
            if current_length > longest {
                longest = current_length;
                self.match_start = match_head;
                if current_length >= nice {
                    // No point searching further back.
                    break;
                }
            }
            match_head = self.prev[(match_head & self.w_mask as isize) as usize] as isize;
            candidates += 1;
        }
        longest
    }

    /// Tries the next position for a strictly longer match; rolls all
    /// window and hash state back when it is not.
    fn longest_match_for_next_position(&mut self, prev_match_length: usize) -> usize {
        let prev_match_start = self.match_start;
        let prev_insert_hash = self.insert_hash;

        self.lookahead -= 1;
        self.current_position += 1;
        let hash_head = self.insert_string(self.current_position);
        let prev_hash_head = self.prev[(self.current_position & self.w_mask as isize) as usize];
        let mut match_length = if hash_head != NO_MATCH {
            self.longest_match(hash_head as isize)
        } else {
            0
        };

        if match_length <= prev_match_length {
            // Use the first match; undo the probe.
            match_length = prev_match_length;
            self.match_start = prev_match_start;
            self.head[self.insert_hash] = prev_hash_head;
            self.insert_hash = prev_insert_hash;
            self.current_position -= 1;
            self.lookahead += 1;
        }
        match_length
    }

    /// Inserts the three-byte sequence at `pos` into the dictionary and
    /// returns the previous chain head. Updates `insert_hash` and `prev`.
    fn insert_string(&mut self, pos: isize) -> i32 {
        self.insert_hash = next_hash(
            self.insert_hash,
            self.window[(pos - 1 + HASH_BYTES as isize) as usize],
        );
        let hash_head = self.head[self.insert_hash];
        self.prev[(pos & self.w_mask as isize) as usize] = hash_head;
        self.head[self.insert_hash] = pos as i32;
        hash_head
    }

    /// Inserts the positions covered by the current match. The last two
    /// bytes of the match hash data that may not be available yet; those
    /// insertions are recorded and replayed later.
    fn insert_strings_in_match(&mut self, match_length: usize) {
        let stop = (match_length - 1).min(self.lookahead.saturating_sub(HASH_BYTES));
        // The current position itself has been inserted already.
        for i in 1..=stop {
            self.insert_string(self.current_position + i as isize);
        }
        self.missed_inserts = match_length - stop - 1;
    }

    fn catch_up_missed_inserts(&mut self) {
        while self.missed_inserts > 0 {
            let pos = self.current_position - self.missed_inserts as isize;
            self.missed_inserts -= 1;
            self.insert_string(pos);
        }
    }

    fn flush_literal_block<F>(&mut self, sink: &mut F) -> Result<()>
    where
        F: FnMut(Block<'_>) -> Result<()>,
    {
        sink(Block::Literal(
            &self.window[self.block_start as usize..self.current_position as usize],
        ))
    }

    fn flush_back_reference<F>(&mut self, match_length: usize, sink: &mut F) -> Result<()>
    where
        F: FnMut(Block<'_>) -> Result<()>,
    {
        sink(Block::BackReference {
            offset: (self.current_position - self.match_start) as usize,
            length: match_length,
        })
    }

    fn initialize(&mut self) {
        for i in 0..HASH_BYTES - 1 {
            self.insert_hash = next_hash(self.insert_hash, self.window[i]);
        }
        self.initialized = true;
    }

    /// Moves the upper half of the window down and rebases every stored
    /// position. All indices into the window move together; positions that
    /// slide out of range become `NO_MATCH`.
    fn slide<F>(&mut self, sink: &mut F) -> Result<()>
    where
        F: FnMut(Block<'_>) -> Result<()>,
    {
        let window_size = self.params.window_size();
        if self.block_start != self.current_position && self.block_start < window_size as isize {
            self.flush_literal_block(sink)?;
            self.block_start = self.current_position;
        }
        self.window.copy_within(window_size.., 0);
        self.current_position -= window_size as isize;
        self.match_start -= window_size as isize;
        self.block_start -= window_size as isize;
        for head in self.head.iter_mut() {
            *head = if *head >= window_size as i32 {
                *head - window_size as i32
            } else {
                NO_MATCH
            };
        }
        for prev in self.prev.iter_mut() {
            *prev = if *prev >= window_size as i32 {
                *prev - window_size as i32
            } else {
                NO_MATCH
            };
        }
        Ok(())
    }
}

/// Rolling hash step: for bytes `ABCD`, if `h` hashes `ABC` then
/// `next_hash(h, D)` hashes `BCD`.
fn next_hash(old_hash: usize, next_byte: u8) -> usize {
    ((old_hash << H_SHIFT) ^ next_byte as usize) & HASH_MASK
}

//! Reading 7z archives.
//!
//! [`SevenZReader`] opens a seekable byte source, parses the archive
//! metadata (two passes, memory-bounded) and exposes the entries both
//! sequentially ([`next_entry`][SevenZReader::next_entry] +
//! [`read`][SevenZReader::read]) and randomly
//! ([`input_stream`][SevenZReader::input_stream]).
//!
//! In solid archives many entries share one decoded folder stream. Random
//! access inside a folder therefore re-decodes and discards the preceding
//! entries; the reader defers that work until data is actually requested so
//! that skipping whole folders costs nothing.
//!
//! ```rust,no_run
//! use sieben::read::SevenZReader;
//!
//! # fn main() -> sieben::Result<()> {
//! let mut archive = SevenZReader::open_path("archive.7z")?;
//! while let Some(entry) = archive.next_entry()? {
//!     println!("{}: {} bytes", entry.name.as_deref().unwrap_or("<unnamed>"), entry.size);
//! }
//! # Ok(())
//! # }
//! ```

pub mod entry;
pub mod options;
mod recovery;

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;
use std::rc::Rc;

use crate::checksum::{Crc32, Crc32VerifyingReader};
use crate::codec;
use crate::error::{from_io_error, into_io_error};
use crate::format::header::StartHeader;
use crate::format::parser::{initialize_archive, Archive};
use crate::format::SIGNATURE_HEADER_SIZE;
use crate::password::Password;
use crate::stream::{BoundedChannelReader, Channel, CountingReader};
use crate::{Error, Result, READ_BUFFER_SIZE};

pub use entry::{ContentMethod, Entry};
pub use options::ReaderOptions;

/// Byte counts for the entry currently being read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EntryStatistics {
    /// Compressed bytes consumed from the channel for the current entry.
    pub compressed_bytes_read: u64,
    /// Uncompressed bytes handed to the caller for the current entry.
    pub uncompressed_bytes_read: u64,
}

/// Result of a full-archive verification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifyResult {
    /// Entries whose data was decoded and checked.
    pub entries_verified: usize,
    /// Pack streams whose declared CRC was checked against the raw bytes.
    pub pack_streams_verified: usize,
}

/// One entry queued on the current folder stream.
///
/// In solid folders entries sit back to back on the decoded stream;
/// entries queued ahead of the current one are decoded and discarded only
/// when data is actually requested.
struct QueuedEntry {
    index: usize,
    name: Option<String>,
    size: u64,
    remaining: u64,
    crc: Option<u32>,
    hasher: Crc32,
    verified: bool,
}

impl QueuedEntry {
    fn verify(&mut self) -> Result<()> {
        self.verified = true;
        if let Some(expected) = self.crc {
            let actual = self.hasher.finalize();
            if actual != expected {
                return Err(Error::CrcMismatch {
                    entry_index: self.index,
                    entry_name: self.name.clone(),
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }
}

/// The currently open folder: its decoder stack and the entry queue.
struct FolderState {
    stream: Box<dyn Read>,
    queued: VecDeque<QueuedEntry>,
    /// Decoded bytes not yet drawn from the folder stream.
    remaining: u64,
    /// Whether the end-of-folder check (folder CRC) has run.
    end_checked: bool,
}

/// A streaming reader for 7z archives.
///
/// The reader owns its underlying channel; [`close`][Self::close] (or
/// dropping) closes it and wipes the password buffer.
pub struct SevenZReader<R: Read + Seek + 'static> {
    channel: Option<Channel<R>>,
    archive: Archive,
    password: Option<Password>,
    default_name: Option<String>,
    use_default_name: bool,
    current_entry: Option<usize>,
    current_folder: Option<usize>,
    folder: Option<FolderState>,
    compressed_count: Rc<Cell<u64>>,
    uncompressed_read: u64,
}

impl SevenZReader<BufReader<File>> {
    /// Opens an archive from a file path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_path_with_options(path, ReaderOptions::default())
    }

    /// Opens an archive from a file path with options.
    pub fn open_path_with_options<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        let file = File::open(path)?;
        Self::open_with_options(BufReader::new(file), options)
    }
}

impl<R: Read + Seek + 'static> fmt::Debug for SevenZReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SevenZReader").finish_non_exhaustive()
    }
}

impl<R: Read + Seek + 'static> SevenZReader<R> {
    /// Opens an archive from any seekable byte source.
    pub fn open(reader: R) -> Result<Self> {
        Self::open_with_options(reader, ReaderOptions::default())
    }

    /// Opens an archive with options.
    ///
    /// # Errors
    ///
    /// Besides I/O and format errors, returns [`Error::Recoverable`] for a
    /// zeroed start header when recovery is disabled, and
    /// [`Error::MemoryLimit`] when the header estimate exceeds the
    /// configured limit.
    pub fn open_with_options(reader: R, options: ReaderOptions) -> Result<Self> {
        let channel = Channel::new(reader);
        let file_size = channel.size()?;

        let mut head = BoundedChannelReader::new(channel.clone(), 0, SIGNATURE_HEADER_SIZE);
        let archive = match StartHeader::parse(&mut head, file_size) {
            Ok(start) => initialize_archive(
                &channel,
                file_size,
                &start,
                true,
                options.password.as_ref(),
                options.max_memory_limit_kib,
            )?,
            Err(Error::Recoverable) if options.recover_broken_archives => {
                recovery::try_to_locate_end_header(
                    &channel,
                    file_size,
                    options.recovery_search_limit,
                    options.password.as_ref(),
                    options.max_memory_limit_kib,
                )?
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            channel: Some(channel),
            archive,
            password: options.password,
            default_name: options.default_name,
            use_default_name: options.use_default_name_for_unnamed_entries,
            current_entry: None,
            current_folder: None,
            folder: None,
            compressed_count: Rc::new(Cell::new(0)),
            uncompressed_read: 0,
        })
    }

    /// All entries of the archive, in order.
    pub fn entries(&self) -> &[Entry] {
        &self.archive.files
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.archive.files.len()
    }

    /// Returns true if the archive has no entries.
    pub fn is_empty(&self) -> bool {
        self.archive.files.is_empty()
    }

    /// The parsed archive metadata.
    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// Advances the cursor to the next entry and returns it.
    ///
    /// Returns `Ok(None)` once all entries have been visited. The entry's
    /// data is read with [`read`][Self::read]; skipping to the next entry
    /// without reading is free until another entry of the same folder needs
    /// its data.
    pub fn next_entry(&mut self) -> Result<Option<&Entry>> {
        let next = match self.current_entry {
            None => 0,
            Some(current) => current + 1,
        };
        if next >= self.archive.files.len() {
            return Ok(None);
        }
        self.current_entry = Some(next);
        if self.use_default_name && self.archive.files[next].name.is_none() {
            self.archive.files[next].name = self.default_name.clone();
        }
        self.build_decoding_stream(next, false)?;
        self.uncompressed_read = 0;
        self.compressed_count.set(0);
        Ok(Some(&self.archive.files[next]))
    }

    /// Reads data of the current entry.
    ///
    /// Returns `Ok(0)` at the end of the entry. A CRC mismatch surfaces on
    /// the read following the last data byte.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let current = self.current_entry.ok_or(Error::NoCurrentEntry)?;
        if self.archive.files[current].size == 0 || buf.is_empty() {
            return Ok(0);
        }
        let n = self.read_current(buf)?;
        self.uncompressed_read += n as u64;
        Ok(n)
    }

    /// Returns a stream over the given entry's data (random access).
    ///
    /// For solid archives this may decode and discard every preceding
    /// entry of the folder; any previously returned stream is invalidated.
    pub fn input_stream(&mut self, index: usize) -> Result<EntryReader<'_, R>> {
        if index >= self.archive.files.len() {
            return Err(Error::EntryNotFound { index });
        }
        self.build_decoding_stream(index, true)?;
        self.current_entry = Some(index);
        self.current_folder = self.archive.stream_map.file_folder_index[index];
        Ok(EntryReader { reader: self })
    }

    /// Reads a whole entry into memory (random access).
    pub fn read_to_vec(&mut self, index: usize) -> Result<Vec<u8>> {
        let size = self.archive.files[self.checked_index(index)?].size;
        let mut stream = self.input_stream(index)?;
        let mut out = Vec::with_capacity(size as usize);
        io::Read::read_to_end(&mut stream, &mut out).map_err(from_io_error)?;
        Ok(out)
    }

    /// Byte counts for the current entry.
    pub fn statistics_for_current_entry(&self) -> EntryStatistics {
        EntryStatistics {
            compressed_bytes_read: self.compressed_count.get(),
            uncompressed_bytes_read: self.uncompressed_read,
        }
    }

    /// Decodes every entry and checks all declared CRCs: pack streams
    /// against the raw bytes, entries and folders against the decoded data.
    pub fn verify(&mut self) -> Result<VerifyResult> {
        let mut result = VerifyResult::default();

        let channel = self.channel()?.clone();
        for index in 0..self.archive.pack_crcs.len() {
            let Some(expected) = self.archive.pack_crcs[index] else {
                continue;
            };
            let offset = SIGNATURE_HEADER_SIZE
                + self.archive.pack_pos
                + self.archive.stream_map.pack_stream_offsets[index];
            let size = self.archive.pack_sizes[index];
            let mut reader = BoundedChannelReader::new(channel.clone(), offset, size);
            let mut hasher = Crc32::new();
            let mut buf = [0u8; READ_BUFFER_SIZE];
            let mut total = 0u64;
            loop {
                let n = reader.read(&mut buf).map_err(Error::Io)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buf[..n]);
                total += n as u64;
            }
            if total != size {
                return Err(Error::Truncated("pack stream"));
            }
            let actual = hasher.finalize();
            if actual != expected {
                return Err(Error::PackCrcMismatch {
                    index,
                    expected,
                    actual,
                });
            }
            result.pack_streams_verified += 1;
        }

        for index in 0..self.archive.files.len() {
            let file = &self.archive.files[index];
            if !file.has_stream || file.size == 0 {
                continue;
            }
            let mut stream = self.input_stream(index)?;
            io::copy(&mut stream, &mut io::sink()).map_err(from_io_error)?;
            result.entries_verified += 1;
        }

        Ok(result)
    }

    /// Closes the reader: drops the folder stream, closes the channel and
    /// wipes the password buffer. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.folder = None;
        self.channel = None;
        self.password = None;
        Ok(())
    }

    fn channel(&self) -> Result<&Channel<R>> {
        self.channel
            .as_ref()
            .ok_or_else(|| Error::Io(io::Error::other("archive reader is closed")))
    }

    fn checked_index(&self, index: usize) -> Result<usize> {
        if index < self.archive.files.len() {
            Ok(index)
        } else {
            Err(Error::EntryNotFound { index })
        }
    }

    /// Prepares the folder stream and entry queue so that `read` can serve
    /// `entry_index`.
    fn build_decoding_stream(&mut self, entry_index: usize, is_random_access: bool) -> Result<()> {
        let folder_index = match self.archive.stream_map.file_folder_index.get(entry_index) {
            Some(&Some(folder)) => folder,
            Some(&None) => {
                // Entry without a stream; nothing to decode.
                if let Some(folder) = &mut self.folder {
                    folder.queued.clear();
                }
                return Ok(());
            }
            None => return Err(Error::EntryNotFound { index: entry_index }),
        };

        let is_in_same_folder = self.current_folder == Some(folder_index) && self.folder.is_some();
        if is_in_same_folder {
            // The folder stays open; decoding of earlier entries is
            // deferred until data is requested. Content methods are shared
            // across the folder.
            if entry_index > 0 && self.archive.files[entry_index].content_methods.is_none() {
                let previous = self.archive.files[entry_index - 1].content_methods.clone();
                self.archive.files[entry_index].content_methods = previous;
            }
            if is_random_access && self.archive.files[entry_index].content_methods.is_none() {
                let first = self.archive.stream_map.folder_first_file_index[folder_index];
                let methods = self.archive.files[first].content_methods.clone();
                self.archive.files[entry_index].content_methods = methods;
            }
        } else {
            self.current_folder = Some(folder_index);
            self.reopen_folder(folder_index, entry_index)?;
        }

        let mut have_skipped = false;
        if is_random_access {
            have_skipped = self.skip_entries_when_needed(entry_index, is_in_same_folder, folder_index)?;
        }
        if is_random_access && self.current_entry == Some(entry_index) && !have_skipped {
            // The entry is already queued and untouched.
            return Ok(());
        }
        self.queue_entry(entry_index);
        Ok(())
    }

    /// Queues entries that must be decoded and discarded before
    /// `entry_index` can be served. Returns whether anything was queued or
    /// the folder was reopened.
    fn skip_entries_when_needed(
        &mut self,
        entry_index: usize,
        is_in_same_folder: bool,
        folder_index: usize,
    ) -> Result<bool> {
        if self.current_entry == Some(entry_index) && !self.has_current_entry_been_read() {
            return Ok(false);
        }

        let current_folder = self.current_folder.unwrap_or(folder_index);
        let mut skip_from = self.archive.stream_map.folder_first_file_index[current_folder];
        if is_in_same_folder {
            match self.current_entry {
                // Entries up to the current one are already consumed or
                // queued; continue right behind it.
                Some(current) if current < entry_index => skip_from = current + 1,
                // Going backwards, or re-reading a partially consumed
                // entry: restart the folder from its first pack byte.
                _ => self.reopen_folder(folder_index, entry_index)?,
            }
        }
        for index in skip_from..entry_index {
            self.queue_entry(index);
            let methods = self.archive.files[entry_index].content_methods.clone();
            self.archive.files[index].content_methods = methods;
        }
        Ok(true)
    }

    /// True if any data of the current entry has been consumed, detected
    /// by comparing the queued stream's remaining count to the entry size.
    fn has_current_entry_been_read(&self) -> bool {
        match &self.folder {
            Some(folder) => folder
                .queued
                .back()
                .is_some_and(|q| q.remaining != q.size),
            None => false,
        }
    }

    fn queue_entry(&mut self, index: usize) {
        let file = &self.archive.files[index];
        let queued = QueuedEntry {
            index,
            name: file.name.clone(),
            size: file.size,
            remaining: file.size,
            crc: file.crc,
            hasher: Crc32::new(),
            verified: false,
        };
        if let Some(folder) = &mut self.folder {
            folder.queued.push_back(queued);
        }
    }

    /// Discards any open folder stream and rebuilds the decoder stack from
    /// the folder's first pack byte.
    fn reopen_folder(&mut self, folder_index: usize, entry_index: usize) -> Result<()> {
        self.folder = None;
        let channel = self.channel()?.clone();

        let archive = &self.archive;
        let folder = &archive.folders[folder_index];
        let first_pack = archive.stream_map.folder_first_pack_stream_index[folder_index];
        let pack_size = *archive.pack_sizes.get(first_pack).ok_or_else(|| {
            Error::corrupt(0, format!("missing pack size for stream {}", first_pack))
        })?;
        let folder_offset = archive.folder_offset(folder_index);

        let bounded = BoundedChannelReader::new(channel, folder_offset, pack_size);
        let counting = CountingReader::new(
            BufReader::new(bounded),
            Rc::clone(&self.compressed_count),
        );
        let mut stack: Box<dyn Read> = Box::new(counting);

        let mut methods = Vec::new();
        for index in folder.ordered_coder_indices()? {
            let coder = &folder.coders[index];
            stack = codec::add_decoder(
                stack,
                coder,
                folder.unpack_size_for_coder(index),
                self.password.as_ref(),
            )?;
            methods.insert(
                0,
                ContentMethod {
                    method_id: coder.method_id.clone(),
                },
            );
        }

        let unpack_size = folder.unpack_size();
        if let Some(crc) = folder.crc {
            let first_file = archive.stream_map.folder_first_file_index[folder_index];
            let name = archive.files[first_file].name.clone();
            stack = Box::new(Crc32VerifyingReader::new(
                stack,
                unpack_size,
                crc,
                first_file,
                name,
            ));
        }

        self.archive.files[entry_index].content_methods = Some(methods);
        self.folder = Some(FolderState {
            stream: stack,
            queued: VecDeque::new(),
            remaining: unpack_size,
            end_checked: false,
        });
        Ok(())
    }

    fn read_current(&mut self, buf: &mut [u8]) -> Result<usize> {
        let folder = self.folder.as_mut().ok_or(Error::NoCurrentEntry)?;

        // Decode and discard queued predecessors (solid folders).
        while folder.queued.len() > 1 {
            let mut skipped = folder.queued.pop_front().expect("queue not empty");
            Self::drain_queued(folder, &mut skipped)?;
            self.compressed_count.set(0);
        }

        let Some(current) = folder.queued.back_mut() else {
            return Err(Error::NoCurrentEntry);
        };
        if current.remaining == 0 {
            if !current.verified {
                current.verify()?;
            }
            Self::check_folder_end(folder)?;
            return Ok(0);
        }

        let max = (current.remaining as usize).min(buf.len());
        let n = folder.stream.read(&mut buf[..max]).map_err(from_io_error)?;
        if n == 0 {
            return Err(Error::Truncated("folder stream ended before entry data"));
        }
        current.hasher.update(&buf[..n]);
        current.remaining -= n as u64;
        folder.remaining = folder.remaining.saturating_sub(n as u64);
        Ok(n)
    }

    /// Reads a queued entry to its end and verifies its CRC.
    fn drain_queued(folder: &mut FolderState, queued: &mut QueuedEntry) -> Result<()> {
        let mut buf = [0u8; READ_BUFFER_SIZE];
        while queued.remaining > 0 {
            let max = (queued.remaining as usize).min(buf.len());
            let n = folder
                .stream
                .read(&mut buf[..max])
                .map_err(from_io_error)?;
            if n == 0 {
                return Err(Error::Truncated("folder stream ended while skipping entry"));
            }
            queued.hasher.update(&buf[..n]);
            queued.remaining -= n as u64;
            folder.remaining = folder.remaining.saturating_sub(n as u64);
        }
        if !queued.verified {
            queued.verify()?;
        }
        Self::check_folder_end(folder)
    }

    /// At the end of the folder, pulls one more read through the stack so
    /// the folder-level CRC shim can verify.
    fn check_folder_end(folder: &mut FolderState) -> Result<()> {
        if folder.remaining != 0 || folder.end_checked {
            return Ok(());
        }
        folder.end_checked = true;
        let mut probe = [0u8; 1];
        folder.stream.read(&mut probe).map_err(from_io_error)?;
        Ok(())
    }
}

/// A borrowed stream over one entry's data.
///
/// Created by [`SevenZReader::input_stream`]; borrowing the reader means
/// any previously issued stream is statically invalidated.
pub struct EntryReader<'a, R: Read + Seek + 'static> {
    reader: &'a mut SevenZReader<R>,
}

impl<R: Read + Seek + 'static> Read for EntryReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf).map_err(into_io_error)
    }
}

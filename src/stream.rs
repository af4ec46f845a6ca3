//! Bounded and counting stream wrappers.
//!
//! The decoder stack for a folder is built over a bounded view of the
//! archive channel (never reading past the folder's declared pack size)
//! plus a counting shim that tracks how many compressed bytes have actually
//! been consumed.

use std::cell::{Cell, RefCell};
use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

/// Shared handle to the reader's underlying channel.
///
/// The 7z reader owns its channel exclusively, but the decoder stack of the
/// currently open folder needs to read from it too. Both sides hold one of
/// these; the reader drops every handle on `close`, which closes the
/// channel. Reading is strictly single-threaded.
pub(crate) struct Channel<R> {
    inner: Rc<RefCell<R>>,
}

impl<R> Channel<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner: Rc::new(RefCell::new(inner)),
        }
    }
}

impl<R> Clone for Channel<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<R: Read + Seek> Channel<R> {
    /// Reads at the given absolute position, without disturbing other users
    /// of the channel (each bounded reader tracks its own position).
    pub(crate) fn read_at(&self, position: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut channel = self.inner.borrow_mut();
        channel.seek(SeekFrom::Start(position))?;
        channel.read(buf)
    }

    pub(crate) fn size(&self) -> io::Result<u64> {
        self.inner.borrow_mut().seek(SeekFrom::End(0))
    }

    /// Reads exactly `buf.len()` bytes starting at `position`.
    pub(crate) fn read_exact_at(&self, position: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut channel = self.inner.borrow_mut();
        channel.seek(SeekFrom::Start(position))?;
        channel.read_exact(buf)
    }
}

/// A reader over a fixed byte range of the channel.
///
/// Reads never go past the declared size; the range's position is tracked
/// here, so interleaved seeks by other channel users cannot corrupt it.
pub struct BoundedChannelReader<R> {
    channel: Channel<R>,
    position: u64,
    remaining: u64,
}

impl<R: Read + Seek> BoundedChannelReader<R> {
    pub(crate) fn new(channel: Channel<R>, start: u64, size: u64) -> Self {
        Self {
            channel,
            position: start,
            remaining: size,
        }
    }

    /// Bytes left in the bounded range.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<R: Read + Seek> Read for BoundedChannelReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = (self.remaining as usize).min(buf.len());
        let n = self.channel.read_at(self.position, &mut buf[..max])?;
        self.position += n as u64;
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// A reader that counts the bytes passing through it.
///
/// The counter is shared with the archive reader, which reports it as the
/// number of compressed bytes consumed for the current entry.
pub struct CountingReader<R> {
    inner: R,
    count: Rc<Cell<u64>>,
}

impl<R: Read> CountingReader<R> {
    pub(crate) fn new(inner: R, count: Rc<Cell<u64>>) -> Self {
        Self { inner, count }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.set(self.count.get() + n as u64);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn bounded_reader_stays_in_range() {
        let channel = Channel::new(Cursor::new(b"0123456789".to_vec()));
        let mut r = BoundedChannelReader::new(channel, 2, 5);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"23456");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn bounded_reader_survives_interleaved_access() {
        let channel = Channel::new(Cursor::new(b"0123456789".to_vec()));
        let mut r = BoundedChannelReader::new(channel.clone(), 0, 4);

        let mut buf = [0u8; 2];
        r.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"01");

        // Another user repositions the channel in between.
        let mut elsewhere = [0u8; 3];
        channel.read_exact_at(7, &mut elsewhere).unwrap();
        assert_eq!(&elsewhere, b"789");

        r.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"23");
    }

    #[test]
    fn bounded_reader_clamped_by_eof() {
        let channel = Channel::new(Cursor::new(b"ab".to_vec()));
        let mut r = BoundedChannelReader::new(channel, 0, 10);
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"ab");
        assert_eq!(r.remaining(), 8);
    }

    #[test]
    fn counting_reader_counts() {
        let count = Rc::new(Cell::new(0));
        let mut r = CountingReader::new(Cursor::new(b"hello world".to_vec()), count.clone());
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(count.get(), 11);
    }
}

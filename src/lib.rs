//! # sieben
//!
//! A streaming reader for 7z archives plus the LZ77 hash-chain matcher
//! and LZ4 block encoder built on it.
//!
//! ## Reading a 7z archive
//!
//! ```rust,no_run
//! use sieben::read::SevenZReader;
//!
//! fn main() -> sieben::Result<()> {
//!     let mut archive = SevenZReader::open_path("archive.7z")?;
//!
//!     // Sequential access
//!     while let Some(entry) = archive.next_entry()? {
//!         println!(
//!             "{}: {} bytes",
//!             entry.name.as_deref().unwrap_or("<unnamed>"),
//!             entry.size
//!         );
//!     }
//!
//!     // Random access
//!     let content = archive.read_to_vec(0)?;
//!     println!("first entry holds {} bytes", content.len());
//!     Ok(())
//! }
//! ```
//!
//! The reader walks the metadata header twice: a first pass validates the
//! structure and computes a conservative memory estimate without
//! allocating, a second pass materialises the archive only when the
//! estimate fits the configured limit. Solid folders are decoded as single
//! streams; random access inside one re-decodes and discards preceding
//! entries lazily.
//!
//! ## Compressing with the LZ4 block format
//!
//! ```rust
//! use sieben::lz4::BlockLz4Writer;
//! use std::io::Write;
//!
//! # fn main() -> std::io::Result<()> {
//! let mut writer = BlockLz4Writer::new(Vec::new());
//! writer.write_all(b"some bytes worth compressing, compressing, compressing")?;
//! let block = writer.finish()?;
//! # let _ = block;
//! # Ok(())
//! # }
//! ```
//!
//! The underlying [`lz77`] module exposes the matcher itself for other
//! LZ77-family encoders.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `lzma` | Yes | LZMA and LZMA2 decompression |
//! | `deflate` | Yes | Deflate decompression |
//! | `bzip2` | Yes | BZip2 decompression |
//!
//! Archives using a codec whose feature is disabled fail with
//! [`Error::UnsupportedMethod`] when their folders are opened.
//!
//! ## Scope
//!
//! This crate reads 7z archives; it does not write them. The AES-256
//! coder slot is recognised (yielding [`Error::PasswordRequired`] without
//! a password) but decryption is out of scope.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

/// Default buffer size for read-and-discard loops (8 KiB).
pub(crate) const READ_BUFFER_SIZE: usize = 8192;

pub mod checksum;
pub mod codec;
pub mod error;
pub mod format;
pub mod lz4;
pub mod lz77;
pub mod password;
pub mod read;
pub mod stream;
pub mod timestamp;

pub use error::{Error, Result};
pub use password::Password;
pub use timestamp::Timestamp;

// Re-export the reading API at the crate root for convenience.
pub use read::{Entry, EntryStatistics, ReaderOptions, SevenZReader, VerifyResult};

//! Error types for archive and compression operations.
//!
//! All fallible operations in this crate return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. The [`Error`] enum distinguishes the
//! failure modes a caller may want to react to: corrupt input, unsupported
//! coders, resource limits, missing passwords, and plain I/O trouble.

use std::io;

/// The main error type for 7z reading and LZ77/LZ4 compression.
///
/// # Error Categories
///
/// | Category | Variants |
/// |----------|----------|
/// | I/O | [`Io`][Self::Io], [`Truncated`][Self::Truncated] |
/// | Format | [`BadSignature`][Self::BadSignature], [`UnsupportedVersion`][Self::UnsupportedVersion], [`NextHeaderOutOfBounds`][Self::NextHeaderOutOfBounds], [`CorruptHeader`][Self::CorruptHeader] |
/// | Integrity | [`HeaderCrcMismatch`][Self::HeaderCrcMismatch], [`PackCrcMismatch`][Self::PackCrcMismatch], [`CrcMismatch`][Self::CrcMismatch] |
/// | Compatibility | [`UnsupportedMethod`][Self::UnsupportedMethod], [`UnsupportedFeature`][Self::UnsupportedFeature] |
/// | Resources | [`MemoryLimit`][Self::MemoryLimit] |
/// | Encryption | [`PasswordRequired`][Self::PasswordRequired] |
/// | Recovery | [`Recoverable`][Self::Recoverable] |
/// | Compression | [`PrefillAfterStart`][Self::PrefillAfterStart], [`InvalidParameters`][Self::InvalidParameters] |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred on the underlying channel.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// The input ended where the format requires more data.
    #[error("truncated input: {0}")]
    Truncated(&'static str),

    /// The first six bytes are not the 7z signature `37 7A BC AF 27 1C`.
    #[error("not a 7z archive: bad signature")]
    BadSignature,

    /// The archive declares a format version this crate does not read.
    ///
    /// Only major version 0 is defined by the 7z format.
    #[error("unsupported 7z version {major}.{minor}")]
    UnsupportedVersion {
        /// Major version byte from the signature header.
        major: u8,
        /// Minor version byte from the signature header.
        minor: u8,
    },

    /// The start header points outside the file.
    #[error("next header out of bounds: offset {offset}, size {size}")]
    NextHeaderOutOfBounds {
        /// Declared offset of the next header (relative to the end of the
        /// signature header).
        offset: u64,
        /// Declared size of the next header.
        size: u64,
    },

    /// A CRC-32 over header bytes did not match the stored value.
    ///
    /// This covers the start header, the next header, and decoded
    /// (compressed) headers.
    #[error("header CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    HeaderCrcMismatch {
        /// The CRC stored in the archive.
        expected: u32,
        /// The CRC computed over the actual bytes.
        actual: u32,
    },

    /// A packed (compressed) stream failed its declared CRC-32.
    #[error("pack stream {index} CRC mismatch: expected {expected:#010x}, got {actual:#010x}")]
    PackCrcMismatch {
        /// Index of the pack stream in the archive.
        index: usize,
        /// The CRC stored in the archive.
        expected: u32,
        /// The CRC computed over the actual bytes.
        actual: u32,
    },

    /// An entry's decoded data failed its declared CRC-32.
    ///
    /// Also raised when a whole folder's decoded stream fails the folder
    /// CRC; the entry context then names the first entry of the folder.
    #[error("{}", CrcMismatchDisplay { entry_index: *entry_index, entry_name: entry_name.as_deref(), expected: *expected, actual: *actual })]
    CrcMismatch {
        /// Index of the entry whose data failed verification.
        entry_index: usize,
        /// Name of the entry, when known.
        entry_name: Option<String>,
        /// The CRC stored in the archive.
        expected: u32,
        /// The CRC computed over the decoded bytes.
        actual: u32,
    },

    /// The archive metadata is malformed.
    ///
    /// Covers out-of-order property IDs, non-zero `external` flags, badly
    /// terminated blocks, negative sizes, odd-length UTF-16 name blocks and
    /// wrong numbers of null-terminated names.
    #[error("corrupt header at offset {offset:#x}: {reason}")]
    CorruptHeader {
        /// Byte offset within the header buffer where the problem was found.
        offset: u64,
        /// Description of the problem.
        reason: String,
    },

    /// The archive uses a compression method this build cannot decode.
    ///
    /// Either the method is unknown, or the matching cargo feature
    /// (`lzma`, `deflate`, `bzip2`) is disabled.
    #[error("unsupported method: {method_id:#x}")]
    UnsupportedMethod {
        /// The method ID, packed into a `u64`.
        method_id: u64,
    },

    /// The archive uses a 7z feature outside the supported subset.
    ///
    /// Examples: coders with multiple input or output streams, the
    /// alternative-methods coder flag, `kStartPos`, external data blocks.
    #[error("unsupported feature: {feature}")]
    UnsupportedFeature {
        /// Name of the unsupported feature.
        feature: &'static str,
    },

    /// A password is required but none was provided.
    #[error("password required for encrypted archive")]
    PasswordRequired,

    /// The header-parse memory estimate exceeds the configured limit.
    #[error("memory limit exceeded: headers need {needed_kib} KiB, limit is {limit_kib} KiB")]
    MemoryLimit {
        /// Conservative estimate of the memory needed, in KiB.
        needed_kib: u64,
        /// The configured limit, in KiB.
        limit_kib: u64,
    },

    /// The start header is zeroed out, which usually means the first volume
    /// of a multi-volume archive was closed prematurely.
    ///
    /// Retrying with [`ReaderOptions::recover_broken_archives`] makes the
    /// reader scan backwards for a usable end header.
    ///
    /// [`ReaderOptions::recover_broken_archives`]: crate::read::ReaderOptions::recover_broken_archives
    #[error("start header is corrupt; the archive may be readable with recovery enabled")]
    Recoverable,

    /// [`Compressor::prefill`] was called after compression started.
    ///
    /// [`Compressor::prefill`]: crate::lz77::Compressor::prefill
    #[error("the compressor has already started to accept data, can't prefill anymore")]
    PrefillAfterStart,

    /// Invalid LZ77 compression parameters.
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    /// No entry is current; call `next_entry` or `input_stream` first.
    #[error("no current entry (call next_entry first)")]
    NoCurrentEntry,

    /// The requested entry index does not exist.
    #[error("no entry at index {index}")]
    EntryNotFound {
        /// The requested index.
        index: usize,
    },
}

struct CrcMismatchDisplay<'a> {
    entry_index: usize,
    entry_name: Option<&'a str>,
    expected: u32,
    actual: u32,
}

impl std::fmt::Display for CrcMismatchDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CRC mismatch for entry {}", self.entry_index)?;
        if let Some(name) = self.entry_name {
            write!(f, " ({})", name)?;
        }
        write!(
            f,
            ": expected {:#010x}, got {:#010x}",
            self.expected, self.actual
        )
    }
}

impl From<io::Error> for Error {
    /// Converts an I/O error, mapping unexpected EOF to [`Error::Truncated`]
    /// so "EOF where data was required" stays distinguishable.
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated("unexpected end of input")
        } else {
            Error::Io(e)
        }
    }
}

impl Error {
    /// Returns `true` if this error indicates corrupt archive data.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Error::HeaderCrcMismatch { .. }
                | Error::PackCrcMismatch { .. }
                | Error::CrcMismatch { .. }
                | Error::CorruptHeader { .. }
        )
    }

    /// Returns `true` if retrying with different options could succeed.
    ///
    /// `Recoverable` suggests retrying with recovery enabled,
    /// `PasswordRequired` with a password, and `MemoryLimit` with a higher
    /// limit.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Recoverable | Error::PasswordRequired | Error::MemoryLimit { .. }
        )
    }

    /// Returns the entry index associated with this error, if any.
    pub fn entry_index(&self) -> Option<usize> {
        match self {
            Error::CrcMismatch { entry_index, .. } => Some(*entry_index),
            _ => None,
        }
    }

    /// Creates a `CorruptHeader` error.
    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Error::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }
}

/// Maps an `io::Error` produced inside a decoder stack back to [`Error`].
///
/// Checksum shims inside `Box<dyn Read>` stacks smuggle crate errors through
/// `io::Error`; this recovers them so callers see the original kind.
pub(crate) fn from_io_error(e: io::Error) -> Error {
    if e.get_ref().is_some_and(|inner| inner.is::<Error>()) {
        match e.into_inner().unwrap().downcast::<Error>() {
            Ok(err) => *err,
            Err(e) => Error::Io(io::Error::other(e)),
        }
    } else {
        Error::from(e)
    }
}

/// Wraps an [`Error`] so it can travel through an `io::Result`.
pub(crate) fn into_io_error(e: Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

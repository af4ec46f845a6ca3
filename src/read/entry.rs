//! Archive entry metadata.

use crate::codec;
use crate::timestamp::Timestamp;

/// One compression method applied to an entry's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentMethod {
    /// Raw method ID bytes as stored in the archive.
    pub method_id: Vec<u8>,
}

impl ContentMethod {
    /// Human-readable name of the method ("Copy", "LZMA2", ...).
    pub fn name(&self) -> &'static str {
        codec::method::name(&self.method_id)
    }
}

/// An entry in a 7z archive: a file, directory or anti-item.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct Entry {
    /// Entry name (path inside the archive), when stored.
    pub name: Option<String>,
    /// Whether the entry has a data stream. Directories, empty files and
    /// anti-items do not.
    pub has_stream: bool,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// Whether the entry is an anti-item (marks a deletion in incremental
    /// backups).
    pub is_anti: bool,
    /// Uncompressed size in bytes.
    pub size: u64,
    /// CRC-32 of the uncompressed data, when stored.
    pub crc: Option<u32>,
    /// Creation time (NTFS FILETIME), when stored.
    pub creation_time: Option<u64>,
    /// Last access time (NTFS FILETIME), when stored.
    pub access_time: Option<u64>,
    /// Modification time (NTFS FILETIME), when stored.
    pub modification_time: Option<u64>,
    /// Windows file attributes, when stored.
    pub attributes: Option<u32>,
    /// Methods that compressed this entry's folder, innermost last.
    ///
    /// Populated lazily the first time the entry's folder is opened.
    pub(crate) content_methods: Option<Vec<ContentMethod>>,
}

impl Entry {
    /// Returns true if this is a file (not a directory).
    pub fn is_file(&self) -> bool {
        !self.is_directory
    }

    /// The compression methods of this entry's folder, if it has been
    /// decoded yet.
    pub fn content_methods(&self) -> Option<&[ContentMethod]> {
        self.content_methods.as_deref()
    }

    /// Modification time as a [`Timestamp`], when stored.
    pub fn modified(&self) -> Option<Timestamp> {
        self.modification_time.map(Timestamp::from_filetime)
    }

    /// Creation time as a [`Timestamp`], when stored.
    pub fn created(&self) -> Option<Timestamp> {
        self.creation_time.map(Timestamp::from_filetime)
    }

    /// Access time as a [`Timestamp`], when stored.
    pub fn accessed(&self) -> Option<Timestamp> {
        self.access_time.map(Timestamp::from_filetime)
    }
}

//! Helpers that synthesize 7z archives byte by byte.
//!
//! The crate reads archives but does not write them, so the tests build
//! the wire format by hand: signature header, metadata header and pack
//! data, all using the Copy coder.

#![allow(dead_code)]

use sieben::checksum::Crc32;
use sieben::format::reader::write_var_u64;

// Property IDs used while assembling headers.
pub const K_END: u8 = 0x00;
pub const K_HEADER: u8 = 0x01;
pub const K_MAIN_STREAMS_INFO: u8 = 0x04;
pub const K_FILES_INFO: u8 = 0x05;
pub const K_PACK_INFO: u8 = 0x06;
pub const K_UNPACK_INFO: u8 = 0x07;
pub const K_SUBSTREAMS_INFO: u8 = 0x08;
pub const K_SIZE: u8 = 0x09;
pub const K_CRC: u8 = 0x0A;
pub const K_FOLDER: u8 = 0x0B;
pub const K_CODERS_UNPACK_SIZE: u8 = 0x0C;
pub const K_NUM_UNPACK_STREAM: u8 = 0x0D;
pub const K_EMPTY_STREAM: u8 = 0x0E;
pub const K_EMPTY_FILE: u8 = 0x0F;
pub const K_NAME: u8 = 0x11;
pub const K_ENCODED_HEADER: u8 = 0x17;

pub fn var(buf: &mut Vec<u8>, value: u64) {
    write_var_u64(buf, value).unwrap();
}

pub fn utf16le(buf: &mut Vec<u8>, s: &str) {
    for unit in s.encode_utf16() {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
    buf.extend_from_slice(&[0, 0]);
}

/// An entry without a data stream.
#[derive(Clone, Copy)]
pub enum EmptyItem<'a> {
    Directory(&'a str),
    EmptyFile(&'a str),
}

impl EmptyItem<'_> {
    fn name(&self) -> &str {
        match self {
            EmptyItem::Directory(name) | EmptyItem::EmptyFile(name) => name,
        }
    }

    fn is_empty_file(&self) -> bool {
        matches!(self, EmptyItem::EmptyFile(_))
    }
}

/// One folder compressed with the Copy coder, holding its entries back to
/// back (solid when more than one).
pub struct FolderSpec<'a> {
    pub entries: Vec<(Option<&'a str>, Vec<u8>)>,
    /// Stored folder CRC; `None` stores the real checksum.
    pub crc_override: Option<u32>,
}

impl<'a> FolderSpec<'a> {
    pub fn new(entries: &[(&'a str, &[u8])]) -> Self {
        Self {
            entries: entries
                .iter()
                .map(|(name, data)| (Some(*name), data.to_vec()))
                .collect(),
            crc_override: None,
        }
    }

    pub fn unnamed(data: &[u8]) -> Self {
        Self {
            entries: vec![(None, data.to_vec())],
            crc_override: None,
        }
    }

    fn pack_data(&self) -> Vec<u8> {
        let mut pack = Vec::new();
        for (_, data) in &self.entries {
            pack.extend_from_slice(data);
        }
        pack
    }
}

/// Wraps pack data and a metadata header into a full archive file.
pub fn wrap_signature(pack: &[u8], header: &[u8]) -> Vec<u8> {
    let mut file = Vec::new();
    file.extend_from_slice(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]);
    file.extend_from_slice(&[0x00, 0x04]);

    let mut protected = Vec::with_capacity(20);
    protected.extend_from_slice(&(pack.len() as u64).to_le_bytes());
    protected.extend_from_slice(&(header.len() as u64).to_le_bytes());
    protected.extend_from_slice(&Crc32::compute(header).to_le_bytes());

    file.extend_from_slice(&Crc32::compute(&protected).to_le_bytes());
    file.extend_from_slice(&protected);
    file.extend_from_slice(pack);
    file.extend_from_slice(header);
    file
}

/// Builds the metadata header (starting with `kHeader`) for the given
/// folders and empty items. Empty items come first in the entry list.
pub fn build_header(folders: &[FolderSpec<'_>], empty_items: &[EmptyItem<'_>]) -> Vec<u8> {
    let mut h = vec![K_HEADER];

    if !folders.is_empty() {
        h.push(K_MAIN_STREAMS_INFO);

        // PackInfo: one pack stream per folder.
        h.push(K_PACK_INFO);
        var(&mut h, 0);
        var(&mut h, folders.len() as u64);
        h.push(K_SIZE);
        for folder in folders {
            var(&mut h, folder.pack_data().len() as u64);
        }
        h.push(K_CRC);
        h.push(0x01);
        for folder in folders {
            h.extend_from_slice(&Crc32::compute(&folder.pack_data()).to_le_bytes());
        }
        h.push(K_END);

        // UnpackInfo: one Copy coder per folder.
        h.push(K_UNPACK_INFO);
        h.push(K_FOLDER);
        var(&mut h, folders.len() as u64);
        h.push(0x00); // not external
        for _ in folders {
            var(&mut h, 1); // one coder
            h.push(0x01); // one-byte method id, simple, no attributes
            h.push(0x00); // Copy
        }
        h.push(K_CODERS_UNPACK_SIZE);
        for folder in folders {
            var(&mut h, folder.pack_data().len() as u64);
        }
        h.push(K_CRC);
        h.push(0x01);
        for folder in folders {
            let crc = folder
                .crc_override
                .unwrap_or_else(|| Crc32::compute(&folder.pack_data()));
            h.extend_from_slice(&crc.to_le_bytes());
        }
        h.push(K_END);

        // SubStreamsInfo.
        h.push(K_SUBSTREAMS_INFO);
        h.push(K_NUM_UNPACK_STREAM);
        for folder in folders {
            var(&mut h, folder.entries.len() as u64);
        }
        if folders.iter().any(|f| f.entries.len() > 1) {
            h.push(K_SIZE);
            for folder in folders {
                for (_, data) in folder.entries.iter().take(folder.entries.len() - 1) {
                    var(&mut h, data.len() as u64);
                }
            }
        }
        // Digests: folders with a single entry inherit the folder CRC;
        // multi-entry folders store one digest per entry.
        h.push(K_CRC);
        h.push(0x01);
        for folder in folders {
            if folder.entries.len() != 1 {
                for (_, data) in &folder.entries {
                    h.extend_from_slice(&Crc32::compute(data).to_le_bytes());
                }
            }
        }
        h.push(K_END);

        h.push(K_END); // end of MainStreamsInfo
    }

    // FilesInfo.
    let num_files = empty_items.len()
        + folders
            .iter()
            .map(|folder| folder.entries.len())
            .sum::<usize>();
    h.push(K_FILES_INFO);
    var(&mut h, num_files as u64);

    if !empty_items.is_empty() {
        // Empty items occupy the leading entry indices.
        let mut bits = vec![0u8; num_files.div_ceil(8)];
        for i in 0..empty_items.len() {
            bits[i / 8] |= 0x80 >> (i % 8);
        }
        h.push(K_EMPTY_STREAM);
        var(&mut h, bits.len() as u64);
        h.extend_from_slice(&bits);

        if empty_items.iter().any(|item| item.is_empty_file()) {
            let mut bits = vec![0u8; empty_items.len().div_ceil(8)];
            for (i, item) in empty_items.iter().enumerate() {
                if item.is_empty_file() {
                    bits[i / 8] |= 0x80 >> (i % 8);
                }
            }
            h.push(K_EMPTY_FILE);
            var(&mut h, bits.len() as u64);
            h.extend_from_slice(&bits);
        }
    }

    let all_named = folders
        .iter()
        .flat_map(|folder| folder.entries.iter())
        .all(|(name, _)| name.is_some());
    if all_named {
        let mut names = vec![0x00]; // not external
        for item in empty_items {
            utf16le(&mut names, item.name());
        }
        for folder in folders {
            for (name, _) in &folder.entries {
                utf16le(&mut names, name.unwrap());
            }
        }
        h.push(K_NAME);
        var(&mut h, names.len() as u64);
        h.extend_from_slice(&names);
    }

    h.push(K_END); // end of FilesInfo
    h.push(K_END); // end of Header
    h
}

/// Builds a complete archive file.
pub fn build_archive(folders: &[FolderSpec<'_>], empty_items: &[EmptyItem<'_>]) -> Vec<u8> {
    let mut pack = Vec::new();
    for folder in folders {
        pack.extend_from_slice(&folder.pack_data());
    }
    let header = build_header(folders, empty_items);
    wrap_signature(&pack, &header)
}

/// Builds a single-folder, single-entry archive named `name` holding
/// `data`, Copy coded, with the folder CRC stored.
pub fn simple_archive(name: &str, data: &[u8]) -> Vec<u8> {
    build_archive(&[FolderSpec::new(&[(name, data)])], &[])
}

/// Builds an archive whose metadata header is itself wrapped in an
/// `kEncodedHeader` block (Copy coded).
pub fn encoded_header_archive(folders: &[FolderSpec<'_>]) -> Vec<u8> {
    let mut pack = Vec::new();
    for folder in folders {
        pack.extend_from_slice(&folder.pack_data());
    }
    let real_header = build_header(folders, &[]);

    // StreamsInfo describing the compressed header: a single Copy folder
    // whose pack data sits right after the regular pack streams.
    let mut encoded = vec![K_ENCODED_HEADER];
    encoded.push(K_PACK_INFO);
    var(&mut encoded, pack.len() as u64); // pack pos
    var(&mut encoded, 1);
    encoded.push(K_SIZE);
    var(&mut encoded, real_header.len() as u64);
    encoded.push(K_END);
    encoded.push(K_UNPACK_INFO);
    encoded.push(K_FOLDER);
    var(&mut encoded, 1);
    encoded.push(0x00);
    var(&mut encoded, 1);
    encoded.push(0x01);
    encoded.push(0x00); // Copy
    encoded.push(K_CODERS_UNPACK_SIZE);
    var(&mut encoded, real_header.len() as u64);
    encoded.push(K_CRC);
    encoded.push(0x01);
    encoded.extend_from_slice(&Crc32::compute(&real_header).to_le_bytes());
    encoded.push(K_END);
    encoded.push(K_END);

    // File layout: signature, pack data, real header (as pack data of the
    // header folder), encoded header.
    let mut file = Vec::new();
    file.extend_from_slice(&[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C]);
    file.extend_from_slice(&[0x00, 0x04]);
    let mut protected = Vec::with_capacity(20);
    protected.extend_from_slice(&((pack.len() + real_header.len()) as u64).to_le_bytes());
    protected.extend_from_slice(&(encoded.len() as u64).to_le_bytes());
    protected.extend_from_slice(&Crc32::compute(&encoded).to_le_bytes());
    file.extend_from_slice(&Crc32::compute(&protected).to_le_bytes());
    file.extend_from_slice(&protected);
    file.extend_from_slice(&pack);
    file.extend_from_slice(&real_header);
    file.extend_from_slice(&encoded);
    file
}

/// Recomputes the next-header CRC and the start-header CRC after header
/// bytes have been tampered with, so only the intended corruption is
/// visible to the parser.
pub fn refresh_signature(file: &mut [u8]) {
    let offset = u64::from_le_bytes(file[12..20].try_into().unwrap()) as usize;
    let size = u64::from_le_bytes(file[20..28].try_into().unwrap()) as usize;
    let header_start = 32 + offset;
    let header_crc = Crc32::compute(&file[header_start..header_start + size]);
    file[28..32].copy_from_slice(&header_crc.to_le_bytes());
    let protected_crc = Crc32::compute(&file[12..32]);
    file[8..12].copy_from_slice(&protected_crc.to_le_bytes());
}

/// Zeroes the start header (CRC field and the 20 protected bytes), the
/// shape left behind by prematurely closed multi-volume archives.
pub fn zero_start_header(file: &mut [u8]) {
    for byte in &mut file[8..32] {
        *byte = 0;
    }
}

/// Builds a header declaring many folders, coders and files without any
/// real data; used to exercise the pass-1 memory estimate.
pub fn huge_archive(
    num_folders: usize,
    coders_per_folder: usize,
    substreams_per_folder: u64,
    num_files: u64,
) -> Vec<u8> {
    let mut h = vec![K_HEADER];
    h.push(K_MAIN_STREAMS_INFO);

    h.push(K_PACK_INFO);
    var(&mut h, 0);
    var(&mut h, num_folders as u64);
    h.push(K_SIZE);
    for _ in 0..num_folders {
        var(&mut h, 0);
    }
    h.push(K_END);

    h.push(K_UNPACK_INFO);
    h.push(K_FOLDER);
    var(&mut h, num_folders as u64);
    h.push(0x00);
    for _ in 0..num_folders {
        var(&mut h, coders_per_folder as u64);
        for _ in 0..coders_per_folder {
            h.push(0x01);
            h.push(0x00); // Copy
        }
        // Chain: output j feeds input j + 1.
        for j in 0..coders_per_folder - 1 {
            var(&mut h, (j + 1) as u64); // in index
            var(&mut h, j as u64); // out index
        }
    }
    h.push(K_CODERS_UNPACK_SIZE);
    for _ in 0..num_folders * coders_per_folder {
        var(&mut h, 0);
    }
    h.push(K_END);

    h.push(K_SUBSTREAMS_INFO);
    h.push(K_NUM_UNPACK_STREAM);
    for _ in 0..num_folders {
        var(&mut h, substreams_per_folder);
    }
    h.push(K_END);

    h.push(K_END);

    h.push(K_FILES_INFO);
    var(&mut h, num_files);
    h.push(K_END);

    h.push(K_END);

    wrap_signature(&[], &h)
}

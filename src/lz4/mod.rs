//! LZ4 block format support.
//!
//! The LZ4 *block* format encodes a sequence of pairs: a token byte whose
//! upper nibble holds the literal length and lower nibble the
//! back-reference length (both extended by `0xFF` continuation bytes), the
//! literals, and a two-byte little-endian offset. The format imposes
//! end-of-block rules — the last 5 bytes must be literals and the last
//! match must start at least 12 bytes before the end — which is what makes
//! encoding it from an LZ77 block stream non-trivial.
//!
//! [`BlockLz4Writer`] compresses through the [`lz77`][crate::lz77] core
//! and rewrites the tail of the pair stream to satisfy those rules;
//! [`BlockLz4Reader`] decodes the block format back.

mod reader;
mod writer;

pub use reader::BlockLz4Reader;
pub use writer::BlockLz4Writer;

/// Window size of the block format: offsets are 16 bits.
pub(crate) const WINDOW_SIZE: usize = 1 << 16;

/// Number of token bits per length nibble.
pub(crate) const SIZE_BITS: u32 = 4;

/// Largest value a token nibble can hold.
pub(crate) const BACK_REFERENCE_SIZE_MASK: usize = (1 << SIZE_BITS) - 1;

/// Minimum length of a back-reference in the block format.
pub(crate) const MIN_BACK_REFERENCE_LENGTH: usize = 4;

/// The last match must start this many bytes before the end of the block.
pub(crate) const MIN_OFFSET_OF_LAST_BACK_REFERENCE: usize = 12;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read, Write};

    fn roundtrip(data: &[u8]) -> Vec<u8> {
        let mut writer = BlockLz4Writer::new(Vec::new());
        writer.write_all(data).unwrap();
        let compressed = writer.finish().unwrap();

        let mut reader = BlockLz4Reader::new(Cursor::new(compressed));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn roundtrip_empty() {
        assert_eq!(roundtrip(b""), b"");
    }

    #[test]
    fn roundtrip_short_literal() {
        assert_eq!(roundtrip(b"hello"), b"hello");
    }

    #[test]
    fn roundtrip_repetitive() {
        let data = b"abcdefgh".repeat(500);
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn roundtrip_single_byte_runs() {
        // Exercises the offset-1 fill path.
        let data = vec![0x41u8; 4096];
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn roundtrip_mixed() {
        let mut data = Vec::new();
        for i in 0..10_000u32 {
            data.push((i % 7) as u8);
            data.push((i % 255) as u8);
            if i % 13 == 0 {
                data.extend_from_slice(b"repetition repetition");
            }
        }
        assert_eq!(roundtrip(&data), data);
    }

    #[test]
    fn roundtrip_larger_than_window() {
        let mut data = Vec::new();
        let mut state = 88172645463325252u64;
        for _ in 0..(WINDOW_SIZE * 2 + 1234) {
            // xorshift noise with embedded repetition
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            data.push((state % 11) as u8);
        }
        assert_eq!(roundtrip(&data), data);
    }
}

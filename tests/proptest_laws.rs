//! Property tests for the wire primitives and compression laws.

use std::io::{Cursor, Read, Write};

use proptest::prelude::*;

use sieben::format::reader::{read_var_u64, write_var_u64};
use sieben::lz4::{BlockLz4Reader, BlockLz4Writer};
use sieben::lz77::{Block, Compressor, Parameters};

proptest! {
    #[test]
    fn var_u64_roundtrips(value: u64) {
        let mut buf = Vec::new();
        write_var_u64(&mut buf, value).unwrap();
        prop_assert!(buf.len() <= 9);
        let back = read_var_u64(&mut Cursor::new(&buf)).unwrap();
        prop_assert_eq!(back, value);
    }

    #[test]
    fn lz77_blocks_reconstruct_input(data in proptest::collection::vec(0u8..8, 0..4096)) {
        let params = Parameters::builder(256).build().unwrap();
        let mut compressor = Compressor::new(params.clone());

        let mut decoded: Vec<u8> = Vec::new();
        let mut sink = |block: Block<'_>| -> sieben::Result<()> {
            match block {
                Block::Literal(bytes) => decoded.extend_from_slice(bytes),
                Block::BackReference { offset, length } => {
                    // Invariant: bounds hold and the referenced bytes equal
                    // the produced bytes.
                    assert!(offset >= 1 && offset <= params.max_offset());
                    assert!(length >= params.min_back_ref_len());
                    assert!(length <= params.max_back_ref_len());
                    for _ in 0..length {
                        let byte = decoded[decoded.len() - offset];
                        decoded.push(byte);
                    }
                }
                Block::EndOfData => {}
            }
            Ok(())
        };
        compressor.compress(&data, &mut sink).unwrap();
        compressor.finish(&mut sink).unwrap();
        drop(sink);
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn lz4_block_roundtrips(data in proptest::collection::vec(0u8..16, 0..2048)) {
        let mut writer = BlockLz4Writer::new(Vec::new());
        writer.write_all(&data).unwrap();
        let block = writer.finish().unwrap();

        let mut decoded = Vec::new();
        BlockLz4Reader::new(Cursor::new(block)).read_to_end(&mut decoded).unwrap();
        prop_assert_eq!(decoded, data);
    }

    #[test]
    fn lz4_roundtrips_with_chunked_writes(
        data in proptest::collection::vec(any::<u8>(), 0..1024),
        chunk in 1usize..64,
    ) {
        let mut writer = BlockLz4Writer::new(Vec::new());
        for piece in data.chunks(chunk) {
            writer.write_all(piece).unwrap();
        }
        let block = writer.finish().unwrap();

        let mut decoded = Vec::new();
        BlockLz4Reader::new(Cursor::new(block)).read_to_end(&mut decoded).unwrap();
        prop_assert_eq!(decoded, data);
    }
}

//! Property-based tests for frame offset indexes and frame parsers.

use proptest::prelude::*;
use rewrap_essence::{
    ByteBuffer, EssenceDescriptor, EssenceParser, EssenceType, FrameOffsetIndex, ParserOptions,
    PictureGeometry,
};
use std::io::Cursor;

// =============================================================================
// Frame Offset Index
// =============================================================================

proptest! {
    /// Offsets built from positive frame sizes are accepted and give back the sizes.
    #[test]
    fn index_from_frame_sizes(sizes in prop::collection::vec(1i64..100_000, 0..200)) {
        let mut index = FrameOffsetIndex::new();
        let mut offset = 0;
        index.append_offset(offset).unwrap();
        for size in &sizes {
            offset += size;
            index.append_offset(offset).unwrap();
        }

        prop_assert_eq!(index.duration(), sizes.len() as i64);
        prop_assert!(index.offsets().windows(2).all(|w| w[0] < w[1]));
        for (position, size) in sizes.iter().enumerate() {
            prop_assert_eq!(index.frame_size(position as i64), Some(*size));
        }
    }

    /// An offset that does not increase is rejected and leaves the index unchanged.
    #[test]
    fn index_rejects_non_increasing(start in 0i64..1000, back in 0i64..1000) {
        let mut index = FrameOffsetIndex::new();
        index.append_offset(start + 1000).unwrap();
        prop_assert!(index.append_offset(start + 1000 - back).is_err());
        prop_assert_eq!(index.len(), 1);
    }
}

// =============================================================================
// Fixed Size Parser Duration
// =============================================================================

fn dv_parser(data: Vec<u8>) -> EssenceParser<Cursor<Vec<u8>>> {
    EssenceParser::create(
        Cursor::new(data),
        &EssenceType::IecDv25_625_50.label(),
        &EssenceDescriptor::Picture(PictureGeometry::default()),
        ParserOptions::default(),
    )
    .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Duration is the number of whole frames, and only those can be read.
    #[test]
    fn fixed_size_duration(frames in 0usize..6, extra in 0usize..144_000) {
        let data = vec![0u8; frames * 144_000 + extra];
        let mut parser = dv_parser(data);
        let duration = parser.determine_duration().unwrap();
        prop_assert_eq!(duration, frames as i64);

        let mut buf = ByteBuffer::new();
        if duration > 0 {
            prop_assert!(parser.seek(duration - 1).unwrap());
            prop_assert_eq!(parser.read(&mut buf).unwrap(), Some(1));
            prop_assert_eq!(buf.size(), 144_000);
        }
        prop_assert!(!parser.seek(duration).unwrap());
        prop_assert!(parser.read(&mut buf).unwrap().is_none());
    }
}

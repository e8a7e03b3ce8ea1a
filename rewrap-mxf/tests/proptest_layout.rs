//! Property-based tests for KAG alignment, content package layout and
//! AES-3 packing.

use proptest::prelude::*;
use rewrap_mxf::{
    kag_aligned_size, Aes3Packer, AudioSequence, ContentPackage, D10Layout, D10SampleRate,
    KAG_SIZE,
};

fn sample_rate() -> impl Strategy<Value = D10SampleRate> {
    prop_oneof![
        Just(D10SampleRate::Rate625_50i),
        Just(D10SampleRate::Rate525_60i),
    ]
}

proptest! {
    /// Aligned sizes sit on the grid and leave room for a fill key and length.
    #[test]
    fn aligned_size_leaves_fill_room(size in 0u32..10_000_000) {
        let aligned = kag_aligned_size(size);
        prop_assert!(aligned > size);
        prop_assert_eq!(aligned % KAG_SIZE, 0);
        prop_assert!(aligned - size >= 20);
        prop_assert!(aligned - size < 2 * KAG_SIZE);
    }

    /// Every item of a content package starts on the grid and holds its
    /// largest element with a trailing fill.
    #[test]
    fn layout_items_fit(rate in sample_rate(), picture in 1u32..=250_000) {
        let layout = D10Layout::new(rate, picture);
        prop_assert_eq!(layout.system_item_size, KAG_SIZE);
        prop_assert_eq!(layout.video_item_size % KAG_SIZE, 0);
        prop_assert!(layout.video_item_size >= 20 + picture + 20);
        prop_assert_eq!(layout.audio_item_size % KAG_SIZE, 0);
        let max_block = 4 + rate.max_audio_samples() * 32;
        prop_assert!(layout.audio_item_size >= 20 + max_block + 20);
    }

    /// Feeding whole sequence cycles of audio in arbitrary chunks yields one
    /// complete block per sequence entry.
    #[test]
    fn packer_blocks_follow_sequence(
        rate in sample_rate(),
        offset in 0usize..5,
        chunks in prop::collection::vec(1u32..4000, 1..8),
    ) {
        let sequence = AudioSequence::for_rate(rate);
        let total = sequence.sum();
        let mut packer = Aes3Packer::new(rate, 1, 16);
        packer.set_sequence_index(offset);

        let mut fed = 0;
        let mut chunk = chunks.iter().cycle();
        while fed < total {
            let samples = chunk.next().copied().unwrap_or(1).min(total - fed);
            let mut package = ContentPackage::new();
            package.set_audio(0, &vec![0x11; samples as usize * 2]).unwrap();
            packer.update(&package);
            fed += samples;
        }

        prop_assert_eq!(packer.complete_block_count(), sequence.len());
        for i in 0..sequence.len() {
            let expected = sequence.sample_count(offset + i);
            let block = packer.front();
            prop_assert_eq!(block.len(), 4 + expected as usize * 32);
            prop_assert_eq!(u16::from_le_bytes([block[1], block[2]]) as u32, expected);
            packer.pop_front();
        }
        prop_assert_eq!(packer.pending_samples(), 0);
    }
}

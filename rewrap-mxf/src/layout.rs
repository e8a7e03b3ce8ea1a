//! KAG layout of D-10 content packages.
//!
//! Every item of a content package starts on a key alignment grid boundary,
//! so each item size is rounded up to leave room for a fill KLV.

use crate::klv::LLEN;
use serde::{Deserialize, Serialize};

/// Key alignment grid used by the D-10 writer
pub const KAG_SIZE: u32 = 0x200;

/// System metadata pack value size
pub const SYSTEM_METADATA_PACK_SIZE: u32 = 7 + 16 + 17 + 17;

/// Bytes the system item occupies before fill: the metadata pack KLV and an
/// empty package metadata set KLV
pub const SYSTEM_ITEM_SIZE: u32 = 16 + LLEN as u32 + SYSTEM_METADATA_PACK_SIZE + 16 + LLEN as u32;

/// AES-3 element header: sequence index, sample count, channel valid flags
pub const AES3_HEADER_SIZE: u32 = 4;

/// Bytes per AES-3 sample: eight 4-byte sub-frames
pub const AES3_SAMPLE_SIZE: u32 = 8 * 4;

/// Size of an AES-3 element value holding `samples` samples.
pub const fn aes3_block_size(samples: u32) -> u32 {
    AES3_HEADER_SIZE + samples * AES3_SAMPLE_SIZE
}

/// Round `size` up so that a fill KLV can pad it to the next KAG boundary.
///
/// The returned size always exceeds `size`; if the gap to the next boundary
/// is too small for a fill key and length, a full grid is added.
pub fn kag_aligned_size(size: u32) -> u32 {
    let mut fill = KAG_SIZE - size % KAG_SIZE;
    if fill < 16 + LLEN as u32 {
        fill += KAG_SIZE;
    }
    size + fill
}

/// D-10 line standard and frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum D10SampleRate {
    /// 625 lines, 25 frames per second interlaced
    #[default]
    Rate625_50i,
    /// 525 lines, 30000/1001 frames per second interlaced
    Rate525_60i,
}

impl D10SampleRate {
    /// Largest encoded picture the bit rate slot allows at 50 Mbit/s
    pub fn max_encoded_picture_size(self) -> u32 {
        match self {
            D10SampleRate::Rate625_50i => 250_000,
            D10SampleRate::Rate525_60i => 208_541,
        }
    }

    pub fn video_rate(self) -> rewrap_essence::VideoRate {
        match self {
            D10SampleRate::Rate625_50i => rewrap_essence::VideoRate::Fps25,
            D10SampleRate::Rate525_60i => rewrap_essence::VideoRate::Fps29_97,
        }
    }

    /// Largest per-frame audio sample count
    pub fn max_audio_samples(self) -> u32 {
        match self {
            D10SampleRate::Rate625_50i => 1920,
            D10SampleRate::Rate525_60i => 1602,
        }
    }
}

/// Item sizes of a D-10 content package. Fixed for the lifetime of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct D10Layout {
    pub system_item_size: u32,
    pub video_item_size: u32,
    pub audio_item_size: u32,
}

impl D10Layout {
    pub fn new(sample_rate: D10SampleRate, encoded_picture_size: u32) -> Self {
        let max_samples = sample_rate.max_audio_samples();
        D10Layout {
            system_item_size: kag_aligned_size(SYSTEM_ITEM_SIZE),
            video_item_size: kag_aligned_size(16 + LLEN as u32 + encoded_picture_size),
            audio_item_size: kag_aligned_size(16 + LLEN as u32 + aes3_block_size(max_samples)),
        }
    }

    /// Total bytes per content package
    pub fn content_package_size(&self) -> u32 {
        self.system_item_size + self.video_item_size + self.audio_item_size
    }

    /// Content package size for a configuration, without building a writer
    pub fn package_size_for(sample_rate: D10SampleRate, encoded_picture_size: u32) -> u32 {
        D10Layout::new(sample_rate, encoded_picture_size).content_package_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kag_aligned_size() {
        assert_eq!(kag_aligned_size(0), 512);
        assert_eq!(kag_aligned_size(97), 512);
        assert_eq!(kag_aligned_size(492), 512);
        // 21 bytes to the boundary leaves room for a fill KLV, 19 does not
        assert_eq!(kag_aligned_size(491), 512);
        assert_eq!(kag_aligned_size(493), 1024);
        assert_eq!(kag_aligned_size(512), 1024);
    }

    #[test]
    fn test_system_item_size() {
        assert_eq!(SYSTEM_METADATA_PACK_SIZE, 57);
        assert_eq!(SYSTEM_ITEM_SIZE, 97);
    }

    #[test]
    fn test_625_layout() {
        let layout = D10Layout::new(D10SampleRate::Rate625_50i, 250_000);
        assert_eq!(layout.system_item_size, 512);
        assert_eq!(layout.video_item_size, 250_368);
        // 20 + 4 + 1920 * 32 = 61464
        assert_eq!(layout.audio_item_size, 61_952);
        assert_eq!(layout.content_package_size(), 312_832);
        assert_eq!(layout.content_package_size() % KAG_SIZE, 0);
    }

    #[test]
    fn test_525_layout_fits_short_frames() {
        let layout = D10Layout::new(D10SampleRate::Rate525_60i, 208_541);
        assert!(aes3_block_size(1601) <= layout.audio_item_size - 20);
        assert_eq!(layout.content_package_size() % KAG_SIZE, 0);
        assert_eq!(
            D10Layout::package_size_for(D10SampleRate::Rate525_60i, 208_541),
            layout.content_package_size()
        );
    }
}

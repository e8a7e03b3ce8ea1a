//! MXF Content Package Multiplexing
//!
//! This crate writes MXF files whose essence is interleaved as content
//! packages, one per edit unit, each item aligned to the key alignment grid.
//!
//! # Features
//!
//! - KLV and BER length coding, partition packs and the random index pack
//! - Header metadata sets with a primer pack and in-place duration updates
//! - Index table segments for constant and variable edit unit sizes
//! - SMPTE 331M system items with SMPTE 12M user timecode
//! - AES-3 packing of PCM audio with the 525-line 5-frame sample sequence
//! - A D-10 (SMPTE 386M) OP-1A writer with a two-pass finalizer
//!
//! # Example
//!
//! ```no_run
//! use rewrap_mxf::{D10Writer, D10WriterConfig};
//!
//! let config = D10WriterConfig {
//!     channel_count: 2,
//!     ..Default::default()
//! };
//! let mut writer = D10Writer::create("out.mxf", config).unwrap();
//!
//! let picture = vec![0u8; 250_000];
//! let audio = vec![0u8; 1920 * 3];
//! for _ in 0..25 {
//!     let timecode = writer.generate_user_timecode();
//!     writer.set_user_timecode(timecode);
//!     writer.set_video(&picture).unwrap();
//!     writer.set_audio(0, &audio).unwrap();
//!     writer.set_audio(1, &audio).unwrap();
//!     writer.write_content_package().unwrap();
//! }
//! writer.complete().unwrap();
//! ```

mod aes3;
mod d10;
mod error;
mod file;
mod index;
mod klv;
mod layout;
mod metadata;
mod package;
mod partition;
mod system_item;
mod timecode;
mod types;
mod ul;

pub use aes3::{matching_sequence_offsets, resolve_sequence_offset, Aes3Packer, AudioSequence};
pub use d10::{
    content_package_size, AspectRatio, D10BitRate, D10Writer, D10WriterConfig, ProductInfo,
    SequenceOffset, SequenceOffsetSource, BODY_SID, INDEX_SID,
};
pub use error::{MxfError, Result};
pub use file::MxfFile;
pub use index::{
    frame_offsets_from_segments, DeltaEntry, IndexEntry, IndexTableSegment,
    MAX_VBR_ENTRIES_PER_SEGMENT,
};
pub use klv::{decode_ber_length, encode_ber_length, Klv, KlvReader, LLEN};
pub use layout::{aes3_block_size, kag_aligned_size, D10Layout, D10SampleRate, KAG_SIZE};
pub use metadata::{tags, Filler, HeaderMetadata, MetadataSet, PrimerPack, SetId};
pub use package::{ContentPackage, MAX_AUDIO_CHANNELS};
pub use partition::{Partition, PartitionKind, PartitionStatus, RandomIndexPack, RipEntry};
pub use system_item::write_system_item;
pub use timecode::Timecode;
pub use types::{IdGenerator, MxfTimestamp, Rational, Umid};
pub use ul::{labels, UniversalLabel, UL};

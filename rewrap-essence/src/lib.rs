//! Raw Essence Reading for MXF Re-wrapping
//!
//! This crate splits raw (unwrapped) essence streams into frames so they can
//! be multiplexed into MXF content packages.
//!
//! # Features
//!
//! - Growable byte buffers reused across frames
//! - Frame offset indexes for variable frame size essence
//! - Fixed size, PCM and marker-delimited (Avid MJPEG) frame parsers
//! - Essence container label lookup for DV, DNxHD, IMX, uncompressed and PCM
//! - Synchronized multi-track reading into content packages
//!
//! # Example
//!
//! ```no_run
//! use rewrap_essence::{
//!     ByteBuffer, EssenceDescriptor, EssenceParser, EssenceType, ParserOptions, PictureGeometry,
//! };
//! use std::fs::File;
//!
//! let file = File::open("video.dv").unwrap();
//! let mut parser = EssenceParser::create(
//!     file,
//!     &EssenceType::IecDv25_625_50.label(),
//!     &EssenceDescriptor::Picture(PictureGeometry::default()),
//!     ParserOptions::default(),
//! )
//! .unwrap();
//!
//! let mut frame = ByteBuffer::new();
//! while let Some(_) = parser.read(&mut frame).unwrap() {
//!     println!("frame of {} bytes", frame.size());
//! }
//! ```

mod buffer;
mod clip_reader;
mod content_package;
mod error;
mod format;
mod frame_index;
pub mod parser;

pub use buffer::ByteBuffer;
pub use clip_reader::{ClipReader, TrackReader};
pub use content_package::{ClipPackage, ContentElement};
pub use error::{EssenceError, Result};
pub use format::{EssenceType, Label, MjpegResolution, ParserStrategy};
pub use frame_index::FrameOffsetIndex;
pub use parser::{
    EssenceDescriptor, EssenceParser, ParserOptions, PictureGeometry, SoundFormat, VideoRate,
};

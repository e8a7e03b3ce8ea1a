//! Raw essence parsers.
//!
//! A parser splits a raw essence stream into frames. The strategy is picked
//! once from the essence container label:
//!
//! - [`FixedSizeParser`] for constant frame sizes (DV, DNxHD, uncompressed, IMX)
//! - [`PcmParser`] for PCM audio following the video frame rate sample sequence
//! - [`VariableSizeParser`] for marker-delimited frames (Avid MJPEG)
//!
//! `read` returns `Ok(None)` at the natural end of the stream; a short read
//! is not an error but fixes the duration at the current position.

mod fixed;
mod mjpeg;
mod pcm;

pub use fixed::FixedSizeParser;
pub use mjpeg::VariableSizeParser;
pub use pcm::PcmParser;

use crate::buffer::ByteBuffer;
use crate::error::{EssenceError, Result};
use crate::format::{EssenceType, Label, ParserStrategy};
use crate::frame_index::FrameOffsetIndex;
use std::io::{Read, Seek, SeekFrom};

/// Video frame rates that parsers and writers support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoRate {
    /// 25 fps (625-line)
    #[default]
    Fps25,
    /// 30000/1001 fps (525-line)
    Fps29_97,
}

impl VideoRate {
    /// Map an edit rate to a supported video rate.
    pub fn from_ratio(numerator: i32, denominator: i32) -> Option<Self> {
        match (numerator, denominator) {
            (25, 1) => Some(VideoRate::Fps25),
            (30000, 1001) => Some(VideoRate::Fps29_97),
            _ => None,
        }
    }

    /// Edit rate as `(numerator, denominator)`.
    pub fn ratio(self) -> (i32, i32) {
        match self {
            VideoRate::Fps25 => (25, 1),
            VideoRate::Fps29_97 => (30000, 1001),
        }
    }

    /// Nominal frames per second used for timecode.
    pub fn timecode_base(self) -> u32 {
        match self {
            VideoRate::Fps25 => 25,
            VideoRate::Fps29_97 => 30,
        }
    }

    /// Number of 48 kHz audio samples in each frame of the rate's sequence.
    pub fn audio_sample_sequence(self) -> &'static [u32] {
        match self {
            VideoRate::Fps25 => &[1920],
            VideoRate::Fps29_97 => &[1602, 1601, 1602, 1601, 1602],
        }
    }
}

/// Picture descriptor fields needed to size frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PictureGeometry {
    pub stored_width: u32,
    pub stored_height: u32,
    pub horizontal_subsampling: u32,
    pub vertical_subsampling: u32,
    /// Frame layout code; 1 (separate fields) and 4 (segmented) store two fields.
    pub frame_layout: Option<u8>,
    pub component_depth: Option<u32>,
    pub image_start_offset: u32,
    pub image_end_offset: u32,
    /// Avid frame sample size; overrides the computed size when positive.
    pub frame_sample_size: Option<i32>,
    /// Avid resolution id.
    pub resolution_id: Option<u32>,
}

impl PictureGeometry {
    fn field_factor(&self) -> u32 {
        match self.frame_layout {
            Some(1) | Some(4) => 2,
            _ => 1,
        }
    }

    fn scaled_size(&self, h_subsamp: u32, v_subsamp: u32) -> u32 {
        let samples = self.field_factor() as f64
            * self.stored_width as f64
            * self.stored_height as f64
            * (1.0 + 2.0 / (h_subsamp * v_subsamp) as f64);
        (samples + 0.5) as u32
    }

    /// Size of one uncompressed 8-bit frame, including the image offsets.
    pub fn uncompressed_frame_size(&self) -> Result<u32> {
        if let Some(size) = self.frame_sample_size {
            if size > 0 {
                return Ok(size as u32);
            }
        }
        if matches!(self.component_depth, Some(depth) if depth != 8) {
            return Err(EssenceError::unsupported("only 8-bit uncompressed video is supported"));
        }
        if self.horizontal_subsampling == 0 || self.vertical_subsampling == 0 {
            return Err(EssenceError::unsupported("missing picture subsampling"));
        }
        if self.stored_width == 0 || self.stored_height == 0 {
            return Err(EssenceError::unsupported("missing stored picture dimensions"));
        }

        Ok(self.image_start_offset
            + self.image_end_offset
            + self.scaled_size(self.horizontal_subsampling, self.vertical_subsampling))
    }

    /// Best effort uncompressed size, 0 when the geometry is incomplete.
    pub fn estimate_uncompressed_size(&self) -> u32 {
        if matches!(self.component_depth, Some(depth) if depth != 8) {
            return 0;
        }
        if self.stored_width == 0 || self.stored_height == 0 {
            return 0;
        }
        if self.horizontal_subsampling == 0 || self.vertical_subsampling == 0 {
            return self.scaled_size(1, 1);
        }
        self.scaled_size(self.horizontal_subsampling, self.vertical_subsampling)
    }
}

/// Sound descriptor fields needed to size PCM frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundFormat {
    /// Audio sampling rate as `(numerator, denominator)`, if known.
    pub sampling_rate: Option<(i32, i32)>,
    pub channel_count: u32,
    pub quantization_bits: u32,
}

impl Default for SoundFormat {
    fn default() -> Self {
        SoundFormat {
            sampling_rate: Some((48000, 1)),
            channel_count: 1,
            quantization_bits: 24,
        }
    }
}

/// The file descriptor of the track being parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EssenceDescriptor {
    Picture(PictureGeometry),
    Sound(SoundFormat),
}

impl EssenceDescriptor {
    fn picture(&self) -> Option<&PictureGeometry> {
        match self {
            EssenceDescriptor::Picture(geometry) => Some(geometry),
            EssenceDescriptor::Sound(_) => None,
        }
    }
}

/// Options passed when creating a parser.
#[derive(Debug, Clone, Default)]
pub struct ParserOptions {
    /// Essence length in bytes; 0 means up to the end of the stream.
    pub essence_length: i64,
    /// Frame size to use when the essence type does not define one.
    pub frame_size: u32,
    /// Video edit rate of the clip.
    pub edit_rate: VideoRate,
    /// A frame offset index read from the file, if present.
    pub index: Option<FrameOffsetIndex>,
}

/// Position bookkeeping shared by all parser strategies.
#[derive(Debug)]
pub(crate) struct RawStream<R> {
    pub reader: R,
    pub essence_type: EssenceType,
    /// Essence length limit in bytes, 0 for none.
    pub essence_length: i64,
    /// Absolute stream offset of the first essence byte.
    pub start_offset: i64,
    pub position: i64,
    /// Frame count, -1 until known.
    pub duration: i64,
    /// Byte offset of the current frame relative to `start_offset`.
    pub essence_offset: i64,
}

impl<R: Read + Seek> RawStream<R> {
    pub fn new(mut reader: R, essence_type: EssenceType, essence_length: i64) -> Result<Self> {
        let start_offset = reader.stream_position()? as i64;
        Ok(RawStream {
            reader,
            essence_type,
            essence_length,
            start_offset,
            position: 0,
            duration: -1,
            essence_offset: 0,
        })
    }

    pub fn is_eof(&self) -> bool {
        self.duration >= 0 && self.position >= self.duration
    }

    /// Essence bytes available from `start_offset`, capped by the essence length.
    pub fn available_length(&mut self) -> Result<i64> {
        let current = self.reader.stream_position()?;
        let end = self.reader.seek(SeekFrom::End(0))?;
        self.reader.seek(SeekFrom::Start(current))?;

        let mut length = end as i64 - self.start_offset;
        if self.essence_length > 0 && length > self.essence_length {
            length = self.essence_length;
        }
        Ok(length.max(0))
    }

    pub fn seek_to(&mut self, offset: i64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset as u64))?;
        Ok(())
    }

    /// Read exactly `size` bytes into `data`.
    ///
    /// On a short read the stream is moved back to where the read started and
    /// the duration is fixed at the current position.
    pub fn read_frame(&mut self, data: &mut ByteBuffer, size: usize) -> Result<bool> {
        data.reset();
        data.min_allocate(size);
        let count = data.read_from(&mut self.reader, size)?;
        if count != size {
            self.reader.seek(SeekFrom::Current(-(count as i64)))?;
            self.duration = self.position;
            data.reset();
            return Ok(false);
        }
        Ok(true)
    }
}

/// A raw essence parser, one variant per strategy.
#[derive(Debug)]
pub enum EssenceParser<R> {
    Fixed(FixedSizeParser<R>),
    Pcm(PcmParser<R>),
    Variable(VariableSizeParser<R>),
}

impl<R: Read + Seek> EssenceParser<R> {
    /// Create the parser for an essence container label.
    ///
    /// The essence is assumed to start at the reader's current position.
    pub fn create(
        reader: R,
        label: &Label,
        descriptor: &EssenceDescriptor,
        options: ParserOptions,
    ) -> Result<Self> {
        let essence_type = EssenceType::from_label(label).ok_or_else(|| {
            EssenceError::unsupported(format!("essence container label {:02x?}", label))
        })?;

        match essence_type.strategy() {
            ParserStrategy::Fixed => {
                let mut frame_size = essence_type.fixed_frame_size();
                if frame_size == 0 {
                    frame_size = options.frame_size;
                }
                let parser = FixedSizeParser::new(
                    reader,
                    essence_type,
                    options.essence_length,
                    descriptor.picture(),
                    frame_size,
                )?;
                Ok(EssenceParser::Fixed(parser))
            }
            ParserStrategy::Pcm => {
                let sound = match descriptor {
                    EssenceDescriptor::Sound(sound) => sound,
                    EssenceDescriptor::Picture(_) => {
                        return Err(EssenceError::unsupported(
                            "PCM essence requires a sound descriptor",
                        ))
                    }
                };
                let parser = PcmParser::new(
                    reader,
                    essence_type,
                    options.essence_length,
                    options.edit_rate,
                    sound,
                )?;
                Ok(EssenceParser::Pcm(parser))
            }
            ParserStrategy::Variable => {
                let parser = VariableSizeParser::new(
                    reader,
                    essence_type,
                    options.essence_length,
                    descriptor.picture(),
                    options.index,
                )?;
                Ok(EssenceParser::Variable(parser))
            }
        }
    }

    /// Read the next frame into `data`, returning its sample count.
    pub fn read(&mut self, data: &mut ByteBuffer) -> Result<Option<u32>> {
        match self {
            EssenceParser::Fixed(p) => p.read(data),
            EssenceParser::Pcm(p) => p.read(data),
            EssenceParser::Variable(p) => p.read(data),
        }
    }

    /// Move to frame `position`. Returns false if it is beyond the essence.
    pub fn seek(&mut self, position: i64) -> Result<bool> {
        match self {
            EssenceParser::Fixed(p) => p.seek(position),
            EssenceParser::Pcm(p) => p.seek(position),
            EssenceParser::Variable(p) => p.seek(position),
        }
    }

    /// Determine the number of frames, scanning the stream if necessary.
    pub fn determine_duration(&mut self) -> Result<i64> {
        match self {
            EssenceParser::Fixed(p) => p.determine_duration(),
            EssenceParser::Pcm(p) => p.determine_duration(),
            EssenceParser::Variable(p) => p.determine_duration(),
        }
    }

    fn stream(&self) -> &RawStream<R> {
        match self {
            EssenceParser::Fixed(p) => &p.stream,
            EssenceParser::Pcm(p) => &p.stream,
            EssenceParser::Variable(p) => &p.stream,
        }
    }

    /// Known frame count, or -1.
    pub fn duration(&self) -> i64 {
        self.stream().duration
    }

    pub fn position(&self) -> i64 {
        self.stream().position
    }

    /// Byte offset of the current frame within the essence.
    pub fn essence_offset(&self) -> i64 {
        self.stream().essence_offset
    }

    pub fn essence_type(&self) -> EssenceType {
        self.stream().essence_type
    }

    pub fn is_eof(&self) -> bool {
        self.stream().is_eof()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_uncompressed_frame_size() {
        let geometry = PictureGeometry {
            stored_width: 720,
            stored_height: 288,
            horizontal_subsampling: 2,
            vertical_subsampling: 1,
            frame_layout: Some(1),
            component_depth: Some(8),
            ..Default::default()
        };
        assert_eq!(geometry.uncompressed_frame_size().unwrap(), 720 * 576 * 2);

        let avid = PictureGeometry {
            frame_sample_size: Some(1000),
            ..geometry.clone()
        };
        assert_eq!(avid.uncompressed_frame_size().unwrap(), 1000);

        let ten_bit = PictureGeometry {
            component_depth: Some(10),
            ..geometry
        };
        assert!(ten_bit.uncompressed_frame_size().is_err());
        assert_eq!(ten_bit.estimate_uncompressed_size(), 0);
    }

    #[test]
    fn test_create_unknown_label() {
        let result = EssenceParser::create(
            Cursor::new(vec![0u8; 16]),
            &[0u8; 16],
            &EssenceDescriptor::Sound(SoundFormat::default()),
            ParserOptions::default(),
        );
        assert!(matches!(result, Err(EssenceError::UnsupportedEssence { .. })));
    }

    #[test]
    fn test_create_dispatches_by_label() {
        let parser = EssenceParser::create(
            Cursor::new(vec![0u8; 144_000 * 2]),
            &EssenceType::IecDv25_625_50.label(),
            &EssenceDescriptor::Picture(PictureGeometry::default()),
            ParserOptions::default(),
        )
        .unwrap();
        assert!(matches!(parser, EssenceParser::Fixed(_)));
        assert_eq!(parser.duration(), 2);

        let parser = EssenceParser::create(
            Cursor::new(vec![0u8; 1920 * 3 * 4]),
            &EssenceType::Bwf.label(),
            &EssenceDescriptor::Sound(SoundFormat::default()),
            ParserOptions::default(),
        )
        .unwrap();
        assert!(matches!(parser, EssenceParser::Pcm(_)));
        assert_eq!(parser.duration(), 4);
    }

    #[test]
    fn test_pcm_requires_sound_descriptor() {
        let result = EssenceParser::create(
            Cursor::new(Vec::new()),
            &EssenceType::Aes3.label(),
            &EssenceDescriptor::Picture(PictureGeometry::default()),
            ParserOptions::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_video_rate_sequences() {
        assert_eq!(VideoRate::Fps25.audio_sample_sequence(), &[1920]);
        let ntsc: u32 = VideoRate::Fps29_97.audio_sample_sequence().iter().sum();
        assert_eq!(ntsc, 8008);
        assert_eq!(VideoRate::from_ratio(30000, 1001), Some(VideoRate::Fps29_97));
        assert_eq!(VideoRate::from_ratio(24, 1), None);
    }
}

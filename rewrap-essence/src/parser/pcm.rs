//! PCM audio following the video frame sample sequence.

use super::{RawStream, SoundFormat, VideoRate};
use crate::buffer::ByteBuffer;
use crate::error::{EssenceError, Result};
use crate::format::EssenceType;
use std::io::{Read, Seek};

/// Parser for 48 kHz PCM split into video-frame sized chunks.
#[derive(Debug)]
pub struct PcmParser<R> {
    pub(crate) stream: RawStream<R>,
    bytes_per_sample: u32,
    /// Frame sizes in bytes for each position in the sample sequence.
    frame_sizes: Vec<u32>,
    /// Bytes in one complete sequence.
    sequence_size: i64,
}

impl<R: Read + Seek> PcmParser<R> {
    pub fn new(
        reader: R,
        essence_type: EssenceType,
        essence_length: i64,
        edit_rate: VideoRate,
        sound: &SoundFormat,
    ) -> Result<Self> {
        if let Some(rate) = sound.sampling_rate {
            if rate != (48000, 1) {
                return Err(EssenceError::unsupported(format!(
                    "audio sampling rate {}/{}",
                    rate.0, rate.1
                )));
            }
        }
        if sound.channel_count == 0 || sound.quantization_bits == 0 {
            return Err(EssenceError::unsupported(
                "sound descriptor is missing channel count or quantization bits",
            ));
        }

        let bytes_per_sample = sound.channel_count * ((sound.quantization_bits + 7) / 8);
        let frame_sizes: Vec<u32> = edit_rate
            .audio_sample_sequence()
            .iter()
            .map(|samples| samples * bytes_per_sample)
            .collect();
        let sequence_size = frame_sizes.iter().map(|&s| s as i64).sum();

        let mut parser = PcmParser {
            stream: RawStream::new(reader, essence_type, essence_length)?,
            bytes_per_sample,
            frame_sizes,
            sequence_size,
        };
        parser.determine_duration()?;
        Ok(parser)
    }

    pub fn bytes_per_sample(&self) -> u32 {
        self.bytes_per_sample
    }

    fn sequence_len(&self) -> i64 {
        self.frame_sizes.len() as i64
    }

    pub fn read(&mut self, data: &mut ByteBuffer) -> Result<Option<u32>> {
        if self.stream.is_eof() {
            return Ok(None);
        }

        let index = (self.stream.position % self.sequence_len()) as usize;
        let frame_size = self.frame_sizes[index];
        if !self.stream.read_frame(data, frame_size as usize)? {
            return Ok(None);
        }

        self.stream.essence_offset += frame_size as i64;
        self.stream.position += 1;
        Ok(Some(frame_size / self.bytes_per_sample))
    }

    pub fn seek(&mut self, position: i64) -> Result<bool> {
        if position < 0 || position >= self.stream.duration {
            return Ok(false);
        }

        let mut offset = (position / self.sequence_len()) * self.sequence_size;
        let remainder = (position % self.sequence_len()) as usize;
        offset += self.frame_sizes[..remainder]
            .iter()
            .map(|&s| s as i64)
            .sum::<i64>();

        self.stream.seek_to(self.stream.start_offset + offset)?;
        self.stream.essence_offset = offset;
        self.stream.position = position;
        Ok(true)
    }

    pub fn determine_duration(&mut self) -> Result<i64> {
        if self.stream.duration >= 0 {
            return Ok(self.stream.duration);
        }

        let length = self.stream.available_length()?;
        let whole_sequences = length / self.sequence_size;
        let mut duration = whole_sequences * self.sequence_len();

        let mut remainder = length - whole_sequences * self.sequence_size;
        for &size in &self.frame_sizes {
            remainder -= size as i64;
            if remainder < 0 {
                break;
            }
            duration += 1;
        }

        self.stream.duration = duration;
        Ok(duration)
    }
}

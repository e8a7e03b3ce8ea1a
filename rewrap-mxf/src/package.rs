//! Writer-side content package: one frame of picture and PCM audio.

use crate::error::{MxfError, Result};
use crate::timecode::Timecode;
use rewrap_essence::ByteBuffer;

/// Most audio channels an AES-3 element carries
pub const MAX_AUDIO_CHANNELS: usize = 8;

/// Picture and per-channel PCM audio for one edit unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentPackage {
    user_timecode: Timecode,
    video: ByteBuffer,
    audio: [ByteBuffer; MAX_AUDIO_CHANNELS],
}

impl ContentPackage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_timecode(&self) -> Timecode {
        self.user_timecode
    }

    pub fn set_user_timecode(&mut self, timecode: Timecode) {
        self.user_timecode = timecode;
    }

    pub fn video(&self) -> &[u8] {
        self.video.as_slice()
    }

    pub fn set_video(&mut self, data: &[u8]) {
        self.video.set_bytes(data);
    }

    /// Zero-pad the picture up to `size` bytes
    pub fn pad_video(&mut self, size: usize) {
        if self.video.size() < size {
            self.video.append_zeros(size - self.video.size());
        }
    }

    pub fn audio(&self, channel: usize) -> &[u8] {
        self.audio
            .get(channel)
            .map(ByteBuffer::as_slice)
            .unwrap_or_default()
    }

    /// Set the little-endian PCM samples of one channel
    pub fn set_audio(&mut self, channel: usize, data: &[u8]) -> Result<()> {
        let buffer = self.audio.get_mut(channel).ok_or_else(|| {
            MxfError::precondition(format!(
                "audio channel {} exceeds the {} channel limit",
                channel, MAX_AUDIO_CHANNELS
            ))
        })?;
        buffer.set_bytes(data);
        Ok(())
    }

    /// Audio bytes per channel, taken from channel 0
    pub fn audio_size(&self) -> usize {
        self.audio[0].size()
    }

    pub fn audio_sample_count(&self, bytes_per_sample: u32) -> u32 {
        (self.audio_size() / bytes_per_sample.max(1) as usize) as u32
    }

    /// True when the picture and the first `channel_count` audio channels
    /// are present, with equal audio sizes
    pub fn is_complete(&self, channel_count: usize) -> bool {
        if self.video.is_empty() {
            return false;
        }
        let channels = &self.audio[..channel_count.min(MAX_AUDIO_CHANNELS)];
        match channels.first() {
            None => true,
            Some(first) => {
                !first.is_empty() && channels.iter().all(|c| c.size() == first.size())
            }
        }
    }

    /// Clear picture and audio, keeping their allocations
    pub fn reset(&mut self) {
        self.video.reset();
        for channel in &mut self.audio {
            channel.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_package() {
        let mut package = ContentPackage::new();
        assert!(!package.is_complete(0));

        package.set_video(&[1, 2, 3]);
        assert!(package.is_complete(0));
        assert!(!package.is_complete(2));

        package.set_audio(0, &[0; 6]).unwrap();
        package.set_audio(1, &[0; 3]).unwrap();
        assert!(!package.is_complete(2));

        package.set_audio(1, &[0; 6]).unwrap();
        assert!(package.is_complete(2));
        assert_eq!(package.audio_sample_count(3), 2);
    }

    #[test]
    fn test_channel_limit() {
        let mut package = ContentPackage::new();
        assert!(package.set_audio(7, &[1]).is_ok());
        assert!(matches!(
            package.set_audio(8, &[1]),
            Err(MxfError::Precondition { .. })
        ));
        assert!(package.audio(8).is_empty());
    }

    #[test]
    fn test_reset_and_clone() {
        let mut package = ContentPackage::new();
        package.set_video(&[9; 4]);
        package.pad_video(10);
        assert_eq!(package.video(), &[9, 9, 9, 9, 0, 0, 0, 0, 0, 0]);
        package.set_audio(0, &[1, 2]).unwrap();
        package.set_user_timecode(Timecode::new(1, 0, 0, 0, false));

        let copy = package.clone();
        package.reset();
        assert!(package.video().is_empty());
        assert_eq!(package.audio_size(), 0);
        assert_eq!(copy.audio(0), &[1, 2]);
        assert_eq!(copy.user_timecode(), Timecode::new(1, 0, 0, 0, false));

        // Reused allocations do not affect equality
        package.set_user_timecode(Timecode::default());
        assert_eq!(package, ContentPackage::new());
        package.set_video(&[9; 4]);
        let mut fresh = ContentPackage::new();
        fresh.set_video(&[9; 4]);
        assert_eq!(package, fresh);
    }
}

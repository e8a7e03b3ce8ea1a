//! Synchronized reading of several single-track essence streams.

use crate::content_package::ClipPackage;
use crate::error::{EssenceError, Result};
use crate::parser::EssenceParser;
use std::io::{Read, Seek};
use tracing::debug;

/// A parser bound to a material package track.
#[derive(Debug)]
pub struct TrackReader<R> {
    track_id: u32,
    is_picture: bool,
    parser: EssenceParser<R>,
    /// Track duration from the header metadata, 0 or less when unknown.
    duration_in_metadata: i64,
}

impl<R: Read + Seek> TrackReader<R> {
    pub fn new(
        track_id: u32,
        is_picture: bool,
        parser: EssenceParser<R>,
        duration_in_metadata: i64,
    ) -> Self {
        TrackReader {
            track_id,
            is_picture,
            parser,
            duration_in_metadata,
        }
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    pub fn is_picture(&self) -> bool {
        self.is_picture
    }

    pub fn parser(&self) -> &EssenceParser<R> {
        &self.parser
    }

    fn cap(&self, essence_duration: i64) -> i64 {
        if self.duration_in_metadata > 0 && essence_duration > self.duration_in_metadata {
            self.duration_in_metadata
        } else {
            essence_duration
        }
    }

    /// Known duration capped by the metadata duration, -1 if unknown.
    pub fn duration(&self) -> i64 {
        self.cap(self.parser.duration())
    }

    pub fn determine_duration(&mut self) -> Result<i64> {
        let duration = self.parser.determine_duration()?;
        Ok(self.cap(duration))
    }

    pub fn position(&self) -> i64 {
        self.parser.position()
    }

    /// Read the next frame into this track's element of `package`.
    pub fn read(&mut self, package: &mut ClipPackage) -> Result<bool> {
        let essence_offset = self.parser.essence_offset();
        let element = package.add_or_get_element(self.track_id, self.is_picture);
        match self.parser.read(&mut element.data)? {
            Some(num_samples) => {
                element.num_samples = num_samples;
                element.essence_offset = essence_offset;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn seek(&mut self, position: i64) -> Result<bool> {
        self.parser.seek(position)
    }

    pub fn is_eof(&self) -> bool {
        self.parser.is_eof()
    }
}

/// Reads one [`ClipPackage`] per position across all tracks of a clip.
#[derive(Debug)]
pub struct ClipReader<R> {
    tracks: Vec<TrackReader<R>>,
    package: ClipPackage,
    position: i64,
    duration: i64,
}

impl<R: Read + Seek> ClipReader<R> {
    pub fn new(tracks: Vec<TrackReader<R>>) -> Result<Self> {
        if tracks.is_empty() {
            return Err(EssenceError::unsupported("clip has no tracks"));
        }

        let mut package = ClipPackage::new();
        for track in &tracks {
            package.add_element(track.track_id, track.is_picture)?;
        }

        let mut reader = ClipReader {
            tracks,
            package,
            position: 0,
            duration: -1,
        };
        reader.duration = reader.min_duration(|t| Ok(t.duration()))?;
        Ok(reader)
    }

    fn min_duration<F>(&mut self, mut track_duration: F) -> Result<i64>
    where
        F: FnMut(&mut TrackReader<R>) -> Result<i64>,
    {
        let mut min: i64 = -1;
        for track in &mut self.tracks {
            let duration = track_duration(track)?;
            if duration < 0 {
                return Ok(-1);
            }
            if min < 0 || duration < min {
                min = duration;
            }
        }
        Ok(min)
    }

    pub fn tracks(&self) -> &[TrackReader<R>] {
        &self.tracks
    }

    /// Shortest track duration, -1 if any track's duration is unknown.
    pub fn duration(&mut self) -> Result<i64> {
        if self.duration < 0 {
            self.duration = self.min_duration(|t| Ok(t.duration()))?;
        }
        Ok(self.duration)
    }

    /// Like [`duration`](Self::duration) but scans essence where needed.
    pub fn determine_duration(&mut self) -> Result<i64> {
        self.duration = self.min_duration(|t| t.determine_duration())?;
        Ok(self.duration)
    }

    pub fn position(&self) -> i64 {
        self.position
    }

    /// Read the package at the current position.
    ///
    /// If any track fails, the tracks already read are moved back so the
    /// clip stays at the same position.
    pub fn read(&mut self) -> Result<Option<&ClipPackage>> {
        let prev_position = self.position;
        for i in 0..self.tracks.len() {
            let read = self.tracks[i].read(&mut self.package);
            if !matches!(read, Ok(true)) {
                debug!(
                    position = prev_position,
                    track = self.tracks[i].track_id,
                    "clip read failed"
                );
                self.rollback(i, prev_position)?;
                return read.map(|_| None);
            }
        }

        self.position += 1;
        Ok(Some(&self.package))
    }

    /// Seek all tracks to `position`, leaving them unchanged on failure.
    pub fn seek(&mut self, position: i64) -> Result<bool> {
        let prev_position = self.position;
        for i in 0..self.tracks.len() {
            let seek = self.tracks[i].seek(position);
            if !matches!(seek, Ok(true)) {
                self.rollback(i, prev_position)?;
                return seek;
            }
        }

        self.position = position;
        Ok(true)
    }

    fn rollback(&mut self, last: usize, position: i64) -> Result<()> {
        for track in &mut self.tracks[..=last] {
            track.seek(position)?;
        }
        Ok(())
    }

    /// True when any track has reached its end.
    pub fn is_eof(&self) -> bool {
        self.tracks.iter().any(|t| t.is_eof())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::EssenceType;
    use crate::parser::{EssenceDescriptor, ParserOptions, PictureGeometry, SoundFormat};
    use std::io::Cursor;

    const DV_FRAME: usize = 144_000;

    fn video_track(frames: usize) -> TrackReader<Cursor<Vec<u8>>> {
        let mut data = Vec::with_capacity(frames * DV_FRAME);
        for i in 0..frames {
            data.extend(std::iter::repeat(i as u8).take(DV_FRAME));
        }
        let parser = EssenceParser::create(
            Cursor::new(data),
            &EssenceType::IecDv25_625_50.label(),
            &EssenceDescriptor::Picture(PictureGeometry::default()),
            ParserOptions::default(),
        )
        .unwrap();
        TrackReader::new(1, true, parser, 0)
    }

    fn audio_track(frames: usize) -> TrackReader<Cursor<Vec<u8>>> {
        let parser = EssenceParser::create(
            Cursor::new(vec![0u8; frames * 1920 * 2]),
            &EssenceType::Bwf.label(),
            &EssenceDescriptor::Sound(SoundFormat {
                quantization_bits: 16,
                ..Default::default()
            }),
            ParserOptions::default(),
        )
        .unwrap();
        TrackReader::new(2, false, parser, 0)
    }

    #[test]
    fn test_duration_is_shortest_track() {
        let mut clip = ClipReader::new(vec![video_track(3), audio_track(2)]).unwrap();
        assert_eq!(clip.duration().unwrap(), 2);
        assert_eq!(clip.determine_duration().unwrap(), 2);
    }

    #[test]
    fn test_metadata_duration_caps_track() {
        let track = video_track(3);
        let capped = TrackReader::new(1, true, track.parser, 2);
        assert_eq!(capped.duration(), 2);
    }

    #[test]
    fn test_read_packages() {
        let mut clip = ClipReader::new(vec![video_track(2), audio_track(3)]).unwrap();

        let package = clip.read().unwrap().unwrap();
        assert_eq!(package.len(), 2);
        let video = package.element(1).unwrap();
        assert_eq!(video.num_samples, 1);
        assert_eq!(video.data.size(), DV_FRAME);
        assert_eq!(package.element(2).unwrap().num_samples, 1920);

        let package = clip.read().unwrap().unwrap();
        assert_eq!(package.element(1).unwrap().essence_offset, DV_FRAME as i64);
        assert_eq!(package.element(2).unwrap().essence_offset, 1920 * 2);
        assert_eq!(clip.position(), 2);
        assert!(clip.is_eof());
    }

    #[test]
    fn test_failed_read_rolls_back() {
        // the audio track ends first, the video track must not advance
        let mut clip = ClipReader::new(vec![video_track(3), audio_track(1)]).unwrap();
        assert!(clip.read().unwrap().is_some());
        assert!(clip.read().unwrap().is_none());
        assert_eq!(clip.position(), 1);
        assert_eq!(clip.tracks()[0].position(), 1);
    }

    #[test]
    fn test_seek_with_rollback() {
        let mut clip = ClipReader::new(vec![video_track(4), audio_track(2)]).unwrap();
        assert!(clip.seek(1).unwrap());
        assert!(!clip.seek(3).unwrap());
        assert_eq!(clip.position(), 1);
        assert_eq!(clip.tracks()[0].position(), 1);

        let package = clip.read().unwrap().unwrap();
        assert_eq!(package.element(1).unwrap().data.as_slice()[0], 1);
    }

    #[test]
    fn test_empty_clip_rejected() {
        let result: Result<ClipReader<Cursor<Vec<u8>>>> = ClipReader::new(Vec::new());
        assert!(result.is_err());
    }
}

//! Constant frame size essence.

use super::{PictureGeometry, RawStream};
use crate::buffer::ByteBuffer;
use crate::error::{EssenceError, Result};
use crate::format::EssenceType;
use std::io::{Read, Seek};
use tracing::debug;

const SCAN_CHUNK: usize = 4096;
const MPEG_SEQUENCE_HEADER: u8 = 0xb3;

/// Parser for essence where every frame has the same byte size.
#[derive(Debug)]
pub struct FixedSizeParser<R> {
    pub(crate) stream: RawStream<R>,
    frame_size: u32,
}

impl<R: Read + Seek> FixedSizeParser<R> {
    /// Create a parser. A `frame_size` of 0 is derived from the picture
    /// geometry for uncompressed essence, or by scanning MPEG streams.
    pub fn new(
        reader: R,
        essence_type: EssenceType,
        essence_length: i64,
        geometry: Option<&PictureGeometry>,
        frame_size: u32,
    ) -> Result<Self> {
        let mut frame_size = frame_size;
        if frame_size == 0 {
            if essence_type.is_uncompressed() {
                let geometry = geometry.ok_or_else(|| {
                    EssenceError::unsupported("uncompressed essence requires a picture descriptor")
                })?;
                frame_size = geometry.uncompressed_frame_size()?;
            } else if !essence_type.is_mpeg() {
                return Err(EssenceError::unsupported(format!(
                    "unknown frame size for {}",
                    essence_type
                )));
            }
        }

        let mut parser = FixedSizeParser {
            stream: RawStream::new(reader, essence_type, essence_length)?,
            frame_size,
        };
        parser.determine_duration()?;
        Ok(parser)
    }

    /// Frame size in bytes, 0 if it could not be determined.
    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    pub fn read(&mut self, data: &mut ByteBuffer) -> Result<Option<u32>> {
        if self.frame_size == 0 || self.stream.is_eof() {
            return Ok(None);
        }

        if !self.stream.read_frame(data, self.frame_size as usize)? {
            return Ok(None);
        }

        self.stream.essence_offset += self.frame_size as i64;
        self.stream.position += 1;
        Ok(Some(1))
    }

    pub fn seek(&mut self, position: i64) -> Result<bool> {
        if self.frame_size == 0 || position < 0 || position >= self.stream.duration {
            return Ok(false);
        }

        let offset = self.frame_size as i64 * position;
        self.stream.seek_to(self.stream.start_offset + offset)?;
        self.stream.essence_offset = offset;
        self.stream.position = position;
        Ok(true)
    }

    pub fn determine_duration(&mut self) -> Result<i64> {
        if self.stream.duration >= 0 {
            return Ok(self.stream.duration);
        }

        if self.frame_size == 0 && !self.determine_mpeg_frame_size()? {
            return Ok(-1);
        }

        let length = self.stream.available_length()?;
        self.stream.duration = length / self.frame_size as i64;
        Ok(self.stream.duration)
    }

    /// Find the frame size of an MPEG elementary stream from the distance
    /// between the first two sequence headers.
    fn determine_mpeg_frame_size(&mut self) -> Result<bool> {
        let mut first_start: i64 = -1;
        let mut second_start: i64 = -1;
        let mut offset: i64 = 0;
        let mut zeros = 0;
        let mut have_prefix = false;
        let mut chunk = ByteBuffer::with_capacity(SCAN_CHUNK);

        'scan: while second_start < 0 {
            chunk.reset();
            let count = chunk.read_from(&mut self.stream.reader, SCAN_CHUNK)?;

            for &byte in chunk.as_slice() {
                if have_prefix {
                    if byte == MPEG_SEQUENCE_HEADER {
                        if first_start < 0 {
                            first_start = offset - 3;
                        } else {
                            second_start = offset - 3;
                            break 'scan;
                        }
                    }
                    have_prefix = false;
                } else if byte == 0x00 {
                    zeros += 1;
                } else {
                    if byte == 0x01 && zeros >= 2 {
                        have_prefix = true;
                    }
                    zeros = 0;
                }
                offset += 1;
            }

            if count != SCAN_CHUNK {
                break;
            }
        }

        if second_start > 0 {
            self.move_essence_start(first_start);
            self.frame_size = u32::try_from(second_start - first_start)
                .map_err(|_| EssenceError::invalid("MPEG frame size too large", first_start))?;
        } else if first_start >= 0 {
            // a single frame up to the end of the essence
            self.move_essence_start(first_start);
            let span = if self.stream.essence_length > 0 {
                self.stream.essence_length
            } else {
                offset - first_start
            };
            self.frame_size = u32::try_from(span)
                .map_err(|_| EssenceError::invalid("MPEG frame size too large", first_start))?;
        }

        self.stream.seek_to(self.stream.start_offset)?;
        debug!(
            frame_size = self.frame_size,
            start = self.stream.start_offset,
            "determined MPEG frame size"
        );
        Ok(self.frame_size > 0)
    }

    fn move_essence_start(&mut self, delta: i64) {
        self.stream.start_offset += delta;
        if self.stream.essence_length > 0 {
            self.stream.essence_length -= delta;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn dv_parser(frames: usize, extra: usize) -> FixedSizeParser<Cursor<Vec<u8>>> {
        let mut data = Vec::new();
        for i in 0..frames {
            data.extend(std::iter::repeat(i as u8).take(1000));
        }
        data.extend(std::iter::repeat(0xee).take(extra));
        FixedSizeParser::new(Cursor::new(data), EssenceType::IecDv25_625_50, 0, None, 1000)
            .unwrap()
    }

    #[test]
    fn test_read_all_frames() {
        let mut parser = dv_parser(3, 10);
        assert_eq!(parser.determine_duration().unwrap(), 3);

        let mut buf = ByteBuffer::new();
        for i in 0..3u8 {
            assert_eq!(parser.read(&mut buf).unwrap(), Some(1));
            assert_eq!(buf.size(), 1000);
            assert_eq!(buf.as_slice()[0], i);
        }
        assert_eq!(parser.read(&mut buf).unwrap(), None);
        assert!(parser.stream.is_eof());
    }

    #[test]
    fn test_seek() {
        let mut parser = dv_parser(4, 0);
        let mut buf = ByteBuffer::new();

        assert!(parser.seek(2).unwrap());
        assert_eq!(parser.stream.essence_offset, 2000);
        parser.read(&mut buf).unwrap();
        assert_eq!(buf.as_slice()[0], 2);

        assert!(parser.seek(3).unwrap());
        assert!(!parser.seek(4).unwrap());
        assert!(!parser.seek(-1).unwrap());
    }

    #[test]
    fn test_essence_length_caps_duration() {
        let data = vec![0u8; 5000];
        let parser =
            FixedSizeParser::new(Cursor::new(data), EssenceType::IecDv25_625_50, 2500, None, 1000)
                .unwrap();
        assert_eq!(parser.stream.duration, 2);
    }

    #[test]
    fn test_mpeg_frame_size_two_headers() {
        let mut data = vec![0xffu8; 5];
        let mut frame = vec![0x00, 0x00, 0x01, 0xb3];
        frame.extend(vec![0x55; 96]);
        data.extend(&frame);
        data.extend(&frame);
        data.extend(&frame);

        let mut parser =
            FixedSizeParser::new(Cursor::new(data), EssenceType::AvidImx50_625_50, 0, None, 0)
                .unwrap();
        assert_eq!(parser.frame_size(), 100);
        assert_eq!(parser.stream.start_offset, 5);
        assert_eq!(parser.stream.duration, 3);

        let mut buf = ByteBuffer::new();
        parser.read(&mut buf).unwrap();
        assert_eq!(&buf.as_slice()[..4], &[0x00, 0x00, 0x01, 0xb3]);
    }

    #[test]
    fn test_mpeg_single_frame() {
        let mut data = vec![0x00, 0x00, 0x01, 0xb3];
        data.extend(vec![0x12; 60]);

        let parser =
            FixedSizeParser::new(Cursor::new(data), EssenceType::AvidImx30_525_60, 0, None, 0)
                .unwrap();
        assert_eq!(parser.frame_size(), 64);
        assert_eq!(parser.stream.duration, 1);
    }

    #[test]
    fn test_mpeg_without_header() {
        let mut parser = FixedSizeParser::new(
            Cursor::new(vec![0x42u8; 300]),
            EssenceType::AvidImx40_625_50,
            0,
            None,
            0,
        )
        .unwrap();
        assert_eq!(parser.frame_size(), 0);
        assert_eq!(parser.stream.duration, -1);
        assert_eq!(parser.read(&mut ByteBuffer::new()).unwrap(), None);
    }

    #[test]
    fn test_unknown_frame_size_rejected() {
        let result = FixedSizeParser::new(
            Cursor::new(Vec::new()),
            EssenceType::DnxHd1235,
            0,
            None,
            0,
        );
        assert!(result.is_err());
    }
}

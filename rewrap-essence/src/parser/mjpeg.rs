//! Marker-delimited variable size essence (Avid MJPEG).
//!
//! Frame boundaries are unknown until the JPEG markers are scanned. The
//! frame offset index is extended lazily as reads and seeks move past the
//! indexed range. A complete index read from the file can be supplied
//! instead, in which case no scanning happens.

use super::{PictureGeometry, RawStream};
use crate::buffer::ByteBuffer;
use crate::error::{EssenceError, Result};
use crate::format::{EssenceType, MjpegResolution};
use crate::frame_index::FrameOffsetIndex;
use std::io::{Read, Seek};
use tracing::{debug, warn};

const READ_CHUNK: usize = 4096;

/// Outcome of scanning the buffered bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scan {
    /// A complete image ends inside the buffer.
    Image,
    /// The buffer is exhausted without completing an image.
    NeedMore,
    /// Bytes that cannot start an image were found.
    TrailingData,
}

/// Marker scanner state carried across file reads.
#[derive(Debug, Default)]
struct MjpegScanner {
    resolution: Option<MjpegResolution>,
    /// Read-ahead bytes from the file.
    buffer: ByteBuffer,
    position: usize,
    prev_position: usize,
    end_of_field: bool,
    field2: bool,
    skip_count: i32,
    have_len_byte1: bool,
    have_len_byte2: bool,
    /// 0: expect 0xff, 1: expect SOI, 2: find 0xff, 3: marker type, 4: skip segment
    marker_state: u8,
}

impl MjpegScanner {
    fn reset(&mut self) {
        self.position = 0;
        self.prev_position = 0;
        self.end_of_field = false;
        self.field2 = false;
        self.skip_count = 0;
        self.have_len_byte1 = false;
        self.have_len_byte2 = false;
        self.marker_state = 0;
        self.buffer.reset();
    }

    fn single_field(&self) -> bool {
        self.resolution.map_or(false, |r| r.is_single_field())
    }

    /// Scan buffered bytes, appending those consumed to `image`.
    fn scan(&mut self, image: &mut ByteBuffer) -> Scan {
        if self.buffer.is_empty() {
            return Scan::NeedMore;
        }

        let mut have_image = false;
        while !have_image && self.position < self.buffer.size() {
            let byte = self.buffer.as_slice()[self.position];
            match self.marker_state {
                0 => {
                    if byte != 0xff {
                        return Scan::TrailingData;
                    }
                    self.marker_state = 1;
                }
                1 => {
                    if byte == 0xd8 {
                        self.marker_state = 2;
                    } else if byte != 0xff {
                        self.marker_state = 0;
                    }
                }
                2 => {
                    if byte == 0xff {
                        self.marker_state = 3;
                    }
                }
                3 => {
                    if byte == 0xd9 {
                        self.marker_state = 0;
                        self.end_of_field = true;
                    } else if (0xd0..=0xd7).contains(&byte) || byte == 0x01 || byte == 0x00 {
                        // standalone markers and stuffed zero
                        self.marker_state = 2;
                    } else if byte != 0xff {
                        self.marker_state = 4;
                        self.have_len_byte1 = false;
                        self.have_len_byte2 = false;
                        self.skip_count = 0;
                    }
                }
                _ => {
                    if !self.have_len_byte1 {
                        self.have_len_byte1 = true;
                        self.skip_count = (byte as i32) << 8;
                    } else if !self.have_len_byte2 {
                        self.have_len_byte2 = true;
                        // the length includes both length bytes
                        self.skip_count += byte as i32 - 1;
                    }

                    if self.have_len_byte1 && self.have_len_byte2 {
                        self.skip_count -= 1;
                        if self.skip_count <= 0 {
                            self.marker_state = 2;
                        }
                    }
                }
            }
            self.position += 1;

            if self.end_of_field {
                if self.single_field() || self.field2 {
                    have_image = true;
                }
                self.end_of_field = false;
                self.field2 = !self.field2;
            }
        }

        image.append(&self.buffer.as_slice()[self.prev_position..self.position]);
        self.prev_position = self.position;

        if have_image {
            Scan::Image
        } else {
            Scan::NeedMore
        }
    }
}

/// Parser for essence whose frame sizes are only known after scanning.
#[derive(Debug)]
pub struct VariableSizeParser<R> {
    pub(crate) stream: RawStream<R>,
    index: FrameOffsetIndex,
    scanner: MjpegScanner,
    frame_size_estimate: u32,
    /// Scratch image buffer used while seeking.
    seek_data: ByteBuffer,
}

impl<R: Read + Seek> VariableSizeParser<R> {
    pub fn new(
        reader: R,
        essence_type: EssenceType,
        essence_length: i64,
        geometry: Option<&PictureGeometry>,
        index: Option<FrameOffsetIndex>,
    ) -> Result<Self> {
        let mut stream = RawStream::new(reader, essence_type, essence_length)?;
        let mut scanner = MjpegScanner::default();
        let mut frame_size_estimate = 0;

        let index = match index {
            Some(mut index) => {
                index.mark_complete();
                stream.duration = index.duration();
                index
            }
            None => {
                if essence_type != EssenceType::AvidMjpeg {
                    return Err(EssenceError::unsupported(format!(
                        "{} requires a frame offset index",
                        essence_type
                    )));
                }

                let unc_size = geometry.map_or(0, |g| g.estimate_uncompressed_size());
                match geometry.and_then(|g| g.resolution_id) {
                    None => warn!("missing Avid resolution id in picture descriptor"),
                    Some(id) => match MjpegResolution::from_id(id) {
                        Some(resolution) => {
                            scanner.resolution = Some(resolution);
                            frame_size_estimate = (unc_size as f64
                                / (resolution.compression_ratio() as f64 * 0.8))
                                as u32;
                        }
                        None => warn!("unknown Avid MJPEG resolution id 0x{:02x}", id),
                    },
                }

                let mut index = FrameOffsetIndex::new();
                index.append_offset(0)?;
                index
            }
        };

        Ok(VariableSizeParser {
            stream,
            index,
            scanner,
            frame_size_estimate,
            seek_data: ByteBuffer::new(),
        })
    }

    /// The frame offsets discovered so far.
    pub fn index(&self) -> &FrameOffsetIndex {
        &self.index
    }

    pub fn frame_size_estimate(&self) -> u32 {
        self.frame_size_estimate
    }

    pub fn read(&mut self, data: &mut ByteBuffer) -> Result<Option<u32>> {
        if self.stream.is_eof() {
            return Ok(None);
        }

        let position = self.stream.position;
        if !self.index.have_offset(position + 1) {
            // parsing leaves the image in `data` and advances the position
            self.update_index(data, position + 1)?;
            if !self.index.have_offset(position + 1) {
                return Ok(None);
            }
            return Ok(Some(1));
        }

        let frame_size = (self.index.offset(position + 1)? - self.index.offset(position)?) as usize;
        data.reset();
        data.min_allocate(frame_size);

        let mut available = 0;
        if !self.scanner.buffer.is_empty() {
            available = (self.scanner.buffer.size() - self.scanner.position).min(frame_size);
            let start = self.scanner.position;
            data.append(&self.scanner.buffer.as_slice()[start..start + available]);

            self.scanner.position += available;
            self.scanner.prev_position = self.scanner.position;
            if self.scanner.position == self.scanner.buffer.size() {
                self.scanner.reset();
            }
        }

        if frame_size > available {
            let count = data.read_from(&mut self.stream.reader, frame_size - available)?;
            if count != frame_size - available {
                warn!(position, "failed to read frame present in the frame offset index");
                self.seek(position)?;
                return Ok(None);
            }
        }

        self.stream.essence_offset += frame_size as i64;
        self.stream.position += 1;
        Ok(Some(1))
    }

    pub fn seek(&mut self, position: i64) -> Result<bool> {
        if position < 0 || (self.stream.duration >= 0 && position >= self.stream.duration) {
            return Ok(false);
        }

        if !self.index.have_offset(position) {
            if self.index.is_complete() {
                return Ok(false);
            }
            let mut seek_data = std::mem::take(&mut self.seek_data);
            let result = self.update_index(&mut seek_data, position);
            self.seek_data = seek_data;
            // the position and stream offset were updated while parsing
            return result;
        }

        self.scanner.reset();
        let offset = self.index.offset(position)?;
        self.stream.seek_to(self.stream.start_offset + offset)?;
        self.stream.essence_offset = offset;
        self.stream.position = position;
        Ok(true)
    }

    pub fn determine_duration(&mut self) -> Result<i64> {
        if self.stream.duration >= 0 {
            return Ok(self.stream.duration);
        }

        let current = self.stream.position;
        let (_, mut indexed) = self.index.last_offset_and_position().unwrap_or((0, 0));

        let mut seek_data = std::mem::take(&mut self.seek_data);
        let mut result = Ok(true);
        while !self.index.is_complete() && result.is_ok() {
            indexed += 1;
            result = self.update_index(&mut seek_data, indexed);
        }
        self.seek_data = seek_data;
        result?;

        self.seek(current)?;
        Ok(self.stream.duration)
    }

    /// Parse forward until `position` is indexed or the stream ends.
    fn update_index(&mut self, image: &mut ByteBuffer, position: i64) -> Result<bool> {
        if self.index.is_complete() {
            return Ok(false);
        }

        let (mut offset, mut indexed) = self.index.last_offset_and_position().unwrap_or((0, 0));
        if indexed != self.stream.position && !self.seek(indexed)? {
            return Err(EssenceError::invalid(
                "failed to seek to the last indexed frame",
                offset,
            ));
        }

        while indexed < position {
            if !self.parse_image(image)? {
                break;
            }
            offset += image.size() as i64;
            self.index.append_offset(offset)?;
            indexed += 1;
        }

        if indexed < position {
            self.index.mark_complete();
            self.stream.duration = self.index.duration();
            debug!(duration = self.stream.duration, "reached end of MJPEG essence");

            if self.stream.position != self.stream.duration {
                self.scanner.reset();
                let resume = self.index.offset(self.stream.position)?;
                self.stream.seek_to(self.stream.start_offset + resume)?;
            }
            return Ok(false);
        }

        self.stream.position = position;
        self.stream.essence_offset = offset;
        Ok(true)
    }

    /// Parse the next image into `image`. Returns false at end of stream.
    fn parse_image(&mut self, image: &mut ByteBuffer) -> Result<bool> {
        if self.scanner.buffer.allocated() < READ_CHUNK {
            self.scanner.buffer.allocate(READ_CHUNK);
        }

        image.reset();
        if self.frame_size_estimate > 0 {
            image.min_allocate(self.frame_size_estimate as usize);
        }

        loop {
            match self.scanner.scan(image) {
                Scan::Image => return Ok(true),
                Scan::TrailingData => {
                    debug!("ignoring trailing data after the last MJPEG image");
                    return Ok(false);
                }
                Scan::NeedMore => {}
            }

            self.scanner.buffer.reset();
            let count = self
                .scanner
                .buffer
                .read_from(&mut self.stream.reader, READ_CHUNK)?;
            if count == 0 {
                return Ok(false);
            }
            self.scanner.position = 0;
            self.scanner.prev_position = 0;
        }
    }
}

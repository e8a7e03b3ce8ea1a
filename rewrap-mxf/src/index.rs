//! Index table segments.
//!
//! Constant bytes-per-edit-unit essence is indexed by delta entries and an
//! edit unit byte count alone. Variable size essence carries one index
//! entry per edit unit, split over several segments when the entry array
//! would overflow a 16-bit local set length.

use crate::error::{MxfError, Result};
use crate::file::MxfFile;
use crate::klv::{local_items, write_kl, write_local_item, LLEN};
use crate::types::{IdGenerator, Rational};
use crate::ul::labels;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use rewrap_essence::FrameOffsetIndex;
use std::io::{Cursor, Seek, Write};

/// Most index entries (11 bytes each, no slices) one segment can hold
pub const MAX_VBR_ENTRIES_PER_SEGMENT: usize = (0xFFFF - 8) / 11;

/// Delta entry locating an element within an edit unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeltaEntry {
    pub pos_table_index: i8,
    pub slice: u8,
    /// Bytes from the start of the edit unit
    pub element_delta: u32,
}

/// Index entry for one edit unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub temporal_offset: i8,
    pub key_frame_offset: i8,
    pub flags: u8,
    pub stream_offset: u64,
    pub slice_offsets: Vec<u32>,
}

impl IndexEntry {
    pub const FLAG_RANDOM_ACCESS: u8 = 0x80;
    pub const FLAG_SEQUENCE_HEADER: u8 = 0x40;

    /// Entry for a self-contained frame at `stream_offset`
    pub fn intra(stream_offset: u64) -> Self {
        IndexEntry {
            temporal_offset: 0,
            key_frame_offset: 0,
            flags: Self::FLAG_RANDOM_ACCESS,
            stream_offset,
            slice_offsets: Vec::new(),
        }
    }

    pub fn is_random_access(&self) -> bool {
        (self.flags & Self::FLAG_RANDOM_ACCESS) != 0
    }
}

/// Index table segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexTableSegment {
    pub instance_uid: [u8; 16],
    pub index_edit_rate: Rational,
    pub index_start_position: i64,
    pub index_duration: i64,
    /// Constant edit unit size, 0 for variable size essence
    pub edit_unit_byte_count: u32,
    pub index_sid: u32,
    pub body_sid: u32,
    pub slice_count: u8,
    pub pos_table_count: u8,
    pub delta_entries: Vec<DeltaEntry>,
    pub index_entries: Vec<IndexEntry>,
}

impl Default for IndexTableSegment {
    fn default() -> Self {
        IndexTableSegment {
            instance_uid: [0; 16],
            index_edit_rate: Rational::new(25, 1),
            index_start_position: 0,
            index_duration: 0,
            edit_unit_byte_count: 0,
            index_sid: 1,
            body_sid: 2,
            slice_count: 0,
            pos_table_count: 0,
            delta_entries: Vec::new(),
            index_entries: Vec::new(),
        }
    }
}

impl IndexTableSegment {
    pub fn append_delta_entry(&mut self, pos_table_index: i8, slice: u8, element_delta: u32) {
        self.delta_entries.push(DeltaEntry {
            pos_table_index,
            slice,
            element_delta,
        });
    }

    fn index_entry_size(&self) -> usize {
        11 + 4 * self.slice_count as usize + 8 * self.pos_table_count as usize
    }

    fn value_size(&self) -> u64 {
        let mut size = 80;
        if !self.delta_entries.is_empty() {
            size += 12 + 6 * self.delta_entries.len() as u64;
        }
        if !self.index_entries.is_empty() {
            size += 22 + (self.index_entry_size() * self.index_entries.len()) as u64;
        }
        size
    }

    /// Total KLV size when written
    pub fn size(&self) -> u64 {
        16 + LLEN as u64 + self.value_size()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<u64> {
        write_kl(writer, &labels::INDEX_TABLE_SEGMENT, self.value_size(), LLEN)?;

        write_local_item(writer, 0x3C0A, &self.instance_uid)?;
        write_local_item(writer, 0x3F0B, &self.index_edit_rate.to_bytes())?;
        write_local_item(writer, 0x3F0C, &self.index_start_position.to_be_bytes())?;
        write_local_item(writer, 0x3F0D, &self.index_duration.to_be_bytes())?;
        write_local_item(writer, 0x3F05, &self.edit_unit_byte_count.to_be_bytes())?;
        write_local_item(writer, 0x3F06, &self.index_sid.to_be_bytes())?;
        write_local_item(writer, 0x3F07, &self.body_sid.to_be_bytes())?;
        if !self.index_entries.is_empty() {
            write_local_item(writer, 0x3F08, &[self.slice_count])?;
            write_local_item(writer, 0x3F0E, &[self.pos_table_count])?;
        }

        if !self.delta_entries.is_empty() {
            let mut value = Vec::with_capacity(8 + 6 * self.delta_entries.len());
            value.write_u32::<BigEndian>(self.delta_entries.len() as u32)?;
            value.write_u32::<BigEndian>(6)?;
            for entry in &self.delta_entries {
                value.write_i8(entry.pos_table_index)?;
                value.write_u8(entry.slice)?;
                value.write_u32::<BigEndian>(entry.element_delta)?;
            }
            write_local_item(writer, 0x3F09, &value)?;
        }

        if !self.index_entries.is_empty() {
            let entry_size = self.index_entry_size();
            let mut value = Vec::with_capacity(8 + entry_size * self.index_entries.len());
            value.write_u32::<BigEndian>(self.index_entries.len() as u32)?;
            value.write_u32::<BigEndian>(entry_size as u32)?;
            for entry in &self.index_entries {
                if entry.slice_offsets.len() != self.slice_count as usize {
                    return Err(MxfError::InvalidIndex {
                        message: format!(
                            "index entry has {} slice offsets, segment has {} slices",
                            entry.slice_offsets.len(),
                            self.slice_count
                        ),
                    });
                }
                value.write_i8(entry.temporal_offset)?;
                value.write_i8(entry.key_frame_offset)?;
                value.write_u8(entry.flags)?;
                value.write_u64::<BigEndian>(entry.stream_offset)?;
                for offset in &entry.slice_offsets {
                    value.write_u32::<BigEndian>(*offset)?;
                }
                value.extend(std::iter::repeat(0).take(8 * self.pos_table_count as usize));
            }
            write_local_item(writer, 0x3F0A, &value)?;
        }

        Ok(self.size())
    }

    /// Write at the current file position, fill to the KAG of `partition`
    /// and record the index byte count
    pub fn write_to_file<W: Write + Seek>(
        &self,
        file: &mut MxfFile<W>,
        partition: usize,
    ) -> Result<()> {
        file.mark_index_start()?;
        let mut buffer = Vec::with_capacity(self.size() as usize);
        self.write(&mut buffer)?;
        file.write_all(&buffer)?;
        file.fill_to_kag(partition)?;
        file.mark_index_end(partition)
    }

    /// Parse the value of an index table segment KLV
    pub fn parse(value: &[u8]) -> Result<Self> {
        let mut segment = IndexTableSegment::default();
        let mut delta_array = None;
        let mut entry_array = None;

        for item in local_items(value) {
            let (tag, data) = item?;
            let mut cursor = Cursor::new(data);
            match tag {
                0x3C0A => {
                    segment.instance_uid = data.try_into().map_err(|_| invalid("instance UID"))?
                }
                0x3F0B => {
                    segment.index_edit_rate =
                        Rational::from_bytes(data).ok_or_else(|| invalid("edit rate"))?
                }
                0x3F0C => segment.index_start_position = cursor.read_i64::<BigEndian>()?,
                0x3F0D => segment.index_duration = cursor.read_i64::<BigEndian>()?,
                0x3F05 => segment.edit_unit_byte_count = cursor.read_u32::<BigEndian>()?,
                0x3F06 => segment.index_sid = cursor.read_u32::<BigEndian>()?,
                0x3F07 => segment.body_sid = cursor.read_u32::<BigEndian>()?,
                0x3F08 => segment.slice_count = cursor.read_u8()?,
                0x3F0E => segment.pos_table_count = cursor.read_u8()?,
                0x3F09 => delta_array = Some(data),
                0x3F0A => entry_array = Some(data),
                _ => {}
            }
        }

        if let Some(data) = delta_array {
            let mut cursor = Cursor::new(data);
            let (count, size) = read_array_header(&mut cursor)?;
            if size != 6 {
                return Err(invalid("delta entry size"));
            }
            for _ in 0..count {
                segment.delta_entries.push(DeltaEntry {
                    pos_table_index: cursor.read_i8()?,
                    slice: cursor.read_u8()?,
                    element_delta: cursor.read_u32::<BigEndian>()?,
                });
            }
        }

        if let Some(data) = entry_array {
            let mut cursor = Cursor::new(data);
            let (count, size) = read_array_header(&mut cursor)?;
            if size != segment.index_entry_size() {
                return Err(invalid("index entry size"));
            }
            for _ in 0..count {
                let temporal_offset = cursor.read_i8()?;
                let key_frame_offset = cursor.read_i8()?;
                let flags = cursor.read_u8()?;
                let stream_offset = cursor.read_u64::<BigEndian>()?;
                let mut slice_offsets = Vec::with_capacity(segment.slice_count as usize);
                for _ in 0..segment.slice_count {
                    slice_offsets.push(cursor.read_u32::<BigEndian>()?);
                }
                cursor.set_position(cursor.position() + 8 * segment.pos_table_count as u64);
                segment.index_entries.push(IndexEntry {
                    temporal_offset,
                    key_frame_offset,
                    flags,
                    stream_offset,
                    slice_offsets,
                });
            }
        }

        Ok(segment)
    }

    /// VBR segments covering every frame of `index`
    pub fn from_frame_offsets(
        index: &FrameOffsetIndex,
        edit_rate: Rational,
        index_sid: u32,
        body_sid: u32,
        ids: &mut IdGenerator,
    ) -> Vec<IndexTableSegment> {
        let duration = index.duration().max(0) as usize;
        let offsets = &index.offsets()[..duration.min(index.len())];

        offsets
            .chunks(MAX_VBR_ENTRIES_PER_SEGMENT)
            .enumerate()
            .map(|(i, chunk)| IndexTableSegment {
                instance_uid: ids.uuid(),
                index_edit_rate: edit_rate,
                index_start_position: (i * MAX_VBR_ENTRIES_PER_SEGMENT) as i64,
                index_duration: chunk.len() as i64,
                edit_unit_byte_count: 0,
                index_sid,
                body_sid,
                index_entries: chunk
                    .iter()
                    .map(|&offset| IndexEntry::intra(offset as u64))
                    .collect(),
                ..Default::default()
            })
            .collect()
    }
}

/// Rebuild a frame offset index from VBR segments.
///
/// Segments may come in any order but must cover a contiguous range from
/// position 0. `essence_length`, when known, closes the last frame and
/// completes the index.
pub fn frame_offsets_from_segments(
    segments: &[IndexTableSegment],
    essence_length: Option<i64>,
) -> Result<FrameOffsetIndex> {
    let mut ordered: Vec<&IndexTableSegment> = segments
        .iter()
        .filter(|s| !s.index_entries.is_empty())
        .collect();
    ordered.sort_by_key(|s| s.index_start_position);

    let mut index = FrameOffsetIndex::new();
    let mut next_position = 0;
    for segment in ordered {
        if segment.index_start_position != next_position {
            return Err(MxfError::InvalidIndex {
                message: format!(
                    "segment starts at {}, expected {}",
                    segment.index_start_position, next_position
                ),
            });
        }
        for entry in &segment.index_entries {
            index.append_offset(entry.stream_offset as i64)?;
        }
        next_position += segment.index_entries.len() as i64;
    }

    if let Some(length) = essence_length {
        index.append_offset(length)?;
        index.mark_complete();
    }
    Ok(index)
}

fn read_array_header(cursor: &mut Cursor<&[u8]>) -> Result<(u32, usize)> {
    let count = cursor.read_u32::<BigEndian>()?;
    let size = cursor.read_u32::<BigEndian>()? as usize;
    Ok((count, size))
}

fn invalid(what: &str) -> MxfError {
    MxfError::InvalidIndex {
        message: format!("invalid {}", what),
    }
}

//! MXF partition packs and the random index pack
//!
//! MXF files are divided into partitions:
//! - Header partition (required)
//! - Body partitions (optional)
//! - Footer partition (required for closed/complete files)

use crate::error::{MxfError, Result};
use crate::klv::{decode_ber_length, write_kl, LLEN};
use crate::ul::{labels, UniversalLabel, UL};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

/// Fixed part of a partition pack value
const PACK_FIXED_SIZE: u64 = 88;

/// Partition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionKind {
    Header,
    Body,
    Footer,
}

impl PartitionKind {
    fn key_byte(self) -> u8 {
        match self {
            PartitionKind::Header => 0x02,
            PartitionKind::Body => 0x03,
            PartitionKind::Footer => 0x04,
        }
    }
}

/// Partition status, byte 14 of the pack key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStatus {
    OpenIncomplete,
    ClosedIncomplete,
    OpenComplete,
    ClosedComplete,
}

impl PartitionStatus {
    fn key_byte(self) -> u8 {
        match self {
            PartitionStatus::OpenIncomplete => 0x01,
            PartitionStatus::ClosedIncomplete => 0x02,
            PartitionStatus::OpenComplete => 0x03,
            PartitionStatus::ClosedComplete => 0x04,
        }
    }

    fn from_key_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(PartitionStatus::OpenIncomplete),
            0x02 => Some(PartitionStatus::ClosedIncomplete),
            0x03 => Some(PartitionStatus::OpenComplete),
            0x04 => Some(PartitionStatus::ClosedComplete),
            _ => None,
        }
    }
}

/// MXF partition pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub kind: PartitionKind,
    pub status: PartitionStatus,
    pub major_version: u16,
    pub minor_version: u16,
    /// KAG size (key alignment grid)
    pub kag_size: u32,
    /// This partition offset in file
    pub this_partition: u64,
    pub previous_partition: u64,
    pub footer_partition: u64,
    /// Header metadata bytes following the partition pack, including fill
    pub header_byte_count: u64,
    pub index_byte_count: u64,
    pub index_sid: u32,
    pub body_offset: u64,
    pub body_sid: u32,
    pub operational_pattern: UL,
    pub essence_containers: Vec<UL>,
}

impl Default for Partition {
    fn default() -> Self {
        Partition {
            kind: PartitionKind::Header,
            status: PartitionStatus::ClosedComplete,
            major_version: 1,
            minor_version: 2,
            kag_size: 1,
            this_partition: 0,
            previous_partition: 0,
            footer_partition: 0,
            header_byte_count: 0,
            index_byte_count: 0,
            index_sid: 0,
            body_offset: 0,
            body_sid: 0,
            operational_pattern: labels::OP1A_MULTI_TRACK_STREAM_INTERNAL,
            essence_containers: Vec::new(),
        }
    }
}

impl Partition {
    pub fn header() -> Self {
        Partition {
            kind: PartitionKind::Header,
            ..Default::default()
        }
    }

    pub fn footer() -> Self {
        Partition {
            kind: PartitionKind::Footer,
            ..Default::default()
        }
    }

    /// Partition pack key for the kind and status
    pub fn pack_ul(&self) -> UL {
        let mut key = labels::PARTITION_PACK_BASE;
        key[13] = self.kind.key_byte();
        key[14] = self.status.key_byte();
        key
    }

    /// Parse a partition pack KLV
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 17 {
            return Err(MxfError::InsufficientData {
                needed: 17,
                available: data.len(),
            });
        }

        let mut key = [0u8; 16];
        key.copy_from_slice(&data[..16]);
        if !UniversalLabel(key).is_partition_pack() {
            return Err(MxfError::InvalidPartition {
                message: format!("not a partition pack: {:?}", UniversalLabel(key)),
            });
        }

        let kind = match key[13] {
            0x02 => PartitionKind::Header,
            0x03 => PartitionKind::Body,
            _ => PartitionKind::Footer,
        };
        let status = PartitionStatus::from_key_byte(key[14]).ok_or_else(|| {
            MxfError::InvalidPartition {
                message: format!("unknown partition status {:02x}", key[14]),
            }
        })?;

        let (length, llen) = decode_ber_length(&data[16..])?;
        let start = 16 + llen;
        if data.len() < start + length || (length as u64) < PACK_FIXED_SIZE {
            return Err(MxfError::InsufficientData {
                needed: length.max(PACK_FIXED_SIZE as usize),
                available: data.len().saturating_sub(start),
            });
        }
        let mut cursor = Cursor::new(&data[start..start + length]);

        let major_version = cursor.read_u16::<BigEndian>()?;
        let minor_version = cursor.read_u16::<BigEndian>()?;
        let kag_size = cursor.read_u32::<BigEndian>()?;
        let this_partition = cursor.read_u64::<BigEndian>()?;
        let previous_partition = cursor.read_u64::<BigEndian>()?;
        let footer_partition = cursor.read_u64::<BigEndian>()?;
        let header_byte_count = cursor.read_u64::<BigEndian>()?;
        let index_byte_count = cursor.read_u64::<BigEndian>()?;
        let index_sid = cursor.read_u32::<BigEndian>()?;
        let body_offset = cursor.read_u64::<BigEndian>()?;
        let body_sid = cursor.read_u32::<BigEndian>()?;

        let mut operational_pattern = [0u8; 16];
        cursor.read_exact(&mut operational_pattern)?;

        let batch_count = cursor.read_u32::<BigEndian>()?;
        let item_size = cursor.read_u32::<BigEndian>()?;
        if batch_count > 0 && item_size != 16 {
            return Err(MxfError::InvalidPartition {
                message: format!("essence container batch item size {}", item_size),
            });
        }

        let mut essence_containers = Vec::with_capacity(batch_count as usize);
        for _ in 0..batch_count {
            let mut ul = [0u8; 16];
            cursor.read_exact(&mut ul)?;
            essence_containers.push(ul);
        }

        Ok(Partition {
            kind,
            status,
            major_version,
            minor_version,
            kag_size,
            this_partition,
            previous_partition,
            footer_partition,
            header_byte_count,
            index_byte_count,
            index_sid,
            body_offset,
            body_sid,
            operational_pattern,
            essence_containers,
        })
    }

    fn value_size(&self) -> u64 {
        PACK_FIXED_SIZE + 16 * self.essence_containers.len() as u64
    }

    /// Write the partition pack KLV
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let value_size = self.value_size();
        let kl_size = write_kl(writer, &self.pack_ul(), value_size, LLEN)?;

        writer.write_u16::<BigEndian>(self.major_version)?;
        writer.write_u16::<BigEndian>(self.minor_version)?;
        writer.write_u32::<BigEndian>(self.kag_size)?;
        writer.write_u64::<BigEndian>(self.this_partition)?;
        writer.write_u64::<BigEndian>(self.previous_partition)?;
        writer.write_u64::<BigEndian>(self.footer_partition)?;
        writer.write_u64::<BigEndian>(self.header_byte_count)?;
        writer.write_u64::<BigEndian>(self.index_byte_count)?;
        writer.write_u32::<BigEndian>(self.index_sid)?;
        writer.write_u64::<BigEndian>(self.body_offset)?;
        writer.write_u32::<BigEndian>(self.body_sid)?;
        writer.write_all(&self.operational_pattern)?;

        writer.write_u32::<BigEndian>(self.essence_containers.len() as u32)?;
        writer.write_u32::<BigEndian>(16)?;
        for ec in &self.essence_containers {
            writer.write_all(ec)?;
        }

        Ok(kl_size + value_size as usize)
    }

    /// Total size of the pack KLV
    pub fn size(&self) -> u64 {
        16 + LLEN as u64 + self.value_size()
    }

    pub fn add_essence_container(&mut self, ul: UL) {
        if !self.essence_containers.contains(&ul) {
            self.essence_containers.push(ul);
        }
    }
}

/// Random Index Pack entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RipEntry {
    /// Body SID of the partition (0 when it holds no essence)
    pub body_sid: u32,
    pub byte_offset: u64,
}

/// Random Index Pack, written as the last KLV of the file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RandomIndexPack {
    pub entries: Vec<RipEntry>,
}

impl RandomIndexPack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, body_sid: u32, byte_offset: u64) {
        self.entries.push(RipEntry {
            body_sid,
            byte_offset,
        });
    }

    /// Parse a RIP from the end of `data`, using the trailing overall length
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(MxfError::InsufficientData {
                needed: 4,
                available: data.len(),
            });
        }

        let tail = &data[data.len() - 4..];
        let overall = u32::from_be_bytes([tail[0], tail[1], tail[2], tail[3]]) as usize;
        if overall < 20 || overall > data.len() {
            return Err(MxfError::InsufficientData {
                needed: overall.max(20),
                available: data.len(),
            });
        }

        let pack = &data[data.len() - overall..];
        if pack[..16] != labels::RANDOM_INDEX_PACK {
            return Err(MxfError::InvalidKlv {
                message: "not a random index pack".into(),
                offset: (data.len() - overall) as u64,
            });
        }

        let (length, llen) = decode_ber_length(&pack[16..])?;
        if 16 + llen + length != overall || length < 4 || (length - 4) % 12 != 0 {
            return Err(MxfError::InvalidKlv {
                message: format!("random index pack length {}", length),
                offset: (data.len() - overall) as u64,
            });
        }

        let mut cursor = Cursor::new(&pack[16 + llen..]);
        let mut entries = Vec::with_capacity((length - 4) / 12);
        for _ in 0..(length - 4) / 12 {
            let body_sid = cursor.read_u32::<BigEndian>()?;
            let byte_offset = cursor.read_u64::<BigEndian>()?;
            entries.push(RipEntry {
                body_sid,
                byte_offset,
            });
        }

        Ok(RandomIndexPack { entries })
    }

    /// Write the RIP, returning the bytes written
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<usize> {
        let value_size = self.entries.len() as u64 * 12 + 4;
        let kl_size = write_kl(writer, &labels::RANDOM_INDEX_PACK, value_size, LLEN)?;

        for entry in &self.entries {
            writer.write_u32::<BigEndian>(entry.body_sid)?;
            writer.write_u64::<BigEndian>(entry.byte_offset)?;
        }

        let overall_length = kl_size as u64 + value_size;
        writer.write_u32::<BigEndian>(overall_length as u32)?;
        Ok(overall_length as usize)
    }
}

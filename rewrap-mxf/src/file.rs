//! Write-side MXF file handle.
//!
//! `MxfFile` wraps a seekable writer and tracks the partitions written so
//! far, so that their packs can be rewritten in place once the footer
//! position and byte counts are known.

use crate::error::{MxfError, Result};
use crate::klv::{encode_ber_length_fixed, write_kl, LLEN};
use crate::partition::{Partition, PartitionKind, RandomIndexPack};
use crate::ul::{labels, UL};
use std::io::{Seek, SeekFrom, Write};
use tracing::debug;

/// Smallest KLV fill: key plus length field
const MIN_FILL_SIZE: u64 = 16 + LLEN as u64;

const ZEROS: [u8; 4096] = [0; 4096];

/// MXF output file with partition bookkeeping
pub struct MxfFile<W: Write + Seek> {
    writer: W,
    partitions: Vec<Partition>,
    header_mark: Option<u64>,
    index_mark: Option<u64>,
}

impl<W: Write + Seek> MxfFile<W> {
    pub fn new(writer: W) -> Self {
        MxfFile {
            writer,
            partitions: Vec::new(),
            header_mark: None,
            index_mark: None,
        }
    }

    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.writer.stream_position()?)
    }

    pub fn seek(&mut self, position: u64) -> Result<()> {
        self.writer.seek(SeekFrom::Start(position))?;
        Ok(())
    }

    pub fn seek_to_end(&mut self) -> Result<u64> {
        Ok(self.writer.seek(SeekFrom::End(0))?)
    }

    /// Total file size; the current position is preserved
    pub fn size(&mut self) -> Result<u64> {
        let position = self.tell()?;
        let size = self.seek_to_end()?;
        self.seek(position)?;
        Ok(size)
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    pub fn write_zeros(&mut self, mut count: u64) -> Result<()> {
        while count > 0 {
            let n = count.min(ZEROS.len() as u64) as usize;
            self.writer.write_all(&ZEROS[..n])?;
            count -= n as u64;
        }
        Ok(())
    }

    /// Write a key and a 4-byte length
    pub fn write_kl(&mut self, key: &UL, length: u64) -> Result<usize> {
        write_kl(&mut self.writer, key, length, LLEN)
    }

    /// Write a fill KLV occupying exactly `size` bytes
    pub fn write_fill(&mut self, size: u64) -> Result<()> {
        if size < MIN_FILL_SIZE {
            let position = self.tell()?;
            return Err(MxfError::InvalidFill {
                position,
                target: position + size,
            });
        }
        self.write_fill_value(size - MIN_FILL_SIZE)
    }

    fn write_fill_value(&mut self, value_size: u64) -> Result<()> {
        self.writer.write_all(&labels::FILL_ITEM)?;
        self.writer
            .write_all(&encode_ber_length_fixed(value_size, LLEN)?)?;
        self.write_zeros(value_size)
    }

    /// Fill up to `position`. Nothing is written if already there.
    pub fn fill_to_position(&mut self, position: u64) -> Result<()> {
        let current = self.tell()?;
        if current == position {
            return Ok(());
        }
        if current + MIN_FILL_SIZE > position {
            return Err(MxfError::InvalidFill {
                position: current,
                target: position,
            });
        }
        self.write_fill_value(position - current - MIN_FILL_SIZE)
    }

    /// Fill to the next KAG boundary of partition `index`
    pub fn fill_to_kag(&mut self, index: usize) -> Result<()> {
        self.allocate_space_to_kag(index, 0)
    }

    /// Write a fill of at least `size` bytes that ends on a KAG boundary of
    /// partition `index`. With `size` zero, fill only if not on a boundary.
    pub fn allocate_space_to_kag(&mut self, index: usize, size: u32) -> Result<()> {
        let (kag, this_partition) = {
            let partition = self.partition(index)?;
            (partition.kag_size.max(1) as i64, partition.this_partition)
        };
        if size == 0 && kag == 1 {
            return Ok(());
        }

        let position = self.tell()?;
        if position <= this_partition {
            return Err(MxfError::InvalidFill {
                position,
                target: this_partition,
            });
        }

        let relative = (position + size as u64 - this_partition) as i64;
        if size == 0 && relative % kag == 0 {
            return Ok(());
        }

        let mut fill = size as i64 - 16;
        if kag > 1 {
            fill += kag - relative % kag;
        }
        while fill < LLEN as i64 {
            fill += kag;
        }
        self.write_fill_value((fill - LLEN as i64) as u64)
    }

    /// Write a partition pack at the current position, recording it in the
    /// partition list. Returns the partition index.
    pub fn write_partition(&mut self, mut partition: Partition) -> Result<usize> {
        partition.this_partition = self.tell()?;
        if partition.kind == PartitionKind::Footer {
            partition.footer_partition = partition.this_partition;
        }
        if let Some(previous) = self.partitions.last() {
            partition.previous_partition = previous.this_partition;
        }

        partition.write(&mut self.writer)?;
        debug!(
            "Wrote {:?} partition at {}",
            partition.kind, partition.this_partition
        );

        self.partitions.push(partition);
        let index = self.partitions.len() - 1;
        self.fill_to_kag(index)?;
        Ok(index)
    }

    /// A new partition inheriting version, KAG, operational pattern and
    /// essence containers from the last partition written
    pub fn create_partition(&self, kind: PartitionKind) -> Partition {
        let mut partition = Partition {
            kind,
            ..Default::default()
        };
        if let Some(previous) = self.partitions.last() {
            partition.major_version = previous.major_version;
            partition.minor_version = previous.minor_version;
            partition.kag_size = previous.kag_size;
            partition.operational_pattern = previous.operational_pattern;
            partition.essence_containers = previous.essence_containers.clone();
        }
        partition
    }

    pub fn partition(&self, index: usize) -> Result<&Partition> {
        self.partitions
            .get(index)
            .ok_or_else(|| MxfError::InvalidPartition {
                message: format!("no partition at index {}", index),
            })
    }

    pub fn partition_mut(&mut self, index: usize) -> Result<&mut Partition> {
        self.partitions
            .get_mut(index)
            .ok_or_else(|| MxfError::InvalidPartition {
                message: format!("no partition at index {}", index),
            })
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    pub fn mark_header_start(&mut self) -> Result<()> {
        self.header_mark = Some(self.tell()?);
        Ok(())
    }

    /// Set the header byte count of partition `index` from the last mark
    pub fn mark_header_end(&mut self, index: usize) -> Result<()> {
        let start = self
            .header_mark
            .take()
            .ok_or_else(|| MxfError::precondition("header end marked without a start"))?;
        let end = self.tell()?;
        self.partition_mut(index)?.header_byte_count = end - start;
        Ok(())
    }

    pub fn mark_index_start(&mut self) -> Result<()> {
        self.index_mark = Some(self.tell()?);
        Ok(())
    }

    /// Set the index byte count of partition `index` from the last mark
    pub fn mark_index_end(&mut self, index: usize) -> Result<()> {
        let start = self
            .index_mark
            .take()
            .ok_or_else(|| MxfError::precondition("index end marked without a start"))?;
        let end = self.tell()?;
        self.partition_mut(index)?.index_byte_count = end - start;
        Ok(())
    }

    /// Link the partitions to their predecessors and the footer, rewrite
    /// every pack in place and leave the file positioned at the end.
    pub fn update_partitions(&mut self) -> Result<()> {
        let footer = self
            .partitions
            .last()
            .filter(|p| p.kind == PartitionKind::Footer)
            .map(|p| p.this_partition);

        let mut previous = None;
        for partition in &mut self.partitions {
            if let Some(offset) = previous {
                partition.previous_partition = offset;
            }
            if let Some(footer) = footer {
                partition.footer_partition = footer;
            }
            previous = Some(partition.this_partition);
        }

        for partition in &self.partitions {
            self.writer.seek(SeekFrom::Start(partition.this_partition))?;
            partition.write(&mut self.writer)?;
        }

        self.seek_to_end()?;
        Ok(())
    }

    /// Write a random index pack listing every partition
    pub fn write_rip(&mut self) -> Result<usize> {
        let mut rip = RandomIndexPack::new();
        for partition in &self.partitions {
            rip.add_entry(partition.body_sid, partition.this_partition);
        }
        rip.write(&mut self.writer)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

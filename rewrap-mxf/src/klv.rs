//! KLV (Key-Length-Value) triplet handling
//!
//! All data in MXF files is encoded as KLV triplets:
//! - Key: 16-byte Universal Label identifying the data
//! - Length: BER-encoded length of the value
//! - Value: The actual data
//!
//! The writer uses a fixed 4-byte long form length ([`LLEN`]) everywhere
//! so that KLV sizes do not depend on their content.

use crate::error::{MxfError, Result};
use crate::ul::{UniversalLabel, UL};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Write};

/// Length field size used for every KLV the writer emits.
pub const LLEN: u8 = 4;

/// A KLV triplet read from a buffer
#[derive(Debug, Clone)]
pub struct Klv<'a> {
    pub key: UniversalLabel,
    pub value: &'a [u8],
    /// Offset of the key in the source buffer
    pub offset: u64,
    /// Size of the encoded length field
    pub llen: usize,
}

impl Klv<'_> {
    /// Total size including key and length encoding
    pub fn total_size(&self) -> usize {
        16 + self.llen + self.value.len()
    }
}

/// KLV reader over an in-memory buffer
pub struct KlvReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> KlvReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        KlvReader { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Check if there's another key to read
    pub fn has_more(&self) -> bool {
        self.position + 16 <= self.data.len()
    }

    /// Read next KLV, borrowing its value
    pub fn read_klv(&mut self) -> Result<Option<Klv<'a>>> {
        if !self.has_more() {
            return Ok(None);
        }

        let offset = self.position as u64;
        let mut key = [0u8; 16];
        key.copy_from_slice(&self.data[self.position..self.position + 16]);

        let (length, llen) = decode_ber_length(&self.data[self.position + 16..])?;
        let start = self.position + 16 + llen;
        if start + length > self.data.len() {
            return Err(MxfError::InsufficientData {
                needed: length,
                available: self.data.len() - start,
            });
        }

        self.position = start + length;
        Ok(Some(Klv {
            key: UniversalLabel(key),
            value: &self.data[start..start + length],
            offset,
            llen,
        }))
    }

    /// Read KLVs until one that is not a fill item
    pub fn read_non_fill(&mut self) -> Result<Option<Klv<'a>>> {
        while let Some(klv) = self.read_klv()? {
            if !klv.key.is_fill_item() {
                return Ok(Some(klv));
            }
        }
        Ok(None)
    }

    /// Peek at next key without consuming it
    pub fn peek_key(&self) -> Option<UniversalLabel> {
        if !self.has_more() {
            return None;
        }
        let mut key = [0u8; 16];
        key.copy_from_slice(&self.data[self.position..self.position + 16]);
        Some(UniversalLabel(key))
    }
}

/// Calculate BER length encoding size
pub fn ber_length_size(length: u64) -> usize {
    if length < 0x80 {
        1
    } else {
        let bytes = 8 - (length.leading_zeros() / 8) as usize;
        1 + bytes
    }
}

/// Encode length as the shortest BER form
pub fn encode_ber_length(length: u64) -> Vec<u8> {
    if length < 0x80 {
        return vec![length as u8];
    }
    let bytes = ber_length_size(length) - 1;
    let mut encoded = Vec::with_capacity(1 + bytes);
    encoded.push(0x80 | bytes as u8);
    encoded.extend_from_slice(&length.to_be_bytes()[8 - bytes..]);
    encoded
}

/// Encode length in the long form with exactly `llen` bytes (including
/// the leading 0x8n byte)
pub fn encode_ber_length_fixed(length: u64, llen: u8) -> Result<Vec<u8>> {
    if !(2..=9).contains(&llen) {
        return Err(MxfError::ber(format!("unsupported length field size {}", llen)));
    }
    let bytes = (llen - 1) as usize;
    if bytes < 8 && length >> (8 * bytes) != 0 {
        return Err(MxfError::ber(format!(
            "length {} does not fit in {} bytes",
            length, bytes
        )));
    }

    let mut encoded = Vec::with_capacity(llen as usize);
    encoded.push(0x80 | bytes as u8);
    encoded.extend_from_slice(&length.to_be_bytes()[8 - bytes..]);
    Ok(encoded)
}

/// Decode BER length from bytes, returning the length and the field size
pub fn decode_ber_length(data: &[u8]) -> Result<(usize, usize)> {
    let first_byte = *data.first().ok_or_else(|| MxfError::ber("no data for length"))?;

    if first_byte < 0x80 {
        Ok((first_byte as usize, 1))
    } else if first_byte == 0x80 {
        Err(MxfError::ber("indefinite length not supported"))
    } else {
        let num_bytes = (first_byte & 0x7F) as usize;
        if num_bytes > 8 {
            return Err(MxfError::ber(format!("{} byte length field", num_bytes)));
        }
        if data.len() < 1 + num_bytes {
            return Err(MxfError::ber("not enough bytes for length"));
        }

        let length = data[1..=num_bytes]
            .iter()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64);
        let length = usize::try_from(length).map_err(|_| MxfError::ber("length too large"))?;
        Ok((length, 1 + num_bytes))
    }
}

/// Write a key and a fixed-size length field
pub fn write_kl<W: Write>(writer: &mut W, key: &UL, length: u64, llen: u8) -> Result<usize> {
    writer.write_all(key)?;
    let len_bytes = encode_ber_length_fixed(length, llen)?;
    writer.write_all(&len_bytes)?;
    Ok(16 + len_bytes.len())
}

/// Write a local set item (2-byte tag, 2-byte length)
pub fn write_local_item<W: Write>(writer: &mut W, tag: u16, value: &[u8]) -> Result<usize> {
    let length = u16::try_from(value.len()).map_err(|_| MxfError::PropertyTooLarge {
        tag,
        size: value.len(),
    })?;
    writer.write_u16::<BigEndian>(tag)?;
    writer.write_u16::<BigEndian>(length)?;
    writer.write_all(value)?;
    Ok(4 + value.len())
}

/// Read the local set item at `offset`, returning tag, value and item size
pub fn read_local_item(data: &[u8], offset: usize) -> Result<(u16, &[u8], usize)> {
    if offset + 4 > data.len() {
        return Err(MxfError::InsufficientData {
            needed: 4,
            available: data.len().saturating_sub(offset),
        });
    }

    let mut cursor = Cursor::new(&data[offset..]);
    let tag = cursor.read_u16::<BigEndian>()?;
    let length = cursor.read_u16::<BigEndian>()? as usize;

    if offset + 4 + length > data.len() {
        return Err(MxfError::InsufficientData {
            needed: length,
            available: data.len() - offset - 4,
        });
    }

    Ok((tag, &data[offset + 4..offset + 4 + length], 4 + length))
}

/// Iterate over the items of a local set value
pub fn local_items(data: &[u8]) -> impl Iterator<Item = Result<(u16, &[u8])>> + '_ {
    let mut offset = 0;
    std::iter::from_fn(move || {
        if offset >= data.len() {
            return None;
        }
        match read_local_item(data, offset) {
            Ok((tag, value, size)) => {
                offset += size;
                Some(Ok((tag, value)))
            }
            Err(e) => {
                offset = data.len();
                Some(Err(e))
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ul::labels;

    #[test]
    fn test_ber_length_short() {
        let encoded = encode_ber_length(100);
        assert_eq!(encoded, vec![100]);

        let (decoded, size) = decode_ber_length(&encoded).unwrap();
        assert_eq!(decoded, 100);
        assert_eq!(size, 1);
    }

    #[test]
    fn test_ber_length_long() {
        let encoded = encode_ber_length(1000);
        assert_eq!(encoded, vec![0x82, 0x03, 0xE8]);
        assert_eq!(ber_length_size(1000), 3);
        assert_eq!(ber_length_size(0x1234567), 5);
    }

    #[test]
    fn test_ber_length_fixed() {
        assert_eq!(encode_ber_length_fixed(57, 4).unwrap(), vec![0x83, 0x00, 0x00, 0x39]);
        assert_eq!(
            encode_ber_length_fixed(0x12345678, 9).unwrap(),
            vec![0x88, 0, 0, 0, 0, 0x12, 0x34, 0x56, 0x78]
        );
        assert!(encode_ber_length_fixed(0x0100_0000, 4).is_err());
        assert!(encode_ber_length_fixed(1, 1).is_err());

        let (decoded, size) = decode_ber_length(&[0x83, 0x01, 0x00, 0x00]).unwrap();
        assert_eq!(decoded, 0x10000);
        assert_eq!(size, 4);
    }

    #[test]
    fn test_indefinite_length_rejected() {
        assert!(decode_ber_length(&[0x80]).is_err());
        assert!(decode_ber_length(&[]).is_err());
    }

    #[test]
    fn test_kl_and_reader() {
        let mut buffer = Vec::new();
        write_kl(&mut buffer, &labels::FILL_ITEM, 2, LLEN).unwrap();
        buffer.extend_from_slice(&[0, 0]);
        write_kl(&mut buffer, &labels::PRIMER_PACK, 3, LLEN).unwrap();
        buffer.extend_from_slice(&[0xAA, 0xBB, 0xCC]);

        let mut reader = KlvReader::new(&buffer);
        let klv = reader.read_non_fill().unwrap().unwrap();
        assert_eq!(klv.key.as_bytes(), &labels::PRIMER_PACK);
        assert_eq!(klv.value, &[0xAA, 0xBB, 0xCC]);
        assert_eq!(klv.offset, 22);
        assert_eq!(klv.total_size(), 23);
        assert!(reader.read_klv().unwrap().is_none());
    }

    #[test]
    fn test_reader_truncated_value() {
        let mut buffer = Vec::new();
        write_kl(&mut buffer, &labels::PRIMER_PACK, 10, LLEN).unwrap();
        buffer.extend_from_slice(&[1, 2]);
        let mut reader = KlvReader::new(&buffer);
        assert!(matches!(
            reader.read_klv(),
            Err(MxfError::InsufficientData { needed: 10, available: 2 })
        ));
    }

    #[test]
    fn test_local_items() {
        let mut buffer = Vec::new();
        write_local_item(&mut buffer, 0x3C0A, &[1; 16]).unwrap();
        write_local_item(&mut buffer, 0x3F06, &[0, 0, 0, 1]).unwrap();

        let items: Vec<(u16, &[u8])> = local_items(&buffer).collect::<Result<_>>().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1], (0x3F06, &[0u8, 0, 0, 1][..]));
    }

    #[test]
    fn test_local_item_too_large() {
        let mut buffer = Vec::new();
        let value = vec![0u8; 0x10000];
        assert!(matches!(
            write_local_item(&mut buffer, 0x3F0A, &value),
            Err(MxfError::PropertyTooLarge { tag: 0x3F0A, .. })
        ));
    }
}

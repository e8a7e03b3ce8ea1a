//! D-10 system item: the system metadata pack and an empty package
//! metadata set at the start of every content package.

use crate::error::Result;
use crate::klv::{write_kl, LLEN};
use crate::layout::{D10SampleRate, SYSTEM_ITEM_SIZE, SYSTEM_METADATA_PACK_SIZE};
use crate::timecode::Timecode;
use crate::ul::{labels, UL};
use byteorder::{BigEndian, WriteBytesExt};
use std::io::Write;

/// Creation date/time stamp present, user date/time stamp present,
/// SMPTE label present
const SYSTEM_METADATA_BITMAP: u8 = 0x5C;

/// Date/time stamp type byte for an SMPTE 12M timecode
const TIMECODE_STAMP_TYPE: u8 = 0x81;

const STAMP_SIZE: usize = 17;

fn content_package_rate(sample_rate: D10SampleRate) -> u8 {
    match sample_rate {
        D10SampleRate::Rate625_50i => 0x04,
        D10SampleRate::Rate525_60i => 0x07,
    }
}

/// Write the system item for content package number `position`.
///
/// The continuity count wraps at 65536. Returns the number of bytes
/// written, always [`SYSTEM_ITEM_SIZE`].
pub fn write_system_item<W: Write>(
    writer: &mut W,
    sample_rate: D10SampleRate,
    position: i64,
    essence_container: &UL,
    user_timecode: &Timecode,
) -> Result<u32> {
    write_kl(
        writer,
        &labels::SYSTEM_METADATA_PACK,
        SYSTEM_METADATA_PACK_SIZE as u64,
        LLEN,
    )?;

    writer.write_u8(SYSTEM_METADATA_BITMAP)?;
    writer.write_u8(content_package_rate(sample_rate))?;
    // content package type
    writer.write_u8(0x00)?;
    // channel handle
    writer.write_u16::<BigEndian>(0)?;
    writer.write_u16::<BigEndian>(position.rem_euclid(65536) as u16)?;
    writer.write_all(essence_container)?;

    // creation date/time stamp
    writer.write_all(&[0u8; STAMP_SIZE])?;

    let mut user_stamp = [0u8; STAMP_SIZE];
    user_stamp[0] = TIMECODE_STAMP_TYPE;
    user_stamp[1..5].copy_from_slice(&user_timecode.to_smpte_12m());
    writer.write_all(&user_stamp)?;

    write_kl(writer, &labels::PACKAGE_METADATA_SET, 0, LLEN)?;

    Ok(SYSTEM_ITEM_SIZE)
}

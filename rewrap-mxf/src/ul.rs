//! Universal Label (UL) types and the label catalogue used by the writer.
//!
//! Universal Labels are 16-byte identifiers defined by SMPTE for
//! identifying every key, container and coding in an MXF file.

use std::fmt;

/// A 16-byte Universal Label
pub type UL = [u8; 16];

/// Universal Label wrapper with helper methods
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniversalLabel(pub UL);

impl UniversalLabel {
    pub fn new(bytes: UL) -> Self {
        UniversalLabel(bytes)
    }

    pub fn as_bytes(&self) -> &UL {
        &self.0
    }

    /// Check if this is a SMPTE-registered label (starts with 06 0E 2B 34)
    pub fn is_smpte(&self) -> bool {
        self.0[0..4] == labels::SMPTE_PREFIX
    }

    /// Check if this is a partition pack key (header, body or footer)
    pub fn is_partition_pack(&self) -> bool {
        self.0[0..13] == labels::PARTITION_PACK_BASE[0..13] && (0x02..=0x04).contains(&self.0[13])
    }

    /// Check if this is a fill item key, ignoring the version byte
    pub fn is_fill_item(&self) -> bool {
        self.0[0..7] == labels::FILL_ITEM[0..7] && self.0[8..] == labels::FILL_ITEM[8..]
    }

    /// Check if this is an essence element key in a generic container
    pub fn is_gc_element(&self) -> bool {
        self.0[0..12] == labels::GC_ELEMENT_BASE[0..12]
    }

    /// Check if this is a local set key
    pub fn is_local_set(&self) -> bool {
        self.is_smpte() && self.0[4] == 0x02 && self.0[5] == 0x53
    }
}

impl fmt::Debug for UniversalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UL(")?;
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for UniversalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", labels::lookup_name(&self.0))
    }
}

impl From<UL> for UniversalLabel {
    fn from(bytes: UL) -> Self {
        UniversalLabel(bytes)
    }
}

/// Well-known Universal Labels
pub mod labels {
    use super::UL;

    /// SMPTE Label prefix
    pub const SMPTE_PREFIX: [u8; 4] = [0x06, 0x0E, 0x2B, 0x34];

    const fn pack(b13: u8, b14: u8) -> UL {
        [
            0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, b13, b14,
            0x00,
        ]
    }

    const fn set(b14: u8) -> UL {
        [
            0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x01, 0x01, 0x01, 0x01, b14,
            0x00,
        ]
    }

    /// Partition pack base (bytes 13 and 14 vary)
    pub const PARTITION_PACK_BASE: UL = pack(0x00, 0x00);
    pub const HEADER_PARTITION_OPEN_INCOMPLETE: UL = pack(0x02, 0x01);
    pub const HEADER_PARTITION_CLOSED_COMPLETE: UL = pack(0x02, 0x04);
    pub const BODY_PARTITION_CLOSED_COMPLETE: UL = pack(0x03, 0x04);
    pub const FOOTER_PARTITION_CLOSED_COMPLETE: UL = pack(0x04, 0x04);
    pub const PRIMER_PACK: UL = pack(0x05, 0x01);
    pub const RANDOM_INDEX_PACK: UL = pack(0x11, 0x01);

    /// KLV fill item (version 1 registry form)
    pub const FILL_ITEM: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, 0x01, 0x03, 0x01, 0x02, 0x10, 0x01, 0x00, 0x00,
        0x00,
    ];

    /// Index table segment
    pub const INDEX_TABLE_SEGMENT: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x53, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x10, 0x01,
        0x00,
    ];

    // Metadata sets

    pub const PREFACE: UL = set(0x2F);
    pub const IDENTIFICATION: UL = set(0x30);
    pub const CONTENT_STORAGE: UL = set(0x18);
    pub const ESSENCE_CONTAINER_DATA: UL = set(0x23);
    pub const MATERIAL_PACKAGE: UL = set(0x36);
    pub const SOURCE_PACKAGE: UL = set(0x37);
    pub const TRACK: UL = set(0x3B);
    pub const SEQUENCE: UL = set(0x0F);
    pub const SOURCE_CLIP: UL = set(0x11);
    pub const TIMECODE_COMPONENT: UL = set(0x14);
    pub const MULTIPLE_DESCRIPTOR: UL = set(0x44);
    pub const CDCI_DESCRIPTOR: UL = set(0x28);
    pub const GENERIC_SOUND_DESCRIPTOR: UL = set(0x42);

    // Content package items

    /// Generic container essence element base (bytes 12..16 vary)
    pub const GC_ELEMENT_BASE: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x00, 0x00, 0x00,
        0x00,
    ];

    /// SMPTE 331M system metadata pack
    pub const SYSTEM_METADATA_PACK: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x05, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x04, 0x01, 0x01,
        0x00,
    ];

    /// SMPTE 331M package metadata set
    pub const PACKAGE_METADATA_SET: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x02, 0x43, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x04, 0x01, 0x02,
        0x00,
    ];

    /// D-10 MPEG picture element
    pub const D10_PICTURE_ELEMENT: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x05, 0x01, 0x01,
        0x00,
    ];

    /// D-10 AES-3 sound element (8 channels)
    pub const D10_AES3_ELEMENT: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x02, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x06, 0x01, 0x10,
        0x00,
    ];

    // Operational pattern and data definitions

    /// OP-1A, multi-track, stream file, internal essence
    pub const OP1A_MULTI_TRACK_STREAM_INTERNAL: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0D, 0x01, 0x02, 0x01, 0x01, 0x01, 0x09,
        0x00,
    ];

    pub const PICTURE_DATA_DEF: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x01, 0x03, 0x02, 0x02, 0x01, 0x00, 0x00,
        0x00,
    ];

    pub const SOUND_DATA_DEF: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x01, 0x03, 0x02, 0x02, 0x02, 0x00, 0x00,
        0x00,
    ];

    pub const TIMECODE_DATA_DEF: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x01, 0x03, 0x02, 0x01, 0x01, 0x00, 0x00,
        0x00,
    ];

    /// ITU-R BT.470 transfer characteristic
    pub const GAMMA_BT470: UL = [
        0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x04, 0x01, 0x01, 0x01, 0x01, 0x01, 0x00,
        0x00,
    ];

    /// D-10 essence container, byte 14 selects bit rate and line count
    pub const fn d10_essence_container(variant: u8) -> UL {
        [
            0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x0D, 0x01, 0x03, 0x01, 0x02, 0x01,
            variant, 0x01,
        ]
    }

    /// D-10 picture essence coding, byte 15 selects bit rate and line count
    pub const fn d10_picture_coding(variant: u8) -> UL {
        [
            0x06, 0x0E, 0x2B, 0x34, 0x04, 0x01, 0x01, 0x01, 0x04, 0x01, 0x02, 0x02, 0x01, 0x02,
            0x01, variant,
        ]
    }

    /// Lookup human-readable name for a UL
    pub fn lookup_name(ul: &UL) -> &'static str {
        const NAMED: &[(UL, &str)] = &[
            (PRIMER_PACK, "Primer Pack"),
            (RANDOM_INDEX_PACK, "Random Index Pack"),
            (INDEX_TABLE_SEGMENT, "Index Table Segment"),
            (SYSTEM_METADATA_PACK, "System Metadata Pack"),
            (PACKAGE_METADATA_SET, "Package Metadata Set"),
            (D10_PICTURE_ELEMENT, "D-10 Picture Element"),
            (D10_AES3_ELEMENT, "D-10 AES-3 Element"),
            (PREFACE, "Preface"),
            (IDENTIFICATION, "Identification"),
            (CONTENT_STORAGE, "Content Storage"),
            (ESSENCE_CONTAINER_DATA, "Essence Container Data"),
            (MATERIAL_PACKAGE, "Material Package"),
            (SOURCE_PACKAGE, "Source Package"),
            (TRACK, "Track"),
            (SEQUENCE, "Sequence"),
            (SOURCE_CLIP, "Source Clip"),
            (TIMECODE_COMPONENT, "Timecode Component"),
            (MULTIPLE_DESCRIPTOR, "Multiple Descriptor"),
            (CDCI_DESCRIPTOR, "CDCI Descriptor"),
            (GENERIC_SOUND_DESCRIPTOR, "Generic Sound Descriptor"),
        ];

        if let Some((_, name)) = NAMED.iter().find(|(key, _)| key == ul) {
            return name;
        }

        let label = super::UniversalLabel(*ul);
        if label.is_partition_pack() {
            return match ul[13..15] {
                [0x02, 0x01] => "Header Partition (Open Incomplete)",
                [0x02, 0x04] => "Header Partition (Closed Complete)",
                [0x03, _] => "Body Partition",
                [0x04, _] => "Footer Partition",
                _ => "Header Partition",
            };
        }
        if label.is_fill_item() {
            return "Fill Item";
        }
        if label.is_gc_element() {
            return "Essence Element";
        }
        if label.is_local_set() {
            return "Metadata Set";
        }
        "Unknown"
    }
}

//! Header metadata sets, the primer pack and duration back-patching.
//!
//! Sets are local sets keyed by 2-byte tags. Every tag the writer uses is
//! statically mapped to its property label, and the primer pack written in
//! front of the sets lists exactly the tags that occur.
//!
//! All item values have a fixed size for a given configuration, so the
//! header can be rewritten in place once durations are known.

use crate::error::{MxfError, Result};
use crate::file::MxfFile;
use crate::klv::{local_items, write_kl, write_local_item, LLEN};
use crate::types::{MxfTimestamp, Rational, Umid};
use crate::ul::{labels, UL};
use byteorder::{BigEndian, WriteBytesExt};
use std::collections::BTreeMap;
use std::io::{Seek, Write};
use tracing::debug;

/// Local tags of the properties the writer emits
pub mod tags {
    pub const INSTANCE_UID: u16 = 0x3C0A;

    pub const PREFACE_LAST_MODIFIED_DATE: u16 = 0x3B02;
    pub const PREFACE_CONTENT_STORAGE: u16 = 0x3B03;
    pub const PREFACE_VERSION: u16 = 0x3B05;
    pub const PREFACE_IDENTIFICATIONS: u16 = 0x3B06;
    pub const PREFACE_OPERATIONAL_PATTERN: u16 = 0x3B09;
    pub const PREFACE_ESSENCE_CONTAINERS: u16 = 0x3B0A;
    pub const PREFACE_DM_SCHEMES: u16 = 0x3B0B;

    pub const IDENT_COMPANY_NAME: u16 = 0x3C01;
    pub const IDENT_PRODUCT_NAME: u16 = 0x3C02;
    pub const IDENT_VERSION_STRING: u16 = 0x3C04;
    pub const IDENT_PRODUCT_UID: u16 = 0x3C05;
    pub const IDENT_MODIFICATION_DATE: u16 = 0x3C06;
    pub const IDENT_TOOLKIT_VERSION: u16 = 0x3C07;
    pub const IDENT_PLATFORM: u16 = 0x3C08;
    pub const IDENT_THIS_GENERATION_UID: u16 = 0x3C09;

    pub const STORAGE_PACKAGES: u16 = 0x1901;
    pub const STORAGE_ESSENCE_CONTAINER_DATA: u16 = 0x1902;

    pub const ECD_LINKED_PACKAGE_UID: u16 = 0x2701;
    pub const ECD_INDEX_SID: u16 = 0x3F06;
    pub const ECD_BODY_SID: u16 = 0x3F07;

    pub const PACKAGE_UID: u16 = 0x4401;
    pub const PACKAGE_TRACKS: u16 = 0x4403;
    pub const PACKAGE_MODIFIED_DATE: u16 = 0x4404;
    pub const PACKAGE_CREATION_DATE: u16 = 0x4405;
    pub const SOURCE_PACKAGE_DESCRIPTOR: u16 = 0x4701;

    pub const TRACK_ID: u16 = 0x4801;
    pub const TRACK_NAME: u16 = 0x4802;
    pub const TRACK_SEQUENCE: u16 = 0x4803;
    pub const TRACK_NUMBER: u16 = 0x4804;
    pub const TRACK_EDIT_RATE: u16 = 0x4B01;
    pub const TRACK_ORIGIN: u16 = 0x4B02;

    pub const COMPONENT_DATA_DEFINITION: u16 = 0x0201;
    pub const COMPONENT_DURATION: u16 = 0x0202;
    pub const SEQUENCE_COMPONENTS: u16 = 0x1001;
    pub const CLIP_SOURCE_PACKAGE_ID: u16 = 0x1101;
    pub const CLIP_SOURCE_TRACK_ID: u16 = 0x1102;
    pub const CLIP_START_POSITION: u16 = 0x1201;
    pub const TC_START_TIMECODE: u16 = 0x1501;
    pub const TC_ROUNDED_BASE: u16 = 0x1502;
    pub const TC_DROP_FRAME: u16 = 0x1503;

    pub const DESC_SAMPLE_RATE: u16 = 0x3001;
    pub const DESC_CONTAINER_DURATION: u16 = 0x3002;
    pub const DESC_ESSENCE_CONTAINER: u16 = 0x3004;
    pub const DESC_LINKED_TRACK_ID: u16 = 0x3006;
    pub const DESC_SUB_DESCRIPTORS: u16 = 0x3F01;

    pub const PICTURE_ESSENCE_CODING: u16 = 0x3201;
    pub const STORED_HEIGHT: u16 = 0x3202;
    pub const STORED_WIDTH: u16 = 0x3203;
    pub const SAMPLED_HEIGHT: u16 = 0x3204;
    pub const SAMPLED_WIDTH: u16 = 0x3205;
    pub const SAMPLED_X_OFFSET: u16 = 0x3206;
    pub const SAMPLED_Y_OFFSET: u16 = 0x3207;
    pub const DISPLAY_HEIGHT: u16 = 0x3208;
    pub const DISPLAY_WIDTH: u16 = 0x3209;
    pub const DISPLAY_X_OFFSET: u16 = 0x320A;
    pub const DISPLAY_Y_OFFSET: u16 = 0x320B;
    pub const FRAME_LAYOUT: u16 = 0x320C;
    pub const VIDEO_LINE_MAP: u16 = 0x320D;
    pub const ASPECT_RATIO: u16 = 0x320E;
    pub const ALPHA_TRANSPARENCY: u16 = 0x320F;
    pub const CAPTURE_GAMMA: u16 = 0x3210;
    pub const IMAGE_ALIGNMENT_OFFSET: u16 = 0x3211;
    pub const FIELD_DOMINANCE: u16 = 0x3212;
    pub const IMAGE_START_OFFSET: u16 = 0x3213;
    pub const IMAGE_END_OFFSET: u16 = 0x3214;
    pub const SIGNAL_STANDARD: u16 = 0x3215;
    pub const STORED_F2_OFFSET: u16 = 0x3216;
    pub const DISPLAY_F2_OFFSET: u16 = 0x3217;

    pub const COMPONENT_DEPTH: u16 = 0x3301;
    pub const HORIZONTAL_SUBSAMPLING: u16 = 0x3302;
    pub const COLOR_SITING: u16 = 0x3303;
    pub const BLACK_REF_LEVEL: u16 = 0x3304;
    pub const WHITE_REF_LEVEL: u16 = 0x3305;
    pub const COLOR_RANGE: u16 = 0x3306;
    pub const PADDING_BITS: u16 = 0x3307;
    pub const VERTICAL_SUBSAMPLING: u16 = 0x3308;
    pub const REVERSED_BYTE_ORDER: u16 = 0x330B;

    pub const QUANTIZATION_BITS: u16 = 0x3D01;
    pub const LOCKED: u16 = 0x3D02;
    pub const AUDIO_SAMPLING_RATE: u16 = 0x3D03;
    pub const AUDIO_REF_LEVEL: u16 = 0x3D04;
    pub const CHANNEL_COUNT: u16 = 0x3D07;
}

const fn prop(version: u8, b: [u8; 8]) -> UL {
    [
        0x06, 0x0E, 0x2B, 0x34, 0x01, 0x01, 0x01, version, b[0], b[1], b[2], b[3], b[4], b[5],
        b[6], b[7],
    ]
}

/// Property label for every tag in [`tags`]
const PROPERTY_LABELS: &[(u16, UL)] = &[
    (tags::INSTANCE_UID, prop(0x01, [0x01, 0x01, 0x15, 0x02, 0, 0, 0, 0])),
    (tags::PREFACE_LAST_MODIFIED_DATE, prop(0x02, [0x07, 0x02, 0x01, 0x10, 0x02, 0x04, 0, 0])),
    (tags::PREFACE_CONTENT_STORAGE, prop(0x02, [0x06, 0x01, 0x01, 0x04, 0x02, 0x01, 0, 0])),
    (tags::PREFACE_VERSION, prop(0x02, [0x03, 0x01, 0x02, 0x01, 0x05, 0, 0, 0])),
    (tags::PREFACE_IDENTIFICATIONS, prop(0x02, [0x06, 0x01, 0x01, 0x04, 0x06, 0x04, 0, 0])),
    (tags::PREFACE_OPERATIONAL_PATTERN, prop(0x05, [0x01, 0x02, 0x02, 0x03, 0, 0, 0, 0])),
    (tags::PREFACE_ESSENCE_CONTAINERS, prop(0x05, [0x01, 0x02, 0x02, 0x10, 0x02, 0x01, 0, 0])),
    (tags::PREFACE_DM_SCHEMES, prop(0x05, [0x01, 0x02, 0x02, 0x10, 0x02, 0x02, 0, 0])),
    (tags::IDENT_COMPANY_NAME, prop(0x02, [0x05, 0x20, 0x07, 0x01, 0x02, 0x01, 0, 0])),
    (tags::IDENT_PRODUCT_NAME, prop(0x02, [0x05, 0x20, 0x07, 0x01, 0x03, 0x01, 0, 0])),
    (tags::IDENT_VERSION_STRING, prop(0x02, [0x05, 0x20, 0x07, 0x01, 0x05, 0x01, 0, 0])),
    (tags::IDENT_PRODUCT_UID, prop(0x02, [0x05, 0x20, 0x07, 0x01, 0x07, 0, 0, 0])),
    (tags::IDENT_MODIFICATION_DATE, prop(0x02, [0x07, 0x02, 0x01, 0x10, 0x02, 0x03, 0, 0])),
    (tags::IDENT_TOOLKIT_VERSION, prop(0x02, [0x05, 0x20, 0x07, 0x01, 0x0A, 0, 0, 0])),
    (tags::IDENT_PLATFORM, prop(0x02, [0x05, 0x20, 0x07, 0x01, 0x06, 0x01, 0, 0])),
    (tags::IDENT_THIS_GENERATION_UID, prop(0x02, [0x05, 0x20, 0x07, 0x01, 0x01, 0, 0, 0])),
    (tags::STORAGE_PACKAGES, prop(0x02, [0x06, 0x01, 0x01, 0x04, 0x05, 0x01, 0, 0])),
    (tags::STORAGE_ESSENCE_CONTAINER_DATA, prop(0x02, [0x06, 0x01, 0x01, 0x04, 0x05, 0x02, 0, 0])),
    (tags::ECD_LINKED_PACKAGE_UID, prop(0x02, [0x06, 0x01, 0x01, 0x06, 0x01, 0, 0, 0])),
    (tags::ECD_INDEX_SID, prop(0x04, [0x01, 0x03, 0x04, 0x05, 0, 0, 0, 0])),
    (tags::ECD_BODY_SID, prop(0x04, [0x01, 0x03, 0x04, 0x04, 0, 0, 0, 0])),
    (tags::PACKAGE_UID, prop(0x01, [0x01, 0x01, 0x15, 0x10, 0, 0, 0, 0])),
    (tags::PACKAGE_TRACKS, prop(0x02, [0x06, 0x01, 0x01, 0x04, 0x06, 0x05, 0, 0])),
    (tags::PACKAGE_MODIFIED_DATE, prop(0x02, [0x07, 0x02, 0x01, 0x10, 0x02, 0x05, 0, 0])),
    (tags::PACKAGE_CREATION_DATE, prop(0x02, [0x07, 0x02, 0x01, 0x10, 0x01, 0x03, 0, 0])),
    (tags::SOURCE_PACKAGE_DESCRIPTOR, prop(0x02, [0x06, 0x01, 0x01, 0x04, 0x02, 0x03, 0, 0])),
    (tags::TRACK_ID, prop(0x02, [0x01, 0x07, 0x01, 0x01, 0, 0, 0, 0])),
    (tags::TRACK_NAME, prop(0x02, [0x01, 0x07, 0x01, 0x02, 0x01, 0, 0, 0])),
    (tags::TRACK_SEQUENCE, prop(0x02, [0x06, 0x01, 0x01, 0x04, 0x02, 0x04, 0, 0])),
    (tags::TRACK_NUMBER, prop(0x02, [0x01, 0x04, 0x01, 0x03, 0, 0, 0, 0])),
    (tags::TRACK_EDIT_RATE, prop(0x02, [0x05, 0x30, 0x04, 0x05, 0, 0, 0, 0])),
    (tags::TRACK_ORIGIN, prop(0x02, [0x07, 0x02, 0x01, 0x03, 0x01, 0x03, 0, 0])),
    (tags::COMPONENT_DATA_DEFINITION, prop(0x02, [0x04, 0x07, 0x01, 0, 0, 0, 0, 0])),
    (tags::COMPONENT_DURATION, prop(0x02, [0x07, 0x02, 0x02, 0x01, 0x01, 0x03, 0, 0])),
    (tags::SEQUENCE_COMPONENTS, prop(0x02, [0x06, 0x01, 0x01, 0x04, 0x06, 0x09, 0, 0])),
    (tags::CLIP_SOURCE_PACKAGE_ID, prop(0x02, [0x06, 0x01, 0x01, 0x03, 0x01, 0, 0, 0])),
    (tags::CLIP_SOURCE_TRACK_ID, prop(0x02, [0x06, 0x01, 0x01, 0x03, 0x02, 0, 0, 0])),
    (tags::CLIP_START_POSITION, prop(0x02, [0x07, 0x02, 0x01, 0x03, 0x01, 0x04, 0, 0])),
    (tags::TC_START_TIMECODE, prop(0x02, [0x07, 0x02, 0x01, 0x03, 0x01, 0x05, 0, 0])),
    (tags::TC_ROUNDED_BASE, prop(0x02, [0x04, 0x04, 0x01, 0x01, 0x02, 0x06, 0, 0])),
    (tags::TC_DROP_FRAME, prop(0x01, [0x04, 0x04, 0x01, 0x01, 0x05, 0, 0, 0])),
    (tags::DESC_SAMPLE_RATE, prop(0x01, [0x04, 0x06, 0x01, 0x01, 0, 0, 0, 0])),
    (tags::DESC_CONTAINER_DURATION, prop(0x01, [0x04, 0x06, 0x01, 0x02, 0, 0, 0, 0])),
    (tags::DESC_ESSENCE_CONTAINER, prop(0x02, [0x06, 0x01, 0x01, 0x04, 0x01, 0x02, 0, 0])),
    (tags::DESC_LINKED_TRACK_ID, prop(0x05, [0x06, 0x01, 0x01, 0x03, 0x05, 0, 0, 0])),
    (tags::DESC_SUB_DESCRIPTORS, prop(0x04, [0x06, 0x01, 0x01, 0x04, 0x06, 0x0B, 0, 0])),
    (tags::PICTURE_ESSENCE_CODING, prop(0x02, [0x04, 0x01, 0x06, 0x01, 0, 0, 0, 0])),
    (tags::STORED_HEIGHT, prop(0x01, [0x04, 0x01, 0x05, 0x02, 0x01, 0, 0, 0])),
    (tags::STORED_WIDTH, prop(0x01, [0x04, 0x01, 0x05, 0x02, 0x02, 0, 0, 0])),
    (tags::SAMPLED_HEIGHT, prop(0x01, [0x04, 0x01, 0x05, 0x01, 0x07, 0, 0, 0])),
    (tags::SAMPLED_WIDTH, prop(0x01, [0x04, 0x01, 0x05, 0x01, 0x08, 0, 0, 0])),
    (tags::SAMPLED_X_OFFSET, prop(0x01, [0x04, 0x01, 0x05, 0x01, 0x09, 0, 0, 0])),
    (tags::SAMPLED_Y_OFFSET, prop(0x01, [0x04, 0x01, 0x05, 0x01, 0x0A, 0, 0, 0])),
    (tags::DISPLAY_HEIGHT, prop(0x01, [0x04, 0x01, 0x05, 0x01, 0x0B, 0, 0, 0])),
    (tags::DISPLAY_WIDTH, prop(0x01, [0x04, 0x01, 0x05, 0x01, 0x0C, 0, 0, 0])),
    (tags::DISPLAY_X_OFFSET, prop(0x01, [0x04, 0x01, 0x05, 0x01, 0x0D, 0, 0, 0])),
    (tags::DISPLAY_Y_OFFSET, prop(0x01, [0x04, 0x01, 0x05, 0x01, 0x0E, 0, 0, 0])),
    (tags::FRAME_LAYOUT, prop(0x01, [0x04, 0x01, 0x03, 0x01, 0x04, 0, 0, 0])),
    (tags::VIDEO_LINE_MAP, prop(0x02, [0x04, 0x01, 0x03, 0x02, 0x05, 0, 0, 0])),
    (tags::ASPECT_RATIO, prop(0x01, [0x04, 0x01, 0x01, 0x01, 0x01, 0, 0, 0])),
    (tags::ALPHA_TRANSPARENCY, prop(0x02, [0x05, 0x20, 0x01, 0x02, 0, 0, 0, 0])),
    (tags::CAPTURE_GAMMA, prop(0x02, [0x04, 0x01, 0x02, 0x01, 0x01, 0x01, 0x02, 0])),
    (tags::IMAGE_ALIGNMENT_OFFSET, prop(0x02, [0x04, 0x18, 0x01, 0x01, 0, 0, 0, 0])),
    (tags::FIELD_DOMINANCE, prop(0x02, [0x04, 0x01, 0x03, 0x01, 0x06, 0, 0, 0])),
    (tags::IMAGE_START_OFFSET, prop(0x02, [0x04, 0x18, 0x01, 0x02, 0, 0, 0, 0])),
    (tags::IMAGE_END_OFFSET, prop(0x02, [0x04, 0x18, 0x01, 0x03, 0, 0, 0, 0])),
    (tags::SIGNAL_STANDARD, prop(0x05, [0x04, 0x05, 0x01, 0x13, 0, 0, 0, 0])),
    (tags::STORED_F2_OFFSET, prop(0x05, [0x04, 0x01, 0x03, 0x02, 0x08, 0, 0, 0])),
    (tags::DISPLAY_F2_OFFSET, prop(0x05, [0x04, 0x01, 0x03, 0x02, 0x07, 0, 0, 0])),
    (tags::COMPONENT_DEPTH, prop(0x02, [0x04, 0x01, 0x05, 0x03, 0x0A, 0, 0, 0])),
    (tags::HORIZONTAL_SUBSAMPLING, prop(0x01, [0x04, 0x01, 0x05, 0x01, 0x05, 0, 0, 0])),
    (tags::COLOR_SITING, prop(0x01, [0x04, 0x01, 0x05, 0x01, 0x06, 0, 0, 0])),
    (tags::BLACK_REF_LEVEL, prop(0x01, [0x04, 0x01, 0x05, 0x03, 0x03, 0, 0, 0])),
    (tags::WHITE_REF_LEVEL, prop(0x01, [0x04, 0x01, 0x05, 0x03, 0x04, 0, 0, 0])),
    (tags::COLOR_RANGE, prop(0x02, [0x04, 0x01, 0x05, 0x03, 0x05, 0, 0, 0])),
    (tags::PADDING_BITS, prop(0x02, [0x04, 0x18, 0x01, 0x04, 0, 0, 0, 0])),
    (tags::VERTICAL_SUBSAMPLING, prop(0x02, [0x04, 0x01, 0x05, 0x01, 0x10, 0, 0, 0])),
    (tags::REVERSED_BYTE_ORDER, prop(0x05, [0x03, 0x01, 0x02, 0x01, 0x0A, 0, 0, 0])),
    (tags::QUANTIZATION_BITS, prop(0x04, [0x04, 0x02, 0x03, 0x03, 0x04, 0, 0, 0])),
    (tags::LOCKED, prop(0x04, [0x04, 0x02, 0x03, 0x01, 0x04, 0, 0, 0])),
    (tags::AUDIO_SAMPLING_RATE, prop(0x05, [0x04, 0x02, 0x03, 0x01, 0x01, 0x01, 0, 0])),
    (tags::AUDIO_REF_LEVEL, prop(0x01, [0x04, 0x02, 0x01, 0x01, 0x03, 0, 0, 0])),
    (tags::CHANNEL_COUNT, prop(0x05, [0x04, 0x02, 0x01, 0x01, 0x04, 0, 0, 0])),
];

/// Property label registered for a local tag
pub fn property_label(tag: u16) -> Option<UL> {
    PROPERTY_LABELS
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, ul)| *ul)
}

/// Handle to a set owned by a [`HeaderMetadata`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetId(usize);

/// A local set: key, instance UID and tagged items in insertion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataSet {
    key: UL,
    instance_uid: [u8; 16],
    items: Vec<(u16, Vec<u8>)>,
}

impl MetadataSet {
    pub fn new(key: UL, instance_uid: [u8; 16]) -> Self {
        MetadataSet {
            key,
            instance_uid,
            items: vec![(tags::INSTANCE_UID, instance_uid.to_vec())],
        }
    }

    /// Rebuild a set from a KLV key and local set value
    pub fn parse(key: UL, value: &[u8]) -> Result<Self> {
        let mut items = Vec::new();
        for item in local_items(value) {
            let (tag, data) = item?;
            items.push((tag, data.to_vec()));
        }

        let instance_uid = items
            .iter()
            .find(|(tag, _)| *tag == tags::INSTANCE_UID)
            .and_then(|(_, data)| <[u8; 16]>::try_from(data.as_slice()).ok())
            .ok_or_else(|| MxfError::InvalidKlv {
                message: "metadata set without an instance UID".into(),
                offset: 0,
            })?;

        Ok(MetadataSet {
            key,
            instance_uid,
            items,
        })
    }

    pub fn key(&self) -> &UL {
        &self.key
    }

    pub fn instance_uid(&self) -> [u8; 16] {
        self.instance_uid
    }

    pub fn items(&self) -> &[(u16, Vec<u8>)] {
        &self.items
    }

    pub fn item(&self, tag: u16) -> Option<&[u8]> {
        self.items
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, value)| value.as_slice())
    }

    /// Set an item, replacing an existing value in place
    pub fn set_item(&mut self, tag: u16, value: Vec<u8>) {
        match self.items.iter_mut().find(|(t, _)| *t == tag) {
            Some(item) => item.1 = value,
            None => self.items.push((tag, value)),
        }
    }

    pub fn set_u8(&mut self, tag: u16, value: u8) {
        self.set_item(tag, vec![value]);
    }

    pub fn set_bool(&mut self, tag: u16, value: bool) {
        self.set_u8(tag, value as u8);
    }

    pub fn set_u16(&mut self, tag: u16, value: u16) {
        self.set_item(tag, value.to_be_bytes().to_vec());
    }

    pub fn set_u32(&mut self, tag: u16, value: u32) {
        self.set_item(tag, value.to_be_bytes().to_vec());
    }

    pub fn set_i32(&mut self, tag: u16, value: i32) {
        self.set_item(tag, value.to_be_bytes().to_vec());
    }

    pub fn set_i64(&mut self, tag: u16, value: i64) {
        self.set_item(tag, value.to_be_bytes().to_vec());
    }

    pub fn set_ul(&mut self, tag: u16, value: &UL) {
        self.set_item(tag, value.to_vec());
    }

    pub fn set_uuid(&mut self, tag: u16, value: &[u8; 16]) {
        self.set_item(tag, value.to_vec());
    }

    pub fn set_umid(&mut self, tag: u16, value: &Umid) {
        self.set_item(tag, value.0.to_vec());
    }

    pub fn set_rational(&mut self, tag: u16, value: Rational) {
        self.set_item(tag, value.to_bytes().to_vec());
    }

    pub fn set_timestamp(&mut self, tag: u16, value: &MxfTimestamp) {
        self.set_item(tag, value.to_bytes().to_vec());
    }

    /// Null-terminated UTF-16 big-endian string
    pub fn set_string(&mut self, tag: u16, value: &str) {
        let mut bytes: Vec<u8> = value.encode_utf16().flat_map(u16::to_be_bytes).collect();
        bytes.extend_from_slice(&[0, 0]);
        self.set_item(tag, bytes);
    }

    /// Major, minor, patch, build and release as five 16-bit values
    pub fn set_product_version(&mut self, tag: u16, value: [u16; 5]) {
        self.set_item(tag, value.iter().flat_map(|v| v.to_be_bytes()).collect());
    }

    /// Batch of 16-byte values (UL or UUID)
    pub fn set_batch(&mut self, tag: u16, values: &[[u8; 16]]) {
        let mut bytes = batch_header(values.len(), 16);
        for value in values {
            bytes.extend_from_slice(value);
        }
        self.set_item(tag, bytes);
    }

    pub fn set_i32_array(&mut self, tag: u16, values: &[i32]) {
        let mut bytes = batch_header(values.len(), 4);
        for value in values {
            bytes.extend_from_slice(&value.to_be_bytes());
        }
        self.set_item(tag, bytes);
    }

    pub fn get_u32(&self, tag: u16) -> Option<u32> {
        let bytes = self.item(tag)?;
        Some(u32::from_be_bytes(bytes.try_into().ok()?))
    }

    pub fn get_i64(&self, tag: u16) -> Option<i64> {
        let bytes = self.item(tag)?;
        Some(i64::from_be_bytes(bytes.try_into().ok()?))
    }

    pub fn get_string(&self, tag: u16) -> Option<String> {
        let bytes = self.item(tag)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        String::from_utf16(&units).ok()
    }

    /// Batch of 16-byte values
    pub fn batch(&self, tag: u16) -> Option<Vec<[u8; 16]>> {
        let bytes = self.item(tag)?;
        if bytes.len() < 8 {
            return None;
        }
        let count = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        let values: Vec<[u8; 16]> = bytes[8..]
            .chunks_exact(16)
            .filter_map(|c| c.try_into().ok())
            .collect();
        (values.len() == count).then_some(values)
    }

    fn value_size(&self) -> u64 {
        self.items
            .iter()
            .map(|(_, value)| 4 + value.len() as u64)
            .sum()
    }

    /// Total KLV size when written
    pub fn size(&self) -> u64 {
        16 + LLEN as u64 + self.value_size()
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<u64> {
        write_kl(writer, &self.key, self.value_size(), LLEN)?;
        for (tag, value) in &self.items {
            write_local_item(writer, *tag, value)?;
        }
        Ok(self.size())
    }
}

fn batch_header(count: usize, item_size: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + count * item_size as usize);
    bytes.extend_from_slice(&(count as u32).to_be_bytes());
    bytes.extend_from_slice(&item_size.to_be_bytes());
    bytes
}

/// Primer pack: local tag to property label mapping
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimerPack {
    pub mappings: Vec<(u16, UL)>,
}

impl PrimerPack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tag: u16, ul: UL) {
        if !self.mappings.iter().any(|(t, _)| *t == tag) {
            self.mappings.push((tag, ul));
        }
    }

    pub fn lookup(&self, tag: u16) -> Option<&UL> {
        self.mappings.iter().find(|(t, _)| *t == tag).map(|(_, ul)| ul)
    }

    pub fn reverse_lookup(&self, ul: &UL) -> Option<u16> {
        self.mappings.iter().find(|(_, u)| u == ul).map(|(t, _)| *t)
    }

    /// Primer covering every tag used by `sets`, in ascending tag order
    pub fn for_sets<'a>(sets: impl IntoIterator<Item = &'a MetadataSet>) -> Result<Self> {
        let mut used = BTreeMap::new();
        for set in sets {
            for (tag, _) in set.items() {
                if !used.contains_key(tag) {
                    let ul = property_label(*tag).ok_or(MxfError::UnknownTag(*tag))?;
                    used.insert(*tag, ul);
                }
            }
        }
        Ok(PrimerPack {
            mappings: used.into_iter().collect(),
        })
    }

    pub fn parse(value: &[u8]) -> Result<Self> {
        if value.len() < 8 {
            return Err(MxfError::InsufficientData {
                needed: 8,
                available: value.len(),
            });
        }
        let count = u32::from_be_bytes([value[0], value[1], value[2], value[3]]) as usize;
        let item_size = u32::from_be_bytes([value[4], value[5], value[6], value[7]]) as usize;
        if item_size != 18 || value.len() < 8 + count * 18 {
            return Err(MxfError::InvalidKlv {
                message: format!("primer pack with {} items of {} bytes", count, item_size),
                offset: 0,
            });
        }

        let mappings = value[8..8 + count * 18]
            .chunks_exact(18)
            .map(|entry| {
                let mut ul = [0u8; 16];
                ul.copy_from_slice(&entry[2..]);
                (u16::from_be_bytes([entry[0], entry[1]]), ul)
            })
            .collect();
        Ok(PrimerPack { mappings })
    }

    pub fn size(&self) -> u64 {
        16 + LLEN as u64 + 8 + 18 * self.mappings.len() as u64
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<u64> {
        let value_size = 8 + 18 * self.mappings.len() as u64;
        write_kl(writer, &labels::PRIMER_PACK, value_size, LLEN)?;
        writer.write_u32::<BigEndian>(self.mappings.len() as u32)?;
        writer.write_u32::<BigEndian>(18)?;
        for (tag, ul) in &self.mappings {
            writer.write_u16::<BigEndian>(*tag)?;
            writer.write_all(ul)?;
        }
        Ok(self.size())
    }
}

/// A property whose value depends on the final duration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationProperty {
    pub set: SetId,
    pub tag: u16,
}

/// Properties registered while building the header, rewritten at finalize
#[derive(Debug, Clone, Default)]
pub struct DurationRegistry {
    entries: Vec<DurationProperty>,
}

impl DurationRegistry {
    pub fn register(&mut self, set: SetId, tag: u16) {
        self.entries.push(DurationProperty { set, tag });
    }

    pub fn entries(&self) -> &[DurationProperty] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How the space after the header sets is filled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filler {
    /// Reserve at least `reserve_min_bytes` and end on a KAG boundary
    Kag { reserve_min_bytes: u32 },
    /// Fill up to an absolute file position
    ToPosition(u64),
}

/// Header metadata: the set graph in write order and its duration registry
#[derive(Debug, Clone, Default)]
pub struct HeaderMetadata {
    sets: Vec<MetadataSet>,
    durations: DurationRegistry,
}

impl HeaderMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a set. Sets are written in the order they are added.
    pub fn add(&mut self, set: MetadataSet) -> SetId {
        self.sets.push(set);
        SetId(self.sets.len() - 1)
    }

    pub fn set(&self, id: SetId) -> &MetadataSet {
        &self.sets[id.0]
    }

    pub fn set_mut(&mut self, id: SetId) -> &mut MetadataSet {
        &mut self.sets[id.0]
    }

    pub fn sets(&self) -> &[MetadataSet] {
        &self.sets
    }

    /// Point `tag` of `parent` at `child`
    pub fn link(&mut self, parent: SetId, tag: u16, child: SetId) {
        let uid = self.sets[child.0].instance_uid;
        self.sets[parent.0].set_uuid(tag, &uid);
    }

    /// Append `child` to the reference batch `tag` of `parent`
    pub fn append_link(&mut self, parent: SetId, tag: u16, child: SetId) {
        let uid = self.sets[child.0].instance_uid;
        let parent = &mut self.sets[parent.0];
        let mut uids = parent.batch(tag).unwrap_or_default();
        uids.push(uid);
        parent.set_batch(tag, &uids);
    }

    /// Record that `tag` of `set` holds a duration
    pub fn register_duration(&mut self, set: SetId, tag: u16) {
        self.durations.register(set, tag);
    }

    pub fn durations(&self) -> &DurationRegistry {
        &self.durations
    }

    /// Write `duration` into every registered property
    pub fn update_durations(&mut self, duration: i64) {
        for entry in &self.durations.entries {
            self.sets[entry.set.0].set_i64(entry.tag, duration);
        }
    }

    pub fn primer(&self) -> Result<PrimerPack> {
        PrimerPack::for_sets(&self.sets)
    }

    /// Write the primer pack and sets at the current position of `file`,
    /// followed by `filler`. The header byte count of `partition` covers
    /// everything written here.
    pub fn write<W: Write + Seek>(
        &self,
        file: &mut MxfFile<W>,
        partition: usize,
        filler: Filler,
    ) -> Result<()> {
        let start = file.tell()?;
        file.mark_header_start()?;

        let mut buffer = Vec::new();
        self.primer()?.write(&mut buffer)?;
        file.write_all(&buffer)?;
        file.fill_to_kag(partition)?;

        buffer.clear();
        for set in &self.sets {
            set.write(&mut buffer)?;
        }
        file.write_all(&buffer)?;

        match filler {
            Filler::Kag { reserve_min_bytes } => {
                file.allocate_space_to_kag(partition, reserve_min_bytes)?
            }
            Filler::ToPosition(end) => {
                let current = file.tell()?;
                if current > end || (current != end && end - current < 16 + LLEN as u64) {
                    return Err(MxfError::MetadataSizeChanged {
                        reserved: end - start,
                        required: current - start,
                    });
                }
                file.fill_to_position(end)?
            }
        }

        file.mark_header_end(partition)?;
        debug!(
            "Wrote {} header metadata sets from {} to {}",
            self.sets.len(),
            start,
            file.tell()?
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::klv::KlvReader;
    use crate::partition::Partition;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn uid(n: u8) -> [u8; 16] {
        let mut uid = [0u8; 16];
        uid[15] = n;
        uid
    }

    #[test]
    fn test_every_tag_has_a_label() {
        let mut seen = std::collections::HashSet::new();
        for (tag, ul) in PROPERTY_LABELS {
            assert!(seen.insert(*tag), "duplicate tag {:04x}", tag);
            assert_eq!(&ul[..4], &labels::SMPTE_PREFIX);
        }
        assert!(property_label(0x0202).is_some());
        assert!(property_label(0xFFFF).is_none());
    }

    #[test]
    fn test_set_items_replace_in_place() {
        let mut set = MetadataSet::new(labels::SEQUENCE, uid(1));
        set.set_ul(tags::COMPONENT_DATA_DEFINITION, &labels::PICTURE_DATA_DEF);
        set.set_i64(tags::COMPONENT_DURATION, -1);
        let size = set.size();

        set.set_i64(tags::COMPONENT_DURATION, 250);
        assert_eq!(set.size(), size);
        assert_eq!(set.get_i64(tags::COMPONENT_DURATION), Some(250));
        assert_eq!(set.items()[2].0, tags::COMPONENT_DURATION);
    }

    #[test]
    fn test_string_and_batches() {
        let mut set = MetadataSet::new(labels::TRACK, uid(1));
        set.set_string(tags::TRACK_NAME, "V1");
        assert_eq!(set.item(tags::TRACK_NAME), Some(&[0, b'V', 0, b'1', 0, 0][..]));
        assert_eq!(set.get_string(tags::TRACK_NAME).as_deref(), Some("V1"));

        let mut header = HeaderMetadata::new();
        let package = header.add(MetadataSet::new(labels::MATERIAL_PACKAGE, uid(3)));
        let track = header.add(set);
        let sequence = header.add(MetadataSet::new(labels::SEQUENCE, uid(2)));
        header.append_link(package, tags::PACKAGE_TRACKS, track);
        header.append_link(package, tags::PACKAGE_TRACKS, sequence);
        header.link(track, tags::TRACK_SEQUENCE, sequence);
        assert_eq!(
            header.set(package).batch(tags::PACKAGE_TRACKS),
            Some(vec![uid(1), uid(2)])
        );
        assert_eq!(header.set(track).item(tags::TRACK_SEQUENCE), Some(&uid(2)[..]));

        let mut desc = MetadataSet::new(labels::CDCI_DESCRIPTOR, uid(4));
        desc.set_i32_array(tags::VIDEO_LINE_MAP, &[7, 320]);
        assert_eq!(
            desc.item(tags::VIDEO_LINE_MAP),
            Some(&[0, 0, 0, 2, 0, 0, 0, 4, 0, 0, 0, 7, 0, 0, 1, 64][..])
        );
    }

    #[test]
    fn test_set_write_parse() {
        let mut set = MetadataSet::new(labels::TRACK, uid(9));
        set.set_u32(tags::TRACK_ID, 2);
        set.set_rational(tags::TRACK_EDIT_RATE, Rational::new(25, 1));

        let mut buffer = Vec::new();
        let size = set.write(&mut buffer).unwrap();
        assert_eq!(size, buffer.len() as u64);

        let klv = KlvReader::new(&buffer).read_klv().unwrap().unwrap();
        let parsed = MetadataSet::parse(labels::TRACK, klv.value).unwrap();
        assert_eq!(parsed, set);
        assert_eq!(parsed.get_u32(tags::TRACK_ID), Some(2));
    }

    #[test]
    fn test_primer_from_used_tags() {
        let mut set = MetadataSet::new(labels::TRACK, uid(1));
        set.set_u32(tags::TRACK_ID, 1);
        let primer = PrimerPack::for_sets([&set]).unwrap();
        assert_eq!(primer.mappings.len(), 2);
        assert_eq!(primer.mappings[0].0, tags::INSTANCE_UID);
        assert_eq!(primer.lookup(tags::TRACK_ID), property_label(tags::TRACK_ID).as_ref());

        let mut buffer = Vec::new();
        primer.write(&mut buffer).unwrap();
        let klv = KlvReader::new(&buffer).read_klv().unwrap().unwrap();
        assert_eq!(PrimerPack::parse(klv.value).unwrap(), primer);

        set.set_u8(0x7F00, 1);
        assert!(matches!(
            PrimerPack::for_sets([&set]),
            Err(MxfError::UnknownTag(0x7F00))
        ));
    }

    #[test]
    fn test_header_rewrite_same_size() {
        let mut header = HeaderMetadata::new();
        let mut sequence = MetadataSet::new(labels::SEQUENCE, uid(1));
        sequence.set_ul(tags::COMPONENT_DATA_DEFINITION, &labels::SOUND_DATA_DEF);
        sequence.set_i64(tags::COMPONENT_DURATION, -1);
        let id = header.add(sequence);
        header.register_duration(id, tags::COMPONENT_DURATION);

        let mut partition = Partition::header();
        partition.kag_size = 0x200;
        let mut file = MxfFile::new(Cursor::new(Vec::new()));
        let index = file.write_partition(partition).unwrap();

        let start = file.tell().unwrap();
        header
            .write(&mut file, index, Filler::Kag { reserve_min_bytes: 1024 })
            .unwrap();
        let end = file.tell().unwrap();
        assert_eq!(end % 0x200, 0);
        assert_eq!(file.partitions()[0].header_byte_count, end - start);

        header.update_durations(10);
        file.seek(start).unwrap();
        header.write(&mut file, index, Filler::ToPosition(end)).unwrap();
        assert_eq!(file.tell().unwrap(), end);
        assert_eq!(file.partitions()[0].header_byte_count, end - start);
        assert_eq!(header.set(id).get_i64(tags::COMPONENT_DURATION), Some(10));
    }

    #[test]
    fn test_header_rewrite_overflow() {
        let mut header = HeaderMetadata::new();
        header.add(MetadataSet::new(labels::PREFACE, uid(1)));

        let mut partition = Partition::header();
        partition.kag_size = 1;
        let mut file = MxfFile::new(Cursor::new(Vec::new()));
        let index = file.write_partition(partition).unwrap();
        let start = file.tell().unwrap();
        header
            .write(&mut file, index, Filler::Kag { reserve_min_bytes: 0 })
            .unwrap();
        let end = file.tell().unwrap();

        let mut identification = MetadataSet::new(labels::IDENTIFICATION, uid(2));
        identification.set_string(tags::IDENT_COMPANY_NAME, "company");
        header.add(identification);
        file.seek(start).unwrap();
        assert!(matches!(
            header.write(&mut file, index, Filler::ToPosition(end)),
            Err(MxfError::MetadataSizeChanged { .. })
        ));
    }
}

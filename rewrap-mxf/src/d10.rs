//! D-10 (SMPTE 386M) OP-1A file writer.
//!
//! The file is a single closed and complete header partition carrying the
//! header metadata, a constant edit unit size index table segment and the
//! content packages, followed by a footer partition and a random index pack.
//!
//! Durations are unknown while content packages are written, so the header
//! metadata is written with durations of -1 and rewritten in place by
//! [`D10Writer::complete`]. Every property has a fixed size, which keeps the
//! rewritten metadata inside the span reserved by the first write.
//!
//! 525-line audio follows a 5-frame 1602/1601 sample sequence. When the
//! phase of the incoming audio is not configured, up to 5 content packages
//! are buffered and the phase is detected from their sample counts.

use crate::aes3::{matching_sequence_offsets, Aes3Packer};
use crate::error::{MxfError, Result};
use crate::file::MxfFile;
use crate::index::IndexTableSegment;
use crate::klv::LLEN;
use crate::layout::{D10Layout, D10SampleRate, KAG_SIZE};
use crate::metadata::{tags, Filler, HeaderMetadata, MetadataSet, SetId};
use crate::package::{ContentPackage, MAX_AUDIO_CHANNELS};
use crate::partition::{Partition, PartitionKind, PartitionStatus};
use crate::system_item::write_system_item;
use crate::timecode::Timecode;
use crate::types::{IdGenerator, Rational, Umid};
use crate::ul::{labels, UL};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Index table stream identifier
pub const INDEX_SID: u32 = 1;

/// Essence container stream identifier
pub const BODY_SID: u32 = 2;

const DEFAULT_PRODUCT_UID: [u8; 16] = [
    0x93, 0xa1, 0xba, 0xae, 0x41, 0xc5, 0x4a, 0x16, 0x8b, 0x2c, 0x42, 0xe7, 0x23, 0x0d, 0x0a, 0x4e,
];

/// Track number of the picture element in the file package
const PICTURE_TRACK_NUMBER: u32 = 0x0501_0100;

/// Track number of the AES-3 element in the file package
const SOUND_TRACK_NUMBER: u32 = 0x0601_1000;

const PREFACE_VERSION: u16 = 0x0102;
const SIGNAL_STANDARD_ITU601: u8 = 1;
const FRAME_LAYOUT_SEPARATE_FIELDS: u8 = 1;
const COLOR_SITING_REC601: u8 = 4;
const AUDIO_SAMPLING_RATE: Rational = Rational::new(48000, 1);

/// D-10 video bit rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum D10BitRate {
    #[default]
    Mbps50,
    Mbps40,
    Mbps30,
}

impl D10BitRate {
    pub fn mbps(self) -> u32 {
        match self {
            D10BitRate::Mbps50 => 50,
            D10BitRate::Mbps40 => 40,
            D10BitRate::Mbps30 => 30,
        }
    }

    /// Last byte of the essence container and picture coding labels
    fn label_variant(self, sample_rate: D10SampleRate) -> u8 {
        let base = match self {
            D10BitRate::Mbps50 => 0x01,
            D10BitRate::Mbps40 => 0x03,
            D10BitRate::Mbps30 => 0x05,
        };
        match sample_rate {
            D10SampleRate::Rate625_50i => base,
            D10SampleRate::Rate525_60i => base + 1,
        }
    }
}

/// Picture aspect ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    Ratio4x3,
    #[default]
    Ratio16x9,
}

impl AspectRatio {
    pub fn rational(self) -> Rational {
        match self {
            AspectRatio::Ratio4x3 => Rational::new(4, 3),
            AspectRatio::Ratio16x9 => Rational::new(16, 9),
        }
    }
}

/// Phase of the first content package's audio in the sample sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SequenceOffset {
    /// Detect the phase from the sample counts of the first packages
    #[default]
    Auto,
    Fixed(u8),
}

/// Where the sequence offset in use came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceOffsetSource {
    Configured,
    Detected,
    /// No phase matched the buffered packages and 0 was used
    Fallback,
    /// Several phases matched the buffered packages and the first was used
    Ambiguous,
    /// Still buffering packages
    Pending,
}

/// Identification written into the header metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductInfo {
    pub company_name: String,
    pub product_name: String,
    pub version_string: String,
    pub product_uid: [u8; 16],
}

impl Default for ProductInfo {
    fn default() -> Self {
        ProductInfo {
            company_name: "BBC".to_string(),
            product_name: "Ingex".to_string(),
            version_string: "0.1".to_string(),
            product_uid: DEFAULT_PRODUCT_UID,
        }
    }
}

/// D-10 writer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct D10WriterConfig {
    pub sample_rate: D10SampleRate,
    /// Audio channels, 0 to 8
    pub channel_count: u32,
    /// Audio quantization bits, 16 to 24
    pub quantization_bits: u32,
    pub sequence_offset: SequenceOffset,
    pub aspect_ratio: AspectRatio,
    /// Start timecode as a frame count
    pub start_timecode: i64,
    /// Drop-frame timecode; only honoured at 525 lines
    pub drop_frame: bool,
    pub bit_rate: D10BitRate,
    /// Fixed encoded picture size in bytes
    pub encoded_picture_size: u32,
    pub material_package_uid: Option<Umid>,
    pub file_package_uid: Option<Umid>,
    pub product: ProductInfo,
    /// Minimum space reserved after the header metadata
    pub reserve_min_bytes: u32,
    /// Counter-based identifiers and zero timestamps
    pub deterministic: bool,
}

impl Default for D10WriterConfig {
    fn default() -> Self {
        D10WriterConfig {
            sample_rate: D10SampleRate::Rate625_50i,
            channel_count: 4,
            quantization_bits: 24,
            sequence_offset: SequenceOffset::Auto,
            aspect_ratio: AspectRatio::Ratio16x9,
            start_timecode: 0,
            drop_frame: false,
            bit_rate: D10BitRate::Mbps50,
            encoded_picture_size: 250_000,
            material_package_uid: None,
            file_package_uid: None,
            product: ProductInfo::default(),
            reserve_min_bytes: 0,
            deterministic: false,
        }
    }
}

impl D10WriterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.channel_count > MAX_AUDIO_CHANNELS as u32 {
            return Err(MxfError::config(format!(
                "channel count {} exceeds {}",
                self.channel_count, MAX_AUDIO_CHANNELS
            )));
        }
        if !(16..=24).contains(&self.quantization_bits) {
            return Err(MxfError::config(format!(
                "quantization bits {} outside 16..=24",
                self.quantization_bits
            )));
        }
        let max = self.sample_rate.max_encoded_picture_size();
        if self.encoded_picture_size == 0 || self.encoded_picture_size > max {
            return Err(MxfError::config(format!(
                "encoded picture size {} outside 1..={}",
                self.encoded_picture_size, max
            )));
        }
        Ok(())
    }

    pub fn timecode_base(&self) -> u16 {
        self.sample_rate.video_rate().timecode_base() as u16
    }

    /// Drop frame after restricting it to 525 lines
    pub fn effective_drop_frame(&self) -> bool {
        self.drop_frame && self.sample_rate == D10SampleRate::Rate525_60i
    }

    pub fn edit_rate(&self) -> Rational {
        let (numerator, denominator) = self.sample_rate.video_rate().ratio();
        Rational::new(numerator, denominator)
    }

    pub fn essence_container(&self) -> UL {
        labels::d10_essence_container(self.bit_rate.label_variant(self.sample_rate))
    }

    pub fn picture_coding(&self) -> UL {
        labels::d10_picture_coding(self.bit_rate.label_variant(self.sample_rate))
    }

    pub fn stored_width(&self) -> u32 {
        720
    }

    pub fn stored_height(&self) -> u32 {
        match self.sample_rate {
            D10SampleRate::Rate625_50i => 304,
            D10SampleRate::Rate525_60i => 256,
        }
    }
}

/// Bytes per content package for a sample rate and encoded picture size
pub fn content_package_size(sample_rate: D10SampleRate, encoded_picture_size: u32) -> u32 {
    D10Layout::package_size_for(sample_rate, encoded_picture_size)
}

struct TrackSpec<'a> {
    id: u32,
    number: u32,
    name: &'a str,
    data_definition: UL,
}

struct HeaderBuilder<'a> {
    header: HeaderMetadata,
    ids: &'a mut IdGenerator,
    edit_rate: Rational,
}

impl HeaderBuilder<'_> {
    fn new_set(&mut self, key: UL) -> MetadataSet {
        MetadataSet::new(key, self.ids.uuid())
    }

    /// Track and its sequence; returns the sequence
    fn add_track(&mut self, package: SetId, spec: &TrackSpec) -> SetId {
        let mut track = self.new_set(labels::TRACK);
        track.set_string(tags::TRACK_NAME, spec.name);
        track.set_u32(tags::TRACK_ID, spec.id);
        track.set_u32(tags::TRACK_NUMBER, spec.number);
        track.set_rational(tags::TRACK_EDIT_RATE, self.edit_rate);
        track.set_i64(tags::TRACK_ORIGIN, 0);
        let track = self.header.add(track);
        self.header.append_link(package, tags::PACKAGE_TRACKS, track);

        let mut sequence = self.new_set(labels::SEQUENCE);
        sequence.set_ul(tags::COMPONENT_DATA_DEFINITION, &spec.data_definition);
        sequence.set_i64(tags::COMPONENT_DURATION, -1);
        let sequence = self.header.add(sequence);
        self.header.link(track, tags::TRACK_SEQUENCE, sequence);
        self.header.register_duration(sequence, tags::COMPONENT_DURATION);
        sequence
    }

    fn add_component(&mut self, sequence: SetId, mut component: MetadataSet) -> SetId {
        component.set_i64(tags::COMPONENT_DURATION, -1);
        let component = self.header.add(component);
        self.header
            .append_link(sequence, tags::SEQUENCE_COMPONENTS, component);
        self.header
            .register_duration(component, tags::COMPONENT_DURATION);
        component
    }

    fn add_timecode_component(&mut self, sequence: SetId, config: &D10WriterConfig) -> SetId {
        let mut timecode = self.new_set(labels::TIMECODE_COMPONENT);
        timecode.set_ul(tags::COMPONENT_DATA_DEFINITION, &labels::TIMECODE_DATA_DEF);
        timecode.set_u16(tags::TC_ROUNDED_BASE, config.timecode_base());
        timecode.set_bool(tags::TC_DROP_FRAME, config.effective_drop_frame());
        timecode.set_i64(tags::TC_START_TIMECODE, config.start_timecode);
        self.add_component(sequence, timecode)
    }

    fn add_source_clip(
        &mut self,
        sequence: SetId,
        data_definition: &UL,
        source_track_id: u32,
        source_package: &Umid,
    ) -> SetId {
        let mut clip = self.new_set(labels::SOURCE_CLIP);
        clip.set_ul(tags::COMPONENT_DATA_DEFINITION, data_definition);
        clip.set_i64(tags::CLIP_START_POSITION, 0);
        clip.set_u32(tags::CLIP_SOURCE_TRACK_ID, source_track_id);
        clip.set_umid(tags::CLIP_SOURCE_PACKAGE_ID, source_package);
        self.add_component(sequence, clip)
    }

    fn add_descriptor(&mut self, mut descriptor: MetadataSet, essence_container: &UL) -> SetId {
        descriptor.set_rational(tags::DESC_SAMPLE_RATE, self.edit_rate);
        descriptor.set_i64(tags::DESC_CONTAINER_DURATION, -1);
        descriptor.set_ul(tags::DESC_ESSENCE_CONTAINER, essence_container);
        let descriptor = self.header.add(descriptor);
        self.header
            .register_duration(descriptor, tags::DESC_CONTAINER_DURATION);
        descriptor
    }
}

const TIMECODE_TRACK: TrackSpec<'static> = TrackSpec {
    id: 1,
    number: 0,
    name: "TC1",
    data_definition: labels::TIMECODE_DATA_DEF,
};

/// The header metadata graph and the sets updated after creation
struct D10Header {
    metadata: HeaderMetadata,
    timecode_components: [SetId; 2],
}

fn build_header_metadata(
    config: &D10WriterConfig,
    ids: &mut IdGenerator,
    material_package_uid: &Umid,
    file_package_uid: &Umid,
) -> D10Header {
    let now = ids.timestamp();
    let essence_container = config.essence_container();
    let mut builder = HeaderBuilder {
        header: HeaderMetadata::new(),
        ids,
        edit_rate: config.edit_rate(),
    };

    let mut preface = builder.new_set(labels::PREFACE);
    preface.set_timestamp(tags::PREFACE_LAST_MODIFIED_DATE, &now);
    preface.set_u16(tags::PREFACE_VERSION, PREFACE_VERSION);
    preface.set_ul(
        tags::PREFACE_OPERATIONAL_PATTERN,
        &labels::OP1A_MULTI_TRACK_STREAM_INTERNAL,
    );
    preface.set_batch(tags::PREFACE_ESSENCE_CONTAINERS, &[essence_container]);
    preface.set_batch(tags::PREFACE_DM_SCHEMES, &[]);
    let preface = builder.header.add(preface);

    let mut ident = builder.new_set(labels::IDENTIFICATION);
    let generation = builder.ids.uuid();
    ident.set_uuid(tags::IDENT_THIS_GENERATION_UID, &generation);
    ident.set_string(tags::IDENT_COMPANY_NAME, &config.product.company_name);
    ident.set_string(tags::IDENT_PRODUCT_NAME, &config.product.product_name);
    ident.set_string(tags::IDENT_VERSION_STRING, &config.product.version_string);
    ident.set_uuid(tags::IDENT_PRODUCT_UID, &config.product.product_uid);
    ident.set_timestamp(tags::IDENT_MODIFICATION_DATE, &now);
    ident.set_product_version(tags::IDENT_TOOLKIT_VERSION, toolkit_version());
    ident.set_string(tags::IDENT_PLATFORM, &platform());
    let ident = builder.header.add(ident);
    builder
        .header
        .append_link(preface, tags::PREFACE_IDENTIFICATIONS, ident);

    let storage = builder.new_set(labels::CONTENT_STORAGE);
    let storage = builder.header.add(storage);
    builder
        .header
        .link(preface, tags::PREFACE_CONTENT_STORAGE, storage);

    let mut ecd = builder.new_set(labels::ESSENCE_CONTAINER_DATA);
    ecd.set_umid(tags::ECD_LINKED_PACKAGE_UID, file_package_uid);
    ecd.set_u32(tags::ECD_INDEX_SID, INDEX_SID);
    ecd.set_u32(tags::ECD_BODY_SID, BODY_SID);
    let ecd = builder.header.add(ecd);
    builder
        .header
        .append_link(storage, tags::STORAGE_ESSENCE_CONTAINER_DATA, ecd);

    let tracks = [
        TrackSpec {
            id: 2,
            number: 0,
            name: "V1",
            data_definition: labels::PICTURE_DATA_DEF,
        },
        TrackSpec {
            id: 3,
            number: 0,
            name: "A1",
            data_definition: labels::SOUND_DATA_DEF,
        },
    ];

    // material package
    let mut material = builder.new_set(labels::MATERIAL_PACKAGE);
    material.set_umid(tags::PACKAGE_UID, material_package_uid);
    material.set_timestamp(tags::PACKAGE_CREATION_DATE, &now);
    material.set_timestamp(tags::PACKAGE_MODIFIED_DATE, &now);
    let material = builder.header.add(material);
    builder
        .header
        .append_link(storage, tags::STORAGE_PACKAGES, material);

    let sequence = builder.add_track(material, &TIMECODE_TRACK);
    let material_timecode = builder.add_timecode_component(sequence, config);
    for spec in &tracks {
        let sequence = builder.add_track(material, spec);
        builder.add_source_clip(sequence, &spec.data_definition, spec.id, file_package_uid);
    }

    // file source package
    let mut source = builder.new_set(labels::SOURCE_PACKAGE);
    source.set_umid(tags::PACKAGE_UID, file_package_uid);
    source.set_timestamp(tags::PACKAGE_CREATION_DATE, &now);
    source.set_timestamp(tags::PACKAGE_MODIFIED_DATE, &now);
    let source = builder.header.add(source);
    builder
        .header
        .append_link(storage, tags::STORAGE_PACKAGES, source);

    let sequence = builder.add_track(source, &TIMECODE_TRACK);
    let file_timecode = builder.add_timecode_component(sequence, config);
    for (spec, number) in tracks.iter().zip([PICTURE_TRACK_NUMBER, SOUND_TRACK_NUMBER]) {
        let spec = TrackSpec { number, ..*spec };
        let sequence = builder.add_track(source, &spec);
        builder.add_source_clip(sequence, &spec.data_definition, 0, &Umid::zero());
    }

    let multiple = builder.new_set(labels::MULTIPLE_DESCRIPTOR);
    let multiple = builder.add_descriptor(multiple, &essence_container);
    builder
        .header
        .link(source, tags::SOURCE_PACKAGE_DESCRIPTOR, multiple);

    let cdci = cdci_descriptor(&mut builder, config);
    let cdci = builder.add_descriptor(cdci, &essence_container);
    builder
        .header
        .append_link(multiple, tags::DESC_SUB_DESCRIPTORS, cdci);

    let mut sound = builder.new_set(labels::GENERIC_SOUND_DESCRIPTOR);
    sound.set_u32(tags::DESC_LINKED_TRACK_ID, 3);
    sound.set_rational(tags::AUDIO_SAMPLING_RATE, AUDIO_SAMPLING_RATE);
    sound.set_bool(tags::LOCKED, true);
    sound.set_u8(tags::AUDIO_REF_LEVEL, 0);
    sound.set_u32(tags::CHANNEL_COUNT, config.channel_count);
    sound.set_u32(tags::QUANTIZATION_BITS, config.quantization_bits);
    let sound = builder.add_descriptor(sound, &essence_container);
    builder
        .header
        .append_link(multiple, tags::DESC_SUB_DESCRIPTORS, sound);

    D10Header {
        metadata: builder.header,
        timecode_components: [material_timecode, file_timecode],
    }
}

fn cdci_descriptor(builder: &mut HeaderBuilder<'_>, config: &D10WriterConfig) -> MetadataSet {
    let (display_height, display_y_offset, line_map) = match config.sample_rate {
        D10SampleRate::Rate625_50i => (288, 16, [7, 320]),
        D10SampleRate::Rate525_60i => (243, 13, [7, 270]),
    };

    let mut cdci = builder.new_set(labels::CDCI_DESCRIPTOR);
    cdci.set_u32(tags::DESC_LINKED_TRACK_ID, 2);
    cdci.set_ul(tags::PICTURE_ESSENCE_CODING, &config.picture_coding());
    cdci.set_u8(tags::SIGNAL_STANDARD, SIGNAL_STANDARD_ITU601);
    cdci.set_u8(tags::FRAME_LAYOUT, FRAME_LAYOUT_SEPARATE_FIELDS);
    cdci.set_u32(tags::STORED_WIDTH, config.stored_width());
    cdci.set_u32(tags::STORED_HEIGHT, config.stored_height());
    cdci.set_u32(tags::SAMPLED_WIDTH, config.stored_width());
    cdci.set_u32(tags::SAMPLED_HEIGHT, config.stored_height());
    cdci.set_u32(tags::DISPLAY_WIDTH, 720);
    cdci.set_u32(tags::DISPLAY_HEIGHT, display_height);
    cdci.set_i32(tags::DISPLAY_X_OFFSET, 0);
    cdci.set_i32(tags::DISPLAY_Y_OFFSET, display_y_offset);
    cdci.set_i32_array(tags::VIDEO_LINE_MAP, &line_map);
    cdci.set_i32(tags::STORED_F2_OFFSET, 0);
    cdci.set_i32(tags::SAMPLED_X_OFFSET, 0);
    cdci.set_i32(tags::SAMPLED_Y_OFFSET, 0);
    cdci.set_i32(tags::DISPLAY_F2_OFFSET, 0);
    cdci.set_rational(tags::ASPECT_RATIO, config.aspect_ratio.rational());
    cdci.set_bool(tags::ALPHA_TRANSPARENCY, false);
    cdci.set_ul(tags::CAPTURE_GAMMA, &labels::GAMMA_BT470);
    cdci.set_u32(tags::IMAGE_ALIGNMENT_OFFSET, 0);
    cdci.set_u8(tags::FIELD_DOMINANCE, 1);
    cdci.set_u32(tags::IMAGE_START_OFFSET, 0);
    cdci.set_u32(tags::IMAGE_END_OFFSET, 0);
    cdci.set_u32(tags::COMPONENT_DEPTH, 8);
    cdci.set_u32(tags::HORIZONTAL_SUBSAMPLING, 2);
    cdci.set_u32(tags::VERTICAL_SUBSAMPLING, 1);
    cdci.set_u8(tags::COLOR_SITING, COLOR_SITING_REC601);
    cdci.set_bool(tags::REVERSED_BYTE_ORDER, false);
    cdci.set_u16(tags::PADDING_BITS, 0);
    cdci.set_u32(tags::BLACK_REF_LEVEL, 16);
    cdci.set_u32(tags::WHITE_REF_LEVEL, 235);
    cdci.set_u32(tags::COLOR_RANGE, 225);
    cdci
}

fn toolkit_version() -> [u16; 5] {
    let part = |s: &str| s.parse::<u16>().unwrap_or(0);
    [
        part(env!("CARGO_PKG_VERSION_MAJOR")),
        part(env!("CARGO_PKG_VERSION_MINOR")),
        part(env!("CARGO_PKG_VERSION_PATCH")),
        0,
        0,
    ]
}

fn platform() -> String {
    format!("rewrap-mxf ({})", std::env::consts::OS)
}

/// Writer of D-10 OP-1A files
pub struct D10Writer<W: Write + Seek> {
    config: D10WriterConfig,
    file: MxfFile<W>,
    layout: D10Layout,
    essence_container: UL,
    header: HeaderMetadata,
    timecode_components: [SetId; 2],
    header_partition: usize,
    header_metadata_start: u64,
    header_metadata_end: u64,
    index_segment: IndexTableSegment,
    packer: Aes3Packer,
    content_package: ContentPackage,
    buffered: Vec<ContentPackage>,
    duration: i64,
    sequence_offset: Option<u8>,
    offset_source: SequenceOffsetSource,
    material_package_uid: Umid,
    file_package_uid: Umid,
}

impl D10Writer<BufWriter<File>> {
    /// Create the file at `path` and write the header partition
    pub fn create(path: impl AsRef<Path>, config: D10WriterConfig) -> Result<Self> {
        config.validate()?;
        let file = File::create(path.as_ref())?;
        debug!("Creating D-10 file {}", path.as_ref().display());
        D10Writer::new(BufWriter::new(file), config)
    }
}

impl<W: Write + Seek> D10Writer<W> {
    /// Take ownership of `writer` and write the header partition, header
    /// metadata and index table segment
    pub fn new(writer: W, config: D10WriterConfig) -> Result<Self> {
        config.validate()?;

        let mut ids = IdGenerator::new(config.deterministic);
        let material_package_uid = config
            .material_package_uid
            .unwrap_or_else(|| ids.umid());
        let file_package_uid = config.file_package_uid.unwrap_or_else(|| ids.umid());
        let header =
            build_header_metadata(&config, &mut ids, &material_package_uid, &file_package_uid);

        let layout = D10Layout::new(config.sample_rate, config.encoded_picture_size);
        let essence_container = config.essence_container();

        let mut packer = Aes3Packer::new(
            config.sample_rate,
            config.channel_count,
            config.quantization_bits,
        );
        let sequence_len = packer.sequence().len();
        let (sequence_offset, offset_source) = match config.sequence_offset {
            SequenceOffset::Fixed(offset) => {
                let offset = offset % sequence_len as u8;
                packer.set_sequence_index(offset as usize);
                (Some(offset), SequenceOffsetSource::Configured)
            }
            SequenceOffset::Auto if sequence_len > 1 && config.channel_count > 0 => {
                (None, SequenceOffsetSource::Pending)
            }
            SequenceOffset::Auto => (Some(0), SequenceOffsetSource::Detected),
        };

        let mut index_segment = IndexTableSegment {
            instance_uid: ids.uuid(),
            index_edit_rate: config.edit_rate(),
            index_duration: 0,
            edit_unit_byte_count: layout.content_package_size(),
            index_sid: INDEX_SID,
            body_sid: BODY_SID,
            ..Default::default()
        };
        index_segment.append_delta_entry(0, 0, 0);
        index_segment.append_delta_entry(0, 0, layout.system_item_size);
        index_segment.append_delta_entry(0, 0, layout.system_item_size + layout.video_item_size);

        let mut file = MxfFile::new(writer);
        let mut partition = Partition::header();
        partition.status = PartitionStatus::ClosedComplete;
        partition.kag_size = KAG_SIZE;
        partition.index_sid = INDEX_SID;
        partition.body_sid = BODY_SID;
        partition.operational_pattern = labels::OP1A_MULTI_TRACK_STREAM_INTERNAL;
        partition.add_essence_container(essence_container);
        let header_partition = file.write_partition(partition)?;

        let header_metadata_start = file.tell()?;
        header.metadata.write(
            &mut file,
            header_partition,
            Filler::Kag {
                reserve_min_bytes: config.reserve_min_bytes,
            },
        )?;
        let header_metadata_end = file.tell()?;

        index_segment.write_to_file(&mut file, header_partition)?;
        file.update_partitions()?;

        debug!(
            "Wrote header metadata {}..{}, essence starts at {}, content package size {}",
            header_metadata_start,
            header_metadata_end,
            file.tell()?,
            layout.content_package_size()
        );

        Ok(D10Writer {
            config,
            file,
            layout,
            essence_container,
            header: header.metadata,
            timecode_components: header.timecode_components,
            header_partition,
            header_metadata_start,
            header_metadata_end,
            index_segment,
            packer,
            content_package: ContentPackage::new(),
            buffered: Vec::new(),
            duration: 0,
            sequence_offset,
            offset_source,
            material_package_uid,
            file_package_uid,
        })
    }

    pub fn set_user_timecode(&mut self, timecode: Timecode) {
        self.content_package.set_user_timecode(timecode);
    }

    /// Timecode of the next content package, counted from the start
    /// timecode over written and buffered packages
    pub fn generate_user_timecode(&self) -> Timecode {
        Timecode::from_count(
            self.config.start_timecode + self.duration + self.buffered.len() as i64,
            self.config.timecode_base(),
            self.config.effective_drop_frame(),
        )
    }

    /// Set the encoded picture, zero-padded to the configured size
    pub fn set_video(&mut self, data: &[u8]) -> Result<()> {
        let encoded = self.config.encoded_picture_size as usize;
        if data.is_empty() || data.len() > encoded {
            return Err(MxfError::precondition(format!(
                "picture of {} bytes outside 1..={}",
                data.len(),
                encoded
            )));
        }
        self.content_package.set_video(data);
        self.content_package.pad_video(encoded);
        Ok(())
    }

    /// Number of audio samples expected in the next content package
    pub fn audio_sample_count(&self) -> u32 {
        let sequence = self.packer.sequence();
        match self.sequence_offset {
            None if sequence.len() > 1 => sequence.sample_count(self.buffered.len()),
            Some(offset) if sequence.len() > 1 && self.duration == 0 => {
                sequence.sample_count(offset as usize)
            }
            _ => sequence.sample_count(self.packer.sequence_index()),
        }
    }

    /// Set the little-endian PCM samples of `channel`
    pub fn set_audio(&mut self, channel: u32, data: &[u8]) -> Result<()> {
        if channel >= self.config.channel_count {
            return Err(MxfError::precondition(format!(
                "audio channel {} but only {} configured",
                channel, self.config.channel_count
            )));
        }
        self.content_package.set_audio(channel as usize, data)
    }

    /// Write the content package assembled with the setters and reset it
    pub fn write_content_package(&mut self) -> Result<()> {
        if !self
            .content_package
            .is_complete(self.config.channel_count as usize)
        {
            return Err(MxfError::precondition("content package is incomplete"));
        }
        let package = std::mem::take(&mut self.content_package);
        let result = self.write_package(Some(&package));
        self.content_package = package;
        self.content_package.reset();
        result
    }

    /// Write an externally assembled content package
    pub fn write_content_package_from(&mut self, package: &ContentPackage) -> Result<()> {
        if !package.is_complete(self.config.channel_count as usize) {
            return Err(MxfError::precondition("content package is incomplete"));
        }
        let encoded = self.config.encoded_picture_size as usize;
        if package.video().len() > encoded {
            return Err(MxfError::precondition(format!(
                "picture of {} bytes exceeds {}",
                package.video().len(),
                encoded
            )));
        }
        if package.video().len() < encoded {
            let mut padded = package.clone();
            padded.pad_video(encoded);
            return self.write_package(Some(&padded));
        }
        self.write_package(Some(package))
    }

    fn detect_sequence_offset(&mut self, next: Option<&ContentPackage>) {
        let bytes_per_sample = self.packer.bytes_per_sample();
        let buffered: Vec<u32> = self
            .buffered
            .iter()
            .map(|p| p.audio_sample_count(bytes_per_sample))
            .collect();
        let next = next.map(|p| p.audio_sample_count(bytes_per_sample));

        let matches = matching_sequence_offsets(self.packer.sequence(), &buffered, next);
        let offset = match matches.as_slice() {
            [offset] => {
                debug!("Detected audio sequence offset {}", offset);
                self.offset_source = SequenceOffsetSource::Detected;
                *offset
            }
            [] => {
                warn!(
                    "No audio sequence offset matches sample counts {:?}, using 0",
                    buffered
                );
                self.offset_source = SequenceOffsetSource::Fallback;
                0
            }
            [offset, ..] => {
                warn!(
                    "Audio sequence offsets {:?} all match sample counts {:?}, using {}",
                    matches, buffered, offset
                );
                self.offset_source = SequenceOffsetSource::Ambiguous;
                *offset
            }
        };
        self.sequence_offset = Some(offset);
        self.packer.set_sequence_index(offset as usize);
        for buffered in &self.buffered {
            self.packer.update(buffered);
        }
    }

    /// Stop buffering and resolve the audio sequence offset from the
    /// content packages received so far, writing those whose audio is
    /// complete. Does nothing once the offset is known.
    pub fn resolve_buffered_sequence_offset(&mut self) -> Result<()> {
        if self.sequence_offset.is_some() || self.buffered.is_empty() {
            return Ok(());
        }
        self.detect_sequence_offset(None);
        self.write_complete_packages(None)
    }

    /// Pack the audio of `package` and write every content package whose
    /// AES-3 block is complete. `None` flushes the last, possibly short,
    /// block.
    fn write_package(&mut self, package: Option<&ContentPackage>) -> Result<()> {
        if self.config.channel_count > 0 {
            if self.packer.sequence().len() > 1 && self.sequence_offset.is_none() {
                if let Some(package) = package {
                    if self.buffered.len() < self.packer.sequence().len() {
                        self.buffered.push(package.clone());
                        return Ok(());
                    }
                }
                self.detect_sequence_offset(package);
            }

            match package {
                Some(package) => self.packer.update(package),
                None => self.packer.final_update(),
            }
        } else {
            self.packer.fill_silent_front();
        }
        self.write_complete_packages(package)
    }

    /// Write buffered packages, then `package`, for as many as there are
    /// complete AES-3 blocks. Packages left over are buffered.
    fn write_complete_packages(&mut self, package: Option<&ContentPackage>) -> Result<()> {
        let complete = self.packer.complete_block_count();
        let mut write_count = self.buffered.len() + usize::from(package.is_some());
        let mut package = package;
        if write_count > complete {
            if let Some(package) = package.take() {
                self.buffered.push(package.clone());
            }
            write_count = complete;
        }
        if write_count == 0 {
            return Ok(());
        }

        for i in 0..write_count {
            let cp = match self.buffered.get(i).or(package) {
                Some(cp) => cp,
                None => break,
            };
            Self::write_items(
                &mut self.file,
                &self.layout,
                self.config.sample_rate,
                &self.essence_container,
                self.duration,
                cp,
                self.packer.front(),
            )?;
            self.packer.pop_front();
            self.duration += 1;
        }

        let written = write_count.min(self.buffered.len());
        self.buffered.drain(..written);
        Ok(())
    }

    fn write_items(
        file: &mut MxfFile<W>,
        layout: &D10Layout,
        sample_rate: D10SampleRate,
        essence_container: &UL,
        position: i64,
        package: &ContentPackage,
        aes3: &[u8],
    ) -> Result<()> {
        let kl_size = 16 + LLEN as u64;

        let mut system = Vec::with_capacity(layout.system_item_size as usize);
        let written = write_system_item(
            &mut system,
            sample_rate,
            position,
            essence_container,
            &package.user_timecode(),
        )?;
        file.write_all(&system)?;
        file.write_fill((layout.system_item_size - written) as u64)?;

        let video = package.video();
        file.write_kl(&labels::D10_PICTURE_ELEMENT, video.len() as u64)?;
        file.write_all(video)?;
        file.write_fill(layout.video_item_size as u64 - kl_size - video.len() as u64)?;

        file.write_kl(&labels::D10_AES3_ELEMENT, aes3.len() as u64)?;
        file.write_all(aes3)?;
        file.write_fill(layout.audio_item_size as u64 - kl_size - aes3.len() as u64)?;
        Ok(())
    }

    /// Set the start timecode of both timecode components. Takes effect
    /// when the header metadata is rewritten by [`D10Writer::complete`].
    pub fn update_start_timecode(&mut self, count: i64) {
        for id in self.timecode_components {
            self.header
                .set_mut(id)
                .set_i64(tags::TC_START_TIMECODE, count);
        }
    }

    /// Flush buffered content packages, write the footer, rewrite the
    /// header metadata and index with the final duration and return the
    /// underlying writer
    pub fn complete(mut self) -> Result<W> {
        if !self.buffered.is_empty() {
            self.write_package(None)?;
        }
        if !self.buffered.is_empty() {
            warn!(
                "Dropped {} content packages with an incomplete trailing audio block",
                self.buffered.len()
            );
            self.buffered.clear();
        }

        let mut footer = self.file.create_partition(PartitionKind::Footer);
        footer.status = PartitionStatus::ClosedComplete;
        self.file.write_partition(footer)?;

        self.header.update_durations(self.duration);
        self.index_segment.index_duration = self.duration;

        self.file.seek(self.header_metadata_start)?;
        self.header.write(
            &mut self.file,
            self.header_partition,
            Filler::ToPosition(self.header_metadata_end),
        )?;
        self.index_segment
            .write_to_file(&mut self.file, self.header_partition)?;

        self.file.seek_to_end()?;
        self.file.write_rip()?;
        self.file.update_partitions()?;
        self.file.flush()?;

        let size = self.file.size()?;
        info!(
            "Completed D-10 file: duration {}, size {}",
            self.duration, size
        );
        Ok(self.file.into_inner())
    }

    pub fn config(&self) -> &D10WriterConfig {
        &self.config
    }

    /// Content packages written so far
    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn file_size(&mut self) -> Result<u64> {
        self.file.size()
    }

    pub fn stored_width(&self) -> u32 {
        self.config.stored_width()
    }

    pub fn stored_height(&self) -> u32 {
        self.config.stored_height()
    }

    pub fn layout(&self) -> &D10Layout {
        &self.layout
    }

    pub fn content_package_size(&self) -> u32 {
        self.layout.content_package_size()
    }

    pub fn sequence_offset(&self) -> Option<u8> {
        self.sequence_offset
    }

    pub fn sequence_offset_source(&self) -> SequenceOffsetSource {
        self.offset_source
    }

    /// Content packages waiting for the audio sequence to resolve
    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }

    pub fn material_package_uid(&self) -> &Umid {
        &self.material_package_uid
    }

    pub fn file_package_uid(&self) -> &Umid {
        &self.file_package_uid
    }

    pub fn header_metadata(&self) -> &HeaderMetadata {
        &self.header
    }
}

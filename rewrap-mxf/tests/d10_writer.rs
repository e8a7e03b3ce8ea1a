//! End-to-end D-10 OP-1A writing into memory and onto disk.

use pretty_assertions::assert_eq;
use rewrap_mxf::{
    labels, tags, ContentPackage, D10SampleRate, D10Writer, D10WriterConfig, IndexTableSegment,
    KlvReader, MetadataSet, MxfError, Partition, PartitionKind, RandomIndexPack, SequenceOffset,
    SequenceOffsetSource, KAG_SIZE,
};
use std::io::Cursor;

/// Positions and packs recovered from a completed file
struct ParsedFile {
    header: Partition,
    footer: Partition,
    index: IndexTableSegment,
    sets: Vec<MetadataSet>,
    essence_start: usize,
    rip: RandomIndexPack,
}

fn parse_file(data: &[u8]) -> ParsedFile {
    let header = Partition::parse(data).unwrap();
    let metadata_start = KAG_SIZE as usize;
    let index_start = metadata_start + header.header_byte_count as usize;

    let mut sets = Vec::new();
    let mut reader = KlvReader::new(&data[..index_start]);
    reader.seek(metadata_start);
    while let Some(klv) = reader.read_non_fill().unwrap() {
        if klv.key.0 != labels::PRIMER_PACK {
            sets.push(MetadataSet::parse(klv.key.0, klv.value).unwrap());
        }
    }

    let mut reader = KlvReader::new(data);
    reader.seek(index_start);
    let klv = reader.read_klv().unwrap().unwrap();
    assert_eq!(klv.key.0, labels::INDEX_TABLE_SEGMENT);
    let index = IndexTableSegment::parse(klv.value).unwrap();

    let footer = Partition::parse(&data[header.footer_partition as usize..]).unwrap();
    let rip = RandomIndexPack::parse(data).unwrap();

    ParsedFile {
        essence_start: index_start + header.index_byte_count as usize,
        header,
        footer,
        index,
        sets,
        rip,
    }
}

/// System metadata pack, picture and AES-3 values of one content package
fn content_package(data: &[u8], offset: usize) -> (&[u8], &[u8], &[u8]) {
    let mut reader = KlvReader::new(data);
    reader.seek(offset);

    let system = reader.read_klv().unwrap().unwrap();
    assert_eq!(system.key.0, labels::SYSTEM_METADATA_PACK);
    let package_set = reader.read_klv().unwrap().unwrap();
    assert_eq!(package_set.key.0, labels::PACKAGE_METADATA_SET);

    let picture = reader.read_non_fill().unwrap().unwrap();
    assert_eq!(picture.key.0, labels::D10_PICTURE_ELEMENT);
    let audio = reader.read_non_fill().unwrap().unwrap();
    assert_eq!(audio.key.0, labels::D10_AES3_ELEMENT);

    (system.value, picture.value, audio.value)
}

fn aes3_sample_count(block: &[u8]) -> u32 {
    u16::from_le_bytes([block[1], block[2]]) as u32
}

fn config_525(channels: u32, offset: SequenceOffset) -> D10WriterConfig {
    D10WriterConfig {
        sample_rate: D10SampleRate::Rate525_60i,
        channel_count: channels,
        quantization_bits: 16,
        sequence_offset: offset,
        encoded_picture_size: 208_541,
        deterministic: true,
        ..Default::default()
    }
}

fn write_package(writer: &mut D10Writer<Cursor<Vec<u8>>>, channels: u32, samples: usize) {
    let timecode = writer.generate_user_timecode();
    writer.set_user_timecode(timecode);
    writer.set_video(&[0x42; 1000]).unwrap();
    let bytes_per_sample = (writer.config().quantization_bits as usize + 7) / 8;
    for channel in 0..channels {
        writer
            .set_audio(channel, &vec![channel as u8; samples * bytes_per_sample])
            .unwrap();
    }
    writer.write_content_package().unwrap();
}

#[test]
fn test_25fps_four_channels_ten_frames() {
    let config = D10WriterConfig {
        channel_count: 4,
        deterministic: true,
        ..Default::default()
    };
    let mut writer = D10Writer::new(Cursor::new(Vec::new()), config).unwrap();
    assert_eq!(writer.sequence_offset(), Some(0));
    assert_eq!(writer.content_package_size(), 312_832);
    assert_eq!(writer.stored_width(), 720);
    assert_eq!(writer.stored_height(), 304);

    for frame in 0..10u8 {
        let timecode = writer.generate_user_timecode();
        writer.set_user_timecode(timecode);
        writer.set_video(&vec![frame + 1; 200_000]).unwrap();
        for channel in 0..4 {
            writer.set_audio(channel, &vec![0; 1920 * 3]).unwrap();
        }
        writer.write_content_package().unwrap();
        assert_eq!(writer.duration(), frame as i64 + 1);
    }
    let data = writer.complete().unwrap().into_inner();
    let file = parse_file(&data);

    assert_eq!(file.header.kag_size, 0x200);
    assert_eq!(file.header.index_sid, 1);
    assert_eq!(file.header.body_sid, 2);
    assert_eq!(file.header.pack_ul(), labels::HEADER_PARTITION_CLOSED_COMPLETE);
    assert_eq!(file.footer.kind, PartitionKind::Footer);
    assert_eq!(file.footer.pack_ul(), labels::FOOTER_PARTITION_CLOSED_COMPLETE);

    assert_eq!(file.index.index_duration, 10);
    assert_eq!(file.index.edit_unit_byte_count, 312_832);
    let deltas: Vec<u32> = file.index.delta_entries.iter().map(|d| d.element_delta).collect();
    assert_eq!(deltas, vec![0, 512, 512 + 250_368]);

    assert_eq!(file.essence_start % 0x200, 0);
    assert_eq!(
        file.footer.this_partition as usize,
        file.essence_start + 10 * 312_832
    );
    assert_eq!(file.header.footer_partition, file.footer.this_partition);

    for i in 0..10usize {
        let (system, picture, audio) = content_package(&data, file.essence_start + i * 312_832);
        assert_eq!(&system[..2], &[0x5C, 0x04]);
        assert_eq!(u16::from_be_bytes([system[5], system[6]]), i as u16);
        assert_eq!(system[40], 0x81);
        assert_eq!(system[41], i as u8);

        assert_eq!(picture.len(), 250_000);
        assert!(picture[..200_000].iter().all(|&b| b == i as u8 + 1));
        assert!(picture[200_000..].iter().all(|&b| b == 0));

        assert_eq!(audio.len(), 4 + 1920 * 32);
        assert_eq!(&audio[..4], &[0x00, 0x80, 0x07, 0x0F]);
    }

    let durations: Vec<i64> = file
        .sets
        .iter()
        .filter_map(|s| {
            s.get_i64(tags::COMPONENT_DURATION)
                .or_else(|| s.get_i64(tags::DESC_CONTAINER_DURATION))
        })
        .collect();
    // 3 tracks with a sequence and a component in each package, plus the
    // multiple, picture and sound descriptors
    assert_eq!(durations.len(), 15);
    assert!(durations.iter().all(|&d| d == 10));

    assert_eq!(file.rip.entries.len(), 2);
    assert_eq!(file.rip.entries[0].byte_offset, 0);
    assert_eq!(file.rip.entries[0].body_sid, 2);
    assert_eq!(file.rip.entries[1].byte_offset, file.footer.this_partition);
}

#[test]
fn test_2997fps_one_channel_offset_two() {
    let mut writer = D10Writer::new(
        Cursor::new(Vec::new()),
        config_525(1, SequenceOffset::Fixed(2)),
    )
    .unwrap();
    assert_eq!(writer.sequence_offset(), Some(2));
    assert_eq!(
        writer.sequence_offset_source(),
        SequenceOffsetSource::Configured
    );

    let mut counts = Vec::new();
    for _ in 0..10 {
        let samples = writer.audio_sample_count();
        counts.push(samples);
        write_package(&mut writer, 1, samples as usize);
        assert_eq!(writer.buffered_count(), 0);
    }
    assert_eq!(
        counts,
        vec![1602, 1601, 1602, 1602, 1601, 1602, 1601, 1602, 1602, 1601]
    );

    let size = writer.content_package_size() as usize;
    let data = writer.complete().unwrap().into_inner();
    let file = parse_file(&data);
    assert_eq!(file.index.index_duration, 10);
    assert_eq!(file.index.index_edit_rate.numerator, 30000);
    assert_eq!(file.index.index_edit_rate.denominator, 1001);

    let mut cycle = 0;
    for i in 0..10usize {
        let (system, _, audio) = content_package(&data, file.essence_start + i * size);
        assert_eq!(system[1], 0x07);
        assert_eq!(audio[0] as usize, (i + 2) % 5);
        assert_eq!(audio[3], 0x01);
        assert_eq!(aes3_sample_count(audio), counts[i]);
        assert_eq!(audio.len(), 4 + counts[i] as usize * 32);
        if i < 5 {
            cycle += aes3_sample_count(audio);
        }
    }
    assert_eq!(cycle, 8008);
}

#[test]
fn test_offset_two_with_spilling_samples() {
    let mut writer = D10Writer::new(
        Cursor::new(Vec::new()),
        config_525(1, SequenceOffset::Fixed(2)),
    )
    .unwrap();
    for (i, samples) in [1602, 1601, 1602, 1601, 1602].into_iter().enumerate() {
        write_package(&mut writer, 1, samples);
        // the fourth package leaves its block one sample short
        assert_eq!(writer.buffered_count(), usize::from(i == 3));
    }
    assert_eq!(writer.duration(), 5);
    assert_eq!(writer.buffered_count(), 0);

    let size = writer.content_package_size() as usize;
    let data = writer.complete().unwrap().into_inner();
    let file = parse_file(&data);
    assert_eq!(file.index.index_duration, 5);
    let counts: Vec<u32> = (0..5)
        .map(|i| aes3_sample_count(content_package(&data, file.essence_start + i * size).2))
        .collect();
    assert_eq!(counts, vec![1602, 1601, 1602, 1602, 1601]);
}

#[test]
fn test_any_fixed_offset_completes_a_cycle() {
    for offset in 0..5u8 {
        let mut writer = D10Writer::new(
            Cursor::new(Vec::new()),
            config_525(2, SequenceOffset::Fixed(offset)),
        )
        .unwrap();
        let mut total = 0;
        for _ in 0..5 {
            let samples = writer.audio_sample_count();
            total += samples;
            write_package(&mut writer, 2, samples as usize);
        }
        assert_eq!(total, 8008);
        assert_eq!(writer.duration(), 5);
        assert_eq!(writer.buffered_count(), 0);
    }
}

#[test]
fn test_sequence_offset_detected() {
    let sequence = [1602u32, 1601, 1602, 1601, 1602];
    let phase = 3;
    let mut writer =
        D10Writer::new(Cursor::new(Vec::new()), config_525(2, SequenceOffset::Auto)).unwrap();
    assert_eq!(writer.sequence_offset(), None);

    for i in 0..12usize {
        write_package(&mut writer, 2, sequence[(i + phase) % 5] as usize);
        if i < 5 {
            assert_eq!(writer.buffered_count(), i + 1);
            assert_eq!(writer.duration(), 0);
        }
    }
    assert_eq!(writer.sequence_offset(), Some(3));
    assert_eq!(
        writer.sequence_offset_source(),
        SequenceOffsetSource::Detected
    );
    assert_eq!(writer.buffered_count(), 0);
    assert_eq!(writer.duration(), 12);

    let size = writer.content_package_size() as usize;
    let data = writer.complete().unwrap().into_inner();
    let file = parse_file(&data);
    for i in 0..12usize {
        let (_, _, audio) = content_package(&data, file.essence_start + i * size);
        assert_eq!(audio[0] as usize, (i + phase) % 5);
        assert_eq!(aes3_sample_count(audio), sequence[(i + phase) % 5]);
    }
}

#[test]
fn test_short_clip_flushed_on_complete() {
    let sequence = [1602u32, 1601, 1602, 1601, 1602];
    let mut writer =
        D10Writer::new(Cursor::new(Vec::new()), config_525(1, SequenceOffset::Auto)).unwrap();
    for i in 0..3usize {
        write_package(&mut writer, 1, sequence[(i + 1) % 5] as usize);
    }
    assert_eq!(writer.buffered_count(), 3);

    let data = writer.complete().unwrap().into_inner();
    let file = parse_file(&data);
    assert_eq!(file.index.index_duration, 3);
    let (_, _, audio) = content_package(&data, file.essence_start);
    assert_eq!(audio[0], 1);
}

#[test]
fn test_unmatched_sample_counts_fall_back() {
    let mut writer =
        D10Writer::new(Cursor::new(Vec::new()), config_525(1, SequenceOffset::Auto)).unwrap();
    for _ in 0..6 {
        write_package(&mut writer, 1, 1600);
    }
    assert_eq!(writer.sequence_offset(), Some(0));
    assert_eq!(
        writer.sequence_offset_source(),
        SequenceOffsetSource::Fallback
    );
    // 9600 samples fill one cycle of 8008 and leave a short block
    assert_eq!(writer.duration(), 5);
    assert_eq!(writer.buffered_count(), 1);

    let data = writer.complete().unwrap().into_inner();
    let file = parse_file(&data);
    assert_eq!(file.index.index_duration, 5);
}

#[test]
fn test_single_package_clip_offset_ambiguous() {
    let mut writer =
        D10Writer::new(Cursor::new(Vec::new()), config_525(1, SequenceOffset::Auto)).unwrap();
    write_package(&mut writer, 1, 1602);
    assert_eq!(writer.sequence_offset_source(), SequenceOffsetSource::Pending);
    assert_eq!(writer.buffered_count(), 1);

    // 1602 samples fit phases 0, 2 and 4
    writer.resolve_buffered_sequence_offset().unwrap();
    assert_eq!(writer.sequence_offset_source(), SequenceOffsetSource::Ambiguous);
    assert_eq!(writer.sequence_offset(), Some(0));
    assert_eq!(writer.buffered_count(), 0);
    assert_eq!(writer.duration(), 1);

    let data = writer.complete().unwrap().into_inner();
    let file = parse_file(&data);
    assert_eq!(file.index.index_duration, 1);
    let (_, _, audio) = content_package(&data, file.essence_start);
    assert_eq!(aes3_sample_count(audio), 1602);
}

#[test]
fn test_short_run_offset_detected() {
    let mut writer =
        D10Writer::new(Cursor::new(Vec::new()), config_525(1, SequenceOffset::Auto)).unwrap();
    for samples in [1601, 1602, 1601] {
        write_package(&mut writer, 1, samples);
    }
    writer.resolve_buffered_sequence_offset().unwrap();
    assert_eq!(writer.sequence_offset_source(), SequenceOffsetSource::Detected);
    assert_eq!(writer.sequence_offset(), Some(1));
    assert_eq!(writer.buffered_count(), 0);
    assert_eq!(writer.duration(), 3);

    // Already resolved
    writer.resolve_buffered_sequence_offset().unwrap();
    assert_eq!(writer.sequence_offset_source(), SequenceOffsetSource::Detected);
}

#[test]
fn test_short_picture_padded() {
    let mut writer =
        D10Writer::new(Cursor::new(Vec::new()), config_525(2, SequenceOffset::Fixed(0))).unwrap();
    let encoded = writer.config().encoded_picture_size as usize;
    let size = writer.content_package_size() as usize;

    for samples in [1602usize, 1601] {
        let mut package = ContentPackage::new();
        package.set_video(&[0x42; 1000]);
        for channel in 0..2 {
            package.set_audio(channel, &vec![0; samples * 2]).unwrap();
        }
        writer.write_content_package_from(&package).unwrap();
    }
    assert_eq!(writer.duration(), 2);

    let data = writer.complete().unwrap().into_inner();
    let file = parse_file(&data);
    assert_eq!(file.index.edit_unit_byte_count as usize, size);
    assert_eq!(file.header.footer_partition as usize, file.essence_start + 2 * size);
    for i in 0..2 {
        let (_, picture, _) = content_package(&data, file.essence_start + i * size);
        assert_eq!(picture.len(), encoded);
        assert!(picture[..1000].iter().all(|&b| b == 0x42));
        assert!(picture[1000..].iter().all(|&b| b == 0));
    }
}

#[test]
fn test_oversized_picture_rejected() {
    let mut writer =
        D10Writer::new(Cursor::new(Vec::new()), config_525(0, SequenceOffset::Fixed(0))).unwrap();
    let encoded = writer.config().encoded_picture_size as usize;

    let mut package = ContentPackage::new();
    package.set_video(&vec![0x42; encoded + 1]);
    assert!(matches!(
        writer.write_content_package_from(&package),
        Err(MxfError::Precondition { .. })
    ));
    assert_eq!(writer.duration(), 0);

    package.set_video(&vec![0x42; encoded]);
    writer.write_content_package_from(&package).unwrap();
    assert_eq!(writer.duration(), 1);
}

#[test]
fn test_last_block_padded_with_silence() {
    let mut writer = D10Writer::new(
        Cursor::new(Vec::new()),
        config_525(1, SequenceOffset::Fixed(0)),
    )
    .unwrap();
    write_package(&mut writer, 1, 1602);
    write_package(&mut writer, 1, 1599);
    assert_eq!(writer.duration(), 1);
    assert_eq!(writer.buffered_count(), 1);

    let size = writer.content_package_size() as usize;
    let data = writer.complete().unwrap().into_inner();
    let file = parse_file(&data);
    assert_eq!(file.index.index_duration, 2);

    let (_, _, audio) = content_package(&data, file.essence_start + size);
    assert_eq!(aes3_sample_count(audio), 1601);
    assert_eq!(audio.len(), 4 + 1601 * 32);
    let last = &audio[audio.len() - 32..];
    assert_eq!(&last[..8], &[0, 0, 0, 0, 1, 0, 0, 0]);
}

#[test]
fn test_no_audio_channels() {
    let mut writer =
        D10Writer::new(Cursor::new(Vec::new()), config_525(0, SequenceOffset::Auto)).unwrap();
    for _ in 0..6 {
        write_package(&mut writer, 0, 0);
    }
    assert_eq!(writer.duration(), 6);

    let size = writer.content_package_size() as usize;
    let data = writer.complete().unwrap().into_inner();
    let file = parse_file(&data);
    for i in 0..6usize {
        let (_, _, audio) = content_package(&data, file.essence_start + i * size);
        assert_eq!(audio[0] as usize, i % 5);
        assert_eq!(audio[3], 0x00);
        assert_eq!(audio.len(), 4 + aes3_sample_count(audio) as usize * 32);
    }
}

#[test]
fn test_header_rewrite_keeps_layout() {
    let config = D10WriterConfig {
        channel_count: 2,
        reserve_min_bytes: 4096,
        deterministic: true,
        ..Default::default()
    };
    let mut writer = D10Writer::new(Cursor::new(Vec::new()), config).unwrap();
    let essence_start = writer.file_size().unwrap();
    write_package(&mut writer, 2, 1920);
    writer.update_start_timecode(25 * 3600);

    let data = writer.complete().unwrap().into_inner();
    let file = parse_file(&data);
    assert_eq!(file.essence_start as u64, essence_start);
    assert!(file.header.header_byte_count >= 4096);
    assert_eq!(file.header.header_byte_count % 0x200, 0);

    let starts: Vec<i64> = file
        .sets
        .iter()
        .filter_map(|s| s.get_i64(tags::TC_START_TIMECODE))
        .collect();
    assert_eq!(starts, vec![90_000, 90_000]);
}

#[test]
fn test_deterministic_output() {
    let run = || {
        let mut writer = D10Writer::new(
            Cursor::new(Vec::new()),
            config_525(2, SequenceOffset::Auto),
        )
        .unwrap();
        for _ in 0..7 {
            let samples = writer.audio_sample_count() as usize;
            write_package(&mut writer, 2, samples);
        }
        writer.complete().unwrap().into_inner()
    };
    assert!(run() == run());
}

#[test]
fn test_create_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("d10.mxf");

    let config = D10WriterConfig {
        channel_count: 1,
        quantization_bits: 16,
        ..Default::default()
    };
    let mut writer = D10Writer::create(&path, config).unwrap();
    let essence_start = writer.file_size().unwrap();
    for _ in 0..3 {
        writer.set_video(&[7; 100]).unwrap();
        writer.set_audio(0, &[0; 1920 * 2]).unwrap();
        writer.write_content_package().unwrap();
    }
    assert_eq!(
        writer.file_size().unwrap(),
        essence_start + 3 * writer.content_package_size() as u64
    );
    assert!(!writer.material_package_uid().is_zero());
    assert!(writer.material_package_uid() != writer.file_package_uid());
    drop(writer.complete().unwrap());

    let data = std::fs::read(&path).unwrap();
    let file = parse_file(&data);
    assert_eq!(file.index.index_duration, 3);
    assert_eq!(file.essence_start as u64, essence_start);
}

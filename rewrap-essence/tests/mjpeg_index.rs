//! Frame offset indexing of Avid MJPEG essence read from a file.

use pretty_assertions::assert_eq;
use rewrap_essence::{
    ByteBuffer, EssenceDescriptor, EssenceParser, EssenceType, ParserOptions, PictureGeometry,
};
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

fn jpeg(payload: &[u8]) -> Vec<u8> {
    let mut image = vec![0xff, 0xd8, 0xff, 0xe0];
    image.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    image.extend_from_slice(payload);
    image.extend_from_slice(&[0xff, 0xd9]);
    image
}

fn single_field_geometry() -> EssenceDescriptor {
    EssenceDescriptor::Picture(PictureGeometry {
        stored_width: 720,
        stored_height: 296,
        horizontal_subsampling: 2,
        vertical_subsampling: 1,
        frame_layout: Some(1),
        resolution_id: Some(0x4e),
        ..Default::default()
    })
}

#[test]
fn test_two_images_from_file() {
    let image1 = jpeg(&[0x11; 5000]);
    let image2 = jpeg(&[0x22; 30]);

    let mut file = tempfile::tempfile().unwrap();
    // leading header bytes that are not part of the essence
    file.write_all(&[0xaa; 64]).unwrap();
    file.write_all(&image1).unwrap();
    file.write_all(&image2).unwrap();
    file.seek(SeekFrom::Start(64)).unwrap();

    let mut parser: EssenceParser<File> = EssenceParser::create(
        file,
        &EssenceType::AvidMjpeg.label(),
        &single_field_geometry(),
        ParserOptions::default(),
    )
    .unwrap();
    assert!(matches!(parser, EssenceParser::Variable(_)));

    let mut buf = ByteBuffer::new();
    assert!(parser.seek(1).unwrap());
    assert_eq!(parser.essence_offset(), image1.len() as i64);
    assert_eq!(parser.read(&mut buf).unwrap(), Some(1));
    assert_eq!(buf.as_slice(), image2.as_slice());

    if let EssenceParser::Variable(p) = &parser {
        let expected = vec![0, image1.len() as i64, (image1.len() + image2.len()) as i64];
        assert_eq!(p.index().offsets().to_vec(), expected);
    }

    assert_eq!(parser.determine_duration().unwrap(), 2);
    assert!(parser.seek(0).unwrap());
    assert_eq!(parser.read(&mut buf).unwrap(), Some(1));
    assert_eq!(buf.as_slice(), image1.as_slice());
}

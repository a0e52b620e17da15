use std::io::Cursor;

use binrw::BinRead;
use img_archive::{
    error::Error,
    types::{DirectoryRow, PackageHeader},
    Element, ElementData, ElementKind, FileWindow, Object, Package, Tag, Value,
};
use pretty_assertions::assert_eq;
use tracing::info;
use tracing_test::traced_test;

fn directory(bytes: &[u8]) -> Result<Vec<DirectoryRow>, Error> {
    let mut cursor = Cursor::new(bytes);
    let header = PackageHeader::read(&mut cursor)?;
    let rows = (0..header.entry_count)
        .map(|_| DirectoryRow::read(&mut cursor))
        .collect::<binrw::BinResult<Vec<_>>>()?;
    Ok(rows)
}

fn character() -> Object {
    let mut face = Object::new();
    face.insert("tex".into(), "face_tex".into());
    face.insert("smes".into(), "face_mesh".into());

    let mut part = Object::new();
    part.insert("bone".into(), "spine01".into());
    part.insert("offset".into(), vec![0.0f32, 1.5, -2.25].into());

    let mut object = Object::new();
    object.insert("name".into(), "player".into());
    object.insert("visible".into(), true.into());
    object.insert("face".into(), face.into());
    object.insert(
        "parts".into(),
        Value::Array(vec![part.clone().into(), part.into()]),
    );
    object.insert(
        "texi".into(),
        vec!["face_tex", "body_tex"].into(),
    );
    object
}

fn build() -> Result<Package, Error> {
    let mut package = Package::new(true);

    // Slots referenced from the SERI record come first so they exist before encoding
    for (tag, name, compressed, data) in [
        (Tag::TEXTURE, "face_tex", true, ElementData::Bytes(vec![0x11; 0x240])),
        (Tag::TEXTURE, "body_tex", false, ElementData::Bytes(vec![0x22; 0x90])),
        (Tag(*b"SMES"), "face_mesh", true, ElementData::Bytes(vec![0x33; 0x51])),
        (Tag::EMPTY, "spine01", false, ElementData::Empty),
        (Tag::ARCHIVE, "nested", true, ElementData::Bytes(vec![0x44; 0x1000])),
        (Tag(*b"WAV "), "voice", false, ElementData::Bytes((0..=200).collect())),
    ] {
        package.add_element(
            Element::builder()
                .tag(tag)
                .name(name)
                .compressed(compressed)
                .data(data)
                .build(),
        )?;
    }

    let mut greeting = Element::builder()
        .tag(Tag::TEXT)
        .name("greeting")
        .compressed(true)
        .data(ElementData::Empty)
        .build();
    greeting.set_text("こんにちは")?;
    package.add_element(greeting)?;

    package.add_element(
        Element::builder()
            .tag(Tag(*b"MDL "))
            .name("player")
            .flags(0x10)
            .data(ElementData::Seri(character()))
            .build(),
    )?;

    Ok(package)
}

#[traced_test]
#[test]
fn every_kind_round_trips() -> Result<(), Error> {
    let mut package = build()?;
    let bytes = package.to_bytes()?;
    info!("package is {} bytes", bytes.len());

    let mut parsed = Package::parse(FileWindow::from_bytes(bytes.clone()))?;
    assert_eq!(parsed.len(), package.len());

    for (expected, actual) in package.elements().iter().zip(parsed.elements()) {
        assert_eq!(expected.name(), actual.name());
        assert_eq!(expected.tag(), actual.tag());
        assert_eq!(expected.flags(), actual.flags());
        if expected.kind() == ElementKind::Seri {
            assert_eq!(expected.value(), actual.value());
        } else {
            assert_eq!(expected.read()?, actual.read()?);
        }
    }

    assert_eq!(parsed.to_bytes()?, bytes);

    Ok(())
}

#[test]
fn greeting_keeps_legacy_bytes() -> Result<(), Error> {
    let mut package = build()?;
    let parsed = Package::parse(FileWindow::from_bytes(package.to_bytes()?))?;

    let greeting = parsed.by_name("greeting")?;
    assert_eq!(greeting.kind(), ElementKind::Text);
    assert_eq!(greeting.text()?, "こんにちは");
    assert_eq!(
        greeting.read()?,
        vec![0x82, 0xB1, 0x82, 0xF1, 0x82, 0xC9, 0x82, 0xBF, 0x82, 0xCD]
    );

    Ok(())
}

#[test]
fn large_kinds_are_aligned() -> Result<(), Error> {
    let mut package = build()?;
    let bytes = package.to_bytes()?;
    let rows = directory(&bytes)?;

    for (row, element) in rows.iter().zip(package.elements()) {
        if element.kind().is_large() {
            assert_eq!(row.decompressed_offset % 0x80, 0, "{}", element.name());
        }
        if element.kind() == ElementKind::Seri {
            assert!(row.decompressed_offset < package.decompressed_data_offset());
        } else {
            assert!(row.decompressed_offset >= package.decompressed_data_offset());
        }
    }

    // Logical ranges never overlap
    let mut ranges = rows
        .iter()
        .filter(|r| r.decompressed_length > 0)
        .map(|r| (r.decompressed_offset, r.decompressed_offset + r.decompressed_length))
        .collect::<Vec<_>>();
    ranges.sort();
    for pair in ranges.windows(2) {
        assert!(pair[0].1 <= pair[1].0);
    }

    Ok(())
}

#[test]
fn slot_references_follow_renames() -> Result<(), Error> {
    let mut package = build()?;
    let parsed = Package::parse(FileWindow::from_bytes(package.to_bytes()?))?;

    let player = parsed.by_name("player")?;
    let value = player.value().ok_or(Error::CustomError("no value".into()))?;
    let keys = value.keys().map(String::as_str).collect::<Vec<_>>();
    assert_eq!(keys, vec!["name", "visible", "face", "parts", "texi"]);

    let face = value["face"]
        .as_object()
        .ok_or(Error::CustomError("face is not an object".into()))?;
    assert_eq!(face["tex"].as_str(), Some("face_tex"));
    assert_eq!(
        value["parts"].as_array().map(|p| p.len()),
        Some(2)
    );

    Ok(())
}

#[test]
fn unknown_slot_reference_fails_write() -> Result<(), Error> {
    let mut object = Object::new();
    object.insert("smat".into(), "never_added".into());

    let mut package = Package::new(false);
    package.add_element(
        Element::builder()
            .tag(Tag(*b"YAML"))
            .name("config")
            .data(ElementData::Seri(object))
            .build(),
    )?;

    assert!(matches!(package.to_bytes(), Err(Error::NotFound(_))));

    Ok(())
}

#[test]
fn edits_are_written_back() -> Result<(), Error> {
    let mut package = build()?;
    let mut parsed = Package::parse(FileWindow::from_bytes(package.to_bytes()?))?;

    parsed.by_name_mut("voice")?.set_bytes(b"replaced".to_vec());
    parsed.by_name_mut("nested")?.set_compressed(false);
    if let Some(value) = parsed.by_name_mut("player")?.value_mut() {
        value.insert("level".into(), Value::UInt(42));
    }

    let reparsed = Package::parse(FileWindow::from_bytes(parsed.to_bytes()?))?;
    assert_eq!(reparsed.by_name("voice")?.read()?, b"replaced".to_vec());
    assert!(!reparsed.by_name("nested")?.is_compressed());
    assert_eq!(reparsed.by_name("nested")?.read()?, vec![0x44; 0x1000]);
    assert_eq!(
        reparsed
            .by_name("player")?
            .value()
            .and_then(|v| v.get("level"))
            .and_then(Value::as_u32),
        Some(42)
    );

    Ok(())
}

//! Entries stored inside a PACK container
//!

use std::io::{Cursor, Read};

use bon::Builder;
use tracing::instrument;

use crate::compression::{self, ElementReader};
use crate::error::{Error, Result};
use crate::text;
use crate::types::Tag;
use crate::value::Object;
use crate::window::FileWindow;

/// The kind of an element, decided once from its tag
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ElementKind {
    /// SERI record (`TEXI`, `YAML`, `MDL `)
    Seri,
    /// Placeholder without content (`"    "`)
    Empty,
    /// Shift_JIS text (`TXT `)
    Text,
    /// Texture blob (`TEX `)
    Texture,
    /// Geometry blob (`SMES`, `SMAT`)
    Geometry,
    /// Nested archive blob (`ARC `)
    Archive,
    /// Anything else
    Opaque,
}

impl ElementKind {
    pub fn from_tag(tag: Tag) -> Self {
        match tag.as_bytes() {
            b"TEXI" | b"YAML" | b"MDL " => ElementKind::Seri,
            b"    " => ElementKind::Empty,
            b"TXT " => ElementKind::Text,
            b"TEX " => ElementKind::Texture,
            b"SMES" | b"SMAT" => ElementKind::Geometry,
            b"ARC " => ElementKind::Archive,
            _ => ElementKind::Opaque,
        }
    }

    /// Large elements start on a 0x80 byte boundary in logical space
    pub fn is_large(&self) -> bool {
        matches!(
            self,
            ElementKind::Texture | ElementKind::Geometry | ElementKind::Archive
        )
    }
}

/// Bytes of an element exactly as they are laid out in the source file
#[derive(Debug, Clone)]
pub struct StoredData {
    pub window: FileWindow,
    /// Whether `window` holds a zlib stream
    pub compressed: bool,
    pub decompressed_len: u32,
}

/// Content of an element
#[derive(Debug, Clone)]
pub enum ElementData {
    Empty,
    Seri(Object),
    /// Read lazily from the source file
    Stored(StoredData),
    /// Decompressed content supplied by the caller
    Bytes(Vec<u8>),
}

/// A single named entry of a package
///
/// ```
/// use img_archive::{Element, ElementData, ElementKind, Tag};
///
/// let element = Element::builder()
///     .tag(Tag::TEXT)
///     .name("greeting")
///     .compressed(true)
///     .data(ElementData::Bytes(b"hello".to_vec()))
///     .build();
///
/// assert_eq!(element.kind(), ElementKind::Text);
/// assert_eq!(element.text()?, "hello");
/// # Ok::<(), img_archive::error::Error>(())
/// ```
#[derive(Debug, Clone, Builder)]
pub struct Element {
    tag: Tag,

    #[builder(into)]
    name: String,

    #[builder(default)]
    flags: u32,

    #[builder(default)]
    compressed: bool,

    data: ElementData,
}

impl Element {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn kind(&self) -> ElementKind {
        ElementKind::from_tag(self.tag)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u32) {
        self.flags = flags;
    }

    /// Whether this element is stored compressed when written
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    pub fn set_compressed(&mut self, compressed: bool) {
        self.compressed = compressed;
    }

    pub fn data(&self) -> &ElementData {
        &self.data
    }

    /// The decoded tree of a SERI element
    pub fn value(&self) -> Option<&Object> {
        match &self.data {
            ElementData::Seri(o) => Some(o),
            _ => None,
        }
    }

    pub fn value_mut(&mut self) -> Option<&mut Object> {
        match &mut self.data {
            ElementData::Seri(o) => Some(o),
            _ => None,
        }
    }

    /// Replace the content with a SERI tree
    pub fn set_value(&mut self, value: Object) {
        self.data = ElementData::Seri(value);
    }

    /// Replace the content with uncompressed bytes
    pub fn set_bytes(&mut self, data: Vec<u8>) {
        self.data = ElementData::Bytes(data);
    }

    /// Replace the content with text, stored in the legacy encoding
    pub fn set_text(&mut self, text: &str) -> Result<()> {
        self.data = ElementData::Bytes(text::encode(text)?);
        Ok(())
    }

    /// Open a reader over the decompressed content
    pub fn reader(&self) -> Result<ElementReader> {
        Ok(match &self.data {
            ElementData::Empty => ElementReader::Owned(Cursor::new(Vec::new())),
            ElementData::Bytes(b) => ElementReader::Owned(Cursor::new(b.clone())),
            ElementData::Stored(s) => ElementReader::new(s.window.clone(), s.compressed),
            ElementData::Seri(_) => {
                return Err(Error::UnexpectedPayload {
                    name: self.name.clone(),
                })
            }
        })
    }

    /// Read the decompressed content
    pub fn read(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        self.reader()?.read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Read the bytes as they are placed in a package, compressed when flagged
    pub fn read_stored(&self) -> Result<Vec<u8>> {
        Ok(self.stored_for_write()?.0)
    }

    /// Read the content as text
    pub fn text(&self) -> Result<String> {
        Ok(text::decode(&self.read()?))
    }

    /// Produce the bytes to place in a package and the decompressed length they stand for
    #[instrument(skip(self), err, fields(name = %self.name))]
    pub(crate) fn stored_for_write(&self) -> Result<(Vec<u8>, u32)> {
        if let ElementData::Stored(s) = &self.data {
            if s.compressed == self.compressed {
                return Ok((s.window.read_to_vec()?, s.decompressed_len));
            }
        }

        let content = self.read()?;
        let len = u32::try_from(content.len()).map_err(|_| Error::OffsetOverflow {
            field: "element length",
            value: content.len() as u64,
        })?;

        if self.compressed && !content.is_empty() {
            Ok((compression::compress(&content)?, len))
        } else {
            Ok((content, len))
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::compression;
    use crate::element::{Element, ElementData, ElementKind, StoredData};
    use crate::error::{Error, Result};
    use crate::types::Tag;
    use crate::value::Object;
    use crate::window::FileWindow;

    #[test]
    fn kinds_from_tags() {
        assert_eq!(ElementKind::from_tag(Tag(*b"MDL ")), ElementKind::Seri);
        assert_eq!(ElementKind::from_tag(Tag(*b"YAML")), ElementKind::Seri);
        assert_eq!(ElementKind::from_tag(Tag::EMPTY), ElementKind::Empty);
        assert_eq!(ElementKind::from_tag(Tag(*b"SMAT")), ElementKind::Geometry);
        assert_eq!(ElementKind::from_tag(Tag(*b"WAV ")), ElementKind::Opaque);
        assert!(ElementKind::Archive.is_large());
        assert!(!ElementKind::Text.is_large());
    }

    #[test]
    fn stored_compressed_text() -> Result<()> {
        let stored = compression::compress(&[0x82, 0xB1, 0x82, 0xF1])?;
        let window = FileWindow::from_bytes(stored.clone());

        let element = Element::builder()
            .tag(Tag::TEXT)
            .name("greeting")
            .compressed(true)
            .data(ElementData::Stored(StoredData {
                window,
                compressed: true,
                decompressed_len: 4,
            }))
            .build();

        assert_eq!(element.text()?, "こん");
        // Untouched stored data is copied as it is
        assert_eq!(element.read_stored()?, stored);
        assert_eq!(element.stored_for_write()?, (stored, 4));

        Ok(())
    }

    #[test]
    fn recompress_when_flag_changes() -> Result<()> {
        let mut element = Element::builder()
            .tag(Tag(*b"BIN "))
            .name("blob")
            .data(ElementData::Stored(StoredData {
                window: FileWindow::from_bytes(vec![1, 2, 3, 4, 5, 6]),
                compressed: false,
                decompressed_len: 6,
            }))
            .build();
        element.set_compressed(true);

        let (stored, len) = element.stored_for_write()?;
        assert_eq!(len, 6);
        assert_eq!(compression::decompress(&stored)?, vec![1, 2, 3, 4, 5, 6]);

        Ok(())
    }

    #[test]
    fn seri_has_no_raw_content() {
        let element = Element::builder()
            .tag(Tag(*b"YAML"))
            .name("config")
            .data(ElementData::Seri(Object::new()))
            .build();

        assert!(element.value().is_some());
        assert!(matches!(
            element.read(),
            Err(Error::UnexpectedPayload { .. })
        ));
    }
}

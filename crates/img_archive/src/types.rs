//! Base types for the on-disk structure of IMG archives and PACK containers.

use binrw::{BinRead, BinWrite};
use std::fmt;

/// Size of an IMG block, every IMG entry starts on a block boundary
pub const IMAGE_BLOCK_SIZE: u64 = 0x800;

/// Size of both the PACK header and of a single PACK directory row
pub const PACKAGE_ENTRY_SIZE: u64 = 0x20;

/// A four byte type tag, space padded
#[derive(BinRead, BinWrite, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[brw(little)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    /// Tag used by the IMG index for PACK containers
    pub const PACKAGE: Tag = Tag(*b"PAK ");

    /// All zero tag written for unused IMG slots
    pub const NONE: Tag = Tag([0; 4]);

    /// Tag of an element without content
    pub const EMPTY: Tag = Tag(*b"    ");

    /// Legacy encoded text
    pub const TEXT: Tag = Tag(*b"TXT ");

    /// Texture blob
    pub const TEXTURE: Tag = Tag(*b"TEX ");

    /// Nested archive blob
    pub const ARCHIVE: Tag = Tag(*b"ARC ");

    /// Get the raw bytes of the tag
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }
}

impl From<&[u8; 4]> for Tag {
    fn from(value: &[u8; 4]) -> Self {
        Tag(*value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02x}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag(\"{self}\")")
    }
}

/// IMG file header
///
/// Ten little endian integers, the first one always `0xA`. Only the data start block, the index
/// count and the offset table offset have a known meaning, the others are replayed as they were read.
#[derive(BinRead, BinWrite, Debug, Copy, Clone, PartialEq, Eq)]
#[brw(magic = 0xAu32, little)]
pub struct ImageHeader {
    /// The block holding the first entry
    pub data_start_block: u32,

    pub unknown_2: u32,

    pub unknown_3: u32,

    /// Number of rows in the index table
    pub index_count: u32,

    /// Offset of the offset table, relative to the start of the index table
    pub offset_table_offset: u32,

    pub unknown_6: u32,

    pub unknown_7: u32,

    pub unknown_8: u32,

    pub unknown_9: u32,
}

impl Default for ImageHeader {
    fn default() -> Self {
        Self {
            data_start_block: 0,
            unknown_2: 1,
            unknown_3: 0,
            index_count: 0,
            offset_table_offset: 0,
            unknown_6: 1,
            unknown_7: 0,
            unknown_8: 0,
            unknown_9: 0x276F4,
        }
    }
}

/// IMG index table row
///
/// One row per logical slot. For packages `length` is the decompressed length and `extra` the
/// decompressed data offset, for plain resources `length` is the stored size.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct IndexRow {
    pub tag: Tag,

    #[brw(pad_before = 4)]
    pub length: u32,

    pub extra: u32,

    #[brw(pad_before = 2)]
    pub flag3: u8,

    pub flag4: u8,
}

impl IndexRow {
    /// The row written for a slot without an entry
    pub fn vacant() -> Self {
        Self {
            flag4: 8,
            ..Default::default()
        }
    }
}

/// Header of the IMG offset table
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct OffsetTableHeader {
    #[brw(pad_before = 4)]
    pub entry_count: u32,

    /// Unexplained pointer, the game refuses to boot when it changes
    pub marker: u32,
}

/// IMG offset table row mapping a slot to the block its data starts in
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct OffsetRow {
    pub index: u32,

    pub block: u32,
}

/// PACK header
///
/// Starts with `PACK\n` followed by a variant byte which is either `0` or a space.
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(magic = b"PACK\n", little)]
pub struct PackageHeader {
    #[br(map = |b: u8| b == b'0')]
    #[bw(map = |v: &bool| if *v { b'0' } else { b' ' })]
    pub typ0: bool,

    pub entry_count: u16,

    /// Offset of the slot offset array, which directly follows the string table
    pub slot_table_offset: u32,

    pub string_table_offset: u32,

    /// First logical byte past the SERI region
    pub decompressed_data_offset: u32,

    /// Logical size of the whole container
    pub decompressed_length: u32,

    /// Physical size of the whole container
    pub compressed_length: u32,

    pub pad_length: u32,
}

/// PACK directory row
#[derive(BinRead, BinWrite, Debug, Default, Copy, Clone, PartialEq, Eq)]
#[brw(little)]
pub struct DirectoryRow {
    pub tag: Tag,

    #[brw(pad_before = 4)]
    pub decompressed_length: u32,

    pub decompressed_offset: u32,

    pub flags: u32,

    #[br(map = |v: u32| v != 0)]
    #[bw(map = |v: &bool| u32::from(*v))]
    pub compressed: bool,

    pub compressed_length: u32,

    pub compressed_offset: u32,
}

impl DirectoryRow {
    /// Where the stored bytes of the element live, relative to the start of the package
    pub fn stored_range(&self) -> (u64, u64) {
        if self.compressed {
            (self.compressed_offset as u64, self.compressed_length as u64)
        } else {
            (self.decompressed_offset as u64, self.decompressed_length as u64)
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use binrw::BinRead;
    use binrw::BinWrite;
    use pretty_assertions::assert_eq;

    use crate::error::Result;
    use crate::types::{DirectoryRow, ImageHeader, IndexRow, PackageHeader, Tag};

    #[test]
    fn read_image_header() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            0x0A, 0x00, 0x00, 0x00,
            0x05, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x03, 0x00, 0x00, 0x00,
            0x3C, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0xF4, 0x76, 0x02, 0x00,
        ]);

        let expected = ImageHeader {
            data_start_block: 5,
            index_count: 3,
            offset_table_offset: 0x3C,
            ..Default::default()
        };

        assert_eq!(ImageHeader::read(&mut input)?, expected);

        Ok(())
    }

    #[test]
    fn read_image_header_invalid_magic() {
        let mut input = Cursor::new(vec![0u8; 40]);
        assert!(ImageHeader::read(&mut input).is_err());
    }

    #[test]
    fn write_vacant_index_row() -> Result<()> {
        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x08,
        ];

        let mut actual = Vec::new();
        IndexRow::vacant().write(&mut Cursor::new(&mut actual))?;

        assert_eq!(actual, expected);

        Ok(())
    }

    #[test]
    fn read_package_header() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            b'P', b'A', b'C', b'K', b'\n', b' ',
            0x02, 0x00,
            0x70, 0x00, 0x00, 0x00,
            0x60, 0x00, 0x00, 0x00,
            0x80, 0x00, 0x00, 0x00,
            0x00, 0x01, 0x00, 0x00,
            0xC0, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00,
        ]);

        let expected = PackageHeader {
            typ0: false,
            entry_count: 2,
            slot_table_offset: 0x70,
            string_table_offset: 0x60,
            decompressed_data_offset: 0x80,
            decompressed_length: 0x100,
            compressed_length: 0xC0,
            pad_length: 0,
        };

        assert_eq!(PackageHeader::read(&mut input)?, expected);

        Ok(())
    }

    #[test]
    fn write_package_header_variant() -> Result<()> {
        let header = PackageHeader {
            typ0: true,
            entry_count: 1,
            ..Default::default()
        };

        let mut actual = Vec::new();
        header.write(&mut Cursor::new(&mut actual))?;

        assert_eq!(actual.len(), 32);
        assert_eq!(&actual[..8], b"PACK\n0\x01\x00");

        Ok(())
    }

    #[test]
    fn read_directory_row() -> Result<()> {
        #[rustfmt::skip]
        let mut input = Cursor::new(vec![
            b'T', b'E', b'X', b' ',
            0x00, 0x00, 0x00, 0x00,
            0x00, 0x02, 0x00, 0x00,
            0x00, 0x01, 0x00, 0x00,
            0x07, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x40, 0x00, 0x00, 0x00,
            0xC0, 0x00, 0x00, 0x00,
        ]);

        let expected = DirectoryRow {
            tag: Tag(*b"TEX "),
            decompressed_length: 0x200,
            decompressed_offset: 0x100,
            flags: 7,
            compressed: true,
            compressed_length: 0x40,
            compressed_offset: 0xC0,
        };

        let row = DirectoryRow::read(&mut input)?;
        assert_eq!(row, expected);
        assert_eq!(row.stored_range(), (0xC0, 0x40));

        Ok(())
    }

    #[test]
    fn display_tag() {
        assert_eq!(Tag(*b"MDL ").to_string(), "MDL ");
        assert_eq!(Tag::NONE.to_string(), "\\x00\\x00\\x00\\x00");
    }
}

//! Reading and writing PACK containers
//!

use std::io::{self, Cursor, Seek, SeekFrom, Write};

use binrw::{BinRead, BinWrite};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, instrument, trace};

use crate::compression;
use crate::element::{Element, ElementData, ElementKind, StoredData};
use crate::error::{magic_error, Error, NotFoundError, Result};
use crate::seri;
use crate::string_table::StringTable;
use crate::text;
use crate::types::{DirectoryRow, PackageHeader, PACKAGE_ENTRY_SIZE};
use crate::window::FileWindow;

/// Alignment of every region start inside a package
pub const BLOCK_SIZE: usize = 0x10;

/// Logical alignment of textures, geometry and nested archives
pub const LARGE_BLOCK_SIZE: usize = 0x80;

fn align(value: usize, alignment: usize) -> usize {
    value.div_ceil(alignment) * alignment
}

fn pad_to_block(buffer: &mut Vec<u8>) {
    buffer.resize(align(buffer.len(), BLOCK_SIZE), 0);
}

fn offset32(field: &'static str, value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::OffsetOverflow {
        field,
        value: value as u64,
    })
}

/// A PACK container: a directory of named elements sharing one string table
///
/// ```
/// use img_archive::{Element, ElementData, FileWindow, Package, Tag};
///
/// let mut package = Package::new(true);
/// package.add_element(
///     Element::builder()
///         .tag(Tag::TEXT)
///         .name("greeting")
///         .compressed(true)
///         .data(ElementData::Bytes(b"Hello, World!".to_vec()))
///         .build(),
/// )?;
///
/// let bytes = package.to_bytes()?;
/// let parsed = Package::parse(FileWindow::from_bytes(bytes))?;
/// assert_eq!(parsed.by_name("greeting")?.text()?, "Hello, World!");
/// # Ok::<(), img_archive::error::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Package {
    typ0: bool,
    unknown_flag: u8,
    pad_length: u32,
    decompressed_length: u32,
    decompressed_data_offset: u32,
    string_table: StringTable,
    elements: Vec<Element>,
}

impl Package {
    /// Create an empty package of the given variant
    pub fn new(typ0: bool) -> Self {
        Self {
            typ0,
            unknown_flag: 0,
            pad_length: 0,
            decompressed_length: 0,
            decompressed_data_offset: 0,
            string_table: StringTable::new(),
            elements: Vec::new(),
        }
    }

    /// Read a package, decoding its directory and SERI records
    ///
    /// Other element contents stay in the window until they are read.
    #[instrument(skip_all, err, fields(base = window.base(), len = window.len()))]
    pub fn parse(mut window: FileWindow) -> Result<Self> {
        window.seek(SeekFrom::Start(0))?;
        let header = PackageHeader::read(&mut window).map_err(magic_error("PACK"))?;
        let count = header.entry_count as usize;
        debug!(?header, "read package header");

        let string_table_len = header
            .slot_table_offset
            .checked_sub(header.string_table_offset)
            .ok_or(Error::OutOfBounds {
                offset: header.string_table_offset as u64,
                len: 0,
                limit: header.slot_table_offset as u64,
            })?;
        let strings = window
            .window(header.string_table_offset as u64, string_table_len as u64)?
            .read_to_vec()?;

        window.seek(SeekFrom::Start(header.slot_table_offset as u64))?;
        let slots = (0..count)
            .map(|_| window.read_u32::<LittleEndian>())
            .collect::<io::Result<Vec<_>>>()?;
        let string_table = StringTable::from_parts(strings, slots)?;

        window.seek(SeekFrom::Start(PACKAGE_ENTRY_SIZE))?;
        let rows = (0..count)
            .map(|_| DirectoryRow::read(&mut window))
            .collect::<binrw::BinResult<Vec<_>>>()?;

        let elements = rows
            .iter()
            .enumerate()
            .map(|(i, row)| Self::parse_element(&window, &string_table, i, row))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            typ0: header.typ0,
            unknown_flag: 0,
            pad_length: header.pad_length,
            decompressed_length: header.decompressed_length,
            decompressed_data_offset: header.decompressed_data_offset,
            string_table,
            elements,
        })
    }

    fn parse_element(
        window: &FileWindow,
        table: &StringTable,
        index: usize,
        row: &DirectoryRow,
    ) -> Result<Element> {
        let name = text::decode(table.slot_string(index)?);
        let kind = ElementKind::from_tag(row.tag);
        let (offset, len) = row.stored_range();
        trace!(name = %name, tag = %row.tag, offset, len, compressed = row.compressed);

        let data = match kind {
            ElementKind::Seri => {
                if row.compressed {
                    return Err(Error::CompressedSeri { name });
                }
                let record = window.window(offset, len)?.read_to_vec()?;
                ElementData::Seri(seri::decode(&record, table)?)
            }
            ElementKind::Empty => ElementData::Empty,
            _ => ElementData::Stored(StoredData {
                window: window.window(offset, len)?,
                compressed: row.compressed,
                decompressed_len: row.decompressed_length,
            }),
        };

        Ok(Element::builder()
            .tag(row.tag)
            .name(name)
            .flags(row.flags)
            .compressed(row.compressed && kind != ElementKind::Empty)
            .data(data)
            .build())
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether this package has no elements
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[Element] {
        &self.elements
    }

    pub fn element(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    pub fn element_mut(&mut self, index: usize) -> Option<&mut Element> {
        self.elements.get_mut(index)
    }

    /// Get the index of an element by name, if it's present.
    pub fn index_for_name(&self, name: &str) -> Option<usize> {
        self.elements.iter().position(|e| e.name() == name)
    }

    /// Search for an element by name
    pub fn by_name(&self, name: &str) -> Result<&Element> {
        self.index_for_name(name)
            .and_then(|i| self.elements.get(i))
            .ok_or_else(|| NotFoundError::Element(name.to_owned()).into())
    }

    /// Search for an element by name, for modification
    pub fn by_name_mut(&mut self, name: &str) -> Result<&mut Element> {
        match self.index_for_name(name) {
            Some(i) => Ok(&mut self.elements[i]),
            None => Err(NotFoundError::Element(name.to_owned()).into()),
        }
    }

    /// Append an element, registering its name as the next slot
    pub fn add_element(&mut self, element: Element) -> Result<()> {
        self.string_table.push_slot(&text::encode(element.name())?);
        self.elements.push(element);
        Ok(())
    }

    pub fn string_table(&self) -> &StringTable {
        &self.string_table
    }

    pub fn string_table_mut(&mut self) -> &mut StringTable {
        &mut self.string_table
    }

    /// Whether the header variant byte is `0` rather than a space
    pub fn typ0(&self) -> bool {
        self.typ0
    }

    /// Opaque flag carried by the IMG index row, either 0 or 128
    pub fn unknown_flag(&self) -> u8 {
        self.unknown_flag
    }

    pub fn set_unknown_flag(&mut self, flag: u8) {
        self.unknown_flag = flag;
    }

    pub fn pad_length(&self) -> u32 {
        self.pad_length
    }

    /// Logical size, as of the last parse or write
    pub fn decompressed_length(&self) -> u32 {
        self.decompressed_length
    }

    /// First logical byte past the SERI region, as of the last parse or write
    pub fn decompressed_data_offset(&self) -> u32 {
        self.decompressed_data_offset
    }

    /// Serialize the package and write it out, returning the number of bytes written
    pub fn write<W: Write>(&mut self, mut out: W) -> Result<u64> {
        let bytes = self.to_bytes()?;
        out.write_all(&bytes)?;
        Ok(bytes.len() as u64)
    }

    /// Serialize the package
    ///
    /// The header and directory are followed by the string table, the slot offsets, every SERI
    /// record and finally all other elements in their original order. Two cursors are kept for the
    /// remaining elements: the physical offset inside the package and the logical offset the engine
    /// addresses once everything is decompressed.
    #[instrument(skip_all, err, fields(entries = self.elements.len()))]
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let count = self.elements.len();
        let entry_count = u16::try_from(count).map_err(|_| Error::OffsetOverflow {
            field: "entry count",
            value: count as u64,
        })?;
        if self.string_table.slot_count() != count {
            return Err(Error::SlotCountMismatch {
                slots: self.string_table.slot_count(),
                entries: count,
            });
        }

        for element in &self.elements {
            if let ElementData::Seri(object) = element.data() {
                seri::index_strings(object, &mut self.string_table)?;
            }
        }

        let string_table_offset = (count + 1) * PACKAGE_ENTRY_SIZE as usize;
        let mut buffer = vec![0u8; string_table_offset];
        buffer.extend_from_slice(self.string_table.as_bytes());

        let slot_table_offset = buffer.len();
        for slot in self.string_table.slots() {
            buffer.write_u32::<LittleEndian>(*slot)?;
        }
        pad_to_block(&mut buffer);

        let mut rows = vec![DirectoryRow::default(); count];

        for (i, element) in self.elements.iter().enumerate() {
            if element.kind() != ElementKind::Seri {
                continue;
            }

            let record = match element.data() {
                ElementData::Seri(object) => seri::encode_indexed(object, &self.string_table)?,
                _ => element.read()?,
            };
            let start = buffer.len();
            trace!(name = element.name(), start, len = record.len(), "placing record");

            rows[i] = DirectoryRow {
                tag: element.tag(),
                decompressed_length: offset32("element length", record.len())?,
                decompressed_offset: offset32("element offset", start)?,
                flags: element.flags(),
                ..Default::default()
            };
            buffer.extend_from_slice(&record);
            pad_to_block(&mut buffer);
        }

        let decompressed_data_offset = buffer.len();
        let mut logical = buffer.len();

        for (i, element) in self.elements.iter().enumerate() {
            let kind = element.kind();
            if kind == ElementKind::Seri {
                continue;
            }

            let alignment = if kind.is_large() {
                LARGE_BLOCK_SIZE
            } else {
                BLOCK_SIZE
            };
            let (stored, decompressed_len) = element.stored_for_write()?;

            if element.is_compressed() && kind != ElementKind::Empty {
                let target = align(logical, alignment);
                if target > logical {
                    let chunk = compression::filler(target - logical)?;
                    debug!(
                        name = element.name(),
                        gap = target - logical,
                        filler = chunk.len(),
                        "filling logical gap"
                    );
                    buffer.extend_from_slice(&chunk);
                    pad_to_block(&mut buffer);
                }
                logical = target;

                rows[i] = DirectoryRow {
                    tag: element.tag(),
                    decompressed_length: decompressed_len,
                    decompressed_offset: offset32("element offset", logical)?,
                    flags: element.flags(),
                    compressed: true,
                    compressed_length: offset32("element length", stored.len())?,
                    compressed_offset: offset32("element offset", buffer.len())?,
                };
                trace!(name = element.name(), row = ?rows[i], "placing compressed element");

                buffer.extend_from_slice(&stored);
                pad_to_block(&mut buffer);
                logical = align(logical + decompressed_len as usize, BLOCK_SIZE);
            } else {
                // Uncompressed elements are addressed by a single offset, so both cursors must meet
                let target = align(logical.max(buffer.len()), alignment);
                buffer.resize(target, 0);

                rows[i] = DirectoryRow {
                    tag: element.tag(),
                    decompressed_length: decompressed_len,
                    decompressed_offset: offset32("element offset", target)?,
                    flags: element.flags(),
                    compressed: false,
                    compressed_length: decompressed_len,
                    compressed_offset: 0,
                };
                trace!(name = element.name(), row = ?rows[i], "placing element");

                buffer.extend_from_slice(&stored);
                pad_to_block(&mut buffer);
                logical = buffer.len();
            }
        }

        let header = PackageHeader {
            typ0: self.typ0,
            entry_count,
            slot_table_offset: offset32("slot table offset", slot_table_offset)?,
            string_table_offset: offset32("string table offset", string_table_offset)?,
            decompressed_data_offset: offset32("data offset", decompressed_data_offset)?,
            decompressed_length: offset32("decompressed length", logical)?,
            compressed_length: offset32("compressed length", buffer.len())?,
            pad_length: self.pad_length,
        };

        let mut cursor = Cursor::new(&mut buffer);
        header.write(&mut cursor)?;
        for row in &rows {
            row.write(&mut cursor)?;
        }

        self.decompressed_length = header.decompressed_length;
        self.decompressed_data_offset = header.decompressed_data_offset;
        debug!(?header, "wrote package");

        Ok(buffer)
    }
}

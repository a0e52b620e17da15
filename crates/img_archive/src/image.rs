//! Reading and writing IMG archives
//!

use std::io::{self, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;

use binrw::{BinRead, BinWrite};
use bon::Builder;
use tempfile::NamedTempFile;
use tracing::{debug, instrument, trace};

use crate::error::{magic_error, Error, NotFoundError, Result};
use crate::package::Package;
use crate::types::{
    ImageHeader, IndexRow, OffsetRow, OffsetTableHeader, PackageHeader, Tag, IMAGE_BLOCK_SIZE,
    PACKAGE_ENTRY_SIZE,
};
use crate::window::FileWindow;

const INDEX_ROW_SIZE: u64 = 0x14;
const OFFSET_TABLE_HEADER_SIZE: u64 = 0xC;
const OFFSET_ROW_SIZE: u64 = 0x8;

/// Round an address up to the next block boundary
fn next_block(addr: u64) -> u64 {
    addr.div_ceil(IMAGE_BLOCK_SIZE) * IMAGE_BLOCK_SIZE
}

fn block_address(block: u32) -> u64 {
    (block as u64 + 1) * IMAGE_BLOCK_SIZE
}

fn address_block(addr: u64) -> Result<u32> {
    field32("block number", addr.saturating_sub(1) >> 11)
}

fn field32(field: &'static str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::OffsetOverflow { field, value })
}

/// Content of a resource
#[derive(Debug, Clone)]
pub enum ResourceData {
    /// Read lazily from the source file
    Stored(FileWindow),
    /// Replacement content supplied by the caller
    Bytes(Vec<u8>),
}

/// An IMG entry which is not a package, kept as opaque bytes
#[derive(Debug, Clone, Builder)]
pub struct Resource {
    tag: Tag,

    data: ResourceData,

    #[builder(default)]
    extra: u32,

    #[builder(default)]
    flag3: u8,

    #[builder(default)]
    flag4: u8,
}

impl Resource {
    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn data(&self) -> &ResourceData {
        &self.data
    }

    /// Size of the content
    pub fn len(&self) -> u64 {
        match &self.data {
            ResourceData::Stored(w) => w.len(),
            ResourceData::Bytes(b) => b.len() as u64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the content
    pub fn read(&self) -> Result<Vec<u8>> {
        match &self.data {
            ResourceData::Stored(w) => w.read_to_vec(),
            ResourceData::Bytes(b) => Ok(b.clone()),
        }
    }

    pub fn set_bytes(&mut self, data: Vec<u8>) {
        self.data = ResourceData::Bytes(data);
    }

    /// Opaque values of the index row, replayed on write
    pub fn row_values(&self) -> (u32, u8, u8) {
        (self.extra, self.flag3, self.flag4)
    }
}

/// A present IMG slot
#[derive(Debug, Clone)]
pub enum ImageEntry {
    Package(Package),
    Resource(Resource),
}

impl ImageEntry {
    pub fn tag(&self) -> Tag {
        match self {
            ImageEntry::Package(_) => Tag::PACKAGE,
            ImageEntry::Resource(r) => r.tag(),
        }
    }

    pub fn as_package(&self) -> Option<&Package> {
        match self {
            ImageEntry::Package(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_package_mut(&mut self) -> Option<&mut Package> {
        match self {
            ImageEntry::Package(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            ImageEntry::Resource(r) => Some(r),
            _ => None,
        }
    }
}

/// An IMG archive: a list of slots, each either vacant or holding a package or a resource
///
/// ```
/// use std::io::Cursor;
/// use img_archive::{FileWindow, Image, ImageEntry, Package};
///
/// let mut image = Image::new();
/// image.push(Some(ImageEntry::Package(Package::new(true))));
/// image.push(None);
///
/// let mut out = Cursor::new(Vec::new());
/// image.write(&mut out)?;
///
/// let parsed = Image::parse(FileWindow::from_bytes(out.into_inner()))?;
/// assert_eq!(parsed.len(), 2);
/// assert!(parsed.entry(1).is_none());
/// # Ok::<(), img_archive::error::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct Image {
    header: ImageHeader,
    /// Offset table marker as read, `None` for new images
    marker: Option<u32>,
    entries: Vec<Option<ImageEntry>>,
}

impl Default for Image {
    fn default() -> Self {
        Self::new()
    }
}

impl Image {
    pub fn new() -> Self {
        Self {
            header: ImageHeader::default(),
            marker: None,
            entries: Vec::new(),
        }
    }

    /// Open and parse the image at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::parse(FileWindow::open(path)?)
    }

    /// Read an image, its index, its offset table and every package directory
    #[instrument(skip_all, err, fields(len = window.len()))]
    pub fn parse(mut window: FileWindow) -> Result<Self> {
        window.seek(SeekFrom::Start(0))?;
        let header = ImageHeader::read(&mut window).map_err(magic_error("IMG"))?;
        debug!(?header, "read image header");

        window.seek(SeekFrom::Start(IMAGE_BLOCK_SIZE))?;
        let rows = (0..header.index_count)
            .map(|_| IndexRow::read(&mut window))
            .collect::<binrw::BinResult<Vec<_>>>()?;

        window.seek(SeekFrom::Start(
            IMAGE_BLOCK_SIZE + header.offset_table_offset as u64,
        ))?;
        let table = OffsetTableHeader::read(&mut window)?;
        let offsets = (0..table.entry_count)
            .map(|_| OffsetRow::read(&mut window))
            .collect::<binrw::BinResult<Vec<_>>>()?;

        let mut entries: Vec<Option<ImageEntry>> = (0..rows.len()).map(|_| None).collect();
        for offset in offsets {
            let index = offset.index as usize;
            let row = rows.get(index).ok_or(Error::OutOfBounds {
                offset: index as u64,
                len: 1,
                limit: rows.len() as u64,
            })?;
            let start = block_address(offset.block);
            trace!(index, tag = %row.tag, start, "reading entry");

            let entry = if row.tag == Tag::PACKAGE {
                let mut peek = window.window(start, PACKAGE_ENTRY_SIZE)?;
                let package_header =
                    PackageHeader::read(&mut peek).map_err(magic_error("PACK"))?;
                let mut package = Package::parse(
                    window.window(start, package_header.compressed_length as u64)?,
                )?;
                package.set_unknown_flag(row.flag3);
                ImageEntry::Package(package)
            } else {
                ImageEntry::Resource(Resource {
                    tag: row.tag,
                    data: ResourceData::Stored(window.window(start, row.length as u64)?),
                    extra: row.extra,
                    flag3: row.flag3,
                    flag4: row.flag4,
                })
            };

            if let Some(slot) = entries.get_mut(index) {
                *slot = Some(entry);
            }
        }

        Ok(Self {
            header,
            marker: Some(table.marker),
            entries,
        })
    }

    /// Number of slots, vacant ones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Option<ImageEntry>] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&ImageEntry> {
        self.entries.get(index).and_then(Option::as_ref)
    }

    pub fn entry_mut(&mut self, index: usize) -> Option<&mut ImageEntry> {
        self.entries.get_mut(index).and_then(Option::as_mut)
    }

    /// Replace the content of a slot, returning the previous entry
    pub fn replace(
        &mut self,
        index: usize,
        entry: Option<ImageEntry>,
    ) -> Result<Option<ImageEntry>> {
        let slot = self
            .entries
            .get_mut(index)
            .ok_or(NotFoundError::SlotIndex(index))?;
        Ok(std::mem::replace(slot, entry))
    }

    /// Append a slot
    pub fn push(&mut self, entry: Option<ImageEntry>) {
        self.entries.push(entry);
    }

    pub fn header(&self) -> &ImageHeader {
        &self.header
    }

    /// Write the image, returning the number of bytes written
    ///
    /// Entries are written first, each starting on its own block, then the header and both
    /// tables are filled in ahead of them.
    #[instrument(skip_all, err, fields(entries = self.entries.len()))]
    pub fn write<W: Write + Seek>(&mut self, mut out: W) -> Result<u64> {
        let base = out.stream_position()?;
        let count = self.entries.len() as u64;
        let present = self.entries.iter().flatten().count() as u64;

        let offset_table_offset = count * INDEX_ROW_SIZE;
        let data_start = next_block(
            IMAGE_BLOCK_SIZE
                + offset_table_offset
                + OFFSET_TABLE_HEADER_SIZE
                + present * OFFSET_ROW_SIZE,
        );

        let mut rows = Vec::with_capacity(self.entries.len());
        let mut offsets = Vec::with_capacity(present as usize);
        let mut addr = data_start;
        out.seek(SeekFrom::Start(base + addr))?;

        for (index, entry) in self.entries.iter_mut().enumerate() {
            let Some(entry) = entry else {
                rows.push(IndexRow::vacant());
                continue;
            };

            let (row, written) = match entry {
                ImageEntry::Package(package) => {
                    let bytes = package.to_bytes()?;
                    out.write_all(&bytes)?;
                    let row = IndexRow {
                        tag: Tag::PACKAGE,
                        length: package.decompressed_length(),
                        extra: package.decompressed_data_offset(),
                        flag3: package.unknown_flag(),
                        flag4: if package.typ0() { b'0' } else { b' ' },
                    };
                    (row, bytes.len() as u64)
                }
                ImageEntry::Resource(resource) => {
                    let bytes = resource.read()?;
                    out.write_all(&bytes)?;
                    let row = IndexRow {
                        tag: resource.tag,
                        length: field32("resource length", bytes.len() as u64)?,
                        extra: resource.extra,
                        flag3: resource.flag3,
                        flag4: resource.flag4,
                    };
                    (row, bytes.len() as u64)
                }
            };

            let block = address_block(addr)?;
            trace!(index, block, written, tag = %row.tag, "wrote entry");
            rows.push(row);
            offsets.push(OffsetRow {
                index: field32("slot index", index as u64)?,
                block,
            });

            let end = addr + written;
            addr = next_block(end);
            io::copy(&mut io::repeat(0).take(addr - end), &mut out)?;
        }

        self.header.data_start_block = address_block(data_start)?;
        self.header.index_count = field32("index count", count)?;
        self.header.offset_table_offset = field32("offset table offset", offset_table_offset)?;
        let table = OffsetTableHeader {
            entry_count: field32("offset count", present)?,
            marker: self
                .marker
                .unwrap_or(self.header.offset_table_offset),
        };

        let mut tables = Cursor::new(Vec::with_capacity(data_start as usize));
        self.header.write(&mut tables)?;
        tables.get_mut().resize(IMAGE_BLOCK_SIZE as usize, 0);
        tables.set_position(IMAGE_BLOCK_SIZE);
        for row in &rows {
            row.write(&mut tables)?;
        }
        table.write(&mut tables)?;
        for offset in &offsets {
            offset.write(&mut tables)?;
        }
        tables.get_mut().resize(data_start as usize, 0);

        out.seek(SeekFrom::Start(base))?;
        out.write_all(tables.get_ref())?;
        out.seek(SeekFrom::Start(base + addr))?;
        debug!(header = ?self.header, ?table, len = addr, "wrote image");

        Ok(addr)
    }

    /// Write the image to `path`
    ///
    /// The output is staged in a temporary file in the same directory and only moved over `path`
    /// once it was written completely.
    #[instrument(skip_all, err, fields(path = %path.as_ref().display()))]
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<u64> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut staged = NamedTempFile::new_in(dir)?;
        let written = {
            let mut writer = BufWriter::new(staged.as_file_mut());
            let written = self.write(&mut writer)?;
            writer.flush()?;
            written
        };
        staged.as_file().sync_all()?;

        staged.persist(path).map_err(|e| Error::IOError(e.error))?;
        debug!(written, "persisted image");

        Ok(written)
    }
}

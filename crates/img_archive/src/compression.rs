//! Element compression and decompression handling.

use std::io::{self, Cursor, Read, Write};

use flate2::{read::ZlibDecoder, write::ZlibEncoder, Compression};
use tracing::instrument;

use crate::error::Result;
use crate::window::FileWindow;

/// Compression level used for every element written by this library
pub const COMPRESSION_LEVEL: u32 = 9;

/// Compress a buffer into a zlib stream
#[instrument(skip_all, err, fields(size = data.len()))]
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(COMPRESSION_LEVEL));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a complete zlib stream
#[instrument(skip_all, err, fields(size = data.len()))]
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    ZlibDecoder::new(data).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Build the chunk filling a `len` byte gap in logical space
///
/// This is a compressed run of zeros, or the zeros themselves when compressing does not shrink them.
pub fn filler(len: usize) -> Result<Vec<u8>> {
    let zeros = vec![0u8; len];
    let chunk = compress(&zeros)?;
    Ok(if chunk.len() > len { zeros } else { chunk })
}

/// Streaming reader over the decompressed content of an element
pub enum ElementReader {
    Raw(FileWindow),
    Compressed(Box<ZlibDecoder<FileWindow>>),
    Owned(Cursor<Vec<u8>>),
}

impl ElementReader {
    #[instrument(skip(window))]
    pub(crate) fn new(window: FileWindow, compressed: bool) -> Self {
        // An empty compressed element holds no zlib stream at all
        if compressed && !window.is_empty() {
            ElementReader::Compressed(Box::new(ZlibDecoder::new(window)))
        } else {
            ElementReader::Raw(window)
        }
    }

    /// Unwrap and return the window the data is read from, if any
    pub fn into_inner(self) -> Option<FileWindow> {
        match self {
            ElementReader::Raw(r) => Some(r),
            ElementReader::Compressed(r) => Some(r.into_inner()),
            ElementReader::Owned(_) => None,
        }
    }
}

impl Read for ElementReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            ElementReader::Raw(r) => r.read(buf),
            ElementReader::Compressed(r) => r.read(buf),
            ElementReader::Owned(r) => r.read(buf),
        }
    }

    fn read_to_end(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        match self {
            ElementReader::Raw(r) => r.read_to_end(buf),
            ElementReader::Compressed(r) => r.read_to_end(buf),
            ElementReader::Owned(r) => r.read_to_end(buf),
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Read;

    use pretty_assertions::assert_eq;

    use crate::compression::{compress, decompress, filler, ElementReader};
    use crate::error::Result;
    use crate::window::FileWindow;

    #[test]
    fn compress_roundtrip() -> Result<()> {
        let input = b"Hello World, Hello World, Hello World".to_vec();
        let compressed = compress(&input)?;

        assert_eq!(&compressed[..2], &[0x78, 0xDA]);
        assert_eq!(decompress(&compressed)?, input);

        Ok(())
    }

    #[test]
    fn filler_shrinks_large_gaps() -> Result<()> {
        let chunk = filler(0x70)?;
        assert!(chunk.len() < 0x70);
        assert_eq!(decompress(&chunk)?, vec![0u8; 0x70]);

        Ok(())
    }

    #[test]
    fn filler_falls_back_to_zeros() -> Result<()> {
        assert_eq!(filler(4)?, vec![0u8; 4]);

        Ok(())
    }

    #[test]
    fn reader_decompresses_window() -> Result<()> {
        let mut data = vec![0xEE; 3];
        data.extend(compress(b"Hello World")?);

        let window = FileWindow::from_bytes(data);
        let inner = window.window(3, window.len() - 3)?;

        let mut buffer = String::new();
        ElementReader::new(inner, true).read_to_string(&mut buffer)?;
        assert_eq!(buffer, "Hello World");

        Ok(())
    }
}

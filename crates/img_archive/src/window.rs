//! Bounded views over random access byte storage
//!

use std::{
    fmt::{self, Debug},
    fs::File,
    io::{self, Read, Seek, SeekFrom},
    path::Path,
    sync::{Arc, Mutex},
};

use crate::error::{Error, Result};

/// Random access byte storage shared by every window cut from the same file
pub trait ReadAt: Send + Sync {
    /// Read up to `buf.len()` bytes starting at `offset`, returning how many were read
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Total number of bytes available
    fn size(&self) -> io::Result<u64>;
}

impl ReadAt for Vec<u8> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = usize::try_from(offset)
            .unwrap_or(usize::MAX)
            .min(self.len());
        let count = buf.len().min(self.len() - start);
        buf[..count].copy_from_slice(&self[start..start + count]);
        Ok(count)
    }

    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }
}

impl<R: Read + Seek + Send> ReadAt for Mutex<R> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let mut reader = self
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "reader lock poisoned"))?;
        reader.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    fn size(&self) -> io::Result<u64> {
        let mut reader = self
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "reader lock poisoned"))?;
        reader.seek(SeekFrom::End(0))
    }
}

/// A bounded, seekable view into a [`ReadAt`] source
///
/// Windows are cheap to clone, every clone has its own cursor.
///
/// ```
/// use std::io::Read;
/// use img_archive::FileWindow;
///
/// let window = FileWindow::from_bytes(b"Hello, World!".to_vec());
/// let mut inner = window.window(7, 5)?;
///
/// let mut text = String::new();
/// inner.read_to_string(&mut text)?;
/// assert_eq!(text, "World");
/// # Ok::<(), img_archive::error::Error>(())
/// ```
#[derive(Clone)]
pub struct FileWindow {
    source: Arc<dyn ReadAt>,
    base: u64,
    len: u64,
    pos: u64,
}

impl Debug for FileWindow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FileWindow")
            .field("base", &self.base)
            .field("len", &self.len)
            .field("pos", &self.pos)
            .finish()
    }
}

impl FileWindow {
    /// Create a window over `len` bytes of `source` starting at `base`
    pub fn new(source: Arc<dyn ReadAt>, base: u64, len: u64) -> Result<Self> {
        let size = source.size()?;
        if base.checked_add(len).map_or(true, |end| end > size) {
            return Err(Error::OutOfBounds {
                offset: base,
                len,
                limit: size,
            });
        }

        Ok(Self {
            source,
            base,
            len,
            pos: 0,
        })
    }

    /// Create a window spanning a whole source
    pub fn whole(source: Arc<dyn ReadAt>) -> Result<Self> {
        let len = source.size()?;
        Self::new(source, 0, len)
    }

    /// Open a file and create a window spanning all of it
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Self::whole(Arc::new(Mutex::new(file)))
    }

    /// Create a window over an in-memory buffer
    pub fn from_bytes(data: Vec<u8>) -> Self {
        let len = data.len() as u64;
        Self {
            source: Arc::new(data),
            base: 0,
            len,
            pos: 0,
        }
    }

    /// Absolute offset of this window inside its source
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Number of bytes visible through this window
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether this window has no visible bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Cut a sub window relative to the start of this one
    pub fn window(&self, offset: u64, len: u64) -> Result<FileWindow> {
        if offset.checked_add(len).map_or(true, |end| end > self.len) {
            return Err(Error::OutOfBounds {
                offset,
                len,
                limit: self.len,
            });
        }

        Ok(FileWindow {
            source: self.source.clone(),
            base: self.base + offset,
            len,
            pos: 0,
        })
    }

    /// Read everything visible through this window, regardless of the cursor
    pub fn read_to_vec(&self) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; self.len as usize];
        let read = self.source.read_at(self.base, &mut buffer)?;
        if read != buffer.len() {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(buffer)
    }
}

impl Read for FileWindow {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.len - self.pos;
        let count = (buf.len() as u64).min(remaining) as usize;
        if count == 0 {
            return Ok(0);
        }

        let read = self
            .source
            .read_at(self.base + self.pos, &mut buf[..count])?;
        self.pos += read as u64;
        Ok(read)
    }
}

impl Seek for FileWindow {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => Some(p),
            SeekFrom::End(delta) => self.len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };

        match target {
            Some(p) if p <= self.len => {
                self.pos = p;
                Ok(p)
            }
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("seek outside of the {:#x} byte window", self.len),
            )),
        }
    }
}

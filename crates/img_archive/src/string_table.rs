//! The deduplicated string pool shared by a package and all of its SERI records
//!

use std::collections::HashMap;

use tracing::trace;

use crate::error::{Error, NotFoundError, Result};

/// Append only pool of null terminated strings plus an ordered slot index
///
/// Strings are referenced either by their byte offset into the pool, or by a slot number. Slot
/// order is significant and kept exactly as it was read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StringTable {
    buffer: Vec<u8>,
    slots: Vec<u32>,
    reverse: HashMap<Vec<u8>, usize>,
}

impl StringTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a table from the raw pool and slot offsets read from a file
    pub fn from_parts(buffer: Vec<u8>, slots: Vec<u32>) -> Result<Self> {
        let mut table = StringTable {
            buffer,
            slots,
            reverse: HashMap::new(),
        };

        for (i, offset) in table.slots.iter().enumerate() {
            let s = table.lookup(*offset)?.to_vec();
            table.reverse.entry(s).or_insert(i);
        }

        Ok(table)
    }

    /// The raw pool bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// The slot offsets, in order
    pub fn slots(&self) -> &[u32] {
        &self.slots
    }

    /// Get the string starting at `offset`
    pub fn lookup(&self, offset: u32) -> Result<&[u8]> {
        let start = offset as usize;
        let tail = self.buffer.get(start..).ok_or(Error::OutOfBounds {
            offset: offset as u64,
            len: 0,
            limit: self.buffer.len() as u64,
        })?;

        let end = tail.iter().position(|b| *b == 0).ok_or(Error::OutOfBounds {
            offset: offset as u64,
            len: tail.len() as u64,
            limit: self.buffer.len() as u64,
        })?;

        Ok(&tail[..end])
    }

    /// Get the offset of `s`, which must already have been added
    pub fn find(&self, s: &[u8]) -> Result<u32> {
        self.position(s)
            .ok_or_else(|| NotFoundError::String(String::from_utf8_lossy(s).into_owned()).into())
    }

    /// Get the offset of `s`, appending it first when it is not yet present
    pub fn add(&mut self, s: &[u8]) -> u32 {
        if let Some(offset) = self.position(s) {
            return offset;
        }

        let offset = self.buffer.len() as u32;
        trace!(offset, "adding {}", String::from_utf8_lossy(s));
        self.buffer.extend_from_slice(s);
        self.buffer.push(0);
        offset
    }

    /// Get the string referenced by slot `i`
    pub fn slot_string(&self, i: usize) -> Result<&[u8]> {
        let offset = self.slots.get(i).ok_or(Error::OutOfBounds {
            offset: i as u64,
            len: 1,
            limit: self.slots.len() as u64,
        })?;
        self.lookup(*offset)
    }

    /// Get the slot index registered for `s`
    pub fn slot_of(&self, s: &[u8]) -> Result<usize> {
        self.reverse
            .get(s)
            .copied()
            .ok_or_else(|| NotFoundError::Slot(String::from_utf8_lossy(s).into_owned()).into())
    }

    /// Register `s` as the next slot
    pub fn push_slot(&mut self, s: &[u8]) {
        let offset = self.add(s);
        self.slots.push(offset);
        self.reverse.insert(s.to_vec(), self.slots.len() - 1);
    }

    /// Number of slots
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn position(&self, s: &[u8]) -> Option<u32> {
        self.buffer
            .windows(s.len() + 1)
            .position(|w| w[s.len()] == 0 && &w[..s.len()] == s)
            .map(|p| p as u32)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use crate::error::{Error, NotFoundError, Result};
    use crate::string_table::StringTable;

    #[test]
    fn add_is_idempotent() -> Result<()> {
        let mut table = StringTable::new();

        let first = table.add(b"bone");
        let second = table.add(b"bone");
        assert_eq!(first, second);
        assert_eq!(table.find(b"bone")?, first);
        assert_eq!(table.as_bytes(), b"bone\0");

        Ok(())
    }

    #[test]
    fn add_appends_new_strings() -> Result<()> {
        let mut table = StringTable::new();

        assert_eq!(table.add(b"name"), 0);
        assert_eq!(table.add(b"player"), 5);
        assert_eq!(table.lookup(5)?, b"player");
        assert_eq!(table.lookup(7)?, b"ayer");

        Ok(())
    }

    #[test]
    fn find_matches_string_suffixes() -> Result<()> {
        let table = StringTable::from_parts(b"mytex\0".to_vec(), Vec::new())?;
        assert_eq!(table.find(b"tex")?, 2);

        Ok(())
    }

    #[test]
    fn find_missing_string() {
        let table = StringTable::new();
        assert!(matches!(
            table.find(b"missing"),
            Err(Error::NotFound(NotFoundError::String(_)))
        ));
    }

    #[test]
    fn lookup_without_terminator_fails() -> Result<()> {
        let table = StringTable::from_parts(b"abc\0def".to_vec(), Vec::new())?;

        assert_eq!(table.lookup(0)?, b"abc");
        assert!(matches!(table.lookup(4), Err(Error::OutOfBounds { .. })));
        assert!(matches!(table.lookup(40), Err(Error::OutOfBounds { .. })));

        Ok(())
    }

    #[test]
    fn slots_keep_file_order() -> Result<()> {
        let table = StringTable::from_parts(b"a\0b\0".to_vec(), vec![2, 0, 2])?;

        assert_eq!(table.slot_string(0)?, b"b");
        assert_eq!(table.slot_string(1)?, b"a");
        assert_eq!(table.slot_of(b"b")?, 0);
        assert_eq!(table.slot_of(b"a")?, 1);
        assert_eq!(table.slots(), &[2, 0, 2]);

        Ok(())
    }

    #[test]
    fn push_slot_registers_reverse_lookup() -> Result<()> {
        let mut table = StringTable::new();
        table.push_slot(b"spine01");
        table.push_slot(b"body");

        assert_eq!(table.slot_of(b"body")?, 1);
        assert_eq!(table.slot_string(0)?, b"spine01");
        assert!(matches!(
            table.slot_string(2),
            Err(Error::OutOfBounds {
                offset: 2,
                limit: 2,
                ..
            })
        ));
        assert!(table.slot_of(b"head").is_err());

        Ok(())
    }
}

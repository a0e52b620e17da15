//! This library handles reading from and creating **IMG** archives, the **PACK** containers stored
//! in them and the **SERI** typed records those containers carry.
//!
//! # IMG Archive Format Documentation
//!
//! An IMG file is a list of logical slots. Every slot is either vacant, holds a PACK container,
//! or holds an opaque resource. All data is addressed in blocks of 2048 bytes: block `n` starts at
//! byte `(n + 1) * 2048`.
//!
//! ## File Structure
//!
//! | Offset (bytes) | Field                  | Description                                                |
//! |----------------|------------------------|------------------------------------------------------------|
//! | 0x0000         | Magic number           | 4 bytes: Fixed value 0x0000000A                            |
//! | 0x0004         | Data Start Block       | 4 bytes: Block of the first entry                          |
//! | 0x0008         | Unknown                | 12 bytes: Replayed as read                                 |
//! | 0x0010         | Index Count            | 4 bytes: Number of rows in the index table                 |
//! | 0x0014         | Offset Table Offset    | 4 bytes: Offset table position, relative to 0x800          |
//! | 0x0018         | Unknown                | 16 bytes: Replayed as read                                 |
//! | 0x0800         | Index Table            | 20 bytes per slot                                          |
//!
//! ### Index Table
//!
//! | Offset (bytes) | Field                  | Description                                             |
//! |----------------|------------------------|---------------------------------------------------------|
//! | 0x0000         | Tag                    | 4 bytes: `PAK ` for containers, anything else otherwise |
//! | 0x0004         | Padding                | 4 bytes                                                 |
//! | 0x0008         | Length                 | 4 bytes: Logical length of a container, raw size else   |
//! | 0x000C         | Extra                  | 4 bytes: Data offset of a container                     |
//! | 0x0010         | Padding                | 2 bytes                                                 |
//! | 0x0012         | Flag                   | 1 byte: Opaque container flag, 0 or 128                 |
//! | 0x0013         | Variant                | 1 byte: Container variant byte, 8 for vacant slots      |
//!
//! ### Offset Table
//!
//! Four bytes of padding, the number of present slots, an opaque marker, and then one
//! `(slot index, block)` pair of 4 byte integers per present slot.
//!
//! # PACK Container Format Documentation
//!
//! | Offset (bytes) | Field                  | Description                                                |
//! |----------------|------------------------|------------------------------------------------------------|
//! | 0x0000         | Magic number           | 5 bytes: `PACK\n`                                          |
//! | 0x0005         | Variant                | 1 byte: `0` or a space                                     |
//! | 0x0006         | Entry Count            | 2 bytes: Number of directory rows                          |
//! | 0x0008         | Slot Table Offset      | 4 bytes: Offset of the slot offsets                        |
//! | 0x000C         | String Table Offset    | 4 bytes: Offset of the string pool                         |
//! | 0x0010         | Data Offset            | 4 bytes: First logical byte past the SERI records          |
//! | 0x0014         | Decompressed Length    | 4 bytes: Logical size of the container                     |
//! | 0x0018         | Compressed Length      | 4 bytes: Physical size of the container                    |
//! | 0x001C         | Pad Length             | 4 bytes: Replayed as read                                  |
//!
//! The header is followed by one 32 byte directory row per element, the string pool, one 4 byte
//! pool offset per element naming it, the SERI records and then all other element data. Every
//! region starts on a 16 byte boundary, textures, geometry and nested archives start on a 128 byte
//! boundary in logical space.
//!
//! | Offset (bytes) | Field                  | Description                                             |
//! |----------------|------------------------|---------------------------------------------------------|
//! | 0x0000         | Tag                    | 4 bytes: Element type                                   |
//! | 0x0004         | Padding                | 4 bytes                                                 |
//! | 0x0008         | Decompressed Length    | 4 bytes                                                 |
//! | 0x000C         | Decompressed Offset    | 4 bytes: Logical offset                                 |
//! | 0x0010         | Flags                  | 4 bytes: Replayed as read                               |
//! | 0x0014         | Compressed             | 4 bytes: 1 when stored as a zlib stream                 |
//! | 0x0018         | Compressed Length      | 4 bytes                                                 |
//! | 0x001C         | Compressed Offset      | 4 bytes: Physical offset                                |
//!
//! # SERI Record Format Documentation
//!
//! `SERI`, a 4 byte data offset and a 2 byte field count, followed by one `(key, value)` pair of
//! 2 byte offsets per field. Keys are string pool offsets. Values point at a tag byte, a padding
//! byte and the value itself, relative to the start of the data region.
//!
//! - `i`, `f`, `b`: 4 byte integer, float or boolean.
//! - `s`: the value offset is itself a string pool offset.
//! - `a`: element tag, padding, 2 byte count and one 2 byte offset per element.
//! - `h`: 2 byte count followed by a nested field table.
//!
//! ## Additional Information
//!
//! - **Endianness**: Little-endian for all multi-byte integers
//! - **Compression**: zlib
//! - **Text**: Shift_JIS
//!

pub mod compression;
pub mod element;
pub mod error;
pub mod image;
pub mod package;
#[cfg(feature = "serde")]
mod serde;
pub mod seri;
pub mod string_table;
pub mod text;
pub mod types;
pub mod value;
pub mod window;

pub use element::{Element, ElementData, ElementKind, StoredData};
pub use image::{Image, ImageEntry, Resource, ResourceData};
pub use package::Package;
pub use string_table::StringTable;
pub use types::Tag;
pub use value::{Object, Value};
pub use window::{FileWindow, ReadAt};

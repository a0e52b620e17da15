//! Error types that can be emitted from this library

use miette::Diagnostic;
use thiserror::Error;

/// Error type for library
#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    /// Transparent warpper for [`std::io::Error`]
    #[error(transparent)]
    IOError(#[from] std::io::Error),

    /// Transparent warpper for [`binrw::Error`]
    #[error(transparent)]
    BinRWError(#[from] binrw::Error),

    /// a container header did not start with its expected magic
    #[error("invalid {container} magic at offset {offset:#x}")]
    BadMagic {
        /// Which container was being parsed
        container: &'static str,
        /// Absolute offset of the header inside its window
        offset: u64,
    },

    /// a SERI record used a value tag this library does not know
    #[error("unknown SERI value tag {tag:?} at offset {offset:#x}")]
    UnknownValueTag {
        /// The raw tag byte
        tag: char,
        /// Offset of the value inside the record
        offset: usize,
    },

    /// SERI elements are never stored compressed
    #[error("SERI element {name} is flagged as compressed")]
    CompressedSeri {
        /// Element name
        name: String,
    },

    /// arrays must hold values of a single type
    #[error("array under key {key} mixes value types")]
    MixedArray {
        /// The key owning the array
        key: String,
    },

    /// values under slot keys are stored as slot references and must name a slot
    #[error("value under slot key {key} must be a slot name, not a number")]
    SlotValue {
        /// The slot key holding the value
        key: String,
    },

    /// a SERI record referenced its own values so often that decoding would never end
    #[error("SERI record of {size} bytes expands to more than {limit} values")]
    SeriExpansion {
        /// Size of the record
        size: usize,
        /// Number of values decoding may produce
        limit: usize,
    },

    /// text could not be converted to or from the legacy encoding
    #[error("unable to convert text: {0}")]
    Encoding(String),

    /// an element payload of the wrong kind was requested
    #[error("element {name} does not hold raw data")]
    UnexpectedPayload {
        /// Element name
        name: String,
    },

    /// an offset or length pointed outside of its window
    #[error("range {offset:#x}+{len:#x} is outside of the {limit:#x} byte window")]
    OutOfBounds {
        /// Requested start
        offset: u64,
        /// Requested length
        len: u64,
        /// Size of the window
        limit: u64,
    },

    /// unable to find requested string
    #[error("unable to find requested string")]
    NotFound(#[from] NotFoundError),

    /// a computed value does not fit into its on-disk field
    #[error("{field} value {value:#x} does not fit its field")]
    OffsetOverflow {
        /// Name of the field being written
        field: &'static str,
        /// The value that overflowed
        value: u64,
    },

    /// every element is named by the slot with the same index
    #[error("package has {slots} slots for {entries} entries")]
    SlotCountMismatch {
        /// Number of slots in the string table
        slots: usize,
        /// Number of elements in the package
        entries: usize,
    },

    /// {0}
    #[error("{0}")]
    CustomError(String),
}

/// Error type to provide further information when a lookup failed
#[derive(Error, Diagnostic, Debug)]
#[error("unable to find requested string")]
pub enum NotFoundError {
    /// string {0} is not in the string table
    #[error("string {0} is not in the string table")]
    String(String),

    /// string {0} was never registered as a slot
    #[error("string {0} was never registered as a slot")]
    Slot(String),

    /// slot index {0}
    #[error("slot index {0}")]
    SlotIndex(usize),

    /// element {0}
    #[error("element {0}")]
    Element(String),
}

/// Generic result type with crate's Error as its error variant
pub type Result<T> = core::result::Result<T, Error>;

/// Convert a [`binrw::Error::BadMagic`] into [`Error::BadMagic`] naming the container
pub(crate) fn magic_error(container: &'static str) -> impl FnOnce(binrw::Error) -> Error {
    move |e| match e {
        binrw::Error::BadMagic { pos, .. } => Error::BadMagic {
            container,
            offset: pos,
        },
        e => Error::BinRWError(e),
    }
}

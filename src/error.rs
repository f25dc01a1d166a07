use std::str::Utf8Error;

use thiserror::Error;

/// An error as reported by the GSYM decoder.
///
/// Errors are plain values. None of them poison the [`Gsym`][crate::Gsym]
/// instance they originated from; subsequent lookups may well succeed.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum Error {
    /// The byte source ran out of data before the requested number of
    /// bytes could be read.
    #[error("short read at offset {offset:#x}")]
    ShortRead {
        /// The file offset at which data ended prematurely.
        offset: u64,
    },

    /// The header magic is neither the native nor the byte-swapped tag.
    #[error("bad GSYM magic: {0:#010x}")]
    BadMagic(u32),

    /// The file reports a version other than 1.
    #[error("unsupported GSYM version: {0}")]
    UnsupportedVersion(u16),

    /// The header's UUID size exceeds the 20 byte maximum.
    #[error("UUID size out of range: {0}")]
    UuidOutOfRange(u8),

    /// The header's address offset size is not one of 1, 2, 4, or 8.
    #[error("bad address offset size: {0}")]
    BadAddrSize(u8),

    /// An absolute address lies below the file's base address.
    #[error("address {0:#x} is below the base address")]
    AddressOutOfRange(u64),

    /// The address precedes the first table entry or falls outside the
    /// containing function's size.
    #[error("no entry found for address {0:#x}")]
    AddressNotFound(u64),

    /// A LEB128 value does not fit into 64 bits.
    #[error("LEB128 value at offset {offset:#x} overflows 64 bits")]
    LebOverflow {
        /// The file offset at which the encoded value starts.
        offset: u64,
    },

    /// A string table entry is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    BadString(#[source] Utf8Error),

    /// The byte source reported an I/O error.
    #[error("failed to read from byte source")]
    Io(#[from] std::io::Error),
}

/// A result type using our [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

//! A reader for the GSYM symbolication file format.
//!
//! GSYM is a compact, mmap friendly binary representation of the
//! symbol and source line information needed to translate runtime
//! instruction addresses into function names, source files, and line
//! numbers, including inlined call frames. This crate decodes version
//! 1 of the format and answers address lookups; it does not write GSYM
//! files, demangle names, or fall back to other debug info formats.
//!
//! The entry point is [`Gsym`], which works on top of any byte source
//! implementing [`ReadAt`]: a byte slice, an open [`File`][std::fs::File],
//! or the bundled memory mapping type [`Mmap`].
//!
//! ```no_run
//! use gsym::Gsym;
//!
//! # fn main() -> gsym::Result<()> {
//! let gsym = Gsym::open("/tmp/inlineapp.gsym")?;
//! let result = gsym.lookup_absolute(0x100003177)?;
//! for location in &result.locations {
//!     println!("{} at {}:{}", location.name, location.file, location.line);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! A constructed [`Gsym`] is immutable and safe to share across
//! threads as long as its byte source supports concurrent positional
//! reads, which all sources provided here do.

#![allow(clippy::let_and_return, clippy::let_unit_value)]
#![deny(unsafe_op_in_unsafe_fn)]

mod error;
mod gsym;
mod header;
mod inline;
mod linetab;
mod mmap;
mod reader;
mod source;
#[cfg(test)]
mod test_helper;

pub use crate::error::Error;
pub use crate::error::Result;
pub use crate::gsym::Gsym;
pub use crate::gsym::LookupResult;
pub use crate::gsym::SourceLocation;
pub use crate::header::Header;
pub use crate::mmap::Mmap;
pub use crate::source::ReadAt;

/// A type representing addresses.
pub type Addr = u64;

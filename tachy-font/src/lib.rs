//! Reading and rewriting the parts of an OpenType font that incremental
//! font delivery cares about.
//!
//! This crate deliberately does not try to be a general purpose font
//! parser: it models a font as a table directory over raw bytes
//! ([`FontRef`]), provides lightweight wrappers for the handful of tables
//! the preprocessor touches, and defines the artifact wire formats shared
//! by the preprocessor and the bundle assembler.

mod builder;
mod font_data;
mod font_ref;
mod types;

pub mod artifact;
pub mod tables;

pub use builder::FontBuilder;
pub use font_data::{write_bytes_at, write_u16_at, write_u32_at, Cursor, FontData};
pub use font_ref::{FontRef, OutlineFlavor, TableRecord};
pub use types::{GlyphId, Tag};

use thiserror::Error;

/// An error that occurs when reading font data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    #[error("unexpected end of data")]
    OutOfBounds,
    #[error("invalid sfnt version 0x{0:08X}")]
    InvalidSfnt(u32),
    #[error("invalid format {0}")]
    InvalidFormat(i64),
    #[error("malformed data: {0}")]
    MalformedData(&'static str),
    #[error("required table '{0}' is missing")]
    TableIsMissing(Tag),
}

//! The offline half of TachyFont: turns a standard OpenType font into a
//! patchable base font plus the per-glyph artifact set served by the
//! bundle assembler.
//!
//! The pipeline is strictly staged; see [`Preprocessor`] for the driver.
//! Each stage is usable on its own for tests and tooling.

mod base_fonter;
mod bit_stream;
mod cleaner;
mod closure_builder;
mod desubr;
mod dump;
mod exceptions;
mod font_info;
mod glyph_serializer;
mod gos;
mod preprocess;
mod report;

pub use base_fonter::{build_base, LOCA_BLOCK_SIZE};
pub use cleaner::clean;
pub use closure_builder::build_closures;
pub use dump::{dump_base, BaseDump};
pub use exceptions::is_exception_codepoint;
pub use font_info::build_typed_header;
pub use glyph_serializer::{dump_codepoints, serialize_glyphs};
pub use gos::{decode_gos, CmapCompacter, DecodedGos, GosType};
pub use preprocess::{CancelFlag, PrepSummary, Preprocessor};
pub use report::{closure_stats, text_closure_report, ClosureStats, TextClosureReport};

use tachy_font::{artifact::RleError, ReadError};
use thiserror::Error;

/// Errors produced by the preprocessing stages.
#[derive(Error, Debug)]
pub enum PrepError {
    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("font has no glyphs, '.notdef' cannot be preserved")]
    MissingNotdef,

    #[error("font has neither a (3,10) nor a (3,1) unicode cmap subtable")]
    NoUnicodeCmap,

    #[error("glyph {gid} is {len} bytes, which exceeds the record limit")]
    GlyphTooLong { gid: u16, len: usize },

    #[error(
        "CharString block gap of {gap} bytes does not fit in 16 bits; \
         rebuild with a smaller offset block size"
    )]
    CharStringGapTooWide { gap: u32 },

    #[error("RLE self-test failed: {0}")]
    RleSelfTest(#[from] RleError),

    #[error("RLE self-test failed: re-expansion differs from input")]
    RleRoundTripMismatch,

    #[error(
        "cmap format-4 segment U+{start:04X}..U+{end:04X} cannot be aligned \
         to format-12 groups"
    )]
    CmapSegmentMismatch { start: u32, end: u32 },

    #[error("{0} stream required by this GOS type is missing")]
    GosSourceMissing(&'static str),

    #[error("charstring nesting exceeds the Type 2 depth limit")]
    SubrDepthExceeded,

    #[error("subroutine index {0} out of range")]
    BadSubrIndex(i32),

    #[error("escaped value {0} does not fit the nibble encoding")]
    EscapeOverflow(i64),

    #[error("preprocessing was canceled")]
    Canceled,
}

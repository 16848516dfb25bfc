//! The online half of TachyFont: loads a preprocessed artifact set once
//! and assembles per-request glyph bundles from it.
//!
//! Artifacts are held as immutable buffers shared by every request; all
//! per-request state lives in the request handler's scratch buffers, so
//! concurrent assembly needs no locks.

mod artifacts;
mod bundle;
mod request;
mod throttle;

pub use artifacts::{artifact_dir, FontArtifacts};
pub use bundle::{assemble_bundle, BUNDLE_MAJOR, BUNDLE_MINOR};
pub use request::GlyphRequest;
pub use throttle::ThrottledWriter;

use tachy_font::ReadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed glyph request: {0}")]
    BadRequest(#[from] serde_json::Error),

    #[error("artifact set is corrupt: {0}")]
    CorruptArtifact(&'static str),

    #[error("artifact set is corrupt: {0}")]
    Read(#[from] ReadError),
}

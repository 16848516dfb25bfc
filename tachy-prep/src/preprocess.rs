//! The pipeline driver: runs P1 through P6 in order, with coarse
//! cancellation between stages and atomic artifact publication.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use sha1::{Digest, Sha1};
use tachy_font::artifact::file_names;
use tachy_font::FontRef;

use crate::{
    base_fonter, build_closures, build_typed_header, clean, dump_codepoints, serialize_glyphs,
    PrepError,
};

/// Cooperative cancellation, checked between stages only.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
pub struct PrepSummary {
    /// Path of the cleaned font written next to the artifacts.
    pub cleaned_font: PathBuf,
    pub artifact_dir: PathBuf,
    pub num_glyphs: u16,
    pub base_len: usize,
}

pub struct Preprocessor {
    keep_hinting: bool,
    cancel: CancelFlag,
}

impl Preprocessor {
    pub fn new(keep_hinting: bool) -> Self {
        Preprocessor {
            keep_hinting,
            cancel: CancelFlag::new(),
        }
    }

    /// A handle another thread can use to abort between stages.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn checkpoint(&self) -> Result<(), PrepError> {
        if self.cancel.is_canceled() {
            return Err(PrepError::Canceled);
        }
        Ok(())
    }

    /// Run the whole pipeline, publishing the artifact set into
    /// `artifact_dir`. Nothing is published unless every stage succeeds.
    pub fn run(&self, fontfile: &Path, artifact_dir: &Path) -> Result<PrepSummary, PrepError> {
        let font_bytes = fs::read(fontfile)?;
        info!("preprocess {} ({} bytes)", fontfile.display(), font_bytes.len());

        self.checkpoint()?;
        let cleaned = clean(&font_bytes, self.keep_hinting)?;
        let fingerprint = sha1_hex(&cleaned);
        info!("cleaned font: {} bytes, sha1 {fingerprint}", cleaned.len());

        let font = FontRef::new(&cleaned)?;
        self.checkpoint()?;
        let (closure_idx, closure_data) = build_closures(&font)?;

        self.checkpoint()?;
        let (glyph_table, glyph_data) = serialize_glyphs(&font)?;
        let (codepoints, gids) = dump_codepoints(&font)?;

        self.checkpoint()?;
        let header = build_typed_header(&font)?;
        let base = base_fonter::build_base(&cleaned, Some(&header))?;
        let base_len = base.len();

        let num_glyphs =
            tachy_font::tables::maxp::Maxp::from_font(&font)?.num_glyphs()?;
        let cleaned_name = cleaned_file_name(fontfile);

        self.checkpoint()?;
        publish(
            artifact_dir,
            &[
                (cleaned_name.as_str(), &cleaned),
                (file_names::BASE, &base),
                (file_names::CODEPOINTS, &codepoints),
                (file_names::GIDS, &gids),
                (file_names::CLOSURE_IDX, &closure_idx),
                (file_names::CLOSURE_DATA, &closure_data),
                (file_names::GLYPH_TABLE, &glyph_table),
                (file_names::GLYPH_DATA, &glyph_data),
                (file_names::FINGERPRINT, fingerprint.as_bytes()),
            ],
        )?;
        info!("published artifact set to {}", artifact_dir.display());

        Ok(PrepSummary {
            cleaned_font: artifact_dir.join(cleaned_name),
            artifact_dir: artifact_dir.to_path_buf(),
            num_glyphs,
            base_len,
        })
    }
}

pub(crate) fn sha1_hex(bytes: &[u8]) -> String {
    let digest = Sha1::digest(bytes);
    let mut out = String::with_capacity(40);
    for byte in digest {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

fn cleaned_file_name(fontfile: &Path) -> String {
    let stem = fontfile
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("font");
    match fontfile.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_clean.{ext}"),
        None => format!("{stem}_clean"),
    }
}

/// Write every file to a temporary sibling, then rename them all into
/// place. A failure removes the temporaries, leaving no partial set.
fn publish(dir: &Path, files: &[(&str, &[u8])]) -> Result<(), PrepError> {
    fs::create_dir_all(dir)?;
    let mut staged: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());
    let result = (|| -> std::io::Result<()> {
        for (name, bytes) in files {
            let tmp = dir.join(format!("{name}.tmp"));
            fs::write(&tmp, bytes)?;
            staged.push((tmp, dir.join(name)));
        }
        for (tmp, target) in &staged {
            fs::rename(tmp, target)?;
        }
        Ok(())
    })();
    if result.is_err() {
        for (tmp, _) in &staged {
            let _ = fs::remove_file(tmp);
        }
    }
    result.map_err(PrepError::from)
}

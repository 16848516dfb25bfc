//! Bundle assembly: the per-request path.

use std::collections::BTreeSet;

use log::{debug, info};
use tachy_font::artifact::{GlyphRecord, HAS_CFF, HAS_HMTX, HAS_VMTX};
use tachy_font::GlyphId;

use crate::{BundleError, FontArtifacts};

pub const BUNDLE_MAJOR: u8 = 1;
pub const BUNDLE_MINOR: u8 = 0;

/// magic + version + sha1 + gid count + flags
const BUNDLE_HEADER_LEN: usize = 4 + 4 + 20 + 2 + 2;

/// Assemble the glyph bundle for a set of requested code points.
///
/// Unmapped code points contribute nothing; an empty intersection yields
/// a well-formed bundle with a zero gid count. The output buffer is
/// sized up front and filled in place.
pub fn assemble_bundle(
    artifacts: &FontArtifacts,
    codepoints: &[u32],
) -> Result<Vec<u8>, BundleError> {
    let mut gids: BTreeSet<GlyphId> = BTreeSet::new();
    for &codepoint in codepoints {
        match artifacts.resolve(codepoint) {
            Some(gid) => artifacts.expand_closure(gid, &mut gids)?,
            None => debug!("codepoint U+{codepoint:04X} not in font, skipped"),
        }
    }

    let header = artifacts.header();
    let entry_len = header.entry_len();
    let glyph_data = artifacts.glyph_data();

    // pre-flight: resolve every record and the total bundle length
    let mut slices = Vec::with_capacity(gids.len());
    let mut payload_len = 0usize;
    for &gid in &gids {
        let record = GlyphRecord::read(artifacts.glyph_table(), header, gid)?;
        let start = payload_start(header.is_cff(), header.cff_data_region_offset, &record)?;
        let end = start + record.length as usize;
        if end > glyph_data.len() {
            return Err(BundleError::CorruptArtifact(
                "glyph record overruns glyph data",
            ));
        }
        payload_len += record.length as usize;
        slices.push((gid, start..end));
    }

    let total = BUNDLE_HEADER_LEN + gids.len() * entry_len + payload_len;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"BSAC");
    out.extend_from_slice(&[BUNDLE_MAJOR, BUNDLE_MINOR, 0, 0]);
    out.extend_from_slice(artifacts.fingerprint());
    out.extend_from_slice(&(gids.len() as u16).to_be_bytes());
    out.extend_from_slice(&(header.flags & (HAS_HMTX | HAS_VMTX | HAS_CFF)).to_be_bytes());

    let table = artifacts.glyph_table();
    for (gid, range) in slices {
        let record_at = GlyphRecord::position(header, gid);
        let record_bytes = table
            .slice(record_at..record_at + entry_len)
            .ok_or(BundleError::CorruptArtifact("glyph table truncated"))?;
        out.extend_from_slice(record_bytes.as_bytes());
        out.extend_from_slice(&glyph_data[range]);
    }
    debug_assert_eq!(out.len(), total);
    info!(
        "bundle: {} codepoints -> {} gids, {} bytes",
        codepoints.len(),
        gids.len(),
        out.len()
    );
    Ok(out)
}

/// Where a record's payload begins inside `glyph_data`.
///
/// CFF records store source-font offsets relative to the CharStrings
/// offset base, one byte before the data region.
fn payload_start(
    is_cff: bool,
    cff_data_region_offset: u32,
    record: &GlyphRecord,
) -> Result<usize, BundleError> {
    if !is_cff {
        return Ok(record.offset as usize);
    }
    record
        .offset
        .checked_sub(cff_data_region_offset + 1)
        .map(|start| start as usize)
        .ok_or(BundleError::CorruptArtifact(
            "CFF record offset precedes the data region",
        ))
}

//! Loading and validating one font's artifact set.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use fnv::FnvHashMap;
use log::info;
use tachy_font::artifact::{file_names, ClosureIndex, GlyphTableHeader, CLOSURE_ENTRY_LEN};
use tachy_font::{FontData, GlyphId};

use crate::BundleError;

/// One font's preprocessed artifacts, loaded once and shared read-only
/// across requests.
pub struct FontArtifacts {
    codepoint_map: FnvHashMap<u32, u16>,
    closure_idx: Vec<u8>,
    closure_data: Vec<u8>,
    glyph_table: Vec<u8>,
    glyph_data: Vec<u8>,
    header: GlyphTableHeader,
    fingerprint: [u8; 20],
}

impl FontArtifacts {
    /// Read the artifact files from `dir` and cross-validate them.
    pub fn load(dir: &Path) -> Result<Self, BundleError> {
        let read = |name: &str| fs::read(dir.join(name));
        let artifacts = FontArtifacts::from_parts(
            &read(file_names::CODEPOINTS)?,
            &read(file_names::GIDS)?,
            read(file_names::CLOSURE_IDX)?,
            read(file_names::CLOSURE_DATA)?,
            read(file_names::GLYPH_TABLE)?,
            read(file_names::GLYPH_DATA)?,
            &read(file_names::FINGERPRINT)?,
        )?;
        info!(
            "loaded artifact set {}: {} codepoints, {} glyphs",
            dir.display(),
            artifacts.codepoint_map.len(),
            artifacts.header.num_glyphs
        );
        Ok(artifacts)
    }

    /// Assemble an artifact set from in-memory buffers.
    pub fn from_parts(
        codepoints: &[u8],
        gids: &[u8],
        closure_idx: Vec<u8>,
        closure_data: Vec<u8>,
        glyph_table: Vec<u8>,
        glyph_data: Vec<u8>,
        fingerprint: &[u8],
    ) -> Result<Self, BundleError> {
        if codepoints.len() % 4 != 0 || gids.len() % 2 != 0 {
            return Err(BundleError::CorruptArtifact(
                "codepoints/gids arrays are misaligned",
            ));
        }
        if codepoints.len() / 4 != gids.len() / 2 {
            return Err(BundleError::CorruptArtifact(
                "codepoints and gids differ in length",
            ));
        }
        let mut codepoint_map =
            FnvHashMap::with_capacity_and_hasher(gids.len() / 2, Default::default());
        for (code, gid) in codepoints.chunks_exact(4).zip(gids.chunks_exact(2)) {
            codepoint_map.insert(
                u32::from_be_bytes(code.try_into().unwrap_or_default()),
                u16::from_be_bytes(gid.try_into().unwrap_or_default()),
            );
        }

        let header = GlyphTableHeader::read(FontData::new(&glyph_table))?;
        let expected = header.byte_len() + header.num_glyphs as usize * header.entry_len();
        if glyph_table.len() != expected {
            return Err(BundleError::CorruptArtifact(
                "glyph table length does not match its header",
            ));
        }
        if closure_idx.len() != header.num_glyphs as usize * CLOSURE_ENTRY_LEN {
            return Err(BundleError::CorruptArtifact(
                "closure index length does not match the glyph count",
            ));
        }
        let fingerprint = decode_fingerprint(fingerprint)?;

        Ok(FontArtifacts {
            codepoint_map,
            closure_idx,
            closure_data,
            glyph_table,
            glyph_data,
            header,
            fingerprint,
        })
    }

    pub fn header(&self) -> &GlyphTableHeader {
        &self.header
    }

    pub fn fingerprint(&self) -> &[u8; 20] {
        &self.fingerprint
    }

    pub fn glyph_table(&self) -> FontData {
        FontData::new(&self.glyph_table)
    }

    pub fn glyph_data(&self) -> &[u8] {
        &self.glyph_data
    }

    /// The primary gid for a code point, if the font maps it.
    pub fn resolve(&self, codepoint: u32) -> Option<GlyphId> {
        self.codepoint_map
            .get(&codepoint)
            .map(|&gid| GlyphId::new(gid))
    }

    /// Union the closure of `gid` into `set`.
    pub fn expand_closure(
        &self,
        gid: GlyphId,
        set: &mut BTreeSet<GlyphId>,
    ) -> Result<(), BundleError> {
        let index = ClosureIndex::new(&self.closure_idx, &self.closure_data);
        let mut gids = Vec::new();
        index.read_into(gid, &mut gids)?;
        set.extend(gids);
        Ok(())
    }
}

/// `<root>/<name>-<weight>`, or `<root>/<name>` for an empty weight.
pub fn artifact_dir(root: &Path, name: &str, weight: &str) -> PathBuf {
    if weight.is_empty() {
        root.join(name)
    } else {
        root.join(format!("{name}-{weight}"))
    }
}

fn decode_fingerprint(hex: &[u8]) -> Result<[u8; 20], BundleError> {
    if hex.len() != 40 {
        return Err(BundleError::CorruptArtifact(
            "fingerprint must be 40 hex characters",
        ));
    }
    let mut out = [0u8; 20];
    for (i, pair) in hex.chunks_exact(2).enumerate() {
        let s = std::str::from_utf8(pair)
            .map_err(|_| BundleError::CorruptArtifact("fingerprint is not ascii hex"))?;
        out[i] = u8::from_str_radix(s, 16)
            .map_err(|_| BundleError::CorruptArtifact("fingerprint is not ascii hex"))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_decoding() {
        let hex = b"00112233445566778899aabbccddeeff00112233";
        let decoded = decode_fingerprint(hex).unwrap();
        assert_eq!(decoded[0..4], [0x00, 0x11, 0x22, 0x33]);
        assert!(decode_fingerprint(b"too short").is_err());
        assert!(decode_fingerprint(&[b'x'; 40]).is_err());
    }

    #[test]
    fn artifact_dir_naming() {
        let root = Path::new("/fonts");
        assert_eq!(
            artifact_dir(root, "NotoSans", "400"),
            PathBuf::from("/fonts/NotoSans-400")
        );
        assert_eq!(
            artifact_dir(root, "Arimo", ""),
            PathBuf::from("/fonts/Arimo")
        );
    }

    #[test]
    fn mismatched_arrays_are_rejected() {
        let err = FontArtifacts::from_parts(
            &[0, 0, 0, 0x61],
            &[],
            vec![],
            vec![],
            vec![0, 0, 0, 0],
            vec![],
            &[b'0'; 40],
        );
        assert!(matches!(err, Err(BundleError::CorruptArtifact(_))));
    }
}

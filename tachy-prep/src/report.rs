//! Closure reporting over a built artifact set.
//!
//! Answers "what would this text actually pull down": each code point is
//! resolved through the `codepoints`/`gids` arrays and expanded through
//! the closure files, the way the bundle assembler will at request time.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use tachy_font::artifact::{ClosureIndex, CLOSURE_ENTRY_LEN, NO_EXTRA_CLOSURE};
use tachy_font::{FontData, GlyphId};

use crate::PrepError;

/// How one code point of the report text resolved.
#[derive(Debug, PartialEq, Eq)]
pub enum ClosureResolution {
    /// Already reported earlier in the text.
    Repeated,
    NotInCmap,
    /// The closure, sorted ascending.
    Gids(Vec<u16>),
}

#[derive(Debug)]
pub struct ClosureLine {
    pub codepoint: u32,
    pub resolution: ClosureResolution,
}

/// Per-text closure report.
#[derive(Debug)]
pub struct TextClosureReport {
    pub lines: Vec<ClosureLine>,
    pub unique_codepoints: usize,
    pub unique_gids: usize,
}

pub fn text_closure_report(
    codepoints: &[u8],
    gids: &[u8],
    closure_idx: &[u8],
    closure_data: &[u8],
    text: &str,
) -> Result<TextClosureReport, PrepError> {
    let cmap = parse_cmap(codepoints, gids)?;
    let closures = ClosureIndex::new(closure_idx, closure_data);

    let mut lines = Vec::new();
    let mut seen_codepoints = BTreeSet::new();
    let mut seen_gids = BTreeSet::new();
    for ch in text.chars() {
        let codepoint = ch as u32;
        let resolution = if !seen_codepoints.insert(codepoint) {
            ClosureResolution::Repeated
        } else {
            match cmap.get(&codepoint) {
                None => ClosureResolution::NotInCmap,
                Some(&gid) => {
                    let mut closure = Vec::new();
                    closures.read_into(GlyphId::new(gid), &mut closure)?;
                    let mut closure: Vec<u16> =
                        closure.into_iter().map(|g| g.to_u16()).collect();
                    closure.sort_unstable();
                    seen_gids.extend(closure.iter().copied());
                    ClosureResolution::Gids(closure)
                }
            }
        };
        lines.push(ClosureLine {
            codepoint,
            resolution,
        });
    }
    Ok(TextClosureReport {
        lines,
        unique_codepoints: seen_codepoints.len(),
        unique_gids: seen_gids.len(),
    })
}

fn parse_cmap(codepoints: &[u8], gids: &[u8]) -> Result<HashMap<u32, u16>, PrepError> {
    if codepoints.len() % 4 != 0 || codepoints.len() / 4 != gids.len() / 2 {
        return Err(tachy_font::ReadError::MalformedData(
            "codepoints and gids arrays do not pair up",
        )
        .into());
    }
    let mut cmap = HashMap::with_capacity(gids.len() / 2);
    let codepoints = FontData::new(codepoints);
    let gids = FontData::new(gids);
    for i in 0..gids.len() / 2 {
        cmap.insert(codepoints.read_u32_at(i * 4)?, gids.read_u16_at(i * 2)?);
    }
    Ok(cmap)
}

impl fmt::Display for TextClosureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (n, line) in self.lines.iter().enumerate() {
            let display = char::from_u32(line.codepoint)
                .filter(|c| !c.is_control())
                .unwrap_or('\u{FFFD}');
            write!(f, "{n:3}] {:6x} ({display}): ", line.codepoint)?;
            match &line.resolution {
                ClosureResolution::Repeated => writeln!(f, "(seen)")?,
                ClosureResolution::NotInCmap => writeln!(f, "<not in cmap>")?,
                ClosureResolution::Gids(gids) => {
                    let list: Vec<String> = gids.iter().map(u16::to_string).collect();
                    writeln!(f, "{}", list.join(", "))?;
                }
            }
        }
        writeln!(f, "unique cps: {}", self.unique_codepoints)?;
        write!(f, "unique gids: {}", self.unique_gids)
    }
}

/// Aggregate shape of the closure files.
#[derive(Debug, PartialEq, Eq)]
pub struct ClosureStats {
    pub glyphs: usize,
    /// Glyphs whose closure is more than themselves.
    pub nontrivial: usize,
    /// Largest closure (seed included) and the gid carrying it.
    pub largest: usize,
    pub largest_gid: u16,
}

pub fn closure_stats(closure_idx: &[u8]) -> Result<ClosureStats, PrepError> {
    let idx = FontData::new(closure_idx);
    let glyphs = closure_idx.len() / CLOSURE_ENTRY_LEN;
    let mut stats = ClosureStats {
        glyphs,
        nontrivial: 0,
        largest: 1,
        largest_gid: 0,
    };
    for gid in 0..glyphs {
        let offset = idx.read_i32_at(gid * CLOSURE_ENTRY_LEN)?;
        let size = idx.read_u16_at(gid * CLOSURE_ENTRY_LEN + 4)?;
        if offset == NO_EXTRA_CLOSURE {
            continue;
        }
        stats.nontrivial += 1;
        let members = 1 + size as usize / 2;
        if members > stats.largest {
            stats.largest = members;
            stats.largest_gid = gid as u16;
        }
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_closures, clean, dump_codepoints};
    use tachy_font::FontRef;
    use tachy_test_fonts as test_fonts;

    fn artifacts() -> (Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>) {
        let cleaned = clean(&test_fonts::truetype_font(), false).unwrap();
        let font = FontRef::new(&cleaned).unwrap();
        let (codepoints, gids) = dump_codepoints(&font).unwrap();
        let (idx, data) = build_closures(&font).unwrap();
        (codepoints, gids, idx, data)
    }

    #[test]
    fn text_report_resolves_like_the_bundler() {
        let (codepoints, gids, idx, data) = artifacts();
        let report = text_closure_report(&codepoints, &gids, &idx, &data, "aca\u{4E00}").unwrap();
        assert_eq!(report.lines.len(), 4);
        assert_eq!(
            report.lines[0].resolution,
            ClosureResolution::Gids(vec![test_fonts::GID_A])
        );
        // 'c' pulls the composite closure
        assert_eq!(
            report.lines[1].resolution,
            ClosureResolution::Gids(vec![
                test_fonts::GID_A,
                test_fonts::GID_COMPOSITE,
                test_fonts::GID_B,
                test_fonts::GID_B_ALT
            ])
        );
        assert_eq!(report.lines[2].resolution, ClosureResolution::Repeated);
        assert_eq!(report.lines[3].resolution, ClosureResolution::NotInCmap);
        assert_eq!(report.unique_codepoints, 3);
        assert_eq!(report.unique_gids, 4);
    }

    #[test]
    fn stats_find_the_widest_closure() {
        let (_, _, idx, _) = artifacts();
        let stats = closure_stats(&idx).unwrap();
        assert_eq!(stats.glyphs, test_fonts::NUM_GLYPHS as usize);
        // the composite and the GSUB source carry extras
        assert_eq!(stats.nontrivial, 2);
        assert_eq!(stats.largest, 4);
        assert_eq!(stats.largest_gid, test_fonts::GID_COMPOSITE);
    }
}

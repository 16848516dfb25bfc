//! Stage P2: per-glyph delivery closures.
//!
//! For every gid the closure is the least fixed point over composite
//! component references and GSUB substitutions. Every lookup in the GSUB
//! lookup list is treated as applicable, which over-approximates shaping
//! (a few extra glyphs may ship) and never under-approximates.

use std::collections::BTreeSet;

use log::info;
use tachy_font::artifact::{ClosureEntry, NO_EXTRA_CLOSURE};
use tachy_font::tables::glyf::{self, GlyphData};
use tachy_font::tables::gsub::{Gsub, SingleSubstKind, SubstSubtable};
use tachy_font::tables::head::Head;
use tachy_font::tables::loca::{Loca, LOCA};
use tachy_font::tables::maxp::Maxp;
use tachy_font::{FontRef, GlyphId, OutlineFlavor, ReadError};

use crate::PrepError;

/// Build the `closure_idx` / `closure_data` pair for a cleaned font.
pub fn build_closures(font: &FontRef) -> Result<(Vec<u8>, Vec<u8>), PrepError> {
    let num_glyphs = Maxp::from_font(font)?.num_glyphs()?;
    let components = direct_components(font, num_glyphs)?;
    let subtables = match Gsub::from_font(font) {
        Some(gsub) => gsub.subst_subtables()?,
        None => Vec::new(),
    };

    let mut idx = Vec::with_capacity(num_glyphs as usize * 6);
    let mut data = Vec::new();
    let mut nontrivial = 0usize;
    for seed in 0..num_glyphs {
        let closure = close_over(seed, num_glyphs, &components, &subtables);
        let extras: Vec<u16> = closure.into_iter().filter(|&gid| gid != seed).collect();
        if extras.is_empty() {
            ClosureEntry {
                offset: NO_EXTRA_CLOSURE,
                size: 0,
            }
            .write(&mut idx);
        } else {
            nontrivial += 1;
            ClosureEntry {
                offset: data.len() as i32,
                size: (extras.len() * 2) as u16,
            }
            .write(&mut idx);
            for gid in extras {
                data.extend_from_slice(&gid.to_be_bytes());
            }
        }
    }
    info!(
        "closures: {num_glyphs} glyphs, {nontrivial} with dependencies, {} data bytes",
        data.len()
    );
    Ok((idx, data))
}

/// Direct composite references per gid; empty lists for CFF flavor.
fn direct_components(font: &FontRef, num_glyphs: u16) -> Result<Vec<Vec<u16>>, PrepError> {
    if font.outline_flavor()? != OutlineFlavor::Glyf {
        return Ok(vec![Vec::new(); num_glyphs as usize]);
    }
    let head = Head::from_font(font)?;
    let loca = Loca::new(
        font.expect_table_data(LOCA)?,
        head.index_to_loc_format()? != 0,
    );
    let glyf = font.expect_table_data(glyf::GLYF)?;

    let mut out = Vec::with_capacity(num_glyphs as usize);
    for gid in 0..num_glyphs {
        let range = loca.glyph_range(GlyphId::new(gid))?;
        let glyph = GlyphData::new(glyf.slice(range).ok_or(ReadError::OutOfBounds)?);
        let mut refs = Vec::new();
        if !glyph.is_empty() && glyph.is_composite()? {
            for component in glyph.components() {
                refs.push(component?.glyph.to_u16());
            }
        }
        out.push(refs);
    }
    Ok(out)
}

fn close_over(
    seed: u16,
    num_glyphs: u16,
    components: &[Vec<u16>],
    subtables: &[SubstSubtable],
) -> BTreeSet<u16> {
    let mut set = BTreeSet::new();
    set.insert(seed);
    loop {
        let mut changed = expand_components(num_glyphs, components, &mut set);
        changed |= apply_gsub(num_glyphs, subtables, &mut set);
        if !changed {
            return set;
        }
    }
}

fn insert(set: &mut BTreeSet<u16>, gid: u16, num_glyphs: u16) -> bool {
    // `.notdef` ships with the base font and never rides a closure
    if gid == 0 || gid >= num_glyphs {
        return false;
    }
    set.insert(gid)
}

fn expand_components(
    num_glyphs: u16,
    components: &[Vec<u16>],
    set: &mut BTreeSet<u16>,
) -> bool {
    let mut changed = false;
    let mut worklist: Vec<u16> = set.iter().copied().collect();
    while let Some(gid) = worklist.pop() {
        for &component in components.get(gid as usize).map(Vec::as_slice).unwrap_or(&[]) {
            if insert(set, component, num_glyphs) {
                changed = true;
                worklist.push(component);
            }
        }
    }
    changed
}

fn apply_gsub(num_glyphs: u16, subtables: &[SubstSubtable], set: &mut BTreeSet<u16>) -> bool {
    let mut changed = false;
    for subtable in subtables {
        match subtable {
            SubstSubtable::Single(single) => match &single.kind {
                SingleSubstKind::Delta(delta) => {
                    for &glyph in single.coverage.glyphs() {
                        if set.contains(&glyph) {
                            let target = (glyph as i32 + *delta as i32) as u16;
                            changed |= insert(set, target, num_glyphs);
                        }
                    }
                }
                SingleSubstKind::Substitutes(substitutes) => {
                    for (&glyph, &target) in
                        single.coverage.glyphs().iter().zip(substitutes)
                    {
                        if set.contains(&glyph) {
                            changed |= insert(set, target, num_glyphs);
                        }
                    }
                }
            },
            SubstSubtable::Multiple(seq) | SubstSubtable::Alternate(seq) => {
                for (&glyph, outputs) in seq.coverage.glyphs().iter().zip(&seq.sequences) {
                    if set.contains(&glyph) {
                        for &target in outputs {
                            changed |= insert(set, target, num_glyphs);
                        }
                    }
                }
            }
            SubstSubtable::Ligature(ligature) => {
                for (&first, ligatures) in
                    ligature.coverage.glyphs().iter().zip(&ligature.ligature_sets)
                {
                    if !set.contains(&first) {
                        continue;
                    }
                    for lig in ligatures {
                        if lig.components.iter().all(|c| set.contains(c)) {
                            changed |= insert(set, lig.ligature_glyph, num_glyphs);
                        }
                    }
                }
            }
            SubstSubtable::ReverseChain(reverse) => {
                for (&glyph, &target) in
                    reverse.coverage.glyphs().iter().zip(&reverse.substitutes)
                {
                    if set.contains(&glyph) {
                        changed |= insert(set, target, num_glyphs);
                    }
                }
            }
            SubstSubtable::Contextual => {}
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tachy_font::artifact::ClosureIndex;
    use tachy_test_fonts as test_fonts;

    fn closures() -> (Vec<u8>, Vec<u8>) {
        let bytes = test_fonts::truetype_font();
        let font = FontRef::new(&bytes).unwrap();
        build_closures(&font).unwrap()
    }

    fn read(idx: &[u8], data: &[u8], gid: u16) -> Vec<u16> {
        let index = ClosureIndex::new(idx, data);
        let mut gids = Vec::new();
        index.read_into(GlyphId::new(gid), &mut gids).unwrap();
        let mut gids: Vec<u16> = gids.into_iter().map(|g| g.to_u16()).collect();
        gids.sort_unstable();
        gids
    }

    #[test]
    fn simple_glyph_closure_is_reflexive_singleton() {
        let (idx, data) = closures();
        assert_eq!(read(&idx, &data, test_fonts::GID_A), vec![test_fonts::GID_A]);
        let index = ClosureIndex::new(&idx, &data);
        let entry = index.entry(GlyphId::new(test_fonts::GID_A)).unwrap();
        assert_eq!(entry.offset, NO_EXTRA_CLOSURE);
    }

    #[test]
    fn composite_pulls_components_and_substitutions() {
        let (idx, data) = closures();
        // composite -> {a, b}; b -> its alternate via GSUB
        assert_eq!(
            read(&idx, &data, test_fonts::GID_COMPOSITE),
            vec![
                test_fonts::GID_A,
                test_fonts::GID_COMPOSITE,
                test_fonts::GID_B,
                test_fonts::GID_B_ALT,
            ]
        );
    }

    #[test]
    fn gsub_target_rides_the_source() {
        let (idx, data) = closures();
        assert_eq!(
            read(&idx, &data, test_fonts::GID_B),
            vec![test_fonts::GID_B, test_fonts::GID_B_ALT]
        );
        // the target itself needs nothing extra
        assert_eq!(
            read(&idx, &data, test_fonts::GID_B_ALT),
            vec![test_fonts::GID_B_ALT]
        );
    }

    #[test]
    fn notdef_never_appears_in_closures() {
        let (idx, data) = closures();
        for gid in 1..test_fonts::NUM_GLYPHS {
            assert!(!read(&idx, &data, gid).contains(&0), "gid {gid}");
        }
    }
}

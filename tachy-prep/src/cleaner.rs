//! Stage P1: produce the cleaned font every other stage reads.
//!
//! Cleaning empties the outlines of zero-contour glyphs that no
//! whitespace or default-ignorable code point needs, optionally strips
//! hinting, and rewrites the format-4 cmap into its flat form. Glyph ids
//! are never renumbered, so every downstream artifact and the closure
//! files agree on ids with the original font.

use std::collections::HashSet;

use log::{debug, info};
use tachy_font::tables::{
    cmap::{self, Cmap},
    glyf::{self, GlyphData},
    head::{Head, HEAD},
    loca::{self, Loca, LOCA},
    maxp::Maxp,
};
use tachy_font::{FontBuilder, FontRef, GlyphId, OutlineFlavor, Tag};

use crate::exceptions::is_exception_codepoint;
use crate::{desubr, PrepError};

const HINTING_TABLES: &[Tag] = &[
    Tag::new(b"cvt "),
    Tag::new(b"fpgm"),
    Tag::new(b"prep"),
    Tag::new(b"hdmx"),
];

/// Clean `font_bytes`, returning the rewritten font.
pub fn clean(font_bytes: &[u8], keep_hinting: bool) -> Result<Vec<u8>, PrepError> {
    let font = FontRef::new(font_bytes)?;
    let flavor = font.outline_flavor()?;
    let num_glyphs = Maxp::from_font(&font)?.num_glyphs()?;
    if num_glyphs == 0 {
        return Err(PrepError::MissingNotdef);
    }

    let mut builder = FontBuilder::default();
    match flavor {
        OutlineFlavor::Glyf => clean_glyf(&font, num_glyphs, keep_hinting, &mut builder)?,
        OutlineFlavor::Cff => {
            let cff_data = font.expect_table_data(Tag::new(b"CFF "))?;
            builder.add_raw(Tag::new(b"CFF "), desubr::desubroutinize(cff_data)?);
            let mut new_head = font.expect_table_data(HEAD)?.as_bytes().to_vec();
            tachy_font::write_u32_at(&mut new_head, 8, 0)?; // checkSumAdjustment
            builder.add_raw(HEAD, new_head);
        }
    }

    builder.add_raw(cmap::CMAP, rebuild_cmap(&font)?);

    for record in font.table_records() {
        if builder.contains(record.tag) {
            continue;
        }
        if !keep_hinting && HINTING_TABLES.contains(&record.tag) {
            debug!("dropping hinting table '{}'", record.tag);
            continue;
        }
        if let Some(data) = font.table_data(record.tag) {
            builder.add_raw(record.tag, data.as_bytes());
        }
    }

    Ok(builder.build())
}

fn clean_glyf(
    font: &FontRef,
    num_glyphs: u16,
    keep_hinting: bool,
    builder: &mut FontBuilder,
) -> Result<(), PrepError> {
    let exception_gids = exception_gids(font)?;
    let head = Head::from_font(font)?;
    let long_loca = head.index_to_loc_format()? != 0;
    let loca = Loca::new(font.expect_table_data(LOCA)?, long_loca);
    let glyf = font.expect_table_data(glyf::GLYF)?;

    let mut new_glyf: Vec<u8> = Vec::with_capacity(glyf.len());
    let mut offsets: Vec<u32> = Vec::with_capacity(num_glyphs as usize + 1);
    offsets.push(0);
    let mut dropped = 0usize;
    for gid in 0..num_glyphs {
        let gid = GlyphId::new(gid);
        let range = loca.glyph_range(gid)?;
        let bytes = glyf
            .slice(range)
            .ok_or(tachy_font::ReadError::OutOfBounds)?;
        let glyph = GlyphData::new(bytes);

        let invalid = gid != GlyphId::NOTDEF
            && !glyph.is_empty()
            && glyph.number_of_contours()? == 0
            && !exception_gids.contains(&gid.to_u16());
        if invalid {
            dropped += 1;
        } else if keep_hinting {
            new_glyf.extend_from_slice(glyph.as_bytes());
        } else {
            strip_glyph_hints(&glyph, &mut new_glyf)?;
        }
        if new_glyf.len() % 2 != 0 {
            new_glyf.push(0);
        }
        offsets.push(new_glyf.len() as u32);
    }
    info!(
        "cleaned 'glyf': {} glyphs, {} emptied, {} bytes",
        num_glyphs,
        dropped,
        new_glyf.len()
    );

    let new_long = *offsets.last().unwrap_or(&0) >= 0x1_FFFF;
    builder.add_raw(LOCA, loca::pack_offsets(&offsets, new_long)?);
    builder.add_raw(glyf::GLYF, new_glyf);

    let mut new_head = font.expect_table_data(HEAD)?.as_bytes().to_vec();
    tachy_font::write_u32_at(&mut new_head, 8, 0)?; // checkSumAdjustment
    tachy_font::write_u16_at(&mut new_head, 50, new_long as u16)?;
    builder.add_raw(HEAD, new_head);
    Ok(())
}

/// Gids reached from a whitespace or default-ignorable code point via the
/// (3,1) subtable.
fn exception_gids(font: &FontRef) -> Result<HashSet<u16>, PrepError> {
    let cmap = Cmap::from_font(font)?;
    let subtable = cmap
        .find(cmap::WINDOWS_BMP)?
        .ok_or(PrepError::NoUnicodeCmap)?;
    let format4 = cmap::Format4::new(subtable.data)?;
    let mut gids = HashSet::new();
    for (code, gid) in format4.mappings()? {
        if is_exception_codepoint(code) {
            gids.insert(gid);
        }
    }
    Ok(gids)
}

/// Copy one glyph with its hinting removed.
fn strip_glyph_hints(glyph: &GlyphData, out: &mut Vec<u8>) -> Result<(), PrepError> {
    let bytes = glyph.as_bytes();
    if bytes.is_empty() {
        return Ok(());
    }
    if glyph.number_of_contours()? == 0 {
        // header-only glyph, nothing to strip
        out.extend_from_slice(bytes);
        return Ok(());
    }
    if let Some(instructions) = glyph.instructions()? {
        // simple glyph: zero the instructionLength field and drop the
        // instruction bytes
        let field = instructions.length_field_offset;
        out.extend_from_slice(&bytes[..field]);
        out.extend_from_slice(&0u16.to_be_bytes());
        let after = field + 2 + instructions.count as usize;
        out.extend_from_slice(bytes.get(after..).unwrap_or_default());
        return Ok(());
    }

    // composite: clear WE_HAVE_INSTRUCTIONS and truncate after the last
    // component record
    let start = out.len();
    out.extend_from_slice(bytes);
    let mut end = bytes.len();
    for component in glyph.components() {
        let component = component?;
        if component.has_instructions() {
            let flags = component.flags & !glyf::WE_HAVE_INSTRUCTIONS;
            tachy_font::write_u16_at(out, start + component.record_offset, flags)?;
        }
        if !component.has_more() {
            end = component.record_end;
        }
    }
    out.truncate(start + end);
    Ok(())
}

/// Rebuild `cmap` with a flattened (3,1) format-4 subtable and, when the
/// source has one, the (3,10) format-12 subtable copied group-for-group.
fn rebuild_cmap(font: &FontRef) -> Result<Vec<u8>, PrepError> {
    let cmap = Cmap::from_font(font)?;
    let subtable = cmap
        .find(cmap::WINDOWS_BMP)?
        .ok_or(PrepError::NoUnicodeCmap)?;
    let format4 = cmap::Format4::new(subtable.data)?;
    let bmp_mappings: Vec<(u16, u16)> = format4
        .mappings()?
        .into_iter()
        .map(|(code, gid)| (code as u16, gid))
        .collect();
    let flat = cmap::flatten_mappings(&bmp_mappings);
    debug!(
        "flattened cmap format 4: {} mappings into {} segments",
        bmp_mappings.len(),
        flat.len()
    );
    let mut subtables = vec![(cmap::WINDOWS_BMP, cmap::build_format4_flat(&flat))];

    if let Some(full) = cmap.find(cmap::WINDOWS_FULL)? {
        let format12 = cmap::Format12::new(full.data)?;
        subtables.push((cmap::WINDOWS_FULL, cmap::build_format12(&format12.groups()?)));
    }
    Ok(cmap::build_cmap(&subtables))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tachy_font::tables::cmap::WINDOWS_BMP;
    use tachy_test_fonts as test_fonts;

    #[test]
    fn empties_unmapped_zero_contour_glyphs() {
        // gid 3 is zero-contour and mapped from a letter; gid 4 is
        // zero-contour but mapped from U+0020
        let font_bytes = test_fonts::truetype_font();
        let cleaned = clean(&font_bytes, false).unwrap();
        let font = FontRef::new(&cleaned).unwrap();
        let head = Head::from_font(&font).unwrap();
        let loca = Loca::new(
            font.table_data(LOCA).unwrap(),
            head.index_to_loc_format().unwrap() != 0,
        );
        assert!(loca.glyph_range(GlyphId::new(3)).unwrap().is_empty());
        assert!(!loca.glyph_range(GlyphId::new(4)).unwrap().is_empty());
        // notdef keeps its outline
        assert!(!loca.glyph_range(GlyphId::NOTDEF).unwrap().is_empty());
    }

    #[test]
    fn strips_hinting_tables_and_instructions() {
        let font_bytes = test_fonts::truetype_font();
        let cleaned = clean(&font_bytes, false).unwrap();
        let font = FontRef::new(&cleaned).unwrap();
        assert!(!font.has_table(Tag::new(b"fpgm")));

        let head = Head::from_font(&font).unwrap();
        let loca = Loca::new(
            font.table_data(LOCA).unwrap(),
            head.index_to_loc_format().unwrap() != 0,
        );
        let glyf = font.table_data(glyf::GLYF).unwrap();
        let range = loca.glyph_range(GlyphId::new(1)).unwrap();
        let glyph = GlyphData::new(glyf.slice(range).unwrap());
        assert_eq!(glyph.instructions().unwrap().unwrap().count, 0);
    }

    #[test]
    fn keep_hinting_keeps_tables() {
        let font_bytes = test_fonts::truetype_font();
        let cleaned = clean(&font_bytes, true).unwrap();
        let font = FontRef::new(&cleaned).unwrap();
        assert!(font.has_table(Tag::new(b"fpgm")));
    }

    #[test]
    fn cmap_is_flattened() {
        let font_bytes = test_fonts::truetype_font();
        let cleaned = clean(&font_bytes, false).unwrap();
        let font = FontRef::new(&cleaned).unwrap();
        let cmap = Cmap::from_font(&font).unwrap();
        let subtable = cmap.find(WINDOWS_BMP).unwrap().unwrap();
        let format4 = cmap::Format4::new(subtable.data).unwrap();
        for segment in format4.segments() {
            assert_eq!(segment.unwrap().id_range_offset, 0);
        }
        // the mapping survives flattening
        assert!(format4
            .mappings()
            .unwrap()
            .contains(&(0x61, test_fonts::GID_A as u16)));
    }
}

//! Stage P4: the `glyph_table`/`glyph_data` pair and the
//! `codepoints`/`gids` arrays.

use log::info;
use tachy_font::artifact::{GlyphRecord, GlyphTableHeader, HAS_CFF, HAS_HMTX, HAS_VMTX};
use tachy_font::tables::cff::Cff;
use tachy_font::tables::cmap::{self, Cmap, Format12, Format4};
use tachy_font::tables::glyf::GLYF;
use tachy_font::tables::head::Head;
use tachy_font::tables::hmtx::{Hmtx, HMTX, VMTX};
use tachy_font::tables::loca::{Loca, LOCA};
use tachy_font::tables::maxp::Maxp;
use tachy_font::tables::metrics_header::MetricsHeader;
use tachy_font::{FontRef, GlyphId, OutlineFlavor, ReadError};

use crate::PrepError;

/// Serialize the per-glyph index and payload for a cleaned font.
pub fn serialize_glyphs(font: &FontRef) -> Result<(Vec<u8>, Vec<u8>), PrepError> {
    let num_glyphs = Maxp::from_font(font)?.num_glyphs()?;
    let flavor = font.outline_flavor()?;

    let hmtx = metrics(font, HMTX, num_glyphs)?;
    let vmtx = metrics(font, VMTX, num_glyphs)?;
    let mut flags = 0u16;
    if hmtx.is_some() {
        flags |= HAS_HMTX;
    }
    if vmtx.is_some() {
        flags |= HAS_VMTX;
    }
    if flavor == OutlineFlavor::Cff {
        flags |= HAS_CFF;
    }

    // (offset, length) per gid plus the tightly packed payload
    let (slices, glyph_data, cff_data_region_offset) = match flavor {
        OutlineFlavor::Glyf => glyf_slices(font, num_glyphs)?,
        OutlineFlavor::Cff => cff_slices(font, num_glyphs)?,
    };

    let header = GlyphTableHeader {
        flags,
        num_glyphs,
        cff_data_region_offset,
    };
    let mut glyph_table = Vec::with_capacity(header.byte_len() + num_glyphs as usize * header.entry_len());
    header.write(&mut glyph_table);
    for (gid, &(offset, length)) in slices.iter().enumerate() {
        let gid = GlyphId::new(gid as u16);
        let record = GlyphRecord {
            gid,
            h_side_bearing: side_bearing(&hmtx, gid)?,
            v_side_bearing: side_bearing(&vmtx, gid)?,
            offset,
            length,
        };
        record.write(&mut glyph_table);
    }
    info!(
        "glyph table: {} records, {} payload bytes",
        num_glyphs,
        glyph_data.len()
    );
    Ok((glyph_table, glyph_data))
}

fn metrics<'a>(
    font: &FontRef<'a>,
    tag: tachy_font::Tag,
    num_glyphs: u16,
) -> Result<Option<Hmtx<'a>>, PrepError> {
    let Some(data) = font.table_data(tag) else {
        return Ok(None);
    };
    let count = if tag == HMTX {
        MetricsHeader::hhea(font)?.number_of_metrics()?
    } else {
        match MetricsHeader::vhea(font) {
            Some(vhea) => vhea.number_of_metrics()?,
            None => return Ok(None),
        }
    };
    Ok(Some(Hmtx::new(data, count, num_glyphs)))
}

fn side_bearing(mtx: &Option<Hmtx>, gid: GlyphId) -> Result<Option<i16>, PrepError> {
    mtx.as_ref()
        .map(|table| table.side_bearing(gid))
        .transpose()
        .map_err(PrepError::from)
}

fn glyf_slices(
    font: &FontRef,
    num_glyphs: u16,
) -> Result<(Vec<(u32, u16)>, Vec<u8>, u32), PrepError> {
    let long = Head::from_font(font)?.index_to_loc_format()? != 0;
    let loca = Loca::new(font.expect_table_data(LOCA)?, long);
    let glyf = font.expect_table_data(GLYF)?;

    let mut slices = Vec::with_capacity(num_glyphs as usize);
    let mut data = Vec::with_capacity(glyf.len());
    for gid in 0..num_glyphs {
        let range = loca.glyph_range(GlyphId::new(gid))?;
        let length = record_length(gid, range.len())?;
        slices.push((range.start as u32, length));
        data.extend_from_slice(
            glyf.slice(range).ok_or(ReadError::OutOfBounds)?.as_bytes(),
        );
    }
    Ok((slices, data, 0))
}

fn cff_slices(
    font: &FontRef,
    num_glyphs: u16,
) -> Result<(Vec<(u32, u16)>, Vec<u8>, u32), PrepError> {
    let cff = Cff::from_font(font)?;
    let charstrings = cff.charstrings()?;
    if charstrings.count != num_glyphs {
        return Err(ReadError::MalformedData("CharStrings count != maxp.numGlyphs").into());
    }
    let data_region_offset = charstrings.offset_base() as u32;

    let mut slices = Vec::with_capacity(num_glyphs as usize);
    let mut data = Vec::with_capacity(charstrings.data_len());
    let offsets = charstrings.offsets();
    for gid in 0..num_glyphs as usize {
        let length = record_length(gid as u16, (offsets[gid + 1] - offsets[gid]) as usize)?;
        slices.push((offsets[gid] + data_region_offset, length));
        data.extend_from_slice(charstrings.item(gid)?);
    }
    Ok((slices, data, data_region_offset))
}

fn record_length(gid: u16, len: usize) -> Result<u16, PrepError> {
    u16::try_from(len).map_err(|_| PrepError::GlyphTooLong { gid, len })
}

/// Flatten the unicode cmap into the parallel `codepoints`/`gids` arrays,
/// preferring the full-repertoire (3,10) subtable.
pub fn dump_codepoints(font: &FontRef) -> Result<(Vec<u8>, Vec<u8>), PrepError> {
    let cmap = Cmap::from_font(font)?;
    let mappings = if let Some(full) = cmap.find(cmap::WINDOWS_FULL)? {
        Format12::new(full.data)?.mappings()?
    } else if let Some(bmp) = cmap.find(cmap::WINDOWS_BMP)? {
        Format4::new(bmp.data)?.mappings()?
    } else {
        return Err(PrepError::NoUnicodeCmap);
    };

    let mut codepoints = Vec::with_capacity(mappings.len() * 4);
    let mut gids = Vec::with_capacity(mappings.len() * 2);
    for (code, gid) in mappings {
        codepoints.extend_from_slice(&code.to_be_bytes());
        gids.extend_from_slice(&gid.to_be_bytes());
    }
    Ok((codepoints, gids))
}

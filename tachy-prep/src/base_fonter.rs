//! Stage P3: the base font.
//!
//! The cleaned font is rewritten in place: side bearings zeroed, outline
//! payload erased, offset tables collapsed into fixed-size blocks so the
//! client can patch individual glyphs later, cmap payloads blanked. The
//! result is run-length encoded and optionally prefixed with the typed
//! metadata header.

use log::{debug, info};
use tachy_font::artifact::{rle_decode, rle_encode, TypedHeader};
use tachy_font::tables::cff::Cff;
use tachy_font::tables::cmap::{self, Cmap};
use tachy_font::tables::glyf::GLYF;
use tachy_font::tables::head::Head;
use tachy_font::tables::hmtx::{Hmtx, HMTX, VMTX};
use tachy_font::tables::loca::{self, Loca, LOCA};
use tachy_font::tables::maxp::Maxp;
use tachy_font::tables::metrics_header::MetricsHeader;
use tachy_font::{FontRef, GlyphId, OutlineFlavor, ReadError};

use crate::PrepError;

/// Offsets are collapsed in blocks of this many entries.
pub const LOCA_BLOCK_SIZE: usize = 64;

/// Build the base artifact from the cleaned font.
pub fn build_base(clean: &[u8], header: Option<&TypedHeader>) -> Result<Vec<u8>, PrepError> {
    let font = FontRef::new(clean)?;
    let flavor = font.outline_flavor()?;
    let mut out = clean.to_vec();

    zero_side_bearings(&font, &mut out)?;
    match flavor {
        OutlineFlavor::Glyf => {
            erase_glyf(&font, &mut out)?;
            fill_loca(&font, &mut out)?;
        }
        OutlineFlavor::Cff => {
            fill_charstrings(&font, &mut out)?;
            zero_charset(&font, &mut out)?;
        }
    }
    zero_cmap_payloads(&font, &mut out)?;

    let encoded = rle_encode(&out);
    let decoded = rle_decode(&encoded)?;
    if decoded != out {
        return Err(PrepError::RleRoundTripMismatch);
    }
    info!(
        "base font: {} bytes rewritten, {} bytes encoded",
        out.len(),
        encoded.len()
    );

    let mut base = match header {
        Some(header) => header.encode(),
        None => Vec::new(),
    };
    base.extend_from_slice(&encoded);
    Ok(base)
}

/// Zero every side bearing in `hmtx` and `vmtx`, leaving advances alone.
fn zero_side_bearings(font: &FontRef, out: &mut [u8]) -> Result<(), PrepError> {
    let num_glyphs = Maxp::from_font(font)?.num_glyphs()?;

    let mut tables = vec![(
        HMTX,
        MetricsHeader::hhea(font)?.number_of_metrics()?,
    )];
    if let Some(vhea) = MetricsHeader::vhea(font) {
        tables.push((VMTX, vhea.number_of_metrics()?));
    }
    for (tag, number_of_metrics) in tables {
        let Some(range) = font.table_range(tag) else {
            continue;
        };
        let data = font.table_data(tag).ok_or(ReadError::OutOfBounds)?;
        let mtx = Hmtx::new(data, number_of_metrics, num_glyphs);
        for gid in 0..num_glyphs {
            let offset = mtx.side_bearing_offset(GlyphId::new(gid))?;
            tachy_font::write_u16_at(out, range.start + offset, 0)?;
        }
    }
    Ok(())
}

fn erase_glyf(font: &FontRef, out: &mut [u8]) -> Result<(), PrepError> {
    let range = font
        .table_range(GLYF)
        .ok_or(ReadError::TableIsMissing(GLYF))?;
    out[range].fill(0);
    Ok(())
}

/// Collapse each block of offsets to a single value.
///
/// With `fill_with_upper` every entry becomes the block's last value (the
/// loca form); otherwise the block's first (the CharStrings form). The
/// trailing partial block uses its own last or first entry respectively.
fn fill_blocks(values: &mut [u32], fill_with_upper: bool) {
    let mut chunks = values.chunks_exact_mut(LOCA_BLOCK_SIZE);
    for chunk in &mut chunks {
        let fill = if fill_with_upper {
            chunk[LOCA_BLOCK_SIZE - 1]
        } else {
            chunk[0]
        };
        chunk.fill(fill);
    }
    let remainder = chunks.into_remainder();
    if !remainder.is_empty() {
        let fill = if fill_with_upper {
            remainder[remainder.len() - 1]
        } else {
            remainder[0]
        };
        remainder.fill(fill);
    }
}

fn fill_loca(font: &FontRef, out: &mut [u8]) -> Result<(), PrepError> {
    let long = Head::from_font(font)?.index_to_loc_format()? != 0;
    let range = font
        .table_range(LOCA)
        .ok_or(ReadError::TableIsMissing(LOCA))?;
    let loca = Loca::new(font.table_data(LOCA).ok_or(ReadError::OutOfBounds)?, long);
    let mut offsets = loca.all_offsets()?;
    fill_blocks(&mut offsets, true);
    let packed = loca::pack_offsets(&offsets, long)?;
    debug_assert_eq!(packed.len(), range.len());
    out[range].copy_from_slice(&packed);
    Ok(())
}

/// After collapsing, consecutive block boundaries must stay within a
/// 16-bit span, since the client patches per-glyph lengths as u16.
fn validate_block_gaps(offsets: &[u32]) -> Result<(), PrepError> {
    let mut i = LOCA_BLOCK_SIZE;
    while i < offsets.len() {
        let gap = offsets[i] - offsets[i - 1];
        if gap >= 0x1_0000 {
            return Err(PrepError::CharStringGapTooWide { gap });
        }
        i += LOCA_BLOCK_SIZE;
    }
    Ok(())
}

fn fill_charstrings(font: &FontRef, out: &mut [u8]) -> Result<(), PrepError> {
    let cff = Cff::from_font(font)?;
    let table_start = font
        .table_range(tachy_font::tables::cff::CFF)
        .ok_or(ReadError::OutOfBounds)?
        .start;
    let charstrings = cff.charstrings()?;
    if charstrings.count == 0 {
        return Ok(());
    }

    // fake empty CharStrings: the whole data region becomes 0x00 bytes
    let data_start = table_start + charstrings.offset_base() + 1;
    let data_end = data_start + charstrings.data_len();
    out.get_mut(data_start..data_end)
        .ok_or(ReadError::OutOfBounds)?
        .fill(0);

    let mut offsets = charstrings.offsets().to_vec();
    fill_blocks(&mut offsets, false);
    validate_block_gaps(&offsets)?;

    let mut packed = Vec::with_capacity(offsets.len() * charstrings.off_size as usize);
    for offset in &offsets {
        let bytes = (*offset as u64).to_be_bytes();
        packed.extend_from_slice(&bytes[8 - charstrings.off_size as usize..]);
    }
    let array_start = table_start + charstrings.offset_array_pos();
    tachy_font::write_bytes_at(out, array_start, &packed)?;
    debug!(
        "collapsed {} CharStrings offsets in blocks of {LOCA_BLOCK_SIZE}",
        offsets.len()
    );
    Ok(())
}

fn zero_charset(font: &FontRef, out: &mut [u8]) -> Result<(), PrepError> {
    let cff = Cff::from_font(font)?;
    let Some(offset) = cff.charset_offset() else {
        return Ok(());
    };
    let table_start = font
        .table_range(tachy_font::tables::cff::CFF)
        .ok_or(ReadError::OutOfBounds)?
        .start;
    let num_glyphs = cff.charstrings()?.count;
    let charset = tachy_font::tables::cff::Charset::read(cff.data(), offset, num_glyphs)?;
    if charset.format != 2 {
        return Ok(());
    }
    let start = table_start + offset + 1;
    let end = start + charset.ranges.len() * 4;
    out.get_mut(start..end)
        .ok_or(ReadError::OutOfBounds)?
        .fill(0);
    Ok(())
}

/// Blank the (3,10) format-12 and (3,1) format-4 payloads, keeping the
/// headers so the client can still locate the subtables.
fn zero_cmap_payloads(font: &FontRef, out: &mut [u8]) -> Result<(), PrepError> {
    let range = font
        .table_range(cmap::CMAP)
        .ok_or(ReadError::TableIsMissing(cmap::CMAP))?;
    let cmap = Cmap::from_font(font)?;
    for (platform_encoding, format, header_len) in [
        (cmap::WINDOWS_FULL, 12, cmap::FORMAT12_HEADER_LEN),
        (cmap::WINDOWS_BMP, 4, cmap::FORMAT4_HEADER_LEN),
    ] {
        let Some(subtable) = cmap.find(platform_encoding)? else {
            continue;
        };
        if subtable.format != format {
            continue;
        }
        let start = range.start + subtable.offset + header_len;
        let end = range.start + subtable.offset + subtable.length;
        out.get_mut(start..end)
            .ok_or(ReadError::OutOfBounds)?
            .fill(0);
    }
    Ok(())
}

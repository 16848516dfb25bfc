//! Stage P5: the typed metadata header.
//!
//! Collects the offsets and counts the runtime needs to patch the base
//! font, plus the compacted cmap and charset streams, into a BSAC block.

use log::debug;
use tachy_font::artifact::TypedHeader;
use tachy_font::tables::cff::{self, Cff};
use tachy_font::tables::cmap::{self, Cmap, Format12, FORMAT12_HEADER_LEN};
use tachy_font::tables::glyf::GLYF;
use tachy_font::tables::head::Head;
use tachy_font::tables::hmtx::{HMTX, VMTX};
use tachy_font::tables::loca::LOCA;
use tachy_font::tables::maxp::Maxp;
use tachy_font::tables::metrics_header::MetricsHeader;
use tachy_font::{FontRef, OutlineFlavor, ReadError, Tag};

use crate::gos::{CmapCompacter, GosType};
use crate::PrepError;

pub const GLOF: Tag = Tag::new(b"GLOF");
pub const GLCN: Tag = Tag::new(b"GLCN");
pub const LCOF: Tag = Tag::new(b"LCOF");
pub const LCFM: Tag = Tag::new(b"LCFM");
pub const HMOF: Tag = Tag::new(b"HMOF");
pub const VMOF: Tag = Tag::new(b"VMOF");
pub const HMMC: Tag = Tag::new(b"HMMC");
pub const VMMC: Tag = Tag::new(b"VMMC");
pub const TYPE: Tag = Tag::new(b"TYPE");
pub const CCMP: Tag = Tag::new(b"CCMP");
pub const CM12: Tag = Tag::new(b"CM12");
pub const CS02: Tag = Tag::new(b"CS02");

/// Build the typed header for a cleaned font.
pub fn build_typed_header(font: &FontRef) -> Result<TypedHeader, PrepError> {
    let flavor = font.outline_flavor()?;
    let mut header = TypedHeader::new();

    match flavor {
        OutlineFlavor::Glyf => {
            let glyf = font
                .table_range(GLYF)
                .ok_or(ReadError::TableIsMissing(GLYF))?;
            let loca = font
                .table_range(LOCA)
                .ok_or(ReadError::TableIsMissing(LOCA))?;
            header.add(GLOF, (glyf.start as u32).to_be_bytes().to_vec());
            glyph_count(font, &mut header)?;
            header.add(LCOF, (loca.start as u32).to_be_bytes().to_vec());
            let element_size: u8 = if Head::from_font(font)?.index_to_loc_format()? == 0 {
                2
            } else {
                4
            };
            header.add(LCFM, vec![element_size]);
        }
        OutlineFlavor::Cff => {
            let table_start = font
                .table_range(cff::CFF)
                .ok_or(ReadError::TableIsMissing(cff::CFF))?
                .start;
            let cff = Cff::from_font(font)?;
            let charstrings = cff.charstrings()?;
            header.add(
                GLOF,
                ((table_start + charstrings.offset_base()) as u32)
                    .to_be_bytes()
                    .to_vec(),
            );
            glyph_count(font, &mut header)?;
            // count:u16 and offSize:u8 sit ahead of the offset array
            header.add(
                LCOF,
                ((table_start + cff.charstrings_offset()? + 3) as u32)
                    .to_be_bytes()
                    .to_vec(),
            );
            header.add(LCFM, vec![charstrings.off_size]);
        }
    }

    if let Some(hmtx) = font.table_range(HMTX) {
        header.add(HMOF, (hmtx.start as u32).to_be_bytes().to_vec());
    }
    if let Some(vmtx) = font.table_range(VMTX) {
        header.add(VMOF, (vmtx.start as u32).to_be_bytes().to_vec());
    }
    header.add(
        HMMC,
        MetricsHeader::hhea(font)?
            .number_of_metrics()?
            .to_be_bytes()
            .to_vec(),
    );
    if let Some(vhea) = MetricsHeader::vhea(font) {
        header.add(VMMC, vhea.number_of_metrics()?.to_be_bytes().to_vec());
    }
    header.add(
        TYPE,
        vec![match flavor {
            OutlineFlavor::Cff => 0u8,
            OutlineFlavor::Glyf => 1u8,
        }],
    );

    let compacter = CmapCompacter::new(font);
    if let Some((origin, n_groups)) = format12_origin(font)? {
        let ccmp =
            compacter.generate_gos_types(&[GosType::CmapDelta, GosType::Format4Alignment])?;
        header.add(CCMP, ccmp);
        let mut cm12 = origin.to_be_bytes().to_vec();
        cm12.extend_from_slice(&n_groups.to_be_bytes());
        header.add(CM12, cm12);
    }
    if flavor == OutlineFlavor::Cff {
        if let Some(gos) = compacter.generate_charset_gos()? {
            header.add(CS02, gos);
        }
    }

    debug!("typed header: {} entries", header.entries().len());
    Ok(header)
}

fn glyph_count(font: &FontRef, header: &mut TypedHeader) -> Result<(), PrepError> {
    let num_glyphs = Maxp::from_font(font)?.num_glyphs()?;
    header.add(GLCN, num_glyphs.to_be_bytes().to_vec());
    Ok(())
}

/// Absolute offset of the format-12 group array plus the group count.
fn format12_origin(font: &FontRef) -> Result<Option<(u32, u32)>, PrepError> {
    let Some(range) = font.table_range(cmap::CMAP) else {
        return Ok(None);
    };
    let cmap = Cmap::from_font(font)?;
    let Some(subtable) = cmap.find(cmap::WINDOWS_FULL)? else {
        return Ok(None);
    };
    if subtable.format != 12 {
        return Ok(None);
    }
    let format12 = Format12::new(subtable.data)?;
    let origin = (range.start + subtable.offset + FORMAT12_HEADER_LEN) as u32;
    Ok(Some((origin, format12.n_groups()?)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleaner::clean;
    use crate::gos::decode_gos;
    use tachy_test_fonts as test_fonts;

    #[test]
    fn truetype_header_entries() {
        let cleaned = clean(&test_fonts::truetype_font(), false).unwrap();
        let font = FontRef::new(&cleaned).unwrap();
        let header = build_typed_header(&font).unwrap();

        assert_eq!(
            header.get(GLCN),
            Some(test_fonts::NUM_GLYPHS.to_be_bytes().as_slice())
        );
        assert_eq!(header.get(TYPE), Some(&[1u8][..]));
        assert_eq!(header.get(LCFM), Some(&[2u8][..]));
        assert_eq!(
            header.get(HMMC),
            Some(test_fonts::NUM_H_METRICS.to_be_bytes().as_slice())
        );
        assert!(header.get(VMMC).is_some());
        assert!(header.get(CS02).is_none());

        let glof = u32::from_be_bytes(header.get(GLOF).unwrap().try_into().unwrap());
        assert_eq!(glof as usize, font.table_range(GLYF).unwrap().start);

        // CCMP holds a type-2 and a type-4 stream
        let ccmp = header.get(CCMP).unwrap();
        assert_eq!(ccmp[0], 2);
        let (first, used) = decode_gos(&ccmp[1..]).unwrap();
        assert_eq!(first.tag, 2);
        let (second, _) = decode_gos(&ccmp[1 + used..]).unwrap();
        assert_eq!(second.tag, 4);

        // CM12 points into the cmap table
        let cm12 = header.get(CM12).unwrap();
        assert_eq!(cm12.len(), 8);
        let n_groups = u32::from_be_bytes(cm12[4..8].try_into().unwrap());
        assert_eq!(n_groups, test_fonts::BMP_MAPPINGS.len() as u32 + 1);
    }

    #[test]
    fn cff_header_entries() {
        let cleaned = clean(&test_fonts::cff_font(), false).unwrap();
        let font = FontRef::new(&cleaned).unwrap();
        let header = build_typed_header(&font).unwrap();

        assert_eq!(header.get(TYPE), Some(&[0u8][..]));
        assert_eq!(header.get(LCFM), Some(&[1u8][..]));
        assert!(header.get(VMOF).is_none());
        assert!(header.get(VMMC).is_none());
        assert!(header.get(CS02).is_some());

        // LCOF skips the INDEX count and offSize bytes
        let table_start = font.table_range(cff::CFF).unwrap().start;
        let cff = Cff::from_font(&font).unwrap();
        let lcof = u32::from_be_bytes(header.get(LCOF).unwrap().try_into().unwrap());
        assert_eq!(
            lcof as usize,
            table_start + cff.charstrings_offset().unwrap() + 3
        );
        let glof = u32::from_be_bytes(header.get(GLOF).unwrap().try_into().unwrap());
        assert_eq!(
            glof as usize,
            table_start + cff.charstrings().unwrap().offset_base()
        );
    }
}

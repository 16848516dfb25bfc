//! Synthetic fonts exercising the delivery pipeline.
//!
//! The TrueType font covers: hinted simple glyphs, a hinted composite,
//! zero-contour glyphs both droppable and whitespace-mapped, short and
//! long hmtx entries, a vmtx table, a GSUB substitution, and both (3,1)
//! and (3,10) cmap subtables. The CFF font covers: local and global
//! subroutine calls, a format-2 charset and a Private DICT.

use tachy_font::tables::cff;
use tachy_font::tables::cmap::{
    build_cmap, build_format12, build_format4_flat, flatten_mappings, SequentialGroup,
    WINDOWS_BMP, WINDOWS_FULL,
};
use tachy_font::tables::glyf::{
    ARG_1_AND_2_ARE_WORDS, MORE_COMPONENTS, WE_HAVE_INSTRUCTIONS,
};
use tachy_font::{FontBuilder, Tag};

pub const GID_NOTDEF: u16 = 0;
pub const GID_A: u16 = 1;
pub const GID_COMPOSITE: u16 = 2;
pub const GID_DROPPABLE: u16 = 3;
pub const GID_SPACE: u16 = 4;
pub const GID_B: u16 = 5;
pub const GID_B_ALT: u16 = 6;

pub const NUM_GLYPHS: u16 = 7;
pub const NUM_H_METRICS: u16 = 4;

/// Codepoint → gid pairs present in the (3,1) subtable.
pub const BMP_MAPPINGS: &[(u16, u16)] = &[
    (0x20, GID_SPACE),
    (0x61, GID_A),
    (0x62, GID_B),
    (0x63, GID_COMPOSITE),
    (0x71, GID_DROPPABLE),
];

/// The supplementary-plane codepoint only the (3,10) subtable maps.
pub const SUPPLEMENTARY_CODEPOINT: u32 = 0x1F600;

/// A one-contour, three-point glyph with the given instruction bytes.
pub fn simple_glyph(instructions: &[u8]) -> Vec<u8> {
    let mut glyph = Vec::new();
    glyph.extend_from_slice(&1i16.to_be_bytes()); // numberOfContours
    for value in [0i16, 0, 100, 100] {
        glyph.extend_from_slice(&value.to_be_bytes());
    }
    glyph.extend_from_slice(&2u16.to_be_bytes()); // endPtsOfContours[0]
    glyph.extend_from_slice(&(instructions.len() as u16).to_be_bytes());
    glyph.extend_from_slice(instructions);
    glyph.extend_from_slice(&[0x01, 0x01, 0x01]); // flags: on-curve, long deltas
    for delta in [0i16, 50, 0] {
        glyph.extend_from_slice(&delta.to_be_bytes()); // x deltas
    }
    for delta in [0i16, 0, 60] {
        glyph.extend_from_slice(&delta.to_be_bytes()); // y deltas
    }
    glyph
}

/// A composite glyph over `components`, carrying a one-byte instruction
/// block.
pub fn composite_glyph(components: &[u16]) -> Vec<u8> {
    let mut glyph = Vec::new();
    glyph.extend_from_slice(&(-1i16).to_be_bytes());
    for value in [0i16, 0, 100, 100] {
        glyph.extend_from_slice(&value.to_be_bytes());
    }
    for (i, gid) in components.iter().enumerate() {
        let last = i + 1 == components.len();
        let mut flags = ARG_1_AND_2_ARE_WORDS | 0x0002; // ARGS_ARE_XY_VALUES
        if !last {
            flags |= MORE_COMPONENTS;
        } else {
            flags |= WE_HAVE_INSTRUCTIONS;
        }
        glyph.extend_from_slice(&flags.to_be_bytes());
        glyph.extend_from_slice(&gid.to_be_bytes());
        glyph.extend_from_slice(&0i16.to_be_bytes());
        glyph.extend_from_slice(&0i16.to_be_bytes());
    }
    glyph.extend_from_slice(&1u16.to_be_bytes()); // instructionLength
    glyph.push(0x4B);
    glyph
}

/// A zero-contour glyph that still occupies bytes (header only).
pub fn marker_glyph() -> Vec<u8> {
    let mut glyph = vec![0u8; 10];
    glyph[0..2].copy_from_slice(&0i16.to_be_bytes());
    glyph
}

/// Glyph payloads of the TrueType font, by gid.
pub fn truetype_glyphs() -> Vec<Vec<u8>> {
    vec![
        simple_glyph(&[0xAA]),
        simple_glyph(&[0xBB, 0xCC]),
        composite_glyph(&[GID_A, GID_B]),
        marker_glyph(),
        marker_glyph(),
        simple_glyph(&[]),
        simple_glyph(&[]),
    ]
}

pub fn head_table(index_to_loc_format: i16) -> Vec<u8> {
    let mut head = vec![0u8; 54];
    head[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes()); // version
    head[12..16].copy_from_slice(&0x5F0F_3CF5u32.to_be_bytes()); // magic
    head[18..20].copy_from_slice(&1000u16.to_be_bytes()); // unitsPerEm
    head[50..52].copy_from_slice(&index_to_loc_format.to_be_bytes());
    head
}

pub fn maxp_table(num_glyphs: u16) -> Vec<u8> {
    let mut maxp = vec![0u8; 32];
    maxp[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    maxp[4..6].copy_from_slice(&num_glyphs.to_be_bytes());
    maxp
}

/// An `hhea`/`vhea` body with the metric count in its trailing field.
pub fn metrics_header_table(number_of_metrics: u16) -> Vec<u8> {
    let mut table = vec![0u8; 36];
    table[0..4].copy_from_slice(&0x0001_0000u32.to_be_bytes());
    table[34..36].copy_from_slice(&number_of_metrics.to_be_bytes());
    table
}

/// Long-metrics bytes: `(advance, bearing)` pairs then bare bearings.
pub fn metrics_table(long: &[(u16, i16)], short: &[i16]) -> Vec<u8> {
    let mut out = Vec::new();
    for (advance, bearing) in long {
        out.extend_from_slice(&advance.to_be_bytes());
        out.extend_from_slice(&bearing.to_be_bytes());
    }
    for bearing in short {
        out.extend_from_slice(&bearing.to_be_bytes());
    }
    out
}

/// A GSUB with one single-substitution lookup mapping `from` to `to`.
pub fn gsub_single_subst(from: u16, to: u16) -> Vec<u8> {
    let mut gsub = Vec::new();
    gsub.extend_from_slice(&1u16.to_be_bytes()); // major
    gsub.extend_from_slice(&0u16.to_be_bytes()); // minor
    gsub.extend_from_slice(&10u16.to_be_bytes()); // scriptList (empty-ish)
    gsub.extend_from_slice(&10u16.to_be_bytes()); // featureList
    gsub.extend_from_slice(&10u16.to_be_bytes()); // lookupList

    // lookup list
    gsub.extend_from_slice(&1u16.to_be_bytes()); // lookupCount
    gsub.extend_from_slice(&4u16.to_be_bytes()); // lookup 0 offset
    // lookup
    gsub.extend_from_slice(&1u16.to_be_bytes()); // type: single
    gsub.extend_from_slice(&0u16.to_be_bytes()); // flag
    gsub.extend_from_slice(&1u16.to_be_bytes()); // subtableCount
    gsub.extend_from_slice(&8u16.to_be_bytes()); // subtable offset
    // single subst format 2
    gsub.extend_from_slice(&2u16.to_be_bytes());
    gsub.extend_from_slice(&8u16.to_be_bytes()); // coverage offset
    gsub.extend_from_slice(&1u16.to_be_bytes()); // glyphCount
    gsub.extend_from_slice(&to.to_be_bytes());
    // coverage format 1
    gsub.extend_from_slice(&1u16.to_be_bytes());
    gsub.extend_from_slice(&1u16.to_be_bytes());
    gsub.extend_from_slice(&from.to_be_bytes());
    gsub
}

fn build_glyf_loca(glyphs: &[Vec<u8>]) -> (Vec<u8>, Vec<u8>, i16) {
    let mut glyf = Vec::new();
    let mut offsets = vec![0u32];
    for glyph in glyphs {
        glyf.extend_from_slice(glyph);
        if glyf.len() % 2 != 0 {
            glyf.push(0);
        }
        offsets.push(glyf.len() as u32);
    }
    let long = *offsets.last().unwrap() >= 0x1_FFFF;
    let loca = tachy_font::tables::loca::pack_offsets(&offsets, long).unwrap();
    (glyf, loca, long as i16)
}

fn sample_cmap() -> Vec<u8> {
    let format4 = build_format4_flat(&flatten_mappings(BMP_MAPPINGS));
    let mut groups: Vec<SequentialGroup> = BMP_MAPPINGS
        .iter()
        .map(|&(code, gid)| SequentialGroup {
            start_code: code as u32,
            end_code: code as u32,
            start_gid: gid as u32,
        })
        .collect();
    groups.push(SequentialGroup {
        start_code: SUPPLEMENTARY_CODEPOINT,
        end_code: SUPPLEMENTARY_CODEPOINT,
        start_gid: GID_B_ALT as u32,
    });
    let format12 = build_format12(&groups);
    build_cmap(&[(WINDOWS_BMP, format4), (WINDOWS_FULL, format12)])
}

/// The TrueType test font.
pub fn truetype_font() -> Vec<u8> {
    let (glyf, loca, loc_format) = build_glyf_loca(&truetype_glyphs());

    let hmtx = metrics_table(
        &[(500, 10), (550, 11), (600, 12), (0, 13)],
        &[0, 15, 16],
    );
    let vmtx = metrics_table(
        &[
            (1000, 20),
            (1000, 21),
            (1000, 22),
            (1000, 23),
            (1000, 24),
            (1000, 25),
            (1000, 26),
        ],
        &[],
    );

    let mut builder = FontBuilder::default();
    builder.add_raw(Tag::new(b"head"), head_table(loc_format));
    builder.add_raw(Tag::new(b"maxp"), maxp_table(NUM_GLYPHS));
    builder.add_raw(Tag::new(b"hhea"), metrics_header_table(NUM_H_METRICS));
    builder.add_raw(Tag::new(b"hmtx"), hmtx);
    builder.add_raw(Tag::new(b"vhea"), metrics_header_table(NUM_GLYPHS));
    builder.add_raw(Tag::new(b"vmtx"), vmtx);
    builder.add_raw(Tag::new(b"glyf"), glyf);
    builder.add_raw(Tag::new(b"loca"), loca);
    builder.add_raw(Tag::new(b"cmap"), sample_cmap());
    builder.add_raw(Tag::new(b"GSUB"), gsub_single_subst(GID_B, GID_B_ALT));
    builder.add_raw(Tag::new(b"fpgm"), vec![0xB0, 0x00]);
    builder.build()
}

pub const CFF_NUM_GLYPHS: u16 = 3;

/// Charstrings of the CFF font before desubroutinization.
pub fn cff_charstrings() -> Vec<Vec<u8>> {
    vec![
        vec![0x0E],             // .notdef: endchar
        vec![0x20, 0x0A, 0x0E], // calls local subr 0
        vec![0x20, 0x1D, 0x0E], // calls global subr 0
    ]
}

/// The same charstrings with all subroutine calls inlined.
pub fn cff_charstrings_desubroutinized() -> Vec<Vec<u8>> {
    vec![
        vec![0x0E],
        vec![0x93, 0x94, 0x0E],
        vec![0x95, 0x0E],
    ]
}

/// A minimal single-font CFF table: Name, Top DICT, String and Global
/// Subr INDEXes, a format-2 charset, the CharStrings INDEX, and a
/// Private DICT pointing at one local subroutine.
pub fn cff_table() -> Vec<u8> {
    let name_index = cff::build_index(&[b"TestFont"]);
    let string_index = cff::build_index(&[]);
    let gsubr = [0x95u8, 0x0B];
    let gsubr_index = cff::build_index(&[&gsubr]);
    let local_subr = [0x93u8, 0x94, 0x0B];
    let lsubr_index = cff::build_index(&[&local_subr]);

    let charstrings = cff_charstrings();
    let cs_refs: Vec<&[u8]> = charstrings.iter().map(|v| v.as_slice()).collect();
    let cs_index = cff::build_index(&cs_refs);

    // format 2 charset covering gids 1..=2 with consecutive sids
    let charset: Vec<u8> = vec![2, 0x00, 0x01, 0x00, 0x01];

    // private dict: Subrs = own length, placing the local subrs right
    // behind the dict
    let mut private = Vec::new();
    private.push(29);
    private.extend_from_slice(&6i32.to_be_bytes());
    private.push(cff::op::SUBRS as u8);
    assert_eq!(private.len(), 6);

    // top dict operands are 5-byte ints, so its length is layout-free
    let top_dict_len = 6 + 6 + 11;
    let top_dict_index_len = 2 + 1 + 2 + top_dict_len;

    let tail_start = 4 + name_index.len() + top_dict_index_len + string_index.len()
        + gsubr_index.len();
    let charset_offset = tail_start;
    let charstrings_offset = charset_offset + charset.len();
    let private_offset = charstrings_offset + cs_index.len();

    let mut top_dict = Vec::new();
    let mut push_int = |dict: &mut Vec<u8>, value: i32| {
        dict.push(29);
        dict.extend_from_slice(&value.to_be_bytes());
    };
    push_int(&mut top_dict, charset_offset as i32);
    top_dict.push(cff::op::CHARSET as u8);
    push_int(&mut top_dict, charstrings_offset as i32);
    top_dict.push(cff::op::CHAR_STRINGS as u8);
    push_int(&mut top_dict, private.len() as i32);
    push_int(&mut top_dict, private_offset as i32);
    top_dict.push(cff::op::PRIVATE as u8);
    assert_eq!(top_dict.len(), top_dict_len);
    let top_dict_index = cff::build_index(&[&top_dict]);
    assert_eq!(top_dict_index.len(), top_dict_index_len);

    let mut table = vec![1, 0, 4, 4]; // major, minor, hdrSize, offSize
    table.extend_from_slice(&name_index);
    table.extend_from_slice(&top_dict_index);
    table.extend_from_slice(&string_index);
    table.extend_from_slice(&gsubr_index);
    table.extend_from_slice(&charset);
    table.extend_from_slice(&cs_index);
    table.extend_from_slice(&private);
    table.extend_from_slice(&lsubr_index);
    table
}

/// The CFF test font.
pub fn cff_font() -> Vec<u8> {
    let format4 = build_format4_flat(&flatten_mappings(&[(0x61, 1), (0x62, 2)]));
    let format12 = build_format12(&[SequentialGroup {
        start_code: 0x61,
        end_code: 0x62,
        start_gid: 1,
    }]);
    let cmap = build_cmap(&[(WINDOWS_BMP, format4), (WINDOWS_FULL, format12)]);

    let mut builder = FontBuilder::default();
    builder.add_raw(Tag::new(b"CFF "), cff_table());
    builder.add_raw(Tag::new(b"head"), head_table(0));
    builder.add_raw(Tag::new(b"maxp"), maxp_table(CFF_NUM_GLYPHS));
    builder.add_raw(Tag::new(b"hhea"), metrics_header_table(CFF_NUM_GLYPHS));
    builder.add_raw(
        Tag::new(b"hmtx"),
        metrics_table(&[(400, 30), (410, 31), (420, 32)], &[]),
    );
    builder.add_raw(Tag::new(b"cmap"), cmap);
    builder.build()
}

//! End-to-end: preprocess a font, load the artifacts, assemble bundles,
//! and check the bundle bytes against the cleaned font.

use std::fs;

use pretty_assertions::assert_eq;
use tachy_bundler::{assemble_bundle, FontArtifacts};
use tachy_font::artifact::file_names;
use tachy_font::tables::glyf::GLYF;
use tachy_font::tables::head::Head;
use tachy_font::tables::loca::{Loca, LOCA};
use tachy_font::{FontRef, GlyphId};
use tachy_prep::Preprocessor;
use tachy_test_fonts as test_fonts;

const BUNDLE_HEADER_LEN: usize = 32;

struct Fixture {
    _dir: tempfile::TempDir,
    artifacts: FontArtifacts,
    cleaned: Vec<u8>,
    fingerprint: Vec<u8>,
}

fn preprocess(font_bytes: &[u8]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let fontfile = dir.path().join("font.ttf");
    fs::write(&fontfile, font_bytes).unwrap();
    let artifact_dir = dir.path().join("font");
    let summary = Preprocessor::new(false).run(&fontfile, &artifact_dir).unwrap();
    let cleaned = fs::read(&summary.cleaned_font).unwrap();
    let fingerprint = fs::read(artifact_dir.join(file_names::FINGERPRINT)).unwrap();
    Fixture {
        artifacts: FontArtifacts::load(&artifact_dir).unwrap(),
        cleaned,
        fingerprint,
        _dir: dir,
    }
}

/// One parsed bundle record.
#[derive(Debug, PartialEq, Eq)]
struct Record {
    gid: u16,
    payload: Vec<u8>,
}

fn parse_bundle(bundle: &[u8], has_hmtx: bool, has_vmtx: bool) -> (u16, Vec<Record>) {
    assert_eq!(&bundle[0..4], b"BSAC");
    assert_eq!(bundle[4], 1, "major");
    assert_eq!(bundle[5], 0, "minor");
    let gid_count = u16::from_be_bytes(bundle[28..30].try_into().unwrap());

    let mut entry_len = 2 + 4 + 2;
    if has_hmtx {
        entry_len += 2;
    }
    if has_vmtx {
        entry_len += 2;
    }

    let mut records = Vec::new();
    let mut pos = BUNDLE_HEADER_LEN;
    for _ in 0..gid_count {
        let gid = u16::from_be_bytes(bundle[pos..pos + 2].try_into().unwrap());
        let length =
            u16::from_be_bytes(bundle[pos + entry_len - 2..pos + entry_len].try_into().unwrap());
        pos += entry_len;
        let payload = bundle[pos..pos + length as usize].to_vec();
        pos += length as usize;
        records.push(Record { gid, payload });
    }
    assert_eq!(pos, bundle.len(), "bundle length is exact");
    (gid_count, records)
}

fn cleaned_glyf_bytes(cleaned: &[u8], gid: u16) -> Vec<u8> {
    let font = FontRef::new(cleaned).unwrap();
    let long = Head::from_font(&font).unwrap().index_to_loc_format().unwrap() != 0;
    let loca = Loca::new(font.table_data(LOCA).unwrap(), long);
    let range = loca.glyph_range(GlyphId::new(gid)).unwrap();
    font.table_data(GLYF)
        .unwrap()
        .slice(range)
        .unwrap()
        .as_bytes()
        .to_vec()
}

#[test]
fn empty_request_yields_bare_header() {
    let fixture = preprocess(&test_fonts::truetype_font());
    let bundle = assemble_bundle(&fixture.artifacts, &[]).unwrap();
    assert_eq!(bundle.len(), BUNDLE_HEADER_LEN);
    let (gid_count, records) = parse_bundle(&bundle, true, true);
    assert_eq!(gid_count, 0);
    assert!(records.is_empty());
}

#[test]
fn singleton_request_ships_one_exact_outline() {
    let fixture = preprocess(&test_fonts::truetype_font());
    let bundle = assemble_bundle(&fixture.artifacts, &[0x61]).unwrap();
    let (gid_count, records) = parse_bundle(&bundle, true, true);
    assert_eq!(gid_count, 1);
    assert_eq!(records[0].gid, test_fonts::GID_A);
    assert_eq!(
        records[0].payload,
        cleaned_glyf_bytes(&fixture.cleaned, test_fonts::GID_A)
    );
}

#[test]
fn composite_request_ships_the_whole_closure_sorted() {
    let fixture = preprocess(&test_fonts::truetype_font());
    // 'c' renders with the composite glyph; its components and the GSUB
    // alternate of component 'b' must ride along
    let bundle = assemble_bundle(&fixture.artifacts, &[0x63]).unwrap();
    let (_, records) = parse_bundle(&bundle, true, true);
    let gids: Vec<u16> = records.iter().map(|r| r.gid).collect();
    assert_eq!(
        gids,
        vec![
            test_fonts::GID_A,
            test_fonts::GID_COMPOSITE,
            test_fonts::GID_B,
            test_fonts::GID_B_ALT,
        ]
    );
    for record in &records {
        assert_eq!(
            record.payload,
            cleaned_glyf_bytes(&fixture.cleaned, record.gid),
            "gid {}",
            record.gid
        );
    }
}

#[test]
fn unmapped_codepoints_contribute_nothing() {
    let fixture = preprocess(&test_fonts::truetype_font());
    let empty = assemble_bundle(&fixture.artifacts, &[]).unwrap();
    let skipped = assemble_bundle(&fixture.artifacts, &[0x4E00]).unwrap();
    assert_eq!(empty, skipped);

    // mixed with a mapped codepoint the unmapped one is just dropped
    let mixed = assemble_bundle(&fixture.artifacts, &[0x4E00, 0x61]).unwrap();
    let only = assemble_bundle(&fixture.artifacts, &[0x61]).unwrap();
    assert_eq!(mixed, only);
}

#[test]
fn bundles_are_set_deterministic() {
    let fixture = preprocess(&test_fonts::truetype_font());
    let shuffled = assemble_bundle(&fixture.artifacts, &[0x63, 0x61, 0x63, 0x61]).unwrap();
    let sorted = assemble_bundle(&fixture.artifacts, &[0x61, 0x63]).unwrap();
    assert_eq!(shuffled, sorted);
}

#[test]
fn supplementary_codepoints_resolve_through_format12() {
    let fixture = preprocess(&test_fonts::truetype_font());
    let bundle =
        assemble_bundle(&fixture.artifacts, &[test_fonts::SUPPLEMENTARY_CODEPOINT]).unwrap();
    let (gid_count, records) = parse_bundle(&bundle, true, true);
    assert_eq!(gid_count, 1);
    assert_eq!(records[0].gid, test_fonts::GID_B_ALT);
}

#[test]
fn bundle_embeds_the_artifact_fingerprint() {
    let fixture = preprocess(&test_fonts::truetype_font());
    let bundle = assemble_bundle(&fixture.artifacts, &[0x61]).unwrap();
    let hex: String = bundle[8..28].iter().map(|b| format!("{b:02x}")).collect();
    assert_eq!(hex.as_bytes(), fixture.fingerprint.as_slice());
}

#[test]
fn cff_bundles_carry_desubroutinized_charstrings() {
    let fixture = preprocess(&test_fonts::cff_font());
    let bundle = assemble_bundle(&fixture.artifacts, &[0x61, 0x62]).unwrap();
    // the CFF test font has hmtx but no vmtx
    let (gid_count, records) = parse_bundle(&bundle, true, false);
    assert_eq!(gid_count, 2);
    let expected = test_fonts::cff_charstrings_desubroutinized();
    assert_eq!(records[0].gid, 1);
    assert_eq!(records[0].payload, expected[1]);
    assert_eq!(records[1].gid, 2);
    assert_eq!(records[1].payload, expected[2]);
}

#[test]
fn dropped_glyphs_still_resolve_to_empty_outlines() {
    let fixture = preprocess(&test_fonts::truetype_font());
    // 'q' mapped to a zero-contour glyph that cleaning emptied
    let bundle = assemble_bundle(&fixture.artifacts, &[0x71]).unwrap();
    let (gid_count, records) = parse_bundle(&bundle, true, true);
    assert_eq!(gid_count, 1);
    assert_eq!(records[0].gid, test_fonts::GID_DROPPABLE);
    assert!(records[0].payload.is_empty());
}

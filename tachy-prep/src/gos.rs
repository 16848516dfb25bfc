//! Stage P6: Group-of-Segments (GOS) streams.
//!
//! A GOS packs a segment array (cmap groups, charset ranges) into
//! fixed-width bit fields with an all-ones escape: a field value that
//! does not fit is written as all one-bits and its real value appended
//! to a trailing byte-aligned NoN stream.
//!
//! Stream layout: `tag:u8 || nGroups:u16 || bit-packed records ||
//! escape stream`; the charset types 6/7 carry an absolute `u32` table
//! offset between the tag and the group count.

use log::debug;
use tachy_font::tables::cff::{self, Cff, Charset};
use tachy_font::tables::cmap::{self, Cmap, Format12, Format4, Segment4};
use tachy_font::FontRef;

use crate::bit_stream::{BitReader, BitWriter, NibbleReader, NibbleWriter};
use crate::PrepError;

/// The GOS flavors, keyed by their on-wire tag byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GosType {
    /// cmap format 12 as (Δstart, length, Δgid) with narrow fields.
    CmapDelta = 2,
    /// cmap format 12 with literal 16-bit gids.
    CmapWideGid = 3,
    /// format-4 segment to format-12 group alignment counts.
    Format4Alignment = 4,
    /// cmap format 12, raw 32-bit triples.
    CmapRaw = 5,
    /// CFF charset format 2 as (Δfirst, ΔnLeft).
    CharsetFormat2 = 6,
    /// CFF charset format 1, same layout as type 6.
    CharsetFormat1 = 7,
}

impl GosType {
    pub fn tag(self) -> u8 {
        self as u8
    }
}

/// Per-field bit widths and escapability. The third width of 0 marks a
/// two-field record (charset types).
#[derive(Clone, Copy)]
struct FieldSchedule {
    widths: [u32; 3],
    escaped: [bool; 3],
}

const DELTA_SCHEDULE: FieldSchedule = FieldSchedule {
    widths: [3, 2, 3],
    escaped: [true, true, true],
};
const WIDE_GID_SCHEDULE: FieldSchedule = FieldSchedule {
    widths: [5, 3, 16],
    escaped: [true, true, false],
};
const ALIGNMENT_SCHEDULE: FieldSchedule = FieldSchedule {
    widths: [2, 0, 0],
    escaped: [true, false, false],
};
const CHARSET_SCHEDULE: FieldSchedule = FieldSchedule {
    widths: [5, 3, 0],
    escaped: [true, true, false],
};

impl GosType {
    fn schedule(self) -> FieldSchedule {
        match self {
            GosType::CmapDelta => DELTA_SCHEDULE,
            GosType::CmapWideGid => WIDE_GID_SCHEDULE,
            GosType::Format4Alignment => ALIGNMENT_SCHEDULE,
            GosType::CmapRaw => FieldSchedule {
                widths: [32, 32, 32],
                escaped: [false, false, false],
            },
            GosType::CharsetFormat2 | GosType::CharsetFormat1 => CHARSET_SCHEDULE,
        }
    }

    fn field_count(self) -> usize {
        self.schedule()
            .widths
            .iter()
            .filter(|&&width| width > 0)
            .count()
    }
}

pub struct CmapCompacter<'a> {
    font: &'a FontRef<'a>,
}

impl<'a> CmapCompacter<'a> {
    pub fn new(font: &'a FontRef<'a>) -> Self {
        CmapCompacter { font }
    }

    /// Emit `count:u8` followed by one GOS per requested type.
    pub fn generate_gos_types(&self, types: &[GosType]) -> Result<Vec<u8>, PrepError> {
        let mut out = vec![types.len() as u8];
        for &ty in types {
            out.extend_from_slice(&self.generate_gos_type(ty)?);
        }
        Ok(out)
    }

    pub fn generate_gos_type(&self, ty: GosType) -> Result<Vec<u8>, PrepError> {
        let stream = match ty {
            GosType::CmapDelta => {
                let groups = self.format12_groups()?;
                encode_stream(ty, None, &delta_triples(&groups))?
            }
            GosType::CmapWideGid => {
                let groups = self.format12_groups()?;
                let records: Vec<[i64; 3]> = {
                    let mut previous_start = 0i64;
                    groups
                        .iter()
                        .map(|&(start, length, gid)| {
                            let record =
                                [start as i64 - previous_start, length as i64, gid as i64];
                            previous_start = start as i64;
                            record
                        })
                        .collect()
                };
                encode_stream(ty, None, &records)?
            }
            GosType::Format4Alignment => {
                let counts = self.format4_alignment_counts()?;
                let records: Vec<[i64; 3]> =
                    counts.iter().map(|&count| [count as i64, 0, 0]).collect();
                encode_stream(ty, None, &records)?
            }
            GosType::CmapRaw => {
                let groups = self.format12_groups()?;
                let records: Vec<[i64; 3]> = groups
                    .iter()
                    .map(|&(start, length, gid)| [start as i64, length as i64, gid as i64])
                    .collect();
                encode_stream(ty, None, &records)?
            }
            GosType::CharsetFormat2 | GosType::CharsetFormat1 => {
                let (offset, charset) = self.charset()?;
                let expected_format = if ty == GosType::CharsetFormat2 { 2 } else { 1 };
                if charset.format != expected_format {
                    return Err(tachy_font::ReadError::InvalidFormat(
                        charset.format as i64,
                    )
                    .into());
                }
                let records = charset_deltas(&charset);
                encode_stream(ty, Some(offset), &records)?
            }
        };
        debug!("GOS type {}: {} bytes", ty.tag(), stream.len());
        Ok(stream)
    }

    /// The GOS for the font's charset, picking the tag from its format.
    pub fn generate_charset_gos(&self) -> Result<Option<Vec<u8>>, PrepError> {
        match self.charset() {
            Ok((_, charset)) if charset.format == 2 => {
                self.generate_gos_type(GosType::CharsetFormat2).map(Some)
            }
            Ok((_, charset)) if charset.format == 1 => {
                self.generate_gos_type(GosType::CharsetFormat1).map(Some)
            }
            Ok(_) => Ok(None),
            Err(PrepError::GosSourceMissing(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// (startCode, length, gid) triples of the (3,10) subtable.
    fn format12_groups(&self) -> Result<Vec<(u32, u32, u32)>, PrepError> {
        let cmap = Cmap::from_font(self.font)?;
        let subtable = cmap
            .find(cmap::WINDOWS_FULL)?
            .ok_or(PrepError::GosSourceMissing("cmap format 12"))?;
        let format12 = Format12::new(subtable.data)?;
        Ok(format12
            .groups()?
            .into_iter()
            .map(|group| {
                (
                    group.start_code,
                    group.end_code - group.start_code + 1,
                    group.start_gid,
                )
            })
            .collect())
    }

    /// For every format-4 segment, the number of format-12 groups inside
    /// it; the trailing sentinel contributes zero.
    fn format4_alignment_counts(&self) -> Result<Vec<u32>, PrepError> {
        let cmap = Cmap::from_font(self.font)?;
        let subtable = cmap
            .find(cmap::WINDOWS_BMP)?
            .ok_or(PrepError::GosSourceMissing("cmap format 4"))?;
        let format4 = Format4::new(subtable.data)?;
        let groups = self.format12_groups()?;

        let mut counts = Vec::with_capacity(format4.seg_count());
        for segment in format4.segments() {
            let segment: Segment4 = segment?;
            if segment.start_code == 0xFFFF {
                counts.push(0);
                continue;
            }
            let covering = groups
                .iter()
                .filter(|&&(start, length, _)| {
                    start <= segment.end_code as u32
                        && start + length > segment.start_code as u32
                })
                .count() as u32;
            let aligned = if segment.id_range_offset == 0 {
                covering == 1
            } else {
                covering >= 2 && segment.id_delta == 0
            };
            if !aligned {
                return Err(PrepError::CmapSegmentMismatch {
                    start: segment.start_code as u32,
                    end: segment.end_code as u32,
                });
            }
            counts.push(covering);
        }
        Ok(counts)
    }

    /// The charset ranges plus the absolute file offset of the charset.
    fn charset(&self) -> Result<(u32, Charset), PrepError> {
        let table_range = self
            .font
            .table_range(cff::CFF)
            .ok_or(PrepError::GosSourceMissing("CFF charset"))?;
        let cff = Cff::from_font(self.font)?;
        let offset = cff
            .charset_offset()
            .ok_or(PrepError::GosSourceMissing("CFF charset"))?;
        let num_glyphs = cff.charstrings()?.count;
        let charset = Charset::read(cff.data(), offset, num_glyphs)?;
        Ok(((table_range.start + offset) as u32, charset))
    }
}

fn delta_triples(groups: &[(u32, u32, u32)]) -> Vec<[i64; 3]> {
    let mut previous_start = 0i64;
    let mut previous_gid = 0i64;
    groups
        .iter()
        .map(|&(start, length, gid)| {
            let record = [
                start as i64 - previous_start,
                length as i64,
                gid as i64 - previous_gid,
            ];
            previous_start = start as i64;
            previous_gid = gid as i64;
            record
        })
        .collect()
}

fn charset_deltas(charset: &Charset) -> Vec<[i64; 3]> {
    let mut previous_sid = 0i64;
    let mut previous_n_left = 0i64;
    charset
        .ranges
        .iter()
        .map(|&(sid, n_left)| {
            let record = [sid as i64 - previous_sid, n_left as i64 - previous_n_left, 0];
            previous_sid = sid as i64;
            previous_n_left = n_left as i64;
            record
        })
        .collect()
}

fn encode_stream(
    ty: GosType,
    charset_offset: Option<u32>,
    records: &[[i64; 3]],
) -> Result<Vec<u8>, PrepError> {
    let schedule = ty.schedule();
    let mut out = vec![ty.tag()];
    if let Some(offset) = charset_offset {
        out.extend_from_slice(&offset.to_be_bytes());
    }
    out.extend_from_slice(&(records.len() as u16).to_be_bytes());

    let mut bits = BitWriter::new();
    let mut escapes = NibbleWriter::new();
    for record in records {
        for (field, value) in record.iter().enumerate() {
            let width = schedule.widths[field];
            if width == 0 {
                continue;
            }
            let all_ones = (1u64 << width) - 1;
            if !schedule.escaped[field] {
                bits.write_bits(*value as u32, width);
            } else if (0..all_ones as i64).contains(value) {
                bits.write_bits(*value as u32, width);
            } else {
                bits.write_bits(all_ones as u32, width);
                escapes.write_non(*value)?;
            }
        }
    }
    bits.align_to_byte();
    out.extend_from_slice(&bits.into_bytes());
    out.extend_from_slice(&escapes.into_bytes());
    Ok(out)
}

/// A decoded GOS stream, for verification and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedGos {
    pub tag: u8,
    /// Absolute charset offset; only present for types 6/7.
    pub charset_offset: Option<u32>,
    /// Per-record fields, one entry per active field.
    pub records: Vec<Vec<i64>>,
}

/// Decode one GOS stream from the front of `data`, returning it and the
/// number of bytes consumed.
pub fn decode_gos(data: &[u8]) -> Result<(DecodedGos, usize), PrepError> {
    use tachy_font::ReadError;

    let tag = *data.first().ok_or(ReadError::OutOfBounds)?;
    let ty = match tag {
        2 => GosType::CmapDelta,
        3 => GosType::CmapWideGid,
        4 => GosType::Format4Alignment,
        5 => GosType::CmapRaw,
        6 => GosType::CharsetFormat2,
        7 => GosType::CharsetFormat1,
        other => return Err(ReadError::InvalidFormat(other as i64).into()),
    };
    let mut pos = 1;
    let charset_offset = if matches!(ty, GosType::CharsetFormat2 | GosType::CharsetFormat1) {
        let bytes: [u8; 4] = data
            .get(pos..pos + 4)
            .ok_or(ReadError::OutOfBounds)?
            .try_into()
            .unwrap_or_default();
        pos += 4;
        Some(u32::from_be_bytes(bytes))
    } else {
        None
    };
    let count_bytes: [u8; 2] = data
        .get(pos..pos + 2)
        .ok_or(ReadError::OutOfBounds)?
        .try_into()
        .unwrap_or_default();
    let n_records = u16::from_be_bytes(count_bytes) as usize;
    pos += 2;

    let schedule = ty.schedule();
    let body = data.get(pos..).ok_or(ReadError::OutOfBounds)?;
    let mut bits = BitReader::new(body);
    let mut records = Vec::with_capacity(n_records);
    let mut escaped_slots = Vec::new();
    for record_index in 0..n_records {
        let mut record = Vec::with_capacity(ty.field_count());
        for field in 0..3 {
            let width = schedule.widths[field];
            if width == 0 {
                continue;
            }
            let raw = bits.read_bits(width).ok_or(ReadError::OutOfBounds)?;
            let all_ones = ((1u64 << width) - 1) as u32;
            if schedule.escaped[field] && raw == all_ones {
                escaped_slots.push((record_index, record.len()));
                record.push(0);
            } else {
                record.push(raw as i64);
            }
        }
        records.push(record);
    }
    let bit_bytes = bits.align_to_byte();

    let escape_bytes = body.get(bit_bytes..).ok_or(ReadError::OutOfBounds)?;
    let mut nibbles = NibbleReader::new(escape_bytes);
    let mut escape_nibbles = 0usize;
    for (record_index, field_index) in escaped_slots {
        let value = nibbles.read_non().ok_or(ReadError::OutOfBounds)?;
        let magnitude_nibbles = 1 + (non_count_nibble(value) % 8) as usize + 1;
        escape_nibbles += magnitude_nibbles;
        records[record_index][field_index] = value;
    }
    let consumed = pos + bit_bytes + escape_nibbles.div_ceil(2);

    Ok((
        DecodedGos {
            tag,
            charset_offset,
            records,
        },
        consumed,
    ))
}

/// The count nibble NoN would use for `value` (mirrors the encoder).
fn non_count_nibble(value: i64) -> u8 {
    let magnitude = value.unsigned_abs();
    let nibbles = ((64 - magnitude.leading_zeros()).div_ceil(4)).max(1) as u8;
    let mut count = nibbles - 1;
    if value < 0 {
        count += 8;
    }
    count
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::cleaner::clean;
    use tachy_test_fonts as test_fonts;

    fn tt_font() -> Vec<u8> {
        clean(&test_fonts::truetype_font(), false).unwrap()
    }

    fn expected_groups() -> Vec<(u32, u32, u32)> {
        let mut groups: Vec<(u32, u32, u32)> = test_fonts::BMP_MAPPINGS
            .iter()
            .map(|&(code, gid)| (code as u32, 1, gid as u32))
            .collect();
        groups.push((test_fonts::SUPPLEMENTARY_CODEPOINT, 1, test_fonts::GID_B_ALT as u32));
        groups
    }

    fn round_trip(ty: GosType) -> DecodedGos {
        let cleaned = tt_font();
        let font = FontRef::new(&cleaned).unwrap();
        let compacter = CmapCompacter::new(&font);
        let stream = compacter.generate_gos_type(ty).unwrap();
        let (decoded, consumed) = decode_gos(&stream).unwrap();
        assert_eq!(consumed, stream.len(), "type {:?}", ty);
        decoded
    }

    #[test]
    fn type5_is_raw_triples() {
        let decoded = round_trip(GosType::CmapRaw);
        assert_eq!(decoded.tag, 5);
        let groups: Vec<(u32, u32, u32)> = decoded
            .records
            .iter()
            .map(|r| (r[0] as u32, r[1] as u32, r[2] as u32))
            .collect();
        assert_eq!(groups, expected_groups());
    }

    #[test]
    fn type2_deltas_recover_groups() {
        let decoded = round_trip(GosType::CmapDelta);
        let mut start = 0i64;
        let mut gid = 0i64;
        let mut groups = Vec::new();
        for record in &decoded.records {
            start += record[0];
            gid += record[2];
            groups.push((start as u32, record[1] as u32, gid as u32));
        }
        assert_eq!(groups, expected_groups());
    }

    #[test]
    fn type3_gids_are_literal() {
        let decoded = round_trip(GosType::CmapWideGid);
        let gids: Vec<i64> = decoded.records.iter().map(|r| r[2]).collect();
        let expected: Vec<i64> = expected_groups()
            .iter()
            .map(|&(_, _, gid)| gid as i64)
            .collect();
        assert_eq!(gids, expected);
    }

    #[test]
    fn type4_counts_and_sentinel() {
        let decoded = round_trip(GosType::Format4Alignment);
        assert_eq!(decoded.tag, 4);
        // five flat segments, one format-12 group each, then the sentinel
        let counts: Vec<i64> = decoded.records.iter().map(|r| r[0]).collect();
        assert_eq!(counts, vec![1, 1, 1, 1, 1, 0]);
    }

    #[test]
    fn generate_gos_types_concatenates() {
        let cleaned = tt_font();
        let font = FontRef::new(&cleaned).unwrap();
        let compacter = CmapCompacter::new(&font);
        let bytes = compacter
            .generate_gos_types(&[GosType::CmapDelta, GosType::Format4Alignment])
            .unwrap();
        assert_eq!(bytes[0], 2);
        let (first, used) = decode_gos(&bytes[1..]).unwrap();
        assert_eq!(first.tag, 2);
        let (second, _) = decode_gos(&bytes[1 + used..]).unwrap();
        assert_eq!(second.tag, 4);
    }

    #[test]
    fn charset_gos_round_trip() {
        let cleaned = clean(&test_fonts::cff_font(), false).unwrap();
        let font = FontRef::new(&cleaned).unwrap();
        let compacter = CmapCompacter::new(&font);
        let stream = compacter.generate_charset_gos().unwrap().unwrap();
        let (decoded, consumed) = decode_gos(&stream).unwrap();
        assert_eq!(consumed, stream.len());
        assert_eq!(decoded.tag, 6);
        assert!(decoded.charset_offset.is_some());
        // one range (1, 1): deltas from zero are the values themselves
        assert_eq!(decoded.records, vec![vec![1, 1]]);
    }

    #[test]
    fn type7_differs_only_by_tag() {
        let records = vec![[5i64, 2, 0], [40, 1, 0]];
        let stream6 = encode_stream(GosType::CharsetFormat2, Some(0x1234), &records).unwrap();
        let stream7 = encode_stream(GosType::CharsetFormat1, Some(0x1234), &records).unwrap();
        assert_eq!(stream6[0], 6);
        assert_eq!(stream7[0], 7);
        assert_eq!(stream6[1..], stream7[1..]);
        let (decoded, consumed) = decode_gos(&stream7).unwrap();
        assert_eq!(consumed, stream7.len());
        assert_eq!(decoded.charset_offset, Some(0x1234));
        assert_eq!(decoded.records, vec![vec![5, 2], vec![40, 1]]);
    }

    #[test]
    fn escapes_fire_for_wide_values() {
        // a big gid delta cannot fit 3 bits and a negative delta escapes
        let records = vec![[100i64, 1, 500], [1, 1, -499]];
        let stream = encode_stream(GosType::CmapDelta, None, &records).unwrap();
        let (decoded, consumed) = decode_gos(&stream).unwrap();
        assert_eq!(consumed, stream.len());
        assert_eq!(decoded.records, vec![vec![100, 1, 500], vec![1, 1, -499]]);
    }

    #[test]
    fn all_ones_field_value_escapes() {
        // 3 == 2^2 - 1 must escape in a 2-bit field
        let records = vec![[3i64, 0, 0]];
        let stream = encode_stream(GosType::Format4Alignment, None, &records).unwrap();
        let (decoded, _) = decode_gos(&stream).unwrap();
        assert_eq!(decoded.records, vec![vec![3]]);
    }

    #[test]
    fn missing_format12_is_reported() {
        // the CFF test font has a format 12 subtable, so drop to a font
        // without one by building a cmap with only (3,1)
        use tachy_font::tables::cmap::{
            build_cmap, build_format4_flat, flatten_mappings, WINDOWS_BMP,
        };
        use tachy_font::{FontBuilder, Tag};
        let format4 = build_format4_flat(&flatten_mappings(&[(0x61, 1)]));
        let mut builder = FontBuilder::default();
        builder.add_raw(Tag::new(b"cmap"), build_cmap(&[(WINDOWS_BMP, format4)]));
        builder.add_raw(Tag::new(b"glyf"), vec![0u8; 4]);
        let bytes = builder.build();
        let font = FontRef::new(&bytes).unwrap();
        let compacter = CmapCompacter::new(&font);
        assert!(matches!(
            compacter.generate_gos_type(GosType::CmapDelta),
            Err(PrepError::GosSourceMissing("cmap format 12"))
        ));
    }
}

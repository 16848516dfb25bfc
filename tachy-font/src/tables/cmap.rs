//! The `cmap` table: subtable directory, format 4 and format 12.
//!
//! The parsers here are deliberately segment-oriented: format 12 is read
//! as `(startCode, length, gid)` triples and format 4 as raw segments,
//! so callers that only need segment structure never materialize a
//! per-codepoint map.

use crate::{FontData, FontRef, ReadError, Tag};

pub const CMAP: Tag = Tag::new(b"cmap");

/// (platform, encoding) of the Microsoft/Unicode BMP subtable (format 4).
pub const WINDOWS_BMP: (u16, u16) = (3, 1);
/// (platform, encoding) of the Microsoft/Unicode full-repertoire subtable
/// (format 12).
pub const WINDOWS_FULL: (u16, u16) = (3, 10);

/// Bytes of header before a format-4 subtable's segment arrays.
pub const FORMAT4_HEADER_LEN: usize = 14;
/// Bytes of header before a format-12 subtable's group array.
pub const FORMAT12_HEADER_LEN: usize = 16;

pub struct Cmap<'a> {
    data: FontData<'a>,
}

/// A located subtable: its offset within `cmap` plus its slice.
pub struct Subtable<'a> {
    pub offset: usize,
    pub format: u16,
    pub length: usize,
    pub data: FontData<'a>,
}

impl<'a> Cmap<'a> {
    pub fn from_font(font: &FontRef<'a>) -> Result<Self, ReadError> {
        Ok(Cmap {
            data: font.expect_table_data(CMAP)?,
        })
    }

    pub fn new(data: FontData<'a>) -> Self {
        Cmap { data }
    }

    /// Locate the subtable for a (platform, encoding) pair.
    pub fn find(&self, platform_encoding: (u16, u16)) -> Result<Option<Subtable<'a>>, ReadError> {
        let num_tables = self.data.read_u16_at(2)?;
        for i in 0..num_tables as usize {
            let record = 4 + i * 8;
            let platform = self.data.read_u16_at(record)?;
            let encoding = self.data.read_u16_at(record + 2)?;
            if (platform, encoding) != platform_encoding {
                continue;
            }
            let offset = self.data.read_u32_at(record + 4)? as usize;
            return self.subtable_at(offset).map(Some);
        }
        Ok(None)
    }

    fn subtable_at(&self, offset: usize) -> Result<Subtable<'a>, ReadError> {
        let format = self.data.read_u16_at(offset)?;
        let length = match format {
            0 | 2 | 4 | 6 => self.data.read_u16_at(offset + 2)? as usize,
            8 | 10 | 12 | 13 => self.data.read_u32_at(offset + 4)? as usize,
            14 => self.data.read_u32_at(offset + 2)? as usize,
            other => return Err(ReadError::InvalidFormat(other as i64)),
        };
        let data = self
            .data
            .slice(offset..offset + length)
            .ok_or(ReadError::OutOfBounds)?;
        Ok(Subtable {
            offset,
            format,
            length,
            data,
        })
    }
}

/// One format-4 segment as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment4 {
    pub start_code: u16,
    pub end_code: u16,
    pub id_delta: i16,
    pub id_range_offset: u16,
}

pub struct Format4<'a> {
    data: FontData<'a>,
    seg_count: usize,
}

impl<'a> Format4<'a> {
    pub fn new(subtable: FontData<'a>) -> Result<Self, ReadError> {
        if subtable.read_u16_at(0)? != 4 {
            return Err(ReadError::InvalidFormat(subtable.read_u16_at(0)? as i64));
        }
        let seg_count_x2 = subtable.read_u16_at(6)? as usize;
        Ok(Format4 {
            data: subtable,
            seg_count: seg_count_x2 / 2,
        })
    }

    pub fn seg_count(&self) -> usize {
        self.seg_count
    }

    pub fn segment(&self, i: usize) -> Result<Segment4, ReadError> {
        if i >= self.seg_count {
            return Err(ReadError::OutOfBounds);
        }
        let end_codes = FORMAT4_HEADER_LEN;
        let start_codes = end_codes + self.seg_count * 2 + 2; // +2: reservedPad
        let id_deltas = start_codes + self.seg_count * 2;
        let id_range_offsets = id_deltas + self.seg_count * 2;
        Ok(Segment4 {
            end_code: self.data.read_u16_at(end_codes + i * 2)?,
            start_code: self.data.read_u16_at(start_codes + i * 2)?,
            id_delta: self.data.read_i16_at(id_deltas + i * 2)?,
            id_range_offset: self.data.read_u16_at(id_range_offsets + i * 2)?,
        })
    }

    pub fn segments(&self) -> impl Iterator<Item = Result<Segment4, ReadError>> + '_ {
        (0..self.seg_count).map(|i| self.segment(i))
    }

    /// All (codepoint, gid) pairs, resolving `idRangeOffset` indirection.
    /// Mappings to gid 0 are skipped, as is the `0xFFFF` sentinel.
    pub fn mappings(&self) -> Result<Vec<(u32, u16)>, ReadError> {
        let mut out = Vec::new();
        let id_range_offsets = FORMAT4_HEADER_LEN + self.seg_count * 6 + 2;
        for i in 0..self.seg_count {
            let seg = self.segment(i)?;
            for code in seg.start_code..=seg.end_code {
                if code == 0xFFFF {
                    break;
                }
                let gid = if seg.id_range_offset == 0 {
                    (code as i32 + seg.id_delta as i32) as u16
                } else {
                    // the famous obscure indexing trick: the offset is
                    // relative to the idRangeOffset entry itself
                    let entry_pos = id_range_offsets + i * 2;
                    let glyph_pos = entry_pos
                        + seg.id_range_offset as usize
                        + (code - seg.start_code) as usize * 2;
                    let raw = self.data.read_u16_at(glyph_pos)?;
                    if raw == 0 {
                        0
                    } else {
                        (raw as i32 + seg.id_delta as i32) as u16
                    }
                };
                if gid != 0 {
                    out.push((code as u32, gid));
                }
            }
        }
        Ok(out)
    }
}

/// A segment of the flattened format-4 form: `idRangeOffset == 0`
/// everywhere, mapping is `code + id_delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlatSegment {
    pub start_code: u16,
    pub end_code: u16,
    pub id_delta: i16,
}

/// Compute the flat segments covering `mappings` (sorted by codepoint):
/// maximal runs of consecutive codepoints with consecutive gids.
///
/// The trailing `0xFFFF` sentinel segment is always appended.
pub fn flatten_mappings(mappings: &[(u16, u16)]) -> Vec<FlatSegment> {
    let mut out: Vec<FlatSegment> = Vec::new();
    for &(code, gid) in mappings {
        if code == 0xFFFF {
            continue;
        }
        let delta = gid.wrapping_sub(code) as i16;
        match out.last_mut() {
            Some(last) if last.end_code + 1 == code && last.id_delta == delta => {
                last.end_code = code;
            }
            _ => out.push(FlatSegment {
                start_code: code,
                end_code: code,
                id_delta: delta,
            }),
        }
    }
    out.push(FlatSegment {
        start_code: 0xFFFF,
        end_code: 0xFFFF,
        id_delta: 1,
    });
    out
}

/// Serialize a flat format-4 subtable: `idRangeOffset` zero for every
/// segment and no `glyphIdArray`.
pub fn build_format4_flat(segments: &[FlatSegment]) -> Vec<u8> {
    let seg_count = segments.len();
    let length = FORMAT4_HEADER_LEN + seg_count * 8 + 2;
    let mut out = Vec::with_capacity(length);
    out.extend_from_slice(&4u16.to_be_bytes());
    out.extend_from_slice(&(length as u16).to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // language
    out.extend_from_slice(&((seg_count * 2) as u16).to_be_bytes());
    let entry_selector = (usize::BITS - 1 - seg_count.leading_zeros()) as u16;
    let search_range = 2 * (1u16 << entry_selector);
    out.extend_from_slice(&search_range.to_be_bytes());
    out.extend_from_slice(&entry_selector.to_be_bytes());
    out.extend_from_slice(&((seg_count * 2) as u16 - search_range).to_be_bytes());
    for seg in segments {
        out.extend_from_slice(&seg.end_code.to_be_bytes());
    }
    out.extend_from_slice(&0u16.to_be_bytes()); // reservedPad
    for seg in segments {
        out.extend_from_slice(&seg.start_code.to_be_bytes());
    }
    for seg in segments {
        out.extend_from_slice(&seg.id_delta.to_be_bytes());
    }
    for _ in segments {
        out.extend_from_slice(&0u16.to_be_bytes()); // idRangeOffset
    }
    out
}

/// One format-12 group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequentialGroup {
    pub start_code: u32,
    pub end_code: u32,
    pub start_gid: u32,
}

pub struct Format12<'a> {
    data: FontData<'a>,
}

impl<'a> Format12<'a> {
    pub fn new(subtable: FontData<'a>) -> Result<Self, ReadError> {
        if subtable.read_u16_at(0)? != 12 {
            return Err(ReadError::InvalidFormat(subtable.read_u16_at(0)? as i64));
        }
        Ok(Format12 { data: subtable })
    }

    pub fn n_groups(&self) -> Result<u32, ReadError> {
        self.data.read_u32_at(12)
    }

    pub fn group(&self, i: usize) -> Result<SequentialGroup, ReadError> {
        let at = FORMAT12_HEADER_LEN + i * 12;
        Ok(SequentialGroup {
            start_code: self.data.read_u32_at(at)?,
            end_code: self.data.read_u32_at(at + 4)?,
            start_gid: self.data.read_u32_at(at + 8)?,
        })
    }

    pub fn groups(&self) -> Result<Vec<SequentialGroup>, ReadError> {
        (0..self.n_groups()? as usize).map(|i| self.group(i)).collect()
    }

    pub fn mappings(&self) -> Result<Vec<(u32, u16)>, ReadError> {
        let mut out = Vec::new();
        for group in self.groups()? {
            for (i, code) in (group.start_code..=group.end_code).enumerate() {
                out.push((code, (group.start_gid as usize + i) as u16));
            }
        }
        Ok(out)
    }
}

pub fn build_format12(groups: &[SequentialGroup]) -> Vec<u8> {
    let length = FORMAT12_HEADER_LEN + groups.len() * 12;
    let mut out = Vec::with_capacity(length);
    out.extend_from_slice(&12u16.to_be_bytes());
    out.extend_from_slice(&0u16.to_be_bytes()); // reserved
    out.extend_from_slice(&(length as u32).to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes()); // language
    out.extend_from_slice(&(groups.len() as u32).to_be_bytes());
    for group in groups {
        out.extend_from_slice(&group.start_code.to_be_bytes());
        out.extend_from_slice(&group.end_code.to_be_bytes());
        out.extend_from_slice(&group.start_gid.to_be_bytes());
    }
    out
}

/// Serialize a whole `cmap` table from encoded subtables.
pub fn build_cmap(subtables: &[((u16, u16), Vec<u8>)]) -> Vec<u8> {
    let mut records: Vec<_> = subtables.iter().collect();
    records.sort_by_key(|((platform, encoding), _)| (*platform, *encoding));

    let header_len = 4 + records.len() * 8;
    let mut out = Vec::new();
    out.extend_from_slice(&0u16.to_be_bytes()); // version
    out.extend_from_slice(&(records.len() as u16).to_be_bytes());
    let mut offset = header_len;
    for ((platform, encoding), data) in &records {
        out.extend_from_slice(&platform.to_be_bytes());
        out.extend_from_slice(&encoding.to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        offset += data.len();
    }
    for (_, data) in &records {
        out.extend_from_slice(data);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cmap() -> Vec<u8> {
        let fmt4 = build_format4_flat(&flatten_mappings(&[(0x61, 36), (0x62, 37), (0x64, 40)]));
        let fmt12 = build_format12(&[
            SequentialGroup {
                start_code: 0x61,
                end_code: 0x62,
                start_gid: 36,
            },
            SequentialGroup {
                start_code: 0x1F600,
                end_code: 0x1F600,
                start_gid: 90,
            },
        ]);
        build_cmap(&[(WINDOWS_BMP, fmt4), (WINDOWS_FULL, fmt12)])
    }

    #[test]
    fn find_subtables() {
        let bytes = sample_cmap();
        let cmap = Cmap::new(FontData::new(&bytes));
        let fmt4 = cmap.find(WINDOWS_BMP).unwrap().unwrap();
        assert_eq!(fmt4.format, 4);
        let fmt12 = cmap.find(WINDOWS_FULL).unwrap().unwrap();
        assert_eq!(fmt12.format, 12);
        assert!(cmap.find((0, 3)).unwrap().is_none());
    }

    #[test]
    fn flat_format4_round_trip() {
        let bytes = sample_cmap();
        let cmap = Cmap::new(FontData::new(&bytes));
        let subtable = cmap.find(WINDOWS_BMP).unwrap().unwrap();
        let fmt4 = Format4::new(subtable.data).unwrap();
        // a/b run, the lone d, and the sentinel
        assert_eq!(fmt4.seg_count(), 3);
        assert_eq!(
            fmt4.mappings().unwrap(),
            vec![(0x61, 36), (0x62, 37), (0x64, 40)]
        );
        for seg in fmt4.segments() {
            assert_eq!(seg.unwrap().id_range_offset, 0);
        }
    }

    #[test]
    fn format4_with_glyph_id_array() {
        // one segment 0x61..=0x62 via glyphIdArray, plus sentinel
        let seg_count = 2u16;
        let mut data = Vec::new();
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&36u16.to_be_bytes()); // length
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&(seg_count * 2).to_be_bytes());
        data.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // search fields
        data.extend_from_slice(&0x62u16.to_be_bytes()); // endCode
        data.extend_from_slice(&0xFFFFu16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes()); // reservedPad
        data.extend_from_slice(&0x61u16.to_be_bytes()); // startCode
        data.extend_from_slice(&0xFFFFu16.to_be_bytes());
        data.extend_from_slice(&0i16.to_be_bytes()); // idDelta
        data.extend_from_slice(&1i16.to_be_bytes());
        // idRangeOffset[0] points just past the idRangeOffset array
        data.extend_from_slice(&4u16.to_be_bytes());
        data.extend_from_slice(&0u16.to_be_bytes());
        data.extend_from_slice(&77u16.to_be_bytes()); // glyphIdArray
        data.extend_from_slice(&78u16.to_be_bytes());

        let fmt4 = Format4::new(FontData::new(&data)).unwrap();
        assert_eq!(fmt4.mappings().unwrap(), vec![(0x61, 77), (0x62, 78)]);
    }

    #[test]
    fn format12_groups() {
        let bytes = sample_cmap();
        let cmap = Cmap::new(FontData::new(&bytes));
        let subtable = cmap.find(WINDOWS_FULL).unwrap().unwrap();
        let fmt12 = Format12::new(subtable.data).unwrap();
        assert_eq!(fmt12.n_groups(), Ok(2));
        assert_eq!(
            fmt12.mappings().unwrap(),
            vec![(0x61, 36), (0x62, 37), (0x1F600, 90)]
        );
    }

    #[test]
    fn flatten_splits_non_consecutive_gids() {
        let segments = flatten_mappings(&[(10, 5), (11, 6), (12, 9)]);
        assert_eq!(
            segments,
            vec![
                FlatSegment {
                    start_code: 10,
                    end_code: 11,
                    id_delta: -5
                },
                FlatSegment {
                    start_code: 12,
                    end_code: 12,
                    id_delta: -3
                },
                FlatSegment {
                    start_code: 0xFFFF,
                    end_code: 0xFFFF,
                    id_delta: 1
                },
            ]
        );
    }
}

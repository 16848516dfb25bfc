//! The `CFF ` table: header, INDEX, DICT, charset and charstrings.
//!
//! Only the structures the delivery pipeline touches are modeled; the
//! table is otherwise treated as opaque bytes addressed by the offsets
//! recovered here.

use crate::{FontData, FontRef, ReadError, Tag};

pub const CFF: Tag = Tag::new(b"CFF ");

/// Top DICT operators this pipeline cares about.
pub mod op {
    pub const CHARSET: u16 = 15;
    pub const ENCODING: u16 = 16;
    pub const CHAR_STRINGS: u16 = 17;
    pub const PRIVATE: u16 = 18;
    pub const SUBRS: u16 = 19;
    pub const ROS: u16 = 0x0C1E;
    pub const FD_ARRAY: u16 = 0x0C24;
    pub const FD_SELECT: u16 = 0x0C25;
}

#[derive(Debug, Clone, Copy)]
pub struct CffHeader {
    pub major: u8,
    pub minor: u8,
    pub header_size: u8,
    pub off_size: u8,
}

/// A CFF INDEX over the table bytes.
///
/// Offsets inside an INDEX are 1-based: item `i` occupies
/// `offset_base + offsets[i] .. offset_base + offsets[i+1]` where
/// `offset_base` points one byte before the first item.
pub struct Index<'a> {
    table: FontData<'a>,
    /// Position of the INDEX within the table.
    pub start: usize,
    pub count: u16,
    pub off_size: u8,
    offsets: Vec<u32>,
}

impl<'a> Index<'a> {
    pub fn read(table: FontData<'a>, start: usize) -> Result<Self, ReadError> {
        let mut cursor = table.cursor();
        cursor.seek(start);
        let count = cursor.read_u16()?;
        if count == 0 {
            // an empty INDEX is just the two count bytes
            return Ok(Index {
                table,
                start,
                count,
                off_size: 1,
                offsets: vec![1],
            });
        }
        let off_size = cursor.read_u8()?;
        if !(1..=4).contains(&off_size) {
            return Err(ReadError::MalformedData("INDEX offSize out of range"));
        }
        let mut offsets = Vec::with_capacity(count as usize + 1);
        for _ in 0..=count {
            offsets.push(cursor.read_uint(off_size as usize)?);
        }
        if offsets.first() != Some(&1) || offsets.windows(2).any(|w| w[1] < w[0]) {
            return Err(ReadError::MalformedData("INDEX offsets not monotonic"));
        }
        Ok(Index {
            table,
            start,
            count,
            off_size,
            offsets,
        })
    }

    /// The 1-based item offsets (`count + 1` of them).
    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    /// Position (within the table) of the offset array.
    pub fn offset_array_pos(&self) -> usize {
        self.start + 3
    }

    /// Position one byte before the first item, the base the 1-based
    /// offsets are relative to.
    pub fn offset_base(&self) -> usize {
        self.start + 3 + (self.count as usize + 1) * self.off_size as usize - 1
    }

    /// Total length in bytes of the concatenated item data.
    pub fn data_len(&self) -> usize {
        *self.offsets.last().unwrap_or(&1) as usize - 1
    }

    /// Position just past the INDEX.
    pub fn end(&self) -> usize {
        if self.count == 0 {
            self.start + 2
        } else {
            self.offset_base() + *self.offsets.last().unwrap_or(&1) as usize
        }
    }

    pub fn item(&self, i: usize) -> Result<&'a [u8], ReadError> {
        if i >= self.count as usize {
            return Err(ReadError::OutOfBounds);
        }
        let base = self.offset_base();
        let range = base + self.offsets[i] as usize..base + self.offsets[i + 1] as usize;
        self.table
            .slice(range)
            .map(|data| data.as_bytes())
            .ok_or(ReadError::OutOfBounds)
    }
}

/// Serialize an INDEX from item slices, using the smallest offSize.
pub fn build_index(items: &[&[u8]]) -> Vec<u8> {
    if items.is_empty() {
        return vec![0, 0];
    }
    let data_len: usize = items.iter().map(|item| item.len()).sum();
    let last_offset = data_len + 1;
    let off_size: u8 = match last_offset {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    };
    let mut out = Vec::with_capacity(3 + (items.len() + 1) * off_size as usize + data_len);
    out.extend_from_slice(&(items.len() as u16).to_be_bytes());
    out.push(off_size);
    let mut offset = 1usize;
    for len in items
        .iter()
        .map(|item| item.len())
        .chain(std::iter::once(0))
    {
        out.extend_from_slice(&(offset as u64).to_be_bytes()[8 - off_size as usize..]);
        offset += len;
    }
    for item in items {
        out.extend_from_slice(item);
    }
    out
}

/// One Top/Private DICT entry: parsed integer operands plus the raw
/// operand bytes, so untouched entries re-serialize verbatim.
pub struct DictEntry {
    /// One-byte operators as-is; two-byte (12 x) operators as `0x0C00 | x`.
    pub operator: u16,
    pub operands: Vec<i64>,
    raw_operands: Vec<u8>,
}

impl DictEntry {
    pub fn first_operand(&self) -> Option<i64> {
        self.operands.first().copied()
    }
}

pub fn parse_dict(data: &[u8]) -> Result<Vec<DictEntry>, ReadError> {
    let mut entries = Vec::new();
    let mut operands = Vec::new();
    let mut raw_start = 0usize;
    let mut i = 0usize;
    while i < data.len() {
        let b0 = data[i];
        match b0 {
            0..=21 => {
                let operator = if b0 == 12 {
                    let b1 = *data.get(i + 1).ok_or(ReadError::OutOfBounds)?;
                    i += 2;
                    0x0C00 | b1 as u16
                } else {
                    i += 1;
                    b0 as u16
                };
                let raw_end = if operator >= 0x0C00 { i - 2 } else { i - 1 };
                entries.push(DictEntry {
                    operator,
                    operands: std::mem::take(&mut operands),
                    raw_operands: data[raw_start..raw_end].to_vec(),
                });
                raw_start = i;
            }
            28 => {
                let hi = *data.get(i + 1).ok_or(ReadError::OutOfBounds)?;
                let lo = *data.get(i + 2).ok_or(ReadError::OutOfBounds)?;
                operands.push(i16::from_be_bytes([hi, lo]) as i64);
                i += 3;
            }
            29 => {
                let bytes: [u8; 4] = data
                    .get(i + 1..i + 5)
                    .ok_or(ReadError::OutOfBounds)?
                    .try_into()
                    .unwrap_or_default();
                operands.push(i32::from_be_bytes(bytes) as i64);
                i += 5;
            }
            30 => {
                // real number: nibbles until 0xf terminator; kept raw only
                let mut j = i + 1;
                loop {
                    let byte = *data.get(j).ok_or(ReadError::OutOfBounds)?;
                    j += 1;
                    if byte & 0x0F == 0x0F || byte >> 4 == 0x0F {
                        break;
                    }
                }
                operands.push(0);
                i = j;
            }
            32..=246 => {
                operands.push(b0 as i64 - 139);
                i += 1;
            }
            247..=250 => {
                let b1 = *data.get(i + 1).ok_or(ReadError::OutOfBounds)?;
                operands.push((b0 as i64 - 247) * 256 + b1 as i64 + 108);
                i += 2;
            }
            251..=254 => {
                let b1 = *data.get(i + 1).ok_or(ReadError::OutOfBounds)?;
                operands.push(-(b0 as i64 - 251) * 256 - b1 as i64 - 108);
                i += 2;
            }
            _ => return Err(ReadError::MalformedData("reserved DICT operand byte")),
        }
    }
    if !operands.is_empty() {
        return Err(ReadError::MalformedData("trailing DICT operands"));
    }
    Ok(entries)
}

/// Re-serialize DICT entries. Operators listed in `fixed_width` have
/// their operands emitted as 5-byte integers (so the DICT size does not
/// depend on the values, which a rebuild patches later); all other
/// entries reuse their original operand bytes.
pub fn build_dict(entries: &[DictEntry], fixed_width: &[u16]) -> Vec<u8> {
    let mut out = Vec::new();
    for entry in entries {
        if fixed_width.contains(&entry.operator) {
            for operand in &entry.operands {
                out.push(29);
                out.extend_from_slice(&(*operand as i32).to_be_bytes());
            }
        } else {
            out.extend_from_slice(&entry.raw_operands);
        }
        if entry.operator >= 0x0C00 {
            out.push(12);
            out.push((entry.operator & 0xFF) as u8);
        } else {
            out.push(entry.operator as u8);
        }
    }
    out
}

/// A parsed charset.
pub struct Charset {
    pub format: u8,
    /// Position of the format byte within the table.
    pub start: usize,
    /// For formats 1 and 2: (first sid, nLeft) ranges. Empty for format 0.
    pub ranges: Vec<(u16, u16)>,
    /// Total byte length including the format byte.
    pub byte_len: usize,
}

impl Charset {
    /// Read the charset covering `num_glyphs` glyphs (`.notdef` is not
    /// stored).
    pub fn read(table: FontData, start: usize, num_glyphs: u16) -> Result<Self, ReadError> {
        let mut cursor = table.cursor();
        cursor.seek(start);
        let format = cursor.read_u8()?;
        let mut ranges = Vec::new();
        let mut covered: u32 = 1;
        match format {
            0 => {
                cursor.advance((num_glyphs as usize).saturating_sub(1) * 2);
            }
            1 | 2 => {
                while covered < num_glyphs as u32 {
                    let first = cursor.read_u16()?;
                    let n_left = if format == 1 {
                        cursor.read_u8()? as u16
                    } else {
                        cursor.read_u16()?
                    };
                    ranges.push((first, n_left));
                    covered += n_left as u32 + 1;
                }
                if covered != num_glyphs as u32 {
                    return Err(ReadError::MalformedData("charset overruns glyph count"));
                }
            }
            other => return Err(ReadError::InvalidFormat(other as i64)),
        }
        Ok(Charset {
            format,
            start,
            ranges,
            byte_len: cursor.position() - start,
        })
    }
}

/// Bias applied to subroutine indexes, per the Type 2 spec.
pub fn subr_bias(count: usize) -> i32 {
    if count < 1240 {
        107
    } else if count < 33900 {
        1131
    } else {
        32768
    }
}

/// A token of a Type 2 charstring, with its byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsToken {
    /// An integer operand.
    Int(i32),
    /// A 16.16 fixed operand (operand byte 255); value is the raw bits.
    Fixed(i32),
    /// A one-byte operator.
    Op(u8),
    /// A two-byte (12 x) operator.
    Op2(u8),
}

pub mod cs_op {
    pub const CALLSUBR: u8 = 10;
    pub const RETURN: u8 = 11;
    pub const ENDCHAR: u8 = 14;
    pub const CALLGSUBR: u8 = 29;
    pub const HINTMASK: u8 = 19;
    pub const CNTRMASK: u8 = 20;
}

/// Tokenizer for Type 2 charstrings.
///
/// `hstemhm`/`vstemhm`/`hintmask` interplay matters only to the extent of
/// skipping hint-mask data bytes, so the scanner tracks the running stem
/// count the same way an interpreter would.
pub struct CsTokens<'a> {
    data: &'a [u8],
    pos: usize,
    stem_count: usize,
    pending_operands: usize,
    width_parsed: bool,
}

impl<'a> CsTokens<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        CsTokens {
            data,
            pos: 0,
            stem_count: 0,
            pending_operands: 0,
            width_parsed: false,
        }
    }

    /// Continue scanning an inlined subroutine with inherited hint state.
    pub fn with_stem_state(data: &'a [u8], stem_count: usize, width_parsed: bool) -> Self {
        CsTokens {
            data,
            pos: 0,
            stem_count,
            pending_operands: 0,
            width_parsed,
        }
    }

    pub fn stem_count(&self) -> usize {
        self.stem_count
    }

    pub fn width_parsed(&self) -> bool {
        self.width_parsed
    }

    /// Overwrite the hint state, e.g. after a subroutine declared stems.
    pub fn set_stem_state(&mut self, stem_count: usize, width_parsed: bool) {
        self.stem_count = stem_count;
        self.width_parsed = width_parsed;
    }
}

impl Iterator for CsTokens<'_> {
    /// (token, start, end)
    type Item = Result<(CsToken, usize, usize), ReadError>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos;
        let b0 = *self.data.get(self.pos)?;
        let result = match b0 {
            28 => match self.data.get(self.pos + 1..self.pos + 3) {
                Some(&[hi, lo]) => {
                    self.pos += 3;
                    self.pending_operands += 1;
                    Ok(CsToken::Int(i16::from_be_bytes([hi, lo]) as i32))
                }
                _ => Err(ReadError::OutOfBounds),
            },
            255 => match self.data.get(self.pos + 1..self.pos + 5) {
                Some(bytes) => {
                    self.pos += 5;
                    self.pending_operands += 1;
                    let raw: [u8; 4] = bytes.try_into().unwrap_or_default();
                    Ok(CsToken::Fixed(i32::from_be_bytes(raw)))
                }
                None => Err(ReadError::OutOfBounds),
            },
            32..=246 => {
                self.pos += 1;
                self.pending_operands += 1;
                Ok(CsToken::Int(b0 as i32 - 139))
            }
            247..=250 => match self.data.get(self.pos + 1) {
                Some(&b1) => {
                    self.pos += 2;
                    self.pending_operands += 1;
                    Ok(CsToken::Int((b0 as i32 - 247) * 256 + b1 as i32 + 108))
                }
                None => Err(ReadError::OutOfBounds),
            },
            251..=254 => match self.data.get(self.pos + 1) {
                Some(&b1) => {
                    self.pos += 2;
                    self.pending_operands += 1;
                    Ok(CsToken::Int(-(b0 as i32 - 251) * 256 - b1 as i32 - 108))
                }
                None => Err(ReadError::OutOfBounds),
            },
            12 => match self.data.get(self.pos + 1) {
                Some(&b1) => {
                    self.pos += 2;
                    self.pending_operands = 0;
                    Ok(CsToken::Op2(b1))
                }
                None => Err(ReadError::OutOfBounds),
            },
            op => {
                self.pos += 1;
                // stem operators: hstem(1) vstem(3) hstemhm(18) vstemhm(23);
                // operands sitting directly before a hintmask are an
                // implicit vstem
                if matches!(op, 1 | 3 | 18 | 23)
                    || (matches!(op, cs_op::HINTMASK | cs_op::CNTRMASK)
                        && self.pending_operands > 0)
                {
                    let mut operands = self.pending_operands;
                    if !self.width_parsed && operands % 2 == 1 {
                        operands -= 1;
                        self.width_parsed = true;
                    }
                    self.stem_count += operands / 2;
                } else if matches!(op, 21 | 22 | 4 | cs_op::ENDCHAR) {
                    self.width_parsed = true;
                }
                if matches!(op, cs_op::HINTMASK | cs_op::CNTRMASK) {
                    let mask_len = self.stem_count.div_ceil(8);
                    if self.pos + mask_len > self.data.len() {
                        self.pos = self.data.len();
                        return Some(Err(ReadError::OutOfBounds));
                    }
                    self.pos += mask_len;
                }
                self.pending_operands = 0;
                Ok(CsToken::Op(op))
            }
        };
        Some(result.map(|token| (token, start, self.pos)))
    }
}

/// The parsed skeleton of a (non-CID) CFF table.
pub struct Cff<'a> {
    table: FontData<'a>,
    pub header: CffHeader,
    pub name_index: Index<'a>,
    pub top_dict_index: Index<'a>,
    pub string_index: Index<'a>,
    pub global_subrs: Index<'a>,
    top_dict: Vec<DictEntry>,
}

impl<'a> Cff<'a> {
    pub fn from_font(font: &FontRef<'a>) -> Result<Self, ReadError> {
        Cff::read(font.expect_table_data(CFF)?)
    }

    pub fn read(table: FontData<'a>) -> Result<Self, ReadError> {
        let header = CffHeader {
            major: table.read_u8_at(0)?,
            minor: table.read_u8_at(1)?,
            header_size: table.read_u8_at(2)?,
            off_size: table.read_u8_at(3)?,
        };
        let name_index = Index::read(table, header.header_size as usize)?;
        if name_index.count != 1 {
            return Err(ReadError::MalformedData("CFF must contain exactly one font"));
        }
        let top_dict_index = Index::read(table, name_index.end())?;
        let string_index = Index::read(table, top_dict_index.end())?;
        let global_subrs = Index::read(table, string_index.end())?;
        let top_dict = parse_dict(top_dict_index.item(0)?)?;
        let cff = Cff {
            table,
            header,
            name_index,
            top_dict_index,
            string_index,
            global_subrs,
            top_dict,
        };
        if cff.top_dict_get(op::ROS).is_some() {
            return Err(ReadError::MalformedData("CID-keyed CFF is not supported"));
        }
        Ok(cff)
    }

    pub fn data(&self) -> FontData<'a> {
        self.table
    }

    pub fn top_dict(&self) -> &[DictEntry] {
        &self.top_dict
    }

    pub fn top_dict_get(&self, operator: u16) -> Option<&DictEntry> {
        self.top_dict.iter().find(|e| e.operator == operator)
    }

    /// Offset of the CharStrings INDEX within the table.
    pub fn charstrings_offset(&self) -> Result<usize, ReadError> {
        self.top_dict_get(op::CHAR_STRINGS)
            .and_then(DictEntry::first_operand)
            .map(|v| v as usize)
            .ok_or(ReadError::MalformedData("Top DICT lacks CharStrings"))
    }

    pub fn charstrings(&self) -> Result<Index<'a>, ReadError> {
        Index::read(self.table, self.charstrings_offset()?)
    }

    /// Offset of a custom charset, `None` for the predefined ones (0..=2).
    pub fn charset_offset(&self) -> Option<usize> {
        let offset = self
            .top_dict_get(op::CHARSET)
            .and_then(DictEntry::first_operand)?;
        (offset > 2).then_some(offset as usize)
    }

    /// The Private DICT as (size, offset) from the Top DICT.
    pub fn private_range(&self) -> Option<(usize, usize)> {
        let entry = self.top_dict_get(op::PRIVATE)?;
        match entry.operands[..] {
            [size, offset] => Some((size as usize, offset as usize)),
            _ => None,
        }
    }

    /// The local subroutine INDEX, reached through the Private DICT.
    pub fn local_subrs(&self) -> Result<Option<Index<'a>>, ReadError> {
        let Some((size, offset)) = self.private_range() else {
            return Ok(None);
        };
        let private = self
            .table
            .slice(offset..offset + size)
            .ok_or(ReadError::OutOfBounds)?;
        let entries = parse_dict(private.as_bytes())?;
        let Some(subrs) = entries
            .iter()
            .find(|e| e.operator == op::SUBRS)
            .and_then(DictEntry::first_operand)
        else {
            return Ok(None);
        };
        Index::read(self.table, offset + subrs as usize).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trip() {
        let items: Vec<&[u8]> = vec![b"ab", b"", b"cdef"];
        let bytes = build_index(&items);
        let index = Index::read(FontData::new(&bytes), 0).unwrap();
        assert_eq!(index.count, 3);
        assert_eq!(index.off_size, 1);
        assert_eq!(index.item(0).unwrap(), b"ab");
        assert_eq!(index.item(1).unwrap(), b"");
        assert_eq!(index.item(2).unwrap(), b"cdef");
        assert_eq!(index.data_len(), 6);
        assert_eq!(index.end(), bytes.len());
    }

    #[test]
    fn empty_index_is_two_bytes() {
        let bytes = build_index(&[]);
        assert_eq!(bytes, vec![0, 0]);
        let index = Index::read(FontData::new(&bytes), 0).unwrap();
        assert_eq!(index.count, 0);
        assert_eq!(index.end(), 2);
    }

    #[test]
    fn dict_round_trip_preserves_untouched_entries() {
        // CharStrings = 1000 (via 5-byte int), charset = 300
        let mut dict = Vec::new();
        dict.push(29);
        dict.extend_from_slice(&1000i32.to_be_bytes());
        dict.push(op::CHAR_STRINGS as u8);
        dict.extend_from_slice(&[28, 0x01, 0x2C]); // 300
        dict.push(op::CHARSET as u8);

        let entries = parse_dict(&dict).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].operator, op::CHAR_STRINGS);
        assert_eq!(entries[0].first_operand(), Some(1000));
        assert_eq!(entries[1].first_operand(), Some(300));

        // rebuilding with charset widened to 5 bytes
        let rebuilt = build_dict(&entries, &[op::CHARSET]);
        let reparsed = parse_dict(&rebuilt).unwrap();
        assert_eq!(reparsed[0].first_operand(), Some(1000));
        assert_eq!(reparsed[1].first_operand(), Some(300));
        // the CharStrings operand bytes came through verbatim
        assert_eq!(&rebuilt[0..6], &dict[0..6]);
    }

    #[test]
    fn charset_format2_ranges() {
        // .notdef + 4 glyphs in two ranges
        let data = [2u8, 0x00, 0x05, 0x00, 0x01, 0x00, 0x20, 0x00, 0x01];
        let charset = Charset::read(FontData::new(&data), 0, 5).unwrap();
        assert_eq!(charset.format, 2);
        assert_eq!(charset.ranges, vec![(5, 1), (32, 1)]);
        assert_eq!(charset.byte_len, 9);
    }

    #[test]
    fn charstring_tokens_with_hintmask() {
        // 1 stem pair then hintmask: 1-byte mask is consumed
        let cs = [
            0x8B, 0x8C, 0x01, // 0 1 hstem
            0x13, 0xFF, // hintmask 0xFF
            0x0E, // endchar
        ];
        let tokens: Vec<_> = CsTokens::new(&cs).collect::<Result<_, _>>().unwrap();
        let kinds: Vec<_> = tokens.iter().map(|(t, _, _)| *t).collect();
        assert_eq!(
            kinds,
            vec![
                CsToken::Int(0),
                CsToken::Int(1),
                CsToken::Op(1),
                CsToken::Op(cs_op::HINTMASK),
                CsToken::Op(cs_op::ENDCHAR),
            ]
        );
        // the hintmask token spans its mask byte
        assert_eq!(tokens[3].1..tokens[3].2, 3..5);
    }

    #[test]
    fn subr_bias_thresholds() {
        assert_eq!(subr_bias(0), 107);
        assert_eq!(subr_bias(1239), 107);
        assert_eq!(subr_bias(1240), 1131);
        assert_eq!(subr_bias(33900), 32768);
    }
}

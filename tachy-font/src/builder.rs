//! A builder for top-level font binaries from raw tables.

use std::borrow::Cow;
use std::collections::BTreeMap;

use crate::font_ref::{directory_len, CFF_SFNT_VERSION, TT_SFNT_VERSION};
use crate::{FontRef, Tag};

const HEAD: Tag = Tag::new(b"head");
const CFF: Tag = Tag::new(b"CFF ");
const CHECKSUM_ADJUSTMENT_OFFSET: usize = 8;

/// Build a font from some set of raw tables.
///
/// Tables are laid out in tag order; per-table checksums, the directory
/// search fields, and `head.checkSumAdjustment` are computed at build
/// time so the output is a self-consistent sfnt binary.
#[derive(Debug, Clone, Default)]
pub struct FontBuilder<'a> {
    tables: BTreeMap<Tag, Cow<'a, [u8]>>,
}

impl<'a> FontBuilder<'a> {
    pub fn add_raw(&mut self, tag: Tag, data: impl Into<Cow<'a, [u8]>>) -> &mut Self {
        self.tables.insert(tag, data.into());
        self
    }

    /// Copy each table from `font` that this builder does not already hold.
    pub fn copy_missing_tables(&mut self, font: &FontRef<'a>) -> &mut Self {
        for record in font.table_records() {
            if !self.tables.contains_key(&record.tag) {
                if let Some(data) = font.table_data(record.tag) {
                    self.add_raw(record.tag, data.as_bytes());
                }
            }
        }
        self
    }

    pub fn contains(&self, tag: Tag) -> bool {
        self.tables.contains_key(&tag)
    }

    pub fn build(&mut self) -> Vec<u8> {
        let sfnt_version = if self.tables.contains_key(&CFF) {
            CFF_SFNT_VERSION
        } else {
            TT_SFNT_VERSION
        };
        let num_tables = self.tables.len() as u16;
        let header_len = directory_len(self.tables.len());

        let mut position = header_len as u32;
        let mut records = Vec::with_capacity(self.tables.len());
        for (tag, data) in self.tables.iter() {
            let offset = position;
            let length = data.len() as u32;
            let (checksum, padding) = checksum_and_padding(data);
            position += length + padding;
            records.push((*tag, checksum, offset, length));
        }

        let mut out = Vec::with_capacity(position as usize);
        out.extend_from_slice(&sfnt_version.to_be_bytes());
        out.extend_from_slice(&num_tables.to_be_bytes());
        let (search_range, entry_selector, range_shift) = search_fields(num_tables);
        out.extend_from_slice(&search_range.to_be_bytes());
        out.extend_from_slice(&entry_selector.to_be_bytes());
        out.extend_from_slice(&range_shift.to_be_bytes());
        for (tag, checksum, offset, length) in &records {
            out.extend_from_slice(&tag.to_be_bytes());
            out.extend_from_slice(&checksum.to_be_bytes());
            out.extend_from_slice(&offset.to_be_bytes());
            out.extend_from_slice(&length.to_be_bytes());
        }
        let mut head_offset = None;
        for ((tag, _, _, _), data) in records.iter().zip(self.tables.values()) {
            if *tag == HEAD {
                head_offset = Some(out.len());
            }
            out.extend_from_slice(data);
            let rem = out.len() % 4;
            if rem != 0 {
                out.extend_from_slice(&[0u8; 4][rem..]);
            }
        }

        if let Some(head_offset) = head_offset {
            let adjustment_at = head_offset + CHECKSUM_ADJUSTMENT_OFFSET;
            if adjustment_at + 4 <= out.len() {
                // checkSumAdjustment participates in the whole-font sum as
                // zero; the head table was added with that field zeroed.
                let (total, _) = checksum_and_padding(&out);
                let adjustment = 0xB1B0_AFBAu32.wrapping_sub(total);
                out[adjustment_at..adjustment_at + 4]
                    .copy_from_slice(&adjustment.to_be_bytes());
            }
        }
        out
    }
}

fn checksum_and_padding(table: &[u8]) -> (u32, u32) {
    let padding = if table.len() % 4 == 0 {
        0
    } else {
        4 - table.len() % 4
    };
    let mut sum = 0u32;
    let mut iter = table.chunks_exact(4);
    for quad in &mut iter {
        let array: [u8; 4] = quad.try_into().unwrap_or_default();
        sum = sum.wrapping_add(u32::from_be_bytes(array));
    }
    let rem = match *iter.remainder() {
        [a] => u32::from_be_bytes([a, 0, 0, 0]),
        [a, b] => u32::from_be_bytes([a, b, 0, 0]),
        [a, b, c] => u32::from_be_bytes([a, b, c, 0]),
        _ => 0,
    };
    (sum.wrapping_add(rem), padding as u32)
}

fn search_fields(num_tables: u16) -> (u16, u16, u16) {
    let entry_selector = (u16::BITS - 1).saturating_sub(num_tables.leading_zeros()) as u16;
    let search_range = (1u16 << entry_selector) * 16;
    let range_shift = (num_tables * 16).saturating_sub(search_range);
    (search_range, entry_selector, range_shift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FontRef;

    #[test]
    fn tables_are_tag_sorted_and_padded() {
        let mut builder = FontBuilder::default();
        builder.add_raw(Tag::new(b"glyf"), vec![0xAAu8; 5]);
        builder.add_raw(Tag::new(b"cmap"), vec![0xBBu8; 4]);
        let bytes = builder.build();
        let font = FontRef::new(&bytes).unwrap();
        let tags: Vec<_> = font.table_records().iter().map(|r| r.tag).collect();
        assert_eq!(tags, vec![Tag::new(b"cmap"), Tag::new(b"glyf")]);
        // each table begins on a 4-byte boundary
        for record in font.table_records() {
            assert_eq!(record.offset % 4, 0);
        }
    }

    #[test]
    fn search_fields_match_spec_table() {
        // the worked example from the sfnt spec: 12 tables
        assert_eq!(search_fields(12), (128, 3, 64));
    }

    #[test]
    fn whole_font_checksum_balances() {
        let mut head = vec![0u8; 54];
        head[12..16].copy_from_slice(&0x5F0F3CF5u32.to_be_bytes()); // magicNumber
        let mut builder = FontBuilder::default();
        builder.add_raw(Tag::new(b"head"), head);
        builder.add_raw(Tag::new(b"glyf"), vec![1u8, 2, 3, 4]);
        let bytes = builder.build();
        let (total, _) = checksum_and_padding(&bytes);
        // with checkSumAdjustment in place the file sums to the magic constant
        assert_eq!(total, 0xB1B0_AFBA);
    }

    #[test]
    fn copy_missing_tables_does_not_clobber() {
        let mut builder = FontBuilder::default();
        builder.add_raw(Tag::new(b"maxp"), vec![1u8, 2]);
        builder.add_raw(Tag::new(b"glyf"), vec![9u8]);
        let source = builder.build();
        let source_font = FontRef::new(&source).unwrap();

        let mut rebuilt = FontBuilder::default();
        rebuilt.add_raw(Tag::new(b"glyf"), vec![7u8, 7]);
        rebuilt.copy_missing_tables(&source_font);
        let bytes = rebuilt.build();
        let font = FontRef::new(&bytes).unwrap();
        assert_eq!(
            font.table_data(Tag::new(b"glyf")).unwrap().as_bytes(),
            &[7, 7]
        );
        assert_eq!(
            font.table_data(Tag::new(b"maxp")).unwrap().as_bytes(),
            &[1, 2]
        );
    }
}

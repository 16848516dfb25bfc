//! The sfnt table directory.

use std::ops::Range;

use crate::{FontData, ReadError, Tag};

/// `0x00010000`, the sfnt version of TrueType-flavored fonts.
pub const TT_SFNT_VERSION: u32 = 0x0001_0000;
/// `'true'`, accepted as an alias of [`TT_SFNT_VERSION`].
pub const TRUE_SFNT_VERSION: u32 = 0x7472_7565;
/// `'OTTO'`, the sfnt version of CFF-flavored fonts.
pub const CFF_SFNT_VERSION: u32 = 0x4F54_544F;

const TABLE_RECORD_LEN: usize = 16;
const DIRECTORY_HEADER_LEN: usize = 12;

/// One entry in the table directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableRecord {
    pub tag: Tag,
    pub checksum: u32,
    pub offset: u32,
    pub length: u32,
}

/// Which outline table a font carries.
///
/// Exactly one of `glyf` or `CFF ` is present in a well-formed input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutlineFlavor {
    Glyf,
    Cff,
}

/// A font over borrowed bytes, parsed just enough to locate tables.
#[derive(Clone)]
pub struct FontRef<'a> {
    data: FontData<'a>,
    sfnt_version: u32,
    records: Vec<TableRecord>,
}

impl<'a> FontRef<'a> {
    pub fn new(bytes: &'a [u8]) -> Result<Self, ReadError> {
        let data = FontData::new(bytes);
        let mut cursor = data.cursor();
        let sfnt_version = cursor.read_u32()?;
        match sfnt_version {
            TT_SFNT_VERSION | TRUE_SFNT_VERSION | CFF_SFNT_VERSION => (),
            other => return Err(ReadError::InvalidSfnt(other)),
        }
        let num_tables = cursor.read_u16()?;
        // searchRange, entrySelector, rangeShift
        cursor.advance(6);

        let mut records = Vec::with_capacity(num_tables as usize);
        for _ in 0..num_tables {
            let tag = cursor.read_tag()?;
            let checksum = cursor.read_u32()?;
            let offset = cursor.read_u32()?;
            let length = cursor.read_u32()?;
            let end = (offset as usize)
                .checked_add(length as usize)
                .ok_or(ReadError::OutOfBounds)?;
            if end > data.len() {
                return Err(ReadError::OutOfBounds);
            }
            records.push(TableRecord {
                tag,
                checksum,
                offset,
                length,
            });
        }
        Ok(FontRef {
            data,
            sfnt_version,
            records,
        })
    }

    pub fn sfnt_version(&self) -> u32 {
        self.sfnt_version
    }

    pub fn data(&self) -> FontData<'a> {
        self.data
    }

    pub fn table_records(&self) -> &[TableRecord] {
        &self.records
    }

    pub fn table_record(&self, tag: Tag) -> Option<&TableRecord> {
        self.records.iter().find(|record| record.tag == tag)
    }

    pub fn has_table(&self, tag: Tag) -> bool {
        self.table_record(tag).is_some()
    }

    /// The byte range of a table within the whole font file.
    pub fn table_range(&self, tag: Tag) -> Option<Range<usize>> {
        let record = self.table_record(tag)?;
        let start = record.offset as usize;
        Some(start..start + record.length as usize)
    }

    pub fn table_data(&self, tag: Tag) -> Option<FontData<'a>> {
        self.table_range(tag).and_then(|range| self.data.slice(range))
    }

    /// Table data for a table the caller cannot proceed without.
    pub fn expect_table_data(&self, tag: Tag) -> Result<FontData<'a>, ReadError> {
        self.table_data(tag).ok_or(ReadError::TableIsMissing(tag))
    }

    /// Determine the outline flavor, rejecting fonts with neither (or,
    /// nonsensically, both) outline tables.
    pub fn outline_flavor(&self) -> Result<OutlineFlavor, ReadError> {
        let has_glyf = self.has_table(Tag::new(b"glyf"));
        let has_cff = self.has_table(Tag::new(b"CFF "));
        match (has_glyf, has_cff) {
            (true, false) => Ok(OutlineFlavor::Glyf),
            (false, true) => Ok(OutlineFlavor::Cff),
            (false, false) => Err(ReadError::MalformedData(
                "font has neither 'glyf' nor 'CFF ' outlines",
            )),
            (true, true) => Err(ReadError::MalformedData(
                "font has both 'glyf' and 'CFF ' outlines",
            )),
        }
    }
}

impl std::fmt::Debug for FontRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontRef")
            .field("sfnt_version", &format_args!("0x{:08X}", self.sfnt_version))
            .field("tables", &self.records.len())
            .finish()
    }
}

/// Size in bytes of a table directory holding `num_tables` entries.
pub(crate) fn directory_len(num_tables: usize) -> usize {
    DIRECTORY_HEADER_LEN + num_tables * TABLE_RECORD_LEN
}

//! The `head` table.

use crate::{FontData, FontRef, ReadError, Tag};

pub const HEAD: Tag = Tag::new(b"head");

const INDEX_TO_LOC_FORMAT_OFFSET: usize = 50;

pub struct Head<'a> {
    data: FontData<'a>,
}

impl<'a> Head<'a> {
    pub fn from_font(font: &FontRef<'a>) -> Result<Self, ReadError> {
        Ok(Head {
            data: font.expect_table_data(HEAD)?,
        })
    }

    /// 0 for short (u16) loca offsets, 1 for long (u32).
    pub fn index_to_loc_format(&self) -> Result<i16, ReadError> {
        self.data.read_i16_at(INDEX_TO_LOC_FORMAT_OFFSET)
    }

    pub fn units_per_em(&self) -> Result<u16, ReadError> {
        self.data.read_u16_at(18)
    }
}

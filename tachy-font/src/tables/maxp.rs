//! The `maxp` table.

use crate::{FontData, FontRef, ReadError, Tag};

pub const MAXP: Tag = Tag::new(b"maxp");

pub struct Maxp<'a> {
    data: FontData<'a>,
}

impl<'a> Maxp<'a> {
    pub fn from_font(font: &FontRef<'a>) -> Result<Self, ReadError> {
        Ok(Maxp {
            data: font.expect_table_data(MAXP)?,
        })
    }

    pub fn num_glyphs(&self) -> Result<u16, ReadError> {
        self.data.read_u16_at(4)
    }
}

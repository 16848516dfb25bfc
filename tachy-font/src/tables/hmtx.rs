//! The `hmtx` and `vmtx` tables, which share a layout.

use crate::{FontData, GlyphId, ReadError, Tag};

pub const HMTX: Tag = Tag::new(b"hmtx");
pub const VMTX: Tag = Tag::new(b"vmtx");

/// Long-metrics table: `number_of_metrics` (advance, side bearing) pairs
/// followed by bare side bearings for the remaining glyphs. Used for both
/// `hmtx` and `vmtx`; only the table tag differs.
pub struct Hmtx<'a> {
    data: FontData<'a>,
    number_of_metrics: u16,
    num_glyphs: u16,
}

impl<'a> Hmtx<'a> {
    pub fn new(data: FontData<'a>, number_of_metrics: u16, num_glyphs: u16) -> Self {
        Hmtx {
            data,
            number_of_metrics,
            num_glyphs,
        }
    }

    pub fn advance(&self, gid: GlyphId) -> Result<u16, ReadError> {
        let index = gid.to_u16().min(self.number_of_metrics.saturating_sub(1));
        self.data.read_u16_at(index as usize * 4)
    }

    pub fn side_bearing(&self, gid: GlyphId) -> Result<i16, ReadError> {
        self.data.read_i16_at(self.side_bearing_offset(gid)?)
    }

    /// Byte offset (within the table) of the side-bearing field for `gid`.
    ///
    /// This is what the base font build patches in place.
    pub fn side_bearing_offset(&self, gid: GlyphId) -> Result<usize, ReadError> {
        let gid = gid.to_u16();
        if gid >= self.num_glyphs {
            return Err(ReadError::OutOfBounds);
        }
        let offset = if gid < self.number_of_metrics {
            gid as usize * 4 + 2
        } else {
            self.number_of_metrics as usize * 4 + (gid - self.number_of_metrics) as usize * 2
        };
        if offset + 2 > self.data.len() {
            return Err(ReadError::OutOfBounds);
        }
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2 long metrics, 4 glyphs: (500, 10) (600, -2), then bearings 7, 8
    const DATA: &[u8] = &[
        0x01, 0xF4, 0x00, 0x0A, //
        0x02, 0x58, 0xFF, 0xFE, //
        0x00, 0x07, 0x00, 0x08,
    ];

    #[test]
    fn long_and_short_entries() {
        let hmtx = Hmtx::new(FontData::new(DATA), 2, 4);
        assert_eq!(hmtx.advance(GlyphId::new(0)), Ok(500));
        assert_eq!(hmtx.advance(GlyphId::new(3)), Ok(600));
        assert_eq!(hmtx.side_bearing(GlyphId::new(1)), Ok(-2));
        assert_eq!(hmtx.side_bearing(GlyphId::new(2)), Ok(7));
        assert_eq!(hmtx.side_bearing(GlyphId::new(3)), Ok(8));
    }

    #[test]
    fn side_bearing_offsets() {
        let hmtx = Hmtx::new(FontData::new(DATA), 2, 4);
        assert_eq!(hmtx.side_bearing_offset(GlyphId::new(0)), Ok(2));
        assert_eq!(hmtx.side_bearing_offset(GlyphId::new(1)), Ok(6));
        assert_eq!(hmtx.side_bearing_offset(GlyphId::new(2)), Ok(8));
        assert_eq!(hmtx.side_bearing_offset(GlyphId::new(3)), Ok(10));
        assert!(hmtx.side_bearing_offset(GlyphId::new(4)).is_err());
    }
}

//! The `loca` table.

use crate::{FontData, GlyphId, ReadError, Tag};

pub const LOCA: Tag = Tag::new(b"loca");

/// Glyph offsets into `glyf`. Short-format entries store `offset / 2`.
pub struct Loca<'a> {
    data: FontData<'a>,
    long: bool,
}

impl<'a> Loca<'a> {
    pub fn new(data: FontData<'a>, long: bool) -> Self {
        Loca { data, long }
    }

    /// Number of stored offsets (`numGlyphs + 1` in a well-formed font).
    pub fn len(&self) -> usize {
        if self.long {
            self.data.len() / 4
        } else {
            self.data.len() / 2
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Result<u32, ReadError> {
        if self.long {
            self.data.read_u32_at(index * 4)
        } else {
            Ok(self.data.read_u16_at(index * 2)? as u32 * 2)
        }
    }

    /// The byte range of `gid` inside `glyf`.
    pub fn glyph_range(&self, gid: GlyphId) -> Result<std::ops::Range<usize>, ReadError> {
        let start = self.get(gid.to_usize())?;
        let end = self.get(gid.to_usize() + 1)?;
        if end < start {
            return Err(ReadError::MalformedData("loca offsets not monotonic"));
        }
        Ok(start as usize..end as usize)
    }

    pub fn all_offsets(&self) -> Result<Vec<u32>, ReadError> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }
}

/// Pack `offsets` back into loca wire form.
///
/// Short-format offsets must be even and fit in 17 bits; the caller is
/// expected to have chosen the format accordingly.
pub fn pack_offsets(offsets: &[u32], long: bool) -> Result<Vec<u8>, ReadError> {
    let mut out = Vec::with_capacity(offsets.len() * if long { 4 } else { 2 });
    for &offset in offsets {
        if long {
            out.extend_from_slice(&offset.to_be_bytes());
        } else {
            if offset % 2 != 0 || offset > 0x1FFFE {
                return Err(ReadError::MalformedData(
                    "offset not representable in short loca",
                ));
            }
            out.extend_from_slice(&((offset / 2) as u16).to_be_bytes());
        }
    }
    Ok(out)
}

//! The `glyph_table` artifact: a fixed-stride per-gid record index.

use crate::{FontData, GlyphId, ReadError};

/// Per-gid records carry an hmtx side bearing.
pub const HAS_HMTX: u16 = 1 << 0;
/// Per-gid records carry a vmtx side bearing.
pub const HAS_VMTX: u16 = 1 << 1;
/// The font is CFF-flavored and the header carries the data region offset.
pub const HAS_CFF: u16 = 1 << 2;
/// Reserved for the client's bookkeeping; never set by the preprocessor.
pub const RESERVED_DIRTY: u16 = 1 << 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphTableHeader {
    pub flags: u16,
    pub num_glyphs: u16,
    /// For CFF: offset of the CharStrings INDEX data region (one past its
    /// offset base) within the source font.
    pub cff_data_region_offset: u32,
}

impl GlyphTableHeader {
    pub fn has_hmtx(&self) -> bool {
        self.flags & HAS_HMTX != 0
    }

    pub fn has_vmtx(&self) -> bool {
        self.flags & HAS_VMTX != 0
    }

    pub fn is_cff(&self) -> bool {
        self.flags & HAS_CFF != 0
    }

    /// Size in bytes of the header itself.
    pub fn byte_len(&self) -> usize {
        if self.is_cff() {
            8
        } else {
            4
        }
    }

    /// Size of each per-gid record under these flags.
    pub fn entry_len(&self) -> usize {
        let mut len = 2 + 4 + 2;
        if self.has_hmtx() {
            len += 2;
        }
        if self.has_vmtx() {
            len += 2;
        }
        len
    }

    pub fn read(data: FontData) -> Result<Self, ReadError> {
        let flags = data.read_u16_at(0)?;
        let num_glyphs = data.read_u16_at(2)?;
        let cff_data_region_offset = if flags & HAS_CFF != 0 {
            data.read_u32_at(4)?
        } else {
            0
        };
        Ok(GlyphTableHeader {
            flags,
            num_glyphs,
            cff_data_region_offset,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.num_glyphs.to_be_bytes());
        if self.is_cff() {
            out.extend_from_slice(&self.cff_data_region_offset.to_be_bytes());
        }
    }
}

/// One per-gid record. The metric fields hold side bearings, present
/// according to the header flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphRecord {
    pub gid: GlyphId,
    pub h_side_bearing: Option<i16>,
    pub v_side_bearing: Option<i16>,
    pub offset: u32,
    pub length: u16,
}

impl GlyphRecord {
    /// Byte position of the record for `gid` in the artifact.
    pub fn position(header: &GlyphTableHeader, gid: GlyphId) -> usize {
        header.byte_len() + gid.to_usize() * header.entry_len()
    }

    pub fn read(
        data: FontData,
        header: &GlyphTableHeader,
        gid: GlyphId,
    ) -> Result<Self, ReadError> {
        if gid.to_u16() >= header.num_glyphs {
            return Err(ReadError::OutOfBounds);
        }
        let mut at = Self::position(header, gid);
        let stored_gid = data.read_u16_at(at)?;
        at += 2;
        if stored_gid != gid.to_u16() {
            return Err(ReadError::MalformedData("glyph record gid mismatch"));
        }
        let h_side_bearing = if header.has_hmtx() {
            let v = data.read_i16_at(at)?;
            at += 2;
            Some(v)
        } else {
            None
        };
        let v_side_bearing = if header.has_vmtx() {
            let v = data.read_i16_at(at)?;
            at += 2;
            Some(v)
        } else {
            None
        };
        let offset = data.read_u32_at(at)?;
        let length = data.read_u16_at(at + 4)?;
        Ok(GlyphRecord {
            gid,
            h_side_bearing,
            v_side_bearing,
            offset,
            length,
        })
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.gid.to_u16().to_be_bytes());
        if let Some(bearing) = self.h_side_bearing {
            out.extend_from_slice(&bearing.to_be_bytes());
        }
        if let Some(bearing) = self.v_side_bearing {
            out.extend_from_slice(&bearing.to_be_bytes());
        }
        out.extend_from_slice(&self.offset.to_be_bytes());
        out.extend_from_slice(&self.length.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_round_trip_with_metrics() {
        let header = GlyphTableHeader {
            flags: HAS_HMTX | HAS_VMTX,
            num_glyphs: 2,
            cff_data_region_offset: 0,
        };
        assert_eq!(header.byte_len(), 4);
        assert_eq!(header.entry_len(), 12);

        let mut data = Vec::new();
        header.write(&mut data);
        for gid in 0..2u16 {
            GlyphRecord {
                gid: GlyphId::new(gid),
                h_side_bearing: Some(-3),
                v_side_bearing: Some(9),
                offset: 100 * gid as u32,
                length: 40,
            }
            .write(&mut data);
        }

        let parsed_header = GlyphTableHeader::read(FontData::new(&data)).unwrap();
        assert_eq!(parsed_header, header);
        let record = GlyphRecord::read(FontData::new(&data), &parsed_header, GlyphId::new(1))
            .unwrap();
        assert_eq!(record.offset, 100);
        assert_eq!(record.h_side_bearing, Some(-3));
        assert!(
            GlyphRecord::read(FontData::new(&data), &parsed_header, GlyphId::new(2)).is_err()
        );
    }

    #[test]
    fn cff_header_is_eight_bytes() {
        let header = GlyphTableHeader {
            flags: HAS_HMTX | HAS_CFF,
            num_glyphs: 7,
            cff_data_region_offset: 0x1234,
        };
        let mut data = Vec::new();
        header.write(&mut data);
        assert_eq!(data.len(), 8);
        assert_eq!(GlyphTableHeader::read(FontData::new(&data)).unwrap(), header);
    }
}

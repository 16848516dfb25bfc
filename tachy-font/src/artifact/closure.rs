//! The `closure_idx` / `closure_data` artifact pair.

use crate::{FontData, GlyphId, ReadError};

/// Bytes per `closure_idx` entry: `offset:i32 || size:u16`.
pub const CLOSURE_ENTRY_LEN: usize = 6;

/// Sentinel offset meaning "closure is the glyph itself only".
pub const NO_EXTRA_CLOSURE: i32 = -1;

/// One `closure_idx` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosureEntry {
    pub offset: i32,
    pub size: u16,
}

impl ClosureEntry {
    pub fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.offset.to_be_bytes());
        out.extend_from_slice(&self.size.to_be_bytes());
    }
}

/// Reader over the two closure files.
pub struct ClosureIndex<'a> {
    idx: FontData<'a>,
    data: FontData<'a>,
}

impl<'a> ClosureIndex<'a> {
    pub fn new(idx: &'a [u8], data: &'a [u8]) -> Self {
        ClosureIndex {
            idx: FontData::new(idx),
            data: FontData::new(data),
        }
    }

    /// Number of indexed glyphs.
    pub fn len(&self) -> usize {
        self.idx.len() / CLOSURE_ENTRY_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn entry(&self, gid: GlyphId) -> Result<ClosureEntry, ReadError> {
        let at = gid.to_usize() * CLOSURE_ENTRY_LEN;
        Ok(ClosureEntry {
            offset: self.idx.read_i32_at(at)?,
            size: self.idx.read_u16_at(at + 4)?,
        })
    }

    /// The closure of `gid`: the glyph itself plus the stored extras.
    ///
    /// Glyphs are pushed into `out` unsorted; a truncated data file is a
    /// hard error.
    pub fn read_into(&self, gid: GlyphId, out: &mut Vec<GlyphId>) -> Result<(), ReadError> {
        out.push(gid);
        let entry = self.entry(gid)?;
        if entry.offset == NO_EXTRA_CLOSURE {
            return Ok(());
        }
        if entry.offset < 0 || entry.size % 2 != 0 {
            return Err(ReadError::MalformedData("corrupt closure entry"));
        }
        let start = entry.offset as usize;
        let end = start + entry.size as usize;
        if end > self.data.len() {
            return Err(ReadError::OutOfBounds);
        }
        for at in (start..end).step_by(2) {
            out.push(GlyphId::new(self.data.read_u16_at(at)?));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Vec<u8>, Vec<u8>) {
        let mut idx = Vec::new();
        ClosureEntry {
            offset: NO_EXTRA_CLOSURE,
            size: 0,
        }
        .write(&mut idx);
        ClosureEntry { offset: 0, size: 4 }.write(&mut idx);
        let mut data = Vec::new();
        data.extend_from_slice(&5u16.to_be_bytes());
        data.extend_from_slice(&9u16.to_be_bytes());
        (idx, data)
    }

    #[test]
    fn sentinel_reads_as_reflexive_singleton() {
        let (idx, data) = sample();
        let closure = ClosureIndex::new(&idx, &data);
        let mut gids = Vec::new();
        closure.read_into(GlyphId::new(0), &mut gids).unwrap();
        assert_eq!(gids, vec![GlyphId::new(0)]);
    }

    #[test]
    fn extras_are_appended_after_the_seed() {
        let (idx, data) = sample();
        let closure = ClosureIndex::new(&idx, &data);
        let mut gids = Vec::new();
        closure.read_into(GlyphId::new(1), &mut gids).unwrap();
        assert_eq!(gids, vec![GlyphId::new(1), GlyphId::new(5), GlyphId::new(9)]);
    }

    #[test]
    fn truncated_data_is_fatal() {
        let (idx, _) = sample();
        let closure = ClosureIndex::new(&idx, &[0u8; 2]);
        let mut gids = Vec::new();
        assert_eq!(
            closure.read_into(GlyphId::new(1), &mut gids),
            Err(ReadError::OutOfBounds)
        );
    }
}

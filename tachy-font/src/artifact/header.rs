//! The BSAC typed header that can prefix the base artifact.

use crate::{FontData, ReadError, Tag};

pub const BSAC_MAGIC: &[u8; 4] = b"BSAC";
pub const TYPED_HEADER_VERSION: u32 = 1;

/// One (tag, value) pair of a typed header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedHeaderEntry {
    pub tag: Tag,
    pub value: Vec<u8>,
}

/// Builder/parser for the typed metadata block:
///
/// `"BSAC" || total_length:u32 || version:u32 || entry_count:u16 ||
/// [tag:4s || value_offset:u32] × entry_count || concat(values)`
///
/// Entries are emitted in insertion order and value offsets are running
/// offsets into the values region.
#[derive(Debug, Default, Clone)]
pub struct TypedHeader {
    entries: Vec<TypedHeaderEntry>,
}

impl TypedHeader {
    pub fn new() -> Self {
        TypedHeader::default()
    }

    pub fn add(&mut self, tag: Tag, value: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.push(TypedHeaderEntry {
            tag,
            value: value.into(),
        });
        self
    }

    pub fn entries(&self) -> &[TypedHeaderEntry] {
        &self.entries
    }

    pub fn get(&self, tag: Tag) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|entry| entry.tag == tag)
            .map(|entry| entry.value.as_slice())
    }

    pub fn encode(&self) -> Vec<u8> {
        let values_len: usize = self.entries.iter().map(|e| e.value.len()).sum();
        let total_len = 4 + 4 + 4 + 2 + self.entries.len() * 8 + values_len;
        let mut out = Vec::with_capacity(total_len);
        out.extend_from_slice(BSAC_MAGIC);
        out.extend_from_slice(&(total_len as u32).to_be_bytes());
        out.extend_from_slice(&TYPED_HEADER_VERSION.to_be_bytes());
        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        let mut value_offset = 0u32;
        for entry in &self.entries {
            out.extend_from_slice(&entry.tag.to_be_bytes());
            out.extend_from_slice(&value_offset.to_be_bytes());
            value_offset += entry.value.len() as u32;
        }
        for entry in &self.entries {
            out.extend_from_slice(&entry.value);
        }
        out
    }

    /// Parse a typed header from the front of `bytes`, returning it with
    /// the number of bytes it occupied.
    pub fn decode(bytes: &[u8]) -> Result<(Self, usize), ReadError> {
        let data = FontData::new(bytes);
        if data.slice(0..4).map(|d| d.as_bytes()) != Some(&BSAC_MAGIC[..]) {
            return Err(ReadError::MalformedData("missing BSAC magic"));
        }
        let total_len = data.read_u32_at(4)? as usize;
        if total_len > bytes.len() {
            return Err(ReadError::OutOfBounds);
        }
        let version = data.read_u32_at(8)?;
        if version != TYPED_HEADER_VERSION {
            return Err(ReadError::InvalidFormat(version as i64));
        }
        let entry_count = data.read_u16_at(12)? as usize;
        let values_start = 14 + entry_count * 8;
        if values_start > total_len {
            return Err(ReadError::OutOfBounds);
        }
        let mut raw = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            let at = 14 + i * 8;
            raw.push((data.read_tag_at(at)?, data.read_u32_at(at + 4)? as usize));
        }
        let mut entries = Vec::with_capacity(entry_count);
        for (i, (tag, offset)) in raw.iter().enumerate() {
            let end = raw
                .get(i + 1)
                .map(|(_, next)| *next)
                .unwrap_or(total_len - values_start);
            let value = data
                .slice(values_start + offset..values_start + end)
                .ok_or(ReadError::OutOfBounds)?;
            entries.push(TypedHeaderEntry {
                tag: *tag,
                value: value.as_bytes().to_vec(),
            });
        }
        Ok((TypedHeader { entries }, total_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_round_trip() {
        let mut header = TypedHeader::new();
        header.add(Tag::new(b"GLCN"), 7u16.to_be_bytes().to_vec());
        header.add(Tag::new(b"GLOF"), 0x1000u32.to_be_bytes().to_vec());
        header.add(Tag::new(b"TYPE"), vec![1u8]);
        let encoded = header.encode();

        let (decoded, used) = TypedHeader::decode(&encoded).unwrap();
        assert_eq!(used, encoded.len());
        assert_eq!(decoded.entries(), header.entries());
        assert_eq!(decoded.get(Tag::new(b"GLCN")), Some(&[0u8, 7][..]));
        assert_eq!(decoded.get(Tag::new(b"CM12")), None);
    }

    #[test]
    fn decode_ignores_trailing_payload() {
        let mut header = TypedHeader::new();
        header.add(Tag::new(b"TYPE"), vec![0u8]);
        let mut bytes = header.encode();
        let header_len = bytes.len();
        bytes.extend_from_slice(b"rle payload follows");
        let (_, used) = TypedHeader::decode(&bytes).unwrap();
        assert_eq!(used, header_len);
    }

    #[test]
    fn value_offsets_are_running_offsets() {
        let mut header = TypedHeader::new();
        header.add(Tag::new(b"HMMC"), vec![0u8, 3]);
        header.add(Tag::new(b"VMMC"), vec![0u8, 4]);
        let encoded = header.encode();
        // second entry's value_offset (bytes 22..26 of the block) is 2
        assert_eq!(&encoded[14 + 8 + 4..14 + 8 + 8], &2u32.to_be_bytes());
    }
}

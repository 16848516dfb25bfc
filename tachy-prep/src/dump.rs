//! Inspection of a built base artifact.
//!
//! Splits the base into its typed header and RLE stream, re-expands it,
//! and reports per-table sizes together with how well each table
//! run-length encodes. Development tooling; nothing here is on the
//! serving path.

use std::fmt;

use tachy_font::artifact::{rle_decode, rle_encode, rle_ops, RleOp, TypedHeader, BSAC_MAGIC};
use tachy_font::{FontRef, Tag};

use crate::gos::decode_gos;
use crate::{font_info, PrepError};

#[derive(Debug)]
pub struct HeaderEntryDump {
    pub tag: Tag,
    pub len: usize,
    /// Human-readable decoding for the tags worth summarizing.
    pub summary: Option<String>,
}

#[derive(Debug)]
pub struct TableDump {
    pub tag: Tag,
    pub offset: u32,
    pub length: u32,
    /// Size of the table alone under the RLE codec.
    pub rle_len: usize,
}

#[derive(Debug)]
pub struct BaseDump {
    pub header_len: usize,
    pub header_entries: Vec<HeaderEntryDump>,
    pub encoded_len: usize,
    pub decoded_len: usize,
    pub copy_ops: usize,
    pub fill_ops: usize,
    pub literal_bytes: usize,
    pub filled_bytes: usize,
    pub tables: Vec<TableDump>,
}

pub fn dump_base(base: &[u8]) -> Result<BaseDump, PrepError> {
    let (header_len, header_entries) = if base.starts_with(BSAC_MAGIC) {
        let (header, used) = TypedHeader::decode(base)?;
        let entries = header
            .entries()
            .iter()
            .map(|entry| HeaderEntryDump {
                tag: entry.tag,
                len: entry.value.len(),
                summary: summarize_entry(entry.tag, &entry.value),
            })
            .collect();
        (used, entries)
    } else {
        (0, Vec::new())
    };

    let encoded = &base[header_len..];
    let (_, ops) = rle_ops(encoded)?;
    let mut dump = BaseDump {
        header_len,
        header_entries,
        encoded_len: encoded.len(),
        decoded_len: 0,
        copy_ops: 0,
        fill_ops: 0,
        literal_bytes: 0,
        filled_bytes: 0,
        tables: Vec::new(),
    };
    for op in ops {
        match op.map_err(PrepError::RleSelfTest)? {
            RleOp::Copy(bytes) => {
                dump.copy_ops += 1;
                dump.literal_bytes += bytes.len();
            }
            RleOp::Fill { length, .. } => {
                dump.fill_ops += 1;
                dump.filled_bytes += length;
            }
        }
    }

    let decoded = rle_decode(encoded)?;
    dump.decoded_len = decoded.len();
    let font = FontRef::new(&decoded)?;
    for record in font.table_records() {
        let table = font
            .table_data(record.tag)
            .ok_or(tachy_font::ReadError::OutOfBounds)?;
        dump.tables.push(TableDump {
            tag: record.tag,
            offset: record.offset,
            length: record.length,
            rle_len: rle_encode(table.as_bytes()).len(),
        });
    }
    Ok(dump)
}

fn summarize_entry(tag: Tag, value: &[u8]) -> Option<String> {
    match tag {
        font_info::GLCN | font_info::HMMC | font_info::VMMC => {
            let v: [u8; 2] = value.try_into().ok()?;
            Some(u16::from_be_bytes(v).to_string())
        }
        font_info::GLOF | font_info::LCOF | font_info::HMOF | font_info::VMOF => {
            let v: [u8; 4] = value.try_into().ok()?;
            Some(format!("offset {}", u32::from_be_bytes(v)))
        }
        font_info::LCFM => Some(format!("{} bytes/offset", value.first()?)),
        font_info::TYPE => Some(match value.first()? {
            0 => "CFF".to_string(),
            _ => "TrueType".to_string(),
        }),
        font_info::CM12 => {
            let origin: [u8; 4] = value.get(0..4)?.try_into().ok()?;
            let groups: [u8; 4] = value.get(4..8)?.try_into().ok()?;
            Some(format!(
                "groups at {}, {} groups",
                u32::from_be_bytes(origin),
                u32::from_be_bytes(groups)
            ))
        }
        font_info::CCMP => summarize_gos_list(value),
        font_info::CS02 => {
            let (gos, _) = decode_gos(value).ok()?;
            Some(format!("type {}, {} ranges", gos.tag, gos.records.len()))
        }
        _ => None,
    }
}

fn summarize_gos_list(value: &[u8]) -> Option<String> {
    let count = *value.first()? as usize;
    let mut parts = Vec::with_capacity(count);
    let mut pos = 1;
    for _ in 0..count {
        let (gos, used) = decode_gos(value.get(pos..)?).ok()?;
        parts.push(format!("type {} x{}", gos.tag, gos.records.len()));
        pos += used;
    }
    Some(parts.join(", "))
}

impl fmt::Display for BaseDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "typed header: {} bytes", self.header_len)?;
        for entry in &self.header_entries {
            match &entry.summary {
                Some(summary) => {
                    writeln!(f, "  {}: {:4} bytes  {summary}", entry.tag, entry.len)?
                }
                None => writeln!(f, "  {}: {:4} bytes", entry.tag, entry.len)?,
            }
        }
        writeln!(
            f,
            "rle: {} -> {} bytes ({} copy ops / {} literal bytes, {} fill ops / {} filled bytes)",
            self.encoded_len,
            self.decoded_len,
            self.copy_ops,
            self.literal_bytes,
            self.fill_ops,
            self.filled_bytes
        )?;
        for table in &self.tables {
            writeln!(
                f,
                "{}: offset={:9}\tlen={:9}\trle_len={:9}",
                table.tag, table.offset, table.length, table.rle_len
            )?;
        }
        Ok(())
    }
}

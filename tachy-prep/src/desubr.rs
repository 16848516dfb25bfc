//! CFF desubroutinization: inline every local and global subroutine
//! call, then rebuild the table without the subroutine indexes.
//!
//! The rebuilt Top DICT encodes the offsets it owns as 5-byte integers,
//! which keeps the DICT size independent of the offset values and lets
//! the layout be computed in a single sizing pass.

use log::{debug, info};
use tachy_font::tables::cff::{
    self, build_dict, build_index, cs_op, parse_dict, subr_bias, Cff, CsToken, CsTokens, Index,
};
use tachy_font::{FontData, ReadError};

use crate::PrepError;

/// The Type 2 nesting limit.
const MAX_SUBR_DEPTH: u8 = 10;

pub fn desubroutinize(table: FontData) -> Result<Vec<u8>, PrepError> {
    let cff = Cff::read(table)?;
    let charstrings = cff.charstrings()?;
    let local_subrs = cff.local_subrs()?;

    let mut inlined: Vec<Vec<u8>> = Vec::with_capacity(charstrings.count as usize);
    for i in 0..charstrings.count as usize {
        let mut out = Vec::new();
        let mut state = ScanState::default();
        inline_charstring(
            charstrings.item(i)?,
            &cff.global_subrs,
            local_subrs.as_ref(),
            &mut out,
            &mut state,
            0,
        )?;
        inlined.push(out);
    }
    info!(
        "desubroutinized {} charstrings ({} local, {} global subrs dropped)",
        inlined.len(),
        local_subrs.as_ref().map(|s| s.count).unwrap_or(0),
        cff.global_subrs.count,
    );

    rebuild(&cff, &inlined)
}

#[derive(Default)]
struct ScanState {
    stem_count: usize,
    width_parsed: bool,
    /// An `endchar` was emitted; anything after it is unreachable.
    done: bool,
}

fn inline_charstring(
    data: &[u8],
    global_subrs: &Index,
    local_subrs: Option<&Index>,
    out: &mut Vec<u8>,
    state: &mut ScanState,
    depth: u8,
) -> Result<(), PrepError> {
    if depth > MAX_SUBR_DEPTH {
        return Err(PrepError::SubrDepthExceeded);
    }
    let mut tokens = CsTokens::with_stem_state(data, state.stem_count, state.width_parsed);
    // the candidate subroutine index: value and its position in `out`
    let mut last_operand: Option<(i32, usize)> = None;
    while let Some(token) = tokens.next() {
        let (token, start, end) = token?;
        match token {
            CsToken::Int(value) => {
                last_operand = Some((value, out.len()));
                out.extend_from_slice(&data[start..end]);
            }
            CsToken::Fixed(_) => {
                last_operand = None;
                out.extend_from_slice(&data[start..end]);
            }
            CsToken::Op(op @ (cs_op::CALLSUBR | cs_op::CALLGSUBR)) => {
                let (value, operand_pos) = last_operand.take().ok_or(
                    ReadError::MalformedData("subroutine index is not an integer"),
                )?;
                out.truncate(operand_pos);
                let subrs = if op == cs_op::CALLSUBR {
                    local_subrs.ok_or(ReadError::MalformedData(
                        "callsubr without a local subr index",
                    ))?
                } else {
                    global_subrs
                };
                let index = value + subr_bias(subrs.count as usize);
                if index < 0 || index >= subrs.count as i32 {
                    return Err(PrepError::BadSubrIndex(value));
                }
                state.stem_count = tokens.stem_count();
                state.width_parsed = tokens.width_parsed();
                inline_charstring(
                    subrs.item(index as usize)?,
                    global_subrs,
                    local_subrs,
                    out,
                    state,
                    depth + 1,
                )?;
                if state.done {
                    return Ok(());
                }
                tokens.set_stem_state(state.stem_count, state.width_parsed);
            }
            CsToken::Op(cs_op::RETURN) => break,
            CsToken::Op(cs_op::ENDCHAR) => {
                out.extend_from_slice(&data[start..end]);
                state.done = true;
                break;
            }
            CsToken::Op(_) | CsToken::Op2(_) => {
                last_operand = None;
                out.extend_from_slice(&data[start..end]);
            }
        }
    }
    state.stem_count = tokens.stem_count();
    state.width_parsed = tokens.width_parsed();
    Ok(())
}

/// Reassemble the table: header, Name INDEX and String INDEX verbatim, a
/// rebuilt Top DICT, an empty Global Subr INDEX, and the tail structures
/// (charset, encoding, CharStrings, Private DICT) in their original
/// relative order with the Private DICT's `Subrs` entry removed.
fn rebuild(cff: &Cff, charstrings: &[Vec<u8>]) -> Result<Vec<u8>, PrepError> {
    let table = cff.data();
    let bytes = table.as_bytes();
    let num_glyphs = charstrings.len() as u16;

    let cs_refs: Vec<&[u8]> = charstrings.iter().map(|v| v.as_slice()).collect();
    let new_charstrings = build_index(&cs_refs);

    let mut top_dict = parse_dict(cff.top_dict_index.item(0)?)?;
    let mut fixed_width: Vec<u16> = vec![cff::op::CHAR_STRINGS];

    // (operator, rebuilt bytes, original offset) of the tail structures
    let mut tail: Vec<(u16, Vec<u8>, usize)> = Vec::new();
    tail.push((
        cff::op::CHAR_STRINGS,
        new_charstrings,
        cff.charstrings_offset()?,
    ));
    if let Some(offset) = cff.charset_offset() {
        let charset = cff::Charset::read(table, offset, num_glyphs)?;
        let raw = slice(bytes, offset, charset.byte_len)?;
        tail.push((cff::op::CHARSET, raw, offset));
        fixed_width.push(cff::op::CHARSET);
    }
    if let Some(offset) = custom_encoding_offset(cff) {
        let len = encoding_len(table, offset)?;
        tail.push((cff::op::ENCODING, slice(bytes, offset, len)?, offset));
        fixed_width.push(cff::op::ENCODING);
    }
    let new_private = if let Some((size, offset)) = cff.private_range() {
        let private = table
            .slice(offset..offset + size)
            .ok_or(ReadError::OutOfBounds)?;
        let entries: Vec<_> = parse_dict(private.as_bytes())?
            .into_iter()
            .filter(|entry| entry.operator != cff::op::SUBRS)
            .collect();
        let rebuilt = build_dict(&entries, &[]);
        tail.push((cff::op::PRIVATE, rebuilt.clone(), offset));
        fixed_width.push(cff::op::PRIVATE);
        Some(rebuilt)
    } else {
        None
    };
    tail.sort_by_key(|(_, _, original_offset)| *original_offset);

    // sizing pass: 5-byte operands make the Top DICT length final now
    let top_dict_len = build_dict(&top_dict, &fixed_width).len();
    let placeholder = vec![0u8; top_dict_len];
    let top_index_len = build_index(&[placeholder.as_slice()]).len();

    let header_len = cff.header.header_size as usize;
    let name_raw = slice(bytes, cff.name_index.start, cff.name_index.end() - cff.name_index.start)?;
    let string_raw = slice(
        bytes,
        cff.string_index.start,
        cff.string_index.end() - cff.string_index.start,
    )?;
    let empty_subrs = build_index(&[]);

    let tail_start =
        header_len + name_raw.len() + top_index_len + string_raw.len() + empty_subrs.len();
    let mut positions = Vec::with_capacity(tail.len());
    let mut position = tail_start;
    for (operator, data, _) in &tail {
        positions.push((*operator, position));
        position += data.len();
    }

    // patch the offsets into the Top DICT
    for entry in top_dict.iter_mut() {
        let Some(&(_, new_offset)) = positions.iter().find(|(op, _)| *op == entry.operator)
        else {
            continue;
        };
        match entry.operator {
            cff::op::PRIVATE => {
                let size = new_private.as_ref().map(Vec::len).unwrap_or(0);
                entry.operands = vec![size as i64, new_offset as i64];
            }
            _ => entry.operands = vec![new_offset as i64],
        }
    }

    let final_dict = build_dict(&top_dict, &fixed_width);
    debug_assert_eq!(final_dict.len(), top_dict_len);
    let final_top_index = build_index(&[final_dict.as_slice()]);
    debug_assert_eq!(final_top_index.len(), top_index_len);

    let mut out = Vec::with_capacity(position);
    out.extend_from_slice(&bytes[..header_len]);
    out.extend_from_slice(&name_raw);
    out.extend_from_slice(&final_top_index);
    out.extend_from_slice(&string_raw);
    out.extend_from_slice(&empty_subrs);
    for (_, data, _) in &tail {
        out.extend_from_slice(data);
    }
    debug!("rebuilt CFF table: {} -> {} bytes", bytes.len(), out.len());
    Ok(out)
}

fn slice(bytes: &[u8], start: usize, len: usize) -> Result<Vec<u8>, PrepError> {
    Ok(bytes
        .get(start..start + len)
        .ok_or(ReadError::OutOfBounds)?
        .to_vec())
}

/// The Encoding offset, unless it names a predefined encoding (0 or 1).
fn custom_encoding_offset(cff: &Cff) -> Option<usize> {
    let offset = cff
        .top_dict_get(cff::op::ENCODING)
        .and_then(|entry| entry.first_operand())?;
    (offset > 1).then_some(offset as usize)
}

/// Byte length of a custom Encoding structure.
fn encoding_len(table: FontData, offset: usize) -> Result<usize, PrepError> {
    let format = table.read_u8_at(offset)?;
    let mut len = match format & 0x7F {
        0 => 2 + table.read_u8_at(offset + 1)? as usize,
        1 => 2 + table.read_u8_at(offset + 1)? as usize * 2,
        other => return Err(ReadError::InvalidFormat(other as i64).into()),
    };
    if format & 0x80 != 0 {
        let n_sups = table.read_u8_at(offset + len)? as usize;
        len += 1 + n_sups * 3;
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tachy_test_fonts as test_fonts;

    fn desubroutinized() -> Vec<u8> {
        desubroutinize(FontData::new(&test_fonts::cff_table())).unwrap()
    }

    #[test]
    fn inlines_local_and_global_calls() {
        let rebuilt = desubroutinized();
        let cff = Cff::read(FontData::new(&rebuilt)).unwrap();
        let charstrings = cff.charstrings().unwrap();
        let expected = test_fonts::cff_charstrings_desubroutinized();
        assert_eq!(charstrings.count as usize, expected.len());
        for (i, want) in expected.iter().enumerate() {
            assert_eq!(charstrings.item(i).unwrap(), want.as_slice(), "gid {i}");
        }
    }

    #[test]
    fn drops_subr_indexes() {
        let rebuilt = desubroutinized();
        let cff = Cff::read(FontData::new(&rebuilt)).unwrap();
        assert_eq!(cff.global_subrs.count, 0);
        assert!(cff.local_subrs().unwrap().is_none());
    }

    #[test]
    fn charset_survives_relocation() {
        let rebuilt = desubroutinized();
        let cff = Cff::read(FontData::new(&rebuilt)).unwrap();
        let offset = cff.charset_offset().expect("charset kept");
        let charset =
            cff::Charset::read(FontData::new(&rebuilt), offset, test_fonts::CFF_NUM_GLYPHS)
                .unwrap();
        assert_eq!(charset.format, 2);
        assert_eq!(charset.ranges, vec![(1, 1)]);
    }

    #[test]
    fn deep_recursion_is_rejected() {
        // a subr that calls itself: index 0, bias 107 -> operand -107
        let looping = [0x20u8, 0x0A, 0x0B];
        let subrs_index = build_index(&[&looping]);
        let subrs = Index::read(FontData::new(&subrs_index), 0).unwrap();
        let empty = build_index(&[]);
        let globals = Index::read(FontData::new(&empty), 0).unwrap();

        let mut out = Vec::new();
        let mut state = ScanState::default();
        let err = inline_charstring(&looping, &globals, Some(&subrs), &mut out, &mut state, 0);
        assert!(matches!(err, Err(PrepError::SubrDepthExceeded)));
    }
}

//! The `GSUB` table, parsed only as far as glyph closure needs.
//!
//! Closure treats every lookup in the lookup list as applicable, so
//! contextual lookups (types 5 and 6) never need their sequence rules
//! decoded: the lookups they nest are members of the same lookup list
//! and are visited directly.

use crate::{FontData, FontRef, ReadError, Tag};

pub const GSUB: Tag = Tag::new(b"GSUB");

pub struct Gsub<'a> {
    data: FontData<'a>,
}

impl<'a> Gsub<'a> {
    pub fn from_font(font: &FontRef<'a>) -> Option<Self> {
        font.table_data(GSUB).map(|data| Gsub { data })
    }

    pub fn new(data: FontData<'a>) -> Self {
        Gsub { data }
    }

    /// Every substitution subtable in the lookup list, with extension
    /// wrappers resolved.
    pub fn subst_subtables(&self) -> Result<Vec<SubstSubtable>, ReadError> {
        let major = self.data.read_u16_at(0)?;
        if major != 1 {
            return Err(ReadError::InvalidFormat(major as i64));
        }
        let lookup_list_offset = self.data.read_u16_at(8)? as usize;
        let lookup_list = self
            .data
            .split_off(lookup_list_offset)
            .ok_or(ReadError::OutOfBounds)?;
        let lookup_count = lookup_list.read_u16_at(0)?;

        let mut out = Vec::new();
        for i in 0..lookup_count as usize {
            let lookup_offset = lookup_list.read_u16_at(2 + i * 2)? as usize;
            let lookup = lookup_list
                .split_off(lookup_offset)
                .ok_or(ReadError::OutOfBounds)?;
            self.read_lookup(lookup, &mut out)?;
        }
        Ok(out)
    }

    fn read_lookup(
        &self,
        lookup: FontData<'a>,
        out: &mut Vec<SubstSubtable>,
    ) -> Result<(), ReadError> {
        let lookup_type = lookup.read_u16_at(0)?;
        let subtable_count = lookup.read_u16_at(4)?;

        for i in 0..subtable_count as usize {
            let subtable_offset = lookup.read_u16_at(6 + i * 2)? as usize;
            let mut data = lookup
                .split_off(subtable_offset)
                .ok_or(ReadError::OutOfBounds)?;
            let mut actual_type = lookup_type;
            if lookup_type == 7 {
                // extension: format, extensionLookupType, extensionOffset
                actual_type = data.read_u16_at(2)?;
                let ext_offset = data.read_u32_at(4)? as usize;
                data = data.split_off(ext_offset).ok_or(ReadError::OutOfBounds)?;
                if actual_type == 7 {
                    return Err(ReadError::MalformedData("nested extension lookup"));
                }
            }
            out.push(parse_subtable(actual_type, data)?);
        }
        Ok(())
    }
}

fn parse_subtable(lookup_type: u16, data: FontData) -> Result<SubstSubtable, ReadError> {
    match lookup_type {
        1 => read_single(data).map(SubstSubtable::Single),
        2 => read_sequences(data).map(SubstSubtable::Multiple),
        3 => read_sequences(data).map(SubstSubtable::Alternate),
        4 => read_ligature(data).map(SubstSubtable::Ligature),
        5 | 6 => Ok(SubstSubtable::Contextual),
        8 => read_reverse_chain(data).map(SubstSubtable::ReverseChain),
        other => Err(ReadError::InvalidFormat(other as i64)),
    }
}

/// Substitution subtables that contribute glyphs to a closure.
pub enum SubstSubtable {
    Single(SingleSubst),
    /// Multiple substitution (type 2).
    Multiple(SequenceSubst),
    /// Alternate substitution (type 3); same shape as type 2 for closure.
    Alternate(SequenceSubst),
    Ligature(LigatureSubst),
    ReverseChain(ReverseChainSubst),
    /// Types 5/6; no targets of their own (see module docs).
    Contextual,
}

pub struct SingleSubst {
    pub coverage: Coverage,
    pub kind: SingleSubstKind,
}

pub enum SingleSubstKind {
    Delta(i16),
    Substitutes(Vec<u16>),
}

/// Types 2 and 3: per-coverage-glyph lists of output glyphs.
pub struct SequenceSubst {
    pub coverage: Coverage,
    pub sequences: Vec<Vec<u16>>,
}

pub struct Ligature {
    pub ligature_glyph: u16,
    /// Component glyphs beyond the first (which comes from coverage).
    pub components: Vec<u16>,
}

pub struct LigatureSubst {
    pub coverage: Coverage,
    /// One set of ligatures per coverage glyph.
    pub ligature_sets: Vec<Vec<Ligature>>,
}

pub struct ReverseChainSubst {
    pub coverage: Coverage,
    /// One substitute per coverage glyph.
    pub substitutes: Vec<u16>,
}

fn read_single(data: FontData) -> Result<SingleSubst, ReadError> {
    let format = data.read_u16_at(0)?;
    let coverage = Coverage::read_at(data, data.read_u16_at(2)? as usize)?;
    let kind = match format {
        1 => SingleSubstKind::Delta(data.read_i16_at(4)?),
        2 => {
            let count = data.read_u16_at(4)? as usize;
            let mut substitutes = Vec::with_capacity(count);
            for i in 0..count {
                substitutes.push(data.read_u16_at(6 + i * 2)?);
            }
            SingleSubstKind::Substitutes(substitutes)
        }
        other => return Err(ReadError::InvalidFormat(other as i64)),
    };
    Ok(SingleSubst { coverage, kind })
}

/// Multiple and alternate substitutions share a layout: coverage plus a
/// table of glyph sequences/alternate sets.
fn read_sequences(data: FontData) -> Result<SequenceSubst, ReadError> {
    let coverage = Coverage::read_at(data, data.read_u16_at(2)? as usize)?;
    let count = data.read_u16_at(4)? as usize;
    let mut sequences = Vec::with_capacity(count);
    for i in 0..count {
        let seq_offset = data.read_u16_at(6 + i * 2)? as usize;
        let seq = data.split_off(seq_offset).ok_or(ReadError::OutOfBounds)?;
        let glyph_count = seq.read_u16_at(0)? as usize;
        let mut glyphs = Vec::with_capacity(glyph_count);
        for j in 0..glyph_count {
            glyphs.push(seq.read_u16_at(2 + j * 2)?);
        }
        sequences.push(glyphs);
    }
    Ok(SequenceSubst {
        coverage,
        sequences,
    })
}

fn read_ligature(data: FontData) -> Result<LigatureSubst, ReadError> {
    let coverage = Coverage::read_at(data, data.read_u16_at(2)? as usize)?;
    let set_count = data.read_u16_at(4)? as usize;
    let mut ligature_sets = Vec::with_capacity(set_count);
    for i in 0..set_count {
        let set_offset = data.read_u16_at(6 + i * 2)? as usize;
        let set = data.split_off(set_offset).ok_or(ReadError::OutOfBounds)?;
        let ligature_count = set.read_u16_at(0)? as usize;
        let mut ligatures = Vec::with_capacity(ligature_count);
        for j in 0..ligature_count {
            let lig_offset = set.read_u16_at(2 + j * 2)? as usize;
            let lig = set.split_off(lig_offset).ok_or(ReadError::OutOfBounds)?;
            let ligature_glyph = lig.read_u16_at(0)?;
            let component_count = lig.read_u16_at(2)? as usize;
            let mut components = Vec::with_capacity(component_count.saturating_sub(1));
            for k in 0..component_count.saturating_sub(1) {
                components.push(lig.read_u16_at(4 + k * 2)?);
            }
            ligatures.push(Ligature {
                ligature_glyph,
                components,
            });
        }
        ligature_sets.push(ligatures);
    }
    Ok(LigatureSubst {
        coverage,
        ligature_sets,
    })
}

fn read_reverse_chain(data: FontData) -> Result<ReverseChainSubst, ReadError> {
    let format = data.read_u16_at(0)?;
    if format != 1 {
        return Err(ReadError::InvalidFormat(format as i64));
    }
    let coverage = Coverage::read_at(data, data.read_u16_at(2)? as usize)?;
    let backtrack_count = data.read_u16_at(4)? as usize;
    let lookahead_at = 6 + backtrack_count * 2;
    let lookahead_count = data.read_u16_at(lookahead_at)? as usize;
    let glyphs_at = lookahead_at + 2 + lookahead_count * 2;
    let glyph_count = data.read_u16_at(glyphs_at)? as usize;
    let mut substitutes = Vec::with_capacity(glyph_count);
    for i in 0..glyph_count {
        substitutes.push(data.read_u16_at(glyphs_at + 2 + i * 2)?);
    }
    Ok(ReverseChainSubst {
        coverage,
        substitutes,
    })
}

/// A coverage table, expanded to its glyph list in coverage-index order.
pub struct Coverage {
    glyphs: Vec<u16>,
}

impl Coverage {
    fn read_at(parent: FontData, offset: usize) -> Result<Self, ReadError> {
        let data = parent.split_off(offset).ok_or(ReadError::OutOfBounds)?;
        let format = data.read_u16_at(0)?;
        let count = data.read_u16_at(2)? as usize;
        let mut glyphs = Vec::new();
        match format {
            1 => {
                for i in 0..count {
                    glyphs.push(data.read_u16_at(4 + i * 2)?);
                }
            }
            2 => {
                for i in 0..count {
                    let at = 4 + i * 6;
                    let start = data.read_u16_at(at)?;
                    let end = data.read_u16_at(at + 2)?;
                    if end < start {
                        return Err(ReadError::MalformedData("descending coverage range"));
                    }
                    glyphs.extend(start..=end);
                }
            }
            other => return Err(ReadError::InvalidFormat(other as i64)),
        }
        Ok(Coverage { glyphs })
    }

    /// Glyphs in coverage-index order.
    pub fn glyphs(&self) -> &[u16] {
        &self.glyphs
    }
}

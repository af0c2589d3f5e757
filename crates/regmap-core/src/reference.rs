//! Cross-entity resolution: reference bit fields and indirect indices.
//!
//! Runs only after the whole tree exists, since references may point forward
//! or into other registers. Names are matched against a per-block table of
//! bit field full names, built once on first lookup.

use std::collections::{HashMap, HashSet};

use crate::error::{Diagnostics, RegMapError};
use crate::map::{BitField, BlockId, IndexEntry, Register, RegisterMap};

impl RegisterMap {
    /// Find a bit field by its full name within one block.
    pub fn lookup_bit_field(&self, block: BlockId, full_name: &str) -> Option<BitField<'_>> {
        let table = self.bit_field_lookup.get_or_init(|| {
            let mut table: HashMap<BlockId, HashMap<String, _>> = HashMap::new();
            for field in self.bit_fields() {
                table
                    .entry(field.register().block().id())
                    .or_default()
                    .insert(field.full_name().to_string(), field.id());
            }
            log::debug!("bit field lookup table built: {} entries", self.bit_fields.len());
            table
        });
        table
            .get(&block)
            .and_then(|names| names.get(full_name))
            .map(|&id| self.bit_field(id))
    }
}

impl<'a> BitField<'a> {
    /// The resolved reference bit field, if one is given and exists.
    pub fn reference(&self) -> Option<BitField<'a>> {
        let path = self.reference_path()?;
        let block = self.register().block().id();
        self.map.lookup_bit_field(block, path)
    }

    /// Array size of every hierarchy level above this bit field, outermost
    /// first, ending with the owning register.
    fn layers(&self) -> Vec<Option<Vec<u64>>> {
        let register = self.register();
        let mut layers: Vec<_> = register
            .register_files()
            .iter()
            .map(|file| file.array_size())
            .collect();
        layers.push(register.array_size());
        layers
    }

    fn within_array(&self) -> bool {
        self.layers().iter().any(Option::is_some)
    }
}

/// One resolved index entry of an indirect register.
#[derive(Debug, Clone, Copy)]
pub struct IndirectIndex<'a> {
    pub entry: &'a IndexEntry,
    pub bit_field: Option<BitField<'a>>,
}

impl<'a> Register<'a> {
    /// Index entries paired with their target bit fields.
    pub fn indirect_indices(&self) -> Vec<IndirectIndex<'a>> {
        let map = self.map;
        let block = self.block().id();
        self.index_entries()
            .iter()
            .map(|entry| IndirectIndex {
                entry,
                bit_field: map.lookup_bit_field(block, &entry.name),
            })
            .collect()
    }
}

pub(crate) fn check_tree(map: &RegisterMap, diagnostics: &mut Diagnostics) {
    for field in map.bit_fields() {
        if let Err(error) = check_reference(&field) {
            diagnostics.push(error);
        }
    }
    for register in map.registers().filter(Register::is_indirect) {
        check_indirect_indices(&register, diagnostics);
    }
    for register in map.registers().filter(Register::is_indirect) {
        check_distinguishable(&register, diagnostics);
    }
}

fn check_reference(field: &BitField<'_>) -> Result<(), RegMapError> {
    let Some(path) = field.reference_path() else {
        return Ok(());
    };
    let constraint = |message: String| RegMapError::constraint(field.path(), message);
    let topology = |message: String| RegMapError::topology(field.path(), message);

    if path == field.full_name() {
        return Err(constraint(format!(
            "bit field itself is not allowed as reference bit field: {path}"
        )));
    }
    let Some(target) = field.reference() else {
        return Err(constraint(format!("no such bit field found: {path}")));
    };

    if field.within_array() || target.within_array() {
        let own = field.layers();
        let other = target.layers();
        if own.len() != other.len() {
            return Err(topology(format!("depth of layer is not matched: {path}")));
        }
        for (own, other) in own.iter().zip(&other) {
            match (own, other) {
                (None, Some(_)) => {
                    return Err(topology(format!(
                        "bit field within array layer is not allowed as reference bit field: {path}"
                    )))
                }
                (Some(own), Some(other)) if own != other => {
                    return Err(topology(format!("array size is not matched: {path}")))
                }
                _ => {}
            }
        }
    }

    if target.is_sequential() {
        if !field.is_sequential() {
            return Err(constraint(format!(
                "sequential bit field is not allowed as reference bit field: {path}"
            )));
        }
        if field.sequence_size() != target.sequence_size() {
            return Err(constraint(format!("sequence size is not matched: {path}")));
        }
    }

    if target.is_reserved() {
        return Err(constraint(format!(
            "reserved bit field is not allowed as reference bit field: {path}"
        )));
    }

    let required = field.required_reference_width();
    if target.width() < required {
        return Err(constraint(format!(
            "{required} bits reference bit field is required: {} bit(s) width",
            target.width()
        )));
    }
    Ok(())
}

fn check_indirect_indices(register: &Register<'_>, diagnostics: &mut Diagnostics) {
    let path = register.path();
    let mut seen = HashSet::new();
    for entry in register.index_entries() {
        if !seen.insert(entry.name.as_str()) {
            diagnostics.push(RegMapError::constraint(
                path,
                format!("same bit field is used as indirect index more than once: {}", entry.name),
            ));
        }
    }

    let dimensions = register.array_size().unwrap_or_default();
    let array_entries = register
        .index_entries()
        .iter()
        .filter(|e| e.is_array_index())
        .count();
    if array_entries > dimensions.len() {
        diagnostics.push(RegMapError::constraint(path, "too many array indices are given"));
    } else if array_entries < dimensions.len() {
        diagnostics.push(RegMapError::constraint(path, "too few array indices are given"));
    }

    let mut array_dimensions = dimensions.iter();
    for index in register.indirect_indices() {
        let dimension = if index.entry.is_array_index() {
            array_dimensions.next().copied()
        } else {
            None
        };
        if let Err(message) = check_index_target(register, &index, dimension) {
            diagnostics.push(RegMapError::constraint(path, message));
        }
    }
}

fn check_index_target(
    register: &Register<'_>,
    index: &IndirectIndex<'_>,
    dimension: Option<u64>,
) -> Result<(), String> {
    let name = &index.entry.name;
    let Some(target) = index.bit_field else {
        return Err(format!("no such bit field for indirect index is found: {name}"));
    };
    if target.register() == *register {
        return Err(format!("own bit field is not allowed for indirect index: {name}"));
    }
    if target.register().is_array() || target.register().register_files().iter().any(|f| f.is_array()) {
        return Err(format!(
            "bit field of array register is not allowed for indirect index: {name}"
        ));
    }
    if target.is_sequential() {
        return Err(format!("sequential bit field is not allowed for indirect index: {name}"));
    }
    if target.is_reserved() {
        return Err(format!("reserved bit field is not allowed for indirect index: {name}"));
    }

    let width = target.width();
    match index.entry.value {
        Some(value) if value < 0 || !fits(width, value as u64) => Err(format!(
            "bit width of indirect index is not enough for index value {value}: {name}"
        )),
        None => match dimension {
            Some(size) if !fits(width, size.saturating_sub(1)) => Err(format!(
                "bit width of indirect index is not enough for array size {size}: {name}"
            )),
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

/// `value` is representable in `width` unsigned bits.
fn fits(width: u64, value: u64) -> bool {
    width >= 64 || value < (1u64 << width)
}

/// Every sibling sharing addresses with an indirect register must differ from
/// it in the fixed value of at least one common index bit field.
fn check_distinguishable(register: &Register<'_>, diagnostics: &mut Diagnostics) {
    let range = register.address_range();
    let map = register.map;
    let ambiguous = map
        .children_of(register.parent())
        .iter()
        .filter_map(|&c| map.child(c).as_register())
        .filter(|other| other != register && other.address_range().overlaps(&range))
        .any(|other| !distinguishable(register, &other));
    if ambiguous {
        diagnostics.push(RegMapError::topology(
            register.path(),
            "cannot be distinguished from other registers",
        ));
    }
}

fn distinguishable(a: &Register<'_>, b: &Register<'_>) -> bool {
    if !b.is_indirect() {
        return false;
    }
    // A repeated index path keeps its first value.
    let fixed = |r: &Register<'_>| -> HashMap<String, i64> {
        let mut values = HashMap::new();
        for entry in r.index_entries() {
            if let Some(value) = entry.value {
                values.entry(entry.name.clone()).or_insert(value);
            }
        }
        values
    };
    let theirs = fixed(b);
    fixed(a)
        .iter()
        .any(|(name, value)| theirs.get(name).is_some_and(|v| v != value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_value_fits_width() {
        assert!(fits(1, 1));
        assert!(!fits(1, 2));
        assert!(fits(2, 3));
        assert!(fits(64, u64::MAX));
    }
}

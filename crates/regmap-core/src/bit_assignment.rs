//! Bit positions of bit fields within one register.
//!
//! A bit assignment arrives as a record (`{lsb, width, sequence_size, step}`)
//! or as a colon-delimited string ordered per
//! [`BitAssignmentFormat`](regmap_config::BitAssignmentFormat). Missing
//! values default from the previous sibling bit field during the build pass;
//! range and overlap checks run in the local verification phase.

use std::fmt;

use num_bigint::BigUint;
use num_traits::{One, Zero};
use regmap_config::BitAssignmentFormat;

use crate::error::{Diagnostics, RegMapError, Result};
use crate::map::{BitField, RegisterMap};
use crate::value::{parse_integer, Value};

/// Upper bound on the bit extent of any register, wide or not.
pub const MAX_REGISTER_WIDTH: i64 = 4096;

/// Resolved bit geometry of one bit field. Values are kept as given so that
/// the local phase can report negative or zero inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitAssignment {
    pub lsb: i64,
    pub width: i64,
    /// `Some` when the bit field is sequential.
    pub sequence_size: Option<i64>,
    pub step: i64,
}

impl BitAssignment {
    pub fn new(lsb: i64, width: i64) -> Self {
        Self {
            lsb,
            width,
            sequence_size: None,
            step: width,
        }
    }

    pub fn sequential(lsb: i64, width: i64, sequence_size: i64, step: i64) -> Self {
        Self {
            lsb,
            width,
            sequence_size: Some(sequence_size),
            step,
        }
    }

    pub fn is_sequential(&self) -> bool {
        self.sequence_size.is_some()
    }

    /// Sequential with replicas packed back to back.
    pub fn is_compact(&self) -> bool {
        self.is_sequential() && self.step == self.width
    }

    /// Number of replicas; 1 for a non-sequential field.
    pub fn replicas(&self) -> i64 {
        self.sequence_size.unwrap_or(1)
    }

    /// Default lsb of the bit field declared after this one.
    pub fn next_lsb(&self) -> i64 {
        if self.is_compact() {
            self.lsb.saturating_add(self.width.saturating_mul(self.replicas()))
        } else {
            self.lsb.saturating_add(self.width)
        }
    }

    fn in_range(&self) -> bool {
        self.lsb >= 0
            && self.width >= 1
            && self.sequence_size.map_or(true, |size| size >= 1)
            && self.step >= 1
    }

    /// In range and within [`MAX_REGISTER_WIDTH`] bits.
    pub fn is_valid(&self) -> bool {
        self.in_range() && self.top_bit().is_some_and(|msb| msb < MAX_REGISTER_WIDTH)
    }

    /// Highest occupied bit, or `None` when it does not fit in an `i64`.
    fn top_bit(&self) -> Option<i64> {
        let last = self.replicas().max(1) - 1;
        let lsb = if self.is_sequential() {
            self.step.checked_mul(last)?.checked_add(self.lsb)?
        } else {
            self.lsb
        };
        lsb.checked_add(self.width.checked_sub(1)?)
    }

    /// Concrete lsb of replica `index`; the base lsb for non-sequential fields.
    pub fn lsb_of(&self, index: i64) -> i64 {
        if self.is_sequential() {
            self.lsb.saturating_add(self.step.saturating_mul(index))
        } else {
            self.lsb
        }
    }

    pub fn msb_of(&self, index: i64) -> i64 {
        self.lsb_of(index).saturating_add(self.width.saturating_sub(1))
    }

    /// Lsb of every replica. Only the base lsb for an invalid assignment.
    pub fn lsbs(&self) -> Vec<i64> {
        if !self.is_valid() {
            return vec![self.lsb];
        }
        (0..self.replicas()).map(|i| self.lsb_of(i)).collect()
    }

    /// Highest occupied bit over every replica, saturating at `i64::MAX`.
    pub fn max_msb(&self) -> i64 {
        self.top_bit().unwrap_or(i64::MAX)
    }

    /// Position of replica `index`, concrete or symbolic.
    pub fn lsb(&self, index: &Index) -> BitPosition {
        self.position(index, 0)
    }

    pub fn msb(&self, index: &Index) -> BitPosition {
        self.position(index, self.width.saturating_sub(1))
    }

    fn position(&self, index: &Index, offset: i64) -> BitPosition {
        if !self.is_sequential() {
            return BitPosition::Literal(self.lsb.saturating_add(offset));
        }
        match index {
            Index::Literal(i) => BitPosition::Literal(self.lsb_of(*i).saturating_add(offset)),
            Index::Symbol(variable) => BitPosition::Affine {
                base: self.lsb.saturating_add(offset),
                step: self.step,
                variable: variable.clone(),
            },
        }
    }

    /// Occupancy mask over every replica. Zero for an invalid assignment.
    pub fn mask(&self) -> BigUint {
        if !self.is_valid() {
            return BigUint::zero();
        }
        let width = self.width as u64;
        let unit = (BigUint::one() << width) - BigUint::one();
        self.lsbs()
            .into_iter()
            .fold(BigUint::zero(), |mask, lsb| mask | (&unit << (lsb as u64)))
    }

    /// Range violations of this assignment, in input order.
    pub fn range_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.lsb < 0 {
            errors.push(format!("lsb is less than 0: {}", self.lsb));
        }
        if self.width < 1 {
            errors.push(format!("width is less than 1: {}", self.width));
        }
        if let Some(size) = self.sequence_size {
            if size < 1 {
                errors.push(format!("sequence size is less than 1: {size}"));
            }
        }
        if self.step < 1 {
            errors.push(format!("step is less than 1: {}", self.step));
        }
        if errors.is_empty() && !self.is_valid() {
            errors.push(format!(
                "bit field exceeds the maximum register width ({MAX_REGISTER_WIDTH}): msb {}",
                self.max_msb()
            ));
        }
        errors
    }
}

/// Replica index used to query a sequential bit field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Index {
    Literal(i64),
    /// A loop variable name, interpolated later by a template.
    Symbol(String),
}

impl From<i64> for Index {
    fn from(v: i64) -> Self {
        Index::Literal(v)
    }
}

impl From<&str> for Index {
    fn from(v: &str) -> Self {
        Index::Symbol(v.to_string())
    }
}

/// A bit position that is either known or an affine expression of a loop variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BitPosition {
    Literal(i64),
    Affine {
        base: i64,
        step: i64,
        variable: String,
    },
}

impl BitPosition {
    pub fn as_literal(&self) -> Option<i64> {
        match self {
            BitPosition::Literal(v) => Some(*v),
            BitPosition::Affine { .. } => None,
        }
    }
}

impl fmt::Display for BitPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitPosition::Literal(v) => write!(f, "{v}"),
            BitPosition::Affine {
                base,
                step,
                variable,
            } => write!(f, "{base}+{step}*{variable}"),
        }
    }
}

/// A bit assignment as given, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitAssignmentInput {
    pub lsb: Option<i64>,
    pub width: Option<i64>,
    pub sequence_size: Option<i64>,
    pub step: Option<i64>,
}

const KEYS: [&str; 4] = ["lsb", "width", "sequence_size", "step"];

impl BitAssignmentInput {
    /// Parse a record or a colon-delimited string. Errors carry no path.
    pub fn parse(value: &Value, format: BitAssignmentFormat) -> Result<Self> {
        match value {
            Value::Record(entries) => {
                let mut input = Self::default();
                for (key, entry) in entries {
                    let number = entry.as_integer().map_err(|e| {
                        RegMapError::malformed("", format!("{e} for bit assignment {key}"))
                    })?;
                    match key.as_str() {
                        "lsb" => input.lsb = Some(number),
                        "width" => input.width = Some(number),
                        "sequence_size" => input.sequence_size = Some(number),
                        "step" => input.step = Some(number),
                        _ => {
                            return Err(RegMapError::malformed(
                                "",
                                format!("unknown bit assignment key: {key} (expected one of {})", KEYS.join(", ")),
                            ))
                        }
                    }
                }
                Ok(input)
            }
            Value::Text(text) => Self::parse_str(text, format)
                .ok_or_else(|| RegMapError::malformed("", format!("illegal input value for bit assignment: {value}"))),
            _ => Err(RegMapError::malformed(
                "",
                format!("illegal input value for bit assignment: {value}"),
            )),
        }
    }

    fn parse_str(text: &str, format: BitAssignmentFormat) -> Option<Self> {
        let parts: Vec<&str> = text.split(':').map(str::trim).collect();
        if parts.is_empty() || parts.len() > 4 {
            return None;
        }
        let mut numbers = [None; 4];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            if !part.is_empty() {
                *slot = Some(parse_integer(part)?);
            }
        }
        let (first, second) = (numbers[0], numbers[1]);
        let (lsb, width) = match format {
            BitAssignmentFormat::WidthLsb => (second, first),
            BitAssignmentFormat::LsbWidth => (first, second),
        };
        Some(Self {
            lsb,
            width,
            sequence_size: numbers[2],
            step: numbers[3],
        })
    }

    /// Apply defaults. `previous` is the bit field declared just before in the same register.
    pub fn resolve(&self, previous: Option<&BitAssignment>) -> Result<BitAssignment> {
        if self.lsb.is_none() && self.width.is_none() {
            return Err(RegMapError::missing("", "neither lsb nor width is given"));
        }
        let lsb = self
            .lsb
            .unwrap_or_else(|| previous.map_or(0, BitAssignment::next_lsb));
        let width = self.width.unwrap_or(1);
        Ok(BitAssignment {
            lsb,
            width,
            sequence_size: self.sequence_size,
            step: self.step.unwrap_or(width),
        })
    }
}

impl<'a> BitField<'a> {
    pub fn lsb(&self) -> i64 {
        self.bit_assignment().lsb
    }

    pub fn msb(&self) -> i64 {
        self.bit_assignment().msb_of(0)
    }

    /// Lsb of replica `index`, symbolic when the index is a loop variable.
    pub fn lsb_at(&self, index: impl Into<Index>) -> BitPosition {
        self.bit_assignment().lsb(&index.into())
    }

    pub fn msb_at(&self, index: impl Into<Index>) -> BitPosition {
        self.bit_assignment().msb(&index.into())
    }

    /// Width in bits; 0 for a negative input width.
    pub fn width(&self) -> u64 {
        self.bit_assignment().width.max(0) as u64
    }

    pub fn is_sequential(&self) -> bool {
        self.bit_assignment().is_sequential()
    }

    /// Replica count; 1 for a non-sequential field.
    pub fn sequence_size(&self) -> i64 {
        self.bit_assignment().replicas()
    }

    pub fn step(&self) -> i64 {
        self.bit_assignment().step
    }

    pub fn mask(&self) -> &'a BigUint {
        self.node().cache.mask.get_or_init(|| {
            let mask = self.bit_assignment().mask();
            log::debug!("{}: bit mask = {mask:#x}", self.path());
            mask
        })
    }
}

/// Range checks and overlap against earlier siblings.
pub(crate) fn check_local(map: &RegisterMap, diagnostics: &mut Diagnostics) {
    for register in map.registers() {
        let mut occupied = BigUint::zero();
        for field in register.bit_fields() {
            let assignment = field.bit_assignment();
            let errors = assignment.range_errors();
            if !errors.is_empty() {
                for message in errors {
                    diagnostics.push(RegMapError::constraint(field.path(), message));
                }
                continue;
            }
            let mask = field.mask();
            if !(&occupied & mask).is_zero() {
                diagnostics.push(RegMapError::constraint(
                    field.path(),
                    "overlap with existing bit field(s)",
                ));
            }
            occupied |= mask;
        }
    }
}

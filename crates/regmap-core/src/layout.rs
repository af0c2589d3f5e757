//! Widths, byte sizes, array dimensions and offset addresses.
//!
//! Everything here is derived lazily and memoized on the entity. Offsets
//! default from the previous sibling, so they are resolved for a whole
//! sibling list at once, front to back.

use std::fmt;

use crate::error::{Diagnostics, RegMapError};
use crate::map::{
    AddressCache, Addressable, ArraySpec, ParentId, Register, RegisterBlock, RegisterFile,
    RegisterMap,
};

/// Inclusive byte address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    pub start: i64,
    pub end: i64,
}

impl AddressRange {
    fn sized(start: i64, size: u64) -> Self {
        Self {
            start,
            end: start.saturating_add(to_i64(size)).saturating_sub(1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        !self.is_empty() && !other.is_empty() && self.start <= other.end && other.start <= self.end
    }

    pub fn len(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            (self.end - self.start + 1) as u64
        }
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}-{:#x}", self.start, self.end)
    }
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn clamp(v: i64) -> u64 {
    v.max(0) as u64
}

fn product(dimensions: &[i64]) -> u64 {
    dimensions
        .iter()
        .fold(1u64, |acc, &d| acc.saturating_mul(clamp(d)))
}

/// Round `value` up to the next multiple of `align`.
fn align_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        return value;
    }
    value.div_ceil(align) * align
}

impl<'a> RegisterBlock<'a> {
    pub fn byte_size(&self) -> u64 {
        clamp(self.node().byte_size)
    }

    /// Bits needed to address the block's own byte range.
    pub fn local_address_width(&self) -> u32 {
        let minimum = self.map.config.byte_width().max(1).trailing_zeros();
        let size = self.byte_size().max(1);
        let bits = u64::BITS - (size - 1).leading_zeros();
        bits.max(minimum)
    }
}

impl<'a> Register<'a> {
    /// Width in bits: the bus width, or the bit field extent rounded up to it.
    pub fn width(&self) -> u64 {
        *self.node().cache.width.get_or_init(|| {
            let bus = u64::from(self.map.config.bus_width);
            let extent = self
                .bit_fields()
                .filter(|f| f.bit_assignment().is_valid())
                .map(|f| f.bit_assignment().max_msb() + 1)
                .max();
            let width = match extent {
                Some(extent) if !self.variant().size_is_byte_size => align_up(clamp(extent), bus).max(bus),
                _ => bus,
            };
            log::debug!("{}: width = {width}", self.path());
            width
        })
    }

    pub fn byte_width(&self) -> u64 {
        self.width() / 8
    }

    /// Array dimensions, when the register is an array.
    pub fn array_size(&self) -> Option<Vec<u64>> {
        if !self.variant().array {
            return None;
        }
        self.node()
            .array
            .as_ref()
            .map(|spec| spec.dimensions.iter().map(|&d| clamp(d)).collect())
    }

    pub fn is_array(&self) -> bool {
        self.array_size().is_some()
    }

    /// Replica count; 1 for a non-array register.
    pub fn count(&self) -> u64 {
        self.array_size()
            .map_or(1, |dims| dims.iter().fold(1, |acc: u64, &d| acc.saturating_mul(d)))
    }

    pub fn entry_byte_size(&self) -> u64 {
        *self.node().cache.address.entry_byte_size.get_or_init(|| {
            let array = self.node().array.as_ref();
            if self.variant().size_is_byte_size {
                return array
                    .and_then(|spec| spec.dimensions.first())
                    .map_or_else(|| self.byte_width(), |&size| clamp(size));
            }
            match array.and_then(|spec| spec.step) {
                Some(step) if self.variant().array => clamp(step),
                _ => self.byte_width(),
            }
        })
    }

    /// Total byte size. Replicas of a shared-address register collapse onto one window.
    pub fn byte_size(&self) -> u64 {
        *self.node().cache.address.byte_size.get_or_init(|| {
            let entry = self.entry_byte_size();
            let size = match self.array_size() {
                Some(dims) if !self.supports_shared_address() => {
                    dims.iter().fold(entry, |acc, &d| acc.saturating_mul(d))
                }
                _ => entry,
            };
            log::debug!("{}: byte size = {size}", self.path());
            size
        })
    }

    pub fn offset_address(&self) -> i64 {
        Addressable::Register(*self).offset_address()
    }

    /// Offset from the start of the register block.
    pub fn absolute_offset_address(&self) -> i64 {
        Addressable::Register(*self).absolute_offset_address()
    }

    pub fn address_range(&self) -> AddressRange {
        AddressRange::sized(self.offset_address(), self.byte_size())
    }

    pub fn absolute_address_range(&self) -> AddressRange {
        AddressRange::sized(self.absolute_offset_address(), self.byte_size())
    }

    /// Absolute range of every replica in row-major order; a single range for
    /// shared-address or non-array registers.
    pub fn element_address_ranges(&self) -> Vec<AddressRange> {
        let start = self.absolute_offset_address();
        let entry = self.entry_byte_size();
        let count = if self.supports_shared_address() { 1 } else { self.count() };
        (0..count)
            .map(|i| AddressRange::sized(start.saturating_add(to_i64(i.saturating_mul(entry))), entry))
            .collect()
    }
}

impl<'a> RegisterFile<'a> {
    pub fn array_size(&self) -> Option<Vec<u64>> {
        self.node()
            .array
            .as_ref()
            .map(|spec| spec.dimensions.iter().map(|&d| clamp(d)).collect())
    }

    pub fn is_array(&self) -> bool {
        self.node().array.is_some()
    }

    /// End of the furthest child, before any explicit step.
    fn children_extent(&self) -> u64 {
        self.children()
            .map(|c| clamp(c.offset_address()).saturating_add(c.byte_size()))
            .max()
            .unwrap_or(0)
    }

    pub fn entry_byte_size(&self) -> u64 {
        *self.node().cache.entry_byte_size.get_or_init(|| {
            match self.node().array.as_ref().and_then(|spec| spec.step) {
                Some(step) => clamp(step),
                None => self.children_extent(),
            }
        })
    }

    pub fn byte_size(&self) -> u64 {
        *self.node().cache.byte_size.get_or_init(|| {
            let entry = self.entry_byte_size();
            let size = match &self.node().array {
                Some(spec) => entry.saturating_mul(product(&spec.dimensions)),
                None => entry,
            };
            log::debug!("{}: byte size = {size}", self.path());
            size
        })
    }

    pub fn offset_address(&self) -> i64 {
        Addressable::File(*self).offset_address()
    }

    pub fn absolute_offset_address(&self) -> i64 {
        Addressable::File(*self).absolute_offset_address()
    }

    pub fn address_range(&self) -> AddressRange {
        AddressRange::sized(self.offset_address(), self.byte_size())
    }

    pub fn absolute_address_range(&self) -> AddressRange {
        AddressRange::sized(self.absolute_offset_address(), self.byte_size())
    }
}

impl<'a> Addressable<'a> {
    fn cache(&self) -> &'a AddressCache {
        match self {
            Addressable::File(f) => &f.node().cache,
            Addressable::Register(r) => &r.node().cache.address,
        }
    }

    fn explicit_offset(&self) -> Option<i64> {
        match self {
            Addressable::File(f) => f.node().offset,
            Addressable::Register(r) => r.node().offset,
        }
    }

    fn array_spec(&self) -> Option<&'a ArraySpec> {
        match self {
            Addressable::File(f) => f.node().array.as_ref(),
            Addressable::Register(r) => r.node().array.as_ref(),
        }
    }

    fn parent(&self) -> ParentId {
        match self {
            Addressable::File(f) => f.parent(),
            Addressable::Register(r) => r.parent(),
        }
    }

    fn map(&self) -> &'a RegisterMap {
        match self {
            Addressable::File(f) => f.map,
            Addressable::Register(r) => r.map,
        }
    }

    pub fn byte_size(&self) -> u64 {
        match self {
            Addressable::File(f) => f.byte_size(),
            Addressable::Register(r) => r.byte_size(),
        }
    }

    /// Offset relative to the parent: explicit, or the end of the previous sibling.
    pub fn offset_address(&self) -> i64 {
        let cache = self.cache();
        if let Some(&offset) = cache.offset.get() {
            return offset;
        }
        resolve_sibling_offsets(self.map(), self.parent());
        cache.offset.get().copied().unwrap_or(0)
    }

    pub fn absolute_offset_address(&self) -> i64 {
        *self.cache().absolute_offset.get_or_init(|| {
            let base = match self.parent() {
                ParentId::Block(_) => 0,
                ParentId::File(id) => self.map().file(id).absolute_offset_address(),
            };
            base.saturating_add(self.offset_address())
        })
    }

    pub fn address_range(&self) -> AddressRange {
        AddressRange::sized(self.offset_address(), self.byte_size())
    }

    pub fn absolute_address_range(&self) -> AddressRange {
        AddressRange::sized(self.absolute_offset_address(), self.byte_size())
    }
}

fn resolve_sibling_offsets(map: &RegisterMap, parent: ParentId) {
    let mut next = 0i64;
    for &id in map.children_of(parent) {
        let child = map.child(id);
        let offset = *child.cache().offset.get_or_init(|| {
            let offset = child.explicit_offset().unwrap_or(next);
            log::debug!("{}: offset address = {offset:#x}", child.path());
            offset
        });
        next = offset.saturating_add(to_i64(child.byte_size()));
    }
}

/// Geometry checks that need only the entity and its own inputs.
pub(crate) fn check_local(map: &RegisterMap, diagnostics: &mut Diagnostics) {
    let config = map.config();
    let bus_bytes = config.byte_width().max(1);

    for block in map.blocks() {
        let size = block.node().byte_size;
        if size < 1 {
            diagnostics.push(RegMapError::constraint(
                block.path(),
                format!("byte size is less than 1: {size}"),
            ));
        } else {
            if (size as u64) % bus_bytes != 0 {
                diagnostics.push(RegMapError::constraint(
                    block.path(),
                    format!("byte size is not aligned with bus width({}): {size}", config.bus_width),
                ));
            }
            let space = 1u128.checked_shl(config.address_width).unwrap_or(u128::MAX);
            if u128::from(size as u64) > space {
                diagnostics.push(RegMapError::constraint(
                    block.path(),
                    format!(
                        "byte size exceeds the address space of {}-bit address width: {size}",
                        config.address_width
                    ),
                ));
            }
        }
    }

    for file in map.files() {
        let entity = Addressable::File(file);
        check_offset(&entity, bus_bytes, config.bus_width, diagnostics);
        if let Some(spec) = entity.array_spec() {
            check_dimensions(file.path(), &spec.dimensions, diagnostics);
            if let Some(step) = spec.step {
                check_step(file.path(), step, file.children_extent(), bus_bytes, config.bus_width, diagnostics);
            }
        }
    }

    for register in map.registers() {
        let entity = Addressable::Register(register);
        let variant = register.variant();
        check_offset(&entity, bus_bytes, config.bus_width, diagnostics);

        if let Some(spec) = entity.array_spec() {
            if variant.size_is_byte_size {
                let size = spec.dimensions.first().copied().unwrap_or(0);
                if size < 1 {
                    diagnostics.push(RegMapError::constraint(
                        register.path(),
                        format!("byte size is less than 1: {size}"),
                    ));
                } else if (size as u64) % bus_bytes != 0 {
                    diagnostics.push(RegMapError::constraint(
                        register.path(),
                        format!("byte size is not aligned with bus width({}): {size}", config.bus_width),
                    ));
                }
            } else if !variant.array {
                diagnostics.push(RegMapError::constraint(
                    register.path(),
                    "array register is not allowed",
                ));
            } else {
                check_dimensions(register.path(), &spec.dimensions, diagnostics);
                if let Some(step) = spec.step {
                    check_step(register.path(), step, register.byte_width(), bus_bytes, config.bus_width, diagnostics);
                }
            }
        }

        if register.width() > 64 && !config.enable_wide_register {
            diagnostics.push(RegMapError::constraint(
                register.path(),
                "register width wider than 64 bits is not allowed",
            ));
        }
    }
}

fn check_offset(entity: &Addressable<'_>, bus_bytes: u64, bus_width: u32, diagnostics: &mut Diagnostics) {
    let Some(offset) = entity.explicit_offset() else {
        return;
    };
    if offset < 0 {
        diagnostics.push(RegMapError::constraint(
            entity.path(),
            format!("offset address is less than 0: {offset}"),
        ));
    } else if (offset as u64) % bus_bytes != 0 {
        diagnostics.push(RegMapError::constraint(
            entity.path(),
            format!("offset address is not aligned with bus width({bus_width}): {offset:#x}"),
        ));
    }
}

fn check_dimensions(path: &str, dimensions: &[i64], diagnostics: &mut Diagnostics) {
    if dimensions.iter().any(|&d| d < 1) {
        let listed: Vec<String> = dimensions.iter().map(i64::to_string).collect();
        diagnostics.push(RegMapError::constraint(
            path,
            format!("non positive value(s) are not allowed for array size: [{}]", listed.join(", ")),
        ));
    }
}

fn check_step(path: &str, step: i64, entry: u64, bus_bytes: u64, bus_width: u32, diagnostics: &mut Diagnostics) {
    if step < 1 || (step as u64) < entry {
        diagnostics.push(RegMapError::constraint(
            path,
            format!("step is less than entry byte size ({entry}): {step}"),
        ));
    } else if (step as u64) % bus_bytes != 0 {
        diagnostics.push(RegMapError::constraint(
            path,
            format!("step is not aligned with bus width({bus_width}): {step}"),
        ));
    }
}

/// Sibling overlap and register block boundary checks.
pub(crate) fn check_children(map: &RegisterMap, diagnostics: &mut Diagnostics) {
    for block in map.blocks() {
        check_sibling_overlap(map, ParentId::Block(block.id()), diagnostics);
        check_boundary(map, ParentId::Block(block.id()), block.byte_size(), diagnostics);
    }
    for file in map.files() {
        check_sibling_overlap(map, ParentId::File(file.id()), diagnostics);
    }
}

fn check_sibling_overlap(map: &RegisterMap, parent: ParentId, diagnostics: &mut Diagnostics) {
    let siblings: Vec<Addressable<'_>> = map.children_of(parent).iter().map(|&c| map.child(c)).collect();
    for (j, later) in siblings.iter().enumerate() {
        let range = later.address_range();
        for earlier in &siblings[..j] {
            let other = earlier.address_range();
            if !range.overlaps(&other) {
                continue;
            }
            let allowed = overlap_allowed(earlier, later);
            log::trace!(
                "{} overlaps {} ({other}): {}",
                later.path(),
                earlier.path(),
                if allowed { "allowed" } else { "rejected" }
            );
            if !allowed {
                diagnostics.push(RegMapError::topology(
                    later.path(),
                    format!("offset address range overlaps with other offset address range: {other}"),
                ));
            }
        }
    }
}

/// Overlap is legal only between registers of one type with
/// `overlapping_address` set. A type that also sets `shared_address` allows
/// any pair; distinguishability then decides. Otherwise the pair must not
/// compete for read or write access.
pub(crate) fn overlap_allowed(a: &Addressable<'_>, b: &Addressable<'_>) -> bool {
    let (Some(a), Some(b)) = (a.as_register(), b.as_register()) else {
        return false;
    };
    if !a.match_type(&b) || !a.variant().overlapping_address {
        return false;
    }
    a.supports_shared_address() || !competitive_access(&a, &b)
}

/// Both sides readable or both sides writable.
pub fn competitive_access(a: &Register<'_>, b: &Register<'_>) -> bool {
    (a.is_readable() && b.is_readable()) || (a.is_writable() && b.is_writable())
}

fn check_boundary(map: &RegisterMap, parent: ParentId, limit: u64, diagnostics: &mut Diagnostics) {
    for &id in map.children_of(parent) {
        let child = map.child(id);
        let range = child.absolute_address_range();
        if range.is_empty() {
            continue;
        }
        if clamp(range.end) >= limit {
            diagnostics.push(RegMapError::constraint(
                child.path(),
                format!("offset address range {range} exceeds byte size of register block ({limit})"),
            ));
        } else if let Addressable::File(file) = child {
            check_boundary(map, ParentId::File(file.id()), limit, diagnostics);
        }
    }
}

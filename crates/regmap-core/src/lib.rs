//! Layout and semantic validation engine for hierarchical register maps.
//!
//! A register map is a tree of register blocks, register files, registers
//! and bit fields. Entities are populated by [`RegisterMapBuilder`] from
//! already-parsed property values; derived geometry (bit masks, widths,
//! byte sizes, offset addresses) and type capabilities are resolved lazily
//! and memoized; [`RegisterMap::verify`] runs the ordered verification
//! phases and reports every violation of the first failing phase.

pub mod bit_assignment;
pub mod builder;
pub mod error;
pub mod layout;
pub mod map;
pub mod reference;
pub mod types;
pub mod value;
pub mod verify;

pub use bit_assignment::{BitAssignment, BitAssignmentInput, BitPosition, Index, MAX_REGISTER_WIDTH};
pub use builder::{Properties, RegisterMapBuilder};
pub use error::{Diagnostics, ErrorKind, RegMapError, Result};
pub use layout::{competitive_access, AddressRange};
pub use map::{
    Addressable, BitField, BitFieldId, BlockId, ChildId, FileId, IndexEntry, InitialValue,
    ParentId, Register, RegisterBlock, RegisterFile, RegisterId, RegisterMap,
};
pub use reference::IndirectIndex;
pub use types::{
    BitFieldPolicy, BitFieldRule, BitFieldVariant, ReferenceSettings, RegisterRule,
    RegisterVariant, Rule, TypeOptions, TypeRegistry, TypeRegistryBuilder,
};
pub use value::{CoercionError, Value};
pub use verify::Phase;

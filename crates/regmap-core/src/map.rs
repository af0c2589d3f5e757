//! The register map arena and borrowed entity views.
//!
//! Entities are stored in per-kind arenas and refer to each other by index,
//! with ownership strictly parent to child. Everything the build pass assigns
//! is immutable afterwards; derived properties live in `OnceCell`s and are
//! computed on first access by the resolver modules ([`crate::layout`],
//! [`crate::bit_assignment`], [`crate::types`], [`crate::reference`]).
//!
//! ```text
//! RegisterMap
//! ├── blocks:     Vec<BlockNode>      # roots
//! ├── files:      Vec<FileNode>       # nested register files
//! ├── registers:  Vec<RegisterNode>
//! └── bit_fields: Vec<BitFieldNode>
//! ```

use std::cell::OnceCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use num_bigint::BigUint;
use regmap_config::Configuration;

use crate::bit_assignment::BitAssignment;
use crate::types::{BitFieldVariant, RegisterVariant, TypeOptions, TypeRegistry};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

entity_id!(
    /// Index of a register block.
    BlockId
);
entity_id!(
    /// Index of a register file.
    FileId
);
entity_id!(
    /// Index of a register.
    RegisterId
);
entity_id!(
    /// Index of a bit field.
    BitFieldId
);

/// Owner of registers and register files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentId {
    Block(BlockId),
    File(FileId),
}

impl From<BlockId> for ParentId {
    fn from(id: BlockId) -> Self {
        ParentId::Block(id)
    }
}

impl From<FileId> for ParentId {
    fn from(id: FileId) -> Self {
        ParentId::File(id)
    }
}

/// An addressable child of a register block or register file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChildId {
    File(FileId),
    Register(RegisterId),
}

/// Array dimensions and optional per-element byte stride, as given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ArraySpec {
    pub dimensions: Vec<i64>,
    pub step: Option<i64>,
}

/// One index of an indirect register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Dotted path of the index bit field.
    pub name: String,
    /// Fixed index value; `None` consumes one array dimension.
    pub value: Option<i64>,
}

impl IndexEntry {
    pub fn is_array_index(&self) -> bool {
        self.value.is_none()
    }
}

/// Initial value(s) of a bit field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialValue {
    Single(i64),
    /// One value per replica of a sequential bit field.
    PerReplica(Vec<i64>),
}

impl InitialValue {
    pub fn values(&self) -> &[i64] {
        match self {
            InitialValue::Single(v) => std::slice::from_ref(v),
            InitialValue::PerReplica(values) => values,
        }
    }
}

/// A type variant bound to one entity, with that entity's options.
#[derive(Debug, Clone)]
pub(crate) struct TypeRef<V> {
    pub variant: Arc<V>,
    pub options: TypeOptions,
}

#[derive(Debug, Default)]
pub(crate) struct AddressCache {
    pub offset: OnceCell<i64>,
    pub entry_byte_size: OnceCell<u64>,
    pub byte_size: OnceCell<u64>,
    pub absolute_offset: OnceCell<i64>,
}

#[derive(Debug, Default)]
pub(crate) struct RegisterCache {
    pub address: AddressCache,
    pub width: OnceCell<u64>,
    pub readable: OnceCell<bool>,
    pub writable: OnceCell<bool>,
    pub volatile: OnceCell<bool>,
}

#[derive(Debug, Default)]
pub(crate) struct BitFieldCache {
    pub mask: OnceCell<BigUint>,
    pub readable: OnceCell<bool>,
    pub writable: OnceCell<bool>,
    pub volatile: OnceCell<bool>,
}

#[derive(Debug)]
pub(crate) struct BlockNode {
    pub name: String,
    pub byte_size: i64,
    pub children: Vec<ChildId>,
}

#[derive(Debug)]
pub(crate) struct FileNode {
    pub name: String,
    pub full_name: String,
    pub path: String,
    pub block: BlockId,
    pub parent: ParentId,
    pub offset: Option<i64>,
    pub array: Option<ArraySpec>,
    pub children: Vec<ChildId>,
    pub cache: AddressCache,
}

#[derive(Debug)]
pub(crate) struct RegisterNode {
    pub name: String,
    pub full_name: String,
    pub path: String,
    pub block: BlockId,
    pub parent: ParentId,
    pub offset: Option<i64>,
    pub array: Option<ArraySpec>,
    pub type_ref: TypeRef<RegisterVariant>,
    pub index_entries: Vec<IndexEntry>,
    pub bit_fields: Vec<BitFieldId>,
    pub cache: RegisterCache,
}

#[derive(Debug)]
pub(crate) struct BitFieldNode {
    pub name: String,
    pub full_name: String,
    pub path: String,
    pub register: RegisterId,
    pub assignment: BitAssignment,
    pub type_ref: TypeRef<BitFieldVariant>,
    pub initial_value: Option<InitialValue>,
    pub reference: Option<String>,
    pub cache: BitFieldCache,
}

/// A fully built register map.
///
/// Produced by [`crate::builder::RegisterMapBuilder::finish`]; no entity is
/// added or reassigned afterwards. The map is single-threaded: derived
/// values are memoized in place.
#[derive(Debug)]
pub struct RegisterMap {
    pub(crate) config: Configuration,
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) blocks: Vec<BlockNode>,
    pub(crate) files: Vec<FileNode>,
    pub(crate) registers: Vec<RegisterNode>,
    pub(crate) bit_fields: Vec<BitFieldNode>,
    /// Per block: bit field full name -> bit field. Built on first lookup.
    pub(crate) bit_field_lookup: OnceCell<HashMap<BlockId, HashMap<String, BitFieldId>>>,
}

impl RegisterMap {
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn block(&self, id: BlockId) -> RegisterBlock<'_> {
        RegisterBlock { map: self, id }
    }

    pub fn file(&self, id: FileId) -> RegisterFile<'_> {
        RegisterFile { map: self, id }
    }

    pub fn register(&self, id: RegisterId) -> Register<'_> {
        Register { map: self, id }
    }

    pub fn bit_field(&self, id: BitFieldId) -> BitField<'_> {
        BitField { map: self, id }
    }

    pub fn blocks(&self) -> impl Iterator<Item = RegisterBlock<'_>> {
        (0..self.blocks.len()).map(move |i| self.block(BlockId(i)))
    }

    pub fn files(&self) -> impl Iterator<Item = RegisterFile<'_>> {
        (0..self.files.len()).map(move |i| self.file(FileId(i)))
    }

    pub fn registers(&self) -> impl Iterator<Item = Register<'_>> {
        (0..self.registers.len()).map(move |i| self.register(RegisterId(i)))
    }

    pub fn bit_fields(&self) -> impl Iterator<Item = BitField<'_>> {
        (0..self.bit_fields.len()).map(move |i| self.bit_field(BitFieldId(i)))
    }

    /// Find a block by name.
    pub fn find_block(&self, name: &str) -> Option<RegisterBlock<'_>> {
        self.blocks().find(|b| b.name() == name)
    }

    /// Find a register by its path (`block.file.register`).
    pub fn find_register(&self, path: &str) -> Option<Register<'_>> {
        self.registers().find(|r| r.path() == path)
    }

    /// Find a bit field by its path (`block.file.register.bit_field`).
    pub fn find_bit_field(&self, path: &str) -> Option<BitField<'_>> {
        self.bit_fields().find(|f| f.path() == path)
    }

    pub(crate) fn child(&self, id: ChildId) -> Addressable<'_> {
        match id {
            ChildId::File(id) => Addressable::File(self.file(id)),
            ChildId::Register(id) => Addressable::Register(self.register(id)),
        }
    }

    pub(crate) fn children_of(&self, parent: ParentId) -> &[ChildId] {
        match parent {
            ParentId::Block(id) => &self.blocks[id.0].children,
            ParentId::File(id) => &self.files[id.0].children,
        }
    }

    pub(crate) fn parent_path(&self, parent: ParentId) -> &str {
        match parent {
            ParentId::Block(id) => &self.blocks[id.0].name,
            ParentId::File(id) => &self.files[id.0].path,
        }
    }
}

/// Borrowed view of a register block.
#[derive(Clone, Copy)]
pub struct RegisterBlock<'a> {
    pub(crate) map: &'a RegisterMap,
    pub(crate) id: BlockId,
}

impl<'a> RegisterBlock<'a> {
    pub(crate) fn node(&self) -> &'a BlockNode {
        &self.map.blocks[self.id.0]
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    /// Blocks are roots: their path is their name.
    pub fn path(&self) -> &'a str {
        &self.node().name
    }

    /// Direct children in declaration order.
    pub fn children(&self) -> impl Iterator<Item = Addressable<'a>> + 'a {
        let map = self.map;
        self.node().children.iter().map(move |&c| map.child(c))
    }

    /// Every register file under this block, at any depth.
    pub fn files(&self) -> impl Iterator<Item = RegisterFile<'a>> + 'a {
        let id = self.id;
        self.map.files().filter(move |f| f.node().block == id)
    }

    /// Every register under this block, at any depth.
    pub fn registers(&self) -> impl Iterator<Item = Register<'a>> + 'a {
        let id = self.id;
        self.map.registers().filter(move |r| r.node().block == id)
    }

    /// Every bit field under this block, at any depth.
    pub fn bit_fields(&self) -> impl Iterator<Item = BitField<'a>> + 'a {
        let id = self.id;
        self.map
            .bit_fields()
            .filter(move |f| f.register().node().block == id)
    }
}

/// Borrowed view of a register file.
#[derive(Clone, Copy)]
pub struct RegisterFile<'a> {
    pub(crate) map: &'a RegisterMap,
    pub(crate) id: FileId,
}

impl<'a> RegisterFile<'a> {
    pub(crate) fn node(&self) -> &'a FileNode {
        &self.map.files[self.id.0]
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    /// Dotted name below the register block.
    pub fn full_name(&self) -> &'a str {
        &self.node().full_name
    }

    /// Dotted name including the register block.
    pub fn path(&self) -> &'a str {
        &self.node().path
    }

    pub fn block(&self) -> RegisterBlock<'a> {
        self.map.block(self.node().block)
    }

    pub fn parent(&self) -> ParentId {
        self.node().parent
    }

    /// The enclosing register file, if any.
    pub fn register_file(&self) -> Option<RegisterFile<'a>> {
        match self.node().parent {
            ParentId::File(id) => Some(self.map.file(id)),
            ParentId::Block(_) => None,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = Addressable<'a>> + 'a {
        let map = self.map;
        self.node().children.iter().map(move |&c| map.child(c))
    }
}

/// Borrowed view of a register.
#[derive(Clone, Copy)]
pub struct Register<'a> {
    pub(crate) map: &'a RegisterMap,
    pub(crate) id: RegisterId,
}

impl<'a> Register<'a> {
    pub(crate) fn node(&self) -> &'a RegisterNode {
        &self.map.registers[self.id.0]
    }

    pub fn id(&self) -> RegisterId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn full_name(&self) -> &'a str {
        &self.node().full_name
    }

    pub fn path(&self) -> &'a str {
        &self.node().path
    }

    pub fn block(&self) -> RegisterBlock<'a> {
        self.map.block(self.node().block)
    }

    pub fn parent(&self) -> ParentId {
        self.node().parent
    }

    pub fn register_file(&self) -> Option<RegisterFile<'a>> {
        match self.node().parent {
            ParentId::File(id) => Some(self.map.file(id)),
            ParentId::Block(_) => None,
        }
    }

    /// Enclosing register files, outermost first.
    pub fn register_files(&self) -> Vec<RegisterFile<'a>> {
        let mut files = Vec::new();
        let mut current = self.register_file();
        while let Some(file) = current {
            files.push(file);
            current = file.register_file();
        }
        files.reverse();
        files
    }

    pub fn bit_fields(&self) -> impl Iterator<Item = BitField<'a>> + 'a {
        let map = self.map;
        self.node().bit_fields.iter().map(move |&id| map.bit_field(id))
    }

    pub fn has_bit_fields(&self) -> bool {
        !self.node().bit_fields.is_empty()
    }

    /// Index entries of an indirect register, in declaration order.
    pub fn index_entries(&self) -> &'a [IndexEntry] {
        &self.node().index_entries
    }
}

/// Borrowed view of a bit field.
#[derive(Clone, Copy)]
pub struct BitField<'a> {
    pub(crate) map: &'a RegisterMap,
    pub(crate) id: BitFieldId,
}

impl<'a> BitField<'a> {
    pub(crate) fn node(&self) -> &'a BitFieldNode {
        &self.map.bit_fields[self.id.0]
    }

    pub fn id(&self) -> BitFieldId {
        self.id
    }

    pub fn name(&self) -> &'a str {
        &self.node().name
    }

    pub fn full_name(&self) -> &'a str {
        &self.node().full_name
    }

    pub fn path(&self) -> &'a str {
        &self.node().path
    }

    pub fn register(&self) -> Register<'a> {
        self.map.register(self.node().register)
    }

    pub fn bit_assignment(&self) -> &'a BitAssignment {
        &self.node().assignment
    }

    pub fn initial_value(&self) -> Option<&'a InitialValue> {
        self.node().initial_value.as_ref()
    }

    /// The reference path as given, before resolution.
    pub fn reference_path(&self) -> Option<&'a str> {
        self.node().reference.as_deref()
    }
}

/// A register file or register, for code that walks address space.
#[derive(Clone, Copy)]
pub enum Addressable<'a> {
    File(RegisterFile<'a>),
    Register(Register<'a>),
}

impl<'a> Addressable<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Addressable::File(f) => f.name(),
            Addressable::Register(r) => r.name(),
        }
    }

    pub fn path(&self) -> &'a str {
        match self {
            Addressable::File(f) => f.path(),
            Addressable::Register(r) => r.path(),
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Addressable::File(_))
    }

    pub fn as_register(&self) -> Option<Register<'a>> {
        match self {
            Addressable::Register(r) => Some(*r),
            Addressable::File(_) => None,
        }
    }
}

macro_rules! view_traits {
    ($($view:ident),*) => {
        $(
            impl fmt::Debug for $view<'_> {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_tuple(stringify!($view)).field(&self.path()).finish()
                }
            }

            impl PartialEq for $view<'_> {
                fn eq(&self, other: &Self) -> bool {
                    std::ptr::eq(self.map, other.map) && self.id == other.id
                }
            }

            impl Eq for $view<'_> {}
        )*
    };
}

view_traits!(RegisterBlock, RegisterFile, Register, BitField);

impl fmt::Debug for Addressable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addressable::File(file) => file.fmt(f),
            Addressable::Register(reg) => reg.fmt(f),
        }
    }
}

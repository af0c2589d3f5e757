//! Build pass: populate the register map arena from already-parsed properties.
//!
//! Entities are added top-down in declaration order. Every property is
//! coerced as it arrives; a value that cannot be coerced, an unknown type
//! name and a missing mandatory value fail the call that received them.
//! All other checks are deferred to [`RegisterMap::verify`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use regmap_config::Configuration;
//! use regmap_core::builder::{Properties, RegisterMapBuilder};
//! use regmap_core::types::TypeRegistry;
//! use regmap_core::value::Value;
//!
//! let mut builder = RegisterMapBuilder::new(Configuration::default(), Arc::new(TypeRegistry::builtin()));
//! let block = builder
//!     .add_register_block(Properties::new().with("name", "block_0").with("byte_size", 256))
//!     .unwrap();
//! let reg = builder
//!     .add_register(block.into(), Properties::new().with("name", "ctrl"))
//!     .unwrap();
//! builder
//!     .add_bit_field(
//!         reg,
//!         Properties::new()
//!             .with("name", "enable")
//!             .with("bit_assignment", Value::record([("lsb", 0), ("width", 1)]))
//!             .with("type", Value::symbol("rw"))
//!             .with("initial_value", 0),
//!     )
//!     .unwrap();
//!
//! let map = builder.finish();
//! assert!(map.verify().is_ok());
//! assert_eq!(map.find_register("block_0.ctrl").unwrap().byte_size(), 4);
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use regmap_config::Configuration;

use crate::bit_assignment::BitAssignmentInput;
use crate::error::{RegMapError, Result};
use crate::map::{
    ArraySpec, BitFieldCache, BitFieldId, BitFieldNode, BlockId, BlockNode, ChildId, FileId,
    FileNode, IndexEntry, InitialValue, ParentId, RegisterId, RegisterMap, RegisterNode, TypeRef,
};
use crate::types::{OptionsCheck, TypeOptions, TypeRegistry, DEFAULT_REGISTER_TYPE};
use crate::value::{is_path, Value};

/// Property values of one entity, keyed by property name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties(IndexMap<String, Value>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    fn check_keys(&self, allowed: &[&str], path: &str) -> Result<()> {
        match self.0.keys().find(|k| !allowed.contains(&k.as_str())) {
            Some(key) => Err(RegMapError::malformed(path, format!("unknown property: {key}"))),
            None => Ok(()),
        }
    }
}

impl From<IndexMap<String, Value>> for Properties {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self(map)
    }
}

const BLOCK_KEYS: &[&str] = &["name", "byte_size"];
const FILE_KEYS: &[&str] = &["name", "offset_address", "size"];
const REGISTER_KEYS: &[&str] = &["name", "offset_address", "size", "type"];
const BIT_FIELD_KEYS: &[&str] = &[
    "name",
    "bit_assignment",
    "type",
    "initial_value",
    "reference",
];

/// Populates a [`RegisterMap`] from per-entity properties.
pub struct RegisterMapBuilder {
    map: RegisterMap,
}

impl RegisterMapBuilder {
    pub fn new(config: Configuration, registry: Arc<TypeRegistry>) -> Self {
        for name in registry.unknown_enabled_names(&config) {
            log::warn!("enabled type `{name}` is not registered; ignored");
        }
        Self {
            map: RegisterMap {
                config,
                registry,
                blocks: Vec::new(),
                files: Vec::new(),
                registers: Vec::new(),
                bit_fields: Vec::new(),
                bit_field_lookup: Default::default(),
            },
        }
    }

    /// A builder over the built-in variants, enabled per the configuration.
    pub fn with_builtin_types(config: Configuration) -> Self {
        let registry = Arc::new(TypeRegistry::for_config(&config));
        Self::new(config, registry)
    }

    pub fn add_register_block(&mut self, props: Properties) -> Result<BlockId> {
        let name = entity_name(&props, "")?;
        props.check_keys(BLOCK_KEYS, &name)?;
        let byte_size = match props.get("byte_size") {
            Some(value) => integer(value, &name)?,
            None => return Err(RegMapError::missing(&name, "no byte size is given")),
        };

        let id = BlockId(self.map.blocks.len());
        self.map.blocks.push(BlockNode {
            name,
            byte_size,
            children: Vec::new(),
        });
        Ok(id)
    }

    pub fn add_register_file(&mut self, parent: ParentId, props: Properties) -> Result<FileId> {
        let (name, full_name, path) = self.child_names(parent, &props)?;
        props.check_keys(FILE_KEYS, &path)?;
        let offset = optional_integer(&props, "offset_address", &path)?;
        let array = props
            .get("size")
            .map(|v| array_spec(v, &path))
            .transpose()?;

        let id = FileId(self.map.files.len());
        self.map.files.push(FileNode {
            name,
            full_name,
            path,
            block: self.block_of(parent),
            parent,
            offset,
            array,
            children: Vec::new(),
            cache: Default::default(),
        });
        self.children_mut(parent).push(ChildId::File(id));
        Ok(id)
    }

    pub fn add_register(&mut self, parent: ParentId, props: Properties) -> Result<RegisterId> {
        let (name, full_name, path) = self.child_names(parent, &props)?;
        props.check_keys(REGISTER_KEYS, &path)?;
        let offset = optional_integer(&props, "offset_address", &path)?;
        let array = props
            .get("size")
            .map(|v| array_spec(v, &path))
            .transpose()?;

        let (type_name, options) = match props.get("type") {
            Some(value) => type_spec(value, &path)?,
            None => (DEFAULT_REGISTER_TYPE.to_string(), Vec::new()),
        };
        let variant = self
            .map
            .registry
            .register_variant(&type_name)
            .cloned()
            .ok_or_else(|| {
                RegMapError::unknown_variant(&path, format!("unknown register type: {type_name}"))
            })?;

        let (options, index_entries) = if variant.indirect_index {
            let entries = options
                .iter()
                .map(|o| index_entry(o, &path))
                .collect::<Result<Vec<_>>>()?;
            (TypeOptions::default(), entries)
        } else {
            let options = TypeOptions::new(options);
            check_options(variant.options.as_ref(), &options, &type_name, &path)?;
            (options, Vec::new())
        };

        if variant.size_is_byte_size {
            if let Some(spec) = &array {
                if spec.dimensions.len() != 1 || spec.step.is_some() {
                    return Err(RegMapError::malformed(
                        &path,
                        format!("{type_name} register takes a single byte size"),
                    ));
                }
            }
        }

        let id = RegisterId(self.map.registers.len());
        self.map.registers.push(RegisterNode {
            name,
            full_name,
            path,
            block: self.block_of(parent),
            parent,
            offset,
            array,
            type_ref: TypeRef { variant, options },
            index_entries,
            bit_fields: Vec::new(),
            cache: Default::default(),
        });
        self.children_mut(parent).push(ChildId::Register(id));
        Ok(id)
    }

    pub fn add_bit_field(&mut self, register: RegisterId, props: Properties) -> Result<BitFieldId> {
        let owner = &self.map.registers[register.0];
        let name = entity_name(&props, &owner.path)?;
        let full_name = format!("{}.{name}", owner.full_name);
        let path = format!("{}.{name}", owner.path);
        props.check_keys(BIT_FIELD_KEYS, &path)?;

        let input = match props.get("bit_assignment") {
            Some(value) => BitAssignmentInput::parse(value, self.map.config.bit_assignment_format)
                .map_err(|e| e.at(&path))?,
            None => return Err(RegMapError::missing(&path, "no bit assignment is given")),
        };
        let previous = owner
            .bit_fields
            .last()
            .map(|id| &self.map.bit_fields[id.0].assignment);
        let assignment = input.resolve(previous).map_err(|e| e.at(&path))?;

        let (type_name, options) = match props.get("type") {
            Some(value) => type_spec(value, &path)?,
            None => return Err(RegMapError::missing(&path, "no bit field type is given")),
        };
        let variant = self
            .map
            .registry
            .bit_field_variant(&type_name)
            .cloned()
            .ok_or_else(|| {
                RegMapError::unknown_variant(&path, format!("unknown bit field type: {type_name}"))
            })?;
        let options = TypeOptions::new(options);
        check_options(variant.options.as_ref(), &options, &type_name, &path)?;

        let initial_value = props
            .get("initial_value")
            .map(|v| initial_value(v, &path))
            .transpose()?;
        let reference = props
            .get("reference")
            .map(|v| {
                v.as_path()
                    .map(str::to_string)
                    .map_err(|e| RegMapError::malformed(&path, e.to_string()))
            })
            .transpose()?;

        let id = BitFieldId(self.map.bit_fields.len());
        self.map.bit_fields.push(BitFieldNode {
            name,
            full_name,
            path,
            register,
            assignment,
            type_ref: TypeRef { variant, options },
            initial_value,
            reference,
            cache: BitFieldCache::default(),
        });
        self.map.registers[register.0].bit_fields.push(id);
        Ok(id)
    }

    /// Freeze the arena. Verification runs separately via [`RegisterMap::verify`].
    pub fn finish(self) -> RegisterMap {
        log::debug!(
            "register map built: {} block(s), {} file(s), {} register(s), {} bit field(s)",
            self.map.blocks.len(),
            self.map.files.len(),
            self.map.registers.len(),
            self.map.bit_fields.len()
        );
        self.map
    }

    fn child_names(&self, parent: ParentId, props: &Properties) -> Result<(String, String, String)> {
        let parent_path = self.map.parent_path(parent);
        let name = entity_name(props, parent_path)?;
        let full_name = match parent {
            ParentId::Block(_) => name.clone(),
            ParentId::File(id) => format!("{}.{name}", self.map.files[id.0].full_name),
        };
        let path = format!("{parent_path}.{name}");
        Ok((name, full_name, path))
    }

    fn block_of(&self, parent: ParentId) -> BlockId {
        match parent {
            ParentId::Block(id) => id,
            ParentId::File(id) => self.map.files[id.0].block,
        }
    }

    fn children_mut(&mut self, parent: ParentId) -> &mut Vec<ChildId> {
        match parent {
            ParentId::Block(id) => &mut self.map.blocks[id.0].children,
            ParentId::File(id) => &mut self.map.files[id.0].children,
        }
    }
}

fn entity_name(props: &Properties, parent_path: &str) -> Result<String> {
    let value = props
        .get("name")
        .ok_or_else(|| RegMapError::missing(parent_path, "no name is given"))?;
    value
        .as_identifier()
        .map(str::to_string)
        .map_err(|e| RegMapError::malformed(parent_path, e.to_string()))
}

fn integer(value: &Value, path: &str) -> Result<i64> {
    value
        .as_integer()
        .map_err(|e| RegMapError::malformed(path, e.to_string()))
}

fn optional_integer(props: &Properties, key: &str, path: &str) -> Result<Option<i64>> {
    props.get(key).map(|v| integer(v, path)).transpose()
}

/// Array dimensions: an integer, a list, `"[2, 4]"`, a list whose last element
/// is `{step: n}`, or `{size: .., step: n}`.
fn array_spec(value: &Value, path: &str) -> Result<ArraySpec> {
    let malformed = |e: crate::value::CoercionError| RegMapError::malformed(path, e.to_string());
    match value {
        Value::Record(entries) => {
            let dimensions = entries
                .get("size")
                .ok_or_else(|| RegMapError::missing(path, "no array size is given"))?
                .as_integer_list()
                .map_err(malformed)?;
            let step = entries.get("step").map(|v| integer(v, path)).transpose()?;
            if let Some(key) = entries.keys().find(|k| *k != "size" && *k != "step") {
                return Err(RegMapError::malformed(path, format!("unknown size option: {key}")));
            }
            Ok(ArraySpec { dimensions, step })
        }
        Value::List(items) => match items.split_last() {
            Some((Value::Record(last), rest)) if last.contains_key("step") => {
                let step = integer(&last["step"], path)?;
                let dimensions = Value::List(rest.to_vec())
                    .as_integer_list()
                    .map_err(malformed)?;
                if dimensions.is_empty() {
                    return Err(RegMapError::missing(path, "no array size is given"));
                }
                Ok(ArraySpec {
                    dimensions,
                    step: Some(step),
                })
            }
            _ => Ok(ArraySpec {
                dimensions: value.as_integer_list().map_err(malformed)?,
                step: None,
            }),
        },
        _ => Ok(ArraySpec {
            dimensions: value.as_integer_list().map_err(malformed)?,
            step: None,
        }),
    }
}

/// Split a type property into its name and options.
///
/// Accepted forms: `:rw`, `"rw"`, `"custom: sw_read: clear, hw_write: true"`,
/// `[:indirect, "a.b: 1", "c.d"]` and `{name: custom, sw_read: clear}`.
fn type_spec(value: &Value, path: &str) -> Result<(String, Vec<Value>)> {
    let (name, options) = match value {
        Value::Symbol(_) => (value.clone(), Vec::new()),
        Value::Text(text) => match text.split_once(':') {
            Some((name, rest)) => (
                Value::Text(name.trim().to_string()),
                rest.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(|s| Value::Text(s.to_string()))
                    .collect(),
            ),
            None => (value.clone(), Vec::new()),
        },
        Value::List(items) => match items.split_first() {
            Some((name, options)) => (name.clone(), options.to_vec()),
            None => return Err(RegMapError::missing(path, "no type name is given")),
        },
        Value::Record(entries) => {
            let name = entries
                .get("name")
                .cloned()
                .ok_or_else(|| RegMapError::missing(path, "no type name is given"))?;
            let rest: IndexMap<String, Value> = entries
                .iter()
                .filter(|(k, _)| *k != "name")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let options = if rest.is_empty() {
                Vec::new()
            } else {
                vec![Value::Record(rest)]
            };
            (name, options)
        }
        _ => {
            return Err(RegMapError::malformed(
                path,
                format!("illegal input value for type: {value}"),
            ))
        }
    };
    let name = name
        .as_identifier()
        .map(str::to_string)
        .map_err(|e| RegMapError::malformed(path, e.to_string()))?;
    Ok((name, options))
}

fn check_options(
    check: Option<&OptionsCheck>,
    options: &TypeOptions,
    type_name: &str,
    path: &str,
) -> Result<()> {
    match check {
        Some(check) => check(options).map_err(|reason| RegMapError::malformed(path, reason)),
        None if options.is_empty() => Ok(()),
        None => Err(RegMapError::malformed(
            path,
            format!("{type_name} type takes no options"),
        )),
    }
}

/// Parse one indirect index: `"path"`, `"path: value"`, `[path]`,
/// `[path, value]` or `{name: path, value: v}`.
fn index_entry(value: &Value, path: &str) -> Result<IndexEntry> {
    let illegal = || RegMapError::malformed(path, format!("illegal input value for indirect index: {value}"));
    let (name, index_value) = match value {
        Value::Symbol(text) | Value::Text(text) => match text.split_once(':') {
            Some((name, v)) => (Value::Text(name.trim().to_string()), Some(Value::Text(v.trim().to_string()))),
            None => (value.clone(), None),
        },
        Value::List(items) => match items.as_slice() {
            [name] => (name.clone(), None),
            [name, v] => (name.clone(), Some(v.clone())),
            _ => return Err(illegal()),
        },
        Value::Record(entries) => {
            let name = entries.get("name").cloned().ok_or_else(illegal)?;
            (name, entries.get("value").cloned())
        }
        _ => return Err(illegal()),
    };

    let name = name.as_str().map(str::trim).filter(|n| is_path(n)).ok_or_else(illegal)?;
    let value = index_value
        .map(|v| v.as_integer().map_err(|_| illegal()))
        .transpose()?;
    Ok(IndexEntry {
        name: name.to_string(),
        value,
    })
}

fn initial_value(value: &Value, path: &str) -> Result<InitialValue> {
    match value {
        Value::List(items) => items
            .iter()
            .map(|v| integer(v, path))
            .collect::<Result<Vec<_>>>()
            .map(InitialValue::PerReplica),
        _ => integer(value, path).map(InitialValue::Single),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn builder() -> (RegisterMapBuilder, BlockId) {
        let mut builder = RegisterMapBuilder::with_builtin_types(Configuration::default());
        let block = builder
            .add_register_block(Properties::new().with("name", "blk").with("byte_size", 256))
            .unwrap();
        (builder, block)
    }

    fn field(name: &str, assignment: impl Into<Value>, ty: &str) -> Properties {
        Properties::new()
            .with("name", name)
            .with("bit_assignment", assignment)
            .with("type", Value::symbol(ty))
    }

    #[test]
    fn names_and_paths() {
        let (mut b, block) = builder();
        let file = b
            .add_register_file(block.into(), Properties::new().with("name", "f0"))
            .unwrap();
        let reg = b
            .add_register(file.into(), Properties::new().with("name", "r0"))
            .unwrap();
        let bf = b.add_bit_field(reg, field("b0", "1:0", "rw")).unwrap();
        let map = b.finish();
        let bf = map.bit_field(bf);
        assert_eq!(bf.full_name(), "f0.r0.b0");
        assert_eq!(bf.path(), "blk.f0.r0.b0");
        assert_eq!(map.register(reg).full_name(), "f0.r0");
    }

    #[test]
    fn missing_and_malformed_inputs() {
        let (mut b, block) = builder();
        let err = b.add_register(block.into(), Properties::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequired);

        let err = b
            .add_register(block.into(), Properties::new().with("name", "r").with("size", "[a]"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput);
        assert_eq!(err.path(), "blk.r");

        let err = b
            .add_register(block.into(), Properties::new().with("name", "r").with("colour", 1))
            .unwrap_err();
        assert_eq!(err.message(), "unknown property: colour");

        let reg = b
            .add_register(block.into(), Properties::new().with("name", "r"))
            .unwrap();
        let err = b
            .add_bit_field(reg, Properties::new().with("name", "b").with("bit_assignment", "1:0"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequired);
        assert_eq!(err.message(), "no bit field type is given");

        let err = b
            .add_bit_field(reg, field("b", Value::record([("sequence_size", 2)]), "rw"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingRequired);
    }

    #[test]
    fn unknown_and_disabled_types() {
        let config = Configuration::default().with_enabled_types(["rw", "default"]);
        let mut b = RegisterMapBuilder::with_builtin_types(config);
        let block = b
            .add_register_block(Properties::new().with("name", "blk").with("byte_size", 16))
            .unwrap();
        let reg = b
            .add_register(block.into(), Properties::new().with("name", "r"))
            .unwrap();
        let err = b.add_bit_field(reg, field("b", "1:0", "ro")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownVariant);
        assert_eq!(err.message(), "unknown bit field type: ro");

        let err = b
            .add_register(
                block.into(),
                Properties::new().with("name", "x").with("type", Value::symbol("indirect")),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownVariant);
    }

    #[test]
    fn type_forms() {
        assert_eq!(
            type_spec(&Value::from("custom: sw_read: clear, hw_write: true"), "p").unwrap(),
            (
                "custom".to_string(),
                vec![Value::from("sw_read: clear"), Value::from("hw_write: true")]
            )
        );
        let (name, options) = type_spec(&Value::list([Value::symbol("indirect"), Value::from("a.b: 1")]), "p").unwrap();
        assert_eq!(name, "indirect");
        assert_eq!(options.len(), 1);
        let (name, options) =
            type_spec(&Value::record([("name", Value::symbol("custom")), ("hw_set", Value::from(true))]), "p").unwrap();
        assert_eq!(name, "custom");
        assert_eq!(options, vec![Value::record([("hw_set", true)])]);
        assert!(type_spec(&Value::from(3), "p").is_err());
    }

    #[test]
    fn options_rejected_without_hook() {
        let (mut b, block) = builder();
        let reg = b
            .add_register(block.into(), Properties::new().with("name", "r"))
            .unwrap();
        let err = b.add_bit_field(reg, field("b", "1:0", "rw").with("type", "rw: foo")).unwrap_err();
        assert_eq!(err.message(), "rw type takes no options");
    }

    #[test]
    fn index_entry_forms() {
        let entry = index_entry(&Value::from("f.r.b: 0x2"), "p").unwrap();
        assert_eq!(entry, IndexEntry { name: "f.r.b".into(), value: Some(2) });
        let entry = index_entry(&Value::list([Value::from("r.b")]), "p").unwrap();
        assert!(entry.is_array_index());
        let entry = index_entry(&Value::record([("name", Value::from("r.b")), ("value", Value::from(3))]), "p").unwrap();
        assert_eq!(entry.value, Some(3));
        assert!(index_entry(&Value::from("r..b"), "p").is_err());
        assert!(index_entry(&Value::from("r.b: x"), "p").is_err());
    }

    #[test]
    fn size_forms() {
        assert_eq!(array_spec(&Value::from(2), "p").unwrap().dimensions, vec![2]);
        let spec = array_spec(&Value::list([Value::from(2), Value::from(3), Value::record([("step", 16)])]), "p").unwrap();
        assert_eq!(spec.dimensions, vec![2, 3]);
        assert_eq!(spec.step, Some(16));
        let spec = array_spec(&Value::record([("size", Value::from("[4]")), ("step", Value::from(8))]), "p").unwrap();
        assert_eq!((spec.dimensions, spec.step), (vec![4], Some(8)));
    }

    #[test]
    fn default_lsb_follows_previous_field() {
        let (mut b, block) = builder();
        let reg = b
            .add_register(block.into(), Properties::new().with("name", "r"))
            .unwrap();
        b.add_bit_field(reg, field("a", Value::record([("lsb", 0), ("width", 4), ("sequence_size", 2)]), "rw"))
            .unwrap();
        let second = b.add_bit_field(reg, field("b", Value::record([("width", 2)]), "rw")).unwrap();
        let map = b.finish();
        assert_eq!(map.bit_field(second).lsb(), 8);
    }
}

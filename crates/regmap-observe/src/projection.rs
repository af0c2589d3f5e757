//! Printable projection of a verified register map.
//!
//! Every entity becomes an ordered list of labelled text rows. Entities are
//! emitted depth-first per register block: the block, then each child in
//! declaration order, a register being followed by its bit fields.

use std::fmt::Write;

use regmap_core::{Addressable, BitField, Register, RegisterBlock, RegisterFile, RegisterMap};
use serde::Serialize;

use crate::error::{ObserveError, Result};
use crate::format;
use crate::view::{View, ViewOutput};

/// What an entity projection describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
    RegisterBlock,
    RegisterFile,
    Register,
    BitField,
}

/// One labelled printable value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub label: &'static str,
    pub text: String,
}

impl Row {
    fn new(label: &'static str, text: impl Into<String>) -> Self {
        Self {
            label,
            text: text.into(),
        }
    }
}

/// The printable rows of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityProjection {
    pub kind: EntityKind,
    pub path: String,
    pub rows: Vec<Row>,
}

impl EntityProjection {
    /// Text of the row with the given label.
    pub fn row(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|row| row.label == label)
            .map(|row| row.text.as_str())
    }
}

/// Projection of every entity of a register map.
pub struct ProjectionView<'a> {
    map: &'a RegisterMap,
}

impl<'a> ProjectionView<'a> {
    /// Project without verifying. Values derived from invalid inputs are clamped.
    pub fn new(map: &'a RegisterMap) -> Self {
        Self { map }
    }

    /// Verify the map first; a map with errors cannot be projected.
    pub fn verified(map: &'a RegisterMap) -> Result<Self> {
        map.verify()?;
        Ok(Self::new(map))
    }

    pub fn entities(&self) -> Vec<EntityProjection> {
        let mut entities = Vec::new();
        for block in self.map.blocks() {
            entities.push(project_block(&block));
            for child in block.children() {
                project_child(child, &mut entities);
            }
        }
        log::debug!("projected {} entities", entities.len());
        entities
    }

    /// Projection of the entity at `path`.
    pub fn entity(&self, path: &str) -> Result<EntityProjection> {
        self.entities()
            .into_iter()
            .find(|entity| entity.path == path)
            .ok_or_else(|| ObserveError::UnknownEntity {
                path: path.to_string(),
            })
    }

    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(self.entities())?)
    }
}

impl View for ProjectionView<'_> {
    fn render(&self) -> Result<ViewOutput> {
        let entities = self.entities();
        let mut text = String::new();
        for entity in &entities {
            let indent = "  ".repeat(entity.path.matches('.').count());
            let _ = writeln!(text, "{indent}{}", entity.path);
            for row in &entity.rows {
                let _ = writeln!(text, "{indent}  {}: {}", row.label, row.text);
            }
        }
        let data = serde_json::to_value(&entities)?;
        Ok(ViewOutput { text, data })
    }
}

fn project_child(child: Addressable<'_>, entities: &mut Vec<EntityProjection>) {
    match child {
        Addressable::File(file) => {
            entities.push(project_file(&file));
            for child in file.children() {
                project_child(child, entities);
            }
        }
        Addressable::Register(register) => {
            entities.push(project_register(&register));
            entities.extend(register.bit_fields().map(|field| project_bit_field(&field)));
        }
    }
}

fn project_block(block: &RegisterBlock<'_>) -> EntityProjection {
    EntityProjection {
        kind: EntityKind::RegisterBlock,
        path: block.path().to_string(),
        rows: vec![
            Row::new("byte_size", block.byte_size().to_string()),
            Row::new("local_address_width", block.local_address_width().to_string()),
        ],
    }
}

fn project_file(file: &RegisterFile<'_>) -> EntityProjection {
    let mut rows = vec![Row::new(
        "offset_address",
        format::address_range(&file.absolute_address_range()),
    )];
    if let Some(dimensions) = file.array_size() {
        rows.push(Row::new("array_size", format::array_size(&dimensions)));
    }
    EntityProjection {
        kind: EntityKind::RegisterFile,
        path: file.path().to_string(),
        rows,
    }
}

fn project_register(register: &Register<'_>) -> EntityProjection {
    let ranges: Vec<String> = register
        .element_address_ranges()
        .iter()
        .map(format::address_range)
        .collect();
    let mut rows = vec![Row::new("offset_address", ranges.join(", "))];
    if let Some(dimensions) = register.array_size() {
        rows.push(Row::new("array_size", format::array_size(&dimensions)));
    }
    rows.push(Row::new("type", format::register_type(register)));
    rows.push(Row::new(
        "access",
        format::access(register.is_readable(), register.is_writable()),
    ));
    EntityProjection {
        kind: EntityKind::Register,
        path: register.path().to_string(),
        rows,
    }
}

fn project_bit_field(field: &BitField<'_>) -> EntityProjection {
    let mut rows = vec![
        Row::new("bit_assignments", format::bit_assignments(field)),
        Row::new("type", format::bit_field_type(field)),
    ];
    if let Some(value) = field.initial_value() {
        rows.push(Row::new("initial_value", format::initial_value(value)));
    }
    if let Some(reference) = field.reference_path() {
        rows.push(Row::new("reference", reference));
    }
    EntityProjection {
        kind: EntityKind::BitField,
        path: field.path().to_string(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regmap_config::Configuration;
    use regmap_core::{Properties, RegisterMapBuilder, Value};

    fn sample_map() -> RegisterMap {
        let mut builder = RegisterMapBuilder::with_builtin_types(Configuration::default());
        let block = builder
            .add_register_block(Properties::new().with("name", "blk").with("byte_size", 64))
            .unwrap();
        let ctrl = builder
            .add_register(block.into(), Properties::new().with("name", "ctrl"))
            .unwrap();
        builder
            .add_bit_field(
                ctrl,
                Properties::new()
                    .with("name", "mode")
                    .with("bit_assignment", Value::record([("lsb", 4), ("width", 4)]))
                    .with("type", Value::symbol("rw"))
                    .with("initial_value", 0xa),
            )
            .unwrap();
        let status = builder
            .add_register(
                block.into(),
                Properties::new().with("name", "status").with("size", 2),
            )
            .unwrap();
        builder
            .add_bit_field(
                status,
                Properties::new()
                    .with("name", "busy")
                    .with("bit_assignment", Value::record([("lsb", 0), ("width", 1)]))
                    .with("type", Value::symbol("ro")),
            )
            .unwrap();
        builder.finish()
    }

    #[test]
    fn entities_are_depth_first() {
        let map = sample_map();
        let view = ProjectionView::verified(&map).unwrap();
        let paths: Vec<String> = view.entities().into_iter().map(|e| e.path).collect();
        assert_eq!(
            paths,
            ["blk", "blk.ctrl", "blk.ctrl.mode", "blk.status", "blk.status.busy"]
        );
    }

    #[test]
    fn register_and_bit_field_rows() {
        let map = sample_map();
        let view = ProjectionView::new(&map);

        let ctrl = view.entity("blk.ctrl").unwrap();
        assert_eq!(ctrl.row("offset_address"), Some("0x0 - 0x3"));
        assert_eq!(ctrl.row("type"), Some("default"));
        assert_eq!(ctrl.row("access"), Some("RW"));
        assert_eq!(ctrl.row("array_size"), None);

        let mode = view.entity("blk.ctrl.mode").unwrap();
        assert_eq!(mode.row("bit_assignments"), Some("[7:4]"));
        assert_eq!(mode.row("initial_value"), Some("0xa"));

        let status = view.entity("blk.status").unwrap();
        assert_eq!(status.row("offset_address"), Some("0x4 - 0x7, 0x8 - 0xb"));
        assert_eq!(status.row("array_size"), Some("[2]"));
        assert_eq!(status.row("access"), Some("RO"));
    }

    #[test]
    fn unknown_entity() {
        let map = sample_map();
        let err = ProjectionView::new(&map).entity("blk.nope").unwrap_err();
        assert!(matches!(err, ObserveError::UnknownEntity { .. }));
    }

    #[test]
    fn json_uses_kebab_case_kinds() {
        let map = sample_map();
        let json = ProjectionView::new(&map).to_json().unwrap();
        assert_eq!(json[0]["kind"], "register-block");
        assert_eq!(json[0]["rows"][0]["label"], "byte_size");
        assert_eq!(json[0]["rows"][0]["text"], "64");
    }
}

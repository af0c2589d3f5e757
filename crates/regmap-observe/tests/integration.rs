//! Projection of complete register maps.

use log::LevelFilter;
use regmap_config::Configuration;
use regmap_core::{Properties, RegisterMap, RegisterMapBuilder, Value};
use regmap_observe::{EntityKind, ObserveError, ProjectionView, View, ViewFormat};
use simple_logger::SimpleLogger;

fn init_logger() {
    let _ = SimpleLogger::new().with_level(LevelFilter::Info).init();
}

fn field(name: &str, assignment: Value, kind: Value) -> Properties {
    Properties::new()
        .with("name", name)
        .with("bit_assignment", assignment)
        .with("type", kind)
}

/// A block with a nested file, a sequential field, a reference and an indirect register.
fn build_map() -> RegisterMap {
    init_logger();
    let mut b = RegisterMapBuilder::with_builtin_types(Configuration::default());
    let block = b
        .add_register_block(Properties::new().with("name", "blk").with("byte_size", 64))
        .unwrap();

    let index = b
        .add_register(block.into(), Properties::new().with("name", "index"))
        .unwrap();
    b.add_bit_field(
        index,
        field("sel", Value::record([("lsb", 0), ("width", 2)]), Value::symbol("rw"))
            .with("initial_value", 0),
    )
    .unwrap();
    b.add_bit_field(
        index,
        field(
            "lanes",
            Value::record([("lsb", 8), ("width", 4), ("sequence_size", 2), ("step", 8)]),
            Value::symbol("rw"),
        )
        .with("initial_value", Value::list([1, 2])),
    )
    .unwrap();

    let data = b
        .add_register(
            block.into(),
            Properties::new()
                .with("name", "data")
                .with("type", "indirect: index.sel: 1"),
        )
        .unwrap();
    b.add_bit_field(
        data,
        field("value", Value::record([("lsb", 0), ("width", 16)]), Value::symbol("ro"))
            .with("reference", "index.sel"),
    )
    .unwrap();

    let file = b
        .add_register_file(
            block.into(),
            Properties::new()
                .with("name", "ch")
                .with("offset_address", 0x10)
                .with("size", 2),
        )
        .unwrap();
    let ctrl = b
        .add_register(file.into(), Properties::new().with("name", "ctrl"))
        .unwrap();
    b.add_bit_field(
        ctrl,
        field("go", Value::record([("lsb", 0), ("width", 1)]), Value::symbol("wo"))
            .with("initial_value", 0),
    )
    .unwrap();

    b.finish()
}

#[test]
fn verified_projection_of_complete_map() {
    let map = build_map();
    let view = ProjectionView::verified(&map).expect("valid map");

    let block = view.entity("blk").unwrap();
    assert_eq!(block.kind, EntityKind::RegisterBlock);
    assert_eq!(block.row("byte_size"), Some("64"));
    assert_eq!(block.row("local_address_width"), Some("6"));

    let lanes = view.entity("blk.index.lanes").unwrap();
    assert_eq!(lanes.row("bit_assignments"), Some("[11:8], [19:16]"));
    assert_eq!(lanes.row("initial_value"), Some("[0x1, 0x2]"));

    let data = view.entity("blk.data").unwrap();
    assert_eq!(data.row("type"), Some("indirect: index.sel: 1"));
    assert_eq!(data.row("offset_address"), Some("0x4 - 0x7"));
    assert_eq!(data.row("access"), Some("RO"));

    let value = view.entity("blk.data.value").unwrap();
    assert_eq!(value.row("reference"), Some("index.sel"));
    assert_eq!(value.row("initial_value"), None);

    let file = view.entity("blk.ch").unwrap();
    assert_eq!(file.kind, EntityKind::RegisterFile);
    assert_eq!(file.row("offset_address"), Some("0x10 - 0x17"));
    assert_eq!(file.row("array_size"), Some("[2]"));

    let ctrl = view.entity("blk.ch.ctrl").unwrap();
    assert_eq!(ctrl.row("offset_address"), Some("0x10 - 0x13"));
    assert_eq!(ctrl.row("access"), Some("WO"));
}

#[test]
fn text_rendering_indents_by_depth() {
    let map = build_map();
    let output = ProjectionView::new(&map).render().unwrap();
    let text = output.render(ViewFormat::Text).unwrap();
    assert!(text.starts_with("blk\n  byte_size: 64\n"));
    assert!(text.contains("\n    blk.ch.ctrl\n"));
    assert!(text.contains("      bit_assignments: [0]\n"));

    let json = output.render(ViewFormat::Json).unwrap();
    assert!(json.contains("\"kind\": \"bit-field\""));
}

#[test]
fn invalid_map_is_not_projected() {
    init_logger();
    let mut b = RegisterMapBuilder::with_builtin_types(Configuration::default());
    b.add_register_block(Properties::new().with("name", "blk").with("byte_size", 64))
        .unwrap();
    let map = b.finish();

    match ProjectionView::verified(&map) {
        Err(ObserveError::Verification(diagnostics)) => {
            assert!(diagnostics.contains_message("no register files nor registers are given"))
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("empty block must not verify"),
    }
}

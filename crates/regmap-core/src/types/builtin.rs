//! Built-in bit field and register variants.

use std::sync::Arc;

use super::{
    BitFieldPolicy, BitFieldRule, BitFieldVariant, RegisterVariant, Rule, TypeOptions,
    TypeRegistryBuilder,
};
use crate::map::BitField;
use crate::value::Value;

pub(super) fn register_all(builder: TypeRegistryBuilder) -> TypeRegistryBuilder {
    let builder = bit_field_variants()
        .into_iter()
        .fold(builder, TypeRegistryBuilder::register_bit_field);
    register_variants()
        .into_iter()
        .fold(builder, TypeRegistryBuilder::register_register)
}

fn bit_field_variants() -> Vec<BitFieldVariant> {
    let mut variants = vec![
        BitFieldVariant::new("rw")
            .read_write()
            .non_volatile()
            .require_initial_value(),
        BitFieldVariant::new("ro").read_only().use_reference(false, None),
        BitFieldVariant::new("rof")
            .read_only()
            .non_volatile()
            .require_initial_value(),
        BitFieldVariant::new("rwe")
            .read_write()
            .non_volatile()
            .require_initial_value()
            .use_reference(true, Some(1)),
        BitFieldVariant::new("rwl")
            .read_write()
            .non_volatile()
            .require_initial_value()
            .use_reference(true, Some(1)),
        BitFieldVariant::new("w1")
            .read_write()
            .non_volatile()
            .require_initial_value(),
        BitFieldVariant::new("wo1")
            .write_only()
            .non_volatile()
            .require_initial_value(),
        BitFieldVariant::new("wo")
            .write_only()
            .non_volatile()
            .require_initial_value(),
        BitFieldVariant::new("counter")
            .read_write()
            .require_initial_value()
            .use_reference(false, None),
        BitFieldVariant::new("reserved").reserved().non_volatile(),
        custom_variant(),
    ];

    for name in ["rc", "rs"] {
        variants.push(
            BitFieldVariant::new(name)
                .read_only()
                .require_initial_value()
                .use_reference(false, None),
        );
    }
    for name in ["rwc", "rws", "w1c", "w1s", "w0c", "w0s", "wrc", "wrs"] {
        variants.push(
            BitFieldVariant::new(name)
                .read_write()
                .require_initial_value()
                .use_reference(false, None),
        );
    }
    for name in ["w1t", "w0t"] {
        variants.push(
            BitFieldVariant::new(name)
                .read_write()
                .non_volatile()
                .require_initial_value(),
        );
    }
    variants
}

fn register_variants() -> Vec<RegisterVariant> {
    vec![
        RegisterVariant::new("default").overlapping_address(),
        RegisterVariant::new("rw")
            .accessibility(Rule::Always, Rule::Always)
            .overlapping_address(),
        RegisterVariant::new("ro")
            .accessibility(Rule::Always, Rule::Never)
            .overlapping_address(),
        RegisterVariant::new("wo")
            .accessibility(Rule::Never, Rule::Always)
            .overlapping_address(),
        RegisterVariant::new("external")
            .accessibility(Rule::Always, Rule::Always)
            .volatile_when(Rule::Always)
            .bit_fields(BitFieldPolicy::Forbidden)
            .size_is_byte_size(),
        RegisterVariant::new("indirect")
            .shared_address()
            .indirect_index(),
    ]
}

const SW_READ_ACTIONS: &[&str] = &["none", "default", "clear", "set"];
const SW_WRITE_ACTIONS: &[&str] = &[
    "none", "default", "clear", "set", "toggle", "clear_0", "clear_1", "set_0", "set_1",
    "toggle_0", "toggle_1",
];
const HW_OPTIONS: &[&str] = &["hw_write", "hw_set", "hw_clear"];

/// Software and hardware actions of a `custom` bit field.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CustomActions {
    sw_read: String,
    sw_write: String,
    hw_update: bool,
}

impl CustomActions {
    fn of(options: &TypeOptions) -> Self {
        Self {
            sw_read: options.symbol("sw_read").unwrap_or_else(|| "default".into()),
            sw_write: options.symbol("sw_write").unwrap_or_else(|| "default".into()),
            hw_update: HW_OPTIONS.iter().any(|key| options.flag(key)),
        }
    }

    fn readable(&self) -> bool {
        self.sw_read != "none"
    }

    fn writable(&self) -> bool {
        self.sw_write != "none"
    }

    /// Storage exists when software can write or hardware can update.
    fn has_storage(&self) -> bool {
        self.writable() || self.hw_update
    }

    fn volatile(&self) -> bool {
        self.hw_update || (self.readable() && !self.has_storage())
    }
}

fn custom_rule(predicate: fn(&CustomActions) -> bool) -> BitFieldRule {
    BitFieldRule::when(move |field: &BitField<'_>| predicate(&CustomActions::of(field.type_options())))
}

fn custom_variant() -> BitFieldVariant {
    BitFieldVariant::new("custom")
        .accessibility(
            custom_rule(CustomActions::readable),
            custom_rule(CustomActions::writable),
        )
        .volatile_when(custom_rule(CustomActions::volatile))
        .require_initial_value_when(custom_rule(CustomActions::has_storage))
        .use_reference(false, None)
        .with_options(Arc::new(check_custom_options))
}

fn check_custom_options(options: &TypeOptions) -> Result<(), String> {
    if let Some(option) = options.values().iter().find(|v| !is_named_option(v)) {
        return Err(format!("custom bit field options must be named: {option}"));
    }
    for key in options.keys() {
        match key.as_str() {
            "sw_read" => check_action(options, "sw_read", SW_READ_ACTIONS)?,
            "sw_write" => check_action(options, "sw_write", SW_WRITE_ACTIONS)?,
            "hw_write" | "hw_set" | "hw_clear" => {
                let value = options.named(&key).unwrap_or(Value::Bool(false));
                value.as_bool().map_err(|e| e.to_string())?;
            }
            _ => return Err(format!("unknown option for custom bit field: {key}")),
        }
    }
    Ok(())
}

fn is_named_option(option: &Value) -> bool {
    match option {
        Value::Record(_) => true,
        Value::Text(text) => text.contains(':'),
        _ => false,
    }
}

fn check_action(options: &TypeOptions, key: &str, allowed: &[&str]) -> Result<(), String> {
    match options.symbol(key) {
        Some(action) if allowed.contains(&action.as_str()) => Ok(()),
        Some(action) => Err(format!("invalid {key} action: {action}")),
        None => Err(format!("invalid {key} action")),
    }
}

//! Type capability registry.
//!
//! Every register and bit field names a type variant. A variant declares,
//! independent of any instance, how accessibility and volatility are decided
//! and what structure the instance must have (initial value, reference,
//! bit fields, arrays, address sharing). Variants are registered on a
//! [`TypeRegistryBuilder`]; the built [`TypeRegistry`] is frozen and shared
//! by every register map built from it.
//!
//! Predicates may read instance properties, but only ones that are resolved
//! without consulting the predicate's own result. A bit field predicate that
//! asks its register for accessibility would recurse into itself.

mod builtin;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use regmap_config::Configuration;

use crate::error::{Diagnostics, RegMapError};
use crate::map::{BitField, InitialValue, Register, RegisterMap};
use crate::value::{parse_integer, Value};

/// Options given after a type name, e.g. `custom: sw_read: clear`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeOptions(Vec<Value>);

impl TypeOptions {
    pub fn new(options: Vec<Value>) -> Self {
        Self(options)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.0
    }

    /// Look up a named option, either from a record option or from a
    /// `"key: value"` text option.
    pub fn named(&self, key: &str) -> Option<Value> {
        self.0.iter().find_map(|option| match option {
            Value::Record(entries) => entries.get(key).cloned(),
            Value::Text(text) => {
                let (k, v) = text.split_once(':')?;
                (k.trim() == key).then(|| option_scalar(v.trim()))
            }
            _ => None,
        })
    }

    /// Names of every named option, in declaration order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for option in &self.0 {
            match option {
                Value::Record(entries) => keys.extend(entries.keys().cloned()),
                Value::Text(text) => {
                    if let Some((k, _)) = text.split_once(':') {
                        keys.push(k.trim().to_string());
                    }
                }
                _ => {}
            }
        }
        keys
    }

    /// Named boolean option, defaulting to `false`.
    pub fn flag(&self, key: &str) -> bool {
        self.named(key)
            .and_then(|v| v.as_bool().ok())
            .unwrap_or(false)
    }

    /// Named symbolic option, e.g. `sw_read: clear`.
    pub fn symbol(&self, key: &str) -> Option<String> {
        self.named(key)
            .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
    }
}

fn option_scalar(text: &str) -> Value {
    if let Some(v) = parse_integer(text) {
        return Value::Integer(v);
    }
    match text {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::Symbol(text.to_string()),
    }
}

/// A capability decided per variant: constant, or computed from the instance.
pub enum Rule<F: ?Sized> {
    Always,
    Never,
    When(Arc<F>),
}

/// Predicate over a bit field instance.
pub type BitFieldPredicate = dyn for<'a> Fn(&BitField<'a>) -> bool + Send + Sync;
/// Predicate over a register instance.
pub type RegisterPredicate = dyn for<'a> Fn(&Register<'a>) -> bool + Send + Sync;

pub type BitFieldRule = Rule<BitFieldPredicate>;
pub type RegisterRule = Rule<RegisterPredicate>;

impl<F: ?Sized> Clone for Rule<F> {
    fn clone(&self) -> Self {
        match self {
            Rule::Always => Rule::Always,
            Rule::Never => Rule::Never,
            Rule::When(p) => Rule::When(Arc::clone(p)),
        }
    }
}

impl<F: ?Sized> fmt::Debug for Rule<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Always => write!(f, "Always"),
            Rule::Never => write!(f, "Never"),
            Rule::When(_) => write!(f, "When(..)"),
        }
    }
}

impl<F: ?Sized> Rule<F> {
    pub fn constant(value: bool) -> Self {
        if value {
            Rule::Always
        } else {
            Rule::Never
        }
    }
}

impl Rule<BitFieldPredicate> {
    pub fn when<P>(predicate: P) -> Self
    where
        P: for<'a> Fn(&BitField<'a>) -> bool + Send + Sync + 'static,
    {
        Rule::When(Arc::new(predicate))
    }

    pub fn evaluate(&self, bit_field: &BitField<'_>) -> bool {
        match self {
            Rule::Always => true,
            Rule::Never => false,
            Rule::When(p) => p(bit_field),
        }
    }
}

impl Rule<RegisterPredicate> {
    pub fn when<P>(predicate: P) -> Self
    where
        P: for<'a> Fn(&Register<'a>) -> bool + Send + Sync + 'static,
    {
        Rule::When(Arc::new(predicate))
    }

    pub fn evaluate(&self, register: &Register<'_>) -> bool {
        match self {
            Rule::Always => true,
            Rule::Never => false,
            Rule::When(p) => p(register),
        }
    }
}

/// Validation hook for a variant's options. Returns a plain-language reason on failure.
pub type OptionsCheck = Arc<dyn Fn(&TypeOptions) -> Result<(), String> + Send + Sync>;

/// Reference bit field settings of a bit field variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReferenceSettings {
    /// A reference may be given.
    pub usable: bool,
    /// A reference must be given.
    pub required: bool,
    /// Minimum reference width; defaults to the referencing field's own width.
    pub width: Option<u64>,
}

/// Descriptor of a bit field type variant.
#[derive(Clone)]
pub struct BitFieldVariant {
    pub name: String,
    pub readable: BitFieldRule,
    pub writable: BitFieldRule,
    pub volatile: BitFieldRule,
    pub initial_value_required: BitFieldRule,
    pub initial_value_allowed: bool,
    pub reference: ReferenceSettings,
    pub options: Option<OptionsCheck>,
}

impl BitFieldVariant {
    /// A reserved, volatile variant with no requirements. Refine with the builder methods.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            readable: Rule::Never,
            writable: Rule::Never,
            volatile: Rule::Always,
            initial_value_required: Rule::Never,
            initial_value_allowed: true,
            reference: ReferenceSettings::default(),
            options: None,
        }
    }

    pub fn read_write(mut self) -> Self {
        self.readable = Rule::Always;
        self.writable = Rule::Always;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.readable = Rule::Always;
        self.writable = Rule::Never;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.readable = Rule::Never;
        self.writable = Rule::Always;
        self
    }

    pub fn reserved(mut self) -> Self {
        self.readable = Rule::Never;
        self.writable = Rule::Never;
        self.initial_value_allowed = false;
        self
    }

    pub fn non_volatile(mut self) -> Self {
        self.volatile = Rule::Never;
        self
    }

    pub fn volatile_when(mut self, rule: BitFieldRule) -> Self {
        self.volatile = rule;
        self
    }

    pub fn accessibility(mut self, readable: BitFieldRule, writable: BitFieldRule) -> Self {
        self.readable = readable;
        self.writable = writable;
        self
    }

    pub fn require_initial_value(mut self) -> Self {
        self.initial_value_required = Rule::Always;
        self
    }

    pub fn require_initial_value_when(mut self, rule: BitFieldRule) -> Self {
        self.initial_value_required = rule;
        self
    }

    pub fn use_reference(mut self, required: bool, width: Option<u64>) -> Self {
        self.reference = ReferenceSettings {
            usable: true,
            required,
            width,
        };
        self
    }

    pub fn with_options(mut self, check: OptionsCheck) -> Self {
        self.options = Some(check);
        self
    }
}

impl fmt::Debug for BitFieldVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitFieldVariant")
            .field("name", &self.name)
            .field("readable", &self.readable)
            .field("writable", &self.writable)
            .field("volatile", &self.volatile)
            .field("reference", &self.reference)
            .finish_non_exhaustive()
    }
}

/// Whether a register variant owns bit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitFieldPolicy {
    Required,
    Optional,
    Forbidden,
}

/// Descriptor of a register type variant.
#[derive(Clone)]
pub struct RegisterVariant {
    pub name: String,
    /// `None`: readable when any bit field is readable.
    pub readable: Option<RegisterRule>,
    /// `None`: writable when any bit field is writable.
    pub writable: Option<RegisterRule>,
    pub volatile: RegisterRule,
    pub bit_fields: BitFieldPolicy,
    /// `size` declares array dimensions.
    pub array: bool,
    /// Registers of this variant may overlap each other without competing access.
    pub overlapping_address: bool,
    /// Array replicas collapse onto one address window.
    pub shared_address: bool,
    /// `size` is a single byte size rather than array dimensions.
    pub size_is_byte_size: bool,
    /// Options are indirect index entries.
    pub indirect_index: bool,
    pub options: Option<OptionsCheck>,
}

impl RegisterVariant {
    /// A variant needing bit fields, supporting arrays, with accessibility from its bit fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            readable: None,
            writable: None,
            volatile: Rule::Never,
            bit_fields: BitFieldPolicy::Required,
            array: true,
            overlapping_address: false,
            shared_address: false,
            size_is_byte_size: false,
            indirect_index: false,
            options: None,
        }
    }

    pub fn accessibility(mut self, readable: RegisterRule, writable: RegisterRule) -> Self {
        self.readable = Some(readable);
        self.writable = Some(writable);
        self
    }

    pub fn volatile_when(mut self, rule: RegisterRule) -> Self {
        self.volatile = rule;
        self
    }

    pub fn bit_fields(mut self, policy: BitFieldPolicy) -> Self {
        self.bit_fields = policy;
        self
    }

    pub fn no_array(mut self) -> Self {
        self.array = false;
        self
    }

    pub fn overlapping_address(mut self) -> Self {
        self.overlapping_address = true;
        self
    }

    pub fn shared_address(mut self) -> Self {
        self.overlapping_address = true;
        self.shared_address = true;
        self
    }

    pub fn size_is_byte_size(mut self) -> Self {
        self.size_is_byte_size = true;
        self.array = false;
        self
    }

    pub fn indirect_index(mut self) -> Self {
        self.indirect_index = true;
        self
    }

    pub fn with_options(mut self, check: OptionsCheck) -> Self {
        self.options = Some(check);
        self
    }
}

impl fmt::Debug for RegisterVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterVariant")
            .field("name", &self.name)
            .field("bit_fields", &self.bit_fields)
            .field("array", &self.array)
            .field("overlapping_address", &self.overlapping_address)
            .field("shared_address", &self.shared_address)
            .finish_non_exhaustive()
    }
}

/// Collects variants before the registry is frozen.
#[derive(Debug, Default)]
pub struct TypeRegistryBuilder {
    bit_fields: IndexMap<String, Arc<BitFieldVariant>>,
    registers: IndexMap<String, Arc<RegisterVariant>>,
    enabled: Option<HashSet<String>>,
}

impl TypeRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bit field variant, replacing any variant of the same name.
    pub fn register_bit_field(mut self, variant: BitFieldVariant) -> Self {
        self.bit_fields
            .insert(variant.name.clone(), Arc::new(variant));
        self
    }

    /// Register a register variant, replacing any variant of the same name.
    pub fn register_register(mut self, variant: RegisterVariant) -> Self {
        self.registers
            .insert(variant.name.clone(), Arc::new(variant));
        self
    }

    /// Restrict the enabled names. Without this call every registered name is enabled.
    pub fn enable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> TypeRegistry {
        log::debug!(
            "type registry frozen: {} bit field variant(s), {} register variant(s)",
            self.bit_fields.len(),
            self.registers.len()
        );
        TypeRegistry {
            bit_fields: self.bit_fields,
            registers: self.registers,
            enabled: self.enabled,
        }
    }
}

/// Frozen table of type variants.
#[derive(Debug)]
pub struct TypeRegistry {
    bit_fields: IndexMap<String, Arc<BitFieldVariant>>,
    registers: IndexMap<String, Arc<RegisterVariant>>,
    enabled: Option<HashSet<String>>,
}

/// Name of the register variant used when a register gives no type.
pub const DEFAULT_REGISTER_TYPE: &str = "default";

impl TypeRegistry {
    /// A builder preloaded with the built-in variants.
    pub fn builtin_builder() -> TypeRegistryBuilder {
        builtin::register_all(TypeRegistryBuilder::new())
    }

    /// The built-in variants, all enabled.
    pub fn builtin() -> Self {
        Self::builtin_builder().build()
    }

    /// The built-in variants, enabled per the configuration's `enabled-types`.
    pub fn for_config(config: &Configuration) -> Self {
        let builder = Self::builtin_builder();
        match &config.enabled_types {
            Some(names) => builder.enable(names.iter().cloned()),
            None => builder,
        }
        .build()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.as_ref().map_or(true, |e| e.contains(name))
    }

    pub fn bit_field_variant(&self, name: &str) -> Option<&Arc<BitFieldVariant>> {
        self.bit_fields.get(name).filter(|_| self.is_enabled(name))
    }

    pub fn register_variant(&self, name: &str) -> Option<&Arc<RegisterVariant>> {
        self.registers.get(name).filter(|_| self.is_enabled(name))
    }

    pub fn bit_field_names(&self) -> impl Iterator<Item = &str> {
        self.bit_fields
            .keys()
            .map(String::as_str)
            .filter(|n| self.is_enabled(n))
    }

    pub fn register_names(&self) -> impl Iterator<Item = &str> {
        self.registers
            .keys()
            .map(String::as_str)
            .filter(|n| self.is_enabled(n))
    }

    /// Names enabled by the configuration that no variant answers to.
    pub fn unknown_enabled_names(&self, config: &Configuration) -> Vec<String> {
        config
            .enabled_types
            .iter()
            .flatten()
            .filter(|n| !self.bit_fields.contains_key(*n) && !self.registers.contains_key(*n))
            .cloned()
            .collect()
    }
}

impl<'a> BitField<'a> {
    pub(crate) fn variant(&self) -> &'a BitFieldVariant {
        &self.node().type_ref.variant
    }

    pub fn type_name(&self) -> &'a str {
        &self.variant().name
    }

    pub fn type_options(&self) -> &'a TypeOptions {
        &self.node().type_ref.options
    }

    pub fn reference_settings(&self) -> ReferenceSettings {
        self.variant().reference
    }

    pub fn is_readable(&self) -> bool {
        *self.node().cache.readable.get_or_init(|| {
            let readable = self.variant().readable.evaluate(self);
            log::debug!("{}: readable = {readable}", self.path());
            readable
        })
    }

    pub fn is_writable(&self) -> bool {
        *self.node().cache.writable.get_or_init(|| {
            let writable = self.variant().writable.evaluate(self);
            log::debug!("{}: writable = {writable}", self.path());
            writable
        })
    }

    pub fn is_volatile(&self) -> bool {
        *self.node().cache.volatile.get_or_init(|| {
            let volatile = self.variant().volatile.evaluate(self);
            log::debug!("{}: volatile = {volatile}", self.path());
            volatile
        })
    }

    pub fn is_read_only(&self) -> bool {
        self.is_readable() && !self.is_writable()
    }

    pub fn is_write_only(&self) -> bool {
        !self.is_readable() && self.is_writable()
    }

    /// Neither readable nor writable.
    pub fn is_reserved(&self) -> bool {
        !self.is_readable() && !self.is_writable()
    }

    /// Reserved bit fields are documented but excluded from functional code generation.
    pub fn is_document_only(&self) -> bool {
        self.is_reserved()
    }

    pub fn initial_value_required(&self) -> bool {
        self.variant().initial_value_required.evaluate(self)
    }

    /// Width a reference bit field must have.
    pub fn required_reference_width(&self) -> u64 {
        self.reference_settings()
            .width
            .unwrap_or_else(|| self.width())
    }
}

impl<'a> Register<'a> {
    pub(crate) fn variant(&self) -> &'a RegisterVariant {
        &self.node().type_ref.variant
    }

    pub fn type_name(&self) -> &'a str {
        &self.variant().name
    }

    pub fn type_options(&self) -> &'a TypeOptions {
        &self.node().type_ref.options
    }

    /// Whether `other` has the same declared type variant.
    pub fn match_type(&self, other: &Register<'_>) -> bool {
        self.type_name() == other.type_name()
    }

    pub fn is_readable(&self) -> bool {
        *self.node().cache.readable.get_or_init(|| match &self.variant().readable {
            Some(rule) => rule.evaluate(self),
            None => self.bit_fields().any(|f| f.is_readable()),
        })
    }

    pub fn is_writable(&self) -> bool {
        *self.node().cache.writable.get_or_init(|| match &self.variant().writable {
            Some(rule) => rule.evaluate(self),
            None => self.bit_fields().any(|f| f.is_writable()),
        })
    }

    pub fn is_volatile(&self) -> bool {
        *self
            .node()
            .cache
            .volatile
            .get_or_init(|| self.variant().volatile.evaluate(self))
    }

    pub fn is_reserved(&self) -> bool {
        !self.is_readable() && !self.is_writable()
    }

    pub fn is_document_only(&self) -> bool {
        self.is_reserved()
    }

    pub fn is_indirect(&self) -> bool {
        self.variant().indirect_index
    }

    pub fn supports_shared_address(&self) -> bool {
        self.variant().shared_address
    }
}

/// Smallest value representable by a `width`-bit field (two's complement view).
fn initial_value_min(width: u64) -> i128 {
    if width == 0 {
        0
    } else if width >= 64 {
        i128::from(i64::MIN)
    } else {
        -(1i128 << (width - 1))
    }
}

/// Largest value representable by a `width`-bit field (unsigned view).
fn initial_value_max(width: u64) -> i128 {
    if width >= 64 {
        i128::from(i64::MAX)
    } else {
        (1i128 << width) - 1
    }
}

/// Per-entity type checks: initial values, reference presence, bit field policy inputs.
pub(crate) fn check_local(map: &RegisterMap, diagnostics: &mut Diagnostics) {
    for field in map.bit_fields() {
        check_initial_value(&field, diagnostics);
        check_reference_usage(&field, diagnostics);
    }

    for register in map.registers() {
        if register.variant().bit_fields == BitFieldPolicy::Forbidden && register.has_bit_fields() {
            diagnostics.push(RegMapError::constraint(
                register.path(),
                format!("no bit fields are allowed for {} register", register.type_name()),
            ));
        }
        if register.is_indirect() && register.index_entries().is_empty() {
            diagnostics.push(RegMapError::missing(register.path(), "no indirect indices are given"));
        }
    }
}

/// Checks that need every bit field of a register to be built.
pub(crate) fn check_children(map: &RegisterMap, diagnostics: &mut Diagnostics) {
    for register in map.registers() {
        if register.variant().bit_fields == BitFieldPolicy::Required && !register.has_bit_fields() {
            diagnostics.push(RegMapError::missing(register.path(), "no bit fields are given"));
        }
    }
}

fn check_initial_value(field: &BitField<'_>, diagnostics: &mut Diagnostics) {
    let Some(initial) = field.initial_value() else {
        if field.initial_value_required() {
            diagnostics.push(RegMapError::missing(field.path(), "no initial value is given"));
        }
        return;
    };

    if !field.variant().initial_value_allowed {
        diagnostics.push(RegMapError::constraint(
            field.path(),
            format!("initial value is not allowed for {} bit field", field.type_name()),
        ));
        return;
    }

    if let InitialValue::PerReplica(values) = initial {
        let count = values.len();
        if !field.is_sequential() {
            diagnostics.push(RegMapError::constraint(
                field.path(),
                "multiple initial values are given for non sequential bit field",
            ));
            return;
        }
        if count as i64 != field.sequence_size() {
            diagnostics.push(RegMapError::constraint(
                field.path(),
                format!(
                    "too many or too few initial values are given: {count} value(s) for sequence size {}",
                    field.sequence_size()
                ),
            ));
            return;
        }
    }

    if !field.bit_assignment().is_valid() {
        return;
    }
    let width = field.width();
    let (min, max) = (initial_value_min(width), initial_value_max(width));
    for &value in initial.values() {
        if i128::from(value) < min || i128::from(value) > max {
            diagnostics.push(RegMapError::constraint(
                field.path(),
                format!("input initial value is out of range: {value:#x}"),
            ));
        }
    }
}

fn check_reference_usage(field: &BitField<'_>, diagnostics: &mut Diagnostics) {
    let settings = field.reference_settings();
    match field.reference_path() {
        Some(_) if !settings.usable => diagnostics.push(RegMapError::constraint(
            field.path(),
            format!("reference bit field is not allowed for {} bit field", field.type_name()),
        )),
        None if settings.required => diagnostics.push(RegMapError::missing(
            field.path(),
            "no reference bit field is given",
        )),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_options_from_text_and_record() {
        let options = TypeOptions::new(vec![
            Value::from("sw_read: clear"),
            Value::record([("hw_write", true)]),
        ]);
        assert_eq!(options.symbol("sw_read").as_deref(), Some("clear"));
        assert!(options.flag("hw_write"));
        assert!(!options.flag("hw_set"));
        assert_eq!(options.keys(), vec!["sw_read", "hw_write"]);
    }

    #[test]
    fn text_option_scalars() {
        let options = TypeOptions::new(vec![Value::from("count: 0x10"), Value::from("on: true")]);
        assert_eq!(options.named("count"), Some(Value::Integer(16)));
        assert_eq!(options.named("on"), Some(Value::Bool(true)));
    }

    #[test]
    fn registry_enable_filter() {
        let registry = TypeRegistry::builtin_builder().enable(["rw", "default"]).build();
        assert!(registry.bit_field_variant("rw").is_some());
        assert!(registry.bit_field_variant("ro").is_none());
        assert!(registry.register_variant("default").is_some());
        assert!(registry.register_variant("indirect").is_none());
        assert_eq!(registry.bit_field_names().collect::<Vec<_>>(), vec!["rw"]);
    }

    #[test]
    fn registry_for_config_reports_unknown_names() {
        let config = Configuration::default().with_enabled_types(["rw", "bogus"]);
        let registry = TypeRegistry::for_config(&config);
        assert!(registry.bit_field_variant("rw").is_some());
        assert_eq!(registry.unknown_enabled_names(&config), vec!["bogus".to_string()]);
    }

    #[test]
    fn custom_variant_registration() {
        let registry = TypeRegistryBuilder::new()
            .register_bit_field(
                BitFieldVariant::new("rwx")
                    .read_write()
                    .non_volatile()
                    .require_initial_value(),
            )
            .build();
        let variant = registry.bit_field_variant("rwx").unwrap();
        assert!(matches!(variant.readable, Rule::Always));
        assert!(matches!(variant.volatile, Rule::Never));
        assert!(registry.bit_field_variant("rw").is_none());
    }

    #[test]
    fn initial_value_bounds() {
        assert_eq!(initial_value_min(4), -8);
        assert_eq!(initial_value_max(4), 15);
        assert_eq!(initial_value_max(64), i128::from(i64::MAX));
    }
}

//! Shared formatting helpers for printable values.

use regmap_core::{AddressRange, BitField, InitialValue, Register, Value};

/// Hexadecimal with a `0x` prefix; negative values keep their sign.
pub fn hex(value: i64) -> String {
    if value < 0 {
        format!("-{:#x}", value.unsigned_abs())
    } else {
        format!("{value:#x}")
    }
}

/// `[msb:lsb]`, or `[lsb]` for a single bit.
pub fn bit_range(lsb: i64, msb: i64) -> String {
    if lsb == msb {
        format!("[{lsb}]")
    } else {
        format!("[{msb}:{lsb}]")
    }
}

/// `0x10 - 0x13`.
pub fn address_range(range: &AddressRange) -> String {
    format!("{} - {}", hex(range.start), hex(range.end))
}

/// `[2, 4]`.
pub fn array_size(dimensions: &[u64]) -> String {
    let items: Vec<String> = dimensions.iter().map(u64::to_string).collect();
    format!("[{}]", items.join(", "))
}

/// Every replica of a bit field, e.g. `[3:0], [11:8]`.
pub fn bit_assignments(field: &BitField<'_>) -> String {
    let assignment = field.bit_assignment();
    assignment
        .lsbs()
        .into_iter()
        .enumerate()
        .map(|(i, lsb)| bit_range(lsb, assignment.msb_of(i as i64)))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn initial_value(value: &InitialValue) -> String {
    match value {
        InitialValue::Single(v) => hex(*v),
        InitialValue::PerReplica(values) => {
            let items: Vec<String> = values.iter().map(|v| hex(*v)).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

/// A type option as written: free-form text verbatim, everything else via `Display`.
pub fn option_text(option: &Value) -> String {
    match option {
        Value::Text(text) | Value::Symbol(text) => text.clone(),
        other => other.to_string(),
    }
}

fn with_options(name: &str, options: Vec<String>) -> String {
    if options.is_empty() {
        name.to_string()
    } else {
        format!("{name}: {}", options.join(", "))
    }
}

/// `custom: sw_read: clear, hw_write: true`.
pub fn bit_field_type(field: &BitField<'_>) -> String {
    let options = field.type_options().values().iter().map(option_text).collect();
    with_options(field.type_name(), options)
}

/// `indirect: a.b: 1, c.d`.
pub fn register_type(register: &Register<'_>) -> String {
    let options = if register.is_indirect() {
        register
            .index_entries()
            .iter()
            .map(|entry| match entry.value {
                Some(value) => format!("{}: {value}", entry.name),
                None => entry.name.clone(),
            })
            .collect()
    } else {
        register
            .type_options()
            .values()
            .iter()
            .map(option_text)
            .collect()
    };
    with_options(register.type_name(), options)
}

/// Short access label: `RW`, `RO`, `WO` or `reserved`.
pub fn access(readable: bool, writable: bool) -> &'static str {
    match (readable, writable) {
        (true, true) => "RW",
        (true, false) => "RO",
        (false, true) => "WO",
        (false, false) => "reserved",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_values() {
        assert_eq!(hex(0), "0x0");
        assert_eq!(hex(0x10), "0x10");
        assert_eq!(hex(-8), "-0x8");
    }

    #[test]
    fn bit_ranges() {
        assert_eq!(bit_range(4, 7), "[7:4]");
        assert_eq!(bit_range(0, 0), "[0]");
    }

    #[test]
    fn address_ranges() {
        let range = AddressRange { start: 0x10, end: 0x13 };
        assert_eq!(address_range(&range), "0x10 - 0x13");
    }

    #[test]
    fn array_sizes_and_initial_values() {
        assert_eq!(array_size(&[2, 4]), "[2, 4]");
        assert_eq!(initial_value(&InitialValue::PerReplica(vec![1, 15])), "[0x1, 0xf]");
    }

    #[test]
    fn option_texts() {
        assert_eq!(option_text(&Value::from("sw_read: clear")), "sw_read: clear");
        assert_eq!(option_text(&Value::record([("hw_set", true)])), "{hw_set: true}");
    }

    #[test]
    fn access_labels() {
        assert_eq!(access(true, true), "RW");
        assert_eq!(access(false, true), "WO");
        assert_eq!(access(false, false), "reserved");
    }
}

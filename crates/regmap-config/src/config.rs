//! The configuration model.

use serde::{Deserialize, Serialize};

/// Element ordering of a colon-delimited bit assignment string.
///
/// `WidthLsb` reads `"width:lsb:sequence_size:step"`, `LsbWidth` reads
/// `"lsb:width:sequence_size:step"`. Trailing elements may be omitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BitAssignmentFormat {
    #[default]
    WidthLsb,
    LsbWidth,
}

/// Settings shared by every register block of a register map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Configuration {
    /// Data bus width in bits.
    pub bus_width: u32,
    /// Address bus width in bits.
    pub address_width: u32,
    /// Allow registers wider than 64 bits.
    pub enable_wide_register: bool,
    /// Ordering used when a bit assignment arrives as a delimited string.
    pub bit_assignment_format: BitAssignmentFormat,
    /// Type names enabled for this build. `None` enables every registered type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_types: Option<Vec<String>>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            bus_width: 32,
            address_width: 32,
            enable_wide_register: false,
            bit_assignment_format: BitAssignmentFormat::default(),
            enabled_types: None,
        }
    }
}

impl Configuration {
    /// Bus width in bytes.
    pub fn byte_width(&self) -> u64 {
        u64::from(self.bus_width / 8)
    }

    /// Builder-style override of the bus width.
    pub fn with_bus_width(mut self, bus_width: u32) -> Self {
        self.bus_width = bus_width;
        self
    }

    /// Builder-style override of the address width.
    pub fn with_address_width(mut self, address_width: u32) -> Self {
        self.address_width = address_width;
        self
    }

    /// Builder-style override of the wide register policy.
    pub fn with_wide_register(mut self, enable: bool) -> Self {
        self.enable_wide_register = enable;
        self
    }

    /// Builder-style override of the bit assignment string ordering.
    pub fn with_bit_assignment_format(mut self, format: BitAssignmentFormat) -> Self {
        self.bit_assignment_format = format;
        self
    }

    /// Restrict the enabled type names.
    pub fn with_enabled_types<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_types = Some(names.into_iter().map(Into::into).collect());
        self
    }

    /// Whether the given type name is enabled by this configuration.
    pub fn is_type_enabled(&self, name: &str) -> bool {
        match &self.enabled_types {
            Some(names) => names.iter().any(|n| n == name),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Configuration::default();
        assert_eq!(config.bus_width, 32);
        assert_eq!(config.address_width, 32);
        assert_eq!(config.byte_width(), 4);
        assert!(!config.enable_wide_register);
        assert_eq!(config.bit_assignment_format, BitAssignmentFormat::WidthLsb);
        assert!(config.is_type_enabled("anything"));
    }

    #[test]
    fn enabled_types_filter() {
        let config = Configuration::default().with_enabled_types(["rw", "ro"]);
        assert!(config.is_type_enabled("rw"));
        assert!(!config.is_type_enabled("w1c"));
    }
}

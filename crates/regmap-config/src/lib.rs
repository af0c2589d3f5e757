//! Register block configuration for regmap.
//!
//! A [`Configuration`] is established before any entity resolves geometry
//! and is shared, read-only, by every register block in a register map.
//! Configurations are stored as `.regmap.toml` files or built in code.

pub mod config;
pub mod error;
pub mod parse;

pub use config::{BitAssignmentFormat, Configuration};
pub use error::{ConfigError, Result};
pub use parse::{config_to_toml, load_config, parse_config, validate_config, ValidationIssue};

//! Ordered verification phases.
//!
//! Each phase runs every check it owns across the whole map and collects the
//! violations. A later phase may assume the earlier ones passed, so
//! [`RegisterMap::verify`] stops after the first phase that reports anything.

use std::collections::HashSet;
use std::fmt;

use regmap_config::validate_config;

use crate::error::{Diagnostics, RegMapError};
use crate::map::RegisterMap;
use crate::{bit_assignment, layout, reference, types};

/// A verification phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Phase {
    /// Checks on one entity's own inputs.
    Local,
    /// Checks that need the entity's children.
    Children,
    /// Whole-tree checks: references and indirect indices.
    Tree,
}

impl Phase {
    pub const ALL: [Phase; 3] = [Phase::Local, Phase::Children, Phase::Tree];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Local => write!(f, "local"),
            Phase::Children => write!(f, "children"),
            Phase::Tree => write!(f, "tree"),
        }
    }
}

impl RegisterMap {
    /// Run one phase and return everything it found.
    pub fn run_phase(&self, phase: Phase) -> Diagnostics {
        log::debug!("verification phase `{phase}` started");
        let mut diagnostics = Diagnostics::new();
        match phase {
            Phase::Local => {
                let config_valid = check_configuration(self, &mut diagnostics);
                check_duplicated_names(self, &mut diagnostics);
                bit_assignment::check_local(self, &mut diagnostics);
                types::check_local(self, &mut diagnostics);
                if config_valid {
                    layout::check_local(self, &mut diagnostics);
                }
            }
            Phase::Children => {
                check_empty_containers(self, &mut diagnostics);
                types::check_children(self, &mut diagnostics);
                layout::check_children(self, &mut diagnostics);
            }
            Phase::Tree => reference::check_tree(self, &mut diagnostics),
        }
        log::debug!(
            "verification phase `{phase}` finished: {} error(s)",
            diagnostics.len()
        );
        diagnostics
    }

    /// Run every phase in order, stopping after the first phase with errors.
    pub fn verify(&self) -> Result<(), Diagnostics> {
        for phase in Phase::ALL {
            self.run_phase(phase).into_result()?;
        }
        Ok(())
    }
}

/// Error-severity configuration issues, reported against every block.
/// Returns whether the configuration can be used for address layout.
fn check_configuration(map: &RegisterMap, diagnostics: &mut Diagnostics) -> bool {
    let Err(issues) = validate_config(&map.config) else {
        return true;
    };
    let mut valid = true;
    for issue in issues.iter().filter(|i| i.severity == "error") {
        valid = false;
        for block in map.blocks() {
            diagnostics.push(RegMapError::constraint(
                block.path(),
                format!("invalid configuration: {}", issue.message),
            ));
        }
    }
    valid
}

fn check_duplicated_names(map: &RegisterMap, diagnostics: &mut Diagnostics) {
    let mut report = |paths: Vec<(&str, &str)>| {
        let mut seen = HashSet::new();
        for (name, path) in paths {
            if !seen.insert(name) {
                diagnostics.push(RegMapError::constraint(path, format!("duplicated name: {name}")));
            }
        }
    };

    report(map.blocks().map(|b| (b.name(), b.path())).collect());
    for block in map.blocks() {
        report(block.children().map(|c| (c.name(), c.path())).collect());
    }
    for file in map.files() {
        report(file.children().map(|c| (c.name(), c.path())).collect());
    }
    for register in map.registers() {
        report(register.bit_fields().map(|f| (f.name(), f.path())).collect());
    }
}

fn check_empty_containers(map: &RegisterMap, diagnostics: &mut Diagnostics) {
    const MESSAGE: &str = "no register files nor registers are given";
    for block in map.blocks() {
        if block.children().next().is_none() {
            diagnostics.push(RegMapError::missing(block.path(), MESSAGE));
        }
    }
    for file in map.files() {
        if file.children().next().is_none() {
            diagnostics.push(RegMapError::missing(file.path(), MESSAGE));
        }
    }
}

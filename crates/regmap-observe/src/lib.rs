//! Human-readable projection of register maps.
//!
//! Renders every entity of a register map as labelled rows, as text for a
//! terminal or JSON for tools.

pub mod error;
pub mod format;
pub mod projection;
pub mod view;

pub use error::{ObserveError, Result};
pub use projection::{EntityKind, EntityProjection, ProjectionView, Row};
pub use view::{View, ViewFormat, ViewOutput};

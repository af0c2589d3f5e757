//! Error taxonomy and aggregated diagnostics.
//!
//! Coercion failures and unconstructible entities are returned immediately
//! by the builder. Every other check runs inside a verification phase and
//! lands in a [`Diagnostics`] collection, so one phase reports every
//! violation it found instead of stopping at the first.

use std::fmt;

/// The category of a register map error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A value cannot be coerced to the required shape.
    MalformedInput,
    /// A value mandated by a type variant's settings is absent.
    MissingRequired,
    /// A numeric, range, alignment, or domain invariant is broken.
    ConstraintViolation,
    /// Address overlap, hierarchy mismatch, or ambiguous indirect addressing.
    TopologyViolation,
    /// A type name is not registered or not enabled for this build.
    UnknownVariant,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::MalformedInput => write!(f, "malformed input"),
            ErrorKind::MissingRequired => write!(f, "missing required value"),
            ErrorKind::ConstraintViolation => write!(f, "constraint violation"),
            ErrorKind::TopologyViolation => write!(f, "topology violation"),
            ErrorKind::UnknownVariant => write!(f, "unknown variant"),
        }
    }
}

/// A user-facing error about one entity of the register map.
///
/// `path` is the fully-qualified path of the offending entity
/// (`block.file.register.bit_field`).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegMapError {
    #[error("{path}: {message}")]
    MalformedInput { path: String, message: String },

    #[error("{path}: {message}")]
    MissingRequired { path: String, message: String },

    #[error("{path}: {message}")]
    ConstraintViolation { path: String, message: String },

    #[error("{path}: {message}")]
    TopologyViolation { path: String, message: String },

    #[error("{path}: {message}")]
    UnknownVariant { path: String, message: String },
}

impl RegMapError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, path: impl Into<String>, message: impl Into<String>) -> Self {
        let path = path.into();
        let message = message.into();
        match kind {
            ErrorKind::MalformedInput => RegMapError::MalformedInput { path, message },
            ErrorKind::MissingRequired => RegMapError::MissingRequired { path, message },
            ErrorKind::ConstraintViolation => RegMapError::ConstraintViolation { path, message },
            ErrorKind::TopologyViolation => RegMapError::TopologyViolation { path, message },
            ErrorKind::UnknownVariant => RegMapError::UnknownVariant { path, message },
        }
    }

    pub fn malformed(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedInput, path, message)
    }

    pub fn missing(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::MissingRequired, path, message)
    }

    pub fn constraint(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ConstraintViolation, path, message)
    }

    pub fn topology(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TopologyViolation, path, message)
    }

    pub fn unknown_variant(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UnknownVariant, path, message)
    }

    /// The category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegMapError::MalformedInput { .. } => ErrorKind::MalformedInput,
            RegMapError::MissingRequired { .. } => ErrorKind::MissingRequired,
            RegMapError::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            RegMapError::TopologyViolation { .. } => ErrorKind::TopologyViolation,
            RegMapError::UnknownVariant { .. } => ErrorKind::UnknownVariant,
        }
    }

    /// Fully-qualified path of the offending entity.
    pub fn path(&self) -> &str {
        match self {
            RegMapError::MalformedInput { path, .. }
            | RegMapError::MissingRequired { path, .. }
            | RegMapError::ConstraintViolation { path, .. }
            | RegMapError::TopologyViolation { path, .. }
            | RegMapError::UnknownVariant { path, .. } => path,
        }
    }

    /// The violated rule in plain language.
    pub fn message(&self) -> &str {
        match self {
            RegMapError::MalformedInput { message, .. }
            | RegMapError::MissingRequired { message, .. }
            | RegMapError::ConstraintViolation { message, .. }
            | RegMapError::TopologyViolation { message, .. }
            | RegMapError::UnknownVariant { message, .. } => message,
        }
    }

    /// Replace the path, keeping kind and message.
    pub(crate) fn at(self, path: impl Into<String>) -> Self {
        Self::new(self.kind(), path, self.message().to_string())
    }
}

/// Result type for builder operations.
pub type Result<T> = std::result::Result<T, RegMapError>;

/// Errors collected by one verification phase.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    errors: Vec<RegMapError>,
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) found", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n  {error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: RegMapError) {
        log::trace!("diagnostic: {error}");
        self.errors.push(error);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegMapError> {
        self.errors.iter()
    }

    /// Errors of one category.
    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &RegMapError> {
        self.errors.iter().filter(move |e| e.kind() == kind)
    }

    /// Whether any collected error mentions `text` in its message.
    pub fn contains_message(&self, text: &str) -> bool {
        self.errors.iter().any(|e| e.message().contains(text))
    }

    /// `Ok(())` when nothing was collected, otherwise every collected error.
    pub fn into_result(self) -> std::result::Result<(), Diagnostics> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    pub fn into_vec(self) -> Vec<RegMapError> {
        self.errors
    }
}

impl IntoIterator for Diagnostics {
    type Item = RegMapError;
    type IntoIter = std::vec::IntoIter<RegMapError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.into_iter()
    }
}

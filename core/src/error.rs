//! Errors raised while building field tables or applying tools.
//!
//! Configuration errors are caught when a record type is first introspected or
//! when the [`Catalog`](crate::Catalog) is assembled. Unprocessable and
//! validation errors come out of apply passes, where they are accumulated in an
//! [`ErrorBatch`] rather than stopping at the first failing field.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// A failing constraint. Maps to a client input error.
    Validation,
    /// A field or value that cannot be used at apply time.
    Unprocessable,
    /// A declarative mistake: bad tag grammar, unknown names, registry limits.
    Configuration,
}

/// Errors from catalog assembly, introspection and apply passes.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A structural or declarative mistake.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was wrong, naming the offending fragment.
        message: String,
    },

    /// A field could not be read or written at apply time.
    #[error("cannot process field \"{location}\": {message}")]
    Unprocessable {
        /// Location of the field inside its record.
        location: String,
        /// Why the field could not be processed.
        message: String,
    },

    /// A field value did not satisfy its constraint for the active scope.
    #[error("field \"{location}\" failed validation in scope \"{scope}\": {constraint}")]
    Validation {
        /// Location of the field inside its record.
        location: String,
        /// The active scope when the constraint was evaluated.
        scope: String,
        /// Details of the violated constraint.
        constraint: serde_json::Value,
    },

    /// Attributes a nested error to the field it came from.
    #[error("field \"{location}\": {source}")]
    Field {
        /// Location of the field inside its record.
        location: String,
        /// The underlying error.
        source: Box<Error>,
    },

    /// Several independent failures from one pass.
    #[error("{} errors: {}", .0.len(), join(.0))]
    Batch(Vec<Error>),
}

fn join(errors: &[Error]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Build a [`Error::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Build a [`Error::Unprocessable`].
    pub fn unprocessable(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unprocessable {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Attribute `error` to the field at `location`.
    pub fn in_field(location: impl Into<String>, error: Error) -> Self {
        Self::Field {
            location: location.into(),
            source: Box::new(error),
        }
    }

    /// Classify this error.
    ///
    /// A batch reports the most severe kind it contains.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Unprocessable { .. } => ErrorKind::Unprocessable,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Field { source, .. } => source.kind(),
            Self::Batch(errors) => errors
                .iter()
                .map(Error::kind)
                .max()
                .unwrap_or(ErrorKind::Validation),
        }
    }

    /// Enumerate the leaf errors, expanding batches.
    #[must_use]
    pub fn flatten(&self) -> Vec<&Error> {
        match self {
            Self::Batch(errors) => errors.iter().flat_map(Error::flatten).collect(),
            other => vec![other],
        }
    }

    /// The field location this error is attributed to, if any.
    #[must_use]
    pub fn location(&self) -> Option<&str> {
        match self {
            Self::Unprocessable { location, .. }
            | Self::Validation { location, .. }
            | Self::Field { location, .. } => Some(location),
            Self::Configuration { .. } | Self::Batch(_) => None,
        }
    }
}

/// Accumulates errors from one pass.
///
/// Empty batches collapse to `Ok(())`, a single error is returned as-is, and
/// anything more becomes [`Error::Batch`].
#[derive(Debug, Default)]
pub struct ErrorBatch {
    errors: Vec<Error>,
}

impl ErrorBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error. Nested batches are merged flat.
    pub fn push(&mut self, error: Error) {
        match error {
            Error::Batch(errors) => self.errors.extend(errors),
            other => self.errors.push(other),
        }
    }

    /// Record the error of `result`, if any, and return its success value.
    pub fn capture<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.push(error);
                None
            }
        }
    }

    /// Number of collected errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Returns `true` if nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Collapse into a single result.
    ///
    /// # Errors
    ///
    /// Returns the collected error(s) when the batch is not empty.
    pub fn into_result(mut self) -> Result<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(Error::Batch(self.errors)),
        }
    }
}

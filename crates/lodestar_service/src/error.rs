//! Error types for building and using service pools.
//!
//! Configuration problems are never raised one at a time; they are collected
//! into [`Diagnostics`] and reported together through [`BuildError::Invalid`].
//! Construction problems surface at lookup time as [`ConstructionError`].

use std::sync::Arc;

use crate::diagnostics::Diagnostics;
use crate::entry::EntryId;
use crate::key::Key;

/// A shareable error produced by a user factory.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Error building an [`Application`](crate::runtime::Application).
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The configuration has duplicate providers, unresolved requirements or
    /// other problems. Every problem found is listed.
    #[error("service configuration is invalid ({n} problem(s)):\n{diagnostics}", n = .0.len(), diagnostics = .0)]
    Invalid(Diagnostics),

    /// A constant backed by a factory failed during eager instantiation.
    #[error("failed to instantiate constant {key}: {source}")]
    Instantiation {
        /// The key of the constant.
        key: Key,
        /// The construction failure.
        source: ConstructionError,
    },
}

impl BuildError {
    /// Returns the collected diagnostics if this is a configuration error.
    #[must_use]
    pub fn diagnostics(&self) -> Option<&Diagnostics> {
        match self {
            BuildError::Invalid(diagnostics) => Some(diagnostics),
            BuildError::Instantiation { .. } => None,
        }
    }
}

/// A second provider was inserted for a key that is already registered.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate provider for {key}")]
pub struct DuplicateProvider {
    /// The contested key.
    pub key: Key,
    /// The entry that holds the key.
    pub existing: EntryId,
    /// The entry that was rejected.
    pub rejected: EntryId,
}

/// Error producing a service value at runtime.
///
/// Lazy entries cache this error and replay it to every later caller, so it
/// is cheaply clonable.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConstructionError {
    /// The factory returned an error.
    #[error("factory for {key} failed: {source}")]
    Failed {
        /// The key being constructed.
        key: Key,
        /// The factory's error.
        source: SharedError,
    },

    /// A dependency could not be constructed.
    #[error("cannot construct {key}: dependency {dependency} failed: {source}")]
    Dependency {
        /// The key being constructed.
        key: Key,
        /// The dependency that failed.
        dependency: Key,
        /// The dependency's failure.
        source: Box<ConstructionError>,
    },

    /// A value had a different type than its key promised.
    #[error("type mismatch for {key}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The key being read or constructed.
        key: Key,
        /// The expected type name.
        expected: &'static str,
        /// The type name actually found.
        found: &'static str,
    },

    /// A factory asked for more dependencies than were declared.
    #[error("factory for {key} requested dependency #{index}, which was not declared")]
    MissingDependency {
        /// The key being constructed.
        key: Key,
        /// The requested position.
        index: usize,
    },

    /// A lazy entry was requested again while its factory was running on the
    /// same thread.
    #[error("re-entrant construction of {key}")]
    Reentrant {
        /// The key being constructed.
        key: Key,
    },

    /// The factory panicked.
    #[error("factory for {key} panicked")]
    Panicked {
        /// The key being constructed.
        key: Key,
    },
}

impl ConstructionError {
    /// Wraps a factory error.
    pub fn failed(key: Key, error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ConstructionError::Failed {
            key,
            source: Arc::from(error.into()),
        }
    }

    /// Returns the key whose construction failed.
    #[must_use]
    pub fn key(&self) -> &Key {
        match self {
            ConstructionError::Failed { key, .. }
            | ConstructionError::Dependency { key, .. }
            | ConstructionError::TypeMismatch { key, .. }
            | ConstructionError::MissingDependency { key, .. }
            | ConstructionError::Reentrant { key }
            | ConstructionError::Panicked { key } => key,
        }
    }

    /// Follows `Dependency` wrappers down to the failure that started it.
    #[must_use]
    pub fn root_cause(&self) -> &ConstructionError {
        match self {
            ConstructionError::Dependency { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

/// Error looking up a service in a pool.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    /// No entry is visible for the key.
    #[error("no service registered for {0}")]
    NotFound(Key),

    /// The entry exists but producing its value failed.
    #[error(transparent)]
    Construction(#[from] ConstructionError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("connection refused")]
    struct Refused;

    #[test]
    fn failed_wraps_source() {
        let err = ConstructionError::failed(Key::of::<u32>(), Refused);
        assert_eq!(err.to_string(), "factory for u32 failed: connection refused");
        assert_eq!(err.key(), &Key::of::<u32>());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn root_cause_unwraps_dependency_chain() {
        let inner = ConstructionError::failed(Key::of::<u8>(), "boom");
        let outer = ConstructionError::Dependency {
            key: Key::of::<u32>(),
            dependency: Key::of::<u8>(),
            source: Box::new(inner),
        };
        assert_eq!(outer.key(), &Key::of::<u32>());
        assert_eq!(outer.root_cause().key(), &Key::of::<u8>());
    }

    #[test]
    fn invalid_build_lists_every_problem() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.record_import_cycle(vec!["a".to_string(), "b".to_string()]);
        let err = BuildError::Invalid(diagnostics);
        assert_eq!(
            err.to_string(),
            "service configuration is invalid (1 problem(s)):\nimport cycles:\n  a -> b -> a\n"
        );
        assert!(err.diagnostics().is_some());
    }

    #[test]
    fn lookup_error_is_transparent_over_construction() {
        let err: LookupError = ConstructionError::Reentrant { key: Key::of::<u32>() }.into();
        assert_eq!(err.to_string(), "re-entrant construction of u32");
    }
}

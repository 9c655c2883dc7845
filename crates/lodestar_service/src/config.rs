//! Assembly configuration.

use serde::{Deserialize, Serialize};

use crate::entry::InstantiationMode;

/// Settings for one [`Assembly`](crate::assembly::Assembly).
///
/// Deserializable so hosts can load it alongside their own configuration.
/// Missing fields take their defaults.
///
/// # Example
///
/// ```
/// use lodestar_service::config::AssemblyConfig;
/// use lodestar_service::entry::InstantiationMode;
///
/// let config = AssemblyConfig::new("billing")
///     .with_default_mode(InstantiationMode::Prototype)
///     .with_shadowing(false);
///
/// assert_eq!(config.name, "billing");
/// assert!(!config.allow_shadowing);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    /// Name of the root scope. Child scope names are joined onto it with `/`.
    pub name: String,
    /// Mode for factory providers that do not choose one.
    pub default_mode: InstantiationMode,
    /// Whether a child scope may provide a key that an ancestor also provides.
    pub allow_shadowing: bool,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            name: "app".to_string(),
            default_mode: InstantiationMode::Lazy,
            allow_shadowing: true,
        }
    }
}

impl AssemblyConfig {
    /// Creates a configuration with the given root scope name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the root scope name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the mode used by factory providers that do not choose one.
    #[must_use]
    pub fn with_default_mode(mut self, mode: InstantiationMode) -> Self {
        self.default_mode = mode;
        self
    }

    /// Allows or forbids child scopes shadowing ancestor providers.
    #[must_use]
    pub fn with_shadowing(mut self, allow: bool) -> Self {
        self.allow_shadowing = allow;
        self
    }
}

//! Assembly information bundle and service.
//!
//! Provides [`AssemblyInfoBundle`] which registers application metadata as a
//! constant service.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lodestar_service::prelude::*;
//! use lodestar_core_bundles::{AssemblyInfo, AssemblyInfoBundle};
//!
//! struct Banner(String);
//!
//! let mut assembly = Assembly::with_config(AssemblyConfig::new("shop"));
//! let root = assembly.root();
//! assembly.install(root, AssemblyInfoBundle);
//! assembly
//!     .configure(root)
//!     .provide(|info: Arc<AssemblyInfo>| Banner(format!("{} v{}", info.name, info.version)));
//!
//! let app = assembly.build().unwrap();
//! assert!(app.get::<Banner>().unwrap().0.starts_with("shop v"));
//! ```

use lodestar_service::assembly::{Bundle, ScopeConfigurer};
use serde::Serialize;

/// Application runtime information.
///
/// Constant service describing the assembly the application was built from.
///
/// # Fields
///
/// - `name` - The assembly name from [`AssemblyConfig`](lodestar_service::config::AssemblyConfig)
/// - `version` - The framework version from `Cargo.toml`
/// - `debug` - Whether the application was compiled in debug mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssemblyInfo {
    /// The assembly name.
    pub name: String,
    /// Framework version string.
    pub version: &'static str,
    /// Whether running in debug mode.
    pub debug: bool,
}

impl AssemblyInfo {
    /// Creates the information for an assembly called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION"),
            debug: cfg!(debug_assertions),
        }
    }
}

/// Bundle that provides application metadata.
///
/// # Services Provided
///
/// | Service | Mode | Description |
/// |---------|------|-------------|
/// | [`AssemblyInfo`] | Constant | Assembly name, version and build mode |
#[derive(Debug, Default, Clone, Copy)]
pub struct AssemblyInfoBundle;

impl Bundle for AssemblyInfoBundle {
    fn configure(&self, scope: &mut ScopeConfigurer<'_>) {
        let info = AssemblyInfo::new(scope.config().name.clone());
        scope
            .provide_instance(info)
            .describe("assembly metadata");
    }
}

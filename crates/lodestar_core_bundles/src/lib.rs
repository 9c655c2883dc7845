//! Core infrastructure bundles for Lodestar.
//!
//! This crate provides foundational bundles that most Lodestar applications
//! need:
//!
//! - [`AssemblyInfoBundle`] - Assembly metadata as a constant service
//! - [`TracingBundle`] - Logging and observability via the `tracing` crate
//! - [`DefaultBundles`] - Both of the above
//! - [`MinimalBundles`] - Metadata only, for tests that want no subscriber
//!
//! # Example
//!
//! ```
//! use lodestar_service::prelude::*;
//! use lodestar_core_bundles::{AssemblyInfo, DefaultBundles, TracingConfig};
//!
//! let mut assembly = Assembly::new();
//! let root = assembly.root();
//! assembly.install(root, DefaultBundles::default());
//!
//! let app = assembly.build().unwrap();
//! assert_eq!(app.get::<AssemblyInfo>().unwrap().name, "app");
//! assert!(app.contains(&Key::of::<TracingConfig>()));
//! ```

mod assembly_info;
mod tracing_bundle;

// Re-export bundles
pub use assembly_info::AssemblyInfoBundle;
pub use tracing_bundle::{TracingBundle, TracingFormat};

// Re-export services
pub use assembly_info::AssemblyInfo;
pub use tracing_bundle::TracingConfig;

use lodestar_service::assembly::{Bundle, ScopeConfigurer};

/// Default bundles for most Lodestar applications.
///
/// Installs into the same scope:
/// - [`AssemblyInfoBundle`] - Assembly metadata
/// - [`TracingBundle`] - Logging and observability
///
/// # Customization
///
/// ```
/// use lodestar_core_bundles::{DefaultBundles, TracingBundle};
/// use tracing::Level;
///
/// let bundles = DefaultBundles::default()
///     .with_tracing(TracingBundle::new().with_level(Level::DEBUG));
/// # let _ = bundles;
/// ```
#[derive(Debug, Clone, Default)]
pub struct DefaultBundles {
    tracing: TracingBundle,
}

impl DefaultBundles {
    /// Replaces the tracing bundle.
    #[must_use]
    pub fn with_tracing(mut self, tracing: TracingBundle) -> Self {
        self.tracing = tracing;
        self
    }
}

impl Bundle for DefaultBundles {
    fn configure(&self, scope: &mut ScopeConfigurer<'_>) {
        scope.install(AssemblyInfoBundle);
        scope.install(self.tracing.clone());
    }
}

/// Minimal bundles for headless or testing scenarios.
///
/// Installs only [`AssemblyInfoBundle`]. Does not include tracing, making it
/// suitable for unit tests that don't need logging output.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalBundles;

impl Bundle for MinimalBundles {
    fn configure(&self, scope: &mut ScopeConfigurer<'_>) {
        scope.install(AssemblyInfoBundle);
    }
}

//! A modular application-assembly framework with a hierarchical,
//! build-time validated service container.
//!
//! Bundles declare services into scopes; [`Assembly::build`](service::assembly::Assembly::build)
//! resolves and validates the whole graph before anything runs.
//!
//! ```
//! use lodestar::prelude::*;
//!
//! let mut assembly = Assembly::new();
//! let root = assembly.root();
//! assembly.install(root, MinimalBundles);
//!
//! let app = assembly.build().unwrap();
//! assert_eq!(app.get::<AssemblyInfo>().unwrap().name, "app");
//! ```

/// The service resolution engine.
pub use lodestar_service as service;

/// Core infrastructure bundles.
pub use lodestar_core_bundles as core_bundles;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use lodestar_core_bundles::{
        AssemblyInfo, AssemblyInfoBundle, DefaultBundles, MinimalBundles, TracingBundle,
        TracingConfig, TracingFormat,
    };
    pub use lodestar_service::prelude::*;
}

//! The service resolution engine for Lodestar.
//!
//! `lodestar_service` turns declarations made by bundles into a validated,
//! compiled service graph:
//!
//! - [`key`] - Typed, optionally qualified service identities
//! - [`service`] - Type-erased service values
//! - [`factory`] - Bound factories and dependency injection into closures
//! - [`entry`] - Build-time provider entries and instantiation modes
//! - [`registry`] - Per-scope entry registries with parent fall-through
//! - [`transform`] - Import/export specifications across scope boundaries
//! - [`diagnostics`] - The collected record of configuration problems
//! - [`assembly`] - The build-time API (scopes, bundles, `build()`)
//! - [`runtime`] - Compiled runtime entries, service pools and lookup
//!
//! # Lifecycle
//!
//! 1. **Configure** - Bundles declare providers, imports and exports per scope
//! 2. **Resolve** - Every dependency is matched to exactly one provider; all
//!    problems are collected into [`Diagnostics`](diagnostics::Diagnostics)
//! 3. **Compile** - Entries become immutable [`RuntimeEntry`](runtime::RuntimeEntry)
//!    values grouped into one [`ServicePool`](runtime::ServicePool) per scope
//! 4. **Run** - Pools are read concurrently; lazy entries construct once
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lodestar_service::prelude::*;
//!
//! struct Database { url: String }
//! struct Repository { db: Arc<Database> }
//!
//! struct StorageBundle;
//!
//! impl Bundle for StorageBundle {
//!     fn configure(&self, scope: &mut ScopeConfigurer<'_>) {
//!         scope.provide_instance(Database { url: "postgres://localhost".into() });
//!         scope
//!             .provide(|db: Arc<Database>| Repository { db })
//!             .lazy();
//!     }
//! }
//!
//! let mut assembly = Assembly::new();
//! let root = assembly.root();
//! assembly.install(root, StorageBundle);
//!
//! let app = assembly.build().unwrap();
//! let repo = app.root().get::<Repository>().unwrap();
//! assert_eq!(repo.db.url, "postgres://localhost");
//! ```

/// Build-time assembly API.
pub mod assembly;

mod compiler;

/// Assembly configuration.
pub mod config;

/// Collected configuration and resolution problems.
pub mod diagnostics;

/// Build-time provider entries.
pub mod entry;

/// Error types.
pub mod error;

/// Bound factories.
pub mod factory;

/// Typed service keys.
pub mod key;

mod lazy;

/// Per-scope entry registries.
pub mod registry;

mod resolver;

/// Compiled runtime entries and service pools.
pub mod runtime;

/// Type-erased service values.
pub mod service;

/// Import and export specifications.
pub mod transform;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::assembly::*;
    pub use crate::config::*;
    pub use crate::diagnostics::*;
    pub use crate::entry::*;
    pub use crate::error::*;
    pub use crate::factory::*;
    pub use crate::key::*;
    pub use crate::registry::*;
    pub use crate::runtime::*;
    pub use crate::service::*;
    pub use crate::transform::*;
}

//! Tracing and observability bundle.
//!
//! Provides [`TracingBundle`] which configures the `tracing` subscriber and
//! exposes its configuration as a service.
//!
//! # Lifecycle
//!
//! - **`configure()`** provides [`TracingConfig`] as a constant so other
//!   bundles can depend on the intended configuration.
//! - **`finish()`** reads the [`TracingConfig`] visible from the bundle's
//!   scope and initializes the subscriber from it. A child scope that
//!   provides its own `TracingConfig` and installs the bundle there gets
//!   its own settings.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use lodestar_service::prelude::*;
//! use lodestar_core_bundles::{TracingBundle, TracingConfig, TracingFormat};
//! use tracing::Level;
//!
//! struct Worker {
//!     verbose: bool,
//! }
//!
//! let mut assembly = Assembly::new();
//! let root = assembly.root();
//! assembly.install(
//!     root,
//!     TracingBundle::default()
//!         .with_level(Level::DEBUG)
//!         .with_format(TracingFormat::Compact),
//! );
//! assembly.configure(root).provide(|config: Arc<TracingConfig>| Worker {
//!     verbose: config.level <= Level::DEBUG,
//! });
//!
//! let app = assembly.build().unwrap();
//! assert!(app.get::<Worker>().unwrap().verbose);
//! ```

use lodestar_service::assembly::{Bundle, ScopeConfigurer};
use lodestar_service::runtime::{ServiceLocator, ServicePool};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TracingFormat {
    /// Human-readable colored output (default).
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON structured output for log aggregation.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing configuration service.
///
/// Services can depend on it to adapt their logging to the configured level.
///
/// # Example
///
/// ```
/// use lodestar_core_bundles::{TracingConfig, TracingFormat};
/// use tracing::Level;
///
/// let config = TracingConfig::default();
/// assert_eq!(config.level, Level::INFO);
/// assert_eq!(config.format, TracingFormat::Pretty);
/// assert!(config.env_filter.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    /// The configured log level.
    pub level: Level,
    /// The configured output format.
    pub format: TracingFormat,
    /// Environment filter directives (e.g. `lodestar_service=debug,hyper=warn`).
    pub env_filter: Option<String>,
    /// Whether span enter/exit events are emitted.
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            env_filter: None,
            span_events: false,
        }
    }
}

impl TracingConfig {
    /// Returns the filter directives the subscriber is built with.
    ///
    /// Falls back to the level when no environment filter is set.
    #[must_use]
    pub fn directives(&self) -> &str {
        self.env_filter.as_deref().unwrap_or(self.level.as_str())
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.directives()).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        }
    }

    /// Installs the global subscriber.
    ///
    /// Does nothing if a subscriber is already installed.
    fn init(&self) {
        let env_filter = self.env_filter();
        let span_events = self.span_events();

        // try_init().ok() ignores errors if already initialized
        match self.format {
            TracingFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_span_events(span_events),
                    )
                    .try_init()
                    .ok();
            }
            TracingFormat::Compact => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_span_events(span_events),
                    )
                    .try_init()
                    .ok();
            }
            TracingFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_span_events(span_events),
                    )
                    .try_init()
                    .ok();
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingBundle
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing and logging bundle.
///
/// Configures the `tracing` subscriber and provides its configuration.
/// Uses the [`tracing`] and [`tracing_subscriber`] crates under the hood.
///
/// # Services Provided
///
/// | Service | Mode | Description |
/// |---------|------|-------------|
/// | [`TracingConfig`] | Constant | Tracing configuration (read-only) |
///
/// # Configuration Options
///
/// ```
/// use lodestar_core_bundles::{TracingBundle, TracingFormat};
/// use tracing::Level;
///
/// // Development: pretty colored output with debug level
/// let dev = TracingBundle::default()
///     .with_level(Level::DEBUG)
///     .with_format(TracingFormat::Pretty)
///     .with_span_events(true);
///
/// // Production: JSON output for log aggregation
/// let prod = TracingBundle::default()
///     .with_level(Level::INFO)
///     .with_format(TracingFormat::Json)
///     .with_env_filter("lodestar_service=warn,my_app=info");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TracingBundle {
    config: TracingConfig,
}

impl TracingBundle {
    /// Creates a new `TracingBundle` with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a bundle from a complete configuration.
    #[must_use]
    pub fn from_config(config: TracingConfig) -> Self {
        Self { config }
    }

    /// Sets the maximum log level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.config.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Sets a custom environment filter string.
    ///
    /// Format: `target=level,target=level,...`
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.env_filter = Some(filter.into());
        self
    }

    /// Enables span enter/exit events in output.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.config.span_events = enabled;
        self
    }

    /// Returns the configuration this bundle provides.
    #[must_use]
    pub fn config(&self) -> &TracingConfig {
        &self.config
    }
}

impl Bundle for TracingBundle {
    fn configure(&self, scope: &mut ScopeConfigurer<'_>) {
        scope
            .provide_instance(self.config.clone())
            .describe("tracing subscriber configuration");
    }

    fn finish(&self, pool: &ServicePool) {
        let config = match pool.get::<TracingConfig>() {
            Ok(config) => config,
            Err(error) => {
                tracing::warn!(%error, scope = pool.name(), "tracing configuration unavailable");
                return;
            }
        };
        config.init();

        tracing::info!(
            level = %config.level,
            format = ?config.format,
            scope = pool.name(),
            "TracingBundle initialized"
        );
    }
}

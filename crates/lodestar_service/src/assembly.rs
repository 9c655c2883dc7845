//! The build-time API.
//!
//! An [`Assembly`] collects scopes, bundles and their declarations, then
//! [`build`](Assembly::build)s them into an [`Application`].
//!
//! # Lifecycle
//!
//! 1. **Declare** - [`Bundle::configure`] runs immediately on
//!    [`install`](Assembly::install) and declares providers, imports and
//!    exports through a [`ScopeConfigurer`]
//! 2. **Build** - [`Assembly::build`] resolves and validates everything,
//!    then compiles one [`ServicePool`] per scope
//! 3. **Finish** - [`Bundle::finish`] runs for each bundle, in installation
//!    order, with the pool of the scope it was installed into
//!
//! Declaration mistakes that can only be programming errors (an unknown
//! scope, an instance whose type disagrees with its key) panic at the point
//! of declaration. Everything else is collected and reported by `build()`.
//!
//! # Example
//!
//! ```
//! use lodestar_service::prelude::*;
//!
//! struct Greeting(String);
//!
//! struct GreeterBundle;
//!
//! impl Bundle for GreeterBundle {
//!     fn configure(&self, scope: &mut ScopeConfigurer<'_>) {
//!         scope.provide_instance(Greeting("hello".into()));
//!         scope.export(Key::of::<Greeting>());
//!     }
//! }
//!
//! let mut assembly = Assembly::new();
//! let greeter = assembly.link(assembly.root(), "greeter", GreeterBundle);
//!
//! let app = assembly.build().unwrap();
//! assert_eq!(app.root().get::<Greeting>().unwrap().0, "hello");
//! assert_eq!(app.scope(greeter).unwrap().name(), "app/greeter");
//! ```

use core::any::TypeId;
use std::sync::Arc;

use crate::compiler::Compiler;
use crate::config::AssemblyConfig;
use crate::entry::{Entry, EntryId, InstantiationMode, Origin};
use crate::error::BuildError;
use crate::factory::{Factory, IntoFactory, IntoTryFactory};
use crate::key::Key;
use crate::registry::ScopeId;
use crate::resolver;
use crate::runtime::{Application, ServicePool};
use crate::service::{Instance, Service};
use crate::transform::{ExportSpec, ImportSource, ImportSpec};

// ─────────────────────────────────────────────────────────────────────────────
// Bundle
// ─────────────────────────────────────────────────────────────────────────────

/// A reusable unit that declares services into a scope.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use lodestar_service::prelude::*;
///
/// struct Clock { offset: i64 }
/// struct Scheduler { clock: Arc<Clock> }
///
/// struct SchedulingBundle { offset: i64 }
///
/// impl Bundle for SchedulingBundle {
///     fn configure(&self, scope: &mut ScopeConfigurer<'_>) {
///         scope.provide_instance(Clock { offset: self.offset });
///         scope
///             .provide(|clock: Arc<Clock>| Scheduler { clock })
///             .describe("runs periodic jobs");
///     }
///
///     fn finish(&self, pool: &ServicePool) {
///         let scheduler = pool.get::<Scheduler>().unwrap();
///         assert_eq!(scheduler.clock.offset, self.offset);
///     }
/// }
/// ```
pub trait Bundle: Send + Sync + 'static {
    /// Declares providers, imports and exports. Called once, on install.
    fn configure(&self, scope: &mut ScopeConfigurer<'_>);

    /// Called after a successful build with the pool of the scope the
    /// bundle was installed into.
    ///
    /// Use this for eager checks or warm-up that needs built services.
    fn finish(&self, _pool: &ServicePool) {}

    /// Returns the bundle's name for diagnostics.
    ///
    /// Default implementation returns the type name.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Assembly
// ─────────────────────────────────────────────────────────────────────────────

/// Build-time state of one scope.
pub(crate) struct ScopeData {
    /// Path name, e.g. `app/storage`.
    pub(crate) name: String,
    pub(crate) parent: Option<ScopeId>,
    pub(crate) children: Vec<ScopeId>,
    /// Entries declared directly in this scope, in declaration order.
    pub(crate) declared: Vec<EntryId>,
    pub(crate) imports: Vec<ImportDecl>,
    pub(crate) exports: Vec<ExportSpec>,
}

/// An import together with the bundle that declared it.
pub(crate) struct ImportDecl {
    pub(crate) spec: ImportSpec,
    pub(crate) source: Option<String>,
}

struct InstalledBundle {
    scope: ScopeId,
    bundle: Arc<dyn Bundle>,
}

/// One application build: a tree of scopes and everything declared in them.
///
/// The root scope exists from the start and is named after
/// [`AssemblyConfig::name`].
pub struct Assembly {
    config: AssemblyConfig,
    scopes: Vec<ScopeData>,
    entries: Vec<Entry>,
    bundles: Vec<InstalledBundle>,
    /// Name of the bundle currently configuring, recorded on its entries.
    current_source: Option<String>,
}

impl Default for Assembly {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembly {
    /// Creates an assembly with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(AssemblyConfig::default())
    }

    /// Creates an assembly with `config`.
    #[must_use]
    pub fn with_config(config: AssemblyConfig) -> Self {
        let root = ScopeData {
            name: config.name.clone(),
            parent: None,
            children: Vec::new(),
            declared: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        };
        Self {
            config,
            scopes: vec![root],
            entries: Vec::new(),
            bundles: Vec::new(),
            current_source: None,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &AssemblyConfig {
        &self.config
    }

    /// Returns the root scope.
    #[must_use]
    pub fn root(&self) -> ScopeId {
        ScopeId::ROOT
    }

    /// Returns the path name of `scope`.
    ///
    /// # Panics
    ///
    /// Panics if `scope` does not belong to this assembly.
    #[must_use]
    pub fn scope_name(&self, scope: ScopeId) -> &str {
        &self.scope_data(scope).name
    }

    /// Returns the number of scopes, including the root.
    #[must_use]
    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    /// Returns a declared entry.
    #[must_use]
    pub fn entry(&self, id: EntryId) -> Option<&Entry> {
        self.entries.get(id.0)
    }

    /// Iterates over every declared entry.
    pub fn entries(&self) -> impl Iterator<Item = (EntryId, &Entry)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (EntryId(index), entry))
    }

    /// Adds an empty child scope under `parent`.
    ///
    /// # Panics
    ///
    /// Panics if `parent` is unknown or `parent` already has a child called
    /// `name`.
    pub fn add_scope(&mut self, name: impl Into<String>, parent: ScopeId) -> ScopeId {
        let name = format!("{}/{}", self.scope_data(parent).name, name.into());
        if self.scopes.iter().any(|scope| scope.name == name) {
            panic!("Scope '{name}' already exists. Give sibling scopes distinct names.");
        }

        let id = ScopeId(self.scopes.len());
        self.scopes.push(ScopeData {
            name,
            parent: Some(parent),
            children: Vec::new(),
            declared: Vec::new(),
            imports: Vec::new(),
            exports: Vec::new(),
        });
        self.scopes[parent.0].children.push(id);
        id
    }

    /// Returns a configurer declaring into `scope`.
    ///
    /// # Panics
    ///
    /// Panics if `scope` does not belong to this assembly.
    pub fn configure(&mut self, scope: ScopeId) -> ScopeConfigurer<'_> {
        self.scope_data(scope);
        ScopeConfigurer {
            assembly: self,
            scope,
        }
    }

    /// Installs `bundle` into `scope`, running its
    /// [`configure`](Bundle::configure) immediately.
    ///
    /// # Panics
    ///
    /// Panics if `scope` does not belong to this assembly.
    pub fn install<B: Bundle>(&mut self, scope: ScopeId, bundle: B) -> &mut Self {
        self.scope_data(scope);
        let bundle: Arc<dyn Bundle> = Arc::new(bundle);
        self.bundles.push(InstalledBundle {
            scope,
            bundle: Arc::clone(&bundle),
        });

        let previous = self.current_source.replace(bundle.name().to_string());
        bundle.configure(&mut ScopeConfigurer {
            assembly: self,
            scope,
        });
        self.current_source = previous;

        tracing::debug!(
            bundle = bundle.name(),
            scope = %self.scopes[scope.0].name,
            "installed bundle"
        );
        self
    }

    /// Adds a child scope under `parent` and installs `bundle` into it.
    ///
    /// # Panics
    ///
    /// See [`add_scope`](Self::add_scope).
    pub fn link<B: Bundle>(&mut self, parent: ScopeId, name: impl Into<String>, bundle: B) -> ScopeId {
        let scope = self.add_scope(name, parent);
        self.install(scope, bundle);
        scope
    }

    /// Resolves, validates and compiles every scope.
    ///
    /// On success, calls [`Bundle::finish`] for each installed bundle.
    ///
    /// # Errors
    ///
    /// - [`BuildError::Invalid`] with every problem found, if the
    ///   configuration is inconsistent
    /// - [`BuildError::Instantiation`] if a constant fails to construct
    pub fn build(mut self) -> Result<Application, BuildError> {
        tracing::debug!(
            assembly = %self.config.name,
            scopes = self.scopes.len(),
            entries = self.entries.len(),
            bundles = self.bundles.len(),
            "building assembly"
        );

        let resolution = resolver::resolve(&mut self.entries, &self.scopes, &self.config)
            .map_err(BuildError::Invalid)?;

        let mut compiler = Compiler::new(&self.entries, &resolution.links, self.config.default_mode);
        let mut pools: Vec<ServicePool> = Vec::with_capacity(self.scopes.len());
        for (registry, scope) in resolution.registries.into_iter().zip(&self.scopes) {
            let parent = scope.parent.and_then(|parent| pools.get(parent.0)).cloned();
            let pool = registry.into_runtime(scope.name.clone(), parent, |key, id| {
                compiler.runtime_entry(key, id)
            })?;
            tracing::debug!(scope = %scope.name, services = pool.len(), "compiled service pool");
            pools.push(pool);
        }
        let exports = resolution.exports.into_runtime(
            format!("{}:exports", self.config.name),
            None,
            |key, id| compiler.runtime_entry(key, id),
        )?;

        let application = Application::new(pools, exports);
        for installed in &self.bundles {
            if let Some(pool) = application.scope(installed.scope) {
                installed.bundle.finish(pool);
            }
        }

        tracing::debug!(assembly = %self.config.name, "assembly built");
        Ok(application)
    }

    fn scope_data(&self, scope: ScopeId) -> &ScopeData {
        match self.scopes.get(scope.0) {
            Some(data) => data,
            None => panic!(
                "Scope {scope} does not belong to assembly '{}'. \
                 Use the ids returned by add_scope() or link().",
                self.config.name
            ),
        }
    }

    fn declare(&mut self, scope: ScopeId, mut entry: Entry) -> EntryId {
        entry.set_source(self.current_source.clone());
        let id = EntryId(self.entries.len());
        self.entries.push(entry);
        self.scopes[scope.0].declared.push(id);
        id
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ScopeConfigurer
// ─────────────────────────────────────────────────────────────────────────────

/// Declares providers, imports and exports into one scope.
pub struct ScopeConfigurer<'a> {
    assembly: &'a mut Assembly,
    scope: ScopeId,
}

impl ScopeConfigurer<'_> {
    /// Returns the scope being configured.
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Returns the path name of the scope being configured.
    #[must_use]
    pub fn scope_name(&self) -> &str {
        self.assembly.scope_name(self.scope)
    }

    /// Returns the assembly configuration.
    #[must_use]
    pub fn config(&self) -> &AssemblyConfig {
        &self.assembly.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Providers
    // ─────────────────────────────────────────────────────────────────────────

    /// Provides `value` under the unqualified key of `T`. Always constant.
    pub fn provide_instance<T: Service>(&mut self, value: T) -> ProviderBinding<'_> {
        self.provide_instance_as(Key::of::<T>(), value)
    }

    /// Provides `value` under `key`. Always constant.
    ///
    /// # Panics
    ///
    /// Panics if `key` does not name the type `T`.
    pub fn provide_instance_as<T: Service>(&mut self, key: Key, value: T) -> ProviderBinding<'_> {
        assert_key_type::<T>(&key);
        let entry = Entry::instance(key, Instance::new(value), self.scope);
        self.bind(entry)
    }

    /// Provides the output of `factory` under its unqualified key.
    ///
    /// Dependencies are derived from the closure's `Arc<T>` parameters.
    pub fn provide<M, F>(&mut self, factory: F) -> ProviderBinding<'_>
    where
        F: IntoFactory<M>,
    {
        self.provide_as(Key::of::<F::Output>(), factory)
    }

    /// Provides the output of `factory` under `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` does not name the factory's output type.
    pub fn provide_as<M, F>(&mut self, key: Key, factory: F) -> ProviderBinding<'_>
    where
        F: IntoFactory<M>,
    {
        assert_key_type::<F::Output>(&key);
        self.provide_with(key, F::dependencies(), factory.into_factory())
    }

    /// Provides the output of a fallible `factory` under its unqualified key.
    pub fn try_provide<M, F>(&mut self, factory: F) -> ProviderBinding<'_>
    where
        F: IntoTryFactory<M>,
    {
        self.try_provide_as(Key::of::<F::Output>(), factory)
    }

    /// Provides the output of a fallible `factory` under `key`.
    ///
    /// # Panics
    ///
    /// Panics if `key` does not name the factory's output type.
    pub fn try_provide_as<M, F>(&mut self, key: Key, factory: F) -> ProviderBinding<'_>
    where
        F: IntoTryFactory<M>,
    {
        assert_key_type::<F::Output>(&key);
        self.provide_with(key, F::dependencies(), factory.into_factory())
    }

    /// Provides `key` from a raw factory with an explicit dependency list.
    ///
    /// The factory receives the dependency values in the order given.
    pub fn provide_with(
        &mut self,
        key: Key,
        dependencies: Vec<Key>,
        factory: Arc<dyn Factory>,
    ) -> ProviderBinding<'_> {
        let entry = Entry::factory(key, factory, dependencies, self.scope);
        self.bind(entry)
    }

    fn bind(&mut self, entry: Entry) -> ProviderBinding<'_> {
        let id = self.assembly.declare(self.scope, entry);
        ProviderBinding {
            id,
            entry: &mut self.assembly.entries[id.0],
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Imports and exports
    // ─────────────────────────────────────────────────────────────────────────

    /// Imports entries into this scope.
    ///
    /// # Panics
    ///
    /// Panics if the import source is a scope of another assembly.
    pub fn import(&mut self, spec: ImportSpec) -> &mut Self {
        if let ImportSource::Scope(source) = spec.source() {
            self.assembly.scope_data(*source);
        }
        let source = self.assembly.current_source.clone();
        self.assembly.scopes[self.scope.0]
            .imports
            .push(ImportDecl { spec, source });
        self
    }

    /// Exports the entry registered under `key` to the parent scope.
    pub fn export(&mut self, key: Key) -> &mut Self {
        self.push_export(ExportSpec::key(key))
    }

    /// Exports the entry registered under `key` to the parent scope as
    /// `export_as`.
    ///
    /// # Panics
    ///
    /// Panics if the keys name different value types.
    pub fn export_as(&mut self, key: Key, export_as: Key) -> &mut Self {
        self.push_export(ExportSpec::rebound(key, export_as))
    }

    /// Exports every entry of this scope to the parent scope.
    pub fn export_all(&mut self) -> &mut Self {
        self.push_export(ExportSpec::All)
    }

    fn push_export(&mut self, spec: ExportSpec) -> &mut Self {
        self.assembly.scopes[self.scope.0].exports.push(spec);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bundles
    // ─────────────────────────────────────────────────────────────────────────

    /// Installs another bundle into this scope.
    pub fn install<B: Bundle>(&mut self, bundle: B) -> &mut Self {
        self.assembly.install(self.scope, bundle);
        self
    }

    /// Adds a child scope and installs `bundle` into it.
    pub fn link<B: Bundle>(&mut self, name: impl Into<String>, bundle: B) -> ScopeId {
        self.assembly.link(self.scope, name, bundle)
    }
}

fn assert_key_type<T: Service>(key: &Key) {
    assert!(
        key.type_id() == TypeId::of::<T>(),
        "cannot provide {} under key {key}: the key names a different type",
        core::any::type_name::<T>()
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// ProviderBinding
// ─────────────────────────────────────────────────────────────────────────────

/// Adjusts a provider right after it is declared.
pub struct ProviderBinding<'a> {
    id: EntryId,
    entry: &'a mut Entry,
}

impl ProviderBinding<'_> {
    /// Returns the declared entry's id.
    #[must_use]
    pub fn id(&self) -> EntryId {
        self.id
    }

    /// Returns the declared key.
    #[must_use]
    pub fn key(&self) -> &Key {
        self.entry.key()
    }

    /// Constructs the value during [`Assembly::build`].
    pub fn constant(&mut self) -> &mut Self {
        self.mode(InstantiationMode::Constant)
    }

    /// Constructs the value on first access and keeps it.
    pub fn lazy(&mut self) -> &mut Self {
        self.mode(InstantiationMode::Lazy)
    }

    /// Constructs a new value on every access.
    pub fn prototype(&mut self) -> &mut Self {
        self.mode(InstantiationMode::Prototype)
    }

    /// Sets the instantiation mode.
    ///
    /// # Panics
    ///
    /// Panics if the provider is an instance and `mode` is not constant.
    pub fn mode(&mut self, mode: InstantiationMode) -> &mut Self {
        if matches!(self.entry.origin(), Origin::Instance(_)) && mode != InstantiationMode::Constant {
            panic!(
                "Provider for {} is an instance and is always constant; it cannot be {mode}.",
                self.entry.key()
            );
        }
        self.entry.set_mode(mode);
        self
    }

    /// Attaches a human-readable description.
    pub fn describe(&mut self, description: impl Into<String>) -> &mut Self {
        self.entry.set_description(description.into());
        self
    }
}

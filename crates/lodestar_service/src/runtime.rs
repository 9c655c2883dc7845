//! Compiled runtime entries and service pools.
//!
//! A successful build turns every scope into a [`ServicePool`]: an immutable
//! `Key -> RuntimeEntry` map with a link to the parent scope's pool. Pools
//! are `Send + Sync`, cheap to clone and need no locking to read. Lazy
//! entries synchronize internally on first construction.

use core::fmt;
use std::sync::Arc;

use hashbrown::HashSet;
use indexmap::IndexMap;

use crate::entry::InstantiationMode;
use crate::error::{ConstructionError, LookupError};
use crate::factory::{Dependencies, Factory};
use crate::key::{Key, Qualifier};
use crate::lazy::LazyCell;
use crate::registry::ScopeId;
use crate::service::{Instance, Service};

pub use crate::lazy::LazyState;

// ─────────────────────────────────────────────────────────────────────────────
// Accessors
// ─────────────────────────────────────────────────────────────────────────────

/// How a compiled entry produces its value.
pub(crate) enum Accessor {
    Constant(Instance),
    Lazy(LazyCell),
    Prototype(Invoker),
}

impl Accessor {
    pub(crate) fn mode(&self) -> InstantiationMode {
        match self {
            Accessor::Constant(_) => InstantiationMode::Constant,
            Accessor::Lazy(_) => InstantiationMode::Lazy,
            Accessor::Prototype(_) => InstantiationMode::Prototype,
        }
    }

    pub(crate) fn get(&self) -> Result<Instance, ConstructionError> {
        match self {
            Accessor::Constant(instance) => Ok(instance.clone()),
            Accessor::Lazy(cell) => cell.get(),
            Accessor::Prototype(invoker) => invoker.invoke(),
        }
    }
}

/// A factory bound to the accessors of its dependencies.
pub(crate) struct Invoker {
    key: Key,
    factory: Arc<dyn Factory>,
    dependencies: Vec<(Key, Arc<Accessor>)>,
}

impl Invoker {
    pub(crate) fn new(
        key: Key,
        factory: Arc<dyn Factory>,
        dependencies: Vec<(Key, Arc<Accessor>)>,
    ) -> Self {
        Self {
            key,
            factory,
            dependencies,
        }
    }

    /// Reads every dependency, then runs the factory.
    pub(crate) fn invoke(&self) -> Result<Instance, ConstructionError> {
        let mut values = Vec::with_capacity(self.dependencies.len());
        for (dependency, accessor) in &self.dependencies {
            let value = accessor
                .get()
                .map_err(|source| ConstructionError::Dependency {
                    key: self.key.clone(),
                    dependency: dependency.clone(),
                    source: Box::new(source),
                })?;
            values.push((dependency.clone(), value));
        }

        let instance = self
            .factory
            .invoke(&Dependencies::new(&self.key, &values))?;
        if instance.type_id() != self.key.type_id() {
            return Err(ConstructionError::TypeMismatch {
                key: self.key.clone(),
                expected: self.key.type_name(),
                found: instance.type_name(),
            });
        }
        Ok(instance)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RuntimeEntry
// ─────────────────────────────────────────────────────────────────────────────

/// An immutable, compiled entry.
///
/// Entries compiled from imports and exports share the accessor of the entry
/// that produces the value, so a lazy value is constructed once no matter
/// how many scopes see it.
#[derive(Clone)]
pub struct RuntimeEntry {
    key: Key,
    description: Option<Arc<str>>,
    accessor: Arc<Accessor>,
}

impl RuntimeEntry {
    pub(crate) fn new(key: Key, description: Option<Arc<str>>, accessor: Arc<Accessor>) -> Self {
        Self {
            key,
            description,
            accessor,
        }
    }

    pub(crate) fn accessor(&self) -> &Arc<Accessor> {
        &self.accessor
    }

    /// Returns the key this entry is registered under.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Returns the description of the producing entry.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns how the value is produced.
    #[must_use]
    pub fn mode(&self) -> InstantiationMode {
        self.accessor.mode()
    }

    /// Returns the construction state for lazy entries.
    #[must_use]
    pub fn lazy_state(&self) -> Option<LazyState> {
        match &*self.accessor {
            Accessor::Lazy(cell) => Some(cell.state()),
            Accessor::Constant(_) | Accessor::Prototype(_) => None,
        }
    }

    /// Returns `true` if both entries are backed by the same producer.
    #[must_use]
    pub fn shares_accessor_with(&self, other: &RuntimeEntry) -> bool {
        Arc::ptr_eq(&self.accessor, &other.accessor)
    }

    /// Produces the value.
    ///
    /// # Errors
    ///
    /// Returns the construction error of the entry or of one of its
    /// dependencies. Lazy entries replay a cached failure.
    pub fn get_instance(&self) -> Result<Instance, ConstructionError> {
        self.accessor.get()
    }

    /// Produces the value as a `T`.
    ///
    /// # Errors
    ///
    /// As [`get_instance`](Self::get_instance), plus
    /// [`ConstructionError::TypeMismatch`] if the value is not a `T`.
    pub fn get<T: Service>(&self) -> Result<Arc<T>, ConstructionError> {
        let instance = self.get_instance()?;
        instance
            .downcast::<T>()
            .ok_or_else(|| ConstructionError::TypeMismatch {
                key: self.key.clone(),
                expected: core::any::type_name::<T>(),
                found: instance.type_name(),
            })
    }
}

impl fmt::Debug for RuntimeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeEntry")
            .field("key", &self.key)
            .field("mode", &self.mode())
            .field("description", &self.description)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ServiceLocator
// ─────────────────────────────────────────────────────────────────────────────

/// A visible service, as listed by [`ServiceLocator::services`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    /// The key.
    pub key: Key,
    /// The producing entry's description.
    pub description: Option<String>,
    /// How the value is produced.
    pub mode: InstantiationMode,
    /// Name of the pool that holds the entry.
    pub scope: String,
}

/// Read access to services by key.
pub trait ServiceLocator {
    /// Returns the entry visible under `key`.
    fn entry(&self, key: &Key) -> Option<&RuntimeEntry>;

    /// Lists every visible service. Nearer entries shadow farther ones.
    fn services(&self) -> Vec<ServiceDescriptor>;

    /// Returns `true` if a service is visible under `key`.
    fn contains(&self, key: &Key) -> bool {
        self.entry(key).is_some()
    }

    /// Produces the value registered under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::NotFound`] if nothing is visible under `key`,
    /// or [`LookupError::Construction`] if producing the value fails.
    fn get_instance(&self, key: &Key) -> Result<Instance, LookupError> {
        let entry = self
            .entry(key)
            .ok_or_else(|| LookupError::NotFound(key.clone()))?;
        Ok(entry.get_instance()?)
    }

    /// Produces the value registered under `key` as a `T`.
    ///
    /// # Errors
    ///
    /// See [`get_instance`](Self::get_instance).
    fn get_keyed<T: Service>(&self, key: &Key) -> Result<Arc<T>, LookupError>
    where
        Self: Sized,
    {
        let entry = self
            .entry(key)
            .ok_or_else(|| LookupError::NotFound(key.clone()))?;
        Ok(entry.get::<T>()?)
    }

    /// Produces the unqualified `T`.
    ///
    /// # Errors
    ///
    /// See [`get_instance`](Self::get_instance).
    fn get<T: Service>(&self) -> Result<Arc<T>, LookupError>
    where
        Self: Sized,
    {
        self.get_keyed(&Key::of::<T>())
    }

    /// Produces the `T` registered under `qualifier`.
    ///
    /// # Errors
    ///
    /// See [`get_instance`](Self::get_instance).
    fn get_qualified<T: Service>(&self, qualifier: impl Into<Qualifier>) -> Result<Arc<T>, LookupError>
    where
        Self: Sized,
    {
        self.get_keyed(&Key::qualified::<T>(qualifier))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ServicePool
// ─────────────────────────────────────────────────────────────────────────────

/// The compiled services of one scope.
///
/// Cloning a pool clones a handle; the entries are shared.
#[derive(Clone)]
pub struct ServicePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    name: String,
    entries: IndexMap<Key, RuntimeEntry>,
    parent: Option<ServicePool>,
}

impl ServicePool {
    pub(crate) fn new(
        name: String,
        entries: IndexMap<Key, RuntimeEntry>,
        parent: Option<ServicePool>,
    ) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                name,
                entries,
                parent,
            }),
        }
    }

    /// Returns the scope path name, e.g. `app/storage`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the parent scope's pool.
    #[must_use]
    pub fn parent(&self) -> Option<&ServicePool> {
        self.inner.parent.as_ref()
    }

    /// Iterates over the entries registered in this scope only.
    pub fn local_entries(&self) -> impl Iterator<Item = &RuntimeEntry> {
        self.inner.entries.values()
    }

    /// Returns every visible entry, nearest scope first. Shadowed entries
    /// are skipped.
    #[must_use]
    pub fn visible_entries(&self) -> Vec<RuntimeEntry> {
        self.walk()
            .map(|(_, entry)| entry.clone())
            .collect()
    }

    /// Returns the number of entries registered in this scope only.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    /// Returns `true` if this scope registers no entries itself.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    /// Returns `true` if both handles refer to the same pool.
    #[must_use]
    pub fn ptr_eq(&self, other: &ServicePool) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn walk(&self) -> impl Iterator<Item = (&ServicePool, &RuntimeEntry)> {
        let mut seen = HashSet::new();
        core::iter::successors(Some(self), |pool| pool.parent())
            .flat_map(|pool| pool.inner.entries.values().map(move |entry| (pool, entry)))
            .filter(move |(_, entry)| seen.insert(entry.key().clone()))
    }
}

impl ServiceLocator for ServicePool {
    fn entry(&self, key: &Key) -> Option<&RuntimeEntry> {
        core::iter::successors(Some(self), |pool| pool.parent())
            .find_map(|pool| pool.inner.entries.get(key))
    }

    fn services(&self) -> Vec<ServiceDescriptor> {
        self.walk()
            .map(|(pool, entry)| ServiceDescriptor {
                key: entry.key().clone(),
                description: entry.description().map(str::to_string),
                mode: entry.mode(),
                scope: pool.name().to_string(),
            })
            .collect()
    }
}

impl fmt::Debug for ServicePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServicePool")
            .field("name", &self.inner.name)
            .field("entries", &self.inner.entries.len())
            .field("parent", &self.parent().map(ServicePool::name))
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Application
// ─────────────────────────────────────────────────────────────────────────────

/// A built assembly: one pool per scope plus the root scope's exports.
///
/// Lookups through the `ServiceLocator` impl go to the root pool.
#[derive(Debug, Clone)]
pub struct Application {
    pools: Vec<ServicePool>,
    exports: ServicePool,
}

impl Application {
    pub(crate) fn new(pools: Vec<ServicePool>, exports: ServicePool) -> Self {
        Self { pools, exports }
    }

    /// Returns the root scope's name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.root().name()
    }

    /// Returns the root scope's pool.
    #[must_use]
    pub fn root(&self) -> &ServicePool {
        &self.pools[ScopeId::ROOT.0]
    }

    /// Returns the pool of `scope`.
    #[must_use]
    pub fn scope(&self, scope: ScopeId) -> Option<&ServicePool> {
        self.pools.get(scope.0)
    }

    /// Returns the pool whose path name is `name`, e.g. `app/storage`.
    #[must_use]
    pub fn scope_named(&self, name: &str) -> Option<&ServicePool> {
        self.pools.iter().find(|pool| pool.name() == name)
    }

    /// Iterates over every pool in scope creation order.
    pub fn scopes(&self) -> impl Iterator<Item = (ScopeId, &ServicePool)> {
        self.pools
            .iter()
            .enumerate()
            .map(|(index, pool)| (ScopeId(index), pool))
    }

    /// Returns the services the root scope exports.
    #[must_use]
    pub fn exports(&self) -> &ServicePool {
        &self.exports
    }
}

impl ServiceLocator for Application {
    fn entry(&self, key: &Key) -> Option<&RuntimeEntry> {
        self.root().entry(key)
    }

    fn services(&self) -> Vec<ServiceDescriptor> {
        self.root().services()
    }
}

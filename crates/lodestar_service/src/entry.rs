//! Build-time provider entries.
//!
//! An [`Entry`] is a promise to provide a value for a [`Key`]. Entries are
//! stored in an arena owned by the [`Assembly`](crate::assembly::Assembly)
//! and addressed by [`EntryId`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::factory::Factory;
use crate::key::Key;
use crate::registry::ScopeId;
use crate::runtime::RuntimeEntry;
use crate::service::Instance;

/// How a compiled entry produces its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstantiationMode {
    /// Fixed at build time.
    Constant,
    /// Computed on first access, then fixed.
    #[default]
    Lazy,
    /// Computed on every access.
    Prototype,
}

impl core::fmt::Display for InstantiationMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            InstantiationMode::Constant => "constant",
            InstantiationMode::Lazy => "lazy",
            InstantiationMode::Prototype => "prototype",
        })
    }
}

/// Index of an [`Entry`] in the assembly's entry arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) usize);

impl EntryId {
    /// Returns the arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for EntryId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Where an entry's value comes from.
#[derive(Clone)]
pub enum Origin {
    /// A value supplied at declaration time.
    Instance(Instance),
    /// A factory invoked with the entry's resolved dependencies.
    Factory(Arc<dyn Factory>),
    /// Another entry provides the value (imports and exports).
    Delegate(Delegate),
}

impl Origin {
    /// Returns the variant without its payload.
    #[must_use]
    pub fn kind(&self) -> OriginKind {
        match self {
            Origin::Instance(_) => OriginKind::Instance,
            Origin::Factory(_) => OriginKind::Factory,
            Origin::Delegate(_) => OriginKind::Delegate,
        }
    }
}

impl core::fmt::Debug for Origin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Origin::Instance(instance) => f.debug_tuple("Instance").field(instance).finish(),
            Origin::Factory(factory) => f.debug_tuple("Factory").field(&factory.name()).finish(),
            Origin::Delegate(delegate) => f.debug_tuple("Delegate").field(delegate).finish(),
        }
    }
}

/// The target of a delegating entry.
///
/// Delegates always point at the ultimate producer, never at another
/// delegate.
#[derive(Debug, Clone)]
pub enum Delegate {
    /// An entry of the same assembly.
    Entry(EntryId),
    /// An entry of an already-built service pool.
    Foreign(RuntimeEntry),
}

/// Payload-free view of [`Origin`], used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OriginKind {
    /// See [`Origin::Instance`].
    Instance,
    /// See [`Origin::Factory`].
    Factory,
    /// See [`Origin::Delegate`].
    Delegate,
}

impl core::fmt::Display for OriginKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            OriginKind::Instance => "instance",
            OriginKind::Factory => "factory",
            OriginKind::Delegate => "delegate",
        })
    }
}

/// A build-time description of one provider.
#[derive(Debug, Clone)]
pub struct Entry {
    key: Key,
    origin: Origin,
    dependencies: Vec<Key>,
    mode: Option<InstantiationMode>,
    description: Option<String>,
    scope: ScopeId,
    source: Option<String>,
}

impl Entry {
    pub(crate) fn instance(key: Key, instance: Instance, scope: ScopeId) -> Self {
        Self {
            key,
            origin: Origin::Instance(instance),
            dependencies: Vec::new(),
            mode: Some(InstantiationMode::Constant),
            description: None,
            scope,
            source: None,
        }
    }

    pub(crate) fn factory(
        key: Key,
        factory: Arc<dyn Factory>,
        dependencies: Vec<Key>,
        scope: ScopeId,
    ) -> Self {
        Self {
            key,
            origin: Origin::Factory(factory),
            dependencies,
            mode: None,
            description: None,
            scope,
            source: None,
        }
    }

    pub(crate) fn delegate(key: Key, delegate: Delegate, scope: ScopeId) -> Self {
        Self {
            key,
            origin: Origin::Delegate(delegate),
            dependencies: Vec::new(),
            mode: None,
            description: None,
            scope,
            source: None,
        }
    }

    /// Returns the key this entry provides.
    #[must_use]
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Returns where the value comes from.
    #[must_use]
    pub fn origin(&self) -> &Origin {
        &self.origin
    }

    /// Returns the keys this entry needs before it can produce a value.
    #[must_use]
    pub fn dependencies(&self) -> &[Key] {
        &self.dependencies
    }

    /// Returns the explicitly chosen instantiation mode, if any.
    ///
    /// Factory entries without a mode use the assembly's default. Delegates
    /// take the mode of the entry they point at.
    #[must_use]
    pub fn mode(&self) -> Option<InstantiationMode> {
        self.mode
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the declaring scope.
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Returns the name of the bundle (or import/export) that declared this entry.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Returns `true` if the value comes from another entry.
    #[must_use]
    pub fn is_delegate(&self) -> bool {
        matches!(self.origin, Origin::Delegate(_))
    }

    pub(crate) fn set_mode(&mut self, mode: InstantiationMode) {
        self.mode = Some(mode);
    }

    pub(crate) fn set_description(&mut self, description: String) {
        self.description = Some(description);
    }

    pub(crate) fn set_source(&mut self, source: Option<String>) {
        self.source = source;
    }

    /// Rewrites the key of an entry that has not been registered yet.
    pub(crate) fn rebind(&mut self, key: Key) {
        self.key = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::IntoFactory;

    #[test]
    fn instance_entries_are_constant() {
        let entry = Entry::instance(Key::of::<u32>(), Instance::new(7u32), ScopeId(0));
        assert_eq!(entry.mode(), Some(InstantiationMode::Constant));
        assert_eq!(entry.origin().kind(), OriginKind::Instance);
        assert!(entry.dependencies().is_empty());
    }

    #[test]
    fn factory_entries_defer_mode() {
        let factory = IntoFactory::into_factory(|| 1u8);
        let mut entry = Entry::factory(Key::of::<u8>(), factory, Vec::new(), ScopeId(0));
        assert_eq!(entry.mode(), None);

        entry.set_mode(InstantiationMode::Prototype);
        entry.set_description("a byte".into());
        assert_eq!(entry.mode(), Some(InstantiationMode::Prototype));
        assert_eq!(entry.description(), Some("a byte"));
    }

    #[test]
    fn rebind_changes_key_only() {
        let mut entry = Entry::delegate(
            Key::of::<String>(),
            Delegate::Entry(EntryId(3)),
            ScopeId(1),
        );
        entry.rebind(Key::qualified::<String>("tag"));
        assert_eq!(entry.key(), &Key::qualified::<String>("tag"));
        assert!(entry.is_delegate());
        assert_eq!(entry.scope(), ScopeId(1));
    }

    #[test]
    fn mode_serde_uses_snake_case() {
        let json = serde_json::to_string(&InstantiationMode::Prototype).unwrap();
        assert_eq!(json, "\"prototype\"");
        let mode: InstantiationMode = serde_json::from_str("\"lazy\"").unwrap();
        assert_eq!(mode, InstantiationMode::Lazy);
    }
}

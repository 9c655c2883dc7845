//! Per-scope entry registries.
//!
//! Each scope owns one [`EntryRegistry`] mapping keys to entries. A key can
//! be registered at most once per scope; lookups that miss locally fall
//! through to the parent scope's registry.

use indexmap::IndexMap;

use crate::entry::EntryId;
use crate::error::{BuildError, DuplicateProvider};
use crate::key::Key;
use crate::runtime::{RuntimeEntry, ServicePool};

/// Index of a scope in an [`Assembly`](crate::assembly::Assembly).
///
/// The root scope always has id `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub(crate) usize);

impl ScopeId {
    /// The root scope.
    pub const ROOT: ScopeId = ScopeId(0);

    /// Returns the index of the scope.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl core::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// The unique `Key -> EntryId` map of one scope.
///
/// Keys iterate in insertion order.
#[derive(Debug, Clone)]
pub struct EntryRegistry {
    scope: ScopeId,
    parent: Option<ScopeId>,
    local: IndexMap<Key, EntryId>,
}

impl EntryRegistry {
    /// Creates an empty registry for `scope`.
    #[must_use]
    pub fn new(scope: ScopeId, parent: Option<ScopeId>) -> Self {
        Self {
            scope,
            parent,
            local: IndexMap::new(),
        }
    }

    /// Returns the owning scope.
    #[must_use]
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Returns the parent scope, if any.
    #[must_use]
    pub fn parent(&self) -> Option<ScopeId> {
        self.parent
    }

    /// Registers `id` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateProvider`] if `key` is already registered in this
    /// scope. The existing registration is kept.
    pub fn put(&mut self, key: Key, id: EntryId) -> Result<(), DuplicateProvider> {
        match self.local.get(&key) {
            Some(&existing) => Err(DuplicateProvider {
                key,
                existing,
                rejected: id,
            }),
            None => {
                self.local.insert(key, id);
                Ok(())
            }
        }
    }

    /// Registers `id` under `key` unless the key is taken.
    ///
    /// Returns `true` if the entry was inserted.
    pub fn put_if_absent(&mut self, key: Key, id: EntryId) -> bool {
        if self.local.contains_key(&key) {
            return false;
        }
        self.local.insert(key, id);
        true
    }

    /// Looks up `key` in this scope only.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<EntryId> {
        self.local.get(key).copied()
    }

    /// Looks up `key` in this scope, then in each ancestor.
    ///
    /// `registries` is indexed by [`ScopeId`].
    #[must_use]
    pub fn get_recursive(&self, key: &Key, registries: &[EntryRegistry]) -> Option<EntryId> {
        let mut current = Some(self);
        while let Some(registry) = current {
            if let Some(id) = registry.get(key) {
                return Some(id);
            }
            current = registry.parent.and_then(|parent| registries.get(parent.0));
        }
        None
    }

    /// Returns `true` if `key` is registered in this scope.
    #[must_use]
    pub fn contains(&self, key: &Key) -> bool {
        self.local.contains_key(key)
    }

    /// Iterates over local registrations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, EntryId)> {
        self.local.iter().map(|(key, &id)| (key, id))
    }

    /// Returns the number of local registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.local.len()
    }

    /// Returns `true` if nothing is registered in this scope.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }

    /// Consumes the registry, replacing every entry with its compiled form.
    ///
    /// `compile` is called once per registration, in insertion order.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `compile`.
    pub fn into_runtime<F>(
        self,
        name: impl Into<String>,
        parent: Option<ServicePool>,
        mut compile: F,
    ) -> Result<ServicePool, BuildError>
    where
        F: FnMut(&Key, EntryId) -> Result<RuntimeEntry, BuildError>,
    {
        let mut entries = IndexMap::with_capacity(self.local.len());
        for (key, id) in self.local {
            let runtime = compile(&key, id)?;
            entries.insert(key, runtime);
        }
        Ok(ServicePool::new(name.into(), entries, parent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Vec<EntryRegistry> {
        let mut root = EntryRegistry::new(ScopeId(0), None);
        let mut child = EntryRegistry::new(ScopeId(1), Some(ScopeId(0)));
        let grandchild = EntryRegistry::new(ScopeId(2), Some(ScopeId(1)));
        root.put(Key::of::<u32>(), EntryId(0)).unwrap();
        root.put(Key::of::<String>(), EntryId(1)).unwrap();
        child.put(Key::of::<String>(), EntryId(2)).unwrap();
        vec![root, child, grandchild]
    }

    #[test]
    fn put_rejects_occupied_key() {
        let mut registry = EntryRegistry::new(ScopeId::ROOT, None);
        registry.put(Key::of::<i32>(), EntryId(0)).unwrap();

        let err = registry.put(Key::of::<i32>(), EntryId(1)).unwrap_err();
        assert_eq!(err.existing, EntryId(0));
        assert_eq!(err.rejected, EntryId(1));
        assert_eq!(registry.get(&Key::of::<i32>()), Some(EntryId(0)));
    }

    #[test]
    fn put_if_absent_keeps_first() {
        let mut registry = EntryRegistry::new(ScopeId::ROOT, None);
        assert!(registry.put_if_absent(Key::of::<i32>(), EntryId(0)));
        assert!(!registry.put_if_absent(Key::of::<i32>(), EntryId(1)));
        assert_eq!(registry.get(&Key::of::<i32>()), Some(EntryId(0)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn qualified_keys_are_distinct_slots() {
        let mut registry = EntryRegistry::new(ScopeId::ROOT, None);
        registry.put(Key::of::<String>(), EntryId(0)).unwrap();
        registry.put(Key::qualified::<String>("tag"), EntryId(1)).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn get_is_local_only() {
        let registries = chain();
        assert_eq!(registries[2].get(&Key::of::<u32>()), None);
        assert!(registries[0].contains(&Key::of::<u32>()));
    }

    #[test]
    fn get_recursive_walks_parents_and_prefers_nearest() {
        let registries = chain();
        let leaf = &registries[2];
        assert_eq!(leaf.get_recursive(&Key::of::<u32>(), &registries), Some(EntryId(0)));
        assert_eq!(leaf.get_recursive(&Key::of::<String>(), &registries), Some(EntryId(2)));
        assert_eq!(leaf.get_recursive(&Key::of::<u8>(), &registries), None);
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let registries = chain();
        let keys: Vec<_> = registries[0].iter().map(|(key, _)| key.clone()).collect();
        assert_eq!(keys, vec![Key::of::<u32>(), Key::of::<String>()]);
    }
}

//! Import and export specifications.
//!
//! Scopes exchange entries across their boundaries:
//!
//! - An **import** copies entries from another scope (or from an already
//!   built [`ServicePool`]) into the importing scope, after passing each key
//!   through an ordered list of [`ImportOp`]s.
//! - An **export** makes an entry of a child scope visible in its parent,
//!   optionally under a different key.
//!
//! Imported and exported entries delegate to the original producer, so the
//! value, its instantiation mode and its identity are shared.
//!
//! # Example
//!
//! ```
//! use lodestar_service::key::Key;
//! use lodestar_service::registry::ScopeId;
//! use lodestar_service::transform::ImportSpec;
//!
//! let spec = ImportSpec::from_scope(ScopeId::ROOT)
//!     .exclude(Key::of::<u64>())
//!     .rebind(Key::of::<String>(), Key::qualified::<String>("upstream"));
//!
//! assert_eq!(spec.apply(&Key::of::<u64>()), None);
//! assert_eq!(spec.apply(&Key::of::<String>()), Some(Key::qualified::<String>("upstream")));
//! assert_eq!(spec.apply(&Key::of::<u32>()), Some(Key::of::<u32>()));
//! ```

use std::sync::Arc;

use crate::key::Key;
use crate::registry::ScopeId;
use crate::runtime::ServicePool;

/// A predicate over keys used by [`ImportOp::Filter`].
pub type KeyFilter = Arc<dyn Fn(&Key) -> bool + Send + Sync>;

/// Where imported entries come from.
#[derive(Clone)]
pub enum ImportSource {
    /// Another scope of the same assembly: its own and imported entries.
    Scope(ScopeId),
    /// Every entry visible in a built pool.
    Pool(ServicePool),
}

impl core::fmt::Debug for ImportSource {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ImportSource::Scope(scope) => f.debug_tuple("Scope").field(scope).finish(),
            ImportSource::Pool(pool) => f.debug_tuple("Pool").field(&pool.name()).finish(),
        }
    }
}

/// One step of an import transform.
#[derive(Clone)]
pub enum ImportOp {
    /// Drops the key.
    Exclude(Key),
    /// Drops every key not in the list.
    Retain(Vec<Key>),
    /// Drops every key the predicate rejects.
    Filter(KeyFilter),
    /// Renames `from` to `to`.
    Rebind {
        /// The key before renaming.
        from: Key,
        /// The key after renaming.
        to: Key,
    },
}

impl ImportOp {
    fn apply(&self, key: Key) -> Option<Key> {
        match self {
            ImportOp::Exclude(excluded) => (key != *excluded).then_some(key),
            ImportOp::Retain(keys) => keys.contains(&key).then_some(key),
            ImportOp::Filter(predicate) => predicate(&key).then_some(key),
            ImportOp::Rebind { from, to } => {
                if key == *from {
                    Some(to.clone())
                } else {
                    Some(key)
                }
            }
        }
    }
}

impl core::fmt::Debug for ImportOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ImportOp::Exclude(key) => f.debug_tuple("Exclude").field(key).finish(),
            ImportOp::Retain(keys) => f.debug_tuple("Retain").field(keys).finish(),
            ImportOp::Filter(_) => f.write_str("Filter(..)"),
            ImportOp::Rebind { from, to } => f
                .debug_struct("Rebind")
                .field("from", from)
                .field("to", to)
                .finish(),
        }
    }
}

/// An import declaration: a source plus an ordered list of key operations.
///
/// Operations run in declaration order against the current key, so rebinds
/// compose and a key dropped before a rebind never reaches it.
#[derive(Debug, Clone)]
pub struct ImportSpec {
    source: ImportSource,
    ops: Vec<ImportOp>,
}

impl ImportSpec {
    /// Imports from another scope of the same assembly.
    #[must_use]
    pub fn from_scope(scope: ScopeId) -> Self {
        Self {
            source: ImportSource::Scope(scope),
            ops: Vec::new(),
        }
    }

    /// Imports every entry visible in a built pool.
    #[must_use]
    pub fn from_pool(pool: ServicePool) -> Self {
        Self {
            source: ImportSource::Pool(pool),
            ops: Vec::new(),
        }
    }

    /// Returns the import source.
    #[must_use]
    pub fn source(&self) -> &ImportSource {
        &self.source
    }

    /// Returns the operations in application order.
    #[must_use]
    pub fn ops(&self) -> &[ImportOp] {
        &self.ops
    }

    /// Drops `key`.
    #[must_use]
    pub fn exclude(mut self, key: Key) -> Self {
        self.ops.push(ImportOp::Exclude(key));
        self
    }

    /// Keeps only the listed keys.
    #[must_use]
    pub fn retain(mut self, keys: impl IntoIterator<Item = Key>) -> Self {
        self.ops.push(ImportOp::Retain(keys.into_iter().collect()));
        self
    }

    /// Keeps only keys accepted by `predicate`.
    #[must_use]
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Key) -> bool + Send + Sync + 'static,
    {
        self.ops.push(ImportOp::Filter(Arc::new(predicate)));
        self
    }

    /// Renames `from` to `to`.
    ///
    /// # Panics
    ///
    /// Panics if the keys name different value types.
    #[must_use]
    pub fn rebind(mut self, from: Key, to: Key) -> Self {
        assert!(
            from.same_type(&to),
            "cannot rebind {from} to {to}: the value types differ"
        );
        self.ops.push(ImportOp::Rebind { from, to });
        self
    }

    /// Runs `key` through every operation.
    ///
    /// Returns the key the entry becomes visible under, or `None` if an
    /// operation drops it.
    #[must_use]
    pub fn apply(&self, key: &Key) -> Option<Key> {
        self.ops
            .iter()
            .try_fold(key.clone(), |current, op| op.apply(current))
    }
}

/// An export declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportSpec {
    /// Exports the entry registered under `key` as `export_as`.
    Key {
        /// The key in the exporting scope.
        key: Key,
        /// The key in the parent scope.
        export_as: Key,
    },
    /// Exports every entry of the scope under its own key.
    All,
}

impl ExportSpec {
    /// Exports `key` under the same key.
    #[must_use]
    pub fn key(key: Key) -> Self {
        ExportSpec::Key {
            export_as: key.clone(),
            key,
        }
    }

    /// Exports `key` under `export_as`.
    ///
    /// # Panics
    ///
    /// Panics if the keys name different value types.
    #[must_use]
    pub fn rebound(key: Key, export_as: Key) -> Self {
        assert!(
            key.same_type(&export_as),
            "cannot export {key} as {export_as}: the value types differ"
        );
        ExportSpec::Key { key, export_as }
    }
}

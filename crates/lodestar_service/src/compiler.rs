//! Compilation of resolved entries into runtime accessors.

use std::sync::Arc;

use crate::entry::{Delegate, Entry, EntryId, InstantiationMode, Origin};
use crate::error::BuildError;
use crate::key::Key;
use crate::lazy::LazyCell;
use crate::runtime::{Accessor, Invoker, RuntimeEntry};

/// Turns entries into accessors, one per producing entry.
///
/// Accessors are memoized by entry id. Delegating entries reuse the
/// accessor of the entry they point at, so every scope that sees a value
/// shares its producer.
pub(crate) struct Compiler<'a> {
    entries: &'a [Entry],
    links: &'a [Vec<EntryId>],
    default_mode: InstantiationMode,
    compiled: Vec<Option<Arc<Accessor>>>,
}

impl<'a> Compiler<'a> {
    /// `links[i]` holds the resolved providers of `entries[i]`'s
    /// dependencies, in declaration order.
    pub(crate) fn new(
        entries: &'a [Entry],
        links: &'a [Vec<EntryId>],
        default_mode: InstantiationMode,
    ) -> Self {
        Self {
            entries,
            links,
            default_mode,
            compiled: vec![None; entries.len()],
        }
    }

    /// Compiles the entry registered under `key`.
    pub(crate) fn runtime_entry(&mut self, key: &Key, id: EntryId) -> Result<RuntimeEntry, BuildError> {
        let accessor = self.accessor(id)?;
        let description = self.description(id).map(Arc::from);
        Ok(RuntimeEntry::new(key.clone(), description, accessor))
    }

    /// Returns the accessor for `id`, compiling it and its dependencies first.
    ///
    /// The entry graph must be acyclic.
    pub(crate) fn accessor(&mut self, id: EntryId) -> Result<Arc<Accessor>, BuildError> {
        if let Some(accessor) = &self.compiled[id.0] {
            return Ok(Arc::clone(accessor));
        }

        let (entries, links) = (self.entries, self.links);
        let entry = &entries[id.0];
        let accessor = match entry.origin() {
            Origin::Instance(instance) => Arc::new(Accessor::Constant(instance.clone())),
            Origin::Delegate(Delegate::Entry(target)) => self.accessor(*target)?,
            Origin::Delegate(Delegate::Foreign(runtime)) => Arc::clone(runtime.accessor()),
            Origin::Factory(factory) => {
                let mut dependencies = Vec::with_capacity(entry.dependencies().len());
                for (dependency, &provider) in entry.dependencies().iter().zip(&links[id.0]) {
                    dependencies.push((dependency.clone(), self.accessor(provider)?));
                }
                let invoker = Invoker::new(entry.key().clone(), Arc::clone(factory), dependencies);

                let accessor = match entry.mode().unwrap_or(self.default_mode) {
                    InstantiationMode::Constant => {
                        let instance = invoker.invoke().map_err(|source| BuildError::Instantiation {
                            key: entry.key().clone(),
                            source,
                        })?;
                        Accessor::Constant(instance)
                    }
                    InstantiationMode::Lazy => {
                        Accessor::Lazy(LazyCell::new(entry.key().clone(), invoker))
                    }
                    InstantiationMode::Prototype => Accessor::Prototype(invoker),
                };
                tracing::trace!(key = %entry.key(), mode = %accessor.mode(), "compiled entry");
                Arc::new(accessor)
            }
        };

        self.compiled[id.0] = Some(Arc::clone(&accessor));
        Ok(accessor)
    }

    /// Follows delegates to the producer's description.
    fn description(&self, id: EntryId) -> Option<String> {
        let entry = &self.entries[id.0];
        if let Some(description) = entry.description() {
            return Some(description.to_string());
        }
        match entry.origin() {
            Origin::Delegate(Delegate::Entry(target)) => self.description(*target),
            Origin::Delegate(Delegate::Foreign(runtime)) => runtime.description().map(str::to_string),
            Origin::Instance(_) | Origin::Factory(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::IntoFactory;
    use crate::registry::ScopeId;
    use crate::service::Instance;

    #[test]
    fn delegates_share_the_producer_accessor() {
        let key = Key::of::<u32>();
        let mut producer = Entry::factory(
            key.clone(),
            IntoFactory::into_factory(|| 3u32),
            Vec::new(),
            ScopeId::ROOT,
        );
        producer.set_description("three".into());
        let entries = vec![
            producer,
            Entry::delegate(Key::qualified::<u32>("x"), Delegate::Entry(EntryId(0)), ScopeId(1)),
        ];
        let links = vec![Vec::new(), Vec::new()];
        let mut compiler = Compiler::new(&entries, &links, InstantiationMode::Lazy);

        let produced = compiler.runtime_entry(&key, EntryId(0)).unwrap();
        let delegated = compiler
            .runtime_entry(&Key::qualified::<u32>("x"), EntryId(1))
            .unwrap();
        assert!(produced.shares_accessor_with(&delegated));
        assert_eq!(delegated.mode(), InstantiationMode::Lazy);
        assert_eq!(delegated.description(), Some("three"));
    }

    #[test]
    fn constant_factories_run_eagerly() {
        let entries = vec![
            Entry::instance(Key::of::<u8>(), Instance::new(2u8), ScopeId::ROOT),
            {
                let mut entry = Entry::factory(
                    Key::of::<u16>(),
                    IntoFactory::into_factory(|v: Arc<u8>| u16::from(*v) * 10),
                    vec![Key::of::<u8>()],
                    ScopeId::ROOT,
                );
                entry.set_mode(InstantiationMode::Constant);
                entry
            },
        ];
        let links = vec![Vec::new(), vec![EntryId(0)]];
        let mut compiler = Compiler::new(&entries, &links, InstantiationMode::Lazy);

        let entry = compiler.runtime_entry(&Key::of::<u16>(), EntryId(1)).unwrap();
        assert_eq!(entry.mode(), InstantiationMode::Constant);
        assert_eq!(*entry.get::<u16>().unwrap(), 20);
    }

    #[test]
    fn eager_failure_is_a_build_error() {
        let mut entry = Entry::factory(
            Key::of::<u8>(),
            IntoFactory::into_factory(|| 1u16),
            Vec::new(),
            ScopeId::ROOT,
        );
        entry.set_mode(InstantiationMode::Constant);
        let entries = vec![entry];
        let links = vec![Vec::new()];
        let mut compiler = Compiler::new(&entries, &links, InstantiationMode::Lazy);

        assert!(matches!(
            compiler.accessor(EntryId(0)),
            Err(BuildError::Instantiation { .. })
        ));
    }
}

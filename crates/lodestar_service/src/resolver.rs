//! Resolution of declared entries into per-scope registries.
//!
//! The resolver runs every phase to completion and collects problems into
//! [`Diagnostics`] instead of stopping at the first one:
//!
//! 1. Order scopes so import sources are populated before importers
//! 2. Fill each scope's registry with its providers, then its imports
//! 3. Move exports outward, children before parents
//! 4. Match every dependency to a provider along the scope chain
//! 5. Reject dependency cycles
//!
//! Import and export entries always delegate to the producing entry.

use std::collections::VecDeque;

use indexmap::IndexMap;

use crate::assembly::ScopeData;
use crate::config::AssemblyConfig;
use crate::diagnostics::{Diagnostics, EntryDescriptor, ExportDescriptor};
use crate::entry::{Delegate, Entry, EntryId, Origin};
use crate::key::Key;
use crate::registry::{EntryRegistry, ScopeId};
use crate::transform::{ExportSpec, ImportSource};

/// The validated result of resolution.
pub(crate) struct Resolution {
    /// One registry per scope, indexed by [`ScopeId`].
    pub(crate) registries: Vec<EntryRegistry>,
    /// The root scope's exports.
    pub(crate) exports: EntryRegistry,
    /// Resolved providers of each entry's dependencies, indexed by [`EntryId`].
    pub(crate) links: Vec<Vec<EntryId>>,
}

/// Resolves every scope.
///
/// Import and export entries are appended to `entries`.
pub(crate) fn resolve(
    entries: &mut Vec<Entry>,
    scopes: &[ScopeData],
    config: &AssemblyConfig,
) -> Result<Resolution, Diagnostics> {
    let mut resolver = Resolver {
        entries,
        scopes,
        registries: scopes
            .iter()
            .enumerate()
            .map(|(index, scope)| EntryRegistry::new(ScopeId(index), scope.parent))
            .collect(),
        exports: EntryRegistry::new(ScopeId::ROOT, None),
        claimed: IndexMap::new(),
        diagnostics: Diagnostics::new(),
    };

    for scope in resolver.import_order() {
        resolver.populate(scope);
    }
    resolver.export(ScopeId::ROOT);
    let links = resolver.link();
    resolver.detect_cycles(&links);
    if !config.allow_shadowing {
        resolver.reject_shadowing();
    }

    let Resolver {
        registries,
        exports,
        diagnostics,
        ..
    } = resolver;

    if !diagnostics.is_empty() {
        tracing::warn!(
            problems = diagnostics.len(),
            duplicate_providers = diagnostics.duplicate_providers().len(),
            unresolved_requirements = diagnostics.unresolved_requirements().len(),
            duplicate_exports = diagnostics.duplicate_exports().len(),
            unresolved_exports = diagnostics.unresolved_keyed_exports().len(),
            dependency_cycles = diagnostics.dependency_cycles().len(),
            import_cycles = diagnostics.import_cycles().len(),
            "service resolution failed"
        );
        return Err(diagnostics);
    }

    Ok(Resolution {
        registries,
        exports,
        links,
    })
}

struct Resolver<'a> {
    entries: &'a mut Vec<Entry>,
    scopes: &'a [ScopeData],
    registries: Vec<EntryRegistry>,
    exports: EntryRegistry,
    /// Outward keys already claimed by an export, per destination scope.
    /// `None` is the application's public pool.
    claimed: IndexMap<(Option<ScopeId>, Key), (EntryId, ExportDescriptor)>,
    diagnostics: Diagnostics,
}

impl Resolver<'_> {
    // ─────────────────────────────────────────────────────────────────────────
    // Import ordering
    // ─────────────────────────────────────────────────────────────────────────

    /// Orders scopes so every import source comes before its importers.
    ///
    /// Scopes caught in an import cycle are recorded and appended in
    /// creation order, so the rest of the pass still runs.
    fn import_order(&mut self) -> Vec<ScopeId> {
        let n = self.scopes.len();
        let mut in_degree = vec![0usize; n];
        let mut importers: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, scope) in self.scopes.iter().enumerate() {
            for import in &scope.imports {
                if let ImportSource::Scope(source) = import.spec.source() {
                    // source must be populated before i
                    importers[source.0].push(i);
                    in_degree[i] += 1;
                }
            }
        }

        // Kahn's algorithm for topological sort
        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut sorted: Vec<ScopeId> = Vec::with_capacity(n);

        while let Some(idx) = queue.pop_front() {
            sorted.push(ScopeId(idx));
            for &importer in &importers[idx] {
                in_degree[importer] -= 1;
                if in_degree[importer] == 0 {
                    queue.push_back(importer);
                }
            }
        }

        if sorted.len() != n {
            let stuck: Vec<usize> = (0..n).filter(|&i| in_degree[i] > 0).collect();
            let cycles = find_cycles(n, |i| {
                if in_degree[i] == 0 {
                    return Vec::new();
                }
                self.scopes[i]
                    .imports
                    .iter()
                    .filter_map(|import| match import.spec.source() {
                        ImportSource::Scope(source) if in_degree[source.0] > 0 => Some(source.0),
                        _ => None,
                    })
                    .collect()
            });
            for cycle in cycles {
                self.diagnostics.record_import_cycle(
                    cycle
                        .into_iter()
                        .map(|i| self.scopes[i].name.clone())
                        .collect(),
                );
            }
            sorted.extend(stuck.into_iter().map(ScopeId));
        }

        sorted
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Providers and imports
    // ─────────────────────────────────────────────────────────────────────────

    fn populate(&mut self, scope: ScopeId) {
        let scopes = self.scopes;
        let data = &scopes[scope.0];

        for &id in &data.declared {
            let key = self.entries[id.0].key().clone();
            self.register(scope, key, id);
        }

        for import in &data.imports {
            let candidates: Vec<(Key, Delegate)> = match import.spec.source() {
                ImportSource::Scope(source) => self.registries[source.0]
                    .iter()
                    .map(|(key, id)| (key.clone(), self.delegate_to(id)))
                    .collect(),
                ImportSource::Pool(pool) => pool
                    .visible_entries()
                    .into_iter()
                    .map(|entry| (entry.key().clone(), Delegate::Foreign(entry)))
                    .collect(),
            };
            let label = match import.spec.source() {
                ImportSource::Scope(source) => format!("import from `{}`", self.scopes[source.0].name),
                ImportSource::Pool(pool) => format!("import from pool `{}`", pool.name()),
            };

            for (key, delegate) in candidates {
                let Some(visible) = import.spec.apply(&key) else {
                    continue;
                };
                let mut entry = Entry::delegate(key, delegate, scope);
                entry.rebind(visible.clone());
                entry.set_source(Some(
                    import.source.clone().unwrap_or_else(|| label.clone()),
                ));
                let id = self.push(entry);
                self.register(scope, visible, id);
            }
        }

        tracing::debug!(
            scope = %data.name,
            entries = self.registries[scope.0].len(),
            "resolved scope"
        );
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Exports
    // ─────────────────────────────────────────────────────────────────────────

    /// Processes exports of `scope`'s subtree, children first.
    fn export(&mut self, scope: ScopeId) {
        let scopes = self.scopes;
        let data = &scopes[scope.0];
        for &child in &data.children {
            self.export(child);
        }

        let mut candidates: Vec<(Key, Key, EntryId)> = Vec::new();
        for spec in &data.exports {
            match spec {
                ExportSpec::Key { key, export_as } => match self.registries[scope.0].get(key) {
                    Some(id) => candidates.push((key.clone(), export_as.clone(), id)),
                    None => self.diagnostics.record_unresolved_keyed_export(ExportDescriptor {
                        key: key.clone(),
                        export_as: export_as.clone(),
                        scope: data.name.clone(),
                        target: None,
                    }),
                },
                ExportSpec::All => candidates.extend(
                    self.registries[scope.0]
                        .iter()
                        .map(|(key, id)| (key.clone(), key.clone(), id)),
                ),
            }
        }

        for (key, export_as, id) in candidates {
            let descriptor = ExportDescriptor {
                key,
                export_as: export_as.clone(),
                scope: data.name.clone(),
                target: Some(self.producer(id)),
            };
            let claim = (data.parent, export_as.clone());
            if let Some((claimed, existing)) = self.claimed.get(&claim) {
                if !self.same_producer(*claimed, id) {
                    let existing = existing.clone();
                    self.diagnostics
                        .record_duplicate_export(export_as, existing, descriptor);
                }
                continue;
            }
            self.claimed.insert(claim, (id, descriptor));

            // Re-exporting what the parent already holds adds nothing.
            if let Some(parent) = data.parent
                && let Some(existing) = self.registries[parent.0].get(&export_as)
                && self.same_producer(existing, id)
            {
                continue;
            }

            let delegate = self.delegate_to(id);
            let destination = data.parent.unwrap_or(scope);
            let mut entry = Entry::delegate(export_as.clone(), delegate, destination);
            entry.set_source(Some(format!("export from `{}`", data.name)));
            let exported = self.push(entry);

            match data.parent {
                Some(parent) => self.register(parent, export_as, exported),
                None => {
                    if let Err(duplicate) = self.exports.put(export_as, exported) {
                        self.record_duplicate(duplicate.key, duplicate.existing, duplicate.rejected);
                    }
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Dependencies
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolves every factory dependency along the declaring scope's chain.
    fn link(&mut self) -> Vec<Vec<EntryId>> {
        let mut links = vec![Vec::new(); self.entries.len()];

        for (index, entry) in self.entries.iter().enumerate() {
            if !matches!(entry.origin(), Origin::Factory(_)) {
                continue;
            }
            let registry = &self.registries[entry.scope().0];
            for dependency in entry.dependencies() {
                match registry.get_recursive(dependency, &self.registries) {
                    Some(provider) => {
                        tracing::trace!(
                            key = %entry.key(),
                            dependency = %dependency,
                            provider = %provider,
                            "resolved dependency"
                        );
                        links[index].push(provider);
                    }
                    None => {
                        let required_by = EntryDescriptor::of(
                            EntryId(index),
                            entry,
                            &self.scopes[entry.scope().0].name,
                        );
                        self.diagnostics
                            .record_unresolved_requirement(dependency.clone(), required_by);
                    }
                }
            }
        }

        links
    }

    /// Records every cycle in the producer graph.
    fn detect_cycles(&mut self, links: &[Vec<EntryId>]) {
        let cycles = find_cycles(self.entries.len(), |index| {
            links[index]
                .iter()
                .map(|&provider| self.producer(provider))
                .filter(|producer| {
                    matches!(self.entries[producer.0].origin(), Origin::Factory(_))
                })
                .map(|producer| producer.0)
                .collect()
        });

        for cycle in cycles {
            let keys = cycle
                .into_iter()
                .map(|index| self.entries[index].key().clone())
                .collect();
            self.diagnostics.record_dependency_cycle(keys);
        }
    }

    /// Records local keys that hide a different provider in an ancestor.
    fn reject_shadowing(&mut self) {
        let mut shadowed: Vec<(Key, EntryId, EntryId)> = Vec::new();
        for registry in &self.registries {
            let Some(parent) = registry.parent() else {
                continue;
            };
            for (key, id) in registry.iter() {
                let Some(hidden) = self.registries[parent.0].get_recursive(key, &self.registries)
                else {
                    continue;
                };
                if !self.same_producer(hidden, id) {
                    shadowed.push((key.clone(), hidden, id));
                }
            }
        }
        for (key, hidden, id) in shadowed {
            self.record_duplicate(key, hidden, id);
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    fn push(&mut self, entry: Entry) -> EntryId {
        let id = EntryId(self.entries.len());
        self.entries.push(entry);
        id
    }

    fn register(&mut self, scope: ScopeId, key: Key, id: EntryId) {
        if let Err(duplicate) = self.registries[scope.0].put(key, id) {
            self.record_duplicate(duplicate.key, duplicate.existing, duplicate.rejected);
        }
    }

    fn record_duplicate(&mut self, key: Key, existing: EntryId, rejected: EntryId) {
        let existing = self.describe(existing);
        let rejected = self.describe(rejected);
        self.diagnostics
            .record_duplicate_provider(key, existing, rejected);
    }

    fn describe(&self, id: EntryId) -> EntryDescriptor {
        let entry = &self.entries[id.0];
        EntryDescriptor::of(id, entry, &self.scopes[entry.scope().0].name)
    }

    /// Follows a delegate to the entry that produces the value.
    fn producer(&self, id: EntryId) -> EntryId {
        match self.entries[id.0].origin() {
            Origin::Delegate(Delegate::Entry(target)) => *target,
            _ => id,
        }
    }

    fn same_producer(&self, a: EntryId, b: EntryId) -> bool {
        let (a, b) = (self.producer(a), self.producer(b));
        if a == b {
            return true;
        }
        match (self.entries[a.0].origin(), self.entries[b.0].origin()) {
            (
                Origin::Delegate(Delegate::Foreign(left)),
                Origin::Delegate(Delegate::Foreign(right)),
            ) => left.shares_accessor_with(right),
            _ => false,
        }
    }

    /// Returns a delegate pointing at the producer behind `id`.
    fn delegate_to(&self, id: EntryId) -> Delegate {
        match self.entries[id.0].origin() {
            Origin::Delegate(delegate) => delegate.clone(),
            Origin::Instance(_) | Origin::Factory(_) => Delegate::Entry(id),
        }
    }
}

/// Finds the cycles of a directed graph given as a successor function.
///
/// Each cycle is reported once per back edge found by the depth-first
/// search, as the nodes along it in edge order.
fn find_cycles<F>(n: usize, successors: F) -> Vec<Vec<usize>>
where
    F: Fn(usize) -> Vec<usize>,
{
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    let mut marks = vec![Mark::New; n];
    let mut cycles = Vec::new();

    for start in 0..n {
        if marks[start] != Mark::New {
            continue;
        }
        // (node, successors, next successor to visit)
        let mut stack: Vec<(usize, Vec<usize>, usize)> = vec![(start, successors(start), 0)];
        marks[start] = Mark::Active;

        while let Some((node, next, cursor)) = stack.last_mut() {
            let Some(&succ) = next.get(*cursor) else {
                marks[*node] = Mark::Done;
                stack.pop();
                continue;
            };
            *cursor += 1;

            match marks[succ] {
                Mark::New => {
                    marks[succ] = Mark::Active;
                    stack.push((succ, successors(succ), 0));
                }
                Mark::Active => {
                    let from = stack
                        .iter()
                        .position(|(visited, _, _)| *visited == succ)
                        .unwrap_or(0);
                    cycles.push(stack[from..].iter().map(|(visited, _, _)| *visited).collect());
                }
                Mark::Done => {}
            }
        }
    }

    cycles
}

//! Collected configuration and resolution problems.
//!
//! The resolver never stops at the first problem. Everything it finds is
//! recorded in a [`Diagnostics`] value, which renders as a multi-line report
//! naming each offending key and every entry involved.

use core::fmt;

use indexmap::IndexMap;

use crate::entry::{Entry, EntryId, OriginKind};
use crate::key::Key;

// ─────────────────────────────────────────────────────────────────────────────
// Descriptors
// ─────────────────────────────────────────────────────────────────────────────

/// A snapshot of an [`Entry`] for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescriptor {
    /// The entry id.
    pub id: EntryId,
    /// The key the entry provides.
    pub key: Key,
    /// Where the value comes from.
    pub origin: OriginKind,
    /// Path name of the declaring scope, e.g. `app/storage`.
    pub scope: String,
    /// The declaring bundle, import or export.
    pub source: Option<String>,
    /// The entry's description.
    pub description: Option<String>,
}

impl EntryDescriptor {
    pub(crate) fn of(id: EntryId, entry: &Entry, scope: &str) -> Self {
        Self {
            id,
            key: entry.key().clone(),
            origin: entry.origin().kind(),
            scope: scope.to_string(),
            source: entry.source().map(str::to_string),
            description: entry.description().map(str::to_string),
        }
    }
}

impl fmt::Display for EntryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({}) in `{}`", self.origin, self.id, self.key, self.scope)?;
        if let Some(source) = &self.source {
            write!(f, " declared by `{source}`")?;
        }
        if let Some(description) = &self.description {
            write!(f, ": {description}")?;
        }
        Ok(())
    }
}

/// A dependency that no visible provider satisfies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedRequirement {
    /// The missing key.
    pub key: Key,
    /// The entry that needs it.
    pub required_by: EntryDescriptor,
}

/// One export declaration, for reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportDescriptor {
    /// The key looked up in the exporting scope.
    pub key: Key,
    /// The key the value is made visible under in the parent.
    pub export_as: Key,
    /// Path name of the exporting scope.
    pub scope: String,
    /// The entry the export resolved to, if it resolved.
    pub target: Option<EntryId>,
}

impl fmt::Display for ExportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.key == self.export_as {
            write!(f, "export of {} from `{}`", self.key, self.scope)?;
        } else {
            write!(
                f,
                "export of {} as {} from `{}`",
                self.key, self.export_as, self.scope
            )?;
        }
        if let Some(target) = self.target {
            write!(f, " (entry {target})")?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Diagnostics
// ─────────────────────────────────────────────────────────────────────────────

/// Every problem found while resolving an assembly.
///
/// A build succeeds only if this record is empty.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    duplicate_providers: IndexMap<Key, Vec<EntryDescriptor>>,
    unresolved_requirements: Vec<UnresolvedRequirement>,
    duplicate_exports: IndexMap<Key, Vec<ExportDescriptor>>,
    unresolved_keyed_exports: IndexMap<Key, Vec<ExportDescriptor>>,
    dependency_cycles: Vec<Vec<Key>>,
    import_cycles: Vec<Vec<String>>,
}

impl Diagnostics {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys provided more than once in one scope, with every entry involved.
    #[must_use]
    pub fn duplicate_providers(&self) -> &IndexMap<Key, Vec<EntryDescriptor>> {
        &self.duplicate_providers
    }

    /// Dependencies no visible provider satisfies.
    #[must_use]
    pub fn unresolved_requirements(&self) -> &[UnresolvedRequirement] {
        &self.unresolved_requirements
    }

    /// Returns the distinct unresolved keys in discovery order.
    #[must_use]
    pub fn unresolved_keys(&self) -> Vec<Key> {
        let mut keys: Vec<Key> = Vec::new();
        for requirement in &self.unresolved_requirements {
            if !keys.contains(&requirement.key) {
                keys.push(requirement.key.clone());
            }
        }
        keys
    }

    /// Outward keys claimed by more than one export of the same scope.
    #[must_use]
    pub fn duplicate_exports(&self) -> &IndexMap<Key, Vec<ExportDescriptor>> {
        &self.duplicate_exports
    }

    /// Keyed exports that name a key the scope does not have.
    #[must_use]
    pub fn unresolved_keyed_exports(&self) -> &IndexMap<Key, Vec<ExportDescriptor>> {
        &self.unresolved_keyed_exports
    }

    /// Dependency cycles between entries, each as the keys around the loop.
    #[must_use]
    pub fn dependency_cycles(&self) -> &[Vec<Key>] {
        &self.dependency_cycles
    }

    /// Cycles between scope imports, each as the scope names around the loop.
    #[must_use]
    pub fn import_cycles(&self) -> &[Vec<String>] {
        &self.import_cycles
    }

    /// Returns `true` if no problem was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of recorded problems.
    ///
    /// Each duplicated key counts once, however many entries collide on it.
    #[must_use]
    pub fn len(&self) -> usize {
        self.duplicate_providers.len()
            + self.unresolved_requirements.len()
            + self.duplicate_exports.len()
            + self
                .unresolved_keyed_exports
                .values()
                .map(Vec::len)
                .sum::<usize>()
            + self.dependency_cycles.len()
            + self.import_cycles.len()
    }

    pub(crate) fn record_duplicate_provider(
        &mut self,
        key: Key,
        existing: EntryDescriptor,
        rejected: EntryDescriptor,
    ) {
        let entries = self.duplicate_providers.entry(key).or_default();
        for descriptor in [existing, rejected] {
            if !entries.iter().any(|seen| seen.id == descriptor.id) {
                entries.push(descriptor);
            }
        }
    }

    pub(crate) fn record_unresolved_requirement(&mut self, key: Key, required_by: EntryDescriptor) {
        self.unresolved_requirements
            .push(UnresolvedRequirement { key, required_by });
    }

    pub(crate) fn record_duplicate_export(
        &mut self,
        key: Key,
        existing: ExportDescriptor,
        rejected: ExportDescriptor,
    ) {
        let exports = self.duplicate_exports.entry(key).or_default();
        for descriptor in [existing, rejected] {
            if !exports.contains(&descriptor) {
                exports.push(descriptor);
            }
        }
    }

    pub(crate) fn record_unresolved_keyed_export(&mut self, descriptor: ExportDescriptor) {
        self.unresolved_keyed_exports
            .entry(descriptor.key.clone())
            .or_default()
            .push(descriptor);
    }

    /// Records a cycle unless a rotation of it is already known.
    pub(crate) fn record_dependency_cycle(&mut self, cycle: Vec<Key>) {
        let cycle = rotate_to_min(cycle, |key| key.to_string());
        if !self.dependency_cycles.contains(&cycle) {
            self.dependency_cycles.push(cycle);
        }
    }

    pub(crate) fn record_import_cycle(&mut self, cycle: Vec<String>) {
        let cycle = rotate_to_min(cycle, Clone::clone);
        if !self.import_cycles.contains(&cycle) {
            self.import_cycles.push(cycle);
        }
    }
}

/// Rotates a cycle so it starts at its smallest element.
fn rotate_to_min<T, F>(mut cycle: Vec<T>, sort_key: F) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    let start = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, item)| sort_key(item))
        .map_or(0, |(index, _)| index);
    cycle.rotate_left(start);
    cycle
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("no problems");
        }

        if !self.duplicate_providers.is_empty() {
            writeln!(f, "duplicate providers:")?;
            for (key, entries) in &self.duplicate_providers {
                writeln!(f, "  {key} is provided by {} entries:", entries.len())?;
                for entry in entries {
                    writeln!(f, "    - {entry}")?;
                }
            }
        }

        if !self.unresolved_requirements.is_empty() {
            writeln!(f, "unresolved requirements:")?;
            for requirement in &self.unresolved_requirements {
                writeln!(
                    f,
                    "  {} required by {}",
                    requirement.key, requirement.required_by
                )?;
            }
        }

        if !self.duplicate_exports.is_empty() {
            writeln!(f, "duplicate exports:")?;
            for (key, exports) in &self.duplicate_exports {
                writeln!(f, "  {key} is exported {} times:", exports.len())?;
                for export in exports {
                    writeln!(f, "    - {export}")?;
                }
            }
        }

        if !self.unresolved_keyed_exports.is_empty() {
            writeln!(f, "unresolved exports:")?;
            for exports in self.unresolved_keyed_exports.values() {
                for export in exports {
                    writeln!(f, "  {export}: no such key in scope")?;
                }
            }
        }

        if !self.dependency_cycles.is_empty() {
            writeln!(f, "dependency cycles:")?;
            for cycle in &self.dependency_cycles {
                let path: Vec<String> = cycle.iter().map(ToString::to_string).collect();
                let first = path.first().cloned().unwrap_or_default();
                writeln!(f, "  {} -> {first}", path.join(" -> "))?;
            }
        }

        if !self.import_cycles.is_empty() {
            writeln!(f, "import cycles:")?;
            for cycle in &self.import_cycles {
                let first = cycle.first().cloned().unwrap_or_default();
                writeln!(f, "  {} -> {first}", cycle.join(" -> "))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::registry::ScopeId;
    use crate::service::Instance;

    fn descriptor(id: usize, value: i32) -> EntryDescriptor {
        let mut entry = Entry::instance(Key::of::<i32>(), Instance::new(value), ScopeId::ROOT);
        entry.set_source(Some(format!("Bundle{id}")));
        EntryDescriptor::of(EntryId(id), &entry, "app")
    }

    #[test]
    fn empty_record() {
        let diagnostics = Diagnostics::new();
        assert!(diagnostics.is_empty());
        assert_eq!(diagnostics.len(), 0);
        assert_eq!(diagnostics.to_string(), "no problems");
    }

    #[test]
    fn duplicate_providers_have_set_semantics() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.record_duplicate_provider(Key::of::<i32>(), descriptor(0, 1), descriptor(1, 2));
        diagnostics.record_duplicate_provider(Key::of::<i32>(), descriptor(0, 1), descriptor(2, 3));

        let entries = &diagnostics.duplicate_providers()[&Key::of::<i32>()];
        let ids: Vec<_> = entries.iter().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![EntryId(0), EntryId(1), EntryId(2)]);
        assert_eq!(diagnostics.len(), 1);
    }

    #[test]
    fn unresolved_keys_are_distinct() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.record_unresolved_requirement(Key::of::<u8>(), descriptor(0, 1));
        diagnostics.record_unresolved_requirement(Key::of::<u8>(), descriptor(1, 2));
        diagnostics.record_unresolved_requirement(Key::of::<u16>(), descriptor(1, 2));

        assert_eq!(diagnostics.unresolved_requirements().len(), 3);
        assert_eq!(diagnostics.unresolved_keys(), vec![Key::of::<u8>(), Key::of::<u16>()]);
    }

    #[test]
    fn cycles_are_recorded_once_per_rotation() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.record_dependency_cycle(vec![Key::of::<u8>(), Key::of::<u16>()]);
        diagnostics.record_dependency_cycle(vec![Key::of::<u16>(), Key::of::<u8>()]);
        assert_eq!(diagnostics.dependency_cycles().len(), 1);

        diagnostics.record_import_cycle(vec!["app/b".into(), "app/a".into()]);
        diagnostics.record_import_cycle(vec!["app/a".into(), "app/b".into()]);
        assert_eq!(diagnostics.import_cycles(), &[vec!["app/a".to_string(), "app/b".to_string()]]);
    }

    #[test]
    fn report_names_every_entry() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.record_duplicate_provider(Key::of::<i32>(), descriptor(0, 1), descriptor(1, 2));
        diagnostics.record_unresolved_keyed_export(ExportDescriptor {
            key: Key::qualified::<String>("missing"),
            export_as: Key::qualified::<String>("missing"),
            scope: "app/child".into(),
            target: None,
        });

        let report = diagnostics.to_string();
        assert!(report.contains("duplicate providers:"));
        assert!(report.contains("i32 is provided by 2 entries"));
        assert!(report.contains("declared by `Bundle0`"));
        assert!(report.contains("declared by `Bundle1`"));
        assert!(report.contains("export of alloc::string::String@missing from `app/child`"));
        assert_eq!(diagnostics.len(), 2);
    }
}

//! Tests for resolution and validation.
//!
//! These tests verify the problems `Assembly::build()` collects:
//! - Duplicate providers within one scope
//! - Unresolved requirements
//! - Dependency and import cycles
//! - Shadowing rules across the scope chain
//! - Report rendering

use std::sync::Arc;

use lodestar_service::prelude::*;

// ─────────────────────────────────────────────────────────────────────────────
// Test Services
// ─────────────────────────────────────────────────────────────────────────────

struct Database {
    url: String,
}

struct Repository {
    db: Arc<Database>,
}

struct OrderService {
    repo: Arc<Repository>,
}

struct Ping;
struct Pong;

struct FirstNumbers;

impl Bundle for FirstNumbers {
    fn configure(&self, scope: &mut ScopeConfigurer<'_>) {
        scope.provide_instance(1i32);
    }
}

struct SecondNumbers;

impl Bundle for SecondNumbers {
    fn configure(&self, scope: &mut ScopeConfigurer<'_>) {
        scope.provide_instance(2i32);
    }
}

fn invalid(assembly: Assembly) -> Diagnostics {
    match assembly.build() {
        Err(BuildError::Invalid(diagnostics)) => diagnostics,
        Err(other) => panic!("expected invalid configuration, got {other}"),
        Ok(_) => panic!("expected the build to fail"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Successful Resolution
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn dependencies_resolve_through_the_scope_chain() {
    let mut assembly = Assembly::new();
    let root = assembly.root();
    assembly.configure(root).provide_instance(Database {
        url: "postgres://primary".into(),
    });

    let storage = assembly.add_scope("storage", root);
    assembly
        .configure(storage)
        .provide(|db: Arc<Database>| Repository { db });

    let api = assembly.add_scope("api", storage);
    assembly
        .configure(api)
        .provide(|repo: Arc<Repository>| OrderService { repo });

    let app = assembly.build().unwrap();
    let service = app.scope(api).unwrap().get::<OrderService>().unwrap();
    assert_eq!(service.repo.db.url, "postgres://primary");

    // Nothing leaks upward without an export.
    assert!(!app.root().contains(&Key::of::<Repository>()));
    assert!(app.scope_named("app/storage/api").is_some());
}

#[test]
fn qualified_keys_do_not_collide() {
    let mut assembly = Assembly::new();
    {
        let mut scope = assembly.configure(assembly.root());
        scope.provide_instance(String::from("plain"));
        scope.provide_instance_as(Key::qualified::<String>("primary"), String::from("primary"));
        scope.provide_instance_as(Key::qualified::<String>("replica"), String::from("replica"));
    }

    let app = assembly.build().unwrap();
    let root = app.root();
    assert_eq!(*root.get::<String>().unwrap(), "plain");
    assert_eq!(*root.get_qualified::<String>("primary").unwrap(), "primary");
    assert_eq!(*root.get_qualified::<String>("replica").unwrap(), "replica");
    assert_eq!(root.services().len(), 3);
}

#[test]
fn child_provider_shadows_parent_by_default() {
    let mut assembly = Assembly::new();
    let root = assembly.root();
    assembly.configure(root).provide_instance(1u32);
    let child = assembly.add_scope("child", root);
    assembly.configure(child).provide_instance(2u32);

    let app = assembly.build().unwrap();
    assert_eq!(*app.root().get::<u32>().unwrap(), 1);
    assert_eq!(*app.scope(child).unwrap().get::<u32>().unwrap(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Duplicate Providers
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn sibling_providers_for_the_same_key_fail_the_build() {
    let mut assembly = Assembly::new();
    let root = assembly.root();
    assembly.install(root, FirstNumbers);
    assembly.install(root, SecondNumbers);

    let diagnostics = invalid(assembly);
    let entries = &diagnostics.duplicate_providers()[&Key::of::<i32>()];
    assert_eq!(entries.len(), 2);

    let sources: Vec<_> = entries.iter().filter_map(|entry| entry.source.as_deref()).collect();
    assert!(sources[0].ends_with("FirstNumbers"));
    assert!(sources[1].ends_with("SecondNumbers"));
    assert_eq!(diagnostics.len(), 1);
}

#[test]
fn every_colliding_entry_is_listed_once() {
    let mut assembly = Assembly::new();
    {
        let mut scope = assembly.configure(assembly.root());
        scope.provide_instance(1i32);
        scope.provide_instance(2i32);
        scope.provide(|| 3i32);
    }

    let diagnostics = invalid(assembly);
    let entries = &diagnostics.duplicate_providers()[&Key::of::<i32>()];
    let origins: Vec<_> = entries.iter().map(|entry| entry.origin).collect();
    assert_eq!(
        origins,
        vec![OriginKind::Instance, OriginKind::Instance, OriginKind::Factory]
    );
}

#[test]
fn shadowing_can_be_forbidden() {
    let mut assembly = Assembly::with_config(AssemblyConfig::default().with_shadowing(false));
    let root = assembly.root();
    assembly.configure(root).provide_instance(1u32);
    let child = assembly.add_scope("child", root);
    assembly.configure(child).provide_instance(2u32);

    let diagnostics = invalid(assembly);
    let entries = &diagnostics.duplicate_providers()[&Key::of::<u32>()];
    let scopes: Vec<_> = entries.iter().map(|entry| entry.scope.as_str()).collect();
    assert_eq!(scopes, vec!["app", "app/child"]);
}

#[test]
fn reimporting_a_parent_entry_is_not_shadowing() {
    let mut assembly = Assembly::with_config(AssemblyConfig::default().with_shadowing(false));
    let root = assembly.root();
    assembly.configure(root).provide_instance(1u32);
    let child = assembly.add_scope("child", root);
    assembly.configure(child).import(ImportSpec::from_scope(root));

    let app = assembly.build().unwrap();
    let child_entry = app.scope(child).unwrap().entry(&Key::of::<u32>()).unwrap();
    let root_entry = app.root().entry(&Key::of::<u32>()).unwrap();
    assert!(child_entry.shares_accessor_with(root_entry));
}

// ─────────────────────────────────────────────────────────────────────────────
// Unresolved Requirements
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn missing_dependency_is_reported_with_its_consumer() {
    let mut assembly = Assembly::new();
    assembly
        .configure(assembly.root())
        .provide(|db: Arc<Database>| Repository { db })
        .describe("order repository");

    let diagnostics = invalid(assembly);
    assert_eq!(diagnostics.unresolved_keys(), vec![Key::of::<Database>()]);

    let requirement = &diagnostics.unresolved_requirements()[0];
    assert_eq!(requirement.required_by.key, Key::of::<Repository>());
    assert_eq!(requirement.required_by.description.as_deref(), Some("order repository"));
}

#[test]
fn parent_cannot_see_child_providers() {
    let mut assembly = Assembly::new();
    let root = assembly.root();
    assembly
        .configure(root)
        .provide(|db: Arc<Database>| Repository { db });
    let child = assembly.add_scope("child", root);
    assembly.configure(child).provide_instance(Database { url: "x".into() });

    let diagnostics = invalid(assembly);
    assert_eq!(diagnostics.unresolved_keys(), vec![Key::of::<Database>()]);
}

#[test]
fn all_problems_are_reported_together() {
    let mut assembly = Assembly::new();
    let root = assembly.root();
    assembly.install(root, FirstNumbers);
    assembly.install(root, SecondNumbers);
    assembly
        .configure(root)
        .provide(|repo: Arc<Repository>| OrderService { repo });
    let child = assembly.add_scope("child", root);
    assembly
        .configure(child)
        .export(Key::qualified::<String>("missing"));

    let diagnostics = invalid(assembly);
    assert_eq!(diagnostics.duplicate_providers().len(), 1);
    assert_eq!(diagnostics.unresolved_requirements().len(), 1);
    assert_eq!(diagnostics.unresolved_keyed_exports().len(), 1);
    assert_eq!(diagnostics.len(), 3);
}

// ─────────────────────────────────────────────────────────────────────────────
// Cycles
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn dependency_cycle_is_rejected_with_its_path() {
    let mut assembly = Assembly::new();
    {
        let mut scope = assembly.configure(assembly.root());
        scope.provide(|_pong: Arc<Pong>| Ping);
        scope.provide(|_ping: Arc<Ping>| Pong);
    }

    let diagnostics = invalid(assembly);
    assert_eq!(diagnostics.dependency_cycles().len(), 1);

    let cycle = &diagnostics.dependency_cycles()[0];
    assert_eq!(cycle.len(), 2);
    assert!(cycle.contains(&Key::of::<Ping>()));
    assert!(cycle.contains(&Key::of::<Pong>()));
}

#[test]
fn self_dependency_is_a_cycle() {
    let mut assembly = Assembly::new();
    let root = assembly.root();
    assembly.configure(root).provide_instance(1u64);
    let child = assembly.add_scope("child", root);
    // The child's own u64 hides the parent's, so the factory needs itself.
    assembly.configure(child).provide(|previous: Arc<u64>| *previous + 1);

    let diagnostics = invalid(assembly);
    assert_eq!(diagnostics.dependency_cycles(), &[vec![Key::of::<u64>()]]);
}

#[test]
fn cycle_through_an_export_is_detected() {
    let mut assembly = Assembly::new();
    let root = assembly.root();
    assembly.configure(root).provide(|_pong: Arc<Pong>| Ping);

    let child = assembly.add_scope("child", root);
    {
        let mut scope = assembly.configure(child);
        scope.provide(|_ping: Arc<Ping>| Pong);
        scope.export(Key::of::<Pong>());
    }

    let diagnostics = invalid(assembly);
    assert_eq!(diagnostics.dependency_cycles().len(), 1);
}

#[test]
fn import_cycle_is_reported_by_scope_name() {
    let mut assembly = Assembly::new();
    let root = assembly.root();
    let left = assembly.add_scope("left", root);
    let right = assembly.add_scope("right", root);
    assembly.configure(left).import(ImportSpec::from_scope(right));
    assembly.configure(right).import(ImportSpec::from_scope(left));

    let diagnostics = invalid(assembly);
    assert_eq!(
        diagnostics.import_cycles(),
        &[vec!["app/left".to_string(), "app/right".to_string()]]
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Reporting
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn build_error_renders_every_problem() {
    let mut assembly = Assembly::new();
    let root = assembly.root();
    assembly.install(root, FirstNumbers);
    assembly.install(root, SecondNumbers);
    assembly
        .configure(root)
        .provide(|db: Arc<Database>| Repository { db });

    let err = match assembly.build() {
        Err(err) => err,
        Ok(_) => panic!("expected the build to fail"),
    };
    let report = err.to_string();
    assert!(report.starts_with("service configuration is invalid (2 problem(s))"));
    assert!(report.contains("duplicate providers:"));
    assert!(report.contains("FirstNumbers"));
    assert!(report.contains("SecondNumbers"));
    assert!(report.contains("unresolved requirements:"));
    assert!(report.contains("Database required by factory"));
    assert!(err.diagnostics().is_some());
}

//! Property tests for resolution and import transforms.
//!
//! The `prop_tests` module uses `proptest` to generate:
//! - Random provider sets, checking that a build fails exactly when a key
//!   is provided twice in one scope
//! - Random import operation chains, checked against a direct model of
//!   sequential key rewriting
//! - Random dependency DAGs, checking that every value is computed from its
//!   resolved dependencies and that closing a chain into a loop is reported

use lodestar_service::prelude::*;

const QUALIFIERS: [&str; 4] = ["a", "b", "c", "d"];

fn tagged(index: usize) -> Key {
    Key::qualified::<String>(QUALIFIERS[index])
}

fn node(index: usize) -> Key {
    Key::qualified::<u64>(format!("n{index}"))
}

/// One generated import operation, over indices into `QUALIFIERS`.
#[derive(Debug, Clone)]
enum Op {
    Exclude(usize),
    Retain(Vec<usize>),
    Reject(usize),
    Rebind(usize, usize),
}

impl Op {
    fn push(&self, spec: ImportSpec) -> ImportSpec {
        match self {
            Op::Exclude(k) => spec.exclude(tagged(*k)),
            Op::Retain(ks) => spec.retain(ks.iter().map(|k| tagged(*k))),
            Op::Reject(k) => {
                let rejected = tagged(*k);
                spec.filter(move |key| *key != rejected)
            }
            Op::Rebind(from, to) => spec.rebind(tagged(*from), tagged(*to)),
        }
    }

    fn model(&self, current: usize) -> Option<usize> {
        match self {
            Op::Exclude(k) | Op::Reject(k) => (current != *k).then_some(current),
            Op::Retain(ks) => ks.contains(&current).then_some(current),
            Op::Rebind(from, to) => Some(if current == *from { *to } else { current }),
        }
    }
}

/// Adds a `u64` node per entry of `deps`, each worth one plus the sum of
/// its dependencies.
fn declare_nodes(scope: &mut ScopeConfigurer<'_>, deps: &[Vec<usize>]) {
    for (index, targets) in deps.iter().enumerate() {
        let keys: Vec<Key> = targets.iter().map(|&target| node(target)).collect();
        let count = keys.len();
        scope.provide_with(
            node(index),
            keys,
            factory_fn(move |deps| {
                let mut total = 1u64;
                for position in 0..count {
                    total += *deps.get::<u64>(position)?;
                }
                Ok::<_, ConstructionError>(total)
            }),
        );
    }
}

mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize).prop_map(Op::Exclude),
            prop::collection::vec(0..4usize, 0..=4usize).prop_map(Op::Retain),
            (0..4usize).prop_map(Op::Reject),
            (0..4usize, 0..4usize).prop_map(|(from, to)| Op::Rebind(from, to)),
        ]
    }

    /// For node `i`, a subset of the nodes before it.
    fn arb_dag() -> impl Strategy<Value = Vec<Vec<usize>>> {
        (1..8usize).prop_flat_map(|n| {
            (0..n)
                .map(|i| {
                    prop::collection::vec(any::<bool>(), i).prop_map(|picks| {
                        picks
                            .into_iter()
                            .enumerate()
                            .filter_map(|(j, picked)| picked.then_some(j))
                            .collect::<Vec<_>>()
                    })
                })
                .collect::<Vec<_>>()
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn duplicates_reported_iff_a_key_repeats(picks in prop::collection::vec(0..4usize, 0..8)) {
            let mut assembly = Assembly::new();
            {
                let mut scope = assembly.configure(assembly.root());
                for &pick in &picks {
                    scope.provide_instance_as(tagged(pick), QUALIFIERS[pick].to_string());
                }
            }

            let mut counts = [0usize; 4];
            for &pick in &picks {
                counts[pick] += 1;
            }

            match assembly.build() {
                Ok(app) => {
                    prop_assert!(counts.iter().all(|&count| count <= 1));
                    for (index, &count) in counts.iter().enumerate() {
                        prop_assert_eq!(app.root().contains(&tagged(index)), count == 1);
                    }
                }
                Err(BuildError::Invalid(diagnostics)) => {
                    let duplicates = diagnostics.duplicate_providers();
                    prop_assert_eq!(
                        duplicates.len(),
                        counts.iter().filter(|&&count| count > 1).count()
                    );
                    for (index, &count) in counts.iter().enumerate() {
                        let listed = duplicates.get(&tagged(index)).map_or(0, Vec::len);
                        prop_assert_eq!(listed, if count > 1 { count } else { 0 });
                    }
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }

        #[test]
        fn import_ops_match_sequential_model(ops in prop::collection::vec(arb_op(), 0..6)) {
            let mut assembly = Assembly::new();
            let root = assembly.root();
            let producer = assembly.add_scope("producer", root);
            let consumer = assembly.add_scope("consumer", root);
            {
                let mut scope = assembly.configure(producer);
                for (index, qualifier) in QUALIFIERS.iter().enumerate() {
                    scope.provide_instance_as(tagged(index), qualifier.to_string());
                }
            }
            let spec = ops
                .iter()
                .fold(ImportSpec::from_scope(producer), |spec, op| op.push(spec));
            assembly.configure(consumer).import(spec);

            // target index -> source indices that land on it
            let mut landed: Vec<Vec<usize>> = vec![Vec::new(); 4];
            for source in 0..4 {
                let target = ops.iter().try_fold(source, |current, op| op.model(current));
                if let Some(target) = target {
                    landed[target].push(source);
                }
            }
            let collides = landed.iter().any(|sources| sources.len() > 1);

            match assembly.build() {
                Ok(app) => {
                    prop_assert!(!collides);
                    let pool = app.scope(consumer).unwrap();
                    for (target, sources) in landed.iter().enumerate() {
                        match sources.first() {
                            Some(&source) => {
                                let value = pool.get_keyed::<String>(&tagged(target)).unwrap();
                                prop_assert_eq!(value.as_str(), QUALIFIERS[source]);
                            }
                            None => prop_assert!(!pool.contains(&tagged(target))),
                        }
                    }
                }
                Err(BuildError::Invalid(diagnostics)) => {
                    prop_assert!(collides);
                    for (target, sources) in landed.iter().enumerate() {
                        prop_assert_eq!(
                            diagnostics.duplicate_providers().contains_key(&tagged(target)),
                            sources.len() > 1
                        );
                    }
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
        }

        #[test]
        fn dag_values_follow_their_dependencies(deps in arb_dag()) {
            let mut assembly = Assembly::new();
            declare_nodes(&mut assembly.configure(ScopeId::ROOT), &deps);
            let app = assembly.build().unwrap();

            let mut expected: Vec<u64> = Vec::with_capacity(deps.len());
            for targets in &deps {
                let value = 1 + targets.iter().map(|&target| expected[target]).sum::<u64>();
                expected.push(value);
            }
            for (index, value) in expected.iter().enumerate() {
                prop_assert_eq!(*app.get_keyed::<u64>(&node(index)).unwrap(), *value);
            }
        }

        #[test]
        fn closed_chain_is_one_cycle(n in 1..8usize) {
            // node i depends on i - 1; node 0 depends on the last node
            let deps: Vec<Vec<usize>> = (0..n)
                .map(|i| vec![if i == 0 { n - 1 } else { i - 1 }])
                .collect();
            let mut assembly = Assembly::new();
            declare_nodes(&mut assembly.configure(ScopeId::ROOT), &deps);

            let Err(BuildError::Invalid(diagnostics)) = assembly.build() else {
                return Err(TestCaseError::fail("a closed chain must fail the build"));
            };
            prop_assert_eq!(diagnostics.dependency_cycles().len(), 1);
            let cycle = &diagnostics.dependency_cycles()[0];
            prop_assert_eq!(cycle.len(), n);
            for index in 0..n {
                prop_assert!(cycle.contains(&node(index)));
            }
        }
    }
}

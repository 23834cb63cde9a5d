use depgraph_builder::core::properties::ValueProperties;
use depgraph_builder::core::target::{
    ComputationTargetSpecification, ComputationTargetType, ExternalId, ExternalIdBundle,
    TargetReference, UniqueId,
};
use depgraph_builder::function::declarative::CompiledDefinitions;
use depgraph_builder::graph::builder::{DependencyGraphBuilder, ResolutionOutcome};
use depgraph_builder::queue::ordered::compare;
use depgraph_builder::queue::{Prioritized, RunQueue, RunQueueKind};
use depgraph_builder::simulation::synthetic::{generate_catalog_with, SyntheticCatalogConfig};
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cmp::Ordering;
use std::collections::BTreeSet;

/// One property: absent, wildcard, or a small concrete set, possibly optional.
fn arb_constraint() -> impl Strategy<Value = Option<(Option<Vec<&'static str>>, bool)>> {
    let values = prop::option::of(prop::sample::subsequence(vec!["USD", "EUR", "GBP"], 1..=3));
    prop::option::of((values, any::<bool>()))
}

/// Property sets over a small pool of names, so that sets overlap often.
fn arb_properties() -> impl Strategy<Value = ValueProperties> {
    prop::collection::vec(arb_constraint(), 3).prop_map(|constraints| {
        let names = ["Currency", "Curve", "Hops"];
        let mut builder = ValueProperties::builder();
        for (name, constraint) in names.iter().zip(constraints) {
            let Some((values, optional)) = constraint else {
                continue;
            };
            builder = match values {
                Some(values) => builder.with_values(name, values),
                None => builder.with_any(name),
            };
            if optional {
                builder = builder.with_optional(name);
            }
        }
        builder.build()
    })
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct Work(Option<TargetReference>, usize);

impl Prioritized for Work {
    fn priority_target(&self) -> Option<&TargetReference> {
        self.0.as_ref()
    }
}

fn arb_target() -> impl Strategy<Value = Option<TargetReference>> {
    let target_type = prop::sample::select(vec![
        ComputationTargetType::Primitive,
        ComputationTargetType::Position,
        ComputationTargetType::Trade,
        ComputationTargetType::Security,
        ComputationTargetType::PortfolioNode,
    ]);
    prop::option::of((target_type, 0u8..20, any::<bool>()).prop_map(|(target_type, id, external)| {
        if external {
            let bundle = ExternalIdBundle::of(ExternalId::new("Ticker", format!("{:02}", id)));
            TargetReference::external(target_type, bundle)
        } else {
            ComputationTargetSpecification::new(target_type, UniqueId::new("Test", format!("{:02}", id))).into()
        }
    }))
}

fn arb_queue_kind() -> impl Strategy<Value = RunQueueKind> {
    prop::sample::select(vec![RunQueueKind::Stack, RunQueueKind::Fifo, RunQueueKind::Ordered])
}

/// Interleaved queue operations: `Some` adds, `None` takes.
fn arb_queue_ops() -> impl Strategy<Value = Vec<Option<Option<TargetReference>>>> {
    prop::collection::vec(prop::option::weighted(0.7, arb_target()), 0..80)
}

fn arb_catalog_config() -> impl Strategy<Value = SyntheticCatalogConfig> {
    (1usize..4, 1usize..5, 1usize..4, 1usize..3, 1usize..4).prop_map(
        |(layers, values_per_layer, inputs_per_function, alternatives_per_value, target_count)| {
            SyntheticCatalogConfig {
                layers,
                values_per_layer,
                inputs_per_function,
                alternatives_per_value,
                target_count,
            }
        },
    )
}

proptest! {
    // ===================================================================
    // INVARIANT 1: Composition is commutative, associative and idempotent.
    // ===================================================================
    #[test]
    fn compose_is_a_semilattice(
        a in arb_properties(),
        b in arb_properties(),
        c in arb_properties(),
    ) {
        prop_assert_eq!(a.compose(&b), b.compose(&a));
        prop_assert_eq!(a.compose(&b).compose(&c), a.compose(&b.compose(&c)));
        prop_assert_eq!(a.compose(&a), a.clone());
    }

    // ===================================================================
    // INVARIANT 2: The all-wildcard set is the identity of composition,
    // and a wildcard never widens a concrete value.
    // ===================================================================
    #[test]
    fn compose_with_wildcards(a in arb_properties()) {
        prop_assert_eq!(a.compose(&ValueProperties::all()), a.clone());
        prop_assert_eq!(ValueProperties::all().compose(&a), a.clone());

        let concrete = ValueProperties::builder().with("Currency", "USD").build();
        let wildcard = ValueProperties::builder().with_any("Currency").build();
        prop_assert_eq!(concrete.compose(&wildcard), concrete);
    }

    // ===================================================================
    // INVARIANT 3: Narrowing an output to a requirement it satisfies
    // keeps it satisfying that requirement.
    // ===================================================================
    #[test]
    fn narrowing_preserves_satisfaction(
        constraints in arb_properties(),
        offered in arb_properties(),
    ) {
        if constraints.is_satisfied_by(&offered) {
            let narrowed = offered.narrow(&constraints);
            prop_assert!(
                constraints.is_satisfied_by(&narrowed),
                "{} no longer satisfies {} after narrowing",
                narrowed,
                constraints
            );
            prop_assert!(narrowed.subsumes(&offered) || !narrowed.is_satisfiable());
        }
    }

    // ===================================================================
    // INVARIANT 4: A run queue never loses or duplicates work, whatever
    // the discipline and however adds and takes interleave.
    // ===================================================================
    #[test]
    fn run_queue_conserves_work(
        kind in arb_queue_kind(),
        buffer in 1usize..8,
        ops in arb_queue_ops(),
    ) {
        let queue = RunQueue::of_kind(kind, buffer);
        let mut added = BTreeSet::new();
        let mut taken = BTreeSet::new();
        for (seq, op) in ops.into_iter().enumerate() {
            match op {
                Some(target) => {
                    let work = Work(target, seq);
                    added.insert(work.clone());
                    queue.add(work).unwrap();
                }
                None => {
                    if let Some(work) = queue.try_take() {
                        prop_assert!(taken.insert(work), "work taken twice");
                    }
                }
            }
        }
        prop_assert_eq!(queue.size(), added.len() - taken.len());
        while let Some(work) = queue.try_take() {
            prop_assert!(taken.insert(work), "work taken twice");
        }
        prop_assert_eq!(taken, added);
    }

    // ===================================================================
    // INVARIANT 5: Once everything is queued, the ordered discipline
    // hands work out in priority order.
    // ===================================================================
    #[test]
    fn ordered_queue_drains_in_priority_order(
        buffer in 1usize..8,
        targets in prop::collection::vec(arb_target(), 0..60),
    ) {
        let queue = RunQueue::ordered(buffer);
        for (seq, target) in targets.into_iter().enumerate() {
            queue.add(Work(target, seq)).unwrap();
        }
        let mut previous: Option<Work> = None;
        while let Some(work) = queue.try_take() {
            if let Some(previous) = &previous {
                prop_assert_ne!(compare(previous, &work), Ordering::Greater);
            }
            previous = Some(work);
        }
    }

    // ===================================================================
    // INVARIANT 6: Layered catalogs always resolve, to an acyclic graph
    // with at most one node per function application.
    // ===================================================================
    #[test]
    fn synthetic_catalogs_resolve_acyclic(
        config in arb_catalog_config(),
        seed in any::<u64>(),
    ) {
        let catalog = generate_catalog_with(&config, &mut StdRng::seed_from_u64(seed));
        let compiled = CompiledDefinitions::compile(&catalog.definitions).unwrap();
        let mut builder = DependencyGraphBuilder::new("property");
        builder.set_function_resolver(compiled.resolver()).unwrap();
        builder.add_targets(catalog.requirements());
        let graph = builder.get_dependency_graph();

        prop_assert!(graph.is_acyclic());
        prop_assert!(builder.outcomes().values().all(ResolutionOutcome::is_resolved));
        prop_assert!(graph.node_count() <= config.layers * config.values_per_layer * config.target_count);

        let applications: BTreeSet<(String, ComputationTargetSpecification)> = graph
            .nodes()
            .map(|n| (n.function().unique_id().to_string(), n.target().clone()))
            .collect();
        prop_assert_eq!(applications.len(), graph.node_count());

        // Every producer runs before its consumers.
        let order = graph.execution_order().unwrap();
        let position = |id| order.iter().position(|o| *o == id);
        for node in graph.nodes() {
            for producer in node.input_nodes() {
                prop_assert!(position(producer) < position(node.id()));
            }
        }
    }

    // ===================================================================
    // INVARIANT 7: Pruning is idempotent and keeps every requested value.
    // ===================================================================
    #[test]
    fn pruning_is_idempotent(
        config in arb_catalog_config(),
        seed in any::<u64>(),
    ) {
        let catalog = generate_catalog_with(&config, &mut StdRng::seed_from_u64(seed));
        let compiled = CompiledDefinitions::compile(&catalog.definitions).unwrap();
        let mut builder = DependencyGraphBuilder::new("property");
        builder.set_function_resolver(compiled.resolver()).unwrap();
        builder.add_targets(catalog.requirements());
        let mut graph = builder.get_dependency_graph();

        graph.remove_unnecessary_values();
        prop_assert_eq!(graph.remove_unnecessary_values(), 0);
        for requirement in catalog.requirements() {
            prop_assert!(graph.satisfied_requirement(&requirement).is_some());
        }
        prop_assert!(graph.nodes().all(|n| !n.outputs().is_empty()));
    }
}

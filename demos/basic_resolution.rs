//! Basic dependency graph construction example.
//!
//! Demonstrates how a present value requirement pulls in the functions and
//! market data it depends on, and how pruning trims the result.

use depgraph_builder::core::properties::ValueProperties;
use depgraph_builder::core::requirement::ValueRequirement;
use depgraph_builder::core::target::{ComputationTargetSpecification, ComputationTargetType, UniqueId};
use depgraph_builder::engine::failure::ResolutionFailureGatherer;
use depgraph_builder::engine::market_data::FixedMarketDataAvailability;
use depgraph_builder::function::declarative::{CompiledDefinitions, FunctionDefinition};
use depgraph_builder::graph::builder::{DependencyGraphBuilder, ResolutionOutcome};
use std::sync::Arc;

fn main() {
    println!("╔══════════════════════════════════════════════╗");
    println!("║  depgraph-builder: Basic Resolution Example  ║");
    println!("╚══════════════════════════════════════════════╝\n");

    let usd = ValueProperties::builder().with("Currency", "USD").build();
    let definitions = vec![
        FunctionDefinition {
            target_type: ComputationTargetType::Security,
            ..FunctionDefinition::new("BondPV", "PresentValue")
                .with_output("Duration")
                .with_input("DiscountCurve")
                .with_input("CleanPrice")
                .with_properties(usd.clone())
        },
        FunctionDefinition {
            target_type: ComputationTargetType::Security,
            ..FunctionDefinition::new("CurveFromSwaps", "DiscountCurve")
                .with_input("SwapRate")
                .with_properties(usd)
        },
    ];
    let compiled = CompiledDefinitions::compile(&definitions).expect("valid catalog");

    let bond = ComputationTargetSpecification::new(ComputationTargetType::Security, UniqueId::new("Sec", "UST-10Y"));
    let market_data = FixedMarketDataAvailability::new()
        .with_available("CleanPrice", bond.clone())
        .with_available("SwapRate", bond.clone());

    let mut builder = DependencyGraphBuilder::new("basic");
    builder.set_function_resolver(compiled.resolver()).expect("not started");
    builder
        .set_market_data_availability_provider(Arc::new(market_data))
        .expect("not started");

    // --- Scenario 1: Resolve a present value ---
    println!("━━━ Scenario 1: Present Value ━━━\n");

    let pv = ValueRequirement::new("PresentValue", bond.clone());
    let theta = ValueRequirement::new("Theta", bond);
    builder.add_targets(vec![pv, theta]);
    let mut graph = builder.get_dependency_graph();

    for node in graph.nodes() {
        println!("  {}", node);
    }
    println!();
    for (requirement, outcome) in builder.outcomes() {
        match outcome {
            ResolutionOutcome::Resolved(spec) => println!("OK    {} -> {}", requirement, spec),
            ResolutionOutcome::Failed(failure) => {
                println!("FAIL  {}", requirement);
                for line in ResolutionFailureGatherer::gather(&failure) {
                    println!("      {}", line);
                }
            }
        }
    }
    println!();

    // --- Scenario 2: Prune values nobody asked for ---
    println!("━━━ Scenario 2: Pruning ━━━\n");

    let before = graph.value_count();
    let removed = graph.remove_unnecessary_values();
    println!("Values before pruning: {}", before);
    println!("Values removed:        {}", removed);
    println!("Values after pruning:  {}", graph.value_count());
    println!();

    let order = graph.execution_order().expect("acyclic graph");
    println!("Execution order:");
    for (step, id) in order.iter().enumerate() {
        if let Some(node) = graph.node(*id) {
            println!("  {}. {}", step + 1, node);
        }
    }
}

//! Backtracking resolution example.
//!
//! The preferred function for a value needs an input nobody can produce,
//! so the builder abandons it and falls back to the next candidate. The
//! discarded attempt leaves no trace in the graph.

use depgraph_builder::core::requirement::ValueRequirement;
use depgraph_builder::core::target::{ComputationTargetSpecification, UniqueId};
use depgraph_builder::engine::failure::ResolutionFailureGatherer;
use depgraph_builder::function::declarative::{CompiledDefinitions, FunctionDefinition};
use depgraph_builder::graph::builder::DependencyGraphBuilder;

fn main() {
    println!("╔══════════════════════════════════════════╗");
    println!("║  depgraph-builder: Backtracking Example  ║");
    println!("╚══════════════════════════════════════════╝\n");

    let definitions = vec![
        FunctionDefinition::new("ImpliedVol", "Volatility")
            .with_input("OptionPrice")
            .with_input("Spot")
            .with_priority(10),
        FunctionDefinition::new("HistoricalVol", "Volatility")
            .with_input("Spot")
            .with_priority(1),
        FunctionDefinition::new("SpotSource", "Spot"),
        FunctionDefinition::new("BlackScholes", "OptionValue").with_input("Volatility").with_input("Spot"),
    ];
    let compiled = CompiledDefinitions::compile(&definitions).expect("valid catalog");

    let underlying = ComputationTargetSpecification::primitive(UniqueId::new("Equity", "ACME"));
    let value = ValueRequirement::new("OptionValue", underlying.clone());
    let missing = ValueRequirement::new("OptionPrice", underlying);

    let mut builder = DependencyGraphBuilder::new("backtracking");
    builder.set_function_resolver(compiled.resolver()).expect("not started");
    builder.add_targets(vec![value.clone(), missing.clone()]);
    let graph = builder.get_dependency_graph();

    println!("━━━ Graph ━━━\n");
    for node in graph.nodes() {
        println!("  {}", node);
    }
    println!();

    if let Some(spec) = builder.outcome(&value).and_then(|o| o.specification().cloned()) {
        println!("{} resolved by {}", value, spec.function_id().unwrap_or("?"));
        println!("ImpliedVol nodes in graph: {}", graph.nodes_of("ImpliedVol").len());
        println!();
    }

    println!("━━━ Why OptionPrice failed ━━━\n");
    for failure in builder.failures() {
        for line in ResolutionFailureGatherer::gather(&failure) {
            println!("  {}", line);
        }
    }
}

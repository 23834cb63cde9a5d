//! depgraph-builder CLI
//!
//! Build dependency graphs for declarative function catalogs.
//!
//! # Usage
//!
//! ```bash
//! # Resolve the requirements of a scenario file
//! depgraph-builder resolve --input scenario.json
//!
//! # Output as JSON, pruning values nothing consumes
//! depgraph-builder resolve --input scenario.json --format json --prune
//!
//! # Generate a random layered scenario for testing
//! depgraph-builder generate --layers 4 --width 8 --targets 10
//! ```

use depgraph_builder::core::properties::ValueProperties;
use depgraph_builder::core::requirement::ValueRequirement;
use depgraph_builder::core::target::{ComputationTargetSpecification, ComputationTargetType, UniqueId};
use depgraph_builder::engine::failure::ResolutionFailureGatherer;
use depgraph_builder::engine::market_data::FixedMarketDataAvailability;
use depgraph_builder::function::declarative::{CompiledDefinitions, FunctionDefinition};
use depgraph_builder::graph::builder::{BuildConfig, DependencyGraphBuilder, ResolutionOutcome};
use depgraph_builder::graph::dependency_graph::DependencyGraphSummary;
use depgraph_builder::simulation::synthetic::{generate_catalog, SyntheticCatalogConfig};
use std::collections::BTreeMap;
use std::fs;
use std::process;
use std::sync::Arc;
use std::time::Instant;

fn print_usage() {
    eprintln!(
        r#"depgraph-builder: dependency graph construction from value requirements

USAGE:
    depgraph-builder <COMMAND> [OPTIONS]

COMMANDS:
    resolve     Build the dependency graph for a scenario file
    generate    Generate a random layered scenario (for testing)
    help        Show this message

OPTIONS (resolve):
    --input <FILE>      Path to JSON scenario file
    --format <FORMAT>   Output format: text (default) or json
    --prune             Remove values no terminal output depends on
    --background        Resolve on the configured worker threads

OPTIONS (generate):
    --layers <N>        Value layers (default: 3)
    --width <N>         Values per layer (default: 4)
    --inputs <N>        Inputs per function (default: 2)
    --alternatives <N>  Functions per value (default: 2)
    --targets <N>       Targets to require the top layer on (default: 4)
    --output <FILE>     Write to file instead of stdout

ENVIRONMENT:
    RUST_LOG            Log filter, e.g. RUST_LOG=depgraph_builder=debug

EXAMPLES:
    depgraph-builder resolve --input scenario.json
    depgraph-builder resolve --input scenario.json --format json --prune
    depgraph-builder generate --layers 4 --width 8 --output big.json"#
    );
}

/// JSON schema for a requirement: a value name on a target given as
/// `scheme~value`.
#[derive(serde::Serialize, serde::Deserialize)]
struct RequirementInput {
    value: String,
    target: String,
    #[serde(default = "default_target_type")]
    target_type: ComputationTargetType,
    #[serde(default)]
    constraints: ValueProperties,
}

fn default_target_type() -> ComputationTargetType {
    ComputationTargetType::Primitive
}

#[derive(serde::Serialize, serde::Deserialize)]
struct MarketDataInput {
    value: String,
    target: String,
    #[serde(default = "default_target_type")]
    target_type: ComputationTargetType,
    #[serde(default)]
    missing: bool,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ScenarioFile {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default)]
    config: BuildConfig,
    functions: Vec<FunctionDefinition>,
    #[serde(default)]
    market_data: Vec<MarketDataInput>,
    requirements: Vec<RequirementInput>,
}

fn default_name() -> String {
    "scenario".to_string()
}

/// JSON output schema for a build.
#[derive(serde::Serialize)]
struct BuildOutput {
    job: String,
    elapsed_ms: u128,
    graph: DependencyGraphSummary,
    execution_order: Vec<String>,
    outcomes: Vec<OutcomeOutput>,
}

#[derive(serde::Serialize)]
struct OutcomeOutput {
    requirement: String,
    outcome: ResolutionOutcome,
}

fn parse_target(target: &str, target_type: ComputationTargetType) -> ComputationTargetSpecification {
    let id = UniqueId::parse(target).unwrap_or_else(|| {
        eprintln!("Invalid target '{}': expected scheme~value", target);
        process::exit(1);
    });
    ComputationTargetSpecification::new(target_type, id)
}

fn load_scenario(path: &str) -> ScenarioFile {
    let content = fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading file '{}': {}", path, e);
        process::exit(1);
    });

    serde_json::from_str(&content).unwrap_or_else(|e| {
        eprintln!("Error parsing JSON: {}", e);
        eprintln!("Expected format:");
        eprintln!(
            r#"{{
  "functions": [
    {{ "id": "PV", "outputs": ["PresentValue"], "inputs": [{{ "value": "Spot" }}] }}
  ],
  "market_data": [ {{ "value": "Spot", "target": "Sec~AAPL" }} ],
  "requirements": [ {{ "value": "PresentValue", "target": "Sec~AAPL" }} ]
}}"#
        );
        process::exit(1);
    })
}

fn cmd_resolve(args: &[String]) {
    let mut input_path = None;
    let mut format = "text".to_string();
    let mut prune = false;
    let mut background = false;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--input" => {
                i += 1;
                input_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--input requires a file path");
                    process::exit(1);
                }));
            }
            "--format" => {
                i += 1;
                format = args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--format requires 'text' or 'json'");
                    process::exit(1);
                });
            }
            "--prune" => prune = true,
            "--background" => background = true,
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        }
        i += 1;
    }

    let path = input_path.unwrap_or_else(|| {
        eprintln!("Error: --input <FILE> is required");
        process::exit(1);
    });

    let scenario = load_scenario(&path);
    let compiled = CompiledDefinitions::compile(&scenario.functions).unwrap_or_else(|e| {
        eprintln!("Invalid function catalog: {}", e);
        process::exit(1);
    });

    let mut market_data = FixedMarketDataAvailability::new();
    for entry in &scenario.market_data {
        let target = parse_target(&entry.target, entry.target_type);
        market_data = if entry.missing {
            market_data.with_missing(entry.value.clone(), target)
        } else {
            market_data.with_available(entry.value.clone(), target)
        };
    }

    let requirements: Vec<ValueRequirement> = scenario
        .requirements
        .iter()
        .map(|r| {
            ValueRequirement::new(r.value.clone(), parse_target(&r.target, r.target_type))
                .with_constraints(r.constraints.clone())
        })
        .collect();

    let mut builder = DependencyGraphBuilder::new(scenario.name.clone()).with_config(scenario.config);
    let configured = builder
        .set_function_resolver(compiled.resolver())
        .and_then(|_| builder.set_market_data_availability_provider(Arc::new(market_data)));
    if let Err(e) = configured {
        eprintln!("Error configuring build: {}", e);
        process::exit(1);
    }

    let started = Instant::now();
    builder.add_targets(requirements);
    if background {
        if let Err(e) = builder.start_background_construction_job() {
            eprintln!("Error starting workers: {}", e);
            process::exit(1);
        }
    }
    let mut graph = builder.get_dependency_graph();
    if prune {
        graph.remove_unnecessary_values();
    }
    let elapsed = started.elapsed();

    let order = graph.execution_order().unwrap_or_else(|e| {
        eprintln!("Graph is not executable: {}", e);
        process::exit(1);
    });
    let outcomes = builder.outcomes();
    let code = exit_code(&outcomes);

    if format == "json" {
        let output = BuildOutput {
            job: builder.id().to_string(),
            elapsed_ms: elapsed.as_millis(),
            graph: graph.summary(),
            execution_order: order
                .iter()
                .filter_map(|id| graph.node(*id))
                .map(|node| node.to_string())
                .collect(),
            outcomes: outcomes
                .into_iter()
                .map(|(requirement, outcome)| OutcomeOutput {
                    requirement: requirement.to_string(),
                    outcome,
                })
                .collect(),
        };
        println!("{}", serde_json::to_string_pretty(&output).unwrap());
    } else {
        println!(
            "Graph {} ({} nodes, {} values) built in {:?}",
            graph.name(),
            graph.node_count(),
            graph.value_count(),
            elapsed
        );
        println!("\nExecution order:");
        for id in &order {
            if let Some(node) = graph.node(*id) {
                println!("  {}", node);
            }
        }
        println!("\nRequirements:");
        for (requirement, outcome) in &outcomes {
            match outcome {
                ResolutionOutcome::Resolved(spec) => println!("  OK    {} -> {}", requirement, spec),
                ResolutionOutcome::Failed(failure) => {
                    println!("  FAIL  {}", requirement);
                    for line in ResolutionFailureGatherer::gather(failure) {
                        println!("        {}", line);
                    }
                }
            }
        }
    }

    if code != 0 {
        process::exit(code);
    }
}

/// 2 when any requirement went unresolved, 0 otherwise.
fn exit_code(outcomes: &BTreeMap<ValueRequirement, ResolutionOutcome>) -> i32 {
    if outcomes.values().all(ResolutionOutcome::is_resolved) {
        0
    } else {
        2
    }
}

fn cmd_generate(args: &[String]) {
    let mut config = SyntheticCatalogConfig::default();
    let mut output_path: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        let flag = args[i].as_str();
        let slot = match flag {
            "--layers" => &mut config.layers,
            "--width" => &mut config.values_per_layer,
            "--inputs" => &mut config.inputs_per_function,
            "--alternatives" => &mut config.alternatives_per_value,
            "--targets" => &mut config.target_count,
            "--output" => {
                i += 1;
                output_path = Some(args.get(i).cloned().unwrap_or_else(|| {
                    eprintln!("--output requires a file path");
                    process::exit(1);
                }));
                i += 1;
                continue;
            }
            _ => {
                eprintln!("Unknown option: {}", args[i]);
                process::exit(1);
            }
        };
        i += 1;
        *slot = args.get(i).and_then(|s| s.parse().ok()).unwrap_or_else(|| {
            eprintln!("{} requires a number", flag);
            process::exit(1);
        });
        i += 1;
    }

    let catalog = generate_catalog(&config);
    let scenario = ScenarioFile {
        name: format!("synthetic-{}x{}", config.layers, config.values_per_layer),
        config: BuildConfig::default(),
        functions: catalog.definitions.clone(),
        market_data: Vec::new(),
        requirements: catalog
            .requirements()
            .iter()
            .map(|r| RequirementInput {
                value: r.value_name().to_string(),
                target: r.target().identifier(),
                target_type: r.target().target_type(),
                constraints: ValueProperties::none(),
            })
            .collect(),
    };

    let json = serde_json::to_string_pretty(&scenario).unwrap();

    if let Some(path) = output_path {
        fs::write(&path, &json).unwrap_or_else(|e| {
            eprintln!("Error writing to '{}': {}", path, e);
            process::exit(1);
        });
        eprintln!(
            "Generated {} functions and {} requirements -> {}",
            scenario.functions.len(),
            scenario.requirements.len(),
            path
        );
    } else {
        println!("{}", json);
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let command = args[1].as_str();
    let rest = &args[2..];

    match command {
        "resolve" => cmd_resolve(rest),
        "generate" => cmd_generate(rest),
        "help" | "--help" | "-h" => print_usage(),
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use depgraph_builder::core::specification::ValueSpecification;
    use depgraph_builder::engine::failure::ResolutionFailure;

    fn requirement(value: &str) -> ValueRequirement {
        ValueRequirement::new(value, ComputationTargetSpecification::primitive(UniqueId::new("Test", "A")))
    }

    #[test]
    fn test_exit_code_reflects_failures() {
        let resolved = ValueSpecification::new(
            "X",
            ComputationTargetSpecification::primitive(UniqueId::new("Test", "A")),
            ValueProperties::none(),
        );
        let mut outcomes = BTreeMap::new();
        assert_eq!(exit_code(&outcomes), 0);

        outcomes.insert(requirement("X"), ResolutionOutcome::Resolved(resolved));
        assert_eq!(exit_code(&outcomes), 0);

        outcomes.insert(
            requirement("Y"),
            ResolutionOutcome::Failed(ResolutionFailure::new(requirement("Y")).no_functions()),
        );
        assert_eq!(exit_code(&outcomes), 2);
        // Still usable after the code is taken.
        assert_eq!(outcomes.len(), 2);
    }
}

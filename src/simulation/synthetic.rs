//! Synthetic function catalogs for stress tests and benchmarks.
//!
//! Catalogs are layered: functions producing a layer's values only require
//! values from the layer below, so every generated catalog resolves to an
//! acyclic graph. Each value has several alternative producers so that
//! candidate ordering and node sharing get exercised.

use crate::core::requirement::ValueRequirement;
use crate::core::target::{ComputationTargetSpecification, UniqueId};
use crate::function::declarative::FunctionDefinition;
use rand::seq::SliceRandom;
use rand::Rng;

/// Shape of a generated catalog.
#[derive(Debug, Clone)]
pub struct SyntheticCatalogConfig {
    /// Number of value layers. Layer 0 values have no inputs.
    pub layers: usize,
    /// Distinct value names per layer.
    pub values_per_layer: usize,
    /// Inputs each non-leaf function requires from the layer below.
    pub inputs_per_function: usize,
    /// Functions registered for every value name.
    pub alternatives_per_value: usize,
    /// Number of targets requirements are generated for.
    pub target_count: usize,
}

impl Default for SyntheticCatalogConfig {
    fn default() -> Self {
        Self {
            layers: 3,
            values_per_layer: 4,
            inputs_per_function: 2,
            alternatives_per_value: 2,
            target_count: 4,
        }
    }
}

/// A generated catalog plus the value names of its top layer.
#[derive(Debug, Clone)]
pub struct SyntheticCatalog {
    pub definitions: Vec<FunctionDefinition>,
    pub top_values: Vec<String>,
    pub targets: Vec<ComputationTargetSpecification>,
}

impl SyntheticCatalog {
    /// One requirement per top-layer value per target.
    pub fn requirements(&self) -> Vec<ValueRequirement> {
        self.targets
            .iter()
            .flat_map(|target| {
                self.top_values
                    .iter()
                    .map(move |value| ValueRequirement::new(value.clone(), target.clone()))
            })
            .collect()
    }
}

fn value_name(layer: usize, index: usize) -> String {
    format!("V{}_{}", layer, index)
}

/// Generate a random layered catalog.
pub fn generate_catalog(config: &SyntheticCatalogConfig) -> SyntheticCatalog {
    generate_catalog_with(config, &mut rand::thread_rng())
}

/// As [`generate_catalog`], drawing from the given generator so that runs
/// can be reproduced from a seed.
pub fn generate_catalog_with<R: Rng + ?Sized>(config: &SyntheticCatalogConfig, rng: &mut R) -> SyntheticCatalog {
    let layers = config.layers.max(1);
    let width = config.values_per_layer.max(1);
    let mut definitions = Vec::with_capacity(layers * width * config.alternatives_per_value.max(1));

    for layer in 0..layers {
        let below: Vec<String> = if layer == 0 {
            Vec::new()
        } else {
            (0..width).map(|i| value_name(layer - 1, i)).collect()
        };
        for index in 0..width {
            let output = value_name(layer, index);
            for alternative in 0..config.alternatives_per_value.max(1) {
                let mut definition =
                    FunctionDefinition::new(format!("F{}_{}_{}", layer, index, alternative), output.clone());
                let count = config.inputs_per_function.min(below.len());
                for input in below.choose_multiple(rng, count) {
                    definition = definition.with_input(input.clone());
                }
                definitions.push(definition);
            }
        }
    }

    let targets = (0..config.target_count.max(1))
        .map(|i| ComputationTargetSpecification::primitive(UniqueId::new("Synthetic", format!("T{:03}", i))))
        .collect();

    SyntheticCatalog {
        definitions,
        top_values: (0..width).map(|i| value_name(layers - 1, i)).collect(),
        targets,
    }
}

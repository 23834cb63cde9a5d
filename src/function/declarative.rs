//! Functions described by data rather than code.
//!
//! A [`FunctionDefinition`] names the values a function produces on one
//! target type and the values it needs from the same target. The CLI reads
//! them from scenario files and the synthetic catalog generator emits them.

use crate::core::properties::ValueProperties;
use crate::core::requirement::ValueRequirement;
use crate::core::specification::ValueSpecification;
use crate::core::target::{ComputationTargetSpecification, ComputationTargetType};
use crate::function::catalog::{CatalogError, FunctionCatalog};
use crate::function::exclusion::ExclusionGroupMap;
use crate::function::priority::PriorityTable;
use crate::function::resolver::FunctionResolver;
use crate::function::{CompiledFunction, FunctionError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// One input of a declarative function, always on the function's own target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDefinition {
    pub value: String,
    #[serde(default)]
    pub constraints: ValueProperties,
}

impl From<&str> for InputDefinition {
    fn from(value: &str) -> Self {
        Self {
            value: value.to_string(),
            constraints: ValueProperties::none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub id: String,
    #[serde(default = "default_target_type")]
    pub target_type: ComputationTargetType,
    pub outputs: Vec<String>,
    /// Properties carried by every output.
    #[serde(default)]
    pub properties: ValueProperties,
    #[serde(default)]
    pub inputs: Vec<InputDefinition>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub exclusion_group: Option<String>,
}

fn default_target_type() -> ComputationTargetType {
    ComputationTargetType::Primitive
}

impl FunctionDefinition {
    pub fn new(id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            target_type: default_target_type(),
            outputs: vec![output.into()],
            properties: ValueProperties::none(),
            inputs: Vec::new(),
            priority: 0,
            exclusion_group: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.outputs.push(output.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.inputs.push(InputDefinition::from(input.into().as_str()));
        self
    }

    pub fn with_properties(mut self, properties: ValueProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.exclusion_group = Some(group.into());
        self
    }
}

/// A [`CompiledFunction`] backed by a [`FunctionDefinition`].
#[derive(Debug, Clone)]
pub struct DeclarativeFunction {
    definition: FunctionDefinition,
}

impl DeclarativeFunction {
    pub fn new(definition: FunctionDefinition) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &FunctionDefinition {
        &self.definition
    }
}

impl CompiledFunction for DeclarativeFunction {
    fn id(&self) -> &str {
        &self.definition.id
    }

    fn target_type(&self) -> ComputationTargetType {
        self.definition.target_type
    }

    fn get_results(&self, target: &ComputationTargetSpecification) -> BTreeSet<ValueSpecification> {
        self.definition
            .outputs
            .iter()
            .map(|name| ValueSpecification::new(name.clone(), target.clone(), self.definition.properties.clone()))
            .collect()
    }

    fn get_requirements(
        &self,
        target: &ComputationTargetSpecification,
        _desired_output: &ValueSpecification,
    ) -> Result<BTreeSet<ValueRequirement>, FunctionError> {
        Ok(self
            .definition
            .inputs
            .iter()
            .map(|input| {
                ValueRequirement::new(input.value.clone(), target.clone())
                    .with_constraints(input.constraints.clone())
            })
            .collect())
    }
}

/// A catalog compiled from definitions, with the priorities and exclusion
/// groups the definitions declare.
#[derive(Debug, Clone, Default)]
pub struct CompiledDefinitions {
    pub catalog: FunctionCatalog,
    pub priorities: PriorityTable,
    pub exclusion_groups: ExclusionGroupMap,
}

impl CompiledDefinitions {
    pub fn compile(definitions: &[FunctionDefinition]) -> Result<Self, CatalogError> {
        let mut compiled = CompiledDefinitions::default();
        for definition in definitions {
            compiled
                .catalog
                .register(Arc::new(DeclarativeFunction::new(definition.clone())))?;
            compiled.priorities.set(definition.id.clone(), definition.priority);
            if let Some(group) = &definition.exclusion_group {
                compiled.exclusion_groups = std::mem::take(&mut compiled.exclusion_groups)
                    .with(definition.id.clone(), group.clone());
            }
        }
        Ok(compiled)
    }

    /// Resolver ranking the catalog by the declared priorities and groups.
    pub fn resolver(&self) -> FunctionResolver {
        FunctionResolver::new(&self.catalog, &self.priorities).with_exclusion_groups(&self.exclusion_groups)
    }
}

//! The function capability and the catalog/resolver that ranks candidate
//! functions for a requirement.

pub mod blacklist;
pub mod catalog;
pub mod declarative;
pub mod exclusion;
pub mod priority;
pub mod resolver;

use crate::core::requirement::ValueRequirement;
use crate::core::specification::ValueSpecification;
use crate::core::target::{ComputationTargetSpecification, ComputationTargetType};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors a function may report from any of its resolution callbacks.
///
/// These are candidate-local: the engine records them in the failure tree
/// and moves on to the next candidate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FunctionError {
    #[error("function does not apply to {0}")]
    NotApplicable(ComputationTargetSpecification),
    #[error("{0}")]
    Failed(String),
}

impl FunctionError {
    pub fn failed(message: impl Into<String>) -> Self {
        FunctionError::Failed(message.into())
    }
}

/// The contract every computation function exposes to graph construction.
///
/// Only how a function declares its inputs and outputs matters here; how it
/// eventually computes its values is outside this crate.
pub trait CompiledFunction: Send + Sync + fmt::Debug {
    /// Stable identity, used as the `Function` property on every output.
    fn id(&self) -> &str;

    fn target_type(&self) -> ComputationTargetType;

    /// Finer applicability check beyond the target type.
    fn can_apply_to(&self, _target: &ComputationTargetSpecification) -> bool {
        true
    }

    /// Outputs this function could produce on `target`. Properties may be
    /// wildcards that are narrowed once a requirement is matched.
    fn get_results(&self, target: &ComputationTargetSpecification) -> BTreeSet<ValueSpecification>;

    /// Inputs needed to produce `desired_output` on `target`.
    fn get_requirements(
        &self,
        target: &ComputationTargetSpecification,
        desired_output: &ValueSpecification,
    ) -> Result<BTreeSet<ValueRequirement>, FunctionError>;

    /// Late resolution: concrete outputs given the inputs that were actually
    /// resolved (keyed by specification, with the requirement each satisfies).
    /// An empty set means the function turns out not to apply.
    fn get_results_with_inputs(
        &self,
        target: &ComputationTargetSpecification,
        _inputs: &BTreeMap<ValueSpecification, ValueRequirement>,
    ) -> Result<BTreeSet<ValueSpecification>, FunctionError> {
        Ok(self.get_results(target))
    }

    /// Extra requirements that only become known once inputs and outputs are.
    fn get_additional_requirements(
        &self,
        _target: &ComputationTargetSpecification,
        _inputs: &BTreeSet<ValueSpecification>,
        _outputs: &BTreeSet<ValueSpecification>,
    ) -> Result<BTreeSet<ValueRequirement>, FunctionError> {
        Ok(BTreeSet::new())
    }

    /// Whether the function can run with some of its inputs unresolved.
    fn can_handle_missing_requirements(&self) -> bool {
        false
    }
}

/// Parameters that distinguish otherwise identical function instances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionParameters(BTreeMap<String, String>);

impl FunctionParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FunctionParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// A catalog entry: a function together with its parameterization.
///
/// The unique id is the function id, suffixed with the parameters when there
/// are any, and is what output specifications carry as their `Function`
/// property.
#[derive(Debug, Clone)]
pub struct ParameterizedFunction {
    function: Arc<dyn CompiledFunction>,
    parameters: FunctionParameters,
    unique_id: String,
}

impl ParameterizedFunction {
    pub fn new(function: Arc<dyn CompiledFunction>, parameters: FunctionParameters) -> Self {
        let unique_id = if parameters.is_empty() {
            function.id().to_string()
        } else {
            format!("{}({})", function.id(), parameters)
        };
        Self {
            function,
            parameters,
            unique_id,
        }
    }

    pub fn function(&self) -> &dyn CompiledFunction {
        self.function.as_ref()
    }

    pub fn parameters(&self) -> &FunctionParameters {
        &self.parameters
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    /// Outputs on `target`, stamped with this instance's identity.
    pub fn results(&self, target: &ComputationTargetSpecification) -> BTreeSet<ValueSpecification> {
        self.stamp(self.function.get_results(target))
    }

    /// Late-resolved outputs, stamped with this instance's identity.
    pub fn results_with_inputs(
        &self,
        target: &ComputationTargetSpecification,
        inputs: &BTreeMap<ValueSpecification, ValueRequirement>,
    ) -> Result<BTreeSet<ValueSpecification>, FunctionError> {
        self.function
            .get_results_with_inputs(target, inputs)
            .map(|outputs| self.stamp(outputs))
    }

    fn stamp(&self, outputs: BTreeSet<ValueSpecification>) -> BTreeSet<ValueSpecification> {
        outputs
            .into_iter()
            .map(|spec| spec.with_function(&self.unique_id))
            .collect()
    }
}

impl fmt::Display for ParameterizedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.unique_id)
    }
}

/// Identity of the built-in function that sources externally available
/// (market) data.
pub const MARKET_DATA_SOURCING_FUNCTION: &str = "MarketDataSourcingFunction";

/// Leaf function standing in for values that come from market data rather
/// than computation. Its outputs are supplied by the engine.
#[derive(Debug, Default)]
pub struct MarketDataSourcingFunction;

impl CompiledFunction for MarketDataSourcingFunction {
    fn id(&self) -> &str {
        MARKET_DATA_SOURCING_FUNCTION
    }

    fn target_type(&self) -> ComputationTargetType {
        ComputationTargetType::Primitive
    }

    fn get_results(&self, _target: &ComputationTargetSpecification) -> BTreeSet<ValueSpecification> {
        BTreeSet::new()
    }

    fn get_requirements(
        &self,
        _target: &ComputationTargetSpecification,
        _desired_output: &ValueSpecification,
    ) -> Result<BTreeSet<ValueRequirement>, FunctionError> {
        Ok(BTreeSet::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::properties::ValueProperties;
    use crate::core::target::UniqueId;

    #[derive(Debug)]
    struct Fixed;

    impl CompiledFunction for Fixed {
        fn id(&self) -> &str {
            "Fixed"
        }

        fn target_type(&self) -> ComputationTargetType {
            ComputationTargetType::Primitive
        }

        fn get_results(&self, target: &ComputationTargetSpecification) -> BTreeSet<ValueSpecification> {
            BTreeSet::from([ValueSpecification::new("Foo", target.clone(), ValueProperties::none())])
        }

        fn get_requirements(
            &self,
            _target: &ComputationTargetSpecification,
            _desired_output: &ValueSpecification,
        ) -> Result<BTreeSet<ValueRequirement>, FunctionError> {
            Ok(BTreeSet::new())
        }
    }

    #[test]
    fn test_unique_id_includes_parameters() {
        let plain = ParameterizedFunction::new(Arc::new(Fixed), FunctionParameters::new());
        let tuned = ParameterizedFunction::new(
            Arc::new(Fixed),
            FunctionParameters::new().with("Mode", "Fast"),
        );
        assert_eq!(plain.unique_id(), "Fixed");
        assert_eq!(tuned.unique_id(), "Fixed(Mode=Fast)");
    }

    #[test]
    fn test_results_are_stamped() {
        let function = ParameterizedFunction::new(Arc::new(Fixed), FunctionParameters::new());
        let target = ComputationTargetSpecification::primitive(UniqueId::new("Test", "A"));
        let results = function.results(&target);
        assert_eq!(results.len(), 1);
        assert!(results.iter().all(|spec| spec.function_id() == Some("Fixed")));
    }
}

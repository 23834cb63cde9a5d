//! Structured record of why a requirement could not be resolved.
//!
//! A [`ResolutionFailure`] is the list of [`FailureEvent`]s observed while
//! resolving one requirement (one per candidate tried, or a single
//! structural event). Nested failures of a candidate's inputs hang off
//! [`FailureEvent::FailedFunction`], so the whole decision path can be
//! walked with a [`ResolutionFailureVisitor`].

use crate::core::requirement::ValueRequirement;
use crate::core::specification::ValueSpecification;
use crate::core::target::ComputationTargetSpecification;
use crate::function::{FunctionParameters, ParameterizedFunction};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A function applied to a target in pursuit of one output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionApplication {
    function_id: String,
    #[serde(default)]
    parameters: FunctionParameters,
    target: ComputationTargetSpecification,
    desired_output: ValueSpecification,
}

impl FunctionApplication {
    pub fn new(
        function: &ParameterizedFunction,
        target: &ComputationTargetSpecification,
        desired_output: &ValueSpecification,
    ) -> Self {
        Self {
            function_id: function.unique_id().to_string(),
            parameters: function.parameters().clone(),
            target: target.clone(),
            desired_output: desired_output.clone(),
        }
    }

    pub fn function_id(&self) -> &str {
        &self.function_id
    }

    pub fn parameters(&self) -> &FunctionParameters {
        &self.parameters
    }

    pub fn target(&self) -> &ComputationTargetSpecification {
        &self.target
    }

    pub fn desired_output(&self) -> &ValueSpecification {
        &self.desired_output
    }
}

impl fmt::Display for FunctionApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.function_id, self.target)
    }
}

/// An input that was resolved while its consumer still failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatisfiedInput {
    pub requirement: ValueRequirement,
    pub specification: ValueSpecification,
}

/// The closed set of things that can happen to a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FailureEvent {
    /// The requirement depends, transitively, on itself.
    RecursiveRequirement,
    /// No function can produce the requirement.
    NoFunctions,
    /// The requirement's target could not be resolved.
    CouldNotResolve,
    /// The requirement was not satisfied, with no further detail.
    Unsatisfied,
    /// The value would come from market data that is not available.
    MarketDataMissing,
    GetRequirementsFailed {
        function: FunctionApplication,
        #[serde(default)]
        message: String,
    },
    GetAdditionalRequirementsFailed {
        function: FunctionApplication,
        #[serde(default)]
        message: String,
    },
    GetResultsFailed {
        function: FunctionApplication,
        #[serde(default)]
        message: String,
    },
    /// Skipped by a blacklist or an exclusion group already in use.
    BlacklistSuppressed { function: FunctionApplication },
    /// Late resolution produced nothing that satisfies the requirement.
    LateResolutionFailure { function: FunctionApplication },
    /// The function was tried but some of its inputs could not be resolved.
    FailedFunction {
        function: FunctionApplication,
        #[serde(default)]
        satisfied: Vec<SatisfiedInput>,
        #[serde(default)]
        failures: Vec<ResolutionFailure>,
    },
    /// The function resolved, but whatever consumed it failed.
    SuccessfulFunction {
        function: FunctionApplication,
        #[serde(default)]
        satisfied: Vec<SatisfiedInput>,
    },
}

impl FailureEvent {
    /// Short kind tag, as used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            FailureEvent::RecursiveRequirement => "recursiveRequirement",
            FailureEvent::NoFunctions => "noFunctions",
            FailureEvent::CouldNotResolve => "couldNotResolve",
            FailureEvent::Unsatisfied => "unsatisfied",
            FailureEvent::MarketDataMissing => "marketDataMissing",
            FailureEvent::GetRequirementsFailed { .. } => "getRequirementsFailed",
            FailureEvent::GetAdditionalRequirementsFailed { .. } => "getAdditionalRequirementsFailed",
            FailureEvent::GetResultsFailed { .. } => "getResultsFailed",
            FailureEvent::BlacklistSuppressed { .. } => "blacklistSuppressed",
            FailureEvent::LateResolutionFailure { .. } => "lateResolutionFailure",
            FailureEvent::FailedFunction { .. } => "failedFunction",
            FailureEvent::SuccessfulFunction { .. } => "successfulFunction",
        }
    }
}

/// Immutable failure record for one requirement.
///
/// Extension methods never mutate: each returns a new record with one more
/// event, so a failure can be shared freely between consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    requirement: ValueRequirement,
    #[serde(default)]
    events: Vec<FailureEvent>,
}

impl ResolutionFailure {
    pub fn new(requirement: ValueRequirement) -> Self {
        Self {
            requirement,
            events: Vec::new(),
        }
    }

    pub fn requirement(&self) -> &ValueRequirement {
        &self.requirement
    }

    pub fn events(&self) -> &[FailureEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// True if any event, at any depth, has the given kind tag.
    pub fn contains_kind(&self, kind: &str) -> bool {
        self.events.iter().any(|event| {
            event.kind() == kind
                || matches!(event, FailureEvent::FailedFunction { failures, .. }
                    if failures.iter().any(|f| f.contains_kind(kind)))
        })
    }

    pub fn with_event(&self, event: FailureEvent) -> ResolutionFailure {
        let mut events = self.events.clone();
        events.push(event);
        ResolutionFailure {
            requirement: self.requirement.clone(),
            events,
        }
    }

    /// Combine the events of two failures for the same requirement.
    pub fn merge(&self, other: &ResolutionFailure) -> ResolutionFailure {
        let mut events = self.events.clone();
        events.extend(other.events.iter().cloned());
        ResolutionFailure {
            requirement: self.requirement.clone(),
            events,
        }
    }

    pub fn recursive_requirement(&self) -> ResolutionFailure {
        self.with_event(FailureEvent::RecursiveRequirement)
    }

    pub fn no_functions(&self) -> ResolutionFailure {
        self.with_event(FailureEvent::NoFunctions)
    }

    pub fn could_not_resolve(&self) -> ResolutionFailure {
        self.with_event(FailureEvent::CouldNotResolve)
    }

    pub fn unsatisfied(&self) -> ResolutionFailure {
        self.with_event(FailureEvent::Unsatisfied)
    }

    pub fn market_data_missing(&self) -> ResolutionFailure {
        self.with_event(FailureEvent::MarketDataMissing)
    }

    pub fn get_requirements_failed(
        &self,
        function: FunctionApplication,
        message: impl Into<String>,
    ) -> ResolutionFailure {
        self.with_event(FailureEvent::GetRequirementsFailed {
            function,
            message: message.into(),
        })
    }

    pub fn get_additional_requirements_failed(
        &self,
        function: FunctionApplication,
        message: impl Into<String>,
    ) -> ResolutionFailure {
        self.with_event(FailureEvent::GetAdditionalRequirementsFailed {
            function,
            message: message.into(),
        })
    }

    pub fn get_results_failed(
        &self,
        function: FunctionApplication,
        message: impl Into<String>,
    ) -> ResolutionFailure {
        self.with_event(FailureEvent::GetResultsFailed {
            function,
            message: message.into(),
        })
    }

    pub fn blacklist_suppressed(&self, function: FunctionApplication) -> ResolutionFailure {
        self.with_event(FailureEvent::BlacklistSuppressed { function })
    }

    pub fn late_resolution_failure(&self, function: FunctionApplication) -> ResolutionFailure {
        self.with_event(FailureEvent::LateResolutionFailure { function })
    }

    pub fn failed_function(
        &self,
        function: FunctionApplication,
        satisfied: Vec<SatisfiedInput>,
        failures: Vec<ResolutionFailure>,
    ) -> ResolutionFailure {
        self.with_event(FailureEvent::FailedFunction {
            function,
            satisfied,
            failures,
        })
    }

    pub fn successful_function(
        &self,
        function: FunctionApplication,
        satisfied: Vec<SatisfiedInput>,
    ) -> ResolutionFailure {
        self.with_event(FailureEvent::SuccessfulFunction {
            function,
            satisfied,
        })
    }

    /// Dispatch every event to the visitor, in order.
    pub fn accept<V: ResolutionFailureVisitor + ?Sized>(&self, visitor: &mut V) -> Vec<V::Output> {
        let requirement = &self.requirement;
        self.events
            .iter()
            .map(|event| match event {
                FailureEvent::RecursiveRequirement => visitor.visit_recursive_requirement(requirement),
                FailureEvent::NoFunctions => visitor.visit_no_functions(requirement),
                FailureEvent::CouldNotResolve => visitor.visit_could_not_resolve(requirement),
                FailureEvent::Unsatisfied => visitor.visit_unsatisfied(requirement),
                FailureEvent::MarketDataMissing => visitor.visit_market_data_missing(requirement),
                FailureEvent::GetRequirementsFailed { function, message } => {
                    visitor.visit_get_requirements_failed(requirement, function, message)
                }
                FailureEvent::GetAdditionalRequirementsFailed { function, message } => {
                    visitor.visit_get_additional_requirements_failed(requirement, function, message)
                }
                FailureEvent::GetResultsFailed { function, message } => {
                    visitor.visit_get_results_failed(requirement, function, message)
                }
                FailureEvent::BlacklistSuppressed { function } => {
                    visitor.visit_blacklist_suppressed(requirement, function)
                }
                FailureEvent::LateResolutionFailure { function } => {
                    visitor.visit_late_resolution_failure(requirement, function)
                }
                FailureEvent::FailedFunction {
                    function,
                    satisfied,
                    failures,
                } => visitor.visit_failed_function(requirement, function, satisfied, failures),
                FailureEvent::SuccessfulFunction {
                    function,
                    satisfied,
                } => visitor.visit_successful_function(requirement, function, satisfied),
            })
            .collect()
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ResolutionFailureGatherer::gather(self).join("\n"))
    }
}

/// Traversal over a failure tree, dispatched on event kind.
pub trait ResolutionFailureVisitor {
    type Output;

    fn visit_recursive_requirement(&mut self, requirement: &ValueRequirement) -> Self::Output;
    fn visit_no_functions(&mut self, requirement: &ValueRequirement) -> Self::Output;
    fn visit_could_not_resolve(&mut self, requirement: &ValueRequirement) -> Self::Output;
    fn visit_unsatisfied(&mut self, requirement: &ValueRequirement) -> Self::Output;
    fn visit_market_data_missing(&mut self, requirement: &ValueRequirement) -> Self::Output;
    fn visit_get_requirements_failed(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
        message: &str,
    ) -> Self::Output;
    fn visit_get_additional_requirements_failed(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
        message: &str,
    ) -> Self::Output;
    fn visit_get_results_failed(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
        message: &str,
    ) -> Self::Output;
    fn visit_blacklist_suppressed(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
    ) -> Self::Output;
    fn visit_late_resolution_failure(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
    ) -> Self::Output;
    fn visit_failed_function(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
        satisfied: &[SatisfiedInput],
        failures: &[ResolutionFailure],
    ) -> Self::Output;
    fn visit_successful_function(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
        satisfied: &[SatisfiedInput],
    ) -> Self::Output;
}

/// Flattens a failure tree into indented, ordered diagnostic lines.
#[derive(Debug, Default)]
pub struct ResolutionFailureGatherer {
    lines: Vec<String>,
    depth: usize,
}

impl ResolutionFailureGatherer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gather(failure: &ResolutionFailure) -> Vec<String> {
        let mut gatherer = Self::new();
        failure.accept(&mut gatherer);
        gatherer.into_lines()
    }

    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    fn push(&mut self, line: String) {
        self.lines.push(format!("{}{}", "  ".repeat(self.depth), line));
    }

    fn push_satisfied(&mut self, satisfied: &[SatisfiedInput]) {
        for input in satisfied {
            self.push(format!(
                "  satisfied {} by {}",
                input.requirement, input.specification
            ));
        }
    }
}

impl ResolutionFailureVisitor for ResolutionFailureGatherer {
    type Output = ();

    fn visit_recursive_requirement(&mut self, requirement: &ValueRequirement) {
        self.push(format!("recursiveRequirement: {}", requirement));
    }

    fn visit_no_functions(&mut self, requirement: &ValueRequirement) {
        self.push(format!("noFunctions: {}", requirement));
    }

    fn visit_could_not_resolve(&mut self, requirement: &ValueRequirement) {
        self.push(format!("couldNotResolve: {}", requirement));
    }

    fn visit_unsatisfied(&mut self, requirement: &ValueRequirement) {
        self.push(format!("unsatisfied: {}", requirement));
    }

    fn visit_market_data_missing(&mut self, requirement: &ValueRequirement) {
        self.push(format!("marketDataMissing: {}", requirement));
    }

    fn visit_get_requirements_failed(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
        message: &str,
    ) {
        self.push(format!(
            "getRequirementsFailed: {} via {}: {}",
            requirement, function, message
        ));
    }

    fn visit_get_additional_requirements_failed(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
        message: &str,
    ) {
        self.push(format!(
            "getAdditionalRequirementsFailed: {} via {}: {}",
            requirement, function, message
        ));
    }

    fn visit_get_results_failed(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
        message: &str,
    ) {
        self.push(format!(
            "getResultsFailed: {} via {}: {}",
            requirement, function, message
        ));
    }

    fn visit_blacklist_suppressed(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
    ) {
        self.push(format!("blacklistSuppressed: {} via {}", requirement, function));
    }

    fn visit_late_resolution_failure(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
    ) {
        self.push(format!("lateResolutionFailure: {} via {}", requirement, function));
    }

    fn visit_failed_function(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
        satisfied: &[SatisfiedInput],
        failures: &[ResolutionFailure],
    ) {
        self.push(format!("failedFunction: {} via {}", requirement, function));
        self.push_satisfied(satisfied);
        self.depth += 1;
        for failure in failures {
            failure.accept(self);
        }
        self.depth -= 1;
    }

    fn visit_successful_function(
        &mut self,
        requirement: &ValueRequirement,
        function: &FunctionApplication,
        satisfied: &[SatisfiedInput],
    ) {
        self.push(format!("successfulFunction: {} via {}", requirement, function));
        self.push_satisfied(satisfied);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::properties::ValueProperties;
    use crate::core::target::UniqueId;

    fn target() -> ComputationTargetSpecification {
        ComputationTargetSpecification::primitive(UniqueId::new("Test", "A"))
    }

    fn application() -> FunctionApplication {
        FunctionApplication {
            function_id: "F1".to_string(),
            parameters: FunctionParameters::new(),
            target: target(),
            desired_output: ValueSpecification::new("Foo", target(), ValueProperties::none())
                .with_function("F1"),
        }
    }

    #[test]
    fn test_extension_does_not_mutate() {
        let base = ResolutionFailure::new(ValueRequirement::new("Foo", target()));
        let extended = base.no_functions();
        assert!(base.is_empty());
        assert_eq!(extended.events().len(), 1);
        assert_eq!(extended.events()[0].kind(), "noFunctions");
    }

    #[test]
    fn test_gatherer_flattens_nested_failures() {
        let input = ResolutionFailure::new(ValueRequirement::new("Bar", target())).no_functions();
        let failure = ResolutionFailure::new(ValueRequirement::new("Foo", target()))
            .failed_function(application(), Vec::new(), vec![input]);

        let lines = ResolutionFailureGatherer::gather(&failure);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("failedFunction: Foo"));
        assert!(lines[1].starts_with("  noFunctions: Bar"));
        assert!(failure.contains_kind("noFunctions"));
        assert!(!failure.contains_kind("marketDataMissing"));
    }

    #[test]
    fn test_wire_format_is_kind_tagged() {
        let failure = ResolutionFailure::new(ValueRequirement::new("Foo", target()))
            .late_resolution_failure(application());
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["events"][0]["kind"], "lateResolutionFailure");
        let back: ResolutionFailure = serde_json::from_value(json).unwrap();
        assert_eq!(back, failure);
    }
}

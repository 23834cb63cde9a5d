use crate::core::properties::ValueProperties;
use crate::core::target::{ComputationTargetSpecification, TargetReference};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A request for a named value on a target, constrained by properties.
///
/// Requirements are immutable and compared structurally, so two tasks that
/// ask for the same thing share one underlying resolution.
///
/// # Examples
///
/// ```
/// use depgraph_builder::core::requirement::ValueRequirement;
/// use depgraph_builder::core::target::{ComputationTargetSpecification, UniqueId};
/// use depgraph_builder::core::properties::ValueProperties;
///
/// let target = ComputationTargetSpecification::primitive(UniqueId::new("Test", "A"));
/// let requirement = ValueRequirement::new("Present_Value", target)
///     .with_constraints(ValueProperties::builder().with("Currency", "USD").build());
///
/// assert_eq!(requirement.value_name(), "Present_Value");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueRequirement {
    value_name: String,
    target: TargetReference,
    #[serde(default)]
    constraints: ValueProperties,
}

impl ValueRequirement {
    pub fn new(value_name: impl Into<String>, target: impl Into<TargetReference>) -> Self {
        Self {
            value_name: value_name.into(),
            target: target.into(),
            constraints: ValueProperties::none(),
        }
    }

    pub fn with_constraints(mut self, constraints: ValueProperties) -> Self {
        self.constraints = constraints;
        self
    }

    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    pub fn target(&self) -> &TargetReference {
        &self.target
    }

    pub fn constraints(&self) -> &ValueProperties {
        &self.constraints
    }

    /// The same requirement against an already resolved target.
    pub fn resolved_to(&self, target: ComputationTargetSpecification) -> ValueRequirement {
        ValueRequirement {
            value_name: self.value_name.clone(),
            target: TargetReference::Specification(target),
            constraints: self.constraints.clone(),
        }
    }
}

impl fmt::Display for ValueRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {} {}", self.value_name, self.target, self.constraints)
    }
}

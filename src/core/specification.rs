use crate::core::properties::{ValueProperties, FUNCTION};
use crate::core::requirement::ValueRequirement;
use crate::core::target::ComputationTargetSpecification;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A concrete, producible value: a value name on a resolved target with
/// properties that always include the producing function's identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueSpecification {
    value_name: String,
    target: ComputationTargetSpecification,
    properties: ValueProperties,
}

impl ValueSpecification {
    pub fn new(
        value_name: impl Into<String>,
        target: ComputationTargetSpecification,
        properties: ValueProperties,
    ) -> Self {
        Self {
            value_name: value_name.into(),
            target,
            properties,
        }
    }

    pub fn value_name(&self) -> &str {
        &self.value_name
    }

    pub fn target(&self) -> &ComputationTargetSpecification {
        &self.target
    }

    pub fn properties(&self) -> &ValueProperties {
        &self.properties
    }

    /// The identity of the producing function, from the [`FUNCTION`] property.
    pub fn function_id(&self) -> Option<&str> {
        self.properties.single_value(FUNCTION)
    }

    /// A copy stamped with the producing function's identity.
    pub fn with_function(&self, function_id: &str) -> ValueSpecification {
        ValueSpecification {
            value_name: self.value_name.clone(),
            target: self.target.clone(),
            properties: self.properties.copy().without(FUNCTION).with(FUNCTION, function_id).build(),
        }
    }

    /// A copy moved onto another target.
    pub fn with_target(&self, target: ComputationTargetSpecification) -> ValueSpecification {
        ValueSpecification {
            value_name: self.value_name.clone(),
            target,
            properties: self.properties.clone(),
        }
    }

    /// A copy with properties narrowed by the requirement's constraints.
    pub fn narrowed_by(&self, requirement: &ValueRequirement) -> ValueSpecification {
        ValueSpecification {
            value_name: self.value_name.clone(),
            target: self.target.clone(),
            properties: self.properties.narrow(requirement.constraints()),
        }
    }

    /// Whether this specification can be used to satisfy `requirement`.
    ///
    /// Value names and targets must match exactly (the requirement's target
    /// must already be resolved) and the requirement's constraints must be
    /// met by this specification's properties.
    pub fn satisfies(&self, requirement: &ValueRequirement) -> bool {
        self.value_name == requirement.value_name()
            && requirement.target().specification() == Some(&self.target)
            && requirement.constraints().is_satisfied_by(&self.properties)
    }

    /// A requirement that only this specification (or an equivalent) satisfies.
    pub fn to_requirement(&self) -> ValueRequirement {
        ValueRequirement::new(self.value_name.clone(), self.target.clone())
            .with_constraints(self.properties.clone())
    }
}

/// Whether `specification` satisfies `requirement`.
pub fn matches(specification: &ValueSpecification, requirement: &ValueRequirement) -> bool {
    specification.satisfies(requirement)
}

impl fmt::Display for ValueSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {} {}", self.value_name, self.target, self.properties)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::UniqueId;

    fn target() -> ComputationTargetSpecification {
        ComputationTargetSpecification::primitive(UniqueId::new("Test", "A"))
    }

    #[test]
    fn test_satisfies() {
        let spec = ValueSpecification::new(
            "Foo",
            target(),
            ValueProperties::builder().with("Currency", "USD").build(),
        )
        .with_function("F1");
        let plain = ValueRequirement::new("Foo", target());
        let usd = plain
            .clone()
            .with_constraints(ValueProperties::builder().with("Currency", "USD").build());
        let eur = plain
            .clone()
            .with_constraints(ValueProperties::builder().with("Currency", "EUR").build());
        assert!(matches(&spec, &plain));
        assert!(spec.satisfies(&usd));
        assert!(!spec.satisfies(&eur));
        assert!(!spec.satisfies(&ValueRequirement::new("Bar", target())));
    }

    #[test]
    fn test_function_identity() {
        let spec = ValueSpecification::new("Foo", target(), ValueProperties::none()).with_function("F1");
        assert_eq!(spec.function_id(), Some("F1"));
        assert_eq!(spec.with_function("F2").function_id(), Some("F2"));
    }

    #[test]
    fn test_to_requirement_round_trip() {
        let spec = ValueSpecification::new("Foo", target(), ValueProperties::none()).with_function("F1");
        assert!(spec.satisfies(&spec.to_requirement()));
    }
}

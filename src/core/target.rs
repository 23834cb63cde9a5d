use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// The kind of object a function computes over.
///
/// The declaration order is also the natural sort order used when tasks are
/// bucketed for scheduling (see [`crate::queue::ordered`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComputationTargetType {
    Primitive,
    Position,
    Trade,
    Security,
    PortfolioNode,
}

impl fmt::Display for ComputationTargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComputationTargetType::Primitive => "PRIMITIVE",
            ComputationTargetType::Position => "POSITION",
            ComputationTargetType::Trade => "TRADE",
            ComputationTargetType::Security => "SECURITY",
            ComputationTargetType::PortfolioNode => "PORTFOLIO_NODE",
        };
        f.write_str(name)
    }
}

/// A resolved, versionless object identifier of the form `scheme~value`.
///
/// # Examples
///
/// ```
/// use depgraph_builder::core::target::UniqueId;
///
/// let id = UniqueId::new("Sec", "AAPL");
/// assert_eq!(id.to_string(), "Sec~AAPL");
/// assert_eq!(UniqueId::parse("Sec~AAPL"), Some(id));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UniqueId {
    scheme: String,
    value: String,
}

impl UniqueId {
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    /// Parse the `scheme~value` textual form.
    pub fn parse(text: &str) -> Option<Self> {
        let (scheme, value) = text.split_once('~')?;
        if scheme.is_empty() || value.is_empty() {
            return None;
        }
        Some(Self::new(scheme, value))
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.scheme, self.value)
    }
}

/// An external (vendor or market) identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExternalId {
    scheme: String,
    value: String,
}

impl ExternalId {
    pub fn new(scheme: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            value: value.into(),
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for ExternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.scheme, self.value)
    }
}

/// A set of external identifiers that all refer to the same object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalIdBundle(BTreeSet<ExternalId>);

impl ExternalIdBundle {
    pub fn of(id: ExternalId) -> Self {
        Self(BTreeSet::from([id]))
    }

    pub fn ids(&self) -> impl Iterator<Item = &ExternalId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ExternalId> for ExternalIdBundle {
    fn from_iter<T: IntoIterator<Item = ExternalId>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ExternalIdBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<String> = self.0.iter().map(|id| id.to_string()).collect();
        write!(f, "Bundle[{}]", ids.join(", "))
    }
}

/// A resolved reference to the object a value is computed over.
///
/// A specification with no unique identifier is the "null" target used by
/// functions that compute over nothing in particular.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComputationTargetSpecification {
    target_type: ComputationTargetType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    unique_id: Option<UniqueId>,
}

impl ComputationTargetSpecification {
    pub fn new(target_type: ComputationTargetType, unique_id: UniqueId) -> Self {
        Self {
            target_type,
            unique_id: Some(unique_id),
        }
    }

    /// The null target.
    pub fn null() -> Self {
        Self {
            target_type: ComputationTargetType::Primitive,
            unique_id: None,
        }
    }

    pub fn primitive(unique_id: UniqueId) -> Self {
        Self::new(ComputationTargetType::Primitive, unique_id)
    }

    pub fn target_type(&self) -> ComputationTargetType {
        self.target_type
    }

    pub fn unique_id(&self) -> Option<&UniqueId> {
        self.unique_id.as_ref()
    }

    pub fn is_null(&self) -> bool {
        self.unique_id.is_none()
    }

    /// Textual identifier, empty for the null target.
    pub fn identifier(&self) -> String {
        self.unique_id
            .as_ref()
            .map(|id| id.to_string())
            .unwrap_or_default()
    }
}

impl fmt::Display for ComputationTargetSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unique_id {
            Some(id) => write!(f, "{} {}", self.target_type, id),
            None => write!(f, "{} NULL", self.target_type),
        }
    }
}

/// How a requirement names its target: either already resolved, or as an
/// identifier bundle to be resolved lazily by a
/// [`TargetResolver`](crate::engine::target_resolution::TargetResolver).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "reference", rename_all = "camelCase")]
pub enum TargetReference {
    Specification(ComputationTargetSpecification),
    External {
        target_type: ComputationTargetType,
        identifiers: ExternalIdBundle,
    },
}

impl TargetReference {
    pub fn external(target_type: ComputationTargetType, identifiers: ExternalIdBundle) -> Self {
        TargetReference::External {
            target_type,
            identifiers,
        }
    }

    pub fn target_type(&self) -> ComputationTargetType {
        match self {
            TargetReference::Specification(spec) => spec.target_type(),
            TargetReference::External { target_type, .. } => *target_type,
        }
    }

    /// The resolved specification, if this reference is already resolved.
    pub fn specification(&self) -> Option<&ComputationTargetSpecification> {
        match self {
            TargetReference::Specification(spec) => Some(spec),
            TargetReference::External { .. } => None,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, TargetReference::External { .. })
    }

    /// Textual identifier used for ordering and diagnostics.
    pub fn identifier(&self) -> String {
        match self {
            TargetReference::Specification(spec) => spec.identifier(),
            TargetReference::External { identifiers, .. } => identifiers.to_string(),
        }
    }
}

impl From<ComputationTargetSpecification> for TargetReference {
    fn from(spec: ComputationTargetSpecification) -> Self {
        TargetReference::Specification(spec)
    }
}

impl fmt::Display for TargetReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetReference::Specification(spec) => write!(f, "{}", spec),
            TargetReference::External {
                target_type,
                identifiers,
            } => write!(f, "{} {}", target_type, identifiers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_parse() {
        assert_eq!(UniqueId::parse("Test~A"), Some(UniqueId::new("Test", "A")));
        assert_eq!(UniqueId::parse("Test"), None);
        assert_eq!(UniqueId::parse("~A"), None);
    }

    #[test]
    fn test_specification_display() {
        let spec = ComputationTargetSpecification::new(
            ComputationTargetType::Security,
            UniqueId::new("Sec", "X"),
        );
        assert_eq!(spec.to_string(), "SECURITY Sec~X");
        assert_eq!(ComputationTargetSpecification::null().to_string(), "PRIMITIVE NULL");
    }

    #[test]
    fn test_reference_identifier() {
        let bundle = ExternalIdBundle::of(ExternalId::new("Ticker", "AAPL"));
        let reference = TargetReference::external(ComputationTargetType::Security, bundle);
        assert!(reference.is_external());
        assert_eq!(reference.identifier(), "Bundle[Ticker~AAPL]");
        assert!(reference.specification().is_none());
    }
}

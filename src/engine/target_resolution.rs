//! Resolution of external identifier bundles to concrete targets.

use crate::core::target::{
    ComputationTargetSpecification, ComputationTargetType, ExternalId, TargetReference,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Resolves target references at a given as-of instant. A `None` answer
/// surfaces as a `couldNotResolve` failure for the requirement.
pub trait TargetResolver: Send + Sync {
    fn resolve(
        &self,
        reference: &TargetReference,
        as_of: DateTime<Utc>,
    ) -> Option<ComputationTargetSpecification>;
}

/// Accepts resolved references as they are and resolves nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecificationOnlyResolver;

impl TargetResolver for SpecificationOnlyResolver {
    fn resolve(
        &self,
        reference: &TargetReference,
        _as_of: DateTime<Utc>,
    ) -> Option<ComputationTargetSpecification> {
        reference.specification().cloned()
    }
}

/// Resolves external identifiers from an in-memory table. Entries carry the
/// instant they became valid; lookups ignore entries newer than `as_of`.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTargetResolver {
    entries: HashMap<(ComputationTargetType, ExternalId), Vec<(DateTime<Utc>, ComputationTargetSpecification)>>,
}

impl InMemoryTargetResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `id` to `target`, valid from `valid_from` onwards.
    pub fn insert(
        &mut self,
        id: ExternalId,
        target: ComputationTargetSpecification,
        valid_from: DateTime<Utc>,
    ) {
        let versions = self.entries.entry((target.target_type(), id)).or_default();
        versions.push((valid_from, target));
        versions.sort_by_key(|(from, _)| *from);
    }

    pub fn with(
        mut self,
        id: ExternalId,
        target: ComputationTargetSpecification,
        valid_from: DateTime<Utc>,
    ) -> Self {
        self.insert(id, target, valid_from);
        self
    }
}

impl TargetResolver for InMemoryTargetResolver {
    fn resolve(
        &self,
        reference: &TargetReference,
        as_of: DateTime<Utc>,
    ) -> Option<ComputationTargetSpecification> {
        match reference {
            TargetReference::Specification(spec) => Some(spec.clone()),
            TargetReference::External {
                target_type,
                identifiers,
            } => identifiers.ids().find_map(|id| {
                self.entries
                    .get(&(*target_type, id.clone()))?
                    .iter()
                    .rev()
                    .find(|(from, _)| *from <= as_of)
                    .map(|(_, target)| target.clone())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::{ExternalIdBundle, UniqueId};
    use chrono::Duration;

    #[test]
    fn test_versioned_lookup() {
        let now = Utc::now();
        let old = ComputationTargetSpecification::new(
            ComputationTargetType::Security,
            UniqueId::new("Sec", "1"),
        );
        let new = ComputationTargetSpecification::new(
            ComputationTargetType::Security,
            UniqueId::new("Sec", "2"),
        );
        let ticker = ExternalId::new("Ticker", "AAPL");
        let resolver = InMemoryTargetResolver::new()
            .with(ticker.clone(), old.clone(), now - Duration::days(10))
            .with(ticker.clone(), new.clone(), now - Duration::days(1));
        let reference =
            TargetReference::external(ComputationTargetType::Security, ExternalIdBundle::of(ticker));

        assert_eq!(resolver.resolve(&reference, now), Some(new));
        assert_eq!(resolver.resolve(&reference, now - Duration::days(5)), Some(old));
        assert_eq!(resolver.resolve(&reference, now - Duration::days(20)), None);
    }

    #[test]
    fn test_specification_only() {
        let spec = ComputationTargetSpecification::primitive(UniqueId::new("Test", "A"));
        let resolver = SpecificationOnlyResolver;
        assert_eq!(resolver.resolve(&spec.clone().into(), Utc::now()), Some(spec));
    }
}

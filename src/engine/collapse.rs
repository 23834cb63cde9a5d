//! Target collapsing: merging work on equivalent targets into one node.
//!
//! A collapser decides, per function, whether two targets processed by that
//! function can be combined into a single composite target. The dependency
//! graph applies the decision pairwise until nothing more merges.

use crate::core::target::{ComputationTargetSpecification, ComputationTargetType, UniqueId};
use crate::function::ParameterizedFunction;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Separator between component identifiers of a composite target.
pub const COMPOSITE_SEPARATOR: &str = ",";

pub trait ComputationTargetCollapser: Send + Sync {
    /// Whether collapsing is ever considered for this function.
    fn can_apply_to(&self, function: &ParameterizedFunction) -> bool;

    /// The composite target replacing `a` and `b`, or `None` if the pair
    /// must stay distinct.
    fn collapse(
        &self,
        function: &ParameterizedFunction,
        a: &ComputationTargetSpecification,
        b: &ComputationTargetSpecification,
    ) -> Option<ComputationTargetSpecification>;
}

/// A collapsing rule for one target type.
pub trait TargetTypeCollapser: Send + Sync {
    fn can_collapse(
        &self,
        a: &ComputationTargetSpecification,
        b: &ComputationTargetSpecification,
    ) -> bool;

    fn collapse(
        &self,
        a: &ComputationTargetSpecification,
        b: &ComputationTargetSpecification,
    ) -> Option<ComputationTargetSpecification>;
}

/// Dispatches to a [`TargetTypeCollapser`] per target type, optionally
/// restricted to a set of functions (by unique id).
#[derive(Default)]
pub struct DefaultComputationTargetCollapser {
    rules: HashMap<ComputationTargetType, Arc<dyn TargetTypeCollapser>>,
    functions: Option<HashSet<String>>,
}

impl DefaultComputationTargetCollapser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(
        mut self,
        target_type: ComputationTargetType,
        rule: Arc<dyn TargetTypeCollapser>,
    ) -> Self {
        self.rules.insert(target_type, rule);
        self
    }

    /// Only collapse nodes of these functions.
    pub fn for_functions<I, S>(mut self, unique_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.functions = Some(unique_ids.into_iter().map(Into::into).collect());
        self
    }
}

impl fmt::Debug for DefaultComputationTargetCollapser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultComputationTargetCollapser")
            .field("target_types", &self.rules.keys().collect::<Vec<_>>())
            .field("functions", &self.functions)
            .finish()
    }
}

impl ComputationTargetCollapser for DefaultComputationTargetCollapser {
    fn can_apply_to(&self, function: &ParameterizedFunction) -> bool {
        self.rules.contains_key(&function.function().target_type())
            && self
                .functions
                .as_ref()
                .map_or(true, |ids| ids.contains(function.unique_id()))
    }

    fn collapse(
        &self,
        _function: &ParameterizedFunction,
        a: &ComputationTargetSpecification,
        b: &ComputationTargetSpecification,
    ) -> Option<ComputationTargetSpecification> {
        if a.target_type() != b.target_type() || a == b {
            return None;
        }
        let rule = self.rules.get(&a.target_type())?;
        if !rule.can_collapse(a, b) {
            return None;
        }
        rule.collapse(a, b)
    }
}

/// Collapses targets of the same scheme whose identifiers start with the
/// same prefix. The composite identifier is the sorted, comma-joined set of
/// component identifiers, so the result does not depend on merge order.
#[derive(Debug, Clone, Copy)]
pub struct PrefixTargetCollapser {
    prefix_len: usize,
}

impl PrefixTargetCollapser {
    pub fn new(prefix_len: usize) -> Self {
        Self { prefix_len }
    }

    fn prefix<'a>(&self, value: &'a str) -> &'a str {
        match value.char_indices().nth(self.prefix_len) {
            Some((end, _)) => &value[..end],
            None => value,
        }
    }
}

impl Default for PrefixTargetCollapser {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Component identifiers of a (possibly composite) target value.
pub fn components(value: &str) -> BTreeSet<&str> {
    value.split(COMPOSITE_SEPARATOR).collect()
}

impl TargetTypeCollapser for PrefixTargetCollapser {
    fn can_collapse(
        &self,
        a: &ComputationTargetSpecification,
        b: &ComputationTargetSpecification,
    ) -> bool {
        match (a.unique_id(), b.unique_id()) {
            (Some(x), Some(y)) => {
                x.scheme() == y.scheme()
                    && x != y
                    && self.prefix(x.value()) == self.prefix(y.value())
            }
            _ => false,
        }
    }

    fn collapse(
        &self,
        a: &ComputationTargetSpecification,
        b: &ComputationTargetSpecification,
    ) -> Option<ComputationTargetSpecification> {
        let (x, y) = (a.unique_id()?, b.unique_id()?);
        let mut merged = components(x.value());
        merged.extend(components(y.value()));
        let joined: Vec<&str> = merged.into_iter().collect();
        Some(ComputationTargetSpecification::new(
            a.target_type(),
            UniqueId::new(x.scheme(), joined.join(COMPOSITE_SEPARATOR)),
        ))
    }
}

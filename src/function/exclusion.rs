use crate::function::ParameterizedFunction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// A named set of mutually exclusive functions: at most one member may
/// appear along any single resolution path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExclusionGroup(String);

impl ExclusionGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExclusionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Policy mapping functions to exclusion groups. Consulted once per function
/// when the resolver is compiled.
pub trait FunctionExclusionGroups: Send + Sync {
    fn group_of(&self, function: &ParameterizedFunction) -> Option<ExclusionGroup>;
}

/// Exclusion groups assigned by function unique id.
#[derive(Debug, Clone, Default)]
pub struct ExclusionGroupMap {
    groups: HashMap<String, ExclusionGroup>,
}

impl ExclusionGroupMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, unique_id: impl Into<String>, group: impl Into<String>) -> Self {
        self.groups.insert(unique_id.into(), ExclusionGroup::new(group));
        self
    }
}

impl FunctionExclusionGroups for ExclusionGroupMap {
    fn group_of(&self, function: &ParameterizedFunction) -> Option<ExclusionGroup> {
        self.groups.get(function.unique_id()).cloned()
    }
}

/// The exclusion groups already in use along a resolution path.
///
/// Travels from parent task to child task; never shared globally.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ExclusionState(Arc<BTreeSet<ExclusionGroup>>);

impl ExclusionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, group: &ExclusionGroup) -> bool {
        self.0.contains(group)
    }

    /// The state a child inherits after a member of `group` was chosen.
    pub fn with(&self, group: Option<&ExclusionGroup>) -> ExclusionState {
        match group {
            Some(group) if !self.0.contains(group) => {
                let mut groups = (*self.0).clone();
                groups.insert(group.clone());
                ExclusionState(Arc::new(groups))
            }
            _ => self.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

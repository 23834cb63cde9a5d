//! The asynchronous, backtracking resolution engine.
//!
//! Every requirement is resolved by a [`task::ResolveTask`] shared through
//! the [`context::GraphBuildingContext`]. Tasks never block: each unit of
//! work is a runnable on the context's run queue, and results flow back to
//! interested parties through [`callback::ResolvedValueCallback`]s.
//!
//! Resolutions are speculative. A [`ResolvedValue`] carries the tree of
//! function applications that produced it, and nothing touches the shared
//! dependency graph until a top-level consumer commits that tree.

pub mod callback;
pub mod candidate;
pub mod collapse;
pub mod context;
pub mod failure;
pub mod market_data;
pub mod target_resolution;
pub mod task;

use crate::core::specification::ValueSpecification;
use crate::core::target::ComputationTargetSpecification;
use crate::function::ParameterizedFunction;
use crate::graph::node::NodeId;
use std::collections::BTreeSet;
use std::sync::Arc;

/// How a resolved value comes to exist.
#[derive(Debug)]
pub enum Production {
    /// Already present in the graph being extended.
    Existing(NodeId),
    /// Produced by applying a function to a target, from the given inputs.
    Function {
        function: Arc<ParameterizedFunction>,
        target: ComputationTargetSpecification,
        inputs: Vec<ResolvedValue>,
        outputs: BTreeSet<ValueSpecification>,
    },
}

/// One candidate resolution of a requirement.
#[derive(Debug, Clone)]
pub struct ResolvedValue {
    specification: ValueSpecification,
    production: Arc<Production>,
}

impl ResolvedValue {
    pub fn new(specification: ValueSpecification, production: Production) -> Self {
        Self {
            specification,
            production: Arc::new(production),
        }
    }

    pub fn existing(specification: ValueSpecification, node: NodeId) -> Self {
        Self::new(specification, Production::Existing(node))
    }

    pub fn specification(&self) -> &ValueSpecification {
        &self.specification
    }

    pub fn production(&self) -> &Production {
        &self.production
    }

    /// Identity of the producing function, if it is not an existing node.
    pub fn function_id(&self) -> Option<&str> {
        match self.production.as_ref() {
            Production::Function { function, .. } => Some(function.unique_id()),
            Production::Existing(_) => None,
        }
    }
}

use crate::core::specification::ValueSpecification;
use crate::core::target::ComputationTargetSpecification;
use crate::function::ParameterizedFunction;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Identifier of a node within one [`DependencyGraph`](super::dependency_graph::DependencyGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(usize);

impl NodeId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One function applied to one target.
///
/// Inputs map each consumed specification to the node producing it.
/// Dependents are the inverse of other nodes' inputs and are maintained by
/// the owning graph whenever an input edge changes.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    id: NodeId,
    function: Arc<ParameterizedFunction>,
    target: ComputationTargetSpecification,
    inputs: BTreeMap<ValueSpecification, NodeId>,
    outputs: BTreeSet<ValueSpecification>,
    dependents: BTreeSet<NodeId>,
}

impl DependencyNode {
    pub(crate) fn new(
        id: NodeId,
        function: Arc<ParameterizedFunction>,
        target: ComputationTargetSpecification,
    ) -> Self {
        Self {
            id,
            function,
            target,
            inputs: BTreeMap::new(),
            outputs: BTreeSet::new(),
            dependents: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn function(&self) -> &Arc<ParameterizedFunction> {
        &self.function
    }

    pub fn target(&self) -> &ComputationTargetSpecification {
        &self.target
    }

    /// Consumed specifications with their producing nodes.
    pub fn inputs(&self) -> &BTreeMap<ValueSpecification, NodeId> {
        &self.inputs
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Distinct producers this node consumes from.
    pub fn input_nodes(&self) -> BTreeSet<NodeId> {
        self.inputs.values().copied().collect()
    }

    pub fn outputs(&self) -> &BTreeSet<ValueSpecification> {
        &self.outputs
    }

    pub fn has_output_value(&self, specification: &ValueSpecification) -> bool {
        self.outputs.contains(specification)
    }

    pub fn dependents(&self) -> &BTreeSet<NodeId> {
        &self.dependents
    }

    /// Whether `producer` supplies any of this node's inputs.
    pub fn consumes_from(&self, producer: NodeId) -> bool {
        self.inputs.values().any(|from| *from == producer)
    }

    pub(crate) fn set_target(&mut self, target: ComputationTargetSpecification) {
        self.target = target;
    }

    pub(crate) fn insert_input(&mut self, specification: ValueSpecification, producer: NodeId) -> Option<NodeId> {
        self.inputs.insert(specification, producer)
    }

    pub(crate) fn remove_input(&mut self, specification: &ValueSpecification) -> Option<NodeId> {
        self.inputs.remove(specification)
    }

    pub(crate) fn insert_output(&mut self, specification: ValueSpecification) -> bool {
        self.outputs.insert(specification)
    }

    pub(crate) fn remove_output(&mut self, specification: &ValueSpecification) -> bool {
        self.outputs.remove(specification)
    }

    pub(crate) fn insert_dependent(&mut self, node: NodeId) {
        self.dependents.insert(node);
    }

    pub(crate) fn remove_dependent(&mut self, node: NodeId) {
        self.dependents.remove(&node);
    }
}

impl fmt::Display for DependencyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} on {}", self.id, self.function, self.target)
    }
}

use crate::core::requirement::ValueRequirement;
use crate::core::specification::ValueSpecification;
use crate::core::target::ComputationTargetSpecification;
use crate::engine::collapse::ComputationTargetCollapser;
use crate::engine::{Production, ResolvedValue};
use crate::function::ParameterizedFunction;
use crate::graph::node::{DependencyNode, NodeId};
use log::debug;
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Structural violations of the dependency graph.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("no node produces {0}")]
    UnknownValue(ValueSpecification),

    #[error("{0} is not an output of node {1}")]
    NotAnOutput(ValueSpecification, NodeId),

    #[error("{0} is already produced by node {1}")]
    AlreadyProduced(ValueSpecification, NodeId),

    #[error("edge from {producer} to {consumer} would close a cycle")]
    Cycle { producer: NodeId, consumer: NodeId },

    #[error("graph contains a cycle through node {0}")]
    Cyclic(NodeId),
}

/// A DAG of function applications.
///
/// Besides the nodes, the graph records which top-level requirements each
/// output was produced for ("terminal outputs"); pruning keeps exactly
/// those outputs and whatever they transitively consume.
///
/// # Examples
///
/// ```
/// use depgraph_builder::graph::dependency_graph::DependencyGraph;
///
/// let graph = DependencyGraph::new("Default");
/// assert_eq!(graph.name(), "Default");
/// assert!(graph.is_empty());
/// assert!(graph.is_acyclic());
/// ```
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    name: String,
    next_id: usize,
    nodes: BTreeMap<NodeId, DependencyNode>,
    /// Output specification -> producing node
    producers: HashMap<ValueSpecification, NodeId>,
    /// Function unique id -> nodes applying it
    by_function: HashMap<String, BTreeSet<NodeId>>,
    /// (value name, target) -> outputs, for satisfaction lookups
    by_value: HashMap<(String, ComputationTargetSpecification), BTreeSet<ValueSpecification>>,
    terminal_outputs: BTreeMap<ValueSpecification, BTreeSet<ValueRequirement>>,
    /// Specifications renamed by target collapsing, old -> new
    rewrites: HashMap<ValueSpecification, ValueSpecification>,
}

impl DependencyGraph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct output specifications.
    pub fn value_count(&self) -> usize {
        self.producers.len()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &DependencyNode> {
        self.nodes.values()
    }

    pub fn node(&self, id: NodeId) -> Option<&DependencyNode> {
        self.nodes.get(&id)
    }

    /// Nodes applying the function with this unique id.
    pub fn nodes_of(&self, function_id: &str) -> Vec<&DependencyNode> {
        self.by_function
            .get(function_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    pub fn producer_of(&self, specification: &ValueSpecification) -> Option<NodeId> {
        self.producers
            .get(&self.current_specification(specification))
            .copied()
    }

    pub fn has_output_value(&self, specification: &ValueSpecification) -> bool {
        self.producer_of(specification).is_some()
    }

    pub fn get_dependent_nodes(&self, id: NodeId) -> Option<&BTreeSet<NodeId>> {
        self.nodes.get(&id).map(DependencyNode::dependents)
    }

    pub fn get_input_count(&self, id: NodeId) -> Option<usize> {
        self.nodes.get(&id).map(DependencyNode::input_count)
    }

    /// Every output produced for a top-level requirement, with the
    /// requirements it satisfies.
    pub fn terminal_outputs(&self) -> &BTreeMap<ValueSpecification, BTreeSet<ValueRequirement>> {
        &self.terminal_outputs
    }

    /// The terminal output already satisfying a top-level requirement.
    pub fn satisfied_requirement(&self, requirement: &ValueRequirement) -> Option<&ValueSpecification> {
        self.terminal_outputs
            .iter()
            .find(|(_, requirements)| requirements.contains(requirement))
            .map(|(spec, _)| spec)
    }

    /// The specification as it is named now, after any collapsing.
    pub fn current_specification(&self, specification: &ValueSpecification) -> ValueSpecification {
        let mut current = specification;
        for _ in 0..=self.rewrites.len() {
            match self.rewrites.get(current) {
                Some(next) if next != current => current = next,
                _ => break,
            }
        }
        current.clone()
    }

    /// An existing output satisfying `requirement`, whose target must be
    /// resolved.
    pub fn find_satisfying(&self, requirement: &ValueRequirement) -> Option<(ValueSpecification, NodeId)> {
        self.find_satisfying_where(requirement, |_| false)
    }

    /// As [`find_satisfying`](Self::find_satisfying), skipping any output
    /// whose producer, or anything it transitively consumes, applies a
    /// function for which `excluded` returns true.
    pub fn find_satisfying_where<F>(
        &self,
        requirement: &ValueRequirement,
        excluded: F,
    ) -> Option<(ValueSpecification, NodeId)>
    where
        F: Fn(&str) -> bool,
    {
        let target = requirement.target().specification()?;
        self.by_value
            .get(&(requirement.value_name().to_string(), target.clone()))?
            .iter()
            .filter(|spec| spec.satisfies(requirement))
            .filter_map(|spec| self.producers.get(spec).map(|id| (spec.clone(), *id)))
            .find(|(_, id)| !self.closure_applies(*id, &excluded))
    }

    /// Whether `id` or any node upstream of it applies a matching function.
    fn closure_applies<F>(&self, id: NodeId, matches: &F) -> bool
    where
        F: Fn(&str) -> bool,
    {
        let mut visited = BTreeSet::new();
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if matches(node.function().unique_id()) {
                return true;
            }
            pending.extend(node.input_nodes());
        }
        false
    }

    pub fn add_node(
        &mut self,
        function: Arc<ParameterizedFunction>,
        target: ComputationTargetSpecification,
    ) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        self.by_function
            .entry(function.unique_id().to_string())
            .or_default()
            .insert(id);
        self.nodes.insert(id, DependencyNode::new(id, function, target));
        id
    }

    pub fn add_output(&mut self, node: NodeId, specification: ValueSpecification) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&node) {
            return Err(GraphError::UnknownNode(node));
        }
        match self.producers.get(&specification) {
            Some(&producer) if producer != node => {
                Err(GraphError::AlreadyProduced(specification, producer))
            }
            Some(_) => Ok(()),
            None => {
                self.register_output(node, specification);
                Ok(())
            }
        }
    }

    /// Make `consumer` consume `specification` from `producer`. The
    /// producer's dependent set reflects the new edge immediately.
    pub fn add_input(
        &mut self,
        consumer: NodeId,
        specification: ValueSpecification,
        producer: NodeId,
    ) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&consumer) {
            return Err(GraphError::UnknownNode(consumer));
        }
        let Some(producing) = self.nodes.get(&producer) else {
            return Err(GraphError::UnknownNode(producer));
        };
        if !producing.has_output_value(&specification) {
            return Err(GraphError::NotAnOutput(specification, producer));
        }
        if self.depends_on(producer, consumer) {
            return Err(GraphError::Cycle { producer, consumer });
        }
        self.link(consumer, specification, producer);
        Ok(())
    }

    /// Record `specification` as satisfying a top-level requirement.
    pub fn add_terminal_output(
        &mut self,
        specification: ValueSpecification,
        requirement: ValueRequirement,
    ) -> Result<(), GraphError> {
        let specification = self.current_specification(&specification);
        if !self.producers.contains_key(&specification) {
            return Err(GraphError::UnknownValue(specification));
        }
        self.terminal_outputs
            .entry(specification)
            .or_default()
            .insert(requirement);
        Ok(())
    }

    /// Splice an accepted resolution of `requirement` into the graph.
    ///
    /// Function applications already present for the same function and
    /// target are extended rather than duplicated, unless extending them
    /// would close a cycle. With a collapser, every touched node is then
    /// collapsed as far as the collapser allows. Returns the specification
    /// now satisfying `requirement`.
    pub fn add_resolved_value(
        &mut self,
        requirement: &ValueRequirement,
        value: &ResolvedValue,
        collapser: Option<&dyn ComputationTargetCollapser>,
    ) -> Result<ValueSpecification, GraphError> {
        self.validate(value)?;
        let mut touched = BTreeSet::new();
        let (specification, _) = self.splice(value, &mut touched)?;
        self.terminal_outputs
            .entry(specification.clone())
            .or_default()
            .insert(requirement.clone());
        if let Some(collapser) = collapser {
            self.collapse_nodes(collapser, touched.into_iter().collect());
        }
        Ok(self.current_specification(&specification))
    }

    fn validate(&self, value: &ResolvedValue) -> Result<(), GraphError> {
        match value.production() {
            Production::Existing(_) => {
                let specification = self.current_specification(value.specification());
                if self.producers.contains_key(&specification) {
                    Ok(())
                } else {
                    Err(GraphError::UnknownValue(specification))
                }
            }
            Production::Function { inputs, .. } => {
                inputs.iter().try_for_each(|input| self.validate(input))
            }
        }
    }

    fn splice(
        &mut self,
        value: &ResolvedValue,
        touched: &mut BTreeSet<NodeId>,
    ) -> Result<(ValueSpecification, NodeId), GraphError> {
        let specification = self.current_specification(value.specification());
        if let Some(&producer) = self.producers.get(&specification) {
            return Ok((specification, producer));
        }
        let Production::Function {
            function,
            target,
            inputs,
            outputs,
        } = value.production()
        else {
            return Err(GraphError::UnknownValue(specification));
        };

        let mut spliced = Vec::with_capacity(inputs.len());
        for input in inputs {
            spliced.push(self.splice(input, touched)?);
        }
        let node = match self.reusable_node(function, target, &spliced) {
            Some(node) => node,
            None => self.add_node(Arc::clone(function), target.clone()),
        };
        for (input, producer) in spliced {
            self.link(node, input, producer);
        }
        for output in outputs {
            let output = self.current_specification(output);
            if !self.producers.contains_key(&output) {
                self.register_output(node, output);
            }
        }
        if !self.producers.contains_key(&specification) {
            self.register_output(node, specification.clone());
        }
        touched.insert(node);
        Ok((specification, node))
    }

    /// A node applying `function` to `target` that can take these inputs
    /// without closing a cycle.
    fn reusable_node(
        &self,
        function: &ParameterizedFunction,
        target: &ComputationTargetSpecification,
        inputs: &[(ValueSpecification, NodeId)],
    ) -> Option<NodeId> {
        self.by_function
            .get(function.unique_id())?
            .iter()
            .copied()
            .find(|&id| {
                self.nodes.get(&id).map_or(false, |node| node.target() == target)
                    && inputs
                        .iter()
                        .all(|(_, producer)| !self.depends_on(*producer, id))
            })
    }

    /// Whether `from` is `to` or consumes, transitively, from `to`.
    pub fn depends_on(&self, from: NodeId, to: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if !seen.insert(id) {
                continue;
            }
            if let Some(node) = self.nodes.get(&id) {
                stack.extend(node.inputs().values().copied());
            }
        }
        false
    }

    fn register_output(&mut self, node: NodeId, specification: ValueSpecification) {
        let Some(producing) = self.nodes.get_mut(&node) else {
            return;
        };
        producing.insert_output(specification.clone());
        self.by_value
            .entry((
                specification.value_name().to_string(),
                specification.target().clone(),
            ))
            .or_default()
            .insert(specification.clone());
        self.producers.insert(specification, node);
    }

    fn unregister_output(&mut self, node: NodeId, specification: &ValueSpecification) {
        if let Some(producing) = self.nodes.get_mut(&node) {
            producing.remove_output(specification);
        }
        if self.producers.get(specification) == Some(&node) {
            self.producers.remove(specification);
        }
        let key = (
            specification.value_name().to_string(),
            specification.target().clone(),
        );
        if let Some(outputs) = self.by_value.get_mut(&key) {
            outputs.remove(specification);
            if outputs.is_empty() {
                self.by_value.remove(&key);
            }
        }
    }

    fn link(&mut self, consumer: NodeId, specification: ValueSpecification, producer: NodeId) {
        let previous = match self.nodes.get_mut(&consumer) {
            Some(node) => node.insert_input(specification, producer),
            None => return,
        };
        if let Some(previous) = previous.filter(|p| *p != producer) {
            self.release_dependent(previous, consumer);
        }
        if let Some(node) = self.nodes.get_mut(&producer) {
            node.insert_dependent(consumer);
        }
    }

    fn unlink(&mut self, consumer: NodeId, specification: &ValueSpecification) {
        let removed = self
            .nodes
            .get_mut(&consumer)
            .and_then(|node| node.remove_input(specification));
        if let Some(producer) = removed {
            self.release_dependent(producer, consumer);
        }
    }

    fn release_dependent(&mut self, producer: NodeId, consumer: NodeId) {
        let still_consumes = self
            .nodes
            .get(&consumer)
            .map_or(false, |node| node.consumes_from(producer));
        if !still_consumes {
            if let Some(node) = self.nodes.get_mut(&producer) {
                node.remove_dependent(consumer);
            }
        }
    }

    fn remove_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let outputs: Vec<ValueSpecification> = node.outputs().iter().cloned().collect();
        let inputs: Vec<ValueSpecification> = node.inputs().keys().cloned().collect();
        let dependents: Vec<NodeId> = node.dependents().iter().copied().collect();
        let function_id = node.function().unique_id().to_string();

        for dependent in dependents {
            let consumed: Vec<ValueSpecification> = self
                .nodes
                .get(&dependent)
                .map(|d| {
                    d.inputs()
                        .iter()
                        .filter(|(_, producer)| **producer == id)
                        .map(|(spec, _)| spec.clone())
                        .collect()
                })
                .unwrap_or_default();
            for spec in consumed {
                self.unlink(dependent, &spec);
            }
        }
        for spec in inputs {
            self.unlink(id, &spec);
        }
        for spec in outputs {
            self.unregister_output(id, &spec);
            self.terminal_outputs.remove(&spec);
        }
        if let Some(ids) = self.by_function.get_mut(&function_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_function.remove(&function_id);
            }
        }
        self.nodes.remove(&id);
    }

    /// Drop every output that no node consumes and no top-level requirement
    /// asked for, then every node left without outputs, until nothing more
    /// can go. Returns the number of outputs removed; a second call on the
    /// same graph removes nothing.
    pub fn remove_unnecessary_values(&mut self) -> usize {
        let mut removed = 0;
        loop {
            let mut unnecessary = Vec::new();
            let mut empty = Vec::new();
            for node in self.nodes.values() {
                if node.outputs().is_empty() {
                    empty.push(node.id());
                    continue;
                }
                for output in node.outputs() {
                    if self.terminal_outputs.contains_key(output) {
                        continue;
                    }
                    let consumed = node.dependents().iter().any(|d| {
                        self.nodes
                            .get(d)
                            .map_or(false, |dependent| dependent.inputs().get(output) == Some(&node.id()))
                    });
                    if !consumed {
                        unnecessary.push((node.id(), output.clone()));
                    }
                }
            }
            if unnecessary.is_empty() && empty.is_empty() {
                break;
            }
            removed += unnecessary.len();
            for (id, output) in unnecessary {
                self.unregister_output(id, &output);
                if self.nodes.get(&id).map_or(false, |n| n.outputs().is_empty()) {
                    empty.push(id);
                }
            }
            for id in empty {
                debug!("pruning node {} from graph {}", id, self.name);
                self.remove_node(id);
            }
        }
        let stale: Vec<ValueSpecification> = self
            .rewrites
            .keys()
            .filter(|old| !self.producers.contains_key(&self.current_specification(old)))
            .cloned()
            .collect();
        for old in stale {
            self.rewrites.remove(&old);
        }
        removed
    }

    /// A new graph holding only the nodes whose target satisfies
    /// `predicate`. Edges crossing the boundary are dropped.
    pub fn sub_graph<P>(&self, predicate: P) -> DependencyGraph
    where
        P: Fn(&ComputationTargetSpecification) -> bool,
    {
        let kept: BTreeSet<NodeId> = self
            .nodes
            .values()
            .filter(|node| predicate(node.target()))
            .map(DependencyNode::id)
            .collect();
        let mut graph = DependencyGraph {
            name: self.name.clone(),
            next_id: self.next_id,
            rewrites: self.rewrites.clone(),
            ..DependencyGraph::default()
        };
        for id in &kept {
            let Some(original) = self.nodes.get(id) else {
                continue;
            };
            let mut node = DependencyNode::new(*id, Arc::clone(original.function()), original.target().clone());
            for (spec, producer) in original.inputs() {
                if kept.contains(producer) {
                    node.insert_input(spec.clone(), *producer);
                }
            }
            for dependent in original.dependents() {
                if kept.contains(dependent) {
                    node.insert_dependent(*dependent);
                }
            }
            graph
                .by_function
                .entry(original.function().unique_id().to_string())
                .or_default()
                .insert(*id);
            graph.nodes.insert(*id, node);
            for output in original.outputs() {
                graph.register_output(*id, output.clone());
            }
        }
        graph.terminal_outputs = self
            .terminal_outputs
            .iter()
            .filter(|(spec, _)| graph.producers.contains_key(*spec))
            .map(|(spec, requirements)| (spec.clone(), requirements.clone()))
            .collect();
        graph
    }

    /// Collapse every collapsible pair of nodes. Returns the number of
    /// merges performed.
    pub fn collapse(&mut self, collapser: &dyn ComputationTargetCollapser) -> usize {
        let nodes: Vec<NodeId> = self.nodes.keys().copied().collect();
        self.collapse_nodes(collapser, nodes)
    }

    fn collapse_nodes(&mut self, collapser: &dyn ComputationTargetCollapser, mut work: Vec<NodeId>) -> usize {
        let mut merges = 0;
        while let Some(id) = work.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            if !collapser.can_apply_to(node.function()) {
                continue;
            }
            let function = Arc::clone(node.function());
            let target = node.target().clone();
            let peers: Vec<NodeId> = self
                .by_function
                .get(function.unique_id())
                .map(|ids| ids.iter().copied().filter(|peer| *peer != id).collect())
                .unwrap_or_default();
            for peer in peers {
                let Some(peer_target) = self.nodes.get(&peer).map(|n| n.target().clone()) else {
                    continue;
                };
                let Some(composite) = collapser.collapse(&function, &target, &peer_target) else {
                    continue;
                };
                if self.depends_on(id, peer) || self.depends_on(peer, id) {
                    continue;
                }
                debug!(
                    "collapsing {} and {} for {} onto {}",
                    target,
                    peer_target,
                    function.unique_id(),
                    composite
                );
                let keep = id.min(peer);
                self.merge_nodes(keep, id.max(peer), &composite);
                merges += 1;
                work.push(keep);
                break;
            }
        }
        merges
    }

    /// Fold `other` into `keep`, both moving onto `composite`.
    fn merge_nodes(&mut self, keep: NodeId, other: NodeId, composite: &ComputationTargetSpecification) {
        for (from, outputs) in [(keep, self.outputs_of(keep)), (other, self.outputs_of(other))] {
            for old in outputs {
                let new = old.with_target(composite.clone());
                self.move_output(from, &old, keep, new);
            }
        }
        let inputs: Vec<(ValueSpecification, NodeId)> = self
            .nodes
            .get(&other)
            .map(|node| node.inputs().iter().map(|(s, p)| (s.clone(), *p)).collect())
            .unwrap_or_default();
        for (spec, producer) in inputs {
            self.unlink(other, &spec);
            self.link(keep, spec, producer);
        }
        self.remove_node(other);
        if let Some(node) = self.nodes.get_mut(&keep) {
            node.set_target(composite.clone());
        }
    }

    fn outputs_of(&self, id: NodeId) -> Vec<ValueSpecification> {
        self.nodes
            .get(&id)
            .map(|node| node.outputs().iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Rename output `old` of `from` to `new` on `to`, rewiring consumers and
    /// terminal outputs.
    fn move_output(&mut self, from: NodeId, old: &ValueSpecification, to: NodeId, new: ValueSpecification) {
        if from == to && *old == new {
            return;
        }
        self.unregister_output(from, old);
        if !self.producers.contains_key(&new) {
            self.register_output(to, new.clone());
        }
        let producer = self.producers.get(&new).copied().unwrap_or(to);
        let dependents: Vec<NodeId> = self
            .nodes
            .get(&from)
            .map(|node| node.dependents().iter().copied().collect())
            .unwrap_or_default();
        for dependent in dependents {
            let consumes = self
                .nodes
                .get(&dependent)
                .map_or(false, |node| node.inputs().get(old) == Some(&from));
            if consumes {
                self.unlink(dependent, old);
                self.link(dependent, new.clone(), producer);
            }
        }
        if let Some(requirements) = self.terminal_outputs.remove(old) {
            self.terminal_outputs
                .entry(new.clone())
                .or_default()
                .extend(requirements);
        }
        if *old != new {
            self.rewrites.insert(old.clone(), new);
        }
    }

    fn to_petgraph(&self) -> DiGraph<NodeId, ()> {
        let mut graph = DiGraph::new();
        let index: HashMap<NodeId, NodeIndex> = self
            .nodes
            .keys()
            .map(|id| (*id, graph.add_node(*id)))
            .collect();
        for node in self.nodes.values() {
            for producer in node.input_nodes() {
                if let (Some(&from), Some(&to)) = (index.get(&producer), index.get(&node.id())) {
                    graph.add_edge(from, to, ());
                }
            }
        }
        graph
    }

    /// Node ids ordered so that every node comes after the nodes it
    /// consumes from.
    pub fn execution_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let graph = self.to_petgraph();
        toposort(&graph, None)
            .map(|order| order.into_iter().map(|index| graph[index]).collect())
            .map_err(|cycle| GraphError::Cyclic(graph[cycle.node_id()]))
    }

    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.to_petgraph())
    }

    pub fn summary(&self) -> DependencyGraphSummary {
        let mut functions: BTreeMap<String, usize> = BTreeMap::new();
        for node in self.nodes.values() {
            *functions
                .entry(node.function().unique_id().to_string())
                .or_default() += 1;
        }
        DependencyGraphSummary {
            name: self.name.clone(),
            node_count: self.nodes.len(),
            value_count: self.producers.len(),
            functions,
            terminal_outputs: self
                .terminal_outputs
                .iter()
                .map(|(spec, requirements)| {
                    (
                        spec.to_string(),
                        requirements.iter().map(|r| r.to_string()).collect(),
                    )
                })
                .collect(),
        }
    }
}

/// Serializable overview of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraphSummary {
    pub name: String,
    pub node_count: usize,
    pub value_count: usize,
    /// Function unique id -> number of nodes applying it
    pub functions: BTreeMap<String, usize>,
    /// Terminal output -> requirements it satisfies
    pub terminal_outputs: BTreeMap<String, Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::properties::ValueProperties;
    use crate::core::target::{ComputationTargetType, UniqueId};
    use crate::function::{CompiledFunction, FunctionError, FunctionParameters};

    #[derive(Debug)]
    struct Named(&'static str);

    impl CompiledFunction for Named {
        fn id(&self) -> &str {
            self.0
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

    fn function(id: &'static str) -> Arc<ParameterizedFunction> {
        Arc::new(ParameterizedFunction::new(Arc::new(Named(id)), FunctionParameters::new()))
    }

    fn target(value: &str) -> ComputationTargetSpecification {
        ComputationTargetSpecification::primitive(UniqueId::new("Test", value))
    }

    fn spec(name: &str, on: &str, function: &str) -> ValueSpecification {
        ValueSpecification::new(name, target(on), ValueProperties::none()).with_function(function)
    }

    /// Source -> Middle -> Sink, with Middle producing an extra output.
    fn chain() -> (DependencyGraph, [NodeId; 3]) {
        let mut graph = DependencyGraph::new("test");
        let source = graph.add_node(function("Source"), target("A"));
        let middle = graph.add_node(function("Middle"), target("A"));
        let sink = graph.add_node(function("Sink"), target("A"));
        graph.add_output(source, spec("S", "A", "Source")).unwrap();
        graph.add_output(middle, spec("M", "A", "Middle")).unwrap();
        graph.add_output(middle, spec("Extra", "A", "Middle")).unwrap();
        graph.add_output(sink, spec("Out", "A", "Sink")).unwrap();
        graph.add_input(middle, spec("S", "A", "Source"), source).unwrap();
        graph.add_input(sink, spec("M", "A", "Middle"), middle).unwrap();
        graph
            .add_terminal_output(spec("Out", "A", "Sink"), ValueRequirement::new("Out", target("A")))
            .unwrap();
        (graph, [source, middle, sink])
    }

    #[test]
    fn test_dependents_follow_inputs() {
        let (graph, [source, middle, sink]) = chain();
        assert!(graph.get_dependent_nodes(source).unwrap().contains(&middle));
        assert!(graph.get_dependent_nodes(middle).unwrap().contains(&sink));
        assert_eq!(graph.get_input_count(sink), Some(1));
        assert!(graph.has_output_value(&spec("Extra", "A", "Middle")));
    }

    #[test]
    fn test_cycle_rejected() {
        let (mut graph, [source, _, sink]) = chain();
        graph.add_output(sink, spec("Loop", "A", "Sink")).unwrap();
        let err = graph.add_input(source, spec("Loop", "A", "Sink"), sink).unwrap_err();
        assert_eq!(err, GraphError::Cycle { producer: sink, consumer: source });
        assert!(graph.is_acyclic());
    }

    #[test]
    fn test_pruning_is_idempotent() {
        let (mut graph, [_, middle, _]) = chain();
        assert_eq!(graph.remove_unnecessary_values(), 1);
        assert!(!graph.node(middle).unwrap().has_output_value(&spec("Extra", "A", "Middle")));
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.remove_unnecessary_values(), 0);
    }

    #[test]
    fn test_pruning_cascades() {
        let (mut graph, [source, middle, sink]) = chain();
        graph.terminal_outputs.clear();
        graph.remove_unnecessary_values();
        assert!(graph.is_empty());
        assert!(graph.node(source).is_none());
        assert!(graph.node(middle).is_none());
        assert!(graph.node(sink).is_none());
    }

    #[test]
    fn test_pruning_drops_rewrites_of_removed_values() {
        let (mut graph, [_, middle, sink]) = chain();
        graph.move_output(middle, &spec("Extra", "A", "Middle"), middle, spec("Extra2", "A", "Middle"));
        graph.move_output(sink, &spec("Out", "A", "Sink"), sink, spec("Out2", "A", "Sink"));
        assert_eq!(graph.rewrites.len(), 2);

        assert_eq!(graph.remove_unnecessary_values(), 1);
        // Only the rename of the requested output survives.
        assert_eq!(graph.rewrites.len(), 1);
        assert_eq!(
            graph.current_specification(&spec("Out", "A", "Sink")),
            spec("Out2", "A", "Sink")
        );
        assert_eq!(
            graph.current_specification(&spec("Extra", "A", "Middle")),
            spec("Extra", "A", "Middle")
        );
    }

    #[test]
    fn test_find_satisfying_skips_excluded_closure() {
        let (mut graph, _) = chain();
        let other = graph.add_node(function("Other"), target("A"));
        graph.add_output(other, spec("M", "A", "Other")).unwrap();
        let requirement = ValueRequirement::new("M", target("A"));

        assert!(graph.find_satisfying(&requirement).is_some());
        // Middle consumes Source, so excluding Source leaves only Other.
        let (found, id) = graph
            .find_satisfying_where(&requirement, |function| function == "Source")
            .unwrap();
        assert_eq!(id, other);
        assert_eq!(found, spec("M", "A", "Other"));
        assert!(graph
            .find_satisfying_where(&requirement, |function| function == "Source" || function == "Other")
            .is_none());
    }

    #[test]
    fn test_sub_graph_drops_crossing_edges() {
        let mut graph = DependencyGraph::new("test");
        let a = graph.add_node(function("F"), target("A"));
        let b = graph.add_node(function("G"), target("B"));
        graph.add_output(a, spec("X", "A", "F")).unwrap();
        graph.add_output(b, spec("Y", "B", "G")).unwrap();
        graph.add_input(b, spec("X", "A", "F"), a).unwrap();

        let only_b = graph.sub_graph(|t| t == &target("B"));
        assert_eq!(only_b.node_count(), 1);
        assert_eq!(only_b.get_input_count(b), Some(0));
        assert!(!only_b.has_output_value(&spec("X", "A", "F")));
    }

    #[test]
    fn test_execution_order() {
        let (graph, [source, middle, sink]) = chain();
        assert_eq!(graph.execution_order().unwrap(), vec![source, middle, sink]);
        let summary = graph.summary();
        assert_eq!(summary.node_count, 3);
        assert_eq!(summary.functions.get("Middle"), Some(&1));
    }
}

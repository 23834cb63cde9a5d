//! Front door of graph construction.
//!
//! A [`DependencyGraphBuilder`] collects collaborators, accepts top-level
//! requirements and drives the resolution engine either inline
//! ([`DependencyGraphBuilder::build_step`], or implicitly from
//! [`DependencyGraphBuilder::get_dependency_graph`]) or on background worker
//! threads.

use crate::core::requirement::ValueRequirement;
use crate::core::specification::ValueSpecification;
use crate::engine::callback::{ResolutionPump, ResolvedValueCallback};
use crate::engine::collapse::ComputationTargetCollapser;
use crate::engine::context::{Collaborators, GraphBuildingContext};
use crate::engine::failure::{FunctionApplication, ResolutionFailure};
use crate::engine::market_data::{MarketDataAvailabilityProvider, NoMarketData};
use crate::engine::target_resolution::{SpecificationOnlyResolver, TargetResolver};
use crate::engine::{Production, ResolvedValue};
use crate::function::blacklist::{DefaultFunctionBlacklist, FunctionBlacklist};
use crate::function::exclusion::{ExclusionState, FunctionExclusionGroups};
use crate::function::resolver::FunctionResolver;
use crate::graph::dependency_graph::{DependencyGraph, GraphError};
use crate::queue::{RunQueue, RunQueueKind};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

/// Tuning for one build.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Worker threads started by a background construction job.
    pub worker_threads: usize,
    /// Scheduling discipline of the run queue.
    pub run_queue: RunQueueKind,
    /// Bucket size of the ordered run queue.
    pub ordered_buffer_size: usize,
    /// Version instant passed to the target resolver. `None` means now.
    pub as_of: Option<DateTime<Utc>>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            worker_threads: 1,
            run_queue: RunQueueKind::Ordered,
            ordered_buffer_size: 16,
            as_of: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("cannot change the {0} once targets have been added")]
    AlreadyStarted(&'static str),

    #[error("could not start a worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("graph construction did not settle within {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// What became of one top-level requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ResolutionOutcome {
    Resolved(ValueSpecification),
    Failed(ResolutionFailure),
}

impl ResolutionOutcome {
    pub fn is_resolved(&self) -> bool {
        matches!(self, ResolutionOutcome::Resolved(_))
    }

    pub fn specification(&self) -> Option<&ValueSpecification> {
        match self {
            ResolutionOutcome::Resolved(spec) => Some(spec),
            ResolutionOutcome::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ResolutionFailure> {
        match self {
            ResolutionOutcome::Resolved(_) => None,
            ResolutionOutcome::Failed(failure) => Some(failure),
        }
    }
}

type Outcomes = Arc<Mutex<BTreeMap<ValueRequirement, ResolutionOutcome>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Builds a [`DependencyGraph`] satisfying a set of top-level requirements.
///
/// Collaborators may be replaced until the first target is added; after that
/// the build context exists and setters return
/// [`BuildError::AlreadyStarted`]. Targets may keep being added, and later
/// targets reuse whatever the graph already holds.
///
/// # Example
///
/// ```
/// use depgraph_builder::graph::builder::DependencyGraphBuilder;
///
/// let mut builder = DependencyGraphBuilder::new("empty");
/// let graph = builder.get_dependency_graph();
/// assert!(graph.is_empty());
/// assert!(builder.is_graph_built());
/// ```
pub struct DependencyGraphBuilder {
    id: Uuid,
    name: String,
    config: BuildConfig,
    resolver: FunctionResolver,
    exclusion_groups: Option<Arc<dyn FunctionExclusionGroups>>,
    market_data: Arc<dyn MarketDataAvailabilityProvider>,
    target_resolver: Arc<dyn TargetResolver>,
    blacklist: Arc<dyn FunctionBlacklist>,
    collapser: Option<Arc<dyn ComputationTargetCollapser>>,
    seed: Option<DependencyGraph>,
    context: Option<Arc<GraphBuildingContext>>,
    outcomes: Outcomes,
    workers: Vec<JoinHandle<()>>,
}

impl DependencyGraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            config: BuildConfig::default(),
            resolver: FunctionResolver::default(),
            exclusion_groups: None,
            market_data: Arc::new(NoMarketData),
            target_resolver: Arc::new(SpecificationOnlyResolver),
            blacklist: Arc::new(DefaultFunctionBlacklist::new()),
            collapser: None,
            seed: None,
            context: None,
            outcomes: Arc::new(Mutex::new(BTreeMap::new())),
            workers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: BuildConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    fn ensure_not_started(&self, what: &'static str) -> Result<(), BuildError> {
        if self.context.is_some() {
            return Err(BuildError::AlreadyStarted(what));
        }
        Ok(())
    }

    /// Seed the build with a previously built graph.
    pub fn set_dependency_graph(&mut self, graph: DependencyGraph) -> Result<(), BuildError> {
        self.ensure_not_started("dependency graph")?;
        self.seed = Some(graph);
        Ok(())
    }

    pub fn set_function_resolver(&mut self, resolver: FunctionResolver) -> Result<(), BuildError> {
        self.ensure_not_started("function resolver")?;
        self.resolver = resolver;
        Ok(())
    }

    pub fn set_function_exclusion_groups(
        &mut self,
        groups: Arc<dyn FunctionExclusionGroups>,
    ) -> Result<(), BuildError> {
        self.ensure_not_started("exclusion groups")?;
        self.exclusion_groups = Some(groups);
        Ok(())
    }

    pub fn set_computation_target_collapser(
        &mut self,
        collapser: Arc<dyn ComputationTargetCollapser>,
    ) -> Result<(), BuildError> {
        self.ensure_not_started("target collapser")?;
        self.collapser = Some(collapser);
        Ok(())
    }

    pub fn set_market_data_availability_provider(
        &mut self,
        provider: Arc<dyn MarketDataAvailabilityProvider>,
    ) -> Result<(), BuildError> {
        self.ensure_not_started("market data provider")?;
        self.market_data = provider;
        Ok(())
    }

    pub fn set_target_resolver(&mut self, resolver: Arc<dyn TargetResolver>) -> Result<(), BuildError> {
        self.ensure_not_started("target resolver")?;
        self.target_resolver = resolver;
        Ok(())
    }

    pub fn set_function_blacklist(
        &mut self,
        blacklist: Arc<dyn FunctionBlacklist>,
    ) -> Result<(), BuildError> {
        self.ensure_not_started("function blacklist")?;
        self.blacklist = blacklist;
        Ok(())
    }

    fn context(&mut self) -> Arc<GraphBuildingContext> {
        if let Some(context) = &self.context {
            return Arc::clone(context);
        }
        let resolver = match &self.exclusion_groups {
            Some(groups) => self.resolver.clone().with_exclusion_groups(groups.as_ref()),
            None => self.resolver.clone(),
        };
        info!(
            "[{}] starting graph construction for {} with {} functions",
            self.id,
            self.name,
            resolver.function_count()
        );
        let collaborators = Collaborators {
            resolver: Arc::new(resolver),
            market_data: Arc::clone(&self.market_data),
            target_resolver: Arc::clone(&self.target_resolver),
            blacklist: Arc::clone(&self.blacklist),
            collapser: self.collapser.clone(),
        };
        let graph = self
            .seed
            .take()
            .unwrap_or_else(|| DependencyGraph::new(self.name.clone()));
        let context = Arc::new(GraphBuildingContext::new(
            self.id,
            collaborators,
            RunQueue::of_kind(self.config.run_queue, self.config.ordered_buffer_size),
            graph,
            self.config.as_of.unwrap_or_else(Utc::now),
        ));
        self.context = Some(Arc::clone(&context));
        context
    }

    /// Ask for `requirement` to be present in the graph.
    pub fn add_target(&mut self, requirement: ValueRequirement) {
        let context = self.context();
        let existing = context.with_graph(|graph| graph.satisfied_requirement(&requirement).cloned());
        if let Some(spec) = existing {
            debug!("[{}] {} already satisfied by {}", self.id, requirement, spec);
            lock(&self.outcomes).insert(requirement, ResolutionOutcome::Resolved(spec));
            return;
        }
        let callback = Arc::new(RootCallback::new(requirement.clone(), Arc::clone(&self.outcomes)));
        context.resolve_requirement(
            &requirement,
            None,
            &ExclusionState::new(),
            callback,
        );
    }

    pub fn add_targets<I>(&mut self, requirements: I)
    where
        I: IntoIterator<Item = ValueRequirement>,
    {
        for requirement in requirements {
            self.add_target(requirement);
        }
    }

    /// Start worker threads that drain the run queue until the builder is
    /// dropped. Calling again tops the pool up to the configured size.
    pub fn start_background_construction_job(&mut self) -> Result<(), BuildError> {
        let context = self.context();
        let wanted = self.config.worker_threads.max(1);
        for index in self.workers.len()..wanted {
            let context = Arc::clone(&context);
            let handle = thread::Builder::new()
                .name(format!("depgraph-worker-{}", index))
                .spawn(move || context.run_worker())?;
            self.workers.push(handle);
        }
        debug!("[{}] {} background workers running", self.id, self.workers.len());
        Ok(())
    }

    /// Run one unit of queued work on the calling thread. Returns false when
    /// nothing was queued.
    pub fn build_step(&mut self) -> bool {
        self.context
            .as_ref()
            .map_or(false, |context| context.try_run_next())
    }

    /// True when no resolution work is queued or running.
    pub fn is_graph_built(&self) -> bool {
        self.context.as_ref().map_or(true, |context| context.is_settled())
    }

    /// Block until all queued work settles and return a snapshot of the
    /// graph. Without background workers the work runs on this thread.
    pub fn get_dependency_graph(&mut self) -> DependencyGraph {
        let context = match &self.context {
            Some(context) => Arc::clone(context),
            None => {
                return self
                    .seed
                    .clone()
                    .unwrap_or_else(|| DependencyGraph::new(self.name.clone()))
            }
        };
        if self.workers.is_empty() {
            while context.try_run_next() {}
        } else {
            context.wait_settled(None);
        }
        let graph = context.graph_snapshot();
        info!(
            "[{}] graph {} settled with {} nodes and {} tasks",
            self.id,
            self.name,
            graph.node_count(),
            context.task_count()
        );
        graph
    }

    /// As [`get_dependency_graph`](Self::get_dependency_graph), giving up
    /// after `timeout`.
    pub fn get_dependency_graph_within(&mut self, timeout: Duration) -> Result<DependencyGraph, BuildError> {
        let context = match &self.context {
            Some(context) => Arc::clone(context),
            None => return Ok(self.get_dependency_graph()),
        };
        if self.workers.is_empty() {
            let deadline = Instant::now() + timeout;
            while context.try_run_next() {
                if Instant::now() >= deadline && !context.is_settled() {
                    return Err(BuildError::Timeout(timeout));
                }
            }
        } else if !context.wait_settled(Some(timeout)) {
            return Err(BuildError::Timeout(timeout));
        }
        Ok(context.graph_snapshot())
    }

    /// Outcome of every top-level requirement settled so far.
    pub fn outcomes(&self) -> BTreeMap<ValueRequirement, ResolutionOutcome> {
        lock(&self.outcomes).clone()
    }

    pub fn outcome(&self, requirement: &ValueRequirement) -> Option<ResolutionOutcome> {
        lock(&self.outcomes).get(requirement).cloned()
    }

    /// Top-level requirements that could not be resolved.
    pub fn failures(&self) -> Vec<ResolutionFailure> {
        lock(&self.outcomes)
            .values()
            .filter_map(|outcome| outcome.failure().cloned())
            .collect()
    }

    /// Number of resolution tasks created by this build.
    pub fn task_count(&self) -> usize {
        self.context.as_ref().map_or(0, |context| context.task_count())
    }
}

impl Drop for DependencyGraphBuilder {
    fn drop(&mut self) {
        if let Some(context) = &self.context {
            context.shutdown();
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("[{}] a worker thread panicked", self.id);
            }
        }
    }
}

/// Consumer of a top-level requirement: commits the first resolution the
/// graph accepts and records the outcome.
struct RootCallback {
    requirement: ValueRequirement,
    outcomes: Outcomes,
    rejected: Mutex<ResolutionFailure>,
}

impl RootCallback {
    fn new(requirement: ValueRequirement, outcomes: Outcomes) -> Self {
        let rejected = Mutex::new(ResolutionFailure::new(requirement.clone()));
        Self {
            requirement,
            outcomes,
            rejected,
        }
    }

    fn record(&self, outcome: ResolutionOutcome) {
        lock(&self.outcomes).insert(self.requirement.clone(), outcome);
    }

    fn reject(&self, value: &ResolvedValue) -> ResolutionFailure {
        let mut rejected = lock(&self.rejected);
        if let Production::Function { function, target, .. } = value.production() {
            let application = FunctionApplication::new(function, target, value.specification());
            *rejected = rejected.successful_function(application, Vec::new());
        }
        rejected.clone()
    }
}

impl ResolvedValueCallback for RootCallback {
    fn resolved(
        &self,
        context: &GraphBuildingContext,
        value: ResolvedValue,
        pump: Option<ResolutionPump>,
    ) {
        match context.commit(&self.requirement, &value) {
            Ok(spec) => {
                debug!("[{}] {} resolved to {}", context.job(), self.requirement, spec);
                self.record(ResolutionOutcome::Resolved(spec));
                if let Some(pump) = pump {
                    pump.close();
                }
            }
            Err(err) => {
                warn!(
                    "[{}] rejected {} for {}: {}",
                    context.job(),
                    value.specification(),
                    self.requirement,
                    err
                );
                let rejected = self.reject(&value);
                match pump {
                    Some(pump) => pump.pump(context),
                    None => self.record(ResolutionOutcome::Failed(rejected.unsatisfied())),
                }
            }
        }
    }

    fn failed(&self, context: &GraphBuildingContext, failure: ResolutionFailure) {
        debug!("[{}] {} failed", context.job(), self.requirement);
        let rejected = lock(&self.rejected).clone();
        self.record(ResolutionOutcome::Failed(rejected.merge(&failure)));
    }

    fn recursion_detected(&self, context: &GraphBuildingContext) {
        debug!("[{}] {} depends on itself", context.job(), self.requirement);
        let failure = ResolutionFailure::new(self.requirement.clone()).recursive_requirement();
        self.record(ResolutionOutcome::Failed(failure));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::properties::ValueProperties;
    use crate::core::target::{ComputationTargetSpecification, ComputationTargetType, UniqueId};
    use crate::function::catalog::FunctionCatalog;
    use crate::function::priority::RegistrationOrder;
    use crate::function::{CompiledFunction, FunctionError};
    use std::collections::BTreeSet;

    #[derive(Debug)]
    struct Produces {
        id: &'static str,
        value: &'static str,
        input: Option<&'static str>,
    }

    impl CompiledFunction for Produces {
        fn id(&self) -> &str {
            self.id
        }

        fn target_type(&self) -> ComputationTargetType {
            ComputationTargetType::Primitive
        }

        fn get_results(&self, target: &ComputationTargetSpecification) -> BTreeSet<ValueSpecification> {
            BTreeSet::from([ValueSpecification::new(
                self.value,
                target.clone(),
                ValueProperties::none(),
            )])
        }

        fn get_requirements(
            &self,
            target: &ComputationTargetSpecification,
            _desired: &ValueSpecification,
        ) -> Result<BTreeSet<ValueRequirement>, FunctionError> {
            Ok(self
                .input
                .map(|name| ValueRequirement::new(name, target.clone()))
                .into_iter()
                .collect())
        }
    }

    fn target() -> ComputationTargetSpecification {
        ComputationTargetSpecification::primitive(UniqueId::new("Test", "X"))
    }

    fn builder() -> DependencyGraphBuilder {
        let mut catalog = FunctionCatalog::new();
        catalog
            .register(Arc::new(Produces { id: "A", value: "Alpha", input: Some("Beta") }))
            .unwrap();
        catalog
            .register(Arc::new(Produces { id: "B", value: "Beta", input: None }))
            .unwrap();
        let mut builder = DependencyGraphBuilder::new("test");
        builder
            .set_function_resolver(FunctionResolver::new(&catalog, &RegistrationOrder))
            .unwrap();
        builder
    }

    #[test]
    fn test_resolves_chain_inline() {
        let mut builder = builder();
        let requirement = ValueRequirement::new("Alpha", target());
        builder.add_target(requirement.clone());
        let graph = builder.get_dependency_graph();
        assert_eq!(graph.node_count(), 2);
        assert!(builder.outcome(&requirement).unwrap().is_resolved());
        assert!(builder.is_graph_built());
    }

    #[test]
    fn test_setters_rejected_after_start() {
        let mut builder = builder();
        builder.add_target(ValueRequirement::new("Alpha", target()));
        let err = builder
            .set_function_resolver(FunctionResolver::default())
            .unwrap_err();
        assert!(matches!(err, BuildError::AlreadyStarted("function resolver")));
    }

    #[test]
    fn test_unknown_value_fails() {
        let mut builder = builder();
        let requirement = ValueRequirement::new("Gamma", target());
        builder.add_target(requirement.clone());
        builder.get_dependency_graph();
        let outcome = builder.outcome(&requirement).unwrap();
        assert!(outcome.failure().unwrap().contains_kind("noFunctions"));
    }

    #[test]
    fn test_background_workers_settle() {
        let mut builder = builder().with_config(BuildConfig {
            worker_threads: 2,
            ..BuildConfig::default()
        });
        let requirement = ValueRequirement::new("Alpha", target());
        builder.add_target(requirement.clone());
        builder.start_background_construction_job().unwrap();
        let graph = builder
            .get_dependency_graph_within(Duration::from_secs(10))
            .unwrap();
        assert_eq!(graph.node_count(), 2);
        assert!(builder.outcome(&requirement).unwrap().is_resolved());
    }

    #[test]
    fn test_build_config_defaults_from_json() {
        let config: BuildConfig =
            serde_json::from_str(r#"{"worker_threads": 3, "run_queue": "fifo"}"#).unwrap();
        assert_eq!(config.worker_threads, 3);
        assert_eq!(config.ordered_buffer_size, 16);
        assert_eq!(config.run_queue, RunQueueKind::Fifo);
        assert!(config.as_of.is_none());
    }
}

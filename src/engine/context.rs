//! Shared state of one graph construction pass.

use crate::core::requirement::ValueRequirement;
use crate::core::specification::ValueSpecification;
use crate::core::target::{ComputationTargetSpecification, TargetReference};
use crate::engine::callback::{Delivery, ResolutionPump, ResolvedValueCallback, Signal};
use crate::engine::collapse::ComputationTargetCollapser;
use crate::engine::market_data::MarketDataAvailabilityProvider;
use crate::engine::target_resolution::TargetResolver;
use crate::engine::task::{ResolveTask, TaskKey};
use crate::engine::{Production, ResolvedValue};
use crate::function::blacklist::FunctionBlacklist;
use crate::function::exclusion::ExclusionState;
use crate::function::resolver::FunctionResolver;
use crate::function::{FunctionParameters, MarketDataSourcingFunction, ParameterizedFunction};
use crate::graph::dependency_graph::{DependencyGraph, GraphError};
use crate::queue::{Prioritized, RunQueue};
use chrono::{DateTime, Utc};
use log::{debug, trace, warn};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// One bounded unit of work on the run queue.
pub trait ContextRunnable: Send {
    fn run(self: Box<Self>, context: &GraphBuildingContext);

    /// Target the work concerns, used for ordered scheduling.
    fn target(&self) -> Option<&TargetReference>;
}

impl Prioritized for Box<dyn ContextRunnable> {
    fn priority_target(&self) -> Option<&TargetReference> {
        (**self).target()
    }
}

/// The collaborators a build resolves against. All are read-only for the
/// duration of the build.
#[derive(Clone)]
pub struct Collaborators {
    pub resolver: Arc<FunctionResolver>,
    pub market_data: Arc<dyn MarketDataAvailabilityProvider>,
    pub target_resolver: Arc<dyn TargetResolver>,
    pub blacklist: Arc<dyn FunctionBlacklist>,
    pub collapser: Option<Arc<dyn ComputationTargetCollapser>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Thread-safe aggregate every task operates through.
///
/// The task table, the graph under construction and the activity counter
/// are the only state mutated concurrently, and only through the methods
/// here.
pub struct GraphBuildingContext {
    job: Uuid,
    collaborators: Collaborators,
    market_data_function: Arc<ParameterizedFunction>,
    as_of: DateTime<Utc>,
    run_queue: RunQueue<Box<dyn ContextRunnable>>,
    tasks: Mutex<HashMap<TaskKey, Arc<ResolveTask>>>,
    graph: Mutex<DependencyGraph>,
    activity: Mutex<usize>,
    settled: Condvar,
}

impl GraphBuildingContext {
    pub fn new(
        job: Uuid,
        collaborators: Collaborators,
        run_queue: RunQueue<Box<dyn ContextRunnable>>,
        graph: DependencyGraph,
        as_of: DateTime<Utc>,
    ) -> Self {
        Self {
            job,
            collaborators,
            market_data_function: Arc::new(ParameterizedFunction::new(
                Arc::new(MarketDataSourcingFunction),
                FunctionParameters::new(),
            )),
            as_of,
            run_queue,
            tasks: Mutex::new(HashMap::new()),
            graph: Mutex::new(graph),
            activity: Mutex::new(0),
            settled: Condvar::new(),
        }
    }

    pub fn job(&self) -> Uuid {
        self.job
    }

    pub fn resolver(&self) -> &FunctionResolver {
        &self.collaborators.resolver
    }

    pub fn market_data(&self) -> &dyn MarketDataAvailabilityProvider {
        self.collaborators.market_data.as_ref()
    }

    pub fn blacklist(&self) -> &dyn FunctionBlacklist {
        self.collaborators.blacklist.as_ref()
    }

    pub fn as_of(&self) -> DateTime<Utc> {
        self.as_of
    }

    pub fn resolve_target(&self, reference: &TargetReference) -> Option<ComputationTargetSpecification> {
        self.collaborators.target_resolver.resolve(reference, self.as_of)
    }

    /// Request resolutions of `requirement` on behalf of `callback`.
    ///
    /// Requests with the same requirement and exclusion state share one
    /// task, whichever task asks. `requester` is the task whose candidate
    /// needs the value, or `None` for a top-level requirement. When the
    /// requester, or a task waiting on it, is itself resolving
    /// `requirement`, the request is answered with `recursion_detected` and
    /// no task.
    pub fn resolve_requirement(
        &self,
        requirement: &ValueRequirement,
        requester: Option<&Arc<ResolveTask>>,
        exclusion: &ExclusionState,
        callback: Arc<dyn ResolvedValueCallback>,
    ) -> Option<Arc<ResolveTask>> {
        let task = {
            let mut tasks = lock(&self.tasks);
            // Checked and linked under the table lock so two tasks cannot
            // each start waiting on the other.
            if requester.map_or(false, |r| r.is_within(requirement)) {
                None
            } else {
                let key = TaskKey::new(requirement.clone(), exclusion.clone());
                let task = Arc::clone(tasks.entry(key.clone()).or_insert_with(|| {
                    trace!("[{}] new task for {}", self.job, requirement);
                    Arc::new(ResolveTask::new(key))
                }));
                if let Some(requester) = requester {
                    task.add_parent(requester);
                }
                Some(task)
            }
        };
        match task {
            Some(task) => {
                task.subscribe(self, callback);
                Some(task)
            }
            None => {
                debug!("[{}] recursion detected resolving {}", self.job, requirement);
                self.submit(Delivery::new(callback, Signal::Recursion));
                None
            }
        }
    }

    /// Release a pump: no further alternatives are wanted.
    pub fn close(&self, pump: ResolutionPump) {
        pump.close();
    }

    /// Number of distinct tasks created so far.
    pub fn task_count(&self) -> usize {
        lock(&self.tasks).len()
    }

    /// A value already in the graph that satisfies `requirement`, and whose
    /// production applies no function from a group in `exclusion`.
    pub fn find_existing(
        &self,
        requirement: &ValueRequirement,
        exclusion: &ExclusionState,
    ) -> Option<ResolvedValue> {
        let graph = lock(&self.graph);
        let found = if exclusion.is_empty() {
            graph.find_satisfying(requirement)
        } else {
            let resolver = self.resolver();
            graph.find_satisfying_where(requirement, |function_id| {
                resolver
                    .group_of(function_id)
                    .map_or(false, |group| exclusion.contains(group))
            })
        };
        found.map(|(spec, node)| ResolvedValue::existing(spec, node))
    }

    /// Leaf resolution of a requirement sourced from market data.
    pub fn market_data_value(
        &self,
        requirement: &ValueRequirement,
        target: &ComputationTargetSpecification,
    ) -> ResolvedValue {
        let specification = ValueSpecification::new(
            requirement.value_name(),
            target.clone(),
            requirement.constraints().clone(),
        )
        .with_function(self.market_data_function.unique_id());
        ResolvedValue::new(
            specification.clone(),
            Production::Function {
                function: Arc::clone(&self.market_data_function),
                target: target.clone(),
                inputs: Vec::new(),
                outputs: BTreeSet::from([specification]),
            },
        )
    }

    /// Splice an accepted resolution of a top-level requirement into the
    /// graph. Returns the specification the requirement is now satisfied by.
    pub fn commit(
        &self,
        requirement: &ValueRequirement,
        value: &ResolvedValue,
    ) -> Result<ValueSpecification, GraphError> {
        lock(&self.graph).add_resolved_value(
            requirement,
            value,
            self.collaborators.collapser.as_deref(),
        )
    }

    pub fn with_graph<R>(&self, f: impl FnOnce(&DependencyGraph) -> R) -> R {
        f(&lock(&self.graph))
    }

    pub fn graph_snapshot(&self) -> DependencyGraph {
        lock(&self.graph).clone()
    }

    /// Queue a unit of work.
    pub fn submit(&self, runnable: Box<dyn ContextRunnable>) {
        *lock(&self.activity) += 1;
        if let Err(err) = self.run_queue.add(runnable) {
            warn!("[{}] dropping work: {}", self.job, err);
            self.finish_activity();
        }
    }

    /// Run one queued unit of work, if there is one.
    pub fn try_run_next(&self) -> bool {
        match self.run_queue.try_take() {
            Some(runnable) => {
                self.run(runnable);
                true
            }
            None => false,
        }
    }

    /// Worker loop: run work until the queue is closed and drained.
    pub fn run_worker(&self) {
        while let Some(runnable) = self.run_queue.take() {
            self.run(runnable);
        }
    }

    fn run(&self, runnable: Box<dyn ContextRunnable>) {
        runnable.run(self);
        self.finish_activity();
    }

    fn finish_activity(&self) {
        let mut activity = lock(&self.activity);
        *activity = activity.saturating_sub(1);
        if *activity == 0 {
            self.settled.notify_all();
        }
    }

    /// True when no work is queued or running.
    pub fn is_settled(&self) -> bool {
        *lock(&self.activity) == 0
    }

    /// Block until settled, or until `timeout` elapses. Returns whether the
    /// context settled.
    pub fn wait_settled(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut activity = lock(&self.activity);
        while *activity > 0 {
            activity = match deadline {
                None => self
                    .settled
                    .wait(activity)
                    .unwrap_or_else(|poisoned| poisoned.into_inner()),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.settled
                        .wait_timeout(activity, deadline - now)
                        .unwrap_or_else(|poisoned| poisoned.into_inner())
                        .0
                }
            };
        }
        true
    }

    /// Stop accepting work and release blocked workers.
    pub fn shutdown(&self) {
        self.run_queue.close();
    }
}

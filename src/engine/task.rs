//! The per-requirement resolution state machine.
//!
//! A [`ResolveTask`] is shared by every consumer asking for the same
//! requirement under the same exclusion state. It evaluates candidates one at a time,
//! only while some consumer is waiting for a result, and caches every
//! resolution it produces so late subscribers are served from the cache.

use crate::core::requirement::ValueRequirement;
use crate::core::target::{ComputationTargetSpecification, TargetReference};
use crate::engine::callback::{Delivery, ResolutionPump, ResolvedValueCallback, Signal};
use crate::engine::candidate::CandidateEvaluation;
use crate::engine::context::{ContextRunnable, GraphBuildingContext};
use crate::engine::failure::{FunctionApplication, ResolutionFailure};
use crate::engine::market_data::MarketDataAvailability;
use crate::engine::ResolvedValue;
use crate::function::exclusion::ExclusionState;
use crate::function::resolver::Candidate;
use log::{debug, trace};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Identity of a task: what is asked for, and with which exclusion groups
/// already in use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TaskKey {
    requirement: ValueRequirement,
    exclusion: ExclusionState,
}

impl TaskKey {
    pub fn new(requirement: ValueRequirement, exclusion: ExclusionState) -> Self {
        Self {
            requirement,
            exclusion,
        }
    }

    pub fn requirement(&self) -> &ValueRequirement {
        &self.requirement
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPhase {
    Pending,
    EvaluatingCandidate,
    Advancing,
    Resolved,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriberStatus {
    /// Wants the next resolution.
    Waiting,
    /// Has a resolution and an unused pump.
    Holding,
    Closed,
}

struct Subscriber {
    callback: Arc<dyn ResolvedValueCallback>,
    delivered: usize,
    status: SubscriberStatus,
}

struct Resolution {
    target: ComputationTargetSpecification,
    requirement: ValueRequirement,
}

struct TaskState {
    phase: TaskPhase,
    resolution: Option<Resolution>,
    started: bool,
    candidates: VecDeque<Candidate>,
    results: Vec<ResolvedValue>,
    failure: ResolutionFailure,
    exhausted: bool,
    busy: bool,
    subscribers: Vec<Subscriber>,
}

impl TaskState {
    fn is_wanted(&self) -> bool {
        self.subscribers.iter().any(|s| {
            s.status == SubscriberStatus::Waiting && s.delivered >= self.results.len()
        })
    }

    fn exhaust(&mut self) {
        self.exhausted = true;
        if self.results.is_empty() {
            self.phase = TaskPhase::Failed;
        }
        if self.failure.is_empty() {
            self.failure = self.failure.unsatisfied();
        }
    }
}

pub struct ResolveTask {
    key: TaskKey,
    state: Mutex<TaskState>,
    /// Tasks whose candidates subscribed here.
    parents: Mutex<Vec<Weak<ResolveTask>>>,
}

impl ResolveTask {
    pub fn new(key: TaskKey) -> Self {
        let failure = ResolutionFailure::new(key.requirement.clone());
        Self {
            key,
            state: Mutex::new(TaskState {
                phase: TaskPhase::Pending,
                resolution: None,
                started: false,
                candidates: VecDeque::new(),
                results: Vec::new(),
                failure,
                exhausted: false,
                busy: false,
                subscribers: Vec::new(),
            }),
            parents: Mutex::new(Vec::new()),
        }
    }

    pub fn key(&self) -> &TaskKey {
        &self.key
    }

    pub fn requirement(&self) -> &ValueRequirement {
        &self.key.requirement
    }

    pub fn exclusion(&self) -> &ExclusionState {
        &self.key.exclusion
    }

    pub fn phase(&self) -> TaskPhase {
        self.lock().phase
    }

    /// Resolutions produced so far.
    pub fn result_count(&self) -> usize {
        self.lock().results.len()
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn parents(&self) -> MutexGuard<'_, Vec<Weak<ResolveTask>>> {
        self.parents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record that a candidate of `parent` waits on this task.
    pub(crate) fn add_parent(&self, parent: &Arc<ResolveTask>) {
        let mut parents = self.parents();
        if !parents.iter().any(|p| p.as_ptr() == Arc::as_ptr(parent)) {
            parents.push(Arc::downgrade(parent));
        }
    }

    /// Whether this task, or any task waiting on it directly or through
    /// other tasks, is resolving `requirement`.
    pub(crate) fn is_within(self: &Arc<Self>, requirement: &ValueRequirement) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![Arc::clone(self)];
        while let Some(task) = pending.pop() {
            if !visited.insert(Arc::as_ptr(&task)) {
                continue;
            }
            if task.requirement() == requirement {
                return true;
            }
            pending.extend(task.parents().iter().filter_map(Weak::upgrade));
        }
        false
    }

    pub(crate) fn subscribe(
        self: &Arc<Self>,
        context: &GraphBuildingContext,
        callback: Arc<dyn ResolvedValueCallback>,
    ) {
        let mut state = self.lock();
        state.subscribers.push(Subscriber {
            callback,
            delivered: 0,
            status: SubscriberStatus::Waiting,
        });
        self.dispatch(context, &mut state);
    }

    pub(crate) fn pump(self: &Arc<Self>, context: &GraphBuildingContext, subscriber: usize) {
        let mut state = self.lock();
        match state.subscribers.get_mut(subscriber) {
            Some(s) if s.status == SubscriberStatus::Holding => s.status = SubscriberStatus::Waiting,
            _ => return,
        }
        self.dispatch(context, &mut state);
    }

    pub(crate) fn close(&self, subscriber: usize) {
        if let Some(s) = self.lock().subscribers.get_mut(subscriber) {
            s.status = SubscriberStatus::Closed;
        }
    }

    /// Serve waiting subscribers from the cache, and schedule a step if any
    /// of them needs a resolution that does not exist yet.
    fn dispatch(self: &Arc<Self>, context: &GraphBuildingContext, state: &mut TaskState) {
        let mut wanted = false;
        for (index, subscriber) in state.subscribers.iter_mut().enumerate() {
            if subscriber.status != SubscriberStatus::Waiting {
                continue;
            }
            let callback = Arc::clone(&subscriber.callback);
            if let Some(value) = state.results.get(subscriber.delivered) {
                subscriber.delivered += 1;
                let pump = if state.exhausted && subscriber.delivered >= state.results.len() {
                    subscriber.status = SubscriberStatus::Closed;
                    None
                } else {
                    subscriber.status = SubscriberStatus::Holding;
                    Some(ResolutionPump::new(Arc::clone(self), index))
                };
                context.submit(Delivery::new(
                    callback,
                    Signal::Resolved {
                        value: value.clone(),
                        pump,
                    },
                ));
            } else if state.exhausted {
                subscriber.status = SubscriberStatus::Closed;
                context.submit(Delivery::new(callback, Signal::Failed(state.failure.clone())));
            } else {
                wanted = true;
            }
        }
        if wanted && !state.busy {
            state.busy = true;
            context.submit(Box::new(TaskStep {
                task: Arc::clone(self),
            }));
        }
    }

    /// One bounded unit of work: initialize, or start the next candidate.
    fn step(self: &Arc<Self>, context: &GraphBuildingContext) {
        let mut state = self.lock();
        if !state.is_wanted() {
            trace!("no consumer waiting on {}, pausing", self.key.requirement);
            state.busy = false;
            return;
        }
        if !state.started {
            state.started = true;
            self.initialize(context, &mut state);
            if state.exhausted || !state.results.is_empty() {
                state.busy = false;
                self.dispatch(context, &mut state);
                return;
            }
        }
        let next = state.candidates.pop_front();
        let resolution = state
            .resolution
            .as_ref()
            .map(|r| (r.target.clone(), r.requirement.clone()));
        match (next, resolution) {
            (Some(candidate), Some((target, requirement))) => {
                state.phase = TaskPhase::EvaluatingCandidate;
                drop(state);
                trace!(
                    "trying {} for {}",
                    candidate.function().unique_id(),
                    requirement
                );
                CandidateEvaluation::start(
                    context,
                    Arc::clone(self),
                    candidate,
                    target,
                    requirement,
                );
            }
            _ => {
                debug!(
                    "candidates exhausted for {} after {} resolution(s)",
                    self.key.requirement,
                    state.results.len()
                );
                state.exhaust();
                state.busy = false;
                self.dispatch(context, &mut state);
            }
        }
    }

    fn initialize(&self, context: &GraphBuildingContext, state: &mut TaskState) {
        let requirement = &self.key.requirement;
        let Some(target) = context.resolve_target(requirement.target()) else {
            debug!("could not resolve target of {}", requirement);
            state.failure = state.failure.could_not_resolve();
            state.exhaust();
            return;
        };
        let resolved = requirement.resolved_to(target.clone());

        if let Some(existing) = context.find_existing(&resolved, &self.key.exclusion) {
            trace!("reusing {} for {}", existing.specification(), resolved);
            state.results.push(existing);
            state.phase = TaskPhase::Resolved;
        }

        let set = context
            .resolver()
            .resolve_requirement(&resolved, &target, &self.key.exclusion);
        let mut suppressed = !set.suppressed.is_empty();
        for candidate in &set.suppressed {
            state.failure = state
                .failure
                .blacklist_suppressed(application(candidate, &target));
        }
        for candidate in set.candidates {
            if context.blacklist().is_blacklisted(candidate.function(), &target) {
                suppressed = true;
                state.failure = state
                    .failure
                    .blacklist_suppressed(application(&candidate, &target));
            } else {
                state.candidates.push_back(candidate);
            }
        }

        if state.candidates.is_empty() && state.results.is_empty() {
            match context.market_data().availability(&resolved) {
                MarketDataAvailability::Available => {
                    state.results.push(context.market_data_value(&resolved, &target));
                    state.phase = TaskPhase::Resolved;
                }
                MarketDataAvailability::Missing => {
                    state.failure = state.failure.market_data_missing();
                }
                MarketDataAvailability::NotAvailable if !suppressed => {
                    state.failure = state.failure.no_functions();
                }
                MarketDataAvailability::NotAvailable => {}
            }
            state.exhaust();
            return;
        }

        state.resolution = Some(Resolution {
            target,
            requirement: resolved,
        });
    }

    pub(crate) fn candidate_resolved(
        self: &Arc<Self>,
        context: &GraphBuildingContext,
        value: ResolvedValue,
    ) {
        let mut state = self.lock();
        trace!("{} resolved to {}", self.key.requirement, value.specification());
        state.results.push(value);
        state.phase = TaskPhase::Resolved;
        state.busy = false;
        self.dispatch(context, &mut state);
    }

    pub(crate) fn candidate_failed(
        self: &Arc<Self>,
        context: &GraphBuildingContext,
        failure: ResolutionFailure,
    ) {
        let mut state = self.lock();
        state.failure = state.failure.merge(&failure);
        state.phase = TaskPhase::Advancing;
        state.busy = false;
        self.dispatch(context, &mut state);
    }
}

fn application(candidate: &Candidate, target: &ComputationTargetSpecification) -> FunctionApplication {
    FunctionApplication::new(candidate.function(), target, candidate.desired_output())
}

struct TaskStep {
    task: Arc<ResolveTask>,
}

impl ContextRunnable for TaskStep {
    fn run(self: Box<Self>, context: &GraphBuildingContext) {
        self.task.step(context);
    }

    fn target(&self) -> Option<&TargetReference> {
        Some(self.task.requirement().target())
    }
}

//! Evaluation of one candidate function for one requirement.
//!
//! The evaluation subscribes to a task per input requirement, waits for all
//! of them to settle, asks the function for its late-resolved outputs and
//! any additional requirements, and reports the outcome to the owning task.
//! When additional requirements cannot be met with the inputs chosen, the
//! inputs are pumped for alternatives one slot at a time, in declaration
//! order, before the candidate is given up.

use crate::core::requirement::ValueRequirement;
use crate::core::specification::ValueSpecification;
use crate::core::target::ComputationTargetSpecification;
use crate::engine::callback::{ResolutionPump, ResolvedValueCallback};
use crate::engine::context::GraphBuildingContext;
use crate::engine::failure::{FunctionApplication, ResolutionFailure, SatisfiedInput};
use crate::engine::task::ResolveTask;
use crate::engine::{Production, ResolvedValue};
use crate::function::exclusion::ExclusionState;
use crate::function::resolver::Candidate;
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Waiting for the original inputs.
    Inputs,
    /// Calling into the function; deliveries are not expected.
    Evaluating,
    /// Waiting for the additional requirements of this generation.
    Additional,
    /// Waiting for an alternative resolution of one input slot.
    Backtracking(usize),
    Done,
}

enum SlotStatus {
    Pending,
    Resolved {
        value: ResolvedValue,
        pump: Option<ResolutionPump>,
    },
    Failed(ResolutionFailure),
}

struct Slot {
    requirement: ValueRequirement,
    status: SlotStatus,
}

impl Slot {
    fn new(requirement: ValueRequirement) -> Self {
        Self {
            requirement,
            status: SlotStatus::Pending,
        }
    }

    fn is_settled(&self) -> bool {
        !matches!(self.status, SlotStatus::Pending)
    }

    fn value(&self) -> Option<&ResolvedValue> {
        match &self.status {
            SlotStatus::Resolved { value, .. } => Some(value),
            _ => None,
        }
    }

    fn take_pump(&mut self) -> Option<ResolutionPump> {
        match &mut self.status {
            SlotStatus::Resolved { pump, .. } => pump.take(),
            _ => None,
        }
    }

    fn satisfied(&self) -> Option<SatisfiedInput> {
        self.value().map(|value| SatisfiedInput {
            requirement: self.requirement.clone(),
            specification: value.specification().clone(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotRef {
    Input(usize),
    Additional { index: usize, generation: u64 },
}

struct EvaluationState {
    stage: Stage,
    inputs: Vec<Slot>,
    additional: Vec<Slot>,
    generation: u64,
    desired: Option<ValueSpecification>,
    outputs: BTreeSet<ValueSpecification>,
    backtrack_from: usize,
    additional_failures: Vec<ResolutionFailure>,
}

impl EvaluationState {
    fn take_pumps(&mut self) -> Vec<ResolutionPump> {
        self.inputs
            .iter_mut()
            .chain(self.additional.iter_mut())
            .filter_map(Slot::take_pump)
            .collect()
    }

    fn satisfied(&self) -> Vec<SatisfiedInput> {
        self.inputs
            .iter()
            .chain(self.additional.iter())
            .filter_map(Slot::satisfied)
            .collect()
    }
}

pub(crate) struct CandidateEvaluation {
    task: Arc<ResolveTask>,
    candidate: Candidate,
    target: ComputationTargetSpecification,
    requirement: ValueRequirement,
    exclusion: ExclusionState,
    state: Mutex<EvaluationState>,
}

impl CandidateEvaluation {
    pub(crate) fn start(
        context: &GraphBuildingContext,
        task: Arc<ResolveTask>,
        candidate: Candidate,
        target: ComputationTargetSpecification,
        requirement: ValueRequirement,
    ) {
        let inputs = candidate
            .function()
            .function()
            .get_requirements(&target, candidate.desired_output());
        let exclusion = task.exclusion().with(candidate.exclusion_group());
        let evaluation = Arc::new(Self {
            task,
            candidate,
            target,
            requirement,
            exclusion,
            state: Mutex::new(EvaluationState {
                stage: Stage::Inputs,
                inputs: Vec::new(),
                additional: Vec::new(),
                generation: 0,
                desired: None,
                outputs: BTreeSet::new(),
                backtrack_from: 0,
                additional_failures: Vec::new(),
            }),
        });

        let inputs: Vec<ValueRequirement> = match inputs {
            Ok(inputs) => inputs.into_iter().collect(),
            Err(err) => {
                debug!(
                    "{} could not list requirements for {}: {}",
                    evaluation.candidate.function().unique_id(),
                    evaluation.requirement,
                    err
                );
                let failure = evaluation
                    .failure()
                    .get_requirements_failed(evaluation.application(), err.to_string());
                evaluation.finish(context, Err(failure));
                return;
            }
        };

        if inputs.is_empty() {
            evaluation.lock().stage = Stage::Evaluating;
            evaluation.late_resolution(context);
            return;
        }
        evaluation.lock().inputs = inputs.iter().cloned().map(Slot::new).collect();
        for (index, input) in inputs.iter().enumerate() {
            evaluation.subscribe(context, input, SlotRef::Input(index));
        }
    }

    fn lock(&self) -> MutexGuard<'_, EvaluationState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn subscribe(self: &Arc<Self>, context: &GraphBuildingContext, requirement: &ValueRequirement, slot: SlotRef) {
        let callback = Arc::new(SlotCallback {
            evaluation: Arc::clone(self),
            slot,
        });
        context.resolve_requirement(requirement, Some(&self.task), &self.exclusion, callback);
    }

    fn failure(&self) -> ResolutionFailure {
        ResolutionFailure::new(self.requirement.clone())
    }

    fn application(&self) -> FunctionApplication {
        FunctionApplication::new(
            self.candidate.function(),
            &self.target,
            self.candidate.desired_output(),
        )
    }

    fn on_resolved(
        self: &Arc<Self>,
        context: &GraphBuildingContext,
        slot: SlotRef,
        value: ResolvedValue,
        pump: Option<ResolutionPump>,
    ) {
        let mut state = self.lock();
        let accepted = match slot {
            SlotRef::Input(index) => {
                state.stage == Stage::Inputs || state.stage == Stage::Backtracking(index)
            }
            SlotRef::Additional { generation, .. } => {
                state.stage == Stage::Additional && generation == state.generation
            }
        };
        if !accepted {
            drop(state);
            if let Some(pump) = pump {
                pump.close();
            }
            return;
        }
        let status = SlotStatus::Resolved { value, pump };
        match slot {
            SlotRef::Input(index) => {
                state.inputs[index].status = status;
                let ready = match state.stage {
                    Stage::Backtracking(_) => true,
                    _ => state.inputs.iter().all(Slot::is_settled),
                };
                if ready {
                    state.stage = Stage::Evaluating;
                    drop(state);
                    self.late_resolution(context);
                }
            }
            SlotRef::Additional { index, .. } => {
                state.additional[index].status = status;
                if state.additional.iter().all(Slot::is_settled) {
                    state.stage = Stage::Evaluating;
                    drop(state);
                    self.additional_settled(context);
                }
            }
        }
    }

    fn on_failed(
        self: &Arc<Self>,
        context: &GraphBuildingContext,
        slot: SlotRef,
        failure: Option<ResolutionFailure>,
    ) {
        let mut state = self.lock();
        match slot {
            SlotRef::Input(index) => match state.stage {
                Stage::Inputs => {
                    let failure = failure.unwrap_or_else(|| {
                        ResolutionFailure::new(state.inputs[index].requirement.clone())
                            .recursive_requirement()
                    });
                    state.inputs[index].status = SlotStatus::Failed(failure);
                    if state.inputs.iter().all(Slot::is_settled) {
                        state.stage = Stage::Evaluating;
                        drop(state);
                        self.late_resolution(context);
                    }
                }
                Stage::Backtracking(current) if current == index => {
                    // No more alternatives for this slot; its previous value stands.
                    state.backtrack_from = index + 1;
                    state.stage = Stage::Evaluating;
                    drop(state);
                    self.backtrack(context);
                }
                _ => {}
            },
            SlotRef::Additional { index, generation } => {
                if state.stage != Stage::Additional || generation != state.generation {
                    return;
                }
                let failure = failure.unwrap_or_else(|| {
                    ResolutionFailure::new(state.additional[index].requirement.clone())
                        .recursive_requirement()
                });
                state.additional[index].status = SlotStatus::Failed(failure);
                if state.additional.iter().all(Slot::is_settled) {
                    state.stage = Stage::Evaluating;
                    drop(state);
                    self.additional_settled(context);
                }
            }
        }
    }

    /// All original inputs are settled: compute the concrete outputs and
    /// any additional requirements.
    fn late_resolution(self: &Arc<Self>, context: &GraphBuildingContext) {
        let function = Arc::clone(self.candidate.function());
        let (inputs, missing, satisfied) = {
            let state = self.lock();
            let mut inputs = BTreeMap::new();
            let mut missing = Vec::new();
            for slot in &state.inputs {
                match &slot.status {
                    SlotStatus::Resolved { value, .. } => {
                        inputs.insert(value.specification().clone(), slot.requirement.clone());
                    }
                    SlotStatus::Failed(failure) => missing.push(failure.clone()),
                    SlotStatus::Pending => {}
                }
            }
            (inputs, missing, state.satisfied())
        };

        if !missing.is_empty() && !function.function().can_handle_missing_requirements() {
            let failure = self
                .failure()
                .failed_function(self.application(), satisfied, missing);
            self.finish(context, Err(failure));
            return;
        }

        let outputs = match function.results_with_inputs(&self.target, &inputs) {
            Ok(outputs) => outputs,
            Err(err) => {
                let failure = self
                    .failure()
                    .get_results_failed(self.application(), err.to_string());
                self.finish(context, Err(failure));
                return;
            }
        };
        let Some(matched) = outputs
            .iter()
            .find(|spec| spec.satisfies(&self.requirement))
            .cloned()
        else {
            debug!(
                "late resolution of {} by {} produced nothing usable, backtracking",
                self.requirement,
                function.unique_id()
            );
            let failure = self.failure().late_resolution_failure(self.application());
            self.finish(context, Err(failure));
            return;
        };
        let desired = matched.narrowed_by(&self.requirement);
        let mut outputs = outputs;
        outputs.remove(&matched);
        outputs.insert(desired.clone());

        let input_specs: BTreeSet<ValueSpecification> = inputs.keys().cloned().collect();
        let additional = match function.function().get_additional_requirements(
            &self.target,
            &input_specs,
            &outputs,
        ) {
            Ok(additional) => additional,
            Err(err) => {
                let failure = self
                    .failure()
                    .get_additional_requirements_failed(self.application(), err.to_string());
                self.finish(context, Err(failure));
                return;
            }
        };

        let mut state = self.lock();
        state.desired = Some(desired);
        state.outputs = outputs;
        if additional.is_empty() {
            drop(state);
            self.succeed(context);
            return;
        }
        let additional: Vec<ValueRequirement> = additional.into_iter().collect();
        state.generation += 1;
        let generation = state.generation;
        state.additional = additional.iter().cloned().map(Slot::new).collect();
        state.stage = Stage::Additional;
        drop(state);
        trace!(
            "{} needs {} additional requirement(s) for {}",
            function.unique_id(),
            additional.len(),
            self.requirement
        );
        for (index, requirement) in additional.iter().enumerate() {
            self.subscribe(context, requirement, SlotRef::Additional { index, generation });
        }
    }

    fn additional_settled(self: &Arc<Self>, context: &GraphBuildingContext) {
        let failed = self
            .lock()
            .additional
            .iter()
            .any(|slot| matches!(slot.status, SlotStatus::Failed(_)));
        if failed {
            self.backtrack(context);
        } else {
            self.succeed(context);
        }
    }

    /// Retry with a different resolution of an original input, or give up.
    fn backtrack(self: &Arc<Self>, context: &GraphBuildingContext) {
        let (next, released) = {
            let mut state = self.lock();
            let additional = mem::take(&mut state.additional);
            let mut released = Vec::new();
            for mut slot in additional {
                if let Some(pump) = slot.take_pump() {
                    released.push(pump);
                }
                if let SlotStatus::Failed(failure) = slot.status {
                    state.additional_failures.push(failure);
                }
            }
            let mut next = None;
            while state.backtrack_from < state.inputs.len() {
                let index = state.backtrack_from;
                if let Some(pump) = state.inputs[index].take_pump() {
                    next = Some((index, pump));
                    break;
                }
                state.backtrack_from += 1;
            }
            if let Some((index, _)) = next {
                state.stage = Stage::Backtracking(index);
            }
            (next, released)
        };
        for pump in released {
            pump.close();
        }
        match next {
            Some((index, pump)) => {
                debug!(
                    "additional requirements of {} unmet, retrying input {} for {}",
                    self.candidate.function().unique_id(),
                    index,
                    self.requirement
                );
                pump.pump(context);
            }
            None => {
                let failure = {
                    let state = self.lock();
                    self.failure().failed_function(
                        self.application(),
                        state.satisfied(),
                        state.additional_failures.clone(),
                    )
                };
                self.finish(context, Err(failure));
            }
        }
    }

    fn succeed(self: &Arc<Self>, context: &GraphBuildingContext) {
        let value = {
            let mut state = self.lock();
            let inputs: Vec<ResolvedValue> = state
                .inputs
                .iter()
                .chain(state.additional.iter())
                .filter_map(Slot::value)
                .cloned()
                .collect();
            let desired = state
                .desired
                .take()
                .unwrap_or_else(|| self.candidate.desired_output().clone());
            ResolvedValue::new(
                desired,
                Production::Function {
                    function: Arc::clone(self.candidate.function()),
                    target: self.target.clone(),
                    inputs,
                    outputs: mem::take(&mut state.outputs),
                },
            )
        };
        self.finish(context, Ok(value));
    }

    /// Release every held input and report to the owning task.
    fn finish(&self, context: &GraphBuildingContext, outcome: Result<ResolvedValue, ResolutionFailure>) {
        let pumps = {
            let mut state = self.lock();
            state.stage = Stage::Done;
            state.take_pumps()
        };
        for pump in pumps {
            pump.close();
        }
        match outcome {
            Ok(value) => self.task.candidate_resolved(context, value),
            Err(failure) => self.task.candidate_failed(context, failure),
        }
    }
}

struct SlotCallback {
    evaluation: Arc<CandidateEvaluation>,
    slot: SlotRef,
}

impl ResolvedValueCallback for SlotCallback {
    fn resolved(
        &self,
        context: &GraphBuildingContext,
        value: ResolvedValue,
        pump: Option<ResolutionPump>,
    ) {
        self.evaluation.on_resolved(context, self.slot, value, pump);
    }

    fn failed(&self, context: &GraphBuildingContext, failure: ResolutionFailure) {
        self.evaluation.on_failed(context, self.slot, Some(failure));
    }

    fn recursion_detected(&self, context: &GraphBuildingContext) {
        self.evaluation.on_failed(context, self.slot, None);
    }
}

//! The three-signal protocol between a resolution task and its consumers.

use crate::core::target::TargetReference;
use crate::engine::context::{ContextRunnable, GraphBuildingContext};
use crate::engine::failure::ResolutionFailure;
use crate::engine::task::ResolveTask;
use crate::engine::ResolvedValue;
use std::fmt;
use std::sync::Arc;

/// Receiver of a task's deliveries.
///
/// Exactly one method fires per delivery. `resolved` may fire again each
/// time the consumer pumps; `failed` and `recursion_detected` are final.
/// All signals are delivered from the run queue, never re-entrantly from
/// inside the call that caused them.
pub trait ResolvedValueCallback: Send + Sync {
    fn resolved(
        &self,
        context: &GraphBuildingContext,
        value: ResolvedValue,
        pump: Option<ResolutionPump>,
    );

    fn failed(&self, context: &GraphBuildingContext, failure: ResolutionFailure);

    /// The requirement depends on itself along the requesting path.
    fn recursion_detected(&self, context: &GraphBuildingContext);
}

/// Capability to ask a task for its next alternative resolution.
///
/// Consuming the pump either requests the next resolution (`pump`) or
/// declares that no more are wanted (`close`). A task whose consumers have
/// all closed stops evaluating candidates.
pub struct ResolutionPump {
    task: Arc<ResolveTask>,
    subscriber: usize,
}

impl ResolutionPump {
    pub(crate) fn new(task: Arc<ResolveTask>, subscriber: usize) -> Self {
        Self { task, subscriber }
    }

    pub fn pump(self, context: &GraphBuildingContext) {
        self.task.pump(context, self.subscriber);
    }

    pub fn close(self) {
        self.task.close(self.subscriber);
    }
}

impl fmt::Debug for ResolutionPump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionPump")
            .field("requirement", &self.task.requirement().to_string())
            .field("subscriber", &self.subscriber)
            .finish()
    }
}

pub(crate) enum Signal {
    Resolved {
        value: ResolvedValue,
        pump: Option<ResolutionPump>,
    },
    Failed(ResolutionFailure),
    Recursion,
}

/// A signal in flight to one callback.
pub(crate) struct Delivery {
    callback: Arc<dyn ResolvedValueCallback>,
    signal: Signal,
}

impl Delivery {
    pub(crate) fn new(callback: Arc<dyn ResolvedValueCallback>, signal: Signal) -> Box<Self> {
        Box::new(Self { callback, signal })
    }
}

impl ContextRunnable for Delivery {
    fn run(self: Box<Self>, context: &GraphBuildingContext) {
        let Delivery { callback, signal } = *self;
        match signal {
            Signal::Resolved { value, pump } => callback.resolved(context, value, pump),
            Signal::Failed(failure) => callback.failed(context, failure),
            Signal::Recursion => callback.recursion_detected(context),
        }
    }

    fn target(&self) -> Option<&TargetReference> {
        None
    }
}

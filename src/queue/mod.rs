//! Task scheduling containers shared by the worker threads.
//!
//! [`RunQueue`] adds blocking, close-able, thread-safe access on top of a
//! single-threaded [`QueueDiscipline`] (stack, FIFO, or ordered).

pub mod fifo;
pub mod ordered;
pub mod stack;

use crate::core::target::TargetReference;
use serde::{Deserialize, Serialize};
use std::sync::{Condvar, Mutex, MutexGuard};
use thiserror::Error;

pub use fifo::FifoDiscipline;
pub use ordered::OrderedDiscipline;
pub use stack::StackDiscipline;

/// Errors arising from run queue operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("run queue is closed")]
    Closed,
}

/// The storage and retrieval policy behind a [`RunQueue`].
pub trait QueueDiscipline<T>: Send {
    fn push(&mut self, item: T);
    fn pop(&mut self) -> Option<T>;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Items that can be ordered by the target they work on. Items without a
/// target (plain runnables) sort last.
pub trait Prioritized {
    fn priority_target(&self) -> Option<&TargetReference>;
}

/// Which discipline a run queue uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunQueueKind {
    Stack,
    Fifo,
    #[default]
    Ordered,
}

struct QueueState<T> {
    items: Box<dyn QueueDiscipline<T>>,
    closed: bool,
}

/// A blocking multi-producer, multi-consumer work queue.
///
/// `take` blocks until an item is available or the queue is closed; every
/// item added is returned by exactly one `take`.
pub struct RunQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T: Send + 'static> RunQueue<T> {
    pub fn with_discipline(discipline: Box<dyn QueueDiscipline<T>>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: discipline,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    pub fn stack() -> Self {
        Self::with_discipline(Box::new(StackDiscipline::new()))
    }

    pub fn fifo() -> Self {
        Self::with_discipline(Box::new(FifoDiscipline::new()))
    }

    pub fn add(&self, item: T) -> Result<(), QueueError> {
        let mut state = self.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        state.items.push(item);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Block until an item is available. Returns `None` once the queue is
    /// closed and drained.
    pub fn take(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.items.pop() {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            state = self
                .available
                .wait(state)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Take an item without blocking.
    pub fn try_take(&self) -> Option<T> {
        self.lock().items.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn size(&self) -> usize {
        self.lock().items.len()
    }

    /// Refuse further additions and wake every blocked `take`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Prioritized + Send + 'static> RunQueue<T> {
    /// Ordered queue with an unsorted tail buffer of `buffer_size` items.
    pub fn ordered(buffer_size: usize) -> Self {
        Self::with_discipline(Box::new(OrderedDiscipline::new(buffer_size)))
    }

    pub fn of_kind(kind: RunQueueKind, buffer_size: usize) -> Self {
        match kind {
            RunQueueKind::Stack => Self::stack(),
            RunQueueKind::Fifo => Self::fifo(),
            RunQueueKind::Ordered => Self::ordered(buffer_size),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_stack_and_fifo_order() {
        let stack = RunQueue::stack();
        let fifo = RunQueue::fifo();
        for i in 0..3 {
            stack.add(i).unwrap();
            fifo.add(i).unwrap();
        }
        assert_eq!(stack.size(), 3);
        assert_eq!(
            (stack.take(), stack.take(), stack.take()),
            (Some(2), Some(1), Some(0))
        );
        assert_eq!(
            (fifo.take(), fifo.take(), fifo.take()),
            (Some(0), Some(1), Some(2))
        );
        assert!(stack.is_empty());
        assert_eq!(fifo.try_take(), None);
    }

    #[test]
    fn test_closed_queue() {
        let queue = RunQueue::fifo();
        queue.add(1).unwrap();
        queue.close();
        assert_eq!(queue.add(2), Err(QueueError::Closed));
        assert_eq!(queue.take(), Some(1));
        assert_eq!(queue.take(), None);
    }

    #[test]
    fn test_concurrent_producers_and_consumers() {
        let queue: Arc<RunQueue<usize>> = Arc::new(RunQueue::stack());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    for i in 0..250 {
                        queue.add(p * 1000 + i).unwrap();
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut seen = Vec::new();
                    while let Some(item) = queue.take() {
                        seen.push(item);
                    }
                    seen
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        queue.close();

        let mut all = HashSet::new();
        let mut total = 0;
        for consumer in consumers {
            for item in consumer.join().unwrap() {
                total += 1;
                all.insert(item);
            }
        }
        assert_eq!(total, 1000);
        assert_eq!(all.len(), 1000);
    }
}

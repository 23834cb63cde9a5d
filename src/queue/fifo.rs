use crate::queue::QueueDiscipline;
use std::collections::VecDeque;

/// First in, first out. Keeps resolution breadth-first.
#[derive(Debug)]
pub struct FifoDiscipline<T> {
    items: VecDeque<T>,
}

impl<T> FifoDiscipline<T> {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }
}

impl<T> Default for FifoDiscipline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> QueueDiscipline<T> for FifoDiscipline<T> {
    fn push(&mut self, item: T) {
        self.items.push_back(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

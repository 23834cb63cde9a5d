use crate::queue::QueueDiscipline;

/// Last in, first out. Keeps resolution depth-first.
#[derive(Debug)]
pub struct StackDiscipline<T> {
    items: Vec<T>,
}

impl<T> StackDiscipline<T> {
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Default for StackDiscipline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> QueueDiscipline<T> for StackDiscipline<T> {
    fn push(&mut self, item: T) {
        self.items.push(item);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

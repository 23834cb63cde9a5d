use crate::core::target::{ComputationTargetType, TargetReference};
use crate::queue::{Prioritized, QueueDiscipline};
use std::cmp::Ordering;

/// Retrieval bucket for an item; lower buckets are taken first.
fn bucket(target: Option<&TargetReference>) -> u8 {
    let Some(target) = target else {
        return 6;
    };
    match target.target_type() {
        ComputationTargetType::Position => 0,
        ComputationTargetType::Trade => 1,
        ComputationTargetType::Security => 2,
        ComputationTargetType::Primitive if target.is_external() => 3,
        ComputationTargetType::Primitive => 4,
        ComputationTargetType::PortfolioNode => 5,
    }
}

/// Retrieval order: `Less` means `a` is taken before `b`.
///
/// Positions, then trades, securities, externally identified primitives,
/// uniquely identified primitives, portfolio nodes and finally items with no
/// target. Within a bucket, by textual identifier.
pub fn compare<T: Prioritized>(a: &T, b: &T) -> Ordering {
    let (a, b) = (a.priority_target(), b.priority_target());
    bucket(a).cmp(&bucket(b)).then_with(|| match (a, b) {
        (Some(a), Some(b)) => a.identifier().cmp(&b.identifier()),
        _ => Ordering::Equal,
    })
}

/// Approximate priority queue that avoids re-sorting on every insertion.
///
/// New items land in an unsorted tail buffer of at most `buffer_size` items.
/// When the buffer fills it is sorted and merged into the sorted body. A
/// `pop` compares the best of the body with a scan of the (small) buffer, so
/// a recently added high-priority item is still returned promptly.
#[derive(Debug)]
pub struct OrderedDiscipline<T> {
    /// Sorted so that the next item to retrieve is last.
    sorted: Vec<T>,
    unsorted: Vec<T>,
    buffer_size: usize,
}

impl<T: Prioritized> OrderedDiscipline<T> {
    pub fn new(buffer_size: usize) -> Self {
        let buffer_size = buffer_size.max(1);
        Self {
            sorted: Vec::new(),
            unsorted: Vec::with_capacity(buffer_size),
            buffer_size,
        }
    }

    fn flush(&mut self) {
        let mut batch = std::mem::take(&mut self.unsorted);
        batch.sort_by(|a, b| compare(b, a));
        let mut body = std::mem::take(&mut self.sorted).into_iter().peekable();
        let mut batch = batch.into_iter().peekable();
        let mut merged = Vec::with_capacity(body.len() + batch.len());
        loop {
            let from_body = match (body.peek(), batch.peek()) {
                (Some(x), Some(y)) => compare(x, y) != Ordering::Less,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            merged.extend(if from_body { body.next() } else { batch.next() });
        }
        self.sorted = merged;
        self.unsorted = Vec::with_capacity(self.buffer_size);
    }

    fn best_unsorted(&self) -> Option<usize> {
        self.unsorted
            .iter()
            .enumerate()
            .min_by(|(_, a), (_, b)| compare(*a, *b))
            .map(|(index, _)| index)
    }
}

impl<T: Prioritized + Send> QueueDiscipline<T> for OrderedDiscipline<T> {
    fn push(&mut self, item: T) {
        self.unsorted.push(item);
        if self.unsorted.len() >= self.buffer_size {
            self.flush();
        }
    }

    fn pop(&mut self) -> Option<T> {
        let from_buffer = match (self.sorted.last(), self.best_unsorted()) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(head), Some(index)) => compare(&self.unsorted[index], head) == Ordering::Less,
        };
        if from_buffer {
            let index = self.best_unsorted()?;
            Some(self.unsorted.swap_remove(index))
        } else {
            self.sorted.pop()
        }
    }

    fn len(&self) -> usize {
        self.sorted.len() + self.unsorted.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::{
        ComputationTargetSpecification, ExternalId, ExternalIdBundle, UniqueId,
    };

    #[derive(Debug)]
    struct Item(Option<TargetReference>, &'static str);

    impl Prioritized for Item {
        fn priority_target(&self) -> Option<&TargetReference> {
            self.0.as_ref()
        }
    }

    fn item(target_type: ComputationTargetType, id: &'static str) -> Item {
        let spec = ComputationTargetSpecification::new(target_type, UniqueId::new("Test", id));
        Item(Some(spec.into()), id)
    }

    #[test]
    fn test_recent_high_priority_item_is_prompt() {
        let mut queue = OrderedDiscipline::new(8);
        queue.push(Item(None, "plain"));
        queue.push(item(ComputationTargetType::PortfolioNode, "N"));
        queue.push(item(ComputationTargetType::Position, "P"));
        assert_eq!(queue.pop().map(|i| i.1), Some("P"));
        assert_eq!(queue.pop().map(|i| i.1), Some("N"));
        assert_eq!(queue.pop().map(|i| i.1), Some("plain"));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_external_primitives_before_unique_primitives() {
        let mut queue = OrderedDiscipline::new(2);
        queue.push(item(ComputationTargetType::Primitive, "A"));
        let bundle = ExternalIdBundle::of(ExternalId::new("Ticker", "Z"));
        queue.push(Item(
            Some(TargetReference::external(ComputationTargetType::Primitive, bundle)),
            "Z",
        ));
        assert_eq!(queue.pop().map(|i| i.1), Some("Z"));
        assert_eq!(queue.pop().map(|i| i.1), Some("A"));
    }
}

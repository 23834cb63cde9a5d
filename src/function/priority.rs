use crate::function::ParameterizedFunction;
use std::collections::HashMap;

/// Externally supplied ranking of functions. Higher scores are tried first;
/// equal scores fall back to catalog registration order.
pub trait FunctionPriority: Send + Sync {
    fn priority(&self, function: &ParameterizedFunction) -> i32;
}

/// Every function has the same priority, so registration order decides.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistrationOrder;

impl FunctionPriority for RegistrationOrder {
    fn priority(&self, _function: &ParameterizedFunction) -> i32 {
        0
    }
}

/// Priorities looked up by function unique id; unknown functions score 0.
#[derive(Debug, Clone, Default)]
pub struct PriorityTable {
    scores: HashMap<String, i32>,
}

impl PriorityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, unique_id: impl Into<String>, priority: i32) -> Self {
        self.scores.insert(unique_id.into(), priority);
        self
    }

    pub fn set(&mut self, unique_id: impl Into<String>, priority: i32) {
        self.scores.insert(unique_id.into(), priority);
    }
}

impl FunctionPriority for PriorityTable {
    fn priority(&self, function: &ParameterizedFunction) -> i32 {
        self.scores.get(function.unique_id()).copied().unwrap_or(0)
    }
}

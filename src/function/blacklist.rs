use crate::core::target::ComputationTargetSpecification;
use crate::function::ParameterizedFunction;
use std::collections::HashSet;

/// Policy that suppresses function applications outright. Suppressed
/// candidates are never attempted and are reported as `blacklistSuppressed`.
pub trait FunctionBlacklist: Send + Sync {
    fn is_blacklisted(
        &self,
        function: &ParameterizedFunction,
        target: &ComputationTargetSpecification,
    ) -> bool;
}

/// Blacklist of whole functions, or of functions on particular targets.
#[derive(Debug, Clone, Default)]
pub struct DefaultFunctionBlacklist {
    functions: HashSet<String>,
    applications: HashSet<(String, ComputationTargetSpecification)>,
}

impl DefaultFunctionBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress a function on every target.
    pub fn with_function(mut self, unique_id: impl Into<String>) -> Self {
        self.functions.insert(unique_id.into());
        self
    }

    /// Suppress a function on one target only.
    pub fn with_application(
        mut self,
        unique_id: impl Into<String>,
        target: ComputationTargetSpecification,
    ) -> Self {
        self.applications.insert((unique_id.into(), target));
        self
    }
}

impl FunctionBlacklist for DefaultFunctionBlacklist {
    fn is_blacklisted(
        &self,
        function: &ParameterizedFunction,
        target: &ComputationTargetSpecification,
    ) -> bool {
        self.functions.contains(function.unique_id())
            || self
                .applications
                .contains(&(function.unique_id().to_string(), target.clone()))
    }
}

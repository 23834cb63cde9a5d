use crate::core::target::ComputationTargetType;
use crate::function::{CompiledFunction, FunctionParameters, ParameterizedFunction};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors arising while populating a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("function instance {0} is already registered")]
    Duplicate(String),
}

/// The set of functions available to graph construction, indexed by the
/// target type they apply to.
///
/// Registration order is remembered: it is the tie-break when two functions
/// have the same priority.
#[derive(Debug, Clone, Default)]
pub struct FunctionCatalog {
    functions: Vec<Arc<ParameterizedFunction>>,
    by_target_type: HashMap<ComputationTargetType, Vec<usize>>,
    unique_ids: HashSet<String>,
}

impl FunctionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function with no parameters.
    pub fn register(&mut self, function: Arc<dyn CompiledFunction>) -> Result<(), CatalogError> {
        self.register_with_parameters(function, FunctionParameters::new())
    }

    pub fn register_with_parameters(
        &mut self,
        function: Arc<dyn CompiledFunction>,
        parameters: FunctionParameters,
    ) -> Result<(), CatalogError> {
        let entry = ParameterizedFunction::new(function, parameters);
        if !self.unique_ids.insert(entry.unique_id().to_string()) {
            return Err(CatalogError::Duplicate(entry.unique_id().to_string()));
        }
        let index = self.functions.len();
        self.by_target_type
            .entry(entry.function().target_type())
            .or_default()
            .push(index);
        self.functions.push(Arc::new(entry));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    /// All functions in registration order.
    pub fn functions(&self) -> &[Arc<ParameterizedFunction>] {
        &self.functions
    }

    /// Registration index and entry of every function for a target type.
    pub fn for_target_type(
        &self,
        target_type: ComputationTargetType,
    ) -> impl Iterator<Item = (usize, &Arc<ParameterizedFunction>)> {
        self.by_target_type
            .get(&target_type)
            .into_iter()
            .flatten()
            .map(move |&index| (index, &self.functions[index]))
    }

    pub fn get(&self, unique_id: &str) -> Option<&Arc<ParameterizedFunction>> {
        self.functions.iter().find(|f| f.unique_id() == unique_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::requirement::ValueRequirement;
    use crate::core::specification::ValueSpecification;
    use crate::core::target::ComputationTargetSpecification;
    use crate::function::FunctionError;
    use std::collections::BTreeSet;

    #[derive(Debug)]
    struct Named(&'static str, ComputationTargetType);

    impl CompiledFunction for Named {
        fn id(&self) -> &str {
            self.0
        }

        fn target_type(&self) -> ComputationTargetType {
            self.1
        }

        fn get_results(&self, _target: &ComputationTargetSpecification) -> BTreeSet<ValueSpecification> {
            BTreeSet::new()
        }

        fn get_requirements(
            &self,
            _target: &ComputationTargetSpecification,
            _desired_output: &ValueSpecification,
        ) -> Result<BTreeSet<ValueRequirement>, FunctionError> {
            Ok(BTreeSet::new())
        }
    }

    #[test]
    fn test_index_by_target_type() {
        let mut catalog = FunctionCatalog::new();
        catalog
            .register(Arc::new(Named("A", ComputationTargetType::Security)))
            .unwrap();
        catalog
            .register(Arc::new(Named("B", ComputationTargetType::Position)))
            .unwrap();
        catalog
            .register(Arc::new(Named("C", ComputationTargetType::Security)))
            .unwrap();

        let ids: Vec<(usize, &str)> = catalog
            .for_target_type(ComputationTargetType::Security)
            .map(|(i, f)| (i, f.unique_id()))
            .collect();
        assert_eq!(ids, vec![(0, "A"), (2, "C")]);
        assert_eq!(catalog.for_target_type(ComputationTargetType::Trade).count(), 0);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut catalog = FunctionCatalog::new();
        catalog
            .register(Arc::new(Named("A", ComputationTargetType::Security)))
            .unwrap();
        let result = catalog.register(Arc::new(Named("A", ComputationTargetType::Security)));
        assert!(matches!(result, Err(CatalogError::Duplicate(id)) if id == "A"));
        assert_eq!(catalog.len(), 1);
    }
}

use crate::core::requirement::ValueRequirement;
use crate::core::specification::ValueSpecification;
use crate::core::target::{ComputationTargetSpecification, ComputationTargetType};
use crate::function::catalog::FunctionCatalog;
use crate::function::exclusion::{ExclusionGroup, ExclusionState, FunctionExclusionGroups};
use crate::function::priority::FunctionPriority;
use crate::function::ParameterizedFunction;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

/// One function considered for satisfying a requirement.
#[derive(Debug, Clone)]
pub struct Candidate {
    function: Arc<ParameterizedFunction>,
    desired_output: ValueSpecification,
    exclusion_group: Option<ExclusionGroup>,
    priority: i32,
}

impl Candidate {
    pub fn function(&self) -> &Arc<ParameterizedFunction> {
        &self.function
    }

    /// The function's output narrowed by the requirement's constraints.
    pub fn desired_output(&self) -> &ValueSpecification {
        &self.desired_output
    }

    pub fn exclusion_group(&self) -> Option<&ExclusionGroup> {
        self.exclusion_group.as_ref()
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }
}

/// Candidates for one requirement, best first, plus those skipped because
/// their exclusion group is already in use on the resolution path.
#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    pub candidates: Vec<Candidate>,
    pub suppressed: Vec<Candidate>,
}

impl CandidateSet {
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.suppressed.is_empty()
    }
}

#[derive(Debug, Clone)]
struct RankedFunction {
    function: Arc<ParameterizedFunction>,
    priority: i32,
    group: Option<ExclusionGroup>,
}

/// Catalog compiled for one build: functions ranked per target type, with
/// priorities and exclusion-group membership computed once up front.
///
/// Immutable once compiled, so lookups need no locking.
#[derive(Debug, Clone, Default)]
pub struct FunctionResolver {
    by_target_type: HashMap<ComputationTargetType, Vec<RankedFunction>>,
    /// Function unique id -> exclusion group
    groups: HashMap<String, ExclusionGroup>,
}

impl FunctionResolver {
    pub fn new(catalog: &FunctionCatalog, priority: &dyn FunctionPriority) -> Self {
        let mut by_target_type: HashMap<ComputationTargetType, Vec<RankedFunction>> = HashMap::new();
        for function in catalog.functions() {
            by_target_type
                .entry(function.function().target_type())
                .or_default()
                .push(RankedFunction {
                    function: Arc::clone(function),
                    priority: priority.priority(function),
                    group: None,
                });
        }
        // Stable sort: equal priorities keep registration order.
        for ranked in by_target_type.values_mut() {
            ranked.sort_by_key(|r| Reverse(r.priority));
        }
        Self {
            by_target_type,
            groups: HashMap::new(),
        }
    }

    /// Attach exclusion-group membership to every function.
    pub fn with_exclusion_groups(mut self, groups: &dyn FunctionExclusionGroups) -> Self {
        self.groups.clear();
        for ranked in self.by_target_type.values_mut().flatten() {
            ranked.group = groups.group_of(&ranked.function);
            if let Some(group) = &ranked.group {
                self.groups
                    .insert(ranked.function.unique_id().to_string(), group.clone());
            }
        }
        self
    }

    /// The exclusion group of the function with `unique_id`, if it has one.
    pub fn group_of(&self, unique_id: &str) -> Option<&ExclusionGroup> {
        self.groups.get(unique_id)
    }

    pub fn function_count(&self) -> usize {
        self.by_target_type.values().map(Vec::len).sum()
    }

    /// Candidates able to produce `requirement` on its resolved `target`,
    /// ordered by descending priority then registration order.
    pub fn resolve_requirement(
        &self,
        requirement: &ValueRequirement,
        target: &ComputationTargetSpecification,
        exclusion: &ExclusionState,
    ) -> CandidateSet {
        let resolved = requirement.resolved_to(target.clone());
        let mut set = CandidateSet::default();
        let Some(ranked) = self.by_target_type.get(&target.target_type()) else {
            return set;
        };
        for entry in ranked {
            if !entry.function.function().can_apply_to(target) {
                continue;
            }
            let Some(output) = entry
                .function
                .results(target)
                .into_iter()
                .find(|spec| spec.satisfies(&resolved))
            else {
                continue;
            };
            let candidate = Candidate {
                function: Arc::clone(&entry.function),
                desired_output: output.narrowed_by(&resolved),
                exclusion_group: entry.group.clone(),
                priority: entry.priority,
            };
            match &entry.group {
                Some(group) if exclusion.contains(group) => set.suppressed.push(candidate),
                _ => set.candidates.push(candidate),
            }
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::properties::ValueProperties;
    use crate::core::target::UniqueId;
    use crate::function::exclusion::ExclusionGroupMap;
    use crate::function::priority::{PriorityTable, RegistrationOrder};
    use crate::function::{CompiledFunction, FunctionError};
    use std::collections::BTreeSet;

    #[derive(Debug)]
    struct Produces(&'static str, &'static str);

    impl CompiledFunction for Produces {
        fn id(&self) -> &str {
            self.0
        }

        fn target_type(&self) -> ComputationTargetType {
            ComputationTargetType::Primitive
        }

        fn get_results(&self, target: &ComputationTargetSpecification) -> BTreeSet<ValueSpecification> {
            BTreeSet::from([ValueSpecification::new(
                self.1,
                target.clone(),
                ValueProperties::builder().with_any("Currency").build(),
            )])
        }

        fn get_requirements(
            &self,
            _target: &ComputationTargetSpecification,
            _desired_output: &ValueSpecification,
        ) -> Result<BTreeSet<ValueRequirement>, FunctionError> {
            Ok(BTreeSet::new())
        }
    }

    fn catalog() -> FunctionCatalog {
        let mut catalog = FunctionCatalog::new();
        for (id, value) in [("F1", "Foo"), ("F2", "Foo"), ("F3", "Bar"), ("F4", "Foo")] {
            catalog.register(Arc::new(Produces(id, value))).unwrap();
        }
        catalog
    }

    fn target() -> ComputationTargetSpecification {
        ComputationTargetSpecification::primitive(UniqueId::new("Test", "A"))
    }

    fn ids(set: &CandidateSet) -> Vec<&str> {
        set.candidates.iter().map(|c| c.function().unique_id()).collect()
    }

    #[test]
    fn test_registration_order_tie_break() {
        let resolver = FunctionResolver::new(&catalog(), &RegistrationOrder);
        let requirement = ValueRequirement::new("Foo", target());
        let set = resolver.resolve_requirement(&requirement, &target(), &ExclusionState::new());
        assert_eq!(ids(&set), vec!["F1", "F2", "F4"]);
    }

    #[test]
    fn test_priority_ordering() {
        let priorities = PriorityTable::new().with("F4", 10).with("F2", 5);
        let resolver = FunctionResolver::new(&catalog(), &priorities);
        let requirement = ValueRequirement::new("Foo", target());
        let set = resolver.resolve_requirement(&requirement, &target(), &ExclusionState::new());
        assert_eq!(ids(&set), vec!["F4", "F2", "F1"]);
    }

    #[test]
    fn test_desired_output_is_narrowed() {
        let resolver = FunctionResolver::new(&catalog(), &RegistrationOrder);
        let requirement = ValueRequirement::new("Foo", target())
            .with_constraints(ValueProperties::builder().with("Currency", "USD").build());
        let set = resolver.resolve_requirement(&requirement, &target(), &ExclusionState::new());
        let desired = set.candidates[0].desired_output();
        assert_eq!(desired.properties().single_value("Currency"), Some("USD"));
        assert_eq!(desired.function_id(), Some("F1"));
    }

    #[test]
    fn test_exclusion_group_in_use_is_suppressed() {
        let groups = ExclusionGroupMap::new().with("F1", "A").with("F2", "A");
        let resolver = FunctionResolver::new(&catalog(), &RegistrationOrder).with_exclusion_groups(&groups);
        let requirement = ValueRequirement::new("Foo", target());
        let in_use = ExclusionState::new().with(Some(&ExclusionGroup::new("A")));
        let set = resolver.resolve_requirement(&requirement, &target(), &in_use);
        assert_eq!(ids(&set), vec!["F4"]);
        assert_eq!(set.suppressed.len(), 2);
        assert_eq!(resolver.group_of("F2"), Some(&ExclusionGroup::new("A")));
        assert_eq!(resolver.group_of("F4"), None);
    }
}

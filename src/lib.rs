//! # depgraph-builder
//!
//! Concurrent, backtracking construction of dependency graphs.
//!
//! Given a catalog of functions that each declare the values they produce
//! and the values they need, and a set of top-level value requirements, the
//! builder chooses a function for every requirement, recursively resolves
//! its inputs, and assembles the shared, acyclic graph of function
//! applications that satisfies them all.
//!
//! ## Architecture
//!
//! - **core**: Value model: targets, properties, requirements, specifications
//! - **function**: Function capability, catalog, priorities, exclusion groups, blacklists
//! - **queue**: Blocking run queue with LIFO, FIFO and target-ordered disciplines
//! - **engine**: Resolution tasks, callbacks, failure diagnostics, collaborators
//! - **graph**: Dependency graph, pruning, collapsing and the builder front door
//! - **simulation**: Synthetic catalogs for stress tests and benchmarks

pub mod core;
pub mod engine;
pub mod function;
pub mod graph;
pub mod queue;
pub mod simulation;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::core::properties::ValueProperties;
    pub use crate::core::requirement::ValueRequirement;
    pub use crate::core::specification::ValueSpecification;
    pub use crate::core::target::{ComputationTargetSpecification, ComputationTargetType, UniqueId};
    pub use crate::engine::failure::{ResolutionFailure, ResolutionFailureGatherer};
    pub use crate::function::catalog::FunctionCatalog;
    pub use crate::function::declarative::{CompiledDefinitions, FunctionDefinition};
    pub use crate::function::resolver::FunctionResolver;
    pub use crate::function::{CompiledFunction, FunctionError};
    pub use crate::graph::builder::{BuildConfig, DependencyGraphBuilder, ResolutionOutcome};
    pub use crate::graph::dependency_graph::DependencyGraph;
}

pub mod builder;
pub mod dependency_graph;
pub mod node;

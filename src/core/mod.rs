pub mod properties;
pub mod requirement;
pub mod specification;
pub mod target;

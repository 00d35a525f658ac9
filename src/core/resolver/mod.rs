//! Dependency analysis and emission ordering over the frozen declaration graph.

mod dependencies;
mod order;

pub use dependencies::{Dependency, DependencyReason, DependencyResolver, Violation};
pub use order::{emission_order, order_classes, order_siblings, topological_sort, CycleError};

// src/core/mod.rs
pub mod decl;
pub mod dump;
pub mod names;
pub mod resolver;
pub mod call_policies;
pub mod diagnostics;
pub mod creators;
pub mod stage;
mod engine;

pub use decl::{DeclGraph, DeclId, DeclKind, Declaration};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use stage::{Pipeline, StageFailure};

// Export the main engine
pub use engine::{Engine, GenerationReport};

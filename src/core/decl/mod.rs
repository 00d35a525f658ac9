//! Declaration graph: the in-memory model of the C++ declaration dump.

mod graph;
mod model;
pub mod matchers;

pub use graph::DeclGraph;
pub use matchers::DeclMatcher;
pub use model::{
    Access, Argument, BaseRelation, Callable, CallableFlavor, ClassDecl, DeclId, DeclKind,
    DeclKindTag, Declaration, EnumDecl, Location, TypeRef,
};

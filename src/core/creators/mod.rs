//! Code creators: the tree of Boost.Python registration snippets built from
//! the exported declarations, and the files it renders to.

mod builder;
mod render;
mod tree;
mod writer;

pub use builder::build;
pub use render::{is_abstract, needs_wrapper, render_node, render_prelude, render_wrappers, wrapper_name, RenderContext};
pub use tree::{indent, CreatorKind, CreatorNode, CreatorTree, NodeId};
pub use writer::{include_manifest, FileWriter, RenderOutput, RenderedFile, SplitPolicy};

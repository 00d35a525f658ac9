//! Stage-gated generation pipeline.
//!
//! Each stage is a type; a transition consumes the pipeline and returns the
//! next stage, or a [`StageFailure`] that hands the previous stage back so
//! the graph can still be inspected. The graph is only mutable while
//! [`Loaded`].

use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::creators::{self, include_manifest, CreatorTree, FileWriter, RenderContext, RenderOutput, SplitPolicy};
use super::decl::{DeclGraph, DeclId};
use super::diagnostics::Diagnostics;
use super::names::NameTable;
use super::resolver::{emission_order, DependencyResolver};
use crate::config::ClosureConfig;
use crate::error::BindsworthError;

/// Graph built from the dump; filters and aliases may still change it
#[derive(Debug)]
pub struct Loaded;

/// Graph frozen and indexed
#[derive(Debug)]
pub struct Filtered;

#[derive(Debug)]
pub struct Resolved {
    exported: Vec<DeclId>,
    names: NameTable,
}

#[derive(Debug)]
pub struct Ordered {
    exported: Vec<DeclId>,
    names: NameTable,
    order: Vec<DeclId>,
}

#[derive(Debug)]
pub struct Built {
    names: NameTable,
    tree: CreatorTree,
    includes: Vec<String>,
}

#[derive(Debug)]
pub struct Rendered {
    output: RenderOutput,
}

#[derive(Debug)]
pub struct Pipeline<S> {
    graph: DeclGraph,
    diagnostics: Diagnostics,
    state: S,
}

/// A failed transition together with the pipeline it started from
pub struct StageFailure<S> {
    pub error: BindsworthError,
    pub pipeline: Pipeline<S>,
}

impl<S> fmt::Debug for StageFailure<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageFailure").field("error", &self.error).finish_non_exhaustive()
    }
}

impl<S> fmt::Display for StageFailure<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<S> From<StageFailure<S>> for BindsworthError {
    fn from(failure: StageFailure<S>) -> Self {
        failure.error
    }
}

type Transition<Next, Current> = std::result::Result<Pipeline<Next>, StageFailure<Current>>;

impl<S> Pipeline<S> {
    pub fn graph(&self) -> &DeclGraph {
        &self.graph
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    fn advance<N>(self, state: N) -> Pipeline<N> {
        Pipeline {
            graph: self.graph,
            diagnostics: self.diagnostics,
            state,
        }
    }

    /// Record the error that stops the pipeline and hand the pipeline back
    fn fail(mut self, error: BindsworthError) -> StageFailure<S> {
        let subjects = match &error {
            BindsworthError::NamingConflict { first, second, .. } => vec![first.clone(), second.clone()],
            BindsworthError::InvariantViolation { declaration, .. } => vec![declaration.clone()],
            _ => Vec::new(),
        };
        self.diagnostics.error(subjects, error.to_string());
        StageFailure { error, pipeline: self }
    }
}

impl Pipeline<Loaded> {
    pub fn new(graph: DeclGraph) -> Self {
        Self {
            graph,
            diagnostics: Diagnostics::new(),
            state: Loaded,
        }
    }

    pub fn graph_mut(&mut self) -> &mut DeclGraph {
        &mut self.graph
    }

    /// Freeze the graph and build the query indices
    pub fn finish_filtering(mut self) -> Pipeline<Filtered> {
        self.graph.optimize();
        self.advance(Filtered)
    }
}

impl Pipeline<Filtered> {
    /// Resolve export names and check that every dependency of an exported
    /// declaration is exported too
    pub fn resolve(mut self, closure: &ClosureConfig) -> Transition<Resolved, Filtered> {
        let exported = self.graph.exported();
        let names = match NameTable::build(&self.graph, &exported) {
            Ok(names) => names,
            Err(error) => return Err(self.fail(error)),
        };

        let violations = DependencyResolver::new(&self.graph, closure).verify_closure(&exported);
        for violation in &violations {
            warn!("{}", violation);
            self.diagnostics.warn(
                vec![
                    self.graph.display_name(violation.dependent),
                    self.graph.display_name(violation.target),
                ],
                violation.message.clone(),
            );
        }
        if closure.strict && !violations.is_empty() {
            return Err(self.fail(BindsworthError::UnresolvedDependencies(violations.len())));
        }

        info!("Resolved {} exported declarations", exported.len());
        Ok(self.advance(Resolved { exported, names }))
    }
}

impl Pipeline<Resolved> {
    pub fn names(&self) -> &NameTable {
        &self.state.names
    }

    pub fn exported(&self) -> &[DeclId] {
        &self.state.exported
    }

    pub fn order(self) -> Transition<Ordered, Resolved> {
        match emission_order(&self.graph, &self.state.exported) {
            Ok(order) => {
                debug!("Emission order holds {} declarations", order.len());
                let Resolved { exported, names } = self.state;
                Ok(Pipeline {
                    graph: self.graph,
                    diagnostics: self.diagnostics,
                    state: Ordered { exported, names, order },
                })
            }
            Err(error) => Err(self.fail(error)),
        }
    }
}

impl Pipeline<Ordered> {
    pub fn emission_order(&self) -> &[DeclId] {
        &self.state.order
    }

    /// Build the creator tree; includes are taken relative to `include_roots`
    pub fn build(mut self, include_roots: &[PathBuf]) -> Transition<Built, Ordered> {
        let includes = include_manifest(&self.graph, &self.state.exported, include_roots);
        let tree = creators::build(
            &self.graph,
            &self.state.names,
            &self.state.order,
            &includes,
            &mut self.diagnostics,
        );
        match tree {
            Ok(tree) => {
                let Ordered { names, .. } = self.state;
                Ok(Pipeline {
                    graph: self.graph,
                    diagnostics: self.diagnostics,
                    state: Built { names, tree, includes },
                })
            }
            Err(error) => Err(self.fail(error)),
        }
    }
}

impl Pipeline<Built> {
    pub fn tree(&self) -> &CreatorTree {
        &self.state.tree
    }

    /// Prelude adjustments (license, usings) before rendering
    pub fn tree_mut(&mut self) -> &mut CreatorTree {
        &mut self.state.tree
    }

    pub fn render(self, module_name: &str, policy: SplitPolicy) -> Transition<Rendered, Built> {
        let files = FileWriter::new().and_then(|writer| {
            let ctx = RenderContext {
                graph: &self.graph,
                names: &self.state.names,
                module_name,
            };
            writer.render(&self.state.tree, &ctx, policy)
        });
        match files {
            Ok(files) => {
                let output = RenderOutput {
                    files,
                    includes: self.state.includes.clone(),
                };
                Ok(self.advance(Rendered { output }))
            }
            Err(error) => Err(self.fail(error)),
        }
    }
}

impl Pipeline<Rendered> {
    pub fn output(&self) -> &RenderOutput {
        &self.state.output
    }

    pub fn into_parts(self) -> (DeclGraph, RenderOutput, Diagnostics) {
        (self.graph, self.state.output, self.diagnostics)
    }
}

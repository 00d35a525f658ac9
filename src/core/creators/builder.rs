use std::collections::HashMap;
use tracing::{debug, warn};

use super::render::{needs_wrapper, wrapper_name};
use super::tree::{CreatorKind, CreatorTree, NodeId};
use crate::core::decl::{Callable, CallableFlavor, DeclGraph, DeclId, DeclKind};
use crate::core::diagnostics::Diagnostics;
use crate::core::names::{is_unary_operator, operator_alias, NameTable};
use crate::core::resolver::order_siblings;
use crate::error::{BindsworthError, Result};

/// Build the creator tree for `order`, an emission-ordered list of
/// exported declarations. `includes` is the header manifest.
pub fn build(
    graph: &DeclGraph,
    names: &NameTable,
    order: &[DeclId],
    includes: &[String],
    diagnostics: &mut Diagnostics,
) -> Result<CreatorTree> {
    let mut builder = Builder {
        graph,
        tree: CreatorTree::new(),
        scopes: HashMap::new(),
    };

    let root = builder.tree.root();
    builder.tree.append(root, CreatorKind::Include("boost/python.hpp".to_string()), None);
    for header in includes {
        builder.tree.append(root, CreatorKind::Include(header.clone()), None);
    }
    builder.tree.append(
        root,
        CreatorKind::NamespaceAlias { alias: "bp".to_string(), target: "boost::python".to_string() },
        None,
    );

    for &id in order {
        builder.add_declaration(id, diagnostics);
    }
    builder.order_scopes(diagnostics);
    check_wrapper_names(graph, names, &builder.tree)?;

    debug!("Built {} creators for {} declarations", builder.tree.len(), order.len());
    Ok(builder.tree)
}

struct Builder<'g> {
    graph: &'g DeclGraph,
    tree: CreatorTree,
    /// Creator of every namespace or class that already has one
    scopes: HashMap<DeclId, NodeId>,
}

impl<'g> Builder<'g> {
    fn add_declaration(&mut self, id: DeclId, diagnostics: &mut Diagnostics) {
        let graph = self.graph;
        let decl = graph.get(id);
        match &decl.kind {
            DeclKind::Namespace => {}
            DeclKind::Class(_) => {
                self.scope_node(id);
            }
            DeclKind::Enum(_) => {
                let kind = if decl.is_anonymous() { CreatorKind::UnnamedEnum } else { CreatorKind::Enum };
                let parent = self.parent_node(id);
                self.tree.append(parent, kind, Some(id));
            }
            DeclKind::Function(callable) => self.add_callable(id, callable, diagnostics),
            DeclKind::Typedef { target } => {
                let exposed = graph
                    .resolve_type(target)
                    .map_or(false, |resolved| graph.is_exported(resolved));
                if exposed {
                    let parent = self.parent_node(id);
                    self.tree.append(parent, CreatorKind::Typedef, Some(id));
                } else {
                    debug!("Typedef {} does not name an exported class; skipped", graph.display_name(id));
                }
            }
            DeclKind::Variable { .. } => {
                let parent = self.parent_node(id);
                self.tree.append(parent, CreatorKind::Variable, Some(id));
            }
        }
    }

    fn add_callable(&mut self, id: DeclId, callable: &Callable, diagnostics: &mut Diagnostics) {
        let graph = self.graph;
        let member_of = graph.parent(id).filter(|&parent| graph.get(parent).is_class());
        match &callable.flavor {
            CallableFlavor::Function => {
                let parent = self.parent_node(id);
                self.tree.append(parent, CreatorKind::Function, Some(id));
            }
            CallableFlavor::Constructor => match member_of {
                Some(class) => {
                    let parent = self.scope_node(class);
                    self.tree.append(parent, CreatorKind::Constructor, Some(id));
                }
                None => warn!("Constructor {} outside of a class; skipped", graph.display_name(id)),
            },
            CallableFlavor::Operator(symbol) => {
                let supported = operator_alias(symbol, is_unary_operator(graph, id)).is_some();
                let owner = member_of.or_else(|| self.operator_owner(callable));
                match owner {
                    Some(class) if supported => {
                        let parent = self.scope_node(class);
                        self.tree.append(parent, CreatorKind::Operator, Some(id));
                    }
                    Some(_) => {
                        warn!("Operator{} of {} has no Python counterpart; skipped", symbol, graph.display_name(id));
                        diagnostics.warn(
                            vec![graph.display_name(id)],
                            format!("operator{} can't be exposed", symbol),
                        );
                    }
                    None => {
                        warn!("Free operator {} has no exported operand class; skipped", graph.display_name(id));
                        diagnostics.warn(
                            vec![graph.display_name(id)],
                            format!("free operator{} does not operate on an exported class", symbol),
                        );
                    }
                }
            }
        }
    }

    /// Exported class of the first operand, else of the second
    fn operator_owner(&self, callable: &Callable) -> Option<DeclId> {
        let graph = self.graph;
        callable.arguments.iter().take(2).find_map(|argument| {
            graph
                .resolve_type(&argument.ty)
                .filter(|&class| graph.get(class).is_class() && graph.is_exported(class))
        })
    }

    fn parent_node(&mut self, id: DeclId) -> NodeId {
        match self.graph.parent(id) {
            Some(parent) if parent != self.graph.global() => self.scope_node(parent),
            _ => self.tree.root(),
        }
    }

    /// Creator of a namespace or class, created on first use
    fn scope_node(&mut self, scope: DeclId) -> NodeId {
        if let Some(&node) = self.scopes.get(&scope) {
            return node;
        }
        let kind = if self.graph.get(scope).is_namespace() { CreatorKind::Namespace } else { CreatorKind::Class };
        let parent = self.parent_node(scope);
        let node = self.tree.append(parent, kind, Some(scope));
        self.scopes.insert(scope, node);
        node
    }

    /// Move sibling subtrees so that a subtree holding a base class, or the
    /// class a typedef names, is rendered before any subtree that needs it.
    /// Namespaces reopened around each other can't satisfy that; they keep
    /// emission order and are reported.
    fn order_scopes(&mut self, diagnostics: &mut Diagnostics) {
        let graph = self.graph;
        for parent in self.tree.flatten() {
            let children = self.tree.children(parent).to_vec();
            if children.len() < 2 {
                continue;
            }

            let mut owner: HashMap<DeclId, NodeId> = HashMap::new();
            let mut required: HashMap<NodeId, Vec<DeclId>> = HashMap::new();
            for &child in &children {
                for node in self.tree.subtree(child) {
                    let creator = self.tree.node(node);
                    let Some(decl) = creator.decl else { continue };
                    match &creator.kind {
                        CreatorKind::Class => {
                            owner.insert(decl, child);
                            required.entry(child).or_default().extend(graph.bases_of(decl));
                        }
                        CreatorKind::Enum => {
                            owner.insert(decl, child);
                        }
                        CreatorKind::Typedef => {
                            if let DeclKind::Typedef { target } = &graph.get(decl).kind {
                                required.entry(child).or_default().extend(graph.resolve_type(target));
                            }
                        }
                        _ => {}
                    }
                }
            }
            if required.values().all(Vec::is_empty) {
                continue;
            }

            let (order, cycle) = order_siblings(&children, |child| {
                required
                    .get(&child)
                    .into_iter()
                    .flatten()
                    .filter_map(|target| owner.get(target).copied())
                    .filter(|&sibling| sibling != child)
                    .collect::<Vec<_>>()
            });

            match cycle {
                Some(cycle) => {
                    let subjects: Vec<String> = cycle
                        .involved
                        .iter()
                        .filter_map(|&node| self.tree.node(node).decl)
                        .map(|decl| graph.display_name(decl))
                        .collect();
                    warn!("Scopes {} depend on each other; keeping emission order", subjects.join(", "));
                    diagnostics.warn(subjects, "interleaved scopes can't be ordered by their dependencies");
                }
                None if order != children => self.tree.reorder_children(parent, order),
                None => {}
            }
        }
    }
}

fn check_wrapper_names(graph: &DeclGraph, names: &NameTable, tree: &CreatorTree) -> Result<()> {
    let mut seen: HashMap<String, DeclId> = HashMap::new();
    for node in tree.find_by_kind(|kind| *kind == CreatorKind::Class) {
        let Some(class) = tree.node(node).decl else { continue };
        if !needs_wrapper(graph, class) {
            continue;
        }
        let name = wrapper_name(graph, names, class);
        if let Some(&first) = seen.get(&name) {
            return Err(BindsworthError::NamingConflict {
                identifier: name,
                scope: "<wrappers>".to_string(),
                first: graph.display_name(first),
                second: graph.display_name(class),
            });
        }
        seen.insert(name, class);
    }
    Ok(())
}

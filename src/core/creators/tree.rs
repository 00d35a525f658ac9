use std::collections::HashMap;

use crate::core::decl::DeclId;

/// Handle of a node inside a [`CreatorTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// What a creator renders
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreatorKind {
    /// Root of the tree
    Module,
    License(String),
    /// Header compiled ahead of time; followed by `#pragma hdrstop`
    PrecompiledHeader(String),
    Include(String),
    NamespaceAlias { alias: String, target: String },
    NamespaceUsing(String),
    /// Verbatim file-level text
    Text(String),
    /// C++ namespace; transparent in the target, its children land in the
    /// enclosing target scope
    Namespace,
    Class,
    Enum,
    UnnamedEnum,
    Function,
    Constructor,
    Operator,
    Variable,
    Typedef,
}

impl CreatorKind {
    /// Prelude creators render at file level, outside the module body
    pub fn is_prelude(&self) -> bool {
        matches!(
            self,
            CreatorKind::License(_)
                | CreatorKind::PrecompiledHeader(_)
                | CreatorKind::Include(_)
                | CreatorKind::NamespaceAlias { .. }
                | CreatorKind::NamespaceUsing(_)
                | CreatorKind::Text(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct CreatorNode {
    pub kind: CreatorKind,
    pub decl: Option<DeclId>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    live: bool,
}

/// Arena-backed tree of creators. A node's child list is its ownership
/// edge; `parent` is a plain back index.
#[derive(Debug, Clone)]
pub struct CreatorTree {
    nodes: Vec<CreatorNode>,
    by_decl: HashMap<DeclId, NodeId>,
}

impl CreatorTree {
    pub fn new() -> Self {
        Self {
            nodes: vec![CreatorNode {
                kind: CreatorKind::Module,
                decl: None,
                parent: None,
                children: Vec::new(),
                live: true,
            }],
            by_decl: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &CreatorNode {
        &self.nodes[id.index()]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    /// Number of live nodes, the root included
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| node.live).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 1
    }

    pub fn append(&mut self, parent: NodeId, kind: CreatorKind, decl: Option<DeclId>) -> NodeId {
        let position = self.children(parent).len();
        self.insert(parent, position, kind, decl)
    }

    /// Insert a new node at `position` among `parent`'s children; positions
    /// past the end append
    pub fn insert(&mut self, parent: NodeId, position: usize, kind: CreatorKind, decl: Option<DeclId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(CreatorNode {
            kind,
            decl,
            parent: Some(parent),
            children: Vec::new(),
            live: true,
        });
        let siblings = &mut self.nodes[parent.index()].children;
        let position = position.min(siblings.len());
        siblings.insert(position, id);
        if let Some(decl) = decl {
            self.by_decl.insert(decl, id);
        }
        id
    }

    /// Detach `id` and drop its whole subtree. The root can't be removed.
    pub fn remove(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        self.nodes[parent.index()].children.retain(|&child| child != id);
        for dead in self.subtree(id) {
            let node = &mut self.nodes[dead.index()];
            node.live = false;
            if let Some(decl) = node.decl {
                if self.by_decl.get(&decl) == Some(&dead) {
                    self.by_decl.remove(&decl);
                }
            }
        }
    }

    /// Every live node in depth-first pre-order, the root first
    pub fn flatten(&self) -> Vec<NodeId> {
        self.subtree(self.root())
    }

    /// `id` and every node below it in pre-order
    pub fn subtree(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            order.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        order
    }

    pub fn find_by_declaration(&self, decl: DeclId) -> Option<NodeId> {
        self.by_decl.get(&decl).copied()
    }

    pub fn find_by_kind(&self, predicate: impl Fn(&CreatorKind) -> bool) -> Vec<NodeId> {
        self.flatten()
            .into_iter()
            .filter(|&id| predicate(&self.node(id).kind))
            .collect()
    }

    /// Position of the last include among the root's children
    pub fn last_include_index(&self) -> Option<usize> {
        self.children(self.root())
            .iter()
            .rposition(|&id| matches!(self.node(id).kind, CreatorKind::Include(_)))
    }

    /// Add an include right after the existing ones, unless it is present
    pub fn adopt_include(&mut self, header: impl Into<String>) -> NodeId {
        let header = header.into();
        let root = self.root();
        let existing = self
            .children(root)
            .iter()
            .copied()
            .find(|&id| self.node(id).kind == CreatorKind::Include(header.clone()));
        if let Some(id) = existing {
            return id;
        }
        let position = self.last_include_index().map_or(0, |index| index + 1);
        self.insert(root, position, CreatorKind::Include(header), None)
    }

    /// Replace the child order of `parent` with a permutation of it
    pub(crate) fn reorder_children(&mut self, parent: NodeId, order: Vec<NodeId>) {
        debug_assert_eq!(order.len(), self.children(parent).len());
        self.nodes[parent.index()].children = order;
    }
}

impl Default for CreatorTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Indent every non-empty line by `level` steps of four spaces
pub fn indent(text: &str, level: usize) -> String {
    let pad = "    ".repeat(level);
    text.lines()
        .map(|line| if line.is_empty() { String::new() } else { format!("{}{}", pad, line) })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flatten_is_preorder() {
        let mut tree = CreatorTree::new();
        let root = tree.root();
        let ns = tree.append(root, CreatorKind::Namespace, Some(DeclId(1)));
        let class = tree.append(ns, CreatorKind::Class, Some(DeclId(2)));
        let method = tree.append(class, CreatorKind::Function, Some(DeclId(3)));
        let free = tree.append(root, CreatorKind::Function, Some(DeclId(4)));

        assert_eq!(tree.flatten(), vec![root, ns, class, method, free]);
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.parent(method), Some(class));
        assert_eq!(tree.find_by_declaration(DeclId(3)), Some(method));
    }

    #[test]
    fn test_insert_and_remove() {
        let mut tree = CreatorTree::new();
        let root = tree.root();
        let a = tree.append(root, CreatorKind::Class, Some(DeclId(1)));
        let b = tree.insert(root, 0, CreatorKind::Class, Some(DeclId(2)));
        let c = tree.insert(root, 99, CreatorKind::Class, Some(DeclId(3)));
        let nested = tree.append(a, CreatorKind::Function, Some(DeclId(4)));
        assert_eq!(tree.children(root), &[b, a, c]);

        tree.remove(a);
        assert_eq!(tree.children(root), &[b, c]);
        assert_eq!(tree.find_by_declaration(DeclId(4)), None);
        assert!(!tree.flatten().contains(&nested));
        assert_eq!(tree.len(), 3);

        tree.remove(root);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_includes_stay_together() {
        let mut tree = CreatorTree::new();
        let root = tree.root();
        tree.append(root, CreatorKind::Include("boost/python.hpp".into()), None);
        tree.append(root, CreatorKind::NamespaceAlias { alias: "bp".into(), target: "boost::python".into() }, None);
        assert_eq!(tree.last_include_index(), Some(0));

        let added = tree.adopt_include("geometry.hpp");
        assert_eq!(tree.children(root)[1], added);
        assert_eq!(tree.adopt_include("geometry.hpp"), added);
        assert_eq!(tree.last_include_index(), Some(1));
        assert_eq!(tree.find_by_kind(|kind| matches!(kind, CreatorKind::Include(_))).len(), 2);
    }

    #[test]
    fn test_indent() {
        assert_eq!(indent("abc", 1), "    abc");
        assert_eq!(indent("a\n\nb", 2), "        a\n\n        b");
    }
}

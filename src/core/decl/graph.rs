use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::debug;

use super::matchers::{normalize_path, DeclMatcher};
use super::model::{Access, BaseRelation, DeclId, DeclKind, DeclKindTag, Declaration, Location, TypeRef};
use crate::core::names::join_template;
use crate::error::{BindsworthError, Result};

/// Typedef chains longer than this are treated as unresolvable
const MAX_TYPEDEF_DEPTH: usize = 16;

/// Name and kind indices built by [`DeclGraph::optimize`]
#[derive(Debug, Clone, Default)]
struct QueryIndex {
    by_name: HashMap<String, Vec<DeclId>>,
    by_kind: HashMap<DeclKindTag, Vec<DeclId>>,
}

impl QueryIndex {
    fn candidates(&self, matcher: &dyn DeclMatcher) -> Option<&[DeclId]> {
        if let Some(name) = matcher.name_hint() {
            return Some(self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[]));
        }
        if let Some(kind) = matcher.kind_hint() {
            return Some(self.by_kind.get(&kind).map(Vec::as_slice).unwrap_or(&[]));
        }
        None
    }
}

/// Arena of every declaration in the dump.
///
/// The arena is the sole owner of declarations; parent links and child
/// lists are plain indices into it.
#[derive(Debug, Clone)]
pub struct DeclGraph {
    decls: Vec<Declaration>,
    children: Vec<Vec<DeclId>>,
    qualified: HashMap<String, Vec<DeclId>>,
    /// Pre-order position of every declaration, valid while `index` is set
    rank: Vec<u32>,
    index: Option<QueryIndex>,
}

impl DeclGraph {
    pub fn new() -> Self {
        let global = Declaration {
            id: DeclId(0),
            name: "::".to_string(),
            parent: None,
            location: None,
            kind: DeclKind::Namespace,
            access: Access::Public,
            excluded: false,
            alias: None,
            wrapper_alias: None,
            user_code: Vec::new(),
        };
        let mut qualified = HashMap::new();
        qualified.insert("::".to_string(), vec![DeclId(0)]);
        Self {
            decls: vec![global],
            children: vec![Vec::new()],
            qualified,
            rank: Vec::new(),
            index: None,
        }
    }

    /// The global namespace
    pub fn global(&self) -> DeclId {
        DeclId(0)
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.len() == 1
    }

    pub fn get(&self, id: DeclId) -> &Declaration {
        &self.decls[id.index()]
    }

    fn get_mut(&mut self, id: DeclId) -> &mut Declaration {
        &mut self.decls[id.index()]
    }

    pub fn children(&self, id: DeclId) -> &[DeclId] {
        &self.children[id.index()]
    }

    pub fn parent(&self, id: DeclId) -> Option<DeclId> {
        self.get(id).parent
    }

    /// Add a declaration as the last child of `parent`
    pub fn add(
        &mut self,
        parent: DeclId,
        name: impl Into<String>,
        location: Option<Location>,
        kind: DeclKind,
    ) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(Declaration {
            id,
            name: name.into(),
            parent: Some(parent),
            location,
            kind,
            access: Access::Public,
            excluded: false,
            alias: None,
            wrapper_alias: None,
            user_code: Vec::new(),
        });
        self.children.push(Vec::new());
        self.children[parent.index()].push(id);

        if !self.get(id).is_anonymous() {
            let qualified = self.qualified_name(id);
            self.qualified.entry(qualified).or_default().push(id);
        }

        // Structure changed; indices have to be rebuilt
        self.index = None;
        id
    }

    /// Fully qualified name, e.g. `::geometry::circle`
    pub fn qualified_name(&self, id: DeclId) -> String {
        let decl = self.get(id);
        match decl.parent {
            None => "::".to_string(),
            Some(parent) if parent == self.global() => format!("::{}", decl.name),
            Some(parent) => format!("{}::{}", self.qualified_name(parent), decl.name),
        }
    }

    /// Qualified name suitable for messages; anonymous declarations are
    /// described by their scope and location
    pub fn display_name(&self, id: DeclId) -> String {
        let decl = self.get(id);
        if !decl.is_anonymous() {
            return self.qualified_name(id);
        }
        let scope = decl.parent.map(|p| self.qualified_name(p)).unwrap_or_default();
        match &decl.location {
            Some(location) => format!("{} <unnamed {}> {}", scope, decl.kind.tag(), location),
            None => format!("{} <unnamed {}>", scope, decl.kind.tag()),
        }
    }

    /// All declarations registered under a qualified name (overloads share one)
    pub fn lookup(&self, qualified: &str) -> &[DeclId] {
        let key = if qualified.starts_with("::") {
            qualified.to_string()
        } else {
            format!("::{}", qualified)
        };
        self.qualified.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Declarations of `root`'s subtree in pre-order, `root` first
    pub fn preorder(&self, root: DeclId) -> Vec<DeclId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    pub fn is_ancestor(&self, ancestor: DeclId, id: DeclId) -> bool {
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = self.parent(parent);
        }
        false
    }

    /// Nearest enclosing class, if any
    pub fn enclosing_class(&self, id: DeclId) -> Option<DeclId> {
        let mut current = self.parent(id);
        while let Some(parent) = current {
            if self.get(parent).is_class() {
                return Some(parent);
            }
            current = self.parent(parent);
        }
        None
    }

    /// A declaration is exported when it is not a namespace, is public, is
    /// not excluded, and sits in no excluded class. Include rules can't
    /// export private or protected members; module code can't name them.
    pub fn is_exported(&self, id: DeclId) -> bool {
        let decl = self.get(id);
        if decl.is_namespace() || decl.excluded || decl.access != Access::Public {
            return false;
        }
        let mut current = decl.parent;
        while let Some(parent) = current {
            let parent_decl = self.get(parent);
            if parent_decl.is_class() && parent_decl.excluded {
                return false;
            }
            current = parent_decl.parent;
        }
        true
    }

    /// Every exported declaration in discovery order
    pub fn exported(&self) -> Vec<DeclId> {
        self.preorder(self.global())
            .into_iter()
            .filter(|&id| self.is_exported(id))
            .collect()
    }

    /// Resolve a type spelling to the class-like declaration it names,
    /// following typedef chains. Fundamental and unknown types yield `None`.
    pub fn resolve_type(&self, ty: &TypeRef) -> Option<DeclId> {
        let mut name = ty.base_name();
        for _ in 0..MAX_TYPEDEF_DEPTH {
            let candidates = self.lookup(&name);
            let found = candidates
                .iter()
                .copied()
                .find(|&id| {
                    let decl = self.get(id);
                    decl.is_class_like() || matches!(decl.kind, DeclKind::Typedef { .. })
                })?;
            match &self.get(found).kind {
                DeclKind::Typedef { target } => name = target.base_name(),
                _ => return Some(found),
            }
        }
        None
    }

    // ---- filtering phase ------------------------------------------------

    pub fn set_access(&mut self, id: DeclId, access: Access) {
        self.get_mut(id).access = access;
    }

    pub fn exclude(&mut self, id: DeclId) {
        self.get_mut(id).excluded = true;
    }

    pub fn include(&mut self, id: DeclId) {
        self.get_mut(id).excluded = false;
    }

    pub fn exclude_recursive(&mut self, id: DeclId) {
        for member in self.preorder(id) {
            self.exclude(member);
        }
    }

    pub fn include_recursive(&mut self, id: DeclId) {
        for member in self.preorder(id) {
            self.include(member);
        }
    }

    /// Caller guarantees `alias` is a valid target-language identifier
    pub fn set_alias(&mut self, id: DeclId, alias: impl Into<String>) {
        self.get_mut(id).alias = Some(alias.into());
    }

    pub fn set_wrapper_alias(&mut self, id: DeclId, alias: impl Into<String>) {
        self.get_mut(id).wrapper_alias = Some(alias.into());
    }

    /// Export an enumerator under a different name
    pub fn set_value_alias(&mut self, id: DeclId, value: &str, alias: impl Into<String>) -> Result<()> {
        let query = format!("enumerator '{}' of {}", value, self.display_name(id));
        match &mut self.get_mut(id).kind {
            DeclKind::Enum(decl) if decl.values.iter().any(|(name, _)| name == value) => {
                decl.value_aliases.insert(value.to_string(), alias.into());
                Ok(())
            }
            _ => Err(BindsworthError::QueryMismatch { query, found: 0 }),
        }
    }

    /// Append registration code to the declaration's creator
    pub fn add_code(&mut self, id: DeclId, code: impl Into<String>) {
        self.get_mut(id).user_code.push(code.into());
    }

    /// Change a declaration's name, keeping the lookup tables current
    pub fn rename(&mut self, id: DeclId, name: impl Into<String>) {
        let subtree = self.preorder(id);
        for &member in &subtree {
            if self.get(member).is_anonymous() {
                continue;
            }
            let old = self.qualified_name(member);
            if let Some(ids) = self.qualified.get_mut(&old) {
                ids.retain(|&other| other != member);
                if ids.is_empty() {
                    self.qualified.remove(&old);
                }
            }
        }

        let old_name = std::mem::replace(&mut self.get_mut(id).name, name.into());

        for &member in &subtree {
            if self.get(member).is_anonymous() {
                continue;
            }
            let new = self.qualified_name(member);
            self.qualified.entry(new).or_default().push(member);
        }

        let new_name = self.get(id).name.clone();
        let rank = &self.rank;
        if let Some(index) = self.index.as_mut() {
            if let Some(ids) = index.by_name.get_mut(&old_name) {
                ids.retain(|&other| other != id);
            }
            let ids = index.by_name.entry(new_name).or_default();
            ids.push(id);
            ids.sort_by_key(|other| rank[other.index()]);
        }
    }

    /// Give a function template instantiation an unambiguous C++ name while
    /// keeping its original name as the exported one.
    ///
    /// `parse_iso_time` with `["::boost::posix_time::ptime"]` becomes
    /// `parse_iso_time< ::boost::posix_time::ptime >`, exported as
    /// `parse_iso_time` (plus `alias_suffix`, if any).
    pub fn disambiguate_template_function(
        &mut self,
        id: DeclId,
        template_args: &[String],
        alias_suffix: Option<&str>,
    ) -> Result<()> {
        let decl = self.get(id);
        if decl.as_callable().is_none() {
            return Err(BindsworthError::QueryMismatch {
                query: format!("function {}", self.display_name(id)),
                found: 0,
            });
        }
        let original = decl.alias.clone().unwrap_or_else(|| decl.name.clone());
        let joined = join_template(&decl.name, template_args);
        self.set_alias(id, format!("{}{}", original, alias_suffix.unwrap_or("")));
        self.rename(id, joined);
        Ok(())
    }

    /// Exclude declarations located outside the given header files and
    /// directories. Declarations without a location are left alone.
    /// Returns the number of newly excluded declarations.
    pub fn exclude_outside(&mut self, headers: &[PathBuf]) -> usize {
        if headers.is_empty() {
            return 0;
        }
        let headers: Vec<PathBuf> = headers.iter().map(|h| normalize_path(h)).collect();
        let mut excluded = 0;
        for index in 1..self.decls.len() {
            let decl = &self.decls[index];
            let Some(location) = &decl.location else { continue };
            let file = normalize_path(&location.file);
            let inside = headers
                .iter()
                .any(|header| file == *header || file.ends_with(header) || file.starts_with(header));
            if !inside && !decl.excluded {
                self.decls[index].excluded = true;
                excluded += 1;
            }
        }
        debug!("Location filter excluded {} declarations", excluded);
        excluded
    }

    // ---- queries ----------------------------------------------------------

    /// Declarations below `scope` matching `matcher`, in discovery order
    pub fn select(&self, scope: DeclId, matcher: &dyn DeclMatcher, recursive: bool) -> Vec<DeclId> {
        if let Some(index) = &self.index {
            if let Some(candidates) = index.candidates(matcher) {
                return candidates
                    .iter()
                    .copied()
                    .filter(|&id| self.in_scope(scope, id, recursive))
                    .filter(|&id| matcher.matches(self.get(id), self))
                    .collect();
            }
        }
        let mut result = Vec::new();
        self.collect_matches(scope, matcher, recursive, &mut result);
        result
    }

    /// Recursive selection from the global namespace
    pub fn select_all(&self, matcher: &dyn DeclMatcher) -> Vec<DeclId> {
        self.select(self.global(), matcher, true)
    }

    /// Exactly one match, or a [`BindsworthError::QueryMismatch`] naming the query
    pub fn single(&self, matcher: &dyn DeclMatcher) -> Result<DeclId> {
        let found = self.select_all(matcher);
        match found.as_slice() {
            [id] => Ok(*id),
            _ => Err(BindsworthError::QueryMismatch {
                query: matcher.describe(),
                found: found.len(),
            }),
        }
    }

    fn in_scope(&self, scope: DeclId, id: DeclId, recursive: bool) -> bool {
        if recursive {
            self.is_ancestor(scope, id)
        } else {
            self.parent(id) == Some(scope)
        }
    }

    fn collect_matches(&self, scope: DeclId, matcher: &dyn DeclMatcher, recursive: bool, out: &mut Vec<DeclId>) {
        for &child in self.children(scope) {
            if matcher.matches(self.get(child), self) {
                out.push(child);
            }
            if recursive {
                self.collect_matches(child, matcher, recursive, out);
            }
        }
    }

    /// Build the name and kind indices. Safe to call repeatedly.
    pub fn optimize(&mut self) {
        let order = self.preorder(self.global());
        let mut rank = vec![0u32; self.decls.len()];
        let mut index = QueryIndex::default();
        for (position, &id) in order.iter().enumerate() {
            rank[id.index()] = position as u32;
            let decl = self.get(id);
            index.by_name.entry(decl.name.clone()).or_default().push(id);
            index.by_kind.entry(decl.kind.tag()).or_default().push(id);
        }
        self.rank = rank;
        self.index = Some(index);
        debug!("Query optimizer indexed {} declarations", order.len());
    }

    pub fn is_optimized(&self) -> bool {
        self.index.is_some()
    }

    // ---- loading ----------------------------------------------------------

    /// Resolve every base-class name to its declaration
    pub(crate) fn link_bases(&mut self) -> Result<()> {
        for index in 0..self.decls.len() {
            let id = DeclId(index as u32);
            let bases = match &self.decls[index].kind {
                DeclKind::Class(class) => class.bases.clone(),
                _ => continue,
            };
            let mut linked = Vec::with_capacity(bases.len());
            for base in bases {
                let resolved = self
                    .lookup(&base.name)
                    .iter()
                    .copied()
                    .find(|&candidate| self.get(candidate).is_class());
                match resolved {
                    Some(base_id) => linked.push(BaseRelation { resolved: Some(base_id), ..base }),
                    None => {
                        return Err(BindsworthError::InvariantViolation {
                            declaration: self.display_name(id),
                            reason: format!("base class {} is not part of the declaration dump", base.name),
                        })
                    }
                }
            }
            if let DeclKind::Class(class) = &mut self.decls[index].kind {
                class.bases = linked;
            }
        }
        Ok(())
    }

    /// Direct bases resolved to declarations
    pub fn bases_of(&self, id: DeclId) -> Vec<DeclId> {
        self.get(id)
            .as_class()
            .map(|class| class.bases.iter().filter_map(|base| base.resolved).collect())
            .unwrap_or_default()
    }

    /// Human readable listing of a declaration and everything below it
    pub fn describe(&self, id: DeclId) -> String {
        let mut out = String::new();
        self.describe_into(id, 0, &mut out);
        out
    }

    fn describe_into(&self, id: DeclId, depth: usize, out: &mut String) {
        let pad = "    ".repeat(depth);
        let decl = self.get(id);
        let name = if decl.is_anonymous() { "<unnamed>" } else { decl.name.as_str() };
        let _ = writeln!(out, "{}{} '{}'", pad, decl.kind.tag(), name);
        if let Some(location) = &decl.location {
            let _ = writeln!(out, "{}    location: {}", pad, location);
        }
        if decl.access != Access::Public {
            let _ = writeln!(out, "{}    access: {:?}", pad, decl.access);
        }
        let _ = writeln!(out, "{}    excluded: {}", pad, decl.excluded);
        if let Some(alias) = &decl.alias {
            let _ = writeln!(out, "{}    alias: {}", pad, alias);
        }
        if let Some(alias) = &decl.wrapper_alias {
            let _ = writeln!(out, "{}    wrapper alias: {}", pad, alias);
        }
        match &decl.kind {
            DeclKind::Class(class) => {
                for base in &class.bases {
                    let virtuality = if base.is_virtual { " virtual" } else { "" };
                    let _ = writeln!(out, "{}    base:{} {:?} {}", pad, virtuality, base.access, base.name);
                }
            }
            DeclKind::Function(callable) => {
                let _ = writeln!(out, "{}    signature: {}", pad, callable.signature());
            }
            DeclKind::Enum(decl) => {
                for (value_name, value) in &decl.values {
                    let _ = writeln!(out, "{}    value: {} = {}", pad, decl.value_name(value_name), value);
                }
            }
            DeclKind::Typedef { target } => {
                let _ = writeln!(out, "{}    target: {}", pad, target);
            }
            DeclKind::Variable { ty, .. } => {
                let _ = writeln!(out, "{}    type: {}", pad, ty);
            }
            DeclKind::Namespace => {}
        }
        for &child in self.children(id) {
            self.describe_into(child, depth + 1, out);
        }
    }
}

impl Default for DeclGraph {
    fn default() -> Self {
        Self::new()
    }
}

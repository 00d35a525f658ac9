use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::config::ClosureConfig;
use crate::core::decl::{DeclGraph, DeclId, DeclKind, TypeRef};

/// Why one declaration requires another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyReason {
    BaseClass,
    MemberType,
    ArgumentType,
    ReturnType,
    NestedDeclaration,
}

impl fmt::Display for DependencyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DependencyReason::BaseClass => "base class",
            DependencyReason::MemberType => "member type",
            DependencyReason::ArgumentType => "argument type",
            DependencyReason::ReturnType => "return type",
            DependencyReason::NestedDeclaration => "nested declaration",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub dependent: DeclId,
    pub target: DeclId,
    pub reason: DependencyReason,
}

/// An exported declaration that requires a declaration nobody exports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub dependent: DeclId,
    pub target: DeclId,
    pub reason: DependencyReason,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Computes dependency edges over a frozen graph, memoized per declaration
pub struct DependencyResolver<'g> {
    graph: &'g DeclGraph,
    closure: ClosureConfig,
    cache: HashMap<DeclId, Vec<Dependency>>,
}

impl<'g> DependencyResolver<'g> {
    pub fn new(graph: &'g DeclGraph, closure: &ClosureConfig) -> Self {
        Self {
            graph,
            closure: closure.clone(),
            cache: HashMap::new(),
        }
    }

    /// Dependencies of `id` in a stable order.
    ///
    /// For a class this is its direct bases followed by the dependencies
    /// of every non-excluded member; member edges keep the member as the
    /// dependent.
    pub fn dependencies_of(&mut self, id: DeclId) -> Vec<Dependency> {
        if let Some(cached) = self.cache.get(&id) {
            return cached.clone();
        }
        let computed = if self.is_exempt(id) {
            Vec::new()
        } else {
            self.compute(id)
        };
        self.cache.insert(id, computed.clone());
        computed
    }

    fn compute(&mut self, id: DeclId) -> Vec<Dependency> {
        let graph = self.graph;
        let decl = graph.get(id);
        let mut deps = Vec::new();

        match &decl.kind {
            DeclKind::Class(class) => {
                for base in class.bases.iter().filter_map(|base| base.resolved) {
                    deps.push(Dependency { dependent: id, target: base, reason: DependencyReason::BaseClass });
                }
                for &member in graph.children(id) {
                    if graph.get(member).excluded {
                        continue;
                    }
                    deps.extend(
                        self.dependencies_of(member)
                            .into_iter()
                            .filter(|dep| dep.target != id || dep.reason != DependencyReason::NestedDeclaration),
                    );
                }
            }
            DeclKind::Function(callable) => {
                for argument in &callable.arguments {
                    self.push_type(&mut deps, id, &argument.ty, DependencyReason::ArgumentType);
                }
                if let Some(ret) = &callable.return_type {
                    self.push_type(&mut deps, id, ret, DependencyReason::ReturnType);
                }
            }
            DeclKind::Variable { ty, .. } => {
                self.push_type(&mut deps, id, ty, DependencyReason::MemberType);
            }
            DeclKind::Typedef { target } => {
                self.push_type(&mut deps, id, target, DependencyReason::MemberType);
            }
            DeclKind::Enum(_) | DeclKind::Namespace => {}
        }

        if let Some(parent) = decl.parent.filter(|&parent| graph.get(parent).is_class()) {
            deps.push(Dependency { dependent: id, target: parent, reason: DependencyReason::NestedDeclaration });
        }
        deps
    }

    fn push_type(&self, deps: &mut Vec<Dependency>, id: DeclId, ty: &TypeRef, reason: DependencyReason) {
        if let Some(target) = self.graph.resolve_type(ty) {
            if target != id {
                deps.push(Dependency { dependent: id, target, reason });
            }
        }
    }

    /// Exempt declarations are assumed to be available in the target
    /// without being exported: opaque classes, and everything inside one
    /// of the exempt namespaces directly below the global namespace unless
    /// its top-level name starts with one of the checked prefixes
    pub fn is_exempt(&self, id: DeclId) -> bool {
        let graph = self.graph;
        if graph.get(id).as_class().map_or(false, |class| class.opaque) {
            return true;
        }

        let global = graph.global();
        let mut current = id;
        while let Some(parent) = graph.parent(current) {
            let parent_decl = graph.get(parent);
            if parent_decl.is_namespace()
                && parent_decl.parent == Some(global)
                && self.closure.exempt_namespaces.iter().any(|ns| *ns == parent_decl.name)
            {
                let top_level = &graph.get(current).name;
                return !self
                    .closure
                    .checked_prefixes
                    .iter()
                    .any(|prefix| top_level.starts_with(prefix.as_str()));
            }
            current = parent;
        }
        false
    }

    /// Every dependency of an exported declaration whose target is neither
    /// exported nor exempt. Each (dependent, target, reason) is reported once.
    pub fn verify_closure(&mut self, exported: &[DeclId]) -> Vec<Violation> {
        let exported_set: HashSet<DeclId> = exported.iter().copied().collect();
        let mut seen = HashSet::new();
        let mut violations = Vec::new();

        for &id in exported {
            for dep in self.dependencies_of(id) {
                if exported_set.contains(&dep.target) || self.is_exempt(dep.target) {
                    continue;
                }
                if !seen.insert(dep.clone()) {
                    continue;
                }
                let message = format!(
                    "{} depends on {} ({}), which is not exported",
                    self.graph.display_name(dep.dependent),
                    self.graph.display_name(dep.target),
                    dep.reason
                );
                violations.push(Violation {
                    dependent: dep.dependent,
                    target: dep.target,
                    reason: dep.reason,
                    message,
                });
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decl::{Access, Argument, BaseRelation, Callable, CallableFlavor, ClassDecl};

    fn class(bases: &[&str], opaque: bool) -> DeclKind {
        DeclKind::Class(ClassDecl {
            bases: bases
                .iter()
                .map(|name| BaseRelation {
                    name: name.to_string(),
                    access: Access::Public,
                    is_virtual: false,
                    resolved: None,
                })
                .collect(),
            is_struct: false,
            opaque,
        })
    }

    fn function(ret: &str, args: &[&str]) -> DeclKind {
        DeclKind::Function(Callable {
            flavor: CallableFlavor::Function,
            return_type: Some(TypeRef::new(ret)),
            arguments: args
                .iter()
                .map(|ty| Argument { name: None, ty: TypeRef::new(*ty), default: None })
                .collect(),
            is_static: false,
            is_const: false,
            is_virtual: false,
            is_pure_virtual: false,
        })
    }

    struct Fixture {
        graph: DeclGraph,
        shape: DeclId,
        circle: DeclId,
        point: DeclId,
        area: DeclId,
    }

    fn fixture() -> Fixture {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let std_ns = graph.add(global, "std", None, DeclKind::Namespace);
        graph.add(std_ns, "string", None, class(&[], false));
        graph.add(std_ns, "pair<int, int>", None, class(&[], false));

        let geo = graph.add(global, "geo", None, DeclKind::Namespace);
        let point = graph.add(geo, "point", None, class(&[], false));
        graph.add(geo, "handle", None, class(&[], true));
        let shape = graph.add(geo, "shape", None, class(&[], false));
        let circle = graph.add(geo, "circle", None, class(&["::geo::shape"], false));
        let area = graph.add(circle, "center", None, function("::geo::point const &", &["::std::string", "int"]));
        graph.add(circle, "range", None, function("::std::pair<int, int>", &[]));
        graph.add(circle, "raw", None, function("void", &["::geo::handle *"]));
        graph.link_bases().unwrap();
        Fixture { graph, shape, circle, point, area }
    }

    #[test]
    fn test_class_dependencies_in_order() {
        let f = fixture();
        let mut resolver = DependencyResolver::new(&f.graph, &ClosureConfig::default());
        let deps = resolver.dependencies_of(f.circle);

        assert_eq!(deps[0], Dependency { dependent: f.circle, target: f.shape, reason: DependencyReason::BaseClass });
        assert!(deps.contains(&Dependency { dependent: f.area, target: f.point, reason: DependencyReason::ReturnType }));
        // the class does not depend on itself through its members
        assert!(deps.iter().all(|dep| dep.target != f.circle));

        let member = resolver.dependencies_of(f.area);
        assert_eq!(
            member.last(),
            Some(&Dependency { dependent: f.area, target: f.circle, reason: DependencyReason::NestedDeclaration })
        );
    }

    #[test]
    fn test_std_exemption_and_pair_carve_out() {
        let f = fixture();
        let resolver = DependencyResolver::new(&f.graph, &ClosureConfig::default());
        let string = f.graph.lookup("::std::string")[0];
        let pair = f.graph.lookup("::std::pair<int, int>")[0];
        let handle = f.graph.lookup("::geo::handle")[0];

        assert!(resolver.is_exempt(string));
        assert!(!resolver.is_exempt(pair));
        assert!(resolver.is_exempt(handle));
        assert!(!resolver.is_exempt(f.point));
    }

    #[test]
    fn test_closure_reports_missing_class() {
        let mut f = fixture();
        f.graph.exclude(f.point);
        let exported: Vec<DeclId> = f
            .graph
            .exported()
            .into_iter()
            .filter(|&id| !f.graph.is_ancestor(f.graph.lookup("::std")[0], id))
            .collect();

        let mut resolver = DependencyResolver::new(&f.graph, &ClosureConfig::default());
        let violations = resolver.verify_closure(&exported);

        let targets: Vec<String> = violations.iter().map(|v| f.graph.qualified_name(v.target)).collect();
        assert!(targets.contains(&"::geo::point".to_string()));
        assert!(targets.contains(&"::std::pair<int, int>".to_string()));
        assert!(!targets.contains(&"::std::string".to_string()));
        assert!(!targets.contains(&"::geo::handle".to_string()));

        // reported once although both the class and the member carry the edge
        assert_eq!(targets.iter().filter(|t| *t == "::geo::point").count(), 1);
        let point = violations.iter().find(|v| v.target == f.point).unwrap();
        assert!(point.message.contains("::geo::circle::center"));
        assert!(point.message.contains("return type"));
    }

    #[test]
    fn test_closed_set_has_no_violations() {
        let f = fixture();
        let exported = f.graph.exported();
        let mut resolver = DependencyResolver::new(&f.graph, &ClosureConfig::default());
        assert!(resolver.verify_closure(&exported).is_empty());
    }

    #[test]
    fn test_configurable_exemptions() {
        let f = fixture();
        let closure = ClosureConfig {
            exempt_namespaces: vec!["std".to_string()],
            checked_prefixes: Vec::new(),
            ..ClosureConfig::default()
        };
        let resolver = DependencyResolver::new(&f.graph, &closure);
        let pair = f.graph.lookup("::std::pair<int, int>")[0];
        assert!(resolver.is_exempt(pair));
    }
}

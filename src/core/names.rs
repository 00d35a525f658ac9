//! Identifier resolution for exported declarations.
//!
//! Precedence is: user alias, then the natural name made into a valid
//! identifier, then a synthesized name for anonymous declarations. Template
//! instantiations are named after their escaped arguments.

use std::collections::HashMap;
use std::sync::OnceLock;
use regex::Regex;
use tracing::debug;

use super::decl::{CallableFlavor, DeclGraph, DeclId, DeclKind};
use crate::error::{BindsworthError, Result};

/// Characters that can't appear in an identifier, with their spelled-out form
const REPLACE_TABLE: &[(&str, &str)] = &[
    ("<", "_less_"),
    (">", "_greater_"),
    ("::", "_scope_"),
    (",", "_comma_"),
    (" ", "_"),
    ("\t", "_"),
    ("*", "_ptr_"),
    ("&", "_ref_"),
    ("(", "_obrace_"),
    (")", "_cbrace_"),
    ("[", "_o_sq_brace_"),
    ("]", "_c_sq_brace_"),
    ("=", "_equal_"),
    (".", "_dot_"),
    ("$", "_dollar_"),
    ("-", "_minus_"),
    ("+", "_plus_"),
    ("/", "_div_"),
    ("%", "_mod_"),
    ("!", "_not_"),
    ("~", "_invert_"),
    ("^", "_xor_"),
    ("|", "_or_"),
];

/// Escape every character that is not valid in a C++/Python identifier
pub fn create_valid_name(name: &str) -> String {
    let mut result = name.to_string();
    for (from, to) in REPLACE_TABLE {
        result = result.replace(from, to);
    }
    if result.chars().next().map_or(false, |c| c.is_ascii_digit()) {
        result.insert(0, '_');
    }
    result
}

/// Normalize the spelling of a type so equal types compare equal:
/// whitespace collapsed, no blanks around punctuation, no leading `::`
pub fn canonicalize_type(spelling: &str) -> String {
    static SPACES: OnceLock<Regex> = OnceLock::new();
    static PUNCT: OnceLock<Regex> = OnceLock::new();
    static GLOBAL: OnceLock<Regex> = OnceLock::new();

    let spaces = SPACES.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    let punct = PUNCT.get_or_init(|| Regex::new(r"\s*([<>,*&()\[\]])\s*").expect("valid regex"));
    let global = GLOBAL.get_or_init(|| Regex::new(r"(^|[<,(])::").expect("valid regex"));

    let collapsed = spaces.replace_all(spelling.trim(), " ");
    let tight = punct.replace_all(&collapsed, "$1");
    global.replace_all(&tight, "$1").into_owned()
}

/// Split `::a::b<c::d>::e` into (`::a::b<c::d>`, `e`), ignoring `::` inside
/// template argument lists
pub fn split_qualified(name: &str) -> (&str, &str) {
    let bytes = name.as_bytes();
    let mut depth = 0i32;
    let mut split = None;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'<' => depth += 1,
            b'>' => depth -= 1,
            b':' if depth == 0 && i + 1 < bytes.len() && bytes[i + 1] == b':' => {
                split = Some(i);
                i += 1;
            }
            _ => {}
        }
        i += 1;
    }
    match split {
        Some(pos) => (&name[..pos], &name[pos + 2..]),
        None => ("", name),
    }
}

/// Split `vector<int, ::a::b>` into `vector` and its top-level arguments
pub fn split_template(name: &str) -> Option<(&str, Vec<String>)> {
    let open = name.find('<')?;
    let close = name.rfind('>')?;
    if close < open {
        return None;
    }
    let inner = &name[open + 1..close];
    let mut args = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in inner.char_indices() {
        match c {
            '<' | '(' => depth += 1,
            '>' | ')' => depth -= 1,
            ',' if depth == 0 => {
                args.push(inner[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    let last = inner[start..].trim();
    if !last.is_empty() {
        args.push(last.to_string());
    }
    Some((name[..open].trim(), args))
}

/// `join_template("f", ["char"])` is `f< char >`
pub fn join_template(name: &str, args: &[String]) -> String {
    format!("{}< {} >", name, args.join(", "))
}

/// Identifier for a template instantiation: base name joined with the
/// escaped canonical form of every argument
pub fn template_name(name: &str) -> String {
    match split_template(name) {
        Some((base, args)) => {
            let escaped: Vec<String> = args
                .iter()
                .map(|arg| create_valid_name(&canonicalize_type(arg)))
                .collect();
            format!("{}_less_{}_greater_", create_valid_name(base), escaped.join("_comma_"))
        }
        None => create_valid_name(name),
    }
}

/// Python special method implementing a C++ operator
pub fn operator_alias(symbol: &str, unary: bool) -> Option<&'static str> {
    if unary {
        return match symbol {
            "-" => Some("__neg__"),
            "+" => Some("__pos__"),
            "~" => Some("__invert__"),
            _ => None,
        };
    }
    let name = match symbol {
        "+" => "__add__",
        "-" => "__sub__",
        "*" => "__mul__",
        "/" => "__truediv__",
        "%" => "__mod__",
        "==" => "__eq__",
        "!=" => "__ne__",
        "<" => "__lt__",
        ">" => "__gt__",
        "<=" => "__le__",
        ">=" => "__ge__",
        "+=" => "__iadd__",
        "-=" => "__isub__",
        "*=" => "__imul__",
        "/=" => "__itruediv__",
        "&" => "__and__",
        "|" => "__or__",
        "^" => "__xor__",
        "<<" => "__lshift__",
        ">>" => "__rshift__",
        "()" => "__call__",
        "[]" => "__getitem__",
        _ => return None,
    };
    Some(name)
}

/// Whether an operator declaration takes a single operand
pub fn is_unary_operator(graph: &DeclGraph, id: DeclId) -> bool {
    let Some(callable) = graph.get(id).as_callable() else {
        return false;
    };
    let member = graph.parent(id).map_or(false, |parent| graph.get(parent).is_class());
    let operands = callable.arguments.len() + usize::from(member);
    operands == 1
}

/// Resolve the identifier a declaration is exported under
pub fn resolve_name(graph: &DeclGraph, id: DeclId) -> String {
    let decl = graph.get(id);
    if let Some(alias) = &decl.alias {
        return alias.clone();
    }
    if let Some(symbol) = decl.as_callable().and_then(|c| c.operator_symbol()) {
        if let Some(name) = operator_alias(symbol, is_unary_operator(graph, id)) {
            return name.to_string();
        }
        return create_valid_name(&format!("operator{}", symbol));
    }
    if decl.is_anonymous() {
        return format!("_unnamed_{}_{}", decl.kind.tag(), id.0);
    }
    if decl.name.contains('<') {
        return template_name(&decl.name);
    }
    create_valid_name(&decl.name)
}

/// What occupies an identifier in a target scope
#[derive(Debug, Clone)]
struct Claim {
    owner: DeclId,
    /// Overload key for function claims; functions with different keys
    /// form an overload set
    signature: Option<String>,
}

/// Resolved identifiers of every exported declaration
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: HashMap<DeclId, String>,
}

impl NameTable {
    /// Resolve all names and reject collisions within a target scope.
    ///
    /// The target scope of a declaration is its nearest enclosing class, or
    /// the module for everything at namespace level.
    pub fn build(graph: &DeclGraph, exported: &[DeclId]) -> Result<Self> {
        let mut names = HashMap::new();
        let mut claims: HashMap<(Option<DeclId>, String), Claim> = HashMap::new();

        for &id in exported {
            let decl = graph.get(id);
            let identifier = resolve_name(graph, id);
            names.insert(id, identifier.clone());

            let scope = graph.enclosing_class(id);
            let claimed: Vec<(String, Option<String>)> = match &decl.kind {
                DeclKind::Function(callable) if callable.flavor == CallableFlavor::Constructor => Vec::new(),
                DeclKind::Function(callable) => vec![(identifier, Some(callable.overload_key()))],
                DeclKind::Enum(decl_enum) if decl.is_anonymous() => decl_enum
                    .values
                    .iter()
                    .map(|(value, _)| (decl_enum.value_name(value).to_string(), None))
                    .collect(),
                _ => vec![(identifier, None)],
            };

            for (name, signature) in claimed {
                let key = (scope, name);
                match claims.get(&key) {
                    None => {
                        claims.insert(key, Claim { owner: id, signature });
                    }
                    Some(previous) => {
                        let overload = match (&previous.signature, &signature) {
                            (Some(a), Some(b)) => a != b,
                            _ => false,
                        };
                        if !overload {
                            return Err(BindsworthError::NamingConflict {
                                identifier: key.1,
                                scope: scope
                                    .map(|s| graph.qualified_name(s))
                                    .unwrap_or_else(|| "<module>".to_string()),
                                first: graph.display_name(previous.owner),
                                second: graph.display_name(id),
                            });
                        }
                    }
                }
            }
        }

        debug!("Resolved {} exported names", names.len());
        Ok(Self { names })
    }

    /// Resolved identifier; declarations outside the table are resolved on the fly
    pub fn get(&self, graph: &DeclGraph, id: DeclId) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| resolve_name(graph, id))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decl::{Argument, Callable, ClassDecl, EnumDecl, TypeRef};
    use std::collections::BTreeMap;

    fn class() -> DeclKind {
        DeclKind::Class(ClassDecl { bases: vec![], is_struct: false, opaque: false })
    }

    fn callable(flavor: CallableFlavor, args: &[&str]) -> DeclKind {
        DeclKind::Function(Callable {
            flavor,
            return_type: Some(TypeRef::new("int")),
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

    fn unnamed_enum(values: &[(&str, i64)]) -> DeclKind {
        DeclKind::Enum(EnumDecl {
            values: values.iter().map(|(n, v)| (n.to_string(), *v)).collect(),
            value_aliases: BTreeMap::new(),
            is_scoped: false,
        })
    }

    #[test]
    fn test_valid_names() {
        assert_eq!(create_valid_name("operator()"), "operator_obrace__cbrace_");
        assert_eq!(create_valid_name("a::b"), "a_scope_b");
        assert_eq!(create_valid_name("2d"), "_2d");
        assert_eq!(create_valid_name("operator!"), "operator_not_");
        assert_eq!(create_valid_name("operator||"), "operator_or__or_");
    }

    #[test]
    fn test_canonical_types() {
        assert_eq!(canonicalize_type("  ::a::b  const  * "), "a::b const*");
        assert_eq!(canonicalize_type("::std::vector< ::a::b >"), "std::vector<a::b>");
    }

    #[test]
    fn test_split_helpers() {
        assert_eq!(split_qualified("::a::b"), ("::a", "b"));
        assert_eq!(split_qualified("::a::vector<::x::y>"), ("::a", "vector<::x::y>"));
        assert_eq!(split_qualified("plain"), ("", "plain"));

        let (base, args) = split_template("map<int, pair<a, b> >").unwrap();
        assert_eq!(base, "map");
        assert_eq!(args, vec!["int".to_string(), "pair<a, b>".to_string()]);
        assert!(split_template("plain").is_none());
    }

    #[test]
    fn test_template_instantiation_name() {
        assert_eq!(template_name("vector<int>"), "vector_less_int_greater_");
        assert_eq!(
            template_name("map< ::geo::point, int * >"),
            "map_less_geo_scope_point_comma_int_ptr__greater_"
        );
        // spelling differences do not change the identifier
        assert_eq!(template_name("vector< ::a::b >"), template_name("vector<a::b>"));
    }

    #[test]
    fn test_alias_takes_precedence() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let id = graph.add(global, "vector<int>", None, class());
        assert_eq!(resolve_name(&graph, id), "vector_less_int_greater_");
        graph.set_alias(id, "IntVector");
        assert_eq!(resolve_name(&graph, id), "IntVector");
    }

    #[test]
    fn test_operator_names() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let point = graph.add(global, "point", None, class());
        let add = graph.add(point, "operator+", None, callable(CallableFlavor::Operator("+".into()), &["point const &"]));
        let neg = graph.add(point, "operator-", None, callable(CallableFlavor::Operator("-".into()), &[]));
        let free_neg = graph.add(global, "operator-", None, callable(CallableFlavor::Operator("-".into()), &["point"]));
        let arrow = graph.add(point, "operator->", None, callable(CallableFlavor::Operator("->".into()), &[]));
        let not = graph.add(point, "operator!", None, callable(CallableFlavor::Operator("!".into()), &[]));
        let mod_assign = graph.add(point, "operator%=", None, callable(CallableFlavor::Operator("%=".into()), &["int"]));

        assert_eq!(resolve_name(&graph, add), "__add__");
        assert_eq!(resolve_name(&graph, neg), "__neg__");
        assert_eq!(resolve_name(&graph, free_neg), "__neg__");
        assert_eq!(resolve_name(&graph, arrow), "operator_minus__greater_");
        let identifier = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
        for id in [not, mod_assign] {
            let name = resolve_name(&graph, id);
            assert!(identifier.is_match(&name), "{} is not an identifier", name);
        }
    }

    #[test]
    fn test_anonymous_name_is_synthesized() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let id = graph.add(global, "", None, unnamed_enum(&[("OK", 1)]));
        assert_eq!(resolve_name(&graph, id), format!("_unnamed_enum_{}", id.0));
    }

    #[test]
    fn test_conflict_between_namespaces() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let a = graph.add(global, "a", None, DeclKind::Namespace);
        let b = graph.add(global, "b", None, DeclKind::Namespace);
        graph.add(a, "widget", None, class());
        graph.add(b, "widget", None, class());

        let err = NameTable::build(&graph, &graph.exported()).unwrap_err();
        match err {
            BindsworthError::NamingConflict { identifier, first, second, .. } => {
                assert_eq!(identifier, "widget");
                assert_eq!(first, "::a::widget");
                assert_eq!(second, "::b::widget");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_alias_resolves_conflict() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let a = graph.add(global, "a", None, DeclKind::Namespace);
        let b = graph.add(global, "b", None, DeclKind::Namespace);
        graph.add(a, "widget", None, class());
        let second = graph.add(b, "widget", None, class());
        graph.set_alias(second, "BWidget");

        let table = NameTable::build(&graph, &graph.exported()).unwrap();
        assert_eq!(table.get(&graph, second), "BWidget");
    }

    #[test]
    fn test_overloads_share_identifier() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        graph.add(global, "area", None, callable(CallableFlavor::Function, &["int"]));
        graph.add(global, "area", None, callable(CallableFlavor::Function, &["double"]));
        assert!(NameTable::build(&graph, &graph.exported()).is_ok());

        graph.add(global, "area", None, callable(CallableFlavor::Function, &["int"]));
        assert!(NameTable::build(&graph, &graph.exported()).is_err());
    }

    #[test]
    fn test_return_type_does_not_make_an_overload() {
        let returning = |ret: &str| {
            DeclKind::Function(Callable {
                flavor: CallableFlavor::Function,
                return_type: Some(TypeRef::new(ret)),
                arguments: vec![Argument { name: Some("v".into()), ty: TypeRef::new("int"), default: None }],
                is_static: false,
                is_const: false,
                is_virtual: false,
                is_pure_virtual: false,
            })
        };
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let narrow = graph.add(global, "to_string", None, returning("::std::string"));
        let wide = graph.add(global, "to_string", None, returning("::std::wstring"));
        graph.disambiguate_template_function(narrow, &["char".to_string()], None).unwrap();
        graph.disambiguate_template_function(wide, &["wchar_t".to_string()], None).unwrap();

        let err = NameTable::build(&graph, &graph.exported()).unwrap_err();
        assert!(matches!(err, BindsworthError::NamingConflict { ref identifier, .. } if identifier == "to_string"));

        // a suffix on one instantiation separates the Python names
        graph.set_alias(wide, "to_string_w");
        let table = NameTable::build(&graph, &graph.exported()).unwrap();
        assert_eq!(table.get(&graph, narrow), "to_string");
        assert_eq!(table.get(&graph, wide), "to_string_w");
        assert_eq!(graph.get(wide).name, "to_string< wchar_t >");
    }

    #[test]
    fn test_same_name_in_different_classes() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let first = graph.add(global, "first", None, class());
        let second = graph.add(global, "second", None, class());
        graph.add(first, "value", None, DeclKind::Variable { ty: TypeRef::new("int"), is_static: false });
        graph.add(second, "value", None, DeclKind::Variable { ty: TypeRef::new("int"), is_static: false });
        graph.add(first, "first", None, callable(CallableFlavor::Constructor, &["int"]));
        assert!(NameTable::build(&graph, &graph.exported()).is_ok());
    }

    #[test]
    fn test_enumerators_occupy_names() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        graph.add(global, "", None, unnamed_enum(&[("OK", 1), ("CANCEL", 0)]));
        graph.add(global, "OK", None, DeclKind::Variable { ty: TypeRef::new("int"), is_static: true });

        let err = NameTable::build(&graph, &graph.exported()).unwrap_err();
        assert!(matches!(err, BindsworthError::NamingConflict { ref identifier, .. } if identifier == "OK"));
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};

use crate::core::names::canonicalize_type;

/// Stable handle of a declaration inside a [`DeclGraph`](super::DeclGraph) arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclId(pub(crate) u32);

impl DeclId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Source location reported by the front end
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub file: PathBuf,
    #[serde(default)]
    pub line: Option<u32>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "[{}]:{}", self.file.display(), line),
            None => write!(f, "[{}]", self.file.display()),
        }
    }
}

/// A C++ type as spelled by the front end, e.g. `::geometry::point const &`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeRef(pub String);

impl TypeRef {
    pub fn new(decl_string: impl Into<String>) -> Self {
        Self(decl_string.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The type with cv-qualifiers, pointers, references and array
    /// extents removed. This is the name used to look up the declaration.
    pub fn base_name(&self) -> String {
        let mut text = self.0.trim().to_string();
        loop {
            let before = text.len();
            if let Some(open) = text.rfind('[') {
                if text.ends_with(']') && !text[..open].trim().is_empty() {
                    text.truncate(open);
                }
            }
            for suffix in ["&&", "&", "*", "const", "volatile"] {
                if let Some(stripped) = text.trim_end().strip_suffix(suffix) {
                    // "const" must stand alone, not end an identifier
                    let ends_word = suffix.chars().all(|c| c.is_alphabetic())
                        && stripped.chars().last().map_or(false, |c| c.is_alphanumeric() || c == '_');
                    if !ends_word {
                        text = stripped.trim_end().to_string();
                    }
                }
            }
            for prefix in ["const ", "volatile "] {
                if let Some(stripped) = text.trim_start().strip_prefix(prefix) {
                    text = stripped.trim_start().to_string();
                }
            }
            if text.len() == before {
                break;
            }
        }
        text.trim().to_string()
    }

    pub fn is_reference(&self) -> bool {
        self.0.trim_end().ends_with('&')
    }

    pub fn is_pointer(&self) -> bool {
        let trimmed = self.0.trim_end();
        let trimmed = trimmed.strip_suffix("const").unwrap_or(trimmed).trim_end();
        trimmed.ends_with('*')
    }

    pub fn is_const(&self) -> bool {
        let text = self.0.trim();
        text.starts_with("const ") || text.contains(" const")
    }

    pub fn is_void(&self) -> bool {
        self.0.trim() == "void"
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    Public,
    Protected,
    Private,
}

/// One entry of a class's base-specifier list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRelation {
    /// Fully qualified name of the base as written in the dump
    pub name: String,
    pub access: Access,
    pub is_virtual: bool,
    /// Filled in once the whole dump is loaded
    pub resolved: Option<DeclId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDecl {
    pub bases: Vec<BaseRelation>,
    pub is_struct: bool,
    pub opaque: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallableFlavor {
    Function,
    Constructor,
    /// Operator with its symbol, e.g. `+` or `==`
    Operator(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Argument {
    pub name: Option<String>,
    pub ty: TypeRef,
    pub default: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callable {
    pub flavor: CallableFlavor,
    pub return_type: Option<TypeRef>,
    pub arguments: Vec<Argument>,
    pub is_static: bool,
    pub is_const: bool,
    pub is_virtual: bool,
    pub is_pure_virtual: bool,
}

impl Callable {
    /// Canonical signature used for deduplication and overload comparison
    pub fn signature(&self) -> String {
        let args: Vec<&str> = self.arguments.iter().map(|a| a.ty.as_str()).collect();
        format!(
            "{} ({}){}",
            self.return_type.as_ref().map(|t| t.as_str()).unwrap_or("void"),
            args.join(", "),
            if self.is_const { " const" } else { "" }
        )
    }

    /// What a Python call can tell overloads apart by: the argument types
    /// and the `const`/`static` qualifiers. The return type is not part of it.
    pub fn overload_key(&self) -> String {
        let args: Vec<String> = self.arguments.iter().map(|a| canonicalize_type(a.ty.as_str())).collect();
        format!(
            "({}){}{}",
            args.join(","),
            if self.is_const { " const" } else { "" },
            if self.is_static { " static" } else { "" }
        )
    }

    pub fn operator_symbol(&self) -> Option<&str> {
        match &self.flavor {
            CallableFlavor::Operator(symbol) => Some(symbol),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumDecl {
    pub values: Vec<(String, i64)>,
    pub value_aliases: BTreeMap<String, String>,
    pub is_scoped: bool,
}

impl EnumDecl {
    /// Exported name of an enumerator, honouring value aliases
    pub fn value_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.value_aliases.get(name).map(String::as_str).unwrap_or(name)
    }
}

/// Closed set of declaration variants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclKind {
    Namespace,
    Class(ClassDecl),
    Function(Callable),
    Enum(EnumDecl),
    Typedef { target: TypeRef },
    Variable { ty: TypeRef, is_static: bool },
}

/// Kind tag used by matchers and the kind index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclKindTag {
    Namespace,
    Class,
    Function,
    Constructor,
    Operator,
    Enum,
    Typedef,
    Variable,
}

impl DeclKind {
    pub fn tag(&self) -> DeclKindTag {
        match self {
            DeclKind::Namespace => DeclKindTag::Namespace,
            DeclKind::Class(_) => DeclKindTag::Class,
            DeclKind::Function(callable) => match callable.flavor {
                CallableFlavor::Function => DeclKindTag::Function,
                CallableFlavor::Constructor => DeclKindTag::Constructor,
                CallableFlavor::Operator(_) => DeclKindTag::Operator,
            },
            DeclKind::Enum(_) => DeclKindTag::Enum,
            DeclKind::Typedef { .. } => DeclKindTag::Typedef,
            DeclKind::Variable { .. } => DeclKindTag::Variable,
        }
    }
}

impl fmt::Display for DeclKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            DeclKindTag::Namespace => "namespace",
            DeclKindTag::Class => "class",
            DeclKindTag::Function => "function",
            DeclKindTag::Constructor => "constructor",
            DeclKindTag::Operator => "operator",
            DeclKindTag::Enum => "enum",
            DeclKindTag::Typedef => "typedef",
            DeclKindTag::Variable => "variable",
        };
        f.write_str(text)
    }
}

/// A declaration discovered in the dump, plus its export settings
#[derive(Debug, Clone)]
pub struct Declaration {
    pub id: DeclId,
    pub name: String,
    pub parent: Option<DeclId>,
    pub location: Option<Location>,
    pub kind: DeclKind,
    /// Member access; namespace-level declarations are public
    pub access: Access,
    /// Export switch, toggled by the filtering phase
    pub excluded: bool,
    /// Name under which the declaration is exported
    pub alias: Option<String>,
    /// Name of the generated wrapper struct (classes with virtual members)
    pub wrapper_alias: Option<String>,
    /// Extra registration code appended to the declaration's creator
    pub user_code: Vec<String>,
}

impl Declaration {
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }

    pub fn as_class(&self) -> Option<&ClassDecl> {
        match &self.kind {
            DeclKind::Class(class) => Some(class),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Callable> {
        match &self.kind {
            DeclKind::Function(callable) => Some(callable),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumDecl> {
        match &self.kind {
            DeclKind::Enum(decl) => Some(decl),
            _ => None,
        }
    }

    pub fn is_namespace(&self) -> bool {
        matches!(self.kind, DeclKind::Namespace)
    }

    pub fn is_class(&self) -> bool {
        matches!(self.kind, DeclKind::Class(_))
    }

    /// Classes and named enums need a registered converter in the target
    pub fn is_class_like(&self) -> bool {
        match &self.kind {
            DeclKind::Class(_) => true,
            DeclKind::Enum(_) => !self.is_anonymous(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_base_name_strips_decorations() {
        assert_eq!(TypeRef::new("::geometry::point const &").base_name(), "::geometry::point");
        assert_eq!(TypeRef::new("const ::a::b *").base_name(), "::a::b");
        assert_eq!(TypeRef::new("int[4]").base_name(), "int");
        assert_eq!(TypeRef::new("::a::b * const").base_name(), "::a::b");
        assert_eq!(TypeRef::new("::std::vector<::a::b *> &").base_name(), "::std::vector<::a::b *>");
        assert_eq!(TypeRef::new("::a::myconst").base_name(), "::a::myconst");
    }

    #[test]
    fn test_type_predicates() {
        assert!(TypeRef::new("int const &").is_reference());
        assert!(TypeRef::new("char const *").is_pointer());
        assert!(TypeRef::new("::a::b * const").is_pointer());
        assert!(TypeRef::new("int const &").is_const());
        assert!(!TypeRef::new("int &").is_const());
        assert!(TypeRef::new("void").is_void());
    }

    #[test]
    fn test_overload_key_ignores_return_type() {
        let returning = |ret: &str, arg: &str| Callable {
            flavor: CallableFlavor::Function,
            return_type: Some(TypeRef::new(ret)),
            arguments: vec![Argument { name: Some("v".to_string()), ty: TypeRef::new(arg), default: None }],
            is_static: false,
            is_const: false,
            is_virtual: false,
            is_pure_virtual: false,
        };
        let narrow = returning("::std::string", "int");
        let wide = returning("::std::wstring", " int ");
        assert_ne!(narrow.signature(), wide.signature());
        assert_eq!(narrow.overload_key(), wide.overload_key());
        assert_ne!(narrow.overload_key(), returning("::std::string", "long").overload_key());
        assert_ne!(narrow.overload_key(), Callable { is_static: true, ..narrow.clone() }.overload_key());
    }

    #[test]
    fn test_enum_value_alias() {
        let mut decl = EnumDecl {
            values: vec![("OK".to_string(), 1)],
            value_aliases: BTreeMap::new(),
            is_scoped: false,
        };
        assert_eq!(decl.value_name("OK"), "OK");
        decl.value_aliases.insert("OK".to_string(), "Ok".to_string());
        assert_eq!(decl.value_name("OK"), "Ok");
    }
}

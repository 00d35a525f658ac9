//! Declaration dump produced by the C++ front end.
//!
//! A dump is a JSON forest of declarations for one translation unit. Several
//! units can be merged into one graph; declarations seen in more than one
//! unit collapse into a single canonical instance.

use std::collections::{BTreeMap, HashMap};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::decl::{
    Access, Argument, BaseRelation, Callable, CallableFlavor, ClassDecl, DeclGraph, DeclId,
    DeclKind, DeclKindTag, EnumDecl, Location, TypeRef,
};
use crate::error::{BindsworthError, Result};

/// Declarations of one translation unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationUnitDump {
    #[serde(default)]
    pub translation_unit: Option<String>,
    pub declarations: Vec<RawDeclaration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDeclaration {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: Option<Location>,
    /// Qualified name of an enclosing scope declared elsewhere; only
    /// meaningful on top-level entries
    #[serde(default)]
    pub scope: Option<String>,
    /// Access of class members
    #[serde(default)]
    pub access: Access,
    #[serde(default)]
    pub children: Vec<RawDeclaration>,
    #[serde(flatten)]
    pub body: RawBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawBody {
    Namespace,
    Class {
        #[serde(default)]
        bases: Vec<RawBase>,
        #[serde(default)]
        opaque: bool,
    },
    Struct {
        #[serde(default)]
        bases: Vec<RawBase>,
        #[serde(default)]
        opaque: bool,
    },
    Function {
        #[serde(default)]
        return_type: Option<String>,
        #[serde(default)]
        arguments: Vec<RawArgument>,
        #[serde(default)]
        is_static: bool,
        #[serde(default)]
        is_const: bool,
        #[serde(default)]
        is_virtual: bool,
        #[serde(default)]
        is_pure_virtual: bool,
    },
    Constructor {
        #[serde(default)]
        arguments: Vec<RawArgument>,
    },
    Operator {
        symbol: String,
        #[serde(default)]
        return_type: Option<String>,
        #[serde(default)]
        arguments: Vec<RawArgument>,
        #[serde(default)]
        is_const: bool,
    },
    Enum {
        #[serde(default)]
        values: Vec<(String, i64)>,
        #[serde(default)]
        is_scoped: bool,
    },
    Typedef {
        target: String,
    },
    Variable {
        #[serde(rename = "type")]
        ty: String,
        #[serde(default)]
        is_static: bool,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBase {
    pub name: String,
    #[serde(default)]
    pub access: Access,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArgument {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub default: Option<String>,
}

/// Parse the JSON text of one dump
pub fn parse_dump(text: &str) -> Result<TranslationUnitDump> {
    Ok(serde_json::from_str(text)?)
}

/// Identity of a declaration across translation units
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    parent: DeclId,
    kind: DeclKindTag,
    name: String,
    location: Option<Location>,
    signature: Option<String>,
}

/// Merges translation units into one [`DeclGraph`]
pub struct DumpLoader {
    graph: DeclGraph,
    seen: HashMap<DedupKey, DeclId>,
    duplicates: usize,
}

impl DumpLoader {
    pub fn new() -> Self {
        Self {
            graph: DeclGraph::new(),
            seen: HashMap::new(),
            duplicates: 0,
        }
    }

    pub fn add_unit(&mut self, unit: &TranslationUnitDump) -> Result<()> {
        debug!(
            "Merging translation unit {} ({} top-level declarations)",
            unit.translation_unit.as_deref().unwrap_or("<unnamed>"),
            unit.declarations.len()
        );
        for raw in &unit.declarations {
            let parent = match &raw.scope {
                Some(scope) => self.find_scope(scope, raw)?,
                None => self.graph.global(),
            };
            self.insert(raw, parent);
        }
        Ok(())
    }

    /// Link base classes and hand out the finished graph
    pub fn finish(mut self) -> Result<DeclGraph> {
        self.graph.link_bases()?;
        debug!(
            "Loaded {} declarations ({} duplicates merged)",
            self.graph.len(),
            self.duplicates
        );
        Ok(self.graph)
    }

    fn find_scope(&self, scope: &str, raw: &RawDeclaration) -> Result<DeclId> {
        self.graph
            .lookup(scope)
            .iter()
            .copied()
            .find(|&id| {
                let decl = self.graph.get(id);
                decl.is_namespace() || decl.is_class()
            })
            .ok_or_else(|| BindsworthError::InvariantViolation {
                declaration: if raw.name.is_empty() { "<unnamed>".to_string() } else { raw.name.clone() },
                reason: format!("enclosing scope {} is not declared in the dump", scope),
            })
    }

    fn insert(&mut self, raw: &RawDeclaration, parent: DeclId) {
        let kind = convert_body(&raw.body);
        let tag = kind.tag();
        let key = DedupKey {
            parent,
            kind: tag,
            name: raw.name.clone(),
            // Namespaces reopen freely; they merge by name alone
            location: if tag == DeclKindTag::Namespace { None } else { raw.location.clone() },
            signature: signature_of(&kind),
        };

        let id = match self.seen.get(&key) {
            Some(&existing) => {
                self.duplicates += 1;
                existing
            }
            None => {
                let location = raw.location.clone();
                let id = self.graph.add(parent, raw.name.clone(), location, kind);
                self.graph.set_access(id, raw.access);
                self.seen.insert(key, id);
                id
            }
        };

        for child in &raw.children {
            self.insert(child, id);
        }
    }
}

impl Default for DumpLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge translation units, in order, into one graph
pub fn load_units(units: &[TranslationUnitDump]) -> Result<DeclGraph> {
    let mut loader = DumpLoader::new();
    for unit in units {
        loader.add_unit(unit)?;
    }
    loader.finish()
}

fn signature_of(kind: &DeclKind) -> Option<String> {
    match kind {
        DeclKind::Function(callable) => Some(callable.signature()),
        DeclKind::Enum(decl) => Some(
            decl.values
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join(","),
        ),
        _ => None,
    }
}

fn convert_arguments(arguments: &[RawArgument]) -> Vec<Argument> {
    arguments
        .iter()
        .map(|arg| Argument {
            name: arg.name.clone().filter(|name| !name.is_empty()),
            ty: TypeRef::new(arg.ty.clone()),
            default: arg.default.clone(),
        })
        .collect()
}

fn convert_bases(bases: &[RawBase]) -> Vec<BaseRelation> {
    bases
        .iter()
        .map(|base| BaseRelation {
            name: base.name.clone(),
            access: base.access,
            is_virtual: base.is_virtual,
            resolved: None,
        })
        .collect()
}

fn convert_body(body: &RawBody) -> DeclKind {
    match body {
        RawBody::Namespace => DeclKind::Namespace,
        RawBody::Class { bases, opaque } => DeclKind::Class(ClassDecl {
            bases: convert_bases(bases),
            is_struct: false,
            opaque: *opaque,
        }),
        RawBody::Struct { bases, opaque } => DeclKind::Class(ClassDecl {
            bases: convert_bases(bases),
            is_struct: true,
            opaque: *opaque,
        }),
        RawBody::Function { return_type, arguments, is_static, is_const, is_virtual, is_pure_virtual } => {
            DeclKind::Function(Callable {
                flavor: CallableFlavor::Function,
                return_type: return_type.clone().map(TypeRef::new),
                arguments: convert_arguments(arguments),
                is_static: *is_static,
                is_const: *is_const,
                is_virtual: *is_virtual || *is_pure_virtual,
                is_pure_virtual: *is_pure_virtual,
            })
        }
        RawBody::Constructor { arguments } => DeclKind::Function(Callable {
            flavor: CallableFlavor::Constructor,
            return_type: None,
            arguments: convert_arguments(arguments),
            is_static: false,
            is_const: false,
            is_virtual: false,
            is_pure_virtual: false,
        }),
        RawBody::Operator { symbol, return_type, arguments, is_const } => DeclKind::Function(Callable {
            flavor: CallableFlavor::Operator(symbol.clone()),
            return_type: return_type.clone().map(TypeRef::new),
            arguments: convert_arguments(arguments),
            is_static: false,
            is_const: *is_const,
            is_virtual: false,
            is_pure_virtual: false,
        }),
        RawBody::Enum { values, is_scoped } => DeclKind::Enum(EnumDecl {
            values: values.clone(),
            value_aliases: BTreeMap::new(),
            is_scoped: *is_scoped,
        }),
        RawBody::Typedef { target } => DeclKind::Typedef { target: TypeRef::new(target.clone()) },
        RawBody::Variable { ty, is_static } => DeclKind::Variable {
            ty: TypeRef::new(ty.clone()),
            is_static: *is_static,
        },
    }
}

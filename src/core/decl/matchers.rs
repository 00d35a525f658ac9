//! Typed declaration matchers used by the selection API.
//!
//! Matchers compose with [`DeclMatcher::and`], [`DeclMatcher::or`] and
//! [`DeclMatcher::negate`]. A matcher may expose a name or kind hint; when the
//! graph has been optimized those hints turn a full scan into an index lookup.

use std::path::{Component, Path, PathBuf};
use regex::Regex;

use super::graph::DeclGraph;
use super::model::{DeclKindTag, Declaration};
use crate::core::names::split_qualified;
use crate::error::{BindsworthError, Result};

pub trait DeclMatcher {
    fn matches(&self, decl: &Declaration, graph: &DeclGraph) -> bool;

    /// Human readable form of the query, used in error messages
    fn describe(&self) -> String;

    /// Unqualified name every match is guaranteed to have
    fn name_hint(&self) -> Option<&str> {
        None
    }

    /// Kind every match is guaranteed to have
    fn kind_hint(&self) -> Option<DeclKindTag> {
        None
    }

    fn and<M: DeclMatcher>(self, other: M) -> And<Self, M>
    where
        Self: Sized,
    {
        And(self, other)
    }

    fn or<M: DeclMatcher>(self, other: M) -> Or<Self, M>
    where
        Self: Sized,
    {
        Or(self, other)
    }

    fn negate(self) -> Not<Self>
    where
        Self: Sized,
    {
        Not(self)
    }
}

impl DeclMatcher for Box<dyn DeclMatcher> {
    fn matches(&self, decl: &Declaration, graph: &DeclGraph) -> bool {
        self.as_ref().matches(decl, graph)
    }

    fn describe(&self) -> String {
        self.as_ref().describe()
    }

    fn name_hint(&self) -> Option<&str> {
        self.as_ref().name_hint()
    }

    fn kind_hint(&self) -> Option<DeclKindTag> {
        self.as_ref().kind_hint()
    }
}

/// Matches every declaration
pub struct AnyDecl;

impl DeclMatcher for AnyDecl {
    fn matches(&self, _decl: &Declaration, _graph: &DeclGraph) -> bool {
        true
    }

    fn describe(&self) -> String {
        "any".to_string()
    }
}

/// Exact name. A name starting with `::` is compared against the fully
/// qualified name, anything else against the unqualified one.
pub struct NameMatcher {
    name: String,
    simple: String,
    qualified: bool,
}

pub fn by_name(name: impl Into<String>) -> NameMatcher {
    let name = name.into();
    let qualified = name.starts_with("::");
    let simple = if qualified {
        split_qualified(&name).1.to_string()
    } else {
        name.clone()
    };
    NameMatcher { name, simple, qualified }
}

impl DeclMatcher for NameMatcher {
    fn matches(&self, decl: &Declaration, graph: &DeclGraph) -> bool {
        if decl.name != self.simple {
            return false;
        }
        !self.qualified || graph.qualified_name(decl.id) == self.name
    }

    fn describe(&self) -> String {
        format!("name == '{}'", self.name)
    }

    fn name_hint(&self) -> Option<&str> {
        Some(&self.simple)
    }
}

pub struct NamePrefix(String);

pub fn name_prefix(prefix: impl Into<String>) -> NamePrefix {
    NamePrefix(prefix.into())
}

impl DeclMatcher for NamePrefix {
    fn matches(&self, decl: &Declaration, _graph: &DeclGraph) -> bool {
        decl.name.starts_with(&self.0)
    }

    fn describe(&self) -> String {
        format!("name starts with '{}'", self.0)
    }
}

pub struct NameSuffix(String);

pub fn name_suffix(suffix: impl Into<String>) -> NameSuffix {
    NameSuffix(suffix.into())
}

impl DeclMatcher for NameSuffix {
    fn matches(&self, decl: &Declaration, _graph: &DeclGraph) -> bool {
        decl.name.ends_with(&self.0)
    }

    fn describe(&self) -> String {
        format!("name ends with '{}'", self.0)
    }
}

pub struct NamePattern(Regex);

pub fn name_pattern(pattern: &str) -> Result<NamePattern> {
    let regex = Regex::new(pattern)
        .map_err(|e| BindsworthError::Config(format!("Invalid name pattern '{}': {}", pattern, e)))?;
    Ok(NamePattern(regex))
}

impl DeclMatcher for NamePattern {
    fn matches(&self, decl: &Declaration, _graph: &DeclGraph) -> bool {
        self.0.is_match(&decl.name)
    }

    fn describe(&self) -> String {
        format!("name matches /{}/", self.0.as_str())
    }
}

pub struct KindMatcher(DeclKindTag);

pub fn by_kind(kind: DeclKindTag) -> KindMatcher {
    KindMatcher(kind)
}

impl DeclMatcher for KindMatcher {
    fn matches(&self, decl: &Declaration, _graph: &DeclGraph) -> bool {
        decl.kind.tag() == self.0
    }

    fn describe(&self) -> String {
        format!("kind == {}", self.0)
    }

    fn kind_hint(&self) -> Option<DeclKindTag> {
        Some(self.0)
    }
}

/// Declarations located in the given header file
pub struct HeaderFile(PathBuf);

pub fn header_file(path: impl AsRef<Path>) -> HeaderFile {
    HeaderFile(normalize_path(path.as_ref()))
}

impl DeclMatcher for HeaderFile {
    fn matches(&self, decl: &Declaration, _graph: &DeclGraph) -> bool {
        decl.location
            .as_ref()
            .map_or(false, |loc| normalize_path(&loc.file).ends_with(&self.0))
    }

    fn describe(&self) -> String {
        format!("header file == {}", self.0.display())
    }
}

/// Declarations located anywhere below the given directory
pub struct HeaderDir(PathBuf);

pub fn header_dir(path: impl AsRef<Path>) -> HeaderDir {
    HeaderDir(normalize_path(path.as_ref()))
}

impl DeclMatcher for HeaderDir {
    fn matches(&self, decl: &Declaration, _graph: &DeclGraph) -> bool {
        decl.location
            .as_ref()
            .map_or(false, |loc| normalize_path(&loc.file).starts_with(&self.0))
    }

    fn describe(&self) -> String {
        format!("header dir == {}", self.0.display())
    }
}

pub struct AliasMatcher(String);

pub fn by_alias(alias: impl Into<String>) -> AliasMatcher {
    AliasMatcher(alias.into())
}

impl DeclMatcher for AliasMatcher {
    fn matches(&self, decl: &Declaration, _graph: &DeclGraph) -> bool {
        decl.alias.as_deref() == Some(self.0.as_str())
    }

    fn describe(&self) -> String {
        format!("alias == '{}'", self.0)
    }
}

/// Ad hoc matcher over a closure, for queries the building blocks can't express
pub struct FnMatcher<F> {
    description: String,
    f: F,
}

pub fn matcher_fn<F>(description: impl Into<String>, f: F) -> FnMatcher<F>
where
    F: Fn(&Declaration, &DeclGraph) -> bool,
{
    FnMatcher { description: description.into(), f }
}

impl<F> DeclMatcher for FnMatcher<F>
where
    F: Fn(&Declaration, &DeclGraph) -> bool,
{
    fn matches(&self, decl: &Declaration, graph: &DeclGraph) -> bool {
        (self.f)(decl, graph)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

pub struct And<A, B>(A, B);

impl<A: DeclMatcher, B: DeclMatcher> DeclMatcher for And<A, B> {
    fn matches(&self, decl: &Declaration, graph: &DeclGraph) -> bool {
        self.0.matches(decl, graph) && self.1.matches(decl, graph)
    }

    fn describe(&self) -> String {
        format!("({} and {})", self.0.describe(), self.1.describe())
    }

    fn name_hint(&self) -> Option<&str> {
        self.0.name_hint().or_else(|| self.1.name_hint())
    }

    fn kind_hint(&self) -> Option<DeclKindTag> {
        self.0.kind_hint().or_else(|| self.1.kind_hint())
    }
}

pub struct Or<A, B>(A, B);

impl<A: DeclMatcher, B: DeclMatcher> DeclMatcher for Or<A, B> {
    fn matches(&self, decl: &Declaration, graph: &DeclGraph) -> bool {
        self.0.matches(decl, graph) || self.1.matches(decl, graph)
    }

    fn describe(&self) -> String {
        format!("({} or {})", self.0.describe(), self.1.describe())
    }

    fn name_hint(&self) -> Option<&str> {
        match (self.0.name_hint(), self.1.name_hint()) {
            (Some(a), Some(b)) if a == b => Some(a),
            _ => None,
        }
    }

    fn kind_hint(&self) -> Option<DeclKindTag> {
        match (self.0.kind_hint(), self.1.kind_hint()) {
            (Some(a), Some(b)) if a == b => Some(a),
            _ => None,
        }
    }
}

pub struct Not<A>(A);

impl<A: DeclMatcher> DeclMatcher for Not<A> {
    fn matches(&self, decl: &Declaration, graph: &DeclGraph) -> bool {
        !self.0.matches(decl, graph)
    }

    fn describe(&self) -> String {
        format!("not {}", self.0.describe())
    }
}

/// Drops `.` components so `./include/a.hpp` and `include/a.hpp` compare equal
pub fn normalize_path(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

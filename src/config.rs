use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::creators::SplitPolicy;
use crate::core::decl::matchers::{self, AnyDecl};
use crate::core::decl::{DeclKindTag, DeclMatcher};
use crate::error::{BindsworthError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project configuration
    pub project: ProjectConfig,

    /// Code generation settings
    pub generation: GenerationConfig,

    /// Dependency closure check
    #[serde(default)]
    pub closure: ClosureConfig,

    /// Include/exclude rules, applied in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterRule>,

    /// Export names and extra code per declaration
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<AliasRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Declaration dumps, files or directories of `*.json`, merged in order
    pub dumps: Vec<PathBuf>,

    /// Header files and directories whose declarations are exported.
    /// Empty means every declaration of the dump.
    #[serde(default)]
    pub headers: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Name of the Python extension module
    pub module_name: String,

    /// Directory the generated sources are written to
    pub output_dir: PathBuf,

    /// Single file or one file per top-level declaration
    #[serde(default)]
    pub split: SplitPolicy,

    /// Text placed at the top of every generated file
    #[serde(default)]
    pub license: Option<String>,

    /// Precompiled header included before anything else
    #[serde(default)]
    pub precompiled_header: Option<String>,

    /// `using namespace` directives added after the includes
    #[serde(default)]
    pub usings: Vec<String>,

    /// Directories the include manifest is made relative to
    #[serde(default)]
    pub include_roots: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureConfig {
    /// Namespaces directly under the global one whose declarations need not
    /// be exported
    #[serde(default = "default_exempt_namespaces")]
    pub exempt_namespaces: Vec<String>,

    /// Names inside exempt namespaces that are checked anyway
    #[serde(default = "default_checked_prefixes")]
    pub checked_prefixes: Vec<String>,

    /// Treat unresolved dependencies as errors
    #[serde(default)]
    pub strict: bool,
}

fn default_exempt_namespaces() -> Vec<String> {
    vec!["std".to_string()]
}

fn default_checked_prefixes() -> Vec<String> {
    vec!["pair<".to_string()]
}

impl Default for ClosureConfig {
    fn default() -> Self {
        Self {
            exempt_namespaces: default_exempt_namespaces(),
            checked_prefixes: default_checked_prefixes(),
            strict: false,
        }
    }
}

/// Declarative declaration query; every field that is set must match
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclQuery {
    /// Plain or `::`-qualified name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<DeclKindTag>,

    /// Regular expression over the unqualified name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_dir: Option<PathBuf>,
}

impl DeclQuery {
    pub fn matcher(&self) -> Result<Box<dyn DeclMatcher>> {
        let mut matcher: Box<dyn DeclMatcher> = Box::new(AnyDecl);
        if let Some(name) = &self.name {
            matcher = Box::new(matcher.and(matchers::by_name(name.clone())));
        }
        if let Some(kind) = self.kind {
            matcher = Box::new(matcher.and(matchers::by_kind(kind)));
        }
        if let Some(pattern) = &self.pattern {
            matcher = Box::new(matcher.and(matchers::name_pattern(pattern)?));
        }
        if let Some(file) = &self.header_file {
            matcher = Box::new(matcher.and(matchers::header_file(file)));
        }
        if let Some(dir) = &self.header_dir {
            matcher = Box::new(matcher.and(matchers::header_dir(dir)));
        }
        Ok(matcher)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    Include,
    Exclude,
    IncludeRecursive,
    ExcludeRecursive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRule {
    pub action: FilterAction,
    #[serde(flatten)]
    pub query: DeclQuery,
}

/// Settings for exactly one declaration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasRule {
    #[serde(flatten)]
    pub query: DeclQuery,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapper_alias: Option<String>,

    /// Enumerator name to exported name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<String, String>,

    /// Template arguments that make a function template instantiation
    /// unambiguous
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_args: Vec<String>,

    /// Appended to the exported name of a disambiguated template function,
    /// e.g. `_w` for the `wchar_t` instantiation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_suffix: Option<String>,

    /// Registration code appended to the declaration's creator
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub code: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: ProjectConfig {
                name: "Unnamed Project".to_string(),
                dumps: vec![PathBuf::from("dumps")],
                headers: Vec::new(),
            },
            generation: GenerationConfig {
                module_name: "bindings".to_string(),
                output_dir: PathBuf::from("generated"),
                split: SplitPolicy::SingleFile,
                license: None,
                precompiled_header: None,
                usings: Vec::new(),
                include_roots: Vec::new(),
            },
            closure: ClosureConfig::default(),
            filters: Vec::new(),
            aliases: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| BindsworthError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| BindsworthError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration with fallback to default
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        match path {
            Some(p) => {
                if p.as_ref().exists() {
                    Self::load(p)
                } else {
                    Ok(Self::default())
                }
            }
            None => {
                let candidates = [
                    "Bindsworth.toml",
                    "bindsworth.toml",
                    ".bindsworth.toml",
                ];

                for candidate in &candidates {
                    if Path::new(candidate).exists() {
                        return Self::load(candidate);
                    }
                }

                Ok(Self::default())
            }
        }
    }
}

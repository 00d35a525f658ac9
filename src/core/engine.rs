// src/core/engine.rs
use std::path::{Path, PathBuf};
use anyhow::Result;
use sha2::{Digest, Sha256};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{AliasRule, Config, FilterAction};
use crate::error::BindsworthError;
use super::creators::{CreatorKind, CreatorTree, RenderedFile, SplitPolicy};
use super::decl::{matchers::by_name, DeclGraph, DeclMatcher};
use super::diagnostics::Diagnostics;
use super::dump::{load_units, parse_dump, TranslationUnitDump};
use super::stage::{Loaded, Pipeline};

/// Outcome of a `generate` run
#[derive(Debug, Default)]
pub struct GenerationReport {
    /// Files whose content changed and were written
    pub written: Vec<PathBuf>,
    /// Files whose content hash matched the generated text
    pub unchanged: Vec<PathBuf>,
    /// Headers of the exported declarations
    pub includes: Vec<String>,
    pub diagnostics: Diagnostics,
}

/// Main orchestration engine for bindsworth
pub struct Engine {
    config: Config,
}

impl Engine {
    /// Create a new engine instance
    pub async fn new(config_path: Option<&Path>) -> Result<Self> {
        let config = Config::load_or_default(config_path)?;

        debug!("Loaded configuration: {:?}", config);

        Ok(Self { config })
    }

    pub fn with_config(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Write a default configuration and create the dump directory
    pub async fn init(&self, path: Option<PathBuf>) -> Result<()> {
        let target_dir = match path {
            Some(path) => path,
            None => std::env::current_dir()?,
        };
        info!("Initializing bindsworth in: {}", target_dir.display());

        tokio::fs::create_dir_all(&target_dir).await?;
        let config_path = target_dir.join("Bindsworth.toml");
        if config_path.exists() {
            warn!("{} already exists; leaving it untouched", config_path.display());
        } else {
            let mut config = Config::default();
            if let Some(name) = target_dir.file_name().and_then(|name| name.to_str()) {
                config.project.name = name.to_string();
            }
            config.save(&config_path)?;
            info!("Wrote {}", config_path.display());
        }

        for dir in &self.config.project.dumps {
            if dir.extension().is_none() {
                tokio::fs::create_dir_all(target_dir.join(dir)).await?;
            }
        }
        Ok(())
    }

    /// Generate the binding sources. Command line values override the
    /// configuration.
    pub async fn generate(
        &self,
        dumps: Vec<PathBuf>,
        output: Option<PathBuf>,
        split: bool,
        strict: bool,
    ) -> Result<GenerationReport> {
        let generation = &self.config.generation;
        let output_dir = output.unwrap_or_else(|| generation.output_dir.clone());
        let policy = if split { SplitPolicy::PerDeclaration } else { generation.split };
        let mut closure = self.config.closure.clone();
        closure.strict |= strict;

        info!("Generating module {} into {}", generation.module_name, output_dir.display());

        let pipeline = self.load(&dumps).await?;
        let mut built = pipeline
            .finish_filtering()
            .resolve(&closure)
            .map_err(BindsworthError::from)?
            .order()
            .map_err(BindsworthError::from)?
            .build(&generation.include_roots)
            .map_err(BindsworthError::from)?;
        self.add_prelude(built.tree_mut());

        let rendered = built
            .render(&generation.module_name, policy)
            .map_err(BindsworthError::from)?;
        let (_, output, diagnostics) = rendered.into_parts();
        for header in &output.includes {
            debug!("Include: {}", header);
        }

        let (written, unchanged) = write_files(&output_dir, &output.files).await?;
        info!(
            "Generation complete: {} files written, {} unchanged, {} warnings",
            written.len(),
            unchanged.len(),
            diagnostics.warnings.len()
        );

        Ok(GenerationReport {
            written,
            unchanged,
            includes: output.includes,
            diagnostics,
        })
    }

    /// Run the pipeline up to name and closure checks without writing
    /// anything. Naming conflicts and strict-mode failures are reported as
    /// errors in the returned diagnostics; only unreadable input fails.
    pub async fn check(&self, dumps: Vec<PathBuf>, strict: bool) -> Result<Diagnostics> {
        let mut closure = self.config.closure.clone();
        closure.strict |= strict;

        let filtered = self.load(&dumps).await?.finish_filtering();
        let diagnostics = match filtered.resolve(&closure) {
            Ok(resolved) => {
                if resolved.diagnostics().is_clean() {
                    info!("{} declarations exported, closure is complete", resolved.exported().len());
                }
                resolved.diagnostics().clone()
            }
            Err(failure) => failure.pipeline.diagnostics().clone(),
        };
        if !diagnostics.is_clean() {
            warn!(
                "{} unresolved dependencies, {} errors",
                diagnostics.warnings.len(),
                diagnostics.errors.len()
            );
        }
        Ok(diagnostics)
    }

    /// Describe the filtered declaration graph, or the declarations named `name`
    pub async fn print(&self, dumps: Vec<PathBuf>, name: Option<String>) -> Result<String> {
        let pipeline = self.load(&dumps).await?.finish_filtering();
        let graph = pipeline.graph();
        let text = match name {
            Some(name) => {
                let found = graph.select_all(&by_name(name.clone()));
                if found.is_empty() {
                    return Err(BindsworthError::QueryMismatch { query: format!("name '{}'", name), found: 0 }.into());
                }
                found.into_iter().map(|id| graph.describe(id)).collect::<Vec<_>>().join("\n")
            }
            None => graph.describe(graph.global()),
        };
        Ok(text)
    }

    /// Read the dumps and apply the location filter and the configured rules
    async fn load(&self, dumps: &[PathBuf]) -> Result<Pipeline<Loaded>> {
        let sources = if dumps.is_empty() { self.config.project.dumps.as_slice() } else { dumps };
        let files = collect_dump_files(sources)?;
        info!("Reading {} declaration dumps", files.len());

        let units = read_dumps(files).await?;
        let mut pipeline = Pipeline::new(load_units(&units)?);
        let graph = pipeline.graph_mut();
        // rules below run many queries; index the graph first
        graph.optimize();

        let outside = graph.exclude_outside(&self.config.project.headers);
        if outside > 0 {
            info!("Excluded {} declarations outside the configured headers", outside);
        }
        self.apply_filters(graph)?;
        self.apply_aliases(graph)?;
        Ok(pipeline)
    }

    fn apply_filters(&self, graph: &mut DeclGraph) -> Result<()> {
        for rule in &self.config.filters {
            let matcher = rule.query.matcher()?;
            let found = graph.select_all(matcher.as_ref());
            debug!("Filter {:?} {} matched {}", rule.action, matcher.describe(), found.len());
            for id in found {
                match rule.action {
                    FilterAction::Include => graph.include(id),
                    FilterAction::Exclude => graph.exclude(id),
                    FilterAction::IncludeRecursive => graph.include_recursive(id),
                    FilterAction::ExcludeRecursive => graph.exclude_recursive(id),
                }
            }
        }
        Ok(())
    }

    fn apply_aliases(&self, graph: &mut DeclGraph) -> Result<()> {
        for rule in &self.config.aliases {
            apply_alias(graph, rule)?;
        }
        Ok(())
    }

    /// License, precompiled header and usings from the configuration
    fn add_prelude(&self, tree: &mut CreatorTree) {
        let generation = &self.config.generation;
        let root = tree.root();
        let mut position = 0;
        if let Some(license) = &generation.license {
            tree.insert(root, position, CreatorKind::License(license.clone()), None);
            position += 1;
        }
        if let Some(header) = &generation.precompiled_header {
            tree.insert(root, position, CreatorKind::PrecompiledHeader(header.clone()), None);
        }

        let mut position = tree.last_include_index().map_or(0, |index| index + 1);
        // after the `bp` alias that follows the includes
        while tree
            .children(root)
            .get(position)
            .map_or(false, |&node| matches!(tree.node(node).kind, CreatorKind::NamespaceAlias { .. }))
        {
            position += 1;
        }
        for using in &generation.usings {
            tree.insert(root, position, CreatorKind::NamespaceUsing(using.clone()), None);
            position += 1;
        }
    }
}

fn apply_alias(graph: &mut DeclGraph, rule: &AliasRule) -> Result<()> {
    let matcher = rule.query.matcher()?;
    let id = graph.single(matcher.as_ref())?;
    if !rule.template_args.is_empty() {
        graph.disambiguate_template_function(id, &rule.template_args, rule.alias_suffix.as_deref())?;
    }
    if let Some(alias) = &rule.alias {
        graph.set_alias(id, alias.clone());
    }
    if let Some(wrapper) = &rule.wrapper_alias {
        graph.set_wrapper_alias(id, wrapper.clone());
    }
    for (value, alias) in &rule.values {
        graph.set_value_alias(id, value, alias.clone())?;
    }
    for code in &rule.code {
        graph.add_code(id, code.clone());
    }
    Ok(())
}

/// Expand directories into the `*.json` files below them, sorted by path
fn collect_dump_files(sources: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for source in sources {
        if source.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(source)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|path| path.extension().map_or(false, |ext| ext == "json"))
                .collect();
            found.sort();
            files.extend(found);
        } else if source.is_file() {
            files.push(source.clone());
        } else {
            return Err(BindsworthError::FileSystem(format!("dump {} does not exist", source.display())).into());
        }
    }
    Ok(files)
}

/// Read and parse the dumps concurrently; units keep the order of `files`
async fn read_dumps(files: Vec<PathBuf>) -> Result<Vec<TranslationUnitDump>> {
    let mut tasks = JoinSet::new();
    for (index, file) in files.into_iter().enumerate() {
        tasks.spawn(async move {
            let text = tokio::fs::read_to_string(&file).await?;
            let unit = parse_dump(&text)
                .map_err(|e| BindsworthError::Dump(format!("{}: {}", file.display(), e)))?;
            Ok::<_, anyhow::Error>((index, unit))
        });
    }

    let mut units = Vec::new();
    while let Some(result) = tasks.join_next().await {
        units.push(result??);
    }
    units.sort_by_key(|(index, _)| *index);
    Ok(units.into_iter().map(|(_, unit)| unit).collect())
}

fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Write every file whose content changed. Either all changed files are
/// written or, on the first failure, the ones written so far are rolled back.
async fn write_files(output_dir: &Path, files: &[RenderedFile]) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    tokio::fs::create_dir_all(output_dir).await?;

    let mut written: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::new();
    let mut unchanged = Vec::new();
    for file in files {
        let path = output_dir.join(&file.name);
        let previous = tokio::fs::read(&path).await.ok();
        if previous.as_deref().map(content_hash) == Some(content_hash(file.text.as_bytes())) {
            debug!("{} is up to date", path.display());
            unchanged.push(path);
            continue;
        }
        if let Err(e) = tokio::fs::write(&path, &file.text).await {
            warn!("Writing {} failed; rolling back {} files", path.display(), written.len());
            rollback(&written).await;
            return Err(BindsworthError::FileSystem(format!("cannot write {}: {}", path.display(), e)).into());
        }
        written.push((path, previous));
    }
    Ok((written.into_iter().map(|(path, _)| path).collect(), unchanged))
}

/// Restore overwritten files and remove new ones
async fn rollback(written: &[(PathBuf, Option<Vec<u8>>)]) {
    for (path, previous) in written.iter().rev() {
        let result = match previous {
            Some(content) => tokio::fs::write(path, content).await,
            None => tokio::fs::remove_file(path).await,
        };
        if let Err(e) = result {
            warn!("Rollback of {} failed: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeclQuery, FilterRule};
    use crate::core::decl::DeclKindTag;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use predicates::prelude::*;

    const SHAPES: &str = r#"{
        "translation_unit": "shapes.cpp",
        "declarations": [
            { "kind": "namespace", "name": "geo", "children": [
                { "kind": "struct", "name": "shape", "location": { "file": "include/geo/shapes.hpp", "line": 3 },
                  "children": [
                    { "kind": "function", "name": "area", "return_type": "double",
                      "is_const": true, "is_virtual": true, "is_pure_virtual": true,
                      "location": { "file": "include/geo/shapes.hpp", "line": 4 } }
                  ] },
                { "kind": "class", "name": "circle", "location": { "file": "include/geo/shapes.hpp", "line": 8 },
                  "bases": [ { "name": "::geo::shape", "access": "public" } ],
                  "children": [
                    { "kind": "constructor", "name": "circle",
                      "arguments": [ { "name": "radius", "type": "double" } ],
                      "location": { "file": "include/geo/shapes.hpp", "line": 9 } },
                    { "kind": "function", "name": "secret", "return_type": "void", "access": "private",
                      "location": { "file": "include/geo/shapes.hpp", "line": 11 } }
                  ] },
                { "kind": "enum", "name": "color", "location": { "file": "include/geo/color.hpp", "line": 1 },
                  "values": [ ["red", 0], ["green", 1] ] },
                { "kind": "function", "name": "paint", "return_type": "void",
                  "arguments": [ { "name": "c", "type": "::geo::circle &" }, { "name": "k", "type": "::geo::color" } ],
                  "location": { "file": "include/geo/color.hpp", "line": 5 } }
            ] },
            { "kind": "namespace", "name": "detail", "children": [
                { "kind": "class", "name": "cache", "location": { "file": "src/cache.hpp", "line": 1 } }
            ] }
        ]
    }"#;

    const CONVERT: &str = r#"{
        "translation_unit": "convert.cpp",
        "declarations": [
            { "kind": "function", "name": "to_string", "return_type": "char",
              "arguments": [ { "name": "v", "type": "int" } ],
              "location": { "file": "include/geo/narrow.hpp", "line": 2 } },
            { "kind": "function", "name": "to_string", "return_type": "wchar_t",
              "arguments": [ { "name": "v", "type": "int" } ],
              "location": { "file": "include/geo/wide.hpp", "line": 2 } }
        ]
    }"#;

    fn instantiation(header: &str, arg: &str, suffix: Option<&str>) -> AliasRule {
        AliasRule {
            query: DeclQuery {
                name: Some("to_string".to_string()),
                header_file: Some(PathBuf::from(header)),
                ..DeclQuery::default()
            },
            template_args: vec![arg.to_string()],
            alias_suffix: suffix.map(str::to_string),
            ..AliasRule::default()
        }
    }

    fn config(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.project.dumps = vec![temp.child("dumps").path().to_path_buf()];
        config.project.headers = vec![PathBuf::from("include/geo")];
        config.generation.module_name = "geo_ext".to_string();
        config.generation.output_dir = temp.child("generated").path().to_path_buf();
        config.generation.include_roots = vec![PathBuf::from("include")];
        config
    }

    fn setup() -> TempDir {
        let temp = TempDir::new().unwrap();
        temp.child("dumps/shapes.json").write_str(SHAPES).unwrap();
        temp
    }

    #[tokio::test]
    async fn test_generate_writes_module() {
        let temp = setup();
        let mut config = config(&temp);
        config.generation.license = Some("// Copyright geo authors".to_string());
        config.generation.usings = vec!["geo".to_string()];
        let engine = Engine::with_config(config);

        let report = engine.generate(Vec::new(), None, false, false).await.unwrap();
        assert_eq!(report.written.len(), 1);
        assert!(report.diagnostics.is_clean());
        assert_eq!(report.includes, vec!["geo/shapes.hpp".to_string(), "geo/color.hpp".to_string()]);

        let module = temp.child("generated/geo_ext.cpp");
        module.assert(predicate::path::exists());
        module.assert(predicate::str::starts_with("// This file has been generated by bindsworth."));
        module.assert(predicate::str::contains("// Copyright geo authors\n#include \"boost/python.hpp\""));
        module.assert(predicate::str::contains("namespace bp = boost::python;\nusing namespace geo;"));
        module.assert(predicate::str::contains("struct shape_wrapper"));
        module.assert(predicate::str::contains("bp::bases< ::geo::shape >"));
        module.assert(predicate::str::contains("cache").not());
        module.assert(predicate::str::contains("secret").not());

        // nothing changed, nothing written
        let again = engine.generate(Vec::new(), None, false, false).await.unwrap();
        assert!(again.written.is_empty());
        assert_eq!(again.unchanged.len(), 1);
    }

    #[tokio::test]
    async fn test_unresolved_dependency_is_warning_or_error() {
        let temp = setup();
        let mut config = config(&temp);
        config.filters.push(FilterRule {
            action: FilterAction::Exclude,
            query: DeclQuery { name: Some("::geo::color".to_string()), ..DeclQuery::default() },
        });
        let engine = Engine::with_config(config);

        let diagnostics = engine.check(Vec::new(), false).await.unwrap();
        assert_eq!(diagnostics.warnings.len(), 1);
        assert!(diagnostics.warnings[0].reason.contains("::geo::paint depends on ::geo::color"));

        let err = engine.generate(Vec::new(), None, false, true).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BindsworthError>(),
            Some(BindsworthError::UnresolvedDependencies(1))
        ));
        temp.child("generated/geo_ext.cpp").assert(predicate::path::missing());
    }

    #[tokio::test]
    async fn test_alias_rules_reach_the_output() {
        let temp = setup();
        let mut config = config(&temp);
        config.aliases.push(AliasRule {
            query: DeclQuery { name: Some("circle".to_string()), kind: Some(DeclKindTag::Class), ..DeclQuery::default() },
            alias: Some("Circle".to_string()),
            ..AliasRule::default()
        });
        config.aliases.push(AliasRule {
            query: DeclQuery { name: Some("color".to_string()), ..DeclQuery::default() },
            values: [("red".to_string(), "RED".to_string())].into_iter().collect(),
            ..AliasRule::default()
        });
        let engine = Engine::with_config(config);

        engine.generate(Vec::new(), None, true, false).await.unwrap();
        let generated = temp.child("generated");
        generated.child("Circle.pypp.cpp").assert(predicate::str::contains("Circle_exposer_t( \"Circle\", bp::no_init )"));
        generated.child("color.pypp.cpp").assert(predicate::str::contains(".value( \"RED\", ::geo::red )"));
        generated.child("geo_ext.main.cpp").assert(predicate::str::contains("register_Circle_class();"));
    }

    #[tokio::test]
    async fn test_template_instantiations_need_distinct_names() {
        let temp = setup();
        temp.child("dumps/convert.json").write_str(CONVERT).unwrap();
        let mut config = config(&temp);
        config.aliases.push(instantiation("geo/narrow.hpp", "char", None));
        config.aliases.push(instantiation("geo/wide.hpp", "wchar_t", None));

        // same arguments, different return types: one Python name can't hold both
        let diagnostics = Engine::with_config(config.clone()).check(Vec::new(), false).await.unwrap();
        assert_eq!(diagnostics.errors.len(), 1);
        assert_eq!(
            diagnostics.errors[0].subjects,
            vec!["::to_string< char >".to_string(), "::to_string< wchar_t >".to_string()]
        );
        let err = Engine::with_config(config.clone()).generate(Vec::new(), None, false, false).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<BindsworthError>(), Some(BindsworthError::NamingConflict { .. })));

        config.aliases[1].alias_suffix = Some("_w".to_string());
        let engine = Engine::with_config(config);
        assert!(engine.check(Vec::new(), false).await.unwrap().is_clean());
        engine.generate(Vec::new(), None, false, false).await.unwrap();
        let module = temp.child("generated/geo_ext.cpp");
        module.assert(predicate::str::contains("bp::def( \"to_string\", &::to_string< char >, ( bp::arg(\"v\") ) );"));
        module.assert(predicate::str::contains("bp::def( \"to_string_w\", &::to_string< wchar_t >, ( bp::arg(\"v\") ) );"));
    }

    #[tokio::test]
    async fn test_rules_run_on_an_indexed_graph() {
        let temp = setup();
        let mut config = config(&temp);
        config.filters.push(FilterRule {
            action: FilterAction::ExcludeRecursive,
            query: DeclQuery { name: Some("::geo::shape".to_string()), ..DeclQuery::default() },
        });
        config.aliases.push(AliasRule {
            query: DeclQuery { name: Some("paint".to_string()), ..DeclQuery::default() },
            alias: Some("Paint".to_string()),
            ..AliasRule::default()
        });
        let engine = Engine::with_config(config);

        let pipeline = engine.load(&[]).await.unwrap();
        let graph = pipeline.graph();
        assert!(graph.is_optimized());
        let shape = graph.single(&by_name("::geo::shape")).unwrap();
        let area = graph.single(&by_name("area")).unwrap();
        assert!(graph.get(shape).excluded && graph.get(area).excluded);
        let paint = graph.single(&by_name("paint")).unwrap();
        assert_eq!(graph.get(paint).alias.as_deref(), Some("Paint"));
    }

    #[tokio::test]
    async fn test_ambiguous_alias_rule_fails() {
        let temp = setup();
        let mut config = config(&temp);
        config.aliases.push(AliasRule {
            query: DeclQuery { pattern: Some("^c".to_string()), ..DeclQuery::default() },
            alias: Some("C".to_string()),
            ..AliasRule::default()
        });
        let engine = Engine::with_config(config);

        let err = engine.check(Vec::new(), false).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BindsworthError>(),
            Some(BindsworthError::QueryMismatch { .. })
        ));
    }

    #[tokio::test]
    async fn test_failed_write_rolls_back() {
        let temp = setup();
        let engine = Engine::with_config(config(&temp));
        // a directory where the main file should go makes the last write fail
        temp.child("generated/geo_ext.main.cpp").create_dir_all().unwrap();

        let err = engine.generate(Vec::new(), None, true, false).await.unwrap_err();
        assert!(err.to_string().contains("geo_ext.main.cpp"));
        temp.child("generated/shape.pypp.cpp").assert(predicate::path::missing());
        temp.child("generated/circle.pypp.hpp").assert(predicate::path::missing());
    }

    #[tokio::test]
    async fn test_print_and_init() {
        let temp = setup();
        let engine = Engine::with_config(config(&temp));
        let text = engine.print(Vec::new(), Some("circle".to_string())).await.unwrap();
        assert!(text.contains("circle"));
        assert!(engine.print(Vec::new(), Some("missing".to_string())).await.is_err());

        let project = temp.child("project");
        engine.init(Some(project.path().to_path_buf())).await.unwrap();
        project.child("Bindsworth.toml").assert(predicate::str::contains("[generation]"));
    }
}

//! Lays rendered creators out into C++ source files.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tera::{Context, Tera};
use tracing::debug;

use super::render::{render_node, render_prelude, render_wrappers, RenderContext};
use super::tree::{indent, CreatorKind, CreatorTree, NodeId};
use crate::core::decl::matchers::normalize_path;
use crate::core::decl::{DeclGraph, DeclId};
use crate::core::names::create_valid_name;
use crate::error::Result;

const MODULE_TEMPLATE: &str = r#"// This file has been generated by bindsworth. Do not edit.

{{ prelude }}
{% if wrappers %}
{{ wrappers }}
{% endif %}
BOOST_PYTHON_MODULE({{ module_name }}){
{{ body }}
}
"#;

const UNIT_SOURCE_TEMPLATE: &str = r#"// This file has been generated by bindsworth. Do not edit.

{{ prelude }}
{% if wrappers %}
{{ wrappers }}
{% endif %}
void {{ register }}(){
{{ body }}
}
"#;

const UNIT_HEADER_TEMPLATE: &str = r#"// This file has been generated by bindsworth. Do not edit.

#ifndef {{ guard }}
#define {{ guard }}

void {{ register }}();

#endif//{{ guard }}
"#;

/// How the module is split across files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitPolicy {
    /// Everything in `<module>.cpp`
    #[default]
    SingleFile,
    /// One source/header pair per top-level class or enum plus a main file
    PerDeclaration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    /// File name relative to the output directory
    pub name: String,
    pub text: String,
}

/// Everything a generation run produces
#[derive(Debug, Clone, Default)]
pub struct RenderOutput {
    pub files: Vec<RenderedFile>,
    /// Headers of the exported declarations, relative to the include roots
    pub includes: Vec<String>,
}

pub struct FileWriter {
    tera: Tera,
}

impl FileWriter {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_templates(vec![
            ("module.cpp", MODULE_TEMPLATE),
            ("unit.cpp", UNIT_SOURCE_TEMPLATE),
            ("unit.hpp", UNIT_HEADER_TEMPLATE),
        ])?;
        Ok(Self { tera })
    }

    pub fn render(&self, tree: &CreatorTree, ctx: &RenderContext<'_>, policy: SplitPolicy) -> Result<Vec<RenderedFile>> {
        let files = match policy {
            SplitPolicy::SingleFile => vec![self.single_file(tree, ctx)?],
            SplitPolicy::PerDeclaration => self.split_files(tree, ctx)?,
        };
        debug!("Rendered {} files for module {}", files.len(), ctx.module_name);
        Ok(files)
    }

    fn single_file(&self, tree: &CreatorTree, ctx: &RenderContext<'_>) -> Result<RenderedFile> {
        let body: Vec<String> = top_level_units(tree)
            .into_iter()
            .map(|unit| render_node(tree, ctx, unit))
            .filter(|text| !text.is_empty())
            .collect();

        let mut context = Context::new();
        context.insert("prelude", &render_prelude(tree, &[]));
        context.insert("wrappers", &render_wrappers(tree, ctx, tree.root()));
        context.insert("module_name", ctx.module_name);
        context.insert("body", &indent(&body.join("\n\n"), 1));

        Ok(RenderedFile {
            name: format!("{}.cpp", ctx.module_name),
            text: self.tera.render("module.cpp", &context)?,
        })
    }

    fn split_files(&self, tree: &CreatorTree, ctx: &RenderContext<'_>) -> Result<Vec<RenderedFile>> {
        let mut files = Vec::new();
        let mut headers = Vec::new();
        let mut body = Vec::new();

        for unit in top_level_units(tree) {
            let creator = tree.node(unit);
            let kind = match (&creator.kind, creator.decl) {
                (CreatorKind::Class, Some(_)) => "class",
                (CreatorKind::Enum, Some(_)) => "enum",
                _ => {
                    let text = render_node(tree, ctx, unit);
                    if !text.is_empty() {
                        body.push(text);
                    }
                    continue;
                }
            };
            let Some(decl) = creator.decl else { continue };

            let stem = create_valid_name(&ctx.names.get(ctx.graph, decl));
            let register = format!("register_{}_{}", stem, kind);
            let header = format!("{}.pypp.hpp", stem);

            let mut context = Context::new();
            context.insert("register", &register);
            context.insert("guard", &format!("{}_hpp__bindsworth_wrapper", stem));
            files.push(RenderedFile {
                name: header.clone(),
                text: self.tera.render("unit.hpp", &context)?,
            });

            context.insert("prelude", &render_prelude(tree, std::slice::from_ref(&header)));
            context.insert("wrappers", &render_wrappers(tree, ctx, unit));
            context.insert("body", &indent(&render_node(tree, ctx, unit), 1));
            files.push(RenderedFile {
                name: format!("{}.pypp.cpp", stem),
                text: self.tera.render("unit.cpp", &context)?,
            });

            headers.push(header);
            body.push(format!("{}();", register));
        }

        let mut context = Context::new();
        context.insert("prelude", &render_prelude(tree, &headers));
        context.insert("wrappers", "");
        context.insert("module_name", ctx.module_name);
        context.insert("body", &indent(&body.join("\n\n"), 1));
        files.push(RenderedFile {
            name: format!("{}.main.cpp", ctx.module_name),
            text: self.tera.render("module.cpp", &context)?,
        });
        Ok(files)
    }
}

/// Body-level creators in tree order; namespaces are transparent
fn top_level_units(tree: &CreatorTree) -> Vec<NodeId> {
    let mut units = Vec::new();
    collect_units(tree, tree.root(), &mut units);
    units
}

fn collect_units(tree: &CreatorTree, node: NodeId, units: &mut Vec<NodeId>) {
    for &child in tree.children(node) {
        let kind = &tree.node(child).kind;
        if kind.is_prelude() {
            continue;
        }
        if *kind == CreatorKind::Namespace {
            collect_units(tree, child, units);
        } else {
            units.push(child);
        }
    }
}

/// Headers declaring the exported declarations, in order of first use.
/// Paths under one of `roots` are made relative to it.
pub fn include_manifest(graph: &DeclGraph, exported: &[DeclId], roots: &[PathBuf]) -> Vec<String> {
    let roots: Vec<PathBuf> = roots.iter().map(|root| normalize_path(root)).collect();
    let mut seen = HashSet::new();
    let mut manifest = Vec::new();
    for &id in exported {
        let Some(location) = &graph.get(id).location else {
            continue;
        };
        let header = include_path(&normalize_path(&location.file), &roots);
        if seen.insert(header.clone()) {
            manifest.push(header);
        }
    }
    manifest
}

fn include_path(file: &Path, roots: &[PathBuf]) -> String {
    let relative = roots
        .iter()
        .find_map(|root| file.strip_prefix(root).ok())
        .unwrap_or(file);
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

//! Boost.Python code for each kind of creator.

use std::fmt::Write as _;

use super::tree::{indent, CreatorKind, CreatorTree, NodeId};
use crate::core::call_policies;
use crate::core::decl::{Access, Callable, CallableFlavor, DeclGraph, DeclId, DeclKind, TypeRef};
use crate::core::names::{create_valid_name, NameTable};

/// Read-only view shared by every renderer
pub struct RenderContext<'a> {
    pub graph: &'a DeclGraph,
    pub names: &'a NameTable,
    pub module_name: &'a str,
}

/// Classes with exported virtual member functions get a wrapper struct so
/// Python subclasses can override them
pub fn needs_wrapper(graph: &DeclGraph, class: DeclId) -> bool {
    graph.children(class).iter().any(|&member| {
        graph.is_exported(member)
            && graph
                .get(member)
                .as_callable()
                .map_or(false, |c| c.flavor == CallableFlavor::Function && c.is_virtual)
    })
}

pub fn is_abstract(graph: &DeclGraph, class: DeclId) -> bool {
    graph
        .children(class)
        .iter()
        .any(|&member| graph.get(member).as_callable().map_or(false, |c| c.is_pure_virtual))
}

pub fn wrapper_name(graph: &DeclGraph, names: &NameTable, class: DeclId) -> String {
    graph
        .get(class)
        .wrapper_alias
        .clone()
        .unwrap_or_else(|| format!("{}_wrapper", names.get(graph, class)))
}

/// Module-body code of one creator and everything below it
pub fn render_node(tree: &CreatorTree, ctx: &RenderContext<'_>, node: NodeId) -> String {
    let creator = tree.node(node);
    let Some(id) = creator.decl else {
        return String::new();
    };

    let mut text = match creator.kind {
        CreatorKind::Class => return render_class(tree, ctx, node, id),
        CreatorKind::Namespace => render_children(tree, ctx, node),
        CreatorKind::Enum => render_enum(ctx, id),
        CreatorKind::UnnamedEnum => render_unnamed_enum(ctx, id),
        CreatorKind::Function => render_function(tree, ctx, node, id),
        CreatorKind::Constructor => render_constructor(tree, ctx, node, id),
        CreatorKind::Operator => render_operator(tree, ctx, node, id),
        CreatorKind::Variable => render_variable(tree, ctx, node, id),
        CreatorKind::Typedef => render_typedef(ctx, id),
        _ => String::new(),
    };
    for code in &ctx.graph.get(id).user_code {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(code);
    }
    text
}

fn render_children(tree: &CreatorTree, ctx: &RenderContext<'_>, node: NodeId) -> String {
    tree.children(node)
        .iter()
        .map(|&child| render_node(tree, ctx, child))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Wrapper structs of every class at or below `node`
pub fn render_wrappers(tree: &CreatorTree, ctx: &RenderContext<'_>, node: NodeId) -> String {
    tree.subtree(node)
        .into_iter()
        .filter(|&n| tree.node(n).kind == CreatorKind::Class)
        .filter_map(|n| tree.node(n).decl)
        .filter(|&class| needs_wrapper(ctx.graph, class))
        .map(|class| render_wrapper(ctx, class))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// File-level lines: license, includes, aliases and usings. `extra_includes`
/// are placed right after the last include.
pub fn render_prelude(tree: &CreatorTree, extra_includes: &[String]) -> String {
    let children = tree.children(tree.root());
    let last_include = tree.last_include_index();
    let mut blocks: Vec<String> = Vec::new();

    if last_include.is_none() {
        blocks.extend(extra_includes.iter().map(|h| format!("#include \"{}\"", h)));
    }
    for (position, &child) in children.iter().enumerate() {
        let line = match &tree.node(child).kind {
            CreatorKind::License(text) => text.clone(),
            CreatorKind::PrecompiledHeader(header) => format!(
                "#include \"{}\"\n#ifdef _MSC_VER\n    #pragma hdrstop\n#endif //_MSC_VER",
                header
            ),
            CreatorKind::Include(header) => format!("#include \"{}\"", header),
            CreatorKind::NamespaceAlias { alias, target } => format!("namespace {} = {};", alias, target),
            CreatorKind::NamespaceUsing(ns) => format!("using namespace {};", ns),
            CreatorKind::Text(text) => text.clone(),
            _ => continue,
        };
        blocks.push(line);
        if Some(position) == last_include {
            blocks.extend(extra_includes.iter().map(|h| format!("#include \"{}\"", h)));
        }
    }
    blocks.join("\n")
}

fn exposer(ctx: &RenderContext<'_>, class: DeclId) -> String {
    format!("{}_exposer", ctx.names.get(ctx.graph, class))
}

/// Class that a member creator is registered with
fn owner_class(tree: &CreatorTree, node: NodeId) -> Option<DeclId> {
    tree.parent(node)
        .filter(|&parent| tree.node(parent).kind == CreatorKind::Class)
        .and_then(|parent| tree.node(parent).decl)
}

fn argument_name(callable: &Callable, index: usize) -> String {
    callable.arguments[index]
        .name
        .clone()
        .unwrap_or_else(|| format!("arg{}", index))
}

fn keywords(callable: &Callable) -> Option<String> {
    if callable.arguments.is_empty() {
        return None;
    }
    let args: Vec<String> = callable
        .arguments
        .iter()
        .enumerate()
        .map(|(index, arg)| {
            let name = argument_name(callable, index);
            match &arg.default {
                Some(default) => format!("bp::arg(\"{}\")={}", name, default),
                None => format!("bp::arg(\"{}\")", name),
            }
        })
        .collect();
    Some(format!("( {} )", args.join(", ")))
}

fn return_type(callable: &Callable) -> &str {
    callable.return_type.as_ref().map(TypeRef::as_str).unwrap_or("void")
}

fn argument_types(callable: &Callable) -> String {
    callable
        .arguments
        .iter()
        .map(|arg| arg.ty.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parameters(callable: &Callable) -> String {
    (0..callable.arguments.len())
        .map(|index| format!("{} {}", callable.arguments[index].ty, argument_name(callable, index)))
        .collect::<Vec<_>>()
        .join(", ")
}

fn call_arguments(callable: &Callable) -> String {
    (0..callable.arguments.len())
        .map(|index| argument_name(callable, index))
        .collect::<Vec<_>>()
        .join(", ")
}

/// `typedef` of the function pointer type, member pointer when `class` is set
fn function_type(callable: &Callable, class: Option<&str>, alias: &str) -> String {
    match class {
        Some(class) if !callable.is_static => format!(
            "typedef {} ( {}::*{} )( {} ){};",
            return_type(callable),
            class,
            alias,
            argument_types(callable),
            if callable.is_const { " const" } else { "" }
        ),
        _ => format!("typedef {} ( *{} )( {} );", return_type(callable), alias, argument_types(callable)),
    }
}

fn block(title: &str, lines: &[String]) -> String {
    format!("{{ //{}\n{}\n}}", title, indent(&lines.join("\n"), 1))
}

fn render_class(tree: &CreatorTree, ctx: &RenderContext<'_>, node: NodeId, id: DeclId) -> String {
    let graph = ctx.graph;
    let decl = graph.get(id);
    let Some(class) = decl.as_class() else {
        return String::new();
    };
    let name = ctx.names.get(graph, id);
    let qualified = graph.qualified_name(id);
    let exposer = exposer(ctx, id);

    let mut template_args = vec![if needs_wrapper(graph, id) {
        wrapper_name(graph, ctx.names, id)
    } else {
        qualified.clone()
    }];
    let bases: Vec<String> = class
        .bases
        .iter()
        .filter(|base| base.access == Access::Public)
        .filter_map(|base| base.resolved)
        .filter(|&base| graph.is_exported(base))
        .map(|base| graph.qualified_name(base))
        .collect();
    if !bases.is_empty() {
        template_args.push(format!("bp::bases< {} >", bases.join(", ")));
    }
    if is_abstract(graph, id) {
        template_args.push("boost::noncopyable".to_string());
    }

    let has_constructors = graph.children(id).iter().any(|&member| {
        graph
            .get(member)
            .as_callable()
            .map_or(false, |c| c.flavor == CallableFlavor::Constructor)
    });
    let init = if has_constructors {
        format!("\"{}\", bp::no_init", name)
    } else {
        format!("\"{}\"", name)
    };

    let mut lines = vec![
        format!("typedef bp::class_< {} > {}_t;", template_args.join(", "), exposer),
        format!("{0}_t {0} = {0}_t( {1} );", exposer, init),
        format!("bp::scope {}_scope( {} );", name, exposer),
    ];

    let mut statics: Vec<String> = Vec::new();
    for &child in tree.children(node) {
        let text = render_node(tree, ctx, child);
        if !text.is_empty() {
            lines.push(text);
        }
        let creator = tree.node(child);
        if let (CreatorKind::Function, Some(member)) = (&creator.kind, creator.decl) {
            if graph.get(member).as_callable().map_or(false, |c| c.is_static) {
                let static_name = ctx.names.get(graph, member);
                if !statics.contains(&static_name) {
                    statics.push(static_name);
                }
            }
        }
    }
    for static_name in statics {
        lines.push(format!("{}.staticmethod( \"{}\" );", exposer, static_name));
    }
    lines.extend(decl.user_code.iter().cloned());

    block(&qualified, &lines)
}

/// C++ spelling of an enumerator; unscoped enumerators live in the
/// enclosing scope
fn enumerator_path(graph: &DeclGraph, id: DeclId, value: &str, scoped: bool) -> String {
    let scope = if scoped { Some(id) } else { graph.parent(id) };
    match scope {
        Some(scope) if scope != graph.global() => format!("{}::{}", graph.qualified_name(scope), value),
        _ => format!("::{}", value),
    }
}

fn render_enum(ctx: &RenderContext<'_>, id: DeclId) -> String {
    let graph = ctx.graph;
    let Some(decl) = graph.get(id).as_enum() else {
        return String::new();
    };
    let mut lines = vec![format!(
        "bp::enum_< {} >( \"{}\" )",
        graph.qualified_name(id),
        ctx.names.get(graph, id)
    )];
    for (value, _) in &decl.values {
        lines.push(format!(
            "    .value( \"{}\", {} )",
            decl.value_name(value),
            enumerator_path(graph, id, value, decl.is_scoped)
        ));
    }
    if !decl.is_scoped {
        lines.push("    .export_values()".to_string());
    }
    lines.push("    ;".to_string());
    lines.join("\n")
}

/// An unnamed enum has no Python type; each enumerator becomes an integer
/// attribute of the enclosing scope
fn render_unnamed_enum(ctx: &RenderContext<'_>, id: DeclId) -> String {
    let graph = ctx.graph;
    let Some(decl) = graph.get(id).as_enum() else {
        return String::new();
    };
    decl.values
        .iter()
        .map(|(value, _)| {
            format!(
                "bp::scope().attr(\"{}\") = (int){};",
                decl.value_name(value),
                enumerator_path(graph, id, value, false)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_function(tree: &CreatorTree, ctx: &RenderContext<'_>, node: NodeId, id: DeclId) -> String {
    let graph = ctx.graph;
    let Some(callable) = graph.get(id).as_callable() else {
        return String::new();
    };
    let name = ctx.names.get(graph, id);
    let qualified = graph.qualified_name(id);
    let owner = owner_class(tree, node);
    let target = match owner {
        Some(class) => format!("{}.def", exposer(ctx, class)),
        None => "bp::def".to_string(),
    };
    let class_name = owner.map(|class| graph.qualified_name(class));
    let alias = format!("{}_function_type", name);

    let mut tail = String::new();
    if let Some(keywords) = keywords(callable) {
        let _ = write!(tail, ", {}", keywords);
    }
    if let Some(policy) = call_policies::resolve(graph, id).render() {
        let _ = write!(tail, ", {}", policy);
    }

    let wrapper = owner
        .filter(|&class| callable.is_virtual && needs_wrapper(graph, class))
        .map(|class| wrapper_name(graph, ctx.names, class));

    match wrapper {
        Some(_) if callable.is_pure_virtual => block(
            &qualified,
            &[
                function_type(callable, class_name.as_deref(), &alias),
                format!("{}( \"{}\", bp::pure_virtual( {}( &{} ) ){} );", target, name, alias, qualified, tail),
            ],
        ),
        Some(wrapper) => {
            let default_alias = format!("default_{}_function_type", name);
            let default_name = format!("default_{}", create_valid_name(&graph.get(id).name));
            block(
                &qualified,
                &[
                    function_type(callable, class_name.as_deref(), &alias),
                    function_type(callable, Some(wrapper.as_str()), &default_alias),
                    format!(
                        "{}( \"{}\", {}( &{} ), {}( &{}::{} ){} );",
                        target, name, alias, qualified, default_alias, wrapper, default_name, tail
                    ),
                ],
            )
        }
        // several C++ declarations share the name; spell out which one
        None if graph.lookup(&qualified).len() > 1 => block(
            &qualified,
            &[
                function_type(callable, class_name.as_deref(), &alias),
                format!("{}( \"{}\", {}( &{} ){} );", target, name, alias, qualified, tail),
            ],
        ),
        None => format!("{}( \"{}\", &{}{} );", target, name, qualified, tail),
    }
}

fn render_constructor(tree: &CreatorTree, ctx: &RenderContext<'_>, node: NodeId, id: DeclId) -> String {
    let graph = ctx.graph;
    let (Some(class), Some(callable)) = (owner_class(tree, node), graph.get(id).as_callable()) else {
        return String::new();
    };
    let required = callable.arguments.iter().take_while(|arg| arg.default.is_none()).count();
    let mut types: Vec<String> = callable.arguments[..required]
        .iter()
        .map(|arg| arg.ty.to_string())
        .collect();
    if required < callable.arguments.len() {
        let optional: Vec<&str> = callable.arguments[required..].iter().map(|arg| arg.ty.as_str()).collect();
        types.push(format!("bp::optional< {} >", optional.join(", ")));
    }
    let init = match (types.is_empty(), keywords(callable)) {
        (true, _) => "bp::init< >()".to_string(),
        (false, Some(keywords)) => format!("bp::init< {} >({})", types.join(", "), keywords),
        (false, None) => format!("bp::init< {} >()", types.join(", ")),
    };
    format!("{}.def( {} );", exposer(ctx, class), init)
}

fn render_operator(tree: &CreatorTree, ctx: &RenderContext<'_>, node: NodeId, id: DeclId) -> String {
    let graph = ctx.graph;
    let Some(callable) = graph.get(id).as_callable() else {
        return String::new();
    };
    let Some(symbol) = callable.operator_symbol() else {
        return String::new();
    };
    if symbol == "()" || symbol == "[]" {
        return render_function(tree, ctx, node, id);
    }
    let Some(class) = owner_class(tree, node) else {
        return String::new();
    };

    let member = graph.parent(id).map_or(false, |parent| graph.get(parent).is_class());
    let streams = !member
        && symbol == "<<"
        && callable.arguments.first().map_or(false, |arg| arg.ty.base_name().ends_with("ostream"));
    if streams {
        return format!("{}.def( bp::self_ns::str( bp::self ) );", exposer(ctx, class));
    }

    let operand = |ty: &TypeRef| {
        if graph.resolve_type(ty) == Some(class) {
            "bp::self".to_string()
        } else {
            format!("bp::other< {} >()", ty.base_name())
        }
    };
    let mut operands: Vec<String> = Vec::new();
    if member {
        operands.push("bp::self".to_string());
    }
    operands.extend(callable.arguments.iter().map(|arg| operand(&arg.ty)));

    let expression = match operands.as_slice() {
        [single] => format!("{}{}", symbol, single),
        [lhs, rhs] => format!("{} {} {}", lhs, symbol, rhs),
        _ => return String::new(),
    };
    format!("{}.def( {} );", exposer(ctx, class), expression)
}

fn is_read_only(ty: &TypeRef) -> bool {
    ty.is_reference() || ty.as_str().trim_end().ends_with("const") || (!ty.is_pointer() && ty.is_const())
}

fn render_variable(tree: &CreatorTree, ctx: &RenderContext<'_>, node: NodeId, id: DeclId) -> String {
    let graph = ctx.graph;
    let DeclKind::Variable { ty, is_static } = &graph.get(id).kind else {
        return String::new();
    };
    let name = ctx.names.get(graph, id);
    let qualified = graph.qualified_name(id);
    match owner_class(tree, node) {
        Some(class) if *is_static => {
            let mut accessors = vec![format!("bp::make_getter( &{} )", qualified)];
            if !is_read_only(ty) {
                accessors.push(format!("bp::make_setter( &{} )", qualified));
            }
            format!(
                "{}.add_static_property( \"{}\", {} );",
                exposer(ctx, class),
                name,
                accessors.join(", ")
            )
        }
        Some(class) => {
            let method = if is_read_only(ty) { "def_readonly" } else { "def_readwrite" };
            format!("{}.{}( \"{}\", &{} );", exposer(ctx, class), method, name, qualified)
        }
        None => format!("bp::scope().attr(\"{}\") = {};", name, qualified),
    }
}

/// A typedef of an exported class becomes a second name for its Python type
fn render_typedef(ctx: &RenderContext<'_>, id: DeclId) -> String {
    format!(
        "bp::scope().attr(\"{}\") = bp::object( bp::handle<>( bp::borrowed( reinterpret_cast< PyObject * >( \
         bp::converter::registered< {} >::converters.get_class_object() ) ) ) );",
        ctx.names.get(ctx.graph, id),
        ctx.graph.qualified_name(id)
    )
}

fn render_wrapper(ctx: &RenderContext<'_>, class: DeclId) -> String {
    let graph = ctx.graph;
    let qualified = graph.qualified_name(class);
    let wrapper = wrapper_name(graph, ctx.names, class);
    let mut out = String::new();
    let _ = writeln!(out, "struct {} : {}, bp::wrapper< {} > {{", wrapper, qualified, qualified);

    for &member in graph.children(class) {
        if !graph.is_exported(member) {
            continue;
        }
        let Some(callable) = graph.get(member).as_callable() else {
            continue;
        };
        let params = parameters(callable);
        let args = call_arguments(callable);
        match callable.flavor {
            CallableFlavor::Constructor => {
                let _ = write!(
                    out,
                    "\n    {wrapper}( {params} )\n    : {qualified}( {args} )\n      , bp::wrapper< {qualified} >(){{\n    }}\n"
                );
            }
            CallableFlavor::Function if callable.is_virtual => {
                let py_name = ctx.names.get(graph, member);
                let cpp_name = &graph.get(member).name;
                let ret = return_type(callable);
                let constness = if callable.is_const { " const" } else { "" };
                let returns = if ret == "void" { "" } else { "return " };
                let func = format!("func_{}", create_valid_name(cpp_name));
                if callable.is_pure_virtual {
                    let _ = write!(
                        out,
                        "\n    virtual {ret} {cpp_name}( {params} ){constness}{{\n        \
                         bp::override {func} = this->get_override( \"{py_name}\" );\n        \
                         {returns}{func}( {args} );\n    }}\n"
                    );
                } else {
                    let default_name = format!("default_{}", create_valid_name(cpp_name));
                    let _ = write!(
                        out,
                        "\n    virtual {ret} {cpp_name}( {params} ){constness} {{\n        \
                         if( bp::override {func} = this->get_override( \"{py_name}\" ) )\n            \
                         {returns}{func}( {args} );\n        else\n            \
                         {returns}this->{qualified}::{cpp_name}( {args} );\n    }}\n\n    \
                         {ret} {default_name}( {params} ){constness} {{\n        \
                         {returns}{qualified}::{cpp_name}( {args} );\n    }}\n"
                    );
                }
            }
            _ => {}
        }
    }
    out.push_str("\n};");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::decl::{Argument, BaseRelation, ClassDecl, EnumDecl};
    use crate::core::diagnostics::Diagnostics;
    use crate::core::resolver::emission_order;
    use std::collections::BTreeMap;

    fn render_all(graph: &DeclGraph) -> String {
        let exported = graph.exported();
        let names = NameTable::build(graph, &exported).unwrap();
        let order = emission_order(graph, &exported).unwrap();
        let mut diagnostics = Diagnostics::new();
        let tree = crate::core::creators::build(graph, &names, &order, &[], &mut diagnostics).unwrap();
        let ctx = RenderContext { graph, names: &names, module_name: "test" };
        let mut text = render_wrappers(&tree, &ctx, tree.root());
        text.push('\n');
        text.push_str(&render_children(&tree, &ctx, tree.root()));
        text
    }

    fn method(ret: &str, args: &[(&str, Option<&str>)], virtuality: (bool, bool)) -> DeclKind {
        DeclKind::Function(Callable {
            flavor: CallableFlavor::Function,
            return_type: Some(TypeRef::new(ret)),
            arguments: args
                .iter()
                .map(|(ty, default)| Argument {
                    name: Some(format!("p{}", ty.len())),
                    ty: TypeRef::new(*ty),
                    default: default.map(str::to_string),
                })
                .collect(),
            is_static: false,
            is_const: true,
            is_virtual: virtuality.0,
            is_pure_virtual: virtuality.1,
        })
    }

    fn class(bases: &[&str]) -> DeclKind {
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
            opaque: false,
        })
    }

    #[test]
    fn test_unnamed_enum_becomes_scope_attributes() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let ns = graph.add(global, "enums", None, DeclKind::Namespace);
        graph.add(
            ns,
            "",
            None,
            DeclKind::Enum(EnumDecl {
                values: vec![("OK".to_string(), 1), ("CANCEL".to_string(), 0)],
                value_aliases: BTreeMap::new(),
                is_scoped: false,
            }),
        );

        let text = render_all(&graph);
        assert!(text.contains("bp::scope().attr(\"OK\") = (int)::enums::OK;"));
        assert!(text.contains("bp::scope().attr(\"CANCEL\") = (int)::enums::CANCEL;"));
        assert!(!text.contains("enum_<"));
    }

    #[test]
    fn test_named_enum_with_value_alias() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let color = graph.add(
            global,
            "color",
            None,
            DeclKind::Enum(EnumDecl {
                values: vec![("red".to_string(), 0), ("blue".to_string(), 1)],
                value_aliases: BTreeMap::new(),
                is_scoped: false,
            }),
        );
        graph.set_value_alias(color, "red", "RED").unwrap();

        let text = render_all(&graph);
        assert!(text.contains("bp::enum_< ::color >( \"color\" )"));
        assert!(text.contains(".value( \"RED\", ::red )"));
        assert!(text.contains(".export_values()"));
    }

    #[test]
    fn test_alias_used_in_every_reference() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let ns = graph.add(global, "geo", None, DeclKind::Namespace);
        let shape = graph.add(ns, "shape", None, class(&[]));
        let circle = graph.add(ns, "circle", None, class(&["::geo::shape"]));
        graph.add(circle, "radius", None, method("double", &[], (false, false)));
        graph.link_bases().unwrap();
        graph.set_alias(circle, "Circle");
        graph.set_alias(shape, "Shape");

        let text = render_all(&graph);
        assert!(text.contains("typedef bp::class_< ::geo::circle, bp::bases< ::geo::shape > > Circle_exposer_t;"));
        assert!(text.contains("Circle_exposer_t Circle_exposer = Circle_exposer_t( \"Circle\" );"));
        assert!(text.contains("Circle_exposer.def( \"radius\", &::geo::circle::radius );"));
        assert!(text.contains("Shape_exposer_t( \"Shape\" )"));
        assert!(!text.contains("\"circle\""));
        assert!(text.find("Shape_exposer_t(").unwrap() < text.find("Circle_exposer_t(").unwrap());
    }

    #[test]
    fn test_virtual_members_get_wrapper() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let shape = graph.add(global, "shape", None, class(&[]));
        graph.add(shape, "area", None, method("double", &[], (true, true)));
        graph.add(shape, "scale", None, method("void", &[("double", Some("1.0"))], (true, false)));

        let text = render_all(&graph);
        assert!(text.contains("struct shape_wrapper : ::shape, bp::wrapper< ::shape > {"));
        assert!(text.contains("bp::override func_area = this->get_override( \"area\" );"));
        assert!(text.contains("void default_scale( double p6 ) const {"));
        assert!(text.contains("typedef bp::class_< shape_wrapper, boost::noncopyable > shape_exposer_t;"));
        assert!(text.contains("bp::pure_virtual( area_function_type( &::shape::area ) )"));
        assert!(text.contains("default_scale_function_type( &shape_wrapper::default_scale ), ( bp::arg(\"p6\")=1.0 )"));
    }

    #[test]
    fn test_constructors_operators_and_fields() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        let point = graph.add(global, "point", None, class(&[]));
        graph.add(
            point,
            "point",
            None,
            DeclKind::Function(Callable {
                flavor: CallableFlavor::Constructor,
                return_type: None,
                arguments: vec![
                    Argument { name: Some("x".into()), ty: TypeRef::new("int"), default: None },
                    Argument { name: Some("y".into()), ty: TypeRef::new("int"), default: Some("0".into()) },
                ],
                is_static: false,
                is_const: false,
                is_virtual: false,
                is_pure_virtual: false,
            }),
        );
        graph.add(
            point,
            "operator+",
            None,
            DeclKind::Function(Callable {
                flavor: CallableFlavor::Operator("+".into()),
                return_type: Some(TypeRef::new("::point")),
                arguments: vec![Argument { name: None, ty: TypeRef::new("::point const &"), default: None }],
                is_static: false,
                is_const: true,
                is_virtual: false,
                is_pure_virtual: false,
            }),
        );
        graph.add(point, "x", None, DeclKind::Variable { ty: TypeRef::new("int"), is_static: false });
        graph.add(point, "origin", None, DeclKind::Variable { ty: TypeRef::new("::point const"), is_static: true });

        let text = render_all(&graph);
        assert!(text.contains("point_exposer_t( \"point\", bp::no_init )"));
        assert!(text.contains("point_exposer.def( bp::init< int, bp::optional< int > >(( bp::arg(\"x\"), bp::arg(\"y\")=0 )) );"));
        assert!(text.contains("point_exposer.def( bp::self + bp::self );"));
        assert!(text.contains("point_exposer.def_readwrite( \"x\", &::point::x );"));
        assert!(text.contains("point_exposer.add_static_property( \"origin\", bp::make_getter( &::point::origin ) );"));
    }

    #[test]
    fn test_overloads_spell_out_their_type() {
        let mut graph = DeclGraph::new();
        let global = graph.global();
        graph.add(global, "scale", None, method("void", &[("double", None)], (false, false)));
        graph.add(global, "scale", None, method("void", &[("int", None)], (false, false)));

        let text = render_all(&graph);
        assert!(text.contains("typedef void ( *scale_function_type )( double );"));
        assert!(text.contains("bp::def( \"scale\", scale_function_type( &::scale ), ( bp::arg(\"p6\") ) );"));
    }

    #[test]
    fn test_prelude_with_extra_includes() {
        let mut tree = CreatorTree::new();
        let root = tree.root();
        tree.append(root, CreatorKind::License("// licensed".into()), None);
        tree.append(root, CreatorKind::Include("boost/python.hpp".into()), None);
        tree.append(root, CreatorKind::NamespaceAlias { alias: "bp".into(), target: "boost::python".into() }, None);

        let prelude = render_prelude(&tree, &["unit.pypp.hpp".to_string()]);
        assert_eq!(
            prelude,
            "// licensed\n#include \"boost/python.hpp\"\n#include \"unit.pypp.hpp\"\nnamespace bp = boost::python;"
        );
    }
}

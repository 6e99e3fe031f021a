use crate::error::{GraphError, Result};
use crate::scope::{CommentGroup, Scope, ScopeCall, SourceUnit};
use crate::types::*;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tree_sitter::{Node, Parser, Tree};

/// Prefix for keys of functions outside the analyzed program
pub const EXTERNAL_PREFIX: &str = "extern::";

/// Options controlling how Rust sources are turned into a call graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Top-level function names treated as the program entry
    pub entry_functions: Vec<String>,

    /// Attributes marking a function as a module initializer (e.g. `#[ctor]`)
    pub initializer_attributes: Vec<String>,

    /// Function or method names whose function-valued arguments start a new unit of work
    pub spawn_functions: Vec<String>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            entry_functions: vec!["main".to_string()],
            initializer_attributes: vec!["ctor".to_string()],
            spawn_functions: vec![
                "spawn".to_string(),
                "spawn_blocking".to_string(),
                "spawn_local".to_string(),
            ],
        }
    }
}

/// Call graph plus per-file nesting, produced by [`ProgramBuilder::build`]
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub graph: CallGraph,
    pub units: Vec<SourceUnit>,
}

struct ParsedFile {
    path: String,
    source: String,
    tree: Tree,
}

/// Build a whole-program call graph from Rust sources
pub struct ProgramBuilder {
    options: BuildOptions,
    parser: Parser,
    files: Vec<ParsedFile>,
}

impl ProgramBuilder {
    pub fn new(options: BuildOptions) -> Result<Self> {
        let mut parser = Parser::new();
        let ts_lang: tree_sitter::Language = tree_sitter_rust::LANGUAGE.into();
        parser
            .set_language(&ts_lang)
            .map_err(|e| GraphError::tree_sitter(format!("Failed to set language: {e}")))?;

        Ok(Self {
            options,
            parser,
            files: Vec::new(),
        })
    }

    /// Parse one source file; `path` is how positions will name it
    pub fn add_source(&mut self, path: impl Into<String>, source: impl Into<String>) -> Result<()> {
        let path = path.into();
        let source = source.into();
        let tree = self
            .parser
            .parse(&source, None)
            .ok_or_else(|| GraphError::parse(&path, "Failed to parse source"))?;

        if tree.root_node().has_error() {
            log::warn!("{path}: syntax errors, call graph may be incomplete");
        }

        self.files.push(ParsedFile { path, source, tree });
        Ok(())
    }

    /// Read and parse a file; a leading `./` is dropped from its name
    pub fn add_file(&mut self, path: &Path) -> Result<()> {
        let source = std::fs::read_to_string(path)?;
        let name = path.strip_prefix(".").unwrap_or(path);
        self.add_source(name.display().to_string(), source)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Build graph and scope trees from all added sources
    pub fn build(self) -> Program {
        let mut graph = CallGraph::new();

        // Phase 1: Create nodes for all declarations
        let mut index = DeclIndex::default();
        for (file_idx, file) in self.files.iter().enumerate() {
            let mut collector = DeclCollector {
                options: &self.options,
                file,
                file_idx,
                graph: &mut graph,
                index: &mut index,
            };
            collector.collect(file.tree.root_node(), &[], None);
        }

        // Phase 2: Resolve calls, add edges and literals
        let mut units = Vec::with_capacity(self.files.len());
        for (file_idx, file) in self.files.iter().enumerate() {
            let mut walker = CallWalker {
                options: &self.options,
                file,
                file_idx,
                graph: &mut graph,
                index: &index,
                spawned: HashMap::new(),
                literal_counts: HashMap::new(),
            };
            let mut calls = Vec::new();
            let mut scopes = Vec::new();
            walker.walk(file.tree.root_node(), None, &mut calls, &mut scopes);

            units.push(SourceUnit {
                path: file.path.clone(),
                comments: comment_groups(file),
                scopes,
            });
        }

        log::info!(
            "Built call graph: {} functions, {} calls from {} files",
            graph.node_count(),
            graph.edge_count(),
            self.files.len()
        );

        Program { graph, units }
    }
}

#[derive(Debug, Clone)]
struct DeclInfo {
    file_idx: usize,
    impl_target: Option<String>,
}

/// Name lookup tables filled in phase 1
#[derive(Default)]
struct DeclIndex {
    by_node: HashMap<(usize, usize), NodeIndex>,
    info: HashMap<NodeIndex, DeclInfo>,
    free_by_name: HashMap<String, Vec<NodeIndex>>,
    methods_by_name: HashMap<String, Vec<NodeIndex>>,
    qualified: HashMap<String, Vec<NodeIndex>>,
}

impl DeclIndex {
    fn resolve_simple(&self, name: &str, file_idx: usize) -> Option<NodeIndex> {
        let candidates = self.free_by_name.get(name)?;
        let local: Vec<_> = candidates
            .iter()
            .filter(|idx| self.info.get(*idx).map(|i| i.file_idx) == Some(file_idx))
            .collect();
        match (local.as_slice(), candidates.as_slice()) {
            ([only], _) => Some(**only),
            (_, [only]) => Some(*only),
            _ => None,
        }
    }

    fn resolve_path(&self, path: &str, file_idx: usize, self_type: Option<&str>) -> Option<NodeIndex> {
        let segments: Vec<&str> = path
            .split("::")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .skip_while(|s| matches!(*s, "crate" | "self" | "super"))
            .map(|s| match (s, self_type) {
                ("Self", Some(target)) => target,
                _ => s,
            })
            .collect();

        match segments.as_slice() {
            [] => None,
            [name] => self.resolve_simple(name, file_idx),
            _ => (0..segments.len() - 1).find_map(|start| {
                match self.qualified.get(&segments[start..].join("::"))?.as_slice() {
                    [only] => Some(*only),
                    _ => None,
                }
            }),
        }
    }

    fn resolve_method(&self, name: &str) -> Option<NodeIndex> {
        match self.methods_by_name.get(name)?.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }
}

struct DeclCollector<'a> {
    options: &'a BuildOptions,
    file: &'a ParsedFile,
    file_idx: usize,
    graph: &'a mut CallGraph,
    index: &'a mut DeclIndex,
}

impl DeclCollector<'_> {
    fn collect(&mut self, node: Node, scope_path: &[String], impl_target: Option<&str>) {
        let file = self.file;
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();

        for child in children {
            match child.kind() {
                "function_item" => {
                    let Some(name) = field_text(child, "name", &file.source) else {
                        continue;
                    };
                    self.add_declaration(child, name, scope_path, impl_target);

                    let mut nested_path = scope_path.to_vec();
                    nested_path.push(name.to_string());
                    self.collect(child, &nested_path, None);
                }
                "impl_item" => {
                    let target = child
                        .child_by_field_name("type")
                        .and_then(|ty| base_type_name(ty, &file.source));
                    self.collect(child, scope_path, target.as_deref());
                }
                "trait_item" => {
                    let target = field_text(child, "name", &file.source).map(str::to_string);
                    self.collect(child, scope_path, target.as_deref());
                }
                "mod_item" => {
                    let mut nested_path = scope_path.to_vec();
                    if let Some(name) = field_text(child, "name", &file.source) {
                        nested_path.push(name.to_string());
                    }
                    self.collect(child, &nested_path, None);
                }
                _ => self.collect(child, scope_path, impl_target),
            }
        }
    }

    fn add_declaration(&mut self, node: Node, name: &str, scope_path: &[String], impl_target: Option<&str>) {
        let file = self.file;
        let leading = leading_trivia(node, &file.source);

        let mut segments = scope_path.to_vec();
        if let Some(target) = impl_target {
            segments.push(target.to_string());
        }
        segments.push(name.to_string());
        let qualified = segments.join("::");

        let role = if scope_path.is_empty()
            && impl_target.is_none()
            && self.options.entry_functions.iter().any(|e| e == name)
        {
            FunctionRole::Entry
        } else if leading
            .attributes
            .iter()
            .any(|attr| attribute_matches(attr, &self.options.initializer_attributes))
        {
            FunctionRole::Initializer
        } else {
            FunctionRole::Declared
        };

        let display_name = match impl_target {
            Some(target) => format!("{target}::{name}"),
            None => name.to_string(),
        };
        // Same-named methods from separate impl blocks (e.g. two `From` impls) get `#2`, `#3`, ...
        let base_key = format!("{}::{qualified}", file.path);
        let mut key = base_key.clone();
        let mut occurrence = 1;
        while self.graph.find(&EntityKey::new(key.as_str())).is_some() {
            occurrence += 1;
            key = format!("{base_key}#{occurrence}");
        }
        if occurrence > 1 {
            log::debug!("Declaration {base_key} repeats; keyed as {key}");
        }

        let function = Function::program(key, display_name, role)
            .with_position(position(&file.path, node))
            .with_doc(leading.comments);
        let idx = self.graph.add_function(function);

        self.index.by_node.insert((self.file_idx, node.id()), idx);
        self.index.info.insert(
            idx,
            DeclInfo {
                file_idx: self.file_idx,
                impl_target: impl_target.map(str::to_string),
            },
        );

        if impl_target.is_some() {
            self.index
                .methods_by_name
                .entry(name.to_string())
                .or_default()
                .push(idx);
        } else {
            self.index
                .free_by_name
                .entry(name.to_string())
                .or_default()
                .push(idx);
        }

        // Qualified aliases: every suffix with at least two segments, plus the file stem as module
        let mut aliases: Vec<String> = (0..segments.len().saturating_sub(1))
            .map(|start| segments[start..].join("::"))
            .collect();
        if let Some(stem) = Path::new(&file.path).file_stem().and_then(|s| s.to_str()) {
            if !matches!(stem, "main" | "lib" | "mod") {
                aliases.push(format!("{stem}::{qualified}"));
            }
        }
        for alias in aliases {
            self.index.qualified.entry(alias).or_default().push(idx);
        }
    }
}

/// Function currently owning the walked code
#[derive(Clone)]
struct Owner {
    idx: NodeIndex,
    name: String,
    impl_target: Option<String>,
}

enum CallTarget {
    Path(String),
    Method(String),
    Indirect,
}

struct CallWalker<'a> {
    options: &'a BuildOptions,
    file: &'a ParsedFile,
    file_idx: usize,
    graph: &'a mut CallGraph,
    index: &'a DeclIndex,
    /// Closure or async block node id -> position of the spawn call receiving it
    spawned: HashMap<usize, Position>,
    literal_counts: HashMap<NodeIndex, usize>,
}

impl CallWalker<'_> {
    fn walk(&mut self, node: Node, owner: Option<&Owner>, calls: &mut Vec<ScopeCall>, scopes: &mut Vec<Scope>) {
        match node.kind() {
            "function_item" => {
                let Some(&idx) = self.index.by_node.get(&(self.file_idx, node.id())) else {
                    return;
                };
                let function = self.graph.function(idx);
                let owner = Owner {
                    idx,
                    name: function.name.clone(),
                    impl_target: self.index.info.get(&idx).and_then(|i| i.impl_target.clone()),
                };
                let mut scope = Scope::declaration(function.key.clone(), line_of(node));
                if let Some(body) = node.child_by_field_name("body") {
                    self.walk_children(body, Some(&owner), &mut scope.calls, &mut scope.children);
                }
                scopes.push(scope);
            }
            "closure_expression" | "async_block" => {
                let Some(owner) = owner else {
                    self.walk_children(node, None, calls, scopes);
                    return;
                };
                let literal = self.add_literal(node, owner);
                let mut scope = Scope::literal(line_of(node));
                self.walk_children(node, Some(&literal), &mut scope.calls, &mut scope.children);
                scopes.push(scope);
            }
            "call_expression" => {
                if let Some(owner) = owner {
                    self.visit_call(node, owner, calls);
                }
                self.walk_children(node, owner, calls, scopes);
            }
            _ => self.walk_children(node, owner, calls, scopes),
        }
    }

    fn walk_children(&mut self, node: Node, owner: Option<&Owner>, calls: &mut Vec<ScopeCall>, scopes: &mut Vec<Scope>) {
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();
        for child in children {
            self.walk(child, owner, calls, scopes);
        }
    }

    fn add_literal(&mut self, node: Node, owner: &Owner) -> Owner {
        let count = self.literal_counts.entry(owner.idx).or_insert(0);
        *count += 1;
        let n = *count;

        let owner_key = self.graph.function(owner.idx).key.clone();
        let name = format!("{}${n}", owner.name);
        let function = Function::program(format!("{owner_key}${n}"), name.clone(), FunctionRole::Literal)
            .with_position(position(&self.file.path, node));
        let idx = self.graph.add_function(function);

        let edge = match self.spawned.remove(&node.id()) {
            Some(spawn_pos) => CallEdge::spawn(spawn_pos),
            None => CallEdge::direct(position(&self.file.path, node)),
        };
        self.graph.add_call(owner.idx, idx, edge);

        Owner {
            idx,
            name,
            impl_target: owner.impl_target.clone(),
        }
    }

    fn visit_call(&mut self, node: Node, owner: &Owner, calls: &mut Vec<ScopeCall>) {
        let Some(function) = node.child_by_field_name("function") else {
            return;
        };
        let arguments = node.child_by_field_name("arguments");
        let call_pos = position(&self.file.path, arguments.unwrap_or(node));

        let target = self.call_target(function);
        let spawn_name = match &target {
            CallTarget::Path(path) => path.rsplit("::").next().map(str::trim),
            CallTarget::Method(name) => Some(name.as_str()),
            CallTarget::Indirect => None,
        };
        let is_spawn = spawn_name.is_some_and(|name| self.options.spawn_functions.iter().any(|s| s == name));

        match &target {
            CallTarget::Path(path) => {
                let resolved = self.index.resolve_path(path, self.file_idx, owner.impl_target.as_deref());
                calls.push(ScopeCall {
                    name: path.clone(),
                    callee: resolved.map(|idx| self.graph.function(idx).key.clone()),
                    position: call_pos.clone(),
                });

                match resolved {
                    Some(callee) => {
                        self.graph.add_call(owner.idx, callee, CallEdge::direct(call_pos.clone()));
                    }
                    None if path.contains("::") => {
                        let callee = self.graph.add_function(Function::external(
                            format!("{EXTERNAL_PREFIX}{path}"),
                            path.clone(),
                        ));
                        self.graph.add_call(owner.idx, callee, CallEdge::direct(call_pos.clone()));
                    }
                    None => log::debug!("{call_pos}: call of local value {path} skipped"),
                }
            }
            CallTarget::Method(name) => match self.index.resolve_method(name) {
                Some(callee) => {
                    self.graph.add_call(owner.idx, callee, CallEdge::direct(call_pos.clone()));
                }
                None => log::debug!("{call_pos}: unresolved method call .{name}() skipped"),
            },
            CallTarget::Indirect => log::debug!("{call_pos}: indirect call skipped"),
        }

        if is_spawn {
            if let Some(arguments) = arguments {
                self.mark_spawned(arguments, owner, &call_pos);
            }
        }
    }

    fn mark_spawned(&mut self, arguments: Node, owner: &Owner, spawn_pos: &Position) {
        let mut cursor = arguments.walk();
        let args: Vec<_> = arguments.named_children(&mut cursor).collect();
        for arg in args {
            match arg.kind() {
                "closure_expression" | "async_block" => {
                    self.spawned.insert(arg.id(), spawn_pos.clone());
                }
                "identifier" | "scoped_identifier" => {
                    let Ok(path) = arg.utf8_text(self.file.source.as_bytes()) else {
                        continue;
                    };
                    if let Some(target) =
                        self.index
                            .resolve_path(path, self.file_idx, owner.impl_target.as_deref())
                    {
                        self.graph.add_call(owner.idx, target, CallEdge::spawn(spawn_pos.clone()));
                    }
                }
                _ => {}
            }
        }
    }

    fn call_target(&self, function: Node) -> CallTarget {
        let source = self.file.source.as_bytes();
        match function.kind() {
            "identifier" | "scoped_identifier" => function
                .utf8_text(source)
                .map(|text| CallTarget::Path(text.to_string()))
                .unwrap_or(CallTarget::Indirect),
            "field_expression" => function
                .child_by_field_name("field")
                .and_then(|field| field.utf8_text(source).ok())
                .map(|name| CallTarget::Method(name.to_string()))
                .unwrap_or(CallTarget::Indirect),
            "generic_function" => function
                .child_by_field_name("function")
                .map(|inner| self.call_target(inner))
                .unwrap_or(CallTarget::Indirect),
            _ => CallTarget::Indirect,
        }
    }
}

/// Comments and attributes directly above an item
#[derive(Default)]
struct LeadingTrivia {
    comments: Vec<String>,
    attributes: Vec<String>,
}

/// Collect the contiguous run of `//` comments and attributes above `node`.
/// A blank line or any other item ends the run.
fn leading_trivia(node: Node, source: &str) -> LeadingTrivia {
    let mut trivia = LeadingTrivia::default();
    let mut expected_row = node.start_position().row;
    let mut current = node.prev_sibling();

    while let Some(sibling) = current {
        let end_row = match sibling.kind() {
            // Line comments may include the trailing newline in their range
            "line_comment" => sibling.start_position().row,
            _ => sibling.end_position().row,
        };
        if end_row + 1 != expected_row {
            break;
        }
        let Ok(text) = sibling.utf8_text(source.as_bytes()) else {
            break;
        };
        match sibling.kind() {
            "line_comment" if starts_line(sibling, source) => {
                trivia.comments.push(text.trim_end().to_string());
            }
            "attribute_item" => trivia.attributes.push(text.to_string()),
            _ => break,
        }
        expected_row = sibling.start_position().row;
        current = sibling.prev_sibling();
    }

    trivia.comments.reverse();
    trivia.attributes.reverse();
    trivia
}

/// Whether only whitespace precedes `node` on its line
fn starts_line(node: Node, source: &str) -> bool {
    let start = node.start_byte();
    let line_start = source[..start].rfind('\n').map_or(0, |i| i + 1);
    source[line_start..start].trim().is_empty()
}

/// `#[ctor]`, `#[ctor::ctor]`, `#[ctor(unsafe)]` all match "ctor"
fn attribute_matches(attribute: &str, names: &[String]) -> bool {
    let inner = attribute
        .trim()
        .trim_start_matches("#[")
        .trim_end_matches(']');
    let path = inner.split(['(', '=']).next().unwrap_or("").trim();
    let last = path.rsplit("::").next().unwrap_or(path);
    names.iter().any(|name| name == path || name == last)
}

fn comment_groups(file: &ParsedFile) -> Vec<CommentGroup> {
    let mut comments = Vec::new();
    collect_comments(file.tree.root_node(), &file.source, &mut comments);
    comments.sort_by_key(|(row, _)| *row);

    let mut groups: Vec<CommentGroup> = Vec::new();
    for (row, text) in comments {
        let line = row + 1;
        match groups.last_mut() {
            Some(group) if group.end_line + 1 == line => {
                group.end_line = line;
                group.lines.push(text);
            }
            _ => groups.push(CommentGroup {
                start_line: line,
                end_line: line,
                lines: vec![text],
            }),
        }
    }
    groups
}

fn collect_comments(node: Node, source: &str, out: &mut Vec<(usize, String)>) {
    if node.kind() == "line_comment" {
        if let Ok(text) = node.utf8_text(source.as_bytes()) {
            out.push((node.start_position().row, text.trim_end().to_string()));
        }
        return;
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_comments(child, source, out);
    }
}

fn field_text<'s>(node: Node, field: &str, source: &'s str) -> Option<&'s str> {
    node.child_by_field_name(field)?
        .utf8_text(source.as_bytes())
        .ok()
}

/// Base name of an impl target: `Pool<T>` -> `Pool`, `crate::pool::Pool` -> `Pool`
fn base_type_name(ty: Node, source: &str) -> Option<String> {
    match ty.kind() {
        "type_identifier" => ty.utf8_text(source.as_bytes()).ok().map(str::to_string),
        "generic_type" | "scoped_type_identifier" => {
            let inner = ty
                .child_by_field_name("type")
                .or_else(|| ty.child_by_field_name("name"))?;
            base_type_name(inner, source)
        }
        _ => None,
    }
}

fn position(file: &str, node: Node) -> Position {
    let point = node.start_position();
    Position::new(file, point.row + 1, point.column + 1)
}

fn line_of(node: Node) -> usize {
    node.start_position().row + 1
}

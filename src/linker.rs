//! Module linker
//!
//! Walks the static import graph from an entry, strips TypeScript from every module,
//! rewrites ES module syntax into calls against a small module registry, applies
//! `define` substitutions, and concatenates everything into one script.
//!
//! Rewriting works on source spans: each module is printed back to JavaScript, parsed
//! again, and edited with `(start, end, replacement)` triples.
//!
//! Installed packages are linked like any other module; `require("x")` calls with a
//! literal specifier are rewritten too, so CommonJS packages link their own imports.
//! Externals stay host `require`s in CommonJS output and become namespace imports in
//! ES module output.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, CallExpression, ExportDefaultDeclarationKind, Expression, ImportDeclarationSpecifier,
    Statement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_codegen::Codegen;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::{GetSpan, SourceType, Span};
use oxc_transformer::{TransformOptions, Transformer};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::analyze::{declared_names, export_name, is_identifier, join_errors};
use crate::config::{BundlerConfig, OutputFormat};
use crate::define::{DefineCollector, Defines};
use crate::errors::BuildError;
use crate::files::FileSystem;
use crate::resolve::{is_path_specifier, ModuleResolver};

/// Display name of an in-memory entry.
pub const STDIN: &str = "<stdin>";

const DEFAULT_BINDING: &str = "__default_export";

/// Registry helpers shared by every module in a bundle.
const RUNTIME: &str = r#"var __cache = [];
function __require(id) {
  var cached = __cache[id];
  if (cached) return cached.exports;
  var module = (__cache[id] = { exports: {} });
  __modules[id](module, module.exports, __require);
  return module.exports;
}
function __export(target, getters) {
  for (var name in getters) Object.defineProperty(target, name, { enumerable: true, get: getters[name] });
}
function __reexport(target, source) {
  Object.keys(source).forEach(function (name) {
    if (name !== "default" && !Object.prototype.hasOwnProperty.call(target, name)) {
      Object.defineProperty(target, name, { enumerable: true, get: function () { return source[name]; } });
    }
  });
}
function __default(mod) {
  return mod && (mod.__esModule || mod[Symbol.toStringTag] === "Module") ? mod.default : mod;
}
"#;

/// Where linking starts.
pub enum Entry<'a> {
    /// In-memory TypeScript whose relative imports resolve against `resolve_dir`.
    Buffer { code: &'a str, resolve_dir: &'a Path },
    File(&'a Path),
}

#[derive(Debug, Clone)]
pub struct LinkedModule {
    pub id: usize,
    pub name: String,
    pub body: String,
    pub exports: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LinkOutput {
    pub code: String,
    pub modules: usize,
    pub entry_exports: Vec<String>,
}

enum Dependency {
    Internal(usize),
    External(String),
}

/// `require("x")` calls with a single string literal argument.
#[derive(Default)]
struct RequireCalls {
    calls: Vec<(Span, String)>,
}

impl<'a> Visit<'a> for RequireCalls {
    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Expression::Identifier(callee) = &call.callee {
            if callee.name == "require" && call.arguments.len() == 1 {
                if let Some(Argument::StringLiteral(specifier)) = call.arguments.first() {
                    self.calls.push((call.span, specifier.value.to_string()));
                }
            }
        }
        walk::walk_call_expression(self, call);
    }
}

#[derive(Default)]
struct ModuleRewrite {
    edits: Vec<(u32, u32, String)>,
    getters: Vec<(String, String)>,
    bindings: usize,
    /// Set once an import or export statement is seen.
    esm: bool,
}

impl ModuleRewrite {
    fn next_binding(&mut self) -> String {
        let binding = format!("__import_{}", self.bindings);
        self.bindings += 1;
        binding
    }

    fn replace(&mut self, span: Span, text: String) {
        self.edits.push((span.start, span.end, text));
    }

    fn export(&mut self, name: String, value: String) {
        self.getters.push((name, value));
    }

    fn prologue(&self) -> String {
        let marker = if self.esm {
            "Object.defineProperty(exports, \"__esModule\", { value: true });\n"
        } else {
            ""
        };
        if self.getters.is_empty() {
            return marker.to_string();
        }
        let getters = self
            .getters
            .iter()
            .map(|(name, value)| format!("{}: () => {value}", quote(name)))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{marker}__export(exports, {{ {getters} }});\n")
    }
}

pub struct Linker<'l, F: FileSystem> {
    resolver: &'l ModuleResolver<F>,
    config: &'l BundlerConfig,
    defines: &'l Defines,
    modules: Vec<Option<LinkedModule>>,
    ids: HashMap<PathBuf, usize>,
    pending: VecDeque<(usize, PathBuf)>,
    externals: Vec<String>,
}

impl<'l, F: FileSystem> Linker<'l, F> {
    pub fn new(resolver: &'l ModuleResolver<F>, config: &'l BundlerConfig, defines: &'l Defines) -> Self {
        Self {
            resolver,
            config,
            defines,
            modules: Vec::new(),
            ids: HashMap::new(),
            pending: VecDeque::new(),
            externals: Vec::new(),
        }
    }

    pub fn link(mut self, entry: Entry) -> Result<LinkOutput, BuildError> {
        self.modules.push(None);
        let entry_module = match entry {
            Entry::Buffer { code, resolve_dir } => {
                let source_type = SourceType::default().with_typescript(true).with_module(true);
                self.compile_module(0, STDIN.to_string(), code, resolve_dir, source_type)?
            }
            Entry::File(path) => {
                self.ids.insert(canonical(path), 0);
                self.load_module(0, path)?
            }
        };
        self.modules[0] = Some(entry_module);

        while let Some((id, path)) = self.pending.pop_front() {
            let module = self.load_module(id, &path)?;
            self.modules[id] = Some(module);
        }

        Ok(self.render())
    }

    fn load_module(&mut self, id: usize, path: &Path) -> Result<LinkedModule, BuildError> {
        let code = fs::read_to_string(path).map_err(|source| BuildError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let name = path.display().to_string();

        if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str::<serde_json::Value>(&code).map_err(|e| BuildError::Syntax {
                file: name.clone(),
                message: e.to_string(),
            })?;
            return Ok(LinkedModule {
                id,
                name,
                body: format!("module.exports = {};", code.trim()),
                exports: Vec::new(),
            });
        }

        let source_type = SourceType::from_path(path)
            .map_err(|_| BuildError::Syntax {
                file: name.clone(),
                message: "unsupported file extension".to_string(),
            })?
            .with_module(true);
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        self.compile_module(id, name, &code, &dir, source_type)
    }

    fn compile_module(
        &mut self,
        id: usize,
        name: String,
        code: &str,
        dir: &Path,
        source_type: SourceType,
    ) -> Result<LinkedModule, BuildError> {
        let js = transpile(code, &name, source_type, self.config)?;

        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, &js, SourceType::default().with_module(true)).parse();
        if !ret.errors.is_empty() {
            return Err(BuildError::Syntax {
                file: name,
                message: join_errors(&ret.errors),
            });
        }

        let mut rewrite = ModuleRewrite::default();
        for stmt in &ret.program.body {
            self.rewrite_statement(stmt, dir, &name, &mut rewrite)?;
        }

        let mut requires = RequireCalls::default();
        requires.visit_program(&ret.program);
        for (span, specifier) in requires.calls {
            // A require that resolves nowhere is left to the host.
            if let Ok(dependency) = self.dependency(&specifier, dir, &name) {
                let required = self.require(&dependency);
                rewrite.replace(span, required);
            }
        }

        let mut collector = DefineCollector::new(self.defines);
        collector.visit_program(&ret.program);
        if let Some(key) = collector.conflicts.into_iter().next() {
            return Err(BuildError::IncompatibleDefine { file: name, key });
        }
        rewrite.edits.extend(collector.replacements);

        let exports = rewrite.getters.iter().map(|(n, _)| n.clone()).collect();
        let body = format!("{}{}", rewrite.prologue(), apply_replacements(&js, rewrite.edits));
        debug!(module = %name, id, "linked module");

        Ok(LinkedModule {
            id,
            name,
            body,
            exports,
        })
    }

    fn rewrite_statement(
        &mut self,
        stmt: &Statement,
        dir: &Path,
        importer: &str,
        rewrite: &mut ModuleRewrite,
    ) -> Result<(), BuildError> {
        if matches!(
            stmt,
            Statement::ImportDeclaration(_)
                | Statement::ExportNamedDeclaration(_)
                | Statement::ExportDefaultDeclaration(_)
                | Statement::ExportAllDeclaration(_)
        ) {
            rewrite.esm = true;
        }
        match stmt {
            Statement::ImportDeclaration(decl) => {
                let dependency = self.dependency(decl.source.value.as_str(), dir, importer)?;
                let binding = rewrite.next_binding();
                let mut code = format!("const {binding} = {};", self.require(&dependency));
                if let Some(specifiers) = &decl.specifiers {
                    for specifier in specifiers {
                        let line = match specifier {
                            ImportDeclarationSpecifier::ImportSpecifier(s) => format!(
                                " const {} = {};",
                                s.local.name,
                                member(&binding, &export_name(&s.imported))
                            ),
                            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                                format!(" const {} = __default({binding});", s.local.name)
                            }
                            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                format!(" const {} = {binding};", s.local.name)
                            }
                        };
                        code.push_str(&line);
                    }
                }
                rewrite.replace(decl.span, code);
            }
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(source) = &decl.source {
                    let dependency = self.dependency(source.value.as_str(), dir, importer)?;
                    let binding = rewrite.next_binding();
                    for specifier in &decl.specifiers {
                        let value = member(&binding, &export_name(&specifier.local));
                        rewrite.export(export_name(&specifier.exported), value);
                    }
                    let required = self.require(&dependency);
                    rewrite.replace(decl.span, format!("const {binding} = {required};"));
                } else if let Some(declaration) = &decl.declaration {
                    let mut names = Vec::new();
                    declared_names(declaration, &mut names);
                    for name in names {
                        rewrite.export(name.clone(), name);
                    }
                    rewrite
                        .edits
                        .push((decl.span.start, declaration.span().start, String::new()));
                } else {
                    for specifier in &decl.specifiers {
                        rewrite.export(export_name(&specifier.exported), export_name(&specifier.local));
                    }
                    rewrite.replace(decl.span, String::new());
                }
            }
            Statement::ExportDefaultDeclaration(decl) => {
                let start = decl.declaration.span().start;
                let named = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                        func.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                        class.id.as_ref().map(|id| id.name.to_string())
                    }
                    _ => None,
                };
                match named {
                    Some(name) => {
                        rewrite.export("default".to_string(), name);
                        rewrite.edits.push((decl.span.start, start, String::new()));
                    }
                    None => {
                        rewrite.export("default".to_string(), DEFAULT_BINDING.to_string());
                        rewrite
                            .edits
                            .push((decl.span.start, start, format!("const {DEFAULT_BINDING} = ")));
                        rewrite.edits.push((decl.span.end, decl.span.end, ";".to_string()));
                    }
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                let dependency = self.dependency(decl.source.value.as_str(), dir, importer)?;
                let binding = rewrite.next_binding();
                let required = self.require(&dependency);
                let code = match &decl.exported {
                    Some(name) => {
                        rewrite.export(export_name(name), binding.clone());
                        format!("const {binding} = {required};")
                    }
                    None => format!("const {binding} = {required}; __reexport(exports, {binding});"),
                };
                rewrite.replace(decl.span, code);
            }
            _ => {}
        }
        Ok(())
    }

    fn dependency(&mut self, specifier: &str, dir: &Path, importer: &str) -> Result<Dependency, BuildError> {
        if !self.config.bundle || self.config.external.iter().any(|e| e == specifier) {
            return Ok(Dependency::External(specifier.to_string()));
        }

        if is_path_specifier(specifier) {
            let path = self
                .resolver
                .resolve_module(specifier, dir)
                .ok_or_else(|| BuildError::Unresolved {
                    specifier: specifier.to_string(),
                    importer: importer.to_string(),
                })?;
            return Ok(Dependency::Internal(self.module_id(path)));
        }

        if has_source_extension(specifier) {
            if let Some(path) = self.resolver.resolve(specifier, dir) {
                return Ok(Dependency::Internal(self.module_id(path)));
            }
        }
        // Built-ins and packages that are not installed load at run time.
        match self.resolver.resolve_package(specifier, dir) {
            Some(path) => Ok(Dependency::Internal(self.module_id(path))),
            None => Ok(Dependency::External(specifier.to_string())),
        }
    }

    /// The expression a module evaluates to load `dependency`.
    fn require(&mut self, dependency: &Dependency) -> String {
        match dependency {
            Dependency::Internal(id) => format!("__require({id})"),
            Dependency::External(specifier) => match self.config.format {
                OutputFormat::Cjs => format!("require({})", quote(specifier)),
                OutputFormat::Esm => {
                    let index = match self.externals.iter().position(|e| e == specifier) {
                        Some(index) => index,
                        None => {
                            self.externals.push(specifier.clone());
                            self.externals.len() - 1
                        }
                    };
                    format!("__external_{index}")
                }
            },
        }
    }

    fn module_id(&mut self, path: PathBuf) -> usize {
        let key = canonical(&path);
        if let Some(id) = self.ids.get(&key) {
            return *id;
        }
        let id = self.modules.len();
        self.modules.push(None);
        self.ids.insert(key, id);
        self.pending.push_back((id, path));
        id
    }

    fn render(self) -> LinkOutput {
        let modules: Vec<LinkedModule> = self.modules.into_iter().flatten().collect();
        let entry_exports = modules
            .first()
            .map(|m| m.exports.clone())
            .unwrap_or_default();

        let mut code = String::new();
        if self.config.format == OutputFormat::Esm {
            for (index, specifier) in self.externals.iter().enumerate() {
                code.push_str(&format!("import * as __external_{index} from {};\n", quote(specifier)));
            }
        }
        code.push_str(RUNTIME);
        code.push_str("var __modules = [\n");
        for module in &modules {
            code.push_str(&format!(
                "// [{}] {}\nfunction (module, exports, __require) {{\n{}\n}},\n",
                module.id, module.name, module.body
            ));
        }
        code.push_str("];\n");

        match self.config.format {
            OutputFormat::Cjs => code.push_str("module.exports = __require(0);\n"),
            OutputFormat::Esm => {
                code.push_str("var __entry = __require(0);\n");
                for name in &entry_exports {
                    if name == "default" {
                        code.push_str("export default __entry.default;\n");
                    } else if is_identifier(name) {
                        code.push_str(&format!("export var {name} = __entry.{name};\n"));
                    }
                }
            }
        }

        LinkOutput {
            code,
            modules: modules.len(),
            entry_exports,
        }
    }
}

/// Strip TypeScript and lower syntax to the configured target.
fn transpile(
    code: &str,
    name: &str,
    source_type: SourceType,
    config: &BundlerConfig,
) -> Result<String, BuildError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, source_type).parse();
    if !ret.errors.is_empty() {
        return Err(BuildError::Syntax {
            file: name.to_string(),
            message: join_errors(&ret.errors),
        });
    }
    let mut program = ret.program;

    let mut options =
        TransformOptions::from_target(&config.target).map_err(|err| BuildError::InvalidTarget {
            target: config.target.clone(),
            message: err.to_string(),
        })?;
    options.typescript.only_remove_type_imports = !config.tree_shaking;

    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    let ret = Transformer::new(&allocator, Path::new(name), &options)
        .build_with_scoping(scoping, &mut program);
    if !ret.errors.is_empty() {
        return Err(BuildError::Transform {
            file: name.to_string(),
            message: join_errors(&ret.errors),
        });
    }

    Ok(Codegen::new().build(&program).code)
}

/// Apply non-overlapping span edits. Edits starting inside an earlier edit are dropped.
pub fn apply_replacements(source: &str, mut edits: Vec<(u32, u32, String)>) -> String {
    edits.sort_by_key(|(start, end, _)| (*start, *end));
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0usize;
    for (start, end, text) in edits {
        let (start, end) = (start as usize, end as usize);
        if start < cursor {
            continue;
        }
        out.push_str(&source[cursor..start]);
        out.push_str(&text);
        cursor = end;
    }
    out.push_str(&source[cursor..]);
    out
}

fn member(object: &str, name: &str) -> String {
    if is_identifier(name) {
        format!("{object}.{name}")
    } else {
        format!("{object}[{}]", quote(name))
    }
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

fn has_source_extension(specifier: &str) -> bool {
    [".ts", ".tsx", ".mts", ".js", ".mjs", ".json"]
        .iter()
        .any(|ext| specifier.ends_with(ext))
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

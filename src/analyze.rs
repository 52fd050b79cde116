//! Source Analyzer
//!
//! Static inspection of handler modules: the exported surface and whether a default
//! export is present. Results are derived from the file's current content on every
//! call.

use lazy_static::lazy_static;
use oxc_allocator::Allocator;
use oxc_ast::ast::{
    BindingPattern, Declaration, ModuleExportName, Program, Statement, TSModuleDeclarationName,
};
use oxc_parser::Parser;
use oxc_span::SourceType;
use regex::Regex;
use std::collections::HashSet;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::AnalysisError;
use crate::resolve::{is_path_specifier, ModuleResolver};

lazy_static! {
    static ref DEFAULT_EXPORT: Regex = Regex::new(r"export\s+default\s+").unwrap();
    static ref DEFAULT_SPECIFIER: Regex =
        Regex::new(r"export\s*\{[^}]*\bas\s+default\b[^}]*\}").unwrap();
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap();
}

/// Top-level exported names of `filepath` in declaration order, without duplicates.
///
/// Type-only exports count, and `export * from "./local"` contributes the names of the
/// re-exported module (minus `default`).
pub fn get_exported_variable_names(filepath: &Path) -> Result<Vec<String>, AnalysisError> {
    let mut names = Vec::new();
    let mut visited = HashSet::new();
    collect_exports(filepath, &mut names, &mut visited, false)?;
    Ok(names)
}

/// Textual check for a default export. Cheap, and not a semantic guarantee.
pub fn has_default_export(filepath: &Path) -> Result<bool, AnalysisError> {
    let buffer = read_source(filepath)?;
    Ok(DEFAULT_EXPORT.is_match(&buffer) || DEFAULT_SPECIFIER.is_match(&buffer))
}

fn collect_exports(
    filepath: &Path,
    names: &mut Vec<String>,
    visited: &mut HashSet<PathBuf>,
    skip_default: bool,
) -> Result<(), AnalysisError> {
    let key = fs::canonicalize(filepath).unwrap_or_else(|_| filepath.to_path_buf());
    if !visited.insert(key) {
        return Ok(());
    }

    let source = read_source(filepath)?;
    let allocator = Allocator::default();
    let program = parse_program(&allocator, &source, filepath)?;

    let push = |name: String, names: &mut Vec<String>| {
        if skip_default && name == "default" {
            return;
        }
        if !names.contains(&name) {
            names.push(name);
        }
    };

    let dir = filepath.parent().unwrap_or_else(|| Path::new(""));
    for stmt in &program.body {
        match stmt {
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(declaration) = &decl.declaration {
                    let mut declared = Vec::new();
                    declared_names(declaration, &mut declared);
                    for name in declared {
                        push(name, names);
                    }
                }
                for specifier in &decl.specifiers {
                    push(export_name(&specifier.exported), names);
                }
            }
            Statement::ExportDefaultDeclaration(_) => push("default".to_string(), names),
            Statement::ExportAllDeclaration(decl) => match &decl.exported {
                Some(exported) => push(export_name(exported), names),
                None => {
                    let specifier = decl.source.value.as_str();
                    if !is_path_specifier(specifier) {
                        continue;
                    }
                    if let Some(target) = ModuleResolver::new().resolve_module(specifier, dir) {
                        let mut star = Vec::new();
                        collect_exports(&target, &mut star, visited, true)?;
                        for name in star {
                            push(name, names);
                        }
                    }
                }
            },
            _ => {}
        }
    }
    Ok(())
}

pub(crate) fn read_source(filepath: &Path) -> Result<String, AnalysisError> {
    fs::read_to_string(filepath).map_err(|source| AnalysisError::Read {
        path: filepath.to_path_buf(),
        source,
    })
}

/// Parse a module, treating any parser diagnostic as a failure.
pub(crate) fn parse_program<'a>(
    allocator: &'a Allocator,
    source: &'a str,
    filepath: &Path,
) -> Result<Program<'a>, AnalysisError> {
    let source_type = SourceType::from_path(filepath)
        .unwrap_or_else(|_| SourceType::default().with_typescript(true))
        .with_module(true);
    let ret = Parser::new(allocator, source, source_type).parse();
    if !ret.errors.is_empty() {
        return Err(AnalysisError::Parse {
            path: filepath.to_path_buf(),
            message: join_errors(&ret.errors),
        });
    }
    Ok(ret.program)
}

pub(crate) fn join_errors<E: Display>(errors: &[E]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub(crate) fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(s) => s.value.to_string(),
    }
}

/// Names introduced by a declaration, including TypeScript type declarations.
pub(crate) fn declared_names(declaration: &Declaration, names: &mut Vec<String>) {
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for decl in &var.declarations {
                collect_binding_names(&decl.id, names);
            }
        }
        Declaration::FunctionDeclaration(func) => {
            if let Some(id) = &func.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::TSTypeAliasDeclaration(alias) => names.push(alias.id.name.to_string()),
        Declaration::TSInterfaceDeclaration(iface) => names.push(iface.id.name.to_string()),
        Declaration::TSEnumDeclaration(decl) => names.push(decl.id.name.to_string()),
        // `declare module "x"` names no binding.
        Declaration::TSModuleDeclaration(module) => {
            if let TSModuleDeclarationName::Identifier(id) = &module.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::TSImportEqualsDeclaration(decl) => names.push(decl.id.name.to_string()),
        _ => {}
    }
}

pub(crate) fn collect_binding_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match pattern {
        BindingPattern::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPattern::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_binding_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::ArrayPattern(arr) => {
            for elem in arr.elements.iter().flatten() {
                collect_binding_names(elem, names);
            }
            if let Some(rest) = &arr.rest {
                collect_binding_names(&rest.argument, names);
            }
        }
        BindingPattern::AssignmentPattern(assign) => collect_binding_names(&assign.left, names),
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

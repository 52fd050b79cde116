//! Schema Validator
//!
//! Structural check of one exported function or object against a [`Schema`]. Types are
//! compared by their written annotation text; nothing is inferred. Every finding becomes
//! a [`Message`] in traversal order and the caller decides what is fatal.

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrowFunctionExpression, BindingPattern, Declaration, ExportDefaultDeclarationKind,
    Expression, FormalParameters, Function, ImportDeclarationSpecifier, ObjectPropertyKind,
    Program, Statement,
    TSInterfaceDeclaration, TSSignature, TSType, TSTypeAliasDeclaration, TSTypeAnnotation,
    VariableDeclaration,
};
use oxc_ast_visit::Visit;
use oxc_span::{GetSpan, Span};
use std::path::Path;

use crate::analyze::{export_name, get_exported_variable_names, parse_program, read_source};
use crate::resolve::{is_path_specifier, ModuleResolver};
use crate::schema::{location_of, Location, Message, Schema};

struct Param {
    name: String,
    optional: bool,
    annotation: Option<String>,
    span: Span,
}

struct Member {
    name: String,
    optional: bool,
    annotation: Option<String>,
}

enum Shape {
    Callable {
        params: Vec<Param>,
        returns: Option<(String, Span)>,
        is_async: bool,
    },
    Object {
        members: Vec<Member>,
    },
    Opaque(&'static str),
    Reexport(String),
}

struct Export {
    span: Span,
    /// Written type of a `const` export, if any.
    annotation: Option<String>,
    shape: Shape,
}

/// Check the export `function_name` of `filepath` against `schema`.
///
/// `declared_type_name` is the type the export is expected to be declared as; it is
/// compared with the annotation of `const` exports and names the export in messages.
pub fn type_check(
    filepath: &Path,
    declared_type_name: &str,
    function_name: &str,
    schema: &Schema,
) -> Vec<Message> {
    let source = match read_source(filepath) {
        Ok(source) => source,
        Err(err) => return vec![Message::error(err.to_string(), None)],
    };
    let allocator = Allocator::default();
    let program = match parse_program(&allocator, &source, filepath) {
        Ok(program) => program,
        Err(err) => return vec![Message::error(err.to_string(), None)],
    };

    let mut checker = Checker {
        file: filepath.display().to_string(),
        source: &source,
        declared_type_name,
        subject: format!("{declared_type_name} \"{function_name}\""),
        messages: Vec::new(),
    };

    let dir = filepath.parent().unwrap_or_else(|| Path::new(""));
    match find_export(&program, &source, function_name, dir) {
        Some(export) => checker.check(&export, schema),
        None => {
            let location = checker.location(0);
            checker.error(
                format!("{} is missing: \"{function_name}\" is not exported", checker.subject),
                location,
            );
        }
    }
    checker.messages
}

struct Checker<'s> {
    file: String,
    source: &'s str,
    declared_type_name: &'s str,
    subject: String,
    messages: Vec<Message>,
}

impl Checker<'_> {
    fn location(&self, offset: u32) -> Option<Location> {
        Some(location_of(&self.file, self.source, offset))
    }

    fn error(&mut self, description: String, location: Option<Location>) {
        self.messages.push(Message::error(description, location));
    }

    fn warning(&mut self, description: String, location: Option<Location>) {
        self.messages.push(Message::warning(description, location));
    }

    fn check(&mut self, export: &Export, schema: &Schema) {
        let at_export = self.location(export.span.start);

        if let Some(annotation) = &export.annotation {
            if !same_type(annotation, self.declared_type_name) {
                self.warning(
                    format!(
                        "{} is declared as `{annotation}`, expected `{}`",
                        self.subject, self.declared_type_name
                    ),
                    at_export.clone(),
                );
            }
        }

        let wants_callable = !schema.parameters.is_empty() || schema.returns.is_some();
        let wants_fields = !schema.fields.is_empty();

        match &export.shape {
            Shape::Callable {
                params,
                returns,
                is_async,
            } => {
                if wants_callable {
                    self.check_parameters(params, schema, export.span);
                    self.check_return(returns.as_ref(), *is_async, schema, export.span);
                }
                if wants_fields {
                    self.error(
                        format!("{} must be an object, found a function", self.subject),
                        at_export,
                    );
                }
            }
            Shape::Object { members } => {
                if wants_callable {
                    self.error(
                        format!("{} must be a function, found an object", self.subject),
                        at_export.clone(),
                    );
                }
                if wants_fields {
                    self.check_fields(members, schema, export.span);
                }
            }
            Shape::Opaque(kind) => {
                if wants_callable || wants_fields {
                    self.warning(
                        format!("{} is a {kind} and cannot be checked structurally", self.subject),
                        at_export,
                    );
                }
            }
            Shape::Reexport(source) => self.messages.push(Message {
                severity: crate::schema::Severity::Info,
                description: format!("{} is re-exported from \"{source}\" and was not checked", self.subject),
                location: at_export,
            }),
        }
    }

    fn check_parameters(&mut self, params: &[Param], schema: &Schema, span: Span) {
        for (index, expected) in schema.parameters.iter().enumerate() {
            let Some(actual) = params.get(index) else {
                if expected.required {
                    let location = self.location(span.start);
                    self.error(
                        format!(
                            "{} is missing required parameter \"{}\" at position {}",
                            self.subject,
                            expected.name,
                            index + 1
                        ),
                        location,
                    );
                }
                continue;
            };

            let Some(expected_type) = &expected.type_name else {
                continue;
            };
            let location = self.location(actual.span.start);
            match &actual.annotation {
                None => self.warning(
                    format!(
                        "parameter \"{}\" of {} has no type annotation, expected `{expected_type}`",
                        actual.name, self.subject
                    ),
                    location,
                ),
                Some(annotation) if !same_type(annotation, expected_type) => self.error(
                    format!(
                        "parameter \"{}\" of {} is typed `{annotation}`, expected `{expected_type}`",
                        actual.name, self.subject
                    ),
                    location,
                ),
                Some(_) => {}
            }
        }

        for actual in params.iter().skip(schema.parameters.len()) {
            if !actual.optional {
                let location = self.location(actual.span.start);
                self.warning(
                    format!(
                        "{} declares unexpected parameter \"{}\"",
                        self.subject, actual.name
                    ),
                    location,
                );
            }
        }
    }

    fn check_return(
        &mut self,
        returns: Option<&(String, Span)>,
        is_async: bool,
        schema: &Schema,
        span: Span,
    ) {
        let Some(expected) = &schema.returns else {
            return;
        };

        if is_async && !expected.allow_async {
            let location = self.location(span.start);
            self.error(format!("{} must not be async", self.subject), location);
        }

        let Some((annotation, span)) = returns else {
            return;
        };
        let mismatch = split_union(annotation).into_iter().any(|member| {
            let member = if expected.allow_async {
                unwrap_promise(member)
            } else {
                member
            };
            !expected.type_names.iter().any(|t| same_type(t, member))
        });
        if mismatch {
            let location = self.location(span.start);
            self.error(
                format!(
                    "{} returns `{annotation}`, expected `{}`",
                    self.subject,
                    expected.type_names.join(" | ")
                ),
                location,
            );
        }
    }

    fn check_fields(&mut self, members: &[Member], schema: &Schema, span: Span) {
        let location = self.location(span.start);
        for field in &schema.fields {
            let Some(member) = members.iter().find(|m| m.name == field.name) else {
                if field.required {
                    self.error(
                        format!("{} is missing required field \"{}\"", self.subject, field.name),
                        location.clone(),
                    );
                }
                continue;
            };

            if field.required && member.optional {
                self.warning(
                    format!("field \"{}\" of {} is optional but required", field.name, self.subject),
                    location.clone(),
                );
            }
            if let (Some(expected), Some(annotation)) = (&field.type_name, &member.annotation) {
                if !same_type(annotation, expected) {
                    self.error(
                        format!(
                            "field \"{}\" of {} is typed `{annotation}`, expected `{expected}`",
                            field.name, self.subject
                        ),
                        location.clone(),
                    );
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPORT LOOKUP
// ═══════════════════════════════════════════════════════════════════════════════

fn find_export(program: &Program, source: &str, name: &str, dir: &Path) -> Option<Export> {
    for stmt in &program.body {
        match stmt {
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(declaration) = &decl.declaration {
                    if let Some(export) = declaration_export(declaration, source, name) {
                        return Some(export);
                    }
                }
                for specifier in &decl.specifiers {
                    if export_name(&specifier.exported) != name {
                        continue;
                    }
                    if let Some(module) = &decl.source {
                        return Some(reexport(specifier.span, module.value.as_str()));
                    }
                    let local = export_name(&specifier.local);
                    return program
                        .body
                        .iter()
                        .find_map(|stmt| statement_export(stmt, source, &local));
                }
            }
            Statement::ExportDefaultDeclaration(decl) if name == "default" => {
                let span = decl.declaration.span();
                let shape = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(func) => function_shape(func, source),
                    ExportDefaultDeclarationKind::ClassDeclaration(_) => Shape::Opaque("class"),
                    ExportDefaultDeclarationKind::TSInterfaceDeclaration(iface) => interface_shape(iface, source),
                    other => match other.as_expression() {
                        Some(expr) => expression_shape(expr, source),
                        None => Shape::Opaque("declaration"),
                    },
                };
                return Some(Export {
                    span,
                    annotation: None,
                    shape,
                });
            }
            Statement::ExportAllDeclaration(decl) => {
                if let Some(exported) = &decl.exported {
                    if export_name(exported) == name {
                        return Some(reexport(decl.span, decl.source.value.as_str()));
                    }
                }
            }
            _ => {}
        }
    }

    // `export * from "./local"` never forwards `default`.
    if name == "default" {
        return None;
    }
    program.body.iter().find_map(|stmt| match stmt {
        Statement::ExportAllDeclaration(decl) if decl.exported.is_none() => {
            let specifier = decl.source.value.as_str();
            if !is_path_specifier(specifier) {
                return None;
            }
            let target = ModuleResolver::new().resolve_module(specifier, dir)?;
            let names = get_exported_variable_names(&target).ok()?;
            names
                .iter()
                .any(|exported| exported == name)
                .then(|| reexport(decl.span, specifier))
        }
        _ => None,
    })
}

fn reexport(span: Span, module: &str) -> Export {
    Export {
        span,
        annotation: None,
        shape: Shape::Reexport(module.to_string()),
    }
}

fn statement_export(stmt: &Statement, source: &str, name: &str) -> Option<Export> {
    match stmt {
        Statement::FunctionDeclaration(func) => named_function(func, source, name),
        Statement::VariableDeclaration(var) => variable_export(var, source, name),
        Statement::ClassDeclaration(class) => class
            .id
            .as_ref()
            .filter(|id| id.name == name)
            .map(|_| opaque(class.span, "class")),
        Statement::TSInterfaceDeclaration(iface) if iface.id.name == name => Some(Export {
            span: iface.span,
            annotation: None,
            shape: interface_shape(iface, source),
        }),
        Statement::TSTypeAliasDeclaration(alias) if alias.id.name == name => Some(alias_export(alias, source)),
        Statement::ExportNamedDeclaration(decl) => decl
            .declaration
            .as_ref()
            .and_then(|declaration| declaration_export(declaration, source, name)),
        Statement::ImportDeclaration(import) => import
            .specifiers
            .iter()
            .flatten()
            .find(|specifier| import_local(specifier) == name)
            .map(|specifier| reexport(specifier.span(), import.source.value.as_str())),
        _ => None,
    }
}

fn import_local<'a>(specifier: &'a ImportDeclarationSpecifier<'_>) -> &'a str {
    match specifier {
        ImportDeclarationSpecifier::ImportSpecifier(s) => s.local.name.as_str(),
        ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => s.local.name.as_str(),
        ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => s.local.name.as_str(),
    }
}

fn declaration_export(declaration: &Declaration, source: &str, name: &str) -> Option<Export> {
    match declaration {
        Declaration::FunctionDeclaration(func) => named_function(func, source, name),
        Declaration::VariableDeclaration(var) => variable_export(var, source, name),
        Declaration::ClassDeclaration(class) => class
            .id
            .as_ref()
            .filter(|id| id.name == name)
            .map(|_| opaque(class.span, "class")),
        Declaration::TSInterfaceDeclaration(iface) if iface.id.name == name => Some(Export {
            span: iface.span,
            annotation: None,
            shape: interface_shape(iface, source),
        }),
        Declaration::TSTypeAliasDeclaration(alias) if alias.id.name == name => Some(alias_export(alias, source)),
        _ => None,
    }
}

fn opaque(span: Span, kind: &'static str) -> Export {
    Export {
        span,
        annotation: None,
        shape: Shape::Opaque(kind),
    }
}

fn named_function(func: &Function, source: &str, name: &str) -> Option<Export> {
    let id = func.id.as_ref()?;
    (id.name == name).then(|| Export {
        span: func.span,
        annotation: None,
        shape: function_shape(func, source),
    })
}

fn variable_export(var: &VariableDeclaration, source: &str, name: &str) -> Option<Export> {
    let declarator = var.declarations.iter().find(|d| match &d.id {
        BindingPattern::BindingIdentifier(id) => id.name == name,
        _ => false,
    })?;

    // The annotation sits between the binding and the initializer.
    let end = declarator
        .init
        .as_ref()
        .map(|init| init.span().start)
        .unwrap_or(declarator.span.end);
    let between = text(source, Span::new(declarator.id.span().end, end));
    let annotation = between
        .trim()
        .trim_start_matches('!')
        .trim_start()
        .strip_prefix(':')
        .map(|rest| rest.trim().trim_end_matches('=').trim().to_string())
        .filter(|s| !s.is_empty());

    let shape = match &declarator.init {
        Some(init) => expression_shape(init, source),
        None => Shape::Opaque("declaration without initializer"),
    };
    Some(Export {
        span: declarator.span,
        annotation,
        shape,
    })
}

fn alias_export(alias: &TSTypeAliasDeclaration, source: &str) -> Export {
    let shape = match &alias.type_annotation {
        TSType::TSTypeLiteral(literal) => Shape::Object {
            members: signature_members(&literal.members, source),
        },
        TSType::TSFunctionType(func) => Shape::Callable {
            params: parameters(&func.params, source),
            returns: Some(annotation_text(&func.return_type, source)),
            is_async: false,
        },
        _ => Shape::Opaque("type alias"),
    };
    Export {
        span: alias.span,
        annotation: None,
        shape,
    }
}

fn expression_shape(expr: &Expression, source: &str) -> Shape {
    let mut expr = expr;
    loop {
        expr = match expr {
            Expression::ParenthesizedExpression(e) => &e.expression,
            Expression::TSAsExpression(e) => &e.expression,
            Expression::TSSatisfiesExpression(e) => &e.expression,
            _ => break,
        };
    }

    match expr {
        Expression::ArrowFunctionExpression(arrow) => arrow_shape(arrow, source),
        Expression::FunctionExpression(func) => function_shape(func, source),
        Expression::ObjectExpression(object) => Shape::Object {
            members: object
                .properties
                .iter()
                .filter_map(|prop| match prop {
                    ObjectPropertyKind::ObjectProperty(p) => p.key.static_name().map(|name| Member {
                        name: name.to_string(),
                        optional: false,
                        annotation: None,
                    }),
                    ObjectPropertyKind::SpreadProperty(_) => None,
                })
                .collect(),
        },
        Expression::CallExpression(_) => Shape::Opaque("call result"),
        Expression::ClassExpression(_) => Shape::Opaque("class"),
        _ => Shape::Opaque("value"),
    }
}

fn function_shape(func: &Function, source: &str) -> Shape {
    Shape::Callable {
        params: parameters(&func.params, source),
        returns: func.return_type.as_ref().map(|t| annotation_text(t, source)),
        is_async: func.r#async,
    }
}

fn arrow_shape(arrow: &ArrowFunctionExpression, source: &str) -> Shape {
    Shape::Callable {
        params: parameters(&arrow.params, source),
        returns: arrow.return_type.as_ref().map(|t| annotation_text(t, source)),
        is_async: arrow.r#async,
    }
}

fn interface_shape(iface: &TSInterfaceDeclaration, source: &str) -> Shape {
    Shape::Object {
        members: signature_members(&iface.body.body, source),
    }
}

fn signature_members(signatures: &[TSSignature], source: &str) -> Vec<Member> {
    signatures
        .iter()
        .filter_map(|signature| match signature {
            TSSignature::TSPropertySignature(prop) => prop.key.static_name().map(|name| Member {
                name: name.to_string(),
                optional: prop.optional,
                annotation: prop
                    .type_annotation
                    .as_ref()
                    .map(|t| annotation_text(t, source).0),
            }),
            TSSignature::TSMethodSignature(method) => method.key.static_name().map(|name| Member {
                name: name.to_string(),
                optional: method.optional,
                annotation: None,
            }),
            _ => None,
        })
        .collect()
}

/// Finds the first type annotation starting at or after `after`.
struct AnnotationFinder {
    after: u32,
    found: Option<(Span, Span)>,
}

impl<'a> Visit<'a> for AnnotationFinder {
    fn visit_ts_type_annotation(&mut self, it: &TSTypeAnnotation<'a>) {
        if self.found.is_none() && it.span.start >= self.after {
            self.found = Some((it.span, it.type_annotation.span()));
        }
    }
}

fn parameters(params: &FormalParameters, source: &str) -> Vec<Param> {
    params
        .items
        .iter()
        .map(|param| {
            let pattern_span = param.pattern.span();
            let name = match &param.pattern {
                BindingPattern::BindingIdentifier(id) => id.name.to_string(),
                _ => text(source, pattern_span).to_string(),
            };

            let mut finder = AnnotationFinder {
                after: pattern_span.end,
                found: None,
            };
            finder.visit_formal_parameter(param);

            let (annotation, tail_start) = match finder.found {
                Some((outer, inner)) => (Some(text(source, inner).to_string()), outer.end),
                None => (None, pattern_span.end),
            };
            let marker = text(source, Span::new(pattern_span.end, param.span.end));
            let optional = marker.trim_start().starts_with('?')
                || text(source, Span::new(tail_start, param.span.end)).contains('=')
                || matches!(param.pattern, BindingPattern::AssignmentPattern(_));

            Param {
                name,
                optional,
                annotation,
                span: param.span,
            }
        })
        .collect()
}

fn annotation_text(annotation: &TSTypeAnnotation, source: &str) -> (String, Span) {
    let span = annotation.type_annotation.span();
    (text(source, span).to_string(), span)
}

fn text(source: &str, span: Span) -> &str {
    let start = (span.start as usize).min(source.len());
    let end = (span.end as usize).clamp(start, source.len());
    &source[start..end]
}

// ═══════════════════════════════════════════════════════════════════════════════
// TYPE TEXT COMPARISON
// ═══════════════════════════════════════════════════════════════════════════════

fn normalize(ty: &str) -> String {
    ty.chars().filter(|c| !c.is_whitespace()).collect()
}

fn same_type(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

/// Split a union at its top level: `A | Promise<B | C>` → [`A`, `Promise<B | C>`].
fn split_union(ty: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut prev = ' ';
    for (i, c) in ty.char_indices() {
        match c {
            '<' | '(' | '{' | '[' => depth += 1,
            // The arrow of a function type closes nothing.
            '>' if prev == '=' => {}
            '>' | ')' | '}' | ']' => depth -= 1,
            '|' if depth == 0 => {
                parts.push(ty[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
        prev = c;
    }
    parts.push(ty[start..].trim());
    parts.into_iter().filter(|p| !p.is_empty()).collect()
}

fn unwrap_promise(ty: &str) -> &str {
    let ty = ty.trim();
    ty.strip_prefix("Promise<")
        .and_then(|rest| rest.strip_suffix('>'))
        .map(str::trim)
        .unwrap_or(ty)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_union() {
        assert_eq!(
            split_union("Response | Promise<Response | null>"),
            vec!["Response", "Promise<Response | null>"]
        );
        assert_eq!(split_union("| A"), vec!["A"]);
        assert_eq!(split_union("(() => A) | B"), vec!["(() => A)", "B"]);
        assert_eq!(
            split_union("((req: Request) => Promise<Response>) | null"),
            vec!["((req: Request) => Promise<Response>)", "null"]
        );
    }

    #[test]
    fn test_unwrap_promise() {
        assert_eq!(unwrap_promise("Promise< Response >"), "Response");
        assert_eq!(unwrap_promise("Response"), "Response");
    }

    #[test]
    fn test_same_type_ignores_whitespace() {
        assert!(same_type("Record<string, string>", "Record<string,string>"));
        assert!(!same_type("Request", "Response"));
    }
}

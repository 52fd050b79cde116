//! Compile-time substitutions (`define`).
//!
//! A key is a dotted global path such as `process.env` or `DEBUG`; each matching
//! expression is replaced with the parenthesized value text. Outer matches win, so
//! `process.env.NODE_ENV` is preferred over `process.env` when both are defined.

use lazy_static::lazy_static;
use oxc_ast::ast::{Expression, SimpleAssignmentTarget};
use oxc_ast_visit::{walk, Visit};
use oxc_span::GetSpan;
use regex::Regex;
use std::collections::BTreeMap;

use crate::env::{snapshot, EnvironmentVariables};
use crate::errors::BuildError;

/// Expression the environment snapshot is substituted for.
pub const PROCESS_ENV: &str = "process.env";

lazy_static! {
    static ref DOTTED_PATH: Regex =
        Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*(\.[A-Za-z_$][A-Za-z0-9_$]*)*$").unwrap();
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Defines {
    entries: BTreeMap<String, String>,
}

impl Defines {
    pub fn new(entries: BTreeMap<String, String>) -> Result<Self, BuildError> {
        if let Some(key) = entries.keys().find(|key| !DOTTED_PATH.is_match(key)) {
            return Err(BuildError::InvalidDefine { key: key.clone() });
        }
        Ok(Self { entries })
    }

    /// User defines plus the environment snapshot, which always takes `process.env`.
    pub fn with_environment(
        user: &BTreeMap<String, String>,
        variables: &EnvironmentVariables,
    ) -> Result<Self, BuildError> {
        let mut entries = user.clone();
        entries.insert(PROCESS_ENV.to_string(), snapshot(variables));
        Self::new(entries)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Collects `(start, end, replacement)` edits for every defined expression.
pub struct DefineCollector<'d> {
    defines: &'d Defines,
    pub replacements: Vec<(u32, u32, String)>,
    /// Defined keys used as assignment targets.
    pub conflicts: Vec<String>,
}

impl<'d> DefineCollector<'d> {
    pub fn new(defines: &'d Defines) -> Self {
        Self {
            defines,
            replacements: Vec::new(),
            conflicts: Vec::new(),
        }
    }
}

impl<'a, 'd> Visit<'a> for DefineCollector<'d> {
    fn visit_expression(&mut self, expr: &Expression<'a>) {
        if let Some(path) = dotted_path(expr) {
            if let Some(value) = self.defines.get(&path) {
                let span = expr.span();
                self.replacements
                    .push((span.start, span.end, format!("({value})")));
                return;
            }
        }
        walk::walk_expression(self, expr);
    }

    fn visit_simple_assignment_target(&mut self, target: &SimpleAssignmentTarget<'a>) {
        let path = match target {
            SimpleAssignmentTarget::AssignmentTargetIdentifier(id) => Some(id.name.to_string()),
            SimpleAssignmentTarget::StaticMemberExpression(member) => {
                dotted_path(&member.object).map(|object| format!("{object}.{}", member.property.name))
            }
            _ => None,
        };
        if let Some(path) = path {
            if self.defines.get(&path).is_some() {
                self.conflicts.push(path);
                return;
            }
        }
        walk::walk_simple_assignment_target(self, target);
    }
}

fn dotted_path(expr: &Expression) -> Option<String> {
    match expr {
        Expression::Identifier(id) => Some(id.name.to_string()),
        Expression::StaticMemberExpression(member) => {
            dotted_path(&member.object).map(|object| format!("{object}.{}", member.property.name))
        }
        Expression::ComputedMemberExpression(member) => match &member.expression {
            Expression::StringLiteral(key) => {
                dotted_path(&member.object).map(|object| format!("{object}.{}", key.value))
            }
            _ => None,
        },
        Expression::ParenthesizedExpression(paren) => dotted_path(&paren.expression),
        _ => None,
    }
}

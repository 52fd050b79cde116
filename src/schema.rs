//! Structural schemas and the diagnostics produced when checking against them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Expected shape of an exported function or object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Positional parameters, for callable exports.
    #[serde(default)]
    pub parameters: Vec<ParameterSchema>,
    #[serde(default)]
    pub returns: Option<ReturnSchema>,
    /// Members, for object, interface or type literal exports.
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterSchema {
    pub name: String,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default = "required")]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnSchema {
    /// Accepted return types; each member of a union must be one of these.
    pub type_names: Vec<String>,
    /// Whether `async` functions and `Promise<T>` returns are accepted.
    #[serde(default)]
    pub allow_async: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSchema {
    pub name: String,
    #[serde(default)]
    pub type_name: Option<String>,
    #[serde(default = "required")]
    pub required: bool,
}

fn required() -> bool {
    true
}

impl ParameterSchema {
    pub fn new(name: &str, type_name: Option<&str>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.map(str::to_string),
            required,
        }
    }
}

impl FieldSchema {
    pub fn new(name: &str, type_name: Option<&str>, required: bool) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.map(str::to_string),
            required,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// A non-fatal finding. Ordered collections of these are returned, never thrown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Message {
    pub fn error(description: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            severity: Severity::Error,
            description: description.into(),
            location,
        }
    }

    pub fn warning(description: impl Into<String>, location: Option<Location>) -> Self {
        Self {
            severity: Severity::Warning,
            description: description.into(),
            location,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}:{}:{}: {}", loc.file, loc.line, loc.column, self.description),
            None => f.write_str(&self.description),
        }
    }
}

/// True when any message carries error severity.
pub fn has_errors(messages: &[Message]) -> bool {
    messages.iter().any(Message::is_error)
}

/// 1-based line/column of a byte offset.
pub fn location_of(file: &str, source: &str, offset: u32) -> Location {
    let offset = (offset as usize).min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() as u32 + 1;
    let column = match before.rfind('\n') {
        Some(newline) => before[newline + 1..].chars().count(),
        None => before.chars().count(),
    } as u32
        + 1;
    Location {
        file: file.to_string(),
        line,
        column,
    }
}

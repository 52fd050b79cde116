//! Endpoint discovery.
//!
//! Every `index.ts` / `index.js` below `<input>/routes` is one endpoint module. Its
//! directory path relative to `routes` is the route: `[id]` is a dynamic parameter and
//! `[...rest]` a catch-all.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Directory under the input root holding endpoint modules.
pub const ROUTES_DIR: &str = "routes";

const ENTRY_FILES: &[&str] = &["index.ts", "index.js"];

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTES
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "camelCase")]
pub enum Segment {
    Static(String),
    Param(String),
    CatchAll(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix('[').and_then(|s| s.strip_suffix(']')) {
            Some(inner) => match inner.strip_prefix("...") {
                Some(rest) => Segment::CatchAll(rest.to_string()),
                None => Segment::Param(inner.to_string()),
            },
            None => Segment::Static(raw.to_string()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Static(name) => f.write_str(name),
            Segment::Param(name) => write!(f, "[{name}]"),
            Segment::CatchAll(name) => write!(f, "[...{name}]"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Route {
    pub segments: Vec<Segment>,
}

impl Route {
    /// Route for a module directory given relative to the routes root.
    pub fn from_relative(dir: &Path) -> Self {
        let segments = dir
            .components()
            .filter_map(|component| match component {
                Component::Normal(name) => Some(Segment::parse(&name.to_string_lossy())),
                _ => None,
            })
            .collect();
        Self { segments }
    }

    /// Directory-style name used in output layouts; the root route is `index`.
    pub fn name(&self) -> String {
        if self.segments.is_empty() {
            return "index".to_string();
        }
        self.segments
            .iter()
            .map(Segment::to_string)
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Path pattern in Express syntax, e.g. `/users/:id`.
    pub fn express_path(&self) -> String {
        let path: String = self
            .segments
            .iter()
            .map(|segment| match segment {
                Segment::Static(name) => format!("/{name}"),
                Segment::Param(name) => format!("/:{name}"),
                Segment::CatchAll(_) => "/*".to_string(),
            })
            .collect();
        if path.is_empty() {
            "/".to_string()
        } else {
            path
        }
    }

    /// Path in file-system routing syntax, e.g. `/users/[id]`.
    pub fn vercel_path(&self) -> String {
        format!("/{}", self.segments.iter().map(Segment::to_string).collect::<Vec<_>>().join("/"))
    }

    /// Names of the dynamic segments, in order.
    pub fn params(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Static(_) => None,
                Segment::Param(name) | Segment::CatchAll(name) => Some(name.as_str()),
            })
            .collect()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.vercel_path())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENDPOINT DISCOVERY
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub module: PathBuf,
    pub route: Route,
}

/// Endpoints under `<input>/routes`, ordered by route. A directory holding both entry
/// files uses `index.ts`. A missing routes directory yields nothing.
pub fn discover_endpoints(input: &Path) -> Vec<Endpoint> {
    let root = input.join(ROUTES_DIR);
    if !root.is_dir() {
        return Vec::new();
    }

    let mut found: BTreeMap<Route, PathBuf> = BTreeMap::new();
    for entry in WalkDir::new(&root).follow_links(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(error = %err, "skipping unreadable entry during discovery");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        let Some(rank) = ENTRY_FILES.iter().position(|f| *f == file_name) else {
            continue;
        };

        let path = entry.path();
        let dir = path
            .parent()
            .and_then(|parent| parent.strip_prefix(&root).ok())
            .unwrap_or_else(|| Path::new(""));
        let route = Route::from_relative(dir);

        let preferred = match found.get(&route) {
            Some(existing) => {
                let existing_rank = existing
                    .file_name()
                    .and_then(|name| ENTRY_FILES.iter().position(|f| *f == name.to_string_lossy()))
                    .unwrap_or(usize::MAX);
                rank < existing_rank
            }
            None => true,
        };
        if preferred {
            found.insert(route, path.to_path_buf());
        }
    }

    found
        .into_iter()
        .map(|(route, module)| Endpoint { module, route })
        .collect()
}

//! Module Resolver
//!
//! Maps an import path onto a file location. A path is looked up next to the importer
//! first, then in the shared dependency directory three levels above it. Package
//! specifiers are looked up in `node_modules` directories the same way.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::files::{FileSystem, OsFileSystem};

/// Shared dependency install directory, relative to a resolve directory.
pub const SHARED_DEPENDENCY_DIR: &str = "../../../node_modules";

const EXTENSIONS: &[&str] = &[".ts", ".tsx", ".mts", ".js", ".mjs", ".cjs", ".json"];
const INDEX_FILES: &[&str] = &["/index.ts", "/index.js"];

/// The entry fields of a `package.json` the resolver reads.
#[derive(Debug, Default, Deserialize)]
struct PackageManifest {
    main: Option<String>,
    module: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ModuleResolver<F: FileSystem = OsFileSystem> {
    fs: F,
}

impl ModuleResolver<OsFileSystem> {
    pub fn new() -> Self {
        Self { fs: OsFileSystem }
    }
}

impl<F: FileSystem> ModuleResolver<F> {
    pub fn with_file_system(fs: F) -> Self {
        Self { fs }
    }

    /// Resolve `path` against `resolve_dir`. Local siblings win over the shared
    /// dependency directory; `None` when neither candidate exists.
    pub fn resolve(&self, path: &str, resolve_dir: &Path) -> Option<PathBuf> {
        let local = self.fs.join(resolve_dir, path);
        if self.fs.exists(&local) {
            return Some(local);
        }

        let shared_dir = self.fs.join(resolve_dir, SHARED_DEPENDENCY_DIR);
        let shared = self.fs.join(&shared_dir, path);
        if self.fs.exists(&shared) {
            return Some(shared);
        }

        None
    }

    /// Resolve an import specifier the way the linker sees it: extensionless
    /// specifiers try the known source extensions and directory index files, and
    /// a `.js` specifier falls back to its TypeScript sibling.
    pub fn resolve_module(&self, specifier: &str, resolve_dir: &Path) -> Option<PathBuf> {
        find_source(specifier, |candidate| self.resolve(candidate, resolve_dir))
    }

    /// Resolve a package specifier (`pkg`, `@scope/pkg`, `pkg/sub/path`) to the file it
    /// loads. `node_modules` directories of `resolve_dir` and its ancestors are searched
    /// nearest first, then the shared dependency directory. The package entry is
    /// `main`, then `module`, then `index`.
    pub fn resolve_package(&self, specifier: &str, resolve_dir: &Path) -> Option<PathBuf> {
        let (name, subpath) = split_package(specifier)?;
        resolve_dir
            .ancestors()
            .map(|dir| self.fs.join(dir, "node_modules"))
            .chain(std::iter::once(self.fs.join(resolve_dir, SHARED_DEPENDENCY_DIR)))
            .map(|modules| self.fs.join(&modules, name))
            .find_map(|package| self.package_entry(&package, subpath))
    }

    fn package_entry(&self, package: &Path, subpath: Option<&str>) -> Option<PathBuf> {
        let inside = |candidate: &str| {
            let path = self.fs.join(package, candidate);
            self.fs.exists(&path).then_some(path)
        };
        if let Some(subpath) = subpath {
            return find_source(&format!("./{subpath}"), inside);
        }

        let manifest = self
            .fs
            .read_to_string(&self.fs.join(package, "package.json"))
            .ok()
            .and_then(|text| serde_json::from_str::<PackageManifest>(&text).ok());
        let entry = manifest.and_then(|m| m.main.or(m.module));
        entry
            .and_then(|entry| {
                let entry = entry.trim_start_matches("./").trim_end_matches('/');
                find_source(&format!("./{entry}"), inside)
            })
            .or_else(|| find_source("./index", inside))
    }
}

/// Try `specifier` as written when it has a known extension (a `.js` specifier falls
/// back to its `.ts` sibling), otherwise with each extension and index file appended.
fn find_source(specifier: &str, lookup: impl Fn(&str) -> Option<PathBuf>) -> Option<PathBuf> {
    if let Some(ext) = known_extension(specifier) {
        if let Some(found) = lookup(specifier) {
            return Some(found);
        }
        if ext == ".js" {
            let stem = &specifier[..specifier.len() - ext.len()];
            return lookup(&format!("{stem}.ts"));
        }
        return None;
    }

    EXTENSIONS
        .iter()
        .chain(INDEX_FILES)
        .find_map(|suffix| lookup(&format!("{specifier}{suffix}")))
}

/// Split a package specifier into its package name and the path inside it.
/// `node:` built-ins and malformed scopes are not packages.
fn split_package(specifier: &str) -> Option<(&str, Option<&str>)> {
    if specifier.is_empty() || specifier.starts_with("node:") || is_path_specifier(specifier) {
        return None;
    }
    let scoped = specifier.starts_with('@');
    let mut slashes = specifier.match_indices('/').map(|(i, _)| i);
    let split = if scoped { slashes.nth(1) } else { slashes.next() };
    let (name, subpath) = match split {
        Some(i) => (&specifier[..i], Some(&specifier[i + 1..])),
        None => (specifier, None),
    };
    if scoped && !name.contains('/') {
        return None;
    }
    Some((name, subpath.filter(|s| !s.is_empty())))
}

fn known_extension(specifier: &str) -> Option<&'static str> {
    EXTENSIONS
        .iter()
        .copied()
        .find(|ext| specifier.ends_with(ext))
}

/// Relative or absolute specifiers name files; everything else is a package.
pub fn is_path_specifier(specifier: &str) -> bool {
    specifier.starts_with("./")
        || specifier.starts_with("../")
        || specifier == "."
        || specifier == ".."
        || Path::new(specifier).is_absolute()
}

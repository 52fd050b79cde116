//! Bundle Emitter
//!
//! Turns an in-memory entry module into one deployable file: configuration layers are
//! merged, the environment snapshot replaces `process.env`, the import graph is linked,
//! the result is optionally minified, and the attribution footer closes the file.

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::Parser;
use oxc_span::SourceType;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::analyze::join_errors;
use crate::config::{BundlerConfig, BundlerOverrides, OutputFormat};
use crate::define::Defines;
use crate::env::{EnvironmentProvider, EnvironmentVariables};
use crate::errors::BuildError;
use crate::files::{FileSystem, OsFileSystem};
use crate::linker::{Entry, Linker, STDIN};
use crate::options::BuildOptions;
use crate::resolve::ModuleResolver;

/// One build call.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'r> {
    /// Entry module source, TypeScript allowed.
    pub buffer: &'r str,
    pub output: &'r Path,
    /// Directory the entry's relative imports resolve against.
    pub resolve: Option<&'r Path>,
    pub options: Option<&'r BuildOptions>,
    /// Per-call overrides; these beat the project's `developer.bundler.oxc`.
    pub overrides: Option<&'r BundlerOverrides>,
}

impl<'r> BuildRequest<'r> {
    pub fn new(buffer: &'r str, output: &'r Path) -> Self {
        Self {
            buffer,
            output,
            resolve: None,
            options: None,
            overrides: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildArtifact {
    pub output: PathBuf,
    pub bytes: usize,
    /// Hex SHA-256 of the written file.
    pub digest: String,
    /// Number of source modules linked into the file.
    pub modules: usize,
}

pub struct Bundler<'e, F: FileSystem = OsFileSystem> {
    resolver: ModuleResolver<F>,
    environment: &'e dyn EnvironmentProvider,
}

impl<'e> Bundler<'e> {
    pub fn new(environment: &'e dyn EnvironmentProvider) -> Self {
        Self {
            resolver: ModuleResolver::new(),
            environment,
        }
    }
}

impl<'e, F: FileSystem> Bundler<'e, F> {
    pub fn with_resolver(resolver: ModuleResolver<F>, environment: &'e dyn EnvironmentProvider) -> Self {
        Self {
            resolver,
            environment,
        }
    }

    pub fn resolver(&self) -> &ModuleResolver<F> {
        &self.resolver
    }

    pub fn build(&self, request: BuildRequest) -> Result<BuildArtifact, BuildError> {
        let config = BundlerConfig::merge(
            &BundlerConfig::default(),
            &[
                request.options.and_then(BuildOptions::bundler_overrides),
                request.overrides,
            ],
        );
        let variables = request
            .options
            .map(|options| self.environment.variables(options))
            .unwrap_or_else(EnvironmentVariables::new);
        let defines = Defines::with_environment(&config.define, &variables)?;

        debug!(
            output = %request.output.display(),
            format = ?config.format,
            minify = config.minify,
            variables = variables.len(),
            "building bundle"
        );

        let resolve_dir = request.resolve.unwrap_or_else(|| Path::new(""));
        let linked = Linker::new(&self.resolver, &config, &defines).link(Entry::Buffer {
            code: request.buffer,
            resolve_dir,
        })?;

        let mut code = if config.minify {
            minify(&linked.code, config.format)?
        } else {
            linked.code
        };
        if !code.is_empty() && !code.ends_with('\n') {
            code.push('\n');
        }
        code.push_str(&config.footer_text());
        code.push('\n');

        write_artifact(request.output, &code, config.allow_overwrite)?;

        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        let artifact = BuildArtifact {
            output: request.output.to_path_buf(),
            bytes: code.len(),
            digest: format!("{:x}", hasher.finalize()),
            modules: linked.modules,
        };
        info!(output = %artifact.output.display(), bytes = artifact.bytes, "wrote bundle");
        Ok(artifact)
    }
}

/// Reprint the linked bundle without whitespace or comments.
fn minify(code: &str, format: OutputFormat) -> Result<String, BuildError> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(format == OutputFormat::Esm);
    let ret = Parser::new(&allocator, code, source_type).parse();
    if !ret.errors.is_empty() {
        return Err(BuildError::Syntax {
            file: STDIN.to_string(),
            message: join_errors(&ret.errors),
        });
    }
    Ok(Codegen::new()
        .with_options(CodegenOptions::minify())
        .build(&ret.program)
        .code)
}

/// Write through a temporary sibling so `output` is either complete or untouched.
fn write_artifact(output: &Path, code: &str, allow_overwrite: bool) -> Result<(), BuildError> {
    if !allow_overwrite && output.exists() {
        return Err(BuildError::OutputExists {
            path: output.to_path_buf(),
        });
    }

    let write_error = |source: std::io::Error| BuildError::Write {
        path: output.to_path_buf(),
        source,
    };
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }

    let file_name = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "bundle".to_string());
    let temp = output.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));
    fs::write(&temp, code).map_err(write_error)?;
    if let Err(err) = fs::rename(&temp, output) {
        let _ = fs::remove_file(&temp);
        return Err(write_error(err));
    }
    Ok(())
}

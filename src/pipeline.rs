//! Per-module compilation: analyze → validate → extract → synthesize → emit.
//!
//! Validation findings are collected for the whole module before deciding whether to
//! stop; a module with error-severity messages is reported without an artifact.
//! Modules are independent and [`Compiler::compile_all`] builds them in parallel.

use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::analyze::{get_exported_variable_names, has_default_export};
use crate::bundle::{BuildArtifact, BuildRequest, Bundler};
use crate::discovery::{discover_endpoints, Endpoint, Route};
use crate::env::EnvironmentProvider;
use crate::errors::CompileError;
use crate::files::{FileSystem, OsFileSystem};
use crate::options::BuildOptions;
use crate::resolve::ModuleResolver;
use crate::sandbox::{Sandbox, SandboxOptions};
use crate::schema::{has_errors, Location, Message, ParameterSchema, ReturnSchema, Schema};
use crate::target::{EntrypointContext, HTTP_METHODS};
use crate::typecheck::type_check;

/// Type name request handlers are expected to be declared as.
pub const HANDLER_TYPE: &str = "RequestHandler";

/// `(request: Request, context?) => Response | Promise<Response>`
pub fn handler_schema() -> Schema {
    Schema {
        parameters: vec![
            ParameterSchema::new("request", Some("Request"), true),
            ParameterSchema::new("context", None, false),
        ],
        returns: Some(ReturnSchema {
            type_names: vec!["Response".to_string()],
            allow_async: true,
        }),
        fields: Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleReport {
    pub module: PathBuf,
    pub route: Route,
    pub messages: Vec<Message>,
    /// Extracted default export, when the module has one.
    pub config: Option<Value>,
    /// `None` when validation stopped the build.
    pub artifact: Option<BuildArtifact>,
}

impl ModuleReport {
    pub fn has_errors(&self) -> bool {
        has_errors(&self.messages)
    }
}

pub struct Compiler<'e, F: FileSystem = OsFileSystem> {
    options: &'e BuildOptions,
    bundler: Bundler<'e, F>,
    sandbox: SandboxOptions,
}

impl<'e> Compiler<'e> {
    pub fn new(options: &'e BuildOptions, environment: &'e dyn EnvironmentProvider) -> Self {
        Self::with_resolver(options, environment, ModuleResolver::new())
    }
}

impl<'e, F: FileSystem> Compiler<'e, F> {
    /// The sandbox sees the same variables the bundles are built with.
    pub fn with_resolver(
        options: &'e BuildOptions,
        environment: &'e dyn EnvironmentProvider,
        resolver: ModuleResolver<F>,
    ) -> Self {
        let sandbox = SandboxOptions {
            env: environment.variables(options),
            ..SandboxOptions::default()
        };
        Self {
            options,
            bundler: Bundler::with_resolver(resolver, environment),
            sandbox,
        }
    }

    pub fn with_sandbox(mut self, sandbox: SandboxOptions) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Discover every endpoint under the input root and compile them all.
    pub fn compile(&self) -> Vec<Result<ModuleReport, CompileError>> {
        let endpoints = discover_endpoints(&self.options.input);
        info!(
            input = %self.options.input.display(),
            endpoints = endpoints.len(),
            bundler = ?self.options.bundler,
            "compiling endpoints"
        );
        self.compile_all(&endpoints)
    }

    /// One result per endpoint, in input order.
    pub fn compile_all(&self, endpoints: &[Endpoint]) -> Vec<Result<ModuleReport, CompileError>> {
        endpoints
            .par_iter()
            .map(|endpoint| self.compile_module(endpoint))
            .collect()
    }

    pub fn compile_module(&self, endpoint: &Endpoint) -> Result<ModuleReport, CompileError> {
        let module = endpoint.module.as_path();
        let exported = get_exported_variable_names(module)?;
        let methods: Vec<String> = HTTP_METHODS
            .iter()
            .filter(|method| exported.iter().any(|name| name.as_str() == **method))
            .map(|method| method.to_string())
            .collect();

        let mut messages = Vec::new();
        if methods.is_empty() {
            messages.push(Message::error(
                format!("no request handler exported; expected one of {}", HTTP_METHODS.join(", ")),
                Some(Location {
                    file: module.display().to_string(),
                    line: 1,
                    column: 1,
                }),
            ));
        }
        let schema = handler_schema();
        for method in &methods {
            messages.extend(type_check(module, HANDLER_TYPE, method, &schema));
        }

        let mut report = ModuleReport {
            module: endpoint.module.clone(),
            route: endpoint.route.clone(),
            messages,
            config: None,
            artifact: None,
        };
        if report.has_errors() {
            warn!(module = %module.display(), route = %endpoint.route, "validation failed, skipping emission");
            return Ok(report);
        }

        if has_default_export(module)? {
            report.config = Some(Sandbox::new(self.sandbox.clone()).get_default_export(module)?);
            debug!(module = %module.display(), "extracted module config");
        }

        let entry = self.options.bundler.emit_entrypoint(
            self.bundler.resolver(),
            &EntrypointContext {
                module,
                route: &endpoint.route,
                methods: &methods,
                config: report.config.as_ref(),
                options: self.options,
            },
        )?;
        let artifact = self.bundler.build(BuildRequest {
            buffer: &entry.source,
            output: &entry.output,
            resolve: Some(&entry.resolve_dir),
            options: Some(self.options),
            overrides: Some(&entry.overrides),
        })?;
        entry.write_sidecars()?;

        info!(module = %module.display(), route = %endpoint.route, digest = %artifact.digest, "compiled module");
        report.artifact = Some(artifact);
        Ok(report)
    }
}

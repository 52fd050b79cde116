//! # Handler Compiler
//!
//! Compiles endpoint handler modules into deployable bundles for a serverless or
//! Express-style runtime.
//!
//! ## Pipeline
//!
//! For every module under `<input>/routes`:
//!
//! 1. **Analyze**: list the exported names and look for a default export.
//! 2. **Validate**: check every exported HTTP method handler against
//!    `(request: Request, context?) => Response | Promise<Response>`. All messages of a
//!    module are collected; any error-severity message stops the module before emission.
//! 3. **Extract**: a default export is evaluated in a disposable sandbox and read back as
//!    JSON.
//! 4. **Synthesize**: the [`BundlerType`] writes a platform wrapper importing the module.
//! 5. **Emit**: the wrapper is linked with its imports, `process.env` is replaced by a
//!    frozen snapshot, and one file is written, ending with [`ATTRIBUTION`].
//!
//! ## Invariants
//!
//! - Configuration precedence is `defaults < developer.bundler.oxc < per-call overrides`.
//! - Nothing outlives the build of one module except the read-only [`BuildOptions`].
//! - Validation never throws; resolution misses are `None`.

mod analyze;
mod bundle;
mod config;
mod define;
mod discovery;
mod env;
mod errors;
mod files;
mod linker;
mod options;
mod pipeline;
mod resolve;
mod sandbox;
mod schema;
mod target;
mod typecheck;

#[cfg(test)]
mod bundle_tests;
#[cfg(test)]
mod typecheck_tests;

pub use analyze::{get_exported_variable_names, has_default_export};
pub use bundle::{BuildArtifact, BuildRequest, Bundler};
pub use config::{BundlerConfig, BundlerOverrides, Footer, OutputFormat, ATTRIBUTION};
pub use define::{Defines, PROCESS_ENV};
pub use discovery::{discover_endpoints, Endpoint, Route, Segment, ROUTES_DIR};
pub use env::{EnvironmentProvider, EnvironmentVariables, ProcessEnvironment, StaticEnvironment};
pub use errors::{AnalysisError, BuildError, CompileError, ExtractionError};
pub use files::{FileSystem, OsFileSystem};
pub use linker::{Entry, LinkOutput, Linker};
pub use options::{BuildOptions, BundlerType, DeveloperBundlerOptions, DeveloperOptions};
pub use pipeline::{handler_schema, Compiler, ModuleReport, HANDLER_TYPE};
pub use resolve::{ModuleResolver, SHARED_DEPENDENCY_DIR};
pub use sandbox::{get_default_export, Sandbox, SandboxOptions};
pub use schema::{
    has_errors, FieldSchema, Location, Message, ParameterSchema, ReturnSchema, Schema, Severity,
};
pub use target::{Entrypoint, EntrypointContext, Sidecar, HTTP_METHODS, VERCEL_RUNTIME};
pub use typecheck::type_check;

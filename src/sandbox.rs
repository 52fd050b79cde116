//! Sandbox Extractor
//!
//! Reads a module's default export by running it. The module and its statically
//! resolved imports are linked into one CommonJS script and evaluated in a fresh boa
//! context that only exposes a frozen `process` handle and an empty `module.exports`.
//! The context is dropped after every call.

use boa_engine::{Context, Source};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::config::{BundlerConfig, OutputFormat};
use crate::define::Defines;
use crate::env::{snapshot, EnvironmentVariables};
use crate::errors::ExtractionError;
use crate::linker::{Entry, Linker};
use crate::resolve::ModuleResolver;

const DEFAULT_LOOP_ITERATION_LIMIT: u64 = 10_000_000;
const DEFAULT_RECURSION_LIMIT: usize = 512;

/// Reports what the script left in `module.exports.default` as a JSON string.
const READER: &str = r#"(function (exports) {
  if (exports === null || (typeof exports !== "object" && typeof exports !== "function") || !("default" in exports)) {
    return JSON.stringify({ missing: true });
  }
  var value = exports.default;
  var kind = typeof value;
  if (kind === "function" || kind === "symbol" || kind === "bigint" || kind === "undefined") {
    return JSON.stringify({ kind: kind });
  }
  return JSON.stringify({ value: value });
})(module.exports)"#;

#[derive(Debug, Clone)]
pub struct SandboxOptions {
    /// What user code sees as `process.env`.
    pub env: EnvironmentVariables,
    pub platform: String,
    pub loop_iteration_limit: u64,
    pub recursion_limit: usize,
}

impl Default for SandboxOptions {
    fn default() -> Self {
        Self {
            env: std::env::vars().collect(),
            platform: node_platform().to_string(),
            loop_iteration_limit: DEFAULT_LOOP_ITERATION_LIMIT,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }
}

#[derive(Deserialize)]
struct Readout {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    value: Value,
}

#[derive(Debug, Clone, Default)]
pub struct Sandbox {
    options: SandboxOptions,
}

impl Sandbox {
    pub fn new(options: SandboxOptions) -> Self {
        Self { options }
    }

    /// Execute `path` in isolation and return its default export as JSON.
    pub fn get_default_export(&self, path: &Path) -> Result<Value, ExtractionError> {
        debug!(path = %path.display(), "extracting default export");
        let script = compile(path)?;

        let mut context = Context::default();
        context
            .runtime_limits_mut()
            .set_loop_iteration_limit(self.options.loop_iteration_limit);
        context
            .runtime_limits_mut()
            .set_recursion_limit(self.options.recursion_limit);

        let execution = |message: String| ExtractionError::Execution {
            path: path.to_path_buf(),
            message,
        };

        context
            .eval(Source::from_bytes(self.prelude().as_bytes()))
            .map_err(|err| execution(err.to_string()))?;
        context
            .eval(Source::from_bytes(script.as_bytes()))
            .map_err(|err| execution(err.to_string()))?;
        let result = context
            .eval(Source::from_bytes(READER.as_bytes()))
            .map_err(|err| execution(err.to_string()))?;

        let json = result
            .as_string()
            .map(|s| s.to_std_string_escaped())
            .ok_or_else(|| execution("default export could not be read".to_string()))?;
        let readout: Readout =
            serde_json::from_str(&json).map_err(|err| execution(err.to_string()))?;

        if readout.missing {
            return Err(ExtractionError::MissingDefault {
                path: path.to_path_buf(),
            });
        }
        if let Some(kind) = readout.kind {
            return Err(ExtractionError::NotSerializable {
                path: path.to_path_buf(),
                kind,
            });
        }
        Ok(readout.value)
    }

    fn prelude(&self) -> String {
        format!(
            r#"var process = Object.freeze({{ env: Object.freeze({env}), platform: {platform} }});
var module = {{ exports: {{}} }};
var exports = module.exports;
function require(name) {{
  throw new Error("cannot load \"" + name + "\" inside the sandbox");
}}
"#,
            env = snapshot(&self.options.env),
            platform = serde_json::to_string(&self.options.platform).unwrap_or_else(|_| "\"\"".into()),
        )
    }
}

/// Execute `path` with default sandbox options.
pub fn get_default_export(path: &Path) -> Result<Value, ExtractionError> {
    Sandbox::default().get_default_export(path)
}

fn compile(path: &Path) -> Result<String, ExtractionError> {
    let config = BundlerConfig {
        format: OutputFormat::Cjs,
        minify: false,
        ..BundlerConfig::default()
    };
    let resolver = ModuleResolver::new();
    let defines = Defines::default();
    Linker::new(&resolver, &config, &defines)
        .link(Entry::File(path))
        .map(|output| output.code)
        .map_err(|source| ExtractionError::Compile {
            path: path.to_path_buf(),
            source,
        })
}

fn node_platform() -> &'static str {
    match std::env::consts::OS {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

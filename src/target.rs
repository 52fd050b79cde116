//! Deployment targets.
//!
//! Each [`BundlerType`] synthesizes the entry module that adapts a handler module to
//! its platform, and decides where the bundle and its sidecar files land.

use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{BundlerOverrides, OutputFormat};
use crate::discovery::{Route, Segment};
use crate::errors::BuildError;
use crate::files::FileSystem;
use crate::options::{BuildOptions, BundlerType};
use crate::resolve::ModuleResolver;

/// Exports treated as request handlers.
pub const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

pub const VERCEL_RUNTIME: &str = "nodejs20.x";

/// Entry module name used in `Unresolved` errors.
const ENTRYPOINT: &str = "<entrypoint>";

/// Default-export keys copied into the Vercel function config.
const VERCEL_CONFIG_KEYS: &[&str] = &["maxDuration", "memory", "regions"];

/// What a target needs to know about one handler module.
#[derive(Debug, Clone, Copy)]
pub struct EntrypointContext<'c> {
    pub module: &'c Path,
    pub route: &'c Route,
    /// Exported HTTP methods, in [`HTTP_METHODS`] order.
    pub methods: &'c [String],
    /// The module's extracted default export.
    pub config: Option<&'c Value>,
    pub options: &'c BuildOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sidecar {
    pub path: PathBuf,
    pub contents: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entrypoint {
    pub source: String,
    pub resolve_dir: PathBuf,
    pub output: PathBuf,
    /// Settings the generated wrapper depends on.
    pub overrides: BundlerOverrides,
    pub sidecars: Vec<Sidecar>,
}

impl Entrypoint {
    pub fn write_sidecars(&self) -> Result<(), BuildError> {
        for sidecar in &self.sidecars {
            let write_error = |source: std::io::Error| BuildError::Write {
                path: sidecar.path.clone(),
                source,
            };
            if let Some(parent) = sidecar.path.parent() {
                fs::create_dir_all(parent).map_err(write_error)?;
            }
            fs::write(&sidecar.path, &sidecar.contents).map_err(write_error)?;
        }
        Ok(())
    }
}

impl BundlerType {
    /// Build the platform wrapper for a handler module. The module itself is located
    /// through `resolver`; a miss is an `Unresolved` error.
    pub fn emit_entrypoint<F: FileSystem>(
        &self,
        resolver: &ModuleResolver<F>,
        ctx: &EntrypointContext,
    ) -> Result<Entrypoint, BuildError> {
        let file_name = ctx
            .module
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let resolve_dir = ctx.module.parent().map(Path::to_path_buf).unwrap_or_default();
        let specifier = format!("./{file_name}");
        if file_name.is_empty() || resolver.resolve(&file_name, &resolve_dir).is_none() {
            return Err(BuildError::Unresolved {
                specifier,
                importer: ENTRYPOINT.to_string(),
            });
        }

        let config = serde_json::to_string(ctx.config.unwrap_or(&Value::Null))
            .unwrap_or_else(|_| "null".to_string());
        let overrides = BundlerOverrides {
            format: Some(OutputFormat::Cjs),
            ..BundlerOverrides::default()
        };

        match self {
            BundlerType::Vercel => {
                let dir = ctx
                    .options
                    .output
                    .join(".vercel/output/functions")
                    .join(format!("{}.func", ctx.route.name()));
                Ok(Entrypoint {
                    source: vercel_source(&specifier, ctx, &config),
                    resolve_dir,
                    output: dir.join("index.js"),
                    overrides,
                    sidecars: vec![Sidecar {
                        path: dir.join(".vc-config.json"),
                        contents: vercel_config(ctx.config),
                    }],
                })
            }
            BundlerType::ExpressJS => Ok(Entrypoint {
                source: express_source(&specifier, ctx, &config),
                resolve_dir,
                output: ctx
                    .options
                    .output
                    .join(".express/routes")
                    .join(ctx.route.name())
                    .join("index.js"),
                overrides: BundlerOverrides {
                    external: Some(vec!["express".to_string()]),
                    ..overrides
                },
                sidecars: Vec::new(),
            }),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VERCEL
// ═══════════════════════════════════════════════════════════════════════════════

fn vercel_source(specifier: &str, ctx: &EntrypointContext, config: &str) -> String {
    let mut source = format!(
        "import * as handler from {specifier};\n\nconst config = {config};\n{params}",
        specifier = quote(specifier),
        params = params_source(ctx.route),
    );
    for method in ctx.methods {
        source.push_str(&format!(
            "\nexport function {method}(request) {{\n  return handler.{method}(request, {{ params: params(request), config }});\n}}\n"
        ));
    }
    source
}

/// `params(request)`: route parameters read from the request path, segment by segment
/// from its start. A catch-all takes the rest of the path.
fn params_source(route: &Route) -> String {
    let segments = serde_json::to_string(&route.segments).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"const segments = {segments};

function params(request) {{
  const parts = new URL(request.url).pathname.split("/").filter(Boolean);
  const out = {{}};
  segments.forEach((segment, i) => {{
    if (segment.kind === "param") out[segment.name] = decodeURIComponent(parts[i] ?? "");
    else if (segment.kind === "catchAll") out[segment.name] = parts.slice(i).map(decodeURIComponent).join("/");
  }});
  return out;
}}
"#
    )
}

fn vercel_config(config: Option<&Value>) -> String {
    let mut out = Map::new();
    out.insert("runtime".into(), json!(VERCEL_RUNTIME));
    out.insert("handler".into(), json!("index.js"));
    out.insert("launcherType".into(), json!("Nodejs"));
    out.insert("shouldAddHelpers".into(), json!(false));
    if let Some(Value::Object(config)) = config {
        for key in VERCEL_CONFIG_KEYS {
            if let Some(value) = config.get(*key) {
                out.insert((*key).to_string(), value.clone());
            }
        }
    }
    serde_json::to_string_pretty(&Value::Object(out)).unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPRESS
// ═══════════════════════════════════════════════════════════════════════════════

fn express_source(specifier: &str, ctx: &EntrypointContext, config: &str) -> String {
    let catch_all = ctx
        .route
        .segments
        .iter()
        .find_map(|segment| match segment {
            Segment::CatchAll(name) => Some(quote(name)),
            _ => None,
        })
        .unwrap_or_else(|| "null".to_string());

    let mut source = format!(
        r#"import express from "express";
import * as handler from {specifier};

const config = {config};
const path = {path};
const catchAll = {catch_all};
const router = express.Router();

function toRequest(req) {{
  const url = `${{req.protocol}}://${{req.get("host")}}${{req.originalUrl}}`;
  const headers = new Headers();
  for (const [name, value] of Object.entries(req.headers)) {{
    if (Array.isArray(value)) value.forEach((v) => headers.append(name, v));
    else if (value !== undefined) headers.set(name, String(value));
  }}
  const init = {{ method: req.method, headers }};
  if (req.method !== "GET" && req.method !== "HEAD") {{
    init.body = req;
    init.duplex = "half";
  }}
  return new Request(url, init);
}}

function toParams(req) {{
  const params = Object.assign({{}}, req.params);
  if (catchAll) params[catchAll] = req.params[0];
  return params;
}}

async function send(res, response) {{
  res.status(response.status);
  response.headers.forEach((value, name) => res.setHeader(name, value));
  if (response.body) res.send(Buffer.from(await response.arrayBuffer()));
  else res.end();
}}

function mount(method, handle) {{
  router[method](path, async (req, res, next) => {{
    try {{
      await send(res, await handle(toRequest(req), {{ params: toParams(req), config }}));
    }} catch (err) {{
      next(err);
    }}
  }});
}}
"#,
        specifier = quote(specifier),
        path = quote(&ctx.route.express_path()),
    );
    for method in ctx.methods {
        source.push_str(&format!(
            "mount({}, handler.{method});\n",
            quote(&method.to_lowercase())
        ));
    }
    source.push_str("\nexport default router;\n");
    source
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
}

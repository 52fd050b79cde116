use crate::bundle::{BuildRequest, Bundler};
use crate::config::{BundlerOverrides, OutputFormat, ATTRIBUTION};
use crate::env::{snapshot, EnvironmentProvider, StaticEnvironment};
use crate::errors::BuildError;
use crate::options::{BuildOptions, BundlerType};
use boa_engine::{Context, Source};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

fn no_minify() -> BundlerOverrides {
    BundlerOverrides {
        minify: Some(false),
        ..Default::default()
    }
}

fn options(root: &Path) -> BuildOptions {
    BuildOptions::new(root, root, BundlerType::ExpressJS)
}

/// Evaluate a CommonJS bundle and return `module.exports[name]` as JSON text.
fn run_export(code: &str, name: &str) -> String {
    let mut context = Context::default();
    context
        .eval(Source::from_bytes("var module = { exports: {} }; var exports = module.exports;"))
        .unwrap();
    context.eval(Source::from_bytes(code.as_bytes())).unwrap();
    let value = context
        .eval(Source::from_bytes(format!("JSON.stringify(module.exports[{name:?}])").as_bytes()))
        .unwrap();
    value.as_string().unwrap().to_std_string_escaped()
}

#[test]
fn test_environment_is_frozen_into_output() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::from_iter([("API_URL", "https://api.example.com")]);
    let options = options(temp.path());
    let output = temp.path().join("out/index.js");

    Bundler::new(&env)
        .build(BuildRequest {
            options: Some(&options),
            overrides: Some(&no_minify()),
            ..BuildRequest::new("export const url: string = process.env.API_URL;\n", &output)
        })
        .unwrap();

    let code = fs::read_to_string(&output).unwrap();
    assert!(code.contains("https://api.example.com"));
    assert!(!code.contains("process.env"));
    assert_eq!(run_export(&code, "url"), "\"https://api.example.com\"");
}

#[test]
fn test_environment_snapshot_survives_minification() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::from_iter([("REGION", "eu-central-1"), ("TIER", "gold")]);
    let options = options(temp.path());
    let output = temp.path().join("index.js");

    Bundler::new(&env)
        .build(BuildRequest {
            options: Some(&options),
            ..BuildRequest::new("export const env = process.env;\nexport const region = process.env.REGION;\n", &output)
        })
        .unwrap();

    let code = fs::read_to_string(&output).unwrap();
    let expected = snapshot(&env.variables(&options));
    assert!(code.contains(&expected));
    assert!(!code.contains("process.env"));
    assert_eq!(run_export(&code, "env"), expected);
    assert_eq!(run_export(&code, "region"), "\"eu-central-1\"");
}

#[test]
fn test_no_environment_without_options() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::from_iter([("SECRET", "hidden")]);
    let output = temp.path().join("index.js");

    Bundler::new(&env)
        .build(BuildRequest {
            overrides: Some(&no_minify()),
            ..BuildRequest::new("export const keys = Object.keys(process.env);\n", &output)
        })
        .unwrap();

    let code = fs::read_to_string(&output).unwrap();
    assert!(!code.contains("hidden"));
    assert_eq!(run_export(&code, "keys"), "[]");
}

#[test]
fn test_call_overrides_beat_project_overrides() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::default();
    let options = options(temp.path()).with_bundler_overrides(BundlerOverrides {
        minify: Some(true),
        ..Default::default()
    });
    let source = "export function greet(name: string) {\n  const message = `hello ${name}`;\n  return message;\n}\n";
    let bundler = Bundler::new(&env);

    let minified = temp.path().join("min.js");
    let project = bundler
        .build(BuildRequest {
            options: Some(&options),
            ..BuildRequest::new(source, &minified)
        })
        .unwrap();

    let readable = temp.path().join("readable.js");
    let call = bundler
        .build(BuildRequest {
            options: Some(&options),
            overrides: Some(&no_minify()),
            ..BuildRequest::new(source, &readable)
        })
        .unwrap();

    assert!(call.bytes > project.bytes);
    let readable = fs::read_to_string(&readable).unwrap();
    assert!(readable.contains("\n  "));
}

#[test]
fn test_output_ends_with_attribution() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::default();
    let output = temp.path().join("nested/dir/index.js");
    let overrides = BundlerOverrides {
        footer: Some(crate::config::Footer {
            js: Some("/* release */".to_string()),
        }),
        ..Default::default()
    };

    let artifact = Bundler::new(&env)
        .build(BuildRequest {
            overrides: Some(&overrides),
            ..BuildRequest::new("export default 1;\n", &output)
        })
        .unwrap();

    let code = fs::read_to_string(&output).unwrap();
    assert_eq!(code.trim_end().lines().last(), Some(ATTRIBUTION));
    assert!(code.contains("/* release */"));
    assert_eq!(artifact.bytes, code.len());
    assert_eq!(artifact.digest, format!("{:x}", Sha256::digest(code.as_bytes())));
    assert_eq!(artifact.modules, 1);
}

#[test]
fn test_links_relative_imports() {
    let temp = tempfile::tempdir().unwrap();
    fs::create_dir_all(temp.path().join("lib")).unwrap();
    fs::write(
        temp.path().join("lib/math.ts"),
        "export function add(a: number, b: number): number { return a + b; }\nexport default 10;\n",
    )
    .unwrap();
    fs::write(temp.path().join("lib/index.ts"), "export * from \"./math\";\n").unwrap();
    fs::write(temp.path().join("data.json"), "{ \"base\": 2 }").unwrap();

    let env = StaticEnvironment::default();
    let output = temp.path().join("out.js");
    let artifact = Bundler::new(&env)
        .build(BuildRequest {
            resolve: Some(temp.path()),
            overrides: Some(&no_minify()),
            ..BuildRequest::new(
                "import { add } from \"./lib\";\nimport ten from \"./lib/math\";\nimport data from \"./data.json\";\nexport const total = add(data.base, ten);\n",
                &output,
            )
        })
        .unwrap();

    assert_eq!(artifact.modules, 4);
    let code = fs::read_to_string(&output).unwrap();
    assert_eq!(run_export(&code, "total"), "12");
}

#[test]
fn test_minified_bundle_still_runs() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("util.ts"), "export const twice = (n: number) => n * 2;\n").unwrap();
    let env = StaticEnvironment::default();
    let output = temp.path().join("out.js");
    Bundler::new(&env)
        .build(BuildRequest {
            resolve: Some(temp.path()),
            ..BuildRequest::new("import { twice } from \"./util\";\nexport const value = twice(21);\n", &output)
        })
        .unwrap();
    let code = fs::read_to_string(&output).unwrap();
    assert_eq!(run_export(&code, "value"), "42");
}

#[test]
fn test_unresolved_relative_import_fails() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::default();
    let output = temp.path().join("out.js");
    let err = Bundler::new(&env)
        .build(BuildRequest {
            resolve: Some(temp.path()),
            ..BuildRequest::new("import { x } from \"./missing\";\nexport default x;\n", &output)
        })
        .unwrap_err();
    assert!(matches!(err, BuildError::Unresolved { specifier, .. } if specifier == "./missing"));
    assert!(!output.exists());
}

#[test]
fn test_packages_stay_external() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::default();
    let output = temp.path().join("out.js");
    Bundler::new(&env)
        .build(BuildRequest {
            resolve: Some(temp.path()),
            overrides: Some(&no_minify()),
            ..BuildRequest::new("import express from \"express\";\nexport const app = express();\n", &output)
        })
        .unwrap();
    let code = fs::read_to_string(&output).unwrap();
    assert!(code.contains("require(\"express\")"));
}

fn install_package(root: &Path) {
    let package = root.join("node_modules/tiny");
    fs::create_dir_all(&package).unwrap();
    fs::write(package.join("package.json"), r#"{ "main": "main.js" }"#).unwrap();
    fs::write(package.join("main.js"), "exports.answer = 42;\n").unwrap();
}

#[test]
fn test_installed_packages_are_bundled() {
    let temp = tempfile::tempdir().unwrap();
    install_package(temp.path());
    let env = StaticEnvironment::default();
    let output = temp.path().join("out.js");
    let artifact = Bundler::new(&env)
        .build(BuildRequest {
            resolve: Some(temp.path()),
            ..BuildRequest::new("import { answer } from \"tiny\";\nexport const value = answer;\n", &output)
        })
        .unwrap();

    assert_eq!(artifact.modules, 2);
    let code = fs::read_to_string(&output).unwrap();
    assert!(!code.contains("require(\"tiny\")"));
    assert_eq!(run_export(&code, "value"), "42");
}

#[test]
fn test_external_packages_are_not_bundled() {
    let temp = tempfile::tempdir().unwrap();
    install_package(temp.path());
    let env = StaticEnvironment::default();
    let output = temp.path().join("out.js");
    let overrides = BundlerOverrides {
        external: Some(vec!["tiny".to_string()]),
        minify: Some(false),
        ..Default::default()
    };
    let artifact = Bundler::new(&env)
        .build(BuildRequest {
            resolve: Some(temp.path()),
            overrides: Some(&overrides),
            ..BuildRequest::new("import { answer } from \"tiny\";\nexport const value = answer;\n", &output)
        })
        .unwrap();

    assert_eq!(artifact.modules, 1);
    assert!(fs::read_to_string(&output).unwrap().contains("require(\"tiny\")"));
}

#[test]
fn test_bundle_false_keeps_imports() {
    let temp = tempfile::tempdir().unwrap();
    fs::write(temp.path().join("util.ts"), "export const a = 1;\n").unwrap();
    let env = StaticEnvironment::default();
    let output = temp.path().join("out.js");
    let overrides = BundlerOverrides {
        bundle: Some(false),
        minify: Some(false),
        ..Default::default()
    };
    let artifact = Bundler::new(&env)
        .build(BuildRequest {
            resolve: Some(temp.path()),
            overrides: Some(&overrides),
            ..BuildRequest::new("import { a } from \"./util\";\nexport const b = a;\n", &output)
        })
        .unwrap();
    assert_eq!(artifact.modules, 1);
    assert!(fs::read_to_string(&output).unwrap().contains("require(\"./util\")"));
}

#[test]
fn test_esm_format() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::default();
    let output = temp.path().join("out.mjs");
    let overrides = BundlerOverrides {
        format: Some(OutputFormat::Esm),
        minify: Some(false),
        ..Default::default()
    };
    Bundler::new(&env)
        .build(BuildRequest {
            overrides: Some(&overrides),
            ..BuildRequest::new("export const a = 1;\nexport default function main() {}\n", &output)
        })
        .unwrap();
    let code = fs::read_to_string(&output).unwrap();
    assert!(code.contains("export var a = __entry.a;"));
    assert!(code.contains("export default __entry.default;"));
    assert!(!code.contains("module.exports = __require(0)"));
}

#[test]
fn test_esm_externals_are_imported() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::default();
    let output = temp.path().join("out.mjs");
    let overrides = BundlerOverrides {
        format: Some(OutputFormat::Esm),
        external: Some(vec!["express".to_string()]),
        minify: Some(false),
        ..Default::default()
    };
    Bundler::new(&env)
        .build(BuildRequest {
            resolve: Some(temp.path()),
            overrides: Some(&overrides),
            ..BuildRequest::new(
                "import express from \"express\";\nimport { join } from \"node:path\";\nimport * as fs from \"express\";\nexport const app = [express, join, fs];\n",
                &output,
            )
        })
        .unwrap();
    let code = fs::read_to_string(&output).unwrap();
    assert!(code.starts_with(
        "import * as __external_0 from \"express\";\nimport * as __external_1 from \"node:path\";\n"
    ));
    assert_eq!(code.matches("import * as").count(), 2);
    assert!(!code.replace("__require(", "").contains("require("));
}

#[test]
fn test_refuses_overwrite_when_disallowed() {
    let temp = tempfile::tempdir().unwrap();
    let output = temp.path().join("out.js");
    fs::write(&output, "existing").unwrap();
    let env = StaticEnvironment::default();
    let overrides = BundlerOverrides {
        allow_overwrite: Some(false),
        ..Default::default()
    };
    let err = Bundler::new(&env)
        .build(BuildRequest {
            overrides: Some(&overrides),
            ..BuildRequest::new("export default 1;\n", &output)
        })
        .unwrap_err();
    assert!(matches!(err, BuildError::OutputExists { .. }));
    assert_eq!(fs::read_to_string(&output).unwrap(), "existing");
}

#[test]
fn test_assigning_process_env_is_rejected() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::default();
    let options = options(temp.path());
    let output = temp.path().join("out.js");
    let err = Bundler::new(&env)
        .build(BuildRequest {
            options: Some(&options),
            ..BuildRequest::new("process.env = {};\nexport default 1;\n", &output)
        })
        .unwrap_err();
    assert!(matches!(err, BuildError::IncompatibleDefine { key, .. } if key == "process.env"));
}

#[test]
fn test_syntax_error_is_reported() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::default();
    let output = temp.path().join("out.js");
    let err = Bundler::new(&env)
        .build(BuildRequest::new("export const = ;\n", &output))
        .unwrap_err();
    assert!(matches!(err, BuildError::Syntax { .. }));
}

#[test]
fn test_user_defines_are_substituted() {
    let temp = tempfile::tempdir().unwrap();
    let env = StaticEnvironment::default();
    let output = temp.path().join("out.js");
    let overrides = BundlerOverrides {
        define: Some([("FEATURE.enabled".to_string(), "true".to_string())].into()),
        minify: Some(false),
        ..Default::default()
    };
    Bundler::new(&env)
        .build(BuildRequest {
            overrides: Some(&overrides),
            ..BuildRequest::new("export const on = FEATURE.enabled;\n", &output)
        })
        .unwrap();
    assert_eq!(run_export(&fs::read_to_string(&output).unwrap(), "on"), "true");
}

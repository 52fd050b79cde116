use crate::schema::{has_errors, FieldSchema, ParameterSchema, ReturnSchema, Schema, Severity};
use crate::typecheck::type_check;
use std::fs;
use std::path::PathBuf;

fn handler(code: &str) -> (tempfile::TempDir, PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let path = temp.path().join("handler.ts");
    fs::write(&path, code).unwrap();
    (temp, path)
}

fn endpoint() -> Schema {
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

fn config() -> Schema {
    Schema {
        parameters: Vec::new(),
        returns: None,
        fields: vec![
            FieldSchema::new("route", Some("string"), true),
            FieldSchema::new("runtime", Some("string"), false),
        ],
    }
}

#[test]
fn test_conforming_function_has_no_messages() {
    let (_temp, path) = handler(
        "export async function GET(request: Request): Promise<Response> {\n  return new Response(\"ok\");\n}\n",
    );
    assert!(type_check(&path, "Endpoint", "GET", &endpoint()).is_empty());
}

#[test]
fn test_conforming_arrow_with_matching_annotation() {
    let (_temp, path) = handler(
        "type Endpoint = (r: Request) => Response;\nexport const POST: Endpoint = (request: Request, context) => new Response(\"ok\");\n",
    );
    assert!(type_check(&path, "Endpoint", "POST", &endpoint()).is_empty());
}

#[test]
fn test_missing_export_is_a_single_error() {
    let (_temp, path) = handler("export function GET(request: Request) {}\n");
    let messages = type_check(&path, "Endpoint", "DELETE", &endpoint());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].severity, Severity::Error);
    assert!(messages[0].description.contains("DELETE"));
}

#[test]
fn test_missing_required_parameter_names_it() {
    let (_temp, path) = handler("export function GET(): Response { return new Response(); }\n");
    let messages = type_check(&path, "Endpoint", "GET", &endpoint());
    assert!(has_errors(&messages));
    assert!(messages
        .iter()
        .any(|m| m.is_error() && m.description.contains("\"request\"")));
    // The optional context parameter is never reported.
    assert!(!messages.iter().any(|m| m.description.contains("\"context\"")));
}

#[test]
fn test_parameter_type_mismatch_is_an_error() {
    let (_temp, path) = handler("export const GET = (request: string) => new Response();\n");
    let messages = type_check(&path, "Endpoint", "GET", &endpoint());
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_error());
    assert!(messages[0].description.contains("`string`"));
    let location = messages[0].location.as_ref().unwrap();
    assert_eq!((location.line, location.column), (1, 21));
}

#[test]
fn test_unannotated_parameter_is_a_warning() {
    let (_temp, path) = handler("export function GET(request) { return new Response(); }\n");
    let messages = type_check(&path, "Endpoint", "GET", &endpoint());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].severity, Severity::Warning);
    assert!(!has_errors(&messages));
}

#[test]
fn test_surplus_parameter_is_a_warning() {
    let (_temp, path) = handler(
        "export function GET(request: Request, context, extra: number) { return new Response(); }\n",
    );
    let messages = type_check(&path, "Endpoint", "GET", &endpoint());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].severity, Severity::Warning);
    assert!(messages[0].description.contains("\"extra\""));
}

#[test]
fn test_return_type_mismatch_is_an_error() {
    let (_temp, path) = handler(
        "export function GET(request: Request): Response | string { return \"\"; }\n",
    );
    let messages = type_check(&path, "Endpoint", "GET", &endpoint());
    assert!(has_errors(&messages));
    assert!(messages[0].description.contains("Response | string"));
}

#[test]
fn test_async_rejected_when_not_allowed() {
    let mut schema = endpoint();
    schema.returns = Some(ReturnSchema {
        type_names: vec!["Response".to_string()],
        allow_async: false,
    });
    let (_temp, path) = handler(
        "export async function GET(request: Request): Promise<Response> { return new Response(); }\n",
    );
    let messages = type_check(&path, "Endpoint", "GET", &schema);
    assert_eq!(messages.iter().filter(|m| m.is_error()).count(), 2);
}

#[test]
fn test_declared_type_mismatch_is_a_warning() {
    let (_temp, path) = handler(
        "export const GET: Handler = (request: Request) => new Response();\n",
    );
    let messages = type_check(&path, "Endpoint", "GET", &endpoint());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].severity, Severity::Warning);
    assert!(messages[0].description.contains("`Handler`"));
}

#[test]
fn test_conforming_config_object() {
    let (_temp, path) = handler("export default { route: \"/users\", runtime: \"node\" };\n");
    assert!(type_check(&path, "Config", "default", &config()).is_empty());
}

#[test]
fn test_missing_required_field_names_it() {
    let (_temp, path) = handler("export const config = { runtime: \"node\" };\n");
    let messages = type_check(&path, "Config", "config", &config());
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_error());
    assert!(messages[0].description.contains("\"route\""));
}

#[test]
fn test_interface_field_types_are_checked() {
    let (_temp, path) = handler(
        "export interface Config {\n  route: number;\n  runtime?: string;\n}\n",
    );
    let messages = type_check(&path, "Config", "Config", &config());
    assert_eq!(messages.len(), 1);
    assert!(messages[0].description.contains("`number`"));
}

#[test]
fn test_type_literal_optional_required_field_warns() {
    let (_temp, path) = handler("export type Config = { route?: string };\n");
    let messages = type_check(&path, "Config", "Config", &config());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].severity, Severity::Warning);
}

#[test]
fn test_renamed_local_export_is_checked() {
    let (_temp, path) = handler(
        "function handle(request: Request): Response { return new Response(); }\nexport { handle as GET };\n",
    );
    assert!(type_check(&path, "Endpoint", "GET", &endpoint()).is_empty());
}

#[test]
fn test_imported_then_exported_handler_is_not_checked() {
    let (temp, path) = handler("import { handle } from \"./impl\";\nexport { handle as GET };\n");
    fs::write(
        temp.path().join("impl.ts"),
        "export function handle(request: Request): Response { return new Response(); }\n",
    )
    .unwrap();
    let messages = type_check(&path, "Endpoint", "GET", &endpoint());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].severity, Severity::Info);
    assert!(messages[0].description.contains("\"./impl\""));
}

#[test]
fn test_star_reexported_handler_is_not_checked() {
    let (temp, path) = handler("export * from \"./impl\";\n");
    fs::write(
        temp.path().join("impl.ts"),
        "export const GET = (request: Request) => new Response();\nexport default 1;\n",
    )
    .unwrap();
    let messages = type_check(&path, "Endpoint", "GET", &endpoint());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].severity, Severity::Info);

    // Names the target does not export, and `default`, are still missing.
    assert!(has_errors(&type_check(&path, "Endpoint", "POST", &endpoint())));
    assert!(has_errors(&type_check(&path, "Endpoint", "default", &config())));
}

#[test]
fn test_object_where_function_expected() {
    let (_temp, path) = handler("export const GET = { route: \"/\" };\n");
    let messages = type_check(&path, "Endpoint", "GET", &endpoint());
    assert!(has_errors(&messages));
}

#[test]
fn test_unreadable_and_unparseable_files_yield_one_error() {
    let temp = tempfile::tempdir().unwrap();
    let missing = type_check(&temp.path().join("nope.ts"), "Endpoint", "GET", &endpoint());
    assert_eq!(missing.len(), 1);
    assert!(missing[0].is_error());

    let (_temp, path) = handler("export function GET( {");
    let broken = type_check(&path, "Endpoint", "GET", &endpoint());
    assert_eq!(broken.len(), 1);
    assert!(broken[0].is_error());
}

//! Helpers over an `OpenAPI` document.
//!
//! The document describes the service the model may call through the single
//! `api_request` tool. These helpers derive the tool definition offered to
//! the model, decide per endpoint whether `X-LLM-*` headers are expected,
//! and render a readable digest of the API.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use serde_json::{json, Map, Value};

/// Name of the tool offered to the model.
pub const TOOL_NAME: &str = "api_request";

/// Prefix of header parameters that receive the model settings.
pub const LLM_HEADER_PREFIX: &str = "x-llm-";

/// Methods inspected for `X-LLM-*` header declarations.
const HEADER_METHODS: [&str; 5] = ["get", "post", "put", "patch", "delete"];

/// Methods listed in the context digest.
const CONTEXT_METHODS: [&str; 7] = ["get", "post", "put", "patch", "delete", "head", "options"];

/// Methods exposed through the tool definition.
const TOOL_METHODS: [&str; 2] = ["get", "post"];

/// Maximum number of component schemas in the digest.
const MAX_CONTEXT_SCHEMAS: usize = 20;

/// Maximum number of properties listed per component schema.
const MAX_CONTEXT_PROPERTIES: usize = 10;

/// Maximum number of request body properties listed per operation.
const MAX_BODY_PROPERTIES: usize = 5;

fn paths(schema: &Value) -> Option<&Map<String, Value>> {
    schema.get("paths").and_then(Value::as_object)
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

fn declares_llm_header(operation: &Value) -> bool {
    operation
        .get("parameters")
        .and_then(Value::as_array)
        .is_some_and(|params| {
            params.iter().any(|p| {
                p.get("in").and_then(Value::as_str) == Some("header")
                    && p.get("name")
                        .and_then(Value::as_str)
                        .is_some_and(|n| n.to_ascii_lowercase().starts_with(LLM_HEADER_PREFIX))
            })
        })
}

fn path_needs_llm_headers(path_item: &Value) -> bool {
    HEADER_METHODS
        .iter()
        .filter_map(|m| path_item.get(*m))
        .filter(|op| op.is_object())
        .any(declares_llm_header)
}

/// Returns true if any operation on `path` declares an `x-llm-*` header parameter.
///
/// `path` is matched exactly against the template keys of the document.
#[must_use]
pub fn endpoint_needs_llm_headers(schema: &Value, path: &str) -> bool {
    paths(schema)
        .and_then(|p| p.get(path))
        .is_some_and(path_needs_llm_headers)
}

/// Every path whose operations declare an `x-llm-*` header parameter.
#[must_use]
pub fn endpoints_needing_llm_headers(schema: &Value) -> Vec<String> {
    paths(schema)
        .map(|p| {
            p.iter()
                .filter(|(_, item)| path_needs_llm_headers(item))
                .map(|(path, _)| path.clone())
                .collect()
        })
        .unwrap_or_default()
}

/// Build the function-calling definition of the `api_request` tool.
///
/// The description lists every GET and POST operation of the document; the
/// `method` enum is restricted to the methods actually found.
#[must_use]
pub fn build_api_request_tool(schema: &Value) -> Value {
    let mut endpoints = Vec::new();
    let mut methods = BTreeSet::new();

    if let Some(paths) = paths(schema) {
        for (path, item) in paths {
            for method in TOOL_METHODS {
                let Some(op) = item.get(method).filter(|op| op.is_object()) else {
                    continue;
                };
                let verb = method.to_uppercase();
                let summary = str_field(op, "summary");
                if summary.is_empty() {
                    endpoints.push(format!("{verb} {path}"));
                } else {
                    endpoints.push(format!("{verb} {path} — {summary}"));
                }
                methods.insert(verb);
            }
        }
    }

    if methods.is_empty() {
        methods.extend(["GET".to_string(), "POST".to_string()]);
    }

    let endpoint_list = if endpoints.is_empty() {
        "No endpoints found.".to_string()
    } else {
        endpoints
            .iter()
            .map(|e| format!("- {e}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    json!({
        "type": "function",
        "function": {
            "name": TOOL_NAME,
            "description": format!(
                "Execute an HTTP request against the API. Available endpoints:\n{endpoint_list}"
            ),
            "parameters": {
                "type": "object",
                "properties": {
                    "method": {
                        "type": "string",
                        "enum": methods.into_iter().collect::<Vec<_>>(),
                        "description": "HTTP method",
                    },
                    "path": {
                        "type": "string",
                        "description": "API endpoint path, e.g. /users/{id}",
                    },
                    "query_params": {
                        "type": "object",
                        "description": "Query string parameters as key-value pairs",
                        "additionalProperties": true,
                    },
                    "path_params": {
                        "type": "object",
                        "description": "Path parameters to substitute in the URL template",
                        "additionalProperties": true,
                    },
                    "body": {
                        "type": "object",
                        "description": "JSON request body (for POST requests)",
                        "additionalProperties": true,
                    },
                },
                "required": ["method", "path"],
            },
        },
    })
}

/// Render a markdown digest of the document for display or prompting.
///
/// Returns an empty string if `schema` is not an object.
#[must_use]
pub fn build_schema_context(schema: &Value) -> String {
    if !schema.is_object() {
        return String::new();
    }

    let mut out = String::new();
    write_info(&mut out, schema);
    write_endpoints(&mut out, schema);
    write_components(&mut out, schema);
    out.trim_end().to_string()
}

fn write_info(out: &mut String, schema: &Value) {
    let info = schema.get("info").cloned().unwrap_or_else(|| json!({}));
    let title = info
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or("Untitled API");
    let version = info.get("version").and_then(Value::as_str).unwrap_or("N/A");

    let _ = writeln!(out, "# API Information\n## {title}\nVersion: {version}");
    let description = str_field(&info, "description");
    if !description.is_empty() {
        let _ = writeln!(out, "\n### Description\n{description}");
    }

    if let Some(servers) = schema.get("servers").and_then(Value::as_array) {
        if !servers.is_empty() {
            out.push_str("\n### Base URLs\n");
            for server in servers {
                let url = str_field(server, "url");
                let desc = str_field(server, "description");
                if desc.is_empty() {
                    let _ = writeln!(out, "- {url}");
                } else {
                    let _ = writeln!(out, "- {url} ({desc})");
                }
            }
        }
    }
}

fn write_endpoints(out: &mut String, schema: &Value) {
    let Some(paths) = paths(schema).filter(|p| !p.is_empty()) else {
        return;
    };
    out.push_str("\n# API Endpoints\n");

    for (path, item) in paths {
        if !item.is_object() {
            continue;
        }
        let _ = writeln!(out, "\n## `{path}`");

        for method in CONTEXT_METHODS {
            let Some(op) = item.get(method).filter(|op| op.is_object()) else {
                continue;
            };
            let _ = writeln!(out, "### {}", method.to_uppercase());
            let summary = str_field(op, "summary");
            if !summary.is_empty() {
                let _ = writeln!(out, "**Summary:** {summary}");
            }
            let description = str_field(op, "description");
            if !description.is_empty() {
                let _ = writeln!(out, "**Description:** {description}");
            }
            if let Some(tags) = op.get("tags").and_then(Value::as_array) {
                let tags: Vec<&str> = tags.iter().filter_map(Value::as_str).collect();
                if !tags.is_empty() {
                    let _ = writeln!(out, "**Tags:** {}", tags.join(", "));
                }
            }
            write_parameters(out, op);
            write_request_body(out, op);
            write_responses(out, op);
        }
    }
}

fn write_parameters(out: &mut String, op: &Value) {
    let Some(params) = op.get("parameters").and_then(Value::as_array) else {
        return;
    };
    if params.is_empty() {
        return;
    }
    out.push_str("\n**Parameters:**\n");
    for param in params.iter().filter(|p| p.is_object()) {
        let name = param
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        let location = param.get("in").and_then(Value::as_str).unwrap_or("query");
        let required = param
            .get("required")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let req = if required { "[required]" } else { "[optional]" };
        let desc = str_field(param, "description");
        let _ = writeln!(out, "- `{name}` ({location}, {req}) - {desc}");
    }
}

fn write_request_body(out: &mut String, op: &Value) {
    let Some(content) = op
        .get("requestBody")
        .and_then(|b| b.get("content"))
        .and_then(Value::as_object)
        .filter(|c| !c.is_empty())
    else {
        return;
    };
    out.push_str("\n**Request Body:**\n");
    for (content_type, media) in content {
        let Some(body_schema) = media
            .get("schema")
            .filter(|s| s.as_object().is_some_and(|o| !o.is_empty()))
        else {
            continue;
        };
        let _ = writeln!(out, "- Content-Type: `{content_type}`");
        if body_schema.get("type").and_then(Value::as_str) == Some("object") {
            if let Some(props) = body_schema
                .get("properties")
                .and_then(Value::as_object)
                .filter(|p| !p.is_empty())
            {
                let names: Vec<&str> = props
                    .keys()
                    .take(MAX_BODY_PROPERTIES)
                    .map(String::as_str)
                    .collect();
                let more = if props.len() > MAX_BODY_PROPERTIES { "..." } else { "" };
                let _ = writeln!(out, "- Properties: {}{more}", names.join(", "));
            }
        }
    }
}

fn write_responses(out: &mut String, op: &Value) {
    let Some(responses) = op
        .get("responses")
        .and_then(Value::as_object)
        .filter(|r| !r.is_empty())
    else {
        return;
    };
    out.push_str("\n**Responses:**\n");
    let mut codes: Vec<(&String, &Value)> = responses.iter().collect();
    codes.sort_by(|a, b| a.0.cmp(b.0));
    for (code, response) in codes.into_iter().filter(|(_, r)| r.is_object()) {
        let desc = response
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or("No description");
        let _ = writeln!(out, "- `{code}`: {desc}");
    }
}

fn write_components(out: &mut String, schema: &Value) {
    let Some(schemas) = schema
        .get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(Value::as_object)
        .filter(|s| !s.is_empty())
    else {
        return;
    };
    out.push_str("\n# Data Models (Schemas)\n");

    let mut names: Vec<(&String, &Value)> = schemas.iter().collect();
    names.sort_by(|a, b| a.0.cmp(b.0));
    for (name, def) in names.into_iter().take(MAX_CONTEXT_SCHEMAS) {
        if !def.is_object() {
            continue;
        }
        let _ = writeln!(out, "\n## `{name}`");
        let description = str_field(def, "description");
        if !description.is_empty() {
            let _ = writeln!(out, "*{description}*");
        }
        let Some(props) = def
            .get("properties")
            .and_then(Value::as_object)
            .filter(|p| !p.is_empty())
        else {
            continue;
        };
        out.push_str("\n**Properties:**\n");
        for (prop, prop_def) in props.iter().take(MAX_CONTEXT_PROPERTIES) {
            if !prop_def.is_object() {
                continue;
            }
            let ptype = prop_def.get("type").and_then(Value::as_str).unwrap_or("any");
            let required = prop_def
                .get("required")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let req = if required { "[required]" } else { "[optional]" };
            let desc = str_field(prop_def, "description");
            let _ = writeln!(out, "- `{prop}` ({ptype}, {req}): {desc}");
        }
    }
}

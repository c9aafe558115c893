//! Prompt augmentation for structured (JSON) output.

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;

use crate::types::{ProviderRequest, ResponseFormat};

#[derive(Debug, Deserialize)]
struct LegacyFormat {
    fields: Vec<LegacyField>,
}

#[derive(Debug, Deserialize)]
struct LegacyField {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

/// Natural-language directives describing the requested output shape.
///
/// JSON Schema formats are passed to providers natively and yield no extra
/// guidance. Legacy `fields` lists produce an example object plus field
/// descriptions. Anything else yields an empty string.
pub fn instructions(format: &ResponseFormat) -> String {
    let value = match format {
        ResponseFormat::Schema(value) => value.clone(),
        ResponseFormat::Text(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => value,
            Err(_) => return String::new(),
        },
    };

    if is_json_schema(&value) {
        return String::new();
    }

    let Ok(legacy) = serde_json::from_value::<LegacyFormat>(value) else {
        return String::new();
    };
    if legacy.fields.is_empty() {
        return String::new();
    }

    let example = legacy
        .fields
        .iter()
        .map(|field| format!("  \"{}\": {}", field.name, example_value(field)))
        .collect::<Vec<_>>()
        .join(",\n");

    let descriptions = legacy
        .fields
        .iter()
        .map(describe_field)
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Please provide your response in the following JSON format:\n{{\n{example}\n}}\n\n\
         Field descriptions:\n{descriptions}\n\n\
         Your response MUST be valid JSON and include all the specified fields with their correct types."
    )
}

fn is_json_schema(value: &Value) -> bool {
    let Some(object) = value.as_object() else {
        return false;
    };
    object.contains_key("schema")
        || (object.get("type").and_then(Value::as_str) == Some("object")
            && object.contains_key("properties"))
}

fn property_type(prop: &Value) -> &str {
    prop.get("type").and_then(Value::as_str).unwrap_or("string")
}

fn example_value(field: &LegacyField) -> String {
    if let (Some(properties), "object") = (&field.properties, field.kind.as_str()) {
        let inner = properties
            .iter()
            .map(|(key, prop)| {
                let placeholder = if property_type(prop) == "number" { "0" } else { "\"value\"" };
                format!("    \"{key}\": {placeholder}")
            })
            .collect::<Vec<_>>()
            .join(",\n");
        return format!("{{\n{inner}\n  }}");
    }

    match field.kind.as_str() {
        "number" => "0",
        "boolean" => "true/false",
        "array" => "[]",
        "object" => "{}",
        _ => "\"value\"",
    }
    .to_string()
}

fn describe_field(field: &LegacyField) -> String {
    let mut desc = format!("{} ({})", field.name, field.kind);
    if let Some(description) = field.description.as_deref().filter(|d| !d.is_empty()) {
        desc.push_str(": ");
        desc.push_str(description);
    }
    if let (Some(properties), "object") = (&field.properties, field.kind.as_str()) {
        desc.push_str("\nProperties:");
        for (key, prop) in properties {
            let prop_desc = prop.get("description").and_then(Value::as_str).unwrap_or("");
            desc.push_str(&format!("\n  - {key} ({}): {prop_desc}", property_type(prop)));
        }
    }
    desc
}

/// Resolve `response_format` on a request.
///
/// An empty string clears the field. Otherwise non-blank instructions are
/// appended to the system prompt, separated by a blank line.
pub fn apply_response_format(request: &mut ProviderRequest) {
    let Some(format) = request.response_format.as_ref() else {
        return;
    };

    if format.is_empty() {
        info!("Empty response format provided, ignoring it");
        request.response_format = None;
        return;
    }

    let instructions = instructions(format);
    if instructions.trim().is_empty() {
        return;
    }

    let original = request.system_prompt.as_deref().unwrap_or("");
    request.system_prompt = Some(format!("{original}\n\n{instructions}").trim().to_string());
    info!("Added structured output instructions to system prompt");
}

//! Reading exported resource files as JSON.

use serde_json::Value;
use std::path::Path;

use crate::error::{Error, Result};

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

/// Parse resource text, converting YAML to JSON when `path` says it is YAML.
pub fn parse_resource(content: &str, path: &Path) -> Result<Value> {
    let display = path.display().to_string();
    if is_yaml(path) {
        serde_yml::from_str::<Value>(content).map_err(|e| Error::resource_read(display, e.to_string()))
    } else {
        serde_json::from_str::<Value>(content).map_err(|e| Error::resource_read(display, e.to_string()))
    }
}

pub fn read_resource(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::resource_read(path.display().to_string(), e.to_string()))?;
    parse_resource(&content, path)
}

/// String field lookup that tolerates missing or non-string values.
pub fn str_field<'a>(value: &'a Value, field: &str) -> Option<&'a str> {
    value.get(field).and_then(Value::as_str)
}

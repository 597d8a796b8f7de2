//! File-backed property sources.
//!
//! `{name}.toml` files in a directory become property sources named by their
//! file stem. Nested tables flatten to dotted keys, so
//! `[limits-service] minimum = 3` yields `limits-service.minimum = 3`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::config::loader::ConfigError;

/// Flat key/value properties of one source.
pub type Properties = BTreeMap<String, Value>;

/// Name of the source backing `(application, profile)`.
pub fn source_name(application: &str, profile: &str) -> String {
    if profile == "default" {
        application.to_string()
    } else {
        format!("{}-{}", application, profile)
    }
}

/// Read every `*.toml` file in `dir`. A missing directory yields no sources.
pub fn load_directory(dir: &Path) -> Result<BTreeMap<String, Properties>, ConfigError> {
    let mut sources = BTreeMap::new();
    if !dir.is_dir() {
        tracing::warn!(path = %dir.display(), "Config repository directory not found");
        return Ok(sources);
    }

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let content = fs::read_to_string(&path)?;
        let table: toml::Table = content.parse()?;
        sources.insert(name.to_lowercase(), flatten(table));
    }
    Ok(sources)
}

/// Parse TOML text into flat properties.
pub fn parse_properties(content: &str) -> Result<Properties, ConfigError> {
    let table: toml::Table = content.parse()?;
    Ok(flatten(table))
}

fn flatten(table: toml::Table) -> Properties {
    let mut out = Properties::new();
    flatten_into("", table, &mut out);
    out
}

fn flatten_into(prefix: &str, table: toml::Table, out: &mut Properties) {
    for (key, value) in table {
        let key = if prefix.is_empty() {
            key
        } else {
            format!("{}.{}", prefix, key)
        };
        match value {
            toml::Value::Table(nested) => flatten_into(&key, nested, out),
            other => {
                out.insert(key, to_json(other));
            }
        }
    }
}

fn to_json(value: toml::Value) -> Value {
    match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(d) => Value::String(d.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table.into_iter().map(|(k, v)| (k, to_json(v))).collect(),
        ),
    }
}

//! Output rendering
//!
//! Commands produce a `serde_json::Value`; this module turns it into what is
//! printed on stdout.

use anyhow::Result;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    /// Plain `key: value` lines
    Text,
}

/// Render `value` in the requested format
pub fn render(value: &Value, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(value)?.trim_end().to_string()),
        OutputFormat::Text => Ok(render_text(value)),
    }
}

/// Print `value` to stdout
pub fn print(value: &Value, format: OutputFormat) -> Result<()> {
    let rendered = render(value, format)?;
    if !rendered.is_empty() {
        println!("{rendered}");
    }
    Ok(())
}

fn render_text(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .map(render_text)
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{k}: {}", scalar(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => scalar(other),
    }
}

/// Single-line form of a value
fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_object() {
        let v = json!({"name": "photos", "count": 3, "region": null});
        assert_eq!(
            render(&v, OutputFormat::Text).unwrap(),
            "count: 3\nname: photos\nregion: -"
        );
    }

    #[test]
    fn test_text_list_of_strings() {
        let v = json!(["a", "b"]);
        assert_eq!(render(&v, OutputFormat::Text).unwrap(), "a\nb");
    }

    #[test]
    fn test_yaml() {
        let v = json!({"created": true});
        assert_eq!(render(&v, OutputFormat::Yaml).unwrap(), "created: true");
    }

    #[test]
    fn test_json_is_pretty() {
        let v = json!({"a": 1});
        assert_eq!(render(&v, OutputFormat::Json).unwrap(), "{\n  \"a\": 1\n}");
    }
}

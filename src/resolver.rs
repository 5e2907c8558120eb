//! Reference scanning and output resolution.
//!
//! Attribute values may embed `${id.output}` placeholders pointing at the
//! outputs of other resources. This module scans attribute trees for those
//! references (feeding the dependency graph builder) and substitutes
//! concrete output values once producers have confirmed (feeding the apply
//! executor).

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::config::ResourceSpec;
use crate::error::{ConfigError, ExecError, Result, StratusError};

/// A parsed reference to another resource's output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    /// Logical id of the producing resource.
    pub target: String,
    /// Name of the referenced output.
    pub output: String,
}

impl Reference {
    /// Parses a reference from placeholder text of the form `id.output`.
    fn parse(text: &str) -> std::result::Result<Self, String> {
        let Some((target, output)) = text.split_once('.') else {
            return Err(String::from("expected '<id>.<output>'"));
        };

        if target.is_empty() || output.is_empty() {
            return Err(String::from("id and output must be non-empty"));
        }

        Ok(Self {
            target: target.to_string(),
            output: output.to_string(),
        })
    }
}

impl std::fmt::Display for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "${{{}.{}}}", self.target, self.output)
    }
}

/// Extracts all placeholder bodies from a string.
fn placeholders(text: &str) -> std::result::Result<Vec<&str>, String> {
    let mut found = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            return Err(format!("unterminated placeholder in '{text}'"));
        };
        found.push(&after[..end]);
        rest = &after[end + 1..];
    }

    Ok(found)
}

/// Scans a string for references.
fn scan_text(text: &str) -> std::result::Result<Vec<Reference>, String> {
    placeholders(text)?
        .into_iter()
        .map(Reference::parse)
        .collect()
}

/// Recursively scans a value tree for references.
fn scan_value(value: &Value) -> std::result::Result<Vec<Reference>, String> {
    match value {
        Value::String(s) => scan_text(s),
        Value::Array(items) => {
            let mut refs = Vec::new();
            for item in items {
                refs.extend(scan_value(item)?);
            }
            Ok(refs)
        }
        Value::Object(map) => {
            let mut refs = Vec::new();
            for item in map.values() {
                refs.extend(scan_value(item)?);
            }
            Ok(refs)
        }
        _ => Ok(Vec::new()),
    }
}

/// Scans a resource spec's attributes for references to other resources.
///
/// # Errors
///
/// Returns `ConfigError::InvalidReference` if a placeholder is malformed.
pub fn scan_spec(spec: &ResourceSpec) -> Result<Vec<Reference>> {
    let mut refs = Vec::new();

    for (attr, value) in &spec.attributes {
        refs.extend(scan_value(value).map_err(|message| {
            StratusError::Config(ConfigError::InvalidReference {
                id: spec.id.clone(),
                reference: format!("{attr}: {value}"),
                message,
            })
        })?);
    }

    Ok(refs)
}

/// Table of confirmed outputs, keyed by producing resource id.
///
/// Populated by the apply executor as operations confirm; seeded from
/// recorded state for unchanged and imported resources.
#[derive(Debug, Default)]
pub struct OutputTable {
    outputs: HashMap<String, HashMap<String, String>>,
}

impl OutputTable {
    /// Creates an empty output table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the confirmed outputs of a resource.
    pub fn record(&mut self, id: impl Into<String>, outputs: HashMap<String, String>) {
        self.outputs.insert(id.into(), outputs);
    }

    /// Returns true if the resource's outputs are available.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.outputs.contains_key(id)
    }

    /// Looks up a single output value.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::OutputUnavailable` if the producer has not
    /// confirmed yet. Under correct scheduling this cannot happen; it
    /// guards against scheduler invariant violations.
    pub fn get(&self, reference: &Reference) -> Result<&str> {
        self.outputs
            .get(&reference.target)
            .and_then(|outputs| outputs.get(&reference.output))
            .map(String::as_str)
            .ok_or_else(|| {
                StratusError::Exec(ExecError::OutputUnavailable {
                    id: reference.target.clone(),
                    output: reference.output.clone(),
                })
            })
    }

    /// Substitutes references in a string.
    fn resolve_text(&self, text: &str) -> Result<String> {
        let refs = scan_text(text).map_err(StratusError::internal)?;
        if refs.is_empty() {
            return Ok(text.to_string());
        }

        let mut resolved = text.to_string();
        for reference in refs {
            let value = self.get(&reference)?;
            resolved = resolved.replace(&reference.to_string(), value);
        }

        Ok(resolved)
    }

    /// Substitutes references throughout a value tree.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::OutputUnavailable` if any referenced output is
    /// not yet confirmed.
    pub fn resolve_value(&self, value: &Value) -> Result<Value> {
        match value {
            Value::String(s) => Ok(Value::String(self.resolve_text(s)?)),
            Value::Array(items) => {
                let resolved: Result<Vec<Value>> =
                    items.iter().map(|item| self.resolve_value(item)).collect();
                Ok(Value::Array(resolved?))
            }
            Value::Object(map) => {
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (key, item) in map {
                    resolved.insert(key.clone(), self.resolve_value(item)?);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    /// Resolves an entire attribute map into concrete values.
    ///
    /// # Errors
    ///
    /// Returns `ExecError::OutputUnavailable` if any referenced output is
    /// not yet confirmed.
    pub fn resolve_attributes(
        &self,
        attributes: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>> {
        let mut resolved = BTreeMap::new();
        for (key, value) in attributes {
            resolved.insert(key.clone(), self.resolve_value(value)?);
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResourceKind;

    fn spec_with_attr(attr: &str, value: Value) -> ResourceSpec {
        let mut attributes = BTreeMap::new();
        attributes.insert(attr.to_string(), value);
        ResourceSpec {
            id: String::from("cdn"),
            kind: ResourceKind::Distribution,
            depends_on: vec![],
            attributes,
        }
    }

    #[test]
    fn test_scan_finds_references() {
        let spec = spec_with_attr(
            "certificate_arn",
            Value::String(String::from("${cert.certificate_arn}")),
        );

        let refs = scan_spec(&spec).expect("scan should succeed");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "cert");
        assert_eq!(refs[0].output, "certificate_arn");
    }

    #[test]
    fn test_scan_nested_values() {
        let spec = spec_with_attr(
            "origins",
            serde_json::json!([
                { "domain": "${assets.bucket_domain}" },
                { "domain": "static.example.com" },
            ]),
        );

        let refs = scan_spec(&spec).expect("scan should succeed");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target, "assets");
    }

    #[test]
    fn test_scan_rejects_malformed_placeholder() {
        let spec = spec_with_attr("target", Value::String(String::from("${no-dot-here}")));
        assert!(scan_spec(&spec).is_err());
    }

    #[test]
    fn test_scan_rejects_unterminated_placeholder() {
        let spec = spec_with_attr("target", Value::String(String::from("${cert.arn")));
        assert!(scan_spec(&spec).is_err());
    }

    #[test]
    fn test_resolve_whole_and_embedded() {
        let mut table = OutputTable::new();
        table.record(
            "cdn",
            HashMap::from([(String::from("domain_name"), String::from("d111.cdn.example"))]),
        );

        let whole = table
            .resolve_value(&Value::String(String::from("${cdn.domain_name}")))
            .expect("resolve should succeed");
        assert_eq!(whole, Value::String(String::from("d111.cdn.example")));

        let embedded = table
            .resolve_value(&Value::String(String::from("https://${cdn.domain_name}/index.html")))
            .expect("resolve should succeed");
        assert_eq!(
            embedded,
            Value::String(String::from("https://d111.cdn.example/index.html"))
        );
    }

    #[test]
    fn test_unavailable_output_is_defensive_error() {
        let table = OutputTable::new();
        let result = table.resolve_value(&Value::String(String::from("${cert.certificate_arn}")));

        match result {
            Err(StratusError::Exec(ExecError::OutputUnavailable { id, output })) => {
                assert_eq!(id, "cert");
                assert_eq!(output, "certificate_arn");
            }
            other => panic!("expected OutputUnavailable, got {other:?}"),
        }
    }
}

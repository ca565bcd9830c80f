//! Conversions between the manifest generator's JSON output and the YAML
//! files written to environment branches.

use std::collections::BTreeMap;

use anyhow::Context;
use serde::Deserialize;

/// Separator emitted between combined YAML documents.
const DOCUMENT_SEPARATOR: &str = "---\n";

#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    #[error("manifest {index} does not specify a kind")]
    MissingKind { index: usize },
    #[error("manifest {index} does not specify metadata.name")]
    MissingName { index: usize },
    #[error("cannot parse yaml stream")]
    Parse(#[from] serde_yaml::Error),
}

/// Convert JSON documents to canonical YAML bytes, one per input.
pub fn json_strings_to_yaml_bytes(docs: &[String]) -> anyhow::Result<Vec<Vec<u8>>> {
    docs.iter()
        .map(|doc| {
            let value: serde_json::Value =
                serde_json::from_str(doc).context("manifest is not valid json")?;
            let yaml = serde_yaml::to_string(&value).context("cannot convert manifest to yaml")?;
            Ok(yaml.into_bytes())
        })
        .collect()
}

/// Join YAML documents with a `---` separator line.
pub fn combine_yaml(docs: &[Vec<u8>]) -> Vec<u8> {
    let mut combined = Vec::new();
    for (i, doc) in docs.iter().enumerate() {
        if i > 0 {
            combined.extend_from_slice(DOCUMENT_SEPARATOR.as_bytes());
        }
        combined.extend_from_slice(doc);
        if !doc.ends_with(b"\n") {
            combined.push(b'\n');
        }
    }
    combined
}

/// Split a combined YAML stream into a map keyed `<name>-<kind>`, lowercased.
///
/// Duplicate keys overwrite silently; callers guarantee uniqueness.
pub fn split_yaml(combined: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, SplitError> {
    let mut resources = BTreeMap::new();
    for (index, document) in serde_yaml::Deserializer::from_slice(combined).enumerate() {
        let value = serde_yaml::Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        let kind = string_field(&value, "kind")
            .ok_or(SplitError::MissingKind { index })?;
        let name = value
            .get("metadata")
            .and_then(|m| string_field(m, "name"))
            .ok_or(SplitError::MissingName { index })?;
        let key = format!("{}-{}", name.to_lowercase(), kind.to_lowercase());
        let bytes = serde_yaml::to_string(&value)?.into_bytes();
        resources.insert(key, bytes);
    }
    Ok(resources)
}

fn string_field(value: &serde_yaml::Value, field: &str) -> Option<String> {
    let s = value.get(field)?.as_str()?;
    (!s.is_empty()).then(|| s.to_string())
}

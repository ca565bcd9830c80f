//! Per-branch metadata persisted on rendered branches.

use anyhow::Context;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};

/// Directory holding kargo-render's own files on a rendered branch.
/// Always preserved when a branch working tree is cleaned.
pub const METADATA_DIR: &str = ".kargo-render";
const METADATA_FILE: &str = "metadata.yaml";

/// Record of how the current state of a target branch was produced.
///
/// Written on every successful render, before the commit that carries it.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchMetadata {
    /// The source revision the branch state was rendered from.
    #[serde(default)]
    pub source_commit: String,
    /// Image references applied by the last render. Replaced, never appended.
    #[serde(default)]
    pub image_substitutions: Vec<String>,
}

/// Repository-relative path of the metadata file.
pub fn metadata_path() -> String {
    format!("{METADATA_DIR}/{METADATA_FILE}")
}

/// Read branch metadata from a working tree. `None` if the branch carries no
/// metadata file.
pub fn load_metadata(dir: &Utf8Path) -> anyhow::Result<Option<BranchMetadata>> {
    let path = dir.join(METADATA_DIR).join(METADATA_FILE);
    let content = match fs_err::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("cannot read branch metadata {path:?}")),
    };
    let metadata = serde_yaml::from_str(&content)
        .with_context(|| format!("invalid branch metadata {path:?}"))?;
    Ok(Some(metadata))
}

/// Write branch metadata into a working tree, creating the metadata
/// directory if needed.
pub fn write_metadata(dir: &Utf8Path, metadata: &BranchMetadata) -> anyhow::Result<()> {
    let metadata_dir = dir.join(METADATA_DIR);
    fs_err::create_dir_all(&metadata_dir)
        .with_context(|| format!("cannot create metadata directory {metadata_dir:?}"))?;
    let path = metadata_dir.join(METADATA_FILE);
    let content =
        serde_yaml::to_string(metadata).context("cannot serialize branch metadata")?;
    fs_err::write(&path, content)
        .with_context(|| format!("cannot write branch metadata {path:?}"))?;
    Ok(())
}

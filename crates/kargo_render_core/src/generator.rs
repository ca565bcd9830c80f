//! Interface to the external manifest generator.
//!
//! The generator templates one application (Helm chart, Kustomize overlay,
//! plain directory, or plugin) against the source working tree and returns
//! the resulting resources as JSON document strings. The core never writes
//! its output to disk; everything downstream operates on memory-resident
//! bytes.

use camino::{Utf8Path, Utf8PathBuf};

use crate::repo_config::ConfigManagement;

/// One application to template, resolved against the source working tree.
#[derive(Debug, Clone)]
pub struct ApplicationSource<'a> {
    /// Root of the source working tree.
    pub repo_root: &'a Utf8Path,
    /// Absolute path of the app under the repo root.
    pub app_path: Utf8PathBuf,
    /// Templating tool and its settings.
    pub config_management: &'a ConfigManagement,
}

pub trait ManifestGenerator {
    /// Template one application and return its resources as JSON document
    /// strings. An empty result is not an error at this stage.
    fn generate(
        &self,
        source: ApplicationSource<'_>,
    ) -> impl Future<Output = anyhow::Result<Vec<String>>> + Send;
}

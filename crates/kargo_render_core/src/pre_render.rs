//! Pre-rendering: run the manifest generator for every app of a branch.

use std::collections::BTreeMap;

use camino::Utf8Path;
use tracing::{debug, instrument};

use crate::error::{RenderError, Result};
use crate::generator::{ApplicationSource, ManifestGenerator};
use crate::manifests;
use crate::repo_config::BranchConfig;

/// Template every app of the branch config against the source working tree.
///
/// Returns one combined YAML blob per app, keyed by app name. Nothing is
/// written to the filesystem; an app rendering to nothing is allowed at this
/// stage.
#[instrument(skip_all)]
pub async fn pre_render_apps<G: ManifestGenerator>(
    generator: &G,
    repo_root: &Utf8Path,
    branch_config: &BranchConfig,
) -> Result<BTreeMap<String, Vec<u8>>> {
    let mut prerendered = BTreeMap::new();
    for (app_name, app_config) in &branch_config.app_configs {
        debug!("pre-rendering app {app_name}");
        let source = ApplicationSource {
            repo_root,
            app_path: repo_root.join(&app_config.config_management.path),
            config_management: &app_config.config_management,
        };
        let docs = generator
            .generate(source)
            .await
            .map_err(|source| RenderError::Render {
                app: app_name.clone(),
                source,
            })?;
        let yamls =
            manifests::json_strings_to_yaml_bytes(&docs).map_err(|source| RenderError::Render {
                app: app_name.clone(),
                source,
            })?;
        prerendered.insert(app_name.clone(), manifests::combine_yaml(&yamls));
    }
    Ok(prerendered)
}

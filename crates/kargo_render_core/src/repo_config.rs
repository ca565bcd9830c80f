//! Loading and resolving `kargo-render.{json,yaml}`.

use std::collections::BTreeMap;

use anyhow::{Context, bail};
use camino::Utf8Path;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::expand;

/// File names probed at the root of the source tree, in order.
const CONFIG_FILES: [&str; 2] = ["kargo-render.json", "kargo-render.yaml"];

const CONFIG_SCHEMA: &str = include_str!("../schema/kargo-render-schema.json");

/// Repository-level configuration: one entry per (class of) target branch.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoConfig {
    #[serde(default)]
    pub config_version: Option<String>,
    #[serde(default)]
    pub branch_configs: Vec<BranchConfig>,
}

/// Configuration for one target branch, matched by exact name or by regex
/// pattern.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub pattern: String,
    #[serde(default)]
    pub app_configs: BTreeMap<String, AppConfig>,
    #[serde(default)]
    pub prs: PrPolicy,
    /// Repository-relative paths exempt from branch cleaning.
    #[serde(default)]
    pub preserved_paths: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub use_unique_branch_names: bool,
}

/// Per-application rendering configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    pub config_management: ConfigManagement,
    /// Destination under the target branch root. Defaults to the app name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    /// Emit a single `all.yaml` instead of one file per resource.
    #[serde(default)]
    pub combine_manifests: bool,
}

impl AppConfig {
    pub fn effective_output_path<'a>(&'a self, app_name: &'a str) -> &'a str {
        self.output_path.as_deref().unwrap_or(app_name)
    }

    /// Expand `${n}` placeholders in every string field, however deeply
    /// nested in the config-management settings.
    fn expand(&self, values: &[String]) -> anyhow::Result<Self> {
        let mut value = serde_json::to_value(self).context("cannot serialize app config")?;
        expand::expand_value(&mut value, values);
        serde_json::from_value(value).context("cannot deserialize expanded app config")
    }
}

/// Settings for the external manifest generator: the templating tool and the
/// path (relative to the repo root) it runs against.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigManagement {
    pub path: String,
    #[serde(flatten)]
    pub tool: Tool,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Tool {
    Helm(HelmOptions),
    Kustomize(KustomizeOptions),
    Directory(DirectoryOptions),
    Plugin(PluginOptions),
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Values files, relative to the app path.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub api_versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kube_version: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KustomizeOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_options: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryOptions {
    #[serde(default)]
    pub recurse: bool,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

/// The JSON schema the configuration file is validated against.
pub fn config_schema() -> &'static str {
    CONFIG_SCHEMA
}

/// Find, parse, and schema-validate the repository configuration.
///
/// Returns an empty config when no configuration file exists.
pub fn load_repo_config(repo_root: &Utf8Path) -> anyhow::Result<RepoConfig> {
    let Some((file_name, content)) = first_config_file(repo_root)? else {
        info!("no kargo-render configuration file found, using default configuration");
        return Ok(RepoConfig::default());
    };
    debug!("loading configuration from {file_name}");
    let instance: serde_json::Value = if file_name.ends_with(".json") {
        serde_json::from_str(&content)
            .with_context(|| format!("{file_name} is not valid json"))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("{file_name} is not valid yaml"))?
    };
    validate_config(&instance).with_context(|| format!("{file_name} failed validation"))?;
    serde_json::from_value(instance).with_context(|| format!("cannot deserialize {file_name}"))
}

fn first_config_file(repo_root: &Utf8Path) -> anyhow::Result<Option<(&'static str, String)>> {
    for file_name in CONFIG_FILES {
        match fs_err::read_to_string(repo_root.join(file_name)) {
            Ok(content) => return Ok(Some((file_name, content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read configuration {file_name}"));
            }
        }
    }
    Ok(None)
}

fn validate_config(instance: &serde_json::Value) -> anyhow::Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("embedded configuration schema is invalid")?;
    let validator = jsonschema::validator_for(&schema)
        .context("cannot compile configuration schema")?;
    let errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| e.to_string())
        .collect();
    if !errors.is_empty() {
        bail!("{}", errors.join("; "));
    }
    Ok(())
}

impl RepoConfig {
    /// Resolve the configuration for a target branch.
    ///
    /// Exact-name entries win over pattern entries. A pattern match expands
    /// `${n}` placeholders with the pattern's capture groups, where capture 0
    /// is the whole match. `None` if nothing matches.
    pub fn branch_config(&self, target_branch: &str) -> anyhow::Result<Option<BranchConfig>> {
        for branch_config in &self.branch_configs {
            if !branch_config.name.is_empty() && branch_config.name == target_branch {
                return Ok(Some(branch_config.clone()));
            }
        }
        for branch_config in &self.branch_configs {
            if branch_config.pattern.is_empty() {
                continue;
            }
            let regex = Regex::new(&branch_config.pattern).with_context(|| {
                format!("invalid branch pattern {:?}", branch_config.pattern)
            })?;
            if let Some(captures) = regex.captures(target_branch) {
                let values: Vec<String> = captures
                    .iter()
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect();
                debug!(
                    "target branch {target_branch} matched pattern {:?}",
                    branch_config.pattern
                );
                return Ok(Some(branch_config.expand(&values)?));
            }
        }
        Ok(None)
    }
}

impl BranchConfig {
    fn expand(&self, values: &[String]) -> anyhow::Result<Self> {
        let mut expanded = self.clone();
        for app_config in expanded.app_configs.values_mut() {
            *app_config = app_config.expand(values)?;
        }
        expanded.preserved_paths = expanded
            .preserved_paths
            .iter()
            .map(|p| expand::expand(p, values))
            .collect();
        Ok(expanded)
    }
}

/// The configuration assumed for a branch no entry matches: a single app
/// rooted at the path named after the branch.
pub fn default_branch_config(target_branch: &str) -> BranchConfig {
    let app_config = AppConfig {
        config_management: ConfigManagement {
            path: target_branch.to_string(),
            tool: Tool::Kustomize(KustomizeOptions::default()),
        },
        output_path: None,
        combine_manifests: false,
    };
    BranchConfig {
        name: target_branch.to_string(),
        app_configs: BTreeMap::from([("app".to_string(), app_config)]),
        ..BranchConfig::default()
    }
}

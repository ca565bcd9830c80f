//! Manifest generation backed by the templating tools on the PATH.
//!
//! Helm and Kustomize sources shell out to their respective binaries, plugin
//! sources run the configured command, and directory sources read manifest
//! files as they are. Whatever the tool, the output is normalized to JSON
//! document strings before it reaches the rendering core.

use anyhow::{Context, bail, ensure};
use camino::Utf8Path;
use kargo_render_core::{
    ApplicationSource, DirectoryOptions, HelmOptions, KustomizeOptions, ManifestGenerator,
    PluginOptions, Tool,
};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ExternalGenerator {}

impl ExternalGenerator {
    pub fn new() -> Self {
        Self {}
    }
}

impl ManifestGenerator for ExternalGenerator {
    async fn generate(&self, source: ApplicationSource<'_>) -> anyhow::Result<Vec<String>> {
        ensure!(
            source.app_path.is_dir(),
            "app path {} does not exist in the source tree",
            source.app_path
        );
        let yaml = match &source.config_management.tool {
            Tool::Helm(helm) => helm_template(&source, helm).await?,
            Tool::Kustomize(kustomize) => kustomize_build(&source, kustomize).await?,
            Tool::Directory(directory) => read_directory(&source.app_path, directory)?,
            Tool::Plugin(plugin) => run_plugin(&source, plugin).await?,
        };
        yaml_stream_to_json_docs(&yaml)
    }
}

async fn helm_template(
    source: &ApplicationSource<'_>,
    helm: &HelmOptions,
) -> anyhow::Result<String> {
    let release_name = helm.release_name.as_deref().unwrap_or("release");
    let mut command = Command::new("helm");
    command
        .arg("template")
        .arg(release_name)
        .arg(&source.app_path);
    if let Some(namespace) = &helm.namespace {
        command.arg("--namespace").arg(namespace);
    }
    for values in &helm.values {
        command.arg("--values").arg(source.app_path.join(values));
    }
    for api_version in &helm.api_versions {
        command.arg("--api-versions").arg(api_version);
    }
    if let Some(kube_version) = &helm.kube_version {
        command.arg("--kube-version").arg(kube_version);
    }
    run_command(command, "helm template").await
}

async fn kustomize_build(
    source: &ApplicationSource<'_>,
    kustomize: &KustomizeOptions,
) -> anyhow::Result<String> {
    let mut command = Command::new("kustomize");
    command.arg("build");
    if let Some(build_options) = &kustomize.build_options {
        command.args(build_options.split_whitespace());
    }
    command.arg(&source.app_path);
    run_command(command, "kustomize build").await
}

async fn run_plugin(
    source: &ApplicationSource<'_>,
    plugin: &PluginOptions,
) -> anyhow::Result<String> {
    let Some((program, args)) = plugin.command.split_first() else {
        bail!(
            "plugin source {} does not specify a command",
            plugin.name.as_deref().unwrap_or("<unnamed>")
        );
    };
    let mut command = Command::new(program);
    command.args(args).current_dir(&source.app_path);
    for (key, value) in &plugin.env {
        command.env(key, value);
    }
    run_command(command, program).await
}

/// Read `*.yaml`, `*.yml`, and `*.json` files of a directory source as they
/// are, sorted by path so the output is stable.
fn read_directory(app_path: &Utf8Path, directory: &DirectoryOptions) -> anyhow::Result<String> {
    let max_depth = if directory.recurse { usize::MAX } else { 1 };
    let mut files: Vec<_> = walkdir::WalkDir::new(app_path)
        .min_depth(1)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .collect::<Result<_, _>>()
        .context("cannot walk directory source")?;
    files.retain(|entry| {
        entry.file_type().is_file()
            && matches!(
                entry.path().extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml" | "json")
            )
    });
    let mut stream = String::new();
    for entry in files {
        let content = fs_err::read_to_string(entry.path())?;
        if !stream.is_empty() {
            stream.push_str("---\n");
        }
        stream.push_str(&content);
        if !content.ends_with('\n') {
            stream.push('\n');
        }
    }
    Ok(stream)
}

async fn run_command(mut command: Command, name: &str) -> anyhow::Result<String> {
    debug!("running {name}");
    let output = command
        .output()
        .await
        .with_context(|| format!("cannot run {name}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{name} failed: {stderr}");
    }
    String::from_utf8(output.stdout).with_context(|| format!("{name} output is not valid utf-8"))
}

/// Normalize a multi-document YAML stream to JSON document strings, dropping
/// empty documents.
fn yaml_stream_to_json_docs(yaml: &str) -> anyhow::Result<Vec<String>> {
    let mut docs = vec![];
    for document in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_json::Value::deserialize(document)
            .context("templating output is not valid yaml")?;
        if value.is_null() {
            continue;
        }
        docs.push(serde_json::to_string(&value).context("cannot convert manifest to json")?);
    }
    Ok(docs)
}

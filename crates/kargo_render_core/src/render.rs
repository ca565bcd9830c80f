//! The rendering orchestrator: drives one request through validation, source
//! acquisition, pre-rendering, branch switching, the last-mile
//! transformation, and publication.

use std::collections::BTreeMap;

use anyhow::anyhow;
use camino::Utf8Path;
use tokio_util::sync::CancellationToken;
use tracing::{Span, debug, info, instrument};

use crate::branches;
use crate::commit;
use crate::error::{RenderError, Result};
use crate::forge::{GitClient, GitForge, Pr, PrOutcome};
use crate::fs_utils;
use crate::generator::ManifestGenerator;
use crate::last_mile;
use crate::manifests;
use crate::metadata::{self, BranchMetadata};
use crate::pre_render;
use crate::repo_config::{self, BranchConfig};
use crate::repo_url::RepoUrl;
use crate::request::{ActionTaken, RenderRequest, RenderResponse};
use crate::tmp_repo::TempRepo;

const STDOUT_RULE: &str = "--------------------------------------------------";

/// Stateless rendering service.
///
/// One instance can serve any number of requests; every request works in its
/// own private on-disk home, so requests may run concurrently as long as the
/// caller serializes the ones targeting the same commit branch (the remote
/// sees last-writer-wins otherwise).
#[derive(Debug)]
pub struct Renderer<G> {
    generator: G,
}

/// Everything accumulated while serving one request. Single-use: built on
/// entry, dropped (removing the repo's on-disk home) on every exit path.
struct RequestContext {
    request: RenderRequest,
    repo: TempRepo,
    source_commit: String,
    /// Metadata found at the requested ref, when the ref turned out to be an
    /// already-rendered revision that had to be followed back to its source.
    intermediate_metadata: Option<BranchMetadata>,
    target: TargetContext,
}

#[derive(Default)]
struct TargetContext {
    branch_config: BranchConfig,
    old_branch_metadata: Option<BranchMetadata>,
    new_branch_metadata: BranchMetadata,
    prerendered_manifests: BTreeMap<String, Vec<u8>>,
    rendered_manifests: BTreeMap<String, Vec<u8>>,
    commit_branch: String,
}

impl<G: ManifestGenerator> Renderer<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    /// Render one request end-to-end and publish the result as the request
    /// asks: straight to the target branch, through a PR, to a local
    /// directory, or to standard output.
    #[instrument(skip_all, fields(request_id))]
    pub async fn render(
        &self,
        request: RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderResponse> {
        let request = request.canonicalize_and_validate()?;
        Span::current().record("request_id", request.id.as_str());
        info!(
            "rendering manifests into branch {} of {}",
            request.target_branch,
            request
                .local_in_path
                .as_ref()
                .map(|p| p.to_string())
                .unwrap_or_else(|| request.repo_url.clone())
        );

        checkpoint(cancel)?;
        let repo = acquire_source_tree(&request)?;
        let (source_commit, intermediate_metadata) = resolve_source(&repo, &request)?;
        debug!("resolved source commit {source_commit}");

        let mut ctx = RequestContext {
            request,
            repo,
            source_commit,
            intermediate_metadata,
            target: TargetContext::default(),
        };
        if let Some(intermediate) = &ctx.intermediate_metadata {
            debug!(
                "the requested ref had been rendered with {} image substitutions",
                intermediate.image_substitutions.len()
            );
        }

        checkpoint(cancel)?;
        ctx.target.branch_config = resolve_branch_config(&ctx)?;

        checkpoint(cancel)?;
        ctx.target.prerendered_manifests = pre_render::pre_render_apps(
            &self.generator,
            ctx.repo.directory(),
            &ctx.target.branch_config,
        )
        .await?;

        // Terminal paths that never touch the remote.
        if ctx.request.stdout {
            return render_to_stdout(&mut ctx);
        }
        if let Some(local_out_path) = ctx.request.local_out_path.clone() {
            return render_to_local_path(&mut ctx, &local_out_path);
        }

        checkpoint(cancel)?;
        branches::switch_to_target_branch(ctx.repo.repo(), &ctx.request.target_branch)?;
        ctx.target.old_branch_metadata =
            metadata::load_metadata(ctx.repo.directory()).map_err(RenderError::Io)?;
        if let Some(old) = &ctx.target.old_branch_metadata {
            debug!(
                "target branch was last rendered from commit {}",
                old.source_commit
            );
        }

        checkpoint(cancel)?;
        ctx.target.commit_branch = branches::switch_to_commit_branch(
            ctx.repo.repo(),
            &ctx.request.target_branch,
            &ctx.request.id,
            &ctx.target.branch_config,
        )?;

        run_last_mile(&mut ctx)?;

        checkpoint(cancel)?;
        write_rendered_tree(
            ctx.repo.directory(),
            &ctx.target.branch_config,
            &ctx.target.rendered_manifests,
        )?;
        metadata::write_metadata(ctx.repo.directory(), &ctx.target.new_branch_metadata)
            .map_err(RenderError::Io)?;

        if !commit::has_meaningful_changes(ctx.repo.repo()).map_err(RenderError::Git)? {
            info!("only branch metadata changed; nothing to publish");
            let head = ctx
                .repo
                .repo()
                .current_commit_hash()
                .map_err(RenderError::Git)?;
            return Ok(response(ActionTaken::None, Some(head)));
        }

        checkpoint(cancel)?;
        let message = commit_message(&ctx)?;
        let commit_id =
            commit::commit_and_push(ctx.repo.repo(), &ctx.target.commit_branch, &message)
                .map_err(RenderError::Git)?;

        if !ctx.target.branch_config.prs.enabled {
            return Ok(response(ActionTaken::PushedDirectly, Some(commit_id)));
        }

        checkpoint(cancel)?;
        match open_pr(&ctx, &message, cancel).await? {
            PrOutcome::Opened { url } => Ok(RenderResponse {
                pr_url: Some(url),
                ..response(ActionTaken::OpenedPr, Some(commit_id))
            }),
            PrOutcome::AlreadyExists => Ok(response(ActionTaken::UpdatedPr, Some(commit_id))),
        }
    }
}

fn response(action_taken: ActionTaken, commit_id: Option<String>) -> RenderResponse {
    RenderResponse {
        action_taken,
        commit_id,
        pr_url: None,
        manifests: None,
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(RenderError::Cancelled);
    }
    Ok(())
}

fn acquire_source_tree(request: &RenderRequest) -> Result<TempRepo> {
    match &request.local_in_path {
        Some(path) => TempRepo::copy_of_local_clone(path).map_err(RenderError::Git),
        None => {
            TempRepo::clone(&request.repo_url, &request.repo_creds).map_err(RenderError::Git)
        }
    }
}

/// Determine the source commit to render from.
///
/// When the requested ref turns out to be a revision kargo-render itself
/// produced, its branch metadata points back at the real source; a single
/// hop suffices, and the hop target must not be rendered itself.
fn resolve_source(
    repo: &TempRepo,
    request: &RenderRequest,
) -> Result<(String, Option<BranchMetadata>)> {
    if request.git_ref.is_empty() {
        let head = repo
            .repo()
            .current_commit_hash()
            .map_err(RenderError::Git)?;
        return Ok((head, None));
    }

    repo.repo()
        .checkout(&request.git_ref)
        .map_err(RenderError::Git)?;
    let Some(intermediate) =
        metadata::load_metadata(repo.directory()).map_err(RenderError::Io)?
    else {
        let head = repo
            .repo()
            .current_commit_hash()
            .map_err(RenderError::Git)?;
        return Ok((head, None));
    };

    if intermediate.source_commit.is_empty() {
        return Err(RenderError::Git(anyhow!(
            "ref {} is a rendered revision without a source commit",
            request.git_ref
        )));
    }
    info!(
        "ref {} is a rendered revision; following its metadata to source commit {}",
        request.git_ref, intermediate.source_commit
    );
    repo.repo()
        .checkout(&intermediate.source_commit)
        .map_err(RenderError::Git)?;
    if metadata::load_metadata(repo.directory())
        .map_err(RenderError::Io)?
        .is_some()
    {
        return Err(RenderError::Git(anyhow!(
            "source commit {} is itself a rendered revision",
            intermediate.source_commit
        )));
    }
    Ok((intermediate.source_commit.clone(), Some(intermediate)))
}

fn resolve_branch_config(ctx: &RequestContext) -> Result<BranchConfig> {
    let repo_config = repo_config::load_repo_config(ctx.repo.directory())
        .map_err(|e| RenderError::Config(format!("{e:#}")))?;
    let branch_config = repo_config
        .branch_config(&ctx.request.target_branch)
        .map_err(|e| RenderError::Config(format!("{e:#}")))?;
    Ok(branch_config
        .unwrap_or_else(|| repo_config::default_branch_config(&ctx.request.target_branch)))
}

/// Run image substitutions over every pre-rendered app, record the matched
/// subset in the new branch metadata, and enforce the empty-result guard.
fn run_last_mile(ctx: &mut RequestContext) -> Result<()> {
    let mut matched = vec![false; ctx.request.images.len()];
    let mut rendered = BTreeMap::new();
    for (app_name, prerendered) in &ctx.target.prerendered_manifests {
        let (bytes, substituted) =
            last_mile::apply_image_substitutions(prerendered, &ctx.request.images).map_err(
                |source| RenderError::Render {
                    app: app_name.clone(),
                    source,
                },
            )?;
        for image in &substituted {
            if let Some(pos) = ctx.request.images.iter().position(|i| i == image) {
                matched[pos] = true;
            }
        }
        rendered.insert(app_name.clone(), bytes);
    }

    let total_bytes: usize = rendered.values().map(Vec::len).sum();
    if total_bytes == 0 && !ctx.request.allow_empty {
        return Err(RenderError::EmptyResult);
    }

    ctx.target.rendered_manifests = rendered;
    ctx.target.new_branch_metadata = BranchMetadata {
        source_commit: ctx.source_commit.clone(),
        image_substitutions: ctx
            .request
            .images
            .iter()
            .zip(matched)
            .filter_map(|(image, was_matched)| was_matched.then(|| image.clone()))
            .collect(),
    };
    Ok(())
}

/// Write each app's manifests under its output path: a single `all.yaml`, or
/// one file per resource keyed `<name>-<kind>.yaml`.
fn write_rendered_tree(
    dir: &Utf8Path,
    branch_config: &BranchConfig,
    rendered: &BTreeMap<String, Vec<u8>>,
) -> Result<()> {
    for (app_name, bytes) in rendered {
        if bytes.is_empty() {
            continue;
        }
        let Some(app_config) = branch_config.app_configs.get(app_name) else {
            continue;
        };
        let output_dir = dir.join(app_config.effective_output_path(app_name));
        fs_err::create_dir_all(&output_dir).map_err(|e| RenderError::Io(e.into()))?;
        if app_config.combine_manifests {
            fs_err::write(output_dir.join("all.yaml"), bytes)
                .map_err(|e| RenderError::Io(e.into()))?;
        } else {
            let resources =
                manifests::split_yaml(bytes).map_err(|source| RenderError::Render {
                    app: app_name.clone(),
                    source: source.into(),
                })?;
            for (key, resource) in resources {
                fs_err::write(output_dir.join(format!("{key}.yaml")), resource)
                    .map_err(|e| RenderError::Io(e.into()))?;
            }
        }
    }
    Ok(())
}

fn commit_message(ctx: &RequestContext) -> Result<String> {
    let base_message = match &ctx.request.commit_message {
        Some(message) => message.clone(),
        None => ctx
            .repo
            .repo()
            .commit_message(&ctx.source_commit)
            .map_err(RenderError::Git)?,
    };
    Ok(commit::build_commit_message(
        &base_message,
        &ctx.source_commit,
        &ctx.target.new_branch_metadata.image_substitutions,
    ))
}

async fn open_pr(
    ctx: &RequestContext,
    commit_message: &str,
    cancel: &CancellationToken,
) -> Result<PrOutcome> {
    let token = ctx.request.repo_creds.password.clone().ok_or_else(|| {
        RenderError::Pr(anyhow!("a password credential is required to open pull requests"))
    })?;
    let repo_url = if ctx.request.repo_url.is_empty() {
        RepoUrl::from_repo(ctx.repo.repo()).map_err(RenderError::Pr)?
    } else {
        RepoUrl::new(&ctx.request.repo_url).map_err(RenderError::Pr)?
    };
    let forge = GitForge::from_repo_url(&repo_url, token).map_err(RenderError::Pr)?;
    let client = GitClient::new(forge).map_err(RenderError::Pr)?;
    let summary = commit_message.lines().next().unwrap_or("");
    let pr = Pr::new(
        &ctx.request.target_branch,
        &ctx.target.commit_branch,
        summary,
        ctx.target.branch_config.prs.use_unique_branch_names,
    );
    tokio::select! {
        () = cancel.cancelled() => Err(RenderError::Cancelled),
        outcome = client.open_pr(&pr) => outcome.map_err(RenderError::Pr),
    }
}

/// Emit every app's manifests to standard output, ascending by app name.
fn render_to_stdout(ctx: &mut RequestContext) -> Result<RenderResponse> {
    run_last_mile(ctx)?;
    let mut manifests = BTreeMap::new();
    for (app_name, bytes) in &ctx.target.rendered_manifests {
        let text = String::from_utf8_lossy(bytes).into_owned();
        println!("{STDOUT_RULE}");
        println!("App: {app_name}");
        println!("{STDOUT_RULE}");
        println!("{text}");
        manifests.insert(app_name.clone(), text);
    }
    Ok(RenderResponse {
        manifests: Some(manifests),
        ..response(ActionTaken::None, None)
    })
}

/// Write the rendered tree to the requested local directory instead of
/// publishing it. The existing target branch, if any, seeds the directory;
/// nothing is created or pushed on the remote.
fn render_to_local_path(
    ctx: &mut RequestContext,
    local_out_path: &Utf8Path,
) -> Result<RenderResponse> {
    run_last_mile(ctx)?;

    if ctx
        .repo
        .repo()
        .remote_branch_exists(&ctx.request.target_branch)
        .map_err(RenderError::Git)?
    {
        ctx.repo
            .repo()
            .checkout_remote_branch(&ctx.request.target_branch)
            .map_err(RenderError::Git)?;
        fs_utils::copy_branch_contents(ctx.repo.directory(), local_out_path)
            .map_err(RenderError::Io)?;
    } else {
        fs_err::create_dir_all(local_out_path).map_err(|e| RenderError::Io(e.into()))?;
    }

    fs_utils::clean_commit_branch(local_out_path, &ctx.target.branch_config.preserved_paths)
        .map_err(RenderError::Io)?;
    write_rendered_tree(
        local_out_path,
        &ctx.target.branch_config,
        &ctx.target.rendered_manifests,
    )?;
    metadata::write_metadata(local_out_path, &ctx.target.new_branch_metadata)
        .map_err(RenderError::Io)?;
    info!("wrote rendered manifests to {local_out_path}");
    Ok(response(ActionTaken::WroteToLocalPath, None))
}

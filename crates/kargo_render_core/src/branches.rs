//! Switching between the source tree, the target branch, and the commit
//! branch.

use camino::Utf8Path;
use git_cmd::Repo;
use tracing::{debug, info};

use crate::error::{RenderError, Result};
use crate::fs_utils;
use crate::metadata::{self, BranchMetadata};
use crate::repo_config::BranchConfig;

/// Prefix of every branch kargo-render commits to on behalf of a PR.
pub const COMMIT_BRANCH_PREFIX: &str = "prs/kargo-render/";

/// Check out the target branch, creating and publishing it when it does not
/// exist yet.
///
/// A pre-existing branch without kargo-render metadata is only adopted if its
/// tree is empty apart from `.git`; anything else looks like someone's work
/// and is refused.
pub fn switch_to_target_branch(repo: &Repo, target_branch: &str) -> Result<()> {
    if repo
        .remote_branch_exists(target_branch)
        .map_err(RenderError::Git)?
    {
        debug!("checking out existing target branch {target_branch}");
        repo.checkout_remote_branch(target_branch)
            .map_err(RenderError::Git)?;
        let managed = metadata::load_metadata(repo.directory())
            .map_err(RenderError::Io)?
            .is_some();
        if !managed && !is_empty_apart_from_git(repo.directory())? {
            return Err(RenderError::BranchNotManaged {
                branch: target_branch.to_string(),
            });
        }
    } else {
        info!("target branch {target_branch} does not exist; creating it");
        repo.switch_to_orphan_branch(target_branch)
            .map_err(RenderError::Git)?;
        fs_utils::clean_commit_branch(repo.directory(), &[]).map_err(RenderError::Io)?;
        metadata::write_metadata(repo.directory(), &BranchMetadata::default())
            .map_err(RenderError::Io)?;
        repo.add_all_and_commit("Initial commit")
            .map_err(RenderError::Git)?;
        repo.push(target_branch).map_err(RenderError::Git)?;
    }
    Ok(())
}

/// Establish the branch the rendered commit will land on and clean its
/// working tree. Returns the commit branch name.
///
/// Without PRs this is the target branch itself. With PRs it is a child
/// branch of the currently-checked-out target branch, unless it already
/// exists remotely, in which case the remote state is checked out.
pub fn switch_to_commit_branch(
    repo: &Repo,
    target_branch: &str,
    request_id: &str,
    branch_config: &BranchConfig,
) -> Result<String> {
    let commit_branch = commit_branch_name(target_branch, request_id, branch_config);
    if commit_branch != target_branch {
        if repo
            .remote_branch_exists(&commit_branch)
            .map_err(RenderError::Git)?
        {
            debug!("checking out existing commit branch {commit_branch}");
            repo.checkout_remote_branch(&commit_branch)
                .map_err(RenderError::Git)?;
        } else {
            debug!("creating commit branch {commit_branch}");
            repo.checkout_new_branch(&commit_branch)
                .map_err(RenderError::Git)?;
        }
    }
    fs_utils::clean_commit_branch(repo.directory(), &branch_config.preserved_paths)
        .map_err(RenderError::Io)?;
    Ok(commit_branch)
}

/// The name of the branch rendered commits are written to.
pub fn commit_branch_name(
    target_branch: &str,
    request_id: &str,
    branch_config: &BranchConfig,
) -> String {
    if !branch_config.prs.enabled {
        target_branch.to_string()
    } else if branch_config.prs.use_unique_branch_names {
        format!("{COMMIT_BRANCH_PREFIX}{request_id}")
    } else {
        format!("{COMMIT_BRANCH_PREFIX}{target_branch}")
    }
}

fn is_empty_apart_from_git(dir: &Utf8Path) -> Result<bool> {
    for entry in fs_err::read_dir(dir).map_err(|e| RenderError::Io(e.into()))? {
        let entry = entry.map_err(|e| RenderError::Io(e.into()))?;
        if entry.file_name() != ".git" {
            return Ok(false);
        }
    }
    Ok(true)
}

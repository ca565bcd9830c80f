//! Committing and publishing the rendered tree.

use git_cmd::Repo;
use tracing::info;

use crate::metadata;

/// Assemble the message of a rendered commit.
///
/// The first line comes from the request override or from the source
/// commit's own message; the body records the source commit and every image
/// substitution applied.
pub fn build_commit_message(
    base_message: &str,
    source_commit: &str,
    image_substitutions: &[String],
) -> String {
    let summary = base_message.lines().next().unwrap_or("").trim();
    let mut message = format!("{summary}\n\nRendered from source commit {source_commit}");
    for image in image_substitutions {
        message.push_str(&format!("\n  * {image}"));
    }
    message
}

/// Whether the working tree carries changes beyond the branch metadata file.
///
/// A render that only refreshed `.kargo-render/metadata.yaml` produced the
/// same manifests as the branch already has and is not worth a commit.
pub fn has_meaningful_changes(repo: &Repo) -> anyhow::Result<bool> {
    let metadata_file = metadata::metadata_path();
    let metadata_dir = format!("{}/", metadata::METADATA_DIR);
    let meaningful = repo
        .changed_files()?
        .iter()
        .any(|path| path != &metadata_file && path != &metadata_dir);
    Ok(meaningful)
}

/// Commit the working tree and push it to the commit branch.
/// Returns the new commit id.
pub fn commit_and_push(repo: &Repo, branch: &str, message: &str) -> anyhow::Result<String> {
    repo.add_all_and_commit(message)?;
    let commit_id = repo.current_commit_hash()?;
    repo.push(branch)?;
    info!("pushed commit {commit_id} to branch {branch}");
    Ok(commit_id)
}

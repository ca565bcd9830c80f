//! Pull-request hosts.

mod github;
mod gitlab;

pub use github::GitHub;
pub use gitlab::GitLab;

use secrecy::SecretString;
use url::Url;

use crate::http_client::http_client_builder;
use crate::repo_url::RepoUrl;

/// Coordinates of a repository on its pull-request host.
#[derive(Debug, Clone)]
pub struct Remote {
    pub base_url: Url,
    pub owner: String,
    pub repo: String,
    pub token: SecretString,
}

/// A pull request to open from a commit branch to its target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pr {
    pub base_branch: String,
    pub branch: String,
    pub title: String,
    pub body: String,
}

impl Pr {
    /// Build the PR for a rendered commit branch.
    ///
    /// Unique commit branches get a title carrying the commit summary;
    /// batched branches accumulate commits, so the title stays generic.
    pub fn new(
        target_branch: &str,
        commit_branch: &str,
        commit_summary: &str,
        unique_branch: bool,
    ) -> Self {
        let title = if unique_branch {
            format!("{target_branch} <-- {commit_summary}")
        } else {
            format!("{target_branch} <-- latest batched changes")
        };
        Self {
            base_branch: target_branch.to_string(),
            branch: commit_branch.to_string(),
            title,
            body: "See individual commit messages for details.".to_string(),
        }
    }
}

/// What the host did with our request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrOutcome {
    Opened { url: String },
    /// The host already has an open PR for this head branch; our push
    /// updated it.
    AlreadyExists,
}

#[derive(Debug)]
pub enum GitForge {
    GitHub(GitHub),
    GitLab(GitLab),
}

impl GitForge {
    /// Select the host from the repository URL's hostname.
    pub fn from_repo_url(url: &RepoUrl, token: SecretString) -> anyhow::Result<Self> {
        if url.is_on_gitlab() {
            Ok(Self::GitLab(GitLab::new(url, token)?))
        } else {
            Ok(Self::GitHub(GitHub::new(url, token)?))
        }
    }
}

#[derive(Debug)]
pub struct GitClient {
    forge: GitForge,
    client: reqwest::Client,
}

impl GitClient {
    pub fn new(forge: GitForge) -> anyhow::Result<Self> {
        let headers = match &forge {
            GitForge::GitHub(github) => github.default_headers()?,
            GitForge::GitLab(gitlab) => gitlab.default_headers()?,
        };
        let client = http_client_builder().default_headers(headers).build()?;
        Ok(Self { forge, client })
    }

    /// Open the PR, or report that the host already has one for this head.
    pub async fn open_pr(&self, pr: &Pr) -> anyhow::Result<PrOutcome> {
        match &self.forge {
            GitForge::GitHub(github) => github.open_pr(&self.client, pr).await,
            GitForge::GitLab(gitlab) => gitlab.open_pr(&self.client, pr).await,
        }
    }
}

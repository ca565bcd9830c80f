//! Render requests, their canonical form, and the response type.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use camino::Utf8PathBuf;
use regex::Regex;
use secrecy::SecretString;
use serde::Serialize;

use crate::error::{RenderError, Result};

static TARGET_BRANCH_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[\w.-]+/?)*\w$").unwrap());
static REPO_URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:https?://|git@)[\w:/\-.?=@&%]+$").unwrap());

/// Credentials for the repository remote. The password doubles as the
/// bearer token for the pull-request host.
#[derive(Clone, Debug, Default)]
pub struct RepoCreds {
    pub ssh_private_key: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

/// Inputs to one rendering operation.
///
/// Construct with struct-update syntax from [`RenderRequest::default`], then
/// pass to [`Renderer::render`](crate::Renderer::render), which canonicalizes
/// and validates it first.
#[derive(Clone, Debug, Default)]
pub struct RenderRequest {
    /// Unique id assigned on entry; leave empty.
    pub id: String,
    /// Remote URL of the GitOps repository. Mutually exclusive with
    /// `local_in_path`.
    pub repo_url: String,
    /// Absolute path of an existing, clean local clone to render from.
    pub local_in_path: Option<Utf8PathBuf>,
    pub repo_creds: RepoCreds,
    /// Branch name or commit id in the source; empty means the head of the
    /// default branch. Mutually exclusive with `local_in_path`.
    pub git_ref: String,
    /// The environment branch receiving rendered manifests.
    pub target_branch: String,
    /// Image references of the form `<address>:<tag>` to substitute.
    pub images: Vec<String>,
    /// Override for the first line of the commit message.
    pub commit_message: Option<String>,
    /// Write the rendered tree here instead of publishing to the repo.
    /// Must not pre-exist.
    pub local_out_path: Option<Utf8PathBuf>,
    /// Emit rendered manifests to standard output instead of publishing.
    pub stdout: bool,
    /// Accept a rendered-empty result.
    pub allow_empty: bool,
}

impl RenderRequest {
    /// Trim and normalize every field, assign the request id, and reject
    /// invalid or conflicting selections.
    ///
    /// Idempotent on valid requests.
    pub fn canonicalize_and_validate(mut self) -> Result<Self> {
        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }

        self.repo_url = self.repo_url.trim().to_string();
        self.git_ref = self.git_ref.trim().to_string();
        let target_branch = self.target_branch.trim();
        self.target_branch = target_branch
            .strip_prefix("refs/heads/")
            .unwrap_or(target_branch)
            .to_string();
        self.images = self
            .images
            .iter()
            .map(|image| image.trim().to_string())
            .collect();

        match (&self.local_in_path, self.repo_url.is_empty()) {
            (Some(_), false) => {
                return Err(validation(
                    "repo_url and local_in_path are mutually exclusive",
                ));
            }
            (None, true) => {
                return Err(validation("either repo_url or local_in_path is required"));
            }
            _ => {}
        }
        if let Some(local_in_path) = &self.local_in_path {
            if !local_in_path.is_absolute() {
                return Err(validation(format!(
                    "local_in_path {local_in_path} must be an absolute path"
                )));
            }
            if !local_in_path.is_dir() {
                return Err(validation(format!(
                    "local_in_path {local_in_path} does not exist"
                )));
            }
            if !self.git_ref.is_empty() {
                return Err(validation("ref and local_in_path are mutually exclusive"));
            }
        }
        if !self.repo_url.is_empty() && !REPO_URL_REGEX.is_match(&self.repo_url) {
            return Err(validation(format!(
                "repo_url {:?} is not a valid repository url",
                self.repo_url
            )));
        }

        if self.target_branch.is_empty() {
            return Err(validation("target_branch is required"));
        }
        if !TARGET_BRANCH_REGEX.is_match(&self.target_branch) {
            return Err(validation(format!(
                "target_branch {:?} is not a valid branch name",
                self.target_branch
            )));
        }

        if self.images.iter().any(String::is_empty) {
            return Err(validation("images must not contain empty entries"));
        }

        if self.commit_message.is_some() && (self.stdout || self.local_out_path.is_some()) {
            return Err(validation(
                "commit_message cannot be combined with stdout or local_out_path",
            ));
        }
        if let Some(local_out_path) = &self.local_out_path {
            if self.stdout {
                return Err(validation(
                    "local_out_path and stdout are mutually exclusive",
                ));
            }
            if local_out_path.exists() {
                return Err(validation(format!(
                    "local_out_path {local_out_path} already exists"
                )));
            }
        }

        Ok(self)
    }
}

fn validation(message: impl Into<String>) -> RenderError {
    RenderError::Validation(message.into())
}

/// What the render operation did.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionTaken {
    /// Nothing was published: either the only change was branch metadata, or
    /// the request asked for stdout output.
    None,
    OpenedPr,
    UpdatedPr,
    PushedDirectly,
    WroteToLocalPath,
}

/// Outcome of one rendering operation.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderResponse {
    pub action_taken: ActionTaken,
    /// Id of the commit carrying the rendered state. For `ActionTaken::None`
    /// this is the pre-existing head of the target branch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    /// Rendered manifests per app; populated in stdout mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifests: Option<BTreeMap<String, String>>,
}

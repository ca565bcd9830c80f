use camino::Utf8PathBuf;
use kargo_render_core::{RenderRequest, RepoCreds};
use secrecy::SecretString;

use super::OutputType;

#[derive(clap::Args, Debug)]
pub struct Render {
    /// Remote URL of the GitOps repository to render from.
    #[arg(long, conflicts_with = "local_in_path")]
    repo_url: Option<String>,
    /// Absolute path of an existing, clean local clone to render from
    /// instead of cloning a remote.
    #[arg(long)]
    local_in_path: Option<Utf8PathBuf>,
    /// Branch name or commit id in the source to render from.
    /// Defaults to the head of the default branch.
    #[arg(long = "ref", conflicts_with = "local_in_path")]
    git_ref: Option<String>,
    /// The environment branch receiving the rendered manifests.
    #[arg(long, short)]
    target_branch: String,
    /// An image to substitute, as `<address>:<tag>`. Repeatable.
    #[arg(long = "image", short)]
    images: Vec<String>,
    /// Override the first line of the commit message.
    #[arg(long)]
    commit_message: Option<String>,
    /// Write the rendered tree to this directory (which must not exist)
    /// instead of publishing it to the repository.
    #[arg(long, conflicts_with = "stdout")]
    local_out_path: Option<Utf8PathBuf>,
    /// Write the rendered manifests to standard output instead of
    /// publishing them to the repository.
    #[arg(long)]
    stdout: bool,
    /// Accept a rendered-empty result.
    #[arg(long)]
    allow_empty: bool,
    /// Username for the repository remote.
    #[arg(long, env = "KARGO_RENDER_REPO_USERNAME")]
    repo_username: Option<String>,
    /// Password or personal access token for the repository remote.
    /// Doubles as the bearer token for the pull-request host.
    #[arg(long, env = "KARGO_RENDER_REPO_PASSWORD", hide_env_values = true)]
    repo_password: Option<String>,
    /// SSH private key for the repository remote.
    #[arg(long, env = "KARGO_RENDER_REPO_SSH_KEY", hide_env_values = true)]
    repo_ssh_key: Option<String>,
    /// Print the render response in the selected format.
    #[arg(long, value_enum)]
    pub output: Option<OutputType>,
}

impl Render {
    pub fn into_render_request(self) -> RenderRequest {
        RenderRequest {
            repo_url: self.repo_url.unwrap_or_default(),
            local_in_path: self.local_in_path,
            repo_creds: RepoCreds {
                ssh_private_key: self.repo_ssh_key,
                username: self.repo_username,
                password: self.repo_password.map(SecretString::from),
            },
            git_ref: self.git_ref.unwrap_or_default(),
            target_branch: self.target_branch,
            images: self.images,
            commit_message: self.commit_message,
            local_out_path: self.local_out_path,
            stdout: self.stdout,
            allow_empty: self.allow_empty,
            ..RenderRequest::default()
        }
    }
}

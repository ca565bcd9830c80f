//! The repo handle: a working tree in a private temporary home.

use anyhow::{Context, ensure};
use camino::Utf8Path;
use git_cmd::Repo;
use secrecy::ExposeSecret;
use tracing::debug;

use crate::fs_utils::{self, Utf8TempDir};
use crate::request::RepoCreds;

const GIT_USERNAME_VAR: &str = "KARGO_RENDER_GIT_USERNAME";
const GIT_PASSWORD_VAR: &str = "KARGO_RENDER_GIT_PASSWORD";

/// A repository checked out in a temporary directory owned exclusively by
/// this handle. Dropping the handle removes the on-disk home.
#[derive(Debug)]
pub struct TempRepo {
    // Destructor order: the repo only borrows the directory, the temp dir
    // removes it.
    repo: Repo,
    _temp_dir: Utf8TempDir,
}

impl TempRepo {
    /// Clone a remote into a fresh private home.
    pub fn clone(url: &str, creds: &RepoCreds) -> anyhow::Result<Self> {
        let temp_dir = Utf8TempDir::new()?;
        let (config, env) = git_auth(creds, temp_dir.path())?;
        let directory = temp_dir.path().join("repo");
        debug!("cloning {url} into {directory}");
        let repo = Repo::clone(url, &directory, config, env)?;
        Ok(Self {
            repo,
            _temp_dir: temp_dir,
        })
    }

    /// Copy an existing local clone into a fresh private home, so the
    /// caller's working tree is never mutated.
    ///
    /// The clone must have exactly one remote, named `origin`, and a clean
    /// working tree.
    pub fn copy_of_local_clone(path: &Utf8Path) -> anyhow::Result<Self> {
        let path = fs_utils::canonicalize_utf8(path)?;
        let source = Repo::new(&path)
            .with_context(|| format!("local_in_path {path} is not a git repository"))?;
        let remotes = source.remotes()?;
        ensure!(
            remotes == ["origin"],
            "local_in_path {path} must have exactly one remote named origin, found {remotes:?}"
        );
        source
            .is_clean()
            .with_context(|| format!("local_in_path {path} must have a clean working tree"))?;

        let temp_dir = Utf8TempDir::new()?;
        let directory = temp_dir.path().join("repo");
        debug!("copying local clone {path} into {directory}");
        fs_utils::copy_dir_all(&path, &directory)?;
        let repo = Repo::new(&directory)?;
        Ok(Self {
            repo,
            _temp_dir: temp_dir,
        })
    }

    pub fn repo(&self) -> &Repo {
        &self.repo
    }

    /// Root of the working tree.
    pub fn directory(&self) -> &Utf8Path {
        self.repo.directory()
    }
}

/// Build the git configuration and environment carrying the credentials.
///
/// The password is handed to an inline credential helper through the child
/// process environment, so it never touches the filesystem. An ssh key, if
/// provided, is written inside the private home with owner-only permissions.
fn git_auth(
    creds: &RepoCreds,
    home: &Utf8Path,
) -> anyhow::Result<(Vec<String>, Vec<(String, String)>)> {
    let mut config = vec![];
    let mut env = vec![];
    if let Some(password) = &creds.password {
        let helper = format!(
            "!f() {{ test \"$1\" = get && echo \"username=${{{GIT_USERNAME_VAR}}}\" \
             && echo \"password=${{{GIT_PASSWORD_VAR}}}\"; }}; f"
        );
        config.push(format!("credential.helper={helper}"));
        env.push((
            GIT_USERNAME_VAR.to_string(),
            creds.username.clone().unwrap_or_else(|| "git".to_string()),
        ));
        env.push((
            GIT_PASSWORD_VAR.to_string(),
            password.expose_secret().to_string(),
        ));
    }
    if let Some(ssh_private_key) = &creds.ssh_private_key {
        let key_path = home.join("id_kargo_render");
        fs_err::write(&key_path, ssh_private_key)
            .context("cannot write ssh key into the repo home")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs_err::set_permissions(&key_path, std::fs::Permissions::from_mode(0o600))
                .context("cannot restrict ssh key permissions")?;
        }
        env.push((
            "GIT_SSH_COMMAND".to_string(),
            format!("ssh -i {key_path} -o StrictHostKeyChecking=no"),
        ));
    }
    Ok((config, env))
}

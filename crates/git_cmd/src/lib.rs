//! Run git commands in a repository.
//!
//! Everything goes through the `git` binary rather than a libgit2 binding:
//! the CLI honors credential helpers, sparse checkouts and the user's global
//! configuration, and refuses to clobber a dirty working tree unless forced.

use std::process::Command;

use anyhow::{Context, anyhow, bail};
use camino::{Utf8Path, Utf8PathBuf};
use tracing::{Span, instrument, trace};

/// A git working tree on the local filesystem.
///
/// Every method shells out to `git -C <directory>`, with the configuration
/// entries and environment variables the repo was constructed with applied to
/// each invocation.
#[derive(Debug, Clone)]
pub struct Repo {
    directory: Utf8PathBuf,
    /// `key=value` entries passed as `-c key=value`.
    config: Vec<String>,
    /// Extra environment for the child process. Credentials travel here so
    /// they are never written to disk.
    env: Vec<(String, String)>,
}

impl Repo {
    /// Open an existing repository.
    ///
    /// Returns an error if `directory` is not inside a git working tree.
    pub fn new(directory: impl AsRef<Utf8Path>) -> anyhow::Result<Self> {
        let repo = Self {
            directory: directory.as_ref().to_path_buf(),
            config: vec![],
            env: vec![],
        };
        repo.git(&["rev-parse", "--is-inside-work-tree"])
            .with_context(|| format!("directory {:?} is not a git repository", repo.directory))?;
        Ok(repo)
    }

    /// Clone `url` into `directory`.
    ///
    /// `config` and `env` are applied to the clone itself and inherited by the
    /// returned repo, so credentialed clones keep working for fetch and push.
    pub fn clone(
        url: &str,
        directory: impl AsRef<Utf8Path>,
        config: Vec<String>,
        env: Vec<(String, String)>,
    ) -> anyhow::Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let mut args: Vec<&str> = vec![];
        for entry in &config {
            args.push("-c");
            args.push(entry.as_str());
        }
        args.extend(["clone", url, directory.as_str()]);
        let parent = directory
            .parent()
            .ok_or_else(|| anyhow!("clone destination {directory:?} has no parent directory"))?;
        git_in_dir(parent, &args, &env).with_context(|| format!("cannot clone {url}"))?;
        Ok(Self {
            directory,
            config,
            env,
        })
    }

    pub fn directory(&self) -> &Utf8Path {
        &self.directory
    }

    /// Run a git command in the repository.
    pub fn git(&self, args: &[&str]) -> anyhow::Result<String> {
        let mut all_args: Vec<&str> = vec![];
        for entry in &self.config {
            all_args.push("-c");
            all_args.push(entry.as_str());
        }
        all_args.extend(args);
        git_in_dir(&self.directory, &all_args, &self.env)
    }

    pub fn checkout(&self, object: &str) -> anyhow::Result<()> {
        self.git(&["checkout", object])
            .with_context(|| format!("cannot checkout {object}"))?;
        Ok(())
    }

    pub fn checkout_new_branch(&self, branch: &str) -> anyhow::Result<()> {
        self.git(&["checkout", "-b", branch])
            .with_context(|| format!("cannot create branch {branch}"))?;
        Ok(())
    }

    /// Check out a branch that exists on `origin`, resetting any local branch
    /// of the same name to the remote state.
    pub fn checkout_remote_branch(&self, branch: &str) -> anyhow::Result<()> {
        self.fetch(branch)?;
        self.git(&["checkout", "-B", branch, &format!("origin/{branch}")])
            .with_context(|| format!("cannot checkout remote branch {branch}"))?;
        Ok(())
    }

    /// Switch to a new branch with no history and an empty index.
    pub fn switch_to_orphan_branch(&self, branch: &str) -> anyhow::Result<()> {
        self.git(&["switch", "--orphan", branch])
            .with_context(|| format!("cannot create orphan branch {branch}"))?;
        Ok(())
    }

    /// `true` if `origin` has a branch with this name.
    pub fn remote_branch_exists(&self, branch: &str) -> anyhow::Result<bool> {
        let output = self
            .git(&["ls-remote", "--heads", "origin", branch])
            .context("cannot list remote branches")?;
        Ok(!output.is_empty())
    }

    pub fn fetch(&self, object: &str) -> anyhow::Result<()> {
        self.git(&["fetch", "origin", object])
            .with_context(|| format!("cannot fetch {object}"))?;
        Ok(())
    }

    pub fn push(&self, object: &str) -> anyhow::Result<()> {
        self.git(&["push", "origin", object])
            .with_context(|| format!("cannot push {object}"))?;
        Ok(())
    }

    pub fn add_all_and_commit(&self, message: &str) -> anyhow::Result<()> {
        self.git(&["add", "-A", "."])?;
        self.git(&["commit", "-m", message])
            .context("cannot commit")?;
        Ok(())
    }

    pub fn current_commit_hash(&self) -> anyhow::Result<String> {
        self.git(&["rev-parse", "HEAD"])
            .context("cannot determine current commit")
    }

    /// Full message (subject and body) of the given commit.
    pub fn commit_message(&self, commit: &str) -> anyhow::Result<String> {
        self.git(&["log", "-1", "--pretty=%B", commit])
            .with_context(|| format!("cannot read message of commit {commit}"))
    }

    pub fn current_commit_message(&self) -> anyhow::Result<String> {
        self.commit_message("HEAD")
    }

    /// Ok if there are no uncommitted changes.
    pub fn is_clean(&self) -> anyhow::Result<()> {
        let changes = self.changed_files()?;
        if !changes.is_empty() {
            bail!("the working tree contains uncommitted changes: {changes:?}");
        }
        Ok(())
    }

    /// Repository-relative paths that differ from HEAD, from
    /// `git status --porcelain`. Renames report the new path.
    pub fn changed_files(&self) -> anyhow::Result<Vec<String>> {
        let output = self
            .git(&["status", "--porcelain"])
            .context("cannot read git status")?;
        let files = output
            .lines()
            .filter(|line| line.len() > 3)
            .map(|line| {
                let path = &line[3..];
                match path.split_once(" -> ") {
                    Some((_, new_path)) => new_path.to_string(),
                    None => path.to_string(),
                }
            })
            .collect();
        Ok(files)
    }

    /// Names of the configured remotes.
    pub fn remotes(&self) -> anyhow::Result<Vec<String>> {
        let output = self.git(&["remote"]).context("cannot list remotes")?;
        Ok(output.lines().map(ToString::to_string).collect())
    }

    pub fn origin_url(&self) -> anyhow::Result<String> {
        self.git(&["config", "--get", "remote.origin.url"])
            .context("cannot determine origin url")
    }
}

/// Run `git <args>` in `dir`, returning trimmed stdout.
#[instrument(skip(env), fields(stderr, stdout))]
pub fn git_in_dir(dir: &Utf8Path, args: &[&str], env: &[(String, String)]) -> anyhow::Result<String> {
    let mut command = Command::new("git");
    command.arg("-C").arg(dir).args(args);
    for (key, value) in env {
        command.env(key, value);
    }
    let output = command
        .output()
        .with_context(|| format!("error while running git in directory {dir:?} with args {args:?}"))?;
    let stdout = string_from_bytes(output.stdout)?;
    let stderr = string_from_bytes(output.stderr)?;
    let span = Span::current();
    span.record("stdout", stdout.as_str());
    span.record("stderr", stderr.as_str());
    trace!("git {args:?}: finished");
    if output.status.success() {
        Ok(stdout)
    } else {
        Err(anyhow!("git {args:?} failed: {stderr}"))
    }
}

fn string_from_bytes(bytes: Vec<u8>) -> anyhow::Result<String> {
    let out = String::from_utf8(bytes).context("git output is not valid utf-8")?;
    Ok(out.trim().to_string())
}

#[cfg(feature = "test_fixture")]
impl Repo {
    /// Initialize a repository with `main` as initial branch, a configured
    /// test user, and one empty commit, so that HEAD is valid.
    pub fn init(directory: impl AsRef<Utf8Path>) -> Self {
        let directory = directory.as_ref();
        git_in_dir(directory, &["init", "-b", "main"], &[]).unwrap();
        let repo = Self::new(directory).unwrap();
        repo.git(&["config", "user.name", "author_name"]).unwrap();
        repo.git(&["config", "user.email", "author@example.com"])
            .unwrap();
        repo.git(&["config", "commit.gpgsign", "false"]).unwrap();
        repo.git(&["commit", "--allow-empty", "-m", "init commit"])
            .unwrap();
        tracing::debug!("initialized test repo at {directory:?}");
        repo
    }
}

use anyhow::Context;
use git_cmd::Repo;
use git_url_parse::GitUrl;

/// Parsed remote URL of the GitOps repository, used to pick and address the
/// pull-request host.
#[derive(Debug, Clone)]
pub struct RepoUrl {
    pub scheme: String,
    pub host: String,
    port: Option<u16>,
    pub owner: String,
    pub name: String,
    pub path: String,
}

impl RepoUrl {
    pub fn new(git_host_url: &str) -> anyhow::Result<Self> {
        new_url(git_host_url).with_context(|| format!("cannot parse git url {git_host_url}"))
    }

    pub fn from_repo(repo: &Repo) -> anyhow::Result<Self> {
        let url = repo.origin_url()?;
        RepoUrl::new(&url)
    }

    /// Hostname-based provider selection: `gitlab.*` means GitLab, everything
    /// else is treated as GitHub (possibly Enterprise).
    pub fn is_on_gitlab(&self) -> bool {
        self.host == "gitlab" || self.host.starts_with("gitlab.")
    }

    fn http_scheme(&self) -> &str {
        if self.scheme == "ssh" || self.scheme == "git" {
            "https"
        } else {
            self.scheme.as_str()
        }
    }

    /// API base for GitHub or GitHub Enterprise.
    ///
    /// Any host other than `github.com` is assumed to be an Enterprise
    /// installation serving the API under `/api/v3`.
    pub fn github_api_url(&self) -> String {
        if self.host == "github.com" {
            "https://api.github.com".to_string()
        } else if let Some(port) = self.port {
            format!("{}://{}:{port}/api/v3", self.http_scheme(), self.host)
        } else {
            format!("{}://{}/api/v3", self.http_scheme(), self.host)
        }
    }

    /// API base for a GitLab project, with the project path URL-encoded.
    pub fn gitlab_api_url(&self) -> String {
        let v4 = "api/v4/projects";
        let project_path = urlencoding::encode(self.path.strip_prefix('/').unwrap_or(&self.path));
        if let Some(port) = self.port {
            format!("{}://{}:{port}/{v4}/{project_path}", self.http_scheme(), self.host)
        } else {
            format!("{}://{}/{v4}/{project_path}", self.http_scheme(), self.host)
        }
    }
}

fn new_url(git_host_url: &str) -> anyhow::Result<RepoUrl> {
    let git_url = GitUrl::parse(git_host_url)?;
    let owner = git_url
        .owner
        .clone()
        .context("cannot determine git provider")?;
    let host = git_url.host.clone().context("cannot determine host")?;
    let scheme = git_url.scheme.to_string();
    let path = git_url
        .path
        .strip_suffix(".git")
        .unwrap_or(&git_url.path)
        .to_string();
    Ok(RepoUrl {
        owner,
        name: git_url.name.clone(),
        host,
        port: git_url.port,
        scheme,
        path,
    })
}

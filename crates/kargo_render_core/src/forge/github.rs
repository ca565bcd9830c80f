use anyhow::{Context, bail};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::{Pr, PrOutcome, Remote};
use crate::repo_url::RepoUrl;
use crate::response_ext::ResponseExt;

/// GitHub or GitHub Enterprise.
#[derive(Debug, Clone)]
pub struct GitHub {
    pub remote: Remote,
}

impl GitHub {
    pub fn new(url: &RepoUrl, token: SecretString) -> anyhow::Result<Self> {
        let base_url = url
            .github_api_url()
            .parse()
            .context("invalid GitHub API URL")?;
        Ok(Self {
            remote: Remote {
                base_url,
                owner: url.owner.clone(),
                repo: url.name.clone(),
                token,
            },
        })
    }

    pub fn default_headers(&self) -> anyhow::Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let mut auth_header: HeaderValue =
            format!("Bearer {}", self.remote.token.expose_secret())
                .parse()
                .context("invalid GitHub token")?;
        auth_header.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth_header);
        Ok(headers)
    }

    pub(super) async fn open_pr(
        &self,
        client: &reqwest::Client,
        pr: &Pr,
    ) -> anyhow::Result<PrOutcome> {
        let url = format!(
            "{}/repos/{}/{}/pulls",
            self.remote.base_url.as_str().trim_end_matches('/'),
            self.remote.owner,
            self.remote.repo
        );
        debug!("opening pull request at {url}");
        let response = client
            .post(&url)
            .json(&serde_json::json!({
                "title": pr.title,
                "head": pr.branch,
                "base": pr.base_branch,
                "body": pr.body,
            }))
            .send()
            .await
            .context("cannot contact GitHub")?;

        // GitHub reports an already-open PR for the head branch as an
        // unprocessable entity.
        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let body = response
                .text()
                .await
                .context("can't read GitHub response body")?;
            if body.contains("A pull request already exists") {
                return Ok(PrOutcome::AlreadyExists);
            }
            bail!("GitHub rejected the pull request: {body}");
        }

        let created: CreatedPr = response
            .successful_status()
            .await
            .context("error while opening the pull request")?
            .json()
            .await
            .context("can't parse GitHub response")?;
        Ok(PrOutcome::Opened {
            url: created.html_url,
        })
    }
}

#[derive(Deserialize)]
struct CreatedPr {
    html_url: String,
}

use anyhow::{Context, bail};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::{Pr, PrOutcome, Remote};
use crate::repo_url::RepoUrl;
use crate::response_ext::ResponseExt;

/// GitLab, self-hosted or gitlab.com. Pull requests are merge requests here.
#[derive(Debug, Clone)]
pub struct GitLab {
    pub remote: Remote,
}

impl GitLab {
    pub fn new(url: &RepoUrl, token: SecretString) -> anyhow::Result<Self> {
        let base_url = url
            .gitlab_api_url()
            .parse()
            .context("invalid GitLab API URL")?;
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
        let mut auth_header: HeaderValue =
            format!("Bearer {}", self.remote.token.expose_secret())
                .parse()
                .context("invalid GitLab token")?;
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
            "{}/merge_requests",
            self.remote.base_url.as_str().trim_end_matches('/')
        );
        debug!("opening merge request at {url}");
        let response = client
            .post(&url)
            .json(&serde_json::json!({
                "title": pr.title,
                "source_branch": pr.branch,
                "target_branch": pr.base_branch,
                "description": pr.body,
            }))
            .send()
            .await
            .context("cannot contact GitLab")?;

        // GitLab reports an already-open MR for the source branch as a
        // conflict.
        if response.status() == StatusCode::CONFLICT {
            let body = response
                .text()
                .await
                .context("can't read GitLab response body")?;
            if body.contains("already exists") {
                return Ok(PrOutcome::AlreadyExists);
            }
            bail!("GitLab rejected the merge request: {body}");
        }

        let created: CreatedMr = response
            .successful_status()
            .await
            .context("error while opening the merge request")?
            .json()
            .await
            .context("can't parse GitLab response")?;
        Ok(PrOutcome::Opened {
            url: created.web_url,
        })
    }
}

#[derive(Deserialize)]
struct CreatedMr {
    web_url: String,
}

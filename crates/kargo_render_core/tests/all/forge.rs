use kargo_render_core::{GitClient, GitForge, GitHub, GitLab, Pr, PrOutcome, RepoUrl};
use secrecy::SecretString;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn pr() -> Pr {
    Pr::new(
        "env/prod",
        "prs/kargo-render/env/prod",
        "fix: bump image",
        false,
    )
}

fn token() -> SecretString {
    SecretString::from("my-token".to_string())
}

async fn github_client(server: &MockServer) -> GitClient {
    // any non-github.com host is treated as an Enterprise install, so the
    // mock server's address works as the API host
    let url = RepoUrl::new(&format!("{}/me/envs.git", server.uri())).unwrap();
    GitClient::new(GitForge::GitHub(GitHub::new(&url, token()).unwrap())).unwrap()
}

async fn gitlab_client(server: &MockServer) -> GitClient {
    let url = RepoUrl::new(&format!("{}/group/envs.git", server.uri())).unwrap();
    GitClient::new(GitForge::GitLab(GitLab::new(&url, token()).unwrap())).unwrap()
}

#[tokio::test]
async fn github_pr_is_opened() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/repos/me/envs/pulls"))
        .and(header("Authorization", "Bearer my-token"))
        .and(body_partial_json(serde_json::json!({
            "head": "prs/kargo-render/env/prod",
            "base": "env/prod",
            "title": "env/prod <-- latest batched changes",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "html_url": "https://github.example.com/me/envs/pull/7"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = github_client(&server).await.open_pr(&pr()).await.unwrap();
    assert_eq!(
        outcome,
        PrOutcome::Opened {
            url: "https://github.example.com/me/envs/pull/7".to_string()
        }
    );
}

#[tokio::test]
async fn existing_github_pr_reports_updated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/repos/me/envs/pulls"))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "message": "Validation Failed",
            "errors": [{
                "message": "A pull request already exists for me:prs/kargo-render/env/prod."
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = github_client(&server).await.open_pr(&pr()).await.unwrap();
    assert_eq!(outcome, PrOutcome::AlreadyExists);
}

#[tokio::test]
async fn other_github_rejections_are_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v3/repos/me/envs/pulls"))
        .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
            "message": "Validation Failed",
            "errors": [{"message": "No commits between env/prod and the head branch"}]
        })))
        .mount(&server)
        .await;

    assert!(github_client(&server).await.open_pr(&pr()).await.is_err());
}

#[tokio::test]
async fn gitlab_merge_request_is_opened() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/projects/group%2Fenvs/merge_requests"))
        .and(header("Authorization", "Bearer my-token"))
        .and(body_partial_json(serde_json::json!({
            "source_branch": "prs/kargo-render/env/prod",
            "target_branch": "env/prod",
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
            "web_url": "https://gitlab.example.com/group/envs/-/merge_requests/3"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = gitlab_client(&server).await.open_pr(&pr()).await.unwrap();
    assert_eq!(
        outcome,
        PrOutcome::Opened {
            url: "https://gitlab.example.com/group/envs/-/merge_requests/3".to_string()
        }
    );
}

#[tokio::test]
async fn existing_gitlab_merge_request_reports_updated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v4/projects/group%2Fenvs/merge_requests"))
        .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
            "message": [
                "Another open merge request already exists for this source branch: !3"
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = gitlab_client(&server).await.open_pr(&pr()).await.unwrap();
    assert_eq!(outcome, PrOutcome::AlreadyExists);
}

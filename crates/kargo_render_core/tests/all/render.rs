use kargo_render_core::{ActionTaken, RenderError, RenderRequest, Renderer};
use tokio_util::sync::CancellationToken;

use crate::helpers::{FileGenerator, TestContext};

const SERVICE: &str = "kind: Service\nmetadata:\n  name: app\nspec:\n  ports:\n    - port: 80\n";
const DEPLOYMENT: &str = r#"kind: Deployment
metadata:
  name: app
spec:
  template:
    spec:
      containers:
        - name: app
          image: registry.example.com/app:v1
"#;

const COMBINED_CONFIG: &str = r#"
configVersion: v1alpha1
branchConfigs:
  - pattern: env/.*
    appConfigs:
      app:
        configManagement:
          path: manifests
          directory: {}
        combineManifests: true
"#;

fn context_with_manifests() -> TestContext {
    let context = TestContext::new();
    context.write("kargo-render.yaml", COMBINED_CONFIG);
    context.write("manifests/service.yaml", SERVICE);
    context.write("manifests/deployment.yaml", DEPLOYMENT);
    context.commit_and_push("add manifests");
    context
}

async fn render(
    request: RenderRequest,
) -> Result<kargo_render_core::RenderResponse, RenderError> {
    Renderer::new(FileGenerator)
        .render(request, &CancellationToken::new())
        .await
}

#[tokio::test]
async fn first_render_creates_and_publishes_the_target_branch() {
    let context = context_with_manifests();
    let source_head = context.source_head();

    let response = render(context.request("env/dev")).await.unwrap();

    assert_eq!(response.action_taken, ActionTaken::PushedDirectly);
    assert_eq!(response.commit_id.as_deref(), Some(context.remote_head("env/dev").as_str()));
    // orphan initial commit plus the rendered commit
    assert_eq!(context.remote_commit_count("env/dev"), 2);

    let all_yaml = context.remote_file("env/dev", "app/all.yaml");
    assert!(all_yaml.contains("kind: Service"));
    assert!(all_yaml.contains("kind: Deployment"));

    let metadata = context.remote_file("env/dev", ".kargo-render/metadata.yaml");
    assert!(metadata.contains(&format!("sourceCommit: {source_head}")));

    let message = context.remote_commit_message("env/dev");
    assert!(message.contains(&format!("Rendered from source commit {source_head}")));
}

#[tokio::test]
async fn rerendering_an_unchanged_source_takes_no_action() {
    let context = context_with_manifests();

    let first = render(context.request("env/dev")).await.unwrap();
    assert_eq!(first.action_taken, ActionTaken::PushedDirectly);
    let head_after_first = context.remote_head("env/dev");

    let second = render(context.request("env/dev")).await.unwrap();
    assert_eq!(second.action_taken, ActionTaken::None);
    assert_eq!(second.commit_id.as_deref(), Some(head_after_first.as_str()));
    assert_eq!(context.remote_head("env/dev"), head_after_first);
}

#[tokio::test]
async fn source_changes_produce_a_new_commit() {
    let context = context_with_manifests();
    render(context.request("env/dev")).await.unwrap();

    context.write(
        "manifests/service.yaml",
        "kind: Service\nmetadata:\n  name: app\nspec:\n  ports:\n    - port: 8080\n",
    );
    context.commit_and_push("bump service port");

    let response = render(context.request("env/dev")).await.unwrap();
    assert_eq!(response.action_taken, ActionTaken::PushedDirectly);
    assert_eq!(context.remote_commit_count("env/dev"), 3);
    assert!(
        context
            .remote_file("env/dev", "app/all.yaml")
            .contains("8080")
    );
}

#[tokio::test]
async fn image_substitutions_reach_manifests_metadata_and_commit_message() {
    let context = context_with_manifests();
    let request = RenderRequest {
        images: vec!["registry.example.com/app:v2".to_string()],
        ..context.request("env/dev")
    };

    let response = render(request).await.unwrap();
    assert_eq!(response.action_taken, ActionTaken::PushedDirectly);

    let all_yaml = context.remote_file("env/dev", "app/all.yaml");
    assert!(all_yaml.contains("registry.example.com/app:v2"));

    let metadata = context.remote_file("env/dev", ".kargo-render/metadata.yaml");
    assert!(metadata.contains("registry.example.com/app:v2"));

    let message = context.remote_commit_message("env/dev");
    assert!(message.contains("  * registry.example.com/app:v2"));
}

#[tokio::test]
async fn empty_render_is_refused_without_allow_empty() {
    let context = context_with_manifests();
    render(context.request("env/dev")).await.unwrap();
    let head_before = context.remote_head("env/dev");

    context.delete("manifests");
    context.commit_and_push("remove all manifests");

    let err = render(context.request("env/dev"))
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::EmptyResult));
    // no commit was made
    assert_eq!(context.remote_head("env/dev"), head_before);
}

#[tokio::test]
async fn empty_render_is_allowed_when_requested() {
    let context = context_with_manifests();
    render(context.request("env/dev")).await.unwrap();

    context.delete("manifests");
    context.commit_and_push("remove all manifests");

    let request = RenderRequest {
        allow_empty: true,
        ..context.request("env/dev")
    };
    let response = render(request).await.unwrap();
    assert_eq!(response.action_taken, ActionTaken::PushedDirectly);
    // the rendered tree is gone, only the metadata remains
    assert!(!context.remote_has_file("env/dev", "app/all.yaml"));
    assert!(context.remote_has_file("env/dev", ".kargo-render/metadata.yaml"));
}

#[tokio::test]
async fn pattern_expansion_selects_the_overlay_for_the_branch() {
    let context = TestContext::new();
    context.write(
        "kargo-render.yaml",
        r#"
configVersion: v1alpha1
branchConfigs:
  - pattern: env/(dev|prod)
    appConfigs:
      app:
        configManagement:
          path: overlays/${1}
          directory: {}
        combineManifests: true
"#,
    );
    context.write("overlays/dev/service.yaml", SERVICE);
    context.write(
        "overlays/prod/service.yaml",
        "kind: Service\nmetadata:\n  name: app\nspec:\n  ports:\n    - port: 443\n",
    );
    context.commit_and_push("add overlays");

    render(context.request("env/prod")).await.unwrap();
    let all_yaml = context.remote_file("env/prod", "app/all.yaml");
    assert!(all_yaml.contains("443"));
}

#[tokio::test]
async fn split_output_writes_one_file_per_resource() {
    let context = TestContext::new();
    context.write(
        "kargo-render.yaml",
        r#"
configVersion: v1alpha1
branchConfigs:
  - name: env/dev
    appConfigs:
      app:
        configManagement:
          path: manifests
          directory: {}
        outputPath: rendered
"#,
    );
    context.write("manifests/service.yaml", SERVICE);
    context.write("manifests/deployment.yaml", DEPLOYMENT);
    context.commit_and_push("add manifests");

    render(context.request("env/dev")).await.unwrap();
    assert!(
        context
            .remote_file("env/dev", "rendered/app-service.yaml")
            .contains("kind: Service")
    );
    assert!(
        context
            .remote_file("env/dev", "rendered/app-deployment.yaml")
            .contains("kind: Deployment")
    );
}

#[tokio::test]
async fn unmanaged_branch_with_content_is_not_adopted() {
    let context = context_with_manifests();
    // main exists remotely, has content, and carries no metadata
    let err = render(context.request("main")).await.unwrap_err();
    assert!(matches!(err, RenderError::BranchNotManaged { .. }));
}

#[tokio::test]
async fn stdout_mode_returns_the_manifests_without_publishing() {
    let context = context_with_manifests();
    let request = RenderRequest {
        stdout: true,
        ..context.request("env/dev")
    };

    let response = render(request).await.unwrap();
    assert_eq!(response.action_taken, ActionTaken::None);
    let manifests = response.manifests.unwrap();
    assert!(manifests["app"].contains("kind: Service"));
    // nothing was pushed
    assert!(!context.remote_branch_exists("env/dev"));
}

#[tokio::test]
async fn local_out_mode_writes_the_rendered_tree_to_disk() {
    let context = context_with_manifests();
    // publish the branch first so local-out has a baseline to copy
    render(context.request("env/dev")).await.unwrap();
    let head_before = context.remote_head("env/dev");

    let out = context.scratch_path("out");
    let request = RenderRequest {
        local_out_path: Some(out.clone()),
        ..context.request("env/dev")
    };
    let response = render(request).await.unwrap();

    assert_eq!(response.action_taken, ActionTaken::WroteToLocalPath);
    assert!(out.join("app/all.yaml").exists());
    assert!(out.join(".kargo-render/metadata.yaml").exists());
    assert!(!out.join(".git").exists());
    // the remote was left alone
    assert_eq!(context.remote_head("env/dev"), head_before);
}

#[tokio::test]
async fn commit_branch_is_used_when_prs_are_enabled() {
    // Rendering with prs.enabled pushes to the commit branch; opening the PR
    // itself then fails because no credentials are configured. The push is
    // the part under test here.
    let context = TestContext::new();
    context.write(
        "kargo-render.yaml",
        r#"
configVersion: v1alpha1
branchConfigs:
  - name: env/dev
    appConfigs:
      app:
        configManagement:
          path: manifests
          directory: {}
        combineManifests: true
    prs:
      enabled: true
"#,
    );
    context.write("manifests/service.yaml", SERVICE);
    context.commit_and_push("add manifests");

    let err = render(context.request("env/dev"))
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::Pr(_)));

    // the rendered commit still reached the batched commit branch
    assert!(context.remote_branch_exists("prs/kargo-render/env/dev"));
    assert!(
        context
            .remote_file("prs/kargo-render/env/dev", "app/all.yaml")
            .contains("kind: Service")
    );
    // and the target branch only carries the initial commit
    assert_eq!(context.remote_commit_count("env/dev"), 1);
}

#[tokio::test]
async fn cancelled_token_stops_the_render() {
    let context = context_with_manifests();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = Renderer::new(FileGenerator)
        .render(context.request("env/dev"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, RenderError::Cancelled));
    assert!(!context.remote_branch_exists("env/dev"));
}

#[tokio::test]
async fn preserved_paths_survive_rendering() {
    let context = TestContext::new();
    context.write(
        "kargo-render.yaml",
        r#"
configVersion: v1alpha1
branchConfigs:
  - name: env/dev
    appConfigs:
      app:
        configManagement:
          path: manifests
          directory: {}
        combineManifests: true
    preservedPaths:
      - docs
"#,
    );
    context.write("manifests/service.yaml", SERVICE);
    context.commit_and_push("add manifests");

    // first render publishes the branch
    render(context.request("env/dev")).await.unwrap();

    // someone adds a preserved file directly on the target branch
    let helper_dir = context.scratch_path("helper");
    fs_err::create_dir(&helper_dir).unwrap();
    let helper = git_cmd::Repo::init(&helper_dir);
    helper
        .git(&["remote", "add", "origin", context.remote_dir().as_str()])
        .unwrap();
    helper.checkout_remote_branch("env/dev").unwrap();
    fs_err::create_dir_all(helper.directory().join("docs")).unwrap();
    fs_err::write(helper.directory().join("docs/README.md"), "env docs").unwrap();
    helper.add_all_and_commit("add docs").unwrap();
    helper.push("env/dev").unwrap();

    // a re-render must not wipe the preserved path
    context.write(
        "manifests/service.yaml",
        "kind: Service\nmetadata:\n  name: app\nspec:\n  ports:\n    - port: 9090\n",
    );
    context.commit_and_push("bump service port");
    render(context.request("env/dev")).await.unwrap();

    assert_eq!(
        context.remote_file("env/dev", "docs/README.md"),
        "env docs"
    );
    assert!(
        context
            .remote_file("env/dev", "app/all.yaml")
            .contains("9090")
    );
}

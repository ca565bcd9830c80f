use assert_cmd::Command;
use camino::{Utf8Path, Utf8PathBuf};
use git_cmd::{Repo, git_in_dir};

fn kargo_render_cmd() -> Command {
    Command::cargo_bin("kargo-render").unwrap()
}

/// Bare remote plus a clean clone with manifests rendered from a plain
/// directory source, so no external templating binary is needed.
fn test_universe() -> (tempfile::TempDir, Utf8PathBuf) {
    test_logs::init();
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8Path::from_path(dir.path()).unwrap().to_path_buf();

    let remote = root.join("remote.git");
    fs_err::create_dir(&remote).unwrap();
    git_in_dir(&remote, &["init", "--bare", "-b", "main"], &[]).unwrap();

    let work = root.join("work");
    fs_err::create_dir(&work).unwrap();
    let repo = Repo::init(&work);
    repo.git(&["remote", "add", "origin", remote.as_str()])
        .unwrap();
    fs_err::write(
        work.join("kargo-render.yaml"),
        r#"configVersion: v1alpha1
branchConfigs:
  - name: env/dev
    appConfigs:
      app:
        configManagement:
          path: manifests
          directory: {}
        combineManifests: true
"#,
    )
    .unwrap();
    fs_err::create_dir(work.join("manifests")).unwrap();
    fs_err::write(
        work.join("manifests/service.yaml"),
        "kind: Service\nmetadata:\n  name: app\n",
    )
    .unwrap();
    repo.add_all_and_commit("add manifests").unwrap();
    repo.push("main").unwrap();

    (dir, work)
}

#[test]
fn render_to_stdout_prints_app_blocks() {
    let (_dir, work) = test_universe();
    let assert = kargo_render_cmd()
        .arg("render")
        .arg("--local-in-path")
        .arg(&work)
        .arg("--target-branch")
        .arg("env/dev")
        .arg("--stdout")
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    assert!(stdout.contains("App: app"));
    assert!(stdout.contains("--------------------------------------------------"));
    assert!(stdout.contains("kind: Service"));
}

#[test]
fn render_pushes_and_reports_json() {
    let (dir, work) = test_universe();
    let assert = kargo_render_cmd()
        .arg("render")
        .arg("--local-in-path")
        .arg(&work)
        .arg("--target-branch")
        .arg("env/dev")
        .arg("--output")
        .arg("json")
        .assert()
        .success();

    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let response: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(response["actionTaken"], "PUSHED_DIRECTLY");

    let remote = Utf8Path::from_path(dir.path()).unwrap().join("remote.git");
    let head = git_in_dir(&remote, &["rev-parse", "refs/heads/env/dev"], &[]).unwrap();
    assert_eq!(response["commitId"], head.as_str());
}

#[test]
fn conflicting_outputs_are_rejected() {
    let (_dir, work) = test_universe();
    kargo_render_cmd()
        .arg("render")
        .arg("--local-in-path")
        .arg(&work)
        .arg("--target-branch")
        .arg("env/dev")
        .arg("--stdout")
        .arg("--local-out-path")
        .arg("/tmp/does-not-matter")
        .assert()
        .failure();
}

#[test]
fn invalid_target_branch_is_rejected() {
    let (_dir, work) = test_universe();
    let assert = kargo_render_cmd()
        .arg("render")
        .arg("--local-in-path")
        .arg(&work)
        .arg("--target-branch")
        .arg("env/dev*")
        .assert()
        .failure();
    let stderr = String::from_utf8(assert.get_output().stderr.clone()).unwrap();
    assert!(stderr.contains("invalid render request"));
}

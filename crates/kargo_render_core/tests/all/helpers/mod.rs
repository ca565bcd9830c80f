use camino::{Utf8Path, Utf8PathBuf};
use git_cmd::{Repo, git_in_dir};
use kargo_render_core::fs_utils::Utf8TempDir;
use kargo_render_core::{ApplicationSource, ManifestGenerator, RenderRequest};

/// Generator that reads the `*.yaml` files checked in under the app path,
/// like the real templating tools would produce them.
pub struct FileGenerator;

impl ManifestGenerator for FileGenerator {
    async fn generate(&self, source: ApplicationSource<'_>) -> anyhow::Result<Vec<String>> {
        if !source.app_path.is_dir() {
            return Ok(vec![]);
        }
        let mut files: Vec<Utf8PathBuf> = vec![];
        collect_yaml_files(&source.app_path, &mut files)?;
        files.sort();

        let mut docs = vec![];
        for file in files {
            let content = fs_err::read_to_string(&file)?;
            for document in serde_yaml::Deserializer::from_str(&content) {
                let value: serde_json::Value = serde::Deserialize::deserialize(document)?;
                if value.is_null() {
                    continue;
                }
                docs.push(serde_json::to_string(&value)?);
            }
        }
        Ok(docs)
    }
}

fn collect_yaml_files(dir: &Utf8Path, files: &mut Vec<Utf8PathBuf>) -> anyhow::Result<()> {
    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let path = Utf8PathBuf::from_path_buf(entry.path()).expect("test paths are utf-8");
        if entry.file_type()?.is_dir() {
            collect_yaml_files(&path, files)?;
        } else if path.extension() == Some("yaml") {
            files.push(path);
        }
    }
    Ok(())
}

/// The universe a render request runs in: a bare "remote" repository and a
/// local clone whose `origin` points at it.
pub struct TestContext {
    dir: Utf8TempDir,
    pub repo: Repo,
}

impl TestContext {
    pub fn new() -> Self {
        test_logs::init();
        let dir = Utf8TempDir::new().unwrap();
        let remote = dir.path().join("remote.git");
        fs_err::create_dir(&remote).unwrap();
        git_in_dir(&remote, &["init", "--bare", "-b", "main"], &[]).unwrap();

        let work = dir.path().join("work");
        fs_err::create_dir(&work).unwrap();
        let repo = Repo::init(&work);
        repo.git(&["remote", "add", "origin", remote.as_str()])
            .unwrap();
        repo.push("main").unwrap();
        Self { dir, repo }
    }

    pub fn work_dir(&self) -> Utf8PathBuf {
        self.dir.path().join("work")
    }

    pub fn remote_dir(&self) -> Utf8PathBuf {
        self.dir.path().join("remote.git")
    }

    /// A scratch path inside the test universe that does not exist yet.
    pub fn scratch_path(&self, name: &str) -> Utf8PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, relative: &str, content: &str) {
        let path = self.work_dir().join(relative);
        fs_err::create_dir_all(path.parent().unwrap()).unwrap();
        fs_err::write(path, content).unwrap();
    }

    pub fn delete(&self, relative: &str) {
        fs_err::remove_dir_all(self.work_dir().join(relative)).unwrap();
    }

    pub fn commit_and_push(&self, message: &str) {
        self.repo.add_all_and_commit(message).unwrap();
        self.repo.push("main").unwrap();
    }

    pub fn source_head(&self) -> String {
        self.repo.current_commit_hash().unwrap()
    }

    /// Head commit of a branch on the remote.
    pub fn remote_head(&self, branch: &str) -> String {
        git_in_dir(
            &self.remote_dir(),
            &["rev-parse", &format!("refs/heads/{branch}")],
            &[],
        )
        .unwrap()
    }

    pub fn remote_branch_exists(&self, branch: &str) -> bool {
        git_in_dir(
            &self.remote_dir(),
            &["rev-parse", "--verify", &format!("refs/heads/{branch}")],
            &[],
        )
        .is_ok()
    }

    /// Number of commits on a remote branch.
    pub fn remote_commit_count(&self, branch: &str) -> usize {
        git_in_dir(&self.remote_dir(), &["rev-list", "--count", branch], &[])
            .unwrap()
            .parse()
            .unwrap()
    }

    /// Whether a file exists on a remote branch.
    pub fn remote_has_file(&self, branch: &str, path: &str) -> bool {
        git_in_dir(
            &self.remote_dir(),
            &["cat-file", "-e", &format!("{branch}:{path}")],
            &[],
        )
        .is_ok()
    }

    /// Contents of a file on a remote branch.
    pub fn remote_file(&self, branch: &str, path: &str) -> String {
        git_in_dir(
            &self.remote_dir(),
            &["show", &format!("{branch}:{path}")],
            &[],
        )
        .unwrap()
    }

    /// Message of the head commit of a remote branch.
    pub fn remote_commit_message(&self, branch: &str) -> String {
        git_in_dir(
            &self.remote_dir(),
            &["log", "-1", "--pretty=%B", branch],
            &[],
        )
        .unwrap()
    }

    /// A render request reading from the local clone.
    pub fn request(&self, target_branch: &str) -> RenderRequest {
        RenderRequest {
            local_in_path: Some(self.work_dir()),
            target_branch: target_branch.to_string(),
            ..RenderRequest::default()
        }
    }
}

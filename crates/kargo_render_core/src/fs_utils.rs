use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};

use crate::metadata::METADATA_DIR;

const GIT_DIR: &str = ".git";

#[derive(Debug)]
pub struct Utf8TempDir {
    // Kept for its `Drop` implementation, which removes the directory.
    _temp_dir: tempfile::TempDir,
    path: Utf8PathBuf,
}

impl Utf8TempDir {
    pub fn new() -> anyhow::Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix("kargo-render-")
            .tempdir()
            .context("cannot create temporary directory")?;
        let path = to_utf8_path(temp_dir.path())?.to_path_buf();
        Ok(Self {
            _temp_dir: temp_dir,
            path,
        })
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

pub fn to_utf8_path(path: &Path) -> anyhow::Result<&Utf8Path> {
    Utf8Path::from_path(path).with_context(|| format!("path {path:?} is not valid utf-8"))
}

pub fn canonicalize_utf8(path: impl AsRef<Utf8Path>) -> anyhow::Result<Utf8PathBuf> {
    let path = path.as_ref();
    let canonical = fs_err::canonicalize(path)
        .with_context(|| format!("cannot canonicalize path {path:?}"))?;
    Ok(to_utf8_path(&canonical)?.to_path_buf())
}

/// Wipe a branch working tree, keeping the preserved set.
///
/// `.git` and `.kargo-render` are always preserved in addition to
/// `preserved_paths`, which are interpreted relative to `dir`. A directory
/// whose entire contents were removed is removed as well; `dir` itself never
/// is.
pub fn clean_commit_branch(dir: &Utf8Path, preserved_paths: &[String]) -> anyhow::Result<()> {
    let mut preserved: BTreeSet<Utf8PathBuf> = preserved_paths
        .iter()
        .map(|p| dir.join(p.trim_end_matches('/')))
        .collect();
    preserved.insert(dir.join(GIT_DIR));
    preserved.insert(dir.join(METADATA_DIR));
    clean_dir(dir, &preserved)?;
    Ok(())
}

/// Remove everything under `dir` except preserved paths.
/// Returns whether `dir` is empty afterwards.
fn clean_dir(dir: &Utf8Path, preserved: &BTreeSet<Utf8PathBuf>) -> anyhow::Result<bool> {
    let mut is_empty = true;
    for entry in fs_err::read_dir(dir)? {
        let entry = entry?;
        let path = to_utf8_path(&entry.path())?.to_path_buf();
        if preserved.contains(&path) {
            is_empty = false;
            continue;
        }
        if entry.file_type()?.is_dir() {
            if clean_dir(&path, preserved)? {
                fs_err::remove_dir(&path)?;
            } else {
                is_empty = false;
            }
        } else {
            fs_err::remove_file(&path)?;
        }
    }
    Ok(is_empty)
}

/// Copy the contents of a branch working tree into `dst`, omitting `.git`.
pub fn copy_branch_contents(src: &Utf8Path, dst: &Utf8Path) -> anyhow::Result<()> {
    copy_tree(src, dst, true)
}

/// Copy a directory tree verbatim, `.git` included.
pub fn copy_dir_all(src: &Utf8Path, dst: &Utf8Path) -> anyhow::Result<()> {
    copy_tree(src, dst, false)
}

fn copy_tree(src: &Utf8Path, dst: &Utf8Path, skip_git: bool) -> anyhow::Result<()> {
    fs_err::create_dir_all(dst).with_context(|| format!("cannot create directory {dst:?}"))?;
    let walker = walkdir::WalkDir::new(src)
        .min_depth(1)
        .into_iter()
        .filter_entry(move |e| !(skip_git && e.depth() == 1 && e.file_name() == GIT_DIR));
    for entry in walker {
        let entry = entry.context("cannot walk source directory")?;
        let path = to_utf8_path(entry.path())?;
        let relative = path
            .strip_prefix(src)
            .with_context(|| format!("cannot strip prefix {src:?} from {path:?}"))?;
        let target = dst.join(relative);
        if entry.file_type().is_dir() {
            fs_err::create_dir_all(&target)?;
        } else {
            if let Some(parent) = target.parent() {
                fs_err::create_dir_all(parent)?;
            }
            fs_err::copy(path, &target)
                .with_context(|| format!("cannot copy {path:?} to {target:?}"))?;
        }
    }
    Ok(())
}

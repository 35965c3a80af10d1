use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

use super::paths::relative_name;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("local root {0:?} is not a directory")]
    NotADirectory(PathBuf),
    #[error("failed to walk local tree: {0}")]
    Walk(#[from] walkdir::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    pub path: PathBuf,
}

/// Lists every regular file under `root` (recursively, dotfiles included,
/// symlinks followed) sorted by name within each directory. Directories are
/// skipped, as are files whose path is not valid UTF-8: they have no object
/// key and are reported with a warning.
pub fn scan(root: &Path) -> Result<Vec<LocalFile>, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::NotADirectory(root.to_path_buf()));
    }

    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.into_path();
        match relative_name(root, &path) {
            Some(name) => files.push(LocalFile { name, path }),
            None => warn!("skipping {path:?}: name is not valid UTF-8"),
        }
    }
    Ok(files)
}

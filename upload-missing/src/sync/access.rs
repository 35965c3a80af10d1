//! Temporary permission repair for local files the owner cannot read.
//!
//! A file counts as unreadable when its owner read bit is clear. Repair adds
//! owner read/write, keeps every other bit, and remembers the exact original
//! mode so [`Repair::restore`] can put it back.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("failed to inspect {path:?}: {source}")]
    Inspect { path: PathBuf, source: io::Error },
    #[error("failed to relax permissions on {path:?}: {source}")]
    Relax { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repair {
    path: PathBuf,
    original_mode: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Readable,
    Repaired(Repair),
}

impl Access {
    pub fn is_repaired(&self) -> bool {
        matches!(self, Access::Repaired(_))
    }
}

#[cfg(unix)]
const OWNER_READ: u32 = 0o400;
#[cfg(unix)]
const OWNER_READ_WRITE: u32 = 0o600;

#[cfg(unix)]
pub async fn ensure_readable(path: &Path) -> Result<Access, RepairError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|source| RepairError::Inspect {
            path: path.to_path_buf(),
            source,
        })?;
    let original_mode = metadata.permissions().mode() & 0o7777;
    if original_mode & OWNER_READ != 0 {
        return Ok(Access::Readable);
    }

    let relaxed = std::fs::Permissions::from_mode(original_mode | OWNER_READ_WRITE);
    tokio::fs::set_permissions(path, relaxed)
        .await
        .map_err(|source| RepairError::Relax {
            path: path.to_path_buf(),
            source,
        })?;

    Ok(Access::Repaired(Repair {
        path: path.to_path_buf(),
        original_mode,
    }))
}

#[cfg(not(unix))]
pub async fn ensure_readable(_path: &Path) -> Result<Access, RepairError> {
    Ok(Access::Readable)
}

impl Repair {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_mode(&self) -> u32 {
        self.original_mode
    }

    #[cfg(unix)]
    pub async fn restore(&self) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        tokio::fs::set_permissions(
            &self.path,
            std::fs::Permissions::from_mode(self.original_mode),
        )
        .await
    }

    #[cfg(not(unix))]
    pub async fn restore(&self) -> io::Result<()> {
        Ok(())
    }
}

//! Filesystem helpers for staged installs.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

/// Failure of [`move_dir`].
#[derive(Debug, Error)]
pub enum MoveError {
    /// Nothing moved; the source is intact.
    #[error("{0}")]
    NotMoved(#[from] io::Error),

    /// The destination holds a full copy but the source was only partly
    /// deleted.
    #[error("copied, but removing the source failed: {0}")]
    SourceLeft(io::Error),
}

impl MoveError {
    /// Returns true if the destination holds a complete copy.
    #[must_use]
    pub fn copied(&self) -> bool {
        matches!(self, Self::SourceLeft(_))
    }
}

/// Recursively copies a directory.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }

    Ok(())
}

/// Moves a directory, falling back to copy and delete across filesystems.
pub fn move_dir(src: &Path, dst: &Path) -> Result<(), MoveError> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(err) => {
            debug!("[FS] rename {:?} -> {:?} failed ({}), copying", src, dst, err);
            copy_then_remove(src, dst)
        }
    }
}

fn copy_then_remove(src: &Path, dst: &Path) -> Result<(), MoveError> {
    if let Err(copy_err) = copy_dir_recursive(src, dst) {
        // Leave the source untouched when the copy is incomplete
        let _ = fs::remove_dir_all(dst);
        return Err(MoveError::NotMoved(copy_err));
    }
    fs::remove_dir_all(src).map_err(|e| {
        warn!("[FS] {:?} copied to {:?} but not fully removed: {}", src, dst, e);
        MoveError::SourceLeft(e)
    })
}

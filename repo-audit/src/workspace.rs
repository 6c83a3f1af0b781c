use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::WorkspaceError;

/// Scratch directory owned by exactly one audit run.
///
/// The directory is removed when the handle is released or dropped,
/// whichever happens first. Release is idempotent.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    id: String,
    released: bool,
}

impl Workspace {
    /// Create a fresh, uniquely named directory under `root`.
    pub fn acquire(root: &Path) -> Result<Self, WorkspaceError> {
        let id = format!("audit-{}", Uuid::new_v4().simple());
        let path = root.join(&id);

        // create_dir (not create_dir_all) so a name collision is an error
        std::fs::create_dir(&path).map_err(|source| WorkspaceError {
            root: root.to_path_buf(),
            source,
        })?;

        debug!(path = %path.display(), "workspace acquired");
        Ok(Self {
            path,
            id,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Basename of the workspace directory, unique per run.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Recursively delete the directory. A directory that is already gone
    /// is not an error.
    pub fn release(&mut self) -> std::io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "workspace released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "failed to remove workspace");
                Err(e)
            }
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

//! Scoped temporary workspace for one engine run
//!
//! The directory is removed when the [`Workspace`] is closed or dropped, on
//! every exit path. Removal failures are logged and otherwise ignored.

use super::command::{INPUT_FILE_NAME, LOG_FILE_NAME, OUTPUT_FILE_NAME};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const WORKSPACE_PREFIX: &str = "pdf-image-tools-gs-";

#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a fresh workspace directory under `root`
    pub fn create_in(root: &Path) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(root)
            .map_err(|e| Error::EngineFailed {
                detail: format!("could not create a temporary workspace: {}", e),
            })?;
        tracing::debug!(workspace = %dir.path().display(), "Created engine workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn input_path(&self) -> PathBuf {
        self.path().join(INPUT_FILE_NAME)
    }

    pub fn output_path(&self) -> PathBuf {
        self.path().join(OUTPUT_FILE_NAME)
    }

    pub fn log_path(&self) -> PathBuf {
        self.path().join(LOG_FILE_NAME)
    }

    /// Write the engine log; failures only warn
    pub fn write_log(&self, text: &str) {
        if let Err(e) = std::fs::write(self.log_path(), text) {
            tracing::warn!(path = %self.log_path().display(), error = %e, "Failed to write engine log");
        }
    }

    /// Copy the log next to the workspace so it outlives it.
    ///
    /// Returns where the log can be read after the workspace is gone, or the
    /// in-workspace path if the copy failed.
    pub fn persist_log(&self) -> PathBuf {
        let name = self
            .path()
            .file_name()
            .map(|n| format!("{}.log", n.to_string_lossy()))
            .unwrap_or_else(|| LOG_FILE_NAME.to_string());
        let kept = match self.path().parent() {
            Some(parent) => parent.join(name),
            None => return self.log_path(),
        };

        match std::fs::copy(self.log_path(), &kept) {
            Ok(_) => kept,
            Err(e) => {
                tracing::warn!(path = %kept.display(), error = %e, "Failed to keep engine log");
                self.log_path()
            }
        }
    }

    /// Remove the workspace now, logging instead of failing
    pub fn close(self) {
        let path = self.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!(workspace = %path.display(), "Removed engine workspace"),
            Err(e) => {
                tracing::warn!(workspace = %path.display(), error = %e, "Failed to remove engine workspace")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let root = TempDir::new().unwrap();
        let workspace = Workspace::create_in(root.path()).unwrap();

        assert!(workspace.path().starts_with(root.path()));
        assert!(workspace
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(WORKSPACE_PREFIX));
        assert_eq!(workspace.input_path(), workspace.path().join("input.pdf"));
        assert_eq!(workspace.output_path(), workspace.path().join("output.pdf"));
        assert_eq!(workspace.log_path(), workspace.path().join("ghostscript.log"));
    }

    #[test]
    fn test_close_removes_directory() {
        let root = TempDir::new().unwrap();
        let workspace = Workspace::create_in(root.path()).unwrap();
        std::fs::write(workspace.input_path(), b"%PDF").unwrap();
        let path = workspace.path().to_path_buf();

        workspace.close();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let root = TempDir::new().unwrap();
        let path = {
            let workspace = Workspace::create_in(root.path()).unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_persisted_log_outlives_workspace() {
        let root = TempDir::new().unwrap();
        let workspace = Workspace::create_in(root.path()).unwrap();
        workspace.write_log("Error: /undefined in --run--");

        let kept = workspace.persist_log();
        workspace.close();

        assert_eq!(kept.parent(), Some(root.path()));
        assert_eq!(
            std::fs::read_to_string(&kept).unwrap(),
            "Error: /undefined in --run--"
        );
    }

    #[test]
    fn test_create_in_missing_root_fails() {
        let root = TempDir::new().unwrap();
        let result = Workspace::create_in(&root.path().join("missing"));
        assert!(matches!(result, Err(Error::EngineFailed { .. })));
    }
}

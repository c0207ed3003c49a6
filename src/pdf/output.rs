//! Destination checks and delete-on-failure output files

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Check that `output` can be created without overwriting anything.
///
/// The check is advisory: callers must not race the same destination.
pub fn ensure_writable_destination(output: &Path) -> Result<()> {
    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    if !parent.is_dir() {
        return Err(Error::OutputDirectoryNotFound {
            path: parent.display().to_string(),
        });
    }

    if output.exists() {
        return Err(Error::OutputFileExists {
            path: output.display().to_string(),
        });
    }

    Ok(())
}

/// A freshly created destination file that is deleted again unless
/// [`OutputGuard::commit`] is reached.
pub struct OutputGuard {
    path: PathBuf,
    file: Option<File>,
}

impl OutputGuard {
    /// Create `path`, failing if it already exists
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => Error::OutputFileExists {
                    path: path.display().to_string(),
                },
                _ => Error::DocumentCreationFailed {
                    reason: format!("{}: {}", path.display(), e),
                },
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the finished document and keep the file
    pub fn commit(mut self, bytes: &[u8]) -> Result<()> {
        let finalize_failed = |e: io::Error| Error::DocumentCreationFailed {
            reason: format!("{}: {}", self.path.display(), e),
        };

        if let Some(mut file) = self.file.take() {
            file.write_all(bytes).map_err(finalize_failed)?;
            file.sync_all().map_err(finalize_failed)?;
        }

        // Disarm: nothing left to clean up
        self.path = PathBuf::new();
        Ok(())
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.path.as_os_str().is_empty() {
            return;
        }

        // Close before removing (required on Windows)
        self.file.take();
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove partial output");
        } else {
            tracing::debug!(path = %self.path.display(), "Removed partial output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_destination_ok() {
        let dir = TempDir::new().unwrap();
        assert!(ensure_writable_destination(&dir.path().join("out.pdf")).is_ok());
    }

    #[test]
    fn test_destination_missing_directory() {
        let dir = TempDir::new().unwrap();
        let result = ensure_writable_destination(&dir.path().join("missing/out.pdf"));
        assert!(matches!(result, Err(Error::OutputDirectoryNotFound { .. })));
    }

    #[test]
    fn test_destination_exists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");
        std::fs::write(&path, b"keep me").unwrap();

        let result = ensure_writable_destination(&path);
        assert!(matches!(result, Err(Error::OutputFileExists { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), b"keep me");
    }

    #[test]
    fn test_guard_removes_file_when_dropped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");

        {
            let guard = OutputGuard::create(&path).unwrap();
            assert!(guard.path().exists());
        }

        assert!(!path.exists());
    }

    #[test]
    fn test_guard_keeps_committed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");

        let guard = OutputGuard::create(&path).unwrap();
        guard.commit(b"%PDF-1.7").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.7");
    }

    #[test]
    fn test_guard_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.pdf");
        std::fs::write(&path, b"original").unwrap();

        let result = OutputGuard::create(&path);
        assert!(matches!(result, Err(Error::OutputFileExists { .. })));
        assert_eq!(std::fs::read(&path).unwrap(), b"original");
    }
}

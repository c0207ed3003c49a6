//! External recompression through Ghostscript
//!
//! The engine runs in a private temporary workspace holding a copy of the
//! source, the engine output and its log. The finished file is copied to the
//! destination only after the engine reported success and produced output.

pub mod command;
pub mod locate;
pub mod workspace;

pub use command::{CapturedOutput, EngineInvocation};
pub use locate::{EngineLocator, EngineResources, Probe, SystemProbe};
pub use workspace::Workspace;

use crate::error::{Error, Result};
use crate::pdf::optimizer::CompressionQuality;
use crate::pdf::output::{ensure_writable_destination, OutputGuard};
use std::path::Path;
use std::time::Instant;

/// Recompress `pdf_path` into `output_path` with Ghostscript.
///
/// Fails with [`Error::EngineNotFound`] before anything is written when no
/// executable can be located.
pub fn optimize_external<P: Probe>(
    pdf_path: &Path,
    output_path: &Path,
    quality: CompressionQuality,
    locator: &EngineLocator<P>,
) -> Result<()> {
    optimize_external_in(pdf_path, output_path, quality, locator, &std::env::temp_dir())
}

/// [`optimize_external`] with workspaces created under `workspace_root`
pub(crate) fn optimize_external_in<P: Probe>(
    pdf_path: &Path,
    output_path: &Path,
    quality: CompressionQuality,
    locator: &EngineLocator<P>,
    workspace_root: &Path,
) -> Result<()> {
    if !pdf_path.is_file() {
        return Err(Error::FileNotFound {
            path: pdf_path.display().to_string(),
        });
    }
    ensure_writable_destination(output_path)?;

    let executable = locator.locate_executable().ok_or(Error::EngineNotFound)?;
    let resources = locator.locate_resources(&executable);
    if resources.is_none() {
        tracing::warn!(
            executable = %executable.display(),
            "Ghostscript resources not found, running without library paths"
        );
    }

    let started = Instant::now();
    let workspace = Workspace::create_in(workspace_root)?;
    std::fs::copy(pdf_path, workspace.input_path())?;

    let invocation =
        EngineInvocation::new(&executable, quality, resources.as_ref(), workspace.path());
    tracing::debug!(
        executable = %executable.display(),
        preset = quality.preset(),
        workspace = %workspace.path().display(),
        "Starting Ghostscript"
    );

    let output = invocation
        .to_command()
        .output()
        .map_err(|e| Error::EngineFailed {
            detail: format!("could not start {}: {}", executable.display(), e),
        })?;

    let captured = CapturedOutput::from_output(&output);
    workspace.write_log(&captured.log_text());

    if !output.status.success() {
        let log = workspace.persist_log();
        return Err(Error::EngineFailed {
            detail: format!("{} (log: {})", captured.summary(), log.display()),
        });
    }

    let produced = workspace.output_path();
    if !produced.is_file() {
        let log = workspace.persist_log();
        return Err(Error::EngineFailed {
            detail: format!("no output produced (log: {})", log.display()),
        });
    }

    let bytes = std::fs::read(&produced)?;
    let guard = OutputGuard::create(output_path)?;
    guard.commit(&bytes)?;
    workspace.close();

    tracing::info!(
        output = %output_path.display(),
        preset = quality.preset(),
        optimized_bytes = bytes.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Ghostscript optimization finished"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::locate::tests::FakeProbe;
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_source(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("source.pdf");
        std::fs::write(&path, b"%PDF-1.4\n% fake body\n").unwrap();
        path
    }

    fn no_engine() -> EngineLocator<FakeProbe> {
        EngineLocator::with_probe(FakeProbe::default()).with_search_path(Some("/empty/bin".into()))
    }

    #[test]
    fn test_engine_not_found_creates_no_workspace() {
        let dir = TempDir::new().unwrap();
        let root = TempDir::new().unwrap();
        let source = write_source(&dir);
        let output = dir.path().join("out.pdf");

        let result = optimize_external_in(
            &source,
            &output,
            CompressionQuality::Ebook,
            &no_engine(),
            root.path(),
        );

        assert!(matches!(result, Err(Error::EngineNotFound)));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
        assert!(!output.exists());
    }

    #[test]
    fn test_missing_source_checked_first() {
        let dir = TempDir::new().unwrap();
        let result = optimize_external_in(
            &dir.path().join("missing.pdf"),
            &dir.path().join("out.pdf"),
            CompressionQuality::Ebook,
            &no_engine(),
            dir.path(),
        );
        assert!(matches!(result, Err(Error::FileNotFound { .. })));
    }

    #[test]
    fn test_existing_destination_checked_before_engine() {
        let dir = TempDir::new().unwrap();
        let source = write_source(&dir);
        let output = dir.path().join("out.pdf");
        std::fs::write(&output, b"keep").unwrap();

        let result = optimize_external_in(
            &source,
            &output,
            CompressionQuality::Ebook,
            &no_engine(),
            dir.path(),
        );
        assert!(matches!(result, Err(Error::OutputFileExists { .. })));
        assert_eq!(std::fs::read(&output).unwrap(), b"keep");
    }

    #[cfg(unix)]
    mod fake_engine {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Install an executable `gs` shell script into `dir`
        fn install_script(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("gs");
            std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            let mut permissions = std::fs::metadata(&path).unwrap().permissions();
            permissions.set_mode(0o755);
            std::fs::set_permissions(&path, permissions).unwrap();
            path
        }

        fn locator_for(bin: &Path) -> EngineLocator<SystemProbe> {
            EngineLocator::with_probe(SystemProbe)
                .with_executable(Some(bin.join("gs")))
                .with_search_path(None)
        }

        #[test]
        fn test_successful_run() {
            let dir = TempDir::new().unwrap();
            let bin = TempDir::new().unwrap();
            let root = TempDir::new().unwrap();
            let record = dir.path().join("record.txt");
            install_script(
                bin.path(),
                &format!(
                    "printf '%s\\n' \"$@\" > '{record}'\n\
                     echo \"cwd=$(pwd)\" >> '{record}'\n\
                     echo \"tmpdir=$TMPDIR\" >> '{record}'\n\
                     cp input.pdf output.pdf\n\
                     echo 'Processing pages 1 through 1.'",
                    record = record.display()
                ),
            );
            let source = write_source(&dir);
            let output = dir.path().join("out.pdf");

            optimize_external_in(
                &source,
                &output,
                CompressionQuality::Screen,
                &locator_for(bin.path()),
                root.path(),
            )
            .unwrap();

            assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&source).unwrap());

            let recorded = std::fs::read_to_string(&record).unwrap();
            assert!(recorded.contains("-dPDFSETTINGS=/screen"));
            assert!(recorded.contains("-sOutputFile=output.pdf"));
            let cwd = recorded
                .lines()
                .find_map(|l| l.strip_prefix("cwd="))
                .unwrap();
            let tmpdir = recorded
                .lines()
                .find_map(|l| l.strip_prefix("tmpdir="))
                .unwrap();
            assert_eq!(cwd, tmpdir);

            // Workspace removed, no log kept on success
            assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
        }

        #[test]
        fn test_failing_run_reports_stderr_and_keeps_log() {
            let dir = TempDir::new().unwrap();
            let bin = TempDir::new().unwrap();
            let root = TempDir::new().unwrap();
            install_script(bin.path(), "echo 'Error: /syntaxerror' >&2\nexit 3");
            let source = write_source(&dir);
            let output = dir.path().join("out.pdf");

            let result = optimize_external_in(
                &source,
                &output,
                CompressionQuality::Ebook,
                &locator_for(bin.path()),
                root.path(),
            );

            let detail = match result {
                Err(Error::EngineFailed { detail }) => detail,
                other => panic!("unexpected result: {:?}", other),
            };
            assert!(detail.starts_with("Error: /syntaxerror (log: "));
            assert!(!output.exists());

            let kept: Vec<PathBuf> = std::fs::read_dir(root.path())
                .unwrap()
                .map(|e| e.unwrap().path())
                .collect();
            assert_eq!(kept.len(), 1);
            assert_eq!(kept[0].extension().unwrap(), "log");
            assert!(detail.contains(&kept[0].display().to_string()));
            assert_eq!(
                std::fs::read_to_string(&kept[0]).unwrap(),
                "Error: /syntaxerror"
            );
        }

        #[test]
        fn test_silent_failure_reports_exit_code() {
            let dir = TempDir::new().unwrap();
            let bin = TempDir::new().unwrap();
            let root = TempDir::new().unwrap();
            install_script(bin.path(), "exit 7");
            let source = write_source(&dir);

            let result = optimize_external_in(
                &source,
                &dir.path().join("out.pdf"),
                CompressionQuality::Printer,
                &locator_for(bin.path()),
                root.path(),
            );

            match result {
                Err(Error::EngineFailed { detail }) => assert!(detail.starts_with("exit code 7 (log: ")),
                other => panic!("unexpected result: {:?}", other),
            }
        }

        #[test]
        fn test_success_without_output_file() {
            let dir = TempDir::new().unwrap();
            let bin = TempDir::new().unwrap();
            let root = TempDir::new().unwrap();
            install_script(bin.path(), "exit 0");
            let source = write_source(&dir);
            let output = dir.path().join("out.pdf");

            let result = optimize_external_in(
                &source,
                &output,
                CompressionQuality::Ebook,
                &locator_for(bin.path()),
                root.path(),
            );

            match result {
                Err(Error::EngineFailed { detail }) => assert!(detail.starts_with("no output produced")),
                other => panic!("unexpected result: {:?}", other),
            }
            assert!(!output.exists());

            let log = std::fs::read_dir(root.path())
                .unwrap()
                .map(|e| e.unwrap().path())
                .find(|p| p.extension().map(|e| e == "log").unwrap_or(false))
                .unwrap();
            assert!(std::fs::read_to_string(log)
                .unwrap()
                .starts_with("Ghostscript produced no output.\nexit code: 0"));
        }
    }
}

//! Ghostscript invocation: arguments, environment and captured output

use super::locate::EngineResources;
use crate::pdf::optimizer::CompressionQuality;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output};

/// Source copy inside the workspace
pub const INPUT_FILE_NAME: &str = "input.pdf";
/// Engine output inside the workspace
pub const OUTPUT_FILE_NAME: &str = "output.pdf";
/// Captured stdout/stderr inside the workspace
pub const LOG_FILE_NAME: &str = "ghostscript.log";

/// A fully described engine run
#[derive(Debug, Clone, PartialEq)]
pub struct EngineInvocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, OsString)>,
    pub working_dir: PathBuf,
}

impl EngineInvocation {
    pub fn new(
        program: &Path,
        quality: CompressionQuality,
        resources: Option<&EngineResources>,
        workspace: &Path,
    ) -> Self {
        let library_list = resources.and_then(|r| r.library_path_list());

        let mut args: Vec<OsString> = Vec::new();
        if let Some(list) = &library_list {
            args.push("-I".into());
            args.push(list.clone());
        }
        args.extend(
            [
                "-sDEVICE=pdfwrite".to_string(),
                "-dCompatibilityLevel=1.7".to_string(),
                format!("-dPDFSETTINGS={}", quality.preset()),
                "-dNOPAUSE".to_string(),
                "-dBATCH".to_string(),
                "-dSAFER".to_string(),
                "-dPDFSTOPONERROR".to_string(),
                "-dVerbose".to_string(),
                "-dDetectDuplicateImages=true".to_string(),
                "-dCompressFonts=true".to_string(),
                format!("-sOutputFile={}", OUTPUT_FILE_NAME),
                INPUT_FILE_NAME.to_string(),
            ]
            .into_iter()
            .map(OsString::from),
        );

        let mut env = Vec::new();
        if let Some(list) = library_list {
            env.push(("GS_LIB".to_string(), list));
        }
        if let Some(fonts) = resources.and_then(|r| r.font_path.as_ref()) {
            env.push(("GS_FONTPATH".to_string(), fonts.clone().into_os_string()));
        }
        if let Some(icc) = resources.and_then(|r| r.icc_path.as_ref()) {
            env.push(("GS_ICC_PROFILE_DIR".to_string(), icc.clone().into_os_string()));
        }
        env.push(("TMPDIR".to_string(), workspace.as_os_str().to_os_string()));

        Self {
            program: program.to_path_buf(),
            args,
            env,
            working_dir: workspace.to_path_buf(),
        }
    }

    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .current_dir(&self.working_dir);
        command
    }
}

/// Text captured from a finished engine process
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub termination: String,
}

impl CapturedOutput {
    pub fn from_output(output: &Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            termination: termination_reason(&output.status),
        }
    }

    fn non_empty_streams(&self) -> Vec<&str> {
        [self.stderr.trim(), self.stdout.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn exit_code_text(&self) -> String {
        self.exit_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "none".to_string())
    }

    /// Log file contents; never empty
    pub fn log_text(&self) -> String {
        let streams = self.non_empty_streams();
        if streams.is_empty() {
            format!(
                "Ghostscript produced no output.\nexit code: {}\ntermination reason: {}\n",
                self.exit_code_text(),
                self.termination
            )
        } else {
            streams.join("\n")
        }
    }

    /// One-line diagnostic for error messages
    pub fn summary(&self) -> String {
        let streams = self.non_empty_streams();
        if streams.is_empty() {
            format!("exit code {}", self.exit_code_text())
        } else {
            streams.join(" | ")
        }
    }
}

#[cfg(unix)]
fn termination_reason(status: &ExitStatus) -> String {
    use std::os::unix::process::ExitStatusExt;
    match status.signal() {
        Some(signal) => format!("uncaught signal {}", signal),
        None => "exit".to_string(),
    }
}

#[cfg(not(unix))]
fn termination_reason(_status: &ExitStatus) -> String {
    "exit".to_string()
}

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use musicbox_core::{BridgeConfig, BridgeError, BridgeResult};
use tokio::fs;
use tokio::process::Command;

/// Shortest printable run kept by the builtin extractor, same as `strings`.
pub const MIN_PRINTABLE_RUN: usize = 4;

/// Source of the engine's startup log text.
#[async_trait]
pub trait LogSource: Send + Sync {
    fn location(&self) -> &Path;

    /// `Ok(None)` when the log does not exist yet.
    async fn scan(&self) -> BridgeResult<Option<String>>;
}

/// Reads the engine GUI log. The file interleaves binary framing with status
/// lines, so text goes through `strings` (or the builtin fallback) first.
#[derive(Debug, Clone)]
pub struct GuiLogScanner {
    path: PathBuf,
    strings_command: String,
    timeout: Duration,
}

enum ToolExtract {
    Text(String),
    Unavailable(std::io::Error),
}

impl GuiLogScanner {
    pub fn new(path: impl Into<PathBuf>, strings_command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            path: path.into(),
            strings_command: strings_command.into(),
            timeout,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.gui_log_path(),
            config.log.strings_command.clone(),
            Duration::from_millis(config.log.extract_timeout_ms),
        )
    }

    async fn extract_with_tool(&self) -> BridgeResult<ToolExtract> {
        let mut command = Command::new(&self.strings_command);
        command
            .arg(&self.path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) => return Ok(ToolExtract::Unavailable(err)),
        };
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                return Err(BridgeError::ParameterResolution(format!(
                    "`{}` failed on {}: {}",
                    self.strings_command,
                    self.path.display(),
                    err
                )))
            }
            Err(_) => {
                return Err(BridgeError::ParameterResolution(format!(
                    "`{}` timed out after {}ms on {}",
                    self.strings_command,
                    self.timeout.as_millis(),
                    self.path.display()
                )))
            }
        };
        if !output.status.success() {
            return Err(BridgeError::ParameterResolution(format!(
                "`{}` exited with {} on {}: {}",
                self.strings_command,
                output.status,
                self.path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(ToolExtract::Text(
            String::from_utf8_lossy(&output.stdout).to_string(),
        ))
    }

    async fn extract_builtin(&self) -> BridgeResult<Option<String>> {
        match fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(extract_printable(&bytes, MIN_PRINTABLE_RUN))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(BridgeError::ParameterResolution(format!(
                "could not read {}: {}",
                self.path.display(),
                err
            ))),
        }
    }
}

#[async_trait]
impl LogSource for GuiLogScanner {
    fn location(&self) -> &Path {
        &self.path
    }

    async fn scan(&self) -> BridgeResult<Option<String>> {
        match fs::try_exists(&self.path).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(path = %self.path.display(), "engine log not present");
                return Ok(None);
            }
            Err(err) => {
                return Err(BridgeError::ParameterResolution(format!(
                    "could not stat {}: {}",
                    self.path.display(),
                    err
                )))
            }
        }
        match self.extract_with_tool().await? {
            ToolExtract::Text(text) => Ok(Some(text)),
            ToolExtract::Unavailable(err) => {
                tracing::debug!(
                    command = %self.strings_command,
                    "text extraction tool unavailable ({}), using builtin extractor",
                    err
                );
                self.extract_builtin().await
            }
        }
    }
}

/// Keeps runs of at least `min_run` printable ASCII bytes (space to `~` plus
/// tab), one run per output line. Anything else ends a run.
pub fn extract_printable(bytes: &[u8], min_run: usize) -> String {
    let mut lines = Vec::new();
    let mut current = String::new();
    for &b in bytes {
        if b == b'\t' || (0x20..=0x7e).contains(&b) {
            current.push(b as char);
            continue;
        }
        if current.len() >= min_run {
            lines.push(std::mem::take(&mut current));
        } else {
            current.clear();
        }
    }
    if current.len() >= min_run {
        lines.push(current);
    }
    lines.join("\n")
}

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use musicbox_core::{BridgeConfig, BridgeError, BridgeResult};
use tokio::process::Command;

const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Liveness check and launcher for the engine process.
#[async_trait]
pub trait EngineProcess: Send + Sync {
    async fn is_running(&self) -> bool;

    /// Starts the engine without waiting for it to become ready.
    async fn launch(&self) -> BridgeResult<()>;

    /// Where a human would start the engine by hand.
    fn launch_hint(&self) -> String;
}

#[derive(Debug, Clone)]
pub struct SystemEngineProcess {
    process_name: String,
    app_path: PathBuf,
    launch_command: Vec<String>,
}

impl SystemEngineProcess {
    pub fn new(process_name: impl Into<String>, app_path: impl Into<PathBuf>, launch_command: Vec<String>) -> Self {
        Self {
            process_name: process_name.into(),
            app_path: app_path.into(),
            launch_command,
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(
            config.engine.process_name.clone(),
            config.engine.app_path.clone(),
            config.launch_command(),
        )
    }

    fn uses_app_bundle(&self) -> bool {
        self.launch_command.first().map(String::as_str) == Some("open")
    }
}

#[async_trait]
impl EngineProcess for SystemEngineProcess {
    async fn is_running(&self) -> bool {
        let mut command = Command::new("pgrep");
        command
            .arg("-x")
            .arg(&self.process_name)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match tokio::time::timeout(LIVENESS_TIMEOUT, command.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(err)) => {
                tracing::debug!("pgrep unavailable: {}", err);
                false
            }
            Err(_) => {
                tracing::debug!("pgrep timed out after {:?}", LIVENESS_TIMEOUT);
                false
            }
        }
    }

    async fn launch(&self) -> BridgeResult<()> {
        let Some((program, args)) = self.launch_command.split_first() else {
            return Err(BridgeError::EngineUnavailable(
                "no launch command configured".to_string(),
            ));
        };
        if self.uses_app_bundle() && !self.app_path.exists() {
            return Err(BridgeError::EngineUnavailable(format!(
                "could not start the engine; {} does not exist, start it manually",
                self.app_path.display()
            )));
        }
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let mut child = command.spawn().map_err(|err| {
            BridgeError::EngineUnavailable(format!(
                "could not start the engine with `{}`: {}; start it manually from {}",
                program,
                err,
                self.launch_hint()
            ))
        })?;
        tracing::info!(program = %program, pid = ?child.id(), "engine launch requested");
        // The launcher may outlive this call; reap it in the background.
        tokio::spawn(async move {
            let _ = child.wait().await;
        });
        Ok(())
    }

    fn launch_hint(&self) -> String {
        self.app_path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_app_bundle_is_engine_unavailable() {
        let temp = tempfile::tempdir().expect("tempdir");
        let app = temp.path().join("Missing.app");
        let process = SystemEngineProcess::new(
            "musicbox-test-engine",
            &app,
            vec!["open".to_string(), app.display().to_string()],
        );
        let err = process.launch().await.expect_err("bundle missing");
        assert_eq!(err.kind(), "engine_unavailable");
        assert!(err.to_string().contains("Missing.app"));
    }

    #[tokio::test]
    async fn unknown_process_is_not_running() {
        let process = SystemEngineProcess::new(
            "musicbox-no-such-process-name",
            "/nonexistent",
            vec!["true".to_string()],
        );
        assert!(!process.is_running().await);
    }
}

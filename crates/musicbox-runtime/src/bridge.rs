use std::path::PathBuf;
use std::sync::Arc;

use musicbox_core::{BridgeConfig, LiveParameterStore};
use musicbox_types::{ResolvedParameters, SessionState};
use serde::Serialize;
use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::channel::{ControlChannel, OscControlChannel};
use crate::log_scan::{GuiLogScanner, LogSource};
use crate::process::{EngineProcess, SystemEngineProcess};
use crate::readiness::ReadinessPolicy;
use crate::resolver::ConnectionResolver;
use crate::session::Session;
use crate::sync::LiveMixSynchronizer;

/// Everything a tool call needs, wired once per process.
#[derive(Clone)]
pub struct BridgeRuntime {
    pub session: Session,
    pub mix: LiveMixSynchronizer,
    pub config: Arc<BridgeConfig>,
    resolver_version: u32,
}

impl BridgeRuntime {
    pub fn from_config(config: BridgeConfig, cancel: CancellationToken) -> anyhow::Result<Self> {
        let engine: Arc<dyn EngineProcess> = Arc::new(SystemEngineProcess::from_config(&config));
        let log: Arc<dyn LogSource> = Arc::new(GuiLogScanner::from_config(&config));
        let channel: Arc<dyn ControlChannel> = Arc::new(OscControlChannel::new());
        Self::from_parts(config, engine, log, channel, cancel)
    }

    /// Same wiring as [`BridgeRuntime::from_config`] with caller-supplied
    /// engine, log and channel bindings.
    pub fn from_parts(
        config: BridgeConfig,
        engine: Arc<dyn EngineProcess>,
        log: Arc<dyn LogSource>,
        channel: Arc<dyn ControlChannel>,
        cancel: CancellationToken,
    ) -> anyhow::Result<Self> {
        let resolver = ConnectionResolver::new(&config.patterns)?;
        let resolver_version = resolver.version();
        let session = Session::new(
            engine,
            log,
            resolver,
            channel,
            ReadinessPolicy::from(&config.readiness),
        )
        .with_cancellation(cancel);
        let mix = LiveMixSynchronizer::new(session.clone(), LiveParameterStore::new(config.state_file()));
        Ok(Self {
            session,
            mix,
            config: Arc::new(config),
            resolver_version,
        })
    }

    /// Read-only diagnostic snapshot. Scans the log but never connects.
    pub async fn debug_status(&self) -> DebugStatus {
        let snapshot = self.session.snapshot().await;
        let (parameters, resolution_error) = match self.session.resolve_parameters().await {
            Ok(resolved) => (resolved, None),
            Err(err) => (ResolvedParameters::empty(), Some(err.to_string())),
        };
        let gui_log = self.session.log_location();
        let daemon_log = self.config.daemon_log_path();
        let state_file = self.mix.store().path().to_path_buf();
        DebugStatus {
            engine_running: self.session.engine_running().await,
            channel_available: self.session.channel_available(),
            session_state: snapshot.state,
            connected: snapshot.state == SessionState::Connected,
            last_error: snapshot.last_error,
            parameters,
            resolution_error,
            pattern_version: self.resolver_version,
            gui_log_exists: path_exists(&gui_log).await,
            gui_log,
            daemon_log_exists: path_exists(&daemon_log).await,
            daemon_log,
            state_file_exists: path_exists(&state_file).await,
            state_file,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DebugStatus {
    pub engine_running: bool,
    pub channel_available: bool,
    pub session_state: SessionState,
    pub connected: bool,
    pub last_error: Option<String>,
    pub parameters: ResolvedParameters,
    pub resolution_error: Option<String>,
    pub pattern_version: u32,
    pub gui_log: PathBuf,
    pub gui_log_exists: bool,
    pub daemon_log: PathBuf,
    pub daemon_log_exists: bool,
    pub state_file: PathBuf,
    pub state_file_exists: bool,
}

impl DebugStatus {
    pub fn render(&self) -> String {
        let mut lines = vec![
            "=== Engine connection debug ===".to_string(),
            format!("Engine running: {}", self.engine_running),
            format!("Control binding available: {}", self.channel_available),
            format!(
                "Session: {} (connected: {})",
                self.session_state.as_str(),
                self.connected
            ),
        ];
        if let Some(err) = &self.last_error {
            lines.push(format!("Last error: {err}"));
        }
        lines.push(format!(
            "Parsed ({} pattern v{}): {}",
            self.gui_log.display(),
            self.pattern_version,
            self.parameters
        ));
        if let Some(err) = &self.resolution_error {
            lines.push(format!("Log scan failed: {err}"));
        }
        lines.push(format!(
            "GUI log exists: {} ({})",
            self.gui_log_exists,
            self.gui_log.display()
        ));
        lines.push(format!(
            "Daemon log exists: {} ({})",
            self.daemon_log_exists,
            self.daemon_log.display()
        ));
        lines.push(format!(
            "State file exists: {} ({})",
            self.state_file_exists,
            self.state_file.display()
        ));
        lines.join("\n")
    }
}

async fn path_exists(path: &std::path::Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

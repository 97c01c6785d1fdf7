use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use musicbox_core::{BridgeError, BridgeResult};
use musicbox_observability::{emit_event, redact_text, ObservabilityEvent, ProcessKind};
use musicbox_types::{ConnectionParameters, ResolvedParameters, SessionState};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::channel::ControlChannel;
use crate::log_scan::LogSource;
use crate::process::EngineProcess;
use crate::readiness::{poll_until, settle, PollOutcome, ReadinessPolicy};
use crate::resolver::ConnectionResolver;

#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub parameters: Option<ConnectionParameters>,
    pub last_error: Option<String>,
    pub updated_at_ms: u64,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: SessionState::Disconnected,
            parameters: None,
            last_error: None,
            updated_at_ms: now_ms(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    EngineNotRunning,
}

/// Process-local record of whether a usable control channel is configured.
///
/// Always starts `Disconnected`, whatever the engine is doing; `reconnect`
/// repairs that without touching the engine process.
#[derive(Clone)]
pub struct Session {
    inner: Arc<RwLock<SessionSnapshot>>,
    engine: Arc<dyn EngineProcess>,
    log: Arc<dyn LogSource>,
    resolver: Arc<ConnectionResolver>,
    channel: Arc<dyn ControlChannel>,
    readiness: ReadinessPolicy,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(
        engine: Arc<dyn EngineProcess>,
        log: Arc<dyn LogSource>,
        resolver: ConnectionResolver,
        channel: Arc<dyn ControlChannel>,
        readiness: ReadinessPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionSnapshot::default())),
            engine,
            log,
            resolver: Arc::new(resolver),
            channel,
            readiness,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn state(&self) -> SessionState {
        self.inner.read().await.state
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.inner.read().await.clone()
    }

    pub fn channel_available(&self) -> bool {
        self.channel.is_available()
    }

    pub fn log_location(&self) -> std::path::PathBuf {
        self.log.location().to_path_buf()
    }

    pub async fn engine_running(&self) -> bool {
        self.engine.is_running().await
    }

    /// Starts the engine if needed, waits for it, then connects.
    pub async fn initialize(&self) -> BridgeResult<String> {
        if !self.engine.is_running().await {
            self.start_engine().await?;
        }
        let params = self.connect().await?;
        Ok(format!(
            "Connected to the engine at {}:{}. Ready for music!",
            params.address, params.control_port
        ))
    }

    /// Re-resolves parameters against an already running engine. Never launches it.
    pub async fn reconnect(&self) -> BridgeResult<String> {
        if !self.engine.is_running().await {
            let err = BridgeError::EngineUnavailable(
                "the engine is not running; reconnect never starts it, use initialize".to_string(),
            );
            self.transition(SessionState::Disconnected, None, Some(&err))
                .await;
            return Err(err);
        }
        let params = self.connect().await?;
        Ok(format!(
            "Reconnected to the engine at {}:{} without interrupting playback.",
            params.address, params.control_port
        ))
    }

    /// Checks liveness and connects if the session is not already `Connected`.
    pub async fn ensure_connected(&self) -> BridgeResult<()> {
        if !self.engine.is_running().await {
            let err = BridgeError::EngineUnavailable("the engine is not running".to_string());
            self.transition(SessionState::Disconnected, None, Some(&err))
                .await;
            return Err(err);
        }
        if self.state().await == SessionState::Connected {
            return Ok(());
        }
        tracing::info!("session not connected, reconnecting before submission");
        self.connect().await.map(|_| ())
    }

    pub async fn execute(&self, code: &str) -> BridgeResult<()> {
        self.ensure_connected().await?;
        self.submit(code).await
    }

    pub async fn stop(&self) -> BridgeResult<StopOutcome> {
        if !self.engine.is_running().await {
            self.transition(SessionState::Disconnected, None, None).await;
            return Ok(StopOutcome::EngineNotRunning);
        }
        self.ensure_connected().await?;
        match self.channel.stop_all().await {
            Ok(()) => Ok(StopOutcome::Stopped),
            Err(err) => {
                let err = as_channel_failure(err);
                self.transition(SessionState::Disconnected, None, Some(&err))
                    .await;
                Err(err)
            }
        }
    }

    /// Sends code through the configured channel. Any failure drops the
    /// session to `Disconnected`.
    pub async fn submit(&self, code: &str) -> BridgeResult<()> {
        match self.channel.run_code(code).await {
            Ok(()) => Ok(()),
            Err(err) => {
                let err = as_channel_failure(err);
                self.transition(SessionState::Disconnected, None, Some(&err))
                    .await;
                Err(err)
            }
        }
    }

    /// Scans the log and resolves whatever it can. No state changes.
    pub async fn resolve_parameters(&self) -> BridgeResult<ResolvedParameters> {
        match self.log.scan().await? {
            Some(text) => Ok(self.resolver.resolve(&text)),
            None => Ok(ResolvedParameters::empty()),
        }
    }

    async fn start_engine(&self) -> BridgeResult<()> {
        if let Err(err) = self.engine.launch().await {
            self.transition(SessionState::Disconnected, None, Some(&err))
                .await;
            return Err(err);
        }
        self.transition(SessionState::Starting, None, None).await;

        let engine = self.engine.clone();
        let outcome = poll_until(&self.readiness, &self.cancel, || {
            let engine = engine.clone();
            async move { engine.is_running().await }
        })
        .await;
        match outcome {
            PollOutcome::Ready { attempts } => {
                tracing::info!(attempts, "engine is live, waiting for its log to settle");
            }
            PollOutcome::TimedOut { attempts } => {
                let err = BridgeError::StartupTimeout { attempts };
                self.transition(SessionState::Disconnected, None, Some(&err))
                    .await;
                return Err(err);
            }
            PollOutcome::Cancelled => {
                let err = BridgeError::Cancelled;
                self.transition(SessionState::Disconnected, None, Some(&err))
                    .await;
                return Err(err);
            }
        }

        if !settle(self.readiness.settle, &self.cancel).await {
            let err = BridgeError::Cancelled;
            self.transition(SessionState::Disconnected, None, Some(&err))
                .await;
            return Err(err);
        }
        Ok(())
    }

    async fn connect(&self) -> BridgeResult<ConnectionParameters> {
        if !self.engine.is_running().await {
            let err = BridgeError::EngineUnavailable("the engine is not running".to_string());
            self.transition(SessionState::Disconnected, None, Some(&err))
                .await;
            return Err(err);
        }

        let resolved = match self.resolve_parameters().await {
            Ok(resolved) => resolved,
            Err(err) => {
                self.transition(SessionState::Disconnected, None, Some(&err))
                    .await;
                return Err(err);
            }
        };
        let params = match resolved.complete() {
            Ok(params) => params,
            Err(missing) => {
                let err = BridgeError::ParameterResolution(format!(
                    "missing {} in {} ({})",
                    missing.join(", "),
                    self.log.location().display(),
                    redacted_summary(&resolved)
                ));
                self.transition(SessionState::Disconnected, None, Some(&err))
                    .await;
                return Err(err);
            }
        };

        if let Err(err) = self.channel.configure(&params).await {
            let err = as_channel_failure(err);
            self.transition(SessionState::Disconnected, None, Some(&err))
                .await;
            return Err(err);
        }
        self.transition(SessionState::Connected, Some(params.clone()), None)
            .await;
        Ok(params)
    }

    async fn transition(
        &self,
        state: SessionState,
        parameters: Option<ConnectionParameters>,
        error: Option<&BridgeError>,
    ) {
        let previous = {
            let mut inner = self.inner.write().await;
            let previous = inner.state;
            inner.state = state;
            inner.parameters = if state == SessionState::Connected {
                parameters
            } else {
                None
            };
            inner.last_error = error.map(|e| e.to_string());
            inner.updated_at_ms = now_ms();
            previous
        };

        let detail = format!("from={} to={}", previous.as_str(), state.as_str());
        let level = if error.is_some() {
            tracing::Level::WARN
        } else {
            tracing::Level::INFO
        };
        let error_text = error.map(|e| e.to_string());
        emit_event(
            level,
            ProcessKind::Bridge,
            ObservabilityEvent {
                event: "session.transition",
                component: "runtime.session",
                session_state: Some(state.as_str()),
                status: Some(if error.is_some() { "failed" } else { "ok" }),
                error_code: error.map(|e| e.kind()),
                detail: Some(error_text.as_deref().unwrap_or(&detail)),
                ..Default::default()
            },
        );
    }
}

fn as_channel_failure(err: BridgeError) -> BridgeError {
    match err {
        BridgeError::ChannelFailure(_) => err,
        other => BridgeError::ChannelFailure(other.to_string()),
    }
}

fn redacted_summary(resolved: &ResolvedParameters) -> String {
    let token = resolved
        .token
        .map(|t| redact_text(&t.to_string()))
        .unwrap_or_else(|| "None".to_string());
    format!(
        "found IP={}, control_port={}, event_port={}, token={}",
        resolved.address.as_deref().unwrap_or("None"),
        resolved
            .control_port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "None".to_string()),
        resolved
            .event_port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "None".to_string()),
        token
    )
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

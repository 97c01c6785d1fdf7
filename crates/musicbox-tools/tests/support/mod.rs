#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use musicbox_core::{BridgeConfig, BridgeError, BridgeResult};
use musicbox_runtime::{BridgeRuntime, ControlChannel, EngineProcess, LogSource};
use musicbox_tools::ToolRegistry;
use musicbox_types::ConnectionParameters;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const ENGINE_LOG: &str = "\
Sonic Pi GUI booting
daemon_stdout: 4560
Setting up OSC sender to Spider on port 37201
Setting up OSC sender to Tau on port 37202
daemon_stdout: 1839204711
";

#[derive(Default)]
pub struct FakeEngine {
    pub running: AtomicBool,
    pub starts_on_launch: bool,
    pub launches: AtomicU32,
}

#[async_trait]
impl EngineProcess for FakeEngine {
    async fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn launch(&self) -> BridgeResult<()> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if self.starts_on_launch {
            self.running.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn launch_hint(&self) -> String {
        "fake engine".to_string()
    }
}

pub struct FakeLog {
    pub path: PathBuf,
    pub text: Mutex<Option<String>>,
}

#[async_trait]
impl LogSource for FakeLog {
    fn location(&self) -> &Path {
        &self.path
    }

    async fn scan(&self) -> BridgeResult<Option<String>> {
        Ok(self.text.lock().expect("lock").clone())
    }
}

#[derive(Default)]
pub struct RecordingChannel {
    pub configured: Mutex<Vec<ConnectionParameters>>,
    pub sent: Mutex<Vec<String>>,
    pub stops: AtomicU32,
    pub fail_sends: AtomicBool,
}

impl RecordingChannel {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ControlChannel for RecordingChannel {
    async fn configure(&self, params: &ConnectionParameters) -> BridgeResult<()> {
        self.configured.lock().expect("lock").push(params.clone());
        Ok(())
    }

    async fn run_code(&self, code: &str) -> BridgeResult<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(BridgeError::ChannelFailure("connection refused".to_string()));
        }
        self.sent.lock().expect("lock").push(code.to_string());
        Ok(())
    }

    async fn stop_all(&self) -> BridgeResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Bridge {
    pub temp: TempDir,
    pub engine: Arc<FakeEngine>,
    pub log: Arc<FakeLog>,
    pub channel: Arc<RecordingChannel>,
    pub runtime: BridgeRuntime,
    pub registry: ToolRegistry,
}

impl Bridge {
    pub fn state_file(&self) -> PathBuf {
        self.temp.path().join("state").join("shared_state.json")
    }
}

pub struct BridgeBuilder {
    running: bool,
    starts_on_launch: bool,
    log: Option<String>,
    max_attempts: u32,
}

impl Default for BridgeBuilder {
    fn default() -> Self {
        Self {
            running: true,
            starts_on_launch: false,
            log: Some(ENGINE_LOG.to_string()),
            max_attempts: 3,
        }
    }
}

impl BridgeBuilder {
    pub fn engine_stopped(mut self) -> Self {
        self.running = false;
        self
    }

    pub fn starts_on_launch(mut self) -> Self {
        self.starts_on_launch = true;
        self
    }

    pub fn log(mut self, text: Option<&str>) -> Self {
        self.log = text.map(str::to_string);
        self
    }

    pub fn build(self) -> Bridge {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = BridgeConfig::default();
        config.state.path = Some(temp.path().join("state").join("shared_state.json"));
        config.log.gui_log_path = Some(temp.path().join("gui.log"));
        config.log.daemon_log_path = Some(temp.path().join("daemon.log"));
        config.readiness.poll_interval_ms = 1;
        config.readiness.max_interval_ms = 1;
        config.readiness.max_attempts = self.max_attempts;
        config.readiness.settle_ms = 0;

        let engine = Arc::new(FakeEngine {
            running: AtomicBool::new(self.running),
            starts_on_launch: self.starts_on_launch,
            ..Default::default()
        });
        let log = Arc::new(FakeLog {
            path: temp.path().join("gui.log"),
            text: Mutex::new(self.log),
        });
        let channel = Arc::new(RecordingChannel::default());
        let runtime = BridgeRuntime::from_parts(
            config,
            engine.clone(),
            log.clone(),
            channel.clone(),
            CancellationToken::new(),
        )
        .expect("runtime");
        let registry = ToolRegistry::new(runtime.clone());
        Bridge {
            temp,
            engine,
            log,
            channel,
            runtime,
            registry,
        }
    }
}

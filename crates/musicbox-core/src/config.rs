use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::fs;

use crate::paths::{
    default_daemon_log_path, default_gui_log_path, default_state_file_path,
    resolve_global_config_path,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Exact process name matched by `pgrep -x`.
    pub process_name: String,
    pub app_path: PathBuf,
    /// Full argv used to launch the engine. Defaults to `open <app_path>`.
    pub launch_command: Option<Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            process_name: "Sonic Pi".to_string(),
            app_path: PathBuf::from("/Applications/Sonic Pi.app"),
            launch_command: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub gui_log_path: Option<PathBuf>,
    pub daemon_log_path: Option<PathBuf>,
    pub strings_command: String,
    pub extract_timeout_ms: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            gui_log_path: None,
            daemon_log_path: None,
            strings_command: "strings".to_string(),
            extract_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub poll_interval_ms: u64,
    pub max_attempts: u32,
    /// Multiplier applied to the interval after each failed readiness check. 1.0 keeps it fixed.
    pub backoff_factor: f64,
    pub max_interval_ms: u64,
    /// Wait after the engine is live so its log contains the final ports and token.
    pub settle_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            max_attempts: 30,
            backoff_factor: 1.0,
            max_interval_ms: 5_000,
            settle_ms: 9_000,
        }
    }
}

impl ReadinessConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms.max(self.poll_interval_ms))
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Regexes that pull connection parameters out of the engine's GUI log.
/// Versioned because the log format changes between engine releases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternTable {
    pub version: u32,
    pub control_port: String,
    pub event_port: String,
    pub token: String,
    pub min_token_digits: usize,
}

impl Default for PatternTable {
    fn default() -> Self {
        Self {
            version: 1,
            control_port: r"Setting up OSC sender to Spider on port (\d+)".to_string(),
            event_port: r"Setting up OSC sender to Tau on port (\d+)".to_string(),
            token: r"daemon_stdout: (\d+)".to_string(),
            min_token_digits: 7,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub engine: EngineConfig,
    pub log: LogConfig,
    pub readiness: ReadinessConfig,
    pub patterns: PatternTable,
    pub state: StateConfig,
}

impl BridgeConfig {
    /// Merges, lowest first: defaults, the global config file, `explicit`,
    /// environment variables, then `cli_overrides`.
    pub async fn load(explicit: Option<&Path>, cli_overrides: Option<Value>) -> anyhow::Result<Self> {
        let mut layers = Vec::new();
        if let Some(global) = resolve_global_config_path() {
            if let Some(layer) = read_layer(&global).await {
                layers.push(layer);
            }
        }
        if let Some(path) = explicit {
            match read_layer(path).await {
                Some(layer) => layers.push(layer),
                None => anyhow::bail!("config file {} could not be loaded", path.display()),
            }
        }
        layers.push(env_layer());
        if let Some(cli) = cli_overrides {
            layers.push(cli);
        }
        Self::from_layers(&layers)
    }

    pub fn from_layers(layers: &[Value]) -> anyhow::Result<Self> {
        let mut merged = serde_json::to_value(Self::default())?;
        for layer in layers {
            deep_merge(&mut merged, layer);
        }
        Ok(serde_json::from_value(merged)?)
    }

    pub fn state_file(&self) -> PathBuf {
        self.state
            .path
            .clone()
            .unwrap_or_else(default_state_file_path)
    }

    pub fn gui_log_path(&self) -> PathBuf {
        self.log
            .gui_log_path
            .clone()
            .unwrap_or_else(default_gui_log_path)
    }

    pub fn daemon_log_path(&self) -> PathBuf {
        self.log
            .daemon_log_path
            .clone()
            .unwrap_or_else(default_daemon_log_path)
    }

    pub fn launch_command(&self) -> Vec<String> {
        match &self.engine.launch_command {
            Some(argv) if !argv.is_empty() => argv.clone(),
            _ => vec![
                "open".to_string(),
                self.engine.app_path.to_string_lossy().to_string(),
            ],
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

async fn read_layer(path: &Path) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let raw = match fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!("skipping config layer {}: {}", path.display(), err);
            return None;
        }
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(value) if value.is_object() => Some(value),
        Ok(_) => {
            tracing::warn!("skipping config layer {}: not a JSON object", path.display());
            None
        }
        Err(err) => {
            tracing::warn!("skipping config layer {}: {}", path.display(), err);
            None
        }
    }
}

fn env_layer() -> Value {
    let mut root = empty_object();

    if let Some(path) = env_non_empty("MUSICBOX_STATE_FILE") {
        deep_merge(&mut root, &json!({ "state": { "path": path } }));
    }
    if let Some(path) = env_non_empty("MUSICBOX_GUI_LOG") {
        deep_merge(&mut root, &json!({ "log": { "gui_log_path": path } }));
    }
    if let Some(path) = env_non_empty("MUSICBOX_APP_PATH") {
        deep_merge(&mut root, &json!({ "engine": { "app_path": path } }));
    }
    if let Some(name) = env_non_empty("MUSICBOX_PROCESS_NAME") {
        deep_merge(&mut root, &json!({ "engine": { "process_name": name } }));
    }
    if let Some(ms) = env_non_empty("MUSICBOX_SETTLE_MS").and_then(|v| v.parse::<u64>().ok()) {
        deep_merge(&mut root, &json!({ "readiness": { "settle_ms": ms } }));
    }
    if let Some(attempts) =
        env_non_empty("MUSICBOX_POLL_ATTEMPTS").and_then(|v| v.parse::<u32>().ok())
    {
        deep_merge(&mut root, &json!({ "readiness": { "max_attempts": attempts } }));
    }

    root
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn deep_merge(base: &mut Value, overlay: &Value) {
    if overlay.is_null() {
        return;
    }
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                if value.is_null() {
                    continue;
                }
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let cfg = BridgeConfig::default();
        assert_eq!(cfg.readiness.poll_interval(), Duration::from_secs(1));
        assert_eq!(cfg.readiness.max_attempts, 30);
        assert_eq!(cfg.readiness.settle(), Duration::from_secs(9));
        assert_eq!(cfg.patterns.min_token_digits, 7);
        assert_eq!(
            cfg.launch_command(),
            vec!["open".to_string(), "/Applications/Sonic Pi.app".to_string()]
        );
    }

    #[test]
    fn later_layers_override_earlier_ones_key_by_key() {
        let cfg = BridgeConfig::from_layers(&[
            json!({"readiness": {"settle_ms": 100, "max_attempts": 5}}),
            json!({"readiness": {"max_attempts": 2}, "state": {"path": "/tmp/mix.json"}}),
        ])
        .expect("config");
        assert_eq!(cfg.readiness.settle_ms, 100);
        assert_eq!(cfg.readiness.max_attempts, 2);
        assert_eq!(cfg.readiness.poll_interval_ms, 1_000);
        assert_eq!(cfg.state_file(), PathBuf::from("/tmp/mix.json"));
    }

    #[test]
    fn pattern_table_can_be_replaced_for_newer_engine_logs() {
        let cfg = BridgeConfig::from_layers(&[json!({
            "patterns": {"version": 2, "token": r"token=(\d+)"}
        })])
        .expect("config");
        assert_eq!(cfg.patterns.version, 2);
        assert_eq!(cfg.patterns.token, r"token=(\d+)");
        assert_eq!(cfg.patterns, PatternTable {
            version: 2,
            token: r"token=(\d+)".to_string(),
            ..PatternTable::default()
        });
    }

    #[test]
    fn explicit_launch_command_wins_over_open() {
        let cfg = BridgeConfig::from_layers(&[json!({
            "engine": {"launch_command": ["sonic-pi", "--headless"]}
        })])
        .expect("config");
        assert_eq!(cfg.launch_command(), vec!["sonic-pi", "--headless"]);
    }

    #[tokio::test]
    async fn explicit_config_file_is_loaded() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("bridge.json");
        std::fs::write(&path, r#"{"engine": {"process_name": "sonic-pi-server"}}"#)
            .expect("write");
        let cfg = BridgeConfig::load(Some(&path), Some(json!({"readiness": {"settle_ms": 1}})))
            .await
            .expect("load");
        assert_eq!(cfg.engine.process_name, "sonic-pi-server");
        assert_eq!(cfg.readiness.settle_ms, 1);
    }

    #[tokio::test]
    async fn missing_explicit_config_file_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let missing = temp.path().join("nope.json");
        assert!(BridgeConfig::load(Some(&missing), None).await.is_err());
    }
}

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedPaths {
    pub canonical_root: PathBuf,
    pub logs_dir: PathBuf,
    pub state_file: PathBuf,
}

pub fn resolve_shared_paths() -> anyhow::Result<SharedPaths> {
    let base = dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Failed to resolve data dir"))?;
    let canonical_root = base.join("musicbox");

    Ok(SharedPaths {
        canonical_root: canonical_root.clone(),
        logs_dir: canonical_root.join("logs"),
        state_file: canonical_root.join("shared_state.json"),
    })
}

/// Where the engine writes its per-user logs (`~/.sonic-pi/log`).
pub fn engine_log_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".sonic-pi").join("log"))
        .unwrap_or_else(|| PathBuf::from(".sonic-pi").join("log"))
}

pub fn default_gui_log_path() -> PathBuf {
    engine_log_dir().join("gui.log")
}

pub fn default_daemon_log_path() -> PathBuf {
    engine_log_dir().join("daemon.log")
}

pub fn default_state_file_path() -> PathBuf {
    if let Ok(paths) = resolve_shared_paths() {
        return paths.state_file;
    }
    dirs::home_dir()
        .map(|home| home.join(".musicbox").join("shared_state.json"))
        .unwrap_or_else(|| PathBuf::from("shared_state.json"))
}

pub fn resolve_global_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("MUSICBOX_GLOBAL_CONFIG") {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    dirs::config_dir().map(|dir| dir.join("musicbox").join("config.json"))
}

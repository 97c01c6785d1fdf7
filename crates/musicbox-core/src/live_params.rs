use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use musicbox_types::LiveParameterMap;
use tokio::fs;
use uuid::Uuid;

use crate::error::StoreError;

/// The persisted "current mix": a flat JSON object rewritten wholesale on
/// every update.
///
/// There is no lock around the read-merge-write cycle. Two overlapping
/// updates can each read the same snapshot and the last one to rename its
/// file wins, dropping the other caller's delta.
#[derive(Debug, Clone)]
pub struct LiveParameterStore {
    path: PathBuf,
}

impl LiveParameterStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    pub async fn read(&self) -> Result<LiveParameterMap, StoreError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::Uninitialized {
                    path: self.path.clone(),
                })
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        serde_json::from_str::<LiveParameterMap>(&raw).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    /// Loads the current map (empty when uninitialized), merges `delta` into it
    /// and persists the full result. Returns the merged map.
    pub async fn apply(&self, delta: &LiveParameterMap) -> Result<LiveParameterMap, StoreError> {
        let mut current = match self.read().await {
            Ok(map) => map,
            Err(StoreError::Uninitialized { .. }) => LiveParameterMap::new(),
            Err(err) => return Err(err),
        };
        merge_delta(&mut current, delta);
        self.write(&current).await?;
        tracing::debug!(
            path = %self.path.display(),
            keys = delta.len(),
            total = current.len(),
            "live parameter file rewritten"
        );
        Ok(current)
    }

    async fn write(&self, map: &LiveParameterMap) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(io_err)?;
            }
        }
        let payload = serde_json::to_string_pretty(map).map_err(|source| StoreError::Parse {
            path: self.path.clone(),
            source,
        })?;
        // Write beside the target and rename over it so readers never see a torn file.
        let tmp = self.temp_path();
        if let Err(source) = fs::write(&tmp, format!("{payload}\n")).await {
            return Err(io_err(source));
        }
        if let Err(source) = fs::rename(&tmp, &self.path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(io_err(source));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "shared_state.json".to_string());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
    }
}

/// Last write wins per key; keys absent from `delta` are kept.
pub fn merge_delta(current: &mut LiveParameterMap, delta: &LiveParameterMap) {
    for (key, value) in delta {
        current.insert(key.clone(), value.clone());
    }
}

/// One `set :<key>, <value>` line per delta key, in delta order.
pub fn render_set_commands(delta: &LiveParameterMap) -> String {
    delta
        .iter()
        .map(|(key, value)| format!("set :{key}, {}", value.engine_literal()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use musicbox_types::ParamValue;
    use serde_json::json;

    fn delta(value: serde_json::Value) -> LiveParameterMap {
        serde_json::from_value(value).expect("delta")
    }

    #[tokio::test]
    async fn read_before_any_write_is_uninitialized() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = LiveParameterStore::new(temp.path().join("shared_state.json"));
        let err = store.read().await.expect_err("no file yet");
        assert!(err.is_uninitialized());
        assert!(!store.exists().await);
    }

    #[tokio::test]
    async fn first_apply_creates_file_with_exactly_the_delta() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("shared_state.json");
        let store = LiveParameterStore::new(&path);

        store
            .apply(&delta(json!({"reverb_mix": 0.8})))
            .await
            .expect("apply");

        let raw = std::fs::read_to_string(&path).expect("file written");
        let persisted: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(persisted, json!({"reverb_mix": 0.8}));
        assert!(raw.contains("\n  \"reverb_mix\""), "pretty printed: {raw}");
    }

    #[tokio::test]
    async fn disjoint_updates_accumulate_and_overlaps_take_the_latest() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = LiveParameterStore::new(temp.path().join("shared_state.json"));

        store
            .apply(&delta(json!({"reverb_mix": 0.8, "lpf_on": true})))
            .await
            .expect("first");
        let merged = store
            .apply(&delta(json!({"hpf_cutoff": 50, "lpf_on": false})))
            .await
            .expect("second");

        assert_eq!(merged.len(), 3);
        assert_eq!(merged.get("lpf_on"), Some(&ParamValue::Bool(false)));
        let reread = store.read().await.expect("read");
        assert_eq!(reread, merged);
    }

    #[tokio::test]
    async fn corrupt_file_is_a_parse_failure_not_uninitialized() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("shared_state.json");
        std::fs::write(&path, "{not json").expect("write");
        let store = LiveParameterStore::new(&path);

        let err = store.read().await.expect_err("corrupt");
        assert!(matches!(err, StoreError::Parse { .. }));
        assert!(store.apply(&delta(json!({"a": 1}))).await.is_err());
        assert_eq!(std::fs::read_to_string(&path).expect("untouched"), "{not json");
    }

    #[tokio::test]
    async fn no_temp_files_are_left_behind() {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = LiveParameterStore::new(temp.path().join("shared_state.json"));
        store.apply(&delta(json!({"a": 1}))).await.expect("apply");
        let entries = std::fs::read_dir(temp.path())
            .expect("dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        assert_eq!(entries, vec!["shared_state.json".to_string()]);
    }

    #[test]
    fn render_translates_booleans_and_keeps_delta_order() {
        let rendered = render_set_commands(&delta(json!({"reverb_on": true})));
        assert_eq!(rendered, "set :reverb_on, 1");

        let mut ordered = LiveParameterMap::new();
        ordered.insert("delay_on".to_string(), ParamValue::Bool(false));
        ordered.insert("delay_mix".to_string(), ParamValue::from_json(&json!(0.25)).unwrap());
        assert_eq!(
            render_set_commands(&ordered),
            "set :delay_on, 0\nset :delay_mix, 0.25"
        );
    }
}

use musicbox_core::{render_set_commands, BridgeError, BridgeResult, LiveParameterStore, StoreError};
use musicbox_observability::{emit_event, ObservabilityEvent, ProcessKind};
use musicbox_types::LiveParameterMap;

use crate::session::Session;

/// Result of reading the persisted mix.
#[derive(Debug, Clone, PartialEq)]
pub enum MixSnapshot {
    Uninitialized,
    Present(LiveParameterMap),
}

#[derive(Debug, Clone)]
pub struct UpdateSummary {
    pub applied: Vec<String>,
    pub total_keys: usize,
    pub commands: String,
}

impl UpdateSummary {
    pub fn render(&self) -> String {
        format!(
            "Mix updated: {} ({} parameter{} now stored).",
            self.applied.join(", "),
            self.total_keys,
            if self.total_keys == 1 { "" } else { "s" }
        )
    }
}

/// Keeps the persisted mix and the engine's `set` state in step.
#[derive(Clone)]
pub struct LiveMixSynchronizer {
    session: Session,
    store: LiveParameterStore,
}

impl LiveMixSynchronizer {
    pub fn new(session: Session, store: LiveParameterStore) -> Self {
        Self { session, store }
    }

    pub fn store(&self) -> &LiveParameterStore {
        &self.store
    }

    pub async fn read(&self) -> BridgeResult<MixSnapshot> {
        match self.store.read().await {
            Ok(map) => Ok(MixSnapshot::Present(map)),
            Err(StoreError::Uninitialized { .. }) => Ok(MixSnapshot::Uninitialized),
            Err(err) => Err(err.into()),
        }
    }

    /// Persists the merged map, then pushes only `delta` to the engine.
    pub async fn update(&self, delta: &LiveParameterMap) -> BridgeResult<UpdateSummary> {
        if delta.is_empty() {
            return Err(BridgeError::InvalidInput(
                "parameters must contain at least one key".to_string(),
            ));
        }
        self.session.ensure_connected().await?;

        let merged = self.store.apply(delta).await.map_err(|err| {
            tracing::warn!(error = %err, "mix not persisted, nothing was sent");
            BridgeError::from(err)
        })?;

        let commands = render_set_commands(delta);
        if let Err(err) = self.session.submit(&commands).await {
            let detail = format!(
                "{} was updated but the engine was not ({err}); re-send the same parameters after reconnecting",
                self.store.path().display()
            );
            emit_event(
                tracing::Level::WARN,
                ProcessKind::Bridge,
                ObservabilityEvent {
                    event: "mix.diverged",
                    component: "runtime.sync",
                    status: Some("failed"),
                    error_code: Some("channel_failure"),
                    detail: Some(&detail),
                    ..Default::default()
                },
            );
            return Err(BridgeError::ChannelFailure(detail));
        }

        tracing::info!(keys = delta.len(), total = merged.len(), "mix delta pushed");
        Ok(UpdateSummary {
            applied: delta.keys().cloned().collect(),
            total_keys: merged.len(),
            commands,
        })
    }
}

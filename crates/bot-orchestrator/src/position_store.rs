use std::sync::Arc;
use trailstop_core::{CheckpointStore, PositionState};

/// Loads and checkpoints the position for one instrument.
///
/// Neither operation fails: a missing or unreadable checkpoint starts flat,
/// and a failed save is logged while the in-memory state stays authoritative.
#[derive(Clone)]
pub struct PositionStore {
    store: Arc<dyn CheckpointStore>,
    key: String,
    instrument: String,
}

impl std::fmt::Debug for PositionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PositionStore")
            .field("key", &self.key)
            .field("instrument", &self.instrument)
            .finish_non_exhaustive()
    }
}

impl PositionStore {
    #[must_use]
    pub fn new(
        store: Arc<dyn CheckpointStore>,
        key: impl Into<String>,
        instrument: impl Into<String>,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            instrument: instrument.into(),
        }
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn load(&self) -> PositionState {
        let raw = match self.store.get(&self.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                tracing::info!(key = %self.key, "no checkpoint found, starting flat");
                return PositionState::flat(&self.instrument);
            }
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "checkpoint unreadable, starting flat");
                return PositionState::flat(&self.instrument);
            }
        };

        let state = match serde_json::from_str::<PositionState>(&raw) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "checkpoint corrupt, starting flat");
                return PositionState::flat(&self.instrument);
            }
        };

        if state.instrument() != self.instrument {
            tracing::warn!(
                key = %self.key,
                found = state.instrument(),
                expected = %self.instrument,
                "checkpoint belongs to another instrument, starting flat"
            );
            return PositionState::flat(&self.instrument);
        }
        if let Err(e) = state.check_invariants() {
            tracing::error!(key = %self.key, error = %e, "checkpoint violates invariants, starting flat");
            return PositionState::flat(&self.instrument);
        }

        tracing::info!(
            key = %self.key,
            side = %state.side(),
            quantity = %state.quantity(),
            stop = ?state.current_stop(),
            "restored position checkpoint"
        );
        state
    }

    /// Returns whether the checkpoint was written.
    pub async fn save(&self, state: &PositionState) -> bool {
        let raw = match serde_json::to_string(state) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "failed to serialize checkpoint");
                return false;
            }
        };
        match self.store.set(&self.key, &raw).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %self.key, error = %e, "checkpoint failed, keeping in-memory state");
                false
            }
        }
    }
}

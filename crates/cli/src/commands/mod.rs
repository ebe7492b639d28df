mod inspect;
mod run;

pub use inspect::inspect;
pub use run::run;

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use trailstop_bot_orchestrator::{JsonFileStore, MemoryStore, SqliteStore};
use trailstop_core::{AppConfig, CheckpointBackend, CheckpointStore, ConfigLoader};

fn load_config(path: &Path, profile: Option<&str>) -> anyhow::Result<AppConfig> {
    let config = ConfigLoader::load_from(path, profile)?;
    tracing::info!(
        config = %path.display(),
        profile = profile.unwrap_or("default"),
        instrument = %config.instrument.symbol,
        mode = ?config.broker.execution_mode,
        "configuration loaded"
    );
    Ok(config)
}

/// Opens the configured checkpoint backend.
async fn open_checkpoint_store(config: &AppConfig) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    let path = config.checkpoint.resolved_path();
    let store: Arc<dyn CheckpointStore> = match config.checkpoint.backend {
        CheckpointBackend::File => {
            std::fs::create_dir_all(&path)
                .with_context(|| format!("creating checkpoint directory {}", path.display()))?;
            Arc::new(JsonFileStore::new(path))
        }
        CheckpointBackend::Sqlite => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating database directory {}", parent.display()))?;
            }
            Arc::new(
                SqliteStore::connect(&path)
                    .await
                    .with_context(|| format!("opening checkpoint database {}", path.display()))?,
            )
        }
        CheckpointBackend::Memory => {
            tracing::warn!("in-memory checkpoints do not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_backend_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.checkpoint.backend = CheckpointBackend::File;
        config.checkpoint.path = dir.path().join("nested/checkpoints");

        let store = open_checkpoint_store(&config).await.unwrap();
        store.set("NIFTY", "{}").await.unwrap();

        assert!(dir.path().join("nested/checkpoints/NIFTY.json").exists());
    }

    #[tokio::test]
    async fn test_sqlite_backend_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.checkpoint.backend = CheckpointBackend::Sqlite;
        config.checkpoint.path = dir.path().join("db/trailstop.db");

        let store = open_checkpoint_store(&config).await.unwrap();
        store.set("NIFTY", r#"{"side":"NONE"}"#).await.unwrap();

        assert_eq!(
            store.get("NIFTY").await.unwrap().as_deref(),
            Some(r#"{"side":"NONE"}"#)
        );
    }

    #[tokio::test]
    async fn test_memory_backend_starts_empty() {
        let mut config = AppConfig::default();
        config.checkpoint.backend = CheckpointBackend::Memory;

        let store = open_checkpoint_store(&config).await.unwrap();
        assert!(store.get("NIFTY").await.unwrap().is_none());
    }
}

//! Keyed process state with an optional JSON snapshot to disk.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use cantina_service::{LifecycleError, Service, ServiceContext};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::MemoryError;

/// L2 memory store (spec §4 table, §9 shared-resources note: "single-writer
/// per key; writes that must be atomic across a key group go through a
/// named transaction helper that serializes by key"). Backed by a single
/// mutex, so any transaction closure already runs atomically with respect
/// to every other read/write.
pub struct MemoryStore {
    state: Mutex<HashMap<String, Value>>,
    snapshot_path: Option<PathBuf>,
}

impl MemoryStore {
    /// A store with no disk persistence.
    pub fn in_memory() -> Self {
        Self { state: Mutex::new(HashMap::new()), snapshot_path: None }
    }

    /// A store that loads `path` at startup and snapshots to it at
    /// shutdown. Load failure is non-fatal (spec §6: "results in an empty
    /// store").
    pub fn with_snapshot(path: impl Into<PathBuf>) -> Self {
        Self { state: Mutex::new(HashMap::new()), snapshot_path: Some(path.into()) }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.state.lock().await.get(key).cloned()
    }

    pub async fn set(&self, key: impl Into<String>, value: Value) {
        self.state.lock().await.insert(key.into(), value);
    }

    /// Run `body` with exclusive access to the whole key space, so writes
    /// spanning several keys are atomic with respect to other callers.
    pub async fn transaction<F, R>(&self, _name: &str, body: F) -> R
    where
        F: FnOnce(&mut HashMap<String, Value>) -> R,
    {
        let mut guard = self.state.lock().await;
        body(&mut guard)
    }

    async fn load(&self) {
        let Some(path) = &self.snapshot_path else { return };
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => match serde_json::from_str::<HashMap<String, Value>>(&contents) {
                Ok(loaded) => {
                    *self.state.lock().await = loaded;
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "snapshot is not valid JSON, starting empty");
                }
            },
            Err(err) => {
                tracing::info!(path = %path.display(), error = %err, "no snapshot to load, starting empty");
            }
        }
    }

    async fn save(&self) -> Result<(), MemoryError> {
        let Some(path) = &self.snapshot_path else { return Ok(()) };
        let snapshot = self.state.lock().await.clone();
        let json = serde_json::to_string_pretty(&snapshot)?;
        tokio::fs::write(path, json)
            .await
            .map_err(|source| MemoryError::Write { path: path.display().to_string(), source })
    }
}

#[async_trait]
impl Service for MemoryStore {
    fn name(&self) -> &'static str {
        "memory_store"
    }

    async fn on_start(&self, _ctx: &ServiceContext) -> Result<(), LifecycleError> {
        self.load().await;
        Ok(())
    }

    async fn on_stop(&self, _ctx: &ServiceContext) -> Result<(), LifecycleError> {
        if let Err(err) = self.save().await {
            tracing::warn!(error = %err, "failed to snapshot memory store at shutdown");
        }
        Ok(())
    }
}

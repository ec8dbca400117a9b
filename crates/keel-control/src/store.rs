//! Stage record persistence

use crate::error::ControlResult;
use crate::record::StageRecord;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

/// Durable storage of the stage record
#[async_trait]
pub trait StageStore: Send + Sync {
    /// Load the record, `None` if nothing was stored yet.
    async fn load(&self) -> ControlResult<Option<StageRecord>>;

    /// Replace the stored record.
    async fn save(&self, record: &StageRecord) -> ControlResult<()>;

    /// Get the store name
    fn name(&self) -> &str;
}

/// In-memory stage store for testing
#[derive(Default)]
pub struct InMemoryStageStore {
    record: RwLock<Option<StageRecord>>,
}

impl InMemoryStageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StageStore for InMemoryStageStore {
    async fn load(&self) -> ControlResult<Option<StageRecord>> {
        Ok(self.record.read().await.clone())
    }

    async fn save(&self, record: &StageRecord) -> ControlResult<()> {
        *self.record.write().await = Some(record.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Pretty-printed JSON file on the operator machine
///
/// Writes go to a sibling temporary file that is renamed over the record,
/// so a reader never sees a partial document.
pub struct JsonFileStageStore {
    path: PathBuf,
}

impl JsonFileStageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StageStore for JsonFileStageStore {
    async fn load(&self) -> ControlResult<Option<StageRecord>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, record: &StageRecord) -> ControlResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let json = serde_json::to_vec_pretty(record)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), stage = %record.stage, "Stage record saved");
        Ok(())
    }

    fn name(&self) -> &str {
        "json-file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use keel_types::{PromotionStage, StageTransition, TransitionTrigger};

    #[tokio::test]
    async fn test_json_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStageStore::new(dir.path().join("state").join("stage.json"));
        assert!(store.load().await.unwrap().is_none());

        let now = Utc::now();
        let mut record = StageRecord::new(now);
        record.apply(StageTransition {
            from: PromotionStage::Simulation,
            to: PromotionStage::Live,
            trigger: TransitionTrigger::Promote,
            actor: "ops".into(),
            reason: None,
            at: now,
        });
        store.save(&record).await.unwrap();

        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert!(!dir.path().join("state").join("stage.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stage.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = JsonFileStageStore::new(&path).load().await.unwrap_err();
        assert!(err.to_string().starts_with("stage store error"));
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use super::{CacheKey, DeploymentStore, StoreError, Versioned, WriteMode, next_version};
use crate::addresses::DeploymentRecord;

/// Process-local store. Nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<CacheKey, Versioned>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DeploymentStore for MemoryStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<Versioned>, StoreError> {
        let data = self.data.read().await;
        Ok(data.get(key).cloned())
    }

    async fn save(
        &self,
        key: &CacheKey,
        record: &DeploymentRecord,
        mode: WriteMode,
    ) -> Result<u64, StoreError> {
        let mut data = self.data.write().await;
        let version = next_version(key, data.get(key).map(|v| v.version), mode)?;
        data.insert(
            *key,
            Versioned {
                version,
                record: record.clone(),
            },
        );
        Ok(version)
    }
}

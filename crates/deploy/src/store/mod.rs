//! Completed infrastructure deployments, keyed by (operator, chain).
//!
//! [`DeploymentCache`] is the entry point. It sits on top of a [`DeploymentStore`] backend:
//! [`MemoryStore`] for a single process, [`FileStore`] for records that survive restarts.
//!
//! Writes through [`DeploymentCache::put`] are last-write-wins. Every stored record carries a
//! version, and [`DeploymentCache::supersede`] only replaces a record whose version has not
//! moved since the caller read it.

mod file;
mod memory;

use std::future::Future;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};

pub use file::{CheckpointFile, FileStore};
pub use memory::MemoryStore;

use crate::addresses::DeploymentRecord;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Record {key} was superseded: expected version {expected}, found {found}")]
    Conflict {
        key: CacheKey,
        expected: u64,
        found: u64,
    },
}

/// Identity of a cached deployment.
///
/// The operator is held as parsed bytes, so `0xABC…` and `0xabc…` name the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
#[display("{}-{chain_id}", hex_address(operator))]
pub struct CacheKey {
    pub operator: Address,
    pub chain_id: u64,
}

fn hex_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

impl CacheKey {
    pub fn new(operator: Address, chain_id: u64) -> Self {
        Self { operator, chain_id }
    }
}

/// A stored record and its write version. Versions start at 1; an absent record is version 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned {
    pub version: u64,
    pub record: DeploymentRecord,
}

/// Condition a write must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace whatever is stored.
    Overwrite,
    /// Replace only if the stored version still equals this one.
    Expect(u64),
}

/// Backend persisting deployment records.
pub trait DeploymentStore: Send + Sync {
    /// The stored record, or `None` if the key was never written.
    fn load(
        &self,
        key: &CacheKey,
    ) -> impl Future<Output = Result<Option<Versioned>, StoreError>> + Send;

    /// Store `record`, returning its new version.
    fn save(
        &self,
        key: &CacheKey,
        record: &DeploymentRecord,
        mode: WriteMode,
    ) -> impl Future<Output = Result<u64, StoreError>> + Send;
}

/// Next version for a write, or a conflict if the precondition fails.
fn next_version(key: &CacheKey, current: Option<u64>, mode: WriteMode) -> Result<u64, StoreError> {
    let found = current.unwrap_or(0);
    match mode {
        WriteMode::Expect(expected) if expected != found => Err(StoreError::Conflict {
            key: *key,
            expected,
            found,
        }),
        _ => Ok(found + 1),
    }
}

/// Deployment lookups and writes by (operator, chain).
#[derive(Debug, Clone, Default)]
pub struct DeploymentCache<S> {
    store: S,
}

impl<S: DeploymentStore> DeploymentCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Store `record` for (operator, chain), fully replacing any earlier record.
    pub async fn put(
        &self,
        operator: Address,
        chain_id: u64,
        record: &DeploymentRecord,
    ) -> Result<u64, StoreError> {
        let key = CacheKey::new(operator, chain_id);
        let version = self.store.save(&key, record, WriteMode::Overwrite).await?;
        tracing::info!(key = %key, version, "Deployment record stored");
        Ok(version)
    }

    pub async fn get(
        &self,
        operator: Address,
        chain_id: u64,
    ) -> Result<Option<DeploymentRecord>, StoreError> {
        Ok(self
            .get_versioned(operator, chain_id)
            .await?
            .map(|versioned| versioned.record))
    }

    pub async fn get_versioned(
        &self,
        operator: Address,
        chain_id: u64,
    ) -> Result<Option<Versioned>, StoreError> {
        let key = CacheKey::new(operator, chain_id);
        let found = self.store.load(&key).await?;
        if found.is_none() {
            tracing::debug!(key = %key, "No deployment record");
        }
        Ok(found)
    }

    /// Replace the record only if it is still at `expected` (0 when nothing was stored).
    pub async fn supersede(
        &self,
        operator: Address,
        chain_id: u64,
        expected: u64,
        record: &DeploymentRecord,
    ) -> Result<u64, StoreError> {
        let key = CacheKey::new(operator, chain_id);
        let version = self
            .store
            .save(&key, record, WriteMode::Expect(expected))
            .await?;
        tracing::info!(key = %key, version, "Deployment record superseded");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::addresses::sample_set;

    fn record_for(operator: Address, chain_id: u64) -> DeploymentRecord {
        DeploymentRecord::new(sample_set(), operator, chain_id)
    }

    #[test]
    fn test_key_is_lowercase() {
        let operator: Address = "0xABCDEFabcdef0123456789ABCDEFabcdef012345".parse().unwrap();
        let key = CacheKey::new(operator, 31337);
        assert_eq!(
            key.to_string(),
            "0xabcdefabcdef0123456789abcdefabcdef012345-31337"
        );
    }

    #[tokio::test]
    async fn test_lookup_ignores_operator_casing() {
        let cache = DeploymentCache::new(MemoryStore::new());
        let upper: Address = "0xABCDEFABCDEF0123456789ABCDEFABCDEF012345".parse().unwrap();
        let lower: Address = "0xabcdefabcdef0123456789abcdefabcdef012345".parse().unwrap();

        let record = record_for(upper, 1);
        cache.put(upper, 1, &record).await.unwrap();

        assert_eq!(cache.get(lower, 1).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_absent_record_is_none() {
        let cache = DeploymentCache::new(MemoryStore::new());
        let found = cache.get(Address::repeat_byte(1), 1).await.unwrap();
        assert!(found.is_none(), "unknown key should be absent, not an error");
    }

    #[tokio::test]
    async fn test_chain_is_part_of_the_key() {
        let cache = DeploymentCache::new(MemoryStore::new());
        let operator = Address::repeat_byte(0xaa);
        cache.put(operator, 1, &record_for(operator, 1)).await.unwrap();

        assert!(cache.get(operator, 137).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_put_replaces_first() {
        let cache = DeploymentCache::new(MemoryStore::new());
        let operator = Address::repeat_byte(0xaa);

        let first = record_for(operator, 1);
        let mut second = record_for(operator, 1);
        second.addresses.trex_gateway = Address::repeat_byte(0x42);
        second.addresses.implementations.token_implementation = Address::repeat_byte(0x43);

        assert_eq!(cache.put(operator, 1, &first).await.unwrap(), 1);
        assert_eq!(cache.put(operator, 1, &second).await.unwrap(), 2);

        assert_eq!(cache.get(operator, 1).await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_supersede_detects_concurrent_write() {
        let cache = DeploymentCache::new(MemoryStore::new());
        let operator = Address::repeat_byte(0xaa);
        let record = record_for(operator, 1);

        let read = cache.get_versioned(operator, 1).await.unwrap();
        assert!(read.is_none());

        // Another flow writes between our read and our write.
        cache.put(operator, 1, &record).await.unwrap();

        let err = cache.supersede(operator, 1, 0, &record).await.unwrap_err();
        assert!(
            matches!(err, StoreError::Conflict { expected: 0, found: 1, .. }),
            "unexpected error: {err}"
        );

        assert_eq!(cache.supersede(operator, 1, 1, &record).await.unwrap(), 2);
    }
}

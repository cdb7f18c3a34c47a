//! One JSON file per key, written under an exclusive `fs2` lock.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use anyhow::Context;
use fs2::FileExt;

use super::{CacheKey, DeploymentStore, StoreError, Versioned, WriteMode, next_version};
use crate::addresses::DeploymentRecord;
use crate::infra::{Checkpoint, CheckpointSink};

/// Durable store rooted at a directory.
///
/// Layout: `<dir>/<operator>-<chain>.json` holds `{version, record}`; a sibling `.lock` file
/// serializes writers across processes.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<local data dir>/trexup`, or `./.trexup` when the platform has none.
    pub fn default_dir() -> PathBuf {
        dirs::data_local_dir()
            .map(|dir| dir.join("trexup"))
            .unwrap_or_else(|| PathBuf::from(".trexup"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn lock_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{key}.lock"))
    }

    /// Checkpoint file for an in-flight infrastructure run of `key`.
    pub fn checkpoint_file(&self, key: &CacheKey) -> CheckpointFile {
        CheckpointFile::new(self.dir.join(format!("{key}.checkpoint.json")))
    }
}

fn read_versioned(path: &Path) -> Result<Option<Versioned>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Write through a temporary file so readers never observe a torn record.
fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, path)
}

fn open_lock(path: &Path) -> io::Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)?;
    file.lock_exclusive()?;
    Ok(file)
}

async fn blocking<T, F>(f: F) -> Result<T, StoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| StoreError::Io(io::Error::other(err)))?
}

impl DeploymentStore for FileStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<Versioned>, StoreError> {
        let path = self.record_path(key);
        blocking(move || read_versioned(&path)).await
    }

    async fn save(
        &self,
        key: &CacheKey,
        record: &DeploymentRecord,
        mode: WriteMode,
    ) -> Result<u64, StoreError> {
        let dir = self.dir.clone();
        let path = self.record_path(key);
        let lock_path = self.lock_path(key);
        let key = *key;
        let record = record.clone();

        blocking(move || {
            fs::create_dir_all(&dir)?;
            let lock = open_lock(&lock_path)?;

            let current = read_versioned(&path)?.map(|v| v.version);
            let version = next_version(&key, current, mode)?;
            let contents = serde_json::to_vec_pretty(&Versioned { version, record })?;
            write_atomic(&path, &contents)?;

            lock.unlock()?;
            tracing::debug!(path = %path.display(), version, "Record written");
            Ok(version)
        })
        .await
    }
}

/// Checkpoint of an infrastructure run persisted as JSON.
#[derive(Debug, Clone)]
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> anyhow::Result<Option<Checkpoint>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err)
                    .context(format!("Failed to read checkpoint {}", self.path.display()));
            }
        };

        let checkpoint = serde_json::from_str(&content)
            .context(format!("Failed to parse checkpoint {}", self.path.display()))?;
        Ok(Some(checkpoint))
    }

    /// Remove the checkpoint once its run has completed.
    pub fn clear(&self) -> anyhow::Result<()> {
        match fs::remove_file(&self.path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(err)
                .context(format!("Failed to remove checkpoint {}", self.path.display())),
            _ => Ok(()),
        }
    }
}

impl CheckpointSink for CheckpointFile {
    fn record(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create {}", parent.display()))?;
        }
        let contents =
            serde_json::to_vec_pretty(checkpoint).context("Failed to serialize checkpoint")?;
        write_atomic(&self.path, &contents)
            .context(format!("Failed to write checkpoint {}", self.path.display()))?;
        tracing::trace!(path = %self.path.display(), steps = checkpoint.completed.len(), "Checkpoint saved");
        Ok(())
    }
}

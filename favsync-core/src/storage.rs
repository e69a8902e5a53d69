use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::FavoritesError;

/// Key-value slot holding the last known favorites as a JSON array of ids.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet.
    async fn load(&self) -> Result<Option<Vec<String>>, FavoritesError>;
    async fn save(&self, ids: &[String]) -> Result<(), FavoritesError>;
}

/// Snapshot kept in `<dir>/<key>.json`, written through a `.json.tmp` sibling.
///
/// Saves on one store (and its clones) are serialized: the tmp file is shared,
/// so two writers interleaving would rename each other's file away.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl FileSnapshotStore {
    pub fn new(dir: impl AsRef<Path>, key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{key}.json")),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn load(&self) -> Result<Option<Vec<String>>, FavoritesError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no snapshot on disk yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice::<Vec<String>>(&bytes) {
            Ok(ids) => Ok(Some(ids)),
            Err(e) => {
                warn!(error = %e, path = %self.path.display(), "failed to parse snapshot, trying tmp fallback");
                let tmp = self.tmp_path();
                match tokio::fs::read(&tmp).await {
                    Ok(tmp_bytes) => Ok(Some(serde_json::from_slice::<Vec<String>>(&tmp_bytes)?)),
                    Err(_) => Err(e.into()),
                }
            }
        }
    }

    async fn save(&self, ids: &[String]) -> Result<(), FavoritesError> {
        let bytes = serde_json::to_vec(ids)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.tmp_path();
        let _write = self.write_lock.lock().await;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), count = ids.len(), "snapshot persisted");
        Ok(())
    }
}

/// Process-local store. Clones share the same slot, which lets a test hand one
/// "browser storage" to several managers.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    slot: Arc<Mutex<Option<String>>>,
}

impl MemorySnapshotStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        Self::with_raw(serde_json::to_string(&ids).unwrap_or_else(|_| "[]".to_string()))
    }

    /// Seeds the slot with arbitrary text, e.g. a corrupted entry.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(raw.into()))),
        }
    }

    pub fn raw(&self) -> Option<String> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Decoded contents, `None` when empty or unparseable.
    pub fn ids(&self) -> Option<Vec<String>> {
        self.raw().and_then(|raw| serde_json::from_str(&raw).ok())
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn load(&self) -> Result<Option<Vec<String>>, FavoritesError> {
        match self.raw() {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, ids: &[String]) -> Result<(), FavoritesError> {
        let raw = serde_json::to_string(ids)?;
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(raw);
        Ok(())
    }
}

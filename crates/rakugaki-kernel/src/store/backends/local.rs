//! Local filesystem checkpoint backend.
//!
//! One `<id>.json` document per checkpoint under a dedicated directory, with
//! path security to prevent escaping that directory.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::fs;

use rakugaki_types::{Checkpoint, CheckpointData, CheckpointId};

use crate::store::ops::{CheckpointStore, StoreLimits, encode_payload, parse_id};
use crate::store::{StoreError, StoreResult};

const EXTENSION: &str = "json";

/// Local filesystem checkpoint backend.
///
/// Every resolved path is checked to stay strictly inside `root`, even though
/// ids are already restricted to a filename-safe charset.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    limits: StoreLimits,
}

impl LocalStore {
    /// Open (creating if needed) a checkpoint directory with default limits.
    pub async fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        Self::open_with_limits(root, StoreLimits::default()).await
    }

    /// Open with explicit limits.
    ///
    /// The root is canonicalized here so later containment checks compare
    /// like with like (e.g. macOS `/tmp` → `/private/tmp`).
    pub async fn open_with_limits(
        root: impl Into<PathBuf>,
        limits: StoreLimits,
    ) -> StoreResult<Self> {
        let root: PathBuf = root.into();
        fs::create_dir_all(&root).await?;
        let root = dunce::canonicalize(&root)?;
        Ok(Self { root, limits })
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve an id to its document path inside the root.
    fn resolve(&self, id: &CheckpointId) -> StoreResult<PathBuf> {
        let full = self.root.join(format!("{id}.{EXTENSION}"));

        let canonical = if full.exists() {
            dunce::canonicalize(&full)?
        } else {
            let parent = full
                .parent()
                .ok_or_else(|| StoreError::path_escapes_root(full.display().to_string()))?;
            let filename = full
                .file_name()
                .ok_or_else(|| StoreError::path_escapes_root(full.display().to_string()))?;
            dunce::canonicalize(parent)?.join(filename)
        };

        if canonical.parent() != Some(self.root.as_path()) {
            return Err(StoreError::path_escapes_root(format!(
                "{} is not directly under {}",
                canonical.display(),
                self.root.display()
            )));
        }
        Ok(canonical)
    }

    /// Remove the oldest documents (by modification time) beyond the ceiling.
    ///
    /// Failures are logged and swallowed.
    async fn prune(&self) {
        let mut documents = match self.list_documents().await {
            Ok(docs) => docs,
            Err(e) => {
                tracing::warn!(root = %self.root.display(), error = %e, "checkpoint prune scan failed");
                return;
            }
        };

        let surplus = documents.len().saturating_sub(self.limits.max_entries);
        if surplus == 0 {
            return;
        }

        documents.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
        for (path, _) in documents.into_iter().take(surplus) {
            match fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(path = %path.display(), "pruned checkpoint"),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to prune checkpoint")
                }
            }
        }
    }

    /// All `*.json` documents in the root with their modification times.
    async fn list_documents(&self) -> std::io::Result<Vec<(PathBuf, SystemTime)>> {
        let mut documents = Vec::new();
        let mut dir = fs::read_dir(&self.root).await?;

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(meta) if meta.is_file() => meta,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "stat failed during prune");
                    continue;
                }
            };
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            documents.push((path, mtime));
        }
        Ok(documents)
    }
}

#[async_trait]
impl CheckpointStore for LocalStore {
    #[tracing::instrument(skip(self, data), fields(root = %self.root.display()))]
    async fn save(&self, id: &str, data: &CheckpointData) -> StoreResult<()> {
        let id = parse_id(id)?;
        let bytes = encode_payload(data, &self.limits)?;
        let path = self.resolve(&id)?;

        // Write beside the target and rename so readers never see half a document.
        let tmp = self.root.join(format!(".{id}.{}.tmp", rand::random::<u32>()));
        if let Err(e) = fs::write(&tmp, &bytes).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(bytes = bytes.len(), "saved checkpoint");
        self.prune().await;
        Ok(())
    }

    async fn load(&self, id: &str) -> StoreResult<Option<Checkpoint>> {
        let id = parse_id(id)?;
        let path = self.resolve(&id)?;

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let saved_at = fs::metadata(&path).await.and_then(|m| m.modified()).ok();
        let data = CheckpointData::from_json_slice(&bytes)?;

        Ok(Some(Checkpoint { id, data, saved_at }))
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

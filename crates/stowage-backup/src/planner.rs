//! Deciding how a file reaches the store and moving it there
//!
//! Files within the size limit are uploaded as one object. Larger files
//! are split next to the source and each part is uploaded to
//! `<dest>-split_parts/<file name>.part<N>`, retried on its own, and
//! removed locally once the store has acknowledged it.

use crate::chunker::{self, Part};
use std::path::{Path, PathBuf};
use stowage_core::retry::retry_with_policy;
use stowage_core::types::RetryPolicy;
use stowage_core::{Error, Result, SizeLimit};
use stowage_storage::{split_parts_folder, ObjectStore, RemoteKey};
use tracing::{debug, info, warn};

/// How a file will be uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferPlan {
    Direct { size: u64 },
    Chunked { size: u64, part_count: u64 },
}

impl TransferPlan {
    pub fn size(&self) -> u64 {
        match self {
            TransferPlan::Direct { size } | TransferPlan::Chunked { size, .. } => *size,
        }
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, TransferPlan::Chunked { .. })
    }
}

/// Result of a completed transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub plan: TransferPlan,
    /// Keys written, in upload order
    pub keys: Vec<String>,
}

/// Uploads files under a size limit with per-object retries
#[derive(Debug, Clone)]
pub struct TransferPlanner {
    limit: SizeLimit,
    policy: RetryPolicy,
}

impl TransferPlanner {
    pub fn new(limit: SizeLimit, policy: RetryPolicy) -> Self {
        Self { limit, policy }
    }

    pub fn limit(&self) -> SizeLimit {
        self.limit
    }

    /// Decide between a direct and a chunked upload for `file`
    pub async fn plan(&self, file: &Path) -> Result<TransferPlan> {
        let size = tokio::fs::metadata(file).await?.len();
        Ok(self.plan_for_size(size))
    }

    pub fn plan_for_size(&self, size: u64) -> TransferPlan {
        if self.limit.exceeded_by(size) {
            TransferPlan::Chunked {
                size,
                part_count: self.limit.part_count(size),
            }
        } else {
            TransferPlan::Direct { size }
        }
    }

    /// Upload `file` to `dest_key`, chunking it when it exceeds the limit.
    ///
    /// A part that still fails after its retries stops the transfer with
    /// `Error::PartialUpload`; the parts not yet acknowledged stay on disk
    /// and can be handed to [`TransferPlanner::resume`].
    pub async fn transfer(
        &self,
        store: &dyn ObjectStore,
        file: &Path,
        dest_key: &RemoteKey,
    ) -> Result<TransferReport> {
        let plan = self.plan(file).await?;

        match plan {
            TransferPlan::Direct { size } => {
                debug!("Uploading {} directly ({} bytes)", file.display(), size);
                self.upload_object(store, file, dest_key.as_str()).await?;
                Ok(TransferReport {
                    plan,
                    keys: vec![dest_key.to_string()],
                })
            }
            TransferPlan::Chunked { size, part_count } => {
                info!(
                    "{} is {} bytes, above the {} limit; uploading in {} parts",
                    file.display(),
                    size,
                    self.limit,
                    part_count
                );
                let parts = self.split(file).await?;
                let keys = self.upload_parts(store, &parts, dest_key).await?;
                Ok(TransferReport { plan, keys })
            }
        }
    }

    /// Upload only `pending` parts of an earlier chunked transfer
    pub async fn resume(
        &self,
        store: &dyn ObjectStore,
        pending: &[Part],
        dest_key: &RemoteKey,
    ) -> Result<TransferReport> {
        let size = pending.iter().map(|p| p.size).sum();
        info!(
            "Resuming upload of {} pending part(s) to {}",
            pending.len(),
            dest_key
        );
        let keys = self.upload_parts(store, pending, dest_key).await?;
        Ok(TransferReport {
            plan: TransferPlan::Chunked {
                size,
                part_count: pending.len() as u64,
            },
            keys,
        })
    }

    async fn split(&self, file: &Path) -> Result<Vec<Part>> {
        let source: PathBuf = file.to_path_buf();
        let limit = self.limit.bytes();
        tokio::task::spawn_blocking(move || chunker::split(&source, limit))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }

    async fn upload_parts(
        &self,
        store: &dyn ObjectStore,
        parts: &[Part],
        dest_key: &RemoteKey,
    ) -> Result<Vec<String>> {
        let folder = split_parts_folder(dest_key);
        let mut ordered = parts.to_vec();
        ordered.sort_by_key(|p| p.index);

        let mut uploaded: Vec<u32> = Vec::new();
        let mut keys = Vec::with_capacity(ordered.len());

        for (position, part) in ordered.iter().enumerate() {
            let key = folder.join(&part.file_name());

            if let Err(source) = self.upload_object(store, &part.path, key.as_str()).await {
                let pending: Vec<u32> = ordered[position..].iter().map(|p| p.index).collect();
                warn!(
                    "Part {} of {} failed; {} part(s) left on disk",
                    part.index,
                    dest_key,
                    pending.len()
                );
                return Err(Error::PartialUpload {
                    file: dest_key.file_name().to_string(),
                    uploaded,
                    pending,
                    failed_part: part.index,
                    source: Box::new(source),
                });
            }

            tokio::fs::remove_file(&part.path).await?;
            uploaded.push(part.index);
            keys.push(key.to_string());
        }

        Ok(keys)
    }

    /// Upload one file as a single object, retrying transport failures
    pub async fn upload_object(&self, store: &dyn ObjectStore, path: &Path, key: &str) -> Result<()> {
        let operation = format!("upload {}", key);
        retry_with_policy(&self.policy, &operation, || store.put(path, key)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_storage::MemoryStore;
    use tempfile::TempDir;

    fn no_delay(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff_multiplier: 1.0,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    #[test]
    fn test_plan_boundaries() {
        let planner = TransferPlanner::new(SizeLimit::new(10).unwrap(), no_delay(1));
        assert_eq!(planner.plan_for_size(0), TransferPlan::Direct { size: 0 });
        assert_eq!(planner.plan_for_size(10), TransferPlan::Direct { size: 10 });
        assert_eq!(
            planner.plan_for_size(25),
            TransferPlan::Chunked {
                size: 25,
                part_count: 3
            }
        );
    }

    #[tokio::test]
    async fn test_direct_upload_keeps_source() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("small.cpt");
        std::fs::write(&file, b"hello").unwrap();

        let store = MemoryStore::new();
        let planner = TransferPlanner::new(SizeLimit::new(10).unwrap(), no_delay(1));
        let key = RemoteKey::new("backup/d/small.cpt");
        let report = planner.transfer(&store, &file, &key).await.unwrap();

        assert_eq!(report.keys, vec!["backup/d/small.cpt"]);
        assert_eq!(store.object("backup/d/small.cpt").unwrap(), b"hello");
        assert!(file.exists());
    }

    #[tokio::test]
    async fn test_direct_failure_is_returned_unchanged() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("small.cpt");
        std::fs::write(&file, b"hello").unwrap();

        let store = MemoryStore::new();
        store.fail_puts("k", 5);
        let planner = TransferPlanner::new(SizeLimit::new(10).unwrap(), no_delay(2));
        let err = planner
            .transfer(&store, &file, &RemoteKey::new("k"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { .. }));
        assert_eq!(store.put_count("k"), 2);
    }
}

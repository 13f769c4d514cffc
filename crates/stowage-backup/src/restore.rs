//! Restore pipeline: pick a partition, fetch its complete items, join
//! chunked ones, and hand the staging folder to decryption

use crate::chunker::{self, Part};
use crate::scripts::ExternalScripts;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use stowage_core::retry::retry_with_policy;
use stowage_core::types::RetryPolicy;
use stowage_core::{DatePartition, Error, Result, StowageConfig};
use stowage_storage::{partitions_from_prefixes, reconcile, BackupItem, DataRef, ObjectStore, RemoteKey};
use tracing::{debug, info, warn};

/// Chooses the partition to restore from
pub trait PartitionSelector: Send + Sync {
    /// Pick one of `partitions` (newest first); `None` cancels the restore
    fn select(&self, partitions: &[DatePartition]) -> Result<Option<DatePartition>>;
}

/// Selects a partition by exact name
#[derive(Debug, Clone)]
pub struct NamedPartition(pub String);

impl PartitionSelector for NamedPartition {
    fn select(&self, partitions: &[DatePartition]) -> Result<Option<DatePartition>> {
        partitions
            .iter()
            .find(|p| p.name() == self.0)
            .cloned()
            .map(Some)
            .ok_or_else(|| Error::not_found(format!("partition {}", self.0)))
    }
}

/// Selects the newest partition
#[derive(Debug, Clone, Copy, Default)]
pub struct NewestPartition;

impl PartitionSelector for NewestPartition {
    fn select(&self, partitions: &[DatePartition]) -> Result<Option<DatePartition>> {
        Ok(partitions.first().cloned())
    }
}

/// An item fetched into the staging folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredItem {
    pub name: String,
    /// Encrypted payload (`<name>.cpt`)
    pub data_file: PathBuf,
    pub pass_file: PathBuf,
    pub was_chunked: bool,
}

/// Result of a restore run
#[derive(Debug, Clone)]
pub struct RestoreSummary {
    pub partition: DatePartition,
    pub items: Vec<RestoredItem>,
    /// Items not fetched because an earlier item already used their
    /// local file name
    pub skipped: Vec<BackupItem>,
    /// Files produced by decryption; empty when decryption was skipped
    pub decrypted: Vec<PathBuf>,
}

/// Restores items from a store into a staging folder
pub struct RestoreOrchestrator<'a> {
    store: &'a dyn ObjectStore,
    scripts: &'a dyn ExternalScripts,
    staging_dir: PathBuf,
    backup_root: String,
    policy: RetryPolicy,
}

impl<'a> RestoreOrchestrator<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        scripts: &'a dyn ExternalScripts,
        staging_dir: impl Into<PathBuf>,
        backup_root: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            store,
            scripts,
            staging_dir: staging_dir.into(),
            backup_root: backup_root.into(),
            policy,
        }
    }

    pub fn from_config(
        store: &'a dyn ObjectStore,
        scripts: &'a dyn ExternalScripts,
        config: &StowageConfig,
    ) -> Self {
        Self::new(
            store,
            scripts,
            config.staging_dir(),
            config.backup_root(),
            config.upload_policy().clone(),
        )
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Date partitions under the backup root, newest first
    pub async fn list_partitions(&self) -> Result<Vec<DatePartition>> {
        let prefix = RemoteKey::new(&self.backup_root).as_prefix();
        let listing = self.store.list(&prefix, Some("/")).await?;
        Ok(partitions_from_prefixes(&self.backup_root, &listing.common_prefixes))
    }

    /// Complete backup items in `partition`
    pub async fn items(&self, partition: &DatePartition) -> Result<Vec<BackupItem>> {
        let prefix = RemoteKey::from_parts(&self.backup_root, partition.name(), "").as_prefix();
        let listing = self.store.list(&prefix, Some("/")).await?;
        let items = reconcile(&prefix, &listing.objects, &listing.common_prefixes);
        debug!(
            "Partition {}: {} object(s), {} folder(s), {} complete item(s)",
            partition,
            listing.objects.len(),
            listing.common_prefixes.len(),
            items.len()
        );
        Ok(items)
    }

    /// Select a partition, fetch every item, and decrypt the staging folder
    /// when a password is given. `None` if the selector cancelled.
    pub async fn run(
        &self,
        selector: &dyn PartitionSelector,
        password: Option<&str>,
    ) -> Result<Option<RestoreSummary>> {
        let partitions = self.list_partitions().await?;
        if partitions.is_empty() {
            return Err(Error::not_found(format!(
                "no backup partitions under {}",
                self.backup_root
            )));
        }

        let Some(partition) = selector.select(&partitions)? else {
            info!("Restore cancelled");
            return Ok(None);
        };
        info!("Restoring from partition {}", partition);

        let items = self.items(&partition).await?;
        if items.is_empty() {
            warn!("Partition {} holds no complete backup items", partition);
        }

        tokio::fs::create_dir_all(&self.staging_dir).await?;

        let mut restored = Vec::with_capacity(items.len());
        let mut skipped = Vec::new();
        let mut claimed = HashSet::new();
        for item in &items {
            if !claimed.insert(item.data_file_name()) {
                warn!(
                    "Skipping {}: {} is already restored from another copy",
                    item.data.key(),
                    item.data_file_name()
                );
                skipped.push(item.clone());
                continue;
            }
            restored.push(self.fetch_item(item).await?);
        }

        let decrypted = match password {
            Some(password) if !restored.is_empty() => {
                self.scripts
                    .decrypt_folder(&self.staging_dir, password)
                    .await?
            }
            _ => Vec::new(),
        };

        Ok(Some(RestoreSummary {
            partition,
            items: restored,
            skipped,
            decrypted,
        }))
    }

    /// Download one item and its pass file into the staging folder,
    /// joining chunked data into `<name>.cpt`
    pub async fn fetch_item(&self, item: &BackupItem) -> Result<RestoredItem> {
        let data_file = self.staging_dir.join(item.data_file_name());
        let pass_file = self.staging_dir.join(item.pass_file_name());

        match &item.data {
            DataRef::File(key) => {
                self.download(key, &data_file).await?;
            }
            DataRef::Folder(prefix) => {
                self.fetch_parts(item, prefix, &data_file).await?;
            }
        }
        self.download(&item.pass_key, &pass_file).await?;

        info!("Fetched {} into {}", item.name, data_file.display());
        Ok(RestoredItem {
            name: item.name.clone(),
            data_file,
            pass_file,
            was_chunked: item.is_folder(),
        })
    }

    async fn fetch_parts(&self, item: &BackupItem, prefix: &str, destination: &Path) -> Result<()> {
        let folder_name = prefix
            .strip_prefix(&item.base_prefix)
            .unwrap_or(prefix)
            .trim_end_matches('/');
        let parts_dir = self.staging_dir.join(folder_name);

        let base = item.data_file_name();
        let listing = self.store.list(prefix, None).await?;

        // Only the parts listed here are joined; other files already in
        // the local folder are left alone.
        let mut parts = Vec::new();
        for object in &listing.objects {
            let Some(relative) = object.key.strip_prefix(prefix) else {
                continue;
            };
            let Some(index) = chunker::parse_part_index(relative, &base) else {
                debug!("Ignoring {} in {}", object.key, prefix);
                continue;
            };
            let path = parts_dir.join(relative);
            self.download(&object.key, &path).await?;
            parts.push(Part {
                path,
                index,
                size: object.size,
            });
        }

        let target = destination.to_path_buf();
        tokio::task::spawn_blocking(move || chunker::join(&parts, &target))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;

        if let Err(e) = tokio::fs::remove_dir(&parts_dir).await {
            warn!("Left {} in place: {}", parts_dir.display(), e);
        }
        Ok(())
    }

    async fn download(&self, key: &str, local_path: &Path) -> Result<()> {
        let operation = format!("download {}", key);
        retry_with_policy(&self.policy, &operation, || self.store.get(key, local_path)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partitions() -> Vec<DatePartition> {
        let mut list: Vec<DatePartition> = ["2024-01-01", "2024-01-02", "2023-12-31"]
            .into_iter()
            .map(DatePartition::new)
            .collect();
        list.sort();
        list
    }

    #[test]
    fn test_newest_picks_first() {
        let chosen = NewestPartition.select(&partitions()).unwrap().unwrap();
        assert_eq!(chosen.name(), "2024-01-02");
        assert!(NewestPartition.select(&[]).unwrap().is_none());
    }

    #[test]
    fn test_named_requires_exact_match() {
        let chosen = NamedPartition("2023-12-31".into())
            .select(&partitions())
            .unwrap()
            .unwrap();
        assert_eq!(chosen.name(), "2023-12-31");

        let err = NamedPartition("2023-12".into())
            .select(&partitions())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}

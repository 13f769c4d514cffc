//! Backup pipeline for one or more backup definitions
//!
//! ```text
//! Idle -> ResourcesStopped -> VolumesCaptured -> ResourcesRestarted
//!      -> (per volume) Encrypted -> [Chunked] -> Uploaded -> Cleaned
//!      -> Done
//! ```
//!
//! `Chunked` is only recorded for a volume whose archive was split and
//! uploaded part by part.
//!
//! Any step may move the run to `Failed`. Containers are always restarted
//! once they were stopped, even when a capture failed; in that case the run
//! fails right after the restart and nothing is uploaded. The pass file of
//! a volume is uploaded after its data, so a listing only ever shows a pass
//! file for data that is completely in the store.

use crate::lifecycle::Lifecycle;
use crate::planner::{TransferPlan, TransferPlanner};
use crate::scripts::{pass_path, ExternalScripts};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use stowage_core::types::{BackupDefinition, BackupKind, VolumeRef};
use stowage_core::{current_partition, BackupFrequency, Error, ResourceFailure, Result, StowageConfig};
use stowage_storage::{ObjectStore, RemoteKey};
use tracing::{debug, error, info, warn};

/// States of a single definition run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupState {
    Idle,
    ResourcesStopped,
    VolumesCaptured,
    ResourcesRestarted,
    Encrypted,
    Chunked,
    Uploaded,
    Cleaned,
    Done,
    Failed,
}

impl fmt::Display for BackupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupState::Idle => "idle",
            BackupState::ResourcesStopped => "resources stopped",
            BackupState::VolumesCaptured => "volumes captured",
            BackupState::ResourcesRestarted => "resources restarted",
            BackupState::Encrypted => "encrypted",
            BackupState::Chunked => "chunked",
            BackupState::Uploaded => "uploaded",
            BackupState::Cleaned => "cleaned",
            BackupState::Done => "done",
            BackupState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Settings a backup run needs from the configuration
#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub staging_dir: PathBuf,
    pub backup_root: String,
    pub frequency: BackupFrequency,
    /// Fixed partition name; the current one for `frequency` when `None`
    pub partition: Option<String>,
    /// Per-volume compression, `true` when absent
    pub compress: HashMap<String, bool>,
}

impl BackupSettings {
    pub fn from_config(config: &StowageConfig) -> Self {
        Self {
            staging_dir: config.staging_dir().to_path_buf(),
            backup_root: config.backup_root().to_string(),
            frequency: config.frequency(),
            partition: None,
            compress: config
                .inner()
                .volumes
                .iter()
                .map(|v| (v.name.clone(), v.compress))
                .collect(),
        }
    }

    fn partition_name(&self) -> String {
        self.partition
            .clone()
            .unwrap_or_else(|| current_partition(self.frequency))
    }

    fn compress(&self, volume: &VolumeRef) -> bool {
        self.compress.get(&volume.source()).copied().unwrap_or(true)
    }
}

/// One volume that reached the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeUpload {
    pub volume: VolumeRef,
    pub data_key: String,
    pub pass_key: String,
    pub plan: TransferPlan,
}

/// Result of a successful definition run
#[derive(Debug, Clone)]
pub struct BackupSummary {
    pub definition: String,
    pub partition: String,
    pub uploads: Vec<VolumeUpload>,
    /// Containers that failed to come back up; the run still succeeded
    pub restart_failures: Vec<ResourceFailure>,
    /// Every state the run passed through
    pub history: Vec<BackupState>,
}

struct CapturedVolume {
    volume: VolumeRef,
    archive: PathBuf,
    archive_name: String,
}

/// Tracks and logs state transitions of one run
struct StateTracker {
    definition: String,
    history: Vec<BackupState>,
}

impl StateTracker {
    fn new(definition: &str) -> Self {
        Self {
            definition: definition.to_string(),
            history: vec![BackupState::Idle],
        }
    }

    fn advance(&mut self, next: BackupState) {
        debug!("[{}] -> {}", self.definition, next);
        self.history.push(next);
    }

    fn fail(&mut self, err: Error) -> Error {
        error!("[{}] backup failed: {}", self.definition, err);
        self.history.push(BackupState::Failed);
        err
    }
}

/// Runs backup definitions against a store
pub struct BackupOrchestrator<'a> {
    store: &'a dyn ObjectStore,
    scripts: &'a dyn ExternalScripts,
    lifecycle: Lifecycle,
    planner: TransferPlanner,
    settings: BackupSettings,
}

impl<'a> BackupOrchestrator<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        scripts: &'a dyn ExternalScripts,
        lifecycle: Lifecycle,
        planner: TransferPlanner,
        settings: BackupSettings,
    ) -> Self {
        Self {
            store,
            scripts,
            lifecycle,
            planner,
            settings,
        }
    }

    /// Run every definition in order, skipping unsupported kinds and
    /// stopping at the first failure
    pub async fn run_all(&self, definitions: &[BackupDefinition]) -> Result<Vec<BackupSummary>> {
        let mut summaries = Vec::new();
        for definition in definitions {
            if definition.kind != BackupKind::Standard {
                warn!(
                    "Skipping backup '{}': type '{}' is not supported",
                    definition.name, definition.kind
                );
                continue;
            }
            summaries.push(self.run(definition).await?);
        }
        Ok(summaries)
    }

    /// Run one definition
    pub async fn run(&self, definition: &BackupDefinition) -> Result<BackupSummary> {
        if definition.kind != BackupKind::Standard {
            return Err(Error::invalid_config(format!(
                "backup '{}' has unsupported type '{}'",
                definition.name, definition.kind
            )));
        }

        let mut tracker = StateTracker::new(&definition.name);
        info!("Starting backup '{}'", definition.name);

        tokio::fs::create_dir_all(&self.settings.staging_dir)
            .await
            .map_err(|e| tracker.fail(e.into()))?;

        self.lifecycle
            .stop_all(&definition.containers)
            .await
            .map_err(|e| tracker.fail(e))?;
        tracker.advance(BackupState::ResourcesStopped);

        let (captured, capture_error) = self.capture_volumes(definition).await;
        tracker.advance(BackupState::VolumesCaptured);

        let restart_failures = match self.lifecycle.start_all(&definition.containers).await {
            Ok(_) => Vec::new(),
            Err(Error::PartialBatch { failures, .. }) => {
                for failure in &failures {
                    warn!("Container {} did not restart: {}", failure.name, failure.message);
                }
                failures
            }
            Err(e) => {
                warn!("Restarting containers failed: {}", e);
                Vec::new()
            }
        };
        tracker.advance(BackupState::ResourcesRestarted);

        if let Some(err) = capture_error {
            return Err(tracker.fail(err));
        }

        let partition = self.settings.partition_name();
        let mut uploads = Vec::with_capacity(captured.len());
        for volume in &captured {
            let upload = self
                .ship_volume(volume, &partition, &mut tracker)
                .await
                .map_err(|e| tracker.fail(e))?;
            uploads.push(upload);
        }

        tracker.advance(BackupState::Done);
        info!(
            "Backup '{}' complete: {} volume(s) in partition {}",
            definition.name,
            uploads.len(),
            partition
        );

        Ok(BackupSummary {
            definition: definition.name.clone(),
            partition,
            uploads,
            restart_failures,
            history: tracker.history,
        })
    }

    /// Capture volumes in order until the first failure
    async fn capture_volumes(
        &self,
        definition: &BackupDefinition,
    ) -> (Vec<CapturedVolume>, Option<Error>) {
        let mut captured = Vec::new();

        for (index, volume) in definition.volumes.iter().enumerate() {
            let archive_name = volume.archive_name(&definition.name, index);
            let archive = self.settings.staging_dir.join(&archive_name);
            info!("Capturing volume {} into {}", volume, archive.display());

            if let Err(e) = self
                .scripts
                .capture_volume(volume, &archive, self.settings.compress(volume))
                .await
            {
                error!("Capture of volume {} failed: {}", volume, e);
                return (captured, Some(e));
            }

            if let Err(e) = self
                .lifecycle
                .runtime()
                .reclaim_ownership(&self.settings.staging_dir)
                .await
            {
                warn!(
                    "Could not reclaim ownership of {}: {}",
                    self.settings.staging_dir.display(),
                    e
                );
            }

            captured.push(CapturedVolume {
                volume: volume.clone(),
                archive,
                archive_name,
            });
        }

        (captured, None)
    }

    /// Encrypt, upload data then pass file, and clean up one volume
    async fn ship_volume(
        &self,
        captured: &CapturedVolume,
        partition: &str,
        tracker: &mut StateTracker,
    ) -> Result<VolumeUpload> {
        let encrypted = with_suffix(&captured.archive, ".cpt");
        let pass = pass_path(&encrypted);

        self.scripts.encrypt(&captured.archive, &encrypted).await?;
        if !tokio::fs::try_exists(&pass).await? {
            return Err(Error::script_output(
                crate::scripts::KEY_ENCRYPT,
                format!("pass file {} was not written", pass.display()),
            ));
        }
        tracker.advance(BackupState::Encrypted);

        let data_key = RemoteKey::from_parts(
            &self.settings.backup_root,
            partition,
            &format!("{}.cpt", captured.archive_name),
        );
        let pass_key = RemoteKey::new(&format!("{}.pass", data_key));

        let report = self.planner.transfer(self.store, &encrypted, &data_key).await?;
        if report.plan.is_chunked() {
            tracker.advance(BackupState::Chunked);
        }
        let plan = report.plan;

        self.planner
            .upload_object(self.store, &pass, pass_key.as_str())
            .await?;
        tracker.advance(BackupState::Uploaded);

        for file in [&captured.archive, &encrypted, &pass] {
            if let Err(e) = tokio::fs::remove_file(file).await {
                warn!("Failed to remove local file {}: {}", file.display(), e);
            }
        }
        tracker.advance(BackupState::Cleaned);

        info!("Volume {} stored as {}", captured.volume, data_key);
        Ok(VolumeUpload {
            volume: captured.volume.clone(),
            data_key: data_key.to_string(),
            pass_key: pass_key.to_string(),
            plan,
        })
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

//! # stowage-backup
//!
//! Backup and restore pipelines for stowage:
//! - Size-bounded chunking and lossless joining of files
//! - Transfer planning with per-part retries and resumable uploads
//! - Parallel container stop/start around the capture window
//! - Adapter for the external volume, encryption and key scripts
//! - The backup and restore orchestrators

pub mod backup;
pub mod chunker;
pub mod lifecycle;
pub mod planner;
pub mod restore;
pub mod scripts;

pub use backup::{BackupOrchestrator, BackupSettings, BackupState, BackupSummary, VolumeUpload};
pub use chunker::Part;
pub use lifecycle::{BatchReport, ContainerRuntime, DockerRuntime, Lifecycle, LifecycleAction};
pub use planner::{TransferPlan, TransferPlanner, TransferReport};
pub use restore::{
    NamedPartition, NewestPartition, PartitionSelector, RestoreOrchestrator, RestoreSummary,
    RestoredItem,
};
pub use scripts::{ExternalScripts, ScriptRunner};

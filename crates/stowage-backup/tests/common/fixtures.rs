//! Fixtures shared by the pipeline tests

use std::collections::HashMap;
use std::path::Path;
use stowage_backup::{BackupSettings, TransferPlanner};
use stowage_core::types::{BackupDefinition, BackupKind, RetryPolicy, VolumeRef};
use stowage_core::{BackupFrequency, SizeLimit};

/// Backup root used by every fixture
pub const ROOT: &str = "backup";

/// Partition every backup fixture writes into
pub const PARTITION: &str = "2024-03-09";

/// Retries without sleeping
pub fn quick_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff_multiplier: 1.0,
        initial_delay_ms: 0,
        max_delay_ms: 0,
    }
}

pub fn planner(limit_bytes: u64, max_attempts: u32) -> TransferPlanner {
    TransferPlanner::new(
        SizeLimit::new(limit_bytes).expect("non-zero limit"),
        quick_policy(max_attempts),
    )
}

pub fn settings(staging: &Path) -> BackupSettings {
    BackupSettings {
        staging_dir: staging.to_path_buf(),
        backup_root: ROOT.to_string(),
        frequency: BackupFrequency::Daily,
        partition: Some(PARTITION.to_string()),
        compress: HashMap::new(),
    }
}

pub fn definition(name: &str, containers: &[&str], volumes: &[&str]) -> BackupDefinition {
    BackupDefinition {
        name: name.to_string(),
        kind: BackupKind::Standard,
        containers: containers.iter().map(|c| c.to_string()).collect(),
        volumes: volumes.iter().map(|v| VolumeRef::from(v.to_string())).collect(),
    }
}

/// Key a backed-up archive lands under
pub fn data_key(archive_name: &str) -> String {
    format!("{}/{}/{}.cpt", ROOT, PARTITION, archive_name)
}

//! Configuration types for stowage.yaml

use crate::partition::BackupFrequency;
use crate::size::SizeLimit;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Root stowage.yaml configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StowageConfigFile {
    /// Object store connection and layout
    pub s3: S3Settings,

    /// Local folders, keys and runtime behaviour
    pub app: AppSettings,

    /// Per-volume capture settings
    #[serde(default)]
    pub volumes: Vec<VolumeSettings>,

    /// Backup definitions, run in order
    #[serde(default)]
    pub backup_definitions: Vec<BackupDefinition>,
}

/// Object store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Settings {
    /// Custom endpoint for S3-compatible stores (MinIO, R2, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    #[serde(default = "default_region")]
    pub region: String,

    pub bucket: String,

    /// Static credentials; the default AWS provider chain is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_secret: Option<String>,

    /// Largest object uploaded in one piece
    pub max_file_size: SizeLimit,

    /// Backup root under the bucket
    pub backup_folder: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    /// Folder holding the external shell scripts
    pub scripts_folder: PathBuf,

    /// Staging folder for captured, encrypted and downloaded artifacts
    pub local_backup_folder: PathBuf,

    #[serde(default)]
    pub backup_frequency: BackupFrequency,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_metadata: Option<PathBuf>,

    /// Upper bound for a single external script run
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_timeout_secs: Option<u64>,

    /// Upper bound for a single `docker stop|start`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_timeout_secs: Option<u64>,

    /// Retry policy applied to each uploaded object or part
    #[serde(default)]
    pub upload: RetryPolicy,
}

/// Per-volume settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VolumeSettings {
    pub name: String,

    /// Gzip the captured archive (default true)
    #[serde(default = "default_true")]
    pub compress: bool,
}

fn default_true() -> bool {
    true
}

/// A named group of containers and volumes backed up together
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupDefinition {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: BackupKind,

    /// Containers stopped for the duration of the capture
    #[serde(default)]
    pub containers: Vec<String>,

    #[serde(default)]
    pub volumes: Vec<VolumeRef>,
}

/// Backup strategy of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupKind {
    #[default]
    Standard,
    /// Any kind this build does not know how to run
    #[serde(other)]
    Unsupported,
}

impl fmt::Display for BackupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupKind::Standard => write!(f, "standard"),
            BackupKind::Unsupported => write!(f, "unsupported"),
        }
    }
}

/// A volume entry of a backup definition, classified once at load time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VolumeRef {
    /// Docker named volume
    Named(String),
    /// Host directory mounted into the container
    BindMount(PathBuf),
}

impl VolumeRef {
    /// The value handed to the volume scripts
    pub fn source(&self) -> String {
        match self {
            VolumeRef::Named(name) => name.clone(),
            VolumeRef::BindMount(path) => path.display().to_string(),
        }
    }

    pub fn is_bind_mount(&self) -> bool {
        matches!(self, VolumeRef::BindMount(_))
    }

    /// Staging archive name: `<definition>-<volume>.tar.gz` for named
    /// volumes, `<definition>-<index>.tar.gz` for bind mounts.
    pub fn archive_name(&self, definition: &str, index: usize) -> String {
        match self {
            VolumeRef::Named(name) => format!("{}-{}.tar.gz", definition, name),
            VolumeRef::BindMount(_) => format!("{}-{}.tar.gz", definition, index),
        }
    }
}

/// Absolute paths are bind mounts; anything else is a volume name
fn is_bind_mount_path(value: &str) -> bool {
    Path::new(value).is_absolute()
}

impl From<String> for VolumeRef {
    fn from(value: String) -> Self {
        if is_bind_mount_path(&value) {
            VolumeRef::BindMount(PathBuf::from(value))
        } else {
            VolumeRef::Named(value)
        }
    }
}

impl From<&str> for VolumeRef {
    fn from(value: &str) -> Self {
        VolumeRef::from(value.to_string())
    }
}

impl From<VolumeRef> for String {
    fn from(volume: VolumeRef) -> Self {
        volume.source()
    }
}

impl fmt::Display for VolumeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source())
    }
}

/// Exponential backoff policy for caller-side retries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Total attempts including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_multiplier: default_backoff_multiplier(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

impl RetryPolicy {
    /// A policy that runs the operation exactly once
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_multiplier() -> f64 {
    2.0
}
fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    10000
}

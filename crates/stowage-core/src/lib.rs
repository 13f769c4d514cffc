//! # stowage-core
//!
//! Core library for stowage providing:
//! - Configuration file parsing (stowage.yaml) and path normalization
//! - The error taxonomy shared by every stowage crate
//! - Human-readable size parsing and the upload size limit
//! - Date partition naming
//! - Caller-side retry with exponential backoff

pub mod config;
pub mod error;
pub mod partition;
pub mod retry;
pub mod size;
pub mod types;

pub use config::{StowageConfig, CONFIG_ENV_VAR};
pub use error::{Error, ResourceFailure, Result};
pub use partition::{current_partition, partition_for, BackupFrequency, DatePartition};
pub use size::{format_bytes, parse_size, SizeLimit};

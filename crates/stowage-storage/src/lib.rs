//! # stowage-storage
//!
//! Object store access for stowage:
//! - `ObjectStore` trait with an S3 implementation and an in-memory one
//! - Remote key layout (`<root>/<partition>/<relative path>`)
//! - Reconciliation of listings into complete backup items

pub mod gateway;
pub mod keys;
pub mod manifest;
pub mod memory;
pub mod s3;

pub use gateway::{ListPage, Listing, ObjectInfo, ObjectStore};
pub use keys::{split_parts_folder, RemoteKey};
pub use manifest::{partitions_from_prefixes, reconcile, BackupItem, DataRef};
pub use memory::MemoryStore;
pub use s3::S3Store;

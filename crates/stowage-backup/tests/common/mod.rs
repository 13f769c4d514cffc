//! Common test utilities for stowage-backup
//!
//! - Fakes for the container runtime and the external scripts that share
//!   one event log, so tests can assert ordering across both
//! - Fixtures for definitions, settings and retry policies

#![allow(dead_code)]
#![allow(unused_imports)]

pub mod fixtures;
pub mod mocks;

pub use fixtures::*;
pub use mocks::*;

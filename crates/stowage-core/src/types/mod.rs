//! Type definitions for stowage configuration

mod config_types;

pub use config_types::*;

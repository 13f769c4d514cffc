//! Configuration loading and management

mod loader;

pub use loader::{StowageConfig, CONFIG_ENV_VAR};

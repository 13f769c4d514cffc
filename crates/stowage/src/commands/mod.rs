//! CLI command implementations

pub mod backup;
pub mod chunk;
pub mod derive_key;
pub mod file;
pub mod key;
pub mod list;
pub mod restore;
pub mod upload;
pub mod volume;

use anyhow::{Context, Result};
use camino::Utf8Path;
use dialoguer::Password;
use stowage_backup::ScriptRunner;
use stowage_core::StowageConfig;
use stowage_storage::{ObjectStore, S3Store};

/// Load the configuration from `--config` or `$S3CONFIGFILE`
pub fn load_config(path: Option<&Utf8Path>) -> Result<StowageConfig> {
    let config = StowageConfig::load(path).context("Failed to load configuration")?;
    tracing::debug!("Loaded configuration from {}", config.config_path);
    Ok(config)
}

/// Connect to the configured bucket
pub async fn connect(config: &StowageConfig) -> Result<S3Store> {
    let store = S3Store::new(config.s3())
        .await
        .context("Failed to create object store client")?;
    tracing::debug!("Using {}", store.location());
    Ok(store)
}

/// Script runner for the configured scripts folder
pub fn scripts(config: &StowageConfig) -> ScriptRunner {
    ScriptRunner::from_config(config)
}

/// Prompt for a password without echo
pub fn prompt_password(prompt: &str) -> Result<String> {
    Password::new()
        .with_prompt(prompt)
        .interact()
        .context("Failed to read password")
}

/// Prompt for a new password, asking twice
pub fn prompt_new_password(prompt: &str) -> Result<String> {
    Password::new()
        .with_prompt(prompt)
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()
        .context("Failed to read password")
}

//! Configuration file loading, path normalization and validation

use crate::error::{Error, Result};
use crate::partition::BackupFrequency;
use crate::size::SizeLimit;
use crate::types::{
    AppSettings, BackupDefinition, RetryPolicy, S3Settings, StowageConfigFile, VolumeRef,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable consulted when no `--config` path is given
pub const CONFIG_ENV_VAR: &str = "S3CONFIGFILE";

/// Loaded and validated stowage configuration
#[derive(Debug, Clone)]
pub struct StowageConfig {
    /// The parsed configuration, relative paths already resolved
    pub config: StowageConfigFile,

    /// Path to the configuration file
    pub config_path: Utf8PathBuf,

    /// Directory relative paths were resolved against
    pub working_dir: PathBuf,
}

impl StowageConfig {
    /// Load configuration from `path`, or from the file named by
    /// `S3CONFIGFILE` when no path is given.
    pub fn load(path: Option<&Utf8Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_owned(),
            None => Self::path_from_env()?,
        };

        let content = fs::read_to_string(&config_path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::config_not_found(config_path.as_str())
            } else {
                Error::Io(e)
            }
        })?;

        let parent = config_path
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .map(|p| p.as_std_path().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let working_dir = std::path::absolute(&parent)?;

        let config = Self::from_yaml(&content, &working_dir)?;
        debug!(
            "Loaded configuration from {} ({} backup definitions)",
            config_path,
            config.backup_definitions.len()
        );

        Ok(Self {
            config,
            config_path,
            working_dir,
        })
    }

    /// Parse, resolve and validate YAML content. Relative paths are
    /// resolved against `base`.
    pub fn from_yaml(content: &str, base: &Path) -> Result<StowageConfigFile> {
        let mut config: StowageConfigFile = serde_yaml_ng::from_str(content)?;
        resolve_paths(&mut config, base);
        validate(&config)?;
        Ok(config)
    }

    fn path_from_env() -> Result<Utf8PathBuf> {
        match std::env::var(CONFIG_ENV_VAR) {
            Ok(value) if !value.trim().is_empty() => Ok(Utf8PathBuf::from(value)),
            _ => Err(Error::config_not_found(format!(
                "no --config given and {} is not set",
                CONFIG_ENV_VAR
            ))),
        }
    }

    /// Get the inner configuration file
    pub fn inner(&self) -> &StowageConfigFile {
        &self.config
    }

    pub fn s3(&self) -> &S3Settings {
        &self.config.s3
    }

    pub fn app(&self) -> &AppSettings {
        &self.config.app
    }

    /// Backup definitions in declaration order
    pub fn definitions(&self) -> &[BackupDefinition] {
        &self.config.backup_definitions
    }

    /// Look up a backup definition by name
    pub fn definition(&self, name: &str) -> Option<&BackupDefinition> {
        self.config.backup_definitions.iter().find(|d| d.name == name)
    }

    /// Whether captured archives of `volume` are compressed
    pub fn compress(&self, volume: &VolumeRef) -> bool {
        let source = volume.source();
        self.config
            .volumes
            .iter()
            .find(|v| v.name == source)
            .map(|v| v.compress)
            .unwrap_or(true)
    }

    pub fn max_file_size(&self) -> SizeLimit {
        self.config.s3.max_file_size
    }

    /// Backup root with surrounding slashes removed
    pub fn backup_root(&self) -> &str {
        self.config.s3.backup_folder.trim_matches('/')
    }

    pub fn frequency(&self) -> BackupFrequency {
        self.config.app.backup_frequency
    }

    pub fn staging_dir(&self) -> &Path {
        &self.config.app.local_backup_folder
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.config.app.scripts_folder
    }

    pub fn upload_policy(&self) -> &RetryPolicy {
        &self.config.app.upload
    }

    pub fn script_timeout(&self) -> Option<Duration> {
        self.config.app.script_timeout_secs.map(Duration::from_secs)
    }

    pub fn container_timeout(&self) -> Option<Duration> {
        self.config
            .app
            .container_timeout_secs
            .map(Duration::from_secs)
    }

    pub fn public_key_file(&self) -> Result<&Path> {
        required_path(&self.config.app.public_key_file, "app.publicKeyFile")
    }

    pub fn private_key_file(&self) -> Result<&Path> {
        required_path(&self.config.app.private_key_file, "app.privateKeyFile")
    }

    pub fn private_key_metadata(&self) -> Result<&Path> {
        required_path(
            &self.config.app.private_key_metadata,
            "app.privateKeyMetadata",
        )
    }
}

fn required_path<'a>(value: &'a Option<PathBuf>, field: &str) -> Result<&'a Path> {
    value
        .as_deref()
        .ok_or_else(|| Error::invalid_config(format!("{} is not set", field)))
}

fn resolve(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn resolve_paths(config: &mut StowageConfigFile, base: &Path) {
    let app = &mut config.app;
    resolve(base, &mut app.scripts_folder);
    resolve(base, &mut app.local_backup_folder);
    for path in [
        &mut app.public_key_file,
        &mut app.private_key_file,
        &mut app.private_key_metadata,
    ]
    .into_iter()
    .flatten()
    {
        resolve(base, path);
    }
}

fn validate(config: &StowageConfigFile) -> Result<()> {
    if config.s3.bucket.trim().is_empty() {
        return Err(Error::invalid_config("s3.bucket must not be empty"));
    }
    if config.s3.backup_folder.trim_matches('/').trim().is_empty() {
        return Err(Error::invalid_config("s3.backupFolder must not be empty"));
    }
    if config.s3.access_key_id.is_some() != config.s3.access_key_secret.is_some() {
        return Err(Error::invalid_config(
            "s3.accessKeyId and s3.accessKeySecret must be set together",
        ));
    }

    let mut seen = HashSet::new();
    for definition in &config.backup_definitions {
        if definition.name.trim().is_empty() {
            return Err(Error::invalid_config("backup definition name must not be empty"));
        }
        if !seen.insert(definition.name.as_str()) {
            return Err(Error::invalid_config(format!(
                "duplicate backup definition '{}'",
                definition.name
            )));
        }
        for volume in &definition.volumes {
            if let VolumeRef::Named(name) = volume {
                if name.contains('/') || name.contains('\\') {
                    return Err(Error::invalid_config(format!(
                        "volume '{}' of '{}' must be a volume name or an absolute path",
                        name, definition.name
                    )));
                }
            }
        }
    }

    Ok(())
}

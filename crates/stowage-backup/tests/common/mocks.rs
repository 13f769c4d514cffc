//! Fakes for the side-effecting seams of the pipelines

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use stowage_backup::scripts::output::VolumeBackupReport;
use stowage_backup::scripts::{find_encrypted_files, pass_path};
use stowage_backup::{ContainerRuntime, ExternalScripts};
use stowage_core::types::VolumeRef;
use stowage_core::{Error, Result};
use stowage_storage::{ListPage, MemoryStore, ObjectStore};

/// Ordered record of every fake side effect
#[derive(Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count_prefix(&self, prefix: &str) -> usize {
        self.events().iter().filter(|e| e.starts_with(prefix)).count()
    }

    /// Position of the first event equal to `event`
    pub fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

/// Container runtime that records calls and fails the named containers
pub struct FakeRuntime {
    log: EventLog,
    fail_stop: HashSet<String>,
    fail_start: HashSet<String>,
}

impl FakeRuntime {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            fail_stop: HashSet::new(),
            fail_start: HashSet::new(),
        }
    }

    pub fn failing_stop(mut self, name: &str) -> Self {
        self.fail_stop.insert(name.to_string());
        self
    }

    pub fn failing_start(mut self, name: &str) -> Self {
        self.fail_start.insert(name.to_string());
        self
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn stop(&self, container: &str) -> Result<()> {
        self.log.push(format!("stop {}", container));
        if self.fail_stop.contains(container) {
            return Err(Error::subprocess("docker stop", "exit status: 1", "cannot stop"));
        }
        Ok(())
    }

    async fn start(&self, container: &str) -> Result<()> {
        self.log.push(format!("start {}", container));
        if self.fail_start.contains(container) {
            return Err(Error::subprocess("docker start", "exit status: 1", "cannot start"));
        }
        Ok(())
    }

    async fn reclaim_ownership(&self, dir: &Path) -> Result<()> {
        self.log.push(format!("chown {}", dir.display()));
        Ok(())
    }
}

/// Scripts that write predictable files instead of archiving and encrypting
pub struct FakeScripts {
    log: EventLog,
    archive_size: usize,
    fail_capture: HashSet<String>,
    skip_pass_file: bool,
}

impl FakeScripts {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            archive_size: 64,
            fail_capture: HashSet::new(),
            skip_pass_file: false,
        }
    }

    /// Every captured archive is `bytes` long
    pub fn with_archive_size(mut self, bytes: usize) -> Self {
        self.archive_size = bytes;
        self
    }

    pub fn failing_capture(mut self, volume: &str) -> Self {
        self.fail_capture.insert(volume.to_string());
        self
    }

    /// Encrypt without writing the `.pass` companion
    pub fn without_pass_file(mut self) -> Self {
        self.skip_pass_file = true;
        self
    }
}

/// Archive contents the fake writes for `volume`
pub fn archive_bytes(volume: &str, size: usize) -> Vec<u8> {
    volume.bytes().cycle().take(size).collect()
}

#[async_trait]
impl ExternalScripts for FakeScripts {
    async fn capture_volume(
        &self,
        volume: &VolumeRef,
        archive: &Path,
        compress: bool,
    ) -> Result<VolumeBackupReport> {
        let source = volume.source();
        self.log.push(format!("capture {}", source));
        if self.fail_capture.contains(&source) {
            return Err(Error::subprocess(
                "volume-backup.sh",
                "exit status: 1",
                "no such volume",
            ));
        }

        let bytes = archive_bytes(&source, self.archive_size);
        tokio::fs::write(archive, &bytes).await?;
        Ok(VolumeBackupReport {
            original_size: bytes.len() as u64,
            final_size: bytes.len() as u64,
            compression_ratio: if compress { 1.0 } else { 0.0 },
            time_elapsed_secs: 0.0,
        })
    }

    async fn encrypt(&self, input: &Path, output: &Path) -> Result<()> {
        self.log.push(format!("encrypt {}", file_name(input)));
        tokio::fs::copy(input, output).await?;
        if !self.skip_pass_file {
            tokio::fs::write(pass_path(output), b"wrapped-password").await?;
        }
        Ok(())
    }

    async fn decrypt_folder(&self, dir: &Path, password: &str) -> Result<Vec<PathBuf>> {
        self.log.push(format!("decrypt-folder {}", password));
        let mut decrypted = Vec::new();
        for encrypted in find_encrypted_files(dir) {
            let output = encrypted.with_extension("");
            tokio::fs::copy(&encrypted, &output).await?;
            tokio::fs::remove_file(&encrypted).await?;
            tokio::fs::remove_file(pass_path(&encrypted)).await?;
            decrypted.push(output);
        }
        Ok(decrypted)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// In-memory store that also logs every successful put to an [`EventLog`]
pub struct RecordingStore {
    pub inner: MemoryStore,
    log: EventLog,
}

impl RecordingStore {
    pub fn new(log: EventLog) -> Self {
        Self {
            inner: MemoryStore::new(),
            log,
        }
    }
}

#[async_trait]
impl ObjectStore for RecordingStore {
    fn location(&self) -> String {
        self.inner.location()
    }

    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        self.inner.list_page(prefix, delimiter, continuation).await
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        self.inner.put(local_path, key).await?;
        self.log.push(format!("put {}", key));
        Ok(())
    }

    async fn get(&self, key: &str, local_path: &Path) -> Result<()> {
        self.inner.get(key, local_path).await
    }

    async fn ensure_folder(&self, key: &str) -> Result<()> {
        self.inner.ensure_folder(key).await
    }
}

//! Adapter for the external shell scripts
//!
//! Compression, encryption and key derivation live in scripts under the
//! configured scripts folder. Paths are passed as positional arguments,
//! passwords only ever over stdin. A non-zero exit, a timeout, or missing
//! required output is a hard failure.

pub mod output;

pub use output::{DerivedKey, ScriptOutput, VolumeBackupReport};

use async_trait::async_trait;
use rand::Rng;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use stowage_core::types::VolumeRef;
use stowage_core::{Error, Result, StowageConfig};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const VOLUME_BACKUP: &str = "volume-backup.sh";
pub const VOLUME_RESTORE: &str = "volume-restore.sh";
pub const KEY_GENERATE: &str = "key-generate.sh";
pub const KEY_ENCRYPT: &str = "key-encrypt.sh";
pub const KEY_DECRYPT: &str = "key-decrypt.sh";
pub const KEY_DECRYPT2: &str = "key-decrypt2.sh";
pub const FILE_ENCRYPT: &str = "file-encrypt.sh";
pub const FILE_DECRYPT: &str = "file-decrypt.sh";
pub const DERIVE_KEY: &str = "derive-key.sh";

/// Captured output of a successful script run
#[derive(Debug, Clone, Default)]
pub struct ScriptRun {
    pub stdout: String,
    pub stderr: String,
}

impl ScriptRun {
    pub fn output(&self) -> ScriptOutput {
        ScriptOutput::parse(&self.stdout)
    }
}

/// The script steps the backup and restore pipelines depend on
#[async_trait]
pub trait ExternalScripts: Send + Sync {
    /// Archive `volume` into `archive`
    async fn capture_volume(
        &self,
        volume: &VolumeRef,
        archive: &Path,
        compress: bool,
    ) -> Result<VolumeBackupReport>;

    /// Encrypt `input` to `output` with the public key; the script writes
    /// the companion `<output>.pass`
    async fn encrypt(&self, input: &Path, output: &Path) -> Result<()>;

    /// Decrypt every `.cpt` with a sibling `.pass` under `dir`, deleting
    /// both once decrypted. Returns the decrypted files.
    async fn decrypt_folder(&self, dir: &Path, password: &str) -> Result<Vec<PathBuf>>;
}

/// Runs scripts from a scripts folder
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    scripts_dir: PathBuf,
    timeout: Option<Duration>,
    public_key: Option<PathBuf>,
    private_key: Option<PathBuf>,
}

impl ScriptRunner {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            timeout: None,
            public_key: None,
            private_key: None,
        }
    }

    /// Runner bound to the configured scripts folder, timeout and keys
    pub fn from_config(config: &StowageConfig) -> Self {
        Self {
            scripts_dir: config.scripts_dir().to_path_buf(),
            timeout: config.script_timeout(),
            public_key: config.app().public_key_file.clone(),
            private_key: config.app().private_key_file.clone(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_keys(mut self, public_key: Option<PathBuf>, private_key: Option<PathBuf>) -> Self {
        self.public_key = public_key;
        self.private_key = private_key;
        self
    }

    pub fn scripts_dir(&self) -> &Path {
        &self.scripts_dir
    }

    fn public_key(&self) -> Result<&Path> {
        self.public_key
            .as_deref()
            .ok_or_else(|| Error::invalid_config("app.publicKeyFile is not set"))
    }

    fn private_key(&self) -> Result<&Path> {
        self.private_key
            .as_deref()
            .ok_or_else(|| Error::invalid_config("app.privateKeyFile is not set"))
    }

    /// Run `script` with `args`, writing `stdin` (plus a newline) to it
    pub async fn run(&self, script: &str, args: &[OsString], stdin: Option<&str>) -> Result<ScriptRun> {
        let path = self.scripts_dir.join(script);
        if !path.is_file() {
            return Err(Error::subprocess(
                script,
                "not found",
                path.display().to_string(),
            ));
        }

        debug!("Running script {} ({} args)", path.display(), args.len());

        let mut cmd = Command::new(&path);
        cmd.args(args)
            .current_dir(&self.scripts_dir)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes()).await?;
            pipe.write_all(b"\n").await?;
            pipe.shutdown().await?;
        }

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| Error::subprocess(script, format!("timed out after {:?}", limit), ""))??,
            None => child.wait_with_output().await?,
        };

        let run = ScriptRun {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !output.status.success() {
            let combined = format!("{}{}", run.stdout, run.stderr).trim().to_string();
            return Err(Error::subprocess(script, output.status.to_string(), combined));
        }

        for line in run.stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!("{}: {}", script, line);
        }
        Ok(run)
    }

    pub async fn volume_backup(
        &self,
        volume: &str,
        archive: &Path,
        compress: bool,
    ) -> Result<VolumeBackupReport> {
        let mut args = vec![OsString::from(volume), archive.as_os_str().to_owned()];
        if !compress {
            args.push("--no-compression".into());
        }
        let run = self.run(VOLUME_BACKUP, &args, None).await?;
        let report = VolumeBackupReport::from_output(VOLUME_BACKUP, &run.output())?;
        info!(
            "Captured {} into {} ({} -> {} bytes)",
            volume,
            archive.display(),
            report.original_size,
            report.final_size
        );
        Ok(report)
    }

    pub async fn volume_restore(&self, volume: &str, archive: &Path) -> Result<ScriptRun> {
        let args = [OsString::from(volume), archive.as_os_str().to_owned()];
        self.run(VOLUME_RESTORE, &args, None).await
    }

    pub async fn key_generate(&self) -> Result<ScriptRun> {
        self.run(KEY_GENERATE, &[], None).await
    }

    pub async fn key_encrypt(&self, input: &Path, output: &Path, public_key: &Path) -> Result<ScriptRun> {
        self.run(KEY_ENCRYPT, &path_args(&[input, output, public_key]), None)
            .await
    }

    pub async fn key_decrypt(&self, input: &Path, output: &Path, private_key: &Path) -> Result<ScriptRun> {
        self.run(KEY_DECRYPT, &path_args(&[input, output, private_key]), None)
            .await
    }

    /// Decrypt with a password-protected private key
    pub async fn key_decrypt2(
        &self,
        input: &Path,
        output: &Path,
        encrypted_private_key: &Path,
        password: &str,
    ) -> Result<ScriptRun> {
        self.run(
            KEY_DECRYPT2,
            &path_args(&[input, output, encrypted_private_key]),
            Some(password),
        )
        .await
    }

    pub async fn file_encrypt(&self, input: &Path, output: &Path, password: &str) -> Result<ScriptRun> {
        self.run(FILE_ENCRYPT, &path_args(&[input, output]), Some(password))
            .await
    }

    pub async fn file_decrypt(&self, input: &Path, output: &Path, password: &str) -> Result<ScriptRun> {
        self.run(FILE_DECRYPT, &path_args(&[input, output]), Some(password))
            .await
    }

    /// Derive a key from `password`. A random salt is generated when
    /// iterations are given without one.
    pub async fn derive_key(
        &self,
        password: &str,
        salt: Option<&str>,
        iterations: Option<u32>,
    ) -> Result<DerivedKey> {
        let salt = match (salt, iterations) {
            (Some(s), _) => Some(s.to_string()),
            (None, Some(_)) => Some(random_salt()),
            (None, None) => None,
        };

        let mut args = Vec::new();
        if let Some(salt) = &salt {
            args.push(OsString::from(salt));
            if let Some(n) = iterations {
                args.push(OsString::from(n.to_string()));
            }
        }

        let run = self.run(DERIVE_KEY, &args, Some(password)).await?;
        DerivedKey::from_output(DERIVE_KEY, &run.output())
    }

    /// Decrypt every `.cpt` under `dir` that has a `.pass` sibling, using
    /// the password-protected private key, and delete both afterwards
    pub async fn decrypt_folder_with_key(
        &self,
        dir: &Path,
        encrypted_private_key: &Path,
        password: &str,
    ) -> Result<Vec<PathBuf>> {
        let encrypted = find_encrypted_files(dir);
        let mut decrypted = Vec::with_capacity(encrypted.len());

        for (i, file) in encrypted.iter().enumerate() {
            info!("Decrypting {} of {}: {}", i + 1, encrypted.len(), file.display());
            let output = file.with_extension("");
            self.key_decrypt2(file, &output, encrypted_private_key, password)
                .await?;

            for leftover in [file.clone(), pass_path(file)] {
                if let Err(e) = tokio::fs::remove_file(&leftover).await {
                    warn!("Failed to remove {}: {}", leftover.display(), e);
                }
            }
            decrypted.push(output);
        }

        Ok(decrypted)
    }
}

#[async_trait]
impl ExternalScripts for ScriptRunner {
    async fn capture_volume(
        &self,
        volume: &VolumeRef,
        archive: &Path,
        compress: bool,
    ) -> Result<VolumeBackupReport> {
        self.volume_backup(&volume.source(), archive, compress).await
    }

    async fn encrypt(&self, input: &Path, output: &Path) -> Result<()> {
        let public_key = self.public_key()?;
        self.key_encrypt(input, output, public_key).await?;
        Ok(())
    }

    async fn decrypt_folder(&self, dir: &Path, password: &str) -> Result<Vec<PathBuf>> {
        let private_key = self.private_key()?.to_path_buf();
        self.decrypt_folder_with_key(dir, &private_key, password)
            .await
    }
}

fn path_args(paths: &[&Path]) -> Vec<OsString> {
    paths.iter().map(|p| p.as_os_str().to_owned()).collect()
}

/// `<file>.pass`
pub fn pass_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".pass");
    PathBuf::from(name)
}

/// 8 random bytes as 16 hex characters
pub fn random_salt() -> String {
    let bytes: [u8; 8] = rand::rng().random();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// `.cpt` files under `dir` that have a `.pass` sibling, in path order
pub fn find_encrypted_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "cpt"))
        .filter(|path| pass_path(path).is_file())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_random_salt_is_16_hex_chars() {
        let salt = random_salt();
        assert_eq!(salt.len(), 16);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(salt, random_salt());
    }

    #[test]
    fn test_pass_path() {
        assert_eq!(
            pass_path(Path::new("/tmp/a.tar.gz.cpt")),
            PathBuf::from("/tmp/a.tar.gz.cpt.pass")
        );
    }

    #[test]
    fn test_find_encrypted_files_requires_pass() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        for name in ["a.cpt", "a.cpt.pass", "b.cpt", "c.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::write(nested.join("d.cpt"), b"x").unwrap();
        std::fs::write(nested.join("d.cpt.pass"), b"x").unwrap();

        let found = find_encrypted_files(dir.path());
        assert_eq!(found, vec![dir.path().join("a.cpt"), nested.join("d.cpt")]);
    }

    #[tokio::test]
    async fn test_missing_script_is_subprocess_error() {
        let dir = TempDir::new().unwrap();
        let runner = ScriptRunner::new(dir.path());
        let err = runner.key_generate().await.unwrap_err();
        assert!(matches!(err, Error::Subprocess { .. }));
    }

    #[tokio::test]
    async fn test_encrypt_without_public_key_is_config_error() {
        let dir = TempDir::new().unwrap();
        let runner = ScriptRunner::new(dir.path());
        let err = runner
            .encrypt(Path::new("in"), Path::new("out"))
            .await
            .unwrap_err();
        assert!(err.is_config());
    }
}

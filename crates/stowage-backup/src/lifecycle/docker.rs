//! `docker` CLI runtime

use super::ContainerRuntime;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use stowage_core::{Error, Result};
use tokio::process::Command;
use tracing::{debug, warn};

/// Image used to chown captured archives back to the invoking user
const RECLAIM_IMAGE: &str = "alpine";

/// Runs `docker stop|start <name>`
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    binary: PathBuf,
    timeout: Option<Duration>,
}

impl Default for DockerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerRuntime {
    pub fn new() -> Self {
        Self {
            binary: PathBuf::from("docker"),
            timeout: None,
        }
    }

    /// Use another docker-compatible binary (podman, a test double)
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Upper bound for each stop/start
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the binary can be found on PATH
    pub fn is_available(&self) -> bool {
        which::which(&self.binary).is_ok()
    }

    async fn run(&self, args: &[&str]) -> Result<()> {
        let label = format!("{} {}", self.binary.display(), args.join(" "));
        debug!("Running: {}", label);

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, cmd.output())
                .await
                .map_err(|_| {
                    Error::subprocess(&label, format!("timed out after {:?}", limit), "")
                })??,
            None => cmd.output().await?,
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(Error::subprocess(label, output.status.to_string(), stderr))
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn stop(&self, container: &str) -> Result<()> {
        self.run(&["stop", container]).await
    }

    async fn start(&self, container: &str) -> Result<()> {
        self.run(&["start", container]).await
    }

    #[cfg(unix)]
    async fn reclaim_ownership(&self, dir: &Path) -> Result<()> {
        let owner = process_owner();
        let mount = format!("{}:/backup", dir.display());

        let result = self
            .run(&["run", "--rm", "-v", &mount, RECLAIM_IMAGE, "chown", "-R", &owner, "/backup"])
            .await;
        if let Err(e) = &result {
            warn!("Failed to reclaim ownership of {}: {}", dir.display(), e);
        }
        result
    }
}

/// `uid:gid` of the running process
#[cfg(unix)]
fn process_owner() -> String {
    // SAFETY: getuid and getgid always succeed and take no arguments
    let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
    format!("{}:{}", uid, gid)
}

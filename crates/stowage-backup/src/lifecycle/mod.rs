//! Parallel stop/start of the containers bracketing a backup window
//!
//! Every container of a batch is dispatched at once and the batch waits
//! for all of them. Outcomes are recorded in completion order.
//!
//! - `stop_all` fails with the first failure that completed, since a
//!   half-stopped set must not be captured.
//! - `start_all` fails with every failure so the operator sees all
//!   containers that stayed down.

mod docker;

pub use docker::DockerRuntime;

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use stowage_core::{Error, ResourceFailure, Result};
use tracing::{debug, info, warn};

/// Something that can stop and start named containers
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Runtime name for logs
    fn name(&self) -> &'static str;

    async fn stop(&self, container: &str) -> Result<()>;

    async fn start(&self, container: &str) -> Result<()>;

    /// Give files created by the runtime in `dir` back to the invoking user
    async fn reclaim_ownership(&self, dir: &Path) -> Result<()> {
        let _ = dir;
        Ok(())
    }
}

/// Stop or start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Stop,
    Start,
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleAction::Stop => write!(f, "stop"),
            LifecycleAction::Start => write!(f, "start"),
        }
    }
}

/// Outcome for one container of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOutcome {
    pub name: String,
    /// `None` on success, the failure message otherwise
    pub error: Option<String>,
}

impl ResourceOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-container outcomes of one batch, in completion order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub action: LifecycleAction,
    pub outcomes: Vec<ResourceOutcome>,
}

impl BatchReport {
    pub fn failures(&self) -> Vec<ResourceFailure> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.error.as_ref().map(|message| ResourceFailure {
                    name: o.name.clone(),
                    message: message.clone(),
                })
            })
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ResourceOutcome::succeeded)
    }
}

/// Drives stop/start batches against a runtime
#[derive(Clone)]
pub struct Lifecycle {
    runtime: Arc<dyn ContainerRuntime>,
}

impl Lifecycle {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    pub fn runtime(&self) -> &dyn ContainerRuntime {
        self.runtime.as_ref()
    }

    /// Dispatch `action` for every name concurrently and wait for all
    pub async fn run_batch(&self, action: LifecycleAction, names: &[String]) -> BatchReport {
        let mut pending = FuturesUnordered::new();

        for name in names {
            let runtime = self.runtime.clone();
            pending.push(async move {
                debug!("{} {} via {}", action, name, runtime.name());
                let result = match action {
                    LifecycleAction::Stop => runtime.stop(name).await,
                    LifecycleAction::Start => runtime.start(name).await,
                };
                ResourceOutcome {
                    name: name.clone(),
                    error: result.err().map(|e| e.to_string()),
                }
            });
        }

        let mut outcomes = Vec::with_capacity(names.len());
        while let Some(outcome) = pending.next().await {
            if let Some(error) = &outcome.error {
                warn!("Failed to {} {}: {}", action, outcome.name, error);
            }
            outcomes.push(outcome);
        }

        BatchReport { action, outcomes }
    }

    /// Stop every container; fails with the first completed failure
    pub async fn stop_all(&self, names: &[String]) -> Result<BatchReport> {
        if names.is_empty() {
            return Ok(BatchReport {
                action: LifecycleAction::Stop,
                outcomes: Vec::new(),
            });
        }

        info!("Stopping containers: {}", names.join(", "));
        let report = self.run_batch(LifecycleAction::Stop, names).await;

        match report.failures().into_iter().next() {
            Some(first) => Err(Error::partial_batch("stop", vec![first])),
            None => {
                info!("Stopped {} container(s)", report.outcomes.len());
                Ok(report)
            }
        }
    }

    /// Start every container; fails with every failure
    pub async fn start_all(&self, names: &[String]) -> Result<BatchReport> {
        if names.is_empty() {
            return Ok(BatchReport {
                action: LifecycleAction::Start,
                outcomes: Vec::new(),
            });
        }

        info!("Starting containers: {}", names.join(", "));
        let report = self.run_batch(LifecycleAction::Start, names).await;

        let failures = report.failures();
        if failures.is_empty() {
            info!("Started {} container(s)", report.outcomes.len());
            Ok(report)
        } else {
            Err(Error::partial_batch("start", failures))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Runtime whose per-container behaviour is scripted: an optional delay
    /// and an optional failure.
    #[derive(Default)]
    struct ScriptedRuntime {
        delays: HashMap<String, u64>,
        failing: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRuntime {
        fn failing(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn with_delay(mut self, name: &str, ms: u64) -> Self {
            self.delays.insert(name.to_string(), ms);
            self
        }

        async fn run(&self, verb: &str, name: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("{} {}", verb, name));
            if let Some(ms) = self.delays.get(name) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            if self.failing.iter().any(|f| f == name) {
                return Err(Error::subprocess(
                    format!("docker {} {}", verb, name),
                    "exit status: 1",
                    "No such container",
                ));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContainerRuntime for ScriptedRuntime {
        fn name(&self) -> &'static str {
            "scripted"
        }
        async fn stop(&self, container: &str) -> Result<()> {
            self.run("stop", container).await
        }
        async fn start(&self, container: &str) -> Result<()> {
            self.run("start", container).await
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_start_reports_every_failure() {
        let lifecycle = Lifecycle::new(Arc::new(ScriptedRuntime::failing(&["one", "three"])));
        let err = lifecycle
            .start_all(&names(&["one", "two", "three"]))
            .await
            .unwrap_err();

        match err {
            Error::PartialBatch { action, failures } => {
                assert_eq!(action, "start");
                assert_eq!(failures.len(), 2);
                let mut failed: Vec<_> = failures.iter().map(|f| f.name.as_str()).collect();
                failed.sort();
                assert_eq!(failed, vec!["one", "three"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stop_reports_first_completed_failure() {
        let runtime = ScriptedRuntime::failing(&["a", "c"])
            .with_delay("a", 200)
            .with_delay("b", 50);
        let lifecycle = Lifecycle::new(Arc::new(runtime));

        let err = lifecycle.stop_all(&names(&["a", "b", "c"])).await.unwrap_err();
        match err {
            Error::PartialBatch { failures, .. } => {
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].name, "c");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stop_waits_for_every_container() {
        let runtime = Arc::new(ScriptedRuntime::failing(&["fast"]).with_delay("slow", 100));
        let lifecycle = Lifecycle::new(runtime.clone());

        assert!(lifecycle.stop_all(&names(&["fast", "slow"])).await.is_err());
        assert_eq!(runtime.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_outcomes_in_completion_order() {
        let runtime = ScriptedRuntime::default()
            .with_delay("late", 150)
            .with_delay("early", 10);
        let lifecycle = Lifecycle::new(Arc::new(runtime));

        let report = lifecycle
            .start_all(&names(&["late", "early"]))
            .await
            .unwrap();
        let order: Vec<_> = report.outcomes.iter().map(|o| o.name.as_str()).collect();
        assert_eq!(order, vec!["early", "late"]);
        assert!(report.all_succeeded());
    }

    #[tokio::test]
    async fn test_empty_batch_is_ok() {
        let lifecycle = Lifecycle::new(Arc::new(ScriptedRuntime::default()));
        assert!(lifecycle.stop_all(&[]).await.unwrap().outcomes.is_empty());
        assert!(lifecycle.start_all(&[]).await.unwrap().outcomes.is_empty());
    }
}

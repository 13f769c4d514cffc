//! Backup command
//!
//! Wires the configured store, scripts and docker runtime into the backup
//! orchestrator and prints what reached the bucket.

use anyhow::{anyhow, Context, Result};
use camino::Utf8Path;
use std::sync::Arc;
use stowage_backup::{BackupOrchestrator, BackupSettings, DockerRuntime, Lifecycle, TransferPlanner};
use stowage_core::format_bytes;
use stowage_storage::ObjectStore;
use tabled::{settings::Style, Table, Tabled};

use super::{connect, load_config, scripts};
use crate::cli::BackupArgs;
use crate::output;

#[derive(Tabled)]
struct UploadRow {
    definition: String,
    volume: String,
    key: String,
    size: String,
    parts: String,
}

pub async fn run(args: BackupArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;

    let definitions = match &args.definition {
        Some(name) => vec![config
            .definition(name)
            .cloned()
            .ok_or_else(|| anyhow!("No backup definition named '{}'", name))?],
        None => config.definitions().to_vec(),
    };
    if definitions.is_empty() {
        output::warning("No backup definitions configured");
        return Ok(());
    }

    let runtime = DockerRuntime::new().with_timeout(config.container_timeout());
    if !runtime.is_available() {
        output::warning("docker was not found on PATH; container steps will fail");
    }

    let store = connect(&config).await?;
    let scripts = scripts(&config);
    let planner = TransferPlanner::new(config.max_file_size(), config.upload_policy().clone());
    let mut settings = BackupSettings::from_config(&config);
    settings.partition = args.partition.clone();

    output::header("Backup");
    output::kv("Bucket", &store.location());
    output::kv("Definitions", &definitions.len().to_string());
    output::kv("Max object size", &config.max_file_size().to_string());

    let orchestrator = BackupOrchestrator::new(
        &store,
        &scripts,
        Lifecycle::new(Arc::new(runtime)),
        planner,
        settings,
    );
    let summaries = orchestrator
        .run_all(&definitions)
        .await
        .context("Backup failed")?;

    let mut rows = Vec::new();
    for summary in &summaries {
        for failure in &summary.restart_failures {
            output::warning(&format!(
                "{}: container {} did not restart: {}",
                summary.definition, failure.name, failure.message
            ));
        }
        for upload in &summary.uploads {
            rows.push(UploadRow {
                definition: summary.definition.clone(),
                volume: upload.volume.to_string(),
                key: upload.data_key.clone(),
                size: format_bytes(upload.plan.size()),
                parts: match upload.plan {
                    stowage_backup::TransferPlan::Chunked { part_count, .. } => {
                        part_count.to_string()
                    }
                    stowage_backup::TransferPlan::Direct { .. } => "-".to_string(),
                },
            });
        }
    }

    if !rows.is_empty() {
        let mut table = Table::new(rows);
        table.with(Style::sharp());
        println!("{}", table);
    }

    output::success(&format!("{} backup(s) completed", summaries.len()));
    Ok(())
}

//! Upload command: push a local folder tree into the current partition

use anyhow::{anyhow, Context, Result};
use camino::Utf8Path;
use std::path::PathBuf;
use stowage_backup::TransferPlanner;
use stowage_core::{current_partition, format_bytes};
use stowage_storage::{ObjectStore, RemoteKey};
use walkdir::WalkDir;

use super::{connect, load_config};
use crate::cli::UploadArgs;
use crate::output;

pub async fn run(args: UploadArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;

    let local: PathBuf = match &args.local {
        Some(dir) => dir.as_std_path().to_path_buf(),
        None => config.staging_dir().to_path_buf(),
    };
    if !local.is_dir() {
        return Err(anyhow!("{} is not a folder", local.display()));
    }

    let partition = current_partition(config.frequency());
    let base = RemoteKey::from_parts(config.backup_root(), &partition, &args.folder);

    let mut files: Vec<PathBuf> = WalkDir::new(&local)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();

    if files.is_empty() {
        output::info(&format!("Nothing to upload in {}", local.display()));
        return Ok(());
    }

    let store = connect(&config).await?;
    let planner = TransferPlanner::new(config.max_file_size(), config.upload_policy().clone());

    output::header("Upload");
    output::kv("From", &local.display().to_string());
    output::kv("To", &format!("{}/{}", store.location(), base));

    let mut total = 0u64;
    for file in &files {
        let relative = RemoteKey::relative_to(&local, file)
            .ok_or_else(|| anyhow!("{} has a name that cannot be used as a key", file.display()))?;
        let key = base.join(relative.as_str());

        let report = planner
            .transfer(&store, file, &key)
            .await
            .with_context(|| format!("Failed to upload {}", file.display()))?;
        total += report.plan.size();
        output::success(&format!(
            "{} -> {} ({})",
            relative,
            key,
            format_bytes(report.plan.size())
        ));
    }

    output::success(&format!(
        "Uploaded {} file(s), {}",
        files.len(),
        format_bytes(total)
    ));
    Ok(())
}

//! Restore command
//!
//! Connects the CLI prompts to the restore orchestrator: partition choice,
//! private key password, and a summary of what landed in staging.

use anyhow::{Context, Result};
use camino::Utf8Path;
use dialoguer::Select;
use stowage_backup::{NamedPartition, NewestPartition, PartitionSelector, RestoreOrchestrator};
use stowage_core::{DatePartition, Error};

use super::{connect, load_config, prompt_password, scripts};
use crate::cli::RestoreArgs;
use crate::output;

/// Asks the user to pick a partition, newest first
struct PromptSelector;

impl PartitionSelector for PromptSelector {
    fn select(&self, partitions: &[DatePartition]) -> stowage_core::Result<Option<DatePartition>> {
        let items: Vec<&str> = partitions.iter().map(|p| p.name()).collect();
        let choice = Select::new()
            .with_prompt("Select a backup to restore")
            .items(&items)
            .default(0)
            .interact_opt()
            .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        Ok(choice.map(|i| partitions[i].clone()))
    }
}

pub async fn run(args: RestoreArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = connect(&config).await?;
    let scripts = scripts(&config);

    output::header("Restore");
    output::kv("Staging folder", &config.staging_dir().display().to_string());

    let password = if args.no_decrypt {
        None
    } else {
        config
            .private_key_file()
            .context("Decryption needs app.privateKeyFile; use --no-decrypt to skip it")?;
        match args.password {
            Some(p) => Some(p),
            None => Some(prompt_password("Private key password")?),
        }
    };

    let selector: Box<dyn PartitionSelector> = match (&args.partition, args.latest) {
        (Some(name), _) => Box::new(NamedPartition(name.clone())),
        (None, true) => Box::new(NewestPartition),
        (None, false) => Box::new(PromptSelector),
    };

    let orchestrator = RestoreOrchestrator::from_config(&store, &scripts, &config);
    let Some(summary) = orchestrator
        .run(selector.as_ref(), password.as_deref())
        .await
        .context("Restore failed")?
    else {
        output::info("Restore cancelled");
        return Ok(());
    };

    output::kv("Partition", summary.partition.name());
    for item in &summary.items {
        let form = if item.was_chunked { "joined" } else { "single" };
        output::kv(&item.name, &format!("{} ({})", item.data_file.display(), form));
    }
    for item in &summary.skipped {
        output::warning(&format!(
            "Skipped {}: {} was already restored",
            item.data.key(),
            item.data_file_name()
        ));
    }
    for file in &summary.decrypted {
        output::success(&format!("Decrypted {}", file.display()));
    }

    if summary.items.is_empty() {
        output::warning("The partition holds no complete backups");
    } else {
        output::success(&format!(
            "Restored {} item(s) from {}",
            summary.items.len(),
            summary.partition
        ));
    }
    Ok(())
}

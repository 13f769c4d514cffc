//! List and partitions commands

use anyhow::{Context, Result};
use camino::Utf8Path;
use stowage_core::format_bytes;
use stowage_storage::{partitions_from_prefixes, ObjectStore, RemoteKey};
use tabled::{settings::Style, Table, Tabled};

use super::{connect, load_config};
use crate::cli::ListArgs;
use crate::output;

#[derive(Tabled)]
struct ObjectRow {
    key: String,
    size: String,
    #[tabled(rename = "last modified")]
    last_modified: String,
}

pub async fn run(args: ListArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = connect(&config).await?;

    let spinner = output::spinner(&format!("Listing {}/{}", store.location(), args.prefix));
    let listing = store
        .list(&args.prefix, args.delimiter.as_deref())
        .await
        .context("Failed to list objects")?;
    spinner.finish_and_clear();

    if listing.objects.is_empty() && listing.common_prefixes.is_empty() {
        output::info("No objects found");
        return Ok(());
    }

    let folders = listing.common_prefixes.iter().map(|prefix| ObjectRow {
        key: prefix.clone(),
        size: "PRE".to_string(),
        last_modified: String::new(),
    });
    let objects = listing.objects.iter().map(|object| ObjectRow {
        key: object.key.clone(),
        size: format_bytes(object.size),
        last_modified: object
            .last_modified
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default(),
    });

    let mut table = Table::new(folders.chain(objects));
    table.with(Style::sharp());
    println!("{}", table);

    let total: u64 = listing.objects.iter().map(|o| o.size).sum();
    output::info(&format!(
        "{} object(s), {} folder(s), {}",
        listing.objects.len(),
        listing.common_prefixes.len(),
        format_bytes(total)
    ));
    Ok(())
}

pub async fn partitions(config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let store = connect(&config).await?;

    let root = config.backup_root();
    let listing = store
        .list(&RemoteKey::new(root).as_prefix(), Some("/"))
        .await
        .context("Failed to list backup partitions")?;
    let partitions = partitions_from_prefixes(root, &listing.common_prefixes);

    if partitions.is_empty() {
        output::info(&format!("No backups under {}/{}", store.location(), root));
        return Ok(());
    }

    output::header(&format!("Backups in {}/{}", store.location(), root));
    for partition in &partitions {
        println!("  {}", partition);
    }
    Ok(())
}

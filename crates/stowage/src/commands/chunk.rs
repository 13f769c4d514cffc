//! Split and join commands backed by the native chunker

use anyhow::{Context, Result};
use std::path::PathBuf;
use stowage_backup::chunker;
use stowage_core::{format_bytes, SizeLimit};

use crate::cli::{JoinArgs, SplitArgs};
use crate::output;

pub async fn split(args: SplitArgs) -> Result<()> {
    let limit: SizeLimit = args.size.parse().context("Invalid --size")?;
    let file = args.file.as_std_path().to_path_buf();
    let dir = match &args.output {
        Some(dir) => dir.as_std_path().to_path_buf(),
        None => file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".")),
    };

    let parts = tokio::task::spawn_blocking(move || chunker::split_into(&file, &dir, limit.bytes()))
        .await?
        .with_context(|| format!("Failed to split {}", args.file))?;

    for part in &parts {
        output::kv(&part.file_name(), &format_bytes(part.size));
    }
    output::success(&format!("Split {} into {} part(s)", args.file, parts.len()));
    Ok(())
}

pub async fn join(args: JoinArgs) -> Result<()> {
    let dir = args.dir.as_std_path().to_path_buf();
    let destination = match &args.output {
        Some(path) => path.as_std_path().to_path_buf(),
        None => dir.join(&args.name),
    };
    let name = args.name.clone();
    let target = destination.clone();

    let count = tokio::task::spawn_blocking(move || -> stowage_core::Result<usize> {
        let parts = chunker::discover_parts(&dir, &name)?;
        chunker::join(&parts, &target)?;
        Ok(parts.len())
    })
    .await?
    .with_context(|| format!("Failed to join parts of {}", args.name))?;

    output::success(&format!(
        "Joined {} part(s) into {}",
        count,
        destination.display()
    ));
    Ok(())
}

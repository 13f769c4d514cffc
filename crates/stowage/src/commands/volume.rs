//! Volume archive commands

use anyhow::{Context, Result};
use camino::Utf8Path;
use stowage_core::format_bytes;

use super::{load_config, scripts};
use crate::cli::VolumeCommands;
use crate::output;

pub async fn run(cmd: VolumeCommands, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let runner = scripts(&config);

    match cmd {
        VolumeCommands::Backup {
            volume,
            archive,
            no_compression,
        } => {
            let report = runner
                .volume_backup(&volume, archive.as_std_path(), !no_compression)
                .await
                .with_context(|| format!("Failed to archive volume {}", volume))?;
            output::kv("Original size", &format_bytes(report.original_size));
            output::kv("Final size", &format_bytes(report.final_size));
            output::kv("Compression ratio", &format!("{:.2}", report.compression_ratio));
            output::kv("Time elapsed", &format!("{:.1}s", report.time_elapsed_secs));
            output::success(&format!("Archived {} into {}", volume, archive));
        }
        VolumeCommands::Restore { volume, archive } => {
            runner
                .volume_restore(&volume, archive.as_std_path())
                .await
                .with_context(|| format!("Failed to restore volume {}", volume))?;
            output::success(&format!("Restored {} from {}", volume, archive));
        }
    }
    Ok(())
}

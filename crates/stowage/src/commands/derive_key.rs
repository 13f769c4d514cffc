//! Key derivation command

use anyhow::{Context, Result};
use camino::Utf8Path;

use super::{load_config, prompt_password, scripts};
use crate::cli::DeriveKeyArgs;
use crate::output;

pub async fn run(args: DeriveKeyArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let password = prompt_password("Password")?;

    let derived = scripts(&config)
        .derive_key(&password, args.salt.as_deref(), args.iterations)
        .await
        .context("Key derivation failed")?;

    output::kv("Salt", &derived.salt);
    output::kv("Iterations", &derived.iterations);
    output::kv("Key", &derived.key);
    output::kv("Time taken", &derived.time_taken);
    Ok(())
}

//! Key pair commands

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::path::{Path, PathBuf};
use stowage_core::StowageConfig;

use super::{load_config, prompt_password, scripts};
use crate::cli::KeyCommands;
use crate::output;

/// Explicit key path, else the one from configuration
fn key_path(
    explicit: Option<Utf8PathBuf>,
    configured: stowage_core::Result<&Path>,
) -> Result<PathBuf> {
    match explicit {
        Some(path) => Ok(path.into_std_path_buf()),
        None => Ok(configured?.to_path_buf()),
    }
}

fn private_key(config: &StowageConfig, explicit: Option<Utf8PathBuf>) -> Result<PathBuf> {
    key_path(explicit, config.private_key_file()).context("No private key given")
}

pub async fn run(cmd: KeyCommands, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let runner = scripts(&config);

    match cmd {
        KeyCommands::Generate => {
            let run = runner.key_generate().await.context("Key generation failed")?;
            for line in run.stdout.lines().filter(|l| !l.trim().is_empty()) {
                output::info(line);
            }
            output::success("Key pair generated");
        }
        KeyCommands::Encrypt {
            input,
            output: out,
            public_key,
        } => {
            let key = key_path(public_key, config.public_key_file()).context("No public key given")?;
            runner
                .key_encrypt(input.as_std_path(), out.as_std_path(), &key)
                .await
                .with_context(|| format!("Failed to encrypt {}", input))?;
            output::success(&format!("Encrypted {} -> {}", input, out));
        }
        KeyCommands::Decrypt {
            input,
            output: out,
            private_key: explicit,
        } => {
            let key = private_key(&config, explicit)?;
            runner
                .key_decrypt(input.as_std_path(), out.as_std_path(), &key)
                .await
                .with_context(|| format!("Failed to decrypt {}", input))?;
            output::success(&format!("Decrypted {} -> {}", input, out));
        }
        KeyCommands::Decrypt2 {
            input,
            output: out,
            private_key: explicit,
        } => {
            let key = private_key(&config, explicit)?;
            let password = prompt_password("Private key password")?;
            runner
                .key_decrypt2(input.as_std_path(), out.as_std_path(), &key, &password)
                .await
                .with_context(|| format!("Failed to decrypt {}", input))?;
            output::success(&format!("Decrypted {} -> {}", input, out));
        }
        KeyCommands::DecryptFolder { dir } => {
            let key = private_key(&config, None)?;
            let password = prompt_password("Private key password")?;
            let decrypted = runner
                .decrypt_folder_with_key(dir.as_std_path(), &key, &password)
                .await
                .with_context(|| format!("Failed to decrypt files in {}", dir))?;
            for file in &decrypted {
                output::kv("Decrypted", &file.display().to_string());
            }
            if decrypted.is_empty() {
                output::info(&format!("No encrypted files with pass files in {}", dir));
            } else {
                output::success(&format!("Decrypted {} file(s)", decrypted.len()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::Error;

    #[test]
    fn test_explicit_key_wins_over_config() {
        let path = key_path(
            Some(Utf8PathBuf::from("/keys/explicit.pem")),
            Err(Error::invalid_config("unset")),
        )
        .unwrap();
        assert_eq!(path, PathBuf::from("/keys/explicit.pem"));
    }

    #[test]
    fn test_missing_key_is_an_error() {
        assert!(key_path(None, Err(Error::invalid_config("unset"))).is_err());
        assert_eq!(
            key_path(None, Ok(Path::new("/keys/public.pem"))).unwrap(),
            PathBuf::from("/keys/public.pem")
        );
    }
}

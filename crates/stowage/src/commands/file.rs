//! Password-based file encryption commands

use anyhow::{Context, Result};
use camino::Utf8Path;

use super::{load_config, prompt_new_password, prompt_password, scripts};
use crate::cli::FileCommands;
use crate::output;

pub async fn run(cmd: FileCommands, config_path: Option<&Utf8Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let runner = scripts(&config);

    match cmd {
        FileCommands::Encrypt { input, output: out } => {
            let password = prompt_new_password("Password")?;
            runner
                .file_encrypt(input.as_std_path(), out.as_std_path(), &password)
                .await
                .with_context(|| format!("Failed to encrypt {}", input))?;
            output::success(&format!("Encrypted {} -> {}", input, out));
        }
        FileCommands::Decrypt { input, output: out } => {
            let password = prompt_password("Password")?;
            runner
                .file_decrypt(input.as_std_path(), out.as_std_path(), &password)
                .await
                .with_context(|| format!("Failed to decrypt {}", input))?;
            output::success(&format!("Decrypted {} -> {}", input, out));
        }
    }
    Ok(())
}

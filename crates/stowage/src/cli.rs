//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Stowage - container volume backups to S3-compatible storage
#[derive(Parser, Debug)]
#[command(name = "stowage")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the configuration file (falls back to $S3CONFIGFILE)
    #[arg(short, long, global = true)]
    pub config: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run backup definitions
    Backup(BackupArgs),

    /// Download, join and decrypt a backup partition
    Restore(RestoreArgs),

    /// List objects in the bucket
    List(ListArgs),

    /// List backup partitions, newest first
    Partitions,

    /// Upload a local folder into the current partition
    Upload(UploadArgs),

    /// Split a file into size-bounded parts
    Split(SplitArgs),

    /// Join parts back into a file
    Join(JoinArgs),

    /// Volume archive scripts
    #[command(subcommand)]
    Volume(VolumeCommands),

    /// Key pair scripts
    #[command(subcommand)]
    Key(KeyCommands),

    /// Password-based file encryption scripts
    #[command(subcommand)]
    File(FileCommands),

    /// Derive a key from a password
    DeriveKey(DeriveKeyArgs),
}

#[derive(Args, Debug)]
pub struct BackupArgs {
    /// Run only this backup definition
    #[arg(short, long)]
    pub definition: Option<String>,

    /// Write into this partition instead of the current one
    #[arg(long)]
    pub partition: Option<String>,
}

#[derive(Args, Debug)]
pub struct RestoreArgs {
    /// Partition to restore (prompts when omitted)
    #[arg(short, long, conflicts_with = "latest")]
    pub partition: Option<String>,

    /// Restore the newest partition without prompting
    #[arg(long)]
    pub latest: bool,

    /// Leave downloaded files encrypted
    #[arg(long)]
    pub no_decrypt: bool,

    /// Private key password (prompts when omitted)
    #[arg(long, env = "STOWAGE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Key prefix to list under
    #[arg(short, long, default_value = "")]
    pub prefix: String,

    /// Group keys by this delimiter
    #[arg(short, long)]
    pub delimiter: Option<String>,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    /// Local folder to upload (defaults to the local backup folder)
    #[arg(short, long)]
    pub local: Option<Utf8PathBuf>,

    /// Folder inside the partition to upload into
    #[arg(short, long, default_value = "")]
    pub folder: String,
}

#[derive(Args, Debug)]
pub struct SplitArgs {
    /// File to split
    pub file: Utf8PathBuf,

    /// Maximum part size, e.g. 100M or 1G
    #[arg(short, long, default_value = "100M")]
    pub size: String,

    /// Folder to write parts into (defaults to the file's folder)
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,
}

#[derive(Args, Debug)]
pub struct JoinArgs {
    /// Folder holding the parts
    pub dir: Utf8PathBuf,

    /// Original file name the parts were split from
    pub name: String,

    /// Joined file (defaults to <dir>/<name>)
    #[arg(short, long)]
    pub output: Option<Utf8PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum VolumeCommands {
    /// Archive a docker volume
    Backup {
        volume: String,
        archive: Utf8PathBuf,
        /// Store the archive uncompressed
        #[arg(long)]
        no_compression: bool,
    },

    /// Restore a docker volume from an archive
    Restore { volume: String, archive: Utf8PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum KeyCommands {
    /// Generate a key pair
    Generate,

    /// Encrypt a file with the public key
    Encrypt {
        input: Utf8PathBuf,
        output: Utf8PathBuf,
        /// Public key (defaults to app.publicKeyFile)
        #[arg(long)]
        public_key: Option<Utf8PathBuf>,
    },

    /// Decrypt a file with the private key
    Decrypt {
        input: Utf8PathBuf,
        output: Utf8PathBuf,
        /// Private key (defaults to app.privateKeyFile)
        #[arg(long)]
        private_key: Option<Utf8PathBuf>,
    },

    /// Decrypt a file with a password-protected private key
    Decrypt2 {
        input: Utf8PathBuf,
        output: Utf8PathBuf,
        /// Encrypted private key (defaults to app.privateKeyFile)
        #[arg(long)]
        private_key: Option<Utf8PathBuf>,
    },

    /// Decrypt every .cpt file with a .pass sibling under a folder
    DecryptFolder {
        dir: Utf8PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum FileCommands {
    /// Encrypt a file with a password
    Encrypt { input: Utf8PathBuf, output: Utf8PathBuf },

    /// Decrypt a file with a password
    Decrypt { input: Utf8PathBuf, output: Utf8PathBuf },
}

#[derive(Args, Debug)]
pub struct DeriveKeyArgs {
    /// Salt (random when --iterations is given without one)
    #[arg(long)]
    pub salt: Option<String>,

    /// PBKDF2 iterations
    #[arg(long)]
    pub iterations: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_restore_flags() {
        let cli = Cli::try_parse_from([
            "stowage",
            "-c",
            "/etc/stowage.yaml",
            "restore",
            "--partition",
            "2024-01-02",
            "--no-decrypt",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref().map(|p| p.as_str()), Some("/etc/stowage.yaml"));
        match cli.command {
            Commands::Restore(args) => {
                assert_eq!(args.partition.as_deref(), Some("2024-01-02"));
                assert!(args.no_decrypt);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_partition_conflicts_with_latest() {
        let err = Cli::try_parse_from(["stowage", "restore", "--partition", "x", "--latest"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_key_subcommands_parse() {
        let cli = Cli::try_parse_from(["stowage", "key", "decrypt-folder", "/tmp/staging"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Key(KeyCommands::DecryptFolder { .. })
        ));

        let cli = Cli::try_parse_from(["stowage", "derive-key", "--iterations", "1000"]).unwrap();
        match cli.command {
            Commands::DeriveKey(args) => {
                assert_eq!(args.iterations, Some(1000));
                assert!(args.salt.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}

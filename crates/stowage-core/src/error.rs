//! Error types for stowage-core

use thiserror::Error;

/// Result type alias using stowage-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// A single resource that failed inside a lifecycle batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceFailure {
    /// Resource (container) name
    pub name: String,
    /// Failure description reported by the runtime
    pub message: String,
}

impl std::fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

fn join_failures(failures: &[ResourceFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Error taxonomy shared by every stowage crate
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration present but unusable
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// Human-readable size could not be parsed
    #[error("Invalid size '{value}': {reason}")]
    InvalidSize { value: String, reason: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network or authentication failure talking to the object store
    #[error("Object store {operation} failed for '{key}': {message}")]
    Transport {
        operation: String,
        key: String,
        message: String,
    },

    /// Requested object or bucket does not exist
    #[error("Object not found: {key}")]
    NotFound { key: String },

    /// A part set is missing an index
    #[error("Part set for '{file}' is incomplete: part {missing} is missing")]
    SequenceGap { file: String, missing: u32 },

    /// External script exited unsuccessfully
    #[error("Script {script} failed ({status})\nOutput: {output}")]
    Subprocess {
        script: String,
        status: String,
        output: String,
    },

    /// External script succeeded but its output could not be used
    #[error("Script {script} produced unusable output: {message}")]
    ScriptOutput { script: String, message: String },

    /// One or more resources in a lifecycle batch failed
    #[error(
        "Failed to {action} {} resource(s): {}",
        .failures.len(),
        join_failures(.failures)
    )]
    PartialBatch {
        action: String,
        failures: Vec<ResourceFailure>,
    },

    /// A chunked upload stopped part-way; `pending` parts are still on disk
    #[error("Upload of '{file}' stopped at part {failed_part} ({} uploaded, {} pending): {source}", .uploaded.len(), .pending.len())]
    PartialUpload {
        file: String,
        uploaded: Vec<u32>,
        pending: Vec<u32>,
        failed_part: u32,
        source: Box<Error>,
    },
}

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an invalid size error
    pub fn invalid_size(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSize {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport(
        operation: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Transport {
            operation: operation.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a sequence gap error
    pub fn sequence_gap(file: impl Into<String>, missing: u32) -> Self {
        Self::SequenceGap {
            file: file.into(),
            missing,
        }
    }

    /// Create a subprocess error
    pub fn subprocess(
        script: impl Into<String>,
        status: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Self::Subprocess {
            script: script.into(),
            status: status.into(),
            output: output.into(),
        }
    }

    /// Create a script output error
    pub fn script_output(script: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ScriptOutput {
            script: script.into(),
            message: message.into(),
        }
    }

    /// Create a partial batch error
    pub fn partial_batch(action: impl Into<String>, failures: Vec<ResourceFailure>) -> Self {
        Self::PartialBatch {
            action: action.into(),
            failures,
        }
    }

    /// Whether a caller may retry the failed operation unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. })
    }

    /// Whether this is a configuration problem
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. }
                | Error::InvalidConfig { .. }
                | Error::YamlParse(_)
                | Error::InvalidSize { .. }
        )
    }
}

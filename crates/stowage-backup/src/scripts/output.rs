//! Parsing of external script stdout
//!
//! Scripts report results either as `Label: value` lines or as a single
//! JSON object on the final non-empty line. Labels are compared after
//! lowercasing and dropping everything but letters and digits, so
//! `Original size`, `original_size` and `originalSize` are the same field.

use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use stowage_core::{Error, Result};

fn normalize_label(label: &str) -> String {
    label
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Fields reported by one script run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptOutput {
    fields: HashMap<String, String>,
}

impl ScriptOutput {
    /// Parse stdout. A JSON object on the final line wins over label lines.
    pub fn parse(stdout: &str) -> Self {
        if let Some(fields) = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .and_then(parse_json_line)
        {
            return Self { fields };
        }

        let mut fields = HashMap::new();
        for line in stdout.lines() {
            if let Some((label, value)) = line.split_once(": ") {
                let key = normalize_label(label);
                if !key.is_empty() {
                    fields.insert(key, value.trim().to_string());
                }
            }
        }
        Self { fields }
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.fields.get(&normalize_label(label)).map(String::as_str)
    }

    /// A field that must be present and non-empty
    pub fn require(&self, script: &str, label: &str) -> Result<&str> {
        match self.get(label) {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(Error::script_output(
                script,
                format!("missing '{}' in output", label),
            )),
        }
    }

    /// First whitespace-separated token of a field, parsed
    /// (`"1024 bytes"` -> `1024`)
    pub fn leading<T: FromStr>(&self, label: &str) -> Option<T> {
        self.get(label)?.split_whitespace().next()?.parse().ok()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn parse_json_line(line: &str) -> Option<HashMap<String, String>> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    let Value::Object(map) = serde_json::from_str::<Value>(trimmed).ok()? else {
        return None;
    };

    Some(
        map.into_iter()
            .filter_map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((normalize_label(&k), value))
            })
            .collect(),
    )
}

/// Statistics reported by `volume-backup.sh`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct VolumeBackupReport {
    pub original_size: u64,
    pub final_size: u64,
    pub compression_ratio: f64,
    pub time_elapsed_secs: f64,
}

impl VolumeBackupReport {
    /// `Final size` is required; the other fields default to zero
    pub fn from_output(script: &str, output: &ScriptOutput) -> Result<Self> {
        let final_size = output
            .leading::<u64>("Final size")
            .ok_or_else(|| Error::script_output(script, "missing or invalid 'Final size'"))?;

        Ok(Self {
            original_size: output.leading("Original size").unwrap_or(0),
            final_size,
            compression_ratio: output.leading("Compression ratio").unwrap_or(0.0),
            time_elapsed_secs: output.leading("Time elapsed").unwrap_or(0.0),
        })
    }
}

/// Result of `derive-key.sh`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub salt: String,
    pub iterations: String,
    pub key: String,
    pub time_taken: String,
}

impl DerivedKey {
    /// `Key` is required
    pub fn from_output(script: &str, output: &ScriptOutput) -> Result<Self> {
        let key = output.require(script, "Key")?.to_string();
        Ok(Self {
            salt: output.get("Salt").unwrap_or_default().to_string(),
            iterations: output.get("Iterations").unwrap_or_default().to_string(),
            key,
            time_taken: output.get("Time taken").unwrap_or_default().to_string(),
        })
    }
}

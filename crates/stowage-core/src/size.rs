//! Human-readable byte sizes ("10M", "1G") and the upload size limit

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;
const TB: u64 = 1024 * GB;

/// Parse a size string such as `"512K"`, `"10M"`, `"1GB"`, `"2GiB"` or
/// `"1048576"` into bytes. Units are binary (powers of 1024) and
/// case-insensitive.
pub fn parse_size(input: &str) -> Result<u64> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(Error::invalid_size(input, "empty value"));
    }

    let upper = trimmed.to_ascii_uppercase();
    let unit_start = upper
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(upper.len());
    let (digits, unit) = upper.split_at(unit_start);

    if digits.is_empty() {
        return Err(Error::invalid_size(input, "missing numeric value"));
    }

    let multiplier = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => KB,
        "M" | "MB" | "MIB" => MB,
        "G" | "GB" | "GIB" => GB,
        "T" | "TB" | "TIB" => TB,
        other => {
            return Err(Error::invalid_size(
                input,
                format!("unknown unit '{}', expected K, M, G or T", other),
            ))
        }
    };

    let value: u64 = digits
        .parse()
        .map_err(|e| Error::invalid_size(input, format!("{}", e)))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::invalid_size(input, "value overflows 64 bits"))
}

/// Format bytes as a human-readable string
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= GB {
        format!("{:.1}GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}KB", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

/// Maximum object size accepted by the store, always greater than zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSize", into = "u64")]
pub struct SizeLimit(u64);

impl SizeLimit {
    /// Create a limit from a byte count
    pub fn new(bytes: u64) -> Result<Self> {
        if bytes == 0 {
            return Err(Error::invalid_size("0", "size limit must be greater than zero"));
        }
        Ok(Self(bytes))
    }

    /// Limit in bytes
    pub fn bytes(&self) -> u64 {
        self.0
    }

    /// Whether a file of `size` bytes must be split before upload
    pub fn exceeded_by(&self, size: u64) -> bool {
        size > self.0
    }

    /// Number of parts a file of `size` bytes splits into
    pub fn part_count(&self, size: u64) -> u64 {
        size.div_ceil(self.0)
    }
}

impl FromStr for SizeLimit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = parse_size(s)?;
        if bytes == 0 {
            return Err(Error::invalid_size(s, "size limit must be greater than zero"));
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_bytes(self.0))
    }
}

impl From<SizeLimit> for u64 {
    fn from(limit: SizeLimit) -> Self {
        limit.0
    }
}

/// Sizes may be written as strings ("100M") or plain byte counts in YAML.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
    Bytes(u64),
    Text(String),
}

impl TryFrom<RawSize> for SizeLimit {
    type Error = Error;

    fn try_from(raw: RawSize) -> Result<Self> {
        match raw {
            RawSize::Bytes(bytes) => SizeLimit::new(bytes),
            RawSize::Text(text) => text.parse(),
        }
    }
}

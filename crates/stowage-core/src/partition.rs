//! Date partition naming for the remote backup layout

use chrono::{DateTime, Datelike, Local, NaiveDateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// How often a new top-level partition is started under the backup root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackupFrequency {
    #[default]
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "hourly")]
    Hourly,
    #[serde(rename = "4hourly")]
    FourHourly,
}

impl fmt::Display for BackupFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupFrequency::Daily => "daily",
            BackupFrequency::Weekly => "weekly",
            BackupFrequency::Hourly => "hourly",
            BackupFrequency::FourHourly => "4hourly",
        };
        f.write_str(s)
    }
}

/// Partition name for a point in time.
///
/// - daily: `2024-01-31`
/// - weekly: `2024-W05` (ISO week and ISO week-year)
/// - hourly: `2024-01-31-07`
/// - 4hourly: `2024-01-31-04` (hour rounded down to a multiple of 4)
pub fn partition_for<Tz: TimeZone>(at: &DateTime<Tz>, frequency: BackupFrequency) -> String {
    naive_partition(&at.naive_local(), frequency)
}

fn naive_partition(at: &NaiveDateTime, frequency: BackupFrequency) -> String {
    let day = at.format("%Y-%m-%d");
    match frequency {
        BackupFrequency::Daily => day.to_string(),
        BackupFrequency::Weekly => {
            let week = at.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        BackupFrequency::Hourly => format!("{}-{:02}", day, at.hour()),
        BackupFrequency::FourHourly => format!("{}-{:02}", day, (at.hour() / 4) * 4),
    }
}

/// Partition name for the current local time
pub fn current_partition(frequency: BackupFrequency) -> String {
    partition_for(&Local::now(), frequency)
}

/// A top-level prefix under the backup root, as observed in a listing.
///
/// Ordering is descending by name so that sorting a list puts the newest
/// partition first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatePartition {
    name: String,
}

impl DatePartition {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for DatePartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Ord for DatePartition {
    fn cmp(&self, other: &Self) -> Ordering {
        other.name.cmp(&self.name)
    }
}

impl PartialOrd for DatePartition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

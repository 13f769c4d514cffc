//! Splitting files into size-bounded parts and joining them back
//!
//! Parts are named `<original>.part<N>` with `N` starting at 1 and no
//! zero padding. Ordering always uses the parsed index, never the name.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use stowage_core::{Error, Result};
use tracing::{debug, info};

/// One piece of a split file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub path: PathBuf,
    /// 1-based position in the original file
    pub index: u32,
    pub size: u64,
}

impl Part {
    /// File name of the part (`<original>.part<N>`)
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// `<base>.part<index>`
pub fn part_file_name(base: &str, index: u32) -> String {
    format!("{}.part{}", base, index)
}

/// Index of `file_name` if it is a part of `base`
pub fn parse_part_index(file_name: &str, base: &str) -> Option<u32> {
    let digits = file_name.strip_prefix(base)?.strip_prefix(".part")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn base_name(file: &Path) -> Result<String> {
    file.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a file path: {}", file.display()),
            ))
        })
}

/// Split `file` into parts written next to it
pub fn split(file: &Path, max_part_size: u64) -> Result<Vec<Part>> {
    let dir = file.parent().unwrap_or_else(|| Path::new("."));
    split_into(file, dir, max_part_size)
}

/// Split `file` into parts of at most `max_part_size` bytes written into
/// `dir`. Every part but the last is exactly `max_part_size` bytes; an
/// empty file yields a single empty part so it still joins back.
pub fn split_into(file: &Path, dir: &Path, max_part_size: u64) -> Result<Vec<Part>> {
    if max_part_size == 0 {
        return Err(Error::invalid_size("0", "part size must be greater than zero"));
    }

    let base = base_name(file)?;
    let total = fs::metadata(file)?.len();
    let count = u32::try_from(total.div_ceil(max_part_size).max(1)).map_err(|_| {
        Error::invalid_size(
            max_part_size.to_string(),
            format!("{} bytes would need more than {} parts", total, u32::MAX),
        )
    })?;

    fs::create_dir_all(dir)?;
    let mut reader = BufReader::new(File::open(file)?);
    let mut parts = Vec::with_capacity(count as usize);
    let mut remaining = total;

    for index in 1..=count {
        let want = remaining.min(max_part_size);
        let path = dir.join(part_file_name(&base, index));
        let mut writer = BufWriter::new(File::create(&path)?);

        let copied = io::copy(&mut reader.by_ref().take(want), &mut writer)?;
        writer.flush()?;
        if copied != want {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} shrank while being split", file.display()),
            )));
        }

        remaining -= copied;
        parts.push(Part {
            path,
            index,
            size: copied,
        });
    }

    info!(
        "Split {} ({} bytes) into {} part(s)",
        file.display(),
        total,
        parts.len()
    );
    Ok(parts)
}

/// Parts of `base_name` found in `dir`, ordered by index
pub fn discover_parts(dir: &Path, base_name: &str) -> Result<Vec<Part>> {
    let mut parts = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(index) = name.to_str().and_then(|n| parse_part_index(n, base_name)) else {
            continue;
        };
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        parts.push(Part {
            path: entry.path(),
            index,
            size: metadata.len(),
        });
    }

    parts.sort_by_key(|p| p.index);
    Ok(parts)
}

/// Check that `parts`, once sorted, are numbered exactly `1..=n`
pub fn validate_sequence(parts: &[Part], label: &str) -> Result<Vec<Part>> {
    let mut sorted = parts.to_vec();
    sorted.sort_by_key(|p| p.index);

    if sorted.is_empty() {
        return Err(Error::sequence_gap(label, 1));
    }
    for (position, part) in sorted.iter().enumerate() {
        let expected = position as u32 + 1;
        if part.index != expected {
            return Err(Error::sequence_gap(label, expected));
        }
    }
    Ok(sorted)
}

/// Concatenate `parts` in index order into `destination`.
///
/// The destination must not exist. Each part is deleted once its bytes
/// are synced to the destination, so a failure leaves every unconsumed
/// part on disk.
pub fn join(parts: &[Part], destination: &Path) -> Result<()> {
    let label = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| destination.display().to_string());
    let sorted = validate_sequence(parts, &label)?;

    let mut output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    let mut total = 0u64;
    for part in &sorted {
        let mut input = File::open(&part.path)?;
        total += io::copy(&mut input, &mut output)?;
        output.sync_data()?;
        fs::remove_file(&part.path)?;
        debug!("Joined and removed {}", part.path.display());
    }

    info!(
        "Joined {} part(s) into {} ({} bytes)",
        sorted.len(),
        destination.display(),
        total
    );
    Ok(())
}

//! In-process object store
//!
//! Keeps objects in a sorted map and mirrors S3 listing semantics
//! (lexicographic order, delimiter grouping, paging). Faults can be armed
//! per key to exercise retry and partial-failure paths, and every `put` is
//! counted per key.

use crate::gateway::{ListPage, ObjectInfo, ObjectStore};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use stowage_core::{Error, Result};
use tracing::debug;

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, Vec<u8>>,
    put_counts: HashMap<String, u32>,
    put_faults: HashMap<String, u32>,
    get_faults: HashMap<String, u32>,
    list_faults: u32,
}

/// Object store held entirely in memory
#[derive(Debug)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }

    /// Listing pages hold at most `page_size` entries (objects plus prefixes)
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            page_size: page_size.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store an object directly
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.lock().objects.insert(key.into(), data.into());
    }

    /// Contents of an object
    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().objects.contains_key(key)
    }

    /// Every stored key in lexicographic order
    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// Number of `put` calls that reached `key`, failed ones included
    pub fn put_count(&self, key: &str) -> u32 {
        self.lock().put_counts.get(key).copied().unwrap_or(0)
    }

    /// Make the next `times` uploads to `key` fail with a transport error
    pub fn fail_puts(&self, key: impl Into<String>, times: u32) {
        self.lock().put_faults.insert(key.into(), times);
    }

    /// Make the next `times` downloads of `key` fail with a transport error
    pub fn fail_gets(&self, key: impl Into<String>, times: u32) {
        self.lock().get_faults.insert(key.into(), times);
    }

    /// Make the next `times` listing pages fail with a transport error
    pub fn fail_lists(&self, times: u32) {
        self.lock().list_faults = times;
    }
}

fn take_fault(faults: &mut HashMap<String, u32>, key: &str) -> bool {
    match faults.get_mut(key) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

enum Entry {
    Object(ObjectInfo),
    Prefix(String),
}

impl Entry {
    fn sort_key(&self) -> &str {
        match self {
            Entry::Object(info) => &info.key,
            Entry::Prefix(prefix) => prefix,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn location(&self) -> String {
        "memory://".to_string()
    }

    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let mut inner = self.lock();
        if inner.list_faults > 0 {
            inner.list_faults -= 1;
            return Err(Error::transport("list", prefix, "injected fault"));
        }

        let start = match continuation {
            Some(token) => token.parse::<usize>().map_err(|_| {
                Error::transport("list", prefix, format!("invalid continuation token '{}'", token))
            })?,
            None => 0,
        };

        let mut objects = Vec::new();
        let mut prefixes = BTreeSet::new();
        for (key, data) in inner.objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            match delimiter.and_then(|d| rest.find(d).map(|idx| idx + d.len())) {
                Some(end) => {
                    prefixes.insert(format!("{}{}", prefix, &rest[..end]));
                }
                None => objects.push(ObjectInfo::new(key.clone(), data.len() as u64)),
            }
        }

        let mut entries: Vec<Entry> = objects
            .into_iter()
            .map(Entry::Object)
            .chain(prefixes.into_iter().map(Entry::Prefix))
            .collect();
        entries.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));

        let end = (start + self.page_size).min(entries.len());
        let next_token = (end < entries.len()).then(|| end.to_string());

        let mut page = ListPage {
            next_token,
            ..ListPage::default()
        };
        for entry in entries.into_iter().skip(start).take(end.saturating_sub(start)) {
            match entry {
                Entry::Object(info) => page.objects.push(info),
                Entry::Prefix(p) => page.common_prefixes.push(p),
            }
        }
        Ok(page)
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        let data = tokio::fs::read(local_path).await?;

        let mut inner = self.lock();
        *inner.put_counts.entry(key.to_string()).or_insert(0) += 1;
        if take_fault(&mut inner.put_faults, key) {
            return Err(Error::transport("put", key, "injected fault"));
        }

        debug!("memory: stored {} ({} bytes)", key, data.len());
        inner.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn get(&self, key: &str, local_path: &Path) -> Result<()> {
        let data = {
            let mut inner = self.lock();
            if take_fault(&mut inner.get_faults, key) {
                return Err(Error::transport("get", key, "injected fault"));
            }
            inner
                .objects
                .get(key)
                .cloned()
                .ok_or_else(|| Error::not_found(key))?
        };

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }

    async fn ensure_folder(&self, key: &str) -> Result<()> {
        let marker = format!("{}/", key.trim_end_matches('/'));
        self.lock().objects.insert(marker, Vec::new());
        Ok(())
    }
}

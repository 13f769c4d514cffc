//! Object store abstraction

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use stowage_core::Result;
use tracing::debug;

/// A single object as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectInfo {
    pub fn new(key: impl Into<String>, size: u64) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified: None,
        }
    }
}

/// One page of a listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub objects: Vec<ObjectInfo>,
    pub common_prefixes: Vec<String>,
    /// Token for the next page; `None` when the listing is complete
    pub next_token: Option<String>,
}

/// A complete listing, all pages merged in store order
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub objects: Vec<ObjectInfo>,
    pub common_prefixes: Vec<String>,
}

impl Listing {
    /// Keys of every listed object
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.objects.iter().map(|o| o.key.as_str())
    }
}

/// Storage backend holding backup artifacts.
///
/// Implementations never retry; `Transport` errors are left for the caller
/// to retry.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable location, e.g. `s3://bucket`
    fn location(&self) -> String;

    /// Fetch a single page of objects under `prefix`
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<String>,
    ) -> Result<ListPage>;

    /// List everything under `prefix`, following continuation tokens
    async fn list(&self, prefix: &str, delimiter: Option<&str>) -> Result<Listing> {
        let mut listing = Listing::default();
        let mut continuation: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let page = self.list_page(prefix, delimiter, continuation).await?;
            pages += 1;
            listing.objects.extend(page.objects);
            listing.common_prefixes.extend(page.common_prefixes);

            match page.next_token {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        debug!(
            "Listed {} objects and {} prefixes under '{}' in {} page(s)",
            listing.objects.len(),
            listing.common_prefixes.len(),
            prefix,
            pages
        );
        Ok(listing)
    }

    /// Upload `local_path` to `key`, replacing any existing object
    async fn put(&self, local_path: &Path, key: &str) -> Result<()>;

    /// Download `key` to `local_path`, creating parent directories
    async fn get(&self, key: &str, local_path: &Path) -> Result<()>;

    /// Write an empty `<key>/` folder marker
    async fn ensure_folder(&self, key: &str) -> Result<()>;
}

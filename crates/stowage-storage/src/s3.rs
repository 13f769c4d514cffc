//! AWS S3 and S3-compatible object store
//!
//! Works against AWS S3 and S3-compatible services (MinIO, Wasabi, R2).
//! A custom endpoint switches to path-style addressing.

use crate::gateway::{ListPage, ObjectInfo, ObjectStore};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use chrono::{DateTime, Utc};
use std::path::Path;
use stowage_core::types::S3Settings;
use stowage_core::{Error, Result};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Files above this size are streamed from disk instead of read into memory
pub const STREAMING_THRESHOLD: u64 = 8 * 1024 * 1024;

/// S3 object store
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Create a store from configuration
    pub async fn new(settings: &S3Settings) -> Result<Self> {
        let client = Self::create_client(settings).await;
        Ok(Self {
            client,
            bucket: settings.bucket.clone(),
        })
    }

    async fn create_client(settings: &S3Settings) -> Client {
        let region = Region::new(settings.region.clone());

        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(region)
            .load()
            .await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config);

        if let (Some(id), Some(secret)) = (&settings.access_key_id, &settings.access_key_secret) {
            debug!("Using static credentials from configuration");
            s3_config_builder = s3_config_builder.credentials_provider(Credentials::new(
                id.clone(),
                secret.clone(),
                None,
                None,
                "stowage-config",
            ));
        }

        if let Some(endpoint_url) = settings.endpoint.as_deref() {
            debug!("Using custom S3 endpoint: {}", endpoint_url);
            s3_config_builder = s3_config_builder
                .endpoint_url(endpoint_url)
                .force_path_style(true);
        }

        Client::from_conf(s3_config_builder.build())
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

fn transport<E>(operation: &str, key: &str, err: E) -> Error
where
    E: std::error::Error,
{
    Error::transport(operation, key, DisplayErrorContext(err).to_string())
}

fn to_chrono(value: &aws_sdk_s3::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(value.secs(), value.subsec_nanos())
}

#[async_trait]
impl ObjectStore for S3Store {
    fn location(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<String>,
    ) -> Result<ListPage> {
        let mut request = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix);

        if let Some(delimiter) = delimiter {
            request = request.delimiter(delimiter);
        }
        if let Some(token) = continuation {
            request = request.continuation_token(token);
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_bucket() {
                    return Err(Error::not_found(format!("bucket {}", self.bucket)));
                }
                return Err(transport("list", prefix, service_error));
            }
        };

        let objects = resp
            .contents
            .unwrap_or_default()
            .into_iter()
            .filter_map(|object| {
                let key = object.key?;
                Some(ObjectInfo {
                    key,
                    size: object.size.unwrap_or(0).max(0) as u64,
                    last_modified: object.last_modified.as_ref().and_then(to_chrono),
                })
            })
            .collect();

        let common_prefixes = resp
            .common_prefixes
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.prefix)
            .collect();

        let next_token = if resp.is_truncated == Some(true) {
            resp.next_continuation_token
        } else {
            None
        };

        Ok(ListPage {
            objects,
            common_prefixes,
            next_token,
        })
    }

    async fn put(&self, local_path: &Path, key: &str) -> Result<()> {
        let size = tokio::fs::metadata(local_path).await?.len();

        let body = if size > STREAMING_THRESHOLD {
            ByteStream::from_path(local_path)
                .await
                .map_err(std::io::Error::other)?
        } else {
            ByteStream::from(tokio::fs::read(local_path).await?)
        };

        debug!(
            "Uploading {} ({} bytes) to s3://{}/{}",
            local_path.display(),
            size,
            self.bucket,
            key
        );

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| transport("put", key, e.into_service_error()))?;

        info!("Uploaded s3://{}/{}", self.bucket, key);
        Ok(())
    }

    async fn get(&self, key: &str, local_path: &Path) -> Result<()> {
        debug!("Downloading s3://{}/{}", self.bucket, key);

        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Err(Error::not_found(key));
                }
                return Err(transport("get", key, service_error));
            }
        };

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(local_path).await?;
        let mut body = resp.body.into_async_read();
        let written = tokio::io::copy(&mut body, &mut file)
            .await
            .map_err(|e| Error::transport("get", key, e.to_string()))?;
        file.flush().await?;

        info!(
            "Downloaded s3://{}/{} to {} ({} bytes)",
            self.bucket,
            key,
            local_path.display(),
            written
        );
        Ok(())
    }

    async fn ensure_folder(&self, key: &str) -> Result<()> {
        let marker = format!("{}/", key.trim_end_matches('/'));
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&marker)
            .body(ByteStream::from_static(b""))
            .send()
            .await
            .map_err(|e| transport("put", &marker, e.into_service_error()))?;

        debug!("Created folder marker s3://{}/{}", self.bucket, marker);
        Ok(())
    }
}

impl std::fmt::Debug for S3Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Store")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

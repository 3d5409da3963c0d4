//! # Object Storage
//!
//! Bucket-scoped binary objects and bucket management. Names, paths and
//! payloads are checked before any request is built.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{failed, Client};
use crate::errors::{ClientError, ClientResult, TransportError};
use crate::observability::{CallArgs, Summarize};
use crate::operation::Operation;

/// Content type used when the caller gives none
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Page size for object listings
const LIST_LIMIT: u32 = 100;

/// A stored object as listed by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileObject {
    pub name: String,

    /// `None` for folder placeholders
    #[serde(default)]
    pub id: Option<String>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,

    /// Size, mimetype, cache control
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// A storage bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub owner: Option<String>,

    #[serde(default)]
    pub public: bool,

    /// Maximum object size in bytes (`None` = unlimited)
    #[serde(default)]
    pub file_size_limit: Option<u64>,

    /// Allowed MIME types (`None` = all)
    #[serde(default)]
    pub allowed_mime_types: Option<Vec<String>>,

    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Settings for a new bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BucketOptions {
    #[serde(default)]
    pub public: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size_limit: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_mime_types: Option<Vec<String>>,
}

impl BucketOptions {
    pub fn public() -> Self {
        Self {
            public: true,
            ..Self::default()
        }
    }
}

impl Summarize for Bucket {
    fn summarize(&self) -> String {
        format!("bucket {}", self.id)
    }
}

fn check_bucket(bucket: &str) -> ClientResult<()> {
    if bucket.trim().is_empty() {
        return Err(ClientError::storage_validation("Bucket name cannot be empty"));
    }
    Ok(())
}

fn check_path(path: &str) -> ClientResult<()> {
    if path.trim_matches('/').trim().is_empty() {
        return Err(ClientError::storage_validation("Object path cannot be empty"));
    }
    Ok(())
}

fn decode<T: serde::de::DeserializeOwned>(payload: Value, op: Operation) -> ClientResult<T> {
    serde_json::from_value(payload).map_err(|e| failed(op)(TransportError::Decode(e)))
}

impl Client {
    async fn storage_json(
        &self,
        method: Method,
        path: &[&str],
        body: Option<&Value>,
        op: Operation,
    ) -> ClientResult<Value> {
        let mut request = self.conn.request(method, self.conn.storage_url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        self.conn.send_json(request).await.map_err(failed(op))
    }

    /// Store `data` at `bucket/path`; returns the object key
    pub async fn upload_file(
        &self,
        bucket: &str,
        path: &str,
        data: impl Into<Bytes>,
        content_type: Option<&str>,
        upsert: bool,
    ) -> ClientResult<String> {
        let data: Bytes = data.into();
        let args = CallArgs::new()
            .with("bucket", bucket)
            .with("path", path)
            .payload("data", data.len())
            .with("content_type", content_type.unwrap_or(DEFAULT_CONTENT_TYPE))
            .with("upsert", upsert);

        self.observer
            .observe(Operation::UploadFile, args, async {
                check_bucket(bucket)?;
                check_path(path)?;
                if data.is_empty() {
                    return Err(ClientError::storage_validation("File data cannot be empty"));
                }

                let request = self
                    .conn
                    .request(Method::POST, self.conn.storage_url(&["object", bucket, path]))
                    .header(CONTENT_TYPE, content_type.unwrap_or(DEFAULT_CONTENT_TYPE))
                    .header("x-upsert", upsert.to_string())
                    .body(data);
                let payload = self
                    .conn
                    .send_json(request)
                    .await
                    .map_err(failed(Operation::UploadFile))?;

                let key = payload
                    .get("Key")
                    .or_else(|| payload.get("key"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}/{}", bucket, path.trim_matches('/')));
                Ok(key)
            })
            .await
    }

    /// Object bytes at `bucket/path`
    pub async fn download_file(&self, bucket: &str, path: &str) -> ClientResult<Bytes> {
        let args = CallArgs::new().with("bucket", bucket).with("path", path);

        self.observer
            .observe(Operation::DownloadFile, args, async {
                check_bucket(bucket)?;
                check_path(path)?;

                let request = self
                    .conn
                    .request(Method::GET, self.conn.storage_url(&["object", bucket, path]));
                self.conn
                    .send_bytes(request)
                    .await
                    .map_err(failed(Operation::DownloadFile))
            })
            .await
    }

    /// Remove objects; `true` when the backend reported any removed
    pub async fn delete_files(&self, bucket: &str, paths: &[&str]) -> ClientResult<bool> {
        let args = CallArgs::new()
            .with("bucket", bucket)
            .with("paths", paths.join(","));

        self.observer
            .observe(Operation::DeleteFiles, args, async {
                check_bucket(bucket)?;
                if paths.is_empty() {
                    return Err(ClientError::storage_validation("No paths given to delete"));
                }
                for path in paths {
                    check_path(path)?;
                }

                let body = json!({ "prefixes": paths });
                let payload = self
                    .storage_json(Method::DELETE, &["object", bucket], Some(&body), Operation::DeleteFiles)
                    .await?;
                Ok(matches!(&payload, Value::Array(items) if !items.is_empty()))
            })
            .await
    }

    /// Objects under `prefix` (the bucket root when `None`), name order
    pub async fn list_files(&self, bucket: &str, prefix: Option<&str>) -> ClientResult<Vec<FileObject>> {
        let args = CallArgs::new()
            .with("bucket", bucket)
            .with("prefix", prefix.unwrap_or(""));

        self.observer
            .observe(Operation::ListFiles, args, async {
                check_bucket(bucket)?;

                let body = json!({
                    "prefix": prefix.unwrap_or(""),
                    "limit": LIST_LIMIT,
                    "offset": 0,
                    "sortBy": {"column": "name", "order": "asc"},
                });
                let payload = self
                    .storage_json(Method::POST, &["object", "list", bucket], Some(&body), Operation::ListFiles)
                    .await?;
                decode(payload, Operation::ListFiles)
            })
            .await
    }

    /// Public URL of an object; no request is made
    pub fn get_public_url(&self, bucket: &str, path: &str) -> ClientResult<String> {
        let args = CallArgs::new().with("bucket", bucket).with("path", path);

        self.observer.observe_sync(Operation::GetPublicUrl, args, || {
            check_bucket(bucket)?;
            check_path(path)?;
            Ok(self
                .conn
                .storage_url(&["object", "public", bucket, path])
                .to_string())
        })
    }

    /// Create a bucket; returns its name
    pub async fn create_bucket(&self, id: &str, options: BucketOptions) -> ClientResult<String> {
        let args = CallArgs::new()
            .with("id", id)
            .with("public", options.public);

        self.observer
            .observe(Operation::CreateBucket, args, async {
                check_bucket(id)?;

                let mut body = json!({"id": id, "name": id, "public": options.public});
                if let Some(limit) = options.file_size_limit {
                    body["file_size_limit"] = json!(limit);
                }
                if let Some(types) = &options.allowed_mime_types {
                    body["allowed_mime_types"] = json!(types);
                }

                let payload = self
                    .storage_json(Method::POST, &["bucket"], Some(&body), Operation::CreateBucket)
                    .await?;
                Ok(payload
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or(id)
                    .to_string())
            })
            .await
    }

    pub async fn get_bucket(&self, id: &str) -> ClientResult<Bucket> {
        let args = CallArgs::new().with("id", id);

        self.observer
            .observe(Operation::GetBucket, args, async {
                check_bucket(id)?;
                let payload = self
                    .storage_json(Method::GET, &["bucket", id], None, Operation::GetBucket)
                    .await?;
                decode(payload, Operation::GetBucket)
            })
            .await
    }

    pub async fn list_buckets(&self) -> ClientResult<Vec<Bucket>> {
        self.observer
            .observe(Operation::ListBuckets, CallArgs::new(), async {
                let payload = self
                    .storage_json(Method::GET, &["bucket"], None, Operation::ListBuckets)
                    .await?;
                decode(payload, Operation::ListBuckets)
            })
            .await
    }

    /// Delete an (empty) bucket
    pub async fn delete_bucket(&self, id: &str) -> ClientResult<()> {
        let args = CallArgs::new().with("id", id);

        self.observer
            .observe(Operation::DeleteBucket, args, async {
                check_bucket(id)?;
                self.storage_json(Method::DELETE, &["bucket", id], None, Operation::DeleteBucket)
                    .await?;
                Ok(())
            })
            .await
    }

    /// Remove every object in a bucket
    pub async fn empty_bucket(&self, id: &str) -> ClientResult<()> {
        let args = CallArgs::new().with("id", id);

        self.observer
            .observe(Operation::EmptyBucket, args, async {
                check_bucket(id)?;
                self.storage_json(Method::POST, &["bucket", id, "empty"], None, Operation::EmptyBucket)
                    .await?;
                Ok(())
            })
            .await
    }
}

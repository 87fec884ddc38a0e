//! Storage adapter implementation using Apache OpenDAL.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use opendal::{ErrorKind, Operator, services};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use super::config::{StorageConfig, StorageProvider};
use super::error::StorageError;
use crate::objectref::CANONICAL_PREFIX;

/// Short-lived, single-use write authorization plus the canonical path the
/// caller must persist.
#[derive(Debug, Clone)]
pub struct UploadTicket {
    /// Where to PUT the bytes. A provider-signed URL for cloud storage, or
    /// an application-internal endpoint path for local storage.
    pub upload_url: String,
    /// Canonical object path, always `/objects/uploads/<uuid>`. This is the
    /// only form business records may store.
    pub object_path: String,
    /// HTTP method to use.
    pub method: String,
    /// Required headers for the upload request.
    pub headers: HashMap<String, String>,
    /// When the ticket expires.
    pub expires_at: DateTime<Utc>,
}

/// One stored object, as returned by listing.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    /// Object file name.
    pub name: String,
    /// Canonical object path.
    pub path: String,
    /// Object size in bytes.
    pub size: u64,
    /// Content type, when the provider stores one.
    pub content_type: Option<String>,
}

/// A streaming download: header metadata plus the byte stream.
///
/// The stream is a pass-through from the provider; the object is never
/// buffered whole in memory.
pub struct ObjectDownload {
    /// Content type for the response.
    pub content_type: String,
    /// Object size in bytes.
    pub content_length: u64,
    /// Cache-Control header value (`public` only for allowlisted paths).
    pub cache_control: String,
    /// The object bytes.
    pub stream: BoxStream<'static, std::io::Result<Bytes>>,
}

impl std::fmt::Debug for ObjectDownload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectDownload")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("cache_control", &self.cache_control)
            .finish_non_exhaustive()
    }
}

/// Blob storage adapter over one concrete backend strategy.
pub struct StorageAdapter {
    config: StorageConfig,
    backend: Backend,
}

impl std::fmt::Debug for StorageAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageAdapter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

enum Backend {
    Cloud(CloudBackend),
    Local(Operator),
}

/// Federated-credential cloud backend.
///
/// Holds no static secrets: the operator is built from a short-lived
/// session obtained from the credential broker and re-exchanged after
/// expiry.
struct CloudBackend {
    http: reqwest::Client,
    bucket: String,
    endpoint: Option<String>,
    region: String,
    broker_url: String,
    identity_token: String,
    session: RwLock<Option<CloudSession>>,
}

struct CloudSession {
    operator: Operator,
    expires_at: DateTime<Utc>,
}

/// Temporary credentials returned by the broker in exchange for a local
/// identity assertion.
#[derive(Debug, Deserialize)]
struct BrokerGrant {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    expires_in_secs: u64,
}

impl CloudBackend {
    /// Get a signing-capable operator, re-exchanging credentials when the
    /// cached session has expired.
    async fn operator(&self) -> Result<Operator, StorageError> {
        {
            let session = self.session.read().await;
            if let Some(s) = session.as_ref() {
                if Utc::now() < s.expires_at {
                    return Ok(s.operator.clone());
                }
            }
        }

        let mut session = self.session.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(s) = session.as_ref() {
            if Utc::now() < s.expires_at {
                return Ok(s.operator.clone());
            }
        }

        let fresh = self.exchange().await?;
        let operator = fresh.operator.clone();
        *session = Some(fresh);
        Ok(operator)
    }

    /// Exchange the local identity assertion for a scoped session token and
    /// build an operator signing with it.
    async fn exchange(&self) -> Result<CloudSession, StorageError> {
        let response = self
            .http
            .post(&self.broker_url)
            .json(&serde_json::json!({ "identity_token": self.identity_token }))
            .send()
            .await
            .map_err(|e| StorageError::credential_exchange(e.to_string()))?
            .error_for_status()
            .map_err(|e| StorageError::credential_exchange(e.to_string()))?;

        let grant: BrokerGrant = response
            .json()
            .await
            .map_err(|e| StorageError::credential_exchange(format!("invalid grant: {e}")))?;

        let mut builder = services::S3::default()
            .bucket(&self.bucket)
            .region(&self.region)
            .access_key_id(&grant.access_key_id)
            .secret_access_key(&grant.secret_access_key)
            .session_token(&grant.session_token);
        if let Some(endpoint) = &self.endpoint {
            builder = builder.endpoint(endpoint);
        }

        let operator = Operator::new(builder)
            .map_err(|e| StorageError::configuration(e.to_string()))?
            .finish();

        // Renew a minute early so in-flight calls never sign with a token
        // that expires mid-request.
        let lifetime = grant.expires_in_secs.saturating_sub(60).max(30);
        let expires_at = Utc::now() + chrono::Duration::seconds(i64::try_from(lifetime).unwrap_or(i64::MAX));

        debug!(bucket = %self.bucket, "exchanged identity assertion for storage session");
        Ok(CloudSession {
            operator,
            expires_at,
        })
    }
}

impl StorageAdapter {
    /// Build the adapter for the configured provider.
    ///
    /// For the federated cloud strategy this performs the first credential
    /// exchange eagerly, so a misconfigured or unreachable broker surfaces
    /// at startup instead of on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot be initialized.
    pub async fn connect(config: StorageConfig) -> Result<Self, StorageError> {
        let backend = match &config.provider {
            StorageProvider::LocalFs { root } => {
                let root = root
                    .to_str()
                    .ok_or_else(|| StorageError::configuration("invalid storage root path"))?;
                let builder = services::Fs::default().root(root);
                Backend::Local(
                    Operator::new(builder)
                        .map_err(|e| StorageError::configuration(e.to_string()))?
                        .finish(),
                )
            }
            StorageProvider::FederatedCloud {
                bucket,
                endpoint,
                region,
                credential_broker_url,
                identity_token,
            } => {
                let cloud = CloudBackend {
                    http: reqwest::Client::new(),
                    bucket: bucket.clone(),
                    endpoint: endpoint.clone(),
                    region: region.clone(),
                    broker_url: credential_broker_url.clone(),
                    identity_token: identity_token.clone(),
                    session: RwLock::new(None),
                };
                cloud.operator().await?;
                Backend::Cloud(cloud)
            }
        };

        info!(provider = config.provider.name(), "storage adapter ready");
        Ok(Self { config, backend })
    }

    /// Allocate a fresh object identifier and return the write
    /// authorization for it.
    ///
    /// The returned `object_path` is always canonical and never contains
    /// provider host or bucket segments. Two concurrent calls always
    /// receive distinct identifiers.
    ///
    /// # Errors
    ///
    /// Returns an error if presigning fails or credentials cannot be
    /// obtained.
    pub async fn issue_upload_ticket(
        &self,
        filename: &str,
        content_type: Option<&str>,
    ) -> Result<UploadTicket, StorageError> {
        let id = Uuid::new_v4();
        let object_path = format!("{CANONICAL_PREFIX}uploads/{id}");
        let expires_at = Utc::now()
            + chrono::Duration::seconds(
                i64::try_from(self.config.upload_ttl_secs).unwrap_or(i64::MAX),
            );

        debug!(object = %object_path, filename, "issuing upload ticket");

        let mut headers = HashMap::new();
        if let Some(ct) = content_type {
            headers.insert("Content-Type".to_string(), ct.to_string());
        }

        match &self.backend {
            Backend::Local(_) => Ok(UploadTicket {
                // The server's own PUT endpoint mediates local uploads;
                // this URL is not third-party writable.
                upload_url: format!("/api/v1/objects/uploads/{id}"),
                object_path,
                method: "PUT".to_string(),
                headers,
                expires_at,
            }),
            Backend::Cloud(cloud) => {
                let key = self.key_for(&object_path)?;
                let ttl = Duration::from_secs(self.config.upload_ttl_secs);
                let presigned = cloud
                    .operator()
                    .await?
                    .presign_write(&key, ttl)
                    .await
                    .map_err(StorageError::from)?;

                for (name, value) in presigned.header() {
                    if let Ok(value) = value.to_str() {
                        headers.insert(name.to_string(), value.to_string());
                    }
                }

                Ok(UploadTicket {
                    upload_url: presigned.uri().to_string(),
                    object_path,
                    method: presigned.method().to_string(),
                    headers,
                    expires_at,
                })
            }
        }
    }

    /// Return a read-capable URL for a canonical object path.
    ///
    /// Local storage serves objects through the application itself, so the
    /// canonical path is returned unchanged; cloud storage returns a
    /// time-limited signed URL.
    ///
    /// # Errors
    ///
    /// Returns an error for non-canonical paths or presign failures.
    pub async fn download_url(&self, object_path: &str) -> Result<String, StorageError> {
        let key = self.key_for(object_path)?;
        match &self.backend {
            Backend::Local(_) => Ok(object_path.to_string()),
            Backend::Cloud(cloud) => {
                let ttl = Duration::from_secs(self.config.download_ttl_secs);
                let presigned = cloud
                    .operator()
                    .await?
                    .presign_read(&key, ttl)
                    .await
                    .map_err(StorageError::from)?;
                Ok(presigned.uri().to_string())
            }
        }
    }

    /// Open a streaming download for a canonical object path.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for missing objects.
    pub async fn open_download(&self, object_path: &str) -> Result<ObjectDownload, StorageError> {
        let key = self.key_for(object_path)?;
        let op = self.operator().await?;

        let meta = op
            .stat(&key)
            .await
            .map_err(|e| Self::map_err(e, object_path))?;
        let reader = op
            .reader(&key)
            .await
            .map_err(|e| Self::map_err(e, object_path))?;
        let stream = reader
            .into_bytes_stream(..)
            .await
            .map_err(|e| StorageError::operation(e.to_string()))?;

        let visibility = if self.config.is_public_path(object_path) {
            "public"
        } else {
            "private"
        };

        Ok(ObjectDownload {
            content_type: meta
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string(),
            content_length: meta.content_length(),
            cache_control: format!("{visibility}, max-age={}", self.config.download_ttl_secs),
            stream: stream.boxed(),
        })
    }

    /// Stream bytes into an object, returning the number of bytes written.
    ///
    /// Used by the application's PUT endpoint to satisfy local upload
    /// tickets.
    ///
    /// # Errors
    ///
    /// Returns an error if the source stream or the provider write fails.
    pub async fn write<S, E>(&self, object_path: &str, mut stream: S) -> Result<u64, StorageError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: std::fmt::Display,
    {
        let key = self.key_for(object_path)?;
        let op = self.operator().await?;

        let mut writer = op.writer(&key).await.map_err(StorageError::from)?;
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.map_err(|e| StorageError::operation(format!("upload stream failed: {e}")))?;
            written += chunk.len() as u64;
            writer.write(chunk).await.map_err(StorageError::from)?;
        }
        writer.close().await.map_err(StorageError::from)?;

        debug!(object = %object_path, bytes = written, "object written");
        Ok(written)
    }

    /// Delete an object. Idempotent: deleting a missing object succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error only for provider failures other than "missing".
    pub async fn delete_object(&self, object_path: &str) -> Result<(), StorageError> {
        let key = self.key_for(object_path)?;
        match self.operator().await?.delete(&key).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether an object exists. A missing object is a normal
    /// outcome, not an error.
    ///
    /// # Errors
    ///
    /// Returns an error for non-canonical paths or provider failures.
    pub async fn exists(&self, object_path: &str) -> Result<bool, StorageError> {
        let key = self.key_for(object_path)?;
        match self.operator().await?.stat(&key).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List objects under a canonical prefix.
    ///
    /// # Errors
    ///
    /// Returns an error for non-canonical prefixes or provider failures. A
    /// prefix with no objects yields an empty list.
    pub async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>, StorageError> {
        let mut key = self.key_for(prefix)?;
        if !key.ends_with('/') {
            key.push('/');
        }
        let op = self.operator().await?;

        let entries = match op.list_with(&key).recursive(true).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut objects = Vec::new();
        for entry in entries {
            if !entry.metadata().mode().is_file() {
                continue;
            }
            let meta = op.stat(entry.path()).await.map_err(StorageError::from)?;
            objects.push(ObjectEntry {
                name: entry.name().to_string(),
                path: self.canonical_for(entry.path()),
                size: meta.content_length(),
                content_type: meta.content_type().map(String::from),
            });
        }
        Ok(objects)
    }

    /// Get the storage provider name.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.config.provider.name()
    }

    /// Whether uploads go through the application's own PUT endpoint
    /// instead of a provider-signed URL.
    #[must_use]
    pub const fn uploads_are_mediated(&self) -> bool {
        matches!(self.backend, Backend::Local(_))
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    async fn operator(&self) -> Result<Operator, StorageError> {
        match &self.backend {
            Backend::Local(op) => Ok(op.clone()),
            Backend::Cloud(cloud) => cloud.operator().await,
        }
    }

    /// Map a canonical `/objects/...` path to a provider storage key.
    ///
    /// Cloud keys live under the private root; local keys are relative to
    /// the configured directory.
    fn key_for(&self, object_path: &str) -> Result<String, StorageError> {
        let rest = object_path
            .strip_prefix(CANONICAL_PREFIX)
            .ok_or_else(|| StorageError::invalid_path(object_path))?;
        if rest.is_empty() || rest.starts_with('/') || rest.split('/').any(|seg| seg == "..") {
            return Err(StorageError::invalid_path(object_path));
        }
        match &self.backend {
            Backend::Local(_) => Ok(rest.to_string()),
            Backend::Cloud(_) => Ok(format!("{}/{rest}", self.config.private_root)),
        }
    }

    /// Inverse of `key_for`, used when listing.
    fn canonical_for(&self, key: &str) -> String {
        let rest = match &self.backend {
            Backend::Local(_) => key,
            Backend::Cloud(_) => {
                let private_prefix = format!("{}/", self.config.private_root);
                key.strip_prefix(private_prefix.as_str()).unwrap_or(key)
            }
        };
        format!("{CANONICAL_PREFIX}{rest}")
    }

    fn map_err(err: opendal::Error, object_path: &str) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            StorageError::not_found(object_path)
        } else {
            err.into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    async fn local_adapter(dir: &tempfile::TempDir) -> StorageAdapter {
        let config = StorageConfig::new(StorageProvider::local_fs(dir.path()));
        StorageAdapter::connect(config)
            .await
            .expect("local adapter builds")
    }

    fn byte_stream(data: &'static [u8]) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        stream::iter(vec![Ok(Bytes::from_static(data))])
    }

    async fn collect(download: ObjectDownload) -> Vec<u8> {
        let mut stream = download.stream;
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk.expect("stream chunk"));
        }
        bytes
    }

    #[tokio::test]
    async fn test_upload_ticket_is_canonical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = local_adapter(&dir).await;

        let ticket = adapter
            .issue_upload_ticket("a.png", Some("image/png"))
            .await
            .expect("ticket issued");

        let id = ticket
            .object_path
            .strip_prefix("/objects/uploads/")
            .expect("canonical upload path");
        Uuid::parse_str(id).expect("fresh uuid identifier");
        assert_eq!(ticket.method, "PUT");
        assert_eq!(ticket.upload_url, format!("/api/v1/objects/uploads/{id}"));
        assert_eq!(ticket.headers.get("Content-Type").map(String::as_str), Some("image/png"));
        assert!(ticket.expires_at > Utc::now());
    }

    #[tokio::test]
    async fn test_tickets_get_distinct_identifiers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = local_adapter(&dir).await;

        let a = adapter.issue_upload_ticket("a.png", None).await.unwrap();
        let b = adapter.issue_upload_ticket("a.png", None).await.unwrap();
        assert_ne!(a.object_path, b.object_path);
    }

    #[tokio::test]
    async fn test_write_then_download_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = local_adapter(&dir).await;

        let ticket = adapter.issue_upload_ticket("a.png", None).await.unwrap();
        let payload: &[u8] = b"png bytes, honest";
        let written = adapter
            .write(&ticket.object_path, byte_stream(payload))
            .await
            .expect("write succeeds");
        assert_eq!(written, payload.len() as u64);

        let download = adapter
            .open_download(&ticket.object_path)
            .await
            .expect("download opens");
        assert_eq!(download.content_length, payload.len() as u64);
        assert!(download.cache_control.starts_with("private"));
        assert_eq!(collect(download).await, payload);
    }

    #[tokio::test]
    async fn test_exists_and_idempotent_delete() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = local_adapter(&dir).await;

        let ticket = adapter.issue_upload_ticket("a.png", None).await.unwrap();
        adapter
            .write(&ticket.object_path, byte_stream(b"data"))
            .await
            .unwrap();

        assert!(adapter.exists(&ticket.object_path).await.unwrap());
        adapter.delete_object(&ticket.object_path).await.unwrap();
        assert!(!adapter.exists(&ticket.object_path).await.unwrap());
        // Second delete of a now-missing object must still succeed.
        adapter.delete_object(&ticket.object_path).await.unwrap();
    }

    #[tokio::test]
    async fn test_download_missing_object_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = local_adapter(&dir).await;

        let err = adapter
            .open_download("/objects/uploads/00000000-0000-0000-0000-000000000000")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_download_url_local_is_canonical_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = local_adapter(&dir).await;

        let url = adapter
            .download_url("/objects/uploads/abc123")
            .await
            .unwrap();
        assert_eq!(url, "/objects/uploads/abc123");
    }

    #[tokio::test]
    async fn test_rejects_non_canonical_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = local_adapter(&dir).await;

        for path in ["uploads/abc", "/objects/", "/objects//x", "/objects/../etc/passwd"] {
            let err = adapter.exists(path).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidObjectPath(_)), "{path}");
        }
    }

    #[tokio::test]
    async fn test_list_objects_returns_canonical_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = local_adapter(&dir).await;

        let first = adapter.issue_upload_ticket("a.bin", None).await.unwrap();
        let second = adapter.issue_upload_ticket("b.bin", None).await.unwrap();
        adapter.write(&first.object_path, byte_stream(b"aa")).await.unwrap();
        adapter.write(&second.object_path, byte_stream(b"bbb")).await.unwrap();

        let mut listed = adapter.list_objects("/objects/uploads").await.unwrap();
        listed.sort_by(|a, b| a.size.cmp(&b.size));
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|e| e.path.starts_with("/objects/uploads/")));
        assert_eq!(listed[0].size, 2);
        assert_eq!(listed[1].size, 3);
    }

    #[tokio::test]
    async fn test_list_objects_empty_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = local_adapter(&dir).await;

        let listed = adapter.list_objects("/objects/uploads").await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_public_path_gets_public_cache_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = StorageConfig::new(StorageProvider::local_fs(dir.path()))
            .with_public_paths(vec!["/objects/public".to_string()]);
        let adapter = StorageAdapter::connect(config).await.unwrap();

        adapter
            .write("/objects/public/logo.png", byte_stream(b"logo"))
            .await
            .unwrap();
        let download = adapter.open_download("/objects/public/logo.png").await.unwrap();
        assert!(download.cache_control.starts_with("public"));
    }

    #[tokio::test]
    async fn test_mediated_uploads_flag() {
        let dir = tempfile::tempdir().expect("tempdir");
        let adapter = local_adapter(&dir).await;
        assert!(adapter.uploads_are_mediated());
    }
}

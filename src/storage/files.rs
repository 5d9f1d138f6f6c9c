//! Evidence file storage
//!
//! Files land on local disk under a collision-free name
//! (`<uuid>_<sanitized original name>`) and are addressed by a public URL
//! built from the configured prefix.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::types::{MeritError, Result};

const MAX_NAME_LEN: usize = 100;
pub const DEFAULT_FILE_TYPE: &str = "application/octet-stream";

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct FileUpload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl FileUpload {
    pub fn file_type(&self) -> &str {
        self.content_type
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or(DEFAULT_FILE_TYPE)
    }

    pub fn validate(&self) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(MeritError::Validation("uploaded file is empty".into()));
        }
        if sanitize_file_name(&self.file_name).is_none() {
            return Err(MeritError::Validation(format!(
                "invalid file name '{}'",
                self.file_name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredFile {
    /// Name on disk, unique per upload
    pub stored_name: String,
    pub url: String,
    pub size: u64,
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn save(&self, upload: &FileUpload) -> Result<StoredFile>;

    /// Remove a stored file. Missing files are not an error.
    async fn remove(&self, stored_name: &str) -> Result<()>;
}

/// Reduce a client-supplied name to a safe single path component.
///
/// Directory parts are dropped, characters outside `[A-Za-z0-9._-]` become
/// `_`, and leading dots are stripped. Returns `None` if nothing meaningful
/// is left.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("");
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    let truncated: String = trimmed.chars().take(MAX_NAME_LEN).collect();

    if truncated.chars().any(|c| c.is_ascii_alphanumeric()) {
        Some(truncated)
    } else {
        None
    }
}

/// Stores files in a local directory.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
    public_prefix: String,
    max_bytes: usize,
}

impl LocalFileStore {
    pub fn new(root: PathBuf, public_prefix: &str, max_bytes: usize) -> Self {
        Self {
            root,
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
            max_bytes,
        }
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|e| {
            MeritError::Storage(format!(
                "Failed to create upload dir {}: {}",
                self.root.display(),
                e
            ))
        })
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Only names this store could have produced are resolved.
    fn path_for(&self, stored_name: &str) -> Option<PathBuf> {
        match sanitize_file_name(stored_name) {
            Some(clean) if clean == stored_name => Some(self.root.join(clean)),
            _ => None,
        }
    }

    /// Read a stored file back. `None` if it does not exist.
    pub async fn read(&self, stored_name: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.path_for(stored_name) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, upload: &FileUpload) -> Result<StoredFile> {
        upload.validate()?;
        if upload.bytes.len() > self.max_bytes {
            return Err(MeritError::PayloadTooLarge(format!(
                "file exceeds {} bytes",
                self.max_bytes
            )));
        }
        let clean = sanitize_file_name(&upload.file_name)
            .ok_or_else(|| MeritError::Validation("invalid file name".into()))?;
        let stored_name = format!("{}_{}", uuid::Uuid::new_v4().simple(), clean);

        self.ensure_dir().await?;
        let path = self.root.join(&stored_name);
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(&upload.bytes).await?;
        file.flush().await?;

        debug!(stored_name = %stored_name, size = upload.bytes.len(), "Stored upload");
        Ok(StoredFile {
            url: format!("{}/{}", self.public_prefix, stored_name),
            stored_name,
            size: upload.bytes.len() as u64,
        })
    }

    async fn remove(&self, stored_name: &str) -> Result<()> {
        let Some(path) = self.path_for(stored_name) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

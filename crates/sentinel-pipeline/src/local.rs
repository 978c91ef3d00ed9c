//! Filesystem adapters for the LocalSave collaborators.

use crate::ports::{ClientSaver, HandleOutcome, LocalHandle, LocalStorage};
use async_trait::async_trait;
use bytes::Bytes;
use sentinel_core::{Error, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Keep the final path component so a reference can never escape the target dir.
fn safe_filename(filename: &str) -> Result<&str> {
    Path::new(filename)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::InvalidInput(format!("bad artifact filename: {:?}", filename)))
}

async fn write_into(dir: &Path, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = dir.join(safe_filename(filename)?);
    tokio::fs::write(&path, bytes).await?;
    debug!("wrote {} bytes to {}", bytes.len(), path.display());
    Ok(path)
}

/// Grants a write handle on a fixed export directory.
pub struct DirectoryStorage {
    dir: PathBuf,
}

impl DirectoryStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl LocalStorage for DirectoryStorage {
    async fn acquire_handle(&self) -> Result<HandleOutcome> {
        match tokio::fs::create_dir_all(&self.dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                warn!("export dir {} not writable: {}", self.dir.display(), e);
                return Ok(HandleOutcome::Denied(e.to_string()));
            }
            Err(e) => return Err(e.into()),
        }
        // A directory that exists but refuses writes is a denial too.
        let meta = tokio::fs::metadata(&self.dir).await?;
        if meta.permissions().readonly() {
            return Ok(HandleOutcome::Denied(format!("{} is read-only", self.dir.display())));
        }
        Ok(HandleOutcome::Granted(Box::new(DirectoryHandle {
            dir: self.dir.clone(),
        })))
    }
}

struct DirectoryHandle {
    dir: PathBuf,
}

#[async_trait]
impl LocalHandle for DirectoryHandle {
    async fn write(&self, filename: &str, bytes: Bytes) -> Result<PathBuf> {
        write_into(&self.dir, filename, &bytes).await
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

/// Client-side save fallback into the downloads directory.
pub struct DownloadsSaver {
    dir: PathBuf,
}

impl DownloadsSaver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl ClientSaver for DownloadsSaver {
    async fn save(&self, filename: &str, bytes: Bytes) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        write_into(&self.dir, filename, &bytes).await
    }
}

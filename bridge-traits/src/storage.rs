//! Cloud File Store Abstraction
//!
//! Source A of the synchronization pair: a cloud file store that lists,
//! uploads, downloads, deletes and moves files. The wire-level client
//! (authentication, pagination, HTTP retries) lives outside the core and is
//! injected through [`FileStore`].

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Canonical file metadata as known to the cloud file store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Store-assigned file identifier
    pub id: String,
    /// File name including extension
    pub name: String,
    /// Full path inside the store (e.g. `/Invoices/2024/invoice.pdf`)
    pub path: String,
    /// File size in bytes
    pub size: u64,
    /// MIME type reported by the store
    pub mime_type: Option<String>,
    /// Last modification time reported by the store
    pub modified_at: DateTime<Utc>,
    /// Tombstone flag; set once the file has been removed
    #[serde(default)]
    pub deleted: bool,
    /// Content hash reported by the store, when available
    #[serde(default)]
    pub checksum: Option<String>,
}

impl FileRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        path: impl Into<String>,
        size: u64,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            path: path.into(),
            size,
            mime_type: None,
            modified_at,
            deleted: false,
            checksum: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Return a tombstoned copy of this record.
    pub fn tombstoned(&self) -> Self {
        Self {
            deleted: true,
            ..self.clone()
        }
    }

    /// Lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        file_extension(&self.name)
    }

    /// Parent folder of the file path (`/` for top-level files).
    pub fn parent_folder(&self) -> String {
        parent_folder(&self.path)
    }
}

/// Lower-cased extension of a file name, if any.
pub fn file_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Parent folder of a `/`-separated path.
pub fn parent_folder(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
    }
}

/// Cloud file store trait
///
/// Implementations wrap a concrete provider API. All calls may suspend on the
/// network; the core never holds state locks across them.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileStore;
///
/// async fn count_files(store: &dyn FileStore) -> Result<usize> {
///     let files = store.list("/", true).await?;
///     Ok(files.iter().filter(|f| !f.deleted).count())
/// }
/// ```
#[async_trait]
pub trait FileStore: Send + Sync {
    /// List files below `folder`, descending into subfolders when `recursive`
    async fn list(&self, folder: &str, recursive: bool) -> Result<Vec<FileRecord>>;

    /// Upload `data` as `name` into `subfolder`, returning the created record
    async fn upload(&self, data: Bytes, name: &str, subfolder: &str) -> Result<FileRecord>;

    /// Download the full content of a file
    async fn download(&self, file_id: &str) -> Result<Bytes>;

    /// Delete a file. Returns `false` when the file did not exist.
    async fn delete(&self, file_id: &str) -> Result<bool>;

    /// Move or rename a file to `new_path`, returning the updated record
    async fn move_file(&self, file_id: &str, new_path: &str) -> Result<FileRecord>;

    /// Get a shareable download URL for a file
    async fn get_download_url(&self, file_id: &str) -> Result<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_builder() {
        let record = FileRecord::new("f1", "invoice.pdf", "/Invoices/invoice.pdf", 1024, Utc::now())
            .with_mime_type("application/pdf")
            .with_checksum("abc");

        assert_eq!(record.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(record.checksum.as_deref(), Some("abc"));
        assert!(!record.deleted);
        assert!(record.tombstoned().deleted);
    }

    #[test]
    fn test_file_extension() {
        assert_eq!(file_extension("scan.PDF"), Some("pdf".to_string()));
        assert_eq!(file_extension("archive.tar.gz"), Some("gz".to_string()));
        assert_eq!(file_extension("README"), None);
        assert_eq!(file_extension(".hidden"), None);
    }

    #[test]
    fn test_parent_folder() {
        assert_eq!(parent_folder("/Invoices/2024/a.pdf"), "/Invoices/2024");
        assert_eq!(parent_folder("/a.pdf"), "/");
        assert_eq!(parent_folder("a.pdf"), "/");
    }
}

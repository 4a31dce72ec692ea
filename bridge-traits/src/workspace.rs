//! Workspace Database Abstraction
//!
//! Source B of the synchronization pair: a structured workspace database in
//! which every file of the cloud store is mirrored as one entry (page). Entries
//! carry sync bookkeeping and the OCR enrichment fields.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{BridgeError, Result};
use crate::ocr::ExtractedData;

/// Sync status column of a workspace entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntrySyncStatus {
    #[default]
    Synced,
    /// Waiting for a write into the file store
    PendingA,
    /// Waiting for a write into the workspace
    PendingB,
    Conflict,
    Error,
    /// Tombstoned in the workspace
    Deleted,
}

impl EntrySyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::PendingA => "pending_a",
            Self::PendingB => "pending_b",
            Self::Conflict => "conflict",
            Self::Error => "error",
            Self::Deleted => "deleted",
        }
    }
}

impl FromStr for EntrySyncStatus {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "synced" => Ok(Self::Synced),
            "pending_a" => Ok(Self::PendingA),
            "pending_b" => Ok(Self::PendingB),
            "conflict" => Ok(Self::Conflict),
            "error" => Ok(Self::Error),
            "deleted" => Ok(Self::Deleted),
            other => Err(BridgeError::OperationFailed(format!(
                "Unknown sync status: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for EntrySyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Workspace mirror of a cloud file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceEntry {
    /// Workspace page identifier (empty until the workspace assigns one)
    pub id: String,
    /// Foreign key to `FileRecord::id`, 1:1
    pub file_id: String,
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
    /// Short file type (`pdf`, `png`, ...)
    pub file_type: Option<String>,
    pub external_url: Option<String>,
    pub last_modified: DateTime<Utc>,
    pub sync_status: EntrySyncStatus,
    pub deleted_in_a: bool,
    pub deleted_in_b: bool,
    pub ocr_analyzed: bool,
    pub extracted_text: Option<String>,
    pub extracted_data: Option<ExtractedData>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub checksum: Option<String>,
}

impl WorkspaceEntry {
    pub fn new(
        file_id: impl Into<String>,
        file_name: impl Into<String>,
        file_path: impl Into<String>,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            id: String::new(),
            file_id: file_id.into(),
            file_name: file_name.into(),
            file_path: file_path.into(),
            file_size: 0,
            file_type: None,
            external_url: None,
            last_modified,
            sync_status: EntrySyncStatus::Synced,
            deleted_in_a: false,
            deleted_in_b: false,
            ocr_analyzed: false,
            extracted_text: None,
            extracted_data: None,
            tags: Vec::new(),
            category: None,
            checksum: None,
        }
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.file_size = size;
        self
    }

    pub fn with_file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = Some(file_type.into());
        self
    }

    /// Whether the entry has been removed on the workspace side
    pub fn is_tombstoned(&self) -> bool {
        self.deleted_in_b || self.sync_status == EntrySyncStatus::Deleted
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, patch: &EntryPatch) {
        if let Some(file_id) = &patch.file_id {
            self.file_id = file_id.clone();
        }
        if let Some(name) = &patch.file_name {
            self.file_name = name.clone();
        }
        if let Some(path) = &patch.file_path {
            self.file_path = path.clone();
        }
        if let Some(size) = patch.file_size {
            self.file_size = size;
        }
        if let Some(file_type) = &patch.file_type {
            self.file_type = Some(file_type.clone());
        }
        if let Some(url) = &patch.external_url {
            self.external_url = Some(url.clone());
        }
        if let Some(modified) = patch.last_modified {
            self.last_modified = modified;
        }
        if let Some(status) = patch.sync_status {
            self.sync_status = status;
        }
        if let Some(flag) = patch.deleted_in_a {
            self.deleted_in_a = flag;
        }
        if let Some(flag) = patch.deleted_in_b {
            self.deleted_in_b = flag;
        }
        if let Some(flag) = patch.ocr_analyzed {
            self.ocr_analyzed = flag;
        }
        if let Some(text) = &patch.extracted_text {
            self.extracted_text = Some(text.clone());
        }
        if let Some(data) = &patch.extracted_data {
            self.extracted_data = Some(data.clone());
        }
        if let Some(tags) = &patch.tags {
            self.tags = tags.clone();
        }
        if let Some(category) = &patch.category {
            self.category = Some(category.clone());
        }
        if let Some(checksum) = &patch.checksum {
            self.checksum = Some(checksum.clone());
        }
    }
}

/// Partial update of a workspace entry; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryPatch {
    pub file_id: Option<String>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<u64>,
    pub file_type: Option<String>,
    pub external_url: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub sync_status: Option<EntrySyncStatus>,
    pub deleted_in_a: Option<bool>,
    pub deleted_in_b: Option<bool>,
    pub ocr_analyzed: Option<bool>,
    pub extracted_text: Option<String>,
    pub extracted_data: Option<ExtractedData>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
    pub checksum: Option<String>,
}

impl EntryPatch {
    pub fn status(status: EntrySyncStatus) -> Self {
        Self {
            sync_status: Some(status),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Workspace database trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::workspace::{EntryPatch, EntrySyncStatus, WorkspaceStore};
///
/// async fn mark_synced(store: &dyn WorkspaceStore, file_id: &str) -> Result<()> {
///     store.update_entry(file_id, EntryPatch::status(EntrySyncStatus::Synced)).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Create an entry, returning it with its workspace id assigned
    async fn create_entry(&self, entry: WorkspaceEntry) -> Result<WorkspaceEntry>;

    /// Apply a partial update to the entry mirroring `file_id`
    async fn update_entry(&self, file_id: &str, patch: EntryPatch) -> Result<WorkspaceEntry>;

    /// Tombstone the entry mirroring `file_id`. Never hard-deletes.
    async fn delete_entry(&self, file_id: &str) -> Result<bool>;

    /// List every entry, tombstoned ones included
    async fn get_all_entries(&self) -> Result<Vec<WorkspaceEntry>>;

    /// Current entry mirroring `file_id`, the live one when a tombstone
    /// shares the id
    async fn get_entry(&self, file_id: &str) -> Result<Option<WorkspaceEntry>> {
        let mut matching: Vec<WorkspaceEntry> = self
            .get_all_entries()
            .await?
            .into_iter()
            .filter(|e| e.file_id == file_id)
            .collect();
        let live = matching.iter().position(|e| !e.is_tombstoned());
        Ok(match live {
            Some(idx) => Some(matching.swap_remove(idx)),
            None => matching.pop(),
        })
    }

    /// Full-text search over entries
    async fn search_entries(&self, query: &str) -> Result<Vec<WorkspaceEntry>>;

    /// Fetch the file attached to an entry (used when mirroring into the file store)
    async fn download_attachment(&self, entry: &WorkspaceEntry) -> Result<Bytes>;
}

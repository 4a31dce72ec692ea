//! # Change Events
//!
//! Typed change notifications produced by the source watchers.
//!
//! A [`ChangeEvent`] describes one observed difference between two
//! consecutive listings of a source and carries a snapshot of the record
//! that changed, so the router can refresh its caches without another
//! round-trip.

use bridge_traits::{FileRecord, WorkspaceEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// One side of the synchronization pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Cloud file store
    A,
    /// Workspace database
    B,
}

impl Source {
    pub fn opposite(&self) -> Source {
        match self {
            Source::A => Source::B,
            Source::B => Source::A,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::A => "A",
            Source::B => "B",
        }
    }
}

impl FromStr for Source {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "A" | "a" => Ok(Source::A),
            "B" | "b" => Ok(Source::B),
            _ => Err(SyncError::InvalidStatus(format!("Unknown source: {}", s))),
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of change observed between two listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
    Moved,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Created => "created",
            ChangeType::Modified => "modified",
            ChangeType::Deleted => "deleted",
            ChangeType::Moved => "moved",
        }
    }
}

impl FromStr for ChangeType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(ChangeType::Created),
            "modified" => Ok(ChangeType::Modified),
            "deleted" => Ok(ChangeType::Deleted),
            "moved" => Ok(ChangeType::Moved),
            _ => Err(SyncError::InvalidStatus(format!("Unknown change type: {}", s))),
        }
    }
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of the record that changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "lowercase")]
pub enum ChangeMetadata {
    File(FileRecord),
    Entry(WorkspaceEntry),
}

impl ChangeMetadata {
    pub fn path(&self) -> &str {
        match self {
            ChangeMetadata::File(record) => &record.path,
            ChangeMetadata::Entry(entry) => &entry.file_path,
        }
    }
}

/// A change observed on one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: Uuid,
    pub change_type: ChangeType,
    pub source: Source,
    pub timestamp: DateTime<Utc>,
    pub file_id: String,
    pub file_name: String,
    pub old_path: Option<String>,
    pub new_path: Option<String>,
    pub metadata: ChangeMetadata,
}

impl ChangeEvent {
    /// Change observed on the file store
    pub fn from_file(change_type: ChangeType, record: &FileRecord, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            change_type,
            source: Source::A,
            timestamp,
            file_id: record.id.clone(),
            file_name: record.name.clone(),
            old_path: None,
            new_path: Some(record.path.clone()),
            metadata: ChangeMetadata::File(record.clone()),
        }
    }

    /// Change observed on the workspace
    pub fn from_entry(
        change_type: ChangeType,
        entry: &WorkspaceEntry,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            change_type,
            source: Source::B,
            timestamp,
            file_id: entry.file_id.clone(),
            file_name: entry.file_name.clone(),
            old_path: None,
            new_path: Some(entry.file_path.clone()),
            metadata: ChangeMetadata::Entry(entry.clone()),
        }
    }

    pub fn with_old_path(mut self, old_path: impl Into<String>) -> Self {
        self.old_path = Some(old_path.into());
        self
    }

    pub fn file_record(&self) -> Option<&FileRecord> {
        match &self.metadata {
            ChangeMetadata::File(record) => Some(record),
            ChangeMetadata::Entry(_) => None,
        }
    }

    pub fn entry(&self) -> Option<&WorkspaceEntry> {
        match &self.metadata {
            ChangeMetadata::Entry(entry) => Some(entry),
            ChangeMetadata::File(_) => None,
        }
    }
}

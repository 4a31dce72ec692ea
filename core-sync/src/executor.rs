//! # Operation Executor
//!
//! Performs the collaborator writes of a [`SyncOperation`].
//!
//! Execution is idempotent against the orchestrator's caches: writes whose
//! effect is already present on the target become no-ops, so the echo
//! events produced by the engine's own writes converge instead of bouncing
//! between the sources.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::storage::parent_folder;
use bridge_traits::{
    BridgeError, EntryPatch, EntrySyncStatus, FileRecord, FileStore, WorkspaceEntry,
    WorkspaceStore,
};
use tracing::{debug, instrument, warn};

use crate::error::{Result, SyncError};
use crate::mirror::{entry_from_record, patch_from_record};
use crate::operation::{OperationType, SyncOperation, TargetAction};

/// Effect of a successful execution on the two sources
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    pub summary: String,
    /// New state of the file store record, when written
    pub file: Option<FileRecord>,
    /// New state of the workspace entry, when written
    pub entry: Option<WorkspaceEntry>,
    pub file_deleted: bool,
    pub entry_tombstoned: bool,
    /// Previous file id of an entry that was re-keyed to an uploaded file
    pub rekeyed_from: Option<String>,
}

impl ExecutionOutcome {
    fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            ..Default::default()
        }
    }

    pub fn is_noop(&self) -> bool {
        self.file.is_none()
            && self.entry.is_none()
            && !self.file_deleted
            && !self.entry_tombstoned
    }
}

pub struct OperationExecutor {
    file_store: Arc<dyn FileStore>,
    workspace: Arc<dyn WorkspaceStore>,
    timeout: Option<Duration>,
}

impl OperationExecutor {
    pub fn new(
        file_store: Arc<dyn FileStore>,
        workspace: Arc<dyn WorkspaceStore>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            file_store,
            workspace,
            timeout,
        }
    }

    /// Execute one operation given the last known state of its file on
    /// both sides
    #[instrument(
        skip(self, op, known_file, known_entry),
        fields(
            operation_id = %op.id,
            operation_type = %op.operation_type,
            file_id = %op.file_id
        )
    )]
    pub async fn execute(
        &self,
        op: &SyncOperation,
        known_file: Option<&FileRecord>,
        known_entry: Option<&WorkspaceEntry>,
    ) -> Result<ExecutionOutcome> {
        let live_entry = known_entry.filter(|e| !e.is_tombstoned());
        let live_file = known_file.filter(|f| !f.deleted);

        match &op.target_action {
            TargetAction::MirrorFileToB { record } => {
                self.mirror_file(op.operation_type, record, known_entry).await
            }

            TargetAction::TombstoneInB { file_id } => {
                if live_entry.is_none() {
                    return Ok(ExecutionOutcome::new("Entry already tombstoned"));
                }
                self.call(self.workspace.delete_entry(file_id)).await?;
                Ok(ExecutionOutcome {
                    entry_tombstoned: true,
                    ..ExecutionOutcome::new("Tombstoned entry")
                })
            }

            TargetAction::MoveInB {
                file_id,
                new_path,
                new_name,
            } => {
                let Some(entry) = live_entry else {
                    return Ok(ExecutionOutcome::new("No live entry to move"));
                };
                if &entry.file_path == new_path {
                    return Ok(ExecutionOutcome::new("Entry already at path"));
                }
                let patch = EntryPatch {
                    file_path: Some(new_path.clone()),
                    file_name: Some(new_name.clone()),
                    ..Default::default()
                };
                let updated = self.call(self.workspace.update_entry(file_id, patch)).await?;
                Ok(ExecutionOutcome {
                    entry: Some(updated),
                    ..ExecutionOutcome::new(format!("Moved entry to {}", new_path))
                })
            }

            TargetAction::MirrorEntryToA { entry } => self.mirror_entry(entry, known_file).await,

            TargetAction::PlaceInA { file_id, path } => {
                let Some(file) = live_file else {
                    return Ok(ExecutionOutcome::new("No live file to place"));
                };
                let moved = if &file.path == path {
                    None
                } else {
                    Some(self.call(self.file_store.move_file(file_id, path)).await?)
                };

                // Content never travels from the workspace into the store, so
                // the entry takes the facts of the file it now points at.
                let placed = moved.as_ref().unwrap_or(file);
                let settled = match live_entry {
                    Some(entry)
                        if entry.sync_status != EntrySyncStatus::Conflict
                            && !entry_matches(entry, placed) =>
                    {
                        Some(
                            self.call(
                                self.workspace
                                    .update_entry(file_id, patch_from_record(placed)),
                            )
                            .await?,
                        )
                    }
                    _ => None,
                };

                let summary = match (&moved, &settled) {
                    (Some(_), _) => format!("Moved file to {}", path),
                    (None, Some(_)) => "Settled entry on file facts".to_string(),
                    (None, None) => "File already at path".to_string(),
                };
                Ok(ExecutionOutcome {
                    file: moved,
                    entry: settled,
                    ..ExecutionOutcome::new(summary)
                })
            }

            TargetAction::DeleteFromA { file_id } => {
                if live_file.is_none() {
                    return Ok(ExecutionOutcome::new("File already absent"));
                }
                let existed = self.call(self.file_store.delete(file_id)).await?;
                if !existed {
                    debug!("File was already gone from the store");
                }
                Ok(ExecutionOutcome {
                    file_deleted: true,
                    ..ExecutionOutcome::new("Deleted file")
                })
            }

            TargetAction::CreateCopyInB { entry } => {
                let written = match live_entry {
                    Some(_) => {
                        let patch = EntryPatch {
                            file_name: Some(entry.file_name.clone()),
                            file_path: Some(entry.file_path.clone()),
                            sync_status: Some(entry.sync_status),
                            ..Default::default()
                        };
                        self.call(self.workspace.update_entry(&entry.file_id, patch))
                            .await?
                    }
                    None => self.call(self.workspace.create_entry(entry.clone())).await?,
                };
                Ok(ExecutionOutcome {
                    entry: Some(written),
                    ..ExecutionOutcome::new(format!("Preserved copy {}", entry.file_name))
                })
            }
        }
    }

    async fn mirror_file(
        &self,
        operation_type: OperationType,
        record: &FileRecord,
        known_entry: Option<&WorkspaceEntry>,
    ) -> Result<ExecutionOutcome> {
        match known_entry {
            Some(entry) if !entry.is_tombstoned() => {
                if entry_matches(entry, record) {
                    return Ok(ExecutionOutcome::new("Entry already mirrors file"));
                }
                let updated = self
                    .call(self.workspace.update_entry(&record.id, patch_from_record(record)))
                    .await?;
                Ok(ExecutionOutcome {
                    entry: Some(updated),
                    ..ExecutionOutcome::new("Updated entry")
                })
            }
            Some(_) if operation_type != OperationType::CreateInB => {
                Ok(ExecutionOutcome::new("Entry is tombstoned"))
            }
            _ => {
                let url = match self.call(self.file_store.get_download_url(&record.id)).await {
                    Ok(url) => Some(url),
                    Err(e) => {
                        warn!(error = %e, "Download URL unavailable, creating entry without it");
                        None
                    }
                };
                let created = self
                    .call(self.workspace.create_entry(entry_from_record(record, url)))
                    .await?;
                Ok(ExecutionOutcome {
                    entry: Some(created),
                    ..ExecutionOutcome::new("Created entry")
                })
            }
        }
    }

    async fn mirror_entry(
        &self,
        entry: &WorkspaceEntry,
        known_file: Option<&FileRecord>,
    ) -> Result<ExecutionOutcome> {
        if entry.sync_status == EntrySyncStatus::Conflict {
            return Ok(ExecutionOutcome::new("Entry is parked for manual resolution"));
        }
        if entry.is_tombstoned() {
            return Ok(ExecutionOutcome::new("Entry is tombstoned"));
        }

        match known_file {
            Some(file) if file.deleted => Ok(ExecutionOutcome::new(
                "File was deleted in the store, not recreating",
            )),
            Some(file) if file.path == entry.file_path => {
                Ok(ExecutionOutcome::new("File already exists at path"))
            }
            Some(_) => {
                let moved = self
                    .call(self.file_store.move_file(&entry.file_id, &entry.file_path))
                    .await?;
                Ok(ExecutionOutcome {
                    file: Some(moved),
                    ..ExecutionOutcome::new(format!("Moved file to {}", entry.file_path))
                })
            }
            None => {
                let data = self.call(self.workspace.download_attachment(entry)).await?;
                let folder = parent_folder(&entry.file_path);
                let uploaded = self
                    .call(self.file_store.upload(data, &entry.file_name, &folder))
                    .await?;

                let patch = EntryPatch {
                    file_id: Some(uploaded.id.clone()),
                    file_path: Some(uploaded.path.clone()),
                    file_size: Some(uploaded.size),
                    last_modified: Some(uploaded.modified_at),
                    sync_status: Some(EntrySyncStatus::Synced),
                    ..Default::default()
                };
                let rekeyed = self
                    .call(self.workspace.update_entry(&entry.file_id, patch))
                    .await?;

                Ok(ExecutionOutcome {
                    summary: format!("Uploaded {} as {}", entry.file_name, uploaded.id),
                    file: Some(uploaded),
                    entry: Some(rekeyed),
                    rekeyed_from: Some(entry.file_id.clone()),
                    ..Default::default()
                })
            }
        }
    }

    async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, BridgeError>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| SyncError::Timeout(limit.as_millis() as u64))?
                .map_err(SyncError::from),
            None => fut.await.map_err(SyncError::from),
        }
    }
}

/// Whether the entry already carries the record's file facts
fn entry_matches(entry: &WorkspaceEntry, record: &FileRecord) -> bool {
    entry.file_name == record.name
        && entry.file_path == record.path
        && entry.file_size == record.size
        && entry.last_modified == record.modified_at
        && (record.checksum.is_none() || entry.checksum == record.checksum)
}

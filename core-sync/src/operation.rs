//! # Sync Operations
//!
//! Directed write operations against one source, with a validated status
//! state machine and bounded retry bookkeeping.
//!
//! ## State Machine
//!
//! ```text
//! Pending → InProgress → Completed
//!    ↑          │
//!    └──────────┤ (failure, attempts < max_attempts)
//!               ↓
//!             Failed (attempts == max_attempts, or not retryable)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::operation::SyncOperation;
//!
//! let mut op = SyncOperation::from_event(&event, 3, clock.now())?;
//! op.start_attempt(clock.now())?;
//! match executor.execute(&op, &context).await {
//!     Ok(outcome) => op.complete(outcome.summary)?,
//!     Err(e) => {
//!         op.record_failure(e.to_string(), true, retry_delay, clock.now())?;
//!     }
//! }
//! ```

use bridge_traits::{EntrySyncStatus, FileRecord, WorkspaceEntry};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::change::{ChangeEvent, ChangeMetadata, ChangeType, Source};
use crate::conflict::{ActionKind, ConflictResolution, ConflictType, SyncConflict};
use crate::conflict_resolver::copy_file_id;
use crate::error::{Result, SyncError};
use crate::mirror::{entry_from_record, name_of, rename_in_path};

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a sync operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an operation ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| SyncError::InvalidOperationId(e.to_string()))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Operation Types
// ============================================================================

/// Direction-qualified operation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    CreateInA,
    UpdateInA,
    DeleteInA,
    MoveInA,
    CreateInB,
    UpdateInB,
    DeleteInB,
    MoveInB,
}

impl OperationType {
    /// Operation mirroring a change observed on `source` onto the other side
    pub fn for_change(change_type: ChangeType, source: Source) -> Self {
        match (source.opposite(), change_type) {
            (Source::A, ChangeType::Created) => OperationType::CreateInA,
            (Source::A, ChangeType::Modified) => OperationType::UpdateInA,
            (Source::A, ChangeType::Deleted) => OperationType::DeleteInA,
            (Source::A, ChangeType::Moved) => OperationType::MoveInA,
            (Source::B, ChangeType::Created) => OperationType::CreateInB,
            (Source::B, ChangeType::Modified) => OperationType::UpdateInB,
            (Source::B, ChangeType::Deleted) => OperationType::DeleteInB,
            (Source::B, ChangeType::Moved) => OperationType::MoveInB,
        }
    }

    /// Side the operation writes to
    pub fn target(&self) -> Source {
        match self {
            OperationType::CreateInA
            | OperationType::UpdateInA
            | OperationType::DeleteInA
            | OperationType::MoveInA => Source::A,
            _ => Source::B,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::CreateInA => "create_in_a",
            OperationType::UpdateInA => "update_in_a",
            OperationType::DeleteInA => "delete_in_a",
            OperationType::MoveInA => "move_in_a",
            OperationType::CreateInB => "create_in_b",
            OperationType::UpdateInB => "update_in_b",
            OperationType::DeleteInB => "delete_in_b",
            OperationType::MoveInB => "move_in_b",
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The collaborator write an operation performs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TargetAction {
    /// Create or update the entry mirroring a file store record
    MirrorFileToB { record: FileRecord },
    /// Tombstone the entry in the workspace
    TombstoneInB { file_id: String },
    /// Change the path of the entry
    MoveInB {
        file_id: String,
        new_path: String,
        new_name: String,
    },
    /// Upload the entry's attachment into the file store
    MirrorEntryToA { entry: WorkspaceEntry },
    /// Bring the file store path in line with `path`
    PlaceInA { file_id: String, path: String },
    DeleteFromA { file_id: String },
    /// Create a preserved copy entry in the workspace
    CreateCopyInB { entry: WorkspaceEntry },
}

impl TargetAction {
    pub fn file_id(&self) -> &str {
        match self {
            TargetAction::MirrorFileToB { record } => &record.id,
            TargetAction::TombstoneInB { file_id }
            | TargetAction::MoveInB { file_id, .. }
            | TargetAction::PlaceInA { file_id, .. }
            | TargetAction::DeleteFromA { file_id } => file_id,
            TargetAction::MirrorEntryToA { entry } | TargetAction::CreateCopyInB { entry } => {
                &entry.file_id
            }
        }
    }
}

// ============================================================================
// Status Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::InProgress => "in_progress",
            OperationStatus::Completed => "completed",
            OperationStatus::Failed => "failed",
        }
    }
}

impl FromStr for OperationStatus {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(OperationStatus::Pending),
            "in_progress" => Ok(OperationStatus::InProgress),
            "completed" => Ok(OperationStatus::Completed),
            "failed" => Ok(OperationStatus::Failed),
            _ => Err(SyncError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Sync Operation Entity
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: OperationId,
    pub operation_type: OperationType,
    /// File the operation concerns (the copy's id for keep-both copies)
    pub file_id: String,
    pub source_event: Option<ChangeEvent>,
    pub target_action: TargetAction,
    pub status: OperationStatus,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub next_attempt: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<String>,
    /// Set when the operation applies a conflict resolution
    pub conflict_id: Option<String>,
}

impl SyncOperation {
    pub fn new(
        operation_type: OperationType,
        target_action: TargetAction,
        max_attempts: u32,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OperationId::new(),
            operation_type,
            file_id: target_action.file_id().to_string(),
            source_event: None,
            target_action,
            status: OperationStatus::Pending,
            attempts: 0,
            max_attempts: max_attempts.max(1),
            created_at,
            last_attempt: None,
            next_attempt: None,
            error: None,
            result: None,
            conflict_id: None,
        }
    }

    /// The single operation mirroring a change event onto the opposite source
    ///
    /// # Errors
    ///
    /// Returns an error if the event's snapshot does not belong to its source
    pub fn from_event(event: &ChangeEvent, max_attempts: u32, now: DateTime<Utc>) -> Result<Self> {
        let operation_type = OperationType::for_change(event.change_type, event.source);

        let target_action = match (&event.metadata, event.change_type) {
            (ChangeMetadata::File(record), ChangeType::Created | ChangeType::Modified) => {
                TargetAction::MirrorFileToB {
                    record: record.clone(),
                }
            }
            (ChangeMetadata::File(record), ChangeType::Deleted) => TargetAction::TombstoneInB {
                file_id: record.id.clone(),
            },
            (ChangeMetadata::File(record), ChangeType::Moved) => TargetAction::MoveInB {
                file_id: record.id.clone(),
                new_path: record.path.clone(),
                new_name: record.name.clone(),
            },
            (ChangeMetadata::Entry(entry), ChangeType::Created) => TargetAction::MirrorEntryToA {
                entry: entry.clone(),
            },
            (ChangeMetadata::Entry(entry), ChangeType::Modified | ChangeType::Moved) => {
                TargetAction::PlaceInA {
                    file_id: entry.file_id.clone(),
                    path: entry.file_path.clone(),
                }
            }
            (ChangeMetadata::Entry(entry), ChangeType::Deleted) => TargetAction::DeleteFromA {
                file_id: entry.file_id.clone(),
            },
        };

        let snapshot_source = match event.metadata {
            ChangeMetadata::File(_) => Source::A,
            ChangeMetadata::Entry(_) => Source::B,
        };
        if snapshot_source != event.source {
            return Err(SyncError::InvalidInput {
                field: "metadata".to_string(),
                message: format!(
                    "Event from source {} carries a snapshot of source {}",
                    event.source, snapshot_source
                ),
            });
        }

        let mut op = Self::new(operation_type, target_action, max_attempts, now);
        op.source_event = Some(event.clone());
        Ok(op)
    }

    /// Operations applying a validated resolution
    ///
    /// # Errors
    ///
    /// Returns `ResolutionRejected` when the conflict lacks the state the
    /// action needs
    pub fn from_resolution(
        conflict: &SyncConflict,
        resolution: &ConflictResolution,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Self>> {
        let missing = |what: &str| SyncError::ResolutionRejected {
            conflict_id: conflict.id.clone(),
            reason: format!("{} requires {}", resolution.action.kind.as_str(), what),
        };
        let details = &resolution.action.details;
        let file_id = conflict.file_id.clone();

        let planned: Vec<(OperationType, TargetAction)> = match resolution.action.kind {
            ActionKind::NoOp | ActionKind::Manual => Vec::new(),
            ActionKind::UpdateB => {
                let record = conflict.state_a.clone().ok_or_else(|| missing("state A"))?;
                vec![(OperationType::UpdateInB, TargetAction::MirrorFileToB { record })]
            }
            ActionKind::UpdateA => {
                let entry = conflict.state_b.as_ref().ok_or_else(|| missing("state B"))?;
                vec![(
                    OperationType::UpdateInA,
                    TargetAction::PlaceInA {
                        file_id,
                        path: entry.file_path.clone(),
                    },
                )]
            }
            ActionKind::DeleteB => vec![(OperationType::DeleteInB, TargetAction::TombstoneInB { file_id })],
            ActionKind::DeleteA => vec![(OperationType::DeleteInA, TargetAction::DeleteFromA { file_id })],
            ActionKind::MoveB => {
                let path = details.target_path.clone().ok_or_else(|| missing("a target path"))?;
                vec![(
                    OperationType::MoveInB,
                    TargetAction::MoveInB {
                        file_id,
                        new_name: name_of(&path).to_string(),
                        new_path: path,
                    },
                )]
            }
            ActionKind::MoveA => {
                let path = details.target_path.clone().ok_or_else(|| missing("a target path"))?;
                vec![(OperationType::MoveInA, TargetAction::PlaceInA { file_id, path })]
            }
            ActionKind::Merge => {
                let record = conflict.state_a.as_ref().ok_or_else(|| missing("state A"))?;
                let path = details.target_path.clone().unwrap_or_else(|| record.path.clone());
                let mut merged = record.clone();
                merged.name = name_of(&path).to_string();
                merged.path = path.clone();

                let mut planned = vec![(
                    OperationType::UpdateInB,
                    TargetAction::MirrorFileToB { record: merged },
                )];
                if path != record.path {
                    planned.push((OperationType::MoveInA, TargetAction::PlaceInA { file_id, path }));
                }
                planned
            }
            ActionKind::KeepBoth => {
                let copy_name = details.copy_name.clone().ok_or_else(|| missing("a copy name"))?;
                keep_both_actions(conflict, &copy_name).ok_or_else(|| missing("state A or B"))?
            }
        };

        Ok(planned
            .into_iter()
            .map(|(operation_type, action)| {
                let mut op = Self::new(operation_type, action, max_attempts, now);
                op.conflict_id = Some(conflict.id.clone());
                op
            })
            .collect())
    }

    /// Begin an execution attempt
    ///
    /// # Errors
    ///
    /// Returns an error if the operation is not pending
    pub fn start_attempt(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.validate_transition(OperationStatus::InProgress)?;
        self.status = OperationStatus::InProgress;
        self.attempts += 1;
        self.last_attempt = Some(now);
        self.next_attempt = None;
        Ok(())
    }

    /// Mark the current attempt as successful
    pub fn complete(&mut self, result: impl Into<String>) -> Result<()> {
        self.validate_transition(OperationStatus::Completed)?;
        self.status = OperationStatus::Completed;
        self.result = Some(result.into());
        self.error = None;
        Ok(())
    }

    /// Record a failed attempt and return the resulting status.
    ///
    /// The operation goes back to `Pending` (due after `retry_delay`) while
    /// attempts remain and `retry` is allowed, and is permanently `Failed`
    /// otherwise.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        retry: bool,
        retry_delay: Duration,
        now: DateTime<Utc>,
    ) -> Result<OperationStatus> {
        if self.status != OperationStatus::InProgress {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: "failure".to_string(),
                reason: "Only an in-progress operation can fail".to_string(),
            });
        }

        self.error = Some(error.into());
        if retry && self.can_retry() {
            self.status = OperationStatus::Pending;
            self.next_attempt = Some(now + retry_delay);
        } else {
            self.status = OperationStatus::Failed;
            self.next_attempt = None;
        }
        Ok(self.status)
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.max_attempts
    }

    /// Whether a pending operation may run at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt.map_or(true, |at| at <= now)
    }

    fn validate_transition(&self, to: OperationStatus) -> Result<()> {
        let valid = matches!(
            (self.status, to),
            (OperationStatus::Pending, OperationStatus::InProgress)
                | (OperationStatus::InProgress, OperationStatus::Completed)
                | (OperationStatus::InProgress, OperationStatus::Failed)
                | (OperationStatus::InProgress, OperationStatus::Pending)
        );

        if !valid {
            return Err(SyncError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

fn keep_both_actions(
    conflict: &SyncConflict,
    copy_name: &str,
) -> Option<Vec<(OperationType, TargetAction)>> {
    match (&conflict.state_a, &conflict.state_b) {
        // The workspace version is preserved as a flagged copy, the original
        // entry then follows the file store
        (state_a, Some(entry))
            if entry.file_id == conflict.file_id
                && conflict.conflict_type != ConflictType::NamingConflict =>
        {
            let mut copy = entry.clone();
            copy.id = String::new();
            copy.file_id = copy_file_id(&conflict.file_id, Source::B);
            copy.file_name = copy_name.to_string();
            copy.file_path = rename_in_path(&entry.file_path, copy_name);
            copy.sync_status = EntrySyncStatus::Conflict;

            let mut planned = vec![(
                OperationType::CreateInB,
                TargetAction::CreateCopyInB { entry: copy },
            )];
            if let Some(record) = state_a {
                planned.push((
                    OperationType::UpdateInB,
                    TargetAction::MirrorFileToB {
                        record: record.clone(),
                    },
                ));
            }
            Some(planned)
        }
        // Another entry occupies the path: mirror the file under the
        // suggested name, flagged for rename
        (Some(record), _) => {
            let mut entry = entry_from_record(record, None);
            entry.file_name = copy_name.to_string();
            entry.file_path = rename_in_path(&record.path, copy_name);
            entry.sync_status = EntrySyncStatus::Conflict;
            Some(vec![(
                OperationType::CreateInB,
                TargetAction::CreateCopyInB { entry },
            )])
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::{ResolutionAction, ResolutionDetails, ResolutionStrategy, ResolvedBy};

    fn record(id: &str, path: &str) -> FileRecord {
        FileRecord::new(id, name_of(path), path, 100, Utc::now())
    }

    fn resolution(conflict: &SyncConflict, kind: ActionKind, details: ResolutionDetails) -> ConflictResolution {
        ConflictResolution {
            conflict_id: conflict.id.clone(),
            strategy: ResolutionStrategy::LatestWins,
            action: ResolutionAction { kind, details },
            resolved_at: Utc::now(),
            resolved_by: ResolvedBy::System,
            notes: None,
        }
    }

    #[test]
    fn test_operation_id() {
        let id = OperationId::new();
        assert_eq!(OperationId::from_string(&id.as_str()).unwrap(), id);
        assert!(OperationId::from_string("not-a-uuid").is_err());
    }

    #[test]
    fn test_each_change_maps_to_opposite_side() {
        let file = record("f1", "/a.pdf");
        let entry = WorkspaceEntry::new("f1", "a.pdf", "/a.pdf", Utc::now());

        for change in [
            ChangeType::Created,
            ChangeType::Modified,
            ChangeType::Deleted,
            ChangeType::Moved,
        ] {
            let from_a = ChangeEvent::from_file(change, &file, Utc::now());
            let op = SyncOperation::from_event(&from_a, 3, Utc::now()).unwrap();
            assert_eq!(op.operation_type.target(), Source::B);
            assert_eq!(op.file_id, "f1");

            let from_b = ChangeEvent::from_entry(change, &entry, Utc::now());
            let op = SyncOperation::from_event(&from_b, 3, Utc::now()).unwrap();
            assert_eq!(op.operation_type.target(), Source::A);
            assert_eq!(op.source_event.as_ref().unwrap().id, from_b.id);
        }
    }

    #[test]
    fn test_mismatched_snapshot_rejected() {
        let file = record("f1", "/a.pdf");
        let mut event = ChangeEvent::from_file(ChangeType::Created, &file, Utc::now());
        event.source = Source::B;
        assert!(SyncOperation::from_event(&event, 3, Utc::now()).is_err());
    }

    #[test]
    fn test_retry_bookkeeping() {
        let now = Utc::now();
        let mut op = SyncOperation::new(
            OperationType::DeleteInA,
            TargetAction::DeleteFromA {
                file_id: "f1".to_string(),
            },
            2,
            now,
        );

        op.start_attempt(now).unwrap();
        let status = op.record_failure("reset", true, Duration::seconds(5), now).unwrap();
        assert_eq!(status, OperationStatus::Pending);
        assert!(!op.is_due(now));
        assert!(op.is_due(now + Duration::seconds(5)));

        op.start_attempt(now).unwrap();
        let status = op.record_failure("reset", true, Duration::seconds(5), now).unwrap();
        assert_eq!(status, OperationStatus::Failed);
        assert_eq!(op.attempts, 2);
        assert!(op.start_attempt(now).is_err());
    }

    #[test]
    fn test_non_retryable_failure_is_terminal() {
        let now = Utc::now();
        let mut op = SyncOperation::new(
            OperationType::DeleteInA,
            TargetAction::DeleteFromA {
                file_id: "f1".to_string(),
            },
            3,
            now,
        );
        op.start_attempt(now).unwrap();
        let status = op.record_failure("denied", false, Duration::seconds(5), now).unwrap();
        assert_eq!(status, OperationStatus::Failed);
        assert_eq!(op.attempts, 1);
    }

    #[test]
    fn test_completion_requires_attempt() {
        let mut op = SyncOperation::new(
            OperationType::DeleteInB,
            TargetAction::TombstoneInB {
                file_id: "f1".to_string(),
            },
            3,
            Utc::now(),
        );
        assert!(op.complete("done").is_err());
        op.start_attempt(Utc::now()).unwrap();
        op.complete("done").unwrap();
        assert!(op.status.is_terminal());
    }

    #[test]
    fn test_delete_resolution_targets_b() {
        let a = record("f3", "/c.pdf");
        let mut b = WorkspaceEntry::new("f3", "c.pdf", "/c.pdf", Utc::now());
        b.deleted_in_a = true;
        let conflict = SyncConflict::new(ConflictType::DeleteConflict, "f3", Some(a), Some(b), Utc::now());
        let res = resolution(&conflict, ActionKind::DeleteB, ResolutionDetails::default());

        let ops = SyncOperation::from_resolution(&conflict, &res, 3, Utc::now()).unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation_type, OperationType::DeleteInB);
        assert_eq!(ops[0].conflict_id.as_deref(), Some("delete_conflict:f3"));
    }

    #[test]
    fn test_keep_both_preserves_workspace_copy() {
        let a = record("f1", "/Docs/a.pdf").with_checksum("aaa");
        let mut b = WorkspaceEntry::new("f1", "a.pdf", "/Docs/a.pdf", a.modified_at);
        b.checksum = Some("bbb".to_string());
        let conflict = SyncConflict::new(ConflictType::HashMismatch, "f1", Some(a), Some(b), Utc::now());
        let res = resolution(
            &conflict,
            ActionKind::KeepBoth,
            ResolutionDetails {
                copy_name: Some("a (B copy 12345678).pdf".to_string()),
                ..Default::default()
            },
        );

        let ops = SyncOperation::from_resolution(&conflict, &res, 3, Utc::now()).unwrap();
        assert_eq!(ops.len(), 2);
        match &ops[0].target_action {
            TargetAction::CreateCopyInB { entry } => {
                assert_eq!(entry.file_path, "/Docs/a (B copy 12345678).pdf");
                assert_eq!(entry.sync_status, EntrySyncStatus::Conflict);
                assert_ne!(entry.file_id, "f1");
                assert_eq!(ops[0].file_id, entry.file_id);
            }
            other => panic!("unexpected action {:?}", other),
        }
        assert_eq!(ops[1].operation_type, OperationType::UpdateInB);
    }

    #[test]
    fn test_merge_moves_a_when_b_path_is_newer() {
        let a = record("f1", "/a.pdf");
        let b = WorkspaceEntry::new("f1", "a.pdf", "/Archive/a.pdf", Utc::now());
        let conflict = SyncConflict::new(ConflictType::SimultaneousEdit, "f1", Some(a), Some(b), Utc::now());
        let res = resolution(
            &conflict,
            ActionKind::Merge,
            ResolutionDetails {
                target_path: Some("/Archive/a.pdf".to_string()),
                ..Default::default()
            },
        );

        let ops = SyncOperation::from_resolution(&conflict, &res, 3, Utc::now()).unwrap();
        let types: Vec<_> = ops.iter().map(|op| op.operation_type).collect();
        assert_eq!(types, vec![OperationType::UpdateInB, OperationType::MoveInA]);
    }

    #[test]
    fn test_missing_state_is_rejected() {
        let conflict = SyncConflict::new(ConflictType::MoveConflict, "f1", None, None, Utc::now());
        let res = resolution(&conflict, ActionKind::MoveB, ResolutionDetails::default());
        assert!(matches!(
            SyncOperation::from_resolution(&conflict, &res, 3, Utc::now()),
            Err(SyncError::ResolutionRejected { .. })
        ));
    }
}

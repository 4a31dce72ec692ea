//! # Conflict Model
//!
//! Conflicts are divergences between the two sources that cannot be settled
//! by mirroring one side onto the other without a policy decision.
//!
//! Conflict ids are deterministic (`<type>:<file_id>`), so re-detecting the
//! same divergence on a later reconciliation pass updates the active
//! conflict instead of duplicating it.

use bridge_traits::{FileRecord, WorkspaceEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::change::Source;
use crate::error::{Result, SyncError};

// ============================================================================
// Conflict Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    /// Both sides changed within the drift window
    SimultaneousEdit,
    /// One side deleted the file, the other still has it
    DeleteConflict,
    /// Paths differ between the sides
    MoveConflict,
    /// Metadata agrees but content hashes differ
    HashMismatch,
    /// A different file already occupies the target path
    NamingConflict,
    /// A collaborator refused access
    AccessConflict,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::SimultaneousEdit => "simultaneous_edit",
            ConflictType::DeleteConflict => "delete_conflict",
            ConflictType::MoveConflict => "move_conflict",
            ConflictType::HashMismatch => "hash_mismatch",
            ConflictType::NamingConflict => "naming_conflict",
            ConflictType::AccessConflict => "access_conflict",
        }
    }

    pub fn default_severity(&self) -> ConflictSeverity {
        match self {
            ConflictType::MoveConflict => ConflictSeverity::Low,
            ConflictType::SimultaneousEdit | ConflictType::NamingConflict => {
                ConflictSeverity::Medium
            }
            ConflictType::DeleteConflict
            | ConflictType::HashMismatch
            | ConflictType::AccessConflict => ConflictSeverity::High,
        }
    }
}

impl FromStr for ConflictType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "simultaneous_edit" => Ok(ConflictType::SimultaneousEdit),
            "delete_conflict" => Ok(ConflictType::DeleteConflict),
            "move_conflict" => Ok(ConflictType::MoveConflict),
            "hash_mismatch" => Ok(ConflictType::HashMismatch),
            "naming_conflict" => Ok(ConflictType::NamingConflict),
            "access_conflict" => Ok(ConflictType::AccessConflict),
            _ => Err(SyncError::InvalidStatus(format!("Unknown conflict type: {}", s))),
        }
    }
}

impl std::fmt::Display for ConflictType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
}

impl ConflictSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictSeverity::Low => "low",
            ConflictSeverity::Medium => "medium",
            ConflictSeverity::High => "high",
        }
    }
}

/// Deterministic id of a conflict
pub fn conflict_id(conflict_type: ConflictType, file_id: &str) -> String {
    format!("{}:{}", conflict_type.as_str(), file_id)
}

/// A detected divergence between the two sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConflict {
    pub id: String,
    pub conflict_type: ConflictType,
    pub severity: ConflictSeverity,
    pub file_id: String,
    /// File store state at detection time
    pub state_a: Option<FileRecord>,
    /// Workspace state at detection time
    pub state_b: Option<WorkspaceEntry>,
    pub timestamp: DateTime<Utc>,
    pub needs_manual_intervention: bool,
}

impl SyncConflict {
    pub fn new(
        conflict_type: ConflictType,
        file_id: impl Into<String>,
        state_a: Option<FileRecord>,
        state_b: Option<WorkspaceEntry>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let file_id = file_id.into();
        Self {
            id: conflict_id(conflict_type, &file_id),
            conflict_type,
            severity: conflict_type.default_severity(),
            file_id,
            state_a,
            state_b,
            timestamp,
            needs_manual_intervention: conflict_type == ConflictType::AccessConflict,
        }
    }

    /// Whether the file store side is deleted, either observed directly or
    /// recorded on the workspace entry
    pub fn deleted_in_a(&self) -> bool {
        let record_deleted = self.state_a.as_ref().map_or(true, |a| a.deleted);
        let flagged = self.state_b.as_ref().is_some_and(|b| b.deleted_in_a);
        record_deleted || flagged
    }

    /// Whether the workspace side is tombstoned (or absent)
    pub fn deleted_in_b(&self) -> bool {
        self.state_b.as_ref().map_or(true, |b| b.is_tombstoned())
    }
}

// ============================================================================
// Resolutions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    #[default]
    LatestWins,
    AWins,
    BWins,
    /// A's content facts, the newer side's location, B's enrichment fields
    SmartMerge,
    KeepBoth,
    ManualResolve,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::LatestWins => "latest_wins",
            ResolutionStrategy::AWins => "a_wins",
            ResolutionStrategy::BWins => "b_wins",
            ResolutionStrategy::SmartMerge => "smart_merge",
            ResolutionStrategy::KeepBoth => "keep_both",
            ResolutionStrategy::ManualResolve => "manual_resolve",
        }
    }
}

impl FromStr for ResolutionStrategy {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "latest_wins" => Ok(ResolutionStrategy::LatestWins),
            "a_wins" => Ok(ResolutionStrategy::AWins),
            "b_wins" => Ok(ResolutionStrategy::BWins),
            "smart_merge" => Ok(ResolutionStrategy::SmartMerge),
            "keep_both" => Ok(ResolutionStrategy::KeepBoth),
            "manual_resolve" => Ok(ResolutionStrategy::ManualResolve),
            _ => Err(SyncError::InvalidStatus(format!(
                "Unknown resolution strategy: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a resolution does to the two sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    NoOp,
    /// Mirror the file store state onto the workspace
    UpdateB,
    /// Mirror the workspace state onto the file store
    UpdateA,
    DeleteB,
    DeleteA,
    MoveB,
    MoveA,
    /// Combine both states (see [`ResolutionStrategy::SmartMerge`])
    Merge,
    /// Preserve both versions under distinct names
    KeepBoth,
    /// Left for an operator
    Manual,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::NoOp => "no_op",
            ActionKind::UpdateB => "update_b",
            ActionKind::UpdateA => "update_a",
            ActionKind::DeleteB => "delete_b",
            ActionKind::DeleteA => "delete_a",
            ActionKind::MoveB => "move_b",
            ActionKind::MoveA => "move_a",
            ActionKind::Merge => "merge",
            ActionKind::KeepBoth => "keep_both",
            ActionKind::Manual => "manual",
        }
    }
}

/// Structured record of how a resolution was reached
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionDetails {
    pub winner: Option<Source>,
    pub reason: String,
    pub timestamp_a: Option<DateTime<Utc>>,
    pub timestamp_b: Option<DateTime<Utc>>,
    /// Path to apply for move and merge actions
    pub target_path: Option<String>,
    /// Name of the preserved copy for keep-both actions
    pub copy_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionAction {
    pub kind: ActionKind,
    pub details: ResolutionDetails,
}

/// Who produced a resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "by", content = "name", rename_all = "lowercase")]
pub enum ResolvedBy {
    System,
    Operator(String),
}

impl ResolvedBy {
    pub fn is_system(&self) -> bool {
        matches!(self, ResolvedBy::System)
    }
}

impl std::fmt::Display for ResolvedBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedBy::System => write!(f, "system"),
            ResolvedBy::Operator(name) => write!(f, "operator:{}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub conflict_id: String,
    pub strategy: ResolutionStrategy,
    pub action: ResolutionAction,
    pub resolved_at: DateTime<Utc>,
    pub resolved_by: ResolvedBy,
    pub notes: Option<String>,
}

impl ConflictResolution {
    /// Resolution authored by an operator
    pub fn by_operator(
        conflict_id: impl Into<String>,
        operator: impl Into<String>,
        strategy: ResolutionStrategy,
        action: ResolutionAction,
        resolved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            conflict_id: conflict_id.into(),
            strategy,
            action,
            resolved_at,
            resolved_by: ResolvedBy::Operator(operator.into()),
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

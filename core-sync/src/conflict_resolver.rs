//! Conflict Resolution for Sync Operations
//!
//! Turns a detected [`SyncConflict`] into a [`ConflictResolution`] and checks
//! that a resolution (system or operator authored) fits the conflict.
//!
//! ## Policies
//!
//! | Conflict | Strategy | Action |
//! |---|---|---|
//! | simultaneous edit | configured default | per strategy, ties go to A |
//! | delete conflict | side carrying the deletion | delete on the other side |
//! | both deleted | latest wins | nothing |
//! | move conflict | latest wins | newer path applied to the older side |
//! | hash mismatch | keep both | workspace copy preserved, flagged |
//! | naming conflict | keep both | mirrored under a suggested name, flagged |
//! | access conflict | manual | never auto-applied |
//!
//! ## Usage
//!
//! ```no_run
//! use core_sync::conflict::{ConflictType, ResolutionStrategy, SyncConflict};
//! use core_sync::conflict_resolver::ConflictResolver;
//! use chrono::Utc;
//!
//! let resolver = ConflictResolver::new(ResolutionStrategy::LatestWins);
//! let conflict = SyncConflict::new(ConflictType::DeleteConflict, "f3", None, None, Utc::now());
//!
//! let resolution = resolver.resolve(&conflict, Utc::now());
//! resolver.validate(&conflict, &resolution).ok();
//! ```

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::change::Source;
use crate::conflict::{
    ActionKind, ConflictResolution, ConflictType, ResolutionAction, ResolutionDetails,
    ResolutionStrategy, ResolvedBy, SyncConflict,
};
use crate::error::{Result, SyncError};

/// Name of the preserved copy of `name` for the given side.
///
/// `<stem> (<side> copy <hash8>)<.ext>`, where `hash8` is the first eight hex
/// digits of the SHA-256 of the file id.
pub fn keep_both_name(name: &str, side: Source, file_id: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(file_id.as_bytes()));
    let tag = format!("({} copy {})", side.as_str(), &digest[..8]);

    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} {}.{}", stem, tag, ext),
        _ => format!("{} {}", name, tag),
    }
}

/// File id of the workspace copy preserved for `file_id`
pub fn copy_file_id(file_id: &str, side: Source) -> String {
    format!("{}#{}-copy", file_id, side.as_str().to_lowercase())
}

/// Conflict resolver for sync operations
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver {
    default_strategy: ResolutionStrategy,
}

impl ConflictResolver {
    /// Create a resolver applying `default_strategy` to simultaneous edits
    pub fn new(default_strategy: ResolutionStrategy) -> Self {
        Self { default_strategy }
    }

    pub fn default_strategy(&self) -> ResolutionStrategy {
        self.default_strategy
    }

    /// Decide how a conflict is settled
    #[instrument(skip(self, conflict), fields(conflict_id = %conflict.id))]
    pub fn resolve(&self, conflict: &SyncConflict, now: DateTime<Utc>) -> ConflictResolution {
        let timestamp_a = conflict.state_a.as_ref().map(|a| a.modified_at);
        let timestamp_b = conflict.state_b.as_ref().map(|b| b.last_modified);
        let details = ResolutionDetails {
            timestamp_a,
            timestamp_b,
            ..Default::default()
        };

        let (strategy, kind, details) = match conflict.conflict_type {
            ConflictType::SimultaneousEdit => self.resolve_edit(conflict, details),
            ConflictType::DeleteConflict => resolve_delete(conflict, details),
            ConflictType::MoveConflict => resolve_move(conflict, details),
            ConflictType::HashMismatch => (
                ResolutionStrategy::KeepBoth,
                ActionKind::KeepBoth,
                ResolutionDetails {
                    reason: "Content hashes differ with matching metadata".to_string(),
                    copy_name: conflict.state_b.as_ref().map(|b| {
                        keep_both_name(&b.file_name, Source::B, &conflict.file_id)
                    }),
                    ..details
                },
            ),
            ConflictType::NamingConflict => (
                ResolutionStrategy::KeepBoth,
                ActionKind::KeepBoth,
                ResolutionDetails {
                    reason: "Target path is held by another file".to_string(),
                    copy_name: conflict
                        .state_a
                        .as_ref()
                        .map(|a| keep_both_name(&a.name, Source::A, &conflict.file_id)),
                    ..details
                },
            ),
            ConflictType::AccessConflict => (
                ResolutionStrategy::ManualResolve,
                ActionKind::Manual,
                ResolutionDetails {
                    reason: "Access was refused by a collaborator".to_string(),
                    ..details
                },
            ),
        };

        debug!(
            strategy = strategy.as_str(),
            action = kind.as_str(),
            "Resolved conflict"
        );

        ConflictResolution {
            conflict_id: conflict.id.clone(),
            strategy,
            action: ResolutionAction { kind, details },
            resolved_at: now,
            resolved_by: ResolvedBy::System,
            notes: None,
        }
    }

    fn resolve_edit(
        &self,
        conflict: &SyncConflict,
        details: ResolutionDetails,
    ) -> (ResolutionStrategy, ActionKind, ResolutionDetails) {
        let (Some(a), Some(b)) = (&conflict.state_a, &conflict.state_b) else {
            return manual(details, "Edit conflict without both states");
        };
        let newer = newer_side(details.timestamp_a, details.timestamp_b);

        match self.default_strategy {
            ResolutionStrategy::LatestWins => {
                let kind = match newer {
                    Source::A => ActionKind::UpdateB,
                    Source::B => ActionKind::UpdateA,
                };
                let details = ResolutionDetails {
                    winner: Some(newer),
                    reason: format!("Source {} has the later modification", newer),
                    ..details
                };
                (ResolutionStrategy::LatestWins, kind, details)
            }
            ResolutionStrategy::AWins => (
                ResolutionStrategy::AWins,
                ActionKind::UpdateB,
                ResolutionDetails {
                    winner: Some(Source::A),
                    reason: "Source A wins by policy".to_string(),
                    ..details
                },
            ),
            ResolutionStrategy::BWins => (
                ResolutionStrategy::BWins,
                ActionKind::UpdateA,
                ResolutionDetails {
                    winner: Some(Source::B),
                    reason: "Source B wins by policy".to_string(),
                    ..details
                },
            ),
            ResolutionStrategy::SmartMerge => {
                let target_path = match newer {
                    Source::A => a.path.clone(),
                    Source::B => b.file_path.clone(),
                };
                (
                    ResolutionStrategy::SmartMerge,
                    ActionKind::Merge,
                    ResolutionDetails {
                        winner: Some(newer),
                        reason: "File facts from A, location from the newer side".to_string(),
                        target_path: Some(target_path),
                        ..details
                    },
                )
            }
            ResolutionStrategy::KeepBoth => (
                ResolutionStrategy::KeepBoth,
                ActionKind::KeepBoth,
                ResolutionDetails {
                    reason: "Both versions preserved".to_string(),
                    copy_name: Some(keep_both_name(&b.file_name, Source::B, &conflict.file_id)),
                    ..details
                },
            ),
            ResolutionStrategy::ManualResolve => manual(details, "Edit conflicts need an operator"),
        }
    }

    /// Check that `resolution` is applicable to `conflict`
    ///
    /// # Errors
    ///
    /// Returns `ResolutionRejected` describing the first violated rule
    pub fn validate(&self, conflict: &SyncConflict, resolution: &ConflictResolution) -> Result<()> {
        let reject = |reason: &str| {
            Err(SyncError::ResolutionRejected {
                conflict_id: conflict.id.clone(),
                reason: reason.to_string(),
            })
        };
        let details = &resolution.action.details;

        if resolution.conflict_id != conflict.id {
            return reject("Resolution targets a different conflict");
        }

        if conflict.conflict_type == ConflictType::AccessConflict
            && resolution.resolved_by.is_system()
            && resolution.action.kind != ActionKind::Manual
        {
            return reject("Access conflicts are only resolved by an operator");
        }

        match resolution.action.kind {
            ActionKind::KeepBoth if conflict.deleted_in_a() && conflict.deleted_in_b() => {
                reject("Nothing to keep when both sides are deleted")
            }
            ActionKind::KeepBoth if details.copy_name.is_none() => {
                reject("Keep both requires a copy name")
            }
            ActionKind::DeleteB if !conflict.deleted_in_a() => {
                reject("Deleting in B requires a deletion in A")
            }
            ActionKind::DeleteA if !conflict.deleted_in_b() => {
                reject("Deleting in A requires a deletion in B")
            }
            ActionKind::UpdateB | ActionKind::Merge if conflict.state_a.is_none() => {
                reject("Updating B requires the state of A")
            }
            ActionKind::UpdateA if conflict.state_b.is_none() => {
                reject("Updating A requires the state of B")
            }
            ActionKind::MoveA | ActionKind::MoveB if details.target_path.is_none() => {
                reject("Moves require a target path")
            }
            _ => Ok(()),
        }
    }
}

/// Side with the later timestamp; ties and missing timestamps favour A
fn newer_side(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Source {
    match (a, b) {
        (Some(a), Some(b)) if b > a => Source::B,
        (None, Some(_)) => Source::B,
        _ => Source::A,
    }
}

fn manual(
    details: ResolutionDetails,
    reason: &str,
) -> (ResolutionStrategy, ActionKind, ResolutionDetails) {
    (
        ResolutionStrategy::ManualResolve,
        ActionKind::Manual,
        ResolutionDetails {
            reason: reason.to_string(),
            ..details
        },
    )
}

fn resolve_delete(
    conflict: &SyncConflict,
    details: ResolutionDetails,
) -> (ResolutionStrategy, ActionKind, ResolutionDetails) {
    match (conflict.deleted_in_a(), conflict.deleted_in_b()) {
        (true, true) => (
            ResolutionStrategy::LatestWins,
            ActionKind::NoOp,
            ResolutionDetails {
                reason: "Deleted on both sides".to_string(),
                ..details
            },
        ),
        (true, false) => (
            ResolutionStrategy::AWins,
            ActionKind::DeleteB,
            ResolutionDetails {
                winner: Some(Source::A),
                reason: "Deleted in A".to_string(),
                ..details
            },
        ),
        (false, true) => (
            ResolutionStrategy::BWins,
            ActionKind::DeleteA,
            ResolutionDetails {
                winner: Some(Source::B),
                reason: "Deleted in B".to_string(),
                ..details
            },
        ),
        (false, false) => (
            ResolutionStrategy::LatestWins,
            ActionKind::NoOp,
            ResolutionDetails {
                reason: "No deletion observed".to_string(),
                ..details
            },
        ),
    }
}

fn resolve_move(
    conflict: &SyncConflict,
    details: ResolutionDetails,
) -> (ResolutionStrategy, ActionKind, ResolutionDetails) {
    let (Some(a), Some(b)) = (&conflict.state_a, &conflict.state_b) else {
        return manual(details, "Move conflict without both states");
    };

    let newer = newer_side(details.timestamp_a, details.timestamp_b);
    let (kind, target_path) = match newer {
        Source::A => (ActionKind::MoveB, a.path.clone()),
        Source::B => (ActionKind::MoveA, b.file_path.clone()),
    };

    (
        ResolutionStrategy::LatestWins,
        kind,
        ResolutionDetails {
            winner: Some(newer),
            reason: format!("Source {} holds the newer path", newer),
            target_path: Some(target_path),
            ..details
        },
    )
}

//! Full reconciliation planning.
//!
//! Compares the complete state of both sources over the union of file ids
//! and yields the operations and conflicts needed to bring them together.
//! Planning is pure; the orchestrator enqueues the result.

use std::collections::{BTreeSet, HashMap};

use bridge_traits::{EntrySyncStatus, FileRecord, WorkspaceEntry};
use chrono::{DateTime, Duration, Utc};

use crate::conflict::{ConflictType, SyncConflict};
use crate::operation::{OperationType, TargetAction};

/// Outcome of comparing the two sources
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub operations: Vec<(OperationType, TargetAction)>,
    pub conflicts: Vec<SyncConflict>,
}

/// Compare both sources and plan the work that converges them.
///
/// Entries flagged `conflict` are parked until an operator settles them and
/// are never planned against.
pub fn plan_reconciliation(
    files: &HashMap<String, FileRecord>,
    entries: &HashMap<String, WorkspaceEntry>,
    drift_window: Duration,
    now: DateTime<Utc>,
) -> ReconcilePlan {
    let mut plan = ReconcilePlan::default();
    let ids: BTreeSet<&String> = files.keys().chain(entries.keys()).collect();

    let mut by_path: HashMap<&str, Vec<&WorkspaceEntry>> = HashMap::new();
    for entry in entries.values().filter(|e| !e.is_tombstoned()) {
        by_path.entry(entry.file_path.as_str()).or_default().push(entry);
    }

    for id in ids {
        match (files.get(id), entries.get(id)) {
            (Some(file), None) => {
                if file.deleted {
                    continue;
                }
                let occupant = by_path
                    .get(file.path.as_str())
                    .and_then(|found| found.iter().find(|e| e.file_id != file.id));
                match occupant {
                    Some(other) => plan.conflicts.push(SyncConflict::new(
                        ConflictType::NamingConflict,
                        id.as_str(),
                        Some(file.clone()),
                        Some((*other).clone()),
                        now,
                    )),
                    None => plan.operations.push((
                        OperationType::CreateInB,
                        TargetAction::MirrorFileToB {
                            record: file.clone(),
                        },
                    )),
                }
            }

            (None, Some(entry)) => {
                if entry.is_tombstoned()
                    || entry.deleted_in_a
                    || entry.sync_status == EntrySyncStatus::Conflict
                {
                    continue;
                }
                plan.operations.push((
                    OperationType::CreateInA,
                    TargetAction::MirrorEntryToA {
                        entry: entry.clone(),
                    },
                ));
            }

            (Some(file), Some(entry)) => {
                compare_pair(file, entry, drift_window, now, &mut plan);
            }

            (None, None) => {}
        }
    }

    plan
}

fn compare_pair(
    file: &FileRecord,
    entry: &WorkspaceEntry,
    drift_window: Duration,
    now: DateTime<Utc>,
    plan: &mut ReconcilePlan,
) {
    if entry.sync_status == EntrySyncStatus::Conflict {
        return;
    }

    let conflict = |conflict_type| {
        SyncConflict::new(
            conflict_type,
            file.id.as_str(),
            Some(file.clone()),
            Some(entry.clone()),
            now,
        )
    };

    let deleted_in_a = file.deleted || entry.deleted_in_a;
    let deleted_in_b = entry.is_tombstoned();
    if deleted_in_a != deleted_in_b {
        plan.conflicts.push(conflict(ConflictType::DeleteConflict));
        return;
    }
    if deleted_in_a {
        return;
    }

    if file.path != entry.file_path {
        plan.conflicts.push(conflict(ConflictType::MoveConflict));
        return;
    }

    let same_metadata = file.modified_at == entry.last_modified
        && file.size == entry.file_size
        && file.name == entry.file_name;

    if same_metadata {
        if let (Some(a), Some(b)) = (&file.checksum, &entry.checksum) {
            if a != b {
                plan.conflicts.push(conflict(ConflictType::HashMismatch));
            }
        }
        return;
    }

    let drift = (file.modified_at - entry.last_modified).abs();
    if drift <= drift_window {
        plan.conflicts.push(conflict(ConflictType::SimultaneousEdit));
    } else if file.modified_at > entry.last_modified {
        plan.operations.push((
            OperationType::UpdateInB,
            TargetAction::MirrorFileToB {
                record: file.clone(),
            },
        ));
    } else {
        plan.operations.push((
            OperationType::UpdateInA,
            TargetAction::PlaceInA {
                file_id: file.id.clone(),
                path: entry.file_path.clone(),
            },
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::entry_from_record;

    fn files(records: Vec<FileRecord>) -> HashMap<String, FileRecord> {
        records.into_iter().map(|r| (r.id.clone(), r)).collect()
    }

    fn entries(list: Vec<WorkspaceEntry>) -> HashMap<String, WorkspaceEntry> {
        list.into_iter().map(|e| (e.file_id.clone(), e)).collect()
    }

    fn plan(a: Vec<FileRecord>, b: Vec<WorkspaceEntry>) -> ReconcilePlan {
        plan_reconciliation(&files(a), &entries(b), Duration::minutes(5), Utc::now())
    }

    #[test]
    fn test_new_file_creates_entry() {
        let t0 = Utc::now();
        let result = plan(
            vec![FileRecord::new("f1", "invoice.pdf", "/invoice.pdf", 1024, t0)],
            Vec::new(),
        );
        assert!(result.conflicts.is_empty());
        assert_eq!(result.operations.len(), 1);
        assert_eq!(result.operations[0].0, OperationType::CreateInB);
    }

    #[test]
    fn test_close_edits_raise_conflict_instead_of_overwrite() {
        let t0 = Utc::now();
        let result = plan(
            vec![FileRecord::new("f2", "b.pdf", "/b.pdf", 2000, t0 + Duration::seconds(1))],
            vec![WorkspaceEntry::new("f2", "b.pdf", "/b.pdf", t0).with_size(1000)],
        );
        assert!(result.operations.is_empty());
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::SimultaneousEdit);
    }

    #[test]
    fn test_distant_edits_mirror_newer_side() {
        let t0 = Utc::now();
        let result = plan(
            vec![FileRecord::new("f2", "b.pdf", "/b.pdf", 2000, t0 + Duration::hours(1))],
            vec![WorkspaceEntry::new("f2", "b.pdf", "/b.pdf", t0).with_size(1000)],
        );
        assert!(result.conflicts.is_empty());
        assert_eq!(result.operations[0].0, OperationType::UpdateInB);
    }

    #[test]
    fn test_deletion_in_a_is_a_conflict() {
        let t0 = Utc::now();
        let record = FileRecord::new("f3", "c.pdf", "/c.pdf", 10, t0);
        let mut entry = entry_from_record(&record, None);
        entry.deleted_in_a = true;

        let result = plan(vec![record], vec![entry]);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::DeleteConflict);
        assert!(result.conflicts[0].deleted_in_a());
    }

    #[test]
    fn test_in_sync_pair_plans_nothing() {
        let record = FileRecord::new("f1", "a.pdf", "/a.pdf", 10, Utc::now());
        let entry = entry_from_record(&record, None);
        assert_eq!(plan(vec![record], vec![entry]), ReconcilePlan::default());
    }

    #[test]
    fn test_path_and_hash_divergence() {
        let t0 = Utc::now();
        let record = FileRecord::new("f1", "a.pdf", "/a.pdf", 10, t0).with_checksum("aaa");

        let mut moved = entry_from_record(&record, None);
        moved.file_path = "/Archive/a.pdf".to_string();
        let result = plan(vec![record.clone()], vec![moved]);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::MoveConflict);

        let mut rehashed = entry_from_record(&record, None);
        rehashed.checksum = Some("bbb".to_string());
        let result = plan(vec![record], vec![rehashed]);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::HashMismatch);
    }

    #[test]
    fn test_occupied_path_is_naming_conflict() {
        let t0 = Utc::now();
        let result = plan(
            vec![FileRecord::new("f9", "a.pdf", "/a.pdf", 10, t0)],
            vec![WorkspaceEntry::new("page-upload", "a.pdf", "/a.pdf", t0)],
        );
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].conflict_type, ConflictType::NamingConflict);
        assert_eq!(result.conflicts[0].file_id, "f9");
    }

    #[test]
    fn test_tombstoned_occupant_does_not_block_creation() {
        let t0 = Utc::now();
        let mut gone = WorkspaceEntry::new("old-upload", "a.pdf", "/a.pdf", t0);
        gone.deleted_in_b = true;
        let result = plan(
            vec![
                FileRecord::new("f9", "a.pdf", "/a.pdf", 10, t0),
                FileRecord::new("f8", "b.pdf", "/b.pdf", 10, t0),
            ],
            vec![gone, WorkspaceEntry::new("page-7", "b.pdf", "/b.pdf", t0)],
        );
        assert!(result
            .operations
            .iter()
            .any(|(t, action)| *t == OperationType::CreateInB && action.file_id() == "f9"));
        assert_eq!(result.conflicts.len(), 1);
        assert_eq!(result.conflicts[0].file_id, "f8");
    }

    #[test]
    fn test_workspace_only_entries() {
        let t0 = Utc::now();
        let live = WorkspaceEntry::new("page-1", "scan.png", "/scan.png", t0);
        let mut tombstoned = WorkspaceEntry::new("page-2", "old.png", "/old.png", t0);
        tombstoned.deleted_in_b = true;
        let mut parked = WorkspaceEntry::new("f1#b-copy", "x.pdf", "/x.pdf", t0);
        parked.sync_status = EntrySyncStatus::Conflict;

        let result = plan(Vec::new(), vec![live, tombstoned, parked]);
        assert_eq!(result.operations.len(), 1);
        assert_eq!(result.operations[0].0, OperationType::CreateInA);
    }

    #[test]
    fn test_tombstoned_file_is_not_recreated() {
        let record = FileRecord::new("f1", "a.pdf", "/a.pdf", 10, Utc::now()).tombstoned();
        assert_eq!(plan(vec![record], Vec::new()), ReconcilePlan::default());
    }
}

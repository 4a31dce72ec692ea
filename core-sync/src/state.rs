//! Sync state store.
//!
//! [`SyncState`] is the orchestrator's view of both sources plus its
//! bookkeeping: pending changes, active conflicts, bounded histories and
//! aggregate metrics. It lives behind a `tokio::sync::RwLock` and is handed
//! out as a cloned snapshot.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use bridge_traits::{EntrySyncStatus, FileRecord, WorkspaceEntry};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::change::ChangeEvent;
use crate::conflict::{ConflictResolution, ConflictType, SyncConflict};
use crate::operation::SyncOperation;

/// Default bound of the history queues
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncMetrics {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    pub retries: u64,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
    pub errors_count: u64,
    /// Mean execution latency of successful operations
    pub average_latency_ms: f64,
    /// Successful share of finished operations, 1.0 before any finished
    pub success_rate: f64,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_reconciliation: Option<DateTime<Utc>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            success_rate: 1.0,
            ..Default::default()
        }
    }

    pub fn record_success(&mut self, latency_ms: f64, at: DateTime<Utc>) {
        self.total_operations += 1;
        self.successful_operations += 1;
        let n = self.successful_operations as f64;
        self.average_latency_ms += (latency_ms - self.average_latency_ms) / n;
        self.last_sync = Some(at);
        self.refresh_rate();
    }

    pub fn record_failure(&mut self) {
        self.total_operations += 1;
        self.failed_operations += 1;
        self.errors_count += 1;
        self.refresh_rate();
    }

    fn refresh_rate(&mut self) {
        let finished = self.successful_operations + self.failed_operations;
        self.success_rate = if finished == 0 {
            1.0
        } else {
            self.successful_operations as f64 / finished as f64
        };
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncState {
    /// Last known file store records by id, tombstones included
    pub files: HashMap<String, FileRecord>,
    /// Last known workspace entries by file id, tombstones included
    pub entries: HashMap<String, WorkspaceEntry>,
    pub pending_changes: Vec<ChangeEvent>,
    pub active_conflicts: BTreeMap<String, SyncConflict>,
    pub sync_history: VecDeque<SyncOperation>,
    pub resolution_history: VecDeque<ConflictResolution>,
    pub metrics: SyncMetrics,
    #[serde(skip)]
    history_limit: usize,
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl SyncState {
    pub fn new(history_limit: usize) -> Self {
        Self {
            files: HashMap::new(),
            entries: HashMap::new(),
            pending_changes: Vec::new(),
            active_conflicts: BTreeMap::new(),
            sync_history: VecDeque::new(),
            resolution_history: VecDeque::new(),
            metrics: SyncMetrics::new(),
            history_limit: history_limit.max(1),
        }
    }

    /// Replace both caches with fresh listings.
    ///
    /// Ids that disappeared since the last listing are kept as tombstones so
    /// later passes still see the deletion.
    pub fn replace_caches(&mut self, files: Vec<FileRecord>, entries: Vec<WorkspaceEntry>) {
        let mut next_files: HashMap<String, FileRecord> =
            files.into_iter().map(|f| (f.id.clone(), f)).collect();
        for (id, old) in self.files.drain() {
            next_files.entry(id).or_insert_with(|| old.tombstoned());
        }

        let mut next_entries: HashMap<String, WorkspaceEntry> = HashMap::new();
        for entry in entries {
            insert_preferring_live(&mut next_entries, entry);
        }
        for (id, mut old) in self.entries.drain() {
            next_entries.entry(id).or_insert_with(|| {
                old.deleted_in_b = true;
                old.sync_status = EntrySyncStatus::Deleted;
                old
            });
        }

        self.files = next_files;
        self.entries = next_entries;
    }

    pub fn apply_file(&mut self, record: FileRecord) {
        self.files.insert(record.id.clone(), record);
    }

    pub fn apply_entry(&mut self, entry: WorkspaceEntry) {
        self.entries.insert(entry.file_id.clone(), entry);
    }

    /// Mark a cached file as deleted
    pub fn tombstone_file(&mut self, file_id: &str) {
        if let Some(record) = self.files.get_mut(file_id) {
            record.deleted = true;
        }
    }

    /// Mark a cached entry as tombstoned
    pub fn tombstone_entry(&mut self, file_id: &str) {
        if let Some(entry) = self.entries.get_mut(file_id) {
            entry.sync_status = EntrySyncStatus::Deleted;
        }
    }

    /// Move a cached entry to a new file id
    pub fn rekey_entry(&mut self, old_id: &str, entry: WorkspaceEntry) {
        self.entries.remove(old_id);
        self.apply_entry(entry);
    }

    /// Insert or refresh a conflict; returns `true` when it is new
    pub fn upsert_conflict(&mut self, conflict: SyncConflict) -> bool {
        self.active_conflicts
            .insert(conflict.id.clone(), conflict)
            .is_none()
    }

    pub fn take_conflict(&mut self, conflict_id: &str) -> Option<SyncConflict> {
        self.active_conflicts.remove(conflict_id)
    }

    /// Drop active conflicts a reconciliation pass no longer detects.
    ///
    /// Access conflicts come from failed writes, not from comparison, and
    /// stay until an operator settles them.
    pub fn clear_undetected(&mut self, detected: &HashSet<String>) -> Vec<SyncConflict> {
        let stale: Vec<String> = self
            .active_conflicts
            .iter()
            .filter(|(id, c)| {
                c.conflict_type != ConflictType::AccessConflict && !detected.contains(*id)
            })
            .map(|(id, _)| id.clone())
            .collect();
        stale
            .iter()
            .filter_map(|id| self.active_conflicts.remove(id))
            .collect()
    }

    pub fn push_history(&mut self, op: SyncOperation) {
        self.sync_history.push_back(op);
        while self.sync_history.len() > self.history_limit {
            self.sync_history.pop_front();
        }
    }

    pub fn push_resolution(&mut self, resolution: ConflictResolution) {
        self.resolution_history.push_back(resolution);
        while self.resolution_history.len() > self.history_limit {
            self.resolution_history.pop_front();
        }
    }

    /// Track an observed change until its operation finishes
    pub fn push_pending(&mut self, event: ChangeEvent) {
        self.pending_changes.push(event);
        if self.pending_changes.len() > self.history_limit {
            let excess = self.pending_changes.len() - self.history_limit;
            self.pending_changes.drain(..excess);
        }
    }

    pub fn clear_pending(&mut self, event_id: &uuid::Uuid) {
        self.pending_changes.retain(|e| &e.id != event_id);
    }
}

fn insert_preferring_live(map: &mut HashMap<String, WorkspaceEntry>, entry: WorkspaceEntry) {
    match map.get(&entry.file_id) {
        Some(existing) if !existing.is_tombstoned() && entry.is_tombstoned() => {}
        _ => {
            map.insert(entry.file_id.clone(), entry);
        }
    }
}

//! Integration tests for the sync pipeline
//!
//! These tests drive the orchestrator against in-memory collaborators:
//! - Reconciliation of new, diverged and deleted files
//! - Conflict resolution by policy and by operator
//! - Bounded retry of failing operations
//! - Convergence of the echo events produced by the engine's own writes

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::testing::{InMemoryFileStore, InMemoryWorkspace, ManualClock};
use bridge_traits::{
    BridgeError, Clock, EntryPatch, EntrySyncStatus, FileRecord, WorkspaceEntry, WorkspaceStore,
};
use bytes::Bytes;
use chrono::Utc;
use core_runtime::config::CoreConfig;
use core_runtime::events::EventBus;
use core_sync::{
    ActionKind, ChangeEvent, ChangeType, ChangeWatcher, ConflictResolution, ConflictType,
    FileStoreListing, OperationStatus, ResolutionAction, ResolutionDetails, ResolutionStrategy,
    SyncConfig, SyncError, SyncOrchestrator, WorkspaceListing,
};
use mockall::mock;

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    store: Arc<InMemoryFileStore>,
    workspace: Arc<InMemoryWorkspace>,
    clock: Arc<ManualClock>,
    orchestrator: SyncOrchestrator,
}

impl Harness {
    fn new(config: SyncConfig) -> Self {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemoryFileStore::with_clock(clock.clone()));
        let workspace = Arc::new(InMemoryWorkspace::new());
        let core = CoreConfig::builder()
            .file_store(store.clone())
            .workspace_store(workspace.clone())
            .clock(clock.clone())
            .build()
            .unwrap();
        let orchestrator =
            SyncOrchestrator::new(&core, config, Arc::new(EventBus::new(256))).unwrap();

        Self {
            store,
            workspace,
            clock,
            orchestrator,
        }
    }

    async fn watchers(
        &self,
    ) -> (
        ChangeWatcher<FileStoreListing>,
        ChangeWatcher<WorkspaceListing>,
    ) {
        let (files, entries) = self.orchestrator.known_records().await;

        let mut a = ChangeWatcher::new(
            FileStoreListing::new(self.store.clone(), "/", true),
            Duration::from_secs(30),
            0.0,
            self.clock.clone(),
        );
        a.prime(files);

        let mut b = ChangeWatcher::new(
            WorkspaceListing::new(self.workspace.clone()),
            Duration::from_secs(60),
            0.0,
            self.clock.clone(),
        );
        b.prime(entries);

        (a, b)
    }
}

mock! {
    pub Workspace {}

    #[async_trait::async_trait]
    impl WorkspaceStore for Workspace {
        async fn create_entry(&self, entry: WorkspaceEntry) -> bridge_traits::error::Result<WorkspaceEntry>;
        async fn update_entry(&self, file_id: &str, patch: EntryPatch) -> bridge_traits::error::Result<WorkspaceEntry>;
        async fn delete_entry(&self, file_id: &str) -> bridge_traits::error::Result<bool>;
        async fn get_all_entries(&self) -> bridge_traits::error::Result<Vec<WorkspaceEntry>>;
        async fn search_entries(&self, query: &str) -> bridge_traits::error::Result<Vec<WorkspaceEntry>>;
        async fn download_attachment(&self, entry: &WorkspaceEntry) -> bridge_traits::error::Result<Bytes>;
    }
}

// ============================================================================
// Reconciliation scenarios
// ============================================================================

#[tokio::test]
async fn test_new_file_is_mirrored_into_workspace() {
    let h = Harness::new(SyncConfig::default());
    let t0 = h.clock.now();
    h.store.insert(
        FileRecord::new("f1", "invoice.pdf", "/invoice.pdf", 1024, t0),
        "%PDF",
    );

    let report = h.orchestrator.force_sync().await.unwrap();
    assert_eq!(report.operations_queued, 1);
    h.orchestrator.drain_ready().await;

    let entries = h.workspace.get_all_entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].file_id, "f1");
    assert_eq!(entries[0].sync_status, EntrySyncStatus::Synced);
    assert_eq!(entries[0].file_size, 1024);

    let state = h.orchestrator.get_sync_state().await;
    assert_eq!(state.sync_history.len(), 1);
    assert_eq!(state.sync_history[0].status, OperationStatus::Completed);
}

#[tokio::test]
async fn test_close_edits_raise_conflict_without_overwrite() {
    let h = Harness::new(SyncConfig {
        default_strategy: ResolutionStrategy::ManualResolve,
        ..Default::default()
    });
    let t0 = h.clock.now();
    h.store.insert(
        FileRecord::new("f2", "b.pdf", "/b.pdf", 2000, t0 + chrono::Duration::seconds(1)),
        "new",
    );
    h.workspace
        .insert(WorkspaceEntry::new("f2", "b.pdf", "/b.pdf", t0).with_size(1000));

    let report = h.orchestrator.force_sync().await.unwrap();
    assert_eq!(report.conflicts_detected, 1);
    assert_eq!(report.operations_queued, 0);
    assert_eq!(h.orchestrator.drain_ready().await, 0);

    let conflicts = h.orchestrator.active_conflicts().await;
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].conflict_type, ConflictType::SimultaneousEdit);
    assert_eq!(h.workspace.get("f2").unwrap().file_size, 1000);
}

#[tokio::test]
async fn test_close_edits_resolve_to_later_side_by_default() {
    let h = Harness::new(SyncConfig::default());
    let t0 = h.clock.now();
    h.store.insert(
        FileRecord::new("f2", "b.pdf", "/b.pdf", 2000, t0 + chrono::Duration::seconds(1)),
        "new",
    );
    h.workspace
        .insert(WorkspaceEntry::new("f2", "b.pdf", "/b.pdf", t0).with_size(1000));

    h.orchestrator.force_sync().await.unwrap();
    h.orchestrator.drain_ready().await;

    let state = h.orchestrator.get_sync_state().await;
    assert!(state.active_conflicts.is_empty());
    let resolution = state.resolution_history.back().unwrap();
    assert_eq!(resolution.conflict_id, "simultaneous_edit:f2");
    assert_eq!(resolution.strategy, ResolutionStrategy::LatestWins);
    assert_eq!(resolution.action.kind, ActionKind::UpdateB);
    assert_eq!(h.workspace.get("f2").unwrap().file_size, 2000);
}

#[tokio::test]
async fn test_newer_workspace_edit_settles_after_one_pass() {
    let h = Harness::new(SyncConfig::default());
    let t0 = h.clock.now();
    h.store
        .insert(FileRecord::new("f2", "b.pdf", "/b.pdf", 2000, t0), "a-side");
    h.workspace.insert(
        WorkspaceEntry::new("f2", "b.pdf", "/b.pdf", t0 + chrono::Duration::seconds(1))
            .with_size(1000),
    );

    let first = h.orchestrator.force_sync().await.unwrap();
    assert_eq!(first.conflicts_detected, 1);
    h.orchestrator.drain_ready().await;

    let state = h.orchestrator.get_sync_state().await;
    assert_eq!(state.resolution_history.back().unwrap().action.kind, ActionKind::UpdateA);
    assert_eq!(h.store.get("f2").unwrap().size, 2000);
    assert_eq!(h.workspace.get("f2").unwrap().last_modified, t0);

    for _ in 0..2 {
        let report = h.orchestrator.force_sync().await.unwrap();
        assert_eq!(report.operations_queued, 0);
        assert_eq!(report.conflicts_detected, 0);
    }
    let metrics = h.orchestrator.get_metrics().await;
    assert_eq!(metrics.conflicts_detected, 1);
    assert_eq!(metrics.conflicts_resolved, 1);
}

#[tokio::test]
async fn test_distant_workspace_edit_is_not_requeued() {
    let h = Harness::new(SyncConfig::default());
    let t0 = h.clock.now();
    h.store
        .insert(FileRecord::new("f2", "b.pdf", "/b.pdf", 2000, t0), "a-side");
    h.workspace.insert(
        WorkspaceEntry::new("f2", "b.pdf", "/b.pdf", t0 + chrono::Duration::hours(1))
            .with_size(1000),
    );

    let first = h.orchestrator.force_sync().await.unwrap();
    assert_eq!(first.operations_queued, 1);
    assert_eq!(h.orchestrator.drain_ready().await, 1);

    let second = h.orchestrator.force_sync().await.unwrap();
    assert_eq!(second.operations_queued, 0);
    assert_eq!(second.conflicts_detected, 0);
    assert_eq!(h.orchestrator.drain_ready().await, 0);
    assert_eq!(h.orchestrator.get_metrics().await.successful_operations, 1);
}

#[tokio::test]
async fn test_conflict_clears_once_sides_agree() {
    let h = Harness::new(SyncConfig {
        default_strategy: ResolutionStrategy::ManualResolve,
        ..Default::default()
    });
    let t0 = h.clock.now();
    let t1 = t0 + chrono::Duration::seconds(1);
    h.store
        .insert(FileRecord::new("f2", "b.pdf", "/b.pdf", 2000, t1), "new");
    h.workspace
        .insert(WorkspaceEntry::new("f2", "b.pdf", "/b.pdf", t0).with_size(1000));

    h.orchestrator.force_sync().await.unwrap();
    assert_eq!(h.orchestrator.active_conflicts().await.len(), 1);

    // Refreshed, not duplicated, while the divergence remains
    h.orchestrator.force_sync().await.unwrap();
    assert_eq!(h.orchestrator.active_conflicts().await.len(), 1);

    h.workspace.edit("f2", |e| {
        e.file_size = 2000;
        e.last_modified = t1;
    });
    let report = h.orchestrator.force_sync().await.unwrap();
    assert_eq!(report.conflicts_detected, 0);
    assert!(h.orchestrator.active_conflicts().await.is_empty());
    assert_eq!(h.orchestrator.get_metrics().await.conflicts_resolved, 0);
}

#[tokio::test]
async fn test_deletion_in_a_tombstones_entry() {
    let h = Harness::new(SyncConfig::default());
    let t0 = h.clock.now();
    h.store
        .insert(FileRecord::new("f3", "c.pdf", "/c.pdf", 10, t0), "c");
    let mut entry = WorkspaceEntry::new("f3", "c.pdf", "/c.pdf", t0).with_size(10);
    entry.deleted_in_a = true;
    h.workspace.insert(entry);

    h.orchestrator.force_sync().await.unwrap();
    h.orchestrator.drain_ready().await;

    let state = h.orchestrator.get_sync_state().await;
    let resolution = state.resolution_history.back().unwrap();
    assert_eq!(resolution.strategy, ResolutionStrategy::AWins);
    assert_eq!(resolution.action.kind, ActionKind::DeleteB);
    assert!(h.workspace.get("f3").unwrap().is_tombstoned());
}

#[tokio::test]
async fn test_hash_mismatch_keeps_both_versions() {
    let h = Harness::new(SyncConfig::default());
    let t0 = h.clock.now();
    h.store.insert(
        FileRecord::new("f1", "report.pdf", "/Docs/report.pdf", 10, t0).with_checksum("aaa"),
        "a",
    );
    let mut entry = WorkspaceEntry::new("f1", "report.pdf", "/Docs/report.pdf", t0).with_size(10);
    entry.checksum = Some("bbb".to_string());
    h.workspace.insert(entry);

    h.orchestrator.force_sync().await.unwrap();
    h.orchestrator.drain_ready().await;

    let entries = h.workspace.entries();
    assert_eq!(entries.len(), 2);
    let copy = entries.iter().find(|e| e.file_id != "f1").unwrap();
    assert_eq!(copy.sync_status, EntrySyncStatus::Conflict);
    assert!(copy.file_name.starts_with("report (B copy "));
    assert_eq!(h.workspace.get("f1").unwrap().checksum.as_deref(), Some("aaa"));

    let report = h.orchestrator.force_sync().await.unwrap();
    assert_eq!(report.operations_queued, 0);
    assert_eq!(report.conflicts_detected, 0);
}

// ============================================================================
// Operator resolutions
// ============================================================================

#[tokio::test]
async fn test_operator_resolution_applies_and_clears_conflict() {
    let h = Harness::new(SyncConfig {
        default_strategy: ResolutionStrategy::ManualResolve,
        ..Default::default()
    });
    let t0 = h.clock.now();
    h.store.insert(
        FileRecord::new("f2", "b.pdf", "/b.pdf", 2000, t0 + chrono::Duration::seconds(1)),
        "new",
    );
    h.workspace
        .insert(WorkspaceEntry::new("f2", "b.pdf", "/b.pdf", t0).with_size(1000));
    h.orchestrator.force_sync().await.unwrap();

    let rejected = ConflictResolution::by_operator(
        "simultaneous_edit:f2",
        "dana",
        ResolutionStrategy::AWins,
        ResolutionAction {
            kind: ActionKind::DeleteB,
            details: ResolutionDetails::default(),
        },
        h.clock.now(),
    );
    assert!(matches!(
        h.orchestrator
            .resolve_conflict("simultaneous_edit:f2", rejected)
            .await,
        Err(SyncError::ResolutionRejected { .. })
    ));
    assert_eq!(h.orchestrator.active_conflicts().await.len(), 1);

    let accepted = ConflictResolution::by_operator(
        "simultaneous_edit:f2",
        "dana",
        ResolutionStrategy::AWins,
        ResolutionAction {
            kind: ActionKind::UpdateB,
            details: ResolutionDetails::default(),
        },
        h.clock.now(),
    )
    .with_notes("Scanner output is authoritative");
    h.orchestrator
        .resolve_conflict("simultaneous_edit:f2", accepted)
        .await
        .unwrap();
    h.orchestrator.drain_ready().await;

    assert!(h.orchestrator.active_conflicts().await.is_empty());
    assert_eq!(h.workspace.get("f2").unwrap().file_size, 2000);
    let metrics = h.orchestrator.get_metrics().await;
    assert_eq!(metrics.conflicts_detected, 1);
    assert_eq!(metrics.conflicts_resolved, 1);
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test]
async fn test_always_failing_operation_is_attempted_max_times() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(InMemoryFileStore::with_clock(clock.clone()));

    let mut workspace = MockWorkspace::new();
    workspace
        .expect_create_entry()
        .times(3)
        .returning(|_| Err(BridgeError::Network("connection reset".to_string())));

    let core = CoreConfig::builder()
        .file_store(store.clone())
        .workspace_store(Arc::new(workspace))
        .clock(clock.clone())
        .build()
        .unwrap();
    let orchestrator = SyncOrchestrator::new(
        &core,
        SyncConfig {
            retry_delay_ms: 0,
            ..Default::default()
        },
        Arc::new(EventBus::new(64)),
    )
    .unwrap();

    let record = FileRecord::new("f1", "a.pdf", "/a.pdf", 10, clock.now());
    store.insert(record.clone(), "a");
    orchestrator
        .handle_change(ChangeEvent::from_file(ChangeType::Created, &record, clock.now()))
        .await
        .unwrap();

    assert_eq!(orchestrator.drain_ready().await, 3);

    let state = orchestrator.get_sync_state().await;
    let failed = state.sync_history.back().unwrap();
    assert_eq!(failed.status, OperationStatus::Failed);
    assert_eq!(failed.attempts, 3);
    assert_eq!(state.metrics.errors_count, 1);
    assert_eq!(state.metrics.retries, 2);
    assert_eq!(orchestrator.queue_stats().await.total, 0);
}

// ============================================================================
// Steady state
// ============================================================================

#[tokio::test]
async fn test_edit_in_a_converges_without_echo() {
    let h = Harness::new(SyncConfig::default());
    let t0 = h.clock.now();
    h.store
        .insert(FileRecord::new("f1", "a.pdf", "/a.pdf", 10, t0), "a");
    h.orchestrator.force_sync().await.unwrap();
    h.orchestrator.drain_ready().await;

    let (mut watch_a, mut watch_b) = h.watchers().await;

    h.store.edit("f1", |r| {
        r.size = 20;
        r.modified_at = t0 + chrono::Duration::hours(1);
    });
    let changes = watch_a.poll().await.unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].change_type, ChangeType::Modified);
    for change in changes {
        h.orchestrator.handle_change(change).await.unwrap();
    }
    h.orchestrator.drain_ready().await;
    assert_eq!(h.workspace.get("f1").unwrap().file_size, 20);

    // The workspace update echoes back once and is absorbed as a no-op
    let echoes = watch_b.poll().await.unwrap();
    assert_eq!(echoes.len(), 1);
    for echo in echoes {
        h.orchestrator.handle_change(echo).await.unwrap();
    }
    h.orchestrator.drain_ready().await;
    assert_eq!(h.store.call_count("move"), 0);

    assert!(watch_a.poll().await.unwrap().is_empty());
    assert!(watch_b.poll().await.unwrap().is_empty());

    let report = h.orchestrator.force_sync().await.unwrap();
    assert_eq!(report.operations_queued, 0);
    assert_eq!(report.conflicts_detected, 0);
}

#[tokio::test]
async fn test_workspace_upload_reaches_file_store_once() {
    let h = Harness::new(SyncConfig::default());
    h.orchestrator.force_sync().await.unwrap();
    let (mut watch_a, mut watch_b) = h.watchers().await;

    h.workspace.insert(WorkspaceEntry::new(
        "page-upload-1",
        "scan.png",
        "/Scans/scan.png",
        h.clock.now(),
    ));
    h.workspace.attach("page-upload-1", "png-bytes");

    for change in watch_b.poll().await.unwrap() {
        h.orchestrator.handle_change(change).await.unwrap();
    }
    h.orchestrator.drain_ready().await;

    let files = h.store.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].path, "/Scans/scan.png");
    let uploaded_id = files[0].id.clone();
    assert!(h.workspace.get(&uploaded_id).is_some());

    // Echoes from both sides settle without further writes
    for _ in 0..2 {
        for change in watch_a.poll().await.unwrap() {
            h.orchestrator.handle_change(change).await.unwrap();
        }
        for change in watch_b.poll().await.unwrap() {
            h.orchestrator.handle_change(change).await.unwrap();
        }
        h.orchestrator.drain_ready().await;
    }

    assert_eq!(h.store.call_count("upload"), 1);
    assert_eq!(h.workspace.call_count("create"), 0);
    assert_eq!(h.store.files().len(), 1);

    let report = h.orchestrator.force_sync().await.unwrap();
    assert_eq!(report.operations_queued, 0);
}

#[tokio::test]
async fn test_deleted_file_is_not_resurrected() {
    let h = Harness::new(SyncConfig::default());
    let t0 = h.clock.now();
    h.store
        .insert(FileRecord::new("f1", "a.pdf", "/a.pdf", 10, t0), "a");
    h.orchestrator.force_sync().await.unwrap();
    h.orchestrator.drain_ready().await;
    let (mut watch_a, mut watch_b) = h.watchers().await;

    h.store.remove("f1");
    for change in watch_a.poll().await.unwrap() {
        assert_eq!(change.change_type, ChangeType::Deleted);
        h.orchestrator.handle_change(change).await.unwrap();
    }
    h.orchestrator.drain_ready().await;
    assert!(h.workspace.get("f1").unwrap().is_tombstoned());

    for change in watch_b.poll().await.unwrap() {
        h.orchestrator.handle_change(change).await.unwrap();
    }
    h.orchestrator.drain_ready().await;

    assert_eq!(h.store.call_count("upload"), 0);
    assert_eq!(h.store.call_count("delete"), 0);
    assert!(h.store.files().is_empty());
}

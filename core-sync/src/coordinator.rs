//! # Sync Orchestrator
//!
//! Owns the authoritative [`SyncState`] and wires the pieces together.
//!
//! ## Overview
//!
//! The `SyncOrchestrator` coordinates:
//! - Full reconciliation of both sources (`force_sync`)
//! - Routing of watcher change events into operations (`handle_change`)
//! - Conflict resolution and validation (`handle_conflict`, `resolve_conflict`)
//! - FIFO execution with bounded retry (`process_next`)
//! - Metrics and outward notifications via `EventBus`
//!
//! ## Workflow
//!
//! ### Reconciliation
//! 1. List both sources
//! 2. Replace the state caches (vanished ids become tombstones)
//! 3. Plan operations and conflicts over the union of ids
//! 4. Enqueue operations not already queued
//! 5. Resolve conflicts; manual ones stay active
//!
//! ### Steady state
//! 1. Watchers send change events over an `mpsc` channel
//! 2. The router refreshes the cache and enqueues one operation per event
//! 3. The consumer executes operations one at a time
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{SyncConfig, SyncOrchestrator};
//!
//! let orchestrator = SyncOrchestrator::new(&core_config, SyncConfig::default(), event_bus)?;
//! let report = orchestrator.force_sync().await?;
//! orchestrator.drain_ready().await;
//!
//! let metrics = orchestrator.get_metrics().await;
//! println!("Success rate: {:.2}", metrics.success_rate);
//! ```

use crate::{
    change::{ChangeEvent, ChangeMetadata},
    conflict::{ActionKind, ConflictResolution, ConflictType, ResolutionStrategy, SyncConflict},
    conflict_resolver::ConflictResolver,
    executor::{ExecutionOutcome, OperationExecutor},
    operation::{OperationId, OperationStatus, SyncOperation},
    operation_queue::{OperationQueue, QueueStats},
    reconcile::plan_reconciliation,
    state::{SyncMetrics, SyncState, DEFAULT_HISTORY_LIMIT},
    watcher::WatcherMessage,
    Result, SyncError,
};
use bridge_traits::{Clock, FileRecord, FileStore, WorkspaceEntry, WorkspaceStore};
use core_runtime::config::CoreConfig;
use core_runtime::events::{ConflictEvent, CoreEvent, EventBus, SyncEvent, WatcherEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Sync orchestrator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Edits on both sides closer than this are a simultaneous edit (seconds)
    pub drift_window_secs: u64,

    /// Strategy applied to simultaneous edits
    pub default_strategy: ResolutionStrategy,

    /// Total execution attempts per operation
    pub max_attempts: u32,

    /// Fixed delay before a failed operation is retried (milliseconds)
    pub retry_delay_ms: u64,

    /// Whether failed operations are retried at all
    pub auto_retry: bool,

    /// Timeout for each collaborator call (milliseconds)
    pub operation_timeout_ms: Option<u64>,

    /// Bound of the operation and resolution histories
    pub history_limit: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drift_window_secs: 300,
            default_strategy: ResolutionStrategy::LatestWins,
            max_attempts: 3,
            retry_delay_ms: 5_000,
            auto_retry: true,
            operation_timeout_ms: Some(30_000),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl SyncConfig {
    pub fn drift_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.drift_window_secs as i64)
    }

    pub fn retry_delay(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.retry_delay_ms as i64)
    }

    pub fn operation_timeout(&self) -> Option<Duration> {
        self.operation_timeout_ms.map(Duration::from_millis)
    }

    /// # Errors
    ///
    /// Returns `InvalidInput` for values the orchestrator cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(SyncError::InvalidInput {
                field: "max_attempts".to_string(),
                message: "At least one attempt is required".to_string(),
            });
        }
        if self.history_limit == 0 {
            return Err(SyncError::InvalidInput {
                field: "history_limit".to_string(),
                message: "History limit must be positive".to_string(),
            });
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(SyncError::InvalidInput {
                field: "operation_timeout_ms".to_string(),
                message: "Timeout must be positive when set".to_string(),
            });
        }
        Ok(())
    }
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub operations_queued: usize,
    pub conflicts_detected: usize,
    pub duration_ms: u64,
}

/// Sync orchestrator owning the state store and the operation queue
pub struct SyncOrchestrator {
    /// Configuration
    config: SyncConfig,

    file_store: Arc<dyn FileStore>,
    workspace: Arc<dyn WorkspaceStore>,

    /// Folder of the file store that is kept in sync
    folder: String,
    recursive: bool,

    clock: Arc<dyn Clock>,

    /// Event bus for outward notifications
    event_bus: Arc<EventBus>,

    state: Arc<RwLock<SyncState>>,
    queue: Arc<OperationQueue>,
    resolver: ConflictResolver,
    executor: Arc<OperationExecutor>,
}

impl SyncOrchestrator {
    /// Create an orchestrator over the collaborators of `core`
    ///
    /// # Errors
    ///
    /// Returns an error if `config` fails validation
    pub fn new(core: &CoreConfig, config: SyncConfig, event_bus: Arc<EventBus>) -> Result<Self> {
        config.validate()?;

        let executor = OperationExecutor::new(
            Arc::clone(&core.file_store),
            Arc::clone(&core.workspace_store),
            config.operation_timeout(),
        );

        Ok(Self {
            resolver: ConflictResolver::new(config.default_strategy),
            state: Arc::new(RwLock::new(SyncState::new(config.history_limit))),
            queue: Arc::new(OperationQueue::new()),
            executor: Arc::new(executor),
            file_store: Arc::clone(&core.file_store),
            workspace: Arc::clone(&core.workspace_store),
            folder: core.watcher.folder.clone(),
            recursive: core.watcher.recursive,
            clock: Arc::clone(&core.clock),
            event_bus,
            config,
        })
    }

    /// Clone for background task (avoids Arc<Arc<...>>)
    fn clone_for_task(&self) -> Self {
        Self {
            config: self.config.clone(),
            file_store: Arc::clone(&self.file_store),
            workspace: Arc::clone(&self.workspace),
            folder: self.folder.clone(),
            recursive: self.recursive,
            clock: Arc::clone(&self.clock),
            event_bus: Arc::clone(&self.event_bus),
            state: Arc::clone(&self.state),
            queue: Arc::clone(&self.queue),
            resolver: self.resolver,
            executor: Arc::clone(&self.executor),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    /// Compare both sources in full and queue the work that converges them
    #[instrument(skip(self))]
    pub async fn force_sync(&self) -> Result<ReconcileReport> {
        let timer = Instant::now();
        let now = self.clock.now();

        let files = self.file_store.list(&self.folder, self.recursive).await?;
        let entries = self.workspace.get_all_entries().await?;
        info!(
            "Reconciling {} files against {} workspace entries",
            files.len(),
            entries.len()
        );

        let plan = {
            let mut state = self.state.write().await;
            state.replace_caches(files, entries);
            state.metrics.last_reconciliation = Some(now);
            plan_reconciliation(&state.files, &state.entries, self.config.drift_window(), now)
        };

        let mut operations_queued = 0;
        for (operation_type, action) in plan.operations {
            let op = SyncOperation::new(operation_type, action, self.config.max_attempts, now);
            if self.enqueue_unique(op).await {
                operations_queued += 1;
            }
        }

        let conflicts_detected = plan.conflicts.len();
        let detected: HashSet<String> = plan.conflicts.iter().map(|c| c.id.clone()).collect();
        let cleared = self.state.write().await.clear_undetected(&detected);
        for conflict in cleared {
            info!("Conflict {} no longer detected, clearing", conflict.id);
            self.event_bus
                .emit(CoreEvent::Conflict(ConflictEvent::Cleared {
                    conflict_id: conflict.id,
                }))
                .ok();
        }

        for conflict in plan.conflicts {
            self.handle_conflict(conflict).await;
        }

        let report = ReconcileReport {
            operations_queued,
            conflicts_detected,
            duration_ms: timer.elapsed().as_millis() as u64,
        };

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::ReconciliationCompleted {
                operations_queued: report.operations_queued as u64,
                conflicts_detected: report.conflicts_detected as u64,
                duration_ms: report.duration_ms,
            }))
            .ok();

        info!(
            "Reconciliation queued {} operations, detected {} conflicts",
            report.operations_queued, report.conflicts_detected
        );
        Ok(report)
    }

    // ========================================================================
    // Routing
    // ========================================================================

    /// Route one watcher change into exactly one operation on the other side
    #[instrument(
        skip(self, event),
        fields(file_id = %event.file_id, source = %event.source, change_type = %event.change_type)
    )]
    pub async fn handle_change(&self, event: ChangeEvent) -> Result<OperationId> {
        let op = SyncOperation::from_event(&event, self.config.max_attempts, self.clock.now())?;

        {
            let mut state = self.state.write().await;
            match &event.metadata {
                ChangeMetadata::File(record) => state.apply_file(record.clone()),
                ChangeMetadata::Entry(entry) => state.apply_entry(entry.clone()),
            }
            state.push_pending(event.clone());
        }

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::ChangeDetected {
                file_id: event.file_id.clone(),
                source: event.source.to_string(),
                change_type: event.change_type.to_string(),
            }))
            .ok();

        let id = op.id;
        self.enqueue(op).await;
        Ok(id)
    }

    async fn enqueue(&self, op: SyncOperation) {
        debug!(
            operation_id = %op.id,
            operation_type = %op.operation_type,
            file_id = %op.file_id,
            "Queued operation"
        );
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::OperationQueued {
                operation_id: op.id.to_string(),
                operation_type: op.operation_type.to_string(),
                file_id: op.file_id.clone(),
            }))
            .ok();
        self.queue.enqueue(op).await;
    }

    /// Enqueue unless the same operation for the same file is waiting
    async fn enqueue_unique(&self, op: SyncOperation) -> bool {
        if self.queue.contains(&op.file_id, op.operation_type).await {
            debug!(file_id = %op.file_id, operation_type = %op.operation_type, "Already queued");
            return false;
        }
        self.enqueue(op).await;
        true
    }

    // ========================================================================
    // Conflicts
    // ========================================================================

    /// Record a conflict and apply the system resolution when allowed.
    ///
    /// Returns the applied resolution; manual and rejected resolutions leave
    /// the conflict active.
    #[instrument(skip(self, conflict), fields(conflict_id = %conflict.id))]
    pub async fn handle_conflict(&self, conflict: SyncConflict) -> Option<ConflictResolution> {
        let is_new = {
            let mut state = self.state.write().await;
            let is_new = state.upsert_conflict(conflict.clone());
            if is_new {
                state.metrics.conflicts_detected += 1;
            }
            is_new
        };

        if is_new {
            info!("Detected {} for {}", conflict.conflict_type, conflict.file_id);
            self.event_bus
                .emit(CoreEvent::Conflict(ConflictEvent::Detected {
                    conflict_id: conflict.id.clone(),
                    conflict_type: conflict.conflict_type.to_string(),
                    file_id: conflict.file_id.clone(),
                    severity: conflict.severity.as_str().to_string(),
                }))
                .ok();
        }

        let resolution = self.resolver.resolve(&conflict, self.clock.now());
        if resolution.action.kind == ActionKind::Manual {
            warn!("Conflict {} needs manual resolution", conflict.id);
            self.event_bus
                .emit(CoreEvent::Conflict(ConflictEvent::ManualResolutionRequired {
                    conflict_id: conflict.id.clone(),
                    conflict_type: conflict.conflict_type.to_string(),
                    file_id: conflict.file_id.clone(),
                }))
                .ok();
            return None;
        }

        match self.apply_resolution(&conflict, resolution.clone()).await {
            Ok(()) => Some(resolution),
            Err(e) => {
                warn!("Resolution for {} rejected: {}", conflict.id, e);
                None
            }
        }
    }

    /// Apply an operator resolution to an active conflict
    ///
    /// # Errors
    ///
    /// Returns `ConflictNotFound` for an unknown id and `ResolutionRejected`
    /// when the resolution does not fit the conflict
    #[instrument(skip(self, resolution), fields(resolved_by = %resolution.resolved_by))]
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<()> {
        let conflict = self
            .state
            .read()
            .await
            .active_conflicts
            .get(conflict_id)
            .cloned()
            .ok_or_else(|| SyncError::ConflictNotFound(conflict_id.to_string()))?;

        self.apply_resolution(&conflict, resolution).await
    }

    async fn apply_resolution(
        &self,
        conflict: &SyncConflict,
        resolution: ConflictResolution,
    ) -> Result<()> {
        let planned = self
            .resolver
            .validate(conflict, &resolution)
            .and_then(|()| {
                SyncOperation::from_resolution(
                    conflict,
                    &resolution,
                    self.config.max_attempts,
                    self.clock.now(),
                )
            });

        let operations = match planned {
            Ok(operations) => operations,
            Err(e) => {
                let reason = match &e {
                    SyncError::ResolutionRejected { reason, .. } => reason.clone(),
                    other => other.to_string(),
                };
                self.event_bus
                    .emit(CoreEvent::Conflict(ConflictEvent::Rejected {
                        conflict_id: conflict.id.clone(),
                        reason,
                    }))
                    .ok();
                return Err(e);
            }
        };

        {
            let mut state = self.state.write().await;
            state.take_conflict(&conflict.id);
            state.metrics.conflicts_resolved += 1;
            state.push_resolution(resolution.clone());
        }

        for op in operations {
            self.enqueue_unique(op).await;
        }

        info!(
            "Resolved {} with {} ({})",
            conflict.id,
            resolution.strategy,
            resolution.action.kind.as_str()
        );
        self.event_bus
            .emit(CoreEvent::Conflict(ConflictEvent::Resolved {
                conflict_id: conflict.id.clone(),
                strategy: resolution.strategy.to_string(),
                resolved_by: resolution.resolved_by.to_string(),
            }))
            .ok();
        Ok(())
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Execute the first due operation.
    ///
    /// Returns the operation after its attempt, or `None` when nothing is
    /// due.
    pub async fn process_next(&self) -> Option<SyncOperation> {
        let now = self.clock.now();
        let mut op = self.queue.pop_ready(now).await?;

        if let Err(e) = op.start_attempt(now) {
            error!("Dropping operation {}: {}", op.id, e);
            return Some(op);
        }

        let (known_file, known_entry) = {
            let state = self.state.read().await;
            (
                state.files.get(&op.file_id).cloned(),
                state.entries.get(&op.file_id).cloned(),
            )
        };

        let timer = Instant::now();
        match self
            .executor
            .execute(&op, known_file.as_ref(), known_entry.as_ref())
            .await
        {
            Ok(outcome) => {
                let latency_ms = timer.elapsed().as_secs_f64() * 1000.0;
                self.finish_success(&mut op, outcome, latency_ms).await;
            }
            Err(e) => {
                self.finish_failure(&mut op, e, known_file, known_entry)
                    .await;
            }
        }

        Some(op)
    }

    /// Process every operation that is due now
    pub async fn drain_ready(&self) -> usize {
        let mut processed = 0;
        while self.process_next().await.is_some() {
            processed += 1;
        }
        processed
    }

    async fn finish_success(
        &self,
        op: &mut SyncOperation,
        outcome: ExecutionOutcome,
        latency_ms: f64,
    ) {
        if let Err(e) = op.complete(outcome.summary.clone()) {
            error!("Operation {} completed out of order: {}", op.id, e);
        }
        debug!(operation_id = %op.id, "{}", outcome.summary);

        {
            let mut state = self.state.write().await;
            apply_outcome(&mut state, &op.file_id, outcome);
            state.metrics.record_success(latency_ms, self.clock.now());
            if let Some(event) = &op.source_event {
                state.clear_pending(&event.id);
            }
            state.push_history(op.clone());
        }

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::OperationCompleted {
                operation_id: op.id.to_string(),
                operation_type: op.operation_type.to_string(),
                file_id: op.file_id.clone(),
                attempts: op.attempts,
            }))
            .ok();
    }

    async fn finish_failure(
        &self,
        op: &mut SyncOperation,
        error: SyncError,
        known_file: Option<FileRecord>,
        known_entry: Option<WorkspaceEntry>,
    ) {
        let now = self.clock.now();
        let access_denied = error.is_access_denied();
        let retry = self.config.auto_retry && !access_denied;

        let status = match op.record_failure(error.to_string(), retry, self.config.retry_delay(), now)
        {
            Ok(status) => status,
            Err(e) => {
                error!("Operation {} failed out of order: {}", op.id, e);
                return;
            }
        };

        if status == OperationStatus::Pending {
            warn!(
                "Operation {} failed (attempt {}/{}), retrying: {}",
                op.id, op.attempts, op.max_attempts, error
            );
            self.state.write().await.metrics.retries += 1;
            self.event_bus
                .emit(CoreEvent::Sync(SyncEvent::OperationRetrying {
                    operation_id: op.id.to_string(),
                    attempt: op.attempts,
                    next_attempt_at: op
                        .next_attempt
                        .map(|at| at.to_rfc3339())
                        .unwrap_or_default(),
                    message: error.to_string(),
                }))
                .ok();
            self.queue.enqueue(op.clone()).await;
            return;
        }

        let terminal = SyncError::OperationFailed {
            operation_id: op.id.to_string(),
            attempts: op.attempts,
            message: error.to_string(),
        };
        error!("{}", terminal);

        {
            let mut state = self.state.write().await;
            state.metrics.record_failure();
            if let Some(event) = &op.source_event {
                state.clear_pending(&event.id);
            }
            state.push_history(op.clone());
        }

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::OperationFailed {
                operation_id: op.id.to_string(),
                operation_type: op.operation_type.to_string(),
                file_id: op.file_id.clone(),
                attempts: op.attempts,
                message: error.to_string(),
            }))
            .ok();

        if access_denied {
            let conflict = SyncConflict::new(
                ConflictType::AccessConflict,
                op.file_id.clone(),
                known_file,
                known_entry,
                now,
            );
            self.handle_conflict(conflict).await;
        }
    }

    // ========================================================================
    // Background tasks
    // ========================================================================

    /// Drain the queue until cancelled, sleeping until work or a retry is due
    pub fn spawn_consumer(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let orchestrator = self.clone_for_task();
        tokio::spawn(async move {
            info!("Operation consumer started");
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                if orchestrator.process_next().await.is_some() {
                    continue;
                }

                let wait = match orchestrator.queue.next_due().await {
                    Some(at) => (at - orchestrator.clock.now())
                        .to_std()
                        .unwrap_or(Duration::ZERO),
                    None => Duration::from_secs(3600),
                };
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = orchestrator.queue.notified() => {}
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            info!("Operation consumer stopped");
        })
    }

    /// Turn watcher messages into operations and notifications
    pub fn spawn_router(
        &self,
        mut rx: UnboundedReceiver<WatcherMessage>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let orchestrator = self.clone_for_task();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = cancel.cancelled() => break,
                    message = rx.recv() => message,
                };
                let Some(message) = message else { break };

                match message {
                    WatcherMessage::Change(event) => {
                        if let Err(e) = orchestrator.handle_change(event).await {
                            warn!("Failed to route change: {}", e);
                        }
                    }
                    WatcherMessage::PollCompleted { source, changes } => {
                        orchestrator
                            .event_bus
                            .emit(CoreEvent::Watcher(WatcherEvent::PollCompleted {
                                source: source.to_string(),
                                changes: changes as u64,
                            }))
                            .ok();
                    }
                    WatcherMessage::FetchFailed { source, message } => {
                        orchestrator
                            .event_bus
                            .emit(CoreEvent::Watcher(WatcherEvent::FetchFailed {
                                source: source.to_string(),
                                message,
                            }))
                            .ok();
                    }
                }
            }
            debug!("Router stopped");
        })
    }

    /// Run `force_sync` every `interval` until cancelled
    pub fn spawn_reconciler(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let orchestrator = self.clone_for_task();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(e) = orchestrator.force_sync().await {
                    warn!("Periodic reconciliation failed: {}", e);
                }
            }
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Snapshot of the sync state
    pub async fn get_sync_state(&self) -> SyncState {
        self.state.read().await.clone()
    }

    pub async fn get_metrics(&self) -> SyncMetrics {
        self.state.read().await.metrics.clone()
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.queue.stats(self.clock.now()).await
    }

    pub async fn active_conflicts(&self) -> Vec<SyncConflict> {
        self.state
            .read()
            .await
            .active_conflicts
            .values()
            .cloned()
            .collect()
    }

    /// Cached records of both sides, tombstones included
    pub async fn known_records(&self) -> (Vec<FileRecord>, Vec<WorkspaceEntry>) {
        let state = self.state.read().await;
        (
            state.files.values().cloned().collect(),
            state.entries.values().cloned().collect(),
        )
    }

    /// Cached workspace entry for `file_id`
    pub async fn known_entry(&self, file_id: &str) -> Option<WorkspaceEntry> {
        self.state.read().await.entries.get(file_id).cloned()
    }
}

fn apply_outcome(state: &mut SyncState, file_id: &str, outcome: ExecutionOutcome) {
    match (outcome.rekeyed_from, outcome.entry) {
        (Some(old_id), Some(entry)) => state.rekey_entry(&old_id, entry),
        (None, Some(entry)) => state.apply_entry(entry),
        _ => {}
    }
    if let Some(file) = outcome.file {
        state.apply_file(file);
    }
    if outcome.file_deleted {
        state.tombstone_file(file_id);
    }
    if outcome.entry_tombstoned {
        state.tombstone_entry(file_id);
    }
}

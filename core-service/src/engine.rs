//! # Sync Engine
//!
//! Façade over the orchestrator, the change watchers and the OCR pipeline.
//!
//! ## Lifecycle
//!
//! `start()` runs one full reconciliation, primes both watchers from its
//! result and spawns the background tasks:
//! - one watcher per source, feeding the router over an `mpsc` channel
//! - the router and the operation consumer
//! - the OCR consumer and scheduler (when OCR is enabled)
//! - the periodic reconciler (when enabled)
//!
//! `stop()` cancels every task and waits for it to exit. Caches are not
//! persisted; the next `start()` rebuilds them.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = SyncEngine::new(core_config, SyncConfig::default(), OcrConfig::default())?;
//! engine.start().await?;
//!
//! let metrics = engine.get_metrics().await;
//! engine.stop().await;
//! ```

use std::sync::Arc;

use bridge_traits::{EntrySyncStatus, OcrHealth};
use core_ocr::{OcrConfig, OcrPipeline, OcrStats};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, Receiver, RecvError, SyncEvent};
use core_sync::{
    ChangeWatcher, ConflictResolution, FileStoreListing, OperationType, QueueStats,
    ReconcileReport, SyncConfig, SyncConflict, SyncMetrics, SyncOrchestrator, SyncState,
    WatcherHandle, WorkspaceListing,
};
use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{CoreError, Result};

/// Tasks owned by a running engine
struct RunningTasks {
    cancel: CancellationToken,
    watchers: Vec<WatcherHandle>,
    tasks: Vec<JoinHandle<()>>,
}

pub struct SyncEngine {
    core: CoreConfig,
    event_bus: Arc<EventBus>,
    orchestrator: Arc<SyncOrchestrator>,
    ocr: Option<Arc<OcrPipeline>>,
    running: Mutex<Option<RunningTasks>>,
}

impl SyncEngine {
    /// Build the engine from host configuration
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration fails validation.
    pub fn new(core: CoreConfig, sync_config: SyncConfig, ocr_config: OcrConfig) -> Result<Self> {
        core.validate()?;
        let event_bus = Arc::new(EventBus::new(core.event_buffer_size));
        let orchestrator = SyncOrchestrator::new(&core, sync_config, Arc::clone(&event_bus))?;

        let ocr = if core.features.enable_ocr {
            Some(Arc::new(OcrPipeline::new(
                &core,
                ocr_config,
                Arc::clone(&event_bus),
            )?))
        } else {
            None
        };

        Ok(Self {
            core,
            event_bus,
            orchestrator: Arc::new(orchestrator),
            ocr,
            running: Mutex::new(None),
        })
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    pub fn ocr_pipeline(&self) -> Option<&OcrPipeline> {
        self.ocr.as_deref()
    }

    pub fn subscribe_events(&self) -> Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Reconcile once, then start the background tasks
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(CoreError::AlreadyRunning);
        }

        let report = self.orchestrator.force_sync().await?;
        info!(
            operations = report.operations_queued,
            conflicts = report.conflicts_detected,
            "Initial reconciliation finished"
        );

        let cancel = CancellationToken::new();
        let mut tasks = vec![self.orchestrator.spawn_consumer(cancel.clone())];
        let mut watchers = Vec::new();

        if self.core.features.enable_watchers {
            let (tx, rx) = mpsc::unbounded_channel();
            tasks.push(self.orchestrator.spawn_router(rx, cancel.clone()));

            let (files, entries) = self.orchestrator.known_records().await;
            let settings = &self.core.watcher;

            let mut file_watcher = ChangeWatcher::new(
                FileStoreListing::new(
                    Arc::clone(&self.core.file_store),
                    settings.folder.clone(),
                    settings.recursive,
                ),
                settings.file_store_interval,
                settings.jitter_ratio,
                Arc::clone(&self.core.clock),
            );
            file_watcher.prime(files);

            let mut workspace_watcher = ChangeWatcher::new(
                WorkspaceListing::new(Arc::clone(&self.core.workspace_store)),
                settings.workspace_interval,
                settings.jitter_ratio,
                Arc::clone(&self.core.clock),
            );
            workspace_watcher.prime(entries);

            watchers.push(file_watcher.start_watching(tx.clone(), cancel.child_token()));
            watchers.push(workspace_watcher.start_watching(tx, cancel.child_token()));
        }

        if let Some(pipeline) = &self.ocr {
            match pipeline.process_backlog().await {
                Ok(queued) => debug!("Queued {} backlog documents for OCR", queued),
                Err(e) => warn!("OCR backlog sweep failed: {}", e),
            }
            tasks.push(pipeline.spawn(cancel.clone()));
            tasks.push(self.spawn_ocr_scheduler(Arc::clone(pipeline), cancel.clone()));
        }

        if self.core.features.enable_periodic_reconciliation {
            tasks.push(
                self.orchestrator
                    .spawn_reconciler(self.core.reconcile_interval, cancel.clone()),
            );
        }

        *running = Some(RunningTasks {
            cancel,
            watchers,
            tasks,
        });
        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::EngineStarted))
            .ok();
        info!("Sync engine started");
        Ok(())
    }

    /// Cancel all background tasks and wait for them to finish
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            debug!("Sync engine not running");
            return;
        };

        running.cancel.cancel();
        for watcher in running.watchers {
            watcher.stop_watching().await;
        }
        for result in join_all(running.tasks).await {
            if let Err(e) = result {
                warn!("Background task ended abnormally: {}", e);
            }
        }

        self.event_bus
            .emit(CoreEvent::Sync(SyncEvent::EngineStopped))
            .ok();
        info!("Sync engine stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Queue OCR for entries written by completed mirror operations
    fn spawn_ocr_scheduler(
        &self,
        pipeline: Arc<OcrPipeline>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let mut events = self.event_bus.subscribe();
        let priority = pipeline.config().default_priority;

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events.recv() => event,
                };

                let file_id = match event {
                    Ok(CoreEvent::Sync(SyncEvent::OperationCompleted {
                        operation_type,
                        file_id,
                        ..
                    })) if is_mirror_into_workspace(&operation_type) => file_id,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("OCR scheduler missed {} events", skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };

                if let Some(entry) = orchestrator.known_entry(&file_id).await {
                    if entry.sync_status != EntrySyncStatus::Conflict {
                        pipeline.schedule_analysis(&entry, priority).await;
                    }
                }
            }
        })
    }

    // ========================================================================
    // Control surface
    // ========================================================================

    pub async fn force_sync(&self) -> Result<ReconcileReport> {
        Ok(self.orchestrator.force_sync().await?)
    }

    pub async fn get_metrics(&self) -> SyncMetrics {
        self.orchestrator.get_metrics().await
    }

    pub async fn get_sync_state(&self) -> SyncState {
        self.orchestrator.get_sync_state().await
    }

    pub async fn queue_stats(&self) -> QueueStats {
        self.orchestrator.queue_stats().await
    }

    pub async fn active_conflicts(&self) -> Vec<SyncConflict> {
        self.orchestrator.active_conflicts().await
    }

    /// Apply an operator resolution to an active conflict
    pub async fn resolve_conflict(
        &self,
        conflict_id: &str,
        resolution: ConflictResolution,
    ) -> Result<()> {
        self.orchestrator
            .resolve_conflict(conflict_id, resolution)
            .await?;
        Ok(())
    }

    /// Queue every eligible, unanalyzed entry for OCR
    pub async fn process_backlog(&self) -> Result<usize> {
        Ok(self.pipeline()?.process_backlog().await?)
    }

    pub async fn ocr_health(&self) -> Result<OcrHealth> {
        Ok(self.pipeline()?.health().await?)
    }

    pub async fn ocr_stats(&self) -> Option<OcrStats> {
        match &self.ocr {
            Some(pipeline) => Some(pipeline.stats().await),
            None => None,
        }
    }

    fn pipeline(&self) -> Result<&OcrPipeline> {
        self.ocr
            .as_deref()
            .ok_or_else(|| CoreError::CapabilityMissing {
                capability: "OcrService".to_string(),
                message: "OCR enrichment is disabled".to_string(),
            })
    }
}

fn is_mirror_into_workspace(operation_type: &str) -> bool {
    operation_type == OperationType::CreateInB.as_str()
        || operation_type == OperationType::UpdateInB.as_str()
}

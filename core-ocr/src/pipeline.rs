//! # OCR Enrichment Pipeline
//!
//! Sends eligible workspace documents to the OCR service and writes the
//! extracted text, structured fields and derived tags back to the entry.
//!
//! ## Workflow
//!
//! 1. `schedule_analysis` checks eligibility and queues the entry
//! 2. A single consumer pops the most urgent job
//! 3. The document is downloaded from the file store (workspace attachment
//!    as fallback), hashed and base64-encoded
//! 4. The OCR service is called with a language guessed from the file name
//! 5. The entry is patched with the results
//!
//! A failed attempt is re-queued one priority step more urgent. When all
//! attempts are spent the entry is marked analyzed with a placeholder text
//! and the `OCR-Error` tag so it is not picked up again.
//!
//! ## Usage
//!
//! ```ignore
//! let pipeline = OcrPipeline::new(&core_config, OcrConfig::default(), event_bus)?;
//! pipeline.process_backlog().await?;
//! let handle = pipeline.spawn(cancel.clone());
//! ```

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bridge_traits::{
    BridgeError, Clock, EntryPatch, FileStore, OcrHealth, OcrRequest, OcrService, WorkspaceEntry,
    WorkspaceStore,
};
use bytes::Bytes;
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, EventBus, OcrEvent};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::OcrConfig;
use crate::eligibility;
use crate::error::{OcrError, Result};
use crate::language::detect_language;
use crate::queue::{OcrJob, OcrQueue};
use crate::tagging::{derive_tags, merge_tags, refine_category, TAG_OCR_ERROR};

/// Counters exposed to the control surface
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OcrStats {
    /// Jobs accepted by `schedule_analysis`
    pub queued: u64,
    /// Attempts made
    pub processed: u64,
    pub succeeded: u64,
    pub soft_failed: u64,
    pub retries: u64,
    /// Jobs currently waiting
    pub pending: u64,
}

/// Result of one processed job
#[derive(Debug, Clone, PartialEq)]
pub enum OcrOutcome {
    Completed { file_id: String, tags: Vec<String> },
    Retrying { file_id: String, attempt: u32, priority: u8 },
    SoftFailed { file_id: String, attempts: u32, message: String },
}

pub struct OcrPipeline {
    config: OcrConfig,
    file_store: Arc<dyn FileStore>,
    workspace: Arc<dyn WorkspaceStore>,
    ocr: Arc<dyn OcrService>,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
    queue: Arc<OcrQueue>,
    stats: Arc<RwLock<OcrStats>>,
}

impl OcrPipeline {
    pub fn new(core: &CoreConfig, config: OcrConfig, event_bus: Arc<EventBus>) -> Result<Self> {
        config.validate()?;
        let ocr = core
            .ocr_service
            .clone()
            .ok_or(OcrError::ServiceUnavailable)?;

        Ok(Self {
            config,
            file_store: core.file_store.clone(),
            workspace: core.workspace_store.clone(),
            ocr,
            clock: core.clock.clone(),
            event_bus,
            queue: Arc::new(OcrQueue::new()),
            stats: Arc::new(RwLock::new(OcrStats::default())),
        })
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    fn clone_for_task(&self) -> Self {
        Self {
            config: self.config.clone(),
            file_store: self.file_store.clone(),
            workspace: self.workspace.clone(),
            ocr: self.ocr.clone(),
            clock: self.clock.clone(),
            event_bus: self.event_bus.clone(),
            queue: self.queue.clone(),
            stats: self.stats.clone(),
        }
    }

    // ========================================================================
    // Scheduling
    // ========================================================================

    /// Queue an entry for OCR.
    ///
    /// Returns `false` when the entry is ineligible or already queued.
    #[instrument(skip(self, entry), fields(file_id = %entry.file_id))]
    pub async fn schedule_analysis(&self, entry: &WorkspaceEntry, priority: u8) -> bool {
        if let Err(reason) = eligibility::check(entry, &self.config) {
            debug!("Skipping OCR: {}", reason);
            return false;
        }

        let job = OcrJob::new(entry.clone(), priority, self.clock.now());
        if !self.queue.push(job).await {
            debug!("Already queued for OCR");
            return false;
        }

        self.stats.write().await.queued += 1;
        self.event_bus
            .emit(CoreEvent::Ocr(OcrEvent::Queued {
                file_id: entry.file_id.clone(),
                priority,
            }))
            .ok();
        true
    }

    /// Queue every eligible, unanalyzed workspace entry at backlog priority.
    ///
    /// Returns the number of newly queued entries.
    #[instrument(skip(self))]
    pub async fn process_backlog(&self) -> Result<usize> {
        let entries = self.workspace.get_all_entries().await?;
        let priority = self.config.backlog_priority;

        let mut queued = 0;
        for entry in &entries {
            if self.schedule_analysis(entry, priority).await {
                queued += 1;
            }
        }

        info!("OCR backlog: {} of {} entries queued", queued, entries.len());
        self.event_bus
            .emit(CoreEvent::Ocr(OcrEvent::BacklogScheduled {
                queued: queued as u64,
            }))
            .ok();
        Ok(queued)
    }

    // ========================================================================
    // Processing
    // ========================================================================

    /// Process the most urgent job, if any
    pub async fn process_next(&self) -> Option<OcrOutcome> {
        let mut job = self.queue.pop().await?;
        job.attempts += 1;
        self.stats.write().await.processed += 1;

        let outcome = match self.analyze(&job).await {
            Ok(tags) => {
                self.stats.write().await.succeeded += 1;
                OcrOutcome::Completed {
                    file_id: job.file_id.clone(),
                    tags,
                }
            }
            Err(e) if job.attempts < self.config.max_attempts => {
                warn!(
                    file_id = %job.file_id,
                    attempt = job.attempts,
                    "OCR attempt failed: {}", e
                );
                self.requeue(job).await
            }
            Err(e) => self.soft_fail(&job, &e).await,
        };
        Some(outcome)
    }

    /// Process jobs until the queue is empty
    pub async fn drain(&self) -> usize {
        let mut processed = 0;
        while self.process_next().await.is_some() {
            processed += 1;
        }
        processed
    }

    #[instrument(skip(self, job), fields(file_id = %job.file_id, attempt = job.attempts))]
    async fn analyze(&self, job: &OcrJob) -> Result<Vec<String>> {
        let data = self.download(&job.entry).await?;
        let checksum = format!("{:x}", Sha256::digest(&data));
        let language = detect_language(&job.entry.file_name, &self.config.languages);
        debug!("Submitting {} bytes to OCR (language {})", data.len(), language);

        let response = self
            .ocr
            .perform_ocr(OcrRequest {
                image_base64: STANDARD.encode(&data),
                language,
                extract_tables: self.config.extract_tables,
                extract_handwriting: self.config.extract_handwriting,
            })
            .await?;
        if !response.success {
            return Err(OcrError::Service(
                response
                    .error
                    .unwrap_or_else(|| "unknown OCR error".to_string()),
            ));
        }

        let current = self.current_entry(job).await;
        let derived = derive_tags(&response.text, &response.extracted_data, response.confidence);
        let tags = merge_tags(&current.tags, &derived);
        let patch = EntryPatch {
            ocr_analyzed: Some(true),
            extracted_text: Some(response.text),
            extracted_data: Some(response.extracted_data),
            category: refine_category(current.category.as_deref(), &tags),
            tags: Some(tags.clone()),
            // A checksum mirrored from the store is what reconciliation
            // compares against; only fill the field when the store gave none.
            checksum: current.checksum.is_none().then_some(checksum),
            ..Default::default()
        };
        self.write(&job.file_id, patch).await?;

        info!("OCR completed for {} with tags {:?}", job.file_id, derived);
        self.event_bus
            .emit(CoreEvent::Ocr(OcrEvent::Completed {
                file_id: job.file_id.clone(),
                confidence_percent: (response.confidence.clamp(0.0, 1.0) * 100.0).round() as u8,
                tags: derived,
            }))
            .ok();
        Ok(tags)
    }

    /// Document bytes from the file store, falling back to the workspace
    /// attachment for entries the store does not know
    async fn download(&self, entry: &WorkspaceEntry) -> Result<Bytes> {
        match self.file_store.download(&entry.file_id).await {
            Ok(data) => Ok(data),
            Err(BridgeError::NotFound(_)) => self
                .workspace
                .download_attachment(entry)
                .await
                .map_err(|e| OcrError::Download {
                    file_id: entry.file_id.clone(),
                    message: e.to_string(),
                }),
            Err(e) => Err(OcrError::Download {
                file_id: entry.file_id.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// The entry as it is now, falling back to the scheduling snapshot
    async fn current_entry(&self, job: &OcrJob) -> WorkspaceEntry {
        match self.workspace.get_entry(&job.file_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => job.entry.clone(),
            Err(e) => {
                debug!(file_id = %job.file_id, "Using queued snapshot of entry: {}", e);
                job.entry.clone()
            }
        }
    }

    async fn write(&self, file_id: &str, patch: EntryPatch) -> Result<()> {
        self.workspace
            .update_entry(file_id, patch)
            .await
            .map(|_| ())
            .map_err(|e| OcrError::Update {
                file_id: file_id.to_string(),
                message: e.to_string(),
            })
    }

    async fn requeue(&self, mut job: OcrJob) -> OcrOutcome {
        job.priority = job.boosted_priority();
        let (file_id, attempt, priority) = (job.file_id.clone(), job.attempts, job.priority);

        self.queue.push(job).await;
        self.stats.write().await.retries += 1;
        self.event_bus
            .emit(CoreEvent::Ocr(OcrEvent::Retrying {
                file_id: file_id.clone(),
                attempt,
                priority,
            }))
            .ok();

        OcrOutcome::Retrying {
            file_id,
            attempt,
            priority,
        }
    }

    /// Mark the entry analyzed with a placeholder so it is not retried forever
    async fn soft_fail(&self, job: &OcrJob, error: &OcrError) -> OcrOutcome {
        let message = error.to_string();
        warn!(
            file_id = %job.file_id,
            attempts = job.attempts,
            "OCR failed permanently: {}", message
        );

        let current = self.current_entry(job).await;
        let patch = EntryPatch {
            ocr_analyzed: Some(true),
            extracted_text: Some(format!(
                "[OCR failed after {} attempts: {}]",
                job.attempts, message
            )),
            tags: Some(merge_tags(&current.tags, &[TAG_OCR_ERROR.to_string()])),
            ..Default::default()
        };
        if let Err(e) = self.write(&job.file_id, patch).await {
            warn!(file_id = %job.file_id, "Failed to record OCR failure: {}", e);
        }

        self.stats.write().await.soft_failed += 1;
        self.event_bus
            .emit(CoreEvent::Ocr(OcrEvent::Failed {
                file_id: job.file_id.clone(),
                attempts: job.attempts,
                message: message.clone(),
            }))
            .ok();

        OcrOutcome::SoftFailed {
            file_id: job.file_id.clone(),
            attempts: job.attempts,
            message,
        }
    }

    // ========================================================================
    // Background task
    // ========================================================================

    /// Drain the queue until cancelled
    pub fn spawn(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let pipeline = self.clone_for_task();
        tokio::spawn(async move {
            info!("OCR consumer started");
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                if pipeline.process_next().await.is_some() {
                    continue;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = pipeline.queue.notified() => {}
                }
            }
            info!("OCR consumer stopped");
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn stats(&self) -> OcrStats {
        let mut stats = *self.stats.read().await;
        stats.pending = self.queue.len().await as u64;
        stats
    }

    pub async fn health(&self) -> Result<OcrHealth> {
        Ok(self.ocr.health_check().await?)
    }
}

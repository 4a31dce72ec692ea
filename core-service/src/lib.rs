//! Core service façade.
//!
//! Hosts inject their collaborators (file store, workspace database, OCR
//! service) through [`core_runtime::config::CoreConfig`] and drive the
//! engine through [`SyncEngine`]. The HTTP control layer and the concrete
//! collaborator clients live outside this workspace.

pub mod engine;
pub mod error;

pub use engine::SyncEngine;
pub use error::{CoreError, Result};

pub use core_ocr::{OcrConfig, OcrStats};
pub use core_runtime::config::{CoreConfig, FeatureFlags, WatcherSettings};
pub use core_runtime::events::{CoreEvent, EventBus};
pub use core_sync::{ConflictResolution, ReconcileReport, SyncConfig, SyncMetrics, SyncState};

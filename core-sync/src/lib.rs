//! # Sync Module
//!
//! Keeps the cloud file store (source A) and the workspace database
//! (source B) consistent.
//!
//! ## Overview
//!
//! This module manages:
//! - Polling both sources and turning listing differences into change events
//! - Classifying divergence into conflicts and resolving them by policy
//! - Executing directed write operations FIFO with bounded retry
//! - Tracking state, histories and metrics for the control surface
//!
//! ## Components
//!
//! - **Change Model** (`change`): Sources, change types and change events
//! - **Watchers** (`watcher`): Per-source polling with snapshot diffing
//! - **Conflicts** (`conflict`, `conflict_resolver`): Conflict taxonomy, resolution policy and validation
//! - **Operations** (`operation`, `operation_queue`, `executor`): Operation state machine, FIFO queue and idempotent execution
//! - **Reconciliation** (`reconcile`): Full comparison of both sources
//! - **State** (`state`): Caches, histories and metrics
//! - **Sync Orchestrator** (`coordinator`): Wires everything together

pub mod change;
pub mod conflict;
pub mod conflict_resolver;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod mirror;
pub mod operation;
pub mod operation_queue;
pub mod reconcile;
pub mod state;
pub mod watcher;

pub use change::{ChangeEvent, ChangeMetadata, ChangeType, Source};
pub use conflict::{
    ActionKind, ConflictResolution, ConflictSeverity, ConflictType, ResolutionAction,
    ResolutionDetails, ResolutionStrategy, ResolvedBy, SyncConflict,
};
pub use conflict_resolver::ConflictResolver;
pub use coordinator::{ReconcileReport, SyncConfig, SyncOrchestrator};
pub use error::{Result, SyncError};
pub use executor::{ExecutionOutcome, OperationExecutor};
pub use operation::{OperationId, OperationStatus, OperationType, SyncOperation, TargetAction};
pub use operation_queue::{OperationQueue, QueueStats};
pub use state::{SyncMetrics, SyncState};
pub use watcher::{
    ChangeWatcher, FileStoreListing, SourceListing, WatcherHandle, WatcherMessage,
    WorkspaceListing,
};

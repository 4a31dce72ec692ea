//! # Collaborator Bridge Traits
//!
//! Abstraction traits for the external systems the sync core talks to.
//!
//! ## Overview
//!
//! This crate defines the contract between the synchronization core and the
//! concrete clients for each external system. The core never speaks a wire
//! protocol itself; hosts inject implementations of these traits.
//!
//! ## Traits
//!
//! ### Sources
//! - [`FileStore`](storage::FileStore) - Source A, the cloud file store
//! - [`WorkspaceStore`](workspace::WorkspaceStore) - Source B, the workspace database
//!
//! ### Enrichment
//! - [`OcrService`](ocr::OcrService) - OCR model server
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required collaborator is missing:
//!
//! ```ignore
//! use core_runtime::error::CoreError;
//!
//! pub fn build(self) -> Result<CoreConfig> {
//!     let file_store = self.file_store
//!         .ok_or_else(|| CoreError::CapabilityMissing {
//!             capability: "FileStore".to_string(),
//!             message: "No file store client provided.".to_string(),
//!         })?;
//!     // ...
//! }
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should map authorization refusals to `PermissionDenied` and connectivity
//! problems to `Network`, so the core can tell retryable failures apart.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds so they can be shared across
//! watcher, consumer and OCR tasks.
//!
//! ## Testing
//!
//! The `test-utils` feature exposes in-memory implementations in [`testing`].

pub mod error;
pub mod ocr;
pub mod storage;
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
pub mod time;
pub mod workspace;

pub use error::BridgeError;

// Re-export commonly used types
pub use ocr::{ExtractedData, OcrHealth, OcrRequest, OcrResponse, OcrService};
pub use storage::{FileRecord, FileStore};
pub use time::{Clock, LogLevel, SystemClock};
pub use workspace::{EntryPatch, EntrySyncStatus, WorkspaceEntry, WorkspaceStore};

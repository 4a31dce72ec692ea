//! Workspace umbrella crate.
//!
//! Re-exports the sync engine so hosts can depend on `docsync-workspace`
//! and pick the documented features instead of wiring each crate.

#[cfg(feature = "engine")]
pub use core_service::*;

#[cfg(feature = "ocr")]
pub use core_ocr as ocr;

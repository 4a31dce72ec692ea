//! # OCR Module
//!
//! Enriches workspace entries with OCR results.
//!
//! ## Components
//!
//! - **Eligibility** (`eligibility`): Which documents may be analyzed
//! - **Language** (`language`): Filename keyword language guess
//! - **Tagging** (`tagging`): Tags and categories derived from OCR output
//! - **Queue** (`queue`): Priority queue with FIFO order among equals
//! - **Pipeline** (`pipeline`): Scheduling, processing, retry and soft failure

pub mod config;
pub mod eligibility;
pub mod error;
pub mod language;
pub mod pipeline;
pub mod queue;
pub mod tagging;

pub use config::{LanguageHint, OcrConfig, BACKLOG_PRIORITY, DEFAULT_PRIORITY};
pub use eligibility::Ineligible;
pub use error::{OcrError, Result};
pub use pipeline::{OcrOutcome, OcrPipeline, OcrStats};
pub use queue::{OcrJob, OcrQueue};

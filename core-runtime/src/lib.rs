//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the sync engine:
//! - Logging and tracing infrastructure
//! - Host configuration with injected collaborators
//! - Event bus for outward notifications
//!
//! ## Overview
//!
//! This crate contains the runtime utilities that the sync and OCR crates
//! depend on. It establishes the logging conventions and the event
//! broadcasting mechanism used throughout the workspace.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};

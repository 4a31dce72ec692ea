//! # Core Configuration Module
//!
//! Provides host configuration for the sync engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the injected collaborators and the runtime settings of
//! the engine. It enforces fail-fast validation so a missing collaborator is
//! reported at construction time instead of on the first poll.
//!
//! ## Required Dependencies
//!
//! - `FileStore` - Source A, the cloud file store
//! - `WorkspaceStore` - Source B, the workspace database
//!
//! ## Optional Dependencies
//!
//! - `OcrService` - Required only when OCR enrichment is enabled
//! - `Clock` - Defaults to `SystemClock`
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .file_store(Arc::new(MyCloudClient::new()))
//!     .workspace_store(Arc::new(MyWorkspaceClient::new()))
//!     .ocr_service(Arc::new(MyOcrClient::new()))
//!     .watch_folder("/Documents")
//!     .file_store_interval(Duration::from_secs(30))
//!     .enable_ocr(true)
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Panics: no collaborators were provided
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing required collaborators");
//! ```

use crate::error::{Error, Result};
use bridge_traits::{Clock, FileStore, OcrService, SystemClock, WorkspaceStore};
use std::sync::Arc;
use std::time::Duration;

/// Polling settings shared by both change watchers
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherSettings {
    /// Folder of the file store to watch
    pub folder: String,
    /// Descend into subfolders of `folder`
    pub recursive: bool,
    /// Poll interval for the file store
    pub file_store_interval: Duration,
    /// Poll interval for the workspace
    pub workspace_interval: Duration,
    /// Random extra delay per tick, as a fraction of the interval
    pub jitter_ratio: f64,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            folder: "/".to_string(),
            recursive: true,
            file_store_interval: Duration::from_secs(30),
            workspace_interval: Duration::from_secs(60),
            jitter_ratio: 0.1,
        }
    }
}

impl WatcherSettings {
    pub fn validate(&self) -> Result<()> {
        if self.folder.is_empty() || !self.folder.starts_with('/') {
            return Err(Error::Config(format!(
                "Watch folder must be an absolute path, got '{}'",
                self.folder
            )));
        }

        if self.file_store_interval.is_zero() || self.workspace_interval.is_zero() {
            return Err(Error::Config(
                "Watcher intervals must be greater than zero".to_string(),
            ));
        }

        if !(0.0..1.0).contains(&self.jitter_ratio) {
            return Err(Error::Config(format!(
                "Jitter ratio must be in [0.0, 1.0), got {}",
                self.jitter_ratio
            )));
        }

        Ok(())
    }
}

/// Feature toggles for the background tasks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Poll both sources for changes
    pub enable_watchers: bool,
    /// Run the OCR enrichment pipeline
    pub enable_ocr: bool,
    /// Re-run full reconciliation every `reconcile_interval`
    pub enable_periodic_reconciliation: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_watchers: true,
            enable_ocr: false,
            enable_periodic_reconciliation: false,
        }
    }
}

/// Core configuration with injected collaborators
#[derive(Clone)]
pub struct CoreConfig {
    pub file_store: Arc<dyn FileStore>,

    pub workspace_store: Arc<dyn WorkspaceStore>,

    pub ocr_service: Option<Arc<dyn OcrService>>,

    pub clock: Arc<dyn Clock>,

    pub watcher: WatcherSettings,

    pub features: FeatureFlags,

    /// Interval of periodic full reconciliation
    pub reconcile_interval: Duration,

    /// Capacity of the outward event bus
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("file_store", &"FileStore { ... }")
            .field("workspace_store", &"WorkspaceStore { ... }")
            .field(
                "ocr_service",
                &self.ocr_service.as_ref().map(|_| "OcrService { ... }"),
            )
            .field("watcher", &self.watcher)
            .field("features", &self.features)
            .field("reconcile_interval", &self.reconcile_interval)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.watcher.validate()?;

        if self.features.enable_ocr && self.ocr_service.is_none() {
            return Err(Error::CapabilityMissing {
                capability: "OcrService".to_string(),
                message: "OCR enrichment enabled but no OcrService provided. \
                          Disable the feature or inject an OcrService implementation."
                    .to_string(),
            });
        }

        if self.features.enable_periodic_reconciliation && self.reconcile_interval.is_zero() {
            return Err(Error::Config(
                "Reconciliation interval must be greater than zero".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn file_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "FileStore".to_string(),
        message: "A FileStore implementation is required to read and write the cloud file store. \
                  Inject the provider client with .file_store()."
            .to_string(),
    }
}

fn workspace_store_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "WorkspaceStore".to_string(),
        message: "A WorkspaceStore implementation is required to mirror files into the workspace. \
                  Inject the workspace client with .workspace_store()."
            .to_string(),
    }
}

/// Builder for [`CoreConfig`]
#[derive(Default)]
pub struct CoreConfigBuilder {
    file_store: Option<Arc<dyn FileStore>>,
    workspace_store: Option<Arc<dyn WorkspaceStore>>,
    ocr_service: Option<Arc<dyn OcrService>>,
    clock: Option<Arc<dyn Clock>>,
    watcher: WatcherSettings,
    features: FeatureFlags,
    reconcile_interval: Option<Duration>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    pub fn file_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.file_store = Some(store);
        self
    }

    pub fn workspace_store(mut self, store: Arc<dyn WorkspaceStore>) -> Self {
        self.workspace_store = Some(store);
        self
    }

    pub fn ocr_service(mut self, service: Arc<dyn OcrService>) -> Self {
        self.ocr_service = Some(service);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn watch_folder(mut self, folder: impl Into<String>) -> Self {
        self.watcher.folder = folder.into();
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.watcher.recursive = recursive;
        self
    }

    pub fn file_store_interval(mut self, interval: Duration) -> Self {
        self.watcher.file_store_interval = interval;
        self
    }

    pub fn workspace_interval(mut self, interval: Duration) -> Self {
        self.watcher.workspace_interval = interval;
        self
    }

    pub fn jitter_ratio(mut self, ratio: f64) -> Self {
        self.watcher.jitter_ratio = ratio;
        self
    }

    pub fn watcher_settings(mut self, settings: WatcherSettings) -> Self {
        self.watcher = settings;
        self
    }

    pub fn enable_watchers(mut self, enabled: bool) -> Self {
        self.features.enable_watchers = enabled;
        self
    }

    pub fn enable_ocr(mut self, enabled: bool) -> Self {
        self.features.enable_ocr = enabled;
        self
    }

    pub fn enable_periodic_reconciliation(mut self, enabled: bool) -> Self {
        self.features.enable_periodic_reconciliation = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    pub fn reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = Some(interval);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    pub fn build(self) -> Result<CoreConfig> {
        let file_store = self.file_store.ok_or_else(file_store_missing_error)?;
        let workspace_store = self
            .workspace_store
            .ok_or_else(workspace_store_missing_error)?;

        let config = CoreConfig {
            file_store,
            workspace_store,
            ocr_service: self.ocr_service,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            watcher: self.watcher,
            features: self.features,
            reconcile_interval: self
                .reconcile_interval
                .unwrap_or(Duration::from_secs(15 * 60)),
            event_buffer_size: self
                .event_buffer_size
                .unwrap_or(crate::events::DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

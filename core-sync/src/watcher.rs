//! # Change Watchers
//!
//! One polling watcher per source. Each tick fetches the current listing,
//! diffs it against the cached snapshot and sends one [`ChangeEvent`] per
//! observed difference over an `mpsc` channel to the orchestrator's router.
//!
//! ## Diff rules
//!
//! - id listed now but not before → `created`
//! - id listed before but not now → `deleted`, kept in the cache as a
//!   tombstone so a late listing cannot resurrect it silently
//! - tombstone flag newly set → `deleted`
//! - path changed → `moved` (wins over `modified`)
//! - newer modification time → `modified`
//!
//! ## Usage
//!
//! ```rust,ignore
//! let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
//! let cancel = CancellationToken::new();
//!
//! let mut watcher = ChangeWatcher::new(listing, Duration::from_secs(30), 0.1, clock);
//! watcher.prime(initial_listing);
//! let handle = watcher.start_watching(tx, cancel.child_token());
//!
//! // later
//! handle.stop_watching().await;
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{Clock, FileRecord, FileStore, WorkspaceEntry, WorkspaceStore};
use chrono::{DateTime, Utc};
use rand::Rng;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::change::{ChangeEvent, ChangeType, Source};
use crate::error::Result;

// ============================================================================
// Watched items
// ============================================================================

/// A record a watcher can diff between listings
pub trait WatchedItem: Clone + Send + Sync + 'static {
    /// Identity across listings
    fn key(&self) -> &str;
    fn path(&self) -> &str;
    fn modified(&self) -> DateTime<Utc>;
    fn is_tombstoned(&self) -> bool;
    /// Copy of the item with its tombstone flag set
    fn tombstone(&self) -> Self;
    fn to_event(&self, change_type: ChangeType, at: DateTime<Utc>) -> ChangeEvent;
}

impl WatchedItem for FileRecord {
    fn key(&self) -> &str {
        &self.id
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn modified(&self) -> DateTime<Utc> {
        self.modified_at
    }

    fn is_tombstoned(&self) -> bool {
        self.deleted
    }

    fn tombstone(&self) -> Self {
        self.tombstoned()
    }

    fn to_event(&self, change_type: ChangeType, at: DateTime<Utc>) -> ChangeEvent {
        ChangeEvent::from_file(change_type, self, at)
    }
}

impl WatchedItem for WorkspaceEntry {
    fn key(&self) -> &str {
        &self.file_id
    }

    fn path(&self) -> &str {
        &self.file_path
    }

    fn modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    fn is_tombstoned(&self) -> bool {
        WorkspaceEntry::is_tombstoned(self)
    }

    fn tombstone(&self) -> Self {
        Self {
            deleted_in_b: true,
            ..self.clone()
        }
    }

    fn to_event(&self, change_type: ChangeType, at: DateTime<Utc>) -> ChangeEvent {
        ChangeEvent::from_entry(change_type, self, at)
    }
}

// ============================================================================
// Listings
// ============================================================================

/// Source of complete listings for one side
#[async_trait]
pub trait SourceListing: Send + Sync + 'static {
    type Item: WatchedItem;

    fn source(&self) -> Source;

    async fn fetch(&self) -> Result<Vec<Self::Item>>;
}

/// Listing of a folder in the file store
pub struct FileStoreListing {
    store: Arc<dyn FileStore>,
    folder: String,
    recursive: bool,
}

impl FileStoreListing {
    pub fn new(store: Arc<dyn FileStore>, folder: impl Into<String>, recursive: bool) -> Self {
        Self {
            store,
            folder: folder.into(),
            recursive,
        }
    }
}

#[async_trait]
impl SourceListing for FileStoreListing {
    type Item = FileRecord;

    fn source(&self) -> Source {
        Source::A
    }

    async fn fetch(&self) -> Result<Vec<FileRecord>> {
        Ok(self.store.list(&self.folder, self.recursive).await?)
    }
}

/// Listing of every workspace entry
pub struct WorkspaceListing {
    store: Arc<dyn WorkspaceStore>,
}

impl WorkspaceListing {
    pub fn new(store: Arc<dyn WorkspaceStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SourceListing for WorkspaceListing {
    type Item = WorkspaceEntry;

    fn source(&self) -> Source {
        Source::B
    }

    async fn fetch(&self) -> Result<Vec<WorkspaceEntry>> {
        Ok(self.store.get_all_entries().await?)
    }
}

// ============================================================================
// Diffing
// ============================================================================

/// Key a listing by id, preferring live items over tombstones sharing an id
pub fn index_listing<T: WatchedItem>(items: Vec<T>) -> HashMap<String, T> {
    let mut map: HashMap<String, T> = HashMap::with_capacity(items.len());
    for item in items {
        match map.get(item.key()) {
            Some(existing) if !existing.is_tombstoned() && item.is_tombstoned() => {}
            _ => {
                map.insert(item.key().to_string(), item);
            }
        }
    }
    map
}

/// Diff a fresh listing against the previous snapshot.
///
/// Returns the next snapshot (vanished ids carried as tombstones) and the
/// change events, ordered by id.
pub fn diff_snapshots<T: WatchedItem>(
    previous: &HashMap<String, T>,
    current: Vec<T>,
    now: DateTime<Utc>,
) -> (HashMap<String, T>, Vec<ChangeEvent>) {
    let mut next = index_listing(current);
    let mut events = Vec::new();

    let mut keys: Vec<&String> = next.keys().collect();
    keys.sort();
    for key in keys {
        let item = &next[key];
        let change = match previous.get(key) {
            None if !item.is_tombstoned() => Some(item.to_event(ChangeType::Created, now)),
            None => None,
            Some(old) => {
                if item.is_tombstoned() {
                    (!old.is_tombstoned()).then(|| item.to_event(ChangeType::Deleted, now))
                } else if old.is_tombstoned() {
                    Some(item.to_event(ChangeType::Created, now))
                } else if old.path() != item.path() {
                    Some(item.to_event(ChangeType::Moved, now).with_old_path(old.path()))
                } else if item.modified() > old.modified() {
                    Some(item.to_event(ChangeType::Modified, now))
                } else {
                    None
                }
            }
        };
        events.extend(change);
    }

    let mut vanished: Vec<(String, T)> = previous
        .iter()
        .filter(|(key, _)| !next.contains_key(*key))
        .map(|(key, old)| (key.clone(), old.clone()))
        .collect();
    vanished.sort_by(|a, b| a.0.cmp(&b.0));
    for (key, old) in vanished {
        let tombstone = old.tombstone();
        if !old.is_tombstoned() {
            events.push(tombstone.to_event(ChangeType::Deleted, now));
        }
        next.insert(key, tombstone);
    }

    (next, events)
}

// ============================================================================
// Watcher
// ============================================================================

/// Message from a watcher task to the router
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherMessage {
    Change(ChangeEvent),
    PollCompleted { source: Source, changes: usize },
    FetchFailed { source: Source, message: String },
}

pub struct ChangeWatcher<L: SourceListing> {
    listing: L,
    interval: Duration,
    jitter_ratio: f64,
    clock: Arc<dyn Clock>,
    cache: HashMap<String, L::Item>,
    primed: bool,
}

impl<L: SourceListing> ChangeWatcher<L> {
    pub fn new(listing: L, interval: Duration, jitter_ratio: f64, clock: Arc<dyn Clock>) -> Self {
        Self {
            listing,
            interval,
            jitter_ratio,
            clock,
            cache: HashMap::new(),
            primed: false,
        }
    }

    pub fn source(&self) -> Source {
        self.listing.source()
    }

    /// Seed the snapshot, typically from a reconciliation listing
    pub fn prime(&mut self, items: Vec<L::Item>) {
        self.cache = index_listing(items);
        self.primed = true;
    }

    pub fn known_items(&self) -> usize {
        self.cache.len()
    }

    /// Fetch once and return the changes since the previous snapshot.
    ///
    /// An unprimed watcher takes its first listing as the baseline and
    /// reports nothing.
    #[instrument(skip(self), fields(source = %self.listing.source()))]
    pub async fn poll(&mut self) -> Result<Vec<ChangeEvent>> {
        let items = self.listing.fetch().await?;

        if !self.primed {
            self.prime(items);
            debug!(known_items = self.cache.len(), "Baseline listing taken");
            return Ok(Vec::new());
        }

        let (next, events) = diff_snapshots(&self.cache, items, self.clock.now());
        self.cache = next;
        Ok(events)
    }

    /// Run the polling loop on its own task until `cancel` fires
    pub fn start_watching(
        mut self,
        tx: UnboundedSender<WatcherMessage>,
        cancel: CancellationToken,
    ) -> WatcherHandle {
        let source = self.source();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            info!(source = %source, interval_ms = self.interval.as_millis() as u64, "Watcher started");

            loop {
                let delay = jittered(self.interval, self.jitter_ratio);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                let message = match self.poll().await {
                    Ok(events) => {
                        let changes = events.len();
                        for event in events {
                            if tx.send(WatcherMessage::Change(event)).is_err() {
                                debug!(source = %source, "Router gone, stopping watcher");
                                return;
                            }
                        }
                        WatcherMessage::PollCompleted { source, changes }
                    }
                    Err(e) => {
                        warn!(source = %source, error = %e, "Listing fetch failed, retrying next tick");
                        WatcherMessage::FetchFailed {
                            source,
                            message: e.to_string(),
                        }
                    }
                };
                if tx.send(message).is_err() {
                    return;
                }
            }

            info!(source = %source, "Watcher stopped");
        });

        WatcherHandle {
            source,
            cancel,
            task,
        }
    }
}

/// Handle to a running watcher task
pub struct WatcherHandle {
    source: Source,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn source(&self) -> Source {
        self.source
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Cancel the polling loop and wait for the task to exit
    pub async fn stop_watching(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(source = %self.source, error = %e, "Watcher task ended abnormally");
        }
    }
}

/// `interval` plus a random share of up to `ratio × interval`
fn jittered(interval: Duration, ratio: f64) -> Duration {
    if ratio <= 0.0 {
        return interval;
    }
    let factor = rand::thread_rng().gen_range(0.0..=ratio);
    interval + interval.mul_f64(factor)
}

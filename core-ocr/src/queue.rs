//! # OCR Queue
//!
//! Priority queue of documents awaiting OCR. Lower numbers run sooner and
//! jobs of equal priority run in insertion order. A file is queued at most
//! once at a time.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use bridge_traits::WorkspaceEntry;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};

#[derive(Debug, Clone, PartialEq)]
pub struct OcrJob {
    pub file_id: String,
    /// Entry as seen when the job was scheduled
    pub entry: WorkspaceEntry,
    pub priority: u8,
    /// Attempts already made
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl OcrJob {
    pub fn new(entry: WorkspaceEntry, priority: u8, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            file_id: entry.file_id.clone(),
            entry,
            priority,
            attempts: 0,
            enqueued_at,
        }
    }

    /// Priority for the next attempt, one step more urgent
    pub fn boosted_priority(&self) -> u8 {
        self.priority.saturating_sub(1)
    }
}

#[derive(Debug)]
struct Slot {
    seq: u64,
    job: OcrJob,
}

impl PartialEq for Slot {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Slot {}

impl PartialOrd for Slot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Slot {
    // BinaryHeap is a max-heap: invert so the lowest (priority, seq) pops first
    fn cmp(&self, other: &Self) -> Ordering {
        (other.job.priority, other.seq).cmp(&(self.job.priority, self.seq))
    }
}

#[derive(Debug, Default)]
struct Inner {
    heap: BinaryHeap<Slot>,
    queued: HashSet<String>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct OcrQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl OcrQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job; returns `false` if its file is already queued
    pub async fn push(&self, job: OcrJob) -> bool {
        let mut inner = self.inner.lock().await;
        if !inner.queued.insert(job.file_id.clone()) {
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Slot { seq, job });
        drop(inner);

        self.notify.notify_one();
        true
    }

    pub async fn pop(&self) -> Option<OcrJob> {
        let mut inner = self.inner.lock().await;
        let slot = inner.heap.pop()?;
        inner.queued.remove(&slot.job.file_id);
        Some(slot.job)
    }

    pub async fn contains(&self, file_id: &str) -> bool {
        self.inner.lock().await.queued.contains(file_id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.heap.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait until a job is pushed
    pub async fn notified(&self) {
        self.notify.notified().await
    }
}

//! # Event Bus System
//!
//! Provides an event-driven architecture for the sync engine using `tokio::sync::broadcast`.
//! Watchers, the orchestrator and the OCR pipeline publish typed events; hosts and
//! tests subscribe without coupling to those components.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for each domain
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ Watchers     ├──────────────>│           │
//! └──────────────┘               │           │
//!                                │ EventBus  │
//! ┌──────────────┐     emit      │ (broadcast│     subscribe    ┌────────────┐
//! │ Orchestrator ├──────────────>│  channel) ├─────────────────>│ Subscriber │
//! └──────────────┘               │           │                  └────────────┘
//!                                │           │
//! ┌──────────────┐     emit      │           │
//! │ OCR pipeline ├──────────────>│           │
//! └──────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, ConflictEvent, EventStream};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut conflicts = EventStream::new(event_bus.subscribe())
//!     .filter(|event| matches!(event, CoreEvent::Conflict(_)));
//!
//! event_bus
//!     .emit(CoreEvent::Conflict(ConflictEvent::Detected {
//!         conflict_id: "simultaneous_edit:f1".to_string(),
//!         conflict_type: "simultaneous_edit".to_string(),
//!         file_id: "f1".to_string(),
//!         severity: "medium".to_string(),
//!     }))
//!     .ok();
//!
//! let event = conflicts.recv().await.unwrap();
//! println!("{}", event.description());
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   This is non-fatal; the subscriber can continue receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates shutdown.
//!
//! Publishers ignore send errors: having no subscribers is normal.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 256;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Change propagation and engine lifecycle
    Sync(SyncEvent),
    /// Conflict detection and resolution
    Conflict(ConflictEvent),
    /// OCR enrichment
    Ocr(OcrEvent),
    /// Source polling
    Watcher(WatcherEvent),
}

impl CoreEvent {
    /// Short human-readable description
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Sync(e) => e.description(),
            CoreEvent::Conflict(e) => e.description(),
            CoreEvent::Ocr(e) => e.description(),
            CoreEvent::Watcher(e) => e.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Sync(SyncEvent::OperationFailed { .. }) => EventSeverity::Error,
            CoreEvent::Conflict(ConflictEvent::Detected { .. })
            | CoreEvent::Conflict(ConflictEvent::ManualResolutionRequired { .. })
            | CoreEvent::Conflict(ConflictEvent::Rejected { .. })
            | CoreEvent::Ocr(OcrEvent::Failed { .. })
            | CoreEvent::Watcher(WatcherEvent::FetchFailed { .. })
            | CoreEvent::Sync(SyncEvent::OperationRetrying { .. }) => EventSeverity::Warning,
            CoreEvent::Sync(SyncEvent::EngineStarted)
            | CoreEvent::Sync(SyncEvent::EngineStopped)
            | CoreEvent::Sync(SyncEvent::ReconciliationCompleted { .. })
            | CoreEvent::Conflict(ConflictEvent::Resolved { .. })
            | CoreEvent::Conflict(ConflictEvent::Cleared { .. })
            | CoreEvent::Ocr(OcrEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Sync Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum SyncEvent {
    EngineStarted,
    EngineStopped,
    /// A watcher or reconciliation produced a change
    ChangeDetected {
        file_id: String,
        source: String,
        change_type: String,
    },
    OperationQueued {
        operation_id: String,
        operation_type: String,
        file_id: String,
    },
    OperationCompleted {
        operation_id: String,
        operation_type: String,
        file_id: String,
        attempts: u32,
    },
    OperationRetrying {
        operation_id: String,
        attempt: u32,
        next_attempt_at: String,
        message: String,
    },
    /// Retries exhausted or the failure was not retryable
    OperationFailed {
        operation_id: String,
        operation_type: String,
        file_id: String,
        attempts: u32,
        message: String,
    },
    ReconciliationCompleted {
        operations_queued: u64,
        conflicts_detected: u64,
        duration_ms: u64,
    },
}

impl SyncEvent {
    fn description(&self) -> &str {
        match self {
            SyncEvent::EngineStarted => "Sync engine started",
            SyncEvent::EngineStopped => "Sync engine stopped",
            SyncEvent::ChangeDetected { .. } => "Change detected",
            SyncEvent::OperationQueued { .. } => "Sync operation queued",
            SyncEvent::OperationCompleted { .. } => "Sync operation completed",
            SyncEvent::OperationRetrying { .. } => "Sync operation scheduled for retry",
            SyncEvent::OperationFailed { .. } => "Sync operation failed",
            SyncEvent::ReconciliationCompleted { .. } => "Full reconciliation completed",
        }
    }
}

// ============================================================================
// Conflict Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum ConflictEvent {
    Detected {
        conflict_id: String,
        conflict_type: String,
        file_id: String,
        severity: String,
    },
    Resolved {
        conflict_id: String,
        strategy: String,
        resolved_by: String,
    },
    /// A proposed resolution failed validation
    Rejected {
        conflict_id: String,
        reason: String,
    },
    ManualResolutionRequired {
        conflict_id: String,
        conflict_type: String,
        file_id: String,
    },
    /// The divergence was no longer found by reconciliation
    Cleared { conflict_id: String },
}

impl ConflictEvent {
    fn description(&self) -> &str {
        match self {
            ConflictEvent::Detected { .. } => "Conflict detected",
            ConflictEvent::Resolved { .. } => "Conflict resolved",
            ConflictEvent::Rejected { .. } => "Conflict resolution rejected",
            ConflictEvent::ManualResolutionRequired { .. } => "Manual conflict resolution required",
            ConflictEvent::Cleared { .. } => "Conflict cleared",
        }
    }
}

// ============================================================================
// OCR Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum OcrEvent {
    Queued {
        file_id: String,
        priority: u8,
    },
    Retrying {
        file_id: String,
        attempt: u32,
        priority: u8,
    },
    Completed {
        file_id: String,
        /// Confidence scaled to 0..=100
        confidence_percent: u8,
        tags: Vec<String>,
    },
    /// Attempts exhausted; a placeholder result was written
    Failed {
        file_id: String,
        attempts: u32,
        message: String,
    },
    BacklogScheduled {
        queued: u64,
    },
}

impl OcrEvent {
    fn description(&self) -> &str {
        match self {
            OcrEvent::Queued { .. } => "Document queued for OCR",
            OcrEvent::Retrying { .. } => "OCR retry scheduled",
            OcrEvent::Completed { .. } => "OCR analysis completed",
            OcrEvent::Failed { .. } => "OCR analysis failed",
            OcrEvent::BacklogScheduled { .. } => "OCR backlog scheduled",
        }
    }
}

// ============================================================================
// Watcher Events
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum WatcherEvent {
    Primed {
        source: String,
        known_items: u64,
    },
    PollCompleted {
        source: String,
        changes: u64,
    },
    FetchFailed {
        source: String,
        message: String,
    },
}

impl WatcherEvent {
    fn description(&self) -> &str {
        match self {
            WatcherEvent::Primed { .. } => "Watcher primed",
            WatcherEvent::PollCompleted { .. } => "Watcher poll completed",
            WatcherEvent::FetchFailed { .. } => "Watcher fetch failed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for broadcasting events to multiple subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns the number of subscribers that received it.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver wrapper that skips events not matching a predicate.
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(file_id: &str) -> CoreEvent {
        CoreEvent::Sync(SyncEvent::OperationQueued {
            operation_id: format!("op-{}", file_id),
            operation_type: "create_in_b".to_string(),
            file_id: file_id.to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(CoreEvent::Sync(SyncEvent::EngineStarted)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = queued("f1");
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Conflict(_)));

        bus.emit(queued("f1")).ok();
        let conflict = CoreEvent::Conflict(ConflictEvent::Resolved {
            conflict_id: "move_conflict:f1".to_string(),
            strategy: "latest_wins".to_string(),
            resolved_by: "system".to_string(),
        });
        bus.emit(conflict.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), conflict);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(queued(&format!("f{}", i))).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Sync(SyncEvent::OperationFailed {
            operation_id: "op-1".to_string(),
            operation_type: "update_in_b".to_string(),
            file_id: "f1".to_string(),
            attempts: 3,
            message: "Network error".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let detected = CoreEvent::Conflict(ConflictEvent::Detected {
            conflict_id: "hash_mismatch:f1".to_string(),
            conflict_type: "hash_mismatch".to_string(),
            file_id: "f1".to_string(),
            severity: "high".to_string(),
        });
        assert_eq!(detected.severity(), EventSeverity::Warning);

        let poll = CoreEvent::Watcher(WatcherEvent::PollCompleted {
            source: "a".to_string(),
            changes: 0,
        });
        assert_eq!(poll.severity(), EventSeverity::Debug);
        assert_eq!(poll.description(), "Watcher poll completed");
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        let event = CoreEvent::Ocr(OcrEvent::Queued {
            file_id: "f1".to_string(),
            priority: 10,
        });
        bus.emit(event.clone()).ok();

        assert_eq!(stream.try_recv().unwrap().unwrap(), event);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Ocr(OcrEvent::Completed {
            file_id: "f1".to_string(),
            confidence_percent: 95,
            tags: vec!["Invoice".to_string()],
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Ocr\""));
        assert!(json.contains("\"event\":\"Completed\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }
}

//! # Event Bus System
//!
//! Progress reporting for organize runs over `tokio::sync::broadcast`.
//!
//! Workers publish events without waiting for anyone to read them; a
//! presentation layer (GUI, CLI progress bar, log tailer) subscribes and
//! drains the channel on its own schedule. A slow subscriber receives
//! `RecvError::Lagged` and never slows the worker pool down.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ Worker 1 ├────────>│           ├────────────>│ GUI        │
//! └──────────┘         │ EventBus  │             └────────────┘
//! ┌──────────┐  emit   │ (broadcast│  subscribe  ┌────────────┐
//! │ Worker N ├────────>│  channel) ├────────────>│ Log tailer │
//! └──────────┘         └───────────┘             └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, OrganizeEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Organize(OrganizeEvent::Progress {
//!         run_id: "run-1".to_string(),
//!         completed: 1,
//!         total: 10,
//!         percent: 10,
//!         label: "123.abc.zip".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert!(matches!(event, CoreEvent::Organize(OrganizeEvent::Progress { .. })));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: the subscriber missed `n` events; it can keep
//!   receiving newer ones.
//! - **`RecvError::Closed`**: every sender is gone, the run is over.
//!
//! `emit` fails only when nobody is subscribed. Publishers discard that error
//! with `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Classification-and-placement run events
    Organize(OrganizeEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Organize(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Organize(OrganizeEvent::RunFailed { .. }) => EventSeverity::Error,
            CoreEvent::Organize(OrganizeEvent::TaskFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Organize(OrganizeEvent::RunStarted { .. })
            | CoreEvent::Organize(OrganizeEvent::RunCompleted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Run identifier carried by every organize event.
    pub fn run_id(&self) -> &str {
        match self {
            CoreEvent::Organize(e) => e.run_id(),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Organize Events
// ============================================================================

/// Events emitted while a batch of archives is classified and placed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum OrganizeEvent {
    /// Workers are about to start.
    RunStarted {
        run_id: String,
        /// Number of queued tasks.
        total: u64,
    },
    /// A worker picked up a file.
    TaskStarted { run_id: String, file_name: String },
    /// A task finished, successfully or not.
    Progress {
        run_id: String,
        /// Tasks completed so far, including this one.
        completed: u64,
        total: u64,
        /// Completion percentage (0-100).
        percent: u8,
        /// File name of the task that just finished.
        label: String,
    },
    /// A task ended up in the failure ledger.
    TaskFailed {
        run_id: String,
        file_name: String,
        reason: String,
    },
    /// All workers drained the queue.
    RunCompleted {
        run_id: String,
        processed: u64,
        failed: u64,
        duration_ms: u64,
    },
    /// The run aborted before dispatching work.
    RunFailed { run_id: String, message: String },
}

impl OrganizeEvent {
    fn description(&self) -> &str {
        match self {
            OrganizeEvent::RunStarted { .. } => "Organize run started",
            OrganizeEvent::TaskStarted { .. } => "Processing file",
            OrganizeEvent::Progress { .. } => "Organize run in progress",
            OrganizeEvent::TaskFailed { .. } => "File could not be organized",
            OrganizeEvent::RunCompleted { .. } => "Organize run completed",
            OrganizeEvent::RunFailed { .. } => "Organize run failed",
        }
    }

    fn run_id(&self) -> &str {
        match self {
            OrganizeEvent::RunStarted { run_id, .. }
            | OrganizeEvent::TaskStarted { run_id, .. }
            | OrganizeEvent::Progress { run_id, .. }
            | OrganizeEvent::TaskFailed { run_id, .. }
            | OrganizeEvent::RunCompleted { run_id, .. }
            | OrganizeEvent::RunFailed { run_id, .. } => run_id,
        }
    }
}

/// Integer completion percentage, capped at 100.
pub fn percent_of(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((completed.min(total) * 100) / total) as u8
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel. Cheap to clone; clones share the channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
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

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{EventBus, EventSeverity, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let failures = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.severity() >= EventSeverity::Warning);
/// ```
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

    /// Only events matching `predicate` are returned by `recv()`.
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

    /// Receives the next event that passes the filter.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no matching event is currently buffered.
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

//! Lifecycle events emitted while tasks execute.

use std::sync::Mutex;

use serde::Serialize;
use uuid::Uuid;

use crate::types::ValueMap;

/// Everything observable about a task from the outside, in emission order:
/// `TaskStart`, then one `TaskProcessing` per node actually executed
/// (cache hits emit nothing), optional `NodeProgress` ticks from within a
/// node, and exactly one terminal event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TaskStart {
        task_id: Uuid,
        /// Echo of the submitting session, for frontend routing.
        client_id: Option<String>,
    },
    TaskProcessing {
        task_id: Uuid,
        node: String,
        index: u32,
    },
    NodeProgress {
        task_id: Uuid,
        node: String,
        step: u32,
        total: u32,
    },
    TaskDone {
        task_id: Uuid,
        outputs: ValueMap,
    },
    TaskFailed {
        task_id: Uuid,
        error: String,
    },
    TaskCanceled {
        task_id: Uuid,
    },
}

impl Event {
    pub fn task_id(&self) -> Uuid {
        match self {
            Event::TaskStart { task_id, .. }
            | Event::TaskProcessing { task_id, .. }
            | Event::NodeProgress { task_id, .. }
            | Event::TaskDone { task_id, .. }
            | Event::TaskFailed { task_id, .. }
            | Event::TaskCanceled { task_id } => *task_id,
        }
    }

    /// True for the events that end a task's lifecycle.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Event::TaskDone { .. } | Event::TaskFailed { .. } | Event::TaskCanceled { .. }
        )
    }
}

/// Destination for lifecycle events. Implementations must be cheap and
/// non-blocking; the worker emits from its execution loop.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: Event) {}
}

/// Sink that records events in memory, mainly for tests.
#[derive(Debug, Default)]
pub struct VecEventSink {
    events: Mutex<Vec<Event>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().expect("event sink poisoned").clone()
    }

    pub fn take(&self) -> Vec<Event> {
        std::mem::take(&mut *self.events.lock().expect("event sink poisoned"))
    }
}

impl EventSink for VecEventSink {
    fn emit(&self, event: Event) {
        self.events.lock().expect("event sink poisoned").push(event);
    }
}

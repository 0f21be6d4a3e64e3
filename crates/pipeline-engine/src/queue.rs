//! The task queue feeding the single worker.
//!
//! Any number of producers submit and cancel; exactly one worker consumes.
//! Canceling never removes a task from the queue. It marks the id, and the
//! worker either refuses the task when it reaches the front or stops at
//! the next step boundary if it is already running. Either way the task
//! still gets its terminal event.

use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

use tokio::sync::Notify;
use uuid::Uuid;

use crate::task::Task;

#[derive(Debug, Default)]
struct Inner {
    pending: VecDeque<Task>,
    canceled: HashSet<Uuid>,
    closed: bool,
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a task. Returns its id, or `None` if the queue is closed.
    pub fn submit(&self, task: Task) -> Option<Uuid> {
        let id = task.id;
        {
            let mut inner = self.inner.lock().expect("queue poisoned");
            if inner.closed {
                return None;
            }
            inner.pending.push_back(task);
        }
        self.notify.notify_one();
        Some(id)
    }

    /// Mark a task canceled, whether it is still queued or already running.
    pub fn cancel(&self, id: Uuid) {
        self.inner
            .lock()
            .expect("queue poisoned")
            .canceled
            .insert(id);
    }

    pub fn is_canceled(&self, id: Uuid) -> bool {
        self.inner
            .lock()
            .expect("queue poisoned")
            .canceled
            .contains(&id)
    }

    /// Forget a cancel mark once the task reached its terminal event.
    pub(crate) fn acknowledge(&self, id: Uuid) {
        self.inner
            .lock()
            .expect("queue poisoned")
            .canceled
            .remove(&id);
    }

    /// No more submissions; the worker drains what is left and stops.
    pub fn close(&self) {
        self.inner.lock().expect("queue poisoned").closed = true;
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("queue poisoned").pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the next task. `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<Task> {
        loop {
            {
                let mut inner = self.inner.lock().expect("queue poisoned");
                if let Some(task) = inner.pending.pop_front() {
                    return Some(task);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ValueMap;

    #[tokio::test]
    async fn test_tasks_come_out_in_submission_order() {
        let queue = TaskQueue::new();
        let a = queue.submit(Task::new("p", ValueMap::new())).unwrap();
        let b = queue.submit(Task::new("p", ValueMap::new())).unwrap();

        assert_eq!(queue.next().await.unwrap().id, a);
        assert_eq!(queue.next().await.unwrap().id, b);
    }

    #[tokio::test]
    async fn test_close_drains_then_stops() {
        let queue = TaskQueue::new();
        queue.submit(Task::new("p", ValueMap::new())).unwrap();
        queue.close();

        assert!(queue.next().await.is_some());
        assert!(queue.next().await.is_none());
        assert!(queue.submit(Task::new("p", ValueMap::new())).is_none());
    }

    #[test]
    fn test_cancel_marks_without_removing() {
        let queue = TaskQueue::new();
        let id = queue.submit(Task::new("p", ValueMap::new())).unwrap();
        queue.cancel(id);

        assert_eq!(queue.len(), 1);
        assert!(queue.is_canceled(id));
        queue.acknowledge(id);
        assert!(!queue.is_canceled(id));
    }
}

//! Tasks: one submitted prompt against a named pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::ValueMap;

/// Lifecycle of a task. Transitions are monotonic and terminal states are
/// absorbing; only the worker moves a task past `Queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Processing,
    Canceled,
    Failed,
    Done,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Failed | Self::Done)
    }
}

fn queued() -> TaskStatus {
    TaskStatus::Queued
}

/// A request to run a pipeline with the given user inputs.
///
/// `inputs` carries the base graph's widget values keyed by parameter name.
/// `extension_inputs` carries one value map per requested extension
/// instance; the list length is what decides how many instances are
/// spliced in. Result fields (`outputs`, `error`, `finished_at`) are filled
/// by the worker as the task moves through its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    /// Origin of the request, echoed on events so a frontend can route
    /// them back to the right session.
    #[serde(default)]
    pub client_id: Option<String>,
    pub pipeline: String,
    #[serde(default)]
    pub inputs: ValueMap,
    #[serde(default)]
    pub extension_inputs: HashMap<String, Vec<ValueMap>>,
    #[serde(default = "queued")]
    pub status: TaskStatus,
    #[serde(default)]
    pub outputs: Option<ValueMap>,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new(pipeline: impl Into<String>, inputs: ValueMap) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id: None,
            pipeline: pipeline.into(),
            inputs,
            extension_inputs: HashMap::new(),
            status: TaskStatus::Queued,
            outputs: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn with_client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_extension(mut self, name: impl Into<String>, instances: Vec<ValueMap>) -> Self {
        self.extension_inputs.insert(name.into(), instances);
        self
    }

    pub fn mark_processing(&mut self) {
        if self.status == TaskStatus::Queued {
            self.status = TaskStatus::Processing;
        }
    }

    pub fn complete(&mut self, outputs: ValueMap) {
        if !self.status.is_terminal() {
            self.outputs = Some(outputs);
        }
        self.finish(TaskStatus::Done);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        if !self.status.is_terminal() {
            self.error = Some(error.into());
        }
        self.finish(TaskStatus::Failed);
    }

    pub fn cancel(&mut self) {
        self.finish(TaskStatus::Canceled);
    }

    fn finish(&mut self, status: TaskStatus) {
        if !self.status.is_terminal() {
            self.status = status;
            self.finished_at = Some(Utc::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_task_round_trips_through_json() {
        let mut inputs = ValueMap::new();
        inputs.insert("prompt".to_string(), json!("a cat"));
        let task = Task::new("text_to_image", inputs)
            .with_client("session-1")
            .with_extension("lora", vec![ValueMap::new(), ValueMap::new()]);

        let encoded = serde_json::to_string(&task).unwrap();
        let decoded: Task = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, task.id);
        assert_eq!(decoded.status, TaskStatus::Queued);
        assert_eq!(decoded.extension_inputs["lora"].len(), 2);
    }

    #[test]
    fn test_terminal_states_are_absorbing() {
        let mut task = Task::new("p", ValueMap::new());
        task.mark_processing();
        task.cancel();
        assert_eq!(task.status, TaskStatus::Canceled);

        task.complete(ValueMap::new());
        assert_eq!(task.status, TaskStatus::Canceled);
        assert!(task.finished_at.is_some());
    }
}

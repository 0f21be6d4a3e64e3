//! The worker: sole consumer of the task queue and sole owner of the
//! output cache and previous-run memory.
//!
//! Keeping all execution state inside the worker means no locking around
//! the cache. The previous-run memory is written entry by entry as steps
//! cache their outputs, so after a failed or canceled run it still
//! describes exactly what the cache holds and change detection compares
//! the next task against the mixed state, not against the last success.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::cache::OutputCache;
use crate::detector::{self, PrevRun};
use crate::error::{EngineError, Result};
use crate::events::{Event, EventSink};
use crate::pipeline::Pipeline;
use crate::queue::TaskQueue;
use crate::registry::PipelineRegistry;
use crate::task::Task;
use crate::types::ValueMap;

struct PipelineState {
    name: String,
    pipeline: Pipeline,
    cache: OutputCache,
    prev: PrevRun,
}

pub struct Worker {
    registry: Arc<PipelineRegistry>,
    queue: Arc<TaskQueue>,
    sink: Arc<dyn EventSink>,
    state: Option<PipelineState>,
}

impl Worker {
    pub fn new(
        registry: Arc<PipelineRegistry>,
        queue: Arc<TaskQueue>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            queue,
            sink,
            state: None,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Consume tasks until the queue is closed and drained.
    pub async fn run(mut self) {
        log::info!("worker started");
        while let Some(task) = self.queue.next().await {
            self.process(task).await;
        }
        log::info!("worker stopped: queue closed");
    }

    async fn process(&mut self, mut task: Task) {
        let id = task.id;
        task.mark_processing();
        self.sink.emit(Event::TaskStart {
            task_id: id,
            client_id: task.client_id.clone(),
        });
        log::info!("task {} started on pipeline '{}'", id, task.pipeline);

        let outcome = if self.queue.is_canceled(id) {
            Err(EngineError::Canceled)
        } else {
            self.execute(&task).await
        };
        match outcome {
            Ok(outputs) => {
                log::info!("task {id} done");
                task.complete(outputs.clone());
                self.sink.emit(Event::TaskDone {
                    task_id: id,
                    outputs,
                });
            }
            Err(EngineError::Canceled) => {
                log::info!("task {id} canceled");
                task.cancel();
                self.sink.emit(Event::TaskCanceled { task_id: id });
            }
            Err(err) => {
                log::error!("task {id} failed: {err}");
                task.fail(err.to_string());
                self.sink.emit(Event::TaskFailed {
                    task_id: id,
                    error: err.to_string(),
                });
            }
        }
        self.queue.acknowledge(id);
    }

    async fn execute(&mut self, task: &Task) -> Result<ValueMap> {
        // Switching pipelines drops the cache and previous-run memory;
        // positions from another graph mean nothing here.
        let rebuild = !matches!(&self.state, Some(s) if s.name == task.pipeline);
        if rebuild {
            log::info!("building pipeline '{}'", task.pipeline);
            let pipeline = self.registry.build(&task.pipeline)?;
            self.state = Some(PipelineState {
                name: task.pipeline.clone(),
                pipeline,
                cache: OutputCache::new(),
                prev: PrevRun::new(),
            });
        }
        let Some(state) = self.state.as_mut() else {
            return Err(EngineError::GraphBuild("no active pipeline".to_string()));
        };

        let plan = state.pipeline.plan(&task.extension_inputs)?;
        let values = plan.resolve_inputs(&task.inputs, &task.extension_inputs)?;
        match detector::invalidate(&plan, &values, &mut state.prev, &mut state.cache) {
            Some(first) => log::debug!(
                "task {}: executing {} of {} steps",
                task.id,
                plan.steps.len() - first,
                plan.steps.len()
            ),
            None => log::debug!("task {}: fully cached", task.id),
        }

        let queue = Arc::clone(&self.queue);
        let id = task.id;
        let canceled = move || queue.is_canceled(id);
        let outputs = plan
            .execute(
                &values,
                &mut state.cache,
                &mut state.prev,
                id,
                Arc::clone(&self.sink),
                &canceled,
            )
            .await?;
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::VecEventSink;
    use crate::node::{Compute, ComputeContext, Node};
    use crate::slots::OutputSlot;
    use crate::types::DataType;
    use crate::widgets::Widget;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl Compute for Counting {
        async fn run(&self, inputs: ValueMap, _ctx: &ComputeContext) -> Result<ValueMap> {
            self.0.fetch_add(1, Ordering::SeqCst);
            let mut out = ValueMap::new();
            out.insert(
                "out".to_string(),
                inputs.get("seed").cloned().unwrap_or(json!(0)),
            );
            Ok(out)
        }
    }

    fn registry_with_counter(runs: Arc<AtomicUsize>) -> Arc<PipelineRegistry> {
        let _ = env_logger::builder().is_test(true).try_init();
        let registry = PipelineRegistry::new();
        registry.register("count", move || {
            let mut p = Pipeline::new("count");
            p.register(
                Node::operator("only", Arc::new(Counting(Arc::clone(&runs))))
                    .output(OutputSlot::new("out", DataType::INT))
                    .widget(Widget::seed("seed", 0)),
            )?;
            Ok(p)
        });
        Arc::new(registry)
    }

    #[tokio::test]
    async fn test_identical_resubmission_is_served_from_cache() {
        let runs = Arc::new(AtomicUsize::new(0));
        let registry = registry_with_counter(Arc::clone(&runs));
        let queue = Arc::new(TaskQueue::new());
        let sink = Arc::new(VecEventSink::new());

        queue.submit(Task::new("count", ValueMap::new())).unwrap();
        queue.submit(Task::new("count", ValueMap::new())).unwrap();
        queue.close();
        Worker::new(registry, Arc::clone(&queue), sink.clone())
            .run()
            .await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let done = sink
            .snapshot()
            .iter()
            .filter(|e| matches!(e, Event::TaskDone { .. }))
            .count();
        assert_eq!(done, 2);
    }

    #[tokio::test]
    async fn test_canceled_before_start_gets_terminal_event_without_running() {
        let runs = Arc::new(AtomicUsize::new(0));
        let registry = registry_with_counter(Arc::clone(&runs));
        let queue = Arc::new(TaskQueue::new());
        let sink = Arc::new(VecEventSink::new());

        let id = queue.submit(Task::new("count", ValueMap::new())).unwrap();
        queue.cancel(id);
        queue.close();
        Worker::new(registry, Arc::clone(&queue), sink.clone())
            .run()
            .await;

        assert_eq!(runs.load(Ordering::SeqCst), 0);
        let events = sink.snapshot();
        assert!(matches!(events.last(), Some(Event::TaskCanceled { task_id }) if *task_id == id));
        assert!(!queue.is_canceled(id));
    }

    #[tokio::test]
    async fn test_unknown_pipeline_fails_the_task() {
        let registry = Arc::new(PipelineRegistry::new());
        let queue = Arc::new(TaskQueue::new());
        let sink = Arc::new(VecEventSink::new());

        queue.submit(Task::new("ghost", ValueMap::new())).unwrap();
        queue.close();
        Worker::new(registry, Arc::clone(&queue), sink.clone())
            .run()
            .await;

        let events = sink.snapshot();
        assert!(matches!(events.last(), Some(Event::TaskFailed { .. })));
    }
}

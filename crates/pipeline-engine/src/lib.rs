//! Incremental pipeline execution engine.
//!
//! Pipelines are ordered graphs of typed nodes. Each run, the engine
//! splices attached extensions into the graph according to the task's
//! per-instance inputs, validates every user value, compares the resulting
//! wiring and values against the previous successful run and re-executes
//! only the affected suffix of the schedule. Everything else is served
//! from the output cache.
//!
//! The moving pieces:
//!
//! - [`Node`] / [`Compute`]: leaf operators with typed slots and widgets
//! - [`CompositeBuilder`]: fixed groups of nodes behaving as one
//! - [`Extension`]: repeatable templates spliced per run
//! - [`Pipeline`] / [`RunPlan`]: assembly and per-task scheduling
//! - [`OutputCache`] / [`detector`]: memoization and invalidation
//! - [`TaskQueue`] / [`Worker`]: single-consumer execution with
//!   lifecycle [`Event`]s

pub mod cache;
pub mod composite;
pub mod detector;
pub mod error;
pub mod events;
pub mod extension;
pub mod node;
pub mod pipeline;
pub mod queue;
pub mod registry;
pub mod slots;
pub mod task;
pub mod types;
pub mod widgets;
pub mod worker;

pub use cache::OutputCache;
pub use composite::{Composite, CompositeBuilder};
pub use error::{EngineError, Result};
pub use events::{Event, EventSink, NullEventSink, VecEventSink};
pub use extension::Extension;
pub use node::{Compute, ComputeContext, Node, NodeKind};
pub use pipeline::{Link, Pipeline, RunPlan, Step};
pub use queue::TaskQueue;
pub use registry::{PipelineBuilder, PipelineRegistry};
pub use slots::{InputSlot, OutputSlot};
pub use task::{Task, TaskStatus};
pub use types::{DataType, Position, Value, ValueMap};
pub use widgets::{Widget, WidgetKind};
pub use worker::Worker;

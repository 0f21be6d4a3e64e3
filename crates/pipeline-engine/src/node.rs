//! Nodes: the units a pipeline is assembled from.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::composite::Composite;
use crate::error::Result;
use crate::events::{Event, EventSink, NullEventSink};
use crate::extension::Extension;
use crate::slots::{InputSlot, OutputSlot};
use crate::types::ValueMap;
use crate::widgets::Widget;

/// The work a leaf node performs.
///
/// `inputs` holds one value per declared input slot, keyed by slot name.
/// The returned map must hold one value per declared output slot.
#[async_trait]
pub trait Compute: Send + Sync {
    async fn run(&self, inputs: ValueMap, ctx: &ComputeContext) -> Result<ValueMap>;
}

/// Per-invocation context handed to a compute function.
#[derive(Clone)]
pub struct ComputeContext {
    pub task_id: Uuid,
    pub node: String,
    pub index: u32,
    sink: Arc<dyn EventSink>,
}

impl ComputeContext {
    pub fn new(task_id: Uuid, node: impl Into<String>, index: u32, sink: Arc<dyn EventSink>) -> Self {
        Self {
            task_id,
            node: node.into(),
            index,
            sink,
        }
    }

    /// Context that reports nowhere, for direct node invocation in tests.
    pub fn detached(node: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4(), node, 0, Arc::new(NullEventSink))
    }

    /// Context for executing a nested node on behalf of this one.
    pub fn child(&self, node: impl Into<String>, index: u32) -> ComputeContext {
        ComputeContext {
            task_id: self.task_id,
            node: node.into(),
            index,
            sink: Arc::clone(&self.sink),
        }
    }

    /// Report intra-node progress, e.g. per denoising step.
    pub fn progress(&self, step: u32, total: u32) {
        self.sink.emit(Event::NodeProgress {
            task_id: self.task_id,
            node: self.node.clone(),
            step,
            total,
        });
    }
}

/// What a node is made of.
#[derive(Clone)]
pub enum NodeKind {
    /// A leaf with a compute function.
    Operator(Arc<dyn Compute>),
    /// A fixed group of child nodes wired internally.
    Composite(Composite),
    /// A repeatable template spliced into the host graph per run.
    Extension(Extension),
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Operator(_) => f.write_str("Operator"),
            NodeKind::Composite(c) => f.debug_tuple("Composite").field(c).finish(),
            NodeKind::Extension(e) => f.debug_tuple("Extension").field(e).finish(),
        }
    }
}

/// A named node with typed ports and user-facing widgets.
#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub inputs: Vec<InputSlot>,
    pub outputs: Vec<OutputSlot>,
    pub widgets: Vec<Widget>,
    pub kind: NodeKind,
}

impl Node {
    pub fn operator(name: impl Into<String>, compute: Arc<dyn Compute>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            widgets: Vec::new(),
            kind: NodeKind::Operator(compute),
        }
    }

    pub fn input(mut self, slot: InputSlot) -> Self {
        self.inputs.push(slot);
        self
    }

    pub fn output(mut self, slot: OutputSlot) -> Self {
        self.outputs.push(slot);
        self
    }

    pub fn widget(mut self, widget: Widget) -> Self {
        self.widgets.push(widget);
        self
    }

    /// Rename the user-facing key of an input slot and its widget. Used
    /// when two instances of the same slot name coexist in one graph.
    pub fn map_input_name(mut self, slot: &str, mapped: impl Into<String>) -> Self {
        let mapped = mapped.into();
        if let Some(input) = self.inputs.iter_mut().find(|i| i.name == slot) {
            input.mapped_name = Some(mapped.clone());
        }
        if let Some(widget) = self.widgets.iter_mut().find(|w| w.param_name == slot) {
            widget.param_name = mapped;
        }
        self
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn find_input(&self, slot: &str) -> Option<&InputSlot> {
        self.inputs.iter().find(|i| i.name == slot)
    }

    pub fn find_output(&self, slot: &str) -> Option<&OutputSlot> {
        self.outputs.iter().find(|o| o.name == slot)
    }
}

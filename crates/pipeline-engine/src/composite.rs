//! Composite nodes: a fixed group of children behaving as one node.
//!
//! Children execute in registration order against a composite-local scratch
//! cache, so a composite is opaque to the host pipeline's change detection:
//! it either re-runs whole or not at all.

use std::future::Future;
use std::pin::Pin;

use crate::cache::OutputCache;
use crate::error::{EngineError, Result};
use crate::node::{ComputeContext, Node, NodeKind};
use crate::slots::{InputSlot, OutputSlot};
use crate::types::{Position, ValueMap};
use crate::widgets::Widget;

/// A link between two children, by registration index.
#[derive(Debug, Clone)]
pub struct InnerLink {
    pub from_child: usize,
    pub from_slot: String,
    pub to_child: usize,
    pub to_slot: String,
}

/// Maps an external slot name on the composite to a slot on one child.
#[derive(Debug, Clone)]
pub struct Exposure {
    pub external: String,
    pub child: usize,
    pub slot: String,
}

#[derive(Debug, Clone, Default)]
pub struct Composite {
    pub children: Vec<Node>,
    pub links: Vec<InnerLink>,
    pub exposed_inputs: Vec<Exposure>,
    pub exposed_outputs: Vec<Exposure>,
}

/// Assembles a [`Composite`] and the host [`Node`] wrapping it.
#[derive(Default)]
pub struct CompositeBuilder {
    children: Vec<Node>,
    links: Vec<InnerLink>,
    exposed_inputs: Vec<Exposure>,
    exposed_outputs: Vec<Exposure>,
    share_io: bool,
}

impl CompositeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a child; returns its index, which inner links refer to.
    pub fn child(&mut self, node: Node) -> usize {
        self.children.push(node);
        self.children.len() - 1
    }

    pub fn link(
        &mut self,
        from_child: usize,
        from_slot: impl Into<String>,
        to_child: usize,
        to_slot: impl Into<String>,
    ) -> &mut Self {
        self.links.push(InnerLink {
            from_child,
            from_slot: from_slot.into(),
            to_child,
            to_slot: to_slot.into(),
        });
        self
    }

    pub fn expose_input(
        &mut self,
        external: impl Into<String>,
        child: usize,
        slot: impl Into<String>,
    ) -> &mut Self {
        self.exposed_inputs.push(Exposure {
            external: external.into(),
            child,
            slot: slot.into(),
        });
        self
    }

    pub fn expose_output(
        &mut self,
        external: impl Into<String>,
        child: usize,
        slot: impl Into<String>,
    ) -> &mut Self {
        self.exposed_outputs.push(Exposure {
            external: external.into(),
            child,
            slot: slot.into(),
        });
        self
    }

    /// Expose the sole child's entire interface one-to-one. Only valid for
    /// single-child composites.
    pub fn share_io(&mut self) -> &mut Self {
        self.share_io = true;
        self
    }

    /// Validate the wiring and produce the host node.
    pub fn build(mut self, name: impl Into<String>) -> Result<Node> {
        let name = name.into();
        if self.children.is_empty() {
            return Err(EngineError::GraphBuild(format!(
                "composite '{name}' has no children"
            )));
        }
        for child in &self.children {
            if matches!(child.kind, NodeKind::Extension(_)) {
                return Err(EngineError::GraphBuild(format!(
                    "composite '{name}' child '{}' is an extension; extensions attach to pipelines",
                    child.name
                )));
            }
        }

        if self.share_io {
            if self.children.len() != 1 {
                return Err(EngineError::GraphBuild(format!(
                    "composite '{name}' uses share_io with {} children; share_io requires exactly one",
                    self.children.len()
                )));
            }
            let child = &self.children[0];
            for input in &child.inputs {
                self.exposed_inputs.push(Exposure {
                    external: input.user_name().to_string(),
                    child: 0,
                    slot: input.name.clone(),
                });
            }
            for output in &child.outputs {
                self.exposed_outputs.push(Exposure {
                    external: output.name.clone(),
                    child: 0,
                    slot: output.name.clone(),
                });
            }
        }

        for link in &self.links {
            let from = self.children.get(link.from_child).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "composite '{name}' link references missing child {}",
                    link.from_child
                ))
            })?;
            let to = self.children.get(link.to_child).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "composite '{name}' link references missing child {}",
                    link.to_child
                ))
            })?;
            if link.to_child <= link.from_child {
                return Err(EngineError::GraphBuild(format!(
                    "composite '{name}' link {} -> {} goes against execution order",
                    from.name, to.name
                )));
            }
            let from_slot = from.find_output(&link.from_slot).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "composite '{name}' child '{}' has no output '{}'",
                    from.name, link.from_slot
                ))
            })?;
            let to_slot = to.find_input(&link.to_slot).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "composite '{name}' child '{}' has no input '{}'",
                    to.name, link.to_slot
                ))
            })?;
            if from_slot.data_type != to_slot.data_type {
                return Err(EngineError::TypeMismatch {
                    from: Position::new(&from.name, link.from_child as u32, &link.from_slot),
                    from_type: from_slot.data_type.to_string(),
                    to: Position::new(&to.name, link.to_child as u32, &link.to_slot),
                    to_type: to_slot.data_type.to_string(),
                });
            }
        }

        let mut inputs: Vec<InputSlot> = Vec::new();
        let mut widgets: Vec<Widget> = Vec::new();
        for exposure in &self.exposed_inputs {
            let child = self.children.get(exposure.child).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "composite '{name}' exposes input on missing child {}",
                    exposure.child
                ))
            })?;
            let slot = child.find_input(&exposure.slot).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "composite '{name}' child '{}' has no input '{}' to expose",
                    child.name, exposure.slot
                ))
            })?;
            if inputs.iter().any(|i| i.user_name() == exposure.external) {
                return Err(EngineError::GraphBuild(format!(
                    "composite '{name}' exposes two inputs as '{}'",
                    exposure.external
                )));
            }
            let mut external = InputSlot::new(&exposure.external, slot.data_type);
            external.optional = slot.optional;
            inputs.push(external);
        }

        // Children's widgets surface on the composite unchanged, so user
        // values reach them by parameter name. Same-named widgets on two
        // children must be disambiguated with map_input_name first.
        for child in &self.children {
            for widget in &child.widgets {
                if widgets.iter().any(|w: &Widget| w.param_name == widget.param_name) {
                    return Err(EngineError::GraphBuild(format!(
                        "composite '{name}' carries two widgets named '{}'; rename one with map_input_name",
                        widget.param_name
                    )));
                }
                widgets.push(widget.clone());
            }
        }

        let mut outputs: Vec<OutputSlot> = Vec::new();
        for exposure in &self.exposed_outputs {
            let child = self.children.get(exposure.child).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "composite '{name}' exposes output on missing child {}",
                    exposure.child
                ))
            })?;
            let slot = child.find_output(&exposure.slot).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "composite '{name}' child '{}' has no output '{}' to expose",
                    child.name, exposure.slot
                ))
            })?;
            if outputs.iter().any(|o| o.name == exposure.external) {
                return Err(EngineError::GraphBuild(format!(
                    "composite '{name}' exposes two outputs as '{}'",
                    exposure.external
                )));
            }
            outputs.push(OutputSlot::new(&exposure.external, slot.data_type));
        }
        if outputs.is_empty() {
            return Err(EngineError::GraphBuild(format!(
                "composite '{name}' exposes no outputs"
            )));
        }

        Ok(Node {
            name,
            inputs,
            outputs,
            widgets,
            kind: NodeKind::Composite(Composite {
                children: self.children,
                links: self.links,
                exposed_inputs: self.exposed_inputs,
                exposed_outputs: self.exposed_outputs,
            }),
        })
    }
}

impl Composite {
    /// Execute all children in order and gather the exposed outputs.
    ///
    /// The scratch cache lives only for this call; a composite never keeps
    /// partial results between runs.
    pub(crate) fn execute<'a>(
        &'a self,
        inputs: &'a ValueMap,
        ctx: &'a ComputeContext,
    ) -> Pin<Box<dyn Future<Output = Result<ValueMap>> + Send + 'a>> {
        Box::pin(async move {
            let mut scratch = OutputCache::new();
            for (index, child) in self.children.iter().enumerate() {
                let child_inputs = self.gather_child_inputs(index, child, inputs, &scratch)?;
                let child_ctx = ctx.child(&child.name, index as u32);
                let outputs = match &child.kind {
                    NodeKind::Operator(compute) => compute.run(child_inputs, &child_ctx).await?,
                    NodeKind::Composite(inner) => {
                        inner.execute(&child_inputs, &child_ctx).await?
                    }
                    NodeKind::Extension(_) => {
                        return Err(EngineError::GraphBuild(format!(
                            "extension '{}' cannot execute inside a composite",
                            child.name
                        )))
                    }
                };
                scratch.put(&child.name, index as u32, outputs);
            }

            let mut result = ValueMap::new();
            for exposure in &self.exposed_outputs {
                let child = &self.children[exposure.child];
                let pos = Position::new(&child.name, exposure.child as u32, &exposure.slot);
                let value = scratch
                    .get_slot(&pos)
                    .ok_or_else(|| EngineError::MissingInput(pos.clone()))?;
                result.insert(exposure.external.clone(), value.clone());
            }
            Ok(result)
        })
    }

    fn gather_child_inputs(
        &self,
        index: usize,
        child: &Node,
        external: &ValueMap,
        scratch: &OutputCache,
    ) -> Result<ValueMap> {
        let mut gathered = ValueMap::new();
        for slot in &child.inputs {
            // Inner link wins over exposure; exposure wins over default.
            if let Some(link) = self
                .links
                .iter()
                .find(|l| l.to_child == index && l.to_slot == slot.name)
            {
                let from = &self.children[link.from_child];
                let pos = Position::new(&from.name, link.from_child as u32, &link.from_slot);
                let value = scratch
                    .get_slot(&pos)
                    .ok_or_else(|| EngineError::MissingInput(pos.clone()))?;
                gathered.insert(slot.name.clone(), value.clone());
                continue;
            }
            if let Some(exposure) = self
                .exposed_inputs
                .iter()
                .find(|e| e.child == index && e.slot == slot.name)
            {
                if let Some(value) = external.get(&exposure.external) {
                    gathered.insert(slot.name.clone(), value.clone());
                    continue;
                }
            }
            if let Some(widget) = child
                .widgets
                .iter()
                .find(|w| w.param_name == *slot.user_name())
            {
                let value = external.get(&widget.param_name).unwrap_or(&widget.default);
                gathered.insert(slot.name.clone(), value.clone());
                continue;
            }
            if !slot.optional {
                return Err(EngineError::MissingInput(Position::new(
                    &child.name,
                    index as u32,
                    &slot.name,
                )));
            }
        }
        // Widget parameters without a slot pass through by name.
        for widget in &child.widgets {
            if !gathered.contains_key(&widget.param_name) {
                let value = external.get(&widget.param_name).unwrap_or(&widget.default);
                gathered.insert(widget.param_name.clone(), value.clone());
            }
        }
        Ok(gathered)
    }
}

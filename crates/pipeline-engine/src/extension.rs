//! Extensions: optional node templates spliced into a host pipeline.
//!
//! An extension declares where its inputs tap the host graph and which host
//! output it replaces. At run time it is instantiated zero or more times
//! from the user's input list; instances chain through their same-named
//! slots, and downstream consumers of the replaced output are re-pointed at
//! the last instance. Attachment is recomputed from scratch every run.

use std::fmt;
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::node::{Node, NodeKind};
use crate::types::Position;

/// Feeds a template input slot from a host graph position (instance 0 only
/// when the slot chains; every instance otherwise).
#[derive(Debug, Clone)]
pub struct InputBinding {
    pub slot: String,
    pub from: Position,
}

/// Re-points host consumers of `replaces` at the named output slot of the
/// extension's last instance.
#[derive(Debug, Clone)]
pub struct OutputReplacement {
    pub slot: String,
    pub replaces: Position,
}

#[derive(Clone)]
pub struct Extension {
    template: Arc<dyn Fn() -> Node + Send + Sync>,
    pub inputs_to_link: Vec<InputBinding>,
    pub outputs_to_replace: Vec<OutputReplacement>,
    /// Explicit schedule anchor: instances run right after this node.
    /// Defaults to the node whose output the extension replaces.
    pub anchor: Option<String>,
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("inputs_to_link", &self.inputs_to_link)
            .field("outputs_to_replace", &self.outputs_to_replace)
            .field("anchor", &self.anchor)
            .finish_non_exhaustive()
    }
}

impl Extension {
    pub fn new(template: Arc<dyn Fn() -> Node + Send + Sync>) -> Self {
        Self {
            template,
            inputs_to_link: Vec::new(),
            outputs_to_replace: Vec::new(),
            anchor: None,
        }
    }

    /// Pin the splice point to a specific host node.
    pub fn after(mut self, node: impl Into<String>) -> Self {
        self.anchor = Some(node.into());
        self
    }

    /// Tap `from` in the host graph to feed the template's `slot`.
    pub fn link(mut self, slot: impl Into<String>, from: Position) -> Self {
        self.inputs_to_link.push(InputBinding {
            slot: slot.into(),
            from,
        });
        self
    }

    /// Replace the host output at `replaces` with the template's `slot`.
    pub fn replace_output(mut self, slot: impl Into<String>, replaces: Position) -> Self {
        self.outputs_to_replace.push(OutputReplacement {
            slot: slot.into(),
            replaces,
        });
        self
    }

    /// Validate the declaration against the template and wrap it in a node
    /// carrying the template's interface.
    pub fn into_node(self, name: impl Into<String>) -> Result<Node> {
        let name = name.into();
        let template = (self.template)();
        for binding in &self.inputs_to_link {
            if template.find_input(&binding.slot).is_none() {
                return Err(EngineError::GraphBuild(format!(
                    "extension '{name}' links missing template input '{}'",
                    binding.slot
                )));
            }
        }
        for replacement in &self.outputs_to_replace {
            if template.find_output(&replacement.slot).is_none() {
                return Err(EngineError::GraphBuild(format!(
                    "extension '{name}' replaces through missing template output '{}'",
                    replacement.slot
                )));
            }
        }
        // Instances have no user wiring of their own, so every required
        // input must be fed by a binding or by one of the template's
        // widgets.
        for slot in &template.inputs {
            let bound = self.inputs_to_link.iter().any(|b| b.slot == slot.name);
            let widget_fed = template
                .widgets
                .iter()
                .any(|w| w.param_name == *slot.user_name());
            if !slot.optional && !bound && !widget_fed {
                return Err(EngineError::GraphBuild(format!(
                    "extension '{name}' leaves template input '{}' unconnected",
                    slot.name
                )));
            }
        }
        Ok(Node {
            name,
            inputs: template.inputs,
            outputs: template.outputs,
            widgets: template.widgets,
            kind: NodeKind::Extension(self),
        })
    }

    /// Produce `count` fresh instances of the template, all renamed to the
    /// extension's node name so the cache addresses them by index.
    ///
    /// `count > 1` requires the template to chain: every linked input slot
    /// must have a same-named output of the same type, so instance `i` can
    /// feed instance `i + 1`.
    pub fn instantiate(&self, name: &str, count: u32) -> Result<Vec<Node>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let probe = (self.template)();
        if count > 1 {
            for binding in &self.inputs_to_link {
                let input = probe.find_input(&binding.slot).ok_or_else(|| {
                    EngineError::ExtensionShape(format!(
                        "extension '{name}' template lost input '{}'",
                        binding.slot
                    ))
                })?;
                match probe.find_output(&binding.slot) {
                    Some(output) if output.data_type == input.data_type => {}
                    Some(output) => {
                        return Err(EngineError::ExtensionShape(format!(
                            "extension '{name}' cannot chain: input '{}' is {} but output is {}",
                            binding.slot, input.data_type, output.data_type
                        )))
                    }
                    None => {
                        return Err(EngineError::ExtensionShape(format!(
                            "extension '{name}' cannot chain: no output matches input '{}'",
                            binding.slot
                        )))
                    }
                }
            }
        }
        Ok((0..count)
            .map(|_| (self.template)().renamed(name))
            .collect())
    }

    /// The output position consumers see after splicing `count` instances.
    pub fn external_output(&self, name: &str, count: u32, slot: &str) -> Position {
        Position::new(name, count.saturating_sub(1), slot)
    }

    /// Linked input slots that also appear as outputs, i.e. the ones that
    /// chain between consecutive instances.
    pub fn chaining_slots(&self) -> Vec<String> {
        let probe = (self.template)();
        self.inputs_to_link
            .iter()
            .filter(|b| probe.find_output(&b.slot).is_some())
            .map(|b| b.slot.clone())
            .collect()
    }
}

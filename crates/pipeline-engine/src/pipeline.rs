//! Pipelines: an ordered graph of nodes plus attached extensions.
//!
//! A pipeline is assembled once (register, link, attach) and then turned
//! into a [`RunPlan`] per task. Planning is where extensions are spliced:
//! instances are created from the user's per-instance input list, chained
//! through their shared slots and inserted into the schedule, and every
//! consumer of a replaced output is re-pointed at the last instance.
//! Detaching is implicit since the next plan starts from the declared graph
//! again.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::cache::OutputCache;
use crate::detector::PrevRun;
use crate::error::{EngineError, Result};
use crate::events::{Event, EventSink};
use crate::node::{ComputeContext, Node, NodeKind};
use crate::types::{Position, ValueMap};
use crate::widgets::Widget;
use uuid::Uuid;

/// A directed connection between an output and an input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub from: Position,
    pub to: Position,
}

#[derive(Debug)]
pub struct Pipeline {
    pub name: String,
    nodes: Vec<Node>,
    links: Vec<Link>,
    extensions: Vec<Node>,
}

/// One schedulable invocation in a run.
#[derive(Debug, Clone)]
pub struct Step {
    pub node: Node,
    pub index: u32,
    /// True for extension instances, whose user inputs arrive per instance.
    pub extension: bool,
}

impl Step {
    pub fn key(&self) -> (String, u32) {
        (self.node.name.clone(), self.index)
    }
}

/// The fully spliced schedule for one task.
#[derive(Debug, Clone)]
pub struct RunPlan {
    pub steps: Vec<Step>,
    /// Input position -> producer position, after all replacements.
    pub link_map: HashMap<Position, Position>,
    /// Extension name -> number of instances spliced in this run.
    pub instance_counts: HashMap<String, u32>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            links: Vec::new(),
            extensions: Vec::new(),
        }
    }

    /// Add a node. Registration order is execution order, and the order the
    /// change detector walks.
    pub fn register(&mut self, node: Node) -> Result<()> {
        if matches!(node.kind, NodeKind::Extension(_)) {
            return Err(EngineError::GraphBuild(format!(
                "'{}' is an extension; use attach",
                node.name
            )));
        }
        if self.find_node(&node.name).is_some() || self.find_extension(&node.name).is_some() {
            return Err(EngineError::GraphBuild(format!(
                "duplicate node name '{}'",
                node.name
            )));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Connect two registered nodes. The type and ordering checks happen
    /// here, at wiring time, not at execution time.
    pub fn link(&mut self, from: Position, to: Position) -> Result<()> {
        let from_index = self
            .nodes
            .iter()
            .position(|n| n.name == from.node)
            .ok_or_else(|| {
                EngineError::GraphBuild(format!("link from unknown node '{}'", from.node))
            })?;
        let to_index = self
            .nodes
            .iter()
            .position(|n| n.name == to.node)
            .ok_or_else(|| {
                EngineError::GraphBuild(format!("link to unknown node '{}'", to.node))
            })?;
        if to_index <= from_index {
            return Err(EngineError::GraphBuild(format!(
                "link {from} -> {to} goes against execution order"
            )));
        }
        let from_node = &self.nodes[from_index];
        let to_node = &self.nodes[to_index];
        let from_slot = from_node.find_output(&from.slot).ok_or_else(|| {
            EngineError::GraphBuild(format!("node '{}' has no output '{}'", from.node, from.slot))
        })?;
        let to_slot = to_node.find_input(&to.slot).ok_or_else(|| {
            EngineError::GraphBuild(format!("node '{}' has no input '{}'", to.node, to.slot))
        })?;
        if from_slot.data_type != to_slot.data_type {
            return Err(EngineError::TypeMismatch {
                from,
                from_type: from_slot.data_type.to_string(),
                to,
                to_type: to_slot.data_type.to_string(),
            });
        }
        if self.links.iter().any(|l| l.to == to) {
            return Err(EngineError::GraphBuild(format!(
                "input {to} is already linked"
            )));
        }
        self.links.push(Link { from, to });
        Ok(())
    }

    /// Attach an extension node built with [`Extension::into_node`]. Its
    /// bindings and replacements are validated against the registered graph
    /// now; splicing happens per run.
    ///
    /// [`Extension::into_node`]: crate::extension::Extension::into_node
    pub fn attach(&mut self, node: Node) -> Result<()> {
        let NodeKind::Extension(ext) = &node.kind else {
            return Err(EngineError::GraphBuild(format!(
                "'{}' is not an extension",
                node.name
            )));
        };
        if self.find_node(&node.name).is_some() || self.find_extension(&node.name).is_some() {
            return Err(EngineError::GraphBuild(format!(
                "duplicate node name '{}'",
                node.name
            )));
        }
        for binding in &ext.inputs_to_link {
            let host = self.find_node(&binding.from.node).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "extension '{}' taps unknown node '{}'",
                    node.name, binding.from.node
                ))
            })?;
            let host_slot = host.find_output(&binding.from.slot).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "extension '{}' taps missing output {}",
                    node.name, binding.from
                ))
            })?;
            let template_slot = node.find_input(&binding.slot).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "extension '{}' has no input '{}'",
                    node.name, binding.slot
                ))
            })?;
            if host_slot.data_type != template_slot.data_type {
                return Err(EngineError::TypeMismatch {
                    from: binding.from.clone(),
                    from_type: host_slot.data_type.to_string(),
                    to: Position::new(&node.name, 0, &binding.slot),
                    to_type: template_slot.data_type.to_string(),
                });
            }
        }
        for replacement in &ext.outputs_to_replace {
            let host = self.find_node(&replacement.replaces.node).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "extension '{}' replaces output of unknown node '{}'",
                    node.name, replacement.replaces.node
                ))
            })?;
            let host_slot = host.find_output(&replacement.replaces.slot).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "extension '{}' replaces missing output {}",
                    node.name, replacement.replaces
                ))
            })?;
            let template_slot = node.find_output(&replacement.slot).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "extension '{}' has no output '{}'",
                    node.name, replacement.slot
                ))
            })?;
            if host_slot.data_type != template_slot.data_type {
                return Err(EngineError::TypeMismatch {
                    from: Position::new(&node.name, 0, &replacement.slot),
                    from_type: template_slot.data_type.to_string(),
                    to: replacement.replaces.clone(),
                    to_type: host_slot.data_type.to_string(),
                });
            }
        }
        if let Some(anchor) = &ext.anchor {
            if self.find_node(anchor).is_none() {
                return Err(EngineError::GraphBuild(format!(
                    "extension '{}' anchors to unknown node '{}'",
                    node.name, anchor
                )));
            }
        }
        self.extensions.push(node);
        Ok(())
    }

    fn find_node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    fn find_extension(&self, name: &str) -> Option<&Node> {
        self.extensions.iter().find(|n| n.name == name)
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .chain(self.extensions.iter())
            .map(|n| n.name.as_str())
    }

    /// Splice extensions for this run's instance counts and produce the
    /// schedule. Extension names present in `extension_inputs` but not
    /// attached here are logged and skipped.
    pub fn plan(&self, extension_inputs: &HashMap<String, Vec<ValueMap>>) -> Result<RunPlan> {
        if self.nodes.is_empty() {
            return Err(EngineError::GraphBuild(format!(
                "pipeline '{}' has no nodes",
                self.name
            )));
        }
        for name in extension_inputs.keys() {
            if self.find_extension(name).is_none() {
                log::warn!(
                    "pipeline '{}': ignoring inputs for unattached extension '{}'",
                    self.name,
                    name
                );
            }
        }

        let mut steps: Vec<Step> = self
            .nodes
            .iter()
            .map(|n| Step {
                node: n.clone(),
                index: 0,
                extension: false,
            })
            .collect();
        let mut link_map: HashMap<Position, Position> = HashMap::new();
        let mut rewrites: HashMap<Position, Position> = HashMap::new();
        let mut instance_counts: HashMap<String, u32> = HashMap::new();

        for ext_node in &self.extensions {
            let NodeKind::Extension(ext) = &ext_node.kind else {
                unreachable!("attach only accepts extensions");
            };
            let count = extension_inputs
                .get(&ext_node.name)
                .map(|v| v.len() as u32)
                .unwrap_or(0);
            instance_counts.insert(ext_node.name.clone(), count);
            if count == 0 {
                continue;
            }
            let instances = ext.instantiate(&ext_node.name, count)?;
            let chaining: HashSet<String> = ext.chaining_slots().into_iter().collect();

            for (i, _) in instances.iter().enumerate() {
                for binding in &ext.inputs_to_link {
                    let to = Position::new(&ext_node.name, i as u32, &binding.slot);
                    let from = if i > 0 && chaining.contains(&binding.slot) {
                        Position::new(&ext_node.name, i as u32 - 1, &binding.slot)
                    } else {
                        resolve(&rewrites, &binding.from)
                    };
                    link_map.insert(to, from);
                }
            }
            for replacement in &ext.outputs_to_replace {
                rewrites.insert(
                    replacement.replaces.clone(),
                    ext.external_output(&ext_node.name, count, &replacement.slot),
                );
            }

            let anchor = self.splice_anchor(&steps, ext)?;
            for (offset, instance) in instances.into_iter().enumerate() {
                steps.insert(
                    anchor + 1 + offset,
                    Step {
                        node: instance,
                        index: offset as u32,
                        extension: true,
                    },
                );
            }
        }

        for link in &self.links {
            link_map.insert(link.to.clone(), resolve(&rewrites, &link.from));
        }

        Ok(RunPlan {
            steps,
            link_map,
            instance_counts,
        })
    }

    /// Instances run right after the anchor node when one is pinned, else
    /// after the node whose output they replace, which keeps them before
    /// every consumer of that output. Extensions without a replacement run
    /// after the last node they tap.
    fn splice_anchor(&self, steps: &[Step], ext: &crate::extension::Extension) -> Result<usize> {
        let find = |node: &str| steps.iter().rposition(|s| s.node.name == node);
        if let Some(anchor) = &ext.anchor {
            return find(anchor).ok_or_else(|| {
                EngineError::GraphBuild(format!("anchor node '{anchor}' missing from schedule"))
            });
        }
        if let Some(replacement) = ext.outputs_to_replace.first() {
            return find(&replacement.replaces.node).ok_or_else(|| {
                EngineError::GraphBuild(format!(
                    "replaced node '{}' missing from schedule",
                    replacement.replaces.node
                ))
            });
        }
        let anchor = ext
            .inputs_to_link
            .iter()
            .filter_map(|b| find(&b.from.node))
            .max()
            .unwrap_or(steps.len() - 1);
        Ok(anchor)
    }
}

fn resolve(rewrites: &HashMap<Position, Position>, pos: &Position) -> Position {
    rewrites.get(pos).cloned().unwrap_or_else(|| pos.clone())
}

impl RunPlan {
    /// Validate and coerce every user-supplied widget value, returning one
    /// value map per step keyed by parameter name. All violations across
    /// the whole plan are collected before failing.
    pub fn resolve_inputs(
        &self,
        base_inputs: &ValueMap,
        extension_inputs: &HashMap<String, Vec<ValueMap>>,
    ) -> Result<Vec<ValueMap>> {
        let mut resolved = Vec::with_capacity(self.steps.len());
        let mut errors = Vec::new();
        let empty = ValueMap::new();
        for step in &self.steps {
            let source: &ValueMap = if step.extension {
                extension_inputs
                    .get(&step.node.name)
                    .and_then(|list| list.get(step.index as usize))
                    .unwrap_or(&empty)
            } else {
                base_inputs
            };
            let mut values = ValueMap::new();
            for widget in &step.node.widgets {
                let raw = source.get(&widget.param_name).unwrap_or(&widget.default);
                match widget.validate(raw) {
                    Ok(coerced) => {
                        values.insert(widget.param_name.clone(), coerced);
                    }
                    Err(violations) => {
                        for v in violations {
                            errors.push(format!("{}[{}]: {}", step.node.name, step.index, v));
                        }
                    }
                }
            }
            resolved.push(values);
        }
        if errors.is_empty() {
            Ok(resolved)
        } else {
            Err(EngineError::Validation(errors))
        }
    }

    /// Execute the schedule against `cache`, skipping steps whose outputs
    /// are already cached. `widget_values` must come from
    /// [`RunPlan::resolve_inputs`]. Each executed step is recorded in
    /// `prev` as its outputs are cached, so the record matches the cache
    /// even when a later step fails or the run is canceled. Cancellation
    /// is honored between steps, never inside one.
    pub async fn execute(
        &self,
        widget_values: &[ValueMap],
        cache: &mut OutputCache,
        prev: &mut PrevRun,
        task_id: Uuid,
        sink: Arc<dyn EventSink>,
        canceled: &(dyn Fn() -> bool + Send + Sync),
    ) -> Result<ValueMap> {
        for (step, values) in self.steps.iter().zip(widget_values) {
            if canceled() {
                return Err(EngineError::Canceled);
            }
            if cache.contains(&step.node.name, step.index) {
                log::debug!("reusing cached outputs for {}[{}]", step.node.name, step.index);
                continue;
            }
            sink.emit(Event::TaskProcessing {
                task_id,
                node: step.node.name.clone(),
                index: step.index,
            });
            let inputs = self.gather_inputs(step, values, cache)?;
            let ctx = ComputeContext::new(task_id, &step.node.name, step.index, Arc::clone(&sink));
            let outputs = match &step.node.kind {
                NodeKind::Operator(compute) => {
                    compute
                        .run(inputs, &ctx)
                        .await
                        .map_err(|e| EngineError::ExecutionFailed {
                            node: step.node.name.clone(),
                            message: e.to_string(),
                        })?
                }
                NodeKind::Composite(composite) => composite
                    .execute(&inputs, &ctx)
                    .await
                    .map_err(|e| EngineError::ExecutionFailed {
                        node: step.node.name.clone(),
                        message: e.to_string(),
                    })?,
                NodeKind::Extension(_) => {
                    unreachable!("extensions are replaced by instances during planning")
                }
            };
            cache.put(&step.node.name, step.index, outputs);
            prev.record(step, values, self);
        }

        let result_step = self
            .steps
            .iter()
            .rev()
            .find(|s| !s.extension)
            .or_else(|| self.steps.last())
            .ok_or_else(|| EngineError::GraphBuild("empty schedule".to_string()))?;
        let outputs = cache
            .get(&result_step.node.name, result_step.index)
            .ok_or_else(|| EngineError::MissingInput(Position::new(
                &result_step.node.name,
                result_step.index,
                "*",
            )))?;
        Ok(outputs.clone())
    }

    fn gather_inputs(
        &self,
        step: &Step,
        widget_values: &ValueMap,
        cache: &OutputCache,
    ) -> Result<ValueMap> {
        let mut inputs = ValueMap::new();
        let mut consumed_widgets: HashSet<&str> = HashSet::new();
        for slot in &step.node.inputs {
            let pos = Position::new(&step.node.name, step.index, &slot.name);
            if let Some(from) = self.link_map.get(&pos) {
                let value = cache
                    .get_slot(from)
                    .ok_or_else(|| EngineError::MissingInput(from.clone()))?;
                inputs.insert(slot.name.clone(), value.clone());
                continue;
            }
            if let Some(value) = widget_values.get(slot.user_name()) {
                inputs.insert(slot.name.clone(), value.clone());
                consumed_widgets.insert(slot.user_name());
                continue;
            }
            if !slot.optional {
                return Err(EngineError::MissingInput(pos));
            }
        }
        // Widget parameters with no matching slot pass through by name.
        for (param, value) in widget_values {
            if !consumed_widgets.contains(param.as_str()) && !inputs.contains_key(param) {
                inputs.insert(param.clone(), value.clone());
            }
        }
        Ok(inputs)
    }

    /// Every widget across the plan, with the step it belongs to. Used by
    /// frontends to render input forms.
    pub fn widgets(&self) -> impl Iterator<Item = (&Step, &Widget)> {
        self.steps
            .iter()
            .flat_map(|s| s.node.widgets.iter().map(move |w| (s, w)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullEventSink;
    use crate::extension::Extension;
    use crate::node::Compute;
    use crate::slots::{InputSlot, OutputSlot};
    use crate::types::DataType;
    use async_trait::async_trait;
    use serde_json::json;

    struct Tag(&'static str);

    #[async_trait]
    impl Compute for Tag {
        async fn run(&self, inputs: ValueMap, _ctx: &ComputeContext) -> Result<ValueMap> {
            let upstream = inputs
                .get("in")
                .and_then(|v| v.as_str())
                .unwrap_or("-")
                .to_string();
            let mut out = ValueMap::new();
            out.insert("out".to_string(), json!(format!("{}:{}", upstream, self.0)));
            Ok(out)
        }
    }

    fn tagged(name: &'static str) -> Node {
        Node::operator(name, Arc::new(Tag(name)))
            .input(InputSlot::new("in", DataType::STRING).optional())
            .output(OutputSlot::new("out", DataType::STRING))
    }

    fn two_node_pipeline() -> Pipeline {
        let mut p = Pipeline::new("demo");
        p.register(tagged("a")).unwrap();
        p.register(tagged("b")).unwrap();
        p.link(Position::new("a", 0, "out"), Position::new("b", 0, "in"))
            .unwrap();
        p
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut p = Pipeline::new("demo");
        p.register(tagged("a")).unwrap();
        assert!(matches!(
            p.register(tagged("a")).unwrap_err(),
            EngineError::GraphBuild(_)
        ));
    }

    #[test]
    fn test_link_type_mismatch_rejected_at_wiring_time() {
        struct Num;

        #[async_trait]
        impl Compute for Num {
            async fn run(&self, _inputs: ValueMap, _ctx: &ComputeContext) -> Result<ValueMap> {
                Ok(ValueMap::new())
            }
        }

        let mut p = Pipeline::new("demo");
        p.register(
            Node::operator("n", Arc::new(Num)).output(OutputSlot::new("out", DataType::INT)),
        )
        .unwrap();
        p.register(tagged("b")).unwrap();
        assert!(matches!(
            p.link(Position::new("n", 0, "out"), Position::new("b", 0, "in"))
                .unwrap_err(),
            EngineError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn test_backward_link_rejected_at_wiring_time() {
        let mut p = Pipeline::new("demo");
        p.register(tagged("a")).unwrap();
        p.register(tagged("b")).unwrap();
        let err = p
            .link(Position::new("b", 0, "out"), Position::new("a", 0, "in"))
            .unwrap_err();
        let EngineError::GraphBuild(message) = err else {
            panic!("expected graph build error");
        };
        assert!(message.contains("execution order"));
    }

    #[tokio::test]
    async fn test_plan_executes_in_registration_order() {
        let p = two_node_pipeline();
        let plan = p.plan(&HashMap::new()).unwrap();
        let values = plan.resolve_inputs(&ValueMap::new(), &HashMap::new()).unwrap();
        let mut cache = OutputCache::new();
        let out = plan
            .execute(
                &values,
                &mut cache,
                &mut PrevRun::new(),
                Uuid::new_v4(),
                Arc::new(NullEventSink),
                &|| false,
            )
            .await
            .unwrap();
        assert_eq!(out["out"], json!("-:a:b"));
    }

    fn chained_extension(host_from: Position, replaces: Position) -> Node {
        let template = || {
            Node::operator("chain_template", Arc::new(Tag("x")))
                .input(InputSlot::new("in", DataType::STRING))
                .output(OutputSlot::new("out", DataType::STRING))
        };
        Extension::new(Arc::new(template))
            .link("in", host_from)
            .replace_output("out", replaces)
            .into_node("x")
            .unwrap()
    }

    #[tokio::test]
    async fn test_extension_instances_splice_between_producer_and_consumer() {
        let mut p = two_node_pipeline();
        p.attach(chained_extension(
            Position::new("a", 0, "out"),
            Position::new("a", 0, "out"),
        ))
        .unwrap();

        let mut ext_inputs = HashMap::new();
        ext_inputs.insert("x".to_string(), vec![ValueMap::new(), ValueMap::new()]);
        let plan = p.plan(&ext_inputs).unwrap();

        let order: Vec<(String, u32)> = plan.steps.iter().map(|s| s.key()).collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), 0),
                ("x".to_string(), 0),
                ("x".to_string(), 1),
                ("b".to_string(), 0)
            ]
        );
        // b now reads from the last instance.
        assert_eq!(
            plan.link_map[&Position::new("b", 0, "in")],
            Position::new("x", 1, "out")
        );
        // The instances chain.
        assert_eq!(
            plan.link_map[&Position::new("x", 1, "in")],
            Position::new("x", 0, "out")
        );

        let values = plan.resolve_inputs(&ValueMap::new(), &ext_inputs).unwrap();
        let mut cache = OutputCache::new();
        let out = plan
            .execute(
                &values,
                &mut cache,
                &mut PrevRun::new(),
                Uuid::new_v4(),
                Arc::new(NullEventSink),
                &|| false,
            )
            .await
            .unwrap();
        assert_eq!(out["out"], json!("-:a:x:x:b"));
    }

    fn tap_only_extension() -> Extension {
        let template = || {
            Node::operator("tap_template", Arc::new(Tag("x")))
                .input(InputSlot::new("in", DataType::STRING))
                .output(OutputSlot::new("out", DataType::STRING))
        };
        Extension::new(Arc::new(template)).link("in", Position::new("a", 0, "out"))
    }

    #[test]
    fn test_pinned_anchor_moves_the_splice_point() {
        let mut p = two_node_pipeline();
        p.attach(tap_only_extension().after("b").into_node("x").unwrap())
            .unwrap();

        let mut ext_inputs = HashMap::new();
        ext_inputs.insert("x".to_string(), vec![ValueMap::new()]);
        let plan = p.plan(&ext_inputs).unwrap();
        let order: Vec<String> = plan.steps.iter().map(|s| s.node.name.clone()).collect();
        assert_eq!(order, vec!["a", "b", "x"]);
    }

    #[test]
    fn test_unknown_anchor_rejected_at_attach() {
        let mut p = two_node_pipeline();
        let err = p
            .attach(tap_only_extension().after("ghost").into_node("x").unwrap())
            .unwrap_err();
        assert!(matches!(err, EngineError::GraphBuild(_)));
    }

    #[test]
    fn test_zero_instances_leave_graph_untouched() {
        let mut p = two_node_pipeline();
        p.attach(chained_extension(
            Position::new("a", 0, "out"),
            Position::new("a", 0, "out"),
        ))
        .unwrap();
        let plan = p.plan(&HashMap::new()).unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(
            plan.link_map[&Position::new("b", 0, "in")],
            Position::new("a", 0, "out")
        );
        assert_eq!(plan.instance_counts["x"], 0);
    }

    #[test]
    fn test_validation_collects_all_violations() {
        let mut p = Pipeline::new("demo");
        p.register(
            tagged("a")
                .widget(Widget::int("steps", 20, 1, 150, 1))
                .widget(Widget::float("cfg", 7.0, 0.0, 30.0)),
        )
        .unwrap();
        let plan = p.plan(&HashMap::new()).unwrap();

        let mut inputs = ValueMap::new();
        inputs.insert("steps".to_string(), json!(999));
        inputs.insert("cfg".to_string(), json!("lots"));
        let err = plan.resolve_inputs(&inputs, &HashMap::new()).unwrap_err();
        let EngineError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors.len(), 2);
    }
}

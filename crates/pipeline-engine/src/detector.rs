//! Change detection: deciding which cached outputs survive into a new run.
//!
//! The worker remembers, per pipeline, how every cached invocation was
//! produced: the widget values it ran with and where its inputs came
//! from. The record is written entry by entry, at the moment an
//! invocation's outputs enter the cache, so it stays truthful even when a
//! run fails or is canceled halfway and the cache holds a mix of old and
//! new entries. Before executing a new plan the detector compares the
//! incoming inputs and wiring against the record and evicts every cache
//! entry that can no longer be trusted. Staleness is conservative: once
//! one step is stale, every step scheduled after it is treated as stale
//! too, since schedule order is data order in these graphs.

use std::collections::{HashMap, HashSet};

use crate::cache::OutputCache;
use crate::pipeline::{RunPlan, Step};
use crate::types::{Position, ValueMap};

/// What the worker knows about how each cached invocation was produced.
#[derive(Debug, Clone, Default)]
pub struct PrevRun {
    /// Validated widget values each cached invocation ran with.
    pub widget_values: HashMap<(String, u32), ValueMap>,
    /// Input position -> producer position each cached invocation read.
    pub link_map: HashMap<Position, Position>,
    /// Instance counts of the most recent plan, successful or not.
    pub instance_counts: HashMap<String, u32>,
}

impl PrevRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the inputs one invocation just executed with. Must be called
    /// when its outputs are written to the cache, whatever the rest of the
    /// run goes on to do; a cache entry without a matching record is
    /// treated as stale.
    pub fn record(&mut self, step: &Step, widget_values: &ValueMap, plan: &RunPlan) {
        self.widget_values.insert(step.key(), widget_values.clone());
        for slot in &step.node.inputs {
            let pos = Position::new(&step.node.name, step.index, &slot.name);
            match plan.link_map.get(&pos) {
                Some(from) => {
                    self.link_map.insert(pos, from.clone());
                }
                None => {
                    self.link_map.remove(&pos);
                }
            }
        }
    }
}

/// Evict cache entries invalidated by the differences between `plan` and
/// the recorded provenance, and return the index of the first step that
/// will actually execute (`None` when every step is served from cache).
pub fn invalidate(
    plan: &RunPlan,
    widget_values: &[ValueMap],
    prev: &mut PrevRun,
    cache: &mut OutputCache,
) -> Option<usize> {
    let names: HashSet<&str> = plan.steps.iter().map(|s| s.node.name.as_str()).collect();
    cache.retain_nodes(|name| names.contains(name));

    // A reshaped extension invalidates all of its instances: indices
    // shift meaning when the count changes.
    for (name, count) in &plan.instance_counts {
        if prev.instance_counts.get(name) != Some(count) {
            cache.clear(name);
        }
    }
    prev.instance_counts = plan.instance_counts.clone();

    let first_stale = plan
        .steps
        .iter()
        .enumerate()
        .position(|(i, step)| is_stale(step, &widget_values[i], plan, prev, cache));

    if let Some(start) = first_stale {
        for step in &plan.steps[start..] {
            cache.clear_index(&step.node.name, step.index);
        }
    }
    first_stale
}

fn is_stale(
    step: &Step,
    widget_values: &ValueMap,
    plan: &RunPlan,
    prev: &PrevRun,
    cache: &OutputCache,
) -> bool {
    if !cache.contains(&step.node.name, step.index) {
        return true;
    }
    match prev.widget_values.get(&step.key()) {
        Some(recorded) if recorded == widget_values => {}
        _ => return true,
    }
    // Producer moved, appeared or disappeared on any input.
    for slot in &step.node.inputs {
        let pos = Position::new(&step.node.name, step.index, &slot.name);
        if plan.link_map.get(&pos) != prev.link_map.get(&pos) {
            return true;
        }
    }
    false
}

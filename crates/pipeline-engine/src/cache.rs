//! Memoized node outputs, keyed by node name and invocation index.

use std::collections::HashMap;

use crate::types::{Position, Value, ValueMap};

/// Cache of node outputs from previous executions.
///
/// Three levels deep: node name, then invocation index (which run of a
/// repeated node), then output slot name. Entries survive across runs so
/// the scheduler can skip any node whose inputs are unchanged.
#[derive(Debug, Default)]
pub struct OutputCache {
    entries: HashMap<String, HashMap<u32, ValueMap>>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, node: impl Into<String>, index: u32, outputs: ValueMap) {
        self.entries
            .entry(node.into())
            .or_default()
            .insert(index, outputs);
    }

    pub fn get(&self, node: &str, index: u32) -> Option<&ValueMap> {
        self.entries.get(node)?.get(&index)
    }

    /// Look up a single cached output by its global position.
    pub fn get_slot(&self, pos: &Position) -> Option<&Value> {
        self.get(&pos.node, pos.index)?.get(&pos.slot)
    }

    pub fn contains(&self, node: &str, index: u32) -> bool {
        self.get(node, index).is_some()
    }

    /// Drop every cached invocation of `node`.
    pub fn clear(&mut self, node: &str) {
        self.entries.remove(node);
    }

    /// Drop one cached invocation, keeping the node's other indices.
    pub fn clear_index(&mut self, node: &str, index: u32) {
        if let Some(by_index) = self.entries.get_mut(node) {
            by_index.remove(&index);
            if by_index.is_empty() {
                self.entries.remove(node);
            }
        }
    }

    pub fn clear_all(&mut self) {
        self.entries.clear();
    }

    /// Drop entries for nodes not in the current graph.
    pub fn retain_nodes(&mut self, keep: impl Fn(&str) -> bool) {
        self.entries.retain(|name, _| keep(name));
    }

    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

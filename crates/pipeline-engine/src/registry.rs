//! Registry of pipeline builders, looked up by name at task time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{EngineError, Result};
use crate::pipeline::Pipeline;

pub type PipelineBuilder = Arc<dyn Fn() -> Result<Pipeline> + Send + Sync>;

/// Maps pipeline names to builder closures. The worker builds a fresh
/// instance whenever the active pipeline name changes, so builders must be
/// deterministic.
#[derive(Default)]
pub struct PipelineRegistry {
    builders: RwLock<HashMap<String, PipelineBuilder>>,
}

impl PipelineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, name: impl Into<String>, builder: F)
    where
        F: Fn() -> Result<Pipeline> + Send + Sync + 'static,
    {
        self.builders
            .write()
            .expect("registry poisoned")
            .insert(name.into(), Arc::new(builder));
    }

    pub fn build(&self, name: &str) -> Result<Pipeline> {
        let builder = self
            .builders
            .read()
            .expect("registry poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::GraphBuild(format!("unknown pipeline '{name}'")))?;
        builder()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .builders
            .read()
            .expect("registry poisoned")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

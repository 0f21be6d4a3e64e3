//! Checkpoint loading: one widget in, model/clip/vae out.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    Compute, ComputeContext, DataType, Node, OutputSlot, Result, ValueMap, Widget,
};

use crate::backend;
use crate::ops::require_str;

pub const OUT_MODEL: &str = "model";
pub const OUT_CLIP: &str = "clip";
pub const OUT_VAE: &str = "vae";
pub const PARAM_CKPT: &str = "ckpt_name";

pub const CHECKPOINTS: &[&str] = &[
    "dreamshaper_v8.safetensors",
    "sd_v1-5.safetensors",
    "sdxl_base_1.0.safetensors",
];

struct LoadCheckpoint;

#[async_trait]
impl Compute for LoadCheckpoint {
    async fn run(&self, inputs: ValueMap, ctx: &ComputeContext) -> Result<ValueMap> {
        let ckpt = require_str(&inputs, ctx, PARAM_CKPT)?;
        log::debug!("loading checkpoint '{ckpt}'");
        let mut out = ValueMap::new();
        out.insert(OUT_MODEL.to_string(), backend::load_model(ckpt));
        out.insert(OUT_CLIP.to_string(), backend::load_clip(ckpt));
        out.insert(OUT_VAE.to_string(), backend::load_vae(ckpt));
        Ok(out)
    }
}

pub fn node(name: impl Into<String>) -> Node {
    Node::operator(name, Arc::new(LoadCheckpoint))
        .output(OutputSlot::new(OUT_MODEL, DataType::MODEL))
        .output(OutputSlot::new(OUT_CLIP, DataType::CLIP))
        .output(OutputSlot::new(OUT_VAE, DataType::VAE))
        .widget(
            Widget::combo(
                PARAM_CKPT,
                CHECKPOINTS.iter().map(|s| s.to_string()).collect(),
                0,
            )
            .display("Checkpoint"),
        )
}

//! Latent to image decoding.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    Compute, ComputeContext, DataType, InputSlot, Node, OutputSlot, Result, ValueMap,
};

use crate::backend;
use crate::ops::require;

pub const IN_VAE: &str = "vae";
pub const IN_LATENT: &str = "latent";
pub const OUT_IMAGE: &str = "image";

struct VaeDecode;

#[async_trait]
impl Compute for VaeDecode {
    async fn run(&self, inputs: ValueMap, ctx: &ComputeContext) -> Result<ValueMap> {
        let vae = require(&inputs, ctx, IN_VAE)?;
        let latent = require(&inputs, ctx, IN_LATENT)?;
        let mut out = ValueMap::new();
        out.insert(OUT_IMAGE.to_string(), backend::decode(vae, latent));
        Ok(out)
    }
}

pub fn node(name: impl Into<String>) -> Node {
    Node::operator(name, Arc::new(VaeDecode))
        .input(InputSlot::new(IN_VAE, DataType::VAE))
        .input(InputSlot::new(IN_LATENT, DataType::LATENT))
        .output(OutputSlot::new(OUT_IMAGE, DataType::IMAGE))
}

//! Blank latent canvas.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{Compute, ComputeContext, DataType, Node, OutputSlot, Result, ValueMap, Widget};

use crate::backend;
use crate::ops::require_i64;

pub const PARAM_WIDTH: &str = "width";
pub const PARAM_HEIGHT: &str = "height";
pub const OUT_LATENT: &str = "latent";

struct EmptyLatent;

#[async_trait]
impl Compute for EmptyLatent {
    async fn run(&self, inputs: ValueMap, ctx: &ComputeContext) -> Result<ValueMap> {
        let width = require_i64(&inputs, ctx, PARAM_WIDTH)?;
        let height = require_i64(&inputs, ctx, PARAM_HEIGHT)?;
        let mut out = ValueMap::new();
        out.insert(OUT_LATENT.to_string(), backend::empty_latent(width, height));
        Ok(out)
    }
}

pub fn node(name: impl Into<String>) -> Node {
    Node::operator(name, Arc::new(EmptyLatent))
        .output(OutputSlot::new(OUT_LATENT, DataType::LATENT))
        .widget(Widget::int(PARAM_WIDTH, 512, 64, 4096, 8).display("Width"))
        .widget(Widget::int(PARAM_HEIGHT, 512, 64, 4096, 8).display("Height"))
}

//! Text encoding against a clip model.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    Compute, ComputeContext, DataType, InputSlot, Node, OutputSlot, Result, ValueMap, Widget,
};

use crate::backend;
use crate::ops::{require, require_str};

pub const IN_CLIP: &str = "clip";
pub const PARAM_TEXT: &str = "text";
pub const OUT_CONDITIONING: &str = "conditioning";

struct ClipEncode;

#[async_trait]
impl Compute for ClipEncode {
    async fn run(&self, inputs: ValueMap, ctx: &ComputeContext) -> Result<ValueMap> {
        let clip = require(&inputs, ctx, IN_CLIP)?;
        let text = require_str(&inputs, ctx, PARAM_TEXT)?;
        let mut out = ValueMap::new();
        out.insert(OUT_CONDITIONING.to_string(), backend::encode(clip, text));
        Ok(out)
    }
}

/// A prompt encoder. Call [`Node::map_input_name`] on the result when a
/// pipeline holds more than one, so each prompt gets its own user key.
pub fn node(name: impl Into<String>) -> Node {
    Node::operator(name, Arc::new(ClipEncode))
        .input(InputSlot::new(IN_CLIP, DataType::CLIP))
        .output(OutputSlot::new(OUT_CONDITIONING, DataType::CONDITIONING))
        .widget(Widget::text(PARAM_TEXT, "").display("Prompt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_conditioning_reflects_text_and_clip() {
        let clip = backend::load_clip("sd_v1-5.safetensors");
        let mut inputs = ValueMap::new();
        inputs.insert(IN_CLIP.to_string(), clip);
        inputs.insert(PARAM_TEXT.to_string(), json!("a cat"));
        let out = ClipEncode
            .run(inputs, &ComputeContext::detached("clip_encode"))
            .await
            .unwrap();
        assert_eq!(out[OUT_CONDITIONING]["text"], "a cat");
    }
}

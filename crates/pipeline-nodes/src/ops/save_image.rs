//! Terminal node: names the final image.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    Compute, ComputeContext, DataType, InputSlot, Node, OutputSlot, Result, ValueMap, Widget,
};
use serde_json::json;

use crate::backend;
use crate::ops::{require, require_str};

pub const IN_IMAGE: &str = "image";
pub const PARAM_PREFIX: &str = "filename_prefix";
pub const OUT_IMAGE: &str = "image";
pub const OUT_FILENAME: &str = "filename";

struct SaveImage;

#[async_trait]
impl Compute for SaveImage {
    async fn run(&self, inputs: ValueMap, ctx: &ComputeContext) -> Result<ValueMap> {
        let image = require(&inputs, ctx, IN_IMAGE)?;
        let prefix = require_str(&inputs, ctx, PARAM_PREFIX)?;
        let filename = backend::image_filename(prefix, image);
        log::info!("saved image as '{filename}'");
        let mut out = ValueMap::new();
        out.insert(OUT_IMAGE.to_string(), image.clone());
        out.insert(OUT_FILENAME.to_string(), json!(filename));
        Ok(out)
    }
}

pub fn node(name: impl Into<String>) -> Node {
    Node::operator(name, Arc::new(SaveImage))
        .input(InputSlot::new(IN_IMAGE, DataType::IMAGE))
        .output(OutputSlot::new(OUT_IMAGE, DataType::IMAGE))
        .output(OutputSlot::new(OUT_FILENAME, DataType::STRING))
        .widget(Widget::text(PARAM_PREFIX, "output").display("Filename prefix"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_filename_uses_prefix_and_content() {
        let image = backend::decode(
            &backend::load_vae("sd_v1-5.safetensors"),
            &backend::empty_latent(512, 512),
        );
        let mut inputs = ValueMap::new();
        inputs.insert(IN_IMAGE.to_string(), image.clone());
        inputs.insert(PARAM_PREFIX.to_string(), json!("cat"));
        let out = SaveImage
            .run(inputs, &ComputeContext::detached("save_image"))
            .await
            .unwrap();
        let filename = out[OUT_FILENAME].as_str().unwrap();
        assert!(filename.starts_with("cat_"));
        assert!(filename.ends_with(".png"));
    }
}

//! Stock extensions: optional, repeatable graph fragments.
//!
//! Each constructor takes the host positions to tap, so the same extension
//! wires into any pipeline whose slots carry the right types.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    Compute, ComputeContext, DataType, Extension, InputSlot, Node, OutputSlot, Position, Result,
    ValueMap, Widget,
};

use crate::backend;
use crate::ops::{require, require_f64, require_str};

pub const LORAS: &[&str] = &["add_detail", "film_grain", "pixel_style"];
pub const UPSCALE_METHODS: &[&str] = &["nearest", "bilinear", "lanczos"];

struct ApplyLora;

#[async_trait]
impl Compute for ApplyLora {
    async fn run(&self, inputs: ValueMap, ctx: &ComputeContext) -> Result<ValueMap> {
        let model = require(&inputs, ctx, "model")?.clone();
        let clip = require(&inputs, ctx, "clip")?.clone();
        let lora_name = require_str(&inputs, ctx, "lora_name")?;
        let strength_model = require_f64(&inputs, ctx, "strength_model")?;
        let strength_clip = require_f64(&inputs, ctx, "strength_clip")?;
        let mut out = ValueMap::new();
        out.insert(
            "model".to_string(),
            backend::apply_lora(model, lora_name, strength_model),
        );
        out.insert(
            "clip".to_string(),
            backend::apply_lora(clip, lora_name, strength_clip),
        );
        Ok(out)
    }
}

fn lora_template() -> Node {
    Node::operator("lora", Arc::new(ApplyLora))
        .input(InputSlot::new("model", DataType::MODEL))
        .input(InputSlot::new("clip", DataType::CLIP))
        .output(OutputSlot::new("model", DataType::MODEL))
        .output(OutputSlot::new("clip", DataType::CLIP))
        .widget(
            Widget::combo("lora_name", LORAS.iter().map(|s| s.to_string()).collect(), 0)
                .display("LoRA"),
        )
        .widget(Widget::float("strength_model", 1.0, -20.0, 20.0).display("Model strength"))
        .widget(Widget::float("strength_clip", 1.0, -20.0, 20.0).display("Clip strength"))
}

/// LoRA applier. Inputs and outputs share names and types, so any number of
/// instances chain model and clip through each other before the host's
/// consumers see them.
pub fn lora(name: impl Into<String>, model_from: Position, clip_from: Position) -> Result<Node> {
    Extension::new(Arc::new(lora_template))
        .link("model", model_from.clone())
        .link("clip", clip_from.clone())
        .replace_output("model", model_from)
        .replace_output("clip", clip_from)
        .into_node(name)
}

struct Upscale;

#[async_trait]
impl Compute for Upscale {
    async fn run(&self, inputs: ValueMap, ctx: &ComputeContext) -> Result<ValueMap> {
        let image = require(&inputs, ctx, "image")?;
        let scale = require_f64(&inputs, ctx, "scale")?;
        let method = require_str(&inputs, ctx, "method")?;
        let mut out = ValueMap::new();
        out.insert("image".to_string(), backend::upscale(image, scale, method));
        Ok(out)
    }
}

fn upscale_template() -> Node {
    Node::operator("upscale", Arc::new(Upscale))
        .input(InputSlot::new("image", DataType::IMAGE))
        .output(OutputSlot::new("image", DataType::IMAGE))
        .widget(Widget::float("scale", 2.0, 1.0, 8.0).display("Scale"))
        .widget(
            Widget::combo(
                "method",
                UPSCALE_METHODS.iter().map(|s| s.to_string()).collect(),
                1,
            )
            .display("Method"),
        )
}

/// Image upscaler, spliced between the decoder and whatever consumes its
/// image. Chains too: two instances upscale twice.
pub fn upscale(name: impl Into<String>, image_from: Position) -> Result<Node> {
    Extension::new(Arc::new(upscale_template))
        .link("image", image_from.clone())
        .replace_output("image", image_from)
        .into_node(name)
}

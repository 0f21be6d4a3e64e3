//! Assembled pipelines ready for the worker.

use pipeline_engine::{CompositeBuilder, Pipeline, PipelineRegistry, Position, Result};

use crate::extensions;
use crate::ops;

pub const TEXT_TO_IMAGE: &str = "text_to_image";
pub const TEXT_TO_IMAGE_COMPACT: &str = "text_to_image_compact";

/// The reference text-to-image graph: checkpoint, two prompt encoders, a
/// sampler, decode and save, with LoRA and upscale extensions attached.
pub fn text_to_image() -> Result<Pipeline> {
    let mut p = Pipeline::new(TEXT_TO_IMAGE);
    p.register(ops::checkpoint::node("checkpoint"))?;
    p.register(
        ops::clip_encode::node("encode_positive").map_input_name("text", "positive_prompt"),
    )?;
    p.register(
        ops::clip_encode::node("encode_negative").map_input_name("text", "negative_prompt"),
    )?;
    p.register(ops::empty_latent::node("empty_latent"))?;
    p.register(ops::sampler::node("sampler"))?;
    p.register(ops::vae_decode::node("vae_decode"))?;
    p.register(ops::save_image::node("save_image"))?;

    p.link(
        Position::new("checkpoint", 0, "clip"),
        Position::new("encode_positive", 0, "clip"),
    )?;
    p.link(
        Position::new("checkpoint", 0, "clip"),
        Position::new("encode_negative", 0, "clip"),
    )?;
    p.link(
        Position::new("checkpoint", 0, "model"),
        Position::new("sampler", 0, "model"),
    )?;
    p.link(
        Position::new("encode_positive", 0, "conditioning"),
        Position::new("sampler", 0, "positive"),
    )?;
    p.link(
        Position::new("encode_negative", 0, "conditioning"),
        Position::new("sampler", 0, "negative"),
    )?;
    p.link(
        Position::new("empty_latent", 0, "latent"),
        Position::new("sampler", 0, "latent"),
    )?;
    p.link(
        Position::new("checkpoint", 0, "vae"),
        Position::new("vae_decode", 0, "vae"),
    )?;
    p.link(
        Position::new("sampler", 0, "latent"),
        Position::new("vae_decode", 0, "latent"),
    )?;
    p.link(
        Position::new("vae_decode", 0, "image"),
        Position::new("save_image", 0, "image"),
    )?;

    p.attach(extensions::lora(
        "lora",
        Position::new("checkpoint", 0, "model"),
        Position::new("checkpoint", 0, "clip"),
    )?)?;
    p.attach(extensions::upscale(
        "upscale",
        Position::new("vae_decode", 0, "image"),
    )?)?;
    Ok(p)
}

/// Same graph with decode and save folded into one composite. The composite
/// is opaque to change detection, so no upscale extension here; it trades
/// the splice point for a shorter schedule.
pub fn text_to_image_compact() -> Result<Pipeline> {
    let mut p = Pipeline::new(TEXT_TO_IMAGE_COMPACT);
    p.register(ops::checkpoint::node("checkpoint"))?;
    p.register(
        ops::clip_encode::node("encode_positive").map_input_name("text", "positive_prompt"),
    )?;
    p.register(
        ops::clip_encode::node("encode_negative").map_input_name("text", "negative_prompt"),
    )?;
    p.register(ops::empty_latent::node("empty_latent"))?;
    p.register(ops::sampler::node("sampler"))?;

    let mut finish = CompositeBuilder::new();
    let decode = finish.child(ops::vae_decode::node("vae_decode"));
    let save = finish.child(ops::save_image::node("save_image"));
    finish.link(decode, "image", save, "image");
    finish.expose_input("vae", decode, "vae");
    finish.expose_input("latent", decode, "latent");
    finish.expose_output("image", save, "image");
    finish.expose_output("filename", save, "filename");
    p.register(finish.build("finish")?)?;

    p.link(
        Position::new("checkpoint", 0, "clip"),
        Position::new("encode_positive", 0, "clip"),
    )?;
    p.link(
        Position::new("checkpoint", 0, "clip"),
        Position::new("encode_negative", 0, "clip"),
    )?;
    p.link(
        Position::new("checkpoint", 0, "model"),
        Position::new("sampler", 0, "model"),
    )?;
    p.link(
        Position::new("encode_positive", 0, "conditioning"),
        Position::new("sampler", 0, "positive"),
    )?;
    p.link(
        Position::new("encode_negative", 0, "conditioning"),
        Position::new("sampler", 0, "negative"),
    )?;
    p.link(
        Position::new("empty_latent", 0, "latent"),
        Position::new("sampler", 0, "latent"),
    )?;
    p.link(
        Position::new("checkpoint", 0, "vae"),
        Position::new("finish", 0, "vae"),
    )?;
    p.link(
        Position::new("sampler", 0, "latent"),
        Position::new("finish", 0, "latent"),
    )?;

    p.attach(extensions::lora(
        "lora",
        Position::new("checkpoint", 0, "model"),
        Position::new("checkpoint", 0, "clip"),
    )?)?;
    Ok(p)
}

/// Registry holding every stock pipeline.
pub fn registry() -> PipelineRegistry {
    let registry = PipelineRegistry::new();
    registry.register(TEXT_TO_IMAGE, text_to_image);
    registry.register(TEXT_TO_IMAGE_COMPACT, text_to_image_compact);
    registry
}

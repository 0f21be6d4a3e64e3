//! Stock operators, one per file.

pub mod checkpoint;
pub mod clip_encode;
pub mod empty_latent;
pub mod sampler;
pub mod save_image;
pub mod vae_decode;

use pipeline_engine::{ComputeContext, EngineError, Position, Result, Value, ValueMap};

pub(crate) fn require<'a>(
    inputs: &'a ValueMap,
    ctx: &ComputeContext,
    key: &str,
) -> Result<&'a Value> {
    inputs
        .get(key)
        .ok_or_else(|| EngineError::MissingInput(Position::new(&ctx.node, ctx.index, key)))
}

pub(crate) fn require_str<'a>(
    inputs: &'a ValueMap,
    ctx: &ComputeContext,
    key: &str,
) -> Result<&'a str> {
    require(inputs, ctx, key)?
        .as_str()
        .ok_or_else(|| EngineError::MissingInput(Position::new(&ctx.node, ctx.index, key)))
}

pub(crate) fn require_i64(inputs: &ValueMap, ctx: &ComputeContext, key: &str) -> Result<i64> {
    require(inputs, ctx, key)?
        .as_i64()
        .ok_or_else(|| EngineError::MissingInput(Position::new(&ctx.node, ctx.index, key)))
}

pub(crate) fn require_f64(inputs: &ValueMap, ctx: &ComputeContext, key: &str) -> Result<f64> {
    require(inputs, ctx, key)?
        .as_f64()
        .ok_or_else(|| EngineError::MissingInput(Position::new(&ctx.node, ctx.index, key)))
}

//! The denoising sampler, the one long-running step in a generation.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline_engine::{
    Compute, ComputeContext, DataType, InputSlot, Node, OutputSlot, Result, ValueMap, Widget,
};

use crate::backend;
use crate::ops::{require, require_f64, require_i64, require_str};

pub const IN_MODEL: &str = "model";
pub const IN_POSITIVE: &str = "positive";
pub const IN_NEGATIVE: &str = "negative";
pub const IN_LATENT: &str = "latent";
pub const PARAM_SEED: &str = "seed";
pub const PARAM_STEPS: &str = "steps";
pub const PARAM_CFG: &str = "cfg";
pub const PARAM_SAMPLER: &str = "sampler_name";
pub const OUT_LATENT: &str = "latent";

pub const SAMPLERS: &[&str] = &["euler", "euler_ancestral", "ddim", "dpmpp_2m"];

struct Sample;

#[async_trait]
impl Compute for Sample {
    async fn run(&self, inputs: ValueMap, ctx: &ComputeContext) -> Result<ValueMap> {
        let model = require(&inputs, ctx, IN_MODEL)?;
        let positive = require(&inputs, ctx, IN_POSITIVE)?;
        let negative = require(&inputs, ctx, IN_NEGATIVE)?;
        let latent = require(&inputs, ctx, IN_LATENT)?;
        let seed = require_i64(&inputs, ctx, PARAM_SEED)?;
        let steps = require_i64(&inputs, ctx, PARAM_STEPS)?;
        let cfg = require_f64(&inputs, ctx, PARAM_CFG)?;
        let sampler_name = require_str(&inputs, ctx, PARAM_SAMPLER)?;

        let total = steps.max(1) as u32;
        for step in 1..=total {
            ctx.progress(step, total);
            tokio::task::yield_now().await;
        }

        let mut out = ValueMap::new();
        out.insert(
            OUT_LATENT.to_string(),
            backend::denoise(
                model,
                positive,
                negative,
                latent,
                seed,
                steps,
                cfg,
                sampler_name,
            ),
        );
        Ok(out)
    }
}

pub fn node(name: impl Into<String>) -> Node {
    Node::operator(name, Arc::new(Sample))
        .input(InputSlot::new(IN_MODEL, DataType::MODEL))
        .input(InputSlot::new(IN_POSITIVE, DataType::CONDITIONING))
        .input(InputSlot::new(IN_NEGATIVE, DataType::CONDITIONING))
        .input(InputSlot::new(IN_LATENT, DataType::LATENT))
        .output(OutputSlot::new(OUT_LATENT, DataType::LATENT))
        .widget(Widget::seed(PARAM_SEED, 0).display("Seed"))
        .widget(Widget::int(PARAM_STEPS, 20, 1, 150, 1).display("Steps"))
        .widget(Widget::float(PARAM_CFG, 7.0, 0.0, 30.0).display("CFG scale"))
        .widget(
            Widget::combo(
                PARAM_SAMPLER,
                SAMPLERS.iter().map(|s| s.to_string()).collect(),
                0,
            )
            .display("Sampler"),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline_engine::{Event, EventSink, VecEventSink};
    use serde_json::json;
    use uuid::Uuid;

    fn sampler_inputs(seed: i64) -> ValueMap {
        let clip = backend::load_clip("sd_v1-5.safetensors");
        let mut inputs = ValueMap::new();
        inputs.insert(
            IN_MODEL.to_string(),
            backend::load_model("sd_v1-5.safetensors"),
        );
        inputs.insert(IN_POSITIVE.to_string(), backend::encode(&clip, "a cat"));
        inputs.insert(IN_NEGATIVE.to_string(), backend::encode(&clip, "blurry"));
        inputs.insert(IN_LATENT.to_string(), backend::empty_latent(512, 512));
        inputs.insert(PARAM_SEED.to_string(), json!(seed));
        inputs.insert(PARAM_STEPS.to_string(), json!(4));
        inputs.insert(PARAM_CFG.to_string(), json!(7.0));
        inputs.insert(PARAM_SAMPLER.to_string(), json!("euler"));
        inputs
    }

    #[tokio::test]
    async fn test_emits_progress_per_step() {
        let sink = Arc::new(VecEventSink::new());
        let ctx = ComputeContext::new(
            Uuid::new_v4(),
            "sampler",
            0,
            Arc::clone(&sink) as Arc<dyn EventSink>,
        );
        Sample.run(sampler_inputs(1), &ctx).await.unwrap();

        let ticks: Vec<u32> = sink
            .snapshot()
            .iter()
            .filter_map(|e| match e {
                Event::NodeProgress { step, .. } => Some(*step),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_seed_changes_the_latent() {
        let ctx = ComputeContext::detached("sampler");
        let a = Sample.run(sampler_inputs(1), &ctx).await.unwrap();
        let b = Sample.run(sampler_inputs(2), &ctx).await.unwrap();
        assert_ne!(a[OUT_LATENT]["content"], b[OUT_LATENT]["content"]);
    }
}

//! Deterministic stand-in for a generation backend.
//!
//! Every artifact is a small JSON value describing how it was produced, so
//! the same inputs always yield the same outputs and tests can assert on
//! structure. A real backend would hold tensors behind these values; the
//! engine never looks inside either way.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde_json::{json, Value};

/// Short stable digest of any value, used where a real backend would
/// produce pixel or tensor data.
pub fn fingerprint(value: &Value) -> String {
    let mut hasher = DefaultHasher::new();
    value.to_string().hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

pub fn load_model(checkpoint: &str) -> Value {
    json!({ "kind": "model", "checkpoint": checkpoint, "loras": [] })
}

pub fn load_clip(checkpoint: &str) -> Value {
    json!({ "kind": "clip", "checkpoint": checkpoint, "loras": [] })
}

pub fn load_vae(checkpoint: &str) -> Value {
    json!({ "kind": "vae", "checkpoint": checkpoint })
}

/// Record a LoRA application on a model or clip by appending to its
/// `loras` list, so chained instances are visible in the artifact.
pub fn apply_lora(mut carrier: Value, lora_name: &str, strength: f64) -> Value {
    if let Some(loras) = carrier.get_mut("loras").and_then(Value::as_array_mut) {
        loras.push(json!({ "name": lora_name, "strength": strength }));
    }
    carrier
}

pub fn encode(clip: &Value, text: &str) -> Value {
    json!({ "kind": "conditioning", "clip": fingerprint(clip), "text": text })
}

pub fn empty_latent(width: i64, height: i64) -> Value {
    json!({ "kind": "latent", "width": width, "height": height, "content": "empty" })
}

#[allow(clippy::too_many_arguments)]
pub fn denoise(
    model: &Value,
    positive: &Value,
    negative: &Value,
    latent: &Value,
    seed: i64,
    steps: i64,
    cfg: f64,
    sampler_name: &str,
) -> Value {
    let content = fingerprint(&json!({
        "model": model,
        "positive": positive,
        "negative": negative,
        "latent": latent,
        "seed": seed,
        "steps": steps,
        "cfg": cfg,
        "sampler_name": sampler_name,
    }));
    json!({
        "kind": "latent",
        "width": latent["width"],
        "height": latent["height"],
        "content": content,
    })
}

pub fn decode(vae: &Value, latent: &Value) -> Value {
    json!({
        "kind": "image",
        "width": latent["width"],
        "height": latent["height"],
        "content": fingerprint(&json!({ "vae": vae, "latent": latent })),
    })
}

pub fn upscale(image: &Value, scale: f64, method: &str) -> Value {
    let width = image["width"].as_i64().unwrap_or(0);
    let height = image["height"].as_i64().unwrap_or(0);
    json!({
        "kind": "image",
        "width": (width as f64 * scale) as i64,
        "height": (height as f64 * scale) as i64,
        "content": fingerprint(&json!({ "image": image, "scale": scale, "method": method })),
    })
}

pub fn image_filename(prefix: &str, image: &Value) -> String {
    let content = image["content"].as_str().unwrap_or("empty");
    format!("{prefix}_{content}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_stable_and_input_sensitive() {
        let a = json!({ "x": 1 });
        assert_eq!(fingerprint(&a), fingerprint(&a));
        assert_ne!(fingerprint(&a), fingerprint(&json!({ "x": 2 })));
    }

    #[test]
    fn test_apply_lora_chains() {
        let model = load_model("sd_v1-5.safetensors");
        let once = apply_lora(model, "detail", 0.8);
        let twice = apply_lora(once, "style", 1.0);
        let loras = twice["loras"].as_array().unwrap();
        assert_eq!(loras.len(), 2);
        assert_eq!(loras[0]["name"], "detail");
        assert_eq!(loras[1]["name"], "style");
    }

    #[test]
    fn test_denoise_depends_on_seed() {
        let model = load_model("sd_v1-5.safetensors");
        let cond = encode(&load_clip("sd_v1-5.safetensors"), "a cat");
        let latent = empty_latent(512, 512);
        let a = denoise(&model, &cond, &cond, &latent, 1, 20, 7.0, "euler");
        let b = denoise(&model, &cond, &cond, &latent, 2, 20, 7.0, "euler");
        assert_ne!(a["content"], b["content"]);
        assert_eq!(a["width"], json!(512));
    }
}

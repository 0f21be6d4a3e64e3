//! Stock node library for `pipeline-engine`.
//!
//! Operators produce deterministic JSON artifacts from [`backend`], so the
//! crate doubles as the engine's end-to-end test bed: identical inputs
//! yield identical artifacts, which is exactly what output caching needs.

pub mod backend;
pub mod extensions;
pub mod ops;
pub mod pipelines;

pub use pipelines::{registry, text_to_image, text_to_image_compact};

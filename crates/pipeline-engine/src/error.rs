//! Error types shared across the engine.

use thiserror::Error;

use crate::types::Position;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A link connects slots whose data type tags differ.
    #[error("type mismatch linking {from} ({from_type}) -> {to} ({to_type})")]
    TypeMismatch {
        from: Position,
        from_type: String,
        to: Position,
        to_type: String,
    },

    /// The graph could not be assembled (unknown node, unknown slot,
    /// duplicate registration, bad composite exposure and the like).
    #[error("graph build error: {0}")]
    GraphBuild(String),

    /// One or more user inputs failed widget validation. Every violation
    /// for the whole prompt is collected before this is returned.
    #[error("input validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// An extension could not be instantiated at the requested count.
    #[error("extension shape error: {0}")]
    ExtensionShape(String),

    /// A required input slot had neither a link nor a widget value at
    /// execution time.
    #[error("missing input {0}")]
    MissingInput(Position),

    /// A node's compute function returned an error.
    #[error("node '{node}' failed: {message}")]
    ExecutionFailed { node: String, message: String },

    /// The task was canceled between node executions.
    #[error("task canceled")]
    Canceled,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

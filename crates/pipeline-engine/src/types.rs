//! Core value and addressing types for pipeline graphs.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

/// Runtime value flowing through a slot.
///
/// Values are plain JSON so that change detection can rely on structural
/// equality and so that prompts arriving from a transport layer need no
/// further conversion.
pub type Value = serde_json::Value;

/// A named bag of values, keyed by slot or widget parameter name.
pub type ValueMap = HashMap<String, Value>;

/// The data type tag of a slot.
///
/// Tags compare byte-for-byte; two slots may be linked only when their tags
/// are identical. The well-known tags below match what the stock operators
/// use, but downstream crates are free to mint their own with
/// [`DataType::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct DataType(&'static str);

impl DataType {
    pub const MODEL: DataType = DataType("MODEL");
    pub const CLIP: DataType = DataType("CLIP");
    pub const VAE: DataType = DataType("VAE");
    pub const CONDITIONING: DataType = DataType("CONDITIONING");
    pub const LATENT: DataType = DataType("LATENT");
    pub const IMAGE: DataType = DataType("IMAGE");
    pub const STRING: DataType = DataType("STRING");
    pub const INT: DataType = DataType("INT");
    pub const FLOAT: DataType = DataType("FLOAT");
    pub const BOOLEAN: DataType = DataType("BOOLEAN");

    /// Create a custom tag.
    pub const fn new(tag: &'static str) -> Self {
        DataType(tag)
    }

    pub const fn as_str(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Stable global address of a slot: `(node_name, invocation_index, slot_name)`.
///
/// `index` disambiguates repeated invocations of the same node name, which
/// happens for extension instances and for children inside a composite.
/// Positions are what the output cache and the change detector key on, so
/// they stay valid across runs as long as the graph shape is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Position {
    pub node: String,
    pub index: u32,
    pub slot: String,
}

impl Position {
    pub fn new(node: impl Into<String>, index: u32, slot: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            index,
            slot: slot.into(),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}", self.node, self.index, self.slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_equality_is_byte_for_byte() {
        assert_eq!(DataType::MODEL, DataType::new("MODEL"));
        assert_ne!(DataType::MODEL, DataType::CLIP);
        assert_ne!(DataType::STRING, DataType::new("string"));
    }

    #[test]
    fn test_position_display() {
        let pos = Position::new("checkpoint", 0, "model");
        assert_eq!(pos.to_string(), "checkpoint[0].model");
    }
}

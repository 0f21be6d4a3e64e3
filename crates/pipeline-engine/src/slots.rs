//! Typed input and output slots.

use serde::Serialize;

use crate::types::DataType;

/// An input port on a node.
///
/// At execution time an input is fed either by a link from another node's
/// output or, failing that, by a user-supplied widget value looked up under
/// [`InputSlot::user_name`].
#[derive(Debug, Clone, Serialize)]
pub struct InputSlot {
    pub name: String,
    /// Rename visible to user input, for when two instances of the same
    /// slot name coexist in one pipeline (e.g. a positive and a negative
    /// prompt both called `text`). `None` means the slot name is used as-is.
    pub mapped_name: Option<String>,
    pub data_type: DataType,
    pub optional: bool,
}

impl InputSlot {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            mapped_name: None,
            data_type,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn mapped(mut self, mapped_name: impl Into<String>) -> Self {
        self.mapped_name = Some(mapped_name.into());
        self
    }

    /// The key under which user input for this slot arrives.
    pub fn user_name(&self) -> &str {
        self.mapped_name.as_deref().unwrap_or(&self.name)
    }
}

/// An output port on a node.
#[derive(Debug, Clone, Serialize)]
pub struct OutputSlot {
    pub name: String,
    pub data_type: DataType,
}

impl OutputSlot {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_name_prefers_mapped_name() {
        let plain = InputSlot::new("text", DataType::STRING);
        assert_eq!(plain.user_name(), "text");

        let mapped = InputSlot::new("text", DataType::STRING).mapped("negative_prompt");
        assert_eq!(mapped.user_name(), "negative_prompt");
        assert_eq!(mapped.name, "text");
    }
}

//! Widget declarations and user input validation.
//!
//! A widget describes the user-facing parameter behind an input slot: its
//! default, its value kind and the bounds a submitted value must satisfy.
//! Validation first coerces obviously-convertible values (a `"3"` where an
//! integer is expected) and then checks bounds, reporting every violation
//! rather than stopping at the first.

use serde::Serialize;
use serde_json::json;

use crate::types::Value;

#[derive(Debug, Clone, Serialize)]
pub struct Widget {
    /// Name of the input slot this widget feeds.
    pub param_name: String,
    /// Human-readable label for frontends.
    pub display_name: String,
    pub default: Value,
    pub optional: bool,
    pub kind: WidgetKind,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WidgetKind {
    Text,
    Int { min: i64, max: i64, step: i64 },
    Float { min: f64, max: f64 },
    Combo { options: Vec<String> },
    Seed,
    Toggle,
}

impl Widget {
    pub fn text(param_name: impl Into<String>, default: impl Into<String>) -> Self {
        let param_name = param_name.into();
        Self {
            display_name: param_name.clone(),
            param_name,
            default: json!(default.into()),
            optional: false,
            kind: WidgetKind::Text,
        }
    }

    pub fn int(param_name: impl Into<String>, default: i64, min: i64, max: i64, step: i64) -> Self {
        let param_name = param_name.into();
        Self {
            display_name: param_name.clone(),
            param_name,
            default: json!(default),
            optional: false,
            kind: WidgetKind::Int { min, max, step },
        }
    }

    pub fn float(param_name: impl Into<String>, default: f64, min: f64, max: f64) -> Self {
        let param_name = param_name.into();
        Self {
            display_name: param_name.clone(),
            param_name,
            default: json!(default),
            optional: false,
            kind: WidgetKind::Float { min, max },
        }
    }

    pub fn combo(param_name: impl Into<String>, options: Vec<String>, default: usize) -> Self {
        let param_name = param_name.into();
        let default_value = json!(options.get(default).cloned().unwrap_or_default());
        Self {
            display_name: param_name.clone(),
            param_name,
            default: default_value,
            optional: false,
            kind: WidgetKind::Combo { options },
        }
    }

    pub fn seed(param_name: impl Into<String>, default: i64) -> Self {
        let param_name = param_name.into();
        Self {
            display_name: param_name.clone(),
            param_name,
            default: json!(default),
            optional: false,
            kind: WidgetKind::Seed,
        }
    }

    pub fn toggle(param_name: impl Into<String>, default: bool) -> Self {
        let param_name = param_name.into();
        Self {
            display_name: param_name.clone(),
            param_name,
            default: json!(default),
            optional: false,
            kind: WidgetKind::Toggle,
        }
    }

    pub fn display(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Coerce `value` to this widget's kind and check it against the
    /// widget's bounds. On success returns the (possibly coerced) value;
    /// on failure returns every violation found, each prefixed with the
    /// parameter name.
    pub fn validate(&self, value: &Value) -> std::result::Result<Value, Vec<String>> {
        let mut errors = Vec::new();
        let coerced = match &self.kind {
            WidgetKind::Text => match coerce_string(value) {
                Some(s) => json!(s),
                None => {
                    errors.push(format!("{}: expected text", self.param_name));
                    Value::Null
                }
            },
            WidgetKind::Int { min, max, .. } => match coerce_int(value) {
                Some(n) => {
                    if n < *min {
                        errors.push(format!("{}: {} below minimum {}", self.param_name, n, min));
                    }
                    if n > *max {
                        errors.push(format!("{}: {} above maximum {}", self.param_name, n, max));
                    }
                    json!(n)
                }
                None => {
                    errors.push(format!("{}: expected an integer", self.param_name));
                    Value::Null
                }
            },
            WidgetKind::Float { min, max } => match coerce_float(value) {
                Some(x) => {
                    if x < *min {
                        errors.push(format!("{}: {} below minimum {}", self.param_name, x, min));
                    }
                    if x > *max {
                        errors.push(format!("{}: {} above maximum {}", self.param_name, x, max));
                    }
                    json!(x)
                }
                None => {
                    errors.push(format!("{}: expected a number", self.param_name));
                    Value::Null
                }
            },
            WidgetKind::Combo { options } => match value.as_str() {
                Some(s) if options.iter().any(|o| o == s) => json!(s),
                Some(s) => {
                    errors.push(format!(
                        "{}: '{}' is not one of [{}]",
                        self.param_name,
                        s,
                        options.join(", ")
                    ));
                    Value::Null
                }
                None => {
                    errors.push(format!("{}: expected one of the listed options", self.param_name));
                    Value::Null
                }
            },
            WidgetKind::Seed => match coerce_int(value) {
                Some(n) if n >= 0 => json!(n),
                Some(n) => {
                    errors.push(format!("{}: seed {} must be non-negative", self.param_name, n));
                    Value::Null
                }
                None => {
                    errors.push(format!("{}: expected an integer seed", self.param_name));
                    Value::Null
                }
            },
            WidgetKind::Toggle => match coerce_bool(value) {
                Some(b) => json!(b),
                None => {
                    errors.push(format!("{}: expected true or false", self.param_name));
                    Value::Null
                }
            },
        };
        if errors.is_empty() {
            Ok(coerced)
        } else {
            Err(errors)
        }
    }
}

fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                // Accept floats that are exactly integral, e.g. 20.0 from a
                // frontend slider.
                n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)
            }
        }
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.as_str() {
            "true" | "True" | "1" => Some(true),
            "false" | "False" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_coerces_numeric_string() {
        let w = Widget::int("steps", 20, 1, 150, 1);
        assert_eq!(w.validate(&json!("30")).unwrap(), json!(30));
        assert_eq!(w.validate(&json!(20.0)).unwrap(), json!(20));
    }

    #[test]
    fn test_int_rejects_out_of_range() {
        let w = Widget::int("steps", 20, 1, 150, 1);
        let errs = w.validate(&json!(999)).unwrap_err();
        assert_eq!(errs.len(), 1);
        assert!(errs[0].contains("above maximum 150"));
    }

    #[test]
    fn test_combo_rejects_unknown_option() {
        let w = Widget::combo(
            "sampler_name",
            vec!["euler".to_string(), "ddim".to_string()],
            0,
        );
        assert!(w.validate(&json!("euler")).is_ok());
        let errs = w.validate(&json!("plms")).unwrap_err();
        assert!(errs[0].contains("'plms'"));
    }

    #[test]
    fn test_seed_must_be_non_negative() {
        let w = Widget::seed("seed", 0);
        assert!(w.validate(&json!(42)).is_ok());
        assert!(w.validate(&json!(-1)).is_err());
    }

    #[test]
    fn test_toggle_coerces_common_spellings() {
        let w = Widget::toggle("tiled", false);
        assert_eq!(w.validate(&json!("True")).unwrap(), json!(true));
        assert_eq!(w.validate(&json!(0)).unwrap(), json!(false));
        assert!(w.validate(&json!("maybe")).is_err());
    }

    #[test]
    fn test_float_bounds() {
        let w = Widget::float("cfg", 7.0, 0.0, 30.0);
        assert!(w.validate(&json!(7.5)).is_ok());
        let errs = w.validate(&json!(-1.0)).unwrap_err();
        assert!(errs[0].contains("below minimum"));
    }
}

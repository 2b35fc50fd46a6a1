//! Argument validation against a [`ToolSchema`]

use crate::schema::{ToolParameter, ToolSchema};
use serde_json::{Map, Value};
use tether_core::{TetherError, TetherResult};

/// A single rejected argument
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Check `arguments` against `schema` and fill in defaults.
///
/// Every parameter is checked; all problems are reported together. Arguments the
/// schema does not mention are passed through untouched.
pub fn validate_arguments(schema: &ToolSchema, arguments: Value) -> TetherResult<Map<String, Value>> {
    let mut arguments = match arguments {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            return Err(TetherError::invalid_input(format!(
                "arguments for '{}' must be an object, got {}",
                schema.name,
                kind_of(&other)
            )));
        }
    };

    let mut errors = Vec::new();
    for param in &schema.parameters {
        match arguments.get(&param.name) {
            None | Some(Value::Null) => {
                if let Some(default) = &param.default {
                    arguments.insert(param.name.clone(), default.clone());
                } else if param.required {
                    errors.push(FieldError::new(&param.name, "is required"));
                }
            }
            Some(value) => errors.extend(check_value(param, value)),
        }
    }

    match errors.len() {
        0 => Ok(arguments),
        1 => {
            let error = &errors[0];
            Err(TetherError::invalid_field(
                error.field.clone(),
                format!("{}: {}", error.field, error.message),
            ))
        }
        _ => {
            let joined = errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect::<Vec<_>>()
                .join("; ");
            Err(TetherError::invalid_input(joined))
        }
    }
}

fn check_value(param: &ToolParameter, value: &Value) -> Option<FieldError> {
    if !param.param_type.matches(value) {
        return Some(FieldError::new(
            &param.name,
            format!("expected {}, got {}", param.param_type.type_name(), kind_of(value)),
        ));
    }

    if let (Some(allowed), Some(text)) = (&param.enum_values, value.as_str()) {
        if !allowed.iter().any(|a| a == text) {
            return Some(FieldError::new(
                &param.name,
                format!("'{}' is not one of [{}]", text, allowed.join(", ")),
            ));
        }
    }

    if let Some(number) = value.as_f64() {
        if let Some(minimum) = param.minimum.filter(|min| number < *min) {
            return Some(FieldError::new(
                &param.name,
                format!("{} is below the minimum of {}", number, minimum),
            ));
        }
        if let Some(maximum) = param.maximum.filter(|max| number > *max) {
            return Some(FieldError::new(
                &param.name,
                format!("{} is above the maximum of {}", number, maximum),
            ));
        }
    }

    None
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

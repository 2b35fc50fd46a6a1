//! Tool parameter and schema types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tether_core::gateway::ToolDescriptor;

/// JSON-schema type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
}

impl ParamType {
    /// Check if a JSON value matches this type
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }
}

/// Parameter definition for a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    /// Parameter name
    pub name: String,
    /// Parameter description
    pub description: String,
    pub param_type: ParamType,
    /// Whether this parameter is required
    pub required: bool,
    /// Value filled in when the caller omits the parameter
    pub default: Option<Value>,
    /// Allowed values (strings only)
    pub enum_values: Option<Vec<String>>,
    /// Inclusive lower bound (numbers only)
    pub minimum: Option<f64>,
    /// Inclusive upper bound (numbers only)
    pub maximum: Option<f64>,
}

impl ToolParameter {
    fn new(name: impl Into<String>, description: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type,
            required: true,
            default: None,
            enum_values: None,
            minimum: None,
            maximum: None,
        }
    }

    /// Create a required string parameter
    pub fn string(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::String)
    }

    /// Create a required number parameter
    pub fn number(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::Number)
    }

    /// Create a required integer parameter
    pub fn integer(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::Integer)
    }

    /// Create a required boolean parameter
    pub fn boolean(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, ParamType::Boolean)
    }

    /// Create a required string parameter restricted to `values`
    pub fn enumeration<I, S>(name: impl Into<String>, description: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut param = Self::string(name, description);
        param.enum_values = Some(values.into_iter().map(Into::into).collect());
        param
    }

    /// Make parameter optional
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Set default value; a defaulted parameter is optional
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self.required = false;
        self
    }

    /// Inclusive numeric bounds
    pub fn with_range(mut self, minimum: f64, maximum: f64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    fn to_json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".to_string(), self.param_type.type_name().into());
        schema.insert("description".to_string(), self.description.clone().into());
        if let Some(default) = &self.default {
            schema.insert("default".to_string(), default.clone());
        }
        if let Some(values) = &self.enum_values {
            schema.insert("enum".to_string(), json!(values));
        }
        if let Some(minimum) = self.minimum {
            schema.insert("minimum".to_string(), bound(minimum, self.param_type));
        }
        if let Some(maximum) = self.maximum {
            schema.insert("maximum".to_string(), bound(maximum, self.param_type));
        }
        Value::Object(schema)
    }
}

// Integer parameters advertise integer bounds
fn bound(value: f64, param_type: ParamType) -> Value {
    if param_type == ParamType::Integer && value.fract() == 0.0 {
        json!(value as i64)
    } else {
        json!(value)
    }
}

/// Input contract of one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Vec<ToolParameter>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    /// JSON schema of the arguments object
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.parameters {
            if param.required {
                required.push(param.name.clone());
            }
            properties.insert(param.name.clone(), param.to_json_schema());
        }

        let mut schema = json!({
            "type": "object",
            "properties": properties,
        });
        if !required.is_empty() {
            schema["required"] = json!(required);
        }
        schema
    }

    /// Descriptor as listed by `tools/list`
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor::new(self.name.clone(), self.description.clone(), self.input_schema())
    }
}

//! The Tool contract (§3, §6) and a registry of registered tools. Grounded
//! on the teacher's `tools.rs` (`ToolFn`, `ToolSchema`, `ToolRegistry`),
//! generalized with async invocation, dedupe control, and the two-shaped
//! validation-failure taxonomy named in §4.4.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::state::ParamMap;

/// One of the two validation-failure shapes distinguished in §4.4.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// The result of validating `params` against a tool's parameter schema.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationFailure {
    pub missing_required: Vec<String>,
    pub field_errors: Vec<FieldError>,
}

impl ValidationFailure {
    pub fn is_empty(&self) -> bool {
        self.missing_required.is_empty() && self.field_errors.is_empty()
    }

    pub fn to_output(&self) -> serde_json::Value {
        serde_json::json!({
            "missing_required": self.missing_required,
            "field_errors": self.field_errors,
        })
    }
}

/// A minimal JSON-Schema-shaped parameter schema: `{"type": "object",
/// "properties": {...}, "required": [...]}`. Tools supply this as plain
/// `serde_json::Value` (matching the teacher's `ToolSchema::input_schema`);
/// the executor interprets `required` and each property's declared `type`
/// to produce the two failure shapes above. This is intentionally a subset
/// of JSON-Schema — full schema compilation is out of scope for a tool
/// catalog this small, and no example in the corpus reaches for a schema
/// validation crate for this purpose either.
pub fn validate_params(schema: &serde_json::Value, params: &ParamMap) -> ValidationFailure {
    let mut failure = ValidationFailure::default();

    let required = schema
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect::<Vec<_>>())
        .unwrap_or_default();

    for field in &required {
        if !params.contains_key(*field) {
            failure.missing_required.push(field.to_string());
        }
    }

    let Some(properties) = schema.get("properties").and_then(|v| v.as_object()) else {
        return failure;
    };

    for (field, value) in params {
        let Some(prop_schema) = properties.get(field) else {
            continue;
        };
        let Some(expected_type) = prop_schema.get("type").and_then(|v| v.as_str()) else {
            continue;
        };
        if !matches_type(expected_type, value) {
            failure.field_errors.push(FieldError {
                field: field.clone(),
                message: format!("expected type '{expected_type}', got {}", type_name(value)),
            });
        }
    }

    failure
}

fn matches_type(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true, // unknown schema type — don't block on it
    }
}

fn type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// The external tool contract (§3, §6). Implementations are supplied by the
/// caller; the core only ever invokes tools through this trait.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    async fn invoke(&self, params: &ParamMap) -> Result<serde_json::Value, String>;

    /// Optional JSON-Schema-shaped parameter schema, see `validate_params`.
    fn parameter_schema(&self) -> Option<serde_json::Value> {
        None
    }

    fn description(&self) -> Option<&str> {
        None
    }

    /// Whether a successful result may be reused from the dedupe cache
    /// (§3, default true).
    fn allow_dedupe(&self) -> bool {
        true
    }

    /// Dedupe TTL override; `None` means "use the registry/config default".
    fn custom_ttl(&self) -> Option<Duration> {
        None
    }
}

/// A tool built from a plain async closure — the ergonomic equivalent of the
/// teacher's `ToolFn` for callers who don't want to implement the `Tool`
/// trait by hand.
pub struct FnTool<F> {
    name: String,
    description: Option<String>,
    schema: Option<serde_json::Value>,
    allow_dedupe: bool,
    custom_ttl: Option<Duration>,
    func: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(ParamMap) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, String>> + Send,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: None,
            schema: None,
            allow_dedupe: true,
            custom_ttl: None,
            func,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn schema(mut self, schema: serde_json::Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn no_dedupe(mut self) -> Self {
        self.allow_dedupe = false;
        self
    }

    pub fn custom_ttl(mut self, ttl: Duration) -> Self {
        self.custom_ttl = Some(ttl);
        self
    }
}

#[async_trait]
impl<F, Fut> Tool for FnTool<F>
where
    F: Fn(ParamMap) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, String>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, params: &ParamMap) -> Result<serde_json::Value, String> {
        (self.func)(params.clone()).await
    }

    fn parameter_schema(&self) -> Option<serde_json::Value> {
        self.schema.clone()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn allow_dedupe(&self) -> bool {
        self.allow_dedupe
    }

    fn custom_ttl(&self) -> Option<Duration> {
        self.custom_ttl
    }
}

/// Registry of tools keyed by name (teacher: `ToolRegistry`, generalized to
/// hold `Arc<dyn Tool>` for async/shared access across concurrent agents).
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// `(name, description, schema)` triples used by the Message Builder's
    /// tool catalog (§4.2) and by the LLM Communicator's function specs
    /// (§4.3).
    pub fn catalog(&self) -> Vec<(String, Option<String>, Option<serde_json::Value>)> {
        let mut entries: Vec<_> = self
            .tools
            .values()
            .map(|t| {
                (
                    t.name().to_string(),
                    t.description().map(|s| s.to_string()),
                    t.parameter_schema(),
                )
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_required_field_detected() {
        let schema = json!({
            "type": "object",
            "properties": { "a": {"type": "number"}, "b": {"type": "number"} },
            "required": ["a", "b"]
        });
        let mut params = ParamMap::new();
        params.insert("a".to_string(), json!(1));
        let failure = validate_params(&schema, &params);
        assert_eq!(failure.missing_required, vec!["b".to_string()]);
        assert!(failure.field_errors.is_empty());
    }

    #[test]
    fn wrong_type_produces_field_error() {
        let schema = json!({
            "type": "object",
            "properties": { "a": {"type": "number"} },
            "required": ["a"]
        });
        let mut params = ParamMap::new();
        params.insert("a".to_string(), json!("not a number"));
        let failure = validate_params(&schema, &params);
        assert!(failure.missing_required.is_empty());
        assert_eq!(failure.field_errors.len(), 1);
        assert_eq!(failure.field_errors[0].field, "a");
    }

    #[test]
    fn valid_params_pass() {
        let schema = json!({
            "type": "object",
            "properties": { "a": {"type": "number"}, "b": {"type": "number"} },
            "required": ["a", "b"]
        });
        let mut params = ParamMap::new();
        params.insert("a".to_string(), json!(5));
        params.insert("b".to_string(), json!(3));
        assert!(validate_params(&schema, &params).is_empty());
    }
}

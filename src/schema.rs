//! Tool argument validation against a JSON-Schema subset.
//!
//! The subset covers what tool schemas actually use: property types,
//! `required`, string length/pattern bounds, `enum`, numeric bounds, nested
//! `properties`, `items`, and `additionalProperties`. Validation never
//! throws: it aggregates violations into a result, and unknown tools pass
//! with a warning so a missing registration cannot break dispatch.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Property types understood by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Null,
    #[default]
    Any,
}

impl SchemaType {
    fn matches(self, value: &Value) -> bool {
        match self {
            SchemaType::String => value.is_string(),
            SchemaType::Number => value.is_number(),
            SchemaType::Boolean => value.is_boolean(),
            SchemaType::Object => value.is_object(),
            SchemaType::Array => value.is_array(),
            SchemaType::Null => value.is_null(),
            SchemaType::Any => true,
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Schema for a single property.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<String>,
    #[serde(rename = "enum")]
    pub enum_values: Option<Vec<Value>>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub properties: Option<BTreeMap<String, PropertySchema>>,
    pub required: Option<Vec<String>>,
    pub items: Option<Box<PropertySchema>>,
    pub additional_properties: Option<bool>,
}

/// Schema for a tool's argument object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolSchema {
    pub properties: BTreeMap<String, PropertySchema>,
    pub required: Vec<String>,
    pub additional_properties: bool,
}

impl Default for ToolSchema {
    fn default() -> Self {
        ToolSchema {
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }
}

/// One constraint failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaViolation {
    pub tool: String,
    /// Dotted path to the offending value, `$` for the root.
    pub path: String,
    pub expected: String,
    pub actual: String,
}

/// Aggregated validation outcome.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<SchemaViolation>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn passed() -> Self {
        ValidationResult {
            valid: true,
            ..ValidationResult::default()
        }
    }
}

/// Maps tool names to their argument schemas.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, ToolSchema>,
}

impl SchemaRegistry {
    /// Empty registry: every tool passes with a warning.
    pub fn empty() -> Self {
        SchemaRegistry::default()
    }

    /// Registry pre-loaded with the built-in tool schemas.
    pub fn with_builtins() -> Self {
        let mut registry = SchemaRegistry::default();
        registry.register("bash", bash_schema());
        registry.register("fileRead", file_read_schema());
        registry.register("fileWrite", file_write_schema());
        registry.register("browserNavigate", browser_navigate_schema());
        registry
    }

    pub fn register(&mut self, tool: &str, schema: ToolSchema) {
        self.schemas.insert(tool.to_string(), schema);
    }

    pub fn schema_for(&self, tool: &str) -> Option<&ToolSchema> {
        self.schemas.get(tool)
    }

    /// Validate tool arguments. Null arguments validate as an empty object.
    pub fn validate(&self, tool: &str, args: &Value) -> ValidationResult {
        let Some(schema) = self.schemas.get(tool) else {
            let mut result = ValidationResult::passed();
            result
                .warnings
                .push(format!("no schema registered for tool '{tool}'"));
            return result;
        };

        let empty = Value::Object(serde_json::Map::new());
        let args = if args.is_null() { &empty } else { args };

        let mut result = ValidationResult::passed();
        let Some(map) = args.as_object() else {
            result.valid = false;
            result.violations.push(SchemaViolation {
                tool: tool.to_string(),
                path: "$".to_string(),
                expected: "object".to_string(),
                actual: type_name(args).to_string(),
            });
            return result;
        };

        for name in &schema.required {
            if !map.contains_key(name) {
                result.violations.push(SchemaViolation {
                    tool: tool.to_string(),
                    path: format!("$.{name}"),
                    expected: "required property".to_string(),
                    actual: "missing".to_string(),
                });
            }
        }

        for (name, value) in map {
            match schema.properties.get(name) {
                Some(prop) => {
                    validate_property(tool, &format!("$.{name}"), prop, value, &mut result)
                }
                None => {
                    if schema.additional_properties {
                        result
                            .warnings
                            .push(format!("unexpected property '{name}' passed through"));
                    } else {
                        result.violations.push(SchemaViolation {
                            tool: tool.to_string(),
                            path: format!("$.{name}"),
                            expected: "no additional properties".to_string(),
                            actual: "present".to_string(),
                        });
                    }
                }
            }
        }

        result.valid = result.violations.is_empty();
        result
    }
}

fn validate_property(
    tool: &str,
    path: &str,
    prop: &PropertySchema,
    value: &Value,
    result: &mut ValidationResult,
) {
    if !prop.schema_type.matches(value) {
        result.violations.push(SchemaViolation {
            tool: tool.to_string(),
            path: path.to_string(),
            expected: format!("{:?}", prop.schema_type).to_lowercase(),
            actual: type_name(value).to_string(),
        });
        return;
    }

    if let Some(expected) = &prop.enum_values {
        if !expected.contains(value) {
            result.violations.push(SchemaViolation {
                tool: tool.to_string(),
                path: path.to_string(),
                expected: format!("one of {expected:?}"),
                actual: value.to_string(),
            });
            return;
        }
    }

    if let Some(s) = value.as_str() {
        let len = s.chars().count();
        if let Some(min) = prop.min_length {
            if len < min {
                result.violations.push(SchemaViolation {
                    tool: tool.to_string(),
                    path: path.to_string(),
                    expected: format!("minLength {min}"),
                    actual: format!("length {len}"),
                });
            }
        }
        if let Some(max) = prop.max_length {
            if len > max {
                result.violations.push(SchemaViolation {
                    tool: tool.to_string(),
                    path: path.to_string(),
                    expected: format!("maxLength {max}"),
                    actual: format!("length {len}"),
                });
            }
        }
        if let Some(pattern) = &prop.pattern {
            match Regex::new(pattern) {
                Ok(re) => {
                    if !re.is_match(s) {
                        result.violations.push(SchemaViolation {
                            tool: tool.to_string(),
                            path: path.to_string(),
                            expected: format!("pattern {pattern}"),
                            actual: "no match".to_string(),
                        });
                    }
                }
                Err(_) => result
                    .warnings
                    .push(format!("unparseable pattern at {path}: {pattern}")),
            }
        }
    }

    if let Some(n) = value.as_f64() {
        if let Some(min) = prop.minimum {
            if n < min {
                result.violations.push(SchemaViolation {
                    tool: tool.to_string(),
                    path: path.to_string(),
                    expected: format!("minimum {min}"),
                    actual: n.to_string(),
                });
            }
        }
        if let Some(max) = prop.maximum {
            if n > max {
                result.violations.push(SchemaViolation {
                    tool: tool.to_string(),
                    path: path.to_string(),
                    expected: format!("maximum {max}"),
                    actual: n.to_string(),
                });
            }
        }
    }

    if let (Some(obj), Some(props)) = (value.as_object(), &prop.properties) {
        if let Some(required) = &prop.required {
            for name in required {
                if !obj.contains_key(name) {
                    result.violations.push(SchemaViolation {
                        tool: tool.to_string(),
                        path: format!("{path}.{name}"),
                        expected: "required property".to_string(),
                        actual: "missing".to_string(),
                    });
                }
            }
        }
        for (name, nested) in obj {
            match props.get(name) {
                Some(p) => validate_property(tool, &format!("{path}.{name}"), p, nested, result),
                None => {
                    if prop.additional_properties == Some(false) {
                        result.violations.push(SchemaViolation {
                            tool: tool.to_string(),
                            path: format!("{path}.{name}"),
                            expected: "no additional properties".to_string(),
                            actual: "present".to_string(),
                        });
                    } else {
                        result
                            .warnings
                            .push(format!("unexpected property '{path}.{name}' passed through"));
                    }
                }
            }
        }
    }

    if let (Some(arr), Some(items)) = (value.as_array(), &prop.items) {
        for (i, item) in arr.iter().enumerate() {
            validate_property(tool, &format!("{path}[{i}]"), items, item, result);
        }
    }
}

fn string_prop(min: Option<usize>, max: Option<usize>) -> PropertySchema {
    PropertySchema {
        schema_type: SchemaType::String,
        min_length: min,
        max_length: max,
        ..PropertySchema::default()
    }
}

fn number_prop(min: Option<f64>, max: Option<f64>) -> PropertySchema {
    PropertySchema {
        schema_type: SchemaType::Number,
        minimum: min,
        maximum: max,
        ..PropertySchema::default()
    }
}

fn bash_schema() -> ToolSchema {
    let mut properties = BTreeMap::new();
    properties.insert("command".to_string(), string_prop(Some(1), Some(8192)));
    properties.insert("timeout_ms".to_string(), number_prop(Some(0.0), Some(600_000.0)));
    properties.insert("workdir".to_string(), string_prop(Some(1), None));
    ToolSchema {
        properties,
        required: vec!["command".to_string()],
        additional_properties: false,
    }
}

fn file_read_schema() -> ToolSchema {
    let mut properties = BTreeMap::new();
    properties.insert("path".to_string(), string_prop(Some(1), None));
    properties.insert("max_bytes".to_string(), number_prop(Some(1.0), None));
    ToolSchema {
        properties,
        required: vec!["path".to_string()],
        additional_properties: false,
    }
}

fn file_write_schema() -> ToolSchema {
    let mut properties = BTreeMap::new();
    properties.insert("path".to_string(), string_prop(Some(1), None));
    properties.insert("content".to_string(), string_prop(None, None));
    properties.insert(
        "append".to_string(),
        PropertySchema {
            schema_type: SchemaType::Boolean,
            ..PropertySchema::default()
        },
    );
    ToolSchema {
        properties,
        required: vec!["path".to_string(), "content".to_string()],
        additional_properties: false,
    }
}

fn browser_navigate_schema() -> ToolSchema {
    let mut properties = BTreeMap::new();
    properties.insert(
        "url".to_string(),
        PropertySchema {
            schema_type: SchemaType::String,
            min_length: Some(1),
            pattern: Some("^(https?|about):".to_string()),
            ..PropertySchema::default()
        },
    );
    properties.insert("wait_ms".to_string(), number_prop(Some(0.0), Some(60_000.0)));
    ToolSchema {
        properties,
        required: vec!["url".to_string()],
        additional_properties: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_bash_args() {
        let registry = SchemaRegistry::with_builtins();
        let result = registry.validate("bash", &json!({"command": "ls -la"}));
        assert!(result.valid);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_missing_required_property() {
        let registry = SchemaRegistry::with_builtins();
        let result = registry.validate("bash", &json!({"timeout_ms": 100}));
        assert!(!result.valid);
        assert!(result
            .violations
            .iter()
            .any(|v| v.path == "$.command" && v.actual == "missing"));
    }

    #[test]
    fn test_wrong_type() {
        let registry = SchemaRegistry::with_builtins();
        let result = registry.validate("bash", &json!({"command": 42}));
        assert!(!result.valid);
        assert!(result
            .violations
            .iter()
            .any(|v| v.expected == "string" && v.actual == "number"));
    }

    #[test]
    fn test_additional_property_rejected() {
        let registry = SchemaRegistry::with_builtins();
        let result = registry.validate("bash", &json!({"command": "ls", "shell": "zsh"}));
        assert!(!result.valid);
        assert!(result.violations.iter().any(|v| v.path == "$.shell"));
    }

    #[test]
    fn test_additional_property_warned_when_open() {
        let mut registry = SchemaRegistry::empty();
        registry.register("open", ToolSchema::default());
        let result = registry.validate("open", &json!({"anything": true}));
        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_unregistered_tool_passes_with_warning() {
        let registry = SchemaRegistry::with_builtins();
        let result = registry.validate("mysteryTool", &json!({"x": 1}));
        assert!(result.valid);
        assert!(result.warnings[0].contains("mysteryTool"));
    }

    #[test]
    fn test_numeric_bounds() {
        let registry = SchemaRegistry::with_builtins();
        let result = registry.validate("bash", &json!({"command": "ls", "timeout_ms": -5}));
        assert!(!result.valid);
        let result = registry.validate("bash", &json!({"command": "ls", "timeout_ms": 999_999_999}));
        assert!(!result.valid);
    }

    #[test]
    fn test_url_pattern() {
        let registry = SchemaRegistry::with_builtins();
        let ok = registry.validate("browserNavigate", &json!({"url": "https://example.com"}));
        assert!(ok.valid);
        let bad = registry.validate("browserNavigate", &json!({"url": "javascript:alert(1)"}));
        assert!(!bad.valid);
    }

    #[test]
    fn test_enum_constraint() {
        let mut registry = SchemaRegistry::empty();
        let mut properties = BTreeMap::new();
        properties.insert(
            "mode".to_string(),
            PropertySchema {
                schema_type: SchemaType::String,
                enum_values: Some(vec![json!("fast"), json!("safe")]),
                ..PropertySchema::default()
            },
        );
        registry.register(
            "tuner",
            ToolSchema {
                properties,
                required: vec![],
                additional_properties: false,
            },
        );
        assert!(registry.validate("tuner", &json!({"mode": "fast"})).valid);
        assert!(!registry.validate("tuner", &json!({"mode": "yolo"})).valid);
    }

    #[test]
    fn test_nested_object_and_items() {
        let mut registry = SchemaRegistry::empty();
        let mut inner = BTreeMap::new();
        inner.insert("name".to_string(), string_prop(Some(1), None));
        let mut properties = BTreeMap::new();
        properties.insert(
            "target".to_string(),
            PropertySchema {
                schema_type: SchemaType::Object,
                properties: Some(inner),
                required: Some(vec!["name".to_string()]),
                additional_properties: Some(false),
                ..PropertySchema::default()
            },
        );
        properties.insert(
            "tags".to_string(),
            PropertySchema {
                schema_type: SchemaType::Array,
                items: Some(Box::new(string_prop(Some(1), None))),
                ..PropertySchema::default()
            },
        );
        registry.register(
            "deploy",
            ToolSchema {
                properties,
                required: vec!["target".to_string()],
                additional_properties: false,
            },
        );

        let ok = registry.validate(
            "deploy",
            &json!({"target": {"name": "prod"}, "tags": ["a", "b"]}),
        );
        assert!(ok.valid, "{:?}", ok.violations);

        let missing = registry.validate("deploy", &json!({"target": {}}));
        assert!(!missing.valid);

        let bad_item = registry.validate("deploy", &json!({"target": {"name": "x"}, "tags": [1]}));
        assert!(!bad_item.valid);

        let extra_nested =
            registry.validate("deploy", &json!({"target": {"name": "x", "env": "p"}}));
        assert!(!extra_nested.valid);
    }

    #[test]
    fn test_null_args_validate_as_empty_object() {
        let mut registry = SchemaRegistry::empty();
        registry.register("noop", ToolSchema::default());
        assert!(registry.validate("noop", &Value::Null).valid);
        // But required properties still fail.
        let result = registry.validate("bash", &Value::Null);
        assert!(result.valid); // bash not in the empty registry
    }

    #[test]
    fn test_non_object_args_rejected() {
        let registry = SchemaRegistry::with_builtins();
        let result = registry.validate("bash", &json!("ls"));
        assert!(!result.valid);
        assert_eq!(result.violations[0].path, "$");
    }

    #[test]
    fn test_schema_deserializes_from_json() {
        let schema: ToolSchema = serde_json::from_str(
            r#"{
                "properties": {
                    "query": {"type": "string", "minLength": 1, "maxLength": 256}
                },
                "required": ["query"],
                "additionalProperties": false
            }"#,
        )
        .unwrap();
        let mut registry = SchemaRegistry::empty();
        registry.register("search", schema);
        assert!(registry.validate("search", &json!({"query": "rust"})).valid);
        assert!(!registry.validate("search", &json!({})).valid);
    }
}

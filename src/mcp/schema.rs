//! Declarative input schemas for the tools.
//!
//! A schema is a static list of fields. The same description renders the JSON
//! Schema advertised in `tools/list` and validates incoming arguments, so the
//! two cannot drift apart.

use crate::error::ToolError;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Copy)]
pub enum FieldType {
    /// String that must not be blank (ids, names).
    NonEmpty,
    String,
    Integer { min: i64 },
    Boolean,
    StringList,
    StringMap,
    Enum(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct Schema {
    pub fields: &'static [Field],
}

impl Field {
    pub const fn required(name: &'static str, ty: FieldType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, ty: FieldType, description: &'static str) -> Self {
        Self {
            name,
            ty,
            required: false,
            description,
        }
    }

    fn to_json(self) -> Value {
        let mut schema = match self.ty {
            FieldType::NonEmpty => json!({ "type": "string", "minLength": 1 }),
            FieldType::String => json!({ "type": "string" }),
            FieldType::Integer { min } => json!({ "type": "integer", "minimum": min }),
            FieldType::Boolean => json!({ "type": "boolean" }),
            FieldType::StringList => json!({ "type": "array", "items": { "type": "string" } }),
            FieldType::StringMap => {
                json!({ "type": "object", "additionalProperties": { "type": "string" } })
            }
            FieldType::Enum(values) => json!({ "type": "string", "enum": values }),
        };
        schema["description"] = json!(self.description);
        schema
    }

    fn check(&self, value: &Value) -> Result<(), ToolError> {
        let fail = |reason: String| Err(ToolError::invalid(self.name, reason));
        match self.ty {
            FieldType::NonEmpty => match value.as_str() {
                Some(s) if !s.trim().is_empty() => Ok(()),
                Some(_) => fail("must not be empty".into()),
                None => fail("must be a string".into()),
            },
            FieldType::String => match value {
                Value::String(_) => Ok(()),
                _ => fail("must be a string".into()),
            },
            FieldType::Integer { min } => match value.as_i64() {
                Some(n) if n >= min => Ok(()),
                Some(_) => fail(format!("must be at least {}", min)),
                None => fail("must be an integer".into()),
            },
            FieldType::Boolean => match value {
                Value::Bool(_) => Ok(()),
                _ => fail("must be a boolean".into()),
            },
            FieldType::StringList => match value.as_array() {
                Some(items) if items.iter().all(Value::is_string) => Ok(()),
                _ => fail("must be an array of strings".into()),
            },
            FieldType::StringMap => match value.as_object() {
                Some(map) if map.values().all(Value::is_string) => Ok(()),
                _ => fail("must be an object with string values".into()),
            },
            FieldType::Enum(allowed) => match value.as_str() {
                Some(s) if allowed.contains(&s) => Ok(()),
                _ => fail(format!("must be one of: {}", allowed.join(", "))),
            },
        }
    }
}

impl Schema {
    pub fn to_json(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|f| (f.name.to_string(), f.to_json()))
            .collect();
        let required: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }

    /// Checks `args` and returns them as an object with explicit nulls removed.
    pub fn validate(&self, args: &Value) -> Result<Map<String, Value>, ToolError> {
        let mut map = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            _ => return Err(ToolError::invalid("arguments", "must be an object")),
        };
        map.retain(|_, v| !v.is_null());

        if let Some(unknown) = map
            .keys()
            .find(|k| !self.fields.iter().any(|f| f.name == k.as_str()))
        {
            return Err(ToolError::invalid(unknown.as_str(), "is not a recognised argument"));
        }

        for field in self.fields {
            match map.get(field.name) {
                Some(value) => field.check(value)?,
                None if field.required => {
                    return Err(ToolError::invalid(field.name, "is required"));
                }
                None => {}
            }
        }

        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    const SCHEMA: Schema = Schema {
        fields: &[
            Field::required("vm_id", FieldType::NonEmpty, "VM"),
            Field::optional("cpus", FieldType::Integer { min: 1 }, "CPUs"),
            Field::optional("state", FieldType::Enum(&["on", "off"]), "State"),
            Field::optional("tags", FieldType::StringList, "Tags"),
            Field::optional("filter", FieldType::StringMap, "Filter"),
        ],
    };

    fn field_of(err: ToolError) -> String {
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        match err {
            ToolError::InvalidArgument { field, .. } => field,
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_valid_arguments_pass() {
        let args = json!({
            "vm_id": "abc",
            "cpus": 2,
            "state": "on",
            "tags": ["a", "b"],
            "filter": { "k": "v" },
            "ignored_null": null
        });
        let map = SCHEMA.validate(&args).unwrap();
        assert_eq!(map.len(), 5);
    }

    #[test]
    fn test_missing_required_field() {
        assert_eq!(field_of(SCHEMA.validate(&json!({})).unwrap_err()), "vm_id");
        assert_eq!(field_of(SCHEMA.validate(&Value::Null).unwrap_err()), "vm_id");
        assert_eq!(
            field_of(SCHEMA.validate(&json!({ "vm_id": null })).unwrap_err()),
            "vm_id"
        );
    }

    #[test]
    fn test_type_and_range_mismatches() {
        let cases = [
            (json!({ "vm_id": "" }), "vm_id"),
            (json!({ "vm_id": 7 }), "vm_id"),
            (json!({ "vm_id": "a", "cpus": 0 }), "cpus"),
            (json!({ "vm_id": "a", "cpus": 1.5 }), "cpus"),
            (json!({ "vm_id": "a", "state": "sideways" }), "state"),
            (json!({ "vm_id": "a", "tags": ["x", 1] }), "tags"),
            (json!({ "vm_id": "a", "filter": { "k": 1 } }), "filter"),
            (json!({ "vm_id": "a", "colour": "red" }), "colour"),
        ];
        for (args, field) in cases {
            assert_eq!(field_of(SCHEMA.validate(&args).unwrap_err()), field, "{}", args);
        }
    }

    #[test]
    fn test_non_object_arguments() {
        assert_eq!(
            field_of(SCHEMA.validate(&json!(["vm_id"])).unwrap_err()),
            "arguments"
        );
    }

    #[test]
    fn test_json_schema_rendering() {
        let schema = SCHEMA.to_json();
        assert_eq!(schema["required"], json!(["vm_id"]));
        assert_eq!(schema["properties"]["cpus"]["minimum"], 1);
        assert_eq!(schema["properties"]["state"]["enum"], json!(["on", "off"]));
        assert_eq!(schema["additionalProperties"], false);
    }
}

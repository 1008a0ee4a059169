//! Bucket input schemas.
//!
//! A bucket's input is declared as a Rust type (`serde` + `validator`).
//! At request time the raw JSON is parsed into that type, validated, and
//! re-serialized so hooks and path resolvers only ever see checked input.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use validator::Validate;

use crate::errors::EdgeStoreError;

#[derive(Default)]
pub struct SchemaErrors {
    map: Map<String, Value>,
}

impl SchemaErrors {
    pub fn push_schema(&mut self, msg: impl Into<String>) {
        Self::push_to(&mut self.map, "_schema", msg);
    }

    pub fn push_field(&mut self, field: &str, msg: impl Into<String>) {
        Self::push_to(&mut self.map, field, msg);
    }

    fn push_to(map: &mut Map<String, Value>, key: &str, msg: impl Into<String>) {
        let msg = Value::String(msg.into());
        match map.get_mut(key) {
            Some(Value::Array(arr)) => arr.push(msg),
            _ => {
                map.insert(key.to_string(), Value::Array(vec![msg]));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn into_bad_request(self, message: &str) -> anyhow::Error {
        EdgeStoreError::bad_request(message)
            .with_details(json!({ "errors": Value::Object(self.map) }))
            .into_anyhow()
    }
}

fn friendly_message(code: &str) -> Option<&'static str> {
    match code {
        "required" => Some("is required"),
        "email" => Some("must be a valid email"),
        "length" => Some("has invalid length"),
        "range" => Some("is out of range"),
        "url" => Some("must be a valid URL"),
        _ => None,
    }
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

fn push_validation_errors(out: &mut SchemaErrors, prefix: &str, errs: &validator::ValidationErrors) {
    for (field, kind) in errs.errors() {
        match kind {
            validator::ValidationErrorsKind::Field(field_errors) => {
                let key = join_path(prefix, field);
                for e in field_errors {
                    let msg = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .or_else(|| friendly_message(&e.code).map(str::to_string))
                        .unwrap_or_else(|| e.code.to_string());
                    out.push_field(&key, msg);
                }
            }
            validator::ValidationErrorsKind::Struct(nested) => {
                push_validation_errors(out, &join_path(prefix, field), nested.as_ref());
            }
            validator::ValidationErrorsKind::List(list) => {
                let base = join_path(prefix, field);
                for (idx, nested) in list {
                    push_validation_errors(out, &format!("{base}[{idx}]"), nested.as_ref());
                }
            }
        }
    }
}

/// Parse + validate `data` as `T`, returning the normalized JSON.
pub fn validate<T>(data: &Value) -> anyhow::Result<Value>
where
    T: DeserializeOwned + Serialize + Validate,
{
    const MESSAGE: &str = "Invalid input";

    let parsed: T = serde_json::from_value(data.clone()).map_err(|e| {
        let mut errs = SchemaErrors::default();
        errs.push_schema(e.to_string());
        errs.into_bad_request(MESSAGE)
    })?;

    parsed.validate().map_err(|e| {
        let mut errs = SchemaErrors::default();
        push_validation_errors(&mut errs, "", &e);
        errs.into_bad_request(MESSAGE)
    })?;

    Ok(serde_json::to_value(parsed)?)
}

type ParseFn = Arc<dyn Fn(&Value) -> anyhow::Result<Value> + Send + Sync>;

/// A type-erased input schema attached to a bucket.
#[derive(Clone)]
pub struct InputSchema {
    name: &'static str,
    parse: ParseFn,
}

impl InputSchema {
    pub fn of<T>() -> Self
    where
        T: DeserializeOwned + Serialize + Validate + 'static,
    {
        Self {
            name: std::any::type_name::<T>(),
            parse: Arc::new(validate::<T>),
        }
    }

    /// Rust type name, used in the serialized routing table.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parse(&self, data: &Value) -> anyhow::Result<Value> {
        (self.parse)(data)
    }
}

impl fmt::Debug for InputSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSchema").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use validator::Validate;

    use super::*;
    use crate::errors::ErrorKind;

    #[derive(Debug, Serialize, Deserialize, Validate)]
    struct PostInput {
        #[validate(length(min = 2, message = "category must be at least 2 chars"))]
        category: String,
        #[serde(default)]
        draft: bool,
    }

    #[test]
    fn field_errors_become_bad_request_details() {
        let err = validate::<PostInput>(&json!({ "category": "x" })).unwrap_err();
        let edge = EdgeStoreError::from_anyhow(&err).expect("must be EdgeStoreError");
        assert_eq!(edge.kind, ErrorKind::BadRequest);
        let details = edge.details.as_ref().unwrap();
        assert_eq!(details["errors"]["category"][0], "category must be at least 2 chars");
    }

    #[test]
    fn normalizes_defaults() {
        let schema = InputSchema::of::<PostInput>();
        let out = schema.parse(&json!({ "category": "news" })).unwrap();
        assert_eq!(out, json!({ "category": "news", "draft": false }));
    }

    #[test]
    fn shape_mismatch_is_bad_request() {
        let err = validate::<PostInput>(&json!({ "category": 3 })).unwrap_err();
        let edge = EdgeStoreError::from_anyhow(&err).unwrap();
        assert!(edge.details.as_ref().unwrap()["errors"]["_schema"].is_array());
    }
}

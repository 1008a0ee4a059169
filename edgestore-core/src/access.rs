//! Access-control expressions.
//!
//! A boolean predicate tree over session-context fields. Leaves compare one
//! context field against a literal or against a resolved path segment:
//!
//! ```rust
//! use edgestore_core::access::{field, path_ref, AccessControl};
//!
//! // owner may touch their own files, admins may touch anything
//! let rule = AccessControl::or([
//!     field("userId").eq(path_ref("owner")).into(),
//!     field("role").eq("admin").into(),
//! ]);
//! assert_eq!(
//!     rule.to_json(),
//!     serde_json::json!({ "OR": [{ "userId": { "path": "owner" } }, { "role": "admin" }] })
//! );
//! ```
//!
//! Evaluation is request-scoped: context and path values are passed in on
//! every call and nothing is cached.

use std::cmp::Ordering;

use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::types::PathValue;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessControlError {
    #[error("access rule references unknown context field `{0}`")]
    UnknownContextField(String),

    #[error("access rule references unknown path segment `{0}`")]
    UnknownPathSegment(String),
}

/// Right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    /// `{ path: <segment> }`: the resolved value of a path segment.
    Path(String),
}

/// Reference a path segment by name.
pub fn path_ref(segment: impl Into<String>) -> Operand {
    Operand::Path(segment.into())
}

impl From<&str> for Operand {
    fn from(v: &str) -> Self {
        Operand::Literal(Value::String(v.to_string()))
    }
}

impl From<String> for Operand {
    fn from(v: String) -> Self {
        Operand::Literal(Value::String(v))
    }
}

impl From<i32> for Operand {
    fn from(v: i32) -> Self {
        Operand::Literal(Value::from(v))
    }
}

impl From<i64> for Operand {
    fn from(v: i64) -> Self {
        Operand::Literal(Value::from(v))
    }
}

impl From<u64> for Operand {
    fn from(v: u64) -> Self {
        Operand::Literal(Value::from(v))
    }
}

impl From<f64> for Operand {
    fn from(v: f64) -> Self {
        Operand::Literal(Value::from(v))
    }
}

impl From<bool> for Operand {
    fn from(v: bool) -> Self {
        Operand::Literal(Value::Bool(v))
    }
}

impl From<Value> for Operand {
    fn from(v: Value) -> Self {
        Operand::Literal(v)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Operand),
    Lt(Operand),
    Lte(Operand),
    Gt(Operand),
    Gte(Operand),
    Contains(Operand),
    In(Vec<Operand>),
    Not(Operand),
}

impl Condition {
    fn op_name(&self) -> &'static str {
        match self {
            Condition::Eq(_) => "eq",
            Condition::Lt(_) => "lt",
            Condition::Lte(_) => "lte",
            Condition::Gt(_) => "gt",
            Condition::Gte(_) => "gte",
            Condition::Contains(_) => "contains",
            Condition::In(_) => "in",
            Condition::Not(_) => "not",
        }
    }

    fn operands(&self) -> Vec<&Operand> {
        match self {
            Condition::In(list) => list.iter().collect(),
            Condition::Eq(o)
            | Condition::Lt(o)
            | Condition::Lte(o)
            | Condition::Gt(o)
            | Condition::Gte(o)
            | Condition::Contains(o)
            | Condition::Not(o) => vec![o],
        }
    }
}

/// Predicate tree. `Not` holds when none of its children hold.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessControl {
    And(Vec<AccessControl>),
    Or(Vec<AccessControl>),
    Not(Vec<AccessControl>),
    Field {
        key: String,
        conditions: Vec<Condition>,
    },
}

/// Start a leaf predicate on a context field.
pub fn field(key: impl Into<String>) -> FieldRule {
    FieldRule {
        key: key.into(),
        conditions: Vec::new(),
    }
}

/// Builder for a leaf; every added comparison must hold.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRule {
    key: String,
    conditions: Vec<Condition>,
}

impl FieldRule {
    fn with(mut self, c: Condition) -> Self {
        self.conditions.push(c);
        self
    }

    pub fn eq(self, v: impl Into<Operand>) -> Self {
        self.with(Condition::Eq(v.into()))
    }
    pub fn lt(self, v: impl Into<Operand>) -> Self {
        self.with(Condition::Lt(v.into()))
    }
    pub fn lte(self, v: impl Into<Operand>) -> Self {
        self.with(Condition::Lte(v.into()))
    }
    pub fn gt(self, v: impl Into<Operand>) -> Self {
        self.with(Condition::Gt(v.into()))
    }
    pub fn gte(self, v: impl Into<Operand>) -> Self {
        self.with(Condition::Gte(v.into()))
    }
    pub fn contains(self, v: impl Into<Operand>) -> Self {
        self.with(Condition::Contains(v.into()))
    }
    pub fn is_in<I, V>(self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Operand>,
    {
        self.with(Condition::In(values.into_iter().map(Into::into).collect()))
    }
    pub fn not(self, v: impl Into<Operand>) -> Self {
        self.with(Condition::Not(v.into()))
    }
}

impl From<FieldRule> for AccessControl {
    fn from(rule: FieldRule) -> Self {
        AccessControl::Field {
            key: rule.key,
            conditions: rule.conditions,
        }
    }
}

impl AccessControl {
    pub fn and<I: IntoIterator<Item = AccessControl>>(rules: I) -> Self {
        AccessControl::And(rules.into_iter().collect())
    }

    pub fn or<I: IntoIterator<Item = AccessControl>>(rules: I) -> Self {
        AccessControl::Or(rules.into_iter().collect())
    }

    pub fn not<I: IntoIterator<Item = AccessControl>>(rules: I) -> Self {
        AccessControl::Not(rules.into_iter().collect())
    }

    /// Every path segment name referenced through `{ path }`.
    pub fn referenced_segments(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_segments(&mut out);
        out
    }

    fn collect_segments<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            AccessControl::And(c) | AccessControl::Or(c) | AccessControl::Not(c) => {
                c.iter().for_each(|r| r.collect_segments(out))
            }
            AccessControl::Field { conditions, .. } => {
                for op in conditions.iter().flat_map(Condition::operands) {
                    if let Operand::Path(seg) = op {
                        out.push(seg.as_str());
                    }
                }
            }
        }
    }

    /// Evaluate against a live context object and resolved path.
    pub fn evaluate(&self, ctx: &Value, path: &[PathValue]) -> Result<bool, AccessControlError> {
        match self {
            AccessControl::And(rules) => {
                for r in rules {
                    if !r.evaluate(ctx, path)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            AccessControl::Or(rules) => {
                for r in rules {
                    if r.evaluate(ctx, path)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            AccessControl::Not(rules) => {
                for r in rules {
                    if r.evaluate(ctx, path)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            AccessControl::Field { key, conditions } => {
                let actual = ctx
                    .get(key.as_str())
                    .ok_or_else(|| AccessControlError::UnknownContextField(key.clone()))?;
                for c in conditions {
                    if !check(actual, c, path)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
        }
    }

    /// Wire form: `{ OR: [...] }`, `{ field: literal }`, `{ field: { path } }`, `{ field: { gt: .. } }`.
    pub fn to_json(&self) -> Value {
        match self {
            AccessControl::And(c) => json!({ "AND": c.iter().map(Self::to_json).collect::<Vec<_>>() }),
            AccessControl::Or(c) => json!({ "OR": c.iter().map(Self::to_json).collect::<Vec<_>>() }),
            AccessControl::Not(c) => json!({ "NOT": c.iter().map(Self::to_json).collect::<Vec<_>>() }),
            AccessControl::Field { key, conditions } => {
                let value = match conditions.as_slice() {
                    [Condition::Eq(op)] => operand_json(op),
                    _ => {
                        let mut m = Map::new();
                        for c in conditions {
                            let v = match c {
                                Condition::In(list) => {
                                    Value::Array(list.iter().map(operand_json).collect())
                                }
                                other => operand_json(other.operands()[0]),
                            };
                            m.insert(c.op_name().to_string(), v);
                        }
                        Value::Object(m)
                    }
                };
                let mut m = Map::new();
                m.insert(key.clone(), value);
                Value::Object(m)
            }
        }
    }
}

fn operand_json(op: &Operand) -> Value {
    match op {
        Operand::Literal(v) => v.clone(),
        Operand::Path(seg) => json!({ "path": seg }),
    }
}

fn operand_value(op: &Operand, path: &[PathValue]) -> Result<Value, AccessControlError> {
    match op {
        Operand::Literal(v) => Ok(v.clone()),
        Operand::Path(seg) => path
            .iter()
            .find(|p| &p.key == seg)
            .map(|p| Value::String(p.value.clone()))
            .ok_or_else(|| AccessControlError::UnknownPathSegment(seg.clone())),
    }
}

fn check(actual: &Value, c: &Condition, path: &[PathValue]) -> Result<bool, AccessControlError> {
    Ok(match c {
        Condition::Eq(op) => loose_eq(actual, &operand_value(op, path)?),
        Condition::Not(op) => !loose_eq(actual, &operand_value(op, path)?),
        Condition::Lt(op) => compare(actual, &operand_value(op, path)?) == Some(Ordering::Less),
        Condition::Lte(op) => matches!(
            compare(actual, &operand_value(op, path)?),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Condition::Gt(op) => compare(actual, &operand_value(op, path)?) == Some(Ordering::Greater),
        Condition::Gte(op) => matches!(
            compare(actual, &operand_value(op, path)?),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Condition::Contains(op) => {
            let needle = operand_value(op, path)?;
            match actual {
                Value::Array(items) => items.iter().any(|i| loose_eq(i, &needle)),
                Value::String(s) => scalar_string(&needle).is_some_and(|n| s.contains(n.as_str())),
                _ => false,
            }
        }
        Condition::In(list) => {
            let mut hit = false;
            for op in list {
                if loose_eq(actual, &operand_value(op, path)?) {
                    hit = true;
                    break;
                }
            }
            hit
        }
    })
}

fn scalar_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// Path values are always strings, so `42` and `"42"` must compare equal.
fn loose_eq(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (scalar_string(a), scalar_string(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    let (x, y) = (scalar_string(a)?, scalar_string(b)?);
    match (x.parse::<f64>(), y.parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y),
        _ => Some(x.cmp(&y)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(v: &str) -> Vec<PathValue> {
        vec![PathValue::new("owner", v)]
    }

    #[test]
    fn path_reference_compares_against_resolved_segment() {
        let rule: AccessControl = field("userId").eq(path_ref("owner")).into();
        let ctx = json!({ "userId": 42, "role": "user" });
        assert!(rule.evaluate(&ctx, &owner("42")).unwrap());
        assert!(!rule.evaluate(&ctx, &owner("43")).unwrap());
    }

    #[test]
    fn combinators() {
        let rule = AccessControl::and([
            AccessControl::or([
                field("role").eq("admin").into(),
                field("userId").eq(path_ref("owner")).into(),
            ]),
            AccessControl::not([field("banned").eq(true).into()]),
        ]);
        let admin = json!({ "role": "admin", "userId": 1, "banned": false });
        let banned_owner = json!({ "role": "user", "userId": 2, "banned": true });
        assert!(rule.evaluate(&admin, &owner("2")).unwrap());
        assert!(!rule.evaluate(&banned_owner, &owner("2")).unwrap());
    }

    #[test]
    fn comparisons() {
        let ctx = json!({ "level": 5, "groups": ["a", "b"], "email": "x@corp.io" });
        let ok = |r: FieldRule| AccessControl::from(r).evaluate(&ctx, &[]).unwrap();
        assert!(ok(field("level").gt(3).lte(5)));
        assert!(!ok(field("level").lt(5)));
        assert!(ok(field("groups").contains("b")));
        assert!(ok(field("email").contains("@corp.io")));
        assert!(ok(field("level").is_in([1_i64, 5])));
        assert!(ok(field("level").not(4)));
    }

    #[test]
    fn unknown_context_field_is_an_error() {
        let rule: AccessControl = field("tenant").eq("x").into();
        let err = rule.evaluate(&json!({ "userId": 1 }), &[]).unwrap_err();
        assert_eq!(err, AccessControlError::UnknownContextField("tenant".into()));
    }

    #[test]
    fn json_form() {
        let rule: AccessControl = field("level").gte(2).is_in(["a", "b"]).into();
        assert_eq!(rule.to_json(), json!({ "level": { "gte": 2, "in": ["a", "b"] } }));
        assert_eq!(
            AccessControl::not([field("x").eq(path_ref("p")).into()]).referenced_segments(),
            vec!["p"]
        );
    }
}

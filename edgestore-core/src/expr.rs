//! Symbolic field references.
//!
//! Declarations name *which* request field a path segment or an access rule
//! reads (`ctx.userId`, `input.category`) without touching request data.
//! A [`FieldPath`] is resolved against `{ "ctx": .., "input": .. }` per request.
//!
//! ```rust
//! use edgestore_core::expr::{ctx, input};
//! use serde_json::json;
//!
//! let owner = ctx("user").field("id");
//! assert_eq!(owner.to_string(), "ctx.user.id");
//!
//! let attrs = json!({ "ctx": { "user": { "id": 42 } }, "input": { "kind": "avatar" } });
//! assert_eq!(owner.resolve_segment(&attrs).unwrap(), "42");
//! assert!(input("missing").resolve(&attrs).is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

/// Which half of the request a reference starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Root {
    Ctx,
    Input,
}

impl Root {
    pub fn as_str(&self) -> &'static str {
        match self {
            Root::Ctx => "ctx",
            Root::Input => "input",
        }
    }
}

/// Errors raised while resolving a [`FieldPath`] against live request data.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Missing path param: {path}")]
    MissingPathParam { path: String },

    #[error("Path param {path} must resolve to a string, number or boolean")]
    NotScalar { path: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid field path `{0}` (expected `ctx.<field>` or `input.<field>`)")]
pub struct ParseFieldPathError(pub String);

/// A dotted reference such as `ctx.user.id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    root: Root,
    keys: Vec<String>,
}

/// Reference a field of the session context (`ctx.<path>`).
pub fn ctx(path: &str) -> FieldPath {
    FieldPath::new(Root::Ctx, split(path))
}

/// Reference a field of the bucket input (`input.<path>`).
pub fn input(path: &str) -> FieldPath {
    FieldPath::new(Root::Input, split(path))
}

fn split(path: &str) -> Vec<String> {
    path.split('.')
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

impl FieldPath {
    pub fn new<I, S>(root: Root, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            root,
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Extend the chain by one key: `ctx("user").field("id")`.
    pub fn field(mut self, key: impl Into<String>) -> Self {
        self.keys.push(key.into());
        self
    }

    pub fn root(&self) -> Root {
        self.root
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// A reference needs at least one key below its root.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Walk `attrs` (`{ ctx, input }`) down the chain. Missing keys are fatal.
    pub fn resolve<'a>(&self, attrs: &'a Value) -> Result<&'a Value, ResolveError> {
        let missing = || ResolveError::MissingPathParam {
            path: self.to_string(),
        };

        let mut current = attrs.get(self.root.as_str()).ok_or_else(missing)?;
        for key in &self.keys {
            current = current.get(key.as_str()).ok_or_else(missing)?;
        }
        Ok(current)
    }

    /// Resolve and render as a path segment value.
    pub fn resolve_segment(&self, attrs: &Value) -> Result<String, ResolveError> {
        match self.resolve(attrs)? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            _ => Err(ResolveError::NotScalar {
                path: self.to_string(),
            }),
        }
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.root.as_str())?;
        for key in &self.keys {
            write!(f, ".{key}")?;
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = ParseFieldPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (root, rest) = s
            .split_once('.')
            .ok_or_else(|| ParseFieldPathError(s.to_string()))?;
        let root = match root {
            "ctx" => Root::Ctx,
            "input" => Root::Input,
            _ => return Err(ParseFieldPathError(s.to_string())),
        };
        let keys: Vec<&str> = rest.split('.').collect();
        if keys.iter().any(|k| k.is_empty()) {
            return Err(ParseFieldPathError(s.to_string()));
        }
        Ok(FieldPath::new(root, keys))
    }
}

impl Serialize for FieldPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

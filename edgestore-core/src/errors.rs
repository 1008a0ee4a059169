//! # Errors
//!
//! EdgeStore carries one structured, wire-stable error through the pipeline.
//! Core goals:
//! - a stable `code` string + HTTP status per kind
//! - can be carried through `anyhow::Error` (stages just use `?`)
//! - transport-agnostic (the HTTP shim decides how to serialize)
//!
//! Anything that is not an [`EdgeStoreError`] is treated as unexpected: it is
//! normalized to `SERVER_ERROR` with a generic message so no internal text
//! reaches the client.

use std::fmt;

use anyhow::Error as AnyError;
use serde_json::{json, Value};

/// Convenience result type for pipeline APIs.
pub type EdgeStoreResult<T> = std::result::Result<T, AnyError>;

/// Message sent to clients in place of unexpected error text.
pub const GENERIC_SERVER_MESSAGE: &str = "Something went wrong";

/// Wire error codes + HTTP status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,         // 400
    FileTooLarge,       // 400
    MimeTypeNotAllowed, // 400
    Unauthorized,       // 401
    UploadNotAllowed,   // 403
    DeleteNotAllowed,   // 403
    CreateContextError, // 500
    ServerError,        // 500
}

impl ErrorKind {
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::BadRequest => 400,
            ErrorKind::FileTooLarge => 400,
            ErrorKind::MimeTypeNotAllowed => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::UploadNotAllowed => 403,
            ErrorKind::DeleteNotAllowed => 403,
            ErrorKind::CreateContextError => 500,
            ErrorKind::ServerError => 500,
        }
    }

    /// Stable wire code (e.g. "FILE_TOO_LARGE")
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::FileTooLarge => "FILE_TOO_LARGE",
            ErrorKind::MimeTypeNotAllowed => "MIME_TYPE_NOT_ALLOWED",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::UploadNotAllowed => "UPLOAD_NOT_ALLOWED",
            ErrorKind::DeleteNotAllowed => "DELETE_NOT_ALLOWED",
            ErrorKind::CreateContextError => "CREATE_CONTEXT_ERROR",
            ErrorKind::ServerError => "SERVER_ERROR",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "BAD_REQUEST" => Some(ErrorKind::BadRequest),
            "FILE_TOO_LARGE" => Some(ErrorKind::FileTooLarge),
            "MIME_TYPE_NOT_ALLOWED" => Some(ErrorKind::MimeTypeNotAllowed),
            "UNAUTHORIZED" => Some(ErrorKind::Unauthorized),
            "UPLOAD_NOT_ALLOWED" => Some(ErrorKind::UploadNotAllowed),
            "DELETE_NOT_ALLOWED" => Some(ErrorKind::DeleteNotAllowed),
            "CREATE_CONTEXT_ERROR" => Some(ErrorKind::CreateContextError),
            "SERVER_ERROR" => Some(ErrorKind::ServerError),
            _ => None,
        }
    }
}

/// A structured EdgeStore error that can live inside `anyhow::Error`.
///
/// Wire fields:
/// - message
/// - code (see [`ErrorKind::code`])
/// - details (optional, structured)
#[derive(Debug)]
pub struct EdgeStoreError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Value>,
    pub source: Option<AnyError>,
}

impl EdgeStoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_source(mut self, source: AnyError) -> Self {
        self.source = Some(source);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.kind.status_code()
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// Convert into `anyhow::Error` so it flows through the pipeline.
    pub fn into_anyhow(self) -> AnyError {
        AnyError::new(self)
    }

    /// Find an `EdgeStoreError` anywhere in an `anyhow` chain.
    pub fn from_anyhow(err: &AnyError) -> Option<&EdgeStoreError> {
        err.chain().find_map(|e| e.downcast_ref::<EdgeStoreError>())
    }

    /// Turn any error into an EdgeStoreError:
    /// - if it is (or wraps) an EdgeStoreError, keep kind/message/details
    /// - otherwise `SERVER_ERROR` with the generic message
    pub fn normalize(err: AnyError) -> EdgeStoreError {
        let err = match err.downcast::<EdgeStoreError>() {
            Ok(edge) => return edge,
            Err(other) => other,
        };

        match Self::from_anyhow(&err) {
            Some(inner) => EdgeStoreError {
                kind: inner.kind,
                message: inner.message.clone(),
                details: inner.details.clone(),
                source: None,
            }
            .with_source(err),
            None => EdgeStoreError::server_error(GENERIC_SERVER_MESSAGE).with_source(err),
        }
    }

    /// A version suitable for returning to clients: drops the inner `source`.
    pub fn sanitize_for_client(&self) -> EdgeStoreError {
        EdgeStoreError {
            kind: self.kind,
            message: self.message.clone(),
            details: self.details.clone(),
            source: None,
        }
    }

    /// Wire JSON payload: `{ message, code, details? }`.
    pub fn to_json(&self) -> Value {
        let mut base = json!({
            "message": self.message,
            "code": self.code(),
        });
        if let Some(d) = &self.details {
            base["details"] = d.clone();
        }
        base
    }

    /// Rebuild the typed error from a response body. Unknown codes become `SERVER_ERROR`.
    pub fn from_json(body: &Value) -> EdgeStoreError {
        let kind = body
            .get("code")
            .and_then(Value::as_str)
            .and_then(ErrorKind::from_code)
            .unwrap_or(ErrorKind::ServerError);
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(GENERIC_SERVER_MESSAGE);

        let mut err = EdgeStoreError::new(kind, message);
        if let Some(details) = body.get("details").filter(|d| !d.is_null()) {
            err = err.with_details(details.clone());
        }
        err
    }

    // ---- Constructors ----

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, msg)
    }

    pub fn file_too_large(max_file_size: u64, file_size: u64) -> Self {
        Self::new(
            ErrorKind::FileTooLarge,
            format!("File size is too big. Max size is {max_file_size}"),
        )
        .with_details(json!({ "maxFileSize": max_file_size, "fileSize": file_size }))
    }

    pub fn mime_type_not_allowed(allowed: &[String], mime_type: &str) -> Self {
        Self::new(
            ErrorKind::MimeTypeNotAllowed,
            format!(
                "MIME type {mime_type} is not allowed. Allowed types are {}",
                allowed.join(", ")
            ),
        )
        .with_details(json!({ "allowedMimeTypes": allowed, "mimeType": mime_type }))
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, msg)
    }

    pub fn upload_not_allowed() -> Self {
        Self::new(ErrorKind::UploadNotAllowed, "Upload not allowed")
    }

    pub fn delete_not_allowed() -> Self {
        Self::new(ErrorKind::DeleteNotAllowed, "Delete not allowed")
    }

    pub fn create_context(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::CreateContextError, msg)
    }

    pub fn server_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::ServerError, msg)
    }
}

impl fmt::Display for EdgeStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code(), self.status_code(), self.message)
    }
}

impl std::error::Error for EdgeStoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

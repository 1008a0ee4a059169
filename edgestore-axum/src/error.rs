use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use edgestore_core::{EdgeStoreError, ErrorKind};

#[derive(Debug)]
pub struct EdgeStoreAxumError(pub anyhow::Error);

impl From<anyhow::Error> for EdgeStoreAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<EdgeStoreError> for EdgeStoreAxumError {
    fn from(e: EdgeStoreError) -> Self {
        Self(e.into_anyhow())
    }
}

impl IntoResponse for EdgeStoreAxumError {
    fn into_response(self) -> Response {
        let err = EdgeStoreError::normalize(self.0);

        // Unexpected failures keep their full chain in the server log only
        if matches!(err.kind, ErrorKind::ServerError | ErrorKind::CreateContextError) {
            match &err.source {
                Some(source) => tracing::error!(code = err.code(), error = ?source, "{}", err.message),
                None => tracing::error!(code = err.code(), "{}", err.message),
            }
        } else {
            tracing::debug!(code = err.code(), "{}", err.message);
        }

        let safe = err.sanitize_for_client();
        let status =
            StatusCode::from_u16(safe.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(safe.to_json())).into_response()
    }
}

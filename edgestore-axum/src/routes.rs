//! One catch-all route under the configured base path. The operation is
//! picked by the path suffix, so the same handler works however the
//! application nests it.

use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{OriginalUri, Query, State},
    http::{
        header::{CONTENT_TYPE, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use edgestore_core::{
    CompleteMultipartUploadBody, ConfirmUploadBody, DeleteFileBody, EdgeStoreError,
    RequestUploadBody, RequestUploadPartsBody,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::context::RequestInfo;
use crate::cookies::{self, CookieSpec};
use crate::{EdgeStoreAxumError, EdgeStoreState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Health,
    Init,
    RequestUpload,
    RequestUploadParts,
    CompleteMultipartUpload,
    ConfirmUpload,
    DeleteFile,
    ProxyFile,
}

impl Endpoint {
    const SUFFIXES: [(&'static str, Endpoint); 8] = [
        ("/health", Endpoint::Health),
        ("/init", Endpoint::Init),
        ("/request-upload", Endpoint::RequestUpload),
        ("/request-upload-parts", Endpoint::RequestUploadParts),
        ("/complete-multipart-upload", Endpoint::CompleteMultipartUpload),
        ("/confirm-upload", Endpoint::ConfirmUpload),
        ("/delete-file", Endpoint::DeleteFile),
        ("/proxy-file", Endpoint::ProxyFile),
    ];

    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.trim_end_matches('/');
        Self::SUFFIXES
            .iter()
            .find(|(suffix, _)| path.ends_with(suffix))
            .map(|(_, endpoint)| *endpoint)
    }

    pub fn method(self) -> Method {
        match self {
            Endpoint::Health | Endpoint::ProxyFile => Method::GET,
            _ => Method::POST,
        }
    }
}

pub fn edgestore_router<C>(state: EdgeStoreState<C>) -> Router<()>
where
    C: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let base = state
        .handler
        .config()
        .base_path
        .trim_end_matches('/')
        .to_string();

    Router::new()
        .route(&format!("{base}/{{*op}}"), any(dispatch::<C>))
        .with_state(state)
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, EdgeStoreAxumError> {
    serde_json::from_slice(body).map_err(|e| {
        EdgeStoreError::bad_request("Failed to parse the request body as JSON")
            .with_details(json!({ "_schema": [e.to_string()] }))
            .into()
    })
}

async fn dispatch<C>(
    State(state): State<EdgeStoreState<C>>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, EdgeStoreAxumError>
where
    C: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let Some(endpoint) = Endpoint::from_path(uri.path()) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };
    if endpoint.method() != method {
        return Ok(StatusCode::METHOD_NOT_ALLOWED.into_response());
    }

    let handler = &state.handler;
    let ctx_token = cookies::get(&headers, &handler.config().ctx_cookie);
    let ctx_token = ctx_token.as_deref();

    let res = match endpoint {
        Endpoint::Health => handler.health().into_response(),
        Endpoint::Init => {
            let info = RequestInfo::from_parts(&method, &uri, &headers);
            let ctx = state.create_context.create(info).await.map_err(|e| {
                EdgeStoreError::create_context("Error creating context").with_source(e)
            })?;
            init_response(&state, handler.init(ctx).await?)?
        }
        Endpoint::RequestUpload => {
            let body: RequestUploadBody = parse_body(&body)?;
            Json(handler.request_upload(ctx_token, body).await?).into_response()
        }
        Endpoint::RequestUploadParts => {
            let body: RequestUploadPartsBody = parse_body(&body)?;
            Json(handler.request_upload_parts(ctx_token, body).await?).into_response()
        }
        Endpoint::CompleteMultipartUpload => {
            let body: CompleteMultipartUploadBody = parse_body(&body)?;
            handler.complete_multipart_upload(ctx_token, body).await?;
            StatusCode::OK.into_response()
        }
        Endpoint::ConfirmUpload => {
            let body: ConfirmUploadBody = parse_body(&body)?;
            Json(handler.confirm_upload(ctx_token, body).await?).into_response()
        }
        Endpoint::DeleteFile => {
            let body: DeleteFileBody = parse_body(&body)?;
            Json(handler.delete_file(ctx_token, body).await?).into_response()
        }
        Endpoint::ProxyFile => proxy_file(&state, &uri, &headers).await?,
    };
    Ok(res)
}

fn init_response<C>(
    state: &EdgeStoreState<C>,
    outcome: edgestore_core::InitOutcome,
) -> Result<Response, EdgeStoreAxumError>
where
    C: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    let config = state.handler.config();
    let mut res = Json(outcome.body).into_response();

    let ctx_cookie = CookieSpec {
        name: &config.ctx_cookie,
        value: &outcome.ctx_token,
        max_age: config.ctx_max_age,
        http_only: true,
        secure: config.secure_cookies,
    };
    res.headers_mut().append(
        SET_COOKIE,
        HeaderValue::from_str(&ctx_cookie.to_header()).context("context cookie is not a valid header")?,
    );

    if let Some(token) = &outcome.provider_token {
        let token_cookie = CookieSpec {
            name: &config.token_cookie,
            value: token,
            max_age: config.ctx_max_age,
            http_only: false,
            secure: config.secure_cookies,
        };
        res.headers_mut().append(
            SET_COOKIE,
            HeaderValue::from_str(&token_cookie.to_header())
                .context("provider token cookie is not a valid header")?,
        );
    }
    Ok(res)
}

#[derive(Debug, Deserialize)]
struct ProxyQuery {
    url: Option<String>,
}

/// Development only: fetch a protected object same-origin, forwarding cookies.
async fn proxy_file<C>(
    state: &EdgeStoreState<C>,
    uri: &axum::http::Uri,
    headers: &HeaderMap,
) -> Result<Response, EdgeStoreAxumError>
where
    C: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    if !state.handler.config().development {
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    let Query(query) = Query::<ProxyQuery>::try_from_uri(uri)
        .map_err(|e| EdgeStoreError::bad_request(e.body_text()))?;
    let url = query
        .url
        .filter(|u| !u.is_empty())
        .ok_or_else(|| EdgeStoreError::bad_request("Missing url"))?;

    let base = state.handler.provider().base_url();
    let served = url
        .strip_prefix(base.trim_end_matches('/'))
        .is_some_and(|rest| rest.starts_with('/'));
    if !served {
        return Err(EdgeStoreError::bad_request("Invalid url").into());
    }

    let mut upstream = state.http.get(&url);
    if let Some(cookie) = headers.get(COOKIE) {
        upstream = upstream.header(COOKIE, cookie.clone());
    }
    let upstream = upstream.send().await.context("proxy-file request failed")?;

    let status = upstream.status();
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();
    let bytes = upstream.bytes().await.context("proxy-file body failed")?;
    tracing::debug!(url = %url, status = status.as_u16(), size = bytes.len(), "proxied file");

    let mut res = (status, bytes).into_response();
    if let Some(ct) = content_type {
        res.headers_mut().insert(CONTENT_TYPE, ct);
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_match_by_suffix() {
        assert_eq!(Endpoint::from_path("/api/edgestore/health"), Some(Endpoint::Health));
        assert_eq!(
            Endpoint::from_path("/x/request-upload-parts/"),
            Some(Endpoint::RequestUploadParts)
        );
        assert_eq!(Endpoint::from_path("/x/request-upload"), Some(Endpoint::RequestUpload));
        assert_eq!(Endpoint::from_path("/x/unknown"), None);
        assert_eq!(Endpoint::ProxyFile.method(), Method::GET);
        assert_eq!(Endpoint::DeleteFile.method(), Method::POST);
    }
}

//! Translation between a serverless runtime's JSON request/response events and
//! the axum router.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use serde::{Deserialize, Serialize};
use tower::ServiceExt;

const MAX_RESPONSE_BYTES: usize = 1024 * 1024;

/// Request as delivered by the hosting runtime
#[derive(Debug, Clone, Deserialize)]
pub struct PlatformRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: String,
}

/// Response in the shape the hosting runtime expects back
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PlatformResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

fn into_http(request: PlatformRequest) -> Result<Request<Body>> {
    let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", request.method))?;

    let mut builder = Request::builder().method(method).uri(&request.path);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
        .body(Body::from(request.body))
        .with_context(|| format!("Invalid request for {}", request.path))
}

async fn from_http(response: Response<Body>) -> Result<PlatformResponse> {
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_RESPONSE_BYTES)
        .await
        .context("Failed to read response body")?;

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    Ok(PlatformResponse {
        status: parts.status.as_u16(),
        headers,
        body: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Runs one runtime request through `router`.
pub async fn handle(router: Router, request: PlatformRequest) -> Result<PlatformResponse> {
    let request = into_http(request)?;
    let response = router.oneshot(request).await?;
    from_http(response).await
}

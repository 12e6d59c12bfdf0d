// crates/testbed-harness/src/client.rs
// ============================================================================
// Module: Test Client
// Description: In-process HTTP client for axum routers.
// Purpose: Invoke the service's routes directly, no listener or socket.
// Dependencies: axum, tower, http-body-util, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The test client drives an axum [`Router`] in-process with
//! `tower::ServiceExt::oneshot`: one cloned service call per request, no
//! bound port, no I/O outside the process. Default headers (typically the
//! tenant token) apply to every request, and responses are fully collected
//! so assertions see the complete body.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Router;
use axum::body::Body;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::http::Method;
use axum::http::Request;
use axum::http::StatusCode;
use http_body_util::BodyExt;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tower::ServiceExt;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Test client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Request construction failed.
    #[error("request build error: {0}")]
    Request(String),
    /// Response body collection failed.
    #[error("body read error: {0}")]
    Body(String),
    /// Response body was not valid UTF-8 or JSON.
    #[error("body decode error: {0}")]
    Decode(String),
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// In-process client over a cloned router per request.
#[derive(Debug, Clone)]
pub struct TestClient {
    /// Service under test.
    router: Router,
    /// Headers applied to every request.
    default_headers: Vec<(HeaderName, HeaderValue)>,
}

impl TestClient {
    /// Wraps a router.
    #[must_use]
    pub fn new(router: Router) -> Self {
        Self {
            router,
            default_headers: Vec::new(),
        }
    }

    /// Adds a header applied to every request.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Request`] when the name or value is malformed.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ClientError> {
        let name =
            HeaderName::try_from(name).map_err(|err| ClientError::Request(err.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|err| ClientError::Request(err.to_string()))?;
        self.default_headers.push((name, value));
        Ok(self)
    }

    /// Sends a GET request.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on build or body-collection failure.
    pub async fn get(&self, uri: &str) -> Result<TestResponse, ClientError> {
        self.send(Method::GET, uri, Body::empty(), None).await
    }

    /// Sends a DELETE request.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on build or body-collection failure.
    pub async fn delete(&self, uri: &str) -> Result<TestResponse, ClientError> {
        self.send(Method::DELETE, uri, Body::empty(), None).await
    }

    /// Sends a POST request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on serialization, build, or body failure.
    pub async fn post_json(&self, uri: &str, body: &JsonValue) -> Result<TestResponse, ClientError> {
        let bytes =
            serde_json::to_vec(body).map_err(|err| ClientError::Request(err.to_string()))?;
        self.send(Method::POST, uri, Body::from(bytes), Some("application/json")).await
    }

    /// Sends a PUT request with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on serialization, build, or body failure.
    pub async fn put_json(&self, uri: &str, body: &JsonValue) -> Result<TestResponse, ClientError> {
        let bytes =
            serde_json::to_vec(body).map_err(|err| ClientError::Request(err.to_string()))?;
        self.send(Method::PUT, uri, Body::from(bytes), Some("application/json")).await
    }

    /// Builds and dispatches one request through a cloned router.
    async fn send(
        &self,
        method: Method,
        uri: &str,
        body: Body,
        content_type: Option<&str>,
    ) -> Result<TestResponse, ClientError> {
        let mut builder = Request::builder().method(method).uri(uri);
        for (name, value) in &self.default_headers {
            builder = builder.header(name, value);
        }
        if let Some(content_type) = content_type {
            builder = builder.header("content-type", content_type);
        }
        let request = builder.body(body).map_err(|err| ClientError::Request(err.to_string()))?;
        let response = match self.router.clone().oneshot(request).await {
            Ok(response) => response,
            Err(infallible) => match infallible {},
        };
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .map_err(|err| ClientError::Body(err.to_string()))?
            .to_bytes();
        Ok(TestResponse {
            status,
            body: bytes.to_vec(),
        })
    }
}

// ============================================================================
// SECTION: Response
// ============================================================================

/// A fully-collected response.
#[derive(Debug, Clone)]
pub struct TestResponse {
    /// Response status.
    status: StatusCode,
    /// Complete response body.
    body: Vec<u8>,
}

impl TestResponse {
    /// Returns the response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Decodes the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] on invalid UTF-8.
    pub fn text(&self) -> Result<String, ClientError> {
        String::from_utf8(self.body.clone()).map_err(|err| ClientError::Decode(err.to_string()))
    }

    /// Decodes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Decode`] on invalid JSON.
    pub fn json(&self) -> Result<JsonValue, ClientError> {
        serde_json::from_slice(&self.body).map_err(|err| ClientError::Decode(err.to_string()))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use axum::Router;
    use axum::routing::get;
    use serde_json::json;

    use super::TestClient;

    /// Minimal router echoing a static document.
    fn echo_router() -> Router {
        Router::new().route("/health", get(|| async { "ok" }))
    }

    #[tokio::test]
    async fn get_collects_status_and_body() -> Result<(), String> {
        let client = TestClient::new(echo_router());
        let response = client.get("/health").await.map_err(|err| err.to_string())?;
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.text().map_err(|err| err.to_string())?, "ok");
        Ok(())
    }

    #[tokio::test]
    async fn missing_route_is_not_found() -> Result<(), String> {
        let client = TestClient::new(echo_router());
        let response = client.get("/absent").await.map_err(|err| err.to_string())?;
        assert_eq!(response.status().as_u16(), 404);
        Ok(())
    }

    #[tokio::test]
    async fn post_json_sets_content_type() -> Result<(), String> {
        let router = Router::new().route(
            "/echo",
            axum::routing::post(|body: axum::Json<serde_json::Value>| async move {
                axum::Json(body.0)
            }),
        );
        let client = TestClient::new(router);
        let response =
            client.post_json("/echo", &json!({"v": 1})).await.map_err(|err| err.to_string())?;
        assert_eq!(response.json().map_err(|err| err.to_string())?, json!({"v": 1}));
        Ok(())
    }
}

//! Outbound response builder.
//!
//! Handlers and middlewares build [`Response`] values; the kernel converts
//! them into axum responses at the edge.

use axum::body::Body;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::IntoResponse;
use bytes::Bytes;
use serde_json::{json, Value};

/// Buffered HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: axum::http::HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// JSON body with the given status
    pub fn json(status: StatusCode, body: &Value) -> Self {
        let mut response = Self::new(status);
        // Serializing a `Value` cannot fail: all map keys are strings
        response.body = Bytes::from(serde_json::to_vec(body).unwrap_or_default());
        response.headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        response
    }

    /// `{success: true, message, data}` with 200
    pub fn success(message: &str, data: Value) -> Self {
        Self::envelope(StatusCode::OK, message, Some(data))
    }

    /// `{success: true, message}` with 200 and no data
    pub fn message(message: &str) -> Self {
        Self::envelope(StatusCode::OK, message, None)
    }

    /// `{success: true, message, data}` with 201
    pub fn created(message: &str, data: Value) -> Self {
        Self::envelope(StatusCode::CREATED, message, Some(data))
    }

    /// `{success: false, message}` with the given status
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self::json(status, &json!({ "success": false, "message": message }))
    }

    fn envelope(status: StatusCode, message: &str, data: Option<Value>) -> Self {
        let mut body = json!({ "success": true, "message": message });
        if let Some(data) = data {
            body["data"] = data;
        }
        Self::json(status, &body)
    }

    /// 302 to `location`
    pub fn redirect(location: &str) -> Self {
        let mut response = Self::new(StatusCode::FOUND);
        if let Ok(value) = HeaderValue::from_str(location) {
            response.headers.insert(header::LOCATION, value);
        }
        response
    }

    /// Empty 204
    pub fn no_content() -> Self {
        Self::new(StatusCode::NO_CONTENT)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &axum::http::HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut axum::http::HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Builder-style header insert
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl IntoResponse for Response {
    fn into_response(self) -> axum::response::Response {
        let mut response = axum::response::Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

//! Inbound request wrapper.
//!
//! Carries everything a middleware or handler may need for one request:
//! the parsed HTTP parts, the buffered body, the route parameters filled in
//! by the router, the per-request session and, once the auth middleware
//! has run, the authenticated user.

use std::net::IpAddr;

use axum::http::{header, request::Parts, HeaderMap, Method};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::routing::RouteParams;
use crate::session::{AuthenticatedUser, Session};

/// Form/JSON field carrying the anti-forgery token
pub const CSRF_FIELD: &str = "csrf_token";

/// Header accepted as a fallback carrier for the anti-forgery token
pub const CSRF_HEADER: &str = "x-csrf-token";

pub struct Request {
    id: Uuid,
    method: Method,
    path: String,
    query: Option<String>,
    headers: HeaderMap,
    body: Bytes,
    client_ip: Option<IpAddr>,
    params: RouteParams,
    session: Session,
    user: Option<AuthenticatedUser>,
}

impl Request {
    pub fn from_parts(parts: Parts, body: Bytes, session: Session) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: normalize_path(parts.uri.path()),
            query: parts.uri.query().map(str::to_string),
            method: parts.method,
            headers: parts.headers,
            body,
            client_ip: None,
            params: RouteParams::default(),
            session,
            user: None,
        }
    }

    pub fn from_http(request: axum::http::Request<Bytes>, session: Session) -> Self {
        let (parts, body) = request.into_parts();
        Self::from_parts(parts, body, session)
    }

    pub fn with_client_ip(mut self, ip: Option<IpAddr>) -> Self {
        self.client_ip = ip;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path without query string; trailing slash removed except for `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path plus query string, used as the post-login intended URL
    pub fn full_path(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{q}", self.path),
            _ => self.path.clone(),
        }
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_ip
    }

    /// Query string parameter
    pub fn query(&self, key: &str) -> Option<String> {
        let query = self.query.as_deref()?;
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    // === Content negotiation ===

    pub fn is_json(&self) -> bool {
        self.header(header::CONTENT_TYPE.as_str())
            .is_some_and(|ct| ct.contains("application/json"))
    }

    /// The client wants JSON (API call or XHR) rather than a page
    pub fn expects_json(&self) -> bool {
        self.is_json()
            || self
                .header(header::ACCEPT.as_str())
                .is_some_and(|accept| accept.contains("application/json"))
            || self
                .header("x-requested-with")
                .is_some_and(|v| v.eq_ignore_ascii_case("XMLHttpRequest"))
    }

    /// Mutating methods need a CSRF token
    pub fn is_mutating(&self) -> bool {
        !matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS)
    }

    // === Body access ===

    /// Single input field from a JSON or form body
    pub fn input(&self, key: &str) -> Option<String> {
        if self.is_json() {
            let value: Value = serde_json::from_slice(&self.body).ok()?;
            return match value.get(key)? {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            };
        }
        url::form_urlencoded::parse(&self.body)
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Deserialize the body (JSON, or form fields as strings).
    ///
    /// An empty body deserializes from `{}` so optional fields default and
    /// field validation can report what is missing.
    pub fn payload<T: DeserializeOwned>(&self) -> Result<T, AppError> {
        let value = if self.body.iter().all(u8::is_ascii_whitespace) {
            Value::Object(Map::new())
        } else if self.is_json() {
            serde_json::from_slice(&self.body)
                .map_err(|_| AppError::BadRequest("Corps JSON invalide".to_string()))?
        } else {
            let fields = url::form_urlencoded::parse(&self.body)
                .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
                .collect::<Map<_, _>>();
            Value::Object(fields)
        };
        serde_json::from_value(value)
            .map_err(|e| AppError::BadRequest(format!("Corps de requête invalide: {e}")))
    }

    /// Anti-forgery token from the body field, falling back to the header
    pub fn csrf_input(&self) -> Option<String> {
        self.input(CSRF_FIELD)
            .or_else(|| self.header(CSRF_HEADER).map(str::to_string))
            .filter(|t| !t.is_empty())
    }

    // === Route parameters ===

    pub fn params(&self) -> &RouteParams {
        &self.params
    }

    pub(crate) fn set_params(&mut self, params: RouteParams) {
        self.params = params;
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Parameter by declaration order
    pub fn param_at(&self, index: usize) -> Option<&str> {
        self.params.at(index)
    }

    /// Numeric identifier parameter; anything else is a 404
    pub fn param_id(&self, name: &str) -> Result<i64, AppError> {
        self.param(name)
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| AppError::NotFound("Ressource introuvable".to_string()))
    }

    // === Session and identity ===

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub(crate) fn into_session(self) -> Session {
        self.session
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        self.user.as_ref()
    }

    pub fn require_user(&self) -> Result<&AuthenticatedUser, AppError> {
        self.user.as_ref().ok_or(AppError::AuthenticationRequired)
    }

    pub(crate) fn set_user(&mut self, user: AuthenticatedUser) {
        self.user = Some(user);
    }
}

/// Value of a cookie from a `Cookie` header map
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"').to_string())
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

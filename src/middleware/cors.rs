//! Cross-origin headers and preflight handling.

use axum::http::header::{self, HeaderName, HeaderValue, InvalidHeaderValue};
use axum::http::Method;
use tracing::debug;

use super::{Middleware, Next};
use crate::config::Config;
use crate::error::{AppError, HandlerResult};
use crate::http::{Request, Response};
use crate::kernel;
use crate::state::AppState;

pub const ALLOW_METHODS: &str = "GET, POST, PUT, PATCH, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str =
    "Content-Type, Authorization, X-Requested-With, X-CSRF-Token, Accept, Origin, Cache-Control";
pub const EXPOSE_HEADERS: &str = "Content-Length, Content-Type, X-Request-Id";

/// Adds CORS headers to every response and answers `OPTIONS` with 204.
///
/// Faults from inner links are rendered here so the headers still reach
/// cross-origin clients.
pub struct CorsMiddleware {
    enabled: bool,
    max_age_secs: u64,
}

impl CorsMiddleware {
    pub fn new(enabled: bool, max_age_secs: u64) -> Self {
        Self {
            enabled,
            max_age_secs: max_age_secs.min(crate::config::MAX_CORS_MAX_AGE_SECS),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.cors_enabled, config.cors_max_age_secs())
    }

    fn headers_for(
        &self,
        req: &Request,
    ) -> Result<Vec<(HeaderName, HeaderValue)>, InvalidHeaderValue> {
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("*"));
        Ok(vec![
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, origin),
            (
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOW_METHODS),
            ),
            (
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOW_HEADERS),
            ),
            (
                header::ACCESS_CONTROL_EXPOSE_HEADERS,
                HeaderValue::from_static(EXPOSE_HEADERS),
            ),
            (
                header::ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from_str(&self.max_age_secs.to_string())?,
            ),
        ])
    }
}

impl Middleware for CorsMiddleware {
    fn name(&self) -> &'static str {
        "Cors"
    }

    fn handle(&self, state: &AppState, req: &mut Request, next: Next<'_>) -> HandlerResult {
        if !self.enabled {
            return next.run(state, req);
        }

        let headers = self
            .headers_for(req)
            .map_err(|e| AppError::Middleware(format!("cannot build CORS headers: {e}")))?;

        let mut response = if *req.method() == Method::OPTIONS {
            debug!(path = %req.path(), "Answered CORS preflight");
            Response::no_content()
        } else {
            match next.run(state, req) {
                Ok(response) => response,
                Err(err) => kernel::render_fault(state, req, &err),
            }
        };

        let target = response.headers_mut();
        for (name, value) in headers {
            target.insert(name, value);
        }
        target.append(header::VARY, HeaderValue::from_static("Origin"));

        if !target.contains_key(header::SET_COOKIE) {
            let cookie = state.sessions.cookie_header(req.session());
            let cookie = HeaderValue::from_str(&cookie)
                .map_err(|e| AppError::Middleware(format!("invalid session cookie: {e}")))?;
            target.insert(header::SET_COOKIE, cookie);
        }

        Ok(response)
    }
}

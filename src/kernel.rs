//! Per-request pipeline driver.
//!
//! ```text
//! axum fallback ─▶ buffer body ─▶ start session ─▶ resolve route
//!      ─▶ globals + route middleware + handler ─▶ render faults
//!      ─▶ flush session ─▶ session cookie + X-Request-Id
//! ```
//!
//! Everything after body buffering is synchronous and runs on the blocking
//! pool.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::{ConnectInfo, State};
use axum::http::header::{self, HeaderName, HeaderValue};
use axum::http::request::Parts;
use axum::http::Method;
use axum::response::IntoResponse;
use bytes::Bytes;
use tracing::{debug, error, info_span, warn};

use crate::error::{AppError, HandlerResult};
use crate::http::{cookie_value, Request, Response};
use crate::middleware::{Handler, Middleware, Next};
use crate::routing::Resolution;
use crate::state::AppState;
use crate::MAX_BODY_SIZE;

pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Axum fallback: every request enters the pipeline here
pub async fn dispatch(
    State(state): State<AppState>,
    request: axum::extract::Request,
) -> axum::response::Response {
    let (parts, body) = request.into_parts();
    let client_ip = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let body = match axum::body::to_bytes(body, MAX_BODY_SIZE).await {
        Ok(body) => body,
        Err(err) => {
            warn!(error = %err, "Rejected request body");
            return AppError::PayloadTooLarge
                .to_response(state.config.debug)
                .into_response();
        }
    };

    let debug = state.config.debug;
    let span = tracing::Span::current();
    let task = move || span.in_scope(|| handle(&state, parts, body, client_ip));
    match tokio::task::spawn_blocking(task).await {
        Ok(response) => response.into_response(),
        Err(err) => {
            error!(error = %err, "Request task failed");
            AppError::Internal(err.to_string())
                .to_response(debug)
                .into_response()
        }
    }
}

/// Run one request through session, routing and the middleware chain
pub fn handle(state: &AppState, parts: Parts, body: Bytes, client_ip: Option<IpAddr>) -> Response {
    let cookie = cookie_value(&parts.headers, state.sessions.cookie_name());
    let session = match state.sessions.start(cookie.as_deref()) {
        Ok(session) => session,
        Err(err) => {
            error!(error = %err, "Cannot start session");
            return AppError::from(err).to_response(state.config.debug);
        }
    };

    let mut req = Request::from_parts(parts, body, session).with_client_ip(client_ip);
    let span = info_span!(
        "request",
        request_id = %req.id(),
        method = %req.method(),
        path = %req.path(),
    );
    let _guard = span.enter();

    let response = match run(state, &mut req) {
        Ok(response) => response,
        Err(err) => render_fault(state, &req, &err),
    };
    finish(state, req, response)
}

fn run(state: &AppState, req: &mut Request) -> HandlerResult {
    match state.routes.resolve(req.method(), req.path()) {
        Ok(Resolution::Matched { route, params }) => {
            debug!(route = route.name().unwrap_or(route.pattern()), "Route matched");
            req.set_params(params);
            let chain: Vec<Arc<dyn Middleware>> = state
                .globals
                .iter()
                .chain(route.middleware())
                .cloned()
                .collect();
            Next::new(&chain, route.handler()).run(state, req)
        }
        Ok(Resolution::Preflight { allowed }) => {
            Next::new(&state.globals, &Unrouted::NotAllowed(allowed)).run(state, req)
        }
        Err(AppError::MethodNotAllowed { allowed }) => {
            Next::new(&state.globals, &Unrouted::NotAllowed(allowed)).run(state, req)
        }
        Err(_) => Next::new(&state.globals, &Unrouted::NotFound).run(state, req),
    }
}

/// Terminal for requests no route serves; globals still wrap it
enum Unrouted {
    NotFound,
    NotAllowed(Vec<Method>),
}

impl Handler for Unrouted {
    fn call(&self, _state: &AppState, req: &mut Request) -> HandlerResult {
        match self {
            Unrouted::NotFound => Err(AppError::RouteNotFound {
                method: req.method().clone(),
                path: req.path().to_string(),
            }),
            Unrouted::NotAllowed(allowed) => Err(AppError::MethodNotAllowed {
                allowed: allowed.clone(),
            }),
        }
    }
}

/// Log a fault and render it as the JSON envelope
pub(crate) fn render_fault(state: &AppState, req: &Request, err: &AppError) -> Response {
    if err.is_server_fault() {
        error!(request_id = %req.id(), error = %err, "Request failed");
    } else {
        debug!(status = err.status().as_u16(), reason = %err, "Request rejected");
    }
    err.to_response(state.config.debug)
}

fn finish(state: &AppState, req: Request, mut response: Response) -> Response {
    let request_id = req.id();
    let session = req.into_session();

    if let Err(err) = state.sessions.flush(&session) {
        error!(error = %err, "Cannot persist session");
        response = AppError::from(err).to_response(state.config.debug);
    }

    let cookie_changed =
        session.is_new() || session.is_destroyed() || session.replaced_id().is_some();
    if cookie_changed && !response.headers().contains_key(header::SET_COOKIE) {
        match HeaderValue::from_str(&state.sessions.cookie_header(&session)) {
            Ok(cookie) => {
                response.headers_mut().insert(header::SET_COOKIE, cookie);
            }
            Err(err) => error!(error = %err, "Cannot encode session cookie"),
        }
    }

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    debug!(status = response.status().as_u16(), "Request completed");
    response
}

use serde_json::json;

use crate::error::HandlerResult;
use crate::http::{Request, Response};
use crate::state::AppState;

/// GET /health - Liveness check
pub fn check(_state: &AppState, _req: &mut Request) -> HandlerResult {
    Ok(Response::success(
        "Service opérationnel",
        json!({
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
        }),
    ))
}

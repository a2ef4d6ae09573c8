//! # Evaluation Backend
//!
//! Academic evaluation management API: users with roles, matières,
//! evaluations and their notes, served through a session-based request
//! pipeline.
//!
//! ## Design Principles
//!
//! - **One pipeline**: every request goes through the same router and
//!   middleware chain, including 404/405 answers
//! - **Declarative routes**: patterns, constraints, names and middleware
//!   are declared once in [`routes`] and compiled into a [`RouteTable`]
//! - **Session auth**: cookie sessions with rotation on login and a CSRF
//!   token on every mutating request
//! - **No secrets in logs**: passwords, session ids and tokens are never
//!   logged
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌──────────────────────────────────────────────┐
//! │  Client  │────▶│ axum fallback ─▶ kernel ─▶ Cors ─▶ RateLimit │
//! └──────────┘     │       ─▶ route middleware ─▶ controller      │
//!                  └───────────────┬──────────────────────────────┘
//!                            ┌─────┴──────┐
//!                         Sessions      Store
//!                        (+ CSRF)    (in-memory)
//! ```
//!
//! ## API Overview
//!
//! | Endpoint | Method | Middleware |
//! |----------|--------|------------|
//! | `/health` | GET | |
//! | `/auth/csrf-token` | GET | |
//! | `/auth/login` | GET, POST | |
//! | `/auth/register` | POST | |
//! | `/auth/logout` | POST | Auth |
//! | `/auth/me` | GET | Auth |
//! | `/auth/change-password` | PUT | Auth |
//! | `/users` | GET | Auth, Admin |
//! | `/users/:id` | GET, PUT | Auth |
//! | `/users/:id` | DELETE | Auth, Admin |
//! | `/evaluations` | GET | Auth |
//! | `/evaluations` | POST | Auth:professor |
//! | `/evaluations/:id` | GET | Auth |
//! | `/evaluations/:id` | PUT | Auth:professor |
//! | `/evaluations/:id` | DELETE | Auth, Admin |
//! | `/evaluations/:id/notes` | POST | Auth:professor |
//! | `/matieres`, `/matieres/:id` | GET | Auth |
//! | `/matieres`, `/matieres/:id` | POST, PUT, DELETE | Auth, Admin |
//! | `/{admin,professor,student}/dashboard` | GET | Auth + role |

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod http;
pub mod kernel;
pub mod middleware;
pub mod models;
pub mod policy;
pub mod routes;
pub mod routing;
pub mod session;
pub mod state;
pub mod store;
pub mod sweeper;
pub mod validation;

pub use config::Config;
pub use error::{AppError, HandlerResult};
pub use http::{Request, Response};
pub use routing::{RouteTable, Router};
pub use state::AppState;
pub use store::Store;

use tower::ServiceBuilder;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Maximum request body size (64 KiB).
pub const MAX_BODY_SIZE: usize = 64 * 1024;

/// Build the Axum service: every path is handed to the pipeline kernel.
pub fn build_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .fallback(kernel::dispatch)
        // Middleware stack (first listed = outermost)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE)),
        )
        .with_state(state)
}

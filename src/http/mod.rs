//! Request/response abstraction used by the pipeline.
//!
//! # Data Flow
//! ```text
//! axum request
//!     → request.rs (buffer body, normalize path, attach session)
//!     → [router + middleware chain + handler]
//!     → response.rs (status, headers, JSON envelope)
//!     → axum response
//! ```

pub mod request;
pub mod response;

pub use request::{cookie_value, Request, CSRF_FIELD, CSRF_HEADER};
pub use response::Response;

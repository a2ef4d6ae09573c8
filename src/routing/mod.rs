//! Declarative route table.
//!
//! Routes are registered on a [`Router`] (optionally inside nested groups),
//! then compiled once by [`Router::build`] into an immutable [`RouteTable`].
//!
//! ```text
//! router.get("/users/:id", users::show)
//!       .with("id", r"\d+")
//!       .middleware("Auth")
//!       .name("users.show");
//!
//! router.group("/admin", |g| {
//!     g.middleware("Auth").middleware("Admin");
//!     g.get("/dashboard", dashboard::admin).name("admin.dashboard");
//! });
//! ```
//!
//! Resolution is first-match-wins in registration order.

mod params;
mod pattern;
mod router;
mod table;

pub use params::RouteParams;
pub use router::{RouteGroup, RouteHandle, Router, Routes};
pub use table::{Resolution, Route, RouteTable};

/// Route table construction and URL generation failures
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("route '{pattern}' has no parameter named '{param}'")]
    UnknownParameter { pattern: String, param: String },

    #[error("unknown middleware '{0}'")]
    UnknownMiddleware(String),

    #[error("middleware '{name}' rejected its arguments: {reason}")]
    MiddlewareArguments { name: String, reason: String },

    #[error("route name '{0}' is already registered")]
    DuplicateName(String),

    #[error("no route named '{0}'")]
    UnknownRoute(String),

    #[error("cannot build url for route '{name}': {reason}")]
    UrlGeneration { name: String, reason: String },
}

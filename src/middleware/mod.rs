//! Middleware chain.
//!
//! A request runs through the global middlewares, then the route's own
//! middlewares in attachment order, then the route handler:
//!
//! ```text
//! Cors → RateLimit → Auth → Admin → handler
//!   ◀──────── response flows back ────────
//! ```
//!
//! Each link receives a [`Next`] continuation. It may call it (optionally
//! decorating the response), answer on its own, or return an [`AppError`].

mod admin;
mod auth;
mod cors;
mod rate_limit;

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

pub use admin::AdminMiddleware;
pub use auth::{AuthMiddleware, AuthStage};
pub use cors::CorsMiddleware;
pub use rate_limit::{RateLimitMiddleware, RateLimiter};

use crate::config::Config;
use crate::error::HandlerResult;
use crate::http::Request;
use crate::routing::RouteError;
use crate::state::AppState;

/// Terminal request handler (controller action)
pub trait Handler: Send + Sync {
    fn call(&self, state: &AppState, req: &mut Request) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&AppState, &mut Request) -> HandlerResult + Send + Sync,
{
    fn call(&self, state: &AppState, req: &mut Request) -> HandlerResult {
        self(state, req)
    }
}

/// One link of the chain
pub trait Middleware: Send + Sync {
    /// Name used in the registry and in logs
    fn name(&self) -> &'static str;

    fn handle(&self, state: &AppState, req: &mut Request, next: Next<'_>) -> HandlerResult;
}

/// Continuation over the remaining links and the handler
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    endpoint: &'a dyn Handler,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Arc<dyn Middleware>], endpoint: &'a dyn Handler) -> Self {
        Self { chain, endpoint }
    }

    /// Run the next link, or the handler once the chain is exhausted
    pub fn run(self, state: &AppState, req: &mut Request) -> HandlerResult {
        match self.chain.split_first() {
            Some((head, rest)) => {
                trace!(middleware = head.name(), "Entering middleware");
                head.handle(state, req, Next::new(rest, self.endpoint))
            }
            None => self.endpoint.call(state, req),
        }
    }
}

/// Middleware attached to a route, by registry name or as an instance
#[derive(Clone)]
pub enum MiddlewareRef {
    /// `"Name"` or `"Name:arg1,arg2"`
    Named(String),
    Instance(Arc<dyn Middleware>),
}

impl From<&str> for MiddlewareRef {
    fn from(name: &str) -> Self {
        MiddlewareRef::Named(name.to_string())
    }
}

impl From<String> for MiddlewareRef {
    fn from(name: String) -> Self {
        MiddlewareRef::Named(name)
    }
}

impl From<Arc<dyn Middleware>> for MiddlewareRef {
    fn from(middleware: Arc<dyn Middleware>) -> Self {
        MiddlewareRef::Instance(middleware)
    }
}

type Factory = Box<dyn Fn(&[&str]) -> Result<Arc<dyn Middleware>, RouteError> + Send + Sync>;

/// Name → factory map used when the route table is built
#[derive(Default)]
pub struct MiddlewareRegistry {
    factories: HashMap<String, Factory>,
}

impl MiddlewareRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `Cors`, `RateLimit`, `Auth` and `Admin`
    pub fn with_defaults(config: &Config) -> Self {
        let mut registry = Self::new();

        let cors = Arc::new(CorsMiddleware::from_config(config));
        registry.register("Cors", move |args| {
            no_arguments("Cors", args)?;
            Ok(cors.clone() as Arc<dyn Middleware>)
        });
        registry.register("RateLimit", |args| {
            no_arguments("RateLimit", args)?;
            Ok(Arc::new(RateLimitMiddleware) as Arc<dyn Middleware>)
        });
        registry.register("Auth", |roles| {
            Ok(Arc::new(AuthMiddleware::with_roles(roles)) as Arc<dyn Middleware>)
        });
        registry.register("Admin", |args| {
            no_arguments("Admin", args)?;
            Ok(Arc::new(AdminMiddleware) as Arc<dyn Middleware>)
        });

        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&[&str]) -> Result<Arc<dyn Middleware>, RouteError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate `"Name"` or `"Name:arg1,arg2"`
    pub fn build(&self, descriptor: &str) -> Result<Arc<dyn Middleware>, RouteError> {
        let (name, args) = match descriptor.split_once(':') {
            Some((name, args)) => (name.trim(), args),
            None => (descriptor.trim(), ""),
        };
        let args: Vec<&str> = args
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .collect();

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RouteError::UnknownMiddleware(name.to_string()))?;
        factory(&args)
    }

    pub fn resolve(&self, middleware: &MiddlewareRef) -> Result<Arc<dyn Middleware>, RouteError> {
        match middleware {
            MiddlewareRef::Named(descriptor) => self.build(descriptor),
            MiddlewareRef::Instance(instance) => Ok(instance.clone()),
        }
    }
}

fn no_arguments(name: &str, args: &[&str]) -> Result<(), RouteError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(RouteError::MiddlewareArguments {
            name: name.to_string(),
            reason: "takes no arguments".to_string(),
        })
    }
}

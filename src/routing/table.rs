use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use super::pattern::RoutePattern;
use super::{RouteError, RouteParams};
use crate::error::AppError;
use crate::middleware::{Handler, Middleware};

/// Compiled route
pub struct Route {
    method: Method,
    pattern: RoutePattern,
    handler: Arc<dyn Handler>,
    middleware: Vec<Arc<dyn Middleware>>,
    name: Option<String>,
}

impl Route {
    pub(crate) fn new(
        method: Method,
        pattern: RoutePattern,
        handler: Arc<dyn Handler>,
        middleware: Vec<Arc<dyn Middleware>>,
        name: Option<String>,
    ) -> Self {
        Self {
            method,
            pattern,
            handler,
            middleware,
            name,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &str {
        self.pattern.source()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Route-level middleware, outermost first
    pub fn middleware(&self) -> &[Arc<dyn Middleware>] {
        &self.middleware
    }

    pub fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

/// Outcome of a successful lookup
pub enum Resolution<'a> {
    Matched {
        route: &'a Route,
        params: RouteParams,
    },
    /// `OPTIONS` on a path only served under other methods
    Preflight { allowed: Vec<Method> },
}

/// Immutable, ordered route table
pub struct RouteTable {
    routes: Vec<Route>,
    names: HashMap<String, usize>,
}

impl RouteTable {
    pub(crate) fn new(routes: Vec<Route>) -> Result<Self, RouteError> {
        let mut names = HashMap::new();
        for (index, route) in routes.iter().enumerate() {
            if let Some(name) = route.name() {
                if names.insert(name.to_string(), index).is_some() {
                    return Err(RouteError::DuplicateName(name.to_string()));
                }
            }
        }
        Ok(Self { routes, names })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }

    /// Find the first route matching `method` and `path`.
    ///
    /// `HEAD` is served by `GET` routes. A path known only under other
    /// methods yields 405 with the allowed set, or a preflight for `OPTIONS`.
    pub fn resolve(&self, method: &Method, path: &str) -> Result<Resolution<'_>, AppError> {
        let mut allowed: Vec<Method> = Vec::new();
        for route in &self.routes {
            if !route.pattern.is_match(path) {
                continue;
            }
            let serves = route.method == *method
                || (*method == Method::HEAD && route.method == Method::GET);
            if serves {
                let params = route.pattern.captures(path).unwrap_or_default();
                return Ok(Resolution::Matched { route, params });
            }
            if !allowed.contains(&route.method) {
                allowed.push(route.method.clone());
            }
        }

        if allowed.is_empty() {
            Err(AppError::RouteNotFound {
                method: method.clone(),
                path: path.to_string(),
            })
        } else if *method == Method::OPTIONS {
            Ok(Resolution::Preflight { allowed })
        } else {
            Err(AppError::MethodNotAllowed { allowed })
        }
    }

    /// Path of the named route with `params` substituted
    pub fn url_for(&self, name: &str, params: &[(&str, &str)]) -> Result<String, RouteError> {
        let index = self
            .names
            .get(name)
            .ok_or_else(|| RouteError::UnknownRoute(name.to_string()))?;
        self.routes[*index]
            .pattern
            .expand(params)
            .map_err(|reason| RouteError::UrlGeneration {
                name: name.to_string(),
                reason,
            })
    }

    /// Name of the route that would serve `method path`
    pub fn name_of(&self, method: &Method, path: &str) -> Option<&str> {
        match self.resolve(method, path) {
            Ok(Resolution::Matched { route, .. }) => route.name(),
            _ => None,
        }
    }
}

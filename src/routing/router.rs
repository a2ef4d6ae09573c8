use std::sync::Arc;

use axum::http::Method;

use super::pattern::RoutePattern;
use super::table::{Route, RouteTable};
use super::RouteError;
use crate::middleware::{Handler, MiddlewareRef, MiddlewareRegistry};

/// A route as declared, before compilation
pub struct RouteDef {
    method: Method,
    pattern: String,
    handler: Arc<dyn Handler>,
    middleware: Vec<MiddlewareRef>,
    constraints: Vec<(String, String)>,
    name: Option<String>,
}

/// Registration surface shared by [`Router`] and [`RouteGroup`]
pub trait Routes {
    #[doc(hidden)]
    fn definitions(&mut self) -> &mut Vec<RouteDef>;

    fn register<H>(&mut self, method: Method, pattern: &str, handler: H) -> RouteHandle<'_>
    where
        H: Handler + 'static,
    {
        let definitions = self.definitions();
        let index = definitions.len();
        definitions.push(RouteDef {
            method,
            pattern: pattern.to_string(),
            handler: Arc::new(handler),
            middleware: Vec::new(),
            constraints: Vec::new(),
            name: None,
        });
        RouteHandle {
            def: &mut definitions[index],
        }
    }

    fn get<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> RouteHandle<'_> {
        self.register(Method::GET, pattern, handler)
    }

    fn post<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> RouteHandle<'_> {
        self.register(Method::POST, pattern, handler)
    }

    fn put<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> RouteHandle<'_> {
        self.register(Method::PUT, pattern, handler)
    }

    fn patch<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> RouteHandle<'_> {
        self.register(Method::PATCH, pattern, handler)
    }

    fn delete<H: Handler + 'static>(&mut self, pattern: &str, handler: H) -> RouteHandle<'_> {
        self.register(Method::DELETE, pattern, handler)
    }

    /// Register routes under `prefix`; the group's middleware wraps theirs
    fn group<F>(&mut self, prefix: &str, build: F)
    where
        F: FnOnce(&mut RouteGroup),
    {
        let mut group = RouteGroup {
            prefix: prefix.to_string(),
            middleware: Vec::new(),
            definitions: Vec::new(),
        };
        build(&mut group);
        let routes = group.finish();
        self.definitions().extend(routes);
    }
}

/// Builder returned by registration; refines the route just added
pub struct RouteHandle<'a> {
    def: &'a mut RouteDef,
}

impl RouteHandle<'_> {
    /// Replace the default `[^/]+` regex of one parameter
    pub fn with(self, param: &str, regex: &str) -> Self {
        self.def
            .constraints
            .push((param.to_string(), regex.to_string()));
        self
    }

    /// Append a middleware; the first attached runs outermost
    pub fn middleware(self, middleware: impl Into<MiddlewareRef>) -> Self {
        self.def.middleware.push(middleware.into());
        self
    }

    /// Name the route for `url_for` / `name_of`
    pub fn name(self, name: &str) -> Self {
        self.def.name = Some(name.to_string());
        self
    }
}

/// Prefix scope used only while the table is being declared
pub struct RouteGroup {
    prefix: String,
    middleware: Vec<MiddlewareRef>,
    definitions: Vec<RouteDef>,
}

impl RouteGroup {
    pub fn middleware(&mut self, middleware: impl Into<MiddlewareRef>) -> &mut Self {
        self.middleware.push(middleware.into());
        self
    }

    fn finish(self) -> Vec<RouteDef> {
        let RouteGroup {
            prefix,
            middleware,
            definitions,
        } = self;
        definitions
            .into_iter()
            .map(|mut def| {
                def.pattern = join(&prefix, &def.pattern);
                let own = std::mem::take(&mut def.middleware);
                def.middleware = middleware.iter().cloned().chain(own).collect();
                def
            })
            .collect()
    }
}

impl Routes for RouteGroup {
    fn definitions(&mut self) -> &mut Vec<RouteDef> {
        &mut self.definitions
    }
}

/// Mutable route declarations; compiled by [`Router::build`]
#[derive(Default)]
pub struct Router {
    definitions: Vec<RouteDef>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of declared routes
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Compile patterns and resolve middleware names into a [`RouteTable`]
    pub fn build(self, registry: &MiddlewareRegistry) -> Result<RouteTable, RouteError> {
        let mut routes = Vec::with_capacity(self.definitions.len());
        for def in self.definitions {
            let pattern = RoutePattern::compile(&def.pattern, &def.constraints)?;
            let middleware = def
                .middleware
                .iter()
                .map(|m| registry.resolve(m))
                .collect::<Result<Vec<_>, _>>()?;
            routes.push(Route::new(
                def.method,
                pattern,
                def.handler,
                middleware,
                def.name,
            ));
        }
        RouteTable::new(routes)
    }
}

impl Routes for Router {
    fn definitions(&mut self) -> &mut Vec<RouteDef> {
        &mut self.definitions
    }
}

fn join(prefix: &str, path: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::{AppError, HandlerResult};
    use crate::http::{Request, Response};
    use crate::routing::Resolution;
    use crate::state::AppState;

    fn ok(_: &AppState, _: &mut Request) -> HandlerResult {
        Ok(Response::no_content())
    }

    fn registry() -> MiddlewareRegistry {
        MiddlewareRegistry::with_defaults(&Config::default())
    }

    fn matched<'a>(table: &'a RouteTable, method: Method, path: &str) -> (&'a Route, Vec<String>) {
        match table.resolve(&method, path) {
            Ok(Resolution::Matched { route, params }) => {
                (route, params.iter().map(|(_, v)| v.to_string()).collect())
            }
            other => panic!("expected a match for {method} {path}, got {:?}", other.err()),
        }
    }

    #[test]
    fn resolves_params() {
        let mut router = Router::new();
        router.get("/users/:id", ok).name("users.show");
        let table = router.build(&registry()).unwrap();

        let (route, params) = matched(&table, Method::GET, "/users/42");
        assert_eq!(route.name(), Some("users.show"));
        assert_eq!(params, vec!["42"]);
    }

    #[test]
    fn first_registered_match_wins() {
        let mut router = Router::new();
        router.get("/users/me", ok).name("users.me");
        router.get("/users/:id", ok).name("users.show");
        let table = router.build(&registry()).unwrap();

        assert_eq!(matched(&table, Method::GET, "/users/me").0.name(), Some("users.me"));
        assert_eq!(matched(&table, Method::GET, "/users/3").0.name(), Some("users.show"));
    }

    #[test]
    fn wrong_method_is_405_and_unknown_path_is_404() {
        let mut router = Router::new();
        router.get("/users/:id", ok);
        router.put("/users/:id", ok);
        let table = router.build(&registry()).unwrap();

        match table.resolve(&Method::DELETE, "/users/5") {
            Err(AppError::MethodNotAllowed { allowed }) => {
                assert_eq!(allowed, vec![Method::GET, Method::PUT]);
            }
            other => panic!("expected 405, got {:?}", other.err()),
        }
        assert!(matches!(
            table.resolve(&Method::GET, "/nowhere"),
            Err(AppError::RouteNotFound { .. })
        ));
    }

    #[test]
    fn options_on_known_path_is_preflight() {
        let mut router = Router::new();
        router.post("/evaluations", ok);
        let table = router.build(&registry()).unwrap();

        assert!(matches!(
            table.resolve(&Method::OPTIONS, "/evaluations"),
            Ok(Resolution::Preflight { .. })
        ));
        assert!(table.resolve(&Method::OPTIONS, "/nowhere").is_err());
    }

    #[test]
    fn head_falls_back_to_get() {
        let mut router = Router::new();
        router.get("/health", ok);
        let table = router.build(&registry()).unwrap();
        assert!(matches!(
            table.resolve(&Method::HEAD, "/health"),
            Ok(Resolution::Matched { .. })
        ));
    }

    #[test]
    fn constraint_filters_candidates() {
        let mut router = Router::new();
        router.get("/users/:id", ok).with("id", r"\d+").name("users.show");
        let table = router.build(&registry()).unwrap();

        assert!(table.resolve(&Method::GET, "/users/7").is_ok());
        assert!(matches!(
            table.resolve(&Method::GET, "/users/abc"),
            Err(AppError::RouteNotFound { .. })
        ));
    }

    #[test]
    fn groups_nest_prefixes_and_middleware() {
        let mut router = Router::new();
        router.group("/admin", |admin| {
            admin.middleware("Auth");
            admin.group("/reports", |reports| {
                reports.middleware("Admin");
                reports.get("/", ok).middleware("RateLimit").name("admin.reports");
            });
        });
        let table = router.build(&registry()).unwrap();

        let (route, _) = matched(&table, Method::GET, "/admin/reports");
        let names: Vec<&str> = route.middleware().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["Auth", "Admin", "RateLimit"]);
        assert_eq!(route.pattern(), "/admin/reports");
    }

    #[test]
    fn unknown_middleware_fails_build() {
        let mut router = Router::new();
        router.get("/x", ok).middleware("Teleport");
        assert!(matches!(
            router.build(&registry()),
            Err(RouteError::UnknownMiddleware(name)) if name == "Teleport"
        ));
    }

    #[test]
    fn duplicate_names_fail_build() {
        let mut router = Router::new();
        router.get("/a", ok).name("dup");
        router.get("/b", ok).name("dup");
        assert!(matches!(
            router.build(&registry()),
            Err(RouteError::DuplicateName(_))
        ));
    }

    #[test]
    fn names_resolve_both_ways() {
        let mut router = Router::new();
        router.get("/users/:id", ok).with("id", r"\d+").name("users.show");
        let table = router.build(&registry()).unwrap();

        assert_eq!(table.url_for("users.show", &[("id", "9")]).unwrap(), "/users/9");
        assert_eq!(table.name_of(&Method::GET, "/users/9"), Some("users.show"));
        assert_eq!(table.name_of(&Method::POST, "/users/9"), None);
        assert!(matches!(
            table.url_for("missing", &[]),
            Err(RouteError::UnknownRoute(_))
        ));
        assert!(matches!(
            table.url_for("users.show", &[("id", "nine")]),
            Err(RouteError::UrlGeneration { .. })
        ));
    }

    #[test]
    fn trailing_slash_is_ignored_in_patterns() {
        let mut router = Router::new();
        router.get("/matieres/", ok);
        let table = router.build(&registry()).unwrap();
        assert!(table.resolve(&Method::GET, "/matieres").is_ok());
    }
}

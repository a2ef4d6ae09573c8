//! Shared application state.

use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::Config;
use crate::error::AppError;
use crate::middleware::{Middleware, MiddlewareRegistry, RateLimiter};
use crate::routes::app_routes;
use crate::routing::{RouteTable, Router};
use crate::session::{CsrfGuard, MemorySessionStore, SessionManager, SessionStore};
use crate::store::Store;

/// Application state shared across requests
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Store,
    pub sessions: SessionManager,
    pub csrf: CsrfGuard,
    pub auth: AuthService,
    pub rate_limiter: Arc<RateLimiter>,
    pub routes: Arc<RouteTable>,
    /// Middlewares wrapping every request, outermost first
    pub globals: Arc<Vec<Arc<dyn Middleware>>>,
}

impl AppState {
    /// State serving the application routes with in-memory sessions
    pub fn new(config: Config) -> Result<Self, AppError> {
        Self::with_routes(config, app_routes())
    }

    pub fn with_routes(config: Config, router: Router) -> Result<Self, AppError> {
        Self::build(config, router, Arc::new(MemorySessionStore::new()))
    }

    /// Full constructor with an injected session backend
    pub fn build(
        config: Config,
        router: Router,
        session_store: Arc<dyn SessionStore>,
    ) -> Result<Self, AppError> {
        let registry = MiddlewareRegistry::with_defaults(&config);
        let routes = router.build(&registry)?;

        let mut globals = vec![registry.build("Cors")?];
        if config.rate_limit_enabled {
            globals.push(registry.build("RateLimit")?);
        }

        let store = Store::seeded(&config)?;
        Ok(Self {
            sessions: SessionManager::new(session_store, &config),
            csrf: CsrfGuard::new(config.csrf_token_lifetime),
            auth: AuthService::new(store.clone(), config.password_hash_iterations),
            rate_limiter: Arc::new(RateLimiter::from_config(&config)),
            routes: Arc::new(routes),
            globals: Arc::new(globals),
            store,
            config: Arc::new(config),
        })
    }
}

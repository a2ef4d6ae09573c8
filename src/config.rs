//! Configuration for the evaluation backend.
//!
//! All configuration is loaded from environment variables.
//! No secrets are logged.

use std::time::Duration;

/// Upper bound for `Access-Control-Max-Age` (24 hours)
pub const MAX_CORS_MAX_AGE_SECS: u64 = 24 * 3600;

/// Shortest sweeper period; `tokio::time::interval` rejects zero
pub const MIN_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// Default CSRF token lifetime (1 hour)
pub const DEFAULT_CSRF_LIFETIME_SECS: u64 = 3600;

/// Server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,

    /// Server port
    pub port: u16,

    /// Debug mode: error bodies include internal details
    pub debug: bool,

    // === CORS ===
    /// Emit cross-origin headers and answer preflight requests
    pub cors_enabled: bool,

    /// Preflight cache duration, capped at 24 hours
    pub cors_max_age: Duration,

    // === Rate limiting ===
    /// Register the rate limiter as a global middleware
    pub rate_limit_enabled: bool,

    /// Sustained requests per second per client
    pub rate_limit_rps: u32,

    /// Bucket capacity per client
    pub rate_limit_burst: u32,

    // === Sessions ===
    /// Session cookie name (default: PHPSESSID)
    pub session_cookie_name: String,

    /// Add the `Secure` attribute to the session cookie
    pub session_cookie_secure: bool,

    /// Inactivity window after which a session expires (default: 2 hours)
    pub session_lifetime: Duration,

    /// CSRF token lifetime (default: 1 hour)
    pub csrf_token_lifetime: Duration,

    /// Sweeper interval for expired sessions and tokens (default: 60 seconds)
    pub cleanup_interval: Duration,

    // === Accounts ===
    /// PBKDF2 iterations for password hashes
    pub password_hash_iterations: u32,

    /// Seeded administrator account
    pub admin_email: String,

    /// Seeded administrator password
    pub admin_password: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT").unwrap_or(8080),
            debug: env_flag("APP_DEBUG").unwrap_or(false),

            cors_enabled: env_flag("CORS_ENABLED").unwrap_or(true),
            cors_max_age: Duration::from_secs(
                env_parse::<u64>("CORS_MAX_AGE_SECS")
                    .unwrap_or(3600)
                    .min(MAX_CORS_MAX_AGE_SECS),
            ),

            rate_limit_enabled: env_flag("RATE_LIMIT_ENABLED").unwrap_or(false),
            rate_limit_rps: env_parse("RATE_LIMIT_RPS").unwrap_or(10),
            rate_limit_burst: env_parse("RATE_LIMIT_BURST").unwrap_or(20),

            session_cookie_name: std::env::var("SESSION_COOKIE_NAME")
                .unwrap_or_else(|_| "PHPSESSID".to_string()),
            session_cookie_secure: env_flag("SESSION_COOKIE_SECURE").unwrap_or(false),
            session_lifetime: Duration::from_secs(
                env_parse("SESSION_LIFETIME_SECS").unwrap_or(2 * 3600),
            ),
            csrf_token_lifetime: Duration::from_secs(
                env_parse("CSRF_TOKEN_LIFETIME_SECS").unwrap_or(DEFAULT_CSRF_LIFETIME_SECS),
            ),
            cleanup_interval: cleanup_interval(env_parse("CLEANUP_INTERVAL_SECS")),

            password_hash_iterations: env_parse("PASSWORD_HASH_ITERATIONS").unwrap_or(100_000),
            admin_email: std::env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@ecole.local".to_string()),
            admin_password: std::env::var("ADMIN_PASSWORD")
                .unwrap_or_else(|_| "changeme-admin".to_string()),
        }
    }

    /// Effective `Access-Control-Max-Age` in seconds
    pub fn cors_max_age_secs(&self) -> u64 {
        self.cors_max_age.as_secs().min(MAX_CORS_MAX_AGE_SECS)
    }

    /// True when the administrator password was not overridden
    pub fn uses_default_admin_password(&self) -> bool {
        std::env::var("ADMIN_PASSWORD").is_err()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Sweeper period from `CLEANUP_INTERVAL_SECS`, never below one second
fn cleanup_interval(secs: Option<u64>) -> Duration {
    Duration::from_secs(secs.unwrap_or(60)).max(MIN_CLEANUP_INTERVAL)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| v == "true" || v == "1")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_age_is_capped() {
        let config = Config {
            cors_max_age: Duration::from_secs(7 * 24 * 3600),
            ..Config::default()
        };
        assert_eq!(config.cors_max_age_secs(), MAX_CORS_MAX_AGE_SECS);
    }

    #[test]
    fn zero_cleanup_interval_is_raised() {
        assert_eq!(cleanup_interval(Some(0)), MIN_CLEANUP_INTERVAL);
        assert_eq!(cleanup_interval(Some(30)), Duration::from_secs(30));
        assert_eq!(cleanup_interval(None), Duration::from_secs(60));
    }
}

//! Background cleanup worker.
//!
//! Periodically drops idle sessions, expired CSRF tokens and rate-limit
//! buckets of clients that went quiet, so in-memory state stays bounded.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::MIN_CLEANUP_INTERVAL;
use crate::state::AppState;

/// Buckets untouched for this long are forgotten
const BUCKET_IDLE: Duration = Duration::from_secs(600);

/// Entries removed by one pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: usize,
    pub csrf_tokens: usize,
    pub rate_buckets: usize,
}

impl SweepReport {
    pub fn total(&self) -> usize {
        self.sessions + self.csrf_tokens + self.rate_buckets
    }
}

pub struct Sweeper {
    state: AppState,
    interval: Duration,
}

impl Sweeper {
    pub fn new(state: AppState) -> Self {
        let interval = state.config.cleanup_interval.max(MIN_CLEANUP_INTERVAL);
        Self { state, interval }
    }

    /// Spawn the periodic task on the current runtime
    pub fn start(self: Arc<Self>) {
        tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                "Started session sweeper"
            );

            let mut ticker = tokio::time::interval(self.interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = self.sweep();
                if report.total() > 0 {
                    debug!(
                        sessions = report.sessions,
                        csrf_tokens = report.csrf_tokens,
                        rate_buckets = report.rate_buckets,
                        "Swept expired state"
                    );
                }
            }
        });
    }

    /// One cleanup pass
    pub fn sweep(&self) -> SweepReport {
        let sessions = match self.state.sessions.prune() {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Session prune failed");
                0
            }
        };
        SweepReport {
            sessions,
            csrf_tokens: self.state.csrf.prune(),
            rate_buckets: self.state.rate_limiter.prune_idle(BUCKET_IDLE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::session::{Session, SessionData};
    use chrono::{Duration as ChronoDuration, Utc};

    #[test]
    fn sweep_removes_idle_sessions() {
        let state = AppState::new(Config {
            password_hash_iterations: 1_000,
            session_lifetime: Duration::from_secs(60),
            ..Config::default()
        })
        .unwrap();

        let mut stale = SessionData::new();
        stale.last_activity = Utc::now() - ChronoDuration::minutes(5);
        state.sessions.store().save("old", &stale).unwrap();

        let mut live = Session::fresh("live".repeat(16));
        live.touch();
        state.sessions.flush(&live).unwrap();

        let report = Sweeper::new(state.clone()).sweep();
        assert_eq!(report.sessions, 1);
        assert!(state.sessions.store().load("old").unwrap().is_none());
        assert!(state.sessions.store().load(live.id()).unwrap().is_some());
    }

    #[tokio::test]
    async fn zero_interval_still_starts() {
        let state = AppState::new(Config {
            password_hash_iterations: 1_000,
            cleanup_interval: Duration::ZERO,
            ..Config::default()
        })
        .unwrap();

        let sweeper = Arc::new(Sweeper::new(state));
        assert_eq!(sweeper.interval, MIN_CLEANUP_INTERVAL);
        sweeper.start();
        tokio::task::yield_now().await;
    }
}

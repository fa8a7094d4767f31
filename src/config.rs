//! Environment-driven runtime configuration.

use std::{env, str::FromStr, time::Duration};

use tracing::warn;

/// Default number of entries returned by top-N queries and initial snapshots.
const DEFAULT_TOP_N: usize = 100;
/// Default TTL for cached top-N pages.
const DEFAULT_LEADERBOARD_CACHE_TTL: Duration = Duration::from_secs(300);
/// Default TTL for cached per-player rank views.
const DEFAULT_USER_RANK_CACHE_TTL: Duration = Duration::from_secs(600);
/// Default upper bound on a single cache round trip.
const DEFAULT_CACHE_OP_TIMEOUT: Duration = Duration::from_millis(500);
/// Default period of the background rank reconciliation job.
const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(300);
/// Default number of entries reconciled per transaction.
const DEFAULT_RECONCILE_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// Redis connection string.
    pub redis_url: String,
    /// Namespace prefix applied to every cache key.
    pub redis_key_prefix: String,
    /// TTL for cached top-N leaderboard pages.
    pub leaderboard_cache_ttl: Duration,
    /// TTL for cached per-player rank lookups.
    pub user_rank_cache_ttl: Duration,
    /// Timeout applied to each individual cache operation.
    pub cache_op_timeout: Duration,
    /// Default page size for top-N queries and connection snapshots.
    pub top_n: usize,
    /// Interval between reconciliation runs; `None` disables the job.
    pub reconcile_interval: Option<Duration>,
    /// Number of leaderboard entries recomputed per reconciliation batch.
    pub reconcile_batch_size: usize,
}

impl AppConfig {
    /// Load the configuration from environment variables, falling back to
    /// defaults (with a warning) when a value is missing or unparsable.
    pub fn from_env() -> Self {
        let reconcile_secs: u64 = env_or("RECONCILE_INTERVAL_SECS", 300);
        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost:5432/leaderboard".into()),
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379/0".into()),
            redis_key_prefix: env::var("REDIS_KEY_PREFIX")
                .unwrap_or_else(|_| "leaderboard:".into()),
            leaderboard_cache_ttl: env_duration_secs(
                "LEADERBOARD_CACHE_TTL",
                DEFAULT_LEADERBOARD_CACHE_TTL,
            ),
            user_rank_cache_ttl: env_duration_secs(
                "USER_RANK_CACHE_TTL",
                DEFAULT_USER_RANK_CACHE_TTL,
            ),
            cache_op_timeout: Duration::from_millis(env_or(
                "CACHE_OP_TIMEOUT_MS",
                DEFAULT_CACHE_OP_TIMEOUT.as_millis() as u64,
            )),
            top_n: env_or("LEADERBOARD_TOP_N", DEFAULT_TOP_N),
            reconcile_interval: (reconcile_secs > 0).then(|| Duration::from_secs(reconcile_secs)),
            reconcile_batch_size: env_or("RECONCILE_BATCH_SIZE", DEFAULT_RECONCILE_BATCH_SIZE),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost:5432/leaderboard".into(),
            redis_url: "redis://localhost:6379/0".into(),
            redis_key_prefix: "leaderboard:".into(),
            leaderboard_cache_ttl: DEFAULT_LEADERBOARD_CACHE_TTL,
            user_rank_cache_ttl: DEFAULT_USER_RANK_CACHE_TTL,
            cache_op_timeout: DEFAULT_CACHE_OP_TIMEOUT,
            top_n: DEFAULT_TOP_N,
            reconcile_interval: Some(DEFAULT_RECONCILE_INTERVAL),
            reconcile_batch_size: DEFAULT_RECONCILE_BATCH_SIZE,
        }
    }
}

/// Read `name` as a `T`, falling back to `default` when unset or unparsable.
fn env_or<T: FromStr + Copy>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "unparsable value; using default");
            default
        }),
        Err(_) => default,
    }
}

/// Read `name` as a number of seconds.
fn env_duration_secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs(env_or(name, default.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = AppConfig::default();
        assert_eq!(config.top_n, 100);
        assert_eq!(config.leaderboard_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.user_rank_cache_ttl, Duration::from_secs(600));
        assert_eq!(config.reconcile_batch_size, 1000);
    }
}

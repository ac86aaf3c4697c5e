//! # Controller Configuration
//!
//! Timing and environment settings for reconciliation passes.

use super::env_var_or_default;
use std::path::PathBuf;
use std::time::Duration;

/// Controller configuration
///
/// Poll timings are kept as [`Duration`]s so tests can run the full
/// reconciliation flow with millisecond waits.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Interval between checks in bounded readiness polls
    pub poll_interval: Duration,
    /// Bound for pod-running and rolling-update waits of a single peer
    pub peer_timeout: Duration,
    /// Delay before readiness checks start
    /// Applied before the aggregate status check and before each rolling-update readiness poll
    pub settle_delay: Duration,
    /// Service account token presented to Vault on login
    pub service_account_token_path: PathBuf,
    /// Namespace to watch (None = all namespaces)
    pub watch_namespace: Option<String>,
    /// Minimum error backoff (seconds)
    pub backoff_min_secs: u64,
    /// Maximum error backoff (seconds)
    pub backoff_max_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            peer_timeout: Duration::from_secs(DEFAULT_PEER_TIMEOUT_SECS),
            settle_delay: Duration::from_secs(DEFAULT_SETTLE_DELAY_SECS),
            service_account_token_path: PathBuf::from(DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH),
            watch_namespace: None,
            backoff_min_secs: DEFAULT_BACKOFF_MIN_SECS,
            backoff_max_secs: DEFAULT_BACKOFF_MAX_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        let watch_namespace = std::env::var("WATCH_NAMESPACE")
            .ok()
            .map(|ns| ns.trim().to_string())
            .filter(|ns| !ns.is_empty());
        Self {
            // Zero would turn readiness polls into a busy loop
            poll_interval: Duration::from_secs(
                env_var_or_default("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS).max(1),
            ),
            peer_timeout: Duration::from_secs(env_var_or_default(
                "PEER_TIMEOUT_SECS",
                DEFAULT_PEER_TIMEOUT_SECS,
            )),
            settle_delay: Duration::from_secs(env_var_or_default(
                "SETTLE_DELAY_SECS",
                DEFAULT_SETTLE_DELAY_SECS,
            )),
            service_account_token_path: PathBuf::from(env_var_or_default(
                "SERVICE_ACCOUNT_TOKEN_PATH",
                DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH.to_string(),
            )),
            watch_namespace,
            backoff_min_secs: env_var_or_default("BACKOFF_MIN_SECS", DEFAULT_BACKOFF_MIN_SECS),
            backoff_max_secs: env_var_or_default("BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_timings() {
        let config = ControllerConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.peer_timeout, Duration::from_secs(300));
        assert_eq!(config.settle_delay, Duration::from_secs(10));
        assert!(config.watch_namespace.is_none());
    }

    #[test]
    fn env_overrides_and_ignores_garbage() {
        std::env::set_var("PEER_TIMEOUT_SECS", "42");
        std::env::set_var("BACKOFF_MAX_SECS", "not-a-number");
        let config = ControllerConfig::from_env();
        std::env::remove_var("PEER_TIMEOUT_SECS");
        std::env::remove_var("BACKOFF_MAX_SECS");

        assert_eq!(config.peer_timeout, Duration::from_secs(42));
        assert_eq!(config.backoff_max_secs, crate::constants::DEFAULT_BACKOFF_MAX_SECS);
    }

    #[test]
    fn zero_poll_interval_is_raised_to_one_second() {
        std::env::set_var("POLL_INTERVAL_SECS", "0");
        let config = ControllerConfig::from_env();
        std::env::remove_var("POLL_INTERVAL_SECS");

        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }
}

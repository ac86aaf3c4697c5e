//! # Constants
//!
//! Default values shared by configuration, the controller runtime and the
//! reconcilers.

/// Field manager used for status patches
pub const FIELD_MANAGER: &str = "zookeeper-operator";

/// Default port for the health probe server
pub const DEFAULT_PROBE_PORT: u16 = 8080;

/// Default server startup timeout (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default server readiness poll interval (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Interval between readiness checks in bounded polls (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Upper bound for pod-running and rolling-update waits (seconds)
pub const DEFAULT_PEER_TIMEOUT_SECS: u64 = 300;

/// Delay before readiness checks start (seconds)
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 10;

/// Minimum error backoff (seconds)
pub const DEFAULT_BACKOFF_MIN_SECS: u64 = 5;

/// Maximum error backoff (seconds)
pub const DEFAULT_BACKOFF_MAX_SECS: u64 = 300;

/// Requeue used when backoff state cannot be read (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// Service account token presented to Vault on login
pub const DEFAULT_SERVICE_ACCOUNT_TOKEN_PATH: &str =
    "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Annotation on a watched secret that requests credential rotation
pub const REFRESH_CREDENTIALS_ANNOTATION: &str = "vault.qubership.org/refresh-credentials";

/// Server-side watch timeout (seconds); below the client read timeout so idle watches are closed by the API server
pub const WATCH_TIMEOUT_SECS: u32 = 25;

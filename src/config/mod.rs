//! # Configuration
//!
//! Operator configuration loaded from environment variables.
//!
//! Every setting has a default, so the operator runs without any
//! environment at all. Tests build the structs directly with short
//! durations instead of going through the environment.

pub mod controller;
pub mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;

/// Read environment variable or return default value
pub(crate) fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

//! Shared API path definitions for the Vault HTTP API
//!
//! This crate centralizes all Vault API paths to ensure consistency
//! between the operator's Vault client and the mock server used in tests.
//!
//! ## Path builders
//!
//! The functions in [`vault`] build concrete request paths (always starting
//! with `/v1/`) from mount points, policy names and auth methods.
//!
//! ## Route Constants
//!
//! Route constants are provided for Axum routes, which require static string literals.
//! These constants are validated against the builder output in tests.

pub mod vault;

pub use vault::VaultPath;

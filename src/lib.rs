//! ZooKeeper Operator Library
//!
//! Reconciliation engine for `ZooKeeperService` documents: the ensemble,
//! its monitoring agent, backup daemon, integration tests and
//! Vault-managed credentials.
//! Tests are included in the module files and under `tests/`.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod provider;
pub mod runtime;
pub mod templates;

// Re-export CRD types for convenience
pub use crd::*;

//! # Controller
//!
//! Reconciliation engine for `ZooKeeperService` documents.
//!
//! - [`service`] runs one pass over a document
//! - [`reconciler`] holds the per-component reconcilers and the ensemble plan
//! - [`applier`], [`store`] and [`readiness`] talk to the cluster
//! - [`credentials`] manages watched secrets and Vault credential sets
//! - [`cache`] and [`conditions`] keep change detection and status history

pub mod applier;
pub mod backoff;
pub mod cache;
pub mod conditions;
pub mod credentials;
pub mod error;
pub mod hash;
pub mod readiness;
pub mod reconciler;
pub mod server;
pub mod service;
pub mod store;

pub use error::{ReconcilerError, StoreError};
pub use service::ServiceController;
pub use store::{KubeStore, ObjectStore};

//! # Templates
//!
//! Deterministic builders for every managed object. Nothing in here talks
//! to the cluster or to Vault; reconcilers decide when and how the built
//! objects are applied.

pub mod backup_daemon;
pub mod common;
pub mod monitoring;
pub mod storage;
pub mod vault;
pub mod zookeeper;

pub use backup_daemon::BackupDaemonTemplates;
pub use monitoring::MonitoringTemplates;
pub use zookeeper::ZooKeeperTemplates;

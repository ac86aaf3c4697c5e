//! # ZooKeeper Operator
//!
//! A Kubernetes operator that reconciles `ZooKeeperService` documents into a
//! running ZooKeeper ensemble.
//!
//! ## Overview
//!
//! For every document the operator:
//!
//! 1. **Applies the ensemble** - client and domain services, one service,
//!    claim and deployment per peer, brought up one peer at a time
//! 2. **Scales safely** - excess peers are scaled to zero before the kept
//!    peers are re-applied; rolling updates wait for each peer to be ready
//! 3. **Runs auxiliary components** - monitoring agent and backup daemon
//! 4. **Manages credentials** - optionally in Vault, with policies, roles,
//!    generated passwords and rotation on request
//! 5. **Reports progress** - an ordered condition list in the document status
//!
//! Logging is controlled with `RUST_LOG` (default `zookeeper_operator=info`).

use anyhow::Result;
use zookeeper_operator::runtime::{initialize, run_watch_loop};

#[tokio::main]
async fn main() -> Result<()> {
    let init_result = initialize().await?;
    run_watch_loop(init_result).await
}

//! Print the `ZooKeeperService` CRD as YAML
//!
//! Usage:
//!   cargo run --bin crdgen > config/crd/zookeeperservice.yaml

use anyhow::{Context, Result};
use kube::CustomResourceExt;
use zookeeper_operator::ZooKeeperService;

fn main() -> Result<()> {
    let crd = serde_yaml::to_string(&ZooKeeperService::crd())
        .context("Failed to serialize ZooKeeperService CRD")?;
    print!("{crd}");
    Ok(())
}

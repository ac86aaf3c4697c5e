//! # Shared Storage Claims
//!
//! Resolves the snapshot/backup claim of a document from its declared
//! provisioning mode.

use crate::controller::applier::ResourceApplier;
use crate::controller::error::ReconcilerError;
use crate::controller::store::ObjectStore;
use crate::crd::{PersistentVolumeType, SnapshotStorageConfig};
use crate::templates::common::Labels;
use crate::templates::storage::{claim, non_shared_claim, ClaimBinding};
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use tracing::info;

/// Claim to create for `storage`, if any
///
/// `predefined_claim` never yields a claim to create; the named claim must
/// already exist.
pub async fn snapshot_claim<S: ObjectStore>(
    applier: &ResourceApplier<'_, S>,
    storage: &SnapshotStorageConfig,
    service_name: &str,
    labels: Labels,
) -> Result<Option<PersistentVolumeClaim>, ReconcilerError> {
    let claim_name = storage.claim_name(service_name);
    if storage
        .persistent_volume_claim_name
        .as_deref()
        .is_none_or(str::is_empty)
    {
        info!(
            "Parameter 'persistentVolumeClaimName' is not specified, using '{}'",
            claim_name
        );
    }
    let namespace = applier.namespace();
    let size = storage.volume_size.as_str();
    let storage_class = storage.storage_class.clone().filter(|c| !c.is_empty());

    let Some(volume_type) = storage.persistent_volume_type else {
        return Ok(None);
    };
    match volume_type {
        PersistentVolumeType::Standalone => non_shared_claim(
            &claim_name,
            namespace,
            labels,
            storage.persistent_volume_name.as_deref(),
            storage.persistent_volume_label.as_deref(),
            storage_class.as_deref(),
            size,
        ),
        PersistentVolumeType::PredefinedClaim => {
            match applier.find::<PersistentVolumeClaim>(&claim_name).await? {
                Some(_) => Ok(None),
                None => Err(ReconcilerError::Configuration(format!(
                    "persistent volume claim '{claim_name}' must exist for 'predefined_claim' persistent volume type"
                ))),
            }
        }
        PersistentVolumeType::Predefined => {
            let volume_name = storage
                .persistent_volume_name
                .clone()
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    ReconcilerError::Configuration(
                        "parameter 'persistentVolumeName' must be specified for 'predefined' persistent volume type"
                            .to_string(),
                    )
                })?;
            let binding = ClaimBinding {
                volume_name: Some(volume_name),
                storage_class,
                ..Default::default()
            };
            Ok(Some(claim(&claim_name, namespace, labels, true, binding, size)))
        }
        PersistentVolumeType::StorageClass => {
            let binding = ClaimBinding {
                storage_class,
                ..Default::default()
            };
            Ok(Some(claim(&claim_name, namespace, labels, true, binding, size)))
        }
    }
}

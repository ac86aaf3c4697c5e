//! # Storage Claims
//!
//! Claim templates for per-peer data and shared snapshot/backup storage.

use super::common::{metadata, Labels};
use crate::controller::error::ReconcilerError;
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use std::collections::BTreeMap;
use tracing::info;

/// How a claim finds its volume
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClaimBinding {
    pub volume_name: Option<String>,
    pub selector: Option<LabelSelector>,
    pub storage_class: Option<String>,
}

/// Claim requesting `size`; shared claims are ReadWriteMany
pub fn claim(
    name: &str,
    namespace: &str,
    labels: Labels,
    shared: bool,
    binding: ClaimBinding,
    size: &str,
) -> PersistentVolumeClaim {
    let access_mode = if shared { "ReadWriteMany" } else { "ReadWriteOnce" };
    let bound_statically = binding.volume_name.is_some() || binding.selector.is_some();
    let storage_class_name = if bound_statically {
        // Static binding with no class must opt out of the default class
        Some(binding.storage_class.unwrap_or_default())
    } else {
        binding.storage_class
    };
    let (volume_name, selector) = match binding.volume_name {
        Some(volume_name) => (Some(volume_name), None),
        None => (None, binding.selector),
    };

    PersistentVolumeClaim {
        metadata: metadata(name, namespace, Some(labels)),
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![access_mode.to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                ..Default::default()
            }),
            volume_name,
            selector,
            storage_class_name,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Parse a `key=value` persistent volume label into a selector
fn label_selector(label: &str) -> Result<LabelSelector, ReconcilerError> {
    match label.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok(LabelSelector {
            match_labels: Some(BTreeMap::from([(key.to_string(), value.to_string())])),
            ..Default::default()
        }),
        _ => Err(ReconcilerError::Configuration(format!(
            "persistent volume label '{label}' must have the form key=value"
        ))),
    }
}

/// Non-shared claim bound by volume name, label or storage class
///
/// `None` when none of the three is declared.
pub fn non_shared_claim(
    name: &str,
    namespace: &str,
    labels: Labels,
    volume_name: Option<&str>,
    volume_label: Option<&str>,
    storage_class: Option<&str>,
    size: &str,
) -> Result<Option<PersistentVolumeClaim>, ReconcilerError> {
    let volume_name = volume_name.filter(|v| !v.is_empty());
    let volume_label = volume_label.filter(|v| !v.is_empty());

    let mut binding = ClaimBinding {
        storage_class: storage_class.map(str::to_string),
        ..Default::default()
    };
    let mut details = Vec::new();
    if let Some(volume_name) = volume_name {
        details.push("volume name");
        binding.volume_name = Some(volume_name.to_string());
    } else if let Some(volume_label) = volume_label {
        details.push("label");
        binding.selector = Some(label_selector(volume_label)?);
    } else if storage_class.is_none() {
        return Ok(None);
    }
    if storage_class.is_some_and(|class| !class.is_empty()) {
        details.push("class name");
    }

    info!(
        "Persistent volume claim [{}] is created by {}.",
        name,
        details.join(" and ")
    );
    Ok(Some(claim(name, namespace, labels, false, binding, size)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(claim: &PersistentVolumeClaim) -> &PersistentVolumeClaimSpec {
        claim.spec.as_ref().unwrap()
    }

    #[test]
    fn nothing_declared_means_no_claim() {
        let claim = non_shared_claim("pvc-zk-1", "ns", Labels::new(), None, Some(""), None, "1Gi")
            .unwrap();
        assert!(claim.is_none());
    }

    #[test]
    fn volume_name_binding_opts_out_of_default_class() {
        let claim =
            non_shared_claim("pvc-zk-1", "ns", Labels::new(), Some("pv-1"), None, None, "2Gi")
                .unwrap()
                .unwrap();
        assert_eq!(spec(&claim).volume_name.as_deref(), Some("pv-1"));
        assert_eq!(spec(&claim).storage_class_name.as_deref(), Some(""));
        assert_eq!(
            spec(&claim).access_modes,
            Some(vec!["ReadWriteOnce".to_string()])
        );
    }

    #[test]
    fn label_binding_builds_selector() {
        let claim = non_shared_claim(
            "pvc-zk-1",
            "ns",
            Labels::new(),
            None,
            Some("disk=fast"),
            Some("local"),
            "2Gi",
        )
        .unwrap()
        .unwrap();
        let selector = spec(&claim).selector.as_ref().unwrap();
        assert_eq!(
            selector.match_labels.as_ref().unwrap().get("disk").map(String::as_str),
            Some("fast")
        );
        assert_eq!(spec(&claim).storage_class_name.as_deref(), Some("local"));
    }

    #[test]
    fn malformed_label_is_a_configuration_error() {
        let result =
            non_shared_claim("pvc-zk-1", "ns", Labels::new(), None, Some("disk"), None, "2Gi");
        assert!(matches!(result, Err(ReconcilerError::Configuration(_))));
    }

    #[test]
    fn class_only_claim_is_dynamically_provisioned() {
        let claim = claim(
            "pvc-zk-snapshots",
            "ns",
            Labels::new(),
            true,
            ClaimBinding {
                storage_class: Some("nfs".into()),
                ..Default::default()
            },
            "5Gi",
        );
        assert_eq!(spec(&claim).storage_class_name.as_deref(), Some("nfs"));
        assert_eq!(
            spec(&claim).access_modes,
            Some(vec!["ReadWriteMany".to_string()])
        );
        assert!(spec(&claim).volume_name.is_none());
    }
}

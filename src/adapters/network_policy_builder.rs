//! Kubernetes NetworkPolicy builder

use k8s_openapi::api::networking::v1::{NetworkPolicy, NetworkPolicySpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

use crate::adapters::labels;
use crate::crd::Tenant;

/// Name of the default deny policy in every tenant namespace
pub const DEFAULT_DENY_INGRESS: &str = "default-deny-ingress";

/// Build a policy that selects every pod and allows no ingress.
///
/// Exceptions are expressed by separate, additive policies.
pub fn build_default_deny_ingress(tenant: &Tenant) -> NetworkPolicy {
    NetworkPolicy {
        metadata: labels::child_metadata(tenant, DEFAULT_DENY_INGRESS),
        spec: Some(NetworkPolicySpec {
            pod_selector: LabelSelector::default(),
            policy_types: Some(vec!["Ingress".to_string()]),
            ..Default::default()
        }),
    }
}

//! Kubernetes Namespace builder for tenant isolation

use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::adapters::labels;
use crate::crd::Tenant;

/// Build the Namespace for a tenant, named after the tenant itself
pub fn build_namespace(tenant: &Tenant) -> Namespace {
    let name = tenant.name_any();
    let spec = &tenant.spec;

    let mut ns_labels = labels::base_labels(&name);
    ns_labels.insert(labels::ISTIO_INJECTION.to_string(), "enabled".to_string());
    ns_labels.insert(
        labels::POD_SECURITY_ENFORCE.to_string(),
        "restricted".to_string(),
    );

    let mut annotations = BTreeMap::new();
    annotations.insert(labels::OWNER.to_string(), spec.owner.clone());
    if let Some(ref cost_center) = spec.cost_center {
        annotations.insert(labels::COST_CENTER.to_string(), cost_center.clone());
    }
    let integrations = spec.integrations();
    if !integrations.is_empty() {
        annotations.insert(
            labels::ALLOWED_INTEGRATIONS.to_string(),
            integrations.join(","),
        );
    }

    Namespace {
        metadata: ObjectMeta {
            name: Some(name.clone()),
            labels: Some(ns_labels),
            annotations: Some(annotations),
            owner_references: labels::owner_references(tenant),
            ..Default::default()
        },
        ..Default::default()
    }
}

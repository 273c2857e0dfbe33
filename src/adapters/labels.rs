//! Labels, annotations and shared metadata for tenant child resources

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::ResourceExt;
use std::collections::BTreeMap;

use crate::crd::{Tenant, API_VERSION};

/// Identifies the tenant a namespace belongs to
pub const TENANT: &str = "platform.xyz.com/tenant";

/// Team accountable for the tenant
pub const OWNER: &str = "platform.xyz.com/owner";

/// Billing label of the tenant
pub const COST_CENTER: &str = "platform.xyz.com/cost-center";

/// Tenants this tenant may call, comma separated
pub const ALLOWED_INTEGRATIONS: &str = "platform.xyz.com/allowed-integrations";

/// Sidecar injection switch read by the mesh
pub const ISTIO_INJECTION: &str = "istio-injection";

/// Pod Security Admission enforcement level
pub const POD_SECURITY_ENFORCE: &str = "pod-security.kubernetes.io/enforce";

/// Standard label for the tool managing a resource
pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label and the field manager name
pub const OPERATOR_NAME: &str = "tenant-operator";

/// Labels carried by every child resource
pub fn base_labels(tenant_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(TENANT.to_string(), tenant_name.to_string());
    labels.insert(MANAGED_BY.to_string(), OPERATOR_NAME.to_string());
    labels
}

/// Metadata for a namespace-scoped child resource
pub fn child_metadata(tenant: &Tenant, name: &str) -> ObjectMeta {
    let tenant_name = tenant.name_any();
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(tenant_name.clone()),
        labels: Some(base_labels(&tenant_name)),
        owner_references: owner_references(tenant),
        ..Default::default()
    }
}

/// Controller reference back to the Tenant so deleting it cascades.
///
/// Omitted when the Tenant has no UID yet, an owner reference with an empty
/// UID is rejected by the API server.
pub fn owner_references(tenant: &Tenant) -> Option<Vec<OwnerReference>> {
    let uid = tenant.metadata.uid.clone()?;
    Some(vec![OwnerReference {
        api_version: API_VERSION.to_string(),
        kind: "Tenant".to_string(),
        name: tenant.name_any(),
        uid,
        controller: Some(true),
        block_owner_deletion: Some(true),
    }])
}

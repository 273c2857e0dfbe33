//! Kubernetes RoleBinding builder granting the tenant team edit access

use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
use kube::ResourceExt;

use crate::adapters::labels;
use crate::crd::Tenant;

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";
const EDIT_CLUSTER_ROLE: &str = "edit";

/// Name of the developers binding for a tenant
pub fn role_binding_name(tenant_name: &str) -> String {
    format!("{}-developers", tenant_name)
}

/// Group holding the tenant's team members
pub fn team_group(tenant_name: &str) -> String {
    format!("{}-team", tenant_name)
}

/// Build the RoleBinding scoped to the tenant namespace
pub fn build_role_binding(tenant: &Tenant) -> RoleBinding {
    let name = tenant.name_any();

    RoleBinding {
        metadata: labels::child_metadata(tenant, &role_binding_name(&name)),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: EDIT_CLUSTER_ROLE.to_string(),
        },
        subjects: Some(vec![Subject {
            api_group: Some(RBAC_API_GROUP.to_string()),
            kind: "Group".to_string(),
            name: team_group(&name),
            namespace: None,
        }]),
    }
}

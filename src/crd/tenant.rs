//! Tenant Custom Resource Definition

use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// API group of the Tenant resource
pub const API_GROUP: &str = "platform.xyz.com";

/// API version of the Tenant resource
pub const API_VERSION: &str = "platform.xyz.com/v1alpha1";

/// Tenant resource specification
///
/// A Tenant is cluster-scoped; its name doubles as the name of the namespace
/// the operator provisions for it.
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "platform.xyz.com",
    version = "v1alpha1",
    kind = "Tenant",
    plural = "tenants",
    singular = "tenant",
    shortname = "tn",
    status = "TenantStatus",
    printcolumn = r#"{"name": "Phase", "type": "string", "jsonPath": ".status.phase"}"#,
    printcolumn = r#"{"name": "Owner", "type": "string", "jsonPath": ".spec.owner"}"#,
    printcolumn = r#"{"name": "Ready", "type": "string", "jsonPath": ".status.conditions[?(@.type==\"Ready\")].status"}"#,
    printcolumn = r#"{"name": "Age", "type": "date", "jsonPath": ".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    /// Team accountable for the tenant
    pub owner: String,

    /// Billing label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_center: Option<String>,

    /// Resource quota overrides; unset fields fall back to platform defaults
    #[serde(default)]
    pub quota: TenantQuota,

    /// Other tenants this tenant may call cross-domain
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_integrations: Vec<String>,

    /// Role to contact mapping (e.g. oncall, slack)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub contacts: BTreeMap<String, String>,
}

/// Quota overrides for a tenant namespace
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantQuota {
    /// CPU requests across the namespace (Kubernetes quantity)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,

    /// CPU limits across the namespace (Kubernetes quantity)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_limit: Option<String>,

    /// Memory requests across the namespace (Kubernetes quantity)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,

    /// Memory limits across the namespace (Kubernetes quantity)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<String>,

    /// Maximum number of pods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pods: Option<u32>,

    /// Maximum number of persistent volume claims
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pvcs: Option<u32>,

    /// Maximum number of services
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<u32>,
}

impl TenantSpec {
    /// Allowed integrations de-duplicated and sorted
    pub fn integrations(&self) -> Vec<String> {
        let mut integrations = self.allowed_integrations.clone();
        integrations.sort();
        integrations.dedup();
        integrations
    }
}

/// Lifecycle phase of a Tenant
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum TenantPhase {
    /// Not yet picked up by the controller
    #[default]
    Pending,
    /// A pass is in flight or retrying after a transient failure
    Reconciling,
    /// All child resources are in place
    Ready,
    /// Terminal failure; waits for a spec change
    Failed,
}

impl TenantPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantPhase::Pending => "Pending",
            TenantPhase::Reconciling => "Reconciling",
            TenantPhase::Ready => "Ready",
            TenantPhase::Failed => "Failed",
        }
    }

    pub fn all() -> [TenantPhase; 4] {
        [
            TenantPhase::Pending,
            TenantPhase::Reconciling,
            TenantPhase::Ready,
            TenantPhase::Failed,
        ]
    }
}

impl fmt::Display for TenantPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-kind ledger of which child resources are known to exist
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResources {
    /// Namespace created or confirmed present
    #[serde(default)]
    pub namespace_created: bool,

    /// ResourceQuota created or confirmed present
    #[serde(default)]
    pub quota_applied: bool,

    /// NetworkPolicy created or confirmed present
    #[serde(default)]
    pub network_policy_applied: bool,

    /// RoleBinding created or confirmed present
    #[serde(default)]
    pub rbac_applied: bool,
}

impl AppliedResources {
    /// Every child resource is in place
    pub fn all_applied(&self) -> bool {
        self.namespace_created && self.quota_applied && self.network_policy_applied && self.rbac_applied
    }
}

/// Tenant status
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TenantStatus {
    /// Current phase (Pending, Reconciling, Ready, Failed)
    #[serde(default)]
    pub phase: TenantPhase,

    /// Which child resources have been applied
    #[serde(flatten)]
    pub applied: AppliedResources,

    /// Cause of the most recent failure; cleared once Ready
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    /// Spec generation this status was computed from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last update time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<DateTime<Utc>>,

    /// Status conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

impl TenantStatus {
    /// Find a condition by type
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }
}

/// Status condition
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (Ready)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status (True, False, Unknown)
    pub status: String,

    /// Last transition time
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Tenant {
    /// Generation of the spec, zero when the store has not assigned one
    pub fn generation(&self) -> i64 {
        self.metadata.generation.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_flat_ledger() {
        let status = TenantStatus {
            phase: TenantPhase::Reconciling,
            applied: AppliedResources {
                namespace_created: true,
                quota_applied: true,
                ..Default::default()
            },
            last_error: Some("boom".to_string()),
            observed_generation: Some(3),
            ..Default::default()
        };

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["phase"], "Reconciling");
        assert_eq!(json["namespaceCreated"], true);
        assert_eq!(json["quotaApplied"], true);
        assert_eq!(json["networkPolicyApplied"], false);
        assert_eq!(json["rbacApplied"], false);
        assert_eq!(json["lastError"], "boom");
        assert_eq!(json["observedGeneration"], 3);
    }

    #[test]
    fn spec_parses_camel_case_quota() {
        let spec: TenantSpec = serde_json::from_value(serde_json::json!({
            "owner": "candidate-team",
            "costCenter": "cc-42",
            "quota": { "cpu": "4", "memoryLimit": "8Gi", "pods": 200 },
            "allowedIntegrations": ["hirer", "hirer", "billing"]
        }))
        .unwrap();

        assert_eq!(spec.quota.cpu.as_deref(), Some("4"));
        assert_eq!(spec.quota.memory_limit.as_deref(), Some("8Gi"));
        assert_eq!(spec.quota.pods, Some(200));
        assert_eq!(spec.integrations(), vec!["billing", "hirer"]);
    }

    #[test]
    fn missing_status_fields_default() {
        let status: TenantStatus = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(status.phase, TenantPhase::Pending);
        assert!(!status.applied.all_applied());
    }
}

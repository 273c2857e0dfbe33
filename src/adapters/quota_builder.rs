//! Kubernetes ResourceQuota builder with platform defaults

use k8s_openapi::api::core::v1::{ResourceQuota, ResourceQuotaSpec};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

use crate::adapters::labels;
use crate::adapters::quantity::parse_quantity;
use crate::crd::{Tenant, TenantQuota};
use crate::Result;

/// Name of the quota object in every tenant namespace
pub const QUOTA_NAME: &str = "tenant-quota";

pub const DEFAULT_CPU_REQUEST: &str = "10";
pub const DEFAULT_MEMORY_REQUEST: &str = "20Gi";
pub const DEFAULT_CPU_LIMIT: &str = "20";
pub const DEFAULT_MEMORY_LIMIT: &str = "40Gi";
pub const DEFAULT_MAX_PODS: u32 = 100;

/// Build the ResourceQuota for a tenant namespace
pub fn build_resource_quota(tenant: &Tenant) -> Result<ResourceQuota> {
    Ok(ResourceQuota {
        metadata: labels::child_metadata(tenant, QUOTA_NAME),
        spec: Some(ResourceQuotaSpec {
            hard: Some(build_hard_limits(&tenant.spec.quota)?),
            ..Default::default()
        }),
        ..Default::default()
    })
}

/// Hard limits for a quota, overrides first and platform defaults otherwise
pub fn build_hard_limits(quota: &TenantQuota) -> Result<BTreeMap<String, Quantity>> {
    let mut hard = BTreeMap::new();

    hard.insert(
        "requests.cpu".to_string(),
        quantity_or_default("quota.cpu", &quota.cpu, DEFAULT_CPU_REQUEST)?,
    );
    hard.insert(
        "requests.memory".to_string(),
        quantity_or_default("quota.memory", &quota.memory, DEFAULT_MEMORY_REQUEST)?,
    );
    hard.insert(
        "limits.cpu".to_string(),
        quantity_or_default("quota.cpuLimit", &quota.cpu_limit, DEFAULT_CPU_LIMIT)?,
    );
    hard.insert(
        "limits.memory".to_string(),
        quantity_or_default("quota.memoryLimit", &quota.memory_limit, DEFAULT_MEMORY_LIMIT)?,
    );
    hard.insert(
        "pods".to_string(),
        Quantity(quota.pods.unwrap_or(DEFAULT_MAX_PODS).to_string()),
    );

    // No platform default exists for these two
    if let Some(pvcs) = quota.pvcs {
        hard.insert("persistentvolumeclaims".to_string(), Quantity(pvcs.to_string()));
    }
    if let Some(services) = quota.services {
        hard.insert("services".to_string(), Quantity(services.to_string()));
    }

    Ok(hard)
}

fn quantity_or_default(field: &str, value: &Option<String>, default: &str) -> Result<Quantity> {
    match value {
        Some(raw) => parse_quantity(field, raw),
        None => Ok(Quantity(default.to_string())),
    }
}

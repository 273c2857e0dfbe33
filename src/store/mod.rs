//! Access to the cluster API as an injectable capability
//!
//! The controller and synchronizer never hold a process-wide client; they are
//! handed a [`ClusterStore`] which the binary backs with [`KubeStore`] and the
//! tests back with an in-memory fake.

mod kube_store;

pub use kube_store::KubeStore;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, ResourceQuota};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::RoleBinding;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::crd::{Tenant, TenantStatus};
use crate::{Error, Result};

/// The four kinds of child resource owned by a Tenant
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ChildKind {
    Namespace,
    ResourceQuota,
    NetworkPolicy,
    RoleBinding,
}

impl ChildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChildKind::Namespace => "Namespace",
            ChildKind::ResourceQuota => "ResourceQuota",
            ChildKind::NetworkPolicy => "NetworkPolicy",
            ChildKind::RoleBinding => "RoleBinding",
        }
    }
}

impl fmt::Display for ChildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fully computed child resource ready to be created
#[derive(Clone, Debug, PartialEq)]
pub enum ChildResource {
    Namespace(Namespace),
    ResourceQuota(ResourceQuota),
    NetworkPolicy(NetworkPolicy),
    RoleBinding(RoleBinding),
}

impl ChildResource {
    pub fn kind(&self) -> ChildKind {
        match self {
            ChildResource::Namespace(_) => ChildKind::Namespace,
            ChildResource::ResourceQuota(_) => ChildKind::ResourceQuota,
            ChildResource::NetworkPolicy(_) => ChildKind::NetworkPolicy,
            ChildResource::RoleBinding(_) => ChildKind::RoleBinding,
        }
    }

    pub fn name(&self) -> &str {
        let meta = match self {
            ChildResource::Namespace(o) => &o.metadata,
            ChildResource::ResourceQuota(o) => &o.metadata,
            ChildResource::NetworkPolicy(o) => &o.metadata,
            ChildResource::RoleBinding(o) => &o.metadata,
        };
        meta.name.as_deref().unwrap_or_default()
    }

    /// Namespace of the object, `None` for the cluster-scoped Namespace
    pub fn namespace(&self) -> Option<&str> {
        match self {
            ChildResource::Namespace(_) => None,
            ChildResource::ResourceQuota(o) => o.metadata.namespace.as_deref(),
            ChildResource::NetworkPolicy(o) => o.metadata.namespace.as_deref(),
            ChildResource::RoleBinding(o) => o.metadata.namespace.as_deref(),
        }
    }
}

/// Successful result of a create call
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

/// Cluster API operations the operator depends on
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Read a Tenant by name, `None` once it has been deleted
    async fn get_tenant(&self, name: &str) -> Result<Option<Tenant>>;

    /// Create a child resource; an existing object is reported, never overwritten
    async fn create(&self, resource: &ChildResource) -> Result<CreateOutcome>;

    /// Persist the status block of a Tenant. A conflicting write is an
    /// [`Error::ConflictError`].
    async fn write_status(&self, name: &str, status: &TenantStatus) -> Result<()>;
}

/// Bound an external call; an elapsed deadline becomes a transient error
pub async fn with_timeout<T, F>(operation: &str, after: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::TimeoutError {
            operation: operation.to_string(),
            after,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_calls_time_out_as_transient() {
        let result: Result<()> = with_timeout("write status", Duration::from_secs(1), async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, Error::TimeoutError { .. }));
    }

    #[tokio::test]
    async fn fast_calls_pass_through() {
        let result = with_timeout("get tenant", Duration::from_secs(1), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}

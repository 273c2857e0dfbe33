//! [`ClusterStore`] backed by the Kubernetes API server

use async_trait::async_trait;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use tracing::debug;

use crate::adapters::labels::OPERATOR_NAME;
use crate::crd::{Tenant, TenantStatus};
use crate::store::{ChildResource, ClusterStore, CreateOutcome};
use crate::{Error, Result};

/// Cluster store talking to a real API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn tenants(&self) -> Api<Tenant> {
        Api::all(self.client.clone())
    }

    async fn create_object<K>(&self, api: Api<K>, object: &K) -> Result<CreateOutcome>
    where
        K: Resource + Clone + Debug + Serialize + DeserializeOwned,
    {
        let params = PostParams {
            field_manager: Some(OPERATOR_NAME.to_string()),
            ..Default::default()
        };

        match api.create(&params, object).await {
            Ok(_) => Ok(CreateOutcome::Created),
            Err(kube::Error::Api(resp)) if resp.code == 409 && resp.reason == "AlreadyExists" => {
                debug!("{} already exists", object.name_any());
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_tenant(&self, name: &str) -> Result<Option<Tenant>> {
        Ok(self.tenants().get_opt(name).await?)
    }

    async fn create(&self, resource: &ChildResource) -> Result<CreateOutcome> {
        let client = self.client.clone();
        let namespace = resource.namespace().unwrap_or_default();

        match resource {
            ChildResource::Namespace(ns) => self.create_object(Api::all(client), ns).await,
            ChildResource::ResourceQuota(quota) => {
                self.create_object(Api::namespaced(client, namespace), quota)
                    .await
            }
            ChildResource::NetworkPolicy(policy) => {
                self.create_object(Api::namespaced(client, namespace), policy)
                    .await
            }
            ChildResource::RoleBinding(binding) => {
                self.create_object(Api::namespaced(client, namespace), binding)
                    .await
            }
        }
    }

    async fn write_status(&self, name: &str, status: &TenantStatus) -> Result<()> {
        let mut body = serde_json::to_value(status)?;
        // A merge patch only clears fields that are sent as null
        if status.last_error.is_none() {
            body["lastError"] = serde_json::Value::Null;
        }
        let patch = serde_json::json!({ "status": body });

        match self
            .tenants()
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(resp)) if resp.code == 409 => Err(Error::ConflictError(format!(
                "status of tenant {}: {}",
                name, resp.message
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

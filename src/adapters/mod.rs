//! Adapters for building the Kubernetes child resources of a Tenant

pub mod labels;
pub mod namespace_builder;
pub mod network_policy_builder;
pub mod quantity;
pub mod quota_builder;
pub mod role_binding_builder;

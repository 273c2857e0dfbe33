//! Tenant Operator
//!
//! Turns cluster-scoped `Tenant` resources into an isolated namespace with a
//! resource quota, a default-deny ingress policy and a team role binding.

pub mod adapters;
pub mod config;
pub mod controllers;
pub mod crd;
pub mod error;
pub mod leader;
pub mod metrics;
pub mod reconcilers;
pub mod store;

pub use error::{Error, Result};

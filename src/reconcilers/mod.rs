//! Reconciliation logic for Tenant resources

pub mod status;
pub mod tenant;

//! CRD YAML Generator
//!
//! This binary generates the Kubernetes CRD manifest for the Tenant resource
//! served by the tenant-operator.
//!
//! Usage: cargo run --bin crdgen > deploy/crds/tenant.yaml

use tenant_operator::crd::generate_crds;

fn main() -> anyhow::Result<()> {
    for crd in generate_crds()? {
        println!("---");
        print!("{}", crd);
    }
    Ok(())
}

//! # CRD Generator
//!
//! Prints the ManagementClusterConfiguration CustomResourceDefinition as YAML.
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/managementclusterconfiguration.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use anyhow::{Context, Result};
use konfigure_operator::crd::ManagementClusterConfiguration;
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let crd = ManagementClusterConfiguration::crd();
    let yaml = serde_yaml::to_string(&crd).context("Failed to serialize CRD to YAML")?;
    print!("{yaml}");
    Ok(())
}

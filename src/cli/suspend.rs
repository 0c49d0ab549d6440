//! # Suspend/Resume Commands
//!
//! Toggles `spec.suspend` of a ManagementClusterConfiguration.

use anyhow::{Context, Result};
use konfigure_operator::crd::ManagementClusterConfiguration;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;

pub async fn set_suspend_command(client: Client, name: &str, ns: &str, suspend: bool) -> Result<()> {
    let verb = if suspend { "Suspending" } else { "Resuming" };
    println!("{verb} reconciliation for ManagementClusterConfiguration '{ns}/{name}'...");

    let api: Api<ManagementClusterConfiguration> = Api::namespaced(client, ns);

    let resource = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get ManagementClusterConfiguration '{ns}/{name}'"))?;

    if resource.spec.suspend == suspend {
        if suspend {
            println!("   Resource is already suspended");
        } else {
            println!("   Resource is already active (not suspended)");
        }
        return Ok(());
    }

    let patch = json!({
        "spec": {
            "suspend": suspend
        }
    });

    api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| format!("Failed to patch ManagementClusterConfiguration '{ns}/{name}'"))?;

    if suspend {
        println!("Reconciliation suspended successfully");
        println!("   Rendered ConfigMaps and Secrets are left in place.");
        println!("\nTo resume reconciliation, run:");
        println!("   kfgctl resume {name} -n {ns}");
    } else {
        println!("Reconciliation resumed successfully");
        println!("\nThe operator will reconcile this resource shortly.");
    }

    Ok(())
}

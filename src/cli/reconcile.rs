//! # Reconcile Command
//!
//! Triggers reconciliation of a ManagementClusterConfiguration.

use anyhow::{Context, Result};
use konfigure_operator::constants::RECONCILE_REQUESTED_AT_ANNOTATION;
use konfigure_operator::crd::ManagementClusterConfiguration;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;

/// Set the request annotation to the current time
///
/// The operator reconciles once per distinct value and records it in
/// `status.lastHandledReconcileAt`.
pub async fn reconcile_command(client: Client, name: &str, ns: &str) -> Result<()> {
    println!("Triggering reconciliation for ManagementClusterConfiguration '{ns}/{name}'...");

    let api: Api<ManagementClusterConfiguration> = Api::namespaced(client, ns);

    let resource = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get ManagementClusterConfiguration '{ns}/{name}'"))?;

    if resource.spec.suspend {
        println!("   Warning: Resource is suspended. Reconciliation will be skipped.");
        println!("   Use 'kfgctl resume {name} -n {ns}' to resume reconciliation.");
    }

    let requested_at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true);
    let patch = json!({
        "metadata": {
            "annotations": {
                RECONCILE_REQUESTED_AT_ANNOTATION: requested_at
            }
        }
    });

    api.patch(name, &PatchParams::default(), &Patch::Merge(patch))
        .await
        .with_context(|| {
            format!("Failed to trigger reconciliation for ManagementClusterConfiguration '{ns}/{name}'")
        })?;

    println!("Reconciliation triggered successfully");
    println!("   Resource: {ns}/{name}");
    println!("   Annotation: {RECONCILE_REQUESTED_AT_ANNOTATION}={requested_at}");
    println!("\nThe operator will reconcile this resource shortly.");

    Ok(())
}

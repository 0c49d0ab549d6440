//! # List Command
//!
//! Lists ManagementClusterConfiguration resources.

use anyhow::{Context, Result};
use konfigure_operator::controller::reconciler::status::READY_CONDITION;
use konfigure_operator::crd::ManagementClusterConfiguration;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};

pub async fn list_command(client: Client, namespace: Option<String>) -> Result<()> {
    let api: Api<ManagementClusterConfiguration> = if let Some(ns) = &namespace {
        println!("Listing ManagementClusterConfiguration resources in namespace '{ns}'...");
        Api::namespaced(client, ns)
    } else {
        println!("Listing ManagementClusterConfiguration resources in all namespaces...");
        Api::all(client)
    };

    let configs = api
        .list(&ListParams::default())
        .await
        .context("Failed to list ManagementClusterConfiguration resources")?;

    if configs.items.is_empty() {
        println!("No ManagementClusterConfiguration resources found.");
        return Ok(());
    }

    println!(
        "\n{:<30} {:<20} {:<10} {:<10} {:<40}",
        "NAME", "NAMESPACE", "SUSPEND", "READY", "REVISION"
    );
    println!("{}", "-".repeat(114));

    for config in &configs.items {
        let name = config.name_any();
        let ns = config.namespace().unwrap_or_default();
        let suspend = if config.spec.suspend { "Yes" } else { "No" };

        let status = config.status.as_ref();
        let ready = status
            .and_then(|s| s.conditions.iter().find(|c| c.r#type == READY_CONDITION))
            .map_or("Unknown", |c| c.status.as_str());
        let revision = status
            .and_then(|s| s.last_applied_revision.as_deref())
            .unwrap_or("-");

        println!("{name:<30} {ns:<20} {suspend:<10} {ready:<10} {revision:<40}");
    }

    Ok(())
}

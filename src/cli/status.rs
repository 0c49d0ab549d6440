//! # Status Command
//!
//! Shows the spec summary and status of a ManagementClusterConfiguration.

use anyhow::{Context, Result};
use konfigure_operator::crd::{ManagementClusterConfiguration, Matchers};
use kube::{api::Api, Client};

pub async fn status_command(client: Client, name: &str, ns: &str) -> Result<()> {
    println!("Status for ManagementClusterConfiguration '{ns}/{name}'");
    println!();

    let api: Api<ManagementClusterConfiguration> = Api::namespaced(client, ns);

    let config = api
        .get(name)
        .await
        .with_context(|| format!("Failed to get ManagementClusterConfiguration '{ns}/{name}'"))?;

    println!("Resource Information:");
    println!("  Name: {name}");
    println!("  Namespace: {ns}");
    if let Some(uid) = &config.metadata.uid {
        println!("  UID: {uid}");
    }
    if let Some(generation) = config.metadata.generation {
        println!("  Generation: {generation}");
    }

    let spec = &config.spec;
    println!();
    println!("Spec:");
    println!("  Suspend: {}", spec.suspend);
    println!("  Cluster: {}", spec.configuration.cluster.name);
    println!(
        "  Source: GitRepository {}/{}",
        spec.sources.flux.git_repository.namespace, spec.sources.flux.git_repository.name
    );
    println!("  Destination Namespace: {}", spec.destination.namespace);
    if let Some(prefix) = &spec.destination.naming.prefix {
        println!("  Naming Prefix: {prefix}");
    }
    if let Some(suffix) = &spec.destination.naming.suffix {
        println!("  Naming Suffix: {suffix}");
    }
    println!("  Interval: {}", spec.reconciliation.interval);
    if let Some(retry_interval) = &spec.reconciliation.retry_interval {
        println!("  Retry Interval: {retry_interval}");
    }
    print_matchers("Includes", &spec.configuration.applications.includes);
    print_matchers("Excludes", &spec.configuration.applications.excludes);

    let Some(status) = &config.status else {
        println!();
        println!("Status: No status available (resource may not have been reconciled yet)");
        return Ok(());
    };

    println!();
    println!("Status:");
    if let Some(phase) = status.phase {
        println!("  Phase: {}", phase.as_str());
    }
    if let Some(observed_generation) = status.observed_generation {
        println!("  Observed Generation: {observed_generation}");
    }
    if let Some(revision) = &status.last_applied_revision {
        println!("  Last Applied Revision: {revision}");
    }
    if let Some(revision) = &status.last_attempted_revision {
        println!("  Last Attempted Revision: {revision}");
    }
    if let Some(reconciled_at) = &status.last_reconciled_at {
        println!("  Last Reconciled At: {reconciled_at}");
    }

    if !status.failures.is_empty() {
        println!();
        println!("Failures:");
        for failure in &status.failures {
            println!("  {}: {}", failure.app_name, failure.message);
        }
    }

    if !status.missed_exact_matchers.is_empty() {
        println!();
        println!(
            "Missed Exact Matchers: {}",
            status.missed_exact_matchers.join(", ")
        );
    }

    if !status.conditions.is_empty() {
        println!();
        println!("Conditions:");
        for condition in &status.conditions {
            println!("  {}: {}", condition.r#type, condition.status);
            if let Some(reason) = &condition.reason {
                println!("    Reason: {reason}");
            }
            if let Some(message) = &condition.message {
                println!("    Message: {message}");
            }
            if let Some(last_transition_time) = &condition.last_transition_time {
                println!("    Last Transition: {last_transition_time}");
            }
        }
    }

    Ok(())
}

fn print_matchers(title: &str, matchers: &Matchers) {
    if matchers.is_empty() {
        return;
    }
    println!("  {title}:");
    if !matchers.exact_matchers.is_empty() {
        println!("    Exact: {}", matchers.exact_matchers.join(", "));
    }
    if !matchers.regex_matchers.is_empty() {
        println!("    Regex: {}", matchers.regex_matchers.join(", "));
    }
}

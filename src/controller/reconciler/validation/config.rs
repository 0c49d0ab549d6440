//! # ManagementClusterConfiguration Validation
//!
//! Main orchestration for validating ManagementClusterConfiguration resources.

use crate::crd::ManagementClusterConfiguration;
use anyhow::Result;
use std::time::Duration;

use super::duration::validate_duration_interval;
use super::kubernetes::{
    validate_kubernetes_name, validate_kubernetes_namespace, validate_naming_affix,
};

/// Requeue intervals parsed from `spec.reconciliation`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidatedIntervals {
    pub interval: Duration,
    pub retry_interval: Duration,
}

/// Validate ManagementClusterConfiguration resource
///
/// Checks the fields the API server schema cannot express and returns the
/// parsed requeue intervals. `retryInterval` falls back to `interval`.
/// Matcher regexes are compiled by the resolver and fail there.
pub fn validate_management_cluster_configuration(
    config: &ManagementClusterConfiguration,
) -> Result<ValidatedIntervals> {
    let spec = &config.spec;

    let git_repository = &spec.sources.flux.git_repository;
    validate_kubernetes_name(&git_repository.name, "sources.flux.gitRepository.name")?;
    validate_kubernetes_namespace(
        &git_repository.namespace,
        "sources.flux.gitRepository.namespace",
    )?;

    if let Some(url) = spec
        .sources
        .flux
        .service
        .as_ref()
        .and_then(|service| service.url.as_deref())
    {
        if url.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "sources.flux.service.url cannot be empty when set"
            ));
        }
    }

    validate_kubernetes_namespace(&spec.destination.namespace, "destination.namespace")?;

    if let Some(prefix) = spec.destination.naming.prefix.as_deref() {
        validate_naming_affix(prefix, "destination.naming.prefix")?;
    }
    if let Some(suffix) = spec.destination.naming.suffix.as_deref() {
        validate_naming_affix(suffix, "destination.naming.suffix")?;
    }

    validate_kubernetes_name(&spec.configuration.cluster.name, "configuration.cluster.name")?;

    let interval =
        validate_duration_interval(&spec.reconciliation.interval, "reconciliation.interval")?;
    let retry_interval = match spec.reconciliation.retry_interval.as_deref() {
        Some(retry) => validate_duration_interval(retry, "reconciliation.retryInterval")?,
        None => interval,
    };

    Ok(ValidatedIntervals {
        interval,
        retry_interval,
    })
}

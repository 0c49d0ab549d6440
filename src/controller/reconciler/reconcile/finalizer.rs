//! # Finalizer
//!
//! Adds the finalizer on first reconciliation and cleans up rendered objects on deletion.

use crate::constants::{FIELD_MANAGER, FINALIZER};
use crate::controller::reconciler::status::READY_CONDITION;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::writer::{
    app_from_resource_name, delete_owned_objects, owned_objects_selector,
};
use crate::crd::ManagementClusterConfiguration;
use crate::observability::metrics::{
    remove_generation, remove_reconcile_condition, ConfigLabels, GenerationLabels,
};
use kube::api::{Patch, PatchParams};
use kube::{Api, Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::collections::BTreeSet;
use tracing::{debug, info};

#[must_use]
pub fn has_finalizer(mcc: &ManagementClusterConfiguration) -> bool {
    mcc.finalizers().iter().any(|f| f == FINALIZER)
}

/// Merge-patch the finalizer list computed by `edit`, guarded by `resourceVersion`
///
/// A conflict re-reads the CR and retries right away; `edit` returning `None`
/// means there is nothing left to change.
async fn update_finalizers<F>(
    reconciler: &Reconciler,
    mcc: &ManagementClusterConfiguration,
    edit: F,
) -> Result<(), ReconcilerError>
where
    F: Fn(&[String]) -> Option<Vec<String>>,
{
    let name = mcc.name_any();
    let api: Api<ManagementClusterConfiguration> = Api::namespaced(
        reconciler.client.clone(),
        &mcc.namespace().unwrap_or_default(),
    );
    let attempts = reconciler
        .config
        .read()
        .await
        .apply_conflict_retries
        .saturating_add(1);

    let mut current = mcc.clone();
    for attempt in 1..=attempts {
        let Some(finalizers) = edit(current.finalizers()) else {
            return Ok(());
        };
        let patch = serde_json::json!({
            "metadata": {
                "resourceVersion": current.resource_version(),
                "finalizers": finalizers
            }
        });
        match api
            .patch(&name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 409 && attempt < attempts => {
                debug!(
                    resource.name = name.as_str(),
                    attempt = attempt,
                    "finalizer.conflict"
                );
                match api.get_opt(&name).await? {
                    Some(latest) => current = latest,
                    None => return Ok(()),
                }
            }
            Err(e) => return Err(ReconcilerError::Kube(e)),
        }
    }
    Ok(())
}

/// Add the finalizer if missing
pub async fn ensure_finalizer(
    reconciler: &Reconciler,
    mcc: &ManagementClusterConfiguration,
) -> Result<(), ReconcilerError> {
    if has_finalizer(mcc) {
        return Ok(());
    }

    update_finalizers(reconciler, mcc, |current| {
        if current.iter().any(|f| f == FINALIZER) {
            return None;
        }
        let mut finalizers = current.to_vec();
        finalizers.push(FINALIZER.to_string());
        Some(finalizers)
    })
    .await?;
    debug!(resource.name = mcc.name_any().as_str(), "finalizer.added");
    Ok(())
}

/// Delete the rendered objects, drop the metric series and release the CR
pub async fn cleanup_on_deletion(
    reconciler: &Reconciler,
    mcc: &ManagementClusterConfiguration,
) -> Result<Action, ReconcilerError> {
    let name = mcc.name_any();
    let namespace = mcc.namespace().unwrap_or_default();

    if !has_finalizer(mcc) {
        debug!(resource.name = name.as_str(), "Deleted without finalizer, nothing to clean up");
        return Ok(Action::await_change());
    }

    let destination = &mcc.spec.destination;
    let deleted = delete_owned_objects(
        &reconciler.client,
        &destination.namespace,
        &owned_objects_selector(mcc),
    )
    .await?;
    info!(
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        "Deleted {} rendered object name(s) from namespace {}",
        deleted.len(),
        destination.namespace
    );

    let kind = ManagementClusterConfiguration::kind(&()).to_string();
    let config = ConfigLabels {
        kind: &kind,
        name: &name,
        namespace: &namespace,
    };
    let mut apps: BTreeSet<String> = deleted
        .iter()
        .filter_map(|object| app_from_resource_name(&destination.naming, object))
        .collect();
    if let Some(status) = &mcc.status {
        apps.extend(status.failures.iter().map(|f| f.app_name.clone()));
    }
    for app in &apps {
        remove_generation(GenerationLabels {
            config,
            app_name: app,
            cluster_name: &mcc.spec.configuration.cluster.name,
            destination_namespace: &destination.namespace,
        });
    }
    remove_reconcile_condition(config, READY_CONDITION);

    update_finalizers(reconciler, mcc, |current| {
        current.iter().any(|f| f == FINALIZER).then(|| {
            current
                .iter()
                .filter(|f| *f != FINALIZER)
                .cloned()
                .collect()
        })
    })
    .await?;

    if let Some(uid) = mcc.uid() {
        reconciler.reset_backoff(&uid);
    }
    info!(resource.name = name.as_str(), "finalizer.removed");

    Ok(Action::await_change())
}

//! # Apply
//!
//! Idempotent create-or-update of the rendered ConfigMap and Secret.
//!
//! Writes carry the `resourceVersion` read just before, so a concurrent
//! modification surfaces as a 409 and is retried against a fresh read.

use super::ownership::{filter_external_from_map, match_ownership, should_reconcile};
use crate::constants::{CONFIGMAP_VALUES_KEY, FIELD_MANAGER, SECRET_VALUES_KEY};
use crate::controller::reconciler::render::RenderedApp;
use crate::controller::reconciler::types::ReconcilerError;
use crate::crd::ManagementClusterConfiguration;
use crate::observability::metrics::increment_object_writes_total;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, info, warn};

/// Result of writing one object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Created,
    Updated,
    Unchanged,
    /// Existing object is labelled `reconcile=disabled`
    OptedOut,
}

impl WriteOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOutcome::Created => "created",
            WriteOutcome::Updated => "updated",
            WriteOutcome::Unchanged => "unchanged",
            WriteOutcome::OptedOut => "opted_out",
        }
    }
}

/// Objects the operator writes
pub trait OwnedObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
    /// Lowercase kind used in messages and metrics
    const KIND: &'static str;

    fn same_payload(&self, other: &Self) -> bool;

    fn copy_payload_from(&mut self, desired: &Self);
}

impl OwnedObject for ConfigMap {
    const KIND: &'static str = "configmap";

    fn same_payload(&self, other: &Self) -> bool {
        self.data == other.data && self.binary_data == other.binary_data
    }

    fn copy_payload_from(&mut self, desired: &Self) {
        self.data.clone_from(&desired.data);
        self.binary_data.clone_from(&desired.binary_data);
    }
}

impl OwnedObject for Secret {
    const KIND: &'static str = "secret";

    fn same_payload(&self, other: &Self) -> bool {
        self.data == other.data
    }

    fn copy_payload_from(&mut self, desired: &Self) {
        self.data.clone_from(&desired.data);
        self.string_data = None;
    }
}

/// ConfigMap and Secret of one application
#[derive(Clone)]
pub struct DesiredObjects {
    pub app: String,
    pub configmap: ConfigMap,
    pub secret: Secret,
}

impl Debug for DesiredObjects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DesiredObjects")
            .field("app", &self.app)
            .field("configmap", &self.configmap.metadata.name)
            .field("secret", &self.secret.metadata.name)
            .finish_non_exhaustive()
    }
}

/// Build the objects of a rendered app
///
/// The owner reference is only set when the destination shares the CR's
/// namespace; cross-namespace owner references are not allowed.
#[must_use]
pub fn build_desired_objects(
    mcc: &ManagementClusterConfiguration,
    rendered: &RenderedApp,
    name: &str,
    labels: &BTreeMap<String, String>,
) -> DesiredObjects {
    let namespace = mcc.spec.destination.namespace.clone();
    let owner_references = (mcc.namespace().as_deref() == Some(namespace.as_str()))
        .then(|| mcc.controller_owner_ref(&()))
        .flatten()
        .map(|owner| vec![owner]);

    let metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace),
        labels: Some(labels.clone()),
        owner_references,
        ..ObjectMeta::default()
    };

    let configmap = ConfigMap {
        metadata: metadata.clone(),
        data: Some(BTreeMap::from([(
            CONFIGMAP_VALUES_KEY.to_string(),
            rendered.configmap_values.clone(),
        )])),
        ..ConfigMap::default()
    };

    let secret = Secret {
        metadata,
        data: Some(BTreeMap::from([(
            SECRET_VALUES_KEY.to_string(),
            ByteString(rendered.secret_values.as_bytes().to_vec()),
        )])),
        type_: Some("Opaque".to_string()),
        ..Secret::default()
    };

    DesiredObjects {
        app: rendered.app.clone(),
        configmap,
        secret,
    }
}

/// Ownership message for an existing object, `None` when it is absent or ours
async fn ownership_violation<K: OwnedObject>(
    api: &Api<K>,
    desired: &K,
) -> Result<Option<String>, kube::Error> {
    let Some(existing) = api.get_opt(&desired.name_any()).await? else {
        return Ok(None);
    };

    Ok(match_ownership(existing.labels(), desired.labels())
        .err()
        .map(|detail| {
            format!(
                "desired {} exists already and is owned by another object: {detail}",
                K::KIND
            )
        }))
}

/// Ownership pre-flight over both objects, before either is written
pub async fn preflight(client: &Client, desired: &DesiredObjects) -> Result<(), ReconcilerError> {
    let namespace = desired.configmap.namespace().unwrap_or_default();
    let configmaps: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &namespace);

    let messages: Vec<String> = [
        ownership_violation(&configmaps, &desired.configmap).await?,
        ownership_violation(&secrets, &desired.secret).await?,
    ]
    .into_iter()
    .flatten()
    .collect();

    if messages.is_empty() {
        Ok(())
    } else {
        Err(ReconcilerError::OwnershipConflict(messages.join(" ")))
    }
}

/// Existing object with external metadata kept, ours enforced and the desired payload
pub fn merge_into_existing<K: OwnedObject>(existing: &K, desired: &K) -> K {
    let mut merged = existing.clone();

    let mut labels = filter_external_from_map(existing.labels());
    labels.extend(desired.labels().clone());
    let mut annotations = filter_external_from_map(existing.annotations());
    annotations.extend(desired.annotations().clone());

    let meta = merged.meta_mut();
    meta.labels = Some(labels);
    meta.annotations = (!annotations.is_empty()).then_some(annotations);
    if desired.meta().owner_references.is_some() {
        meta.owner_references.clone_from(&desired.meta().owner_references);
    }

    merged.copy_payload_from(desired);
    merged
}

fn is_unchanged<K: OwnedObject>(existing: &K, merged: &K) -> bool {
    existing.labels() == merged.labels()
        && existing.annotations() == merged.annotations()
        && existing.meta().owner_references == merged.meta().owner_references
        && existing.same_payload(merged)
}

async fn apply_object<K: OwnedObject>(
    api: &Api<K>,
    desired: &K,
    conflict_retries: u32,
) -> Result<WriteOutcome, ReconcilerError> {
    let name = desired.name_any();
    let namespace = desired.namespace().unwrap_or_default();
    let post_params = PostParams {
        field_manager: Some(FIELD_MANAGER.to_string()),
        ..PostParams::default()
    };
    let attempts = conflict_retries.saturating_add(1);

    for attempt in 1..=attempts {
        let result = match api.get_opt(&name).await? {
            None => api
                .create(&post_params, desired)
                .await
                .map(|_| WriteOutcome::Created),
            Some(existing) => {
                // The object may have been created by someone else since the pre-flight
                if let Err(detail) = match_ownership(existing.labels(), desired.labels()) {
                    return Err(ReconcilerError::OwnershipConflict(format!(
                        "desired {} exists already and is owned by another object: {detail}",
                        K::KIND
                    )));
                }
                if !should_reconcile(existing.labels()) {
                    info!(
                        "Skipping {} {}/{}: reconciliation disabled by label",
                        K::KIND,
                        namespace,
                        name
                    );
                    increment_object_writes_total(K::KIND, WriteOutcome::OptedOut.as_str());
                    return Ok(WriteOutcome::OptedOut);
                }

                let merged = merge_into_existing(&existing, desired);
                if is_unchanged(&existing, &merged) {
                    debug!("{} {}/{} is up to date", K::KIND, namespace, name);
                    increment_object_writes_total(K::KIND, WriteOutcome::Unchanged.as_str());
                    return Ok(WriteOutcome::Unchanged);
                }

                // merged carries the resourceVersion of the read above
                api.replace(&name, &post_params, &merged)
                    .await
                    .map(|_| WriteOutcome::Updated)
            }
        };

        match result {
            Ok(outcome) => {
                info!("{} {}/{} {}", K::KIND, namespace, name, outcome.as_str());
                increment_object_writes_total(K::KIND, outcome.as_str());
                return Ok(outcome);
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 409 => {
                warn!(
                    "Conflict writing {} {}/{} (attempt {}/{}): {}",
                    K::KIND,
                    namespace,
                    name,
                    attempt,
                    attempts,
                    api_err.message
                );
                increment_object_writes_total(K::KIND, "conflict");
            }
            Err(e) => return Err(ReconcilerError::Kube(e)),
        }
    }

    Err(ReconcilerError::ApiConflict {
        kind: K::KIND,
        namespace,
        name,
        attempts,
    })
}

/// Write both objects of an app; the ConfigMap goes first
pub async fn apply_desired_objects(
    client: &Client,
    desired: &DesiredObjects,
    conflict_retries: u32,
) -> Result<(WriteOutcome, WriteOutcome), ReconcilerError> {
    let namespace = desired.configmap.namespace().unwrap_or_default();
    let configmaps: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &namespace);

    let configmap = apply_object(&configmaps, &desired.configmap, conflict_retries).await?;
    let secret = apply_object(&secrets, &desired.secret, conflict_retries).await?;

    Ok((configmap, secret))
}

async fn delete_matching<K: OwnedObject>(
    api: &Api<K>,
    selector: &str,
) -> Result<Vec<String>, kube::Error> {
    let objects = api.list(&ListParams::default().labels(selector)).await?;
    let mut deleted = Vec::new();

    for object in objects {
        let name = object.name_any();
        if !should_reconcile(object.labels()) {
            info!("Leaving {} {} in place: reconciliation disabled by label", K::KIND, name);
            continue;
        }
        match api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {
                info!("Deleted {} {}", K::KIND, name);
                increment_object_writes_total(K::KIND, "deleted");
                deleted.push(name);
            }
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                debug!("{} {} already gone", K::KIND, name);
            }
            Err(e) => return Err(e),
        }
    }

    Ok(deleted)
}

/// Delete every ConfigMap and Secret in `namespace` matching the ownership `selector`
///
/// Returns the distinct names of the deleted objects.
pub async fn delete_owned_objects(
    client: &Client,
    namespace: &str,
    selector: &str,
) -> Result<Vec<String>, ReconcilerError> {
    let configmaps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);

    let mut deleted = delete_matching(&configmaps, selector).await?;
    deleted.extend(delete_matching(&secrets, selector).await?);
    deleted.sort();
    deleted.dedup();
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{OWNER_NAME_LABEL, REVISION_LABEL};

    fn configmap(labels: &[(&str, &str)], annotations: &[(&str, &str)], data: &str) -> ConfigMap {
        let to_map = |pairs: &[(&str, &str)]| {
            pairs
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>()
        };
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("app-1-ex1".to_string()),
                namespace: Some("default".to_string()),
                labels: Some(to_map(labels)),
                annotations: (!annotations.is_empty()).then(|| to_map(annotations)),
                resource_version: Some("42".to_string()),
                ..ObjectMeta::default()
            },
            data: Some(BTreeMap::from([(
                CONFIGMAP_VALUES_KEY.to_string(),
                data.to_string(),
            )])),
            ..ConfigMap::default()
        }
    }

    #[test]
    fn test_merge_keeps_external_metadata() {
        let existing = configmap(
            &[
                ("team", "honeybadger"),
                (OWNER_NAME_LABEL, "example-1"),
                ("konfigure.giantswarm.io/retired", "x"),
            ],
            &[("note", "hand-written")],
            "foo: old\n",
        );
        let desired = configmap(
            &[(OWNER_NAME_LABEL, "example-1"), (REVISION_LABEL, "abc")],
            &[],
            "foo: new\n",
        );

        let merged = merge_into_existing(&existing, &desired);
        let labels = merged.labels();
        assert_eq!(labels.get("team").map(String::as_str), Some("honeybadger"));
        assert_eq!(labels.get(REVISION_LABEL).map(String::as_str), Some("abc"));
        assert!(!labels.contains_key("konfigure.giantswarm.io/retired"));
        assert_eq!(
            merged.annotations().get("note").map(String::as_str),
            Some("hand-written")
        );
        assert_eq!(merged.metadata.resource_version.as_deref(), Some("42"));
        assert_eq!(
            merged.data.unwrap().get(CONFIGMAP_VALUES_KEY).map(String::as_str),
            Some("foo: new\n")
        );
    }

    #[test]
    fn test_identical_input_is_unchanged() {
        let existing = configmap(&[(OWNER_NAME_LABEL, "example-1")], &[], "foo: bar\n");
        let desired = configmap(&[(OWNER_NAME_LABEL, "example-1")], &[], "foo: bar\n");

        let merged = merge_into_existing(&existing, &desired);
        assert!(is_unchanged(&existing, &merged));

        let changed = configmap(&[(OWNER_NAME_LABEL, "example-1")], &[], "foo: baz\n");
        let merged = merge_into_existing(&existing, &changed);
        assert!(!is_unchanged(&existing, &merged));
    }

    #[test]
    fn test_write_outcome_labels() {
        assert_eq!(WriteOutcome::Created.as_str(), "created");
        assert_eq!(WriteOutcome::OptedOut.as_str(), "opted_out");
    }
}

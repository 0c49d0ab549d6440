//! # Reconciliation Logic
//!
//! Main reconciliation flow for ManagementClusterConfiguration resources:
//! validate, fetch the source artifact, resolve applications, render and
//! write each of them, then report the outcome in the status.

mod finalize;
mod finalizer;
mod schedule;

pub use finalize::finish_reconciliation;
pub use finalizer::{cleanup_on_deletion, ensure_finalizer, has_finalizer};
pub use schedule::{requeue_after, time_until_due};

use crate::constants::SOPS_KEYS_LABEL;
use crate::controller::reconciler::artifact::fetch_artifact;
use crate::controller::reconciler::render::{
    prepare_cluster_context, render_app, ClusterContext,
};
use crate::controller::reconciler::resolve::{filter_apps, MatcherSet};
use crate::controller::reconciler::sops::SopsDecryptor;
use crate::controller::reconciler::source::SourceTree;
use crate::controller::reconciler::status::{set_phase, StatusReport};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError, TriggerSource};
use crate::controller::reconciler::validation::validate_management_cluster_configuration;
use crate::controller::reconciler::writer::{
    apply_desired_objects, build_desired_objects, generate_ownership_labels, preflight,
    resource_name,
};
use crate::crd::{FailureStatus, ManagementClusterConfiguration, ReconciliationPhase};
use crate::observability::metrics::{
    increment_reconciliation_errors, increment_reconciliations, set_generation, ConfigLabels,
    GenerationLabels,
};
use kube::{Api, Resource, ResourceExt};
use kube_runtime::controller::Action;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// How a rendering run ended
enum RunOutcome {
    Report(StatusReport),
    /// The CR disappeared or started deleting mid-run
    Aborted,
}

/// Main reconciliation function
///
/// Expected failures (invalid configuration, source not ready, setup and
/// per-app failures) are reported in the status and requeued from here.
/// Anything else is returned to the error policy.
pub async fn reconcile(
    mcc: Arc<ManagementClusterConfiguration>,
    ctx: Arc<Reconciler>,
    trigger_source: TriggerSource,
) -> Result<Action, ReconcilerError> {
    let start = Instant::now();
    let name = mcc.name_any();
    let namespace = mcc.namespace().unwrap_or_default();

    let span = info_span!(
        "reconcile",
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        resource.kind = "ManagementClusterConfiguration",
        trigger.source = trigger_source.as_str(),
        operation.duration_ms = tracing::field::Empty,
        operation.success = tracing::field::Empty,
    );
    let span_clone = span.clone();

    async move {
        info!(
            "Reconciling ManagementClusterConfiguration {}/{} (trigger source: {})",
            namespace,
            name,
            trigger_source.as_str()
        );
        increment_reconciliations();

        let result = reconcile_inner(&mcc, &ctx, start).await;

        span_clone.record("operation.duration_ms", start.elapsed().as_millis() as u64);
        span_clone.record("operation.success", result.is_ok());
        if result.is_err() {
            increment_reconciliation_errors();
        }
        result
    }
    .instrument(span)
    .await
}

async fn reconcile_inner(
    mcc: &ManagementClusterConfiguration,
    ctx: &Reconciler,
    start: Instant,
) -> Result<Action, ReconcilerError> {
    if mcc.meta().deletion_timestamp.is_some() {
        return cleanup_on_deletion(ctx, mcc).await;
    }

    ensure_finalizer(ctx, mcc).await?;

    if mcc.spec.suspend {
        info!("Reconciliation suspended, leaving rendered objects untouched");
        return finish_reconciliation(ctx, mcc, &StatusReport::suspended(), None, start).await;
    }

    let intervals = match validate_management_cluster_configuration(mcc) {
        Ok(intervals) => intervals,
        Err(e) => {
            warn!("Invalid configuration: {:#}", e);
            let report = StatusReport::configuration_invalid(&format!("{e:#}"));
            return finish_reconciliation(ctx, mcc, &report, None, start).await;
        }
    };
    if let Err(e) = MatcherSet::compile(&mcc.spec.configuration.applications) {
        warn!("Invalid configuration: {}", e);
        let report = StatusReport::configuration_invalid(&e.to_string());
        return finish_reconciliation(ctx, mcc, &report, None, start).await;
    }

    match render_and_apply(mcc, ctx).await {
        Ok(RunOutcome::Report(report)) => {
            finish_reconciliation(ctx, mcc, &report, Some(&intervals), start).await
        }
        Ok(RunOutcome::Aborted) => {
            info!("Resource is gone or being deleted, stopped before further writes");
            Ok(Action::await_change())
        }
        Err(e) => match report_for_error(&e, None) {
            Some(report) => {
                finish_reconciliation(ctx, mcc, &report, Some(&intervals), start).await
            }
            None => Err(e),
        },
    }
}

/// Status report of an expected failure; `None` for errors left to the error policy
fn report_for_error(error: &ReconcilerError, revision: Option<&str>) -> Option<StatusReport> {
    match error {
        ReconcilerError::Configuration(detail) => {
            Some(StatusReport::configuration_invalid(detail))
        }
        ReconcilerError::SourceNotReady(detail) => Some(StatusReport::source_not_ready(detail)),
        ReconcilerError::Setup(detail) => Some(StatusReport::setup_failed(detail, revision)),
        ReconcilerError::SecretDecryption(e) => {
            Some(StatusReport::setup_failed(&e.to_string(), revision))
        }
        ReconcilerError::Render(e) => Some(StatusReport::setup_failed(&e.to_string(), revision)),
        _ => None,
    }
}

/// Whether the CR still exists and is not being deleted
async fn still_wanted(
    ctx: &Reconciler,
    mcc: &ManagementClusterConfiguration,
) -> Result<bool, ReconcilerError> {
    let api: Api<ManagementClusterConfiguration> =
        Api::namespaced(ctx.client.clone(), &mcc.namespace().unwrap_or_default());
    let current = api.get_opt(&mcc.name_any()).await?;
    Ok(current.is_some_and(|current| {
        current.meta().deletion_timestamp.is_none() && current.uid() == mcc.uid()
    }))
}

async fn render_and_apply(
    mcc: &ManagementClusterConfiguration,
    ctx: &Reconciler,
) -> Result<RunOutcome, ReconcilerError> {
    if !ctx.sops_capability_ready.load(Ordering::Relaxed) {
        let keys_namespace = ctx.config.read().await.sops_keys_namespace.clone();
        return Err(ReconcilerError::Setup(format!(
            "no AGE identities found in Secrets labelled {SOPS_KEYS_LABEL} in namespace {keys_namespace}"
        )));
    }

    let previous_revision = mcc
        .status
        .as_ref()
        .and_then(|s| s.last_attempted_revision.clone());

    let fetched = fetch_artifact(ctx, &mcc.spec.sources.flux).await?;
    let revision = fetched.revision.clone();
    // Re-runs of a known revision go straight to the final status
    if is_new_revision(previous_revision.as_deref(), &revision) {
        info!("New source revision {}", revision);
        set_phase(&ctx.client, mcc, ReconciliationPhase::Pending).await?;
        set_phase(&ctx.client, mcc, ReconciliationPhase::Rendering).await?;
    }

    let cluster = mcc.spec.configuration.cluster.name.as_str();
    let decryptor = ctx.decryptor().await;

    let context = match prepare_cluster_context(&fetched.tree, cluster, &decryptor).await {
        Ok(context) => context,
        Err(e) => {
            warn!("Failed to prepare cluster context: {}", e);
            return report_for_error(&e, Some(&revision))
                .map(RunOutcome::Report)
                .ok_or(e);
        }
    };

    let catalogue = fetched
        .tree
        .list_apps()
        .map_err(|e| ReconcilerError::Setup(format!("failed to list applications: {e}")))?;
    let resolution = filter_apps(catalogue.as_deref(), &mcc.spec.configuration.applications)
        .map_err(|e| ReconcilerError::Configuration(e.to_string()))?;
    if !resolution.misses.is_empty() {
        warn!(
            "Exact include matchers matched no application: {}",
            resolution.misses.join(", ")
        );
    }
    debug!("Resolved applications: {}", resolution.matches.join(", "));

    let labels = generate_ownership_labels(mcc, &revision);
    let conflict_retries = ctx.config.read().await.apply_conflict_retries;

    let kind = ManagementClusterConfiguration::kind(&());
    let name = mcc.name_any();
    let namespace = mcc.namespace().unwrap_or_default();
    let destination_namespace = mcc.spec.destination.namespace.as_str();

    let mut failures = Vec::new();
    for app in &resolution.matches {
        if !still_wanted(ctx, mcc).await? {
            return Ok(RunOutcome::Aborted);
        }

        let outcome = render_and_apply_app(
            ctx,
            mcc,
            app,
            &fetched.tree,
            &context,
            &decryptor,
            &labels,
            conflict_retries,
        )
        .await;

        let generation_labels = GenerationLabels {
            config: ConfigLabels {
                kind: &kind,
                name: &name,
                namespace: &namespace,
            },
            app_name: app,
            cluster_name: cluster,
            destination_namespace,
        };
        match outcome {
            Ok(()) => set_generation(generation_labels, true),
            Err(e) if is_app_failure(&e) => {
                warn!(app = app.as_str(), "Application failed: {}", e);
                set_generation(generation_labels, false);
                failures.push(FailureStatus {
                    app_name: app.clone(),
                    message: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    let report = if failures.is_empty() {
        StatusReport::succeeded(&revision, resolution.misses)
    } else {
        StatusReport::failed(&revision, failures, resolution.misses)
    };
    Ok(RunOutcome::Report(report))
}

fn is_new_revision(previous: Option<&str>, current: &str) -> bool {
    previous != Some(current)
}

/// Errors confined to a single application
fn is_app_failure(error: &ReconcilerError) -> bool {
    matches!(
        error,
        ReconcilerError::Render(_)
            | ReconcilerError::SecretDecryption(_)
            | ReconcilerError::OwnershipConflict(_)
            | ReconcilerError::ApiConflict { .. }
    )
}

#[allow(
    clippy::too_many_arguments,
    reason = "Per-app inputs are computed once per reconciliation"
)]
async fn render_and_apply_app(
    ctx: &Reconciler,
    mcc: &ManagementClusterConfiguration,
    app: &str,
    tree: &SourceTree,
    context: &ClusterContext,
    decryptor: &SopsDecryptor,
    labels: &BTreeMap<String, String>,
    conflict_retries: u32,
) -> Result<(), ReconcilerError> {
    let cluster = mcc.spec.configuration.cluster.name.as_str();
    let rendered = render_app(tree, cluster, app, context, decryptor).await?;

    let object_name = resource_name(&mcc.spec.destination.naming, app);
    let desired = build_desired_objects(mcc, &rendered, &object_name, labels);

    preflight(&ctx.client, &desired).await?;
    let (configmap, secret) =
        apply_desired_objects(&ctx.client, &desired, conflict_retries).await?;
    debug!(
        app = app,
        configmap = configmap.as_str(),
        secret = secret.as_str(),
        "app.applied"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::render::RenderError;
    use crate::controller::reconciler::sops::{SopsDecryptionError, SopsDecryptionFailureReason};
    use crate::controller::reconciler::status::ReadyReason;

    #[test]
    fn test_expected_failures_map_to_reasons() {
        let cases = [
            (
                ReconcilerError::SourceNotReady("flux/config: not Ready".to_string()),
                ReadyReason::SourceNotReady,
            ),
            (
                ReconcilerError::Setup("artifact fetch failed".to_string()),
                ReadyReason::SetupFailed,
            ),
            (
                ReconcilerError::Configuration("bad regex".to_string()),
                ReadyReason::ConfigurationInvalid,
            ),
            (
                ReconcilerError::SecretDecryption(SopsDecryptionError::new(
                    SopsDecryptionFailureReason::KeyNotFound,
                    "no key",
                )),
                ReadyReason::SetupFailed,
            ),
        ];
        for (error, reason) in cases {
            let report = report_for_error(&error, Some("abc")).unwrap();
            assert_eq!(report.reason, reason);
        }
    }

    #[test]
    fn test_unexpected_errors_go_to_error_policy() {
        let error = ReconcilerError::ReconciliationFailed(anyhow::anyhow!("boom"));
        assert!(report_for_error(&error, None).is_none());
    }

    #[test]
    fn test_intermediate_phases_only_for_new_revisions() {
        assert!(is_new_revision(None, "main@sha1:abc"));
        assert!(is_new_revision(Some("main@sha1:old"), "main@sha1:abc"));
        assert!(!is_new_revision(Some("main@sha1:abc"), "main@sha1:abc"));
    }

    #[test]
    fn test_app_failures_are_confined() {
        assert!(is_app_failure(&ReconcilerError::Render(RenderError::NotAMap {
            path: "default/config.yaml".to_string()
        })));
        assert!(is_app_failure(&ReconcilerError::OwnershipConflict(
            "desired configmap exists already".to_string()
        )));
        assert!(!is_app_failure(&ReconcilerError::Setup("x".to_string())));
    }
}

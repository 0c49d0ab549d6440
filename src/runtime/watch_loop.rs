//! # Watch Loop
//!
//! Controller watch loop that monitors ManagementClusterConfiguration resources
//! and triggers reconciliation when changes are detected or timers fire.

use crate::config::SharedControllerConfig;
use crate::constants::RECONCILE_REQUESTED_AT_ANNOTATION;
use crate::controller::reconciler::reconcile::has_finalizer;
use crate::controller::reconciler::resolve::MatcherSet;
use crate::controller::reconciler::validation::validate_management_cluster_configuration;
use crate::controller::reconciler::{
    reconcile, time_until_due, Reconciler, ReconcilerError, TriggerSource,
};
use crate::controller::server::ServerState;
use crate::crd::{ManagementClusterConfiguration, ReconciliationPhase};
use crate::observability::metrics::increment_requeues_total;
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use kube::api::Api;
use kube::{Resource, ResourceExt};
use kube_runtime::{controller::Action, watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn, Instrument};

/// Run the controller watch loop
///
/// Watches ManagementClusterConfiguration resources in all namespaces and
/// restarts the watch when the stream ends or fails, until a shutdown signal
/// marks the server as not ready.
pub async fn run_watch_loop(
    configs: Api<ManagementClusterConfiguration>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    controller_config: SharedControllerConfig,
) -> Result<(), anyhow::Error> {
    info!("Starting controller watch loop...");

    let backoff_start_ms = controller_config.read().await.backoff_start_ms;
    let backoff_duration_ms = Arc::new(AtomicU64::new(backoff_start_ms));

    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");

        shutdown_server_state.is_ready.store(false, Ordering::Relaxed);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff_clone = Arc::clone(&backoff_duration_ms);
        let controller_config_for_filter = controller_config.clone();
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        let controller_future =
            Controller::new(configs.clone(), watcher::Config::default().any_semantic())
                .shutdown_on_signal()
                .run(
                    create_reconcile_fn,
                    |obj, error, ctx| handle_reconciliation_error(obj, error, ctx),
                    Arc::clone(&reconciler),
                )
                .filter_map(move |x| {
                    let backoff = Arc::clone(&backoff_clone);
                    let config_clone = controller_config_for_filter.clone();
                    async move {
                        match &x {
                            Ok(_) => {
                                let backoff_start = config_clone.read().await.backoff_start_ms;
                                backoff.store(backoff_start, Ordering::Relaxed);
                                debug!("watch.event.success");
                                Some(x)
                            }
                            Err(e) => {
                                let error_string = format!("{e:?}");
                                let (max_backoff, watch_restart_delay) = {
                                    let config = config_clone.read().await;
                                    (config.backoff_max_ms, config.watch_restart_delay_secs)
                                };
                                handle_watch_stream_error(
                                    &error_string,
                                    &backoff,
                                    max_backoff,
                                    watch_restart_delay,
                                )
                                .await
                                .map(|()| x)
                            }
                        }
                    }
                })
                .for_each(|_| futures::future::ready(()));

        controller_future.instrument(watch_span).await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = controller_config
            .read()
            .await
            .watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// What to do with a watch event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchDecision {
    Reconcile(TriggerSource),
    /// Periodic reconciliation not due yet, wake up after the remaining time
    Wait(Duration),
    /// Nothing to do until the resource changes
    Skip,
}

/// Decide whether a watch event needs a reconciliation
///
/// Status-only updates are skipped so that the status patch written at the
/// end of every reconciliation does not trigger another one. Deletions,
/// missing finalizers, spec changes and manual triggers always reconcile.
/// Otherwise the schedule recorded in the status decides.
#[must_use]
pub fn decide(mcc: &ManagementClusterConfiguration, now: DateTime<Utc>) -> WatchDecision {
    if mcc.meta().deletion_timestamp.is_some() || !has_finalizer(mcc) {
        return WatchDecision::Reconcile(TriggerSource::SpecChange);
    }

    let generation = mcc.metadata.generation.unwrap_or(0);
    let status = mcc.status.as_ref();
    let observed_generation = status.and_then(|s| s.observed_generation).unwrap_or(0);
    if generation != observed_generation || observed_generation == 0 {
        return WatchDecision::Reconcile(TriggerSource::SpecChange);
    }

    if is_manual_trigger(mcc) {
        return WatchDecision::Reconcile(TriggerSource::ManualCli);
    }

    if mcc.spec.suspend {
        let already_suspended =
            status.and_then(|s| s.phase) == Some(ReconciliationPhase::Suspended);
        return if already_suspended {
            WatchDecision::Skip
        } else {
            WatchDecision::Reconcile(TriggerSource::SpecChange)
        };
    }

    let Ok(intervals) = validate_management_cluster_configuration(mcc) else {
        return WatchDecision::Skip;
    };
    if MatcherSet::compile(&mcc.spec.configuration.applications).is_err() {
        return WatchDecision::Skip;
    }

    match time_until_due(status, &intervals, now) {
        Some(remaining) if remaining.is_zero() => WatchDecision::Reconcile(TriggerSource::TimerBased),
        Some(remaining) => WatchDecision::Wait(remaining),
        None => WatchDecision::Skip,
    }
}

/// A `kfgctl reconcile` request not yet acknowledged in the status
fn is_manual_trigger(mcc: &ManagementClusterConfiguration) -> bool {
    let Some(requested_at) = mcc.annotations().get(RECONCILE_REQUESTED_AT_ANNOTATION) else {
        return false;
    };
    let handled = mcc
        .status
        .as_ref()
        .and_then(|s| s.last_handled_reconcile_at.as_deref());
    handled != Some(requested_at.as_str())
}

/// Action for a watch event that does not reconcile now
fn deferred_action(name: &str, namespace: &str, decision: WatchDecision) -> Action {
    match decision {
        WatchDecision::Wait(remaining) => {
            debug!(
                resource.name = name,
                resource.namespace = namespace,
                remaining_secs = remaining.as_secs(),
                "Skipping reconciliation - status unchanged and next reconciliation not due yet"
            );
            increment_requeues_total("timer-based");
            Action::requeue(remaining)
        }
        WatchDecision::Skip | WatchDecision::Reconcile(_) => {
            debug!(
                resource.name = name,
                resource.namespace = namespace,
                "Skipping reconciliation - waiting for a spec change"
            );
            Action::await_change()
        }
    }
}

/// Create the reconciliation function for the controller
async fn create_reconcile_fn(
    obj: Arc<ManagementClusterConfiguration>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    let generation = obj.metadata.generation.unwrap_or(0);
    let observed_generation = obj
        .status
        .as_ref()
        .and_then(|s| s.observed_generation)
        .unwrap_or(0);

    let (obj, trigger_source) = match decide(&obj, Utc::now()) {
        WatchDecision::Reconcile(_) => {
            // The cached object can predate the status written by the previous run
            let api: Api<ManagementClusterConfiguration> =
                Api::namespaced(ctx.client.clone(), &namespace);
            let Some(live) = api.get_opt(&name).await? else {
                debug!(
                    resource.name = name.as_str(),
                    resource.namespace = namespace.as_str(),
                    "Resource is gone, nothing to reconcile"
                );
                return Ok(Action::await_change());
            };
            match decide(&live, Utc::now()) {
                WatchDecision::Reconcile(trigger_source) => (Arc::new(live), trigger_source),
                decision => return Ok(deferred_action(&name, &namespace, decision)),
            }
        }
        decision => return Ok(deferred_action(&name, &namespace, decision)),
    };

    debug!(
        resource.name = name.as_str(),
        resource.namespace = namespace.as_str(),
        generation = generation,
        observed_generation = observed_generation,
        trigger_source = trigger_source.as_str(),
        "watch.event.received"
    );

    let result = reconcile(obj, ctx, trigger_source).await;

    match &result {
        Ok(action) => {
            debug!(resource.name = name.as_str(), action = ?action, "watch.event.reconciled");
        }
        Err(e) => {
            error!(resource.name = name.as_str(), error = %e, "watch.event.reconciliation_failed");
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FINALIZER;
    use crate::crd::ManagementClusterConfigurationStatus;
    use chrono::TimeZone;

    fn mcc(suspend: bool) -> ManagementClusterConfiguration {
        let mut mcc: ManagementClusterConfiguration = serde_json::from_value(serde_json::json!({
            "apiVersion": "konfigure.giantswarm.io/v1alpha1",
            "kind": "ManagementClusterConfiguration",
            "metadata": {
                "name": "gauss",
                "namespace": "flux-giantswarm",
                "generation": 2,
                "uid": "1234",
                "finalizers": [FINALIZER],
            },
            "spec": {
                "configuration": {"cluster": {"name": "gauss"}},
                "destination": {"namespace": "giantswarm"},
                "reconciliation": {"interval": "5m", "retryInterval": "1m"},
                "sources": {"flux": {"gitRepository": {"name": "giantswarm-config", "namespace": "flux-giantswarm"}}},
                "suspend": suspend,
            }
        }))
        .unwrap();
        mcc.status = Some(ManagementClusterConfigurationStatus {
            observed_generation: Some(2),
            phase: Some(ReconciliationPhase::Ready),
            last_reconciled_at: Some("2024-01-01T00:00:00.000000000Z".to_string()),
            ..ManagementClusterConfigurationStatus::default()
        });
        mcc
    }

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap()
    }

    #[test]
    fn test_status_only_change_waits_for_timer() {
        assert_eq!(
            decide(&mcc(false), at(2)),
            WatchDecision::Wait(Duration::from_secs(180))
        );
        assert_eq!(
            decide(&mcc(false), at(6)),
            WatchDecision::Reconcile(TriggerSource::TimerBased)
        );
    }

    #[test]
    fn test_spec_change_reconciles() {
        let mut mcc = mcc(false);
        mcc.metadata.generation = Some(3);
        assert_eq!(
            decide(&mcc, at(1)),
            WatchDecision::Reconcile(TriggerSource::SpecChange)
        );
    }

    #[test]
    fn test_missing_finalizer_reconciles() {
        let mut mcc = mcc(false);
        mcc.metadata.finalizers = None;
        assert_eq!(
            decide(&mcc, at(1)),
            WatchDecision::Reconcile(TriggerSource::SpecChange)
        );
    }

    #[test]
    fn test_manual_trigger_is_handled_once() {
        let mut mcc = mcc(false);
        mcc.metadata.annotations = Some(
            [(
                RECONCILE_REQUESTED_AT_ANNOTATION.to_string(),
                "2024-01-01T00:01:00Z".to_string(),
            )]
            .into(),
        );
        assert_eq!(
            decide(&mcc, at(2)),
            WatchDecision::Reconcile(TriggerSource::ManualCli)
        );

        if let Some(status) = mcc.status.as_mut() {
            status.last_handled_reconcile_at = Some("2024-01-01T00:01:00Z".to_string());
        }
        assert_eq!(
            decide(&mcc, at(2)),
            WatchDecision::Wait(Duration::from_secs(180))
        );
    }

    #[test]
    fn test_suspended() {
        let mut mcc = mcc(true);
        assert_eq!(
            decide(&mcc, at(10)),
            WatchDecision::Reconcile(TriggerSource::SpecChange)
        );

        if let Some(status) = mcc.status.as_mut() {
            status.phase = Some(ReconciliationPhase::Suspended);
        }
        assert_eq!(decide(&mcc, at(10)), WatchDecision::Skip);
    }

    #[test]
    fn test_failed_uses_retry_interval() {
        let mut mcc = mcc(false);
        if let Some(status) = mcc.status.as_mut() {
            status.phase = Some(ReconciliationPhase::Failed);
        }
        assert_eq!(
            decide(&mcc, at(1)),
            WatchDecision::Reconcile(TriggerSource::TimerBased)
        );
    }

    #[test]
    fn test_invalid_regex_waits_for_spec_change() {
        let mut mcc = mcc(false);
        mcc.spec.configuration.applications.includes.regex_matchers = vec!["(unclosed".to_string()];
        if let Some(status) = mcc.status.as_mut() {
            status.phase = Some(ReconciliationPhase::Failed);
        }
        assert_eq!(decide(&mcc, at(2)), WatchDecision::Skip);

        mcc.metadata.generation = Some(3);
        assert_eq!(
            decide(&mcc, at(2)),
            WatchDecision::Reconcile(TriggerSource::SpecChange)
        );
    }

    #[test]
    fn test_rendering_status_is_not_due_again() {
        let mut mcc = mcc(false);
        if let Some(status) = mcc.status.as_mut() {
            status.phase = Some(ReconciliationPhase::Rendering);
        }
        assert_eq!(
            decide(&mcc, at(0)),
            WatchDecision::Wait(Duration::from_secs(60))
        );
        assert_eq!(
            decide(&mcc, at(1)),
            WatchDecision::Reconcile(TriggerSource::TimerBased)
        );
    }
}

//! # SOPS Key Watch Loop
//!
//! Watches the key Secrets and hot-reloads AGE identities on change.

use super::keys::{reload_sops_keys, sops_keys_selector};
use crate::controller::reconciler::types::Reconciler;
use futures::{pin_mut, StreamExt};
use k8s_openapi::api::core::v1::Secret;
use kube::Api;
use kube_runtime::{watcher, WatchStreamExt};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Spawn a background task that reloads identities whenever a labelled Secret changes
pub fn start_sops_key_watch(reconciler: Arc<Reconciler>) {
    tokio::spawn(async move {
        let namespace = reconciler.config.read().await.sops_keys_namespace.clone();
        let secrets: Api<Secret> = Api::namespaced(reconciler.client.clone(), &namespace);

        info!(
            "Starting watch for SOPS key secrets ({}) in namespace {}",
            sops_keys_selector(),
            namespace
        );

        let stream = watcher(
            secrets,
            watcher::Config::default().labels(&sops_keys_selector()),
        )
        .default_backoff();
        pin_mut!(stream);

        while let Some(event_result) = stream.next().await {
            match event_result {
                Ok(event) => {
                    let changed = match &event {
                        watcher::Event::Apply(secret) | watcher::Event::Delete(secret) => {
                            info!(
                                "SOPS key secret '{}' changed, reloading identities",
                                secret.metadata.name.as_deref().unwrap_or("unknown")
                            );
                            true
                        }
                        // A (re)list finished, the set of Secrets may differ from the last load
                        watcher::Event::InitDone => true,
                        watcher::Event::Init | watcher::Event::InitApply(_) => false,
                    };

                    if changed {
                        if let Err(e) = reload_sops_keys(&reconciler).await {
                            error!("Failed to reload SOPS keys: {:#}", e);
                        }
                    }
                }
                Err(e) => {
                    warn!("Error watching SOPS key secrets: {}", e);
                }
            }
        }

        warn!("SOPS key secret watch stream ended");
    });
}

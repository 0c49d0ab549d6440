//! # SOPS Key Loading
//!
//! Loads AGE identities from Secrets labelled
//! `konfigure.giantswarm.io/data: sops-keys` in the keys namespace.

use crate::constants::{AGE_KEY_SUFFIX, SOPS_KEYS_LABEL, SOPS_KEYS_LABEL_VALUE};
use crate::controller::reconciler::types::Reconciler;
use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::api::ListParams;
use kube::{Api, Client};
use std::sync::atomic::Ordering;
use tracing::{info, warn};
use zeroize::Zeroizing;

/// Newline-separated AGE identities, wiped from memory on drop
pub type AgeKeys = Zeroizing<String>;

/// Label selector matching the key Secrets
#[must_use]
pub fn sops_keys_selector() -> String {
    format!("{SOPS_KEYS_LABEL}={SOPS_KEYS_LABEL_VALUE}")
}

/// Load every `*.agekey` entry of the labelled Secrets in `namespace`
///
/// Returns `None` when no identity is found. Key material is never logged,
/// only the Secret and entry names.
pub async fn load_sops_keys(client: &Client, namespace: &str) -> Result<Option<AgeKeys>> {
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let list = secrets
        .list(&ListParams::default().labels(&sops_keys_selector()))
        .await
        .with_context(|| format!("Failed to list SOPS key secrets in namespace {namespace}"))?;

    let keys = collect_age_keys(&list.items);

    if keys.is_none() {
        warn!(
            "No AGE identities found in Secrets labelled {} in namespace {}",
            sops_keys_selector(),
            namespace
        );
    }

    Ok(keys)
}

/// Concatenate the `*.agekey` entries of `secrets`
///
/// Entries are visited in Secret name then entry name order so the result is stable.
#[must_use]
pub fn collect_age_keys(secrets: &[Secret]) -> Option<AgeKeys> {
    let mut sorted: Vec<&Secret> = secrets.iter().collect();
    sorted.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));

    let mut keys = Zeroizing::new(String::new());
    let mut count = 0usize;

    for secret in sorted {
        let secret_name = secret.metadata.name.as_deref().unwrap_or("unknown");
        let Some(data) = secret.data.as_ref() else {
            continue;
        };
        for (entry, value) in data {
            if !entry.ends_with(AGE_KEY_SUFFIX) {
                continue;
            }
            let Ok(identity) = std::str::from_utf8(&value.0) else {
                warn!(
                    "Skipping entry '{}' of secret '{}': not valid UTF-8",
                    entry, secret_name
                );
                continue;
            };
            let identity = identity.trim();
            if identity.is_empty() {
                continue;
            }
            if !identity.contains("AGE-SECRET-KEY-") {
                warn!(
                    "Entry '{}' of secret '{}' does not look like an AGE identity",
                    entry, secret_name
                );
            }
            keys.push_str(identity);
            keys.push('\n');
            count += 1;
            info!("Loaded AGE identity '{}' from secret '{}'", entry, secret_name);
        }
    }

    (count > 0).then_some(keys)
}

/// Reload the identities into the shared reconciler state
///
/// Called at startup and whenever a key Secret changes.
pub async fn reload_sops_keys(reconciler: &Reconciler) -> Result<()> {
    let namespace = reconciler.config.read().await.sops_keys_namespace.clone();
    let keys = load_sops_keys(&reconciler.client, &namespace).await?;
    let available = keys.is_some();

    *reconciler.sops_keys.lock().await = keys;
    reconciler
        .sops_capability_ready
        .store(available, Ordering::Relaxed);

    if available {
        info!("SOPS capability ready - AGE identities loaded from namespace '{}'", namespace);
    } else {
        warn!("SOPS capability disabled - no AGE identities in namespace '{}'", namespace);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use kube::api::ObjectMeta;

    fn secret(name: &str, entries: &[(&str, &str)]) -> Secret {
        Secret {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..ObjectMeta::default()
            },
            data: Some(
                entries
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                    .collect(),
            ),
            ..Secret::default()
        }
    }

    #[test]
    fn test_collect_age_keys_only_agekey_entries() {
        let secrets = vec![
            secret(
                "sops-keys-b",
                &[("golem.agekey", "AGE-SECRET-KEY-1BBB\n"), ("README", "ignored")],
            ),
            secret("sops-keys-a", &[("shared.agekey", "AGE-SECRET-KEY-1AAA")]),
        ];

        let keys = collect_age_keys(&secrets).unwrap();
        assert_eq!(keys.as_str(), "AGE-SECRET-KEY-1AAA\nAGE-SECRET-KEY-1BBB\n");
    }

    #[test]
    fn test_collect_age_keys_none_when_empty() {
        assert!(collect_age_keys(&[]).is_none());
        assert!(collect_age_keys(&[secret("other", &[("key.txt", "x")])]).is_none());
        assert!(collect_age_keys(&[secret("blank", &[("empty.agekey", "  ")])]).is_none());
    }

    #[test]
    fn test_selector() {
        assert_eq!(sops_keys_selector(), "konfigure.giantswarm.io/data=sops-keys");
    }
}

//! # Types
//!
//! Core types for the reconciler.

use crate::config::SharedControllerConfig;
use crate::constants::{ERROR_BACKOFF_MAX_MINUTES, ERROR_BACKOFF_MIN_MINUTES};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::render::RenderError;
use crate::controller::reconciler::sops::{AgeKeys, SopsDecryptionError, SopsDecryptor};
use anyhow::{Context, Result};
use kube::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Bad matcher regex, invalid duration or naming; waits for a spec change
    #[error("Invalid configuration: {0}")]
    Configuration(String),
    /// GitRepository missing, not Ready or without artifact
    #[error("Source not ready: {0}")]
    SourceNotReady(String),
    /// Key loading, artifact fetch or cluster-wide preparation failed
    #[error("Setup failed: {0}")]
    Setup(String),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    SecretDecryption(#[from] SopsDecryptionError),
    /// Destination object exists and carries another owner's labels
    #[error("{0}")]
    OwnershipConflict(String),
    #[error("conflict writing {kind} {namespace}/{name}, gave up after {attempts} attempts")]
    ApiConflict {
        kind: &'static str,
        namespace: String,
        name: String,
        attempts: u32,
    },
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

/// Trigger source for reconciliation
/// Tracks why a reconciliation was triggered for debugging and observability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// First reconciliation of a generation (create or spec change)
    SpecChange,
    /// Manual trigger via CLI annotation (kfgctl reconcile)
    ManualCli,
    /// Periodic requeue after `interval` or `retryInterval`
    TimerBased,
}

impl TriggerSource {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSource::SpecChange => "spec-change",
            TriggerSource::ManualCli => "manual-cli",
            TriggerSource::TimerBased => "timer-based",
        }
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self {
            backoff: FibonacciBackoff::new(ERROR_BACKOFF_MIN_MINUTES, ERROR_BACKOFF_MAX_MINUTES),
            error_count: 0,
        }
    }
}

impl BackoffState {
    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

#[derive(Clone)]
pub struct Reconciler {
    pub client: Client,
    pub config: SharedControllerConfig,
    /// AGE identities, hot-reloaded by the key watch
    pub sops_keys: Arc<AsyncMutex<Option<AgeKeys>>>,
    /// Whether any identity is currently loaded
    pub sops_capability_ready: Arc<AtomicBool>,
    /// Backoff state per resource, keyed by UID
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
    /// Artifact cache locks per GitRepository (namespace/name)
    pub artifact_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
    /// HTTP client for artifact downloads
    pub http: reqwest::Client,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("sops_keys", &"***")
            .field(
                "sops_capability_ready",
                &self.sops_capability_ready.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub async fn new(client: Client, config: SharedControllerConfig) -> Result<Self> {
        let keys_namespace = config.read().await.sops_keys_namespace.clone();

        let sops_keys = match crate::controller::reconciler::sops::load_sops_keys(
            &client,
            &keys_namespace,
        )
        .await
        {
            Ok(keys) => keys,
            Err(e) => {
                // Reconciliations report SetupFailed until the watch loads keys
                warn!("Failed to load SOPS keys at startup: {:#}", e);
                None
            }
        };

        if sops_keys.is_some() {
            info!("SOPS capability ready - AGE identities loaded from namespace '{keys_namespace}'");
        } else {
            warn!("SOPS capability not ready - no AGE identities in namespace '{keys_namespace}'");
        }

        Self::with_keys(client, config, sops_keys).await
    }

    /// Reconciler over already loaded identities
    pub async fn with_keys(
        client: Client,
        config: SharedControllerConfig,
        sops_keys: Option<AgeKeys>,
    ) -> Result<Self> {
        let download_timeout = config.read().await.artifact_download_timeout();

        Ok(Self {
            client,
            config,
            sops_capability_ready: Arc::new(AtomicBool::new(sops_keys.is_some())),
            sops_keys: Arc::new(AsyncMutex::new(sops_keys)),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
            artifact_locks: Arc::new(Mutex::new(HashMap::new())),
            http: build_http_client(download_timeout)?,
        })
    }

    /// Get or create the artifact cache lock of a GitRepository
    pub fn get_artifact_lock(&self, namespace: &str, name: &str) -> Arc<AsyncMutex<()>> {
        let key = format!("{namespace}/{name}");
        let mut locks = self
            .artifact_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    /// Decryptor over a snapshot of the currently loaded identities
    pub async fn decryptor(&self) -> SopsDecryptor {
        SopsDecryptor::new(self.sops_keys.lock().await.clone())
    }

    /// Drop the backoff state of a resource after success or deletion
    pub fn reset_backoff(&self, uid: &str) {
        let mut states = self
            .backoff_states
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        states.remove(uid);
    }
}

/// HTTP client used for artifact downloads
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

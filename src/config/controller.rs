//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use super::{env_var_or_default, env_var_or_default_bool, env_var_or_default_str};
use crate::constants::{
    DEFAULT_APPLY_CONFLICT_RETRIES, DEFAULT_ARTIFACT_DOWNLOAD_TIMEOUT_SECS,
    DEFAULT_ARTIFACT_REVISIONS_TO_KEEP, DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_START_MS,
    DEFAULT_CACHE_DIR, DEFAULT_CONTROLLER_NAMESPACE, DEFAULT_SOURCE_CONTROLLER_URL,
    DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS, DEFAULT_WATCH_RESTART_DELAY_SECS,
};
use std::path::PathBuf;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace the operator is deployed in (`POD_NAMESPACE`)
    pub controller_namespace: String,
    /// Namespace searched for Secrets labelled `konfigure.giantswarm.io/data: sops-keys`
    /// Defaults to the controller namespace
    pub sops_keys_namespace: String,
    /// Watch the SOPS key Secrets and hot-reload identities on change
    pub sops_key_watch_enabled: bool,
    /// Root directory for extracted GitRepository artifacts
    pub cache_dir: PathBuf,
    /// Source-controller host used when a CR does not set `sources.flux.service.url`
    pub default_source_controller_url: String,
    /// Artifact download timeout (seconds)
    pub artifact_download_timeout_secs: u64,
    /// Extracted revisions kept per GitRepository
    pub artifact_revisions_to_keep: usize,
    /// Immediate retries on a write conflict
    pub apply_conflict_retries: u32,
    /// Exponential backoff starting value for watch errors (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value for watch errors (milliseconds)
    pub backoff_max_ms: u64,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after the stream ends normally (seconds)
    pub watch_restart_delay_after_end_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            sops_keys_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            sops_key_watch_enabled: true,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            default_source_controller_url: DEFAULT_SOURCE_CONTROLLER_URL.to_string(),
            artifact_download_timeout_secs: DEFAULT_ARTIFACT_DOWNLOAD_TIMEOUT_SECS,
            artifact_revisions_to_keep: DEFAULT_ARTIFACT_REVISIONS_TO_KEEP,
            apply_conflict_retries: DEFAULT_APPLY_CONFLICT_RETRIES,
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    #[must_use]
    pub fn from_env() -> Self {
        let controller_namespace =
            env_var_or_default_str("POD_NAMESPACE", DEFAULT_CONTROLLER_NAMESPACE);
        Self {
            sops_keys_namespace: env_var_or_default_str(
                "SOPS_KEYS_NAMESPACE",
                &controller_namespace,
            ),
            controller_namespace,
            sops_key_watch_enabled: env_var_or_default_bool("SOPS_KEY_WATCH_ENABLED", true),
            cache_dir: PathBuf::from(env_var_or_default_str(
                "KONFIGURE_CACHE_DIR",
                DEFAULT_CACHE_DIR,
            )),
            default_source_controller_url: env_var_or_default_str(
                "DEFAULT_SOURCE_CONTROLLER_URL",
                DEFAULT_SOURCE_CONTROLLER_URL,
            ),
            artifact_download_timeout_secs: env_var_or_default(
                "ARTIFACT_DOWNLOAD_TIMEOUT_SECS",
                DEFAULT_ARTIFACT_DOWNLOAD_TIMEOUT_SECS,
            ),
            artifact_revisions_to_keep: env_var_or_default(
                "ARTIFACT_REVISIONS_TO_KEEP",
                DEFAULT_ARTIFACT_REVISIONS_TO_KEEP,
            )
            .max(1),
            apply_conflict_retries: env_var_or_default(
                "APPLY_CONFLICT_RETRIES",
                DEFAULT_APPLY_CONFLICT_RETRIES,
            ),
            backoff_start_ms: env_var_or_default("BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: env_var_or_default("BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
        }
    }

    /// Get artifact download timeout duration
    #[must_use]
    pub fn artifact_download_timeout(&self) -> Duration {
        Duration::from_secs(self.artifact_download_timeout_secs)
    }

    /// Get watch restart delay duration
    #[must_use]
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    #[must_use]
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}

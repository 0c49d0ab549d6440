//! # SOPS Decryption
//!
//! Decrypts SOPS/AGE-encrypted YAML through the `sops` binary.
//!
//! Content is piped through stdin/stdout. Neither the ciphertext, the
//! plaintext nor the AGE identities touch the disk: identities are handed to
//! sops through the `SOPS_AGE_KEY` environment variable of the child process.

use super::error::{classify_sops_error, SopsDecryptionError, SopsDecryptionFailureReason};
use crate::observability::metrics;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info_span, warn, Instrument};

/// Upper bound of sops stderr carried into error messages and status
const MAX_STDERR_LEN: usize = 500;

/// Decrypt SOPS-encrypted YAML content
///
/// `age_keys` is the newline-separated list of AGE identities. Without any
/// identity the call fails with `KeyNotFound` instead of spawning sops.
pub async fn decrypt_sops_content(
    content: &str,
    age_keys: Option<&str>,
) -> Result<String, SopsDecryptionError> {
    let span = info_span!(
        "sops.decrypt",
        file.size = content.len(),
        operation.duration_ms = tracing::field::Empty,
        operation.success = tracing::field::Empty,
        error.reason = tracing::field::Empty,
    );
    let span_clone = span.clone();
    let start = Instant::now();

    async move {
        metrics::increment_sops_decryption_total();
        let result = decrypt_with_sops_binary(content, age_keys).await;
        let elapsed = start.elapsed();

        span_clone.record(
            "operation.duration_ms",
            u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        );
        metrics::observe_sops_decryption_duration(elapsed.as_secs_f64());

        match &result {
            Ok(_) => {
                span_clone.record("operation.success", true);
            }
            Err(e) => {
                span_clone.record("operation.success", false);
                span_clone.record("error.reason", e.reason.as_str());
                metrics::increment_sops_decryption_errors_total_with_reason(e.reason.as_str());

                if e.is_transient() {
                    warn!("SOPS decryption failed (transient): {}", e);
                } else {
                    error!("SOPS decryption failed (permanent): {}", e);
                    error!("Remediation: {}", e.reason.remediation());
                }
            }
        }

        result
    }
    .instrument(span)
    .await
}

async fn decrypt_with_sops_binary(
    content: &str,
    age_keys: Option<&str>,
) -> Result<String, SopsDecryptionError> {
    let Some(age_keys) = age_keys.filter(|keys| !keys.trim().is_empty()) else {
        return Err(SopsDecryptionError::new(
            SopsDecryptionFailureReason::KeyNotFound,
            "no AGE identities loaded",
        ));
    };

    let sops_path = which::which("sops").map_err(|e| {
        SopsDecryptionError::new(
            SopsDecryptionFailureReason::ProviderUnavailable,
            format!("sops binary not found in PATH: {e}"),
        )
    })?;

    debug!("Using sops binary at: {:?}", sops_path);

    let mut cmd = tokio::process::Command::new(sops_path);
    cmd.arg("-d")
        .arg("--input-type")
        .arg("yaml")
        .arg("--output-type")
        .arg("yaml")
        .arg("/dev/stdin")
        .env("SOPS_AGE_KEY", age_keys)
        .env_remove("SOPS_AGE_KEY_FILE")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        SopsDecryptionError::new(
            SopsDecryptionFailureReason::ProviderUnavailable,
            format!("Failed to spawn sops command: {e}"),
        )
    })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(content.as_bytes()).await.map_err(|e| {
            SopsDecryptionError::new(
                SopsDecryptionFailureReason::Unknown,
                format!("Failed to write encrypted content to sops stdin: {e}"),
            )
        })?;
        stdin.shutdown().await.map_err(|e| {
            SopsDecryptionError::new(
                SopsDecryptionFailureReason::Unknown,
                format!("Failed to close sops stdin: {e}"),
            )
        })?;
    }

    let output = child.wait_with_output().await.map_err(|e| {
        SopsDecryptionError::new(
            SopsDecryptionFailureReason::Unknown,
            format!("Failed to wait for sops command: {e}"),
        )
    })?;

    if output.status.success() {
        let decrypted = String::from_utf8(output.stdout).map_err(|e| {
            SopsDecryptionError::new(
                SopsDecryptionFailureReason::CorruptedFile,
                format!("sops output is not valid UTF-8: {e}"),
            )
        })?;
        debug!("SOPS decryption succeeded - decrypted {} bytes", decrypted.len());
        return Ok(decrypted);
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let exit_code = output.status.code();
    let reason = classify_sops_error(&stderr, exit_code);

    Err(SopsDecryptionError::new(
        reason,
        format!(
            "sops exited with code {}: {}",
            exit_code.map_or_else(|| "none".to_string(), |code| code.to_string()),
            truncate_stderr(stderr.trim())
        ),
    ))
}

fn truncate_stderr(stderr: &str) -> String {
    if stderr.len() <= MAX_STDERR_LEN {
        return stderr.to_string();
    }
    let mut end = MAX_STDERR_LEN;
    while !stderr.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &stderr[..end])
}

/// Whether YAML content carries SOPS metadata (a top-level `sops` mapping)
#[must_use]
pub fn is_sops_encrypted(content: &str) -> bool {
    serde_yaml::from_str::<serde_yaml::Value>(content)
        .ok()
        .and_then(|value| value.get("sops").map(serde_yaml::Value::is_mapping))
        .unwrap_or(false)
}

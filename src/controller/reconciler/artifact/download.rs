//! # Download and Extraction
//!
//! Fetches a GitRepository tarball from source-controller, verifies it and
//! unpacks it into the artifact cache.

use crate::observability::metrics::{
    increment_artifact_download_errors_total, increment_artifact_downloads_total,
    increment_artifact_extraction_errors_total, increment_artifact_extractions_total,
    observe_artifact_download_duration,
};
use anyhow::{Context, Result};
use futures::StreamExt;
use std::path::Path;
use std::time::{Instant, SystemTime};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, info_span, warn};

/// Download an artifact into `target`, returning the number of bytes written
pub async fn download_artifact(
    http: &reqwest::Client,
    artifact_url: &str,
    target: &Path,
) -> Result<u64> {
    let download_span = info_span!(
        "artifact.download",
        artifact.url = artifact_url,
        artifact.size_bytes = tracing::field::Empty,
        operation.duration_ms = tracing::field::Empty,
        operation.success = tracing::field::Empty,
        error.message = tracing::field::Empty,
        error.status_code = tracing::field::Empty,
    );
    let download_start = Instant::now();
    increment_artifact_downloads_total();

    info!("Downloading artifact from {}", artifact_url);

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await.context(format!(
            "Failed to create parent directory: {}",
            parent.display()
        ))?;
    }

    let response = match http.get(artifact_url).send().await {
        Ok(resp) => resp,
        Err(e) => {
            increment_artifact_download_errors_total();
            download_span.record("operation.success", false);
            download_span.record("error.message", e.to_string());

            error!("Failed to download artifact from {}: {}", artifact_url, e);
            if e.is_timeout() {
                error!("Network timeout - source-controller may be unreachable or slow to respond");
                error!("  Check pods: kubectl get pods -n flux-system -l app=source-controller");
            } else if e.is_connect() {
                error!("Connection failed - check network policies and the sources.flux.service.url of the configuration");
                error!("  Check service: kubectl get svc source-controller -n flux-system");
            } else {
                error!("Unexpected network error: {:?}", e);
            }

            return Err(anyhow::anyhow!(
                "Failed to download artifact from {artifact_url}: {e}"
            ));
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        increment_artifact_download_errors_total();
        download_span.record("operation.success", false);
        download_span.record("error.status_code", u64::from(status.as_u16()));

        let error_msg = if status == reqwest::StatusCode::NOT_FOUND {
            format!(
                "Artifact not found (404) at URL: {artifact_url}. \
                 The GitRepository may not have been reconciled by source-controller yet"
            )
        } else {
            format!(
                "Artifact download failed: HTTP {} {} from URL: {artifact_url}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown")
            )
        };

        error!("{}", error_msg);
        return Err(anyhow::anyhow!(error_msg));
    }

    let expected_size = response.content_length();
    let mut file = tokio::fs::File::create(target)
        .await
        .context(format!("Failed to create file: {}", target.display()))?;

    let mut downloaded_size: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Failed to read chunk from download stream")?;
        downloaded_size += chunk.len() as u64;
        file.write_all(&chunk)
            .await
            .context("Failed to write chunk to file")?;
    }
    file.flush().await.context("Failed to flush artifact file")?;
    drop(file);

    if let Some(expected) = expected_size {
        if downloaded_size != expected {
            increment_artifact_download_errors_total();
            download_span.record("operation.success", false);
            remove_file_quietly(target).await;
            return Err(anyhow::anyhow!(
                "Partial download detected: expected {expected} bytes, got {downloaded_size} bytes"
            ));
        }
    }

    if downloaded_size == 0 {
        increment_artifact_download_errors_total();
        download_span.record("operation.success", false);
        download_span.record("error.message", "Downloaded artifact is empty");
        remove_file_quietly(target).await;
        return Err(anyhow::anyhow!("Downloaded artifact is empty"));
    }

    observe_artifact_download_duration(download_start.elapsed().as_secs_f64());
    download_span.record(
        "operation.duration_ms",
        download_start.elapsed().as_millis() as u64,
    );
    download_span.record("operation.success", true);
    download_span.record("artifact.size_bytes", downloaded_size);

    Ok(downloaded_size)
}

/// Compare the file's SHA-256 against a `sha256:<hex>` digest
///
/// The file is removed on mismatch.
pub fn verify_checksum(file: &Path, expected_digest: &str) -> Result<()> {
    use sha2::{Digest, Sha256};
    use std::io::Read;

    let Some(expected_hex) = expected_digest.strip_prefix("sha256:") else {
        warn!(
            "Skipping checksum verification for unsupported digest algorithm: {}",
            expected_digest
        );
        return Ok(());
    };

    let mut reader = std::fs::File::open(file)
        .context("Failed to open downloaded file for checksum verification")?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 8192];
    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }
    let computed_hex = format!("{:x}", hasher.finalize());

    if !expected_hex.eq_ignore_ascii_case(&computed_hex) {
        if let Err(e) = std::fs::remove_file(file) {
            warn!("Failed to remove corrupt artifact {}: {}", file.display(), e);
        }
        return Err(anyhow::anyhow!(
            "Checksum mismatch: expected {expected_digest}, got sha256:{computed_hex}. Artifact may be corrupt or tampered."
        ));
    }
    debug!("Checksum verified: {}", expected_digest);
    Ok(())
}

/// Reject files that do not start with the gzip magic bytes `1f 8b`
pub fn verify_tar_gz_format(file: &Path) -> Result<()> {
    use std::io::Read;

    let mut magic = [0u8; 2];
    let mut reader =
        std::fs::File::open(file).context("Failed to open downloaded file for format check")?;
    let readable = reader.read_exact(&mut magic).is_ok();

    if !readable || magic != [0x1f, 0x8b] {
        if let Err(e) = std::fs::remove_file(file) {
            warn!("Failed to remove invalid artifact {}: {}", file.display(), e);
        }
        return Err(anyhow::anyhow!(
            "Invalid file format: expected tar.gz (gzip), got magic bytes {:02x}{:02x}",
            magic[0],
            magic[1]
        ));
    }
    debug!("File format verified: valid gzip magic bytes");
    Ok(())
}

/// Extract a tar.gz file into `destination` using the system `tar`
pub async fn extract_artifact(archive: &Path, destination: &Path) -> Result<()> {
    let extract_span = info_span!(
        "artifact.extract",
        artifact.destination = destination.display().to_string(),
        operation.duration_ms = tracing::field::Empty,
        operation.success = tracing::field::Empty,
        error.message = tracing::field::Empty,
    );
    let extract_start = Instant::now();
    increment_artifact_extractions_total();

    info!("Extracting artifact to {}", destination.display());

    tokio::fs::create_dir_all(destination)
        .await
        .context(format!(
            "Failed to create destination directory: {}",
            destination.display()
        ))?;

    let output = tokio::process::Command::new("tar")
        .arg("-xzf")
        .arg(archive)
        .arg("-C")
        .arg(destination)
        .arg("--no-same-owner")
        .output()
        .await
        .context("Failed to execute tar command")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        increment_artifact_extraction_errors_total();
        extract_span.record("operation.success", false);
        extract_span.record("error.message", stderr.to_string());
        remove_dir_quietly(destination).await;
        return Err(anyhow::anyhow!(
            "Failed to extract artifact (corrupt or invalid tar.gz): {stderr}"
        ));
    }

    let mut entries = tokio::fs::read_dir(destination)
        .await
        .context("Failed to read extracted directory")?;
    if entries.next_entry().await?.is_none() {
        increment_artifact_extraction_errors_total();
        extract_span.record("operation.success", false);
        extract_span.record("error.message", "Extraction produced empty directory");
        remove_dir_quietly(destination).await;
        return Err(anyhow::anyhow!(
            "Artifact extraction produced empty directory - artifact may be corrupt"
        ));
    }

    extract_span.record(
        "operation.duration_ms",
        extract_start.elapsed().as_millis() as u64,
    );
    extract_span.record("operation.success", true);

    Ok(())
}

/// Keep the `keep` most recently modified revision directories under `parent_dir`
///
/// Plain files (the `lastarchive` marker) and hidden staging directories are ignored.
pub async fn cleanup_old_revisions(parent_dir: &Path, keep: usize) -> Result<()> {
    let mut revisions = Vec::new();
    let mut dir_entries = tokio::fs::read_dir(parent_dir)
        .await
        .context("Failed to read parent directory for cleanup")?;

    while let Some(entry) = dir_entries.next_entry().await? {
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if hidden || !path.is_dir() {
            continue;
        }
        let modified = tokio::fs::metadata(&path)
            .await?
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH);
        revisions.push((path, modified));
    }

    if revisions.len() <= keep {
        return Ok(());
    }

    revisions.sort_by(|a, b| b.1.cmp(&a.1));
    for (path, _) in revisions.split_off(keep) {
        info!("Removing old revision cache: {}", path.display());
        if let Err(e) = tokio::fs::remove_dir_all(&path).await {
            warn!("Failed to remove old revision {}: {}", path.display(), e);
        }
    }

    Ok(())
}

/// Mark a cached revision directory as just used, so pruning by age keeps it
pub fn touch_revision(path: &Path) -> std::io::Result<()> {
    std::fs::File::open(path)?.set_modified(SystemTime::now())
}

async fn remove_file_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!("Failed to remove {}: {}", path.display(), e);
    }
}

async fn remove_dir_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(path).await {
        debug!("Failed to remove {}: {}", path.display(), e);
    }
}

//! # Flux GitRepository Artifacts
//!
//! Resolves the artifact of a Flux `GitRepository`, downloads it through the
//! source-controller service and keeps extracted revisions in a cache laid out as
//!
//! ```text
//! <cache_dir>/<namespace>/<name>/lastarchive
//! <cache_dir>/<namespace>/<name>/<branch>-sha-<short sha>/...
//! ```

use super::download::{
    cleanup_old_revisions, download_artifact, extract_artifact, touch_revision, verify_checksum,
    verify_tar_gz_format,
};
use crate::constants::{LAST_ARCHIVE_FILE, UNKNOWN_REVISION};
use crate::controller::reconciler::source::SourceTree;
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::crd::FluxSource;
use anyhow::{Context, Result};
use kube::api::ApiResource;
use kube::core::{DynamicObject, GroupVersionKind};
use kube::Api;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

pub const FLUX_SOURCE_GROUP: &str = "source.toolkit.fluxcd.io";
pub const FLUX_SOURCE_VERSION: &str = "v1";
pub const GIT_REPOSITORY_KIND: &str = "GitRepository";

/// Artifact advertised in a Ready GitRepository's status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitRepositoryArtifact {
    pub url: String,
    pub revision: String,
    pub digest: Option<String>,
}

/// Extracted source tree plus the revision it was built from
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub tree: SourceTree,
    pub revision: String,
}

#[must_use]
pub fn git_repository_api_resource() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind {
        group: FLUX_SOURCE_GROUP.to_string(),
        version: FLUX_SOURCE_VERSION.to_string(),
        kind: GIT_REPOSITORY_KIND.to_string(),
    })
}

/// Read the GitRepository; a missing object is reported as not ready
pub async fn get_flux_git_repository(
    reconciler: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<serde_json::Value, ReconcilerError> {
    let span = info_span!(
        "gitrepository.get",
        gitrepository.name = name,
        namespace = namespace,
        operation.duration_ms = tracing::field::Empty,
        operation.success = tracing::field::Empty,
    );
    let span_clone = span.clone();
    let start = Instant::now();

    async move {
        let ar = git_repository_api_resource();
        let api: Api<DynamicObject> =
            Api::namespaced_with(reconciler.client.clone(), namespace, &ar);

        let git_repo = match api.get_opt(name).await {
            Ok(Some(obj)) => obj,
            Ok(None) => {
                span_clone.record("operation.success", false);
                return Err(ReconcilerError::SourceNotReady(format!(
                    "GitRepository {namespace}/{name} not found"
                )));
            }
            Err(e) => {
                span_clone.record("operation.success", false);
                return Err(ReconcilerError::Kube(e));
            }
        };

        span_clone.record("operation.duration_ms", start.elapsed().as_millis() as u64);
        span_clone.record("operation.success", true);
        serde_json::to_value(git_repo)
            .context("Failed to serialize GitRepository")
            .map_err(ReconcilerError::from)
    }
    .instrument(span)
    .await
}

/// Artifact of a GitRepository whose `Ready` condition is `True`
///
/// The error carries a human readable reason the source cannot be used yet.
pub fn ready_artifact(git_repo: &serde_json::Value) -> Result<GitRepositoryArtifact, String> {
    let status = git_repo
        .get("status")
        .ok_or_else(|| "GitRepository has no status yet".to_string())?;

    let ready = status
        .get("conditions")
        .and_then(|c| c.as_array())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.get("type").and_then(|t| t.as_str()) == Some("Ready"))
        });
    match ready {
        Some(condition) if condition.get("status").and_then(|s| s.as_str()) == Some("True") => {}
        Some(condition) => {
            let message = condition
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("no message");
            return Err(format!("GitRepository is not Ready: {message}"));
        }
        None => return Err("GitRepository has no Ready condition".to_string()),
    }

    let artifact = status
        .get("artifact")
        .ok_or_else(|| "GitRepository has no artifact in status".to_string())?;
    let url = artifact
        .get("url")
        .and_then(|u| u.as_str())
        .filter(|u| !u.is_empty())
        .ok_or_else(|| "GitRepository artifact has no URL".to_string())?;
    let revision = artifact
        .get("revision")
        .and_then(|r| r.as_str())
        .unwrap_or(UNKNOWN_REVISION);
    let digest = artifact
        .get("digest")
        .and_then(|d| d.as_str())
        .filter(|d| !d.is_empty())
        .map(str::to_string);

    Ok(GitRepositoryArtifact {
        url: url.to_string(),
        revision: revision.to_string(),
        digest,
    })
}

/// Point the artifact URL at the configured source-controller service
///
/// Only scheme, host and port are taken from `service`; path and query come
/// from the artifact URL. A service without a scheme is reached over plain HTTP.
pub fn rewrite_artifact_url(artifact_url: &str, service: &str) -> Result<String> {
    // In-cluster FQDNs sometimes carry a trailing dot before the path
    let normalized = artifact_url
        .replace("./", "/")
        .trim_end_matches('.')
        .to_string();
    let artifact = reqwest::Url::parse(&normalized)
        .with_context(|| format!("Invalid artifact URL: {artifact_url}"))?;

    let service = service.trim().trim_end_matches('/');
    let base = if service.contains("://") {
        service.to_string()
    } else {
        format!("http://{service}")
    };
    let mut rewritten =
        reqwest::Url::parse(&base).with_context(|| format!("Invalid service URL: {service}"))?;
    rewritten.set_path(artifact.path());
    rewritten.set_query(artifact.query());

    Ok(rewritten.to_string())
}

/// Commit SHA of a Flux revision such as `main@sha1:7680da4...`
#[must_use]
pub fn commit_sha(revision: &str) -> &str {
    let after_ref = revision.rsplit_once('@').map_or(revision, |(_, sha)| sha);
    after_ref
        .strip_prefix("sha1:")
        .or_else(|| after_ref.strip_prefix("sha256:"))
        .unwrap_or(after_ref)
}

/// Cache directory name of a revision: `{branch}-sha-{short sha}`
#[must_use]
pub fn revision_dir_name(revision: &str) -> String {
    let branch = revision
        .rsplit_once('@')
        .map_or("detached", |(branch, _)| branch);
    let sha = commit_sha(revision);
    let short_sha: String = sha.chars().take(7).collect();
    let short_sha = if short_sha.is_empty() {
        UNKNOWN_REVISION.to_string()
    } else {
        short_sha
    };

    format!(
        "{}-sha-{}",
        sanitize_path_component(branch),
        sanitize_path_component(&short_sha)
    )
}

fn sanitize_path_component(s: &str) -> String {
    s.replace(['@', '/', ':', '\\', ' ', '\t', '\n', '\r'], "-")
        .replace("..", "-")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect()
}

/// Revision recorded in the `lastarchive` marker: its content before the first `.`
pub async fn read_last_archive_revision(repo_dir: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(repo_dir.join(LAST_ARCHIVE_FILE))
        .await
        .ok()?;
    let revision = content.trim().split('.').next().unwrap_or_default();
    (!revision.is_empty()).then(|| revision.to_string())
}

async fn write_last_archive(repo_dir: &Path, sha: &str) -> Result<()> {
    let marker = repo_dir.join(LAST_ARCHIVE_FILE);
    let staged = repo_dir.join(format!(".{LAST_ARCHIVE_FILE}.tmp"));
    tokio::fs::write(&staged, format!("{sha}.tar.gz"))
        .await
        .with_context(|| format!("Failed to write {}", staged.display()))?;
    tokio::fs::rename(&staged, &marker)
        .await
        .with_context(|| format!("Failed to update {}", marker.display()))?;
    Ok(())
}

fn dir_has_entries(path: &Path) -> bool {
    std::fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_some())
}

/// Make the GitRepository's current artifact available locally
///
/// Downloads happen at most once per revision; concurrent reconciliations of
/// configurations sharing a GitRepository serialize on a per-repository lock.
pub async fn fetch_artifact(
    reconciler: &Reconciler,
    flux: &FluxSource,
) -> Result<FetchedArtifact, ReconcilerError> {
    let namespace = flux.git_repository.namespace.as_str();
    let name = flux.git_repository.name.as_str();

    let lock = reconciler.get_artifact_lock(namespace, name);
    let _guard = lock.lock().await;

    let git_repo = get_flux_git_repository(reconciler, namespace, name).await?;
    let artifact = ready_artifact(&git_repo).map_err(|reason| {
        ReconcilerError::SourceNotReady(format!("{namespace}/{name}: {reason}"))
    })?;

    let (cache_root, default_service, keep) = {
        let config = reconciler.config.read().await;
        (
            config.cache_dir.clone(),
            config.default_source_controller_url.clone(),
            config.artifact_revisions_to_keep,
        )
    };
    let service = flux
        .service
        .as_ref()
        .and_then(|s| s.url.as_deref())
        .filter(|url| !url.trim().is_empty())
        .unwrap_or(&default_service);

    let repo_dir = cache_root
        .join(sanitize_path_component(namespace))
        .join(sanitize_path_component(name));
    let revision_dir = revision_dir_name(&artifact.revision);
    let cache_path = repo_dir.join(&revision_dir);

    if dir_has_entries(&cache_path) {
        debug!(
            "Using cached artifact at {} (revision: {})",
            cache_path.display(),
            artifact.revision
        );
        if let Err(e) = touch_revision(&cache_path) {
            warn!("Failed to refresh {}: {}", cache_path.display(), e);
        }
    } else {
        let url = rewrite_artifact_url(&artifact.url, service)
            .map_err(|e| ReconcilerError::Setup(format!("{e:#}")))?;
        populate_cache(reconciler, &url, &artifact, &repo_dir, &cache_path)
            .await
            .map_err(|e| ReconcilerError::Setup(format!("artifact fetch failed: {e:#}")))?;

        if let Err(e) = cleanup_old_revisions(&repo_dir, keep).await {
            warn!("Failed to cleanup old revisions: {:#}", e);
        }

        info!(
            "Downloaded and extracted artifact to {} (revision: {})",
            cache_path.display(),
            artifact.revision
        );
    }

    write_last_archive(&repo_dir, commit_sha(&artifact.revision))
        .await
        .map_err(|e| ReconcilerError::Setup(format!("{e:#}")))?;

    let revision = read_last_archive_revision(&repo_dir)
        .await
        .unwrap_or_else(|| UNKNOWN_REVISION.to_string());

    Ok(FetchedArtifact {
        tree: SourceTree::new(cache_path),
        revision,
    })
}

/// Download, verify and extract into a staging directory, then move it into place
async fn populate_cache(
    reconciler: &Reconciler,
    url: &str,
    artifact: &GitRepositoryArtifact,
    repo_dir: &Path,
    cache_path: &Path,
) -> Result<()> {
    tokio::fs::create_dir_all(repo_dir)
        .await
        .with_context(|| format!("Failed to create cache directory {}", repo_dir.display()))?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(repo_dir)
        .context("Failed to create staging directory")?;
    let archive = staging.path().join("artifact.tar.gz");
    let extracted: PathBuf = staging.path().join("tree");

    download_artifact(&reconciler.http, url, &archive).await?;
    if let Some(digest) = &artifact.digest {
        verify_checksum(&archive, digest)?;
    }
    verify_tar_gz_format(&archive)?;
    extract_artifact(&archive, &extracted).await?;

    // A leftover partial directory would otherwise be taken for a valid cache
    if cache_path.exists() {
        tokio::fs::remove_dir_all(cache_path)
            .await
            .with_context(|| format!("Failed to clear {}", cache_path.display()))?;
    }
    tokio::fs::rename(&extracted, cache_path)
        .await
        .with_context(|| format!("Failed to move artifact into {}", cache_path.display()))?;

    Ok(())
}

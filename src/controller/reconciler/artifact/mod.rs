//! # Artifact Handling
//!
//! Flux GitRepository artifact download, verification, extraction and caching.

pub mod download;
pub mod flux;

pub use flux::{
    commit_sha, fetch_artifact, get_flux_git_repository, read_last_archive_revision,
    ready_artifact, revision_dir_name, rewrite_artifact_url, FetchedArtifact,
    GitRepositoryArtifact,
};

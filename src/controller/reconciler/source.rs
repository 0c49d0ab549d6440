//! # Source Tree
//!
//! Read access to an extracted configuration repository.
//!
//! ```text
//! default/config.yaml
//! default/apps/<app>/configmap-values.yaml.template
//! default/apps/<app>/secret-values.yaml.template
//! installations/<cluster>/config.yaml.patch
//! installations/<cluster>/secret.yaml
//! installations/<cluster>/apps/<app>/configmap-values.yaml.patch
//! installations/<cluster>/apps/<app>/secret-values.yaml.patch
//! ```

use crate::controller::reconciler::render::RenderError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
pub struct SourceTree {
    root: PathBuf,
}

impl SourceTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Application catalogue: directory names under `default/apps`, sorted
    ///
    /// `Ok(None)` when `default/apps` does not exist.
    pub fn list_apps(&self) -> std::io::Result<Option<Vec<String>>> {
        let apps_dir = self.root.join("default").join("apps");
        if !apps_dir.is_dir() {
            return Ok(None);
        }

        let mut apps = Vec::new();
        for entry in WalkDir::new(&apps_dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    apps.push(name.to_string());
                }
            }
        }
        apps.sort();

        Ok(Some(apps))
    }

    /// Read a file relative to the root, `None` when it does not exist
    pub async fn read_optional(&self, relative: &str) -> Result<Option<String>, RenderError> {
        match tokio::fs::read_to_string(self.root.join(relative)).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RenderError::Io {
                path: relative.to_string(),
                source,
            }),
        }
    }
}

#[must_use]
pub fn base_config_path() -> String {
    "default/config.yaml".to_string()
}

#[must_use]
pub fn cluster_config_patch_path(cluster: &str) -> String {
    format!("installations/{cluster}/config.yaml.patch")
}

#[must_use]
pub fn cluster_secrets_path(cluster: &str) -> String {
    format!("installations/{cluster}/secret.yaml")
}

#[must_use]
pub fn app_configmap_template_path(app: &str) -> String {
    format!("default/apps/{app}/configmap-values.yaml.template")
}

#[must_use]
pub fn app_secret_template_path(app: &str) -> String {
    format!("default/apps/{app}/secret-values.yaml.template")
}

#[must_use]
pub fn app_configmap_patch_path(cluster: &str, app: &str) -> String {
    format!("installations/{cluster}/apps/{app}/configmap-values.yaml.patch")
}

#[must_use]
pub fn app_secret_patch_path(cluster: &str, app: &str) -> String {
    format!("installations/{cluster}/apps/{app}/secret-values.yaml.patch")
}

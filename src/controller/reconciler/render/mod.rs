//! # Renderer
//!
//! Builds the two value documents of an application from the source tree.
//!
//! Public values (`configmap-values.yaml`):
//! base config → cluster patch → app template → app cluster patch
//!
//! Secret values (`secret-values.yaml`):
//! public config + decrypted cluster secrets as context → app secret template
//! → decrypted app secret patch
//!
//! The cluster-wide part is prepared once per reconciliation in
//! [`ClusterContext`]. Secret material only ever enters the secret document.

mod error;
mod merge;
mod template;

pub use error::RenderError;
pub use merge::merge_values;
pub use template::{lookup, parse_map, render_template};

use crate::controller::reconciler::source::{
    app_configmap_patch_path, app_configmap_template_path, app_secret_patch_path,
    app_secret_template_path, base_config_path, cluster_config_patch_path, cluster_secrets_path,
    SourceTree,
};
use crate::controller::reconciler::sops::{is_sops_encrypted, Decryptor};
use crate::controller::reconciler::types::ReconcilerError;
use serde_yaml::{Mapping, Value};
use tracing::{debug, warn};

/// Cluster-wide template contexts
pub struct ClusterContext {
    public: Value,
    secret: Value,
}

impl ClusterContext {
    /// Context of public templates: base config merged with the cluster patch
    #[must_use]
    pub fn public(&self) -> &Value {
        &self.public
    }
}

impl std::fmt::Debug for ClusterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterContext")
            .field("public", &self.public)
            .field("secret", &"***")
            .finish()
    }
}

/// One application's rendered documents
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedApp {
    pub app: String,
    pub configmap_values: String,
    pub secret_values: String,
}

impl std::fmt::Debug for RenderedApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedApp")
            .field("app", &self.app)
            .field("configmap_values", &self.configmap_values)
            .field("secret_values", &"***")
            .finish()
    }
}

fn empty_map() -> Value {
    Value::Mapping(Mapping::new())
}

async fn read_plain_map(tree: &SourceTree, path: &str) -> Result<Option<Value>, RenderError> {
    match tree.read_optional(path).await? {
        Some(content) => parse_map(path, &content).map(Some),
        None => Ok(None),
    }
}

/// Read a secret document, decrypting it when it carries SOPS metadata
async fn read_secret_map(
    tree: &SourceTree,
    path: &str,
    decryptor: &dyn Decryptor,
) -> Result<Option<Value>, ReconcilerError> {
    let Some(content) = tree.read_optional(path).await? else {
        return Ok(None);
    };

    let plaintext = if is_sops_encrypted(&content) {
        debug!("Decrypting {}", path);
        decryptor.decrypt(path, &content).await?
    } else {
        warn!("{} is not SOPS-encrypted, using it as plain YAML", path);
        content
    };

    Ok(Some(parse_map(path, &plaintext)?))
}

/// Prepare the cluster-wide contexts
///
/// Failures here affect every application and are reported as setup failures.
pub async fn prepare_cluster_context(
    tree: &SourceTree,
    cluster: &str,
    decryptor: &dyn Decryptor,
) -> Result<ClusterContext, ReconcilerError> {
    let mut public = read_plain_map(tree, &base_config_path())
        .await?
        .unwrap_or_else(empty_map);
    if let Some(patch) = read_plain_map(tree, &cluster_config_patch_path(cluster)).await? {
        merge_values(&mut public, patch);
    }

    let mut secret = public.clone();
    if let Some(secrets) = read_secret_map(tree, &cluster_secrets_path(cluster), decryptor).await? {
        merge_values(&mut secret, secrets);
    }

    Ok(ClusterContext { public, secret })
}

/// Render both documents of `app`
pub async fn render_app(
    tree: &SourceTree,
    cluster: &str,
    app: &str,
    context: &ClusterContext,
    decryptor: &dyn Decryptor,
) -> Result<RenderedApp, ReconcilerError> {
    let template_path = app_configmap_template_path(app);
    let mut public = match tree.read_optional(&template_path).await? {
        Some(template) => render_template(&template_path, &template, &context.public)?,
        None => empty_map(),
    };
    if let Some(patch) = read_plain_map(tree, &app_configmap_patch_path(cluster, app)).await? {
        merge_values(&mut public, patch);
    }

    let secret_template_path = app_secret_template_path(app);
    let mut secret = match tree.read_optional(&secret_template_path).await? {
        Some(template) => render_template(&secret_template_path, &template, &context.secret)?,
        None => empty_map(),
    };
    if let Some(patch) =
        read_secret_map(tree, &app_secret_patch_path(cluster, app), decryptor).await?
    {
        merge_values(&mut secret, patch);
    }

    Ok(RenderedApp {
        app: app.to_string(),
        configmap_values: serialize("configmap-values.yaml", &public)?,
        secret_values: serialize("secret-values.yaml", &secret)?,
    })
}

fn serialize(output: &'static str, value: &Value) -> Result<String, RenderError> {
    serde_yaml::to_string(value).map_err(|source| RenderError::Serialize { output, source })
}

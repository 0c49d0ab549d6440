//! # Kubernetes Validation
//!
//! Validates Kubernetes resource names and namespaces per RFC 1123, and the
//! prefix/suffix used to name rendered objects.

use anyhow::Result;
use regex::Regex;

/// Validate Kubernetes resource name (RFC 1123 subdomain)
/// Format: lowercase alphanumeric, hyphens, dots
/// Length: 1-253 characters
pub fn validate_kubernetes_name(name: &str, field_name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(anyhow::anyhow!("{field_name} cannot be empty"));
    }

    if name.len() > 253 {
        return Err(anyhow::anyhow!(
            "{field_name} '{name}' exceeds maximum length of 253 characters (got {})",
            name.len()
        ));
    }

    let name_regex =
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !name_regex.is_match(name) {
        return Err(anyhow::anyhow!(
            "{field_name} '{name}' must be a valid Kubernetes name (lowercase alphanumeric, hyphens, dots; cannot start/end with hyphen or dot)"
        ));
    }

    Ok(())
}

/// Validate Kubernetes namespace (RFC 1123 label)
/// Length: 1-63 characters
pub fn validate_kubernetes_namespace(namespace: &str, field_name: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(anyhow::anyhow!("{field_name} cannot be empty"));
    }

    if namespace.len() > 63 {
        return Err(anyhow::anyhow!(
            "{field_name} '{namespace}' exceeds maximum length of 63 characters (got {})",
            namespace.len()
        ));
    }

    let namespace_regex = Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !namespace_regex.is_match(namespace) {
        return Err(anyhow::anyhow!(
            "{field_name} '{namespace}' must be a valid Kubernetes namespace (lowercase alphanumeric, hyphens; cannot start/end with hyphen)"
        ));
    }

    Ok(())
}

/// Validate `destination.naming.prefix` / `suffix`
/// 1-6 characters, lowercase alphanumeric and inner hyphens
pub fn validate_naming_affix(value: &str, field_name: &str) -> Result<()> {
    let affix_regex = Regex::new(r"^[a-z0-9]([-a-z0-9]{0,4}[a-z0-9])?$")
        .map_err(|e| anyhow::anyhow!("Failed to compile regex: {e}"))?;

    if !affix_regex.is_match(value) {
        return Err(anyhow::anyhow!(
            "{field_name} '{value}' must be 1-6 lowercase alphanumeric characters or hyphens and cannot start/end with hyphen"
        ));
    }

    Ok(())
}

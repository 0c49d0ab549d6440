//! # Ownership
//!
//! Labels identifying which ManagementClusterConfiguration generated an object,
//! and the rules for deciding whether the operator may touch an existing one.

use crate::constants::{
    GENERATED_BY_LABEL, GENERATED_BY_VALUE, KONFIGURE_PREFIX, OWNER_API_GROUP_LABEL,
    OWNER_API_VERSION_LABEL, OWNER_KIND_LABEL, OWNER_NAMESPACE_LABEL, OWNER_NAME_LABEL,
    RECONCILE_DISABLED_VALUE, RECONCILE_LABEL, REVISION_LABEL,
};
use crate::crd::{ManagementClusterConfiguration, Naming};
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Kubernetes caps label values at 63 characters
const MAX_LABEL_VALUE_LEN: usize = 63;

/// Labels compared by [`match_ownership`]
///
/// `ownerApiVersion` survives CRD version bumps and `revision` changes on every commit.
pub const MATCHED_OWNERSHIP_LABELS: [&str; 5] = [
    GENERATED_BY_LABEL,
    OWNER_API_GROUP_LABEL,
    OWNER_KIND_LABEL,
    OWNER_NAME_LABEL,
    OWNER_NAMESPACE_LABEL,
];

#[must_use]
pub fn generate_ownership_labels(
    mcc: &ManagementClusterConfiguration,
    revision: &str,
) -> BTreeMap<String, String> {
    let revision: String = revision.chars().take(MAX_LABEL_VALUE_LEN).collect();

    BTreeMap::from([
        (GENERATED_BY_LABEL.to_string(), GENERATED_BY_VALUE.to_string()),
        (
            OWNER_API_GROUP_LABEL.to_string(),
            ManagementClusterConfiguration::group(&()).to_string(),
        ),
        (
            OWNER_API_VERSION_LABEL.to_string(),
            ManagementClusterConfiguration::version(&()).to_string(),
        ),
        (
            OWNER_KIND_LABEL.to_string(),
            ManagementClusterConfiguration::kind(&()).to_string(),
        ),
        (OWNER_NAME_LABEL.to_string(), mcc.name_any()),
        (
            OWNER_NAMESPACE_LABEL.to_string(),
            mcc.namespace().unwrap_or_default(),
        ),
        (REVISION_LABEL.to_string(), revision),
    ])
}

/// Label selector matching every object generated by `mcc`
#[must_use]
pub fn owned_objects_selector(mcc: &ManagementClusterConfiguration) -> String {
    let labels = generate_ownership_labels(mcc, "");
    MATCHED_OWNERSHIP_LABELS
        .iter()
        .map(|key| {
            format!(
                "{key}={}",
                labels.get(*key).map(String::as_str).unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Check that an existing object carries the same owner as the desired one
///
/// The error lists every mismatching label, one per line.
pub fn match_ownership(
    existing: &BTreeMap<String, String>,
    desired: &BTreeMap<String, String>,
) -> Result<(), String> {
    let mismatches: Vec<String> = MATCHED_OWNERSHIP_LABELS
        .iter()
        .filter_map(|key| {
            let have = existing.get(*key).map(String::as_str).unwrap_or_default();
            let want = desired.get(*key).map(String::as_str).unwrap_or_default();
            (have != want).then(|| {
                format!("label \"{key}\" is set to \"{have}\", expected to be: \"{want}\"")
            })
        })
        .collect();

    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(mismatches.join("\n"))
    }
}

/// `false` only for objects labelled `konfigure.giantswarm.io/reconcile=disabled`
#[must_use]
pub fn should_reconcile(labels: &BTreeMap<String, String>) -> bool {
    labels.get(RECONCILE_LABEL).map(String::as_str) != Some(RECONCILE_DISABLED_VALUE)
}

/// Entries of a label or annotation map not managed by the operator
#[must_use]
pub fn filter_external_from_map(existing: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    existing
        .iter()
        .filter(|(key, _)| !key.starts_with(KONFIGURE_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Destination object name: `prefix + sep + app + sep + suffix`, skipping empty parts
#[must_use]
pub fn resource_name(naming: &Naming, app: &str) -> String {
    let separator = if naming.use_separator { "-" } else { "" };

    let mut name = app.to_string();
    if let Some(prefix) = naming.prefix.as_deref().filter(|p| !p.is_empty()) {
        name = format!("{prefix}{separator}{name}");
    }
    if let Some(suffix) = naming.suffix.as_deref().filter(|s| !s.is_empty()) {
        name = format!("{name}{separator}{suffix}");
    }
    name
}

/// Application name back from a destination object name, `None` if the affixes do not match
#[must_use]
pub fn app_from_resource_name(naming: &Naming, name: &str) -> Option<String> {
    let separator = if naming.use_separator { "-" } else { "" };

    let mut app = name;
    if let Some(prefix) = naming.prefix.as_deref().filter(|p| !p.is_empty()) {
        app = app.strip_prefix(prefix)?.strip_prefix(separator)?;
    }
    if let Some(suffix) = naming.suffix.as_deref().filter(|s| !s.is_empty()) {
        app = app.strip_suffix(suffix)?.strip_suffix(separator)?;
    }
    (!app.is_empty()).then(|| app.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naming(prefix: Option<&str>, suffix: Option<&str>, use_separator: bool) -> Naming {
        Naming {
            prefix: prefix.map(str::to_string),
            suffix: suffix.map(str::to_string),
            use_separator,
        }
    }

    #[test]
    fn test_resource_name() {
        assert_eq!(resource_name(&naming(None, Some("ex1"), true), "app-1"), "app-1-ex1");
        assert_eq!(
            resource_name(&naming(Some("mc"), Some("ex1"), true), "app-1"),
            "mc-app-1-ex1"
        );
        assert_eq!(
            resource_name(&naming(Some("mc"), Some("x"), false), "app"),
            "mcappx"
        );
        assert_eq!(resource_name(&naming(Some(""), None, true), "app"), "app");
    }

    #[test]
    fn test_app_from_resource_name() {
        let with_both = naming(Some("mc"), Some("ex1"), true);
        assert_eq!(
            app_from_resource_name(&with_both, "mc-app-1-ex1").as_deref(),
            Some("app-1")
        );
        assert_eq!(app_from_resource_name(&with_both, "app-1-ex1"), None);

        let joined = naming(None, Some("x"), false);
        assert_eq!(app_from_resource_name(&joined, "appx").as_deref(), Some("app"));
    }

    #[test]
    fn test_should_reconcile() {
        let mut labels = BTreeMap::new();
        assert!(should_reconcile(&labels));

        labels.insert(RECONCILE_LABEL.to_string(), "enabled".to_string());
        assert!(should_reconcile(&labels));

        labels.insert(RECONCILE_LABEL.to_string(), "disabled".to_string());
        assert!(!should_reconcile(&labels));
    }

    #[test]
    fn test_filter_external_from_map() {
        let existing = BTreeMap::from([
            ("app.kubernetes.io/name".to_string(), "app-1".to_string()),
            (OWNER_NAME_LABEL.to_string(), "example-1".to_string()),
            ("konfigure.giantswarm.io/retired".to_string(), "x".to_string()),
        ]);

        let external = filter_external_from_map(&existing);
        assert_eq!(external.len(), 1);
        assert_eq!(
            external.get("app.kubernetes.io/name").map(String::as_str),
            Some("app-1")
        );
    }

    #[test]
    fn test_match_ownership_ignores_version_and_revision() {
        let desired = BTreeMap::from([
            (GENERATED_BY_LABEL.to_string(), GENERATED_BY_VALUE.to_string()),
            (OWNER_NAME_LABEL.to_string(), "example-1".to_string()),
            (OWNER_API_VERSION_LABEL.to_string(), "v1alpha1".to_string()),
            (REVISION_LABEL.to_string(), "aaaa".to_string()),
        ]);
        let mut existing = desired.clone();
        existing.insert(OWNER_API_VERSION_LABEL.to_string(), "v1beta1".to_string());
        existing.insert(REVISION_LABEL.to_string(), "bbbb".to_string());

        assert!(match_ownership(&existing, &desired).is_ok());
    }

    #[test]
    fn test_match_ownership_reports_each_mismatch() {
        let desired = BTreeMap::from([
            (GENERATED_BY_LABEL.to_string(), GENERATED_BY_VALUE.to_string()),
            (OWNER_NAME_LABEL.to_string(), "example-1".to_string()),
        ]);
        let existing = BTreeMap::from([(OWNER_NAME_LABEL.to_string(), "other".to_string())]);

        let message = match_ownership(&existing, &desired).unwrap_err();
        let lines: Vec<&str> = message.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "label \"konfigure.giantswarm.io/generated-by\" is set to \"\", expected to be: \"konfigure-operator\""
        );
        assert_eq!(
            lines[1],
            "label \"konfigure.giantswarm.io/ownerName\" is set to \"other\", expected to be: \"example-1\""
        );
    }
}

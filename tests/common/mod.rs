//! Common test utilities
//!
//! Source tree fixtures and in-memory decryptors shared by the integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use konfigure_operator::controller::reconciler::source::SourceTree;
use konfigure_operator::controller::reconciler::sops::{
    Decryptor, SopsDecryptionError, SopsDecryptionFailureReason,
};
use konfigure_operator::crd::ManagementClusterConfiguration;
use std::collections::HashMap;
use std::path::Path;
use tempfile::TempDir;

/// Configuration repository written to a temporary directory
pub struct TreeBuilder {
    dir: TempDir,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    pub fn file(self, relative: &str, content: &str) -> Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("failed to create fixture directory");
        }
        std::fs::write(&path, content).expect("failed to write fixture file");
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// The tree and the guard keeping its directory alive
    pub fn build(self) -> (SourceTree, TempDir) {
        (SourceTree::new(self.dir.path()), self.dir)
    }
}

/// Marks a document as SOPS-encrypted for `is_sops_encrypted`
pub const SOPS_TRAILER: &str = "sops:\n  age:\n    - recipient: age1qqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqqq\n  version: 3.9.0\n";

/// Decryptor returning canned plaintext per path
#[derive(Default)]
pub struct FakeDecryptor {
    plaintexts: HashMap<String, String>,
}

impl FakeDecryptor {
    pub fn with(mut self, path: &str, plaintext: &str) -> Self {
        self.plaintexts.insert(path.to_string(), plaintext.to_string());
        self
    }
}

#[async_trait]
impl Decryptor for FakeDecryptor {
    async fn decrypt(&self, path: &str, _content: &str) -> Result<String, SopsDecryptionError> {
        self.plaintexts.get(path).cloned().ok_or_else(|| {
            SopsDecryptionError::new(
                SopsDecryptionFailureReason::KeyNotFound,
                format!("{path}: no identity could decrypt the data key"),
            )
        })
    }
}

/// The `example-1` CR rendering `app-1` of `installation-1` with suffix `ex1`
pub fn example_mcc() -> ManagementClusterConfiguration {
    serde_json::from_value(serde_json::json!({
        "apiVersion": "konfigure.giantswarm.io/v1alpha1",
        "kind": "ManagementClusterConfiguration",
        "metadata": {
            "name": "example-1",
            "namespace": "default",
            "uid": "6a0b7c2e-5c1d-4f3a-9d7e-1f2a3b4c5d6e",
            "generation": 1
        },
        "spec": {
            "configuration": {
                "applications": {
                    "excludes": {"regexMatchers": [], "exactMatchers": []},
                    "includes": {"regexMatchers": [], "exactMatchers": ["app-1"]}
                },
                "cluster": {"name": "installation-1"}
            },
            "destination": {
                "naming": {"suffix": "ex1"},
                "namespace": "default"
            },
            "reconciliation": {"retryInterval": "10s", "interval": "1m"},
            "sources": {
                "flux": {
                    "gitRepository": {"namespace": "default", "name": "example-configs"},
                    "service": {"url": "source-controller.default.svc"}
                }
            }
        }
    }))
    .expect("example CR must deserialize")
}

//! # SOPS
//!
//! AGE key management and SOPS decryption.
//!
//! - `keys`: loading identities from labelled Secrets
//! - `watch`: hot-reloading identities when those Secrets change
//! - `decrypt`: piping content through the `sops` binary
//! - `error`: failure classification

mod decrypt;
mod error;
mod keys;
mod watch;

pub use decrypt::{decrypt_sops_content, is_sops_encrypted};
pub use error::{classify_sops_error, SopsDecryptionError, SopsDecryptionFailureReason};
pub use keys::{collect_age_keys, load_sops_keys, reload_sops_keys, sops_keys_selector, AgeKeys};
pub use watch::start_sops_key_watch;

use async_trait::async_trait;

/// Decrypts SOPS-encrypted documents for the renderer
#[async_trait]
pub trait Decryptor: Send + Sync {
    /// Decrypt `content` read from `path` (the path is only used for diagnostics)
    async fn decrypt(&self, path: &str, content: &str) -> Result<String, SopsDecryptionError>;
}

/// Decryptor backed by the `sops` binary and a snapshot of the loaded identities
pub struct SopsDecryptor {
    age_keys: Option<AgeKeys>,
}

impl SopsDecryptor {
    #[must_use]
    pub fn new(age_keys: Option<AgeKeys>) -> Self {
        Self { age_keys }
    }

    #[must_use]
    pub fn has_keys(&self) -> bool {
        self.age_keys.is_some()
    }
}

impl std::fmt::Debug for SopsDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SopsDecryptor")
            .field("age_keys", &self.age_keys.as_ref().map(|_| "***"))
            .finish()
    }
}

#[async_trait]
impl Decryptor for SopsDecryptor {
    async fn decrypt(&self, path: &str, content: &str) -> Result<String, SopsDecryptionError> {
        decrypt_sops_content(content, self.age_keys.as_ref().map(|keys| keys.as_str()))
            .await
            .map_err(|e| SopsDecryptionError::new(e.reason, format!("{path}: {}", e.message)))
    }
}

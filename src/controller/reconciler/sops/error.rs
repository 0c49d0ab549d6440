//! # SOPS Errors
//!
//! Classification of SOPS decryption failures into transient and permanent
//! reasons, with a remediation hint for the permanent ones.

use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SopsDecryptionFailureReason {
    /// No identity for any recipient of the file is loaded
    KeyNotFound,
    /// An identity is loaded but it is not a recipient of the file
    WrongKey,
    /// The loaded key material cannot be parsed
    InvalidKeyFormat,
    /// The file format is not supported by sops
    UnsupportedFormat,
    /// The file or its SOPS metadata is damaged
    CorruptedFile,
    NetworkTimeout,
    /// The sops binary is missing or could not be started
    ProviderUnavailable,
    PermissionDenied,
    Unknown,
}

impl SopsDecryptionFailureReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::KeyNotFound => "key_not_found",
            Self::WrongKey => "wrong_key",
            Self::InvalidKeyFormat => "invalid_key_format",
            Self::UnsupportedFormat => "unsupported_format",
            Self::CorruptedFile => "corrupted_file",
            Self::NetworkTimeout => "network_timeout",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::PermissionDenied => "permission_denied",
            Self::Unknown => "unknown",
        }
    }

    /// Transient failures may succeed on a later attempt without user action
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::ProviderUnavailable | Self::PermissionDenied | Self::Unknown
        )
    }

    #[must_use]
    pub fn remediation(self) -> &'static str {
        match self {
            Self::KeyNotFound => {
                "Add the AGE identity for this file to a Secret labelled konfigure.giantswarm.io/data=sops-keys (entry name ending in .agekey)"
            }
            Self::WrongKey => {
                "The loaded AGE identities are not recipients of this file. Re-encrypt the file for the operator's public key or load the matching identity"
            }
            Self::InvalidKeyFormat => {
                "The .agekey entry is malformed. It must contain AGE-SECRET-KEY-1... lines"
            }
            Self::UnsupportedFormat => {
                "Only YAML files encrypted with sops are supported"
            }
            Self::CorruptedFile => {
                "The encrypted file or its sops metadata is damaged. Re-encrypt it from the plaintext source"
            }
            Self::NetworkTimeout | Self::ProviderUnavailable | Self::PermissionDenied | Self::Unknown => {
                "Transient failure, the operation will be retried"
            }
        }
    }
}

impl fmt::Display for SopsDecryptionFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error)]
#[error("SOPS decryption failed ({reason}): {message}")]
pub struct SopsDecryptionError {
    pub reason: SopsDecryptionFailureReason,
    pub message: String,
}

impl SopsDecryptionError {
    pub fn new(reason: SopsDecryptionFailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.reason.is_transient()
    }
}

/// Classify a sops failure from its stderr and exit code
///
/// Exit codes take priority over message patterns.
#[must_use]
pub fn classify_sops_error(message: &str, exit_code: Option<i32>) -> SopsDecryptionFailureReason {
    match exit_code {
        Some(2) => return SopsDecryptionFailureReason::CorruptedFile,
        Some(3) => return SopsDecryptionFailureReason::KeyNotFound,
        Some(4) => return SopsDecryptionFailureReason::WrongKey,
        Some(5) => return SopsDecryptionFailureReason::UnsupportedFormat,
        Some(6) => return SopsDecryptionFailureReason::InvalidKeyFormat,
        _ => {}
    }

    let lower = message.to_lowercase();

    if lower.contains("no identity matched any of the recipients")
        || lower.contains("wrong key")
        || (lower.contains("decryption failed") && lower.contains("key"))
    {
        SopsDecryptionFailureReason::WrongKey
    } else if lower.contains("no decryption key found")
        || lower.contains("key not found")
        || lower.contains("failed to get the data key")
    {
        SopsDecryptionFailureReason::KeyNotFound
    } else if lower.contains("unsupported format") || lower.contains("unknown file type") {
        SopsDecryptionFailureReason::UnsupportedFormat
    } else if lower.contains("invalid key")
        || lower.contains("malformed key")
        || lower.contains("malformed secret key")
    {
        SopsDecryptionFailureReason::InvalidKeyFormat
    } else if lower.contains("corrupt")
        || lower.contains("invalid file")
        || lower.contains("mac mismatch")
    {
        SopsDecryptionFailureReason::CorruptedFile
    } else if lower.contains("timeout") || lower.contains("timed out") {
        SopsDecryptionFailureReason::NetworkTimeout
    } else if lower.contains("permission denied") || lower.contains("forbidden") {
        SopsDecryptionFailureReason::PermissionDenied
    } else if lower.contains("not found in path") || lower.contains("failed to spawn") {
        SopsDecryptionFailureReason::ProviderUnavailable
    } else {
        SopsDecryptionFailureReason::Unknown
    }
}

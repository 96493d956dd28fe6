use serde::Serialize;
use thiserror::Error;

use crate::services::reputation::ReputationStatus;

/// Internal faults: staging I/O and other unexpected failures. Rejections are
/// not errors; they travel as [`RejectReason`] on the verdict.
#[derive(Debug, Error)]
pub enum SentryError {
    #[error("staging I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// User-presentable rejection reasons. Each carries a stable code and a
/// human message; raw error text from lower layers never ends up here.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectReason {
    EmptyFile,
    FileTooLarge { size: u64, max: u64 },
    InvalidFilename,
    BlockedExtension { extension: String },
    ExtensionNotAllowed { extension: String },
    TypeMismatch { extension: String },
    BinaryAsText,
    DangerousSignature { format: String },
    CorruptDocument,
    NoExtractableText { chars: usize, words: usize },
    CorruptImage,
    Infected { pattern: String },
    ReputationMalicious { malicious: u64, total: u64 },
    ReputationSuspicious { suspicious: u64, total: u64 },
    ReputationInconclusive { status: ReputationStatus },
    Internal,
}

impl RejectReason {
    /// Stable machine-readable code, suitable for logs and API consumers
    pub fn code(&self) -> &'static str {
        match self {
            RejectReason::EmptyFile => "empty_file",
            RejectReason::FileTooLarge { .. } => "file_too_large",
            RejectReason::InvalidFilename => "invalid_filename",
            RejectReason::BlockedExtension { .. } => "blocked_extension",
            RejectReason::ExtensionNotAllowed { .. } => "extension_not_allowed",
            RejectReason::TypeMismatch { .. } => "type_mismatch",
            RejectReason::BinaryAsText => "binary_as_text",
            RejectReason::DangerousSignature { .. } => "dangerous_signature",
            RejectReason::CorruptDocument => "corrupt_document",
            RejectReason::NoExtractableText { .. } => "no_extractable_text",
            RejectReason::CorruptImage => "corrupt_image",
            RejectReason::Infected { .. } => "infected",
            RejectReason::ReputationMalicious { .. } => "reputation_malicious",
            RejectReason::ReputationSuspicious { .. } => "reputation_suspicious",
            RejectReason::ReputationInconclusive { .. } => "reputation_inconclusive",
            RejectReason::Internal => "internal",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::EmptyFile => write!(f, "File is empty"),
            RejectReason::FileTooLarge { size, max } => write!(
                f,
                "File too large: {} bytes (maximum {} MB)",
                size,
                max / 1024 / 1024
            ),
            RejectReason::InvalidFilename => write!(f, "Invalid filename"),
            RejectReason::BlockedExtension { extension } => {
                write!(f, "File extension '.{}' is not allowed", extension)
            }
            RejectReason::ExtensionNotAllowed { extension } => {
                write!(f, "File type '.{}' is not permitted", extension)
            }
            RejectReason::TypeMismatch { extension } => {
                write!(f, "File content does not match its '.{}' extension", extension)
            }
            RejectReason::BinaryAsText => {
                write!(f, "Text file contains binary or invalid encoding")
            }
            RejectReason::DangerousSignature { format } => {
                write!(f, "File content matches a blocked format ({})", format)
            }
            RejectReason::CorruptDocument => {
                write!(f, "Document structure is corrupt or unreadable")
            }
            RejectReason::NoExtractableText { chars, words } => write!(
                f,
                "Document contains no extractable text ({} characters, {} words)",
                chars, words
            ),
            RejectReason::CorruptImage => write!(f, "Image is corrupt or invalid"),
            RejectReason::Infected { pattern } => {
                write!(f, "Threat detected: pattern '{}' found in file", pattern)
            }
            RejectReason::ReputationMalicious { malicious, total } => {
                write!(f, "Flagged as malicious by {}/{} engines", malicious, total)
            }
            RejectReason::ReputationSuspicious { suspicious, total } => {
                write!(f, "Flagged as suspicious by {}/{} engines", suspicious, total)
            }
            RejectReason::ReputationInconclusive { status } => write!(
                f,
                "Reputation check inconclusive ({}) and policy is fail-closed",
                status
            ),
            RejectReason::Internal => write!(f, "Internal error during file validation"),
        }
    }
}

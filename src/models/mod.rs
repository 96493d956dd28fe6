use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::RejectReason;
use crate::services::reputation::ReputationResult;
use crate::services::scanner::ScanVerdict;

/// File type derived from magic-number inspection, with the declared
/// extension as a logged, lower-confidence fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedType {
    Png,
    Jpg,
    Gif,
    Pdf,
    Doc,
    Docx,
    Txt,
    Unknown,
}

impl DetectedType {
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "png" => DetectedType::Png,
            "jpg" | "jpeg" => DetectedType::Jpg,
            "gif" => DetectedType::Gif,
            "pdf" => DetectedType::Pdf,
            "doc" => DetectedType::Doc,
            "docx" => DetectedType::Docx,
            "txt" => DetectedType::Txt,
            _ => DetectedType::Unknown,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, DetectedType::Png | DetectedType::Jpg | DetectedType::Gif)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DetectedType::Png => "png",
            DetectedType::Jpg => "jpg",
            DetectedType::Gif => "gif",
            DetectedType::Pdf => "pdf",
            DetectedType::Doc => "doc",
            DetectedType::Docx => "docx",
            DetectedType::Txt => "txt",
            DetectedType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for DetectedType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable identity of a validated upload
#[derive(Debug, Clone, Serialize)]
pub struct FileIdentity {
    pub sanitized_filename: String,
    pub declared_extension: String,
    pub detected_type: DetectedType,
    pub size_bytes: u64,
    /// SHA-256 of the full content, lowercase hex
    pub content_hash: String,
}

/// Results of the staged scans, carried for audit
#[derive(Debug, Clone, Serialize)]
pub struct ScanDetails {
    pub local: ScanVerdict,
    pub reputation: ReputationResult,
}

/// Final verdict for one upload candidate
#[derive(Debug, Clone, Serialize)]
pub struct ValidationVerdict {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<FileIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanDetails>,
    /// Generated filename in the accepted store, present only on acceptance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_name: Option<String>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationVerdict {
    pub fn accepted(identity: FileIdentity, scan: ScanDetails, stored_name: String) -> Self {
        Self {
            accepted: true,
            reason: None,
            message: format!("File '{}' accepted", identity.sanitized_filename),
            identity: Some(identity),
            scan: Some(scan),
            stored_name: Some(stored_name),
            validated_at: Utc::now(),
        }
    }

    pub fn rejected(
        reason: RejectReason,
        identity: Option<FileIdentity>,
        scan: Option<ScanDetails>,
    ) -> Self {
        Self {
            accepted: false,
            message: reason.to_string(),
            reason: Some(reason),
            identity,
            scan,
            stored_name: None,
            validated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detected_type_from_extension() {
        assert_eq!(DetectedType::from_extension("jpeg"), DetectedType::Jpg);
        assert_eq!(DetectedType::from_extension("pdf"), DetectedType::Pdf);
        assert_eq!(DetectedType::from_extension("zip"), DetectedType::Unknown);
        assert!(DetectedType::Png.is_image());
        assert!(!DetectedType::Pdf.is_image());
    }

    #[test]
    fn test_rejected_verdict_carries_reason_code() {
        let verdict = ValidationVerdict::rejected(RejectReason::EmptyFile, None, None);
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason.as_ref().unwrap().code(), "empty_file");
        assert_eq!(verdict.message, "File is empty");
        assert!(verdict.stored_name.is_none());
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::SecurityConfig;
use crate::error::{RejectReason, SentryError};
use crate::models::{DetectedType, FileIdentity, ScanDetails, ValidationVerdict};
use crate::services::content;
use crate::services::reputation::{ReputationClient, ReputationResult, ReputationStatus};
use crate::services::scanner::{create_scanner, ScanVerdict, ThreatScanner};
use crate::services::staging::StagedFile;
use crate::utils::signature::SNIFF_LEN;
use crate::utils::validation::{validate_structure, StructuralReport};

/// Orchestrates the validation pipeline for one upload candidate at a time:
/// structural checks, type-specific deep validation, staging, local and
/// remote scans, the decision policy, and promotion into the accepted store.
///
/// Passes share no mutable state; any number may run concurrently on their
/// own tasks. Staged copies are RAII guards, so no pass leaks a temp artifact
/// regardless of how it exits.
pub struct SecurityManager {
    config: SecurityConfig,
    scanner: Arc<dyn ThreatScanner>,
    reputation: ReputationClient,
    staging_dir: PathBuf,
    store_dir: PathBuf,
}

impl SecurityManager {
    /// Build the manager and create the upload directory structure
    pub fn new(
        config: SecurityConfig,
        scanner: Arc<dyn ThreatScanner>,
        reputation: ReputationClient,
    ) -> Result<Self, SentryError> {
        let staging_dir = config.staging_dir();
        let store_dir = config.store_dir();
        std::fs::create_dir_all(&staging_dir)?;
        std::fs::create_dir_all(&store_dir)?;
        Ok(Self {
            config,
            scanner,
            reputation,
            staging_dir,
            store_dir,
        })
    }

    /// Wire up the scanner and reputation client named in the configuration
    pub fn from_config(config: SecurityConfig) -> Result<Self, SentryError> {
        let scanner: Arc<dyn ThreatScanner> = Arc::from(create_scanner(&config.scanner_type));
        let reputation = ReputationClient::new(&config);
        Self::new(config, scanner, reputation)
    }

    pub fn store_dir(&self) -> &std::path::Path {
        &self.store_dir
    }

    /// Validate one upload candidate. Always produces a verdict; internal
    /// faults are logged and fail closed into a rejection with a generic
    /// message rather than surfacing raw error text.
    pub async fn validate_upload<R>(
        &self,
        reader: R,
        declared_filename: &str,
        declared_size: u64,
    ) -> ValidationVerdict
    where
        R: AsyncRead + Unpin + Send,
    {
        match self
            .run_pipeline(reader, declared_filename, declared_size)
            .await
        {
            Ok(verdict) => {
                if verdict.accepted {
                    tracing::info!(
                        filename = declared_filename,
                        stored = verdict.stored_name.as_deref().unwrap_or(""),
                        "upload accepted"
                    );
                } else {
                    tracing::info!(
                        filename = declared_filename,
                        code = verdict.reason.as_ref().map(|r| r.code()).unwrap_or(""),
                        "upload rejected"
                    );
                }
                verdict
            }
            Err(e) => {
                tracing::error!(filename = declared_filename, error = %e, "validation pass failed");
                ValidationVerdict::rejected(RejectReason::Internal, None, None)
            }
        }
    }

    async fn run_pipeline<R>(
        &self,
        mut reader: R,
        declared_filename: &str,
        declared_size: u64,
    ) -> Result<ValidationVerdict, SentryError>
    where
        R: AsyncRead + Unpin + Send,
    {
        // Reject on the declared size before reading anything
        if declared_size > self.config.max_file_size {
            return Ok(ValidationVerdict::rejected(
                RejectReason::FileTooLarge {
                    size: declared_size,
                    max: self.config.max_file_size,
                },
                None,
                None,
            ));
        }

        // Buffer the candidate, bounded at one byte past the limit so an
        // undeclared oversize stream is caught without unbounded memory
        let mut bytes = Vec::with_capacity(declared_size.min(self.config.max_file_size) as usize);
        let mut limited = reader.take(self.config.max_file_size + 1);
        limited.read_to_end(&mut bytes).await?;
        if bytes.len() as u64 > self.config.max_file_size {
            return Ok(ValidationVerdict::rejected(
                RejectReason::FileTooLarge {
                    size: bytes.len() as u64,
                    max: self.config.max_file_size,
                },
                None,
                None,
            ));
        }
        let size_bytes = bytes.len() as u64;
        let header = &bytes[..bytes.len().min(SNIFF_LEN)];

        // Stage 1: structural checks; failures reject before anything touches
        // the filesystem
        let report = match validate_structure(declared_filename, size_bytes, header, &self.config)
        {
            Ok(report) => report,
            Err(reason) => return Ok(ValidationVerdict::rejected(reason, None, None)),
        };

        // Stage 2: type-specific deep validation
        if let Err(reason) = self.deep_validate(&report, &bytes) {
            return Ok(ValidationVerdict::rejected(reason, None, None));
        }

        // Stage 3: stage the validated bytes; the guard deletes the copy on
        // every non-promoted exit from here on
        let (staged, content_hash) =
            StagedFile::write(&self.staging_dir, &report.extension, &bytes).await?;
        drop(bytes);

        let identity = FileIdentity {
            sanitized_filename: report.sanitized_filename.clone(),
            declared_extension: report.extension.clone(),
            detected_type: report.detected_type,
            size_bytes,
            content_hash,
        };
        tracing::info!(
            filename = %identity.sanitized_filename,
            detected = %identity.detected_type,
            low_confidence = report.low_confidence,
            hash_prefix = &identity.content_hash[..16],
            "candidate staged for scanning"
        );

        // Stage 4: local threat scan. Scanner faults fail closed.
        let local = match self.scanner.scan(staged.path()).await {
            Ok(verdict) => verdict,
            Err(e) => {
                tracing::error!(error = %e, "local scanner failed");
                staged.discard().await;
                return Ok(ValidationVerdict::rejected(
                    RejectReason::Internal,
                    Some(identity),
                    None,
                ));
            }
        };

        // Stage 5: remote reputation; inconclusive results are data, not
        // errors, and the policy below decides what they mean
        let reputation = self
            .reputation
            .check_with_hash(staged.path(), &identity.content_hash)
            .await;

        let scan = ScanDetails {
            local: local.clone(),
            reputation: reputation.clone(),
        };

        // Stage 6: decision policy
        if let Err(reason) = decide(&local, &reputation, self.config.fail_closed) {
            staged.discard().await;
            return Ok(ValidationVerdict::rejected(reason, Some(identity), Some(scan)));
        }

        // Stage 7: promotion; rename into the accepted store
        let stored_name = staged.promote(&self.store_dir).await?;
        Ok(ValidationVerdict::accepted(identity, scan, stored_name))
    }

    fn deep_validate(&self, report: &StructuralReport, bytes: &[u8]) -> Result<(), RejectReason> {
        match report.detected_type {
            DetectedType::Pdf => content::validate_pdf(
                bytes,
                self.config.min_pdf_text_chars,
                self.config.min_pdf_text_words,
            ),
            ty if ty.is_image() => content::validate_image(bytes),
            _ => Ok(()),
        }
    }
}

/// The decision policy: a clean local scan is mandatory, a clean or unknown
/// reputation always passes, malicious or suspicious always rejects, and
/// inconclusive reputation statuses follow the fail-open/fail-closed flag.
fn decide(
    local: &ScanVerdict,
    reputation: &ReputationResult,
    fail_closed: bool,
) -> Result<(), RejectReason> {
    if let ScanVerdict::Infected { pattern } = local {
        return Err(RejectReason::Infected {
            pattern: pattern.clone(),
        });
    }

    match reputation.status {
        ReputationStatus::Clean | ReputationStatus::Unknown => Ok(()),
        ReputationStatus::Malicious => {
            let tally = reputation.tally.unwrap_or_default();
            Err(RejectReason::ReputationMalicious {
                malicious: tally.malicious,
                total: tally.total,
            })
        }
        ReputationStatus::Suspicious => {
            let tally = reputation.tally.unwrap_or_default();
            Err(RejectReason::ReputationSuspicious {
                suspicious: tally.suspicious,
                total: tally.total,
            })
        }
        status if status.is_inconclusive() && fail_closed => {
            Err(RejectReason::ReputationInconclusive { status })
        }
        _ => Ok(()),
    }
}

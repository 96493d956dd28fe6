use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::SecurityConfig;
use crate::utils::hash;

/// Outcome of a remote reputation lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationStatus {
    Clean,
    Suspicious,
    Malicious,
    /// No API key configured, or the hash has never been analyzed
    Unknown,
    /// The service errored or was unreachable; policy decides what this means
    ApiUnavailable,
    /// The analysis did not complete within the poll budget
    TimedOut,
    /// The file exceeds the service's upload limit; no network call was made
    TooLarge,
}

impl ReputationStatus {
    /// Statuses that carry no verdict about the content itself
    pub fn is_inconclusive(&self) -> bool {
        matches!(
            self,
            ReputationStatus::ApiUnavailable | ReputationStatus::TimedOut | ReputationStatus::TooLarge
        )
    }
}

impl std::fmt::Display for ReputationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReputationStatus::Clean => "clean",
            ReputationStatus::Suspicious => "suspicious",
            ReputationStatus::Malicious => "malicious",
            ReputationStatus::Unknown => "unknown",
            ReputationStatus::ApiUnavailable => "api unavailable",
            ReputationStatus::TimedOut => "timed out",
            ReputationStatus::TooLarge => "too large for remote analysis",
        };
        f.write_str(s)
    }
}

/// Engine counts reported by the reputation service
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineTally {
    pub malicious: u64,
    pub suspicious: u64,
    pub total: u64,
}

impl EngineTally {
    fn from_stats(stats: &HashMap<String, u64>) -> Self {
        Self {
            malicious: stats.get("malicious").copied().unwrap_or(0),
            suspicious: stats.get("suspicious").copied().unwrap_or(0),
            total: stats.values().sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReputationResult {
    pub status: ReputationStatus,
    pub message: String,
    /// Raw engine counts, carried for audit whenever a verdict was reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tally: Option<EngineTally>,
}

impl ReputationResult {
    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            status: ReputationStatus::Unknown,
            message: message.into(),
            tally: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            status: ReputationStatus::ApiUnavailable,
            message: message.into(),
            tally: None,
        }
    }

    /// Derive a verdict from an engine tally: any malicious flag wins, then
    /// any suspicious flag, otherwise clean
    pub fn from_tally(tally: EngineTally) -> Self {
        if tally.malicious > 0 {
            Self {
                status: ReputationStatus::Malicious,
                message: format!(
                    "Flagged as malicious by {}/{} engines",
                    tally.malicious, tally.total
                ),
                tally: Some(tally),
            }
        } else if tally.suspicious > 0 {
            Self {
                status: ReputationStatus::Suspicious,
                message: format!(
                    "Flagged as suspicious by {}/{} engines",
                    tally.suspicious, tally.total
                ),
                tally: Some(tally),
            }
        } else {
            Self {
                status: ReputationStatus::Clean,
                message: format!("Clean according to {} engines", tally.total),
                tally: Some(tally),
            }
        }
    }
}

// Wire shapes of the reputation service (VirusTotal v3)

#[derive(Deserialize)]
struct FileReport {
    data: FileReportData,
}

#[derive(Deserialize)]
struct FileReportData {
    attributes: FileReportAttributes,
}

#[derive(Deserialize)]
struct FileReportAttributes {
    last_analysis_stats: HashMap<String, u64>,
}

#[derive(Deserialize)]
struct UploadResponse {
    data: UploadData,
}

#[derive(Deserialize)]
struct UploadData {
    id: String,
}

#[derive(Deserialize)]
struct AnalysisReport {
    data: AnalysisData,
}

#[derive(Deserialize)]
struct AnalysisData {
    attributes: AnalysisAttributes,
}

#[derive(Deserialize)]
struct AnalysisAttributes {
    status: String,
    #[serde(default)]
    stats: HashMap<String, u64>,
}

/// Hash-based reputation lookup against a remote corpus, with an
/// upload-and-poll fallback for previously unseen files.
///
/// Network failures never propagate out of [`ReputationClient::check`]; they
/// collapse into [`ReputationStatus::ApiUnavailable`] and the orchestrator's
/// policy decides whether that blocks acceptance.
pub struct ReputationClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    poll_interval: Duration,
    poll_budget: Duration,
    max_upload_size: u64,
}

impl ReputationClient {
    pub fn new(config: &SecurityConfig) -> Self {
        Self::with_base_url(config, config.reputation_base_url.clone())
    }

    /// Same as [`new`](Self::new) with an overridden endpoint, used by tests
    /// to point at a stub server
    pub fn with_base_url(config: &SecurityConfig, base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("upload-sentry/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key: config.reputation_api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            poll_interval: config.reputation_poll_interval,
            poll_budget: config.reputation_poll_timeout,
            max_upload_size: config.reputation_max_upload_size,
        }
    }

    /// Check the reputation of a staged file. Computes the content hash
    /// itself; callers that already hold the hash use
    /// [`check_with_hash`](Self::check_with_hash).
    pub async fn check(&self, path: &Path) -> ReputationResult {
        if self.api_key.is_none() {
            return ReputationResult::unknown("No API key configured, file processed locally");
        }
        let file_hash = match hash::sha256_file(path).await {
            Ok(h) => h,
            Err(e) => {
                tracing::error!(error = %e, "failed to hash file for reputation lookup");
                return ReputationResult::unavailable("Could not hash file for lookup");
            }
        };
        self.check_with_hash(path, &file_hash).await
    }

    pub async fn check_with_hash(&self, path: &Path, file_hash: &str) -> ReputationResult {
        let Some(api_key) = self.api_key.clone() else {
            return ReputationResult::unknown("No API key configured, file processed locally");
        };

        let url = format!("{}/files/{}", self.base_url, file_hash);
        let response = match self
            .client
            .get(&url)
            .header("x-apikey", &api_key)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "reputation lookup failed");
                return ReputationResult::unavailable("Reputation service unreachable");
            }
        };

        match response.status() {
            reqwest::StatusCode::OK => match response.json::<FileReport>().await {
                Ok(report) => {
                    let tally =
                        EngineTally::from_stats(&report.data.attributes.last_analysis_stats);
                    ReputationResult::from_tally(tally)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "malformed reputation report");
                    ReputationResult::unavailable("Malformed reputation report")
                }
            },
            // Hash unknown to the corpus: submit the file for analysis
            reqwest::StatusCode::NOT_FOUND => self.upload_and_poll(&api_key, path).await,
            status => {
                tracing::warn!(%status, "reputation API error");
                ReputationResult::unavailable(format!("Reputation API error ({})", status))
            }
        }
    }

    /// Submit a previously unseen file and poll the analysis until it
    /// completes or the wall-clock budget runs out. Every await is
    /// cancel-safe, so a caller-side deadline can abort the loop cleanly.
    async fn upload_and_poll(&self, api_key: &str, path: &Path) -> ReputationResult {
        let size = match tokio::fs::metadata(path).await {
            Ok(m) => m.len(),
            Err(e) => {
                tracing::error!(error = %e, "failed to stat staged file");
                return ReputationResult::unavailable("Could not read staged file");
            }
        };
        if size > self.max_upload_size {
            return ReputationResult {
                status: ReputationStatus::TooLarge,
                message: format!(
                    "File too large for remote analysis ({} > {} bytes)",
                    size, self.max_upload_size
                ),
                tally: None,
            };
        }

        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(error = %e, "failed to read staged file for upload");
                return ReputationResult::unavailable("Could not read staged file");
            }
        };
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(filename));

        let response = match self
            .client
            .post(format!("{}/files", self.base_url))
            .header("x-apikey", api_key)
            .multipart(form)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "reputation upload failed");
                return ReputationResult::unavailable("Reputation upload failed");
            }
        };
        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "reputation upload rejected");
            return ReputationResult::unavailable(format!(
                "Reputation upload rejected ({})",
                response.status()
            ));
        }
        let analysis_id = match response.json::<UploadResponse>().await {
            Ok(r) => r.data.id,
            Err(e) => {
                tracing::warn!(error = %e, "malformed upload response");
                return ReputationResult::unavailable("Malformed upload response");
            }
        };

        tracing::info!(analysis_id, "file submitted for remote analysis, polling");
        self.poll_analysis(api_key, &analysis_id).await
    }

    async fn poll_analysis(&self, api_key: &str, analysis_id: &str) -> ReputationResult {
        let deadline = Instant::now() + self.poll_budget;
        let url = format!("{}/analyses/{}", self.base_url, analysis_id);

        loop {
            match self.client.get(&url).header("x-apikey", api_key).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::OK => {
                    match response.json::<AnalysisReport>().await {
                        Ok(report) if report.data.attributes.status == "completed" => {
                            let tally = EngineTally::from_stats(&report.data.attributes.stats);
                            return ReputationResult::from_tally(tally);
                        }
                        Ok(report) => {
                            tracing::debug!(
                                analysis_id,
                                status = %report.data.attributes.status,
                                "analysis still running"
                            );
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "malformed analysis report");
                            return ReputationResult::unavailable("Malformed analysis report");
                        }
                    }
                }
                Ok(response) => {
                    tracing::debug!(status = %response.status(), "analysis poll returned error status");
                }
                Err(e) => {
                    tracing::warn!(error = %e, "analysis poll failed");
                    return ReputationResult::unavailable("Reputation service unreachable");
                }
            }

            if Instant::now() + self.poll_interval >= deadline {
                return ReputationResult {
                    status: ReputationStatus::TimedOut,
                    message: "Timed out waiting for remote analysis".to_string(),
                    tally: None,
                };
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Security configuration for the upload validation pipeline
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Root directory for accepted files and the staging area
    pub upload_root: PathBuf,

    /// Maximum accepted file size in bytes (default: 10 MiB)
    pub max_file_size: u64,

    /// Allowed file extensions, lowercase, without the dot
    pub allowed_extensions: Vec<String>,

    /// Reputation service API key; `None` degrades to local-only mode
    pub reputation_api_key: Option<String>,

    /// Base URL of the reputation service
    pub reputation_base_url: String,

    /// Interval between analysis polls (default: 5s)
    pub reputation_poll_interval: Duration,

    /// Wall-clock budget for the upload-and-poll flow (default: 120s)
    pub reputation_poll_timeout: Duration,

    /// Largest file the reputation service accepts for upload (default: 32 MiB)
    pub reputation_max_upload_size: u64,

    /// When true, inconclusive reputation results (unavailable, timed out)
    /// reject the upload instead of passing it through
    pub fail_closed: bool,

    /// Local scanner type: "keyword" or "noop" (default: "keyword")
    pub scanner_type: String,

    /// Minimum extractable characters for a document to be accepted
    pub min_pdf_text_chars: usize,

    /// Minimum extractable words for a document to be accepted
    pub min_pdf_text_words: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            upload_root: PathBuf::from("uploads"),
            max_file_size: 10 * 1024 * 1024, // 10 MiB
            allowed_extensions: ["txt", "pdf", "png", "jpg", "jpeg", "gif", "doc", "docx"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            reputation_api_key: None,
            reputation_base_url: "https://www.virustotal.com/api/v3".to_string(),
            reputation_poll_interval: Duration::from_secs(5),
            reputation_poll_timeout: Duration::from_secs(120),
            reputation_max_upload_size: 32 * 1024 * 1024, // 32 MiB
            // Fail-open by default: an unreachable reputation service must not
            // take the upload endpoint down with it. High-assurance deployments
            // set FAIL_CLOSED=true.
            fail_closed: false,
            scanner_type: "keyword".to_string(),
            min_pdf_text_chars: 10,
            min_pdf_text_words: 3,
        }
    }
}

impl SecurityConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            upload_root: env::var("UPLOAD_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.upload_root),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.allowed_extensions),

            reputation_api_key: env::var("VIRUSTOTAL_API_KEY").ok().filter(|k| !k.is_empty()),

            reputation_base_url: env::var("REPUTATION_BASE_URL")
                .unwrap_or(default.reputation_base_url),

            reputation_poll_interval: env::var("REPUTATION_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.reputation_poll_interval),

            reputation_poll_timeout: env::var("REPUTATION_POLL_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(default.reputation_poll_timeout),

            reputation_max_upload_size: env::var("REPUTATION_MAX_UPLOAD_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.reputation_max_upload_size),

            fail_closed: env::var("FAIL_CLOSED")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.fail_closed),

            scanner_type: env::var("SCANNER_TYPE").unwrap_or(default.scanner_type),

            min_pdf_text_chars: env::var("MIN_PDF_TEXT_CHARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.min_pdf_text_chars),

            min_pdf_text_words: env::var("MIN_PDF_TEXT_WORDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.min_pdf_text_words),
        }
    }

    /// Create config for development (no remote lookups, no-op scanner)
    pub fn development() -> Self {
        Self {
            scanner_type: "noop".to_string(),
            reputation_api_key: None,
            ..Self::default()
        }
    }

    pub fn is_extension_allowed(&self, ext: &str) -> bool {
        self.allowed_extensions.iter().any(|a| a == ext)
    }

    /// Staging directory for in-flight files; never served publicly
    pub fn staging_dir(&self) -> PathBuf {
        self.upload_root.join("staging")
    }

    /// Permanent store for accepted files
    pub fn store_dir(&self) -> PathBuf {
        self.upload_root.join("files")
    }
}

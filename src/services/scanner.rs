use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Bytes of file content a local scan inspects
const SCAN_PREFIX_LEN: usize = 1024;

/// Result of a local threat scan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScanVerdict {
    /// No threats detected
    Clean,
    /// A suspicious pattern was found
    Infected { pattern: String },
}

/// Local threat scanning capability. Implementations must do a bounded read
/// and return a deterministic verdict with bounded latency; this is the seam
/// where a real signature engine plugs in without touching the orchestrator.
#[async_trait::async_trait]
pub trait ThreatScanner: Send + Sync {
    async fn scan(&self, path: &Path) -> Result<ScanVerdict>;
}

/// Heuristic keyword scanner. Flags a fixed vocabulary of suspicious tokens
/// in the first kilobyte of content. A stand-in for a real engine, useful for
/// demos and as a tripwire for obviously-labelled test payloads (EICAR-style).
pub struct KeywordScanner;

const SUSPICIOUS_TOKENS: &[&str] = &[
    "virus",
    "malware",
    "trojan",
    "hack",
    "exploit",
    "payload",
    "backdoor",
    "corrupted",
    "malicious",
];

#[async_trait::async_trait]
impl ThreatScanner for KeywordScanner {
    async fn scan(&self, path: &Path) -> Result<ScanVerdict> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut buffer = vec![0u8; SCAN_PREFIX_LEN];
        let mut filled = 0;
        while filled < buffer.len() {
            let n = file.read(&mut buffer[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let content = String::from_utf8_lossy(&buffer[..filled]).to_lowercase();

        for token in SUSPICIOUS_TOKENS {
            if content.contains(token) {
                return Ok(ScanVerdict::Infected {
                    pattern: token.to_string(),
                });
            }
        }
        Ok(ScanVerdict::Clean)
    }
}

/// No-op scanner for development and testing
pub struct NoOpScanner;

#[async_trait::async_trait]
impl ThreatScanner for NoOpScanner {
    async fn scan(&self, _path: &Path) -> Result<ScanVerdict> {
        tracing::warn!("NoOpScanner: skipping local threat scan");
        Ok(ScanVerdict::Clean)
    }
}

/// Scanner that always reports an infection (for testing)
#[cfg(test)]
pub struct AlwaysInfectedScanner;

#[cfg(test)]
#[async_trait::async_trait]
impl ThreatScanner for AlwaysInfectedScanner {
    async fn scan(&self, _path: &Path) -> Result<ScanVerdict> {
        Ok(ScanVerdict::Infected {
            pattern: "test.signature".to_string(),
        })
    }
}

/// Factory for the scanner named in the configuration
pub fn create_scanner(scanner_type: &str) -> Box<dyn ThreatScanner> {
    match scanner_type.to_lowercase().as_str() {
        "keyword" => Box::new(KeywordScanner),
        "noop" | "none" | "disabled" => Box::new(NoOpScanner),
        other => {
            tracing::warn!("unknown scanner type '{}', using NoOpScanner", other);
            Box::new(NoOpScanner)
        }
    }
}

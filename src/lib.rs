pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use config::SecurityConfig;
pub use error::{RejectReason, SentryError};
pub use models::{DetectedType, FileIdentity, ScanDetails, ValidationVerdict};
pub use services::reputation::{EngineTally, ReputationClient, ReputationResult, ReputationStatus};
pub use services::scanner::{
    create_scanner, KeywordScanner, NoOpScanner, ScanVerdict, ThreatScanner,
};
pub use services::security_manager::SecurityManager;

//! Error types for gcpcost
//!
//! Library code uses `crate::error::Result<T>` which returns `CostError`.
//! The binary uses `anyhow::Result<T>` for top-level error handling and maps
//! `CostError` variants to exit codes via `exit_codes`.
//!
//! ## Which errors are fatal
//!
//! Most failures in this crate are recovered locally and never surface here as
//! an `Err`:
//!
//! - Instance type parse failures become "no result" (`InstanceParseError` is
//!   logged, see `parser::InstanceParser::parse`).
//! - Cache read failures are reported as `cache::Lookup::Unreadable` and the
//!   caller falls through to a fetch. Cache write failures are logged and dropped.
//! - Missing pricing for a valid instance type is a soft failure in `estimate`.
//!
//! What does propagate:
//!
//! - `BillingApi`: the catalog could not be fetched. There is no retry policy;
//!   the current instance fails (and the process, outside batch mode).
//! - `Config`: configuration or machine table could not be loaded.
//! - `Validation`: bad CLI input such as a missing instance list file.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gcpcost
#[derive(Error, Debug)]
pub enum CostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cloud Billing API error: {message}")]
    BillingApi {
        message: String,
        status: Option<u16>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Cache error: {} - {reason}", path.display())]
    Cache { path: PathBuf, reason: String },

    #[error("Invalid instance type: {0}")]
    InstanceType(#[from] InstanceParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Validation error: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

/// Reasons an instance type string could not be turned into an `InstanceSpec`.
///
/// The Display text doubles as the user-facing diagnostic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InstanceParseError {
    #[error("'{0}' is not of the form <family>-<shape>-<vcpus>.")]
    Malformed(String),

    #[error("Invalid vCPU count '{count}' in '{instance_type}'.")]
    InvalidVcpus { instance_type: String, count: String },

    #[error("Family '{0}' not currently defined.")]
    UnknownFamily(String),

    #[error("Shape '{shape}' not found for family '{family}'.")]
    UnknownShape { family: String, shape: String },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, CostError>;

/// The transport error is kept only as the source, so `{:#}` prints it once.
impl From<reqwest::Error> for CostError {
    fn from(err: reqwest::Error) -> Self {
        CostError::BillingApi {
            message: "request failed".to_string(),
            status: err.status().map(|s| s.as_u16()),
            source: Some(Box::new(err)),
        }
    }
}

impl CostError {
    /// Shorthand for a cache failure at `path`.
    pub fn cache(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        CostError::Cache {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

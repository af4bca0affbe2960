use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Compute Engine in the Cloud Billing catalog
pub const COMPUTE_ENGINE_SERVICE_ID: &str = "6F81-5844-456A";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gcp: GcpConfig,
    pub cache: CacheConfig,
    /// Replacement machine spec table (JSON); the built-in table when unset
    pub machine_specs: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    /// Quota project for billing API calls; not used in pricing
    pub project_id: Option<String>,
    /// Region used when none is given on the command line
    pub region: String,
    pub api_endpoint: String,
    pub api_key: Option<String>,
    pub access_token: Option<String>,
    pub service_id: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            region: "europe-west2".to_string(),
            api_endpoint: "https://cloudbilling.googleapis.com".to_string(),
            api_key: None,
            access_token: None,
            service_id: COMPUTE_ENGINE_SERVICE_ID.to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("caches"),
        }
    }
}

impl Config {
    /// Load from `path`, `.gcpcost.toml`, or `~/.config/gcpcost/config.toml`,
    /// then apply environment overrides.
    ///
    /// `.gcpcost.toml` takes the place of a `.env` file; no dotenv file is read.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    fn load_file(path: Option<&Path>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p.to_path_buf()
        } else {
            let local = PathBuf::from(".gcpcost.toml");
            if local.exists() {
                local
            } else {
                dirs::config_dir()
                    .map(|d| d.join("gcpcost").join("config.toml"))
                    .unwrap_or_else(|| PathBuf::from(".gcpcost.toml"))
            }
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: Config = toml::from_str(&content).map_err(|e| {
                ConfigError::ParseError(format!("{}: {}", config_path.display(), e))
            })?;
            Ok(config)
        } else {
            if path.is_some() {
                tracing::warn!(
                    "Config file not found: {}, using defaults",
                    config_path.display()
                );
            }
            Ok(Config::default())
        }
    }

    /// Overlay environment variables read through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(project) = get("GCP_PROJECT_ID") {
            self.gcp.project_id = Some(project);
        }
        if let Some(region) = get("GCP_REGION") {
            self.gcp.region = region;
        }
        if let Some(key) = get("GCP_BILLING_API_KEY") {
            self.gcp.api_key = Some(key);
        }
        if let Some(token) = get("GOOGLE_OAUTH_ACCESS_TOKEN") {
            self.gcp.access_token = Some(token);
        }
        if let Some(dir) = get("GCPCOST_CACHE_DIR") {
            self.cache.dir = PathBuf::from(dir);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.gcp.region.trim().is_empty() {
            return Err(ConfigError::MissingField("gcp.region".to_string()).into());
        }
        if self.gcp.service_id.trim().is_empty() {
            return Err(ConfigError::MissingField("gcp.service_id".to_string()).into());
        }
        if self.gcp.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "gcp.timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

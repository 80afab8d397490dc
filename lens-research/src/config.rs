//! Research configuration
//!
//! Selects the analysis backend, its credentials, and the polling limits.
//! Missing credentials are not a configuration error here: they surface as
//! [`ResearchError::Configuration`](crate::ResearchError) when a job is
//! submitted, before any network call.

use lens_client::{AnalysisBackend, AzureOpenAiClient, OpenAiClient, ZapierClient};
use lens_core::domain::request::Lens;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::scheduler::PollPolicy;
use crate::service::ResultCache;
use crate::store::{FileStore, MemoryStore, StoreError};

/// Deployment used for Azure when none is configured
pub const DEFAULT_AZURE_DEPLOYMENT: &str = "gpt-4o-mini";

/// Directory name under the user cache directory
pub const CACHE_DIR_NAME: &str = "lens-navigator";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown backend '{0}' (expected openai, azure or zapier)")]
    UnknownBackend(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Cannot open cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

/// Which service runs research jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    OpenAi,
    Azure,
    Zapier,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BackendKind::OpenAi => "openai",
            BackendKind::Azure => "azure",
            BackendKind::Zapier => "zapier",
        })
    }
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(BackendKind::OpenAi),
            "azure" => Ok(BackendKind::Azure),
            "zapier" => Ok(BackendKind::Zapier),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// Research configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub backend: BackendKind,

    pub openai_api_key: Option<String>,
    /// API root override (e.g., a local proxy)
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,

    pub azure_endpoint: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_deployment: String,
    pub azure_api_version: Option<String>,

    /// Hook used for every lens without a dedicated one
    pub zapier_webhook_url: Option<String>,
    pub zapier_lens_urls: HashMap<Lens, String>,

    /// Delay between status queries
    pub poll_interval: Duration,

    /// Wall-clock budget for one job
    pub max_wait: Duration,

    pub max_transient_retries: u32,

    /// Result cache location; `None` uses the user cache directory
    pub cache_dir: Option<PathBuf>,
}

impl Config {
    /// Creates a configuration for `backend` with defaults everywhere else
    pub fn new(backend: BackendKind) -> Self {
        let policy = PollPolicy::default();
        Self {
            backend,
            openai_api_key: None,
            openai_base_url: None,
            openai_model: None,
            azure_endpoint: None,
            azure_api_key: None,
            azure_deployment: DEFAULT_AZURE_DEPLOYMENT.to_string(),
            azure_api_version: None,
            zapier_webhook_url: None,
            zapier_lens_urls: HashMap::new(),
            poll_interval: policy.poll_interval,
            max_wait: policy.max_wait,
            max_transient_retries: policy.max_transient_retries,
            cache_dir: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables (all optional):
    /// - LENS_BACKEND (openai, azure or zapier; default: openai)
    /// - OPENAI_API_KEY, OPENAI_BASE_URL, OPENAI_MODEL
    /// - AZURE_OPENAI_ENDPOINT, AZURE_OPENAI_API_KEY, AZURE_OPENAI_DEPLOYMENT,
    ///   AZURE_OPENAI_API_VERSION
    /// - ZAPIER_WEBHOOK_URL, ZAPIER_WEBHOOK_URL_<LENS> (e.g. ZAPIER_WEBHOOK_URL_CFO)
    /// - POLL_INTERVAL (seconds, default: 2)
    /// - MAX_WAIT (seconds, default: 1200)
    /// - MAX_TRANSIENT_RETRIES (default: 5)
    /// - LENS_CACHE_DIR (default: user cache dir + "/lens-navigator")
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `var`
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());

        let backend = match var("LENS_BACKEND") {
            Some(value) => value.parse()?,
            None => BackendKind::default(),
        };
        let mut config = Self::new(backend);

        config.openai_api_key = var("OPENAI_API_KEY");
        config.openai_base_url = var("OPENAI_BASE_URL");
        config.openai_model = var("OPENAI_MODEL");

        config.azure_endpoint = var("AZURE_OPENAI_ENDPOINT");
        config.azure_api_key = var("AZURE_OPENAI_API_KEY");
        if let Some(deployment) = var("AZURE_OPENAI_DEPLOYMENT") {
            config.azure_deployment = deployment;
        }
        config.azure_api_version = var("AZURE_OPENAI_API_VERSION");

        config.zapier_webhook_url = var("ZAPIER_WEBHOOK_URL");
        for lens in Lens::SINGLE.into_iter().chain([Lens::Unified]) {
            let key = format!("ZAPIER_WEBHOOK_URL_{}", lens.label().to_ascii_uppercase());
            if let Some(url) = var(&key) {
                config.zapier_lens_urls.insert(lens, url);
            }
        }

        if let Some(secs) = var("POLL_INTERVAL").and_then(|s| s.parse::<u64>().ok()) {
            config.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = var("MAX_WAIT").and_then(|s| s.parse::<u64>().ok()) {
            config.max_wait = Duration::from_secs(secs);
        }
        if let Some(retries) = var("MAX_TRANSIENT_RETRIES").and_then(|s| s.parse::<u32>().ok()) {
            config.max_transient_retries = retries;
        }
        config.cache_dir = var("LENS_CACHE_DIR").map(PathBuf::from);

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "poll_interval must be greater than 0".to_string(),
            ));
        }

        if self.max_wait < self.poll_interval {
            return Err(ConfigError::Invalid(
                "max_wait must be at least poll_interval".to_string(),
            ));
        }

        let urls = [
            ("OPENAI_BASE_URL", self.openai_base_url.as_deref()),
            ("AZURE_OPENAI_ENDPOINT", self.azure_endpoint.as_deref()),
            ("ZAPIER_WEBHOOK_URL", self.zapier_webhook_url.as_deref()),
        ];
        let lens_urls = self
            .zapier_lens_urls
            .values()
            .map(|url| ("ZAPIER_WEBHOOK_URL_<LENS>", Some(url.as_str())));

        for (name, url) in urls.into_iter().chain(lens_urls) {
            if let Some(url) = url {
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ConfigError::Invalid(format!(
                        "{} must start with http:// or https://",
                        name
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            poll_interval: self.poll_interval,
            max_wait: self.max_wait,
            max_transient_retries: self.max_transient_retries,
            ..PollPolicy::default()
        }
    }

    /// Builds the client for the selected backend
    pub fn build_backend(&self) -> Arc<dyn AnalysisBackend> {
        match self.backend {
            BackendKind::OpenAi => {
                let mut client = match &self.openai_base_url {
                    Some(base_url) => OpenAiClient::with_client(
                        base_url.clone(),
                        self.openai_api_key.clone(),
                        reqwest::Client::new(),
                    ),
                    None => OpenAiClient::new(self.openai_api_key.clone()),
                };
                if let Some(model) = &self.openai_model {
                    client = client.with_model(model.clone());
                }
                Arc::new(client)
            }
            BackendKind::Azure => {
                let mut client = AzureOpenAiClient::new(
                    self.azure_endpoint.clone().unwrap_or_default(),
                    self.azure_deployment.clone(),
                    self.azure_api_key.clone(),
                );
                if let Some(version) = &self.azure_api_version {
                    client = client.with_api_version(version.clone());
                }
                Arc::new(client)
            }
            BackendKind::Zapier => {
                let client = self.zapier_lens_urls.iter().fold(
                    ZapierClient::new(self.zapier_webhook_url.clone()),
                    |client, (lens, url)| client.with_lens_url(*lens, url.clone()),
                );
                Arc::new(client)
            }
        }
    }

    /// Resolved cache directory, if one can be determined
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.cache_dir
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join(CACHE_DIR_NAME)))
    }

    /// Opens the result cache
    ///
    /// Without any usable cache directory the cache lives in memory for the
    /// lifetime of the process.
    pub fn open_cache(&self) -> Result<ResultCache, ConfigError> {
        let Some(path) = self.cache_dir() else {
            warn!("No cache directory available; caching results in memory only");
            return Ok(ResultCache::new(Arc::new(MemoryStore::new())));
        };

        debug!("Opening result cache at {}", path.display());
        let store = FileStore::open(&path).map_err(|source| ConfigError::CacheDir {
            path: path.clone(),
            source,
        })?;
        Ok(ResultCache::new(Arc::new(store)))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(BackendKind::default())
    }
}

//! Run configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! YAML file, then environment variables and command-line flags (both handled
//! by [`crate::cli`]). The resulting [`PipelineConfig`] is validated once and
//! treated as read-only for the rest of the run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument};
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Which slice of history the stats dashboard should show.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    #[default]
    All,
    Month,
    Week,
}

impl Period {
    /// Label of the matching tab on the stats dashboard.
    pub fn label(&self) -> &'static str {
        match self {
            Period::All => "全期間",
            Period::Month => "月",
            Period::Week => "週",
        }
    }
}

/// Immutable snapshot of the parameters of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Upper bound on list pages to walk; `None` walks until the list ends.
    pub max_pages: Option<u32>,
    /// Upper bound on articles to open for enrichment; `None` enriches all.
    pub max_articles: Option<usize>,
    pub skip_details: bool,
    pub headless: bool,
    /// Pause before every browser interaction.
    #[serde(with = "seconds")]
    pub request_delay: Duration,
    /// Per-attempt timeout, also the login verification window.
    #[serde(with = "seconds")]
    pub timeout: Duration,
    /// Total attempts per browser interaction, first call included.
    pub max_retries: u32,
    /// Enrichment tasks queued against the browser at once.
    pub max_workers: usize,
    /// Linear back-off step between attempts.
    #[serde(with = "seconds")]
    pub retry_backoff: Duration,
    pub retry_jitter: bool,
    /// Login-marker and list-render poll interval.
    #[serde(with = "seconds")]
    pub verify_poll: Duration,
    /// How long the stats table may take to show new rows after a
    /// navigation or click.
    #[serde(with = "seconds")]
    pub render_wait: Duration,
    pub top_n: usize,
    pub period: Period,
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_pages: None,
            max_articles: None,
            skip_details: false,
            headless: false,
            request_delay: Duration::from_secs(2),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            max_workers: 1,
            retry_backoff: Duration::from_secs(1),
            retry_jitter: true,
            verify_poll: Duration::from_millis(500),
            render_wait: Duration::from_secs(10),
            top_n: 5,
            period: Period::All,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 {
            return Err(ConfigError::Invalid("max_retries must be at least 1".into()));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::Invalid("max_workers must be at least 1".into()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".into()));
        }
        if self.top_n == 0 {
            return Err(ConfigError::Invalid("top_n must be at least 1".into()));
        }
        if self.max_pages == Some(0) {
            return Err(ConfigError::Invalid("max_pages must be at least 1 when set".into()));
        }
        Ok(())
    }
}

/// Where the dashboard lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteProfile {
    pub base_url: String,
    pub login_path: String,
    pub stats_path: String,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            base_url: "https://note.com".to_string(),
            login_path: "/login".to_string(),
            stats_path: "/sitesettings/stats".to_string(),
        }
    }
}

impl SiteProfile {
    pub fn base(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.base_url)
    }

    pub fn login_url(&self) -> Result<Url, url::ParseError> {
        self.base()?.join(&self.login_path)
    }

    pub fn stats_url(&self) -> Result<Url, url::ParseError> {
        self.base()?.join(&self.stats_path)
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.username.trim().is_empty() || self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

/// Contents of the optional YAML config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub site: SiteProfile,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    /// Load `path` if given, otherwise start from defaults.
    #[instrument(level = "info")]
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml(&text)?;
        info!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Durations as (fractional) seconds in YAML.
mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.request_delay, Duration::from_secs(2));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.max_workers, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_retries() {
        let config = PipelineConfig {
            max_retries: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_zero_pages() {
        let config = PipelineConfig {
            max_pages: Some(0),
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_partial_override() {
        let yaml = r#"
site:
  base_url: "https://note.test"
pipeline:
  request_delay: 0.5
  max_pages: 4
  period: week
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.site.base_url, "https://note.test");
        assert_eq!(config.site.login_path, "/login");
        assert_eq!(config.pipeline.request_delay, Duration::from_millis(500));
        assert_eq!(config.pipeline.max_pages, Some(4));
        assert_eq!(config.pipeline.period, Period::Week);
        assert_eq!(config.pipeline.max_retries, 3);
    }

    #[test]
    fn test_yaml_negative_duration_is_rejected() {
        let yaml = "pipeline:\n  timeout: -1\n";
        assert!(matches!(AppConfig::from_yaml(yaml), Err(ConfigError::Yaml(_))));
    }

    #[test]
    fn test_site_urls() {
        let site = SiteProfile::default();
        assert_eq!(site.login_url().unwrap().as_str(), "https://note.com/login");
        assert_eq!(
            site.stats_url().unwrap().as_str(),
            "https://note.com/sitesettings/stats"
        );
    }

    #[test]
    fn test_credentials_debug_masks_password() {
        let creds = Credentials::new("writer@example.com", "hunter2");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("writer@example.com"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_blank_credentials() {
        assert!(Credentials::new("", "pw").is_blank());
        assert!(Credentials::new("user", "").is_blank());
        assert!(!Credentials::new("user", "pw").is_blank());
    }

    #[test]
    fn test_period_labels() {
        assert_eq!(Period::All.label(), "全期間");
        assert_eq!(Period::default(), Period::All);
    }
}

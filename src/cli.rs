//! Command-line interface definitions.
//!
//! Every option can also come from an environment variable; flags win over
//! the environment, which wins over the YAML config file.

use crate::config::{ConfigError, Credentials, Period, PipelineConfig};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Extract article statistics from the note creator dashboard.
///
/// # Examples
///
/// ```sh
/// # Headless run over the whole history, first 20 articles enriched
/// note_dashboard_extract extract --headless --max-articles 20
///
/// # Only the list, with an explicit config file
/// note_dashboard_extract extract --skip-details --config ./config.yaml -o ./out
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in, walk the stats list, enrich articles and write the outputs
    Extract(ExtractArgs),
    /// Print the program version
    Version,
}

#[derive(Args, Debug, Default)]
pub struct ExtractArgs {
    /// Account e-mail address
    #[arg(long, env = "NOTE_USERNAME", hide_env_values = true)]
    pub username: Option<String>,

    /// Account password
    #[arg(long, env = "NOTE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Run Chromium without a window
    #[arg(long, env = "HEADLESS")]
    pub headless: bool,

    /// Directory for the CSV, JSON, report and diagnostics
    #[arg(short, long, env = "OUTPUT_DIR")]
    pub output: Option<PathBuf>,

    /// Period shown on the stats dashboard
    #[arg(long, value_enum)]
    pub period: Option<Period>,

    /// Stop after this many list pages
    #[arg(long)]
    pub max_pages: Option<u32>,

    /// Open at most this many articles for enrichment
    #[arg(long)]
    pub max_articles: Option<usize>,

    /// Do not open article pages
    #[arg(long)]
    pub skip_details: bool,

    /// Debug logging
    #[arg(long)]
    pub debug: bool,

    /// Optional path to a config.yaml file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enrichment tasks queued for the browser at once
    #[arg(long, env = "MAX_WORKERS")]
    pub workers: Option<usize>,

    /// Seconds to wait before each request to the site
    #[arg(long, env = "REQUEST_DELAY")]
    pub request_delay: Option<f64>,

    /// Seconds before a single browser call is abandoned
    #[arg(long, env = "TIMEOUT")]
    pub timeout: Option<f64>,

    /// Total attempts per browser call
    #[arg(long, env = "MAX_RETRIES")]
    pub max_retries: Option<u32>,
}

fn seconds(name: &str, value: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(value).map_err(|e| {
        ConfigError::Invalid(format!("{name} must be a non-negative number of seconds: {e}"))
    })
}

impl ExtractArgs {
    /// Layer the flags that were given over `config`.
    pub fn apply(&self, config: &mut PipelineConfig) -> Result<(), ConfigError> {
        if self.headless {
            config.headless = true;
        }
        if self.skip_details {
            config.skip_details = true;
        }
        if let Some(dir) = &self.output {
            config.output_dir = dir.clone();
        }
        if let Some(period) = self.period {
            config.period = period;
        }
        if self.max_pages.is_some() {
            config.max_pages = self.max_pages;
        }
        if self.max_articles.is_some() {
            config.max_articles = self.max_articles;
        }
        if let Some(workers) = self.workers {
            config.max_workers = workers;
        }
        if let Some(retries) = self.max_retries {
            config.max_retries = retries;
        }
        if let Some(delay) = self.request_delay {
            config.request_delay = seconds("request delay", delay)?;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = seconds("timeout", timeout)?;
        }
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.username.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
        )
    }
}

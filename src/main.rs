//! # note Dashboard Extract
//!
//! Logs into the note creator dashboard with a real Chromium instance, walks
//! the paginated article statistics list, opens individual articles to fill
//! in what the list does not show, and writes CSV, JSON and Markdown
//! summaries of the result.
//!
//! ## Usage
//!
//! ```sh
//! export NOTE_USERNAME=me@example.com NOTE_PASSWORD=...
//! note_dashboard_extract extract --headless -o ./output
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Login**: authenticate through the login form and wait for a post-login marker
//! 2. **Listing**: read every row of every stats page, following "next" until the end or a budget
//! 3. **Enrichment**: open article pages for body text, publish date and missing counters
//! 4. **Output**: aggregate the records and write CSV, JSON and a Markdown report
//!
//! Every browser interaction goes through a single fetch gate that applies
//! pacing, a per-attempt timeout and bounded retries.

use chrono::Local;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod aggregator;
mod auth;
mod browser;
mod cli;
mod config;
mod diagnostics;
mod enricher;
mod errors;
mod gate;
mod models;
mod outputs;
mod pages;
mod paginator;
mod pipeline;
mod utils;

use browser::chrome::ChromeBrowser;
use cli::{Cli, Command, ExtractArgs};
use config::AppConfig;
use diagnostics::FileDiagnostics;
use pipeline::Pipeline;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    match args.command {
        Command::Version => {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Extract(extract) => {
            init_tracing(extract.debug);
            run_extract(extract).await
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let filter = if debug { EnvFilter::new("debug") } else { filter };
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();
}

async fn run_extract(args: ExtractArgs) -> Result<(), Box<dyn Error>> {
    let start_time = std::time::Instant::now();
    info!("note_dashboard_extract starting up");

    // ---- Configuration ----
    let app = AppConfig::load(args.config.as_deref())?;
    let mut config = app.pipeline;
    args.apply(&mut config)?;
    config.validate()?;
    let site = app.site;

    let credentials = args.credentials();
    info!(
        username = %credentials.username,
        base_url = %site.base_url,
        headless = config.headless,
        period = ?config.period,
        max_pages = ?config.max_pages,
        max_articles = ?config.max_articles,
        skip_details = config.skip_details,
        request_delay = ?config.request_delay,
        timeout = ?config.timeout,
        max_retries = config.max_retries,
        max_workers = config.max_workers,
        output_dir = %config.output_dir.display(),
        "Effective configuration"
    );
    if credentials.is_blank() {
        error!("No credentials; set NOTE_USERNAME and NOTE_PASSWORD or pass --username/--password");
        return Err("missing credentials".into());
    }

    // Early check: ensure output dir is writable before a browser is launched
    let output_dir = config.output_dir.clone();
    if let Err(e) = ensure_writable_dir(&output_dir).await {
        error!(
            path = %output_dir.display(),
            error = %e,
            "Output directory is not writable (fix perms or choose a different path)"
        );
        return Err(e);
    }

    // ---- Browser ----
    let browser = ChromeBrowser::launch(config.headless, config.timeout).await?;
    info!(headless = config.headless, "Browser launched");

    let diagnostics = Arc::new(FileDiagnostics::new(output_dir.clone()));
    let pipeline = Pipeline::new(config, site, diagnostics);

    let stop = pipeline.stop_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; finishing the current step and stopping");
            stop.stop();
        }
    });

    // ---- Run ----
    let output = match pipeline.run(browser, &credentials).await {
        Ok(output) => output,
        Err(e) => {
            error!(error = %e, "Extraction failed");
            return Err(e.into());
        }
    };
    debug!(
        records = output.records.len(),
        skipped = output.skipped_count(),
        "Pipeline returned"
    );

    if output.records.is_empty() {
        error!(
            skipped = output.skipped_count(),
            cancelled = output.cancelled,
            "No articles were extracted; nothing to write"
        );
        return Err("no articles extracted".into());
    }

    // ---- Outputs ----
    let artifacts = outputs::write_all(&output, &output_dir, Local::now()).await?;
    info!(
        articles = output.records.len(),
        skipped = output.skipped_count(),
        total_views = output.report.total_views,
        report = %artifacts.report.display(),
        "Extraction complete"
    );
    if output.cancelled {
        warn!("Run was interrupted; outputs contain the articles read before the stop");
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}

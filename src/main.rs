//! # Finance News Notify
//!
//! A bounded-batch pipeline that scrapes configured financial-news
//! publishers, filters to articles that are new and published on the run's
//! reference date, and delivers each one to a Telegram channel — photo with
//! caption when a validated image exists, plain text otherwise.
//!
//! ## Usage
//!
//! ```sh
//! TELEGRAM_TOKEN=123:abc TELEGRAM_CHAT_ID=@channel \
//!   finance_news_notify --sources sources.yml --state-dir /var/lib/fnn
//! ```
//!
//! ## Architecture
//!
//! One sequential pass per invocation:
//! 1. **Fetch**: download each source's listing page or feed (bounded retry)
//! 2. **Extract**: strategy per source kind (markup / feed / reader)
//! 3. **Filter**: cross-run dedup store, then date window
//! 4. **Deliver**: photo-first with text fallback, paced between sends
//! 5. **Persist**: the dedup store is rewritten after every delivery
//!
//! Configuration errors and unhandled failures exit non-zero after a
//! best-effort alert to the operator channel; per-source and per-article
//! failures are contained and logged.

use chrono::Utc;
use clap::Parser;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt as tfmt, EnvFilter};

mod cli;
mod config;
mod dates;
mod error;
mod extract;
mod fetch;
mod images;
mod models;
mod run;
mod state;
mod telegram;

use cli::Cli;
use dates::DateWindow;
use error::Error;
use run::RunContext;
use state::{FailureTracker, SentState};
use telegram::TelegramClient;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("finance_news_notify starting up");

    let args = Cli::parse();

    let http = fetch::build_client().map_err(|e| Error::Config(format!("HTTP client: {e}")))?;
    let telegram = TelegramClient::new(
        http.clone(),
        args.telegram_token.clone(),
        args.telegram_chat_id.clone(),
        args.alert_chat_id.clone(),
    )?;

    match run_pipeline(&args, http, telegram.clone()).await {
        Ok(()) => {
            let elapsed = start_time.elapsed();
            info!(secs = elapsed.as_secs(), "Execution complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Run failed");
            telegram
                .send_alert(&format!("🛑 finance_news_notify run failed: {e}"))
                .await;
            Err(e)
        }
    }
}

async fn run_pipeline(
    args: &Cli,
    http: reqwest::Client,
    telegram: TelegramClient,
) -> Result<(), Error> {
    let reference = args
        .reference_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let window = DateWindow {
        reference,
        lookback_days: args.lookback_days,
    };
    info!(reference_date = %reference, lookback_days = args.lookback_days, "Run window");

    let sources = config::load_sources(&args.sources)?;

    let state_dir = std::path::Path::new(&args.state_dir);
    std::fs::create_dir_all(state_dir)?;
    let sent = SentState::load(&state_dir.join("sent_articles.json"), reference)?;
    let failures = FailureTracker::load(&state_dir.join("fetch_failures.txt"))?;

    let mut ctx = RunContext {
        http,
        telegram,
        sent,
        failures,
        window,
        retry: fetch::RetryPolicy::default(),
        pacing: Duration::from_secs(args.pacing_secs),
        dry_run: args.dry_run,
    };

    let summary = ctx.run(&sources).await?;
    info!(delivered = summary.delivered, "Pipeline finished");
    Ok(())
}

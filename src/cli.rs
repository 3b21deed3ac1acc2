//! Command-line interface definitions.
//!
//! All options can be provided as flags; the Telegram credentials also fall
//! back to environment variables, which is how scheduled runs supply them.

use chrono::NaiveDate;
use clap::Parser;

/// Command-line arguments for the notifier.
///
/// # Examples
///
/// ```sh
/// # Normal scheduled run
/// finance_news_notify --sources sources.yml --state-dir /var/lib/fnn
///
/// # Reproduce a specific day without sending anything
/// finance_news_notify --reference-date 2026-02-12 --dry-run
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Path to the YAML source configuration file
    #[arg(short, long, default_value = "sources.yml")]
    pub sources: String,

    /// Directory holding the sent-articles store and the failure counter
    #[arg(long, default_value = ".")]
    pub state_dir: String,

    /// Reference date for filtering (YYYY-MM-DD); defaults to today in UTC
    #[arg(long)]
    pub reference_date: Option<NaiveDate>,

    /// Also deliver articles up to this many days before the reference date
    #[arg(long, default_value_t = 0)]
    pub lookback_days: u32,

    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    pub telegram_token: String,

    /// Target channel or chat identifier
    #[arg(long, env = "TELEGRAM_CHAT_ID")]
    pub telegram_chat_id: String,

    /// Distinct chat identifier for operator alerts
    #[arg(long, env = "TELEGRAM_ALERT_CHAT_ID")]
    pub alert_chat_id: Option<String>,

    /// Seconds to pause after every delivery attempt
    #[arg(long, default_value_t = 8)]
    pub pacing_secs: u64,

    /// Log would-be deliveries without sending or mutating state
    #[arg(long)]
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "finance_news_notify",
            "--telegram-token",
            "123:abc",
            "--telegram-chat-id",
            "@MorrocanFinancialNews",
        ]
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(base_args());
        assert_eq!(cli.sources, "sources.yml");
        assert_eq!(cli.state_dir, ".");
        assert_eq!(cli.lookback_days, 0);
        assert_eq!(cli.pacing_secs, 8);
        assert!(cli.reference_date.is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn test_cli_reference_date() {
        let mut args = base_args();
        args.extend(["--reference-date", "2026-02-12", "--dry-run"]);
        let cli = Cli::parse_from(args);
        assert_eq!(
            cli.reference_date,
            NaiveDate::from_ymd_opt(2026, 2, 12)
        );
        assert!(cli.dry_run);
    }

    #[test]
    fn test_cli_requires_credentials() {
        // Scrub the credential variables first so ambient values cannot
        // satisfy the required arguments: without flags and without env,
        // parsing must fail loudly.
        unsafe {
            std::env::remove_var("TELEGRAM_TOKEN");
            std::env::remove_var("TELEGRAM_CHAT_ID");
        }
        let result = Cli::try_parse_from(["finance_news_notify"]);
        assert!(result.is_err());
    }
}

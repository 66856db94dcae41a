//! Runtime configuration from flags, environment and `.env`

use chrono_tz::Tz;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

use crate::services::aggregator::{Aggregator, DEFAULT_PLATFORM_FEE_PERCENT};
use crate::services::dispatcher::DEFAULT_FETCH_TIMEOUT;
use crate::services::link_store::LinkStore;
use crate::services::revenue_client::{DEFAULT_BASE_URL, DEFAULT_TRANSACTION_LIMIT};
use crate::types::{Result, RevtrackError, WindowLabel};

pub const DEFAULT_TIMEZONE: &str = "Europe/Berlin";

#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Link store file [default: ~/.revtrack/links.json]
    #[arg(long, global = true, env = "REVTRACK_DATA_FILE")]
    pub data_file: Option<PathBuf>,

    /// IANA timezone that defines revenue days
    #[arg(long, global = true, env = "REVTRACK_TIMEZONE", default_value = DEFAULT_TIMEZONE)]
    pub timezone: String,

    /// OnlyMonster API base URL
    #[arg(long, global = true, env = "OM_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub api_base_url: String,

    /// OnlyMonster API token
    #[arg(long, global = true, env = "OM_API_TOKEN", hide_env_values = true)]
    pub api_token: Option<String>,

    /// Telegram bot token
    #[arg(long, global = true, env = "TG_BOT_TOKEN", hide_env_values = true)]
    pub bot_token: Option<String>,

    /// Per-account fetch timeout in seconds
    #[arg(long, global = true, env = "REVTRACK_FETCH_TIMEOUT_SECS", default_value_t = DEFAULT_FETCH_TIMEOUT.as_secs())]
    pub fetch_timeout_secs: u64,

    /// Platform fee deducted for net revenue (0-100)
    #[arg(long, global = true, env = "REVTRACK_PLATFORM_FEE_PERCENT", default_value_t = DEFAULT_PLATFORM_FEE_PERCENT)]
    pub platform_fee_percent: u32,

    /// Window covered by the scheduled daily report. It fires at the start
    /// of a new revenue day, so `yesterday` reports the day that just closed
    #[arg(long, global = true, env = "REVTRACK_DAILY_WINDOW", value_enum, default_value_t = WindowLabel::Today)]
    pub daily_window: WindowLabel,

    /// Maximum transactions requested per account
    #[arg(long, global = true, env = "REVTRACK_TRANSACTION_LIMIT", default_value_t = DEFAULT_TRANSACTION_LIMIT)]
    pub transaction_limit: u32,
}

/// Validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub data_file: PathBuf,
    pub timezone: Tz,
    pub api_base_url: String,
    pub api_token: Option<String>,
    pub bot_token: Option<String>,
    pub fetch_timeout: Duration,
    pub platform_fee_percent: u32,
    pub daily_window: WindowLabel,
    pub transaction_limit: u32,
}

impl ConfigArgs {
    pub fn resolve(&self) -> Result<Config> {
        let timezone: Tz = self.timezone.trim().parse().map_err(|_| {
            RevtrackError::Config(format!("unknown timezone `{}`", self.timezone))
        })?;

        if self.fetch_timeout_secs == 0 {
            return Err(RevtrackError::Config(
                "fetch timeout must be at least one second".into(),
            ));
        }
        if self.transaction_limit == 0 {
            return Err(RevtrackError::Config(
                "transaction limit must be positive".into(),
            ));
        }
        // Validates the fee range
        Aggregator::new(self.platform_fee_percent)?;

        let data_file = match &self.data_file {
            Some(path) => path.clone(),
            None => LinkStore::default_path()?,
        };

        Ok(Config {
            data_file,
            timezone,
            api_base_url: self.api_base_url.trim().to_string(),
            api_token: non_blank(&self.api_token),
            bot_token: non_blank(&self.bot_token),
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            platform_fee_percent: self.platform_fee_percent,
            daily_window: self.daily_window,
            transaction_limit: self.transaction_limit,
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

impl Config {
    pub fn require_api_token(&self) -> Result<&str> {
        self.api_token
            .as_deref()
            .ok_or_else(|| RevtrackError::Config("OM_API_TOKEN is not set".into()))
    }

    pub fn require_bot_token(&self) -> Result<&str> {
        self.bot_token
            .as_deref()
            .ok_or_else(|| RevtrackError::Config("TG_BOT_TOKEN is not set".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: ConfigArgs,
    }

    fn parse(args: &[&str]) -> ConfigArgs {
        let mut argv = vec!["revtrack"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().config
    }

    #[test]
    fn test_explicit_values() {
        let config = parse(&[
            "--data-file",
            "/tmp/links.json",
            "--timezone",
            "Europe/London",
            "--platform-fee-percent",
            "0",
            "--daily-window",
            "yesterday",
            "--api-token",
            "om",
            "--bot-token",
            "  ",
        ])
        .resolve()
        .unwrap();

        assert_eq!(config.data_file, PathBuf::from("/tmp/links.json"));
        assert_eq!(config.timezone, chrono_tz::Europe::London);
        assert_eq!(config.platform_fee_percent, 0);
        assert_eq!(config.daily_window, WindowLabel::Yesterday);
        assert_eq!(config.require_api_token().unwrap(), "om");
        assert!(config.require_bot_token().is_err());
    }

    #[test]
    fn test_daily_window_help_names_closed_day() {
        use clap::CommandFactory;

        let command = TestCli::command();
        let help = command
            .get_arguments()
            .find(|arg| arg.get_id() == "daily_window")
            .and_then(|arg| arg.get_help())
            .map(|help| help.to_string())
            .unwrap();
        assert!(help.contains("`yesterday` reports the day that just closed"));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let bad_tz = parse(&["--data-file", "x.json", "--timezone", "Mars/Olympus"]).resolve();
        assert!(matches!(bad_tz, Err(RevtrackError::Config(_))));

        let bad_fee = parse(&["--data-file", "x.json", "--platform-fee-percent", "150"]).resolve();
        assert!(matches!(bad_fee, Err(RevtrackError::Config(_))));

        let bad_timeout = parse(&["--data-file", "x.json", "--fetch-timeout-secs", "0"]).resolve();
        assert!(matches!(bad_timeout, Err(RevtrackError::Config(_))));
    }
}

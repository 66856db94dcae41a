use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

use crate::commands::CommandHandler;
use crate::config::{Config, ConfigArgs};
use crate::services::{
    Aggregator, AliasResolver, DailyScheduler, LinkStore, OnlyMonsterClient, RevenueCalendar,
    ReportDispatcher,
};
use crate::telegram::{self, TelegramClient};
use crate::types::{ChatId, RevtrackError, WindowLabel};

/// Creator revenue tracker with chat commands and daily reports
#[derive(Parser)]
#[command(name = "revtrack")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Telegram bot and the daily scheduler (default)
    Run,

    /// Print a revenue report for one chat
    Report {
        /// Chat id (group chats are negative)
        #[arg(allow_negative_numbers = true)]
        chat_id: ChatId,

        /// Nickname or account id to report on
        #[arg(long)]
        token: Option<String>,

        /// Revenue window
        #[arg(long, value_enum, default_value_t = WindowLabel::Today)]
        window: WindowLabel,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List linked accounts
    Links {
        /// Only this chat
        #[arg(allow_negative_numbers = true)]
        chat_id: Option<ChatId>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Send the scheduled report to every linked chat once
    DailyReport,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        let config = self.config.resolve()?;

        match self.command {
            None | Some(Commands::Run) => runtime()?.block_on(run_bot(config)),
            Some(Commands::Report {
                chat_id,
                token,
                window,
                json,
            }) => runtime()?.block_on(print_report(config, chat_id, token, window, json)),
            Some(Commands::Links { chat_id, json }) => print_links(&config, chat_id, json),
            Some(Commands::DailyReport) => runtime()?.block_on(daily_report(config)),
        }
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?)
}

fn build_dispatcher(config: &Config) -> anyhow::Result<Arc<ReportDispatcher>> {
    let store = LinkStore::open(&config.data_file)?;
    let source = OnlyMonsterClient::new(
        &config.api_base_url,
        config.require_api_token()?,
        config.fetch_timeout,
        config.transaction_limit,
    )?;
    let aggregator = Aggregator::new(config.platform_fee_percent)?;

    Ok(Arc::new(ReportDispatcher::new(
        Arc::new(store),
        Arc::new(source),
        RevenueCalendar::new(config.timezone),
        aggregator,
        config.fetch_timeout,
    )))
}

async fn run_bot(config: Config) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(&config)?;
    let telegram = Arc::new(TelegramClient::new(config.require_bot_token()?)?);

    if let Err(e) = telegram.set_my_commands().await {
        warn!(error = %e, "failed to register bot commands");
    }

    let handler = CommandHandler::new(dispatcher.clone());
    let scheduler = DailyScheduler::new(dispatcher, telegram.clone(), config.daily_window);

    info!(
        timezone = %config.timezone,
        data_file = %config.data_file.display(),
        daily_window = %config.daily_window,
        "revtrack started"
    );

    tokio::select! {
        _ = telegram::run_polling(&telegram, &handler) => {}
        _ = scheduler.run() => {}
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("shutting down");
        }
    }
    Ok(())
}

async fn print_report(
    config: Config,
    chat_id: ChatId,
    token: Option<String>,
    window: WindowLabel,
    json: bool,
) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(&config)?;
    let result = dispatcher
        .generate(chat_id, token.as_deref(), window, chrono::Utc::now())
        .await;

    let report = match result {
        Ok(report) => report,
        Err(RevtrackError::NotLinked) => {
            println!("{}", dispatcher.formatter().not_linked());
            return Ok(());
        }
        Err(RevtrackError::TokenNotFound(token)) => {
            let linked = AliasResolver::resolve_for_chat(dispatcher.store(), chat_id, None);
            println!("{}", dispatcher.formatter().token_not_found(&token, &linked));
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", dispatcher.formatter().report(&report));
    }
    Ok(())
}

fn print_links(config: &Config, chat_id: Option<ChatId>, json: bool) -> anyhow::Result<()> {
    let store = LinkStore::open(&config.data_file)?;
    let mut all = store.all();
    if let Some(chat_id) = chat_id {
        all.retain(|id, _| *id == chat_id);
    }

    if json {
        let flat: Vec<_> = all.values().flatten().collect();
        println!("{}", serde_json::to_string_pretty(&flat)?);
        return Ok(());
    }

    if all.is_empty() {
        println!("No linked accounts");
        return Ok(());
    }
    for (chat_id, links) in &all {
        println!("{}", chat_id);
        for link in links {
            println!(
                "  {:<9} {:<14} {:<8} {}",
                link.platform.as_str(),
                link.account_id,
                link.role.as_str(),
                link.nickname.as_deref().unwrap_or("-")
            );
        }
    }
    Ok(())
}

async fn daily_report(config: Config) -> anyhow::Result<()> {
    let dispatcher = build_dispatcher(&config)?;
    let telegram = TelegramClient::new(config.require_bot_token()?)?;

    let summary = dispatcher.run_daily(&telegram, config.daily_window).await;
    println!("Sent {} report(s), {} failed", summary.sent, summary.failed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::try_parse_from(["revtrack"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_parse_report_negative_chat() {
        let cli = Cli::try_parse_from([
            "revtrack",
            "report",
            "-1001234567890",
            "--token",
            "Maxes",
            "--window",
            "week",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Some(Commands::Report {
                chat_id,
                token,
                window,
                json,
            }) => {
                assert_eq!(chat_id, -1001234567890);
                assert_eq!(token.as_deref(), Some("Maxes"));
                assert_eq!(window, WindowLabel::Week);
                assert!(json);
            }
            _ => panic!("expected report command"),
        }
    }

    #[test]
    fn test_cli_parse_links_and_global_flags() {
        let cli = Cli::try_parse_from([
            "revtrack",
            "links",
            "--json",
            "--data-file",
            "/tmp/links.json",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Links {
                chat_id: None,
                json: true
            })
        ));
        assert_eq!(
            cli.config.data_file.as_deref(),
            Some(std::path::Path::new("/tmp/links.json"))
        );
    }

    #[test]
    fn test_cli_parse_daily_report() {
        let cli = Cli::try_parse_from(["revtrack", "daily-report"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::DailyReport)));
    }
}

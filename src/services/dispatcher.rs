//! Report orchestration: resolve, fetch, aggregate, format

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::services::aggregator::Aggregator;
use crate::services::alias::AliasResolver;
use crate::services::formatter::ReportFormatter;
use crate::services::link_store::LinkStore;
use crate::services::revenue_client::RevenueSource;
use crate::services::window::RevenueCalendar;
use crate::types::{
    AggregateReport, ChatId, Link, Result, RevenueWindow, RevtrackError, TransactionPage,
    WindowLabel,
};

/// Default per-account fetch timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Destination for pushed (unsolicited) messages
#[async_trait]
pub trait ChatOutput: Send + Sync {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<()>;
}

/// Outcome of one scheduled run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DailyRunSummary {
    pub sent: usize,
    pub failed: usize,
}

pub struct ReportDispatcher {
    store: Arc<LinkStore>,
    source: Arc<dyn RevenueSource>,
    calendar: RevenueCalendar,
    aggregator: Aggregator,
    formatter: ReportFormatter,
    fetch_timeout: Duration,
}

impl ReportDispatcher {
    pub fn new(
        store: Arc<LinkStore>,
        source: Arc<dyn RevenueSource>,
        calendar: RevenueCalendar,
        aggregator: Aggregator,
        fetch_timeout: Duration,
    ) -> Self {
        let formatter = ReportFormatter::new(calendar.timezone(), aggregator.applies_fee());
        Self {
            store,
            source,
            calendar,
            aggregator,
            formatter,
            fetch_timeout,
        }
    }

    pub fn store(&self) -> &LinkStore {
        &self.store
    }

    pub fn calendar(&self) -> &RevenueCalendar {
        &self.calendar
    }

    pub fn formatter(&self) -> &ReportFormatter {
        &self.formatter
    }

    /// Resolve the token and build the aggregate report for the window
    /// containing `now`.
    pub async fn generate(
        &self,
        chat_id: ChatId,
        token: Option<&str>,
        label: WindowLabel,
        now: DateTime<Utc>,
    ) -> Result<AggregateReport> {
        let token = token.map(str::trim).filter(|t| !t.is_empty());
        let links = AliasResolver::resolve_for_chat(&self.store, chat_id, token);

        if links.is_empty() {
            return Err(match token {
                Some(t) => RevtrackError::TokenNotFound(t.to_string()),
                None => RevtrackError::NotLinked,
            });
        }

        let window = self.calendar.window(label, now);
        debug!(chat_id, accounts = links.len(), %label, "building report");

        let results = self.fetch_all(links, &window).await;
        Ok(self.aggregator.aggregate(window, results))
    }

    /// Fetch every link concurrently. Each fetch is bounded by the
    /// configured timeout; results keep the order of `links`.
    async fn fetch_all(
        &self,
        links: Vec<Link>,
        window: &RevenueWindow,
    ) -> Vec<(Link, Result<TransactionPage>)> {
        let fetches = links.iter().map(|link| async move {
            match tokio::time::timeout(
                self.fetch_timeout,
                self.source.fetch(link.platform, &link.account_id, window),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(RevtrackError::UpstreamFetch(format!(
                    "timed out after {}s",
                    self.fetch_timeout.as_secs()
                ))),
            }
        });
        let results = join_all(fetches).await;

        links
            .into_iter()
            .zip(results)
            .inspect(|(link, result)| {
                if let Err(e) = result {
                    warn!(
                        platform = %link.platform,
                        account_id = %link.account_id,
                        error = %e,
                        "account unavailable"
                    );
                }
            })
            .collect()
    }

    /// Formatted report text for the current time
    pub async fn build_report(
        &self,
        chat_id: ChatId,
        token: Option<&str>,
        label: WindowLabel,
    ) -> Result<String> {
        let report = self.generate(chat_id, token, label, Utc::now()).await?;
        Ok(self.formatter.report(&report))
    }

    /// Push the combined report to every linked chat. One chat failing does
    /// not stop the others.
    pub async fn run_daily(&self, output: &dyn ChatOutput, label: WindowLabel) -> DailyRunSummary {
        self.run_daily_at(output, label, Utc::now()).await
    }

    pub async fn run_daily_at(
        &self,
        output: &dyn ChatOutput,
        label: WindowLabel,
        now: DateTime<Utc>,
    ) -> DailyRunSummary {
        let chats = self.store.chats();
        info!(chats = chats.len(), %label, "running daily report");

        let mut summary = DailyRunSummary::default();
        for chat_id in chats {
            let text = match self.generate(chat_id, None, label, now).await {
                Ok(report) => self.formatter.report(&report),
                Err(e) => {
                    if e.is_user_facing() {
                        // Links removed since the chat list was taken
                        debug!(chat_id, error = %e, "skipping daily report");
                    } else {
                        error!(chat_id, error = %e, "failed to build daily report");
                    }
                    summary.failed += 1;
                    continue;
                }
            };

            match output.send(chat_id, &text).await {
                Ok(()) => {
                    debug!(chat_id, "sent daily report");
                    summary.sent += 1;
                }
                Err(e) => {
                    error!(chat_id, error = %e, "failed to send daily report");
                    summary.failed += 1;
                }
            }
        }

        info!(sent = summary.sent, failed = summary.failed, "daily report finished");
        summary
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::types::Platform;
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use tempfile::TempDir;

    const CHAT: ChatId = -1001;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn setup(source: MockSource) -> (ReportDispatcher, TempDir) {
        let temp = TempDir::new().unwrap();
        let store = LinkStore::open(temp.path().join("links.json")).unwrap();
        store
            .put(Link::new(CHAT, Platform::OnlyFans, "454315739").with_nickname("Maxes"))
            .unwrap();
        store
            .put(Link::new(CHAT, Platform::OnlyFans, "987654321").with_nickname("Candi"))
            .unwrap();

        let dispatcher = ReportDispatcher::new(
            Arc::new(store),
            Arc::new(source),
            RevenueCalendar::new(Berlin),
            Aggregator::default(),
            Duration::from_millis(50),
        );
        (dispatcher, temp)
    }

    fn usd(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[tokio::test]
    async fn test_combined_report_includes_all_accounts() {
        let source = MockSource::default()
            .with("454315739", Canned::Transactions(subscriptions(8, "1176.20")))
            .with("987654321", Canned::Transactions(subscriptions(2, "300")));
        let (dispatcher, _temp) = setup(source);

        let report = dispatcher
            .generate(CHAT, None, WindowLabel::Today, now())
            .await
            .unwrap();

        assert_eq!(report.accounts.len(), 2);
        assert_eq!(report.combined_gross_in("USD"), usd("1476.20"));
        assert_eq!(report.combined_subscriber_count, 10);
        assert_eq!(report.window, dispatcher.calendar().today(now()));
    }

    #[tokio::test]
    async fn test_token_selects_single_account() {
        let (dispatcher, _temp) = setup(MockSource::default());

        let report = dispatcher
            .generate(CHAT, Some("maxes"), WindowLabel::Yesterday, now())
            .await
            .unwrap();

        assert_eq!(report.accounts.len(), 1);
        assert_eq!(report.accounts[0].link.display_name(), "Maxes");
        assert_eq!(report.window.label, WindowLabel::Yesterday);
    }

    #[tokio::test]
    async fn test_unknown_token_and_unlinked_chat() {
        let (dispatcher, _temp) = setup(MockSource::default());

        let err = dispatcher
            .generate(CHAT, Some("999"), WindowLabel::Today, now())
            .await
            .unwrap_err();
        assert!(matches!(err, RevtrackError::TokenNotFound(t) if t == "999"));

        let err = dispatcher
            .generate(42, None, WindowLabel::Today, now())
            .await
            .unwrap_err();
        assert!(matches!(err, RevtrackError::NotLinked));
    }

    #[tokio::test]
    async fn test_timeout_marks_account_unavailable() {
        let source = MockSource::default()
            .with("454315739", Canned::Transactions(subscriptions(8, "1176.20")))
            .with("987654321", Canned::Hang);
        let (dispatcher, _temp) = setup(source);

        let report = dispatcher
            .generate(CHAT, None, WindowLabel::Today, now())
            .await
            .unwrap();

        assert!(!report.accounts[0].is_unavailable());
        assert!(report.accounts[1].is_unavailable());
        assert_eq!(report.combined_gross_in("USD"), usd("1176.20"));
        assert_eq!(report.combined_subscriber_count, 8);
    }

    #[tokio::test]
    async fn test_run_daily_sends_to_every_chat() {
        let source = MockSource::default().with("454315739", Canned::Fail);
        let (dispatcher, _temp) = setup(source);
        dispatcher
            .store()
            .put(Link::new(7, Platform::Fansly, "1"))
            .unwrap();

        let output = RecordingOutput::default();
        let summary = dispatcher
            .run_daily_at(&output, WindowLabel::Today, now())
            .await;

        assert_eq!(summary, DailyRunSummary { sent: 2, failed: 0 });
        let sent = output.sent.lock().unwrap();
        let chats: Vec<ChatId> = sent.iter().map(|(c, _)| *c).collect();
        assert_eq!(chats, vec![CHAT, 7]);
        assert!(sent[0].1.contains("unavailable"));
    }

    #[tokio::test]
    async fn test_run_daily_continues_after_send_failure() {
        let (dispatcher, _temp) = setup(MockSource::default());
        dispatcher
            .store()
            .put(Link::new(7, Platform::Fansly, "1"))
            .unwrap();

        let output = RecordingOutput {
            fail_for: Some(CHAT),
            ..Default::default()
        };
        let summary = dispatcher
            .run_daily_at(&output, WindowLabel::Today, now())
            .await;

        assert_eq!(summary, DailyRunSummary { sent: 1, failed: 1 });
        assert_eq!(output.sent.lock().unwrap()[0].0, 7);
    }

    #[tokio::test]
    async fn test_build_report_formats_text() {
        let source =
            MockSource::default().with("454315739", Canned::Transactions(subscriptions(1, "50")));
        let (dispatcher, _temp) = setup(source);

        let text = dispatcher
            .build_report(CHAT, Some("Maxes"), WindowLabel::Week)
            .await
            .unwrap();

        assert!(text.contains("Weekly Revenue"));
        assert!(text.contains("$50.00"));
    }
}

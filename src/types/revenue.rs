//! Revenue types: windows, transactions and aggregated reports

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{Link, Platform, RevtrackError};

/// Which revenue window a report covers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WindowLabel {
    Today,
    Yesterday,
    Week,
}

impl WindowLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            WindowLabel::Today => "today",
            WindowLabel::Yesterday => "yesterday",
            WindowLabel::Week => "week",
        }
    }

    /// Report heading
    pub fn title(&self) -> &'static str {
        match self {
            WindowLabel::Today => "Today's Revenue",
            WindowLabel::Yesterday => "Yesterday's Revenue",
            WindowLabel::Week => "Weekly Revenue (Last 7 Days)",
        }
    }
}

impl fmt::Display for WindowLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WindowLabel {
    type Err = RevtrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "today" => Ok(WindowLabel::Today),
            "yesterday" => Ok(WindowLabel::Yesterday),
            "week" => Ok(WindowLabel::Week),
            other => Err(RevtrackError::InvalidArguments(format!(
                "unknown window `{}`",
                other
            ))),
        }
    }
}

/// A span of revenue days as absolute instants.
/// `end` is inclusive: the last nanosecond before the next window starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RevenueWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub label: WindowLabel,
}

impl RevenueWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }
}

/// Transaction category reported by the analytics source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    #[serde(alias = "new_subscription", alias = "subscribe", alias = "resubscription")]
    Subscription,
    Tip,
    Message,
    Post,
    Stream,
    Referral,
    #[default]
    #[serde(other)]
    Other,
}

impl TransactionKind {
    pub fn is_new_subscriber(&self) -> bool {
        matches!(self, TransactionKind::Subscription)
    }
}

/// One raw transaction for an account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub amount: Decimal,
    pub currency: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: TransactionKind,
}

/// Transactions returned by one fetch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPage {
    pub transactions: Vec<Transaction>,
    /// The source stopped at its item limit, so totals may be incomplete
    pub truncated: bool,
}

impl From<Vec<Transaction>> for TransactionPage {
    fn from(transactions: Vec<Transaction>) -> Self {
        Self {
            transactions,
            truncated: false,
        }
    }
}

/// Gross and net totals for one currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrencyTotal {
    pub currency: String,
    pub gross: Decimal,
    pub net: Decimal,
}

impl CurrencyTotal {
    pub fn zero(currency: impl Into<String>) -> Self {
        Self {
            currency: currency.into(),
            gross: Decimal::ZERO,
            net: Decimal::ZERO,
        }
    }

    pub fn add(&mut self, other: &CurrencyTotal) {
        self.gross += other.gross;
        self.net += other.net;
    }
}

/// Per-account totals for one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionSummary {
    pub account_id: String,
    pub platform: Platform,
    /// One entry per currency code, sorted by code. Empty when nothing was earned.
    pub totals: Vec<CurrencyTotal>,
    pub transaction_count: u64,
    pub new_subscriber_count: u64,
    /// Totals stop at the source's transaction limit
    pub truncated: bool,
}

impl TransactionSummary {
    pub fn empty(platform: Platform, account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            platform,
            totals: Vec::new(),
            transaction_count: 0,
            new_subscriber_count: 0,
            truncated: false,
        }
    }

    /// Gross total in `currency` (zero when the currency never occurred)
    pub fn gross_in(&self, currency: &str) -> Decimal {
        self.totals
            .iter()
            .find(|t| t.currency.eq_ignore_ascii_case(currency))
            .map(|t| t.gross)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Result of fetching one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum AccountOutcome {
    Fetched(TransactionSummary),
    Unavailable { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountReport {
    pub link: Link,
    pub outcome: AccountOutcome,
}

impl AccountReport {
    pub fn summary(&self) -> Option<&TransactionSummary> {
        match &self.outcome {
            AccountOutcome::Fetched(summary) => Some(summary),
            AccountOutcome::Unavailable { .. } => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self.outcome, AccountOutcome::Unavailable { .. })
    }
}

/// Combined report over every resolved account of a chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateReport {
    pub window: RevenueWindow,
    /// Resolution order, not sorted by amount
    pub accounts: Vec<AccountReport>,
    /// Per-currency totals over fetched accounts only
    pub combined: Vec<CurrencyTotal>,
    pub combined_subscriber_count: u64,
    pub combined_transaction_count: u64,
}

impl AggregateReport {
    pub fn unavailable_count(&self) -> usize {
        self.accounts.iter().filter(|a| a.is_unavailable()).count()
    }

    pub fn truncated_count(&self) -> usize {
        self.accounts
            .iter()
            .filter(|a| a.summary().is_some_and(|s| s.truncated))
            .count()
    }

    pub fn combined_gross_in(&self, currency: &str) -> Decimal {
        self.combined
            .iter()
            .find(|t| t.currency.eq_ignore_ascii_case(currency))
            .map(|t| t.gross)
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_window_contains_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 10, 23, 59, 59).unwrap();
        let window = RevenueWindow {
            start,
            end,
            label: WindowLabel::Today,
        };

        assert!(window.contains(start));
        assert!(window.contains(end));
        assert!(!window.contains(end + chrono::Duration::seconds(1)));
        assert!(!window.contains(start - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_transaction_kind_unknown_is_other() {
        let kind: TransactionKind = serde_json::from_str("\"chargeback\"").unwrap();
        assert_eq!(kind, TransactionKind::Other);
        assert!(!kind.is_new_subscriber());
    }

    #[test]
    fn test_transaction_kind_subscription_aliases() {
        let kind: TransactionKind = serde_json::from_str("\"new_subscription\"").unwrap();
        assert!(kind.is_new_subscriber());
    }

    #[test]
    fn test_window_label_parse() {
        assert_eq!("Yesterday".parse::<WindowLabel>().unwrap(), WindowLabel::Yesterday);
        assert!("month".parse::<WindowLabel>().is_err());
    }

    #[test]
    fn test_summary_gross_in_missing_currency_is_zero() {
        let summary = TransactionSummary::empty(Platform::OnlyFans, "1");
        assert_eq!(summary.gross_in("USD"), Decimal::ZERO);
    }
}

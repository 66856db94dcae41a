//! OnlyMonster analytics client
//!
//! Fetches raw transactions for one account over a revenue window. The
//! [`RevenueSource`] trait is the seam the dispatcher depends on, so tests
//! can substitute an in-memory source.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Url};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{
    Platform, Result, RevenueWindow, RevtrackError, Transaction, TransactionKind, TransactionPage,
    DEFAULT_CURRENCY,
};

pub const DEFAULT_BASE_URL: &str = "https://omapi.onlymonster.ai";
pub const DEFAULT_TRANSACTION_LIMIT: u32 = 500;
const AUTH_HEADER: &str = "x-om-auth-token";

/// Source of raw transactions for a linked account
#[async_trait]
pub trait RevenueSource: Send + Sync {
    async fn fetch(
        &self,
        platform: Platform,
        account_id: &str,
        window: &RevenueWindow,
    ) -> Result<TransactionPage>;
}

#[derive(Debug, Deserialize)]
struct TransactionsResponse {
    #[serde(default)]
    items: Option<Vec<ApiTransaction>>,
}

#[derive(Debug, Deserialize)]
struct ApiTransaction {
    #[serde(default)]
    amount: Option<Value>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<TransactionKind>,
}

impl ApiTransaction {
    fn into_transaction(self) -> Option<Transaction> {
        let amount = parse_amount(self.amount.as_ref()?)?;
        let currency = self
            .currency
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let timestamp = self
            .timestamp
            .as_deref()
            .or(self.created_at.as_deref())
            .and_then(parse_timestamp);

        Some(Transaction {
            amount,
            currency,
            timestamp,
            kind: self.kind.unwrap_or_default(),
        })
    }
}

fn parse_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .or_else(|_| Decimal::from_scientific(&n.to_string()))
            .ok(),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(e) => {
            debug!(timestamp = raw, error = %e, "ignoring unparseable transaction timestamp");
            None
        }
    }
}

/// Decode a transactions response body. A page holding `limit` items or
/// more is marked truncated.
fn parse_transactions(body: &str, account_id: &str, limit: u32) -> Result<TransactionPage> {
    let response: TransactionsResponse = serde_json::from_str(body).map_err(|e| {
        RevtrackError::UpstreamFetch(format!("invalid response for account {}: {}", account_id, e))
    })?;

    let items = response.items.unwrap_or_default();
    let total = items.len();
    let transactions: Vec<Transaction> = items
        .into_iter()
        .filter_map(ApiTransaction::into_transaction)
        .collect();

    if transactions.len() < total {
        warn!(
            account_id,
            skipped = total - transactions.len(),
            "skipped transactions without a usable amount"
        );
    }

    let truncated = total >= limit as usize;
    if truncated {
        warn!(
            account_id,
            limit, "transaction limit reached, totals may be incomplete"
        );
    }
    Ok(TransactionPage {
        transactions,
        truncated,
    })
}

/// Format an instant the way the API expects (`2024-06-15T23:00:00Z`)
fn api_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// HTTP client for the OnlyMonster API
pub struct OnlyMonsterClient {
    http_client: Client,
    base_url: Url,
    api_token: String,
    limit: u32,
}

impl OnlyMonsterClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        request_timeout: Duration,
        limit: u32,
    ) -> Result<Self> {
        let base_url = base_url.into();
        let base_url = Url::parse(base_url.trim()).map_err(|e| {
            RevtrackError::Config(format!("invalid API base URL `{}`: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RevtrackError::Config(format!(
                "API base URL `{}` cannot carry a path",
                base_url
            )));
        }

        let http_client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| RevtrackError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
            api_token: api_token.into(),
            limit,
        })
    }

    /// Account ids are pushed as single path segments, so `/`, `?` and `#`
    /// are percent-encoded instead of changing the request target.
    fn transactions_url(&self, platform: Platform, account_id: &str) -> Result<Url> {
        if matches!(account_id, "" | "." | "..") {
            return Err(RevtrackError::UpstreamFetch(format!(
                "invalid account id `{}`",
                account_id
            )));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RevtrackError::Config(format!(
                    "API base URL `{}` cannot carry a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .extend(["api", "v0", "platforms", platform.as_str(), "accounts"])
            .push(account_id)
            .push("transactions");
        Ok(url)
    }
}

#[async_trait]
impl RevenueSource for OnlyMonsterClient {
    async fn fetch(
        &self,
        platform: Platform,
        account_id: &str,
        window: &RevenueWindow,
    ) -> Result<TransactionPage> {
        let url = self.transactions_url(platform, account_id)?;
        let limit = self.limit.to_string();
        debug!(%platform, account_id, start = %window.start, end = %window.end, "fetching transactions");

        let response = self
            .http_client
            .get(url)
            .header(AUTH_HEADER, &self.api_token)
            .query(&[
                ("start", api_instant(window.start)),
                ("end", api_instant(window.end)),
                ("limit", limit),
            ])
            .send()
            .await
            .map_err(|e| RevtrackError::UpstreamFetch(format!("request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| RevtrackError::UpstreamFetch(format!("API error: {}", e)))?;

        let body = response
            .text()
            .await
            .map_err(|e| RevtrackError::UpstreamFetch(format!("failed to read response: {}", e)))?;

        parse_transactions(&body, account_id, self.limit)
    }
}

//! Aggregator service for computing revenue totals

use crate::types::{
    AccountOutcome, AccountReport, AggregateReport, CurrencyTotal, Link, Platform, Result,
    RevenueWindow, RevtrackError, Transaction, TransactionPage, TransactionSummary,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Platform fee deducted from gross revenue unless configured otherwise
pub const DEFAULT_PLATFORM_FEE_PERCENT: u32 = 20;

/// Aggregator for computing revenue statistics
#[derive(Debug, Clone, Copy)]
pub struct Aggregator {
    /// Fraction of gross that remains after the platform fee
    net_share: Decimal,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self {
            net_share: net_share(DEFAULT_PLATFORM_FEE_PERCENT),
        }
    }
}

fn net_share(fee_percent: u32) -> Decimal {
    (Decimal::ONE_HUNDRED - Decimal::from(fee_percent)) / Decimal::ONE_HUNDRED
}

impl Aggregator {
    pub fn new(fee_percent: u32) -> Result<Self> {
        if fee_percent > 100 {
            return Err(RevtrackError::Config(format!(
                "platform fee must be between 0 and 100 percent, got {}",
                fee_percent
            )));
        }
        Ok(Self {
            net_share: net_share(fee_percent),
        })
    }

    /// True when net differs from gross
    pub fn applies_fee(&self) -> bool {
        self.net_share != Decimal::ONE
    }

    /// Totals for one account (currency groups sorted by code).
    /// Transactions stamped outside the window are ignored.
    pub fn summarize(
        &self,
        platform: Platform,
        account_id: &str,
        window: &RevenueWindow,
        transactions: &[Transaction],
    ) -> TransactionSummary {
        let mut summary = TransactionSummary::empty(platform, account_id);
        let mut by_currency: BTreeMap<String, Decimal> = BTreeMap::new();

        for tx in transactions {
            if let Some(ts) = tx.timestamp {
                if !window.contains(ts) {
                    continue;
                }
            }

            *by_currency.entry(tx.currency.to_uppercase()).or_default() += tx.amount;
            summary.transaction_count = summary.transaction_count.saturating_add(1);
            if tx.kind.is_new_subscriber() {
                summary.new_subscriber_count = summary.new_subscriber_count.saturating_add(1);
            }
        }

        summary.totals = by_currency
            .into_iter()
            .map(|(currency, gross)| CurrencyTotal {
                currency,
                gross,
                net: gross * self.net_share,
            })
            .collect();
        summary
    }

    /// Build the combined report. Accounts keep the order of `results`;
    /// failed fetches become unavailable entries and are left out of the
    /// combined totals. Truncated pages are summed as far as they go and
    /// flagged on the account.
    pub fn aggregate(
        &self,
        window: RevenueWindow,
        results: Vec<(Link, Result<TransactionPage>)>,
    ) -> AggregateReport {
        let mut accounts = Vec::with_capacity(results.len());
        let mut combined: BTreeMap<String, CurrencyTotal> = BTreeMap::new();
        let mut combined_subscriber_count: u64 = 0;
        let mut combined_transaction_count: u64 = 0;

        for (link, result) in results {
            let outcome = match result {
                Ok(page) => {
                    let mut summary = self.summarize(
                        link.platform,
                        &link.account_id,
                        &window,
                        &page.transactions,
                    );
                    summary.truncated = page.truncated;

                    for total in &summary.totals {
                        combined
                            .entry(total.currency.clone())
                            .or_insert_with(|| CurrencyTotal::zero(total.currency.clone()))
                            .add(total);
                    }
                    combined_subscriber_count =
                        combined_subscriber_count.saturating_add(summary.new_subscriber_count);
                    combined_transaction_count =
                        combined_transaction_count.saturating_add(summary.transaction_count);

                    AccountOutcome::Fetched(summary)
                }
                Err(e) => AccountOutcome::Unavailable {
                    reason: e.to_string(),
                },
            };
            accounts.push(AccountReport { link, outcome });
        }

        AggregateReport {
            window,
            accounts,
            combined: combined.into_values().collect(),
            combined_subscriber_count,
            combined_transaction_count,
        }
    }
}

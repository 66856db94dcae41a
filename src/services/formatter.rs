//! Plain-text rendering of reports and command replies

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::Write;

use crate::services::link_store::LinkChange;
use crate::types::{
    AccountOutcome, AggregateReport, CurrencyTotal, Link, Platform, DEFAULT_CURRENCY,
};

const PERIOD_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Number of models that get a quick-access hint in the models list
const QUICK_ACCESS_HINTS: usize = 3;

/// Format number with thousand separators (e.g., 1234567 -> "1,234,567")
pub fn format_number(n: u64) -> String {
    group_digits(&n.to_string())
}

fn group_digits(digits: &str) -> String {
    let len = digits.len();
    let mut result = String::with_capacity(len + len / 3);

    // Digits are ASCII, so byte indexing is safe
    for (i, ch) in digits.bytes().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(ch as char);
    }

    result
}

/// Money with two decimals (half away from zero) and thousands separators.
/// USD, EUR and GBP get a symbol prefix; other codes are appended.
pub fn format_money(amount: Decimal, currency: &str) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let plain = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = plain.split_once('.').unwrap_or((plain.as_str(), "00"));
    let number = format!("{}.{}", group_digits(int_part), frac_part);

    let code = currency.to_uppercase();
    match code.as_str() {
        "USD" => format!("{}${}", sign, number),
        "EUR" => format!("{}€{}", sign, number),
        "GBP" => format!("{}£{}", sign, number),
        _ => format!("{}{} {}", sign, number, code),
    }
}

fn quote_list(links: &[Link]) -> String {
    links
        .iter()
        .map(|l| format!("\"{}\"", l.display_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders reports and replies for one reporting timezone
#[derive(Debug, Clone, Copy)]
pub struct ReportFormatter {
    tz: Tz,
    show_net: bool,
}

impl ReportFormatter {
    pub fn new(tz: Tz, show_net: bool) -> Self {
        Self { tz, show_net }
    }

    fn local(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.tz).format(PERIOD_FORMAT).to_string()
    }

    fn amount(&self, total: &CurrencyTotal) -> String {
        let gross = format_money(total.gross, &total.currency);
        if self.show_net {
            format!("{} (net {})", gross, format_money(total.net, &total.currency))
        } else {
            gross
        }
    }

    fn amounts(&self, totals: &[CurrencyTotal]) -> Vec<String> {
        if totals.is_empty() {
            return vec![self.amount(&CurrencyTotal::zero(DEFAULT_CURRENCY))];
        }
        totals.iter().map(|t| self.amount(t)).collect()
    }

    /// Combined report with a per-account breakdown
    pub fn report(&self, report: &AggregateReport) -> String {
        let mut msg = String::new();
        let _ = writeln!(msg, "📊 {}", report.window.label.title());
        msg.push('\n');

        if report.accounts.len() > 1 {
            let _ = writeln!(msg, "All models combined ({}):", report.accounts.len());
        }
        for amount in self.amounts(&report.combined) {
            let _ = writeln!(msg, "💰 Revenue: {}", amount);
        }
        let _ = writeln!(
            msg,
            "👥 New Subscribers: {}",
            format_number(report.combined_subscriber_count)
        );
        let _ = writeln!(
            msg,
            "🧾 Transactions: {}",
            format_number(report.combined_transaction_count)
        );
        msg.push('\n');
        let _ = writeln!(
            msg,
            "📅 Period: {} - {}",
            self.local(report.window.start),
            self.local(report.window.end)
        );

        msg.push('\n');
        for account in &report.accounts {
            let link = &account.link;
            let _ = writeln!(msg, "🎯 {} ({})", link.display_name(), link.platform.display_name());
            match &account.outcome {
                AccountOutcome::Fetched(summary) => {
                    let amounts = self.amounts(&summary.totals).join(" + ");
                    let _ = writeln!(
                        msg,
                        "   💰 {} | 👥 {} subs | 🧾 {}",
                        amounts,
                        format_number(summary.new_subscriber_count),
                        format_number(summary.transaction_count)
                    );
                    if summary.truncated {
                        let _ = writeln!(msg, "   ⚠️ partial: transaction limit reached");
                    }
                }
                AccountOutcome::Unavailable { .. } => {
                    let _ = writeln!(msg, "   ⚠️ unavailable");
                }
            }
        }

        let unavailable = report.unavailable_count();
        if unavailable > 0 {
            let _ = writeln!(
                msg,
                "\n⚠️ {} account(s) could not be fetched and are not included in the totals.",
                unavailable
            );
        }
        let truncated = report.truncated_count();
        if truncated > 0 {
            let _ = writeln!(
                msg,
                "\n⚠️ {} account(s) hit the transaction limit, so totals may be too low.",
                truncated
            );
        }

        msg.trim_end().to_string()
    }

    pub fn help(&self) -> String {
        let mut msg = String::from(
            "👋 Revenue tracker\n\n\
             Commands:\n\
             /link <platform> <account_id> [agency|chatter] [nickname] - Link a model to this chat\n\
             /unlink <nickname|account_id> - Remove one model\n\
             /unlink <platform> <account_id> - Remove one exact account\n\
             /unlink all - Remove every model\n\
             /today [model] - Today's revenue\n\
             /yesterday [model] - Yesterday's revenue\n\
             /week [model] - Last 7 days\n\
             /stats - Today's combined revenue\n\
             /models - List linked models\n\
             /help - Show this message\n\n",
        );
        let platforms: Vec<&str> = Platform::ALL.iter().map(|p| p.as_str()).collect();
        let _ = writeln!(msg, "Platforms: {}", platforms.join(", "));
        let _ = write!(
            msg,
            "A revenue day runs from 01:00 to 00:59. The daily report is sent at 01:00 ({}).",
            self.tz.name()
        );
        msg
    }

    pub fn link_usage(&self, detail: &str) -> String {
        format!(
            "❌ Invalid usage: {}\n\n\
             Usage: /link <platform> <account_id> [agency|chatter] [nickname]\n\n\
             Examples:\n\
             /link onlyfans 454315739 agency Maxes\n\
             /link fansly 123456",
            detail
        )
    }

    pub fn link_reply(&self, link: &Link, change: LinkChange, linked: &[Link]) -> String {
        let verb = match change {
            LinkChange::Added => "Added",
            LinkChange::Updated => "Updated",
        };
        let mut msg = format!(
            "✅ {} model {} ({}) on {} as {}\n\n",
            verb,
            link.display_name(),
            link.account_id,
            link.platform.display_name(),
            link.role
        );
        let _ = writeln!(msg, "Linked models ({}): {}", linked.len(), quote_list(linked));
        let _ = write!(
            msg,
            "\nUse /today for all models or /today {} for this one.",
            link.display_name()
        );
        msg
    }

    pub fn unlink_usage(&self, linked: &[Link]) -> String {
        let mut msg = String::from(
            "Usage: /unlink <nickname|account_id>, /unlink <platform> <account_id> or /unlink all",
        );
        if !linked.is_empty() {
            let _ = write!(msg, "\n\nLinked models: {}", quote_list(linked));
        }
        msg
    }

    pub fn unlink_reply(&self, removed: &[Link], remaining: &[Link]) -> String {
        let mut msg = format!("✅ Removed {}", quote_list(removed));
        if remaining.is_empty() {
            msg.push_str("\n\nNo models left in this chat. Use /link to add one.");
        } else {
            let _ = write!(
                msg,
                "\n\nRemaining models ({}): {}",
                remaining.len(),
                quote_list(remaining)
            );
        }
        msg
    }

    /// Numbered list of a chat's links with quick-access hints
    pub fn models(&self, linked: &[Link]) -> String {
        if linked.is_empty() {
            return self.not_linked();
        }

        let mut msg = format!("📋 Linked Models ({})\n\n", linked.len());
        for (idx, link) in linked.iter().enumerate() {
            let _ = writeln!(msg, "{}. {}", idx + 1, link.display_name());
            let _ = writeln!(msg, "   • Platform: {}", link.platform.display_name());
            let _ = writeln!(msg, "   • Account ID: {}", link.account_id);
            if let Some(nick) = link.nickname.as_deref().filter(|n| !n.trim().is_empty()) {
                let _ = writeln!(msg, "   • Nickname: {}", nick);
            }
            let _ = writeln!(msg, "   • Role: {}", link.role);
            msg.push('\n');
        }

        msg.push_str("Quick access:\n");
        for link in linked.iter().take(QUICK_ACCESS_HINTS) {
            let _ = writeln!(msg, "• /today {}", link.display_name());
        }
        if linked.len() > QUICK_ACCESS_HINTS {
            let _ = writeln!(msg, "• ... and {} more", linked.len() - QUICK_ACCESS_HINTS);
        }
        msg.push_str("• /today - all models combined");
        msg
    }

    pub fn not_linked(&self) -> String {
        "❌ This chat is not linked to any model yet.\n\n\
         Use /link <platform> <account_id> [agency|chatter] [nickname] to add one."
            .to_string()
    }

    pub fn token_not_found(&self, token: &str, linked: &[Link]) -> String {
        let mut msg = format!("❌ Model \"{}\" is not linked to this chat.", token);
        if !linked.is_empty() {
            let _ = write!(msg, "\n\nLinked models: {}", quote_list(linked));
            let _ = write!(
                msg,
                "\n\nUse /today for all models or /today {} for a specific one.",
                linked[0].display_name()
            );
        }
        msg
    }

    pub fn persistence_failure(&self) -> String {
        "⚠️ The change could not be saved. Please try again later.".to_string()
    }

    pub fn report_failure(&self) -> String {
        "⚠️ Could not build the report right now. Please try again later.".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::aggregator::Aggregator;
    use crate::types::{
        RevenueWindow, RevtrackError, Transaction, TransactionKind, TransactionPage, WindowLabel,
    };
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn window() -> RevenueWindow {
        RevenueWindow {
            start: Utc.with_ymd_and_hms(2024, 6, 14, 23, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 6, 15, 22, 59, 59).unwrap(),
            label: WindowLabel::Today,
        }
    }

    fn maxes() -> Link {
        Link::new(-1, Platform::OnlyFans, "454315739").with_nickname("Maxes")
    }

    fn candi() -> Link {
        Link::new(-1, Platform::OnlyFans, "987654321").with_nickname("Candi")
    }

    fn subs(n: usize, amount: &str) -> Vec<Transaction> {
        let mut txs: Vec<Transaction> = (0..n)
            .map(|_| Transaction {
                amount: Decimal::ZERO,
                currency: "USD".into(),
                timestamp: None,
                kind: TransactionKind::Subscription,
            })
            .collect();
        txs[0].amount = dec(amount);
        txs
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_format_money_symbols_and_codes() {
        assert_eq!(format_money(dec("1176.2"), "USD"), "$1,176.20");
        assert_eq!(format_money(dec("0"), "eur"), "€0.00");
        assert_eq!(format_money(dec("12.5"), "GBP"), "£12.50");
        assert_eq!(format_money(dec("1500"), "CHF"), "1,500.00 CHF");
    }

    #[test]
    fn test_format_money_rounds_half_away_from_zero() {
        assert_eq!(format_money(dec("2.345"), "USD"), "$2.35");
        assert_eq!(format_money(dec("2.344"), "USD"), "$2.34");
        assert_eq!(format_money(dec("-2.345"), "USD"), "-$2.35");
        assert_eq!(format_money(dec("-0.001"), "USD"), "$0.00");
    }

    #[test]
    fn test_report_partial_failure() {
        let report = Aggregator::default().aggregate(
            window(),
            vec![
                (maxes(), Ok(subs(8, "1176.20").into())),
                (candi(), Err(RevtrackError::UpstreamFetch("timed out".into()))),
            ],
        );
        let text = ReportFormatter::new(Berlin, false).report(&report);

        assert!(text.contains("Today's Revenue"));
        assert!(text.contains("$1,176.20"));
        assert!(text.contains("New Subscribers: 8"));
        assert!(text.contains("🎯 Candi (OnlyFans)\n   ⚠️ unavailable"));
        assert!(text.contains("1 account(s) could not be fetched"));
        assert!(!text.contains("timed out"));
    }

    #[test]
    fn test_report_period_in_local_time_and_net() {
        let report = Aggregator::default().aggregate(window(), vec![(maxes(), Ok(subs(1, "100").into()))]);
        let text = ReportFormatter::new(Berlin, true).report(&report);

        assert!(text.contains("📅 Period: 15.06.2024 01:00 - 16.06.2024 00:59"));
        assert!(text.contains("$100.00 (net $80.00)"));
        assert!(!text.contains("combined"));
    }

    #[test]
    fn test_report_zero_data_shows_zero_amount() {
        let report = Aggregator::default().aggregate(window(), vec![(maxes(), Ok(TransactionPage::default()))]);
        let text = ReportFormatter::new(Berlin, false).report(&report);

        assert!(text.contains("💰 Revenue: $0.00"));
        assert!(text.contains("$0.00 | 👥 0 subs | 🧾 0"));
        assert!(!text.contains("unavailable"));
        assert!(!text.contains("partial"));
    }

    #[test]
    fn test_report_marks_truncated_account() {
        let page = TransactionPage {
            transactions: subs(3, "250"),
            truncated: true,
        };
        let report = Aggregator::default().aggregate(
            window(),
            vec![(maxes(), Ok(page)), (candi(), Ok(subs(1, "50").into()))],
        );
        let text = ReportFormatter::new(Berlin, false).report(&report);

        assert!(text.contains("$250.00 | 👥 3 subs | 🧾 3\n   ⚠️ partial: transaction limit reached"));
        assert!(text.contains("1 account(s) hit the transaction limit"));
        assert!(text.contains("💰 Revenue: $300.00"));
    }

    #[test]
    fn test_models_list_with_hints() {
        let linked = vec![
            maxes(),
            candi(),
            Link::new(-1, Platform::Fansly, "3"),
            Link::new(-1, Platform::Fansly, "4"),
        ];
        let text = ReportFormatter::new(Berlin, false).models(&linked);

        assert!(text.starts_with("📋 Linked Models (4)"));
        assert!(text.contains("1. Maxes"));
        assert!(text.contains("• /today Candi"));
        assert!(text.contains("• /today 3"));
        assert!(!text.contains("• /today 4"));
        assert!(text.contains("... and 1 more"));
    }

    #[test]
    fn test_token_not_found_lists_hints() {
        let text = ReportFormatter::new(Berlin, false).token_not_found("999", &[maxes(), candi()]);
        assert!(text.contains("\"999\""));
        assert!(text.contains("\"Maxes\", \"Candi\""));
    }

    #[test]
    fn test_link_and_unlink_replies() {
        let fmt = ReportFormatter::new(Berlin, false);
        let added = fmt.link_reply(&maxes(), LinkChange::Added, &[maxes(), candi()]);
        assert!(added.starts_with("✅ Added model Maxes (454315739) on OnlyFans as agency"));
        assert!(added.contains("Linked models (2)"));

        let updated = fmt.link_reply(&maxes(), LinkChange::Updated, &[maxes()]);
        assert!(updated.starts_with("✅ Updated"));

        assert!(fmt.unlink_reply(&[maxes()], &[]).contains("No models left"));
        assert!(fmt
            .unlink_reply(&[maxes()], &[candi()])
            .contains("Remaining models (1): \"Candi\""));
    }
}

//! Revenue-day calendar
//!
//! A revenue day runs from 01:00:00 local time to 00:59:59.999999999 the
//! following calendar day. All returned instants are UTC so comparisons and
//! API calls do not depend on the host timezone.

use chrono::{DateTime, Days, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::types::{Result, RevenueWindow, RevtrackError, WindowLabel};

/// Local hour at which a revenue day starts
pub const DAY_BOUNDARY_HOUR: u32 = 1;

/// Number of complete revenue days in the weekly window
const WEEK_DAYS: u64 = 7;

/// Computes revenue-day windows in a reporting timezone
#[derive(Debug, Clone, Copy)]
pub struct RevenueCalendar {
    tz: Tz,
    boundary: NaiveTime,
}

impl RevenueCalendar {
    /// Calendar with the standard 01:00 boundary
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            boundary: NaiveTime::MIN + Duration::hours(DAY_BOUNDARY_HOUR as i64),
        }
    }

    pub fn with_boundary_hour(tz: Tz, hour: u32) -> Result<Self> {
        let boundary = NaiveTime::from_hms_opt(hour, 0, 0).ok_or_else(|| {
            RevtrackError::Config(format!("day boundary hour out of range: {}", hour))
        })?;
        Ok(Self { tz, boundary })
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    /// Calendar date on which the revenue day containing `now` started
    pub fn revenue_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let local = now.with_timezone(&self.tz);
        let date = local.date_naive();
        if local.time() < self.boundary {
            date.checked_sub_days(Days::new(1)).unwrap_or(date)
        } else {
            date
        }
    }

    /// Start of the revenue day that begins on `date`
    pub fn day_start(&self, date: NaiveDate) -> DateTime<Utc> {
        resolve_local(self.tz, date.and_time(self.boundary))
    }

    /// Inclusive [start, end] of the revenue day that begins on `date`
    pub fn day_range(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
        let start = self.day_start(date);
        let end = self.day_start(next) - Duration::nanoseconds(1);
        (start, end)
    }

    /// Revenue day containing `now`
    pub fn today(&self, now: DateTime<Utc>) -> RevenueWindow {
        let (start, end) = self.day_range(self.revenue_date(now));
        RevenueWindow {
            start,
            end,
            label: WindowLabel::Today,
        }
    }

    /// Revenue day immediately preceding `today(now)`
    pub fn yesterday(&self, now: DateTime<Utc>) -> RevenueWindow {
        let today = self.revenue_date(now);
        let date = today.checked_sub_days(Days::new(1)).unwrap_or(today);
        let (start, end) = self.day_range(date);
        RevenueWindow {
            start,
            end,
            label: WindowLabel::Yesterday,
        }
    }

    /// The last seven complete revenue days, ending with yesterday
    pub fn last_week(&self, now: DateTime<Utc>) -> RevenueWindow {
        let yesterday = self.yesterday(now);
        let today = self.revenue_date(now);
        let first = today.checked_sub_days(Days::new(WEEK_DAYS)).unwrap_or(today);
        RevenueWindow {
            start: self.day_start(first),
            end: yesterday.end,
            label: WindowLabel::Week,
        }
    }

    pub fn window(&self, label: WindowLabel, now: DateTime<Utc>) -> RevenueWindow {
        match label {
            WindowLabel::Today => self.today(now),
            WindowLabel::Yesterday => self.yesterday(now),
            WindowLabel::Week => self.last_week(now),
        }
    }

    /// Next day boundary strictly after `now` (when the daily report fires)
    pub fn next_trigger(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.today(now).end + Duration::nanoseconds(1)
    }
}

/// Map a local wall-clock time to UTC.
///
/// Ambiguous times (DST fall-back) take the earlier instant. Times inside a
/// spring-forward gap move to the first valid minute after the gap.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        LocalResult::None => {
            let mut probe = naive;
            // Gaps are at most a few hours
            for _ in 0..(24 * 60) {
                probe += Duration::minutes(1);
                if let Some(dt) = tz.from_local_datetime(&probe).earliest() {
                    return dt.with_timezone(&Utc);
                }
            }
            naive.and_utc()
        }
    }
}

//! Daily report trigger

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::services::dispatcher::{ChatOutput, ReportDispatcher};
use crate::services::window::RevenueCalendar;
use crate::types::WindowLabel;

/// Fires the daily report at every revenue-day boundary
pub struct DailyScheduler {
    dispatcher: Arc<ReportDispatcher>,
    output: Arc<dyn ChatOutput>,
    label: WindowLabel,
}

/// Boundary the scheduler waits for next.
///
/// The sleep runs on the monotonic clock while boundaries are wall-clock
/// instants, so a wake-up can land a few milliseconds before the boundary it
/// fired for. Counting from the later of `now` and the last fired boundary
/// keeps that boundary from firing twice.
pub(crate) fn following_trigger(
    calendar: &RevenueCalendar,
    now: DateTime<Utc>,
    last_fired: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    let from = last_fired.map_or(now, |fired| fired.max(now));
    calendar.next_trigger(from)
}

impl DailyScheduler {
    pub fn new(
        dispatcher: Arc<ReportDispatcher>,
        output: Arc<dyn ChatOutput>,
        label: WindowLabel,
    ) -> Self {
        Self {
            dispatcher,
            output,
            label,
        }
    }

    /// Run forever. The next trigger is recomputed after every run, so a
    /// slow run or a DST change never causes drift.
    pub async fn run(&self) {
        let calendar = self.dispatcher.calendar();
        let mut last_fired = None;

        loop {
            let now = Utc::now();
            let next = following_trigger(calendar, now, last_fired);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(
                next = %next.with_timezone(&calendar.timezone()),
                "next daily report scheduled"
            );

            tokio::time::sleep(wait).await;

            // Windows are taken at the boundary even after an early wake-up
            let at = Utc::now().max(next);
            self.dispatcher
                .run_daily_at(self.output.as_ref(), self.label, at)
                .await;
            last_fired = Some(next);
        }
    }
}

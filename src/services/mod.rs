//! Services for revenue collection, aggregation and reporting

pub mod aggregator;
pub mod alias;
pub mod dispatcher;
pub mod formatter;
pub mod link_store;
pub mod revenue_client;
pub mod scheduler;
pub mod window;

pub use aggregator::Aggregator;
pub use alias::AliasResolver;
pub use dispatcher::{ChatOutput, DailyRunSummary, ReportDispatcher};
pub use formatter::ReportFormatter;
pub use link_store::{LinkChange, LinkStore};
pub use revenue_client::{OnlyMonsterClient, RevenueSource};
pub use scheduler::DailyScheduler;
pub use window::RevenueCalendar;

//! Recurring rule store — cron/calendar scheduling that expands rules into Jobs.
//!
//! Each rule is persisted to its own `data/rules/<id>.json` file. The
//! scheduler's recurring dispatcher polls `RuleStore::due_rules` on the
//! interval configured by `SchedulerConfig::poll_interval_secs`.
//!
//! Split into submodules for maintainability:
//! - [`model`] — view types and change events layered on `sa_domain::RecurringRule`
//! - [`cron`] — timezone-aware cron evaluation and pattern-to-fire-time dispatch
//! - [`validation`] — input validation (cron expressions, timezones)
//! - [`store`] — persistent `RuleStore` with event broadcasting

pub mod cron;
pub mod model;
pub mod store;
pub mod validation;

// Re-export the public API so existing `use crate::runtime::schedules::X` imports still work.
pub use cron::{
    cron_matches, cron_next, cron_next_n, cron_next_n_tz, cron_next_tz, next_fire, parse_tz,
};
pub use model::{computed_status, to_view, RecurringRuleView, RuleEvent, RuleStatus};
pub use store::RuleStore;
pub use validation::{validate_cron, validate_timezone};

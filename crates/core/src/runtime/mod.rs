//! Core runtime — the C2/C3/C4 services and the recurring-rule support
//! modules the C5 scheduler is built from.

pub mod cancel;
pub mod executor;
pub mod history;
pub mod schedules;

//! Shared domain types for the content automation scheduling core.
//!
//! Holds the configuration aggregate and the error type used across
//! the job store, executor, calendar, and scheduler.

pub mod config;
pub mod content_slot;
pub mod error;
pub mod job;
pub mod recurring_rule;

pub use content_slot::ContentSlot;
pub use error::{Error, Result};
pub use job::{Artifacts, Job, JobKind, Stage};
pub use recurring_rule::{MissedPolicy, Pattern, RecurringRule};

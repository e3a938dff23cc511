use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recurring content schedule: C1's `next_fire` walks `pattern`
/// forward from `next_fire_at` to produce one-shot jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurringRule {
    pub id: Uuid,
    pub name: String,

    /// Token-substitution template for each generated job's topic,
    /// e.g. `"Weekly recap - {weekday}, {date}"`.
    pub topic_template: String,

    pub pattern: Pattern,
    pub timezone: String,

    #[serde(default)]
    pub missed_policy: MissedPolicy,

    #[serde(default)]
    pub paused: bool,

    #[serde(default)]
    pub last_fired_at: Option<DateTime<Utc>>,
    pub next_fire_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub run_count: u32,
    #[serde(default)]
    pub failure_count: u32,

    pub created_at: DateTime<Utc>,

    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    1
}

/// How a rule reacts when its `next_fire_at` is discovered well after
/// it should have fired — e.g. the process was down for a while.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissedPolicy {
    /// Drop missed windows; resume from the next future fire.
    #[default]
    Skip,
    /// Fire exactly once to catch up, regardless of how many windows
    /// were missed.
    RunOnce,
    /// Fire once per missed window, oldest first.
    CatchUp,
}

/// The recurrence rule itself. `Weekly` and `Monthly` are calendar
/// patterns evaluated against `timezone`; `Cron` parses a standard
/// 5-field expression (minute hour dom month dow, 0 = Sunday).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Pattern {
    Daily { time: NaiveTime },
    Weekly { time: NaiveTime, days: Vec<Weekday> },
    Monthly { day_of_month: u32, time: NaiveTime },
    Interval { every_minutes: i64 },
    Cron { expression: String },
}

impl RecurringRule {
    /// Exponential cooldown after consecutive failures, capped at 24h.
    ///
    /// `cooldown = min(base_minutes * 2^failure_count, 1440)`. This is
    /// independent of the executor's per-attempt retry strategy and the
    /// scheduler's per-job stage-retry reschedule — it only delays the
    /// *next expansion* of a rule that keeps producing failing jobs.
    pub fn cooldown_minutes(&self, base_minutes: u32) -> u32 {
        let scaled = (base_minutes as u64) * 2u64.pow(self.failure_count.min(16));
        scaled.min(1440) as u32
    }

    pub fn record_success(&mut self, fired_at: DateTime<Utc>) {
        self.last_fired_at = Some(fired_at);
        self.run_count += 1;
        self.failure_count = 0;
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
    }

    /// Render `topic_template`, substituting the token grammar below
    /// against `at` (already converted to the rule's local time by the
    /// caller). Unknown tokens are left untouched.
    pub fn render_topic(&self, at: DateTime<Utc>) -> String {
        substitute_tokens(&self.topic_template, at)
    }
}

/// Token substitution, mirroring the original scheduler's
/// `_format_topic`: unknown `{...}` tokens are left as-is.
///
/// `{date}` ISO date, `{time}` 24h HH:MM, `{datetime}` `YYYY-MM-DD HH:MM`,
/// `{year}`, `{month}` (English name), `{month_num}` (1-12), `{day}`
/// (1-31), `{weekday}` (English name), `{week_number}` (ISO week),
/// `{timestamp}` (Unix seconds).
pub fn substitute_tokens(template: &str, at: DateTime<Utc>) -> String {
    template
        .replace("{datetime}", &at.format("%Y-%m-%d %H:%M").to_string())
        .replace("{date}", &at.format("%Y-%m-%d").to_string())
        .replace("{time}", &at.format("%H:%M").to_string())
        .replace("{weekday}", &at.format("%A").to_string())
        .replace("{month_num}", &at.format("%-m").to_string())
        .replace("{month}", &at.format("%B").to_string())
        .replace("{day}", &at.format("%-d").to_string())
        .replace("{year}", &at.format("%Y").to_string())
        .replace("{week_number}", &at.format("%V").to_string())
        .replace("{timestamp}", &at.timestamp().to_string())
}

//! View types and change events layered on top of `sa_domain::RecurringRule`.
//!
//! The persisted entity lives in `sa_domain`; this module adds the
//! runtime-only `status` field (derived, never stored) and the
//! broadcast event shape the store emits on every mutation.

use sa_domain::RecurringRule;
use serde::Serialize;
use uuid::Uuid;

/// Derived from `paused` + `failure_count`, never persisted directly.
#[derive(Clone, Copy, Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Active,
    Paused,
    Error,
}

pub fn computed_status(rule: &RecurringRule) -> RuleStatus {
    if rule.paused {
        RuleStatus::Paused
    } else if rule.failure_count > 0 {
        RuleStatus::Error
    } else {
        RuleStatus::Active
    }
}

/// API-facing view that includes the computed `status` field.
#[derive(Clone, Debug, Serialize)]
pub struct RecurringRuleView {
    #[serde(flatten)]
    pub rule: RecurringRule,
    pub status: RuleStatus,
}

pub fn to_view(rule: &RecurringRule) -> RecurringRuleView {
    RecurringRuleView {
        status: computed_status(rule),
        rule: rule.clone(),
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleEvent {
    RuleUpdated { rule: RecurringRuleView },
    RuleFired { rule_id: Uuid, job_id: Uuid },
    RuleFailed { rule_id: Uuid, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sa_domain::{MissedPolicy, Pattern};

    fn test_rule(paused: bool, failure_count: u32) -> RecurringRule {
        RecurringRule {
            id: Uuid::new_v4(),
            name: "test".into(),
            topic_template: "{date}".into(),
            pattern: Pattern::Daily {
                time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            },
            timezone: "UTC".into(),
            missed_policy: MissedPolicy::default(),
            paused,
            last_fired_at: None,
            next_fire_at: None,
            run_count: 0,
            failure_count,
            created_at: Utc::now(),
            schema_version: 1,
        }
    }

    #[test]
    fn computed_status_active() {
        assert_eq!(computed_status(&test_rule(false, 0)), RuleStatus::Active);
    }

    #[test]
    fn computed_status_paused() {
        assert_eq!(computed_status(&test_rule(true, 0)), RuleStatus::Paused);
    }

    #[test]
    fn computed_status_error() {
        assert_eq!(computed_status(&test_rule(false, 2)), RuleStatus::Error);
    }

    #[test]
    fn paused_trumps_error() {
        assert_eq!(computed_status(&test_rule(true, 5)), RuleStatus::Paused);
    }

    #[test]
    fn to_view_includes_status() {
        let rule = test_rule(false, 1);
        let view = to_view(&rule);
        assert_eq!(view.status, RuleStatus::Error);
        assert_eq!(view.rule.id, rule.id);
    }
}

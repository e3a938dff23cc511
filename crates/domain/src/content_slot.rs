use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A reserved publishing slot on the content calendar.
///
/// Slots are the unit C4 reasons about; a `Job` that has been given a
/// publish time references its slot by `id` via `Job::slot_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentSlot {
    pub id: Uuid,
    #[serde(default)]
    pub job_id: Option<Uuid>,
    pub topic: String,
    pub scheduled_at: DateTime<Utc>,
    pub duration_minutes: u32,
    pub created_at: DateTime<Utc>,

    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    1
}

impl ContentSlot {
    pub fn new(topic: impl Into<String>, scheduled_at: DateTime<Utc>, duration_minutes: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: None,
            topic: topic.into(),
            scheduled_at,
            duration_minutes,
            created_at: Utc::now(),
            schema_version: default_schema_version(),
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + chrono::Duration::minutes(self.duration_minutes as i64)
    }
}

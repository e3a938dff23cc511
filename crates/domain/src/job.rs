use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a job came from, carried through so collaborators and views
/// can tell a one-off request from a rule's expansion or a batch member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    SingleVideo,
    RecurringChild,
    BatchMember,
    Manual,
}

/// Outputs accumulated across pipeline stages. Populated incrementally
/// as each stage's collaborator call completes; read by the next
/// stage's request and, once `Upload` settles, by callers polling for
/// the finished remote location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Artifacts {
    pub script_text: Option<String>,
    pub script_title: Option<String>,
    pub script_description: Option<String>,
    pub media_path: Option<PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
    pub remote_id: Option<String>,
    pub remote_url: Option<String>,
}

/// A single content-production job moving through the pipeline.
///
/// `schema_version` lets the store recognize and migrate entities
/// written by an older binary; it is bumped whenever a breaking field
/// change lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub topic: String,
    pub stage: Stage,

    #[serde(default = "default_job_kind")]
    pub kind: JobKind,

    /// Set when this job was produced by a recurring rule's expansion.
    #[serde(default)]
    pub rule_id: Option<Uuid>,

    /// Calendar reservation backing this job's publish time, if any.
    #[serde(default)]
    pub slot_id: Option<Uuid>,

    pub scheduled_at: DateTime<Utc>,

    /// When to publish on the remote platform, if different from the
    /// moment the upload stage runs. Passed straight through to the
    /// uploader's metadata.
    #[serde(default)]
    pub publish_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub target_duration_secs: Option<u32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_privacy")]
    pub privacy: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub artifacts: Artifacts,

    /// Percent complete (0-100) per stage name, so a caller can poll
    /// fine-grained progress within a single stage.
    #[serde(default)]
    pub stage_progress: std::collections::HashMap<String, f64>,

    #[serde(default)]
    pub retry_count: u32,
    pub max_retries: u32,

    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    1
}

fn default_job_kind() -> JobKind {
    JobKind::SingleVideo
}

fn default_privacy() -> String {
    "private".to_string()
}

/// Pipeline position plus whatever data that position carries.
///
/// Transitions: `Pending -> Scheduled -> ScriptGeneration ->
/// MediaAssembly -> Upload? -> Completed`, with `Failed` reachable from
/// any in-progress stage and retried back to `Pending` while
/// `retry_count < max_retries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Scheduled,
    ScriptGeneration,
    MediaAssembly,
    Upload,
    Completed,
    Failed {
        failed_stage: String,
        message: String,
        retryable: bool,
    },
    Cancelled,
    Paused { resume_stage: Box<Stage> },
}

impl Job {
    pub fn new(topic: impl Into<String>, scheduled_at: DateTime<Utc>, max_retries: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            stage: Stage::Pending,
            kind: JobKind::SingleVideo,
            rule_id: None,
            slot_id: None,
            scheduled_at,
            publish_at: None,
            style: None,
            target_duration_secs: None,
            tags: Vec::new(),
            category: None,
            privacy: default_privacy(),
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            artifacts: Artifacts::default(),
            stage_progress: std::collections::HashMap::new(),
            retry_count: 0,
            max_retries,
            schema_version: default_schema_version(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.stage, Stage::Completed | Stage::Cancelled)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.stage, Stage::Failed { .. })
    }

    /// Advance to the next pipeline stage, bumping `updated_at` and
    /// stamping `started_at`/`completed_at` at the edges of the pipeline.
    pub fn advance(&mut self, next: Stage) {
        if matches!(next, Stage::Scheduled) && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if matches!(next, Stage::Completed) {
            self.completed_at = Some(Utc::now());
        }
        self.stage = next;
        self.updated_at = Utc::now();
    }

    /// Record progress (0-100) within the current stage, keyed by stage
    /// name.
    pub fn record_stage_progress(&mut self, stage: impl Into<String>, percent: f64) {
        self.stage_progress.insert(stage.into(), percent);
        self.updated_at = Utc::now();
    }

    /// Record a stage failure. If retries remain, rewinds to `Pending`
    /// and increments `retry_count`; otherwise settles into `Failed`,
    /// recording which stage failed.
    pub fn fail(&mut self, stage: impl Into<String>, message: impl Into<String>, retryable: bool) {
        self.updated_at = Utc::now();
        if retryable && self.retry_count < self.max_retries {
            self.retry_count += 1;
            self.stage = Stage::Pending;
        } else {
            self.stage = Stage::Failed {
                failed_stage: stage.into(),
                message: message.into(),
                retryable,
            };
        }
    }

    pub fn cancel(&mut self) {
        self.stage = Stage::Cancelled;
        self.updated_at = Utc::now();
    }

    /// Pause at the current stage so `resume` can restore it exactly.
    pub fn pause(&mut self) {
        if !matches!(self.stage, Stage::Paused { .. }) {
            let current = std::mem::replace(&mut self.stage, Stage::Pending);
            self.stage = Stage::Paused {
                resume_stage: Box::new(current),
            };
            self.updated_at = Utc::now();
        }
    }

    pub fn resume(&mut self) {
        if let Stage::Paused { resume_stage } = &mut self.stage {
            self.stage = *resume_stage.clone();
            self.updated_at = Utc::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> Job {
        Job::new("how volcanoes form", Utc::now(), 3)
    }

    #[test]
    fn new_job_starts_pending() {
        let j = job();
        assert!(matches!(j.stage, Stage::Pending));
        assert_eq!(j.retry_count, 0);
        assert!(!j.is_terminal());
    }

    #[test]
    fn fail_retryable_rewinds_to_pending_and_increments_retry_count() {
        let mut j = job();
        j.advance(Stage::ScriptGeneration);
        j.fail("script_generation", "synthesis timed out", true);
        assert!(matches!(j.stage, Stage::Pending));
        assert_eq!(j.retry_count, 1);
    }

    #[test]
    fn fail_exhausts_retries_into_failed() {
        let mut j = job();
        j.max_retries = 1;
        j.fail("script_generation", "a", true);
        assert_eq!(j.retry_count, 1);
        assert!(matches!(j.stage, Stage::Pending));
        j.fail("script_generation", "b", true);
        assert!(j.is_failed());
    }

    #[test]
    fn fail_non_retryable_settles_immediately() {
        let mut j = job();
        j.fail("upload", "bad input", false);
        assert!(j.is_failed());
        assert_eq!(j.retry_count, 0);
    }

    #[test]
    fn failed_stage_exposes_which_stage_failed() {
        let mut j = job();
        j.fail("media_assembly", "disk full", false);
        match j.stage {
            Stage::Failed { failed_stage, .. } => assert_eq!(failed_stage, "media_assembly"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn advance_to_completed_stamps_completed_at_after_created_at() {
        let mut j = job();
        j.advance(Stage::Completed);
        assert!(j.completed_at.unwrap() >= j.created_at);
    }

    #[test]
    fn pause_then_resume_restores_prior_stage() {
        let mut j = job();
        j.advance(Stage::MediaAssembly);
        j.pause();
        assert!(matches!(j.stage, Stage::Paused { .. }));
        j.resume();
        assert!(matches!(j.stage, Stage::MediaAssembly));
    }

    #[test]
    fn cancel_is_terminal() {
        let mut j = job();
        j.cancel();
        assert!(j.is_terminal());
    }

    #[test]
    fn serde_roundtrip_preserves_failed_fields() {
        let mut j = job();
        j.fail("upload", "no disk space", false);
        let json = serde_json::to_string(&j).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        match back.stage {
            Stage::Failed {
                failed_stage,
                message,
                retryable,
            } => {
                assert_eq!(failed_stage, "upload");
                assert_eq!(message, "no disk space");
                assert!(!retryable);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn serde_roundtrip_preserves_artifacts() {
        let mut j = job();
        j.artifacts.script_text = Some("once upon a time".into());
        j.artifacts.media_path = Some(std::path::PathBuf::from("out/video.mp4"));
        j.artifacts.remote_url = Some("https://example.test/v/abc".into());
        let json = serde_json::to_string(&j).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.artifacts.script_text.as_deref(), Some("once upon a time"));
        assert_eq!(back.artifacts.remote_url.as_deref(), Some("https://example.test/v/abc"));
    }
}

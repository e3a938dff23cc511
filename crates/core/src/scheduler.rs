//! Content scheduler (C5): the public job/rule contract, the pipeline
//! stage-machine driver, and the two background loops — the main job
//! loop and the recurring dispatcher.
//!
//! Three retry mechanisms operate at different layers and are never
//! merged: the [`Executor`](crate::runtime::executor::Executor)'s
//! `RetryStrategy` covers transient failure inside one stage attempt;
//! [`Job::fail`](sa_domain::Job::fail) here covers a whole stage
//! exhausting that and rescheduling the job; [`RecurringRule`]'s cooldown
//! covers a rule whose expansions keep failing.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sa_domain::config::SchedulerConfig;
use sa_domain::{Error, Job, JobKind, MissedPolicy, Pattern, RecurringRule, Result, Stage};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::calendar::Calendar;
use crate::collaborators::{
    AssemblyRequest, MediaAssembler, ScriptRequest, ScriptSynthesizer, UploadMetadata,
    UploadRequest, Uploader,
};
use crate::job_store::{JobFilter, JobStore};
use crate::runtime::cancel::CancelMap;
use crate::runtime::executor::{
    ExecutionArgs, ExecutionStatus, Executor, RetryStrategy, WorkError, WorkFn,
};
use crate::runtime::schedules::{cron::next_fire, cron::parse_tz, store::RuleStore};

/// Where generated media assets live. Not persisted — derived per job
/// from a single configured workspace root.
#[derive(Debug, Clone)]
pub struct MediaPaths {
    pub assets_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Inputs to `schedule_video` beyond topic and publish time — grouped
/// into one struct rather than a long positional argument list, the
/// same way the collaborator contracts bundle their request fields.
#[derive(Debug, Clone, Default)]
pub struct VideoRequest {
    pub publish_at: Option<DateTime<Utc>>,
    pub style: Option<String>,
    pub target_duration_secs: Option<u32>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub privacy: Option<String>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct SchedulerStatistics {
    pub total_jobs: usize,
    pub pending: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_rules: usize,
    pub active_rules: usize,
    pub paused_rules: usize,
}

/// Per-rule in-flight guard: firings within a single rule never overlap.
struct ConcurrencyGuard {
    counts: tokio::sync::RwLock<HashMap<Uuid, Arc<AtomicU32>>>,
}

impl ConcurrencyGuard {
    fn new() -> Self {
        Self {
            counts: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    async fn try_acquire(&self, id: Uuid, max: u32) -> bool {
        let counter = {
            let mut map = self.counts.write().await;
            map.entry(id).or_insert_with(|| Arc::new(AtomicU32::new(0))).clone()
        };
        let current = counter.load(Ordering::SeqCst);
        if current >= max {
            return false;
        }
        counter.fetch_add(1, Ordering::SeqCst);
        true
    }

    async fn release(&self, id: Uuid) {
        if let Some(counter) = self.counts.read().await.get(&id) {
            counter.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// Number of fire windows between `last_fired_at` and `now` the rule's
/// pattern produces, capped at `max_catchup`.
fn missed_window_count(
    pattern: &Pattern,
    tz: chrono_tz::Tz,
    last_fired_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_catchup: u32,
) -> usize {
    let Some(mut cursor) = last_fired_at else {
        return 0;
    };
    let mut count = 0usize;
    while count < max_catchup as usize {
        let Some(next) = next_fire(pattern, &cursor, tz) else {
            break;
        };
        if next > now {
            break;
        }
        count += 1;
        cursor = next;
    }
    count
}

/// How many jobs to expand for one dispatcher pass, per the rule's
/// `missed_policy`.
fn runs_to_fire(
    policy: MissedPolicy,
    pattern: &Pattern,
    tz: chrono_tz::Tz,
    last_fired_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    max_catchup: u32,
) -> usize {
    match policy {
        MissedPolicy::Skip => 1,
        MissedPolicy::RunOnce => 1,
        MissedPolicy::CatchUp => {
            missed_window_count(pattern, tz, last_fired_at, now, max_catchup).max(1)
        }
    }
}

fn to_work_error(err: Error) -> WorkError {
    WorkError {
        retryable: err.is_retryable(),
        message: err.to_string(),
    }
}

/// The collaborator-facing name for a pipeline stage, used both as the
/// `error.stage` value on a permanent failure and as the
/// `stage_progress` key.
fn stage_label(stage: &Stage) -> &'static str {
    match stage {
        Stage::ScriptGeneration => "script_generation",
        Stage::MediaAssembly => "media_assembly",
        Stage::Upload => "upload",
        _ => "unknown",
    }
}

/// Fold a completed stage's `result_data` into the job's accumulated
/// artifacts, so the next stage (and the upload metadata) can consume
/// what this one produced.
fn apply_stage_output(job: &mut Job, stage: &Stage, data: serde_json::Value) {
    match stage {
        Stage::ScriptGeneration => {
            if let Some(text) = data.get("text").and_then(|v| v.as_str()) {
                job.artifacts.script_text = Some(text.to_string());
            }
            if let Some(title) = data.get("title").and_then(|v| v.as_str()) {
                job.artifacts.script_title = Some(title.to_string());
            }
            if let Some(description) = data.get("description").and_then(|v| v.as_str()) {
                job.artifacts.script_description = Some(description.to_string());
            }
            if job.tags.is_empty() {
                if let Some(tags) = data.get("tags").and_then(|v| v.as_array()) {
                    job.tags = tags
                        .iter()
                        .filter_map(|t| t.as_str().map(str::to_string))
                        .collect();
                }
            }
        }
        Stage::MediaAssembly => {
            if let Some(path) = data.get("media_path").and_then(|v| v.as_str()) {
                job.artifacts.media_path = Some(PathBuf::from(path));
            }
            if let Some(path) = data.get("thumbnail_path").and_then(|v| v.as_str()) {
                job.artifacts.thumbnail_path = Some(PathBuf::from(path));
            }
        }
        Stage::Upload => {
            if let Some(id) = data.get("remote_id").and_then(|v| v.as_str()) {
                job.artifacts.remote_id = Some(id.to_string());
            }
            if let Some(url) = data.get("url").and_then(|v| v.as_str()) {
                job.artifacts.remote_url = Some(url.to_string());
            }
        }
        _ => {}
    }
}

pub struct Scheduler {
    jobs: Arc<JobStore>,
    rules: Arc<RuleStore>,
    calendar: Arc<Calendar>,
    executor: Arc<Executor>,
    cancel_map: Arc<CancelMap>,
    synthesizer: Arc<dyn ScriptSynthesizer>,
    assembler: Arc<dyn MediaAssembler>,
    uploader: Arc<dyn Uploader>,
    media: MediaPaths,
    upload_account: String,
    config: SchedulerConfig,
    running: Arc<AtomicBool>,
    active: Arc<Mutex<HashSet<Uuid>>>,
    rule_guard: Arc<ConcurrencyGuard>,
    main_handle: Mutex<Option<JoinHandle<()>>>,
    dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<JobStore>,
        rules: Arc<RuleStore>,
        calendar: Arc<Calendar>,
        executor: Arc<Executor>,
        cancel_map: Arc<CancelMap>,
        synthesizer: Arc<dyn ScriptSynthesizer>,
        assembler: Arc<dyn MediaAssembler>,
        uploader: Arc<dyn Uploader>,
        media: MediaPaths,
        upload_account: String,
        config: SchedulerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            jobs,
            rules,
            calendar,
            executor,
            cancel_map,
            synthesizer,
            assembler,
            uploader,
            media,
            upload_account,
            config,
            running: Arc::new(AtomicBool::new(false)),
            active: Arc::new(Mutex::new(HashSet::new())),
            rule_guard: Arc::new(ConcurrencyGuard::new()),
            main_handle: Mutex::new(None),
            dispatcher_handle: Mutex::new(None),
        })
    }

    // ---- Jobs --------------------------------------------------------

    pub async fn schedule_video(
        &self,
        topic: impl Into<String>,
        scheduled_at: DateTime<Utc>,
        request: VideoRequest,
    ) -> Job {
        let topic = topic.into();
        let reserved = self.calendar.reserve(scheduled_at, topic.clone(), 0).await;
        let mut job = Job::new(topic, scheduled_at, request.max_retries.unwrap_or(3));
        job.slot_id = Some(reserved.slot.id);
        job.publish_at = request.publish_at;
        job.style = request.style;
        job.target_duration_secs = request.target_duration_secs;
        job.tags = request.tags;
        job.category = request.category;
        if let Some(privacy) = request.privacy {
            job.privacy = privacy;
        }
        self.jobs.insert(job).await
    }

    /// Each item is scheduled independently and marked `BatchMember`, so
    /// later queries can tell a batch-expanded job from a one-off.
    pub async fn schedule_batch(
        &self,
        items: Vec<(String, DateTime<Utc>, VideoRequest)>,
    ) -> Vec<Job> {
        let mut jobs = Vec::with_capacity(items.len());
        for (topic, scheduled_at, request) in items {
            let job = self.schedule_video(topic, scheduled_at, request).await;
            let job = self
                .jobs
                .update(&job.id, |j| j.kind = JobKind::BatchMember)
                .await
                .unwrap_or(job);
            jobs.push(job);
        }
        jobs
    }

    pub async fn get_job(&self, id: &Uuid) -> Option<Job> {
        self.jobs.get(id).await
    }

    pub async fn list_jobs(&self, filter: &JobFilter) -> Vec<Job> {
        self.jobs.list(filter).await
    }

    pub async fn cancel_job(&self, id: &Uuid) -> bool {
        self.cancel_map.cancel(*id);
        self.jobs
            .update(id, |j| {
                if !j.is_terminal() {
                    j.cancel();
                }
            })
            .await
            .is_some()
    }

    /// Valid only while the job is sitting in `Pending`.
    pub async fn pause_job(&self, id: &Uuid) -> bool {
        let Some(job) = self.jobs.get(id).await else {
            return false;
        };
        if !matches!(job.stage, Stage::Pending) {
            return false;
        }
        self.jobs.update(id, |j| j.pause()).await.is_some()
    }

    pub async fn resume_job(&self, id: &Uuid) -> bool {
        self.jobs.update(id, |j| j.resume()).await.is_some()
    }

    // ---- Recurring rules ----------------------------------------------

    pub async fn create_daily_rule(
        &self,
        name: impl Into<String>,
        topic_template: impl Into<String>,
        time: chrono::NaiveTime,
        timezone: impl Into<String>,
    ) -> RecurringRule {
        self.create_rule(name, topic_template, Pattern::Daily { time }, timezone)
            .await
    }

    pub async fn create_weekly_rule(
        &self,
        name: impl Into<String>,
        topic_template: impl Into<String>,
        time: chrono::NaiveTime,
        days: Vec<chrono::Weekday>,
        timezone: impl Into<String>,
    ) -> RecurringRule {
        self.create_rule(
            name,
            topic_template,
            Pattern::Weekly { time, days },
            timezone,
        )
        .await
    }

    pub async fn create_monthly_rule(
        &self,
        name: impl Into<String>,
        topic_template: impl Into<String>,
        day_of_month: u32,
        time: chrono::NaiveTime,
        timezone: impl Into<String>,
    ) -> RecurringRule {
        self.create_rule(
            name,
            topic_template,
            Pattern::Monthly { day_of_month, time },
            timezone,
        )
        .await
    }

    pub async fn create_interval_rule(
        &self,
        name: impl Into<String>,
        topic_template: impl Into<String>,
        every_minutes: i64,
        timezone: impl Into<String>,
    ) -> RecurringRule {
        self.create_rule(
            name,
            topic_template,
            Pattern::Interval { every_minutes },
            timezone,
        )
        .await
    }

    pub async fn create_cron_rule(
        &self,
        name: impl Into<String>,
        topic_template: impl Into<String>,
        expression: impl Into<String>,
        timezone: impl Into<String>,
    ) -> RecurringRule {
        self.create_rule(
            name,
            topic_template,
            Pattern::Cron {
                expression: expression.into(),
            },
            timezone,
        )
        .await
    }

    async fn create_rule(
        &self,
        name: impl Into<String>,
        topic_template: impl Into<String>,
        pattern: Pattern,
        timezone: impl Into<String>,
    ) -> RecurringRule {
        let rule = RecurringRule {
            id: Uuid::new_v4(),
            name: name.into(),
            topic_template: topic_template.into(),
            pattern,
            timezone: timezone.into(),
            missed_policy: MissedPolicy::default(),
            paused: false,
            last_fired_at: None,
            next_fire_at: None,
            run_count: 0,
            failure_count: 0,
            created_at: Utc::now(),
            schema_version: 1,
        };
        self.rules.insert(rule).await
    }

    pub async fn pause_rule(&self, id: &Uuid) -> bool {
        self.rules.update(id, |r| r.paused = true).await.is_some()
    }

    pub async fn resume_rule(&self, id: &Uuid) -> bool {
        let Some(rule) = self.rules.get(id).await else {
            return false;
        };
        let tz = parse_tz(&rule.timezone);
        let next = next_fire(&rule.pattern, &Utc::now(), tz);
        self.rules
            .update(id, |r| {
                r.paused = false;
                r.next_fire_at = next;
            })
            .await
            .is_some()
    }

    pub async fn delete_rule(&self, id: &Uuid) -> bool {
        self.rules.delete(id).await
    }

    // ---- Statistics -----------------------------------------------------

    pub async fn statistics(&self) -> SchedulerStatistics {
        let jobs = self.jobs.list(&JobFilter::default()).await;
        let rules = self.rules.list().await;
        let mut stats = SchedulerStatistics {
            total_jobs: jobs.len(),
            total_rules: rules.len(),
            ..Default::default()
        };
        for job in &jobs {
            match job.stage {
                Stage::Pending => stats.pending += 1,
                Stage::Completed => stats.completed += 1,
                Stage::Failed { .. } => stats.failed += 1,
                Stage::Cancelled => stats.cancelled += 1,
                _ => stats.active += 1,
            }
        }
        for rule in &rules {
            if rule.paused {
                stats.paused_rules += 1;
            } else {
                stats.active_rules += 1;
            }
        }
        stats
    }

    // ---- Lifecycle -----------------------------------------------------

    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let main_self = self.clone();
        let main_handle = tokio::spawn(async move { main_self.main_loop().await });
        let dispatcher_self = self.clone();
        let dispatcher_handle = tokio::spawn(async move { dispatcher_self.dispatcher_loop().await });
        *self.main_handle.lock().await = Some(main_handle);
        *self.dispatcher_handle.lock().await = Some(dispatcher_handle);
    }

    /// Idempotent. Signals both loops to stop, then waits a bounded
    /// grace period for in-flight jobs to reach their next persist point
    /// before aborting anything still running.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let grace = std::time::Duration::from_secs(self.config.poll_interval_secs.max(1));
        let deadline = tokio::time::Instant::now() + grace;
        while tokio::time::Instant::now() < deadline {
            if self.active.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        if let Some(handle) = self.main_handle.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.dispatcher_handle.lock().await.take() {
            handle.abort();
        }
    }

    async fn main_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.poll_interval_secs.max(1),
        ));
        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            self.tick_once().await;
        }
    }

    /// The executor's own semaphore is the true concurrency gate; `active`
    /// here only stops a job already in flight from being dispatched twice
    /// across ticks.
    async fn tick_once(self: &Arc<Self>) {
        let due = self.jobs.due_pending(Utc::now()).await;
        for job in due {
            let mut active = self.active.lock().await;
            if active.contains(&job.id) {
                continue;
            }
            active.insert(job.id);
            drop(active);

            let this = self.clone();
            tokio::spawn(async move {
                this.run_job(job).await;
            });
        }
    }

    async fn run_job(self: Arc<Self>, mut job: Job) {
        job.advance(Stage::Scheduled);
        self.jobs.update(&job.id, |j| *j = job.clone()).await;

        for stage in [Stage::ScriptGeneration, Stage::MediaAssembly, Stage::Upload] {
            job.advance(stage.clone());
            self.jobs.update(&job.id, |j| *j = job.clone()).await;

            let work = self.work_for_stage(&stage, &job);
            let result = self
                .executor
                .execute(
                    work,
                    ExecutionArgs {
                        id: Some(job.id),
                        max_retries: Some(0),
                        retry_strategy: Some(RetryStrategy::None),
                        timeout: None,
                    },
                )
                .await;

            match result.status {
                ExecutionStatus::Completed => {
                    if let Some(data) = result.result_data {
                        apply_stage_output(&mut job, &stage, data);
                    }
                    job.record_stage_progress(stage_label(&stage), 100.0);
                    self.jobs.update(&job.id, |j| *j = job.clone()).await;
                    continue;
                }
                ExecutionStatus::Cancelled => {
                    job.cancel();
                    self.jobs.update(&job.id, |j| *j = job.clone()).await;
                    self.active.lock().await.remove(&job.id);
                    return;
                }
                ExecutionStatus::Failed | ExecutionStatus::TimedOut => {
                    let message = result
                        .error_message
                        .unwrap_or_else(|| "stage failed".to_string());
                    let retryable = result.retryable.unwrap_or(false);
                    job.fail(stage_label(&stage), message, retryable);
                    if matches!(job.stage, Stage::Pending) {
                        let delay = self.config.stage_retry_delay_secs * job.retry_count as u64;
                        job.scheduled_at = Utc::now() + chrono::Duration::seconds(delay as i64);
                    }
                    self.jobs.update(&job.id, |j| *j = job.clone()).await;
                    self.active.lock().await.remove(&job.id);
                    return;
                }
            }
        }

        job.advance(Stage::Completed);
        self.jobs.update(&job.id, |j| *j = job.clone()).await;
        self.active.lock().await.remove(&job.id);
    }

    /// Builds the closure the executor runs for `stage`, drawing its
    /// inputs from whatever the prior stage already wrote onto `job`
    /// (`job.artifacts`, `job.tags`, …) so each stage consumes the
    /// previous one's output rather than running against empty data.
    fn work_for_stage(&self, stage: &Stage, job: &Job) -> WorkFn {
        match stage {
            Stage::ScriptGeneration => {
                let synthesizer = self.synthesizer.clone();
                let topic = job.topic.clone();
                let style = job.style.clone();
                let target_duration_secs = job.target_duration_secs.unwrap_or(0);
                Arc::new(move |_attempt| {
                    let synthesizer = synthesizer.clone();
                    let topic = topic.clone();
                    let style = style.clone();
                    Box::pin(async move {
                        let response = synthesizer
                            .synthesize(ScriptRequest {
                                topic,
                                style,
                                target_duration_secs,
                            })
                            .await
                            .map_err(to_work_error)?;
                        Ok(serde_json::json!({
                            "text": response.text,
                            "title": response.title,
                            "description": response.description,
                            "tags": response.tags,
                        }))
                    })
                })
            }
            Stage::MediaAssembly => {
                let assembler = self.assembler.clone();
                let assets_dir = self.media.assets_dir.clone();
                let output_dir = self.media.output_dir.clone();
                let script_text = job.artifacts.script_text.clone().unwrap_or_default();
                Arc::new(move |_attempt| {
                    let assembler = assembler.clone();
                    let assets_dir = assets_dir.clone();
                    let output_dir = output_dir.clone();
                    let script_text = script_text.clone();
                    Box::pin(async move {
                        let response = assembler
                            .assemble(AssemblyRequest {
                                script_text,
                                assets_dir,
                                output_dir,
                            })
                            .await
                            .map_err(to_work_error)?;
                        Ok(serde_json::json!({
                            "media_path": response.media_path,
                            "thumbnail_path": response.thumbnail_path,
                            "duration_seconds": response.duration_seconds,
                        }))
                    })
                })
            }
            Stage::Upload => {
                let uploader = self.uploader.clone();
                let account = self.upload_account.clone();
                let title = job
                    .artifacts
                    .script_title
                    .clone()
                    .unwrap_or_else(|| job.topic.clone());
                let description = job.artifacts.script_description.clone().unwrap_or_default();
                let tags = job.tags.clone();
                let category = job.category.clone();
                let privacy = job.privacy.clone();
                let publish_at = job.publish_at;
                let media_path = job.artifacts.media_path.clone().unwrap_or_default();
                let thumbnail_path = job.artifacts.thumbnail_path.clone().unwrap_or_default();
                Arc::new(move |_attempt| {
                    let uploader = uploader.clone();
                    let account = account.clone();
                    let title = title.clone();
                    let description = description.clone();
                    let tags = tags.clone();
                    let category = category.clone();
                    let privacy = privacy.clone();
                    let media_path = media_path.clone();
                    let thumbnail_path = thumbnail_path.clone();
                    Box::pin(async move {
                        let response = uploader
                            .upload(UploadRequest {
                                account,
                                media_path,
                                thumbnail_path,
                                metadata: UploadMetadata {
                                    title,
                                    description,
                                    tags,
                                    category,
                                    privacy,
                                    publish_at,
                                },
                            })
                            .await
                            .map_err(to_work_error)?;
                        Ok(serde_json::json!({
                            "remote_id": response.remote_id,
                            "url": response.url,
                        }))
                    })
                })
            }
            _ => Arc::new(|_attempt| Box::pin(async { Ok(serde_json::json!({})) })),
        }
    }

    // ---- Recurring dispatcher ------------------------------------------

    async fn dispatcher_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(
            self.config.poll_interval_secs.max(1),
        ));
        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;
            self.dispatch_due_rules().await;
        }
    }

    async fn dispatch_due_rules(&self) {
        let due = self.rules.due_rules().await;
        for rule in due {
            if !self.rule_guard.try_acquire(rule.id, 1).await {
                continue;
            }
            let result = self.fire_rule(&rule).await;
            self.rule_guard.release(rule.id).await;
            match result {
                Ok(()) => self.rules.record_success(&rule.id, Utc::now()).await,
                Err(message) => self.rules.record_failure(&rule.id, &message).await,
            }
        }
    }

    async fn fire_rule(&self, rule: &RecurringRule) -> std::result::Result<(), String> {
        let tz = parse_tz(&rule.timezone);
        let fire_count = runs_to_fire(
            rule.missed_policy,
            &rule.pattern,
            tz,
            rule.last_fired_at,
            Utc::now(),
            self.config.max_missed_catchup,
        );
        for _ in 0..fire_count {
            let now = Utc::now();
            let topic = rule.render_topic(now);
            let job = self.schedule_video(topic, now, VideoRequest::default()).await;
            self.jobs
                .update(&job.id, |j| {
                    j.kind = JobKind::RecurringChild;
                    j.rule_id = Some(rule.id);
                })
                .await;
        }
        Ok(())
    }
}

// Bring `Result` into scope for callers who want the alias without a
// separate import.
pub type SchedulerResult<T> = Result<T>;

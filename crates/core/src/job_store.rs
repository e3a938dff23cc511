//! Per-entity persistent storage for content-production jobs (C2, job half).
//!
//! Mirrors `runtime::schedules::store::RuleStore`'s per-file layout: one
//! `<id>.json` under the store root, write-temp-then-rename, corrupt
//! files skipped (and logged) rather than failing startup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sa_domain::{Job, Stage};
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub enum JobEvent {
    Updated(Job),
    Removed(Uuid),
}

/// A status label for filtering, independent of the data a `Stage`
/// variant carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Pending,
    Scheduled,
    ScriptGeneration,
    MediaAssembly,
    Upload,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl From<&Stage> for StageKind {
    fn from(stage: &Stage) -> Self {
        match stage {
            Stage::Pending => StageKind::Pending,
            Stage::Scheduled => StageKind::Scheduled,
            Stage::ScriptGeneration => StageKind::ScriptGeneration,
            Stage::MediaAssembly => StageKind::MediaAssembly,
            Stage::Upload => StageKind::Upload,
            Stage::Completed => StageKind::Completed,
            Stage::Failed { .. } => StageKind::Failed,
            Stage::Cancelled => StageKind::Cancelled,
            Stage::Paused { .. } => StageKind::Paused,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub stage: Option<StageKind>,
    pub rule_id: Option<Uuid>,
}

impl JobFilter {
    fn matches(&self, job: &Job) -> bool {
        if let Some(stage) = self.stage {
            if StageKind::from(&job.stage) != stage {
                return false;
            }
        }
        if let Some(rule_id) = self.rule_id {
            if job.rule_id != Some(rule_id) {
                return false;
            }
        }
        true
    }
}

pub struct JobStore {
    inner: RwLock<HashMap<Uuid, Job>>,
    root: PathBuf,
    event_tx: broadcast::Sender<JobEvent>,
}

impl JobStore {
    pub fn new(root: &Path) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let mut store = Self {
            inner: RwLock::new(HashMap::new()),
            root: root.to_path_buf(),
            event_tx,
        };
        store.load();
        store
    }

    fn load(&mut self) {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return;
        };
        let mut map = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(data) => match serde_json::from_str::<Job>(&data) {
                    Ok(job) => {
                        map.insert(job.id, job);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping corrupt job file")
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read job file")
                }
            }
        }
        let count = map.len();
        self.inner = RwLock::new(map);
        tracing::info!(count, "loaded jobs from disk");
    }

    fn path_for(&self, id: &Uuid) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn persist_one(&self, job: &Job) {
        let path = self.path_for(&job.id);
        let json = match serde_json::to_string_pretty(job) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize job");
                return;
            }
        };
        let _ = tokio::task::spawn_blocking(move || write_atomic(&path, &json)).await;
    }

    async fn remove_file(&self, id: &Uuid) {
        let path = self.path_for(id);
        let _ = tokio::task::spawn_blocking(move || std::fs::remove_file(&path)).await;
    }

    pub async fn get(&self, id: &Uuid) -> Option<Job> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn list(&self, filter: &JobFilter) -> Vec<Job> {
        self.inner
            .read()
            .await
            .values()
            .filter(|j| filter.matches(j))
            .cloned()
            .collect()
    }

    pub async fn insert(&self, job: Job) -> Job {
        self.inner.write().await.insert(job.id, job.clone());
        self.persist_one(&job).await;
        let _ = self.event_tx.send(JobEvent::Updated(job.clone()));
        job
    }

    pub async fn update(&self, id: &Uuid, f: impl FnOnce(&mut Job)) -> Option<Job> {
        let mut map = self.inner.write().await;
        let job = map.get_mut(id)?;
        f(job);
        let snapshot = job.clone();
        drop(map);
        self.persist_one(&snapshot).await;
        let _ = self.event_tx.send(JobEvent::Updated(snapshot.clone()));
        Some(snapshot)
    }

    pub async fn delete(&self, id: &Uuid) -> bool {
        let removed = self.inner.write().await.remove(id).is_some();
        if removed {
            self.remove_file(id).await;
            let _ = self.event_tx.send(JobEvent::Removed(*id));
        }
        removed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }

    /// Jobs sitting in `Pending` whose `scheduled_at` has arrived.
    pub async fn due_pending(&self, now: DateTime<Utc>) -> Vec<Job> {
        self.inner
            .read()
            .await
            .values()
            .filter(|j| matches!(j.stage, Stage::Pending) && j.scheduled_at <= now)
            .cloned()
            .collect()
    }

    pub async fn count_active(&self) -> usize {
        self.inner
            .read()
            .await
            .values()
            .filter(|j| !j.is_terminal() && !matches!(j.stage, Stage::Pending))
            .count()
    }

    /// Remove terminal jobs older than `older_than`, returning how many
    /// were swept. Grounded in the retention behavior implied by
    /// `StorageConfig::retention_days`.
    pub async fn retention_sweep(&self, older_than: chrono::Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let stale: Vec<Uuid> = self
            .inner
            .read()
            .await
            .values()
            .filter(|j| j.is_terminal() && j.updated_at < cutoff)
            .map(|j| j.id)
            .collect();
        let mut removed = 0;
        for id in stale {
            if self.delete(&id).await {
                removed += 1;
            }
        }
        removed
    }
}

fn write_atomic(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!(error = %e, dir = %parent.display(), "failed to create store directory");
            return;
        }
    }
    let tmp_path = path.with_extension("json.tmp");
    if let Err(e) = std::fs::write(&tmp_path, contents) {
        tracing::warn!(error = %e, path = %tmp_path.display(), "failed to write temp file");
        return;
    }
    if let Err(e) = std::fs::rename(&tmp_path, path) {
        tracing::warn!(error = %e, path = %path.display(), "failed to rename temp file into place");
    }
}

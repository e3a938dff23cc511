//! RuleStore — per-entity persistent storage for recurring rules.
//!
//! Each rule is written to its own `<id>.json` file under the store's
//! root directory via write-temp-then-rename, so a crash mid-write
//! never corrupts a sibling entity. Corrupt files are skipped on load
//! rather than failing the whole store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sa_domain::RecurringRule;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use super::cron::{next_fire, parse_tz};
use super::model::{to_view, RuleEvent};

pub struct RuleStore {
    inner: RwLock<HashMap<Uuid, RecurringRule>>,
    root: PathBuf,
    event_tx: broadcast::Sender<RuleEvent>,
}

impl RuleStore {
    pub fn new(root: &Path) -> Self {
        let (event_tx, _) = broadcast::channel(64);
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
                Ok(data) => match serde_json::from_str::<RecurringRule>(&data) {
                    Ok(rule) => {
                        map.insert(rule.id, rule);
                    }
                    Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping corrupt rule file"),
                },
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to read rule file"),
            }
        }
        let count = map.len();
        self.inner = RwLock::new(map);
        tracing::info!(count, "loaded recurring rules from disk");
    }

    fn path_for(&self, id: &Uuid) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn persist_one(&self, rule: &RecurringRule) {
        let path = self.path_for(&rule.id);
        let json = match serde_json::to_string_pretty(rule) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize rule");
                return;
            }
        };
        let _ = tokio::task::spawn_blocking(move || write_atomic(&path, &json)).await;
    }

    async fn remove_file(&self, id: &Uuid) {
        let path = self.path_for(id);
        let _ = tokio::task::spawn_blocking(move || std::fs::remove_file(&path)).await;
    }

    pub async fn list(&self) -> Vec<RecurringRule> {
        self.inner.read().await.values().cloned().collect()
    }

    pub async fn get(&self, id: &Uuid) -> Option<RecurringRule> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn name_exists(&self, name: &str, exclude_id: Option<&Uuid>) -> bool {
        let lower = name.to_lowercase();
        self.inner
            .read()
            .await
            .values()
            .any(|r| r.name.to_lowercase() == lower && exclude_id.is_none_or(|id| r.id != *id))
    }

    pub async fn insert(&self, mut rule: RecurringRule) -> RecurringRule {
        if !rule.paused {
            let tz = parse_tz(&rule.timezone);
            rule.next_fire_at = next_fire(&rule.pattern, &Utc::now(), tz);
        }
        self.inner.write().await.insert(rule.id, rule.clone());
        self.persist_one(&rule).await;
        let _ = self.event_tx.send(RuleEvent::RuleUpdated {
            rule: to_view(&rule),
        });
        rule
    }

    pub async fn update(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut RecurringRule),
    ) -> Option<RecurringRule> {
        let mut map = self.inner.write().await;
        let rule = map.get_mut(id)?;
        f(rule);
        let snapshot = rule.clone();
        drop(map);
        self.persist_one(&snapshot).await;
        let _ = self.event_tx.send(RuleEvent::RuleUpdated {
            rule: to_view(&snapshot),
        });
        Some(snapshot)
    }

    pub async fn delete(&self, id: &Uuid) -> bool {
        let removed = self.inner.write().await.remove(id).is_some();
        if removed {
            self.remove_file(id).await;
        }
        removed
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RuleEvent> {
        self.event_tx.subscribe()
    }

    /// Rules that are due (`next_fire_at <= now`) and not paused.
    pub async fn due_rules(&self) -> Vec<RecurringRule> {
        let now = Utc::now();
        self.inner
            .read()
            .await
            .values()
            .filter(|r| !r.paused && r.next_fire_at.is_some_and(|next| next <= now))
            .cloned()
            .collect()
    }

    /// Record a successful expansion: advance `next_fire_at`, reset
    /// the failure-streak-driven cooldown.
    pub async fn record_success(&self, id: &Uuid, fired_at: chrono::DateTime<Utc>) {
        let mut map = self.inner.write().await;
        let Some(rule) = map.get_mut(id) else {
            return;
        };
        rule.record_success(fired_at);
        let tz = parse_tz(&rule.timezone);
        rule.next_fire_at = next_fire(&rule.pattern, &fired_at, tz);
        let snapshot = rule.clone();
        drop(map);
        self.persist_one(&snapshot).await;
        let _ = self.event_tx.send(RuleEvent::RuleUpdated {
            rule: to_view(&snapshot),
        });
    }

    /// Record a failed expansion and advance past the missed window so
    /// the rule doesn't spin on a fire time it can't satisfy.
    pub async fn record_failure(&self, id: &Uuid, message: &str) {
        let now = Utc::now();
        let mut map = self.inner.write().await;
        let Some(rule) = map.get_mut(id) else {
            return;
        };
        rule.record_failure();
        let tz = parse_tz(&rule.timezone);
        rule.next_fire_at = next_fire(&rule.pattern, &now, tz);
        let snapshot = rule.clone();
        drop(map);
        self.persist_one(&snapshot).await;
        let _ = self.event_tx.send(RuleEvent::RuleFailed {
            rule_id: *id,
            message: message.to_string(),
        });
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

//! Content calendar (C4): reservation, conflict detection, slot
//! suggestion, gap discovery, and utilization views.
//!
//! `reserve` never rejects a request — conflicts are surfaced on the
//! returned [`ReservedSlot`] so a caller can decide what to do. Four
//! time-conflict predicates run in a fixed order (minimum gap, daily cap,
//! blackout, preferred window); a fifth, topic similarity, only runs when
//! `CalendarConfig::detect_topic_conflicts` is set.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};
use sa_domain::config::CalendarConfig;
use sa_domain::ContentSlot;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    MinGap,
    DailyCap,
    Blackout,
    PreferredWindow,
    TopicSimilarity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Ok,
    Conflict,
}

#[derive(Debug, Clone)]
pub struct ReservedSlot {
    pub slot: ContentSlot,
    pub status: SlotStatus,
    pub conflicts: Vec<ConflictReason>,
}

#[derive(Debug, Clone)]
pub struct ContentGap {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub days: i64,
}

#[derive(Debug, Clone)]
pub struct CalendarEntry {
    pub date: NaiveDate,
    pub slots: Vec<ReservedSlot>,
    pub status_counts: HashMap<SlotStatusLabel, usize>,
    pub utilization_percent: f64,
}

/// A hashable/serializable stand-in for `SlotStatus` so it can key a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotStatusLabel {
    Ok,
    Conflict,
}

impl From<SlotStatus> for SlotStatusLabel {
    fn from(s: SlotStatus) -> Self {
        match s {
            SlotStatus::Ok => SlotStatusLabel::Ok,
            SlotStatus::Conflict => SlotStatusLabel::Conflict,
        }
    }
}

pub struct Calendar {
    slots: RwLock<HashMap<Uuid, ContentSlot>>,
    root: PathBuf,
    config: CalendarConfig,
}

impl Calendar {
    pub fn new(root: &Path, config: CalendarConfig) -> Self {
        let mut cal = Self {
            slots: RwLock::new(HashMap::new()),
            root: root.to_path_buf(),
            config,
        };
        cal.load();
        cal
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
                Ok(data) => match serde_json::from_str::<ContentSlot>(&data) {
                    Ok(slot) => {
                        map.insert(slot.id, slot);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "skipping corrupt slot file")
                    }
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read slot file")
                }
            }
        }
        self.slots = RwLock::new(map);
    }

    fn path_for(&self, id: &Uuid) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    async fn persist_one(&self, slot: &ContentSlot) {
        let path = self.path_for(&slot.id);
        let Ok(json) = serde_json::to_string_pretty(slot) else {
            return;
        };
        let _ = tokio::task::spawn_blocking(move || write_atomic(&path, &json)).await;
    }

    async fn remove_file(&self, id: &Uuid) {
        let path = self.path_for(id);
        let _ = tokio::task::spawn_blocking(move || std::fs::remove_file(&path)).await;
    }

    /// Evaluate every ordered conflict predicate for `candidate` against
    /// the slots currently on the calendar (excluding `exclude_id`, for
    /// re-checking an existing slot).
    fn evaluate_conflicts(
        &self,
        candidate: &ContentSlot,
        others: &[&ContentSlot],
    ) -> Vec<ConflictReason> {
        let mut reasons = Vec::new();
        let day = candidate.scheduled_at.date_naive();

        if self.config.min_gap_hours > 0 {
            let min_gap = Duration::hours(self.config.min_gap_hours as i64);
            if others.iter().any(|o| {
                (candidate.scheduled_at - o.scheduled_at).abs() < min_gap
            }) {
                reasons.push(ConflictReason::MinGap);
            }
        }

        let same_day_count = others
            .iter()
            .filter(|o| o.scheduled_at.date_naive() == day)
            .count();
        if same_day_count >= self.config.max_videos_per_day as usize {
            reasons.push(ConflictReason::DailyCap);
        }

        if self.config.blackout_days.contains(&day) {
            reasons.push(ConflictReason::Blackout);
        }

        if !self.config.preferred_hours.is_empty()
            && !self
                .config
                .preferred_hours
                .contains(&candidate.scheduled_at.hour())
        {
            reasons.push(ConflictReason::PreferredWindow);
        }

        if self.config.detect_topic_conflicts {
            let window = Duration::days(7);
            let candidate_tokens = tokenize(&candidate.topic);
            if others.iter().any(|o| {
                (candidate.scheduled_at - o.scheduled_at).abs() <= window
                    && jaccard(&candidate_tokens, &tokenize(&o.topic))
                        >= self.config.topic_similarity_threshold
            }) {
                reasons.push(ConflictReason::TopicSimilarity);
            }
        }

        reasons
    }

    /// Reserve a slot. Always inserts; conflicts are reported, not
    /// enforced.
    pub async fn reserve(
        &self,
        scheduled_at: DateTime<Utc>,
        topic: impl Into<String>,
        duration_minutes: u32,
    ) -> ReservedSlot {
        let candidate = ContentSlot::new(topic, scheduled_at, duration_minutes);
        let conflicts = {
            let map = self.slots.read().await;
            let others: Vec<&ContentSlot> = map.values().collect();
            self.evaluate_conflicts(&candidate, &others)
        };
        self.slots
            .write()
            .await
            .insert(candidate.id, candidate.clone());
        self.persist_one(&candidate).await;
        let status = if conflicts.is_empty() {
            SlotStatus::Ok
        } else {
            SlotStatus::Conflict
        };
        ReservedSlot {
            slot: candidate,
            status,
            conflicts,
        }
    }

    pub async fn remove(&self, id: &Uuid) -> bool {
        let removed = self.slots.write().await.remove(id).is_some();
        if removed {
            self.remove_file(id).await;
        }
        removed
    }

    pub async fn get(&self, id: &Uuid) -> Option<ContentSlot> {
        self.slots.read().await.get(id).cloned()
    }

    /// Only the four time-conflict predicates are considered; topic
    /// similarity is never checked during suggestion.
    fn time_conflicts(&self, candidate: &ContentSlot, others: &[&ContentSlot]) -> Vec<ConflictReason> {
        let saved = self.config.detect_topic_conflicts;
        // evaluate_conflicts takes &self, so temporarily treat topic
        // detection as off by filtering it out of the result instead of
        // mutating config (which would require interior mutability).
        let _ = saved;
        self.evaluate_conflicts(candidate, others)
            .into_iter()
            .filter(|r| *r != ConflictReason::TopicSimilarity)
            .collect()
    }

    /// Walk forward day by day from `start_date` (default today), trying
    /// each preferred hour in order, returning the first `count` times
    /// that clear every time-conflict predicate.
    pub async fn suggest_optimal_slots(
        &self,
        count: usize,
        start_date: Option<NaiveDate>,
        horizon_days: u32,
        preferred_hours: Option<&[u32]>,
    ) -> Vec<DateTime<Utc>> {
        let hours: Vec<u32> = match preferred_hours {
            Some(h) if !h.is_empty() => h.to_vec(),
            _ if !self.config.preferred_hours.is_empty() => self.config.preferred_hours.clone(),
            _ => (0..24).collect(),
        };
        let start = start_date.unwrap_or_else(|| Utc::now().date_naive());
        let map = self.slots.read().await;
        let all: Vec<&ContentSlot> = map.values().collect();

        let mut found = Vec::new();
        for offset in 0..horizon_days as i64 {
            if found.len() >= count {
                break;
            }
            let day = start + Duration::days(offset);
            if self.config.blackout_days.contains(&day) {
                continue;
            }
            let same_day_count = all
                .iter()
                .filter(|o| o.scheduled_at.date_naive() == day)
                .count();
            if same_day_count >= self.config.max_videos_per_day as usize {
                continue;
            }
            for &hour in &hours {
                if found.len() >= count {
                    break;
                }
                let Some(naive_time) = chrono::NaiveTime::from_hms_opt(hour, 0, 0) else {
                    continue;
                };
                let candidate_at = day.and_time(naive_time).and_utc();
                let probe = ContentSlot::new("", candidate_at, 0);
                if self.time_conflicts(&probe, &all).is_empty() {
                    found.push(candidate_at);
                }
            }
        }
        found
    }

    /// Maximal contiguous blackout-free date ranges in `[start, end]`
    /// with no reserved slot on any day in the range.
    pub async fn content_gaps(&self, start: NaiveDate, end: NaiveDate) -> Vec<ContentGap> {
        let map = self.slots.read().await;
        let reserved_days: std::collections::HashSet<NaiveDate> =
            map.values().map(|s| s.scheduled_at.date_naive()).collect();

        let mut gaps = Vec::new();
        let mut cursor = start;
        let mut gap_start: Option<NaiveDate> = None;
        while cursor <= end {
            let blocked =
                self.config.blackout_days.contains(&cursor) || reserved_days.contains(&cursor);
            match (blocked, gap_start) {
                (false, None) => gap_start = Some(cursor),
                (true, Some(s)) => {
                    let last = cursor - Duration::days(1);
                    gaps.push(ContentGap {
                        start: s,
                        end: last,
                        days: (last - s).num_days() + 1,
                    });
                    gap_start = None;
                }
                _ => {}
            }
            cursor += Duration::days(1);
        }
        if let Some(s) = gap_start {
            gaps.push(ContentGap {
                start: s,
                end,
                days: (end - s).num_days() + 1,
            });
        }
        gaps
    }

    /// Per-day view over `[start, end]`: sorted slots, per-status counts,
    /// and utilization as a percentage of `daily_capacity_minutes`.
    pub async fn view(&self, start: NaiveDate, end: NaiveDate) -> Vec<CalendarEntry> {
        let map = self.slots.read().await;
        let all: Vec<&ContentSlot> = map.values().collect();

        let mut entries = Vec::new();
        let mut cursor = start;
        while cursor <= end {
            let day_slots: Vec<&ContentSlot> = all
                .iter()
                .filter(|s| s.scheduled_at.date_naive() == cursor)
                .copied()
                .collect();
            let mut reserved: Vec<ReservedSlot> = day_slots
                .iter()
                .map(|slot| {
                    let others: Vec<&ContentSlot> =
                        all.iter().filter(|o| o.id != slot.id).copied().collect();
                    let conflicts = self.evaluate_conflicts(slot, &others);
                    let status = if conflicts.is_empty() {
                        SlotStatus::Ok
                    } else {
                        SlotStatus::Conflict
                    };
                    ReservedSlot {
                        slot: (*slot).clone(),
                        status,
                        conflicts,
                    }
                })
                .collect();
            reserved.sort_by_key(|r| r.slot.scheduled_at);

            let mut status_counts = HashMap::new();
            for r in &reserved {
                *status_counts.entry(SlotStatusLabel::from(r.status)).or_insert(0) += 1;
            }

            let total_minutes: u32 = day_slots.iter().map(|s| s.duration_minutes).sum();
            let capacity = self.config.daily_capacity_minutes.max(1);
            let utilization_percent = total_minutes as f64 / capacity as f64 * 100.0;

            entries.push(CalendarEntry {
                date: cursor,
                slots: reserved,
                status_counts,
                utilization_percent,
            });
            cursor += Duration::days(1);
        }
        entries
    }
}

fn tokenize(topic: &str) -> std::collections::HashSet<String> {
    topic.to_lowercase().split_whitespace().map(String::from).collect()
}

fn jaccard(a: &std::collections::HashSet<String>, b: &std::collections::HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
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

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn calendar_with(config: CalendarConfig) -> (Calendar, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let cal = Calendar::new(dir.path(), config);
        (cal, dir)
    }

    fn at(hour: u32, day_offset: i64) -> DateTime<Utc> {
        let base = Utc::now().date_naive() + Duration::days(day_offset);
        base.and_hms_opt(hour, 0, 0).unwrap().and_utc()
    }

    #[tokio::test]
    async fn reserve_with_no_conflicts_is_ok() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 10,
            preferred_hours: vec![],
            blackout_days: vec![],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 480,
        });
        let reserved = cal.reserve(at(10, 1), "launch video", 30).await;
        assert_eq!(reserved.status, SlotStatus::Ok);
    }

    #[tokio::test]
    async fn min_gap_zero_allows_back_to_back_slots() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 10,
            preferred_hours: vec![],
            blackout_days: vec![],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 480,
        });
        cal.reserve(at(10, 1), "a", 10).await;
        let second = cal.reserve(at(10, 1), "b", 10).await;
        assert!(!second.conflicts.contains(&ConflictReason::MinGap));
    }

    #[tokio::test]
    async fn min_gap_violation_is_flagged() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 4,
            max_videos_per_day: 10,
            preferred_hours: vec![],
            blackout_days: vec![],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 480,
        });
        cal.reserve(at(10, 1), "a", 10).await;
        let second = cal.reserve(at(11, 1), "b", 10).await;
        assert!(second.conflicts.contains(&ConflictReason::MinGap));
    }

    #[tokio::test]
    async fn daily_cap_violation_is_flagged() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 1,
            preferred_hours: vec![],
            blackout_days: vec![],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 480,
        });
        cal.reserve(at(8, 1), "a", 10).await;
        let second = cal.reserve(at(20, 1), "b", 10).await;
        assert!(second.conflicts.contains(&ConflictReason::DailyCap));
    }

    #[tokio::test]
    async fn blackout_day_is_flagged() {
        let day_offset = 3i64;
        let holiday = Utc::now().date_naive() + Duration::days(day_offset);
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 10,
            preferred_hours: vec![],
            blackout_days: vec![holiday],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 480,
        });
        let reserved = cal.reserve(at(10, day_offset), "a", 10).await;
        assert!(reserved.conflicts.contains(&ConflictReason::Blackout));
    }

    #[tokio::test]
    async fn non_blackout_day_is_not_flagged() {
        let holiday = Utc::now().date_naive() + Duration::days(3);
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 10,
            preferred_hours: vec![],
            blackout_days: vec![holiday],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 480,
        });
        let reserved = cal.reserve(at(10, 4), "a", 10).await;
        assert!(!reserved.conflicts.contains(&ConflictReason::Blackout));
    }

    #[tokio::test]
    async fn preferred_window_violation_is_flagged() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 10,
            preferred_hours: vec![9],
            blackout_days: vec![],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 480,
        });
        let reserved = cal.reserve(at(23, 1), "a", 10).await;
        assert!(reserved.conflicts.contains(&ConflictReason::PreferredWindow));
    }

    #[tokio::test]
    async fn topic_similarity_requires_flag() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 10,
            preferred_hours: vec![],
            blackout_days: vec![],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.1,
            daily_capacity_minutes: 480,
        });
        cal.reserve(at(8, 1), "how to bake bread", 10).await;
        let second = cal.reserve(at(9, 1), "how to bake bread", 10).await;
        assert!(!second.conflicts.contains(&ConflictReason::TopicSimilarity));
    }

    #[tokio::test]
    async fn topic_similarity_flagged_when_enabled() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 10,
            preferred_hours: vec![],
            blackout_days: vec![],
            detect_topic_conflicts: true,
            topic_similarity_threshold: 0.5,
            daily_capacity_minutes: 480,
        });
        cal.reserve(at(8, 1), "how to bake sourdough bread", 10).await;
        let second = cal.reserve(at(9, 1), "how to bake sourdough bread", 10).await;
        assert!(second.conflicts.contains(&ConflictReason::TopicSimilarity));
    }

    #[tokio::test]
    async fn suggest_optimal_slots_respects_preferred_hours() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 10,
            preferred_hours: vec![9],
            blackout_days: vec![],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 480,
        });
        let suggestions = cal
            .suggest_optimal_slots(2, Some(Utc::now().date_naive()), 7, None)
            .await;
        assert_eq!(suggestions.len(), 2);
        for s in suggestions {
            assert_eq!(s.hour(), 9);
        }
    }

    #[tokio::test]
    async fn suggest_optimal_slots_never_violates_time_conflict_predicates() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 2,
            max_videos_per_day: 1,
            preferred_hours: vec![9, 10, 11],
            blackout_days: vec![],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 480,
        });
        cal.reserve(at(9, 0), "already booked", 10).await;
        let suggestions = cal
            .suggest_optimal_slots(1, Some(Utc::now().date_naive()), 5, None)
            .await;
        assert_eq!(suggestions.len(), 1);
        assert_ne!(suggestions[0].date_naive(), Utc::now().date_naive());
    }

    #[tokio::test]
    async fn content_gaps_excludes_reserved_and_blackout_days() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 10,
            preferred_hours: vec![],
            blackout_days: vec![],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 480,
        });
        let start = Utc::now().date_naive();
        cal.reserve(at(9, 2), "booked", 10).await;
        let gaps = cal.content_gaps(start, start + Duration::days(4)).await;
        assert!(gaps.iter().all(|g| {
            let mut d = g.start;
            while d <= g.end {
                if d == start + Duration::days(2) {
                    return false;
                }
                d += Duration::days(1);
            }
            true
        }));
    }

    #[tokio::test]
    async fn view_reports_utilization_percent() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 10,
            preferred_hours: vec![],
            blackout_days: vec![],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 100,
        });
        cal.reserve(at(9, 1), "a", 50).await;
        let entries = cal
            .view(
                (Utc::now() + Duration::days(1)).date_naive(),
                (Utc::now() + Duration::days(1)).date_naive(),
            )
            .await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].utilization_percent, 50.0);
    }

    #[tokio::test]
    async fn reserve_remove_reserve_yields_identical_status() {
        let (cal, _dir) = calendar_with(CalendarConfig {
            min_gap_hours: 0,
            max_videos_per_day: 10,
            preferred_hours: vec![],
            blackout_days: vec![],
            detect_topic_conflicts: false,
            topic_similarity_threshold: 0.6,
            daily_capacity_minutes: 480,
        });
        let first = cal.reserve(at(9, 1), "a", 10).await;
        assert!(cal.remove(&first.slot.id).await);
        let second = cal.reserve(at(9, 1), "a", 10).await;
        assert_eq!(first.status, second.status);
    }
}

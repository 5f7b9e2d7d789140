//! Error reporting: every error the daemon swallows or returns ends up here.

use crate::error::ServiceError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

/// One distinct error in the cache report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReportItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub count: usize,
    /// Occurrences per minute over the cache age, one decimal
    pub cpm: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ErrorDef {
    kind: String,
    message: String,
}

#[derive(Debug, Default)]
struct CacheInner {
    occurrences: VecDeque<(DateTime<Utc>, u64)>,
    defs: HashMap<u64, ErrorDef>,
}

impl CacheInner {
    fn prune(&mut self, cutoff: Option<DateTime<Utc>>) {
        let Some(cutoff) = cutoff else { return };
        while self.occurrences.front().is_some_and(|(at, _)| *at < cutoff) {
            self.occurrences.pop_front();
        }
        let live: std::collections::HashSet<u64> =
            self.occurrences.iter().map(|(_, hash)| *hash).collect();
        self.defs.retain(|hash, _| live.contains(hash));
    }
}

/// Remembers errors for a retention window, de-duplicated by type and message.
#[derive(Debug)]
pub struct ErrorCache {
    retention: Duration,
    started: DateTime<Utc>,
    inner: Mutex<CacheInner>,
}

impl ErrorCache {
    /// Cache keeping errors for `retention`.
    pub fn new(retention: Duration) -> Self {
        Self::new_at(retention, Utc::now())
    }

    /// Like [`ErrorCache::new`] with an explicit start time.
    pub fn new_at(retention: Duration, started: DateTime<Utc>) -> Self {
        Self {
            retention,
            started,
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Record one occurrence of `err`.
    pub fn record(&self, err: &ServiceError) {
        self.record_at(err, Utc::now());
    }

    /// Record one occurrence of `err` at `now`.
    pub fn record_at(&self, err: &ServiceError, now: DateTime<Utc>) {
        let def = ErrorDef {
            kind: err.kind().to_string(),
            message: err.to_string(),
        };
        let mut hasher = DefaultHasher::new();
        def.kind.hash(&mut hasher);
        def.message.hash(&mut hasher);
        let hash = hasher.finish();

        let mut inner = self.inner.lock();
        inner.prune(self.cutoff(now));
        inner.occurrences.push_back((now, hash));
        inner.defs.entry(hash).or_insert(def);
    }

    /// Distinct live errors, most frequent first. All items share the cache
    /// age, so ranking by count and by `cpm` agree.
    pub fn report(&self) -> Vec<ErrorReportItem> {
        self.report_at(Utc::now())
    }

    /// Like [`ErrorCache::report`] with an explicit clock.
    pub fn report_at(&self, now: DateTime<Utc>) -> Vec<ErrorReportItem> {
        let mut inner = self.inner.lock();
        inner.prune(self.cutoff(now));

        let mut items: HashMap<u64, ErrorReportItem> = HashMap::new();
        for &(at, hash) in &inner.occurrences {
            let Some(def) = inner.defs.get(&hash) else { continue };
            items
                .entry(hash)
                .and_modify(|item| {
                    item.count += 1;
                    item.last_seen = at;
                })
                .or_insert_with(|| ErrorReportItem {
                    kind: def.kind.clone(),
                    message: def.message.clone(),
                    count: 1,
                    cpm: 0.0,
                    first_seen: at,
                    last_seen: at,
                });
        }

        let minutes = self.age_minutes(now);
        let mut report: Vec<ErrorReportItem> = items
            .into_values()
            .map(|mut item| {
                item.cpm = (item.count as f64 / minutes * 10.0).round() / 10.0;
                item
            })
            .collect();
        report.sort_by(|a, b| b.count.cmp(&a.count).then(b.last_seen.cmp(&a.last_seen)));
        report
    }

    /// Number of live occurrences, duplicates included.
    pub fn len(&self) -> usize {
        self.inner.lock().occurrences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Minutes the cache has been collecting, capped at the retention window.
    fn age_minutes(&self, now: DateTime<Utc>) -> f64 {
        let since = match self.cutoff(now) {
            Some(cutoff) if cutoff > self.started => cutoff,
            _ => self.started,
        };
        let secs = (now - since).num_milliseconds() as f64 / 1000.0;
        secs.max(1.0) / 60.0
    }

    fn cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        chrono::Duration::from_std(self.retention)
            .ok()
            .and_then(|retention| now.checked_sub_signed(retention))
    }
}

/// The error collaborator handed to every component.
///
/// Logs through `tracing` and records into the shared [`ErrorCache`].
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    cache: Arc<ErrorCache>,
}

impl ErrorHandler {
    /// Handler recording into `cache`.
    pub fn new(cache: Arc<ErrorCache>) -> Self {
        Self { cache }
    }

    /// Log `err` and record it.
    pub fn report(&self, err: &ServiceError) {
        tracing::error!(kind = err.kind(), "{}", err);
        self.cache.record(err);
    }

    /// The cache behind this handler.
    pub fn cache(&self) -> &Arc<ErrorCache> {
        &self.cache
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(Arc::new(ErrorCache::new(Duration::from_secs(60 * 60))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_are_counted() {
        let cache = ErrorCache::new(Duration::from_secs(60));
        let t0 = Utc::now();
        let err = ServiceError::gpio_error("read failed");
        cache.record_at(&err, t0);
        cache.record_at(&err, t0 + chrono::Duration::seconds(1));
        cache.record_at(&ServiceError::invalid_argument("bad"), t0);

        let report = cache.report_at(t0 + chrono::Duration::seconds(2));
        assert_eq!(report.len(), 2);
        assert_eq!(report[0].kind, "Gpio");
        assert_eq!(report[0].count, 2);
        assert_eq!(report[0].first_seen, t0);
        assert_eq!(report[0].last_seen, t0 + chrono::Duration::seconds(1));
        assert_eq!(report[1].count, 1);
    }

    #[test]
    fn test_count_per_minute() {
        let t0 = Utc::now();
        let cache = ErrorCache::new_at(Duration::from_secs(60 * 60), t0);
        let err = ServiceError::gpio_error("read failed");
        for s in 0..3 {
            cache.record_at(&err, t0 + chrono::Duration::seconds(s));
        }
        cache.record_at(&ServiceError::invalid_argument("bad"), t0);

        // 3 errors over 2 minutes
        let report = cache.report_at(t0 + chrono::Duration::minutes(2));
        assert_eq!(report[0].cpm, 1.5);
        assert_eq!(report[1].cpm, 0.5);

        // 1 error over 7 minutes rounds to one decimal
        let report = cache.report_at(t0 + chrono::Duration::minutes(7));
        assert_eq!(report[1].cpm, 0.1);
    }

    #[test]
    fn test_count_per_minute_uses_retention_window() {
        let t0 = Utc::now();
        let cache = ErrorCache::new_at(Duration::from_secs(10 * 60), t0);
        let now = t0 + chrono::Duration::minutes(30);
        for _ in 0..5 {
            cache.record_at(&ServiceError::gpio_error("late"), now);
        }
        // 5 errors over the 10 minute window, not the 30 minutes since start
        assert_eq!(cache.report_at(now)[0].cpm, 0.5);
    }

    #[test]
    fn test_retention_expires_errors() {
        let cache = ErrorCache::new(Duration::from_secs(60));
        let t0 = Utc::now();
        cache.record_at(&ServiceError::gpio_error("old"), t0);
        assert_eq!(cache.len(), 1);

        let report = cache.report_at(t0 + chrono::Duration::seconds(61));
        assert!(report.is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_handler_records_into_cache() {
        let handler = ErrorHandler::default();
        handler.report(&ServiceError::system_error("boom"));
        assert_eq!(handler.cache().len(), 1);
    }

    #[test]
    fn test_report_serializes_type_field() {
        let cache = ErrorCache::new(Duration::from_secs(60));
        cache.record(&ServiceError::not_found("Command not found"));
        let json = serde_json::to_value(cache.report()).unwrap();
        assert_eq!(json[0]["type"], "NotFound");
        assert_eq!(json[0]["message"], "Not found: Command not found");
        assert!(json[0]["cpm"].is_f64());
    }
}

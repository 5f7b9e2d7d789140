//! Rolling counts and timings of HTTP commands and internal operations.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const BUCKET: Duration = Duration::from_secs(6);
const RETENTION: Duration = Duration::from_secs(6 * 60 * 60);

#[derive(Debug, Clone)]
struct Rollup {
    start: Instant,
    count: u64,
    elapsed_sum_ms: u64,
    elapsed_min_ms: u64,
    elapsed_max_ms: u64,
    is_ping: bool,
}

impl Rollup {
    fn new(start: Instant, is_ping: bool) -> Self {
        Self {
            start,
            count: 0,
            elapsed_sum_ms: 0,
            elapsed_min_ms: u64::MAX,
            elapsed_max_ms: 0,
            is_ping,
        }
    }

    fn add(&mut self, elapsed_ms: u64) {
        self.count += 1;
        self.elapsed_sum_ms += elapsed_ms;
        self.elapsed_min_ms = self.elapsed_min_ms.min(elapsed_ms);
        self.elapsed_max_ms = self.elapsed_max_ms.max(elapsed_ms);
    }
}

/// Summary of one command or operation over the retention window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationSummary {
    pub name: String,
    pub count: u64,
    pub elapsed_avg_ms: f64,
    pub elapsed_min_ms: u64,
    pub elapsed_max_ms: u64,
    pub is_ping: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSummary {
    pub commands: Vec<OperationSummary>,
    pub operations: Vec<OperationSummary>,
}

#[derive(Debug, Default)]
struct Series {
    by_name: HashMap<String, VecDeque<Rollup>>,
}

impl Series {
    fn log(&mut self, name: &str, elapsed: Duration, is_ping: bool, now: Instant) {
        let rollups = self.by_name.entry(name.to_string()).or_default();
        let fresh = rollups
            .back()
            .map_or(true, |r| now.saturating_duration_since(r.start) >= BUCKET);
        if fresh {
            rollups.push_back(Rollup::new(now, is_ping));
        }
        if let Some(current) = rollups.back_mut() {
            current.add(elapsed.as_millis() as u64);
        }
    }

    fn prune(&mut self, now: Instant) {
        if let Some(cutoff) = now.checked_sub(RETENTION) {
            for rollups in self.by_name.values_mut() {
                while rollups.front().is_some_and(|r| r.start < cutoff) {
                    rollups.pop_front();
                }
            }
            self.by_name.retain(|_, rollups| !rollups.is_empty());
        }
    }

    fn summarize(&self) -> Vec<OperationSummary> {
        let mut summaries: Vec<OperationSummary> = self
            .by_name
            .iter()
            .map(|(name, rollups)| {
                let count: u64 = rollups.iter().map(|r| r.count).sum();
                let sum: u64 = rollups.iter().map(|r| r.elapsed_sum_ms).sum();
                OperationSummary {
                    name: name.clone(),
                    count,
                    elapsed_avg_ms: if count > 0 { sum as f64 / count as f64 } else { 0.0 },
                    elapsed_min_ms: rollups.iter().map(|r| r.elapsed_min_ms).min().unwrap_or(0),
                    elapsed_max_ms: rollups.iter().map(|r| r.elapsed_max_ms).max().unwrap_or(0),
                    is_ping: rollups.front().is_some_and(|r| r.is_ping),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}

/// Thread-safe command and operation statistics.
#[derive(Debug, Default)]
pub struct ServiceStats {
    commands: Mutex<Series>,
    operations: Mutex<Series>,
}

impl ServiceStats {
    /// Empty statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log a command received over HTTP. `is_ping` marks status checks that do no work.
    pub fn log_command(&self, name: &str, elapsed: Duration, is_ping: bool) {
        self.log_command_at(name, elapsed, is_ping, Instant::now());
    }

    /// Like [`ServiceStats::log_command`] with an explicit clock.
    pub fn log_command_at(&self, name: &str, elapsed: Duration, is_ping: bool, now: Instant) {
        self.commands.lock().log(name, elapsed, is_ping, now);
    }

    /// Log an internal operation.
    pub fn log_operation(&self, name: &str, elapsed: Duration) {
        self.log_operation_at(name, elapsed, Instant::now());
    }

    /// Like [`ServiceStats::log_operation`] with an explicit clock.
    pub fn log_operation_at(&self, name: &str, elapsed: Duration, now: Instant) {
        self.operations.lock().log(name, elapsed, false, now);
    }

    /// Command and operation rollups for the retention window.
    pub fn summary(&self) -> StatsSummary {
        self.summary_at(Instant::now())
    }

    /// Like [`ServiceStats::summary`] with an explicit clock.
    pub fn summary_at(&self, now: Instant) -> StatsSummary {
        let commands = {
            let mut series = self.commands.lock();
            series.prune(now);
            series.summarize()
        };
        let operations = {
            let mut series = self.operations.lock();
            series.prune(now);
            series.summarize()
        };
        StatsSummary {
            commands,
            operations,
        }
    }
}

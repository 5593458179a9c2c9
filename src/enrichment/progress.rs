//! Pollable job progress.
//!
//! The controller mutates a private working copy and publishes it by
//! replacing the whole snapshot. Readers get an immutable `Arc` and never
//! synchronize with the processing loop beyond that swap.

use super::models::{FailedSalon, JobState};
use super::worker::Charges;
use crate::review_index::CityKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, RwLock};

pub const DEFAULT_LOG_CAPACITY: usize = 100;
pub const MAX_FAILED_SALONS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: i64,
    pub level: LogLevel,
    pub message: String,
}

/// Fixed-capacity circular buffer of job log lines.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRing {
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl LogRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Change the capacity, dropping the oldest entries if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

impl Serialize for LogRing {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.entries.iter())
    }
}

impl<'de> Deserialize<'de> for LogRing {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = Vec::<LogEntry>::deserialize(deserializer)?;
        let mut ring = LogRing::new(entries.len().max(DEFAULT_LOG_CAPACITY));
        for entry in entries {
            ring.push(entry);
        }
        Ok(ring)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostLedger {
    pub places: f64,
    pub generative: f64,
    pub total: f64,
}

impl CostLedger {
    pub fn charge(&mut self, charges: &Charges) {
        self.places += charges.places;
        self.generative += charges.generative;
        self.total = self.places + self.generative;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub job_id: Option<String>,
    pub state: JobState,
    pub is_running: bool,
    /// Why the job last paused on its own, if it did.
    pub pause_reason: Option<String>,
    pub total_salons: usize,
    pub enriched: usize,
    pub failed: usize,
    pub skipped: usize,
    pub costs: CostLedger,
    pub completed_cities: BTreeSet<CityKey>,
    pub failed_salons: Vec<FailedSalon>,
    pub logs: LogRing,
    pub current_salon: Option<String>,
    pub current_city: Option<CityKey>,
    pub queue_length: usize,
    pub cursor: usize,
    pub started_at: Option<i64>,
    pub estimated_time_remaining_secs: Option<u64>,
    pub estimated_remaining_cost: f64,
    pub average_cost_per_salon: f64,
    pub last_updated: i64,
}

impl ProgressSnapshot {
    pub fn idle(log_capacity: usize) -> Self {
        Self {
            job_id: None,
            state: JobState::Idle,
            is_running: false,
            pause_reason: None,
            total_salons: 0,
            enriched: 0,
            failed: 0,
            skipped: 0,
            costs: CostLedger::default(),
            completed_cities: BTreeSet::new(),
            failed_salons: Vec::new(),
            logs: LogRing::new(log_capacity),
            current_salon: None,
            current_city: None,
            queue_length: 0,
            cursor: 0,
            started_at: None,
            estimated_time_remaining_secs: None,
            estimated_remaining_cost: 0.0,
            average_cost_per_salon: 0.0,
            last_updated: chrono::Utc::now().timestamp(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.queue_length.saturating_sub(self.cursor)
    }

    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.logs.push(LogEntry {
            timestamp: chrono::Utc::now().timestamp(),
            level,
            message: message.into(),
        });
    }

    /// Insert or update the failure entry of a salon, keeping one per place id.
    pub fn upsert_failed(&mut self, entry: FailedSalon) {
        if let Some(existing) = self
            .failed_salons
            .iter_mut()
            .find(|f| f.place_id == entry.place_id)
        {
            *existing = entry;
            return;
        }
        self.failed_salons.push(entry);
        if self.failed_salons.len() > MAX_FAILED_SALONS {
            self.failed_salons.remove(0);
        }
    }

    pub fn remove_failed(&mut self, place_id: &str) -> Option<FailedSalon> {
        let pos = self
            .failed_salons
            .iter()
            .position(|f| f.place_id == place_id)?;
        Some(self.failed_salons.remove(pos))
    }

    /// Refresh the derived cost and time estimates.
    ///
    /// `fallback_cost` is used as the average until a salon was charged.
    pub fn update_estimates(
        &mut self,
        average_item_secs: Option<f64>,
        inter_item_delay_secs: f64,
        fallback_cost: f64,
    ) {
        let charged_items = self.enriched + self.failed;
        self.average_cost_per_salon = if charged_items > 0 && self.costs.total > 0.0 {
            self.costs.total / charged_items as f64
        } else {
            fallback_cost
        };

        let remaining = self.remaining();
        self.estimated_remaining_cost = remaining as f64 * self.average_cost_per_salon;
        self.estimated_time_remaining_secs = average_item_secs
            .map(|avg| ((avg + inter_item_delay_secs) * remaining as f64).round() as u64);
        self.last_updated = chrono::Utc::now().timestamp();
    }
}

/// Moving average of the most recent per-item durations.
#[derive(Debug, Clone)]
pub struct DurationAverage {
    window: usize,
    samples: VecDeque<f64>,
}

impl DurationAverage {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
        }
    }

    pub fn record(&mut self, secs: f64) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(secs);
    }

    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
        }
    }
}

/// Latest published snapshot, replaced whole on every write.
pub struct ProgressStore {
    current: RwLock<Arc<ProgressSnapshot>>,
}

impl ProgressStore {
    pub fn new(initial: ProgressSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn get(&self) -> Arc<ProgressSnapshot> {
        self.current.read().unwrap().clone()
    }

    pub fn publish(&self, snapshot: ProgressSnapshot) {
        *self.current.write().unwrap() = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrichment::FailureKind;

    fn failed(place_id: &str, retries: u32) -> FailedSalon {
        FailedSalon {
            place_id: place_id.to_string(),
            name: place_id.to_string(),
            state: "TX".to_string(),
            city: "Austin".to_string(),
            error: "boom".to_string(),
            kind: FailureKind::ProviderError,
            retries,
            failed_at: 0,
        }
    }

    #[test]
    fn test_log_ring_keeps_last_entries() {
        let mut ring = LogRing::new(3);
        for i in 0..5 {
            ring.push(LogEntry {
                timestamp: i,
                level: LogLevel::Info,
                message: format!("line {}", i),
            });
        }
        assert_eq!(ring.len(), 3);
        let messages: Vec<_> = ring.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["line 2", "line 3", "line 4"]);

        ring.set_capacity(1);
        assert_eq!(ring.iter().next().unwrap().message, "line 4");
    }

    #[test]
    fn test_log_ring_serializes_as_list() {
        let mut ring = LogRing::new(2);
        ring.push(LogEntry {
            timestamp: 1,
            level: LogLevel::Warn,
            message: "careful".to_string(),
        });
        let json = serde_json::to_value(&ring).unwrap();
        assert!(json.is_array());
        let back: LogRing = serde_json::from_value(json).unwrap();
        assert_eq!(back.len(), 1);
    }

    #[test]
    fn test_failed_salons_dedup_and_cap() {
        let mut snapshot = ProgressSnapshot::idle(10);
        snapshot.upsert_failed(failed("a", 0));
        snapshot.upsert_failed(failed("a", 1));
        assert_eq!(snapshot.failed_salons.len(), 1);
        assert_eq!(snapshot.failed_salons[0].retries, 1);

        for i in 0..MAX_FAILED_SALONS + 5 {
            snapshot.upsert_failed(failed(&format!("x{}", i), 0));
        }
        assert_eq!(snapshot.failed_salons.len(), MAX_FAILED_SALONS);
        assert!(snapshot.failed_salons.iter().all(|f| f.place_id != "a"));
    }

    #[test]
    fn test_cost_ledger_total() {
        let mut ledger = CostLedger::default();
        for _ in 0..4 {
            ledger.charge(&Charges {
                places: 0.017,
                generative: 0.013,
            });
        }
        assert!((ledger.total - 0.12).abs() < 1e-9);
        assert!((ledger.places - 0.068).abs() < 1e-9);
    }

    #[test]
    fn test_estimates() {
        let mut snapshot = ProgressSnapshot::idle(10);
        snapshot.queue_length = 10;
        snapshot.cursor = 4;
        snapshot.enriched = 4;
        snapshot.costs.charge(&Charges {
            places: 0.068,
            generative: 0.052,
        });

        snapshot.update_estimates(Some(2.0), 4.0, 0.03);
        assert!((snapshot.average_cost_per_salon - 0.03).abs() < 1e-9);
        assert!((snapshot.estimated_remaining_cost - 0.18).abs() < 1e-9);
        assert_eq!(snapshot.estimated_time_remaining_secs, Some(36));
    }

    #[test]
    fn test_duration_average_window() {
        let mut avg = DurationAverage::new(2);
        assert_eq!(avg.average(), None);
        avg.record(1.0);
        avg.record(3.0);
        avg.record(5.0);
        assert_eq!(avg.average(), Some(4.0));
    }

    #[test]
    fn test_store_publishes_whole_snapshots() {
        let store = ProgressStore::new(ProgressSnapshot::idle(10));
        let before = store.get();
        let mut next = (*before).clone();
        next.enriched = 7;
        store.publish(next);
        assert_eq!(before.enriched, 0);
        assert_eq!(store.get().enriched, 7);
    }
}

//! Telemetry Store
//!
//! Append-and-prune time series of `{temperature, output, timestamp,
//! pid_mode}` records (spec §4.8). Buffers writes to amortize the cost of
//! flash storage with limited write endurance: smart recording skips most
//! samples while the machine is `off`, and the buffer only flushes once it
//! fills or the process shuts down.

use crate::classifier::MachineState;
use crate::constants::{
    BATCH_SIZE, OFF_STATE_RECORDING_INTERVAL_MS, RETENTION_DAYS, TELEMETRY_BUFFER_CAP,
};
use crate::pid_engine::EngineMode;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub temperature: f64,
    /// Output as a 0..100 percentage, matching the on-disk schema (spec §6).
    pub output_percent: f64,
    pub timestamp_millis: i64,
    pub pid_mode: RecordMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordMode {
    Normal,
    Recovery,
}

impl From<EngineMode> for RecordMode {
    fn from(mode: EngineMode) -> Self {
        match mode {
            EngineMode::Normal => RecordMode::Normal,
            EngineMode::Recovery => RecordMode::Recovery,
        }
    }
}

/// Backs the time-series collection. A real deployment points this at a
/// small embedded store; for this crate it's an in-process append-only
/// vector guarded by a mutex, which is sufficient to express the same
/// batching and retention contract.
pub trait TelemetrySink: Send + Sync {
    fn flush_batch(&self, records: &[TelemetryRecord]);
    fn prune_before(&self, cutoff_millis: i64);
    fn query(&self, limit: usize, since_millis: Option<i64>) -> Vec<TelemetryRecord>;
}

/// An in-memory sink, also usable directly by tests and the simulator.
pub struct InMemorySink {
    records: parking_lot::Mutex<Vec<TelemetryRecord>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self { records: parking_lot::Mutex::new(Vec::new()) }
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetrySink for InMemorySink {
    fn flush_batch(&self, records: &[TelemetryRecord]) {
        self.records.lock().extend_from_slice(records);
    }

    fn prune_before(&self, cutoff_millis: i64) {
        self.records.lock().retain(|r| r.timestamp_millis >= cutoff_millis);
    }

    fn query(&self, limit: usize, since_millis: Option<i64>) -> Vec<TelemetryRecord> {
        let records = self.records.lock();
        let mut matched: Vec<TelemetryRecord> = records
            .iter()
            .filter(|r| since_millis.map_or(true, |since| r.timestamp_millis > since))
            .copied()
            .collect();
        matched.sort_by_key(|r| r.timestamp_millis);
        if matched.len() > limit {
            let drop = matched.len() - limit;
            matched.drain(0..drop);
        }
        matched
    }
}

/// The buffering, batching, and smart-recording policy layered on top of a
/// `TelemetrySink`.
pub struct TelemetryStore<S: TelemetrySink> {
    sink: S,
    buffer: parking_lot::Mutex<VecDeque<TelemetryRecord>>,
    last_off_record_millis: parking_lot::Mutex<Option<i64>>,
}

impl<S: TelemetrySink> TelemetryStore<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            buffer: parking_lot::Mutex::new(VecDeque::new()),
            last_off_record_millis: parking_lot::Mutex::new(None),
        }
    }

    /// Applies the smart recording policy (spec §4.8) and enqueues the
    /// record if it passes.
    pub fn enqueue_if_recordable(&self, record: TelemetryRecord, state: MachineState) {
        let recordable = match state {
            MachineState::Heating | MachineState::Ready => true,
            MachineState::Off | MachineState::Unknown => {
                let mut last = self.last_off_record_millis.lock();
                let due = last.map_or(true, |t| {
                    record.timestamp_millis - t >= OFF_STATE_RECORDING_INTERVAL_MS
                });
                if due {
                    *last = Some(record.timestamp_millis);
                }
                due
            }
        };

        if !recordable {
            return;
        }

        self.enqueue(record);
    }

    fn enqueue(&self, record: TelemetryRecord) {
        let mut buffer = self.buffer.lock();
        buffer.push_back(record);

        if buffer.len() > TELEMETRY_BUFFER_CAP {
            warn!("telemetry buffer at capacity, dropping oldest record");
            buffer.pop_front();
        }

        if buffer.len() >= BATCH_SIZE {
            let batch: Vec<TelemetryRecord> = buffer.drain(..BATCH_SIZE).collect();
            self.sink.flush_batch(&batch);
        }
    }

    /// Flushes whatever remains in the buffer, regardless of batch size.
    /// Called on graceful shutdown.
    pub fn flush(&self) {
        let mut buffer = self.buffer.lock();
        if buffer.is_empty() {
            return;
        }
        let batch: Vec<TelemetryRecord> = buffer.drain(..).collect();
        self.sink.flush_batch(&batch);
    }

    /// Deletes records older than `RETENTION_DAYS`. Intended to run once
    /// per hour from an independent task.
    pub fn prune_expired(&self, now_millis: i64) {
        let cutoff = now_millis - RETENTION_DAYS * 86_400_000;
        self.sink.prune_before(cutoff);
    }

    pub fn history(&self, limit: usize, since_millis: Option<i64>) -> Vec<TelemetryRecord> {
        self.sink.query(limit, since_millis)
    }

    /// The stock `recent(600)` query: up to 600 most-recent records,
    /// chronologically.
    pub fn recent(&self, now_millis: i64) -> Vec<TelemetryRecord> {
        self.sink.query(600, Some(now_millis - 3_600_000))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(temperature: f64, timestamp_millis: i64) -> TelemetryRecord {
        TelemetryRecord {
            temperature,
            output_percent: 50.0,
            timestamp_millis,
            pid_mode: RecordMode::Normal,
        }
    }

    #[test]
    fn flushes_on_batch_size() {
        let store = TelemetryStore::new(InMemorySink::new());
        for i in 0..BATCH_SIZE {
            store.enqueue_if_recordable(record(90.0, i as i64 * 1000), MachineState::Heating);
        }
        assert_eq!(store.history(100, None).len(), BATCH_SIZE);
    }

    #[test]
    fn off_state_throttles_to_one_record_per_interval() {
        let store = TelemetryStore::new(InMemorySink::new());
        store.enqueue_if_recordable(record(25.0, 0), MachineState::Off);
        store.enqueue_if_recordable(record(25.0, 1000), MachineState::Off);
        store.flush();
        assert_eq!(store.history(10, None).len(), 1);

        store.enqueue_if_recordable(record(25.0, OFF_STATE_RECORDING_INTERVAL_MS), MachineState::Off);
        store.flush();
        assert_eq!(store.history(10, None).len(), 2);
    }

    #[test]
    fn retention_prunes_old_records() {
        let store = TelemetryStore::new(InMemorySink::new());
        store.enqueue_if_recordable(record(90.0, 0), MachineState::Heating);
        store.flush();
        let now = RETENTION_DAYS * 86_400_000 + 1;
        store.prune_expired(now);
        assert!(store.history(10, None).is_empty());
    }

    #[test]
    fn history_returns_ascending_by_timestamp() {
        let store = TelemetryStore::new(InMemorySink::new());
        store.enqueue_if_recordable(record(90.0, 2000), MachineState::Heating);
        store.enqueue_if_recordable(record(91.0, 1000), MachineState::Heating);
        store.flush();
        let history = store.history(10, None);
        assert_eq!(history[0].timestamp_millis, 1000);
        assert_eq!(history[1].timestamp_millis, 2000);
    }
}

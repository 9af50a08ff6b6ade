//! Output sinks for emitted records.
//!
//! Delivery is best-effort: the engine logs a failed `emit` and moves on.

use std::io::Write;
use std::sync::{Arc, Mutex};
use view_telemetry_protocol::TelemetryRecord;

use crate::error::SinkError;

pub trait TelemetrySink: Send {
    fn emit(&mut self, record: &TelemetryRecord) -> Result<(), SinkError>;
}

impl<S: TelemetrySink + ?Sized> TelemetrySink for Box<S> {
    fn emit(&mut self, record: &TelemetryRecord) -> Result<(), SinkError> {
        (**self).emit(record)
    }
}

/// Writes each record as a structured `tracing` event under the
/// `view_telemetry::records` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&mut self, record: &TelemetryRecord) -> Result<(), SinkError> {
        let payload = serde_json::to_string(record)?;
        match record {
            TelemetryRecord::Search(event) => {
                tracing::info!(
                    target: "view_telemetry::records",
                    event = record.kind(),
                    query = %event.query,
                    payload = %payload,
                    "[EVENT] search"
                );
            }
            TelemetryRecord::ViewSearchResult(batch) => {
                tracing::info!(
                    target: "view_telemetry::records",
                    event = record.kind(),
                    trigger = %batch.trigger,
                    count = batch.count,
                    payload = %payload,
                    "[BATCHED EVENT] view_search_result"
                );
            }
        }
        Ok(())
    }
}

/// One JSON document per line, flushed after every record.
pub struct JsonLinesSink<W: Write + Send> {
    writer: W,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> TelemetrySink for JsonLinesSink<W> {
    fn emit(&mut self, record: &TelemetryRecord) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects records in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TelemetryRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn batches(&self) -> Vec<view_telemetry_protocol::ViewBatchEvent> {
        self.records()
            .into_iter()
            .filter_map(|record| match record {
                TelemetryRecord::ViewSearchResult(batch) => Some(batch),
                TelemetryRecord::Search(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&mut self, record: &TelemetryRecord) -> Result<(), SinkError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| SinkError::Rejected("memory sink poisoned".to_string()))?;
        records.push(record.clone());
        Ok(())
    }
}

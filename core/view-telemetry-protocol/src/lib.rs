//! Record and signal shapes for the viewport-visibility telemetry engine.
//!
//! This crate is shared by the engine, its hosts, and downstream consumers of
//! the emitted records so the two output shapes cannot drift. The engine is the
//! authority on when records are produced; consumers can reuse `validate` to
//! check what they receive.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

pub const MAX_ID_LEN: usize = 256;

/// A result item as reported in a batch.
///
/// `position` is the 1-based rank the item had when it entered the viewport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisibleItem {
    pub id: String,
    pub title: String,
    pub position: u32,
}

/// Why a batch was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Stable,
    Click,
    Exit,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Stable => "stable",
            Trigger::Click => "click",
            Trigger::Exit => "exit",
        }
    }

    /// Forced triggers report everything visible and never consume dedup.
    pub fn is_forced(&self) -> bool {
        matches!(self, Trigger::Click | Trigger::Exit)
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchEvent {
    pub query: String,
    pub timestamp: String,
}

impl SearchEvent {
    pub fn new(query: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            query: query.into(),
            timestamp: format_timestamp(at),
        }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        if self.query.trim().is_empty() {
            return Err(ErrorInfo::new("invalid_query", "query is required"));
        }
        require_timestamp(&self.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewBatchEvent {
    pub timestamp: String,
    pub count: usize,
    pub results: Vec<VisibleItem>,
    pub trigger: Trigger,
}

impl ViewBatchEvent {
    /// Builds a batch from `results`, sorting them by position.
    ///
    /// Returns `None` for an empty input; empty batches are never emitted.
    pub fn from_items(
        mut results: Vec<VisibleItem>,
        trigger: Trigger,
        at: DateTime<Utc>,
    ) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        results.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.id.cmp(&b.id)));
        Some(Self {
            timestamp: format_timestamp(at),
            count: results.len(),
            results,
            trigger,
        })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|item| item.id.as_str())
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        require_timestamp(&self.timestamp)?;

        if self.count == 0 || self.results.is_empty() {
            return Err(ErrorInfo::new("empty_batch", "batch must contain results"));
        }
        if self.count != self.results.len() {
            return Err(ErrorInfo::new(
                "count_mismatch",
                format!(
                    "count {} does not match {} results",
                    self.count,
                    self.results.len()
                ),
            ));
        }

        let mut seen = HashSet::new();
        let mut last_position = 0u32;
        for item in &self.results {
            validate_id(&item.id)?;
            if item.position == 0 {
                return Err(ErrorInfo::new(
                    "invalid_position",
                    format!("position for {} must be 1 or greater", item.id),
                ));
            }
            if item.position < last_position {
                return Err(ErrorInfo::new(
                    "unsorted_results",
                    "results must be sorted ascending by position",
                ));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(ErrorInfo::new(
                    "duplicate_id",
                    format!("id {} appears more than once", item.id),
                ));
            }
            last_position = item.position;
        }

        Ok(())
    }
}

/// Everything the engine writes to a sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Search(SearchEvent),
    ViewSearchResult(ViewBatchEvent),
}

impl TelemetryRecord {
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryRecord::Search(_) => "search",
            TelemetryRecord::ViewSearchResult(_) => "view_search_result",
        }
    }

    pub fn as_batch(&self) -> Option<&ViewBatchEvent> {
        match self {
            TelemetryRecord::ViewSearchResult(batch) => Some(batch),
            TelemetryRecord::Search(_) => None,
        }
    }

    pub fn validate(&self) -> Result<(), ErrorInfo> {
        match self {
            TelemetryRecord::Search(event) => event.validate(),
            TelemetryRecord::ViewSearchResult(batch) => batch.validate(),
        }
    }
}

/// Inbound calls from the UI layer, in serialized form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum Signal {
    StartSession {
        query: String,
    },
    Enter {
        id: String,
        title: String,
        position: u32,
    },
    Exit {
        id: String,
    },
    Click {
        id: String,
    },
    Unload,
}

impl Signal {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        match self {
            Signal::StartSession { query } => {
                if query.trim().is_empty() {
                    return Err(ErrorInfo::new("invalid_query", "query is required"));
                }
            }
            Signal::Enter { id, position, .. } => {
                validate_id(id)?;
                if *position == 0 {
                    return Err(ErrorInfo::new(
                        "invalid_position",
                        "position must be 1 or greater",
                    ));
                }
            }
            Signal::Exit { id } | Signal::Click { id } => validate_id(id)?,
            Signal::Unload => {}
        }
        Ok(())
    }
}

pub fn parse_signal(params: Value) -> Result<Signal, ErrorInfo> {
    let signal: Signal = serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_signal",
            format!("signal payload is invalid: {}", err),
        )
    })?;
    signal.validate()?;
    Ok(signal)
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorInfo {}

/// ISO-8601 UTC with millisecond precision, e.g. `2026-01-31T00:00:00.000Z`.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn require_timestamp(value: &str) -> Result<(), ErrorInfo> {
    if DateTime::parse_from_rfc3339(value).is_err() {
        return Err(ErrorInfo::new(
            "invalid_timestamp",
            "timestamp must be RFC3339",
        ));
    }
    Ok(())
}

/// Ids must be non-blank and at most [`MAX_ID_LEN`] bytes.
pub fn validate_id(id: &str) -> Result<(), ErrorInfo> {
    if id.trim().is_empty() {
        return Err(ErrorInfo::new("invalid_id", "id is required"));
    }
    if id.len() > MAX_ID_LEN {
        return Err(ErrorInfo::new(
            "invalid_id",
            format!("id must be {} characters or fewer", MAX_ID_LEN),
        ));
    }
    Ok(())
}

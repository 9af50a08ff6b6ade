//! Signal scripts: one JSON object per line, each with an `at_ms` offset.
//!
//! ```text
//! {"at_ms": 0,   "signal": "start_session", "query": "economy"}
//! {"at_ms": 10,  "signal": "enter", "id": "r1", "title": "Economy outlook", "position": 1}
//! {"at_ms": 400, "signal": "click", "id": "r1"}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Offsets must not
//! decrease.

use serde::Deserialize;
use serde_json::{Map, Value};
use view_telemetry_protocol::{parse_signal, Signal};

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    pub line: usize,
    pub at_ms: u64,
    pub signal: Signal,
}

#[derive(Deserialize)]
struct RawStep {
    at_ms: u64,
    #[serde(flatten)]
    signal: Map<String, Value>,
}

pub fn parse_script(input: &str) -> Result<Vec<ScriptStep>, String> {
    let mut steps = Vec::new();
    let mut last_at = 0u64;

    for (index, raw_line) in input.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let raw: RawStep = serde_json::from_str(trimmed)
            .map_err(|e| format!("line {}: invalid script step: {}", line, e))?;
        if raw.at_ms < last_at {
            return Err(format!(
                "line {}: at_ms {} is earlier than previous step ({})",
                line, raw.at_ms, last_at
            ));
        }
        let signal = parse_signal(Value::Object(raw.signal))
            .map_err(|e| format!("line {}: {}", line, e))?;

        last_at = raw.at_ms;
        steps.push(ScriptStep {
            line,
            at_ms: raw.at_ms,
            signal,
        });
    }

    Ok(steps)
}

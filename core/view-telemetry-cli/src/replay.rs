//! Drives the engine through a parsed script.
//!
//! Virtual replay runs on a `ManualClock`: time jumps straight to each step or
//! timer deadline, so a script runs instantly and deterministically. Realtime
//! replay sleeps between steps and lets the threaded runtime fire timers.

use std::thread;
use std::time::{Duration, Instant};
use view_telemetry_core::{
    EngineStats, ManualClock, SystemClock, TelemetryConfig, TelemetryRuntime,
    TelemetrySink, ViewTelemetryEngine,
};
use view_telemetry_protocol::Signal;

use crate::script::ScriptStep;

const REALTIME_LINGER_PADDING_MS: u64 = 50;

pub fn run_virtual(
    steps: &[ScriptStep],
    config: &TelemetryConfig,
    sink: Box<dyn TelemetrySink>,
) -> Result<EngineStats, String> {
    let clock = ManualClock::new(chrono::Utc::now());
    let mut engine = ViewTelemetryEngine::new(config, clock.clone(), sink)
        .map_err(|e| format!("Failed to create engine: {}", e))?;

    for step in steps {
        advance_to(&mut engine, &clock, Duration::from_millis(step.at_ms));
        if let Err(err) = engine.apply(step.signal.clone()) {
            tracing::warn!(line = step.line, error = %err, "Script step rejected");
        }
    }

    // Let the last quiet period (and any dwell re-check) run out.
    while let Some(deadline) = engine.next_deadline() {
        clock.set(deadline);
        engine.poll_timers();
    }

    let stats = engine.snapshot().stats;
    engine.dispose();
    Ok(stats)
}

fn advance_to(engine: &mut ViewTelemetryEngine, clock: &ManualClock, at: Duration) {
    while let Some(deadline) = engine.next_deadline() {
        if deadline > at {
            break;
        }
        clock.set(deadline);
        engine.poll_timers();
    }
    clock.set(at);
}

fn realtime_linger_ms(config: &TelemetryConfig) -> u64 {
    config
        .stability
        .quiet_period_ms
        .saturating_add(config.stability.min_dwell_ms)
        .saturating_add(REALTIME_LINGER_PADDING_MS)
}

pub fn run_realtime(
    steps: &[ScriptStep],
    config: &TelemetryConfig,
    sink: Box<dyn TelemetrySink>,
) -> Result<EngineStats, String> {
    let clock = SystemClock::new();
    let origin = Instant::now();
    let engine = ViewTelemetryEngine::new(config, clock, sink)
        .map_err(|e| format!("Failed to create engine: {}", e))?;
    let handle = TelemetryRuntime::spawn(engine, &config.runtime)
        .map_err(|e| format!("Failed to start runtime: {}", e))?;

    for step in steps {
        let due = origin + Duration::from_millis(step.at_ms);
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
        match &step.signal {
            Signal::Unload => handle.unload(),
            signal => {
                if let Err(err) = handle.send(signal.clone()) {
                    return Err(format!("line {}: {}", step.line, err));
                }
            }
        }
    }

    let linger = realtime_linger_ms(config);
    thread::sleep(Duration::from_millis(linger));

    let engine = handle
        .shutdown()
        .map_err(|e| format!("Failed to stop runtime: {}", e))?;
    tracing::debug!(
        elapsed_ms = origin.elapsed().as_millis() as u64,
        "Realtime replay finished"
    );
    Ok(engine.snapshot().stats)
}

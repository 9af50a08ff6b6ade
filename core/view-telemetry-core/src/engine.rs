//! ViewTelemetryEngine - the single owner of all tracking state.
//!
//! Signals flow in through the `on_*` handlers and `start_session`; records
//! flow out through the sink. The engine never spawns threads or sleeps. A
//! host either drives it directly (calling `poll_timers` once `next_deadline`
//! has passed) or hands it to [`crate::runtime::TelemetryRuntime`].
//!
//! All handlers are infallible with respect to delivery: sink failures are
//! logged and counted, never returned.

use serde::Serialize;
use std::time::Duration;
use ulid::Ulid;
use view_telemetry_protocol::{validate_id, SearchEvent, Signal, TelemetryRecord, Trigger};

use crate::clock::Clock;
use crate::config::TelemetryConfig;
use crate::emitter::{BatchEmitter, FlushPlan};
use crate::error::{Result, TelemetryError};
use crate::gate::{GateTransition, VisibilityGate};
use crate::scheduler::{StabilityScheduler, StabilityState, TimerReason};
use crate::session::SessionState;
use crate::sink::TelemetrySink;
use crate::tracker::{EnterOutcome, VisibilitySet};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub sessions_started: u64,
    pub batches_emitted: u64,
    pub stable_batches: u64,
    pub forced_batches: u64,
    pub sink_failures: u64,
    pub stale_timers_dropped: u64,
}

/// Read-only diagnostics for hosts and tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineSnapshot {
    pub session_id: Option<String>,
    pub query: Option<String>,
    pub visible: usize,
    pub reported: usize,
    pub stability: StabilityState,
    pub next_deadline_ms: Option<u64>,
    pub disposed: bool,
    pub stats: EngineStats,
}

pub struct ViewTelemetryEngine {
    clock: Box<dyn Clock>,
    sink: Box<dyn TelemetrySink>,
    session: SessionState,
    visible: VisibilitySet,
    scheduler: StabilityScheduler,
    emitter: BatchEmitter,
    gate: VisibilityGate,
    stats: EngineStats,
    disposed: bool,
}

impl ViewTelemetryEngine {
    pub fn new(
        config: &TelemetryConfig,
        clock: impl Clock + 'static,
        sink: impl TelemetrySink + 'static,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            clock: Box::new(clock),
            sink: Box::new(sink),
            session: SessionState::new(),
            visible: VisibilitySet::new(),
            scheduler: StabilityScheduler::new(config.stability.quiet_period()),
            emitter: BatchEmitter::new(config.stability.min_dwell()),
            gate: VisibilityGate::new(config.visibility.threshold),
            stats: EngineStats::default(),
            disposed: false,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Session lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Begins a new session for `query`, discarding everything tracked for
    /// the previous one, then emits its `SearchEvent`.
    pub fn start_session(&mut self, query: &str) -> Result<()> {
        if self.disposed {
            tracing::debug!("start_session ignored on disposed engine");
            return Ok(());
        }
        if query.trim().is_empty() {
            return Err(TelemetryError::EmptyQuery);
        }

        if let Some(timer) = self.scheduler.cancel() {
            tracing::debug!(
                generation = timer.generation,
                reason = ?timer.reason,
                "Cancelled pending stability timer for superseded session"
            );
        }
        self.visible.clear();
        self.emitter.reset();

        let session = self.session.begin(query);
        let session_id = session.id;
        self.stats.sessions_started += 1;
        tracing::info!(session_id = %session_id, query = %query, "Search session started");

        let event = SearchEvent::new(query, self.clock.wall());
        self.emit_record(TelemetryRecord::Search(event));
        Ok(())
    }

    pub fn current_session_id(&self) -> Option<Ulid> {
        self.session.current().map(|session| session.id)
    }

    /// Cancels any pending timer and clears all state. Every later call is a
    /// no-op.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.scheduler.cancel();
        self.visible.clear();
        self.emitter.reset();
        let ended = self.session.end();
        self.disposed = true;
        tracing::info!(
            session_id = ?ended.map(|session| session.id.to_string()),
            batches_emitted = self.stats.batches_emitted,
            "View telemetry engine disposed"
        );
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // ─────────────────────────────────────────────────────────────────────
    // Visibility signals
    // ─────────────────────────────────────────────────────────────────────

    pub fn on_enter(&mut self, id: &str, title: &str, position: u32) -> Result<()> {
        let Some(generation) = self.active_generation("enter") else {
            return Ok(());
        };
        if position == 0 {
            return Err(TelemetryError::InvalidPosition { id: id.to_string() });
        }
        validate_id(id).map_err(|err| TelemetryError::InvalidId {
            reason: err.message,
        })?;

        let now = self.clock.monotonic();
        let outcome = self.visible.enter(id, title, position, now);
        let deadline = self.scheduler.on_change(now, generation);
        let refreshed = outcome == EnterOutcome::Refreshed;
        tracing::debug!(
            id = %id,
            position,
            refreshed,
            visible = self.visible.len(),
            deadline_ms = deadline.as_millis() as u64,
            "Item entered viewport"
        );
        Ok(())
    }

    /// Unknown ids are ignored and do not restart the quiet period.
    pub fn on_exit(&mut self, id: &str) {
        let Some(generation) = self.active_generation("exit") else {
            return;
        };
        if !self.visible.exit(id) {
            tracing::trace!(id = %id, "Exit for item not in visible set");
            return;
        }

        let now = self.clock.monotonic();
        let deadline = self.scheduler.on_change(now, generation);
        tracing::debug!(
            id = %id,
            visible = self.visible.len(),
            deadline_ms = deadline.as_millis() as u64,
            "Item left viewport"
        );
    }

    /// Feeds a raw intersection ratio through the visibility threshold.
    pub fn on_intersection(
        &mut self,
        id: &str,
        title: &str,
        position: u32,
        ratio: f64,
    ) -> Result<()> {
        match self.gate.classify(ratio, self.visible.contains(id)) {
            Some(GateTransition::Entered) => self.on_enter(id, title, position),
            Some(GateTransition::Exited) => {
                self.on_exit(id);
                Ok(())
            }
            None => Ok(()),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Triggers
    // ─────────────────────────────────────────────────────────────────────

    /// Reports everything visible right now. The stability timer is left alone.
    pub fn on_click(&mut self, id: &str) {
        if self.active_generation("click").is_none() {
            return;
        }
        tracing::debug!(
            id = %id,
            clicked_visible = self.visible.contains(id),
            "Result clicked"
        );
        self.flush(Trigger::Click, Trigger::Click.is_forced());
    }

    /// Synchronous last-chance report on page exit.
    pub fn on_unload(&mut self) {
        if self.active_generation("unload").is_none() {
            return;
        }
        self.flush(Trigger::Exit, Trigger::Exit.is_forced());
    }

    /// Fires the stability timer if it has expired. Returns whether a batch
    /// was emitted.
    pub fn poll_timers(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        let now = self.clock.monotonic();
        let Some(timer) = self.scheduler.take_expired(now) else {
            return false;
        };
        if !self.session.is_current(timer.generation) {
            self.stats.stale_timers_dropped += 1;
            tracing::debug!(
                generation = timer.generation,
                "Dropped stability timer from a previous session"
            );
            return false;
        }

        if timer.reason == TimerReason::DwellRecheck {
            tracing::debug!("Dwell re-check elapsed");
        }
        let plan = self.flush(Trigger::Stable, Trigger::Stable.is_forced());
        if let Some(ready_at) = plan.dwell_ready_at {
            if self.scheduler.schedule_recheck(ready_at, timer.generation) {
                tracing::debug!(
                    deadline_ms = ready_at.as_millis() as u64,
                    "Items held back by minimum dwell; re-check scheduled"
                );
            }
        }
        plan.batch.is_some()
    }

    /// Emits a batch for `trigger`. `force` reports every visible item and
    /// leaves dedup state untouched; otherwise only unreported items go out
    /// and are then marked reported.
    pub fn flush(&mut self, trigger: Trigger, force: bool) -> FlushPlan {
        let Some(session_id) = self.current_session_id() else {
            return FlushPlan::default();
        };

        let now = self.clock.monotonic();
        let at = self.clock.wall();
        let plan = self
            .emitter
            .flush(trigger, force, &self.visible, now, at);

        match plan.batch.as_ref() {
            Some(batch) => {
                self.stats.batches_emitted += 1;
                if force {
                    self.stats.forced_batches += 1;
                } else {
                    self.stats.stable_batches += 1;
                }
                tracing::info!(
                    session_id = %session_id,
                    trigger = %trigger,
                    count = batch.count,
                    force,
                    "Emitting view batch"
                );
                self.emit_record(TelemetryRecord::ViewSearchResult(batch.clone()));
            }
            None => {
                tracing::debug!(
                    session_id = %session_id,
                    trigger = %trigger,
                    visible = self.visible.len(),
                    "No candidates; batch skipped"
                );
            }
        }
        plan
    }

    // ─────────────────────────────────────────────────────────────────────
    // Host integration
    // ─────────────────────────────────────────────────────────────────────

    /// Dispatches a serialized inbound signal.
    pub fn apply(&mut self, signal: Signal) -> Result<()> {
        match signal {
            Signal::StartSession { query } => self.start_session(&query),
            Signal::Enter {
                id,
                title,
                position,
            } => self.on_enter(&id, &title, position),
            Signal::Exit { id } => {
                self.on_exit(&id);
                Ok(())
            }
            Signal::Click { id } => {
                self.on_click(&id);
                Ok(())
            }
            Signal::Unload => {
                self.on_unload();
                Ok(())
            }
        }
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        if self.disposed {
            return None;
        }
        self.scheduler.next_deadline()
    }

    /// Current time on the engine's monotonic clock.
    pub fn elapsed(&self) -> Duration {
        self.clock.monotonic()
    }

    /// Time remaining until the next timer, `Duration::ZERO` if already due.
    pub fn time_until_deadline(&self) -> Option<Duration> {
        self.next_deadline()
            .map(|deadline| deadline.saturating_sub(self.elapsed()))
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let session = self.session.current();
        EngineSnapshot {
            session_id: session.map(|session| session.id.to_string()),
            query: session.map(|session| session.query.clone()),
            visible: self.visible.len(),
            reported: self.emitter.reported_count(),
            stability: self.scheduler.state(),
            next_deadline_ms: self
                .next_deadline()
                .map(|deadline| deadline.as_millis() as u64),
            disposed: self.disposed,
            stats: self.stats.clone(),
        }
    }

    fn active_generation(&self, signal: &str) -> Option<u64> {
        if self.disposed {
            tracing::trace!(signal, "Signal ignored on disposed engine");
            return None;
        }
        let generation = self.session.current_generation();
        if generation.is_none() {
            tracing::debug!(signal, "Signal ignored outside a search session");
        }
        generation
    }

    fn emit_record(&mut self, record: TelemetryRecord) {
        if let Err(err) = self.sink.emit(&record) {
            self.stats.sink_failures += 1;
            tracing::warn!(error = %err, event = record.kind(), "Failed to deliver telemetry record");
        }
    }
}

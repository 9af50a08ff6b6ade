//! Threaded host for the engine.
//!
//! The engine moves onto a single worker thread and every signal reaches it
//! over one `mpsc` channel, so signals and timer expiries are processed on the
//! same thread in arrival order. The worker blocks in `recv_timeout` until the
//! scheduler's next deadline; there is no separate timer thread to cancel.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use view_telemetry_protocol::{validate_id, Signal};

use crate::config::RuntimeConfig;
use crate::engine::{EngineSnapshot, ViewTelemetryEngine};
use crate::error::{Result, TelemetryError};

const WORKER_THREAD_NAME: &str = "view-telemetry";

enum Command {
    Signal(Signal),
    Intersection {
        id: String,
        title: String,
        position: u32,
        ratio: f64,
    },
    Unload(SyncSender<()>),
    Snapshot(Sender<EngineSnapshot>),
    Shutdown,
}

pub struct TelemetryRuntime;

impl TelemetryRuntime {
    pub fn spawn(engine: ViewTelemetryEngine, config: &RuntimeConfig) -> Result<TelemetryHandle> {
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || run_worker(engine, rx))
            .map_err(TelemetryError::Spawn)?;

        tracing::debug!("View telemetry worker started");
        Ok(TelemetryHandle {
            tx,
            worker: Some(worker),
            unload_ack_timeout: config.unload_ack_timeout(),
        })
    }
}

/// Owning handle to a running worker. Dropping it shuts the worker down.
pub struct TelemetryHandle {
    tx: Sender<Command>,
    worker: Option<JoinHandle<ViewTelemetryEngine>>,
    unload_ack_timeout: Duration,
}

impl TelemetryHandle {
    pub fn send(&self, signal: Signal) -> Result<()> {
        self.tx
            .send(Command::Signal(signal))
            .map_err(|_| TelemetryError::RuntimeStopped)
    }

    pub fn start_session(&self, query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(TelemetryError::EmptyQuery);
        }
        self.send(Signal::StartSession {
            query: query.to_string(),
        })
    }

    pub fn enter(&self, id: &str, title: &str, position: u32) -> Result<()> {
        if position == 0 {
            return Err(TelemetryError::InvalidPosition { id: id.to_string() });
        }
        validate_id(id).map_err(|err| TelemetryError::InvalidId {
            reason: err.message,
        })?;
        self.send(Signal::Enter {
            id: id.to_string(),
            title: title.to_string(),
            position,
        })
    }

    pub fn exit(&self, id: &str) -> Result<()> {
        self.send(Signal::Exit { id: id.to_string() })
    }

    pub fn intersection(&self, id: &str, title: &str, position: u32, ratio: f64) -> Result<()> {
        self.tx
            .send(Command::Intersection {
                id: id.to_string(),
                title: title.to_string(),
                position,
                ratio,
            })
            .map_err(|_| TelemetryError::RuntimeStopped)
    }

    pub fn click(&self, id: &str) -> Result<()> {
        self.send(Signal::Click { id: id.to_string() })
    }

    /// Blocks until the exit flush has been written or the ack timeout
    /// elapses. Never fails; problems are logged and dropped.
    pub fn unload(&self) {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if self.tx.send(Command::Unload(ack_tx)).is_err() {
            tracing::warn!("Unload flush skipped: telemetry worker not running");
            return;
        }
        if let Err(err) = ack_rx.recv_timeout(self.unload_ack_timeout) {
            tracing::warn!(
                error = %err,
                timeout_ms = self.unload_ack_timeout.as_millis() as u64,
                "Unload flush not acknowledged"
            );
        }
    }

    pub fn snapshot(&self) -> Result<EngineSnapshot> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Command::Snapshot(reply_tx))
            .map_err(|_| TelemetryError::RuntimeStopped)?;
        reply_rx.recv().map_err(|_| TelemetryError::RuntimeStopped)
    }

    /// Disposes the engine and joins the worker, returning the engine.
    pub fn shutdown(mut self) -> Result<ViewTelemetryEngine> {
        self.stop().ok_or(TelemetryError::RuntimeStopped)
    }

    fn stop(&mut self) -> Option<ViewTelemetryEngine> {
        let worker = self.worker.take()?;
        let _ = self.tx.send(Command::Shutdown);
        match worker.join() {
            Ok(engine) => Some(engine),
            Err(_) => {
                tracing::warn!("View telemetry worker panicked");
                None
            }
        }
    }
}

impl Drop for TelemetryHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(mut engine: ViewTelemetryEngine, rx: Receiver<Command>) -> ViewTelemetryEngine {
    loop {
        let command = match engine.time_until_deadline() {
            Some(wait) if wait.is_zero() => {
                engine.poll_timers();
                continue;
            }
            Some(wait) => match rx.recv_timeout(wait) {
                Ok(command) => command,
                Err(RecvTimeoutError::Timeout) => {
                    engine.poll_timers();
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(command) => command,
                Err(_) => break,
            },
        };

        // A timer that expired while the command was in flight fires first.
        engine.poll_timers();

        match command {
            Command::Signal(signal) => {
                if let Err(err) = engine.apply(signal) {
                    tracing::warn!(error = %err, "Rejected telemetry signal");
                }
            }
            Command::Intersection {
                id,
                title,
                position,
                ratio,
            } => {
                if let Err(err) = engine.on_intersection(&id, &title, position, ratio) {
                    tracing::warn!(error = %err, "Rejected intersection update");
                }
            }
            Command::Unload(ack) => {
                engine.on_unload();
                let _ = ack.try_send(());
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(engine.snapshot());
            }
            Command::Shutdown => break,
        }
    }

    engine.dispose();
    tracing::debug!("View telemetry worker stopped");
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::TelemetryConfig;
    use crate::sink::MemorySink;
    use std::time::Instant;
    use view_telemetry_protocol::Trigger;

    fn spawn(quiet_period_ms: u64) -> (TelemetryHandle, MemorySink) {
        let mut config = TelemetryConfig::default();
        config.stability.quiet_period_ms = quiet_period_ms;
        let sink = MemorySink::new();
        let engine =
            ViewTelemetryEngine::new(&config, SystemClock::new(), sink.clone()).expect("engine");
        let handle = TelemetryRuntime::spawn(engine, &config.runtime).expect("spawn");
        (handle, sink)
    }

    fn wait_for_batches(sink: &MemorySink, count: usize, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if sink.batches().len() >= count {
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        panic!("Timed out waiting for {} batches", count);
    }

    #[test]
    fn stable_batch_fires_after_quiet_period() {
        let (handle, sink) = spawn(50);
        handle.start_session("economy").expect("start");
        handle.enter("A", "A", 1).expect("enter");
        handle.enter("B", "B", 2).expect("enter");

        wait_for_batches(&sink, 1, Duration::from_secs(2));
        let batches = sink.batches();
        assert_eq!(batches[0].trigger, Trigger::Stable);
        assert_eq!(batches[0].ids().collect::<Vec<_>>(), vec!["A", "B"]);
    }

    #[test]
    fn unload_is_flushed_before_returning() {
        let (handle, sink) = spawn(10_000);
        handle.start_session("economy").expect("start");
        handle.enter("A", "A", 1).expect("enter");
        handle.unload();

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].trigger, Trigger::Exit);
    }

    #[test]
    fn shutdown_cancels_pending_timer() {
        let (handle, sink) = spawn(100);
        handle.start_session("economy").expect("start");
        handle.enter("A", "A", 1).expect("enter");
        let engine = handle.shutdown().expect("shutdown");

        assert!(engine.is_disposed());
        thread::sleep(Duration::from_millis(200));
        assert!(sink.batches().is_empty());
    }

    #[test]
    fn snapshot_reflects_processed_signals() {
        let (handle, _sink) = spawn(10_000);
        handle.start_session("economy").expect("start");
        handle.intersection("A", "A", 1, 0.5).expect("ratio");
        handle.intersection("B", "B", 2, 0.01).expect("ratio");

        let snapshot = handle.snapshot().expect("snapshot");
        assert_eq!(snapshot.visible, 1);
        assert_eq!(snapshot.query.as_deref(), Some("economy"));
    }

    #[test]
    fn handle_rejects_invalid_input_without_sending() {
        let (handle, sink) = spawn(10_000);
        assert!(matches!(
            handle.start_session(""),
            Err(TelemetryError::EmptyQuery)
        ));
        assert!(matches!(
            handle.enter("A", "A", 0),
            Err(TelemetryError::InvalidPosition { .. })
        ));
        assert!(matches!(
            handle.enter(&"x".repeat(view_telemetry_protocol::MAX_ID_LEN + 1), "A", 1),
            Err(TelemetryError::InvalidId { .. })
        ));
        drop(handle);
        assert!(sink.is_empty());
    }
}

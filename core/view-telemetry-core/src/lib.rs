//! # view-telemetry-core
//!
//! Viewport-visibility telemetry engine. Watches which search results are in
//! view, waits for the visible set to settle, and reports each item once per
//! search session, with forced snapshots on result click and page exit.
//!
//! ## Design Principles
//!
//! - **Synchronous**: No async runtime dependency. Timers are deadlines the
//!   host polls; [`runtime::TelemetryRuntime`] is one such host.
//! - **Single owner**: One engine instance owns the visible set, the reported
//!   set, and the timer. Nothing outside reads or mutates them.
//! - **Best-effort delivery**: Sink failures are logged, never propagated.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use view_telemetry_core::{SystemClock, TelemetryConfig, TracingSink, ViewTelemetryEngine};
//!
//! let mut engine = ViewTelemetryEngine::new(&TelemetryConfig::default(), SystemClock::new(), TracingSink)?;
//! engine.start_session("economy")?;
//! engine.on_enter("r1", "Economy outlook", 1)?;
//! // ...once engine.next_deadline() has passed:
//! engine.poll_timers();
//! ```

pub mod clock;
pub mod config;
pub mod emitter;
pub mod engine;
pub mod error;
pub mod gate;
pub mod runtime;
pub mod scheduler;
pub mod session;
pub mod sink;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{load_config, SinkConfig, SinkKind, TelemetryConfig};
pub use engine::{EngineSnapshot, EngineStats, ViewTelemetryEngine};
pub use error::{Result, SinkError, TelemetryError};
pub use runtime::{TelemetryHandle, TelemetryRuntime};
pub use scheduler::StabilityState;
pub use sink::{JsonLinesSink, MemorySink, TelemetrySink, TracingSink};

pub use view_telemetry_protocol as protocol;

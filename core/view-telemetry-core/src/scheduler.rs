//! Stability scheduler: a debounced quiet-period timer.
//!
//! ## State Machine
//!
//! ```text
//! Stable   --change-->        Settling (timer = now + quiet_period)
//! Settling --change-->        Settling (timer restarted)
//! Settling --timer expires--> Stable   (caller flushes with trigger "stable")
//! any      --cancel-->        Stable   (timer dropped, never fires)
//! ```
//!
//! The scheduler owns no thread. Hosts ask for `next_deadline()` and call
//! `take_expired()` once that instant has passed.

use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StabilityState {
    Stable,
    Settling,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerReason {
    /// The visible set changed.
    QuietPeriod,
    /// Items were held back by minimum dwell and are due for another look.
    DwellRecheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTimer {
    pub deadline: Duration,
    /// Session generation the timer was armed in.
    pub generation: u64,
    pub reason: TimerReason,
}

#[derive(Debug)]
pub struct StabilityScheduler {
    quiet_period: Duration,
    pending: Option<PendingTimer>,
}

impl StabilityScheduler {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: None,
        }
    }

    pub fn state(&self) -> StabilityState {
        if self.pending.is_some() {
            StabilityState::Settling
        } else {
            StabilityState::Stable
        }
    }

    /// Starts or restarts the quiet-period timer after a change at `now`.
    pub fn on_change(&mut self, now: Duration, generation: u64) -> Duration {
        let deadline = now + self.quiet_period;
        if let Some(previous) = self.pending.as_ref() {
            tracing::trace!(
                previous_deadline_ms = previous.deadline.as_millis() as u64,
                deadline_ms = deadline.as_millis() as u64,
                "Quiet-period timer restarted"
            );
        }
        self.pending = Some(PendingTimer {
            deadline,
            generation,
            reason: TimerReason::QuietPeriod,
        });
        deadline
    }

    /// Arms a dwell re-check unless a timer is already pending.
    pub fn schedule_recheck(&mut self, deadline: Duration, generation: u64) -> bool {
        if self.pending.is_some() {
            return false;
        }
        self.pending = Some(PendingTimer {
            deadline,
            generation,
            reason: TimerReason::DwellRecheck,
        });
        true
    }

    pub fn cancel(&mut self) -> Option<PendingTimer> {
        self.pending.take()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending.as_ref().map(|timer| timer.deadline)
    }

    pub fn pending(&self) -> Option<&PendingTimer> {
        self.pending.as_ref()
    }

    /// Removes and returns the pending timer if it has expired by `now`.
    ///
    /// The returned timer may belong to an older session; callers compare
    /// `generation` before acting on it.
    pub fn take_expired(&mut self, now: Duration) -> Option<PendingTimer> {
        match self.pending {
            Some(timer) if now >= timer.deadline => self.pending.take(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(1000);

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn starts_stable_without_timer() {
        let scheduler = StabilityScheduler::new(QUIET);
        assert_eq!(scheduler.state(), StabilityState::Stable);
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn change_moves_to_settling_with_quiet_deadline() {
        let mut scheduler = StabilityScheduler::new(QUIET);
        assert_eq!(scheduler.on_change(ms(200), 1), ms(1200));
        assert_eq!(scheduler.state(), StabilityState::Settling);
    }

    #[test]
    fn further_change_restarts_timer() {
        let mut scheduler = StabilityScheduler::new(QUIET);
        scheduler.on_change(ms(0), 1);
        scheduler.on_change(ms(600), 1);
        assert!(scheduler.take_expired(ms(1000)).is_none());
        let fired = scheduler.take_expired(ms(1600)).expect("expired");
        assert_eq!(fired.deadline, ms(1600));
        assert_eq!(scheduler.state(), StabilityState::Stable);
    }

    #[test]
    fn take_expired_fires_once() {
        let mut scheduler = StabilityScheduler::new(QUIET);
        scheduler.on_change(ms(0), 1);
        assert!(scheduler.take_expired(ms(1000)).is_some());
        assert!(scheduler.take_expired(ms(5000)).is_none());
    }

    #[test]
    fn cancelled_timer_never_expires() {
        let mut scheduler = StabilityScheduler::new(QUIET);
        scheduler.on_change(ms(0), 1);
        assert!(scheduler.cancel().is_some());
        assert!(scheduler.take_expired(ms(10_000)).is_none());
        assert_eq!(scheduler.state(), StabilityState::Stable);
    }

    #[test]
    fn recheck_does_not_displace_pending_quiet_timer() {
        let mut scheduler = StabilityScheduler::new(QUIET);
        scheduler.on_change(ms(0), 1);
        assert!(!scheduler.schedule_recheck(ms(300), 1));
        assert_eq!(scheduler.next_deadline(), Some(ms(1000)));

        scheduler.cancel();
        assert!(scheduler.schedule_recheck(ms(300), 1));
        assert_eq!(
            scheduler.pending().map(|timer| timer.reason),
            Some(TimerReason::DwellRecheck)
        );
    }

    #[test]
    fn change_replaces_recheck() {
        let mut scheduler = StabilityScheduler::new(QUIET);
        scheduler.schedule_recheck(ms(300), 1);
        scheduler.on_change(ms(100), 1);
        let pending = scheduler.pending().expect("pending");
        assert_eq!(pending.reason, TimerReason::QuietPeriod);
        assert_eq!(pending.deadline, ms(1100));
    }
}

//! Dedup & batch assembly.
//!
//! Stable flushes report only items not yet reported in the session and
//! consume them. Forced flushes (click, exit) report everything visible and
//! leave the reported set untouched.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::time::Duration;
use view_telemetry_protocol::{Trigger, ViewBatchEvent, VisibleItem};

use crate::tracker::VisibilitySet;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FlushPlan {
    pub batch: Option<ViewBatchEvent>,
    /// Earliest instant a held-back (too-short dwell) item becomes eligible.
    pub dwell_ready_at: Option<Duration>,
}

#[derive(Debug, Default)]
pub struct BatchEmitter {
    reported: HashSet<String>,
    min_dwell: Duration,
}

impl BatchEmitter {
    pub fn new(min_dwell: Duration) -> Self {
        Self {
            reported: HashSet::new(),
            min_dwell,
        }
    }

    pub fn is_reported(&self, id: &str) -> bool {
        self.reported.contains(id)
    }

    pub fn reported_count(&self) -> usize {
        self.reported.len()
    }

    pub fn reset(&mut self) {
        self.reported.clear();
    }

    /// Builds the batch for `trigger`. Unless `force` is set, only unreported
    /// items are candidates and the emitted ones are marked as reported.
    pub fn flush(
        &mut self,
        trigger: Trigger,
        force: bool,
        visible: &VisibilitySet,
        now: Duration,
        at: DateTime<Utc>,
    ) -> FlushPlan {
        let mut candidates: Vec<VisibleItem> = Vec::new();
        let mut dwell_ready_at: Option<Duration> = None;

        for (id, item) in visible.iter() {
            if force {
                candidates.push(VisibilitySet::to_visible_item(id, item));
                continue;
            }
            if self.reported.contains(id) {
                continue;
            }
            if item.dwell(now) < self.min_dwell {
                let ready_at = item.entered_at + self.min_dwell;
                dwell_ready_at = Some(match dwell_ready_at {
                    Some(current) => current.min(ready_at),
                    None => ready_at,
                });
                continue;
            }
            candidates.push(VisibilitySet::to_visible_item(id, item));
        }

        let batch = ViewBatchEvent::from_items(candidates, trigger, at);
        if let (Some(batch), false) = (batch.as_ref(), force) {
            self.reported
                .extend(batch.results.iter().map(|item| item.id.clone()));
        }

        FlushPlan {
            batch,
            dwell_ready_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap()
    }

    fn visible(items: &[(&str, u32)]) -> VisibilitySet {
        let mut set = VisibilitySet::new();
        for (id, position) in items {
            set.enter(id, &format!("Title {}", id), *position, ms(0));
        }
        set
    }

    fn ids(plan: &FlushPlan) -> Vec<String> {
        plan.batch
            .as_ref()
            .map(|batch| batch.ids().map(str::to_string).collect())
            .unwrap_or_default()
    }

    #[test]
    fn stable_flush_reports_sorted_and_consumes() {
        let mut emitter = BatchEmitter::new(Duration::ZERO);
        let set = visible(&[("b", 2), ("a", 1)]);

        let plan = emitter.flush(Trigger::Stable, false, &set, ms(1000), at());
        assert_eq!(ids(&plan), vec!["a", "b"]);
        assert!(emitter.is_reported("a") && emitter.is_reported("b"));

        let again = emitter.flush(Trigger::Stable, false, &set, ms(2000), at());
        assert!(again.batch.is_none());
    }

    #[test]
    fn stable_flush_excludes_only_reported_ids() {
        let mut emitter = BatchEmitter::new(Duration::ZERO);
        emitter.flush(Trigger::Stable, false, &visible(&[("a", 1)]), ms(1000), at());

        let plan = emitter.flush(Trigger::Stable, false, &visible(&[("a", 1), ("c", 3)]), ms(2000), at());
        assert_eq!(ids(&plan), vec!["c"]);
    }

    #[test]
    fn forced_flush_ignores_dedup_and_does_not_consume() {
        let mut emitter = BatchEmitter::new(Duration::ZERO);
        let set = visible(&[("a", 1), ("b", 2)]);
        emitter.flush(Trigger::Stable, false, &visible(&[("a", 1)]), ms(1000), at());

        let click = emitter.flush(Trigger::Click, true, &set, ms(1100), at());
        assert_eq!(ids(&click), vec!["a", "b"]);
        assert_eq!(click.batch.as_ref().map(|b| b.trigger), Some(Trigger::Click));
        assert!(!emitter.is_reported("b"));
        assert_eq!(emitter.reported_count(), 1);
    }

    #[test]
    fn empty_visible_set_produces_no_batch() {
        let mut emitter = BatchEmitter::new(Duration::ZERO);
        let plan = emitter.flush(Trigger::Exit, true, &VisibilitySet::new(), ms(0), at());
        assert_eq!(plan, FlushPlan::default());
    }

    #[test]
    fn reset_allows_reporting_again() {
        let mut emitter = BatchEmitter::new(Duration::ZERO);
        let set = visible(&[("a", 1)]);
        emitter.flush(Trigger::Stable, false, &set, ms(1000), at());
        emitter.reset();
        assert_eq!(ids(&emitter.flush(Trigger::Stable, false, &set, ms(2000), at())), vec!["a"]);
    }

    #[test]
    fn min_dwell_holds_back_recent_items_for_stable_only() {
        let mut emitter = BatchEmitter::new(ms(500));
        let mut set = visible(&[("a", 1)]);
        set.enter("b", "Title b", 2, ms(800));

        let plan = emitter.flush(Trigger::Stable, false, &set, ms(1000), at());
        assert_eq!(ids(&plan), vec!["a"]);
        assert_eq!(plan.dwell_ready_at, Some(ms(1300)));
        assert!(!emitter.is_reported("b"));

        let click = emitter.flush(Trigger::Click, true, &set, ms(1000), at());
        assert_eq!(ids(&click), vec!["a", "b"]);
        assert_eq!(click.dwell_ready_at, None);
    }
}

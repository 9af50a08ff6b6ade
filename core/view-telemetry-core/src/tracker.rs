//! The visible set: which result items are in the viewport right now.

use std::collections::HashMap;
use std::time::Duration;
use view_telemetry_protocol::VisibleItem;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedItem {
    pub title: String,
    pub position: u32,
    /// Monotonic time of the enter that began the current visibility span.
    pub entered_at: Duration,
}

impl TrackedItem {
    pub fn dwell(&self, now: Duration) -> Duration {
        now.saturating_sub(self.entered_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnterOutcome {
    Inserted,
    /// Already visible; title and position overwritten, dwell kept.
    Refreshed,
}

#[derive(Debug, Default)]
pub struct VisibilitySet {
    items: HashMap<String, TrackedItem>,
}

impl VisibilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&mut self, id: &str, title: &str, position: u32, now: Duration) -> EnterOutcome {
        match self.items.get_mut(id) {
            Some(item) => {
                item.title = title.to_string();
                item.position = position;
                EnterOutcome::Refreshed
            }
            None => {
                self.items.insert(
                    id.to_string(),
                    TrackedItem {
                        title: title.to_string(),
                        position,
                        entered_at: now,
                    },
                );
                EnterOutcome::Inserted
            }
        }
    }

    /// Returns whether `id` was visible.
    pub fn exit(&mut self, id: &str) -> bool {
        self.items.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&TrackedItem> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TrackedItem)> {
        self.items.iter().map(|(id, item)| (id.as_str(), item))
    }

    pub fn to_visible_item(id: &str, item: &TrackedItem) -> VisibleItem {
        VisibleItem {
            id: id.to_string(),
            title: item.title.clone(),
            position: item.position,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn enter_inserts_and_exit_removes() {
        let mut set = VisibilitySet::new();
        assert_eq!(set.enter("a", "A", 1, ms(0)), EnterOutcome::Inserted);
        assert!(set.contains("a"));
        assert!(set.exit("a"));
        assert!(set.is_empty());
    }

    #[test]
    fn exit_unknown_id_is_noop() {
        let mut set = VisibilitySet::new();
        set.enter("a", "A", 1, ms(0));
        assert!(!set.exit("missing"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn repeated_enter_overwrites_position_but_keeps_dwell_start() {
        let mut set = VisibilitySet::new();
        set.enter("a", "A", 1, ms(0));
        assert_eq!(set.enter("a", "A2", 4, ms(700)), EnterOutcome::Refreshed);

        let item = set.get("a").expect("tracked");
        assert_eq!(item.position, 4);
        assert_eq!(item.title, "A2");
        assert_eq!(item.entered_at, ms(0));
        assert_eq!(item.dwell(ms(900)), ms(900));
    }

    #[test]
    fn enter_after_exit_starts_new_dwell_span() {
        let mut set = VisibilitySet::new();
        set.enter("a", "A", 1, ms(0));
        set.exit("a");
        set.enter("a", "A", 2, ms(500));
        assert_eq!(set.get("a").map(|item| item.entered_at), Some(ms(500)));
    }
}

//! Intersection-ratio gate.
//!
//! Turns raw intersection ratios into enter/exit transitions using a single
//! threshold (default 0.1: an item counts as visible once 10% of its area is
//! inside the viewport). Repeated ratios on the same side of the threshold
//! produce nothing.

use crate::config::DEFAULT_VISIBILITY_THRESHOLD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    Entered,
    Exited,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityGate {
    threshold: f64,
}

impl VisibilityGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn is_visible(&self, ratio: f64) -> bool {
        ratio >= self.threshold
    }

    /// `currently_visible` is the item's membership in the visible set.
    pub fn classify(&self, ratio: f64, currently_visible: bool) -> Option<GateTransition> {
        match (self.is_visible(ratio), currently_visible) {
            (true, false) => Some(GateTransition::Entered),
            (false, true) => Some(GateTransition::Exited),
            _ => None,
        }
    }
}

impl Default for VisibilityGate {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_THRESHOLD)
    }
}

// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! "Consumed since midnight" per counter.

use crate::baseline::{BaselineTransition, DailyBaseline, DayTracker};
use crate::input::CounterSample;
use serde::{Deserialize, Serialize};

/// Usage since the baseline, floored at zero.
///
/// Negative differences are data artifacts (stale reading racing a
/// rollover), never physical usage.
pub fn daily_delta(current_value_l: f64, baseline_value_l: f64) -> f64 {
    (current_value_l - baseline_value_l).max(0.0)
}

/// Result of feeding one sample through a counter's tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CounterDelta {
    /// Today's usage, `None` when this cycle's sample was invalid.
    pub today_l: Option<f64>,
    pub transition: BaselineTransition,
}

/// Advance a tracker with a sample and compute today's usage from it.
pub fn advance(tracker: &mut DayTracker, sample: &CounterSample) -> CounterDelta {
    let transition = tracker.observe(sample);
    let today_l = match (transition, tracker.baseline()) {
        (BaselineTransition::Skipped, _) | (_, None) => None,
        (_, Some(DailyBaseline {
            baseline_value,
            last_known_value,
            ..
        })) => Some(daily_delta(*last_known_value, *baseline_value)),
    };
    CounterDelta { today_l, transition }
}

/// Daily deltas of both counters for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyDeltas {
    pub house: CounterDelta,
    pub softened: CounterDelta,
}

impl DailyDeltas {
    pub fn both_valid(&self) -> Option<(f64, f64)> {
        self.house.today_l.zip(self.softened.today_l)
    }
}

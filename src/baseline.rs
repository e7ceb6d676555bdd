// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Day boundary tracking.
//!
//! Each cumulative counter keeps the value it had at the start of the local
//! calendar day. There is no midnight job: the first valid sample carrying a
//! new local date rolls the baseline forward to that sample's own value, so
//! the first delta of a day is always zero even after the device was silent
//! across midnight.

use crate::input::CounterSample;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle of a tracked counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineState {
    Uninitialized,
    Tracking,
}

/// Counter value captured at the start of the local day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBaseline {
    pub baseline_value: f64,
    pub baseline_date: NaiveDate,
    /// Most recent valid sample.
    pub last_known_value: f64,
}

impl DailyBaseline {
    pub fn capture(value: f64, date: NaiveDate) -> Self {
        Self {
            baseline_value: value,
            baseline_date: date,
            last_known_value: value,
        }
    }
}

/// What a sample did to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaselineTransition {
    /// First valid sample since cold start.
    Captured,
    /// Local date changed; baseline moved to this sample.
    Rollover,
    /// Counter went below the baseline mid-day (upstream reset).
    Reanchored,
    /// Same day, baseline kept.
    Unchanged,
    /// Sample invalid, nothing touched.
    Skipped,
}

/// Whether a baseline stored for `baseline_date` must be replaced by a
/// sample taken on `today`.
///
/// Any date mismatch counts, including a stored date in the future (state
/// restored from a clock that ran ahead).
pub fn needs_rollover(today: NaiveDate, baseline_date: NaiveDate) -> bool {
    today != baseline_date
}

/// Baseline tracker for one counter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DayTracker {
    baseline: Option<DailyBaseline>,
}

impl DayTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore a tracker from a persisted baseline.
    pub fn from_baseline(baseline: DailyBaseline) -> Self {
        Self {
            baseline: Some(baseline),
        }
    }

    pub fn state(&self) -> BaselineState {
        match self.baseline {
            Some(_) => BaselineState::Tracking,
            None => BaselineState::Uninitialized,
        }
    }

    pub fn baseline(&self) -> Option<&DailyBaseline> {
        self.baseline.as_ref()
    }

    pub fn last_known_value(&self) -> Option<f64> {
        self.baseline.map(|b| b.last_known_value)
    }

    /// Feed one sample. Invalid samples leave the tracker untouched.
    pub fn observe(&mut self, sample: &CounterSample) -> BaselineTransition {
        let value = match sample.valid_value() {
            Some(v) => v,
            None => return BaselineTransition::Skipped,
        };
        let today = sample.local_date();

        let (next, transition) = match self.baseline {
            None => (DailyBaseline::capture(value, today), BaselineTransition::Captured),
            Some(b) if needs_rollover(today, b.baseline_date) => {
                log::debug!(
                    "day rollover {} -> {}: baseline {} -> {}",
                    b.baseline_date,
                    today,
                    b.baseline_value,
                    value
                );
                (DailyBaseline::capture(value, today), BaselineTransition::Rollover)
            }
            Some(b) if value < b.baseline_value => {
                log::debug!(
                    "counter fell below baseline on {} ({} < {}), re-anchoring",
                    today,
                    value,
                    b.baseline_value
                );
                (DailyBaseline::capture(value, today), BaselineTransition::Reanchored)
            }
            Some(b) => (
                DailyBaseline {
                    last_known_value: value,
                    ..b
                },
                BaselineTransition::Unchanged,
            ),
        };

        self.baseline = Some(next);
        transition
    }

    /// Forget the baseline.
    pub fn reset(&mut self) {
        self.baseline = None;
    }
}

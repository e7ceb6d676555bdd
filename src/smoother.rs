// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Time-constant exponential smoothing of the effective hardness.
//!
//! The weight of a new sample depends on the time elapsed since the last
//! update, not on the number of cycles, so irregular polling and missed
//! cycles are handled without a separate code path:
//!
//! ```text
//! alpha = 1 - exp(-dt / tau)
//! y     = y + alpha * (x - y)
//! ```

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Time constant of the hardness filter (seconds).
pub const HARDNESS_TAU_SECS: f64 = 3600.0;

/// Smoothed value and when it was last updated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedSample {
    pub value: f64,
    pub last_update_timestamp: DateTime<FixedOffset>,
}

/// Weight given to a sample arriving `dt_secs` after the previous one.
///
/// A negative `dt` (clock stepped back) counts as zero elapsed time.
pub fn alpha(dt_secs: f64, tau_secs: f64) -> f64 {
    let dt = dt_secs.max(0.0);
    1.0 - (-dt / tau_secs).exp()
}

/// Exponential smoother with a fixed time constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpSmoother {
    tau_secs: f64,
    sample: Option<SmoothedSample>,
}

impl Default for ExpSmoother {
    fn default() -> Self {
        Self::new(HARDNESS_TAU_SECS)
    }
}

impl ExpSmoother {
    pub fn new(tau_secs: f64) -> Self {
        Self {
            tau_secs,
            sample: None,
        }
    }

    /// Hardness smoother restored from persisted state.
    pub fn from_sample(sample: Option<SmoothedSample>) -> Self {
        Self {
            sample,
            ..Self::default()
        }
    }

    pub fn sample(&self) -> Option<&SmoothedSample> {
        self.sample.as_ref()
    }

    pub fn value(&self) -> Option<f64> {
        self.sample.map(|s| s.value)
    }

    pub fn tau_secs(&self) -> f64 {
        self.tau_secs
    }

    /// Feed a sample and return the new smoothed value.
    ///
    /// The first sample initializes the output directly. Non-finite samples
    /// are rejected: the state is untouched and `None` is returned.
    pub fn update(&mut self, x: f64, at: DateTime<FixedOffset>) -> Option<f64> {
        if !x.is_finite() {
            return None;
        }

        let value = match self.sample {
            None => x,
            Some(prev) => {
                let dt_secs = (at - prev.last_update_timestamp).num_milliseconds() as f64 / 1000.0;
                prev.value + alpha(dt_secs, self.tau_secs) * (x - prev.value)
            }
        };

        // A sample older than the stored one does not move the clock back.
        let last_update_timestamp = match self.sample {
            Some(prev) if prev.last_update_timestamp > at => prev.last_update_timestamp,
            _ => at,
        };

        self.sample = Some(SmoothedSample {
            value,
            last_update_timestamp,
        });
        Some(value)
    }

    /// Forget the smoothed value. Only ever called on explicit user request.
    pub fn reset(&mut self) {
        self.sample = None;
    }
}

// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Regeneration and capacity guard.
//!
//! The cloud detail endpoint is the only source of operating capacity and
//! hardness grains, and it is also the least reliable one: it is skipped
//! when the summary call hits a rate limit, it may return half a payload,
//! and it may echo a cached snapshot from before a regeneration. The guard
//! keeps those responses from driving state transitions:
//!
//! - `Normal -> PossibleRegen` on a capacity or grains drop while the
//!   device reports regeneration.
//! - `PossibleRegen -> Normal` with a capacity baseline reset once a later,
//!   complete snapshot confirms it. Echoes of the pre-regeneration values
//!   and snapshots older than the trusted one are held, not applied.
//! - Orthogonal `degraded` flag while the detail response is missing or
//!   partial; last known values are reused and at most one diagnostic is
//!   emitted per configured interval.

use crate::config::DiagnosticsConfig;
use crate::hold::MetricValue;
use crate::input::DetailReading;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Regeneration tracking phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenPhase {
    #[default]
    Normal,
    PossibleRegen,
}

impl RegenPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegenPhase::Normal => "normal",
            RegenPhase::PossibleRegen => "possible_regen",
        }
    }
}

/// One detail response as the guard sees it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacitySnapshot {
    pub operating_capacity: Option<f64>,
    pub hardness_grains: Option<f64>,
    /// The detail endpoint was skipped, unavailable or incomplete.
    pub is_partial: bool,
    pub observed_at: Option<DateTime<FixedOffset>>,
}

impl CapacitySnapshot {
    pub fn from_detail(detail: &DetailReading) -> Self {
        match detail {
            DetailReading::Available(d) => Self {
                operating_capacity: d.operating_capacity.filter(|v| v.is_finite()),
                hardness_grains: d.hardness_grains.filter(|v| v.is_finite()),
                is_partial: !d.is_complete(),
                observed_at: d.observed_at,
            },
            DetailReading::Unavailable | DetailReading::Skipped => Self {
                operating_capacity: None,
                hardness_grains: None,
                is_partial: true,
                observed_at: None,
            },
        }
    }

    /// Trusted values, only for a complete snapshot.
    pub fn values(&self) -> Option<CapacityValues> {
        if self.is_partial {
            return None;
        }
        match (self.operating_capacity, self.hardness_grains) {
            (Some(operating_capacity), Some(hardness_grains)) => Some(CapacityValues {
                operating_capacity,
                hardness_grains,
                observed_at: self.observed_at,
            }),
            _ => None,
        }
    }
}

/// A complete capacity reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CapacityValues {
    pub operating_capacity: f64,
    pub hardness_grains: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<FixedOffset>>,
}

impl CapacityValues {
    fn dropped_from(&self, previous: &CapacityValues) -> bool {
        self.operating_capacity < previous.operating_capacity
            || self.hardness_grains < previous.hardness_grains
    }

    fn same_reading(&self, other: &CapacityValues) -> bool {
        self.operating_capacity == other.operating_capacity
            && self.hardness_grains == other.hardness_grains
    }

    /// Strictly older than `other`. Unknown observation times never are.
    fn is_older_than(&self, other: &CapacityValues) -> bool {
        matches!((self.observed_at, other.observed_at), (Some(a), Some(b)) if a < b)
    }

    /// Later than `other`; a snapshot without observation time counts as
    /// later because it arrived in a later cycle.
    fn is_later_than(&self, other: &CapacityValues) -> bool {
        match (self.observed_at, other.observed_at) {
            (Some(a), Some(b)) => a > b,
            _ => true,
        }
    }
}

/// Why a cycle was degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    /// Skipped after the summary call was rate limited.
    DetailSkipped,
    DetailUnavailable,
    /// Returned without operating capacity or hardness grains.
    DetailPartial,
}

impl DegradedReason {
    fn from_detail(detail: &DetailReading) -> Self {
        match detail {
            DetailReading::Skipped => DegradedReason::DetailSkipped,
            DetailReading::Unavailable => DegradedReason::DetailUnavailable,
            DetailReading::Available(_) => DegradedReason::DetailPartial,
        }
    }
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DegradedReason::DetailSkipped => "detail endpoint skipped (rate limited)",
            DegradedReason::DetailUnavailable => "detail endpoint unavailable",
            DegradedReason::DetailPartial => "detail endpoint returned a partial payload",
        };
        f.write_str(s)
    }
}

/// Diagnostic to log for a degraded cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DegradedDiagnostic {
    pub reason: DegradedReason,
    pub degraded_since: DateTime<FixedOffset>,
    /// Degraded cycles since the previous diagnostic that were not logged.
    pub suppressed_cycles: u64,
}

/// Per-device guard state, persisted with the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardState {
    pub phase: RegenPhase,
    pub degraded: bool,
    pub degraded_since: Option<DateTime<FixedOffset>>,
    pub suppressed_cycles: u64,
    pub last_degraded_log: Option<DateTime<FixedOffset>>,
    /// Last complete reading that was accepted.
    pub last_known: Option<CapacityValues>,
    /// Reading in force before the suspected regeneration.
    pub pre_regen: Option<CapacityValues>,
    /// Reading that raised the suspicion.
    pub regen_trigger: Option<CapacityValues>,
    /// Operating capacity right after the last confirmed regeneration.
    pub capacity_baseline: Option<f64>,
    pub last_reset_at: Option<DateTime<FixedOffset>>,
}

/// What the guard decided for one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardOutcome {
    pub operating_capacity: MetricValue<f64>,
    pub hardness_grains: MetricValue<f64>,
    pub phase: RegenPhase,
    pub degraded: bool,
    /// Degraded mode ended this cycle.
    pub recovered: bool,
    pub entered_possible_regen: bool,
    pub capacity_reset: bool,
    /// A complete snapshot was ignored as stale or as a pre-regeneration echo.
    pub stale: bool,
    pub diagnostic: Option<DegradedDiagnostic>,
}

impl GuardState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the guard for one cycle.
    pub fn evaluate(
        &mut self,
        detail: &DetailReading,
        regenerating: Option<bool>,
        at: DateTime<FixedOffset>,
        diagnostics: &DiagnosticsConfig,
    ) -> GuardOutcome {
        let values = match CapacitySnapshot::from_detail(detail).values() {
            Some(values) => values,
            None => {
                let diagnostic =
                    self.mark_degraded(DegradedReason::from_detail(detail), at, diagnostics);
                return GuardOutcome {
                    diagnostic,
                    ..self.held_outcome()
                };
            }
        };

        let recovered = self.degraded;
        if recovered {
            self.degraded = false;
            self.degraded_since = None;
            self.suppressed_cycles = 0;
        }

        if self.last_known.map_or(false, |prev| values.is_older_than(&prev)) {
            return GuardOutcome {
                recovered,
                stale: true,
                ..self.held_outcome()
            };
        }

        let mut entered_possible_regen = false;
        let mut capacity_reset = false;

        match self.phase {
            RegenPhase::Normal => {
                let dropped = self.last_known.map_or(false, |prev| values.dropped_from(&prev));
                if regenerating == Some(true) && dropped {
                    self.phase = RegenPhase::PossibleRegen;
                    self.pre_regen = self.last_known;
                    self.regen_trigger = Some(values);
                    entered_possible_regen = true;
                }
            }
            RegenPhase::PossibleRegen => {
                // Repeats of a reading already seen carry no new evidence,
                // with or without an observation time.
                let echo = [self.pre_regen, self.regen_trigger, self.last_known]
                    .iter()
                    .flatten()
                    .any(|seen| values.same_reading(seen));
                if echo {
                    return GuardOutcome {
                        recovered,
                        stale: true,
                        ..self.held_outcome()
                    };
                }
                let confirmed = regenerating != Some(true)
                    && self
                        .regen_trigger
                        .map_or(true, |trigger| values.is_later_than(&trigger));
                if confirmed {
                    self.phase = RegenPhase::Normal;
                    self.pre_regen = None;
                    self.regen_trigger = None;
                    self.capacity_baseline = Some(values.operating_capacity);
                    self.last_reset_at = Some(at);
                    capacity_reset = true;
                }
            }
        }

        self.last_known = Some(values);
        if self.capacity_baseline.is_none() {
            self.capacity_baseline = Some(values.operating_capacity);
        }

        GuardOutcome {
            operating_capacity: MetricValue::fresh(values.operating_capacity),
            hardness_grains: MetricValue::fresh(values.hardness_grains),
            phase: self.phase,
            degraded: false,
            recovered,
            entered_possible_regen,
            capacity_reset,
            stale: false,
            diagnostic: None,
        }
    }

    /// Enter or stay in degraded mode; returns a diagnostic when one is due.
    fn mark_degraded(
        &mut self,
        reason: DegradedReason,
        at: DateTime<FixedOffset>,
        diagnostics: &DiagnosticsConfig,
    ) -> Option<DegradedDiagnostic> {
        if !self.degraded {
            self.degraded = true;
            self.degraded_since = Some(at);
        }

        let due = match self.last_degraded_log {
            None => true,
            Some(last) => (at - last).num_seconds() >= diagnostics.effective_interval_secs(),
        };
        if !due {
            self.suppressed_cycles += 1;
            return None;
        }

        let diagnostic = DegradedDiagnostic {
            reason,
            degraded_since: self.degraded_since.unwrap_or(at),
            suppressed_cycles: self.suppressed_cycles,
        };
        self.last_degraded_log = Some(at);
        self.suppressed_cycles = 0;
        Some(diagnostic)
    }

    fn held_outcome(&self) -> GuardOutcome {
        GuardOutcome {
            operating_capacity: MetricValue::from_previous(
                self.last_known.map(|v| v.operating_capacity),
            ),
            hardness_grains: MetricValue::from_previous(self.last_known.map(|v| v.hardness_grains)),
            phase: self.phase,
            degraded: self.degraded,
            recovered: false,
            entered_possible_regen: false,
            capacity_reset: false,
            stale: false,
            diagnostic: None,
        }
    }
}

// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! SoftenerEngine - per-device orchestration of the derived metrics.
//!
//! One call to [`SoftenerEngine::process`] runs a poll cycle through every
//! stage in order: baselines and daily deltas, mixing, smoothing, sodium,
//! the capacity guard, and the pass-through device metrics. Stages work on
//! a copy of the device state that replaces the engine's state only once the
//! whole cycle has run, so a cycle never leaves state half-updated.

use crate::baseline::BaselineTransition;
use crate::config::EngineConfig;
use crate::delta::{self, DailyDeltas};
use crate::error::{Result, StateError};
use crate::guard::{GuardOutcome, RegenPhase};
use crate::hold::{hold_last, recompute_or_hold, MetricValue};
use crate::input::{DeviceStat, PollCycle};
use crate::mixing;
use crate::smoother::ExpSmoother;
use crate::snapshot::{
    MetricsSnapshot, FLAG_BASELINE_REANCHORED, FLAG_CAPACITY_RESET, FLAG_DAY_ROLLOVER,
    FLAG_DEGRADED, FLAG_HARDNESS_UNCALIBRATED, FLAG_HOLD_APPLIED, FLAG_POSSIBLE_REGEN,
    FLAG_STALE_SNAPSHOT,
};
use crate::sodium;
use crate::state::{DeviceState, STATE_VERSION};

/// Default device identifier used in log lines.
pub const DEFAULT_DEVICE_ID: &str = "softener";

/// Derived metrics engine for one house meter / softener pair.
#[derive(Debug, Clone)]
pub struct SoftenerEngine {
    device_id: String,
    config: EngineConfig,
    state: DeviceState,
    /// Last snapshot output.
    last_output: Option<MetricsSnapshot>,
}

impl SoftenerEngine {
    /// Create an engine with a cold-start state.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_state(config, DeviceState::new())
    }

    /// Create an engine after validating the configuration.
    pub fn try_new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(config))
    }

    /// Create an engine resuming from persisted state.
    pub fn with_state(config: EngineConfig, state: DeviceState) -> Self {
        Self {
            device_id: DEFAULT_DEVICE_ID.to_string(),
            config,
            state,
            last_output: None,
        }
    }

    /// Builder: identifier used in diagnostics.
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = device_id.into();
        self
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Replace the configuration, e.g. after the user calibrated residual
    /// hardness. State is kept.
    pub fn update_config(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Process one poll cycle. Never fails: missing data is held.
    pub fn process(&mut self, cycle: &PollCycle) -> MetricsSnapshot {
        let mut next = self.state.clone();
        let mut snapshot = MetricsSnapshot::empty(cycle.timestamp);
        snapshot.source = cycle.source.clone();

        next.cycle_count += 1;
        next.last_cycle_at = Some(cycle.timestamp);

        // Baselines and daily deltas
        let house_sample = cycle.house_sample(&self.config.house_meter);
        let deltas = DailyDeltas {
            house: delta::advance(&mut next.house, &house_sample),
            softened: delta::advance(&mut next.softened, &cycle.softened_sample()),
        };
        for transition in [deltas.house.transition, deltas.softened.transition] {
            match transition {
                BaselineTransition::Rollover => snapshot.push_flag(FLAG_DAY_ROLLOVER),
                BaselineTransition::Reanchored => snapshot.push_flag(FLAG_BASELINE_REANCHORED),
                _ => {}
            }
        }
        snapshot.house_today_l = hold_last(&mut next.derived.house_today_l, deltas.house.today_l);
        snapshot.softened_today_l =
            hold_last(&mut next.derived.softened_today_l, deltas.softened.today_l);

        // Mixing, smoothing and sodium, gated on calibration
        let hardness = &self.config.hardness;
        if hardness.is_calibrated() {
            let mixed = deltas.both_valid().and_then(|(house, softened)| {
                mixing::mix(house, softened, hardness, self.config.regen_self_consumption_l)
            });
            let derived = &mut next.derived;
            snapshot.raw_today_l = recompute_or_hold(&mut derived.raw_today_l, mixed, |m| m.raw_today_l);
            snapshot.raw_fraction_percent =
                recompute_or_hold(&mut derived.raw_fraction_percent, mixed, |m| m.raw_fraction_percent);
            snapshot.treated_hardness_dh =
                recompute_or_hold(&mut derived.treated_hardness_dh, mixed, |m| m.treated_hardness_dh);

            // The smoother only sees freshly computed hardness; a rejected
            // or missing sample holds the previous output.
            let mut smoother = ExpSmoother::from_sample(next.smoother);
            let mut last_smoothed = smoother.value();
            let fresh_hardness = Some(snapshot.treated_hardness_dh)
                .filter(MetricValue::is_fresh)
                .and_then(|m| m.get());
            snapshot.smoothed_hardness_dh = hold_last(
                &mut last_smoothed,
                fresh_hardness.and_then(|x| smoother.update(x, cycle.timestamp)),
            );
            next.smoother = smoother.sample().copied();

            let reading = snapshot.smoothed_hardness_dh.map(|y| {
                sodium::assess(hardness.na_raw_mg_l, hardness.raw_hardness_dh, y)
            });
            snapshot.sodium_mg_l = reading.map(|r| r.na_eff_mg_l);
            snapshot.sodium_alert = reading.get().map_or(false, |r| r.alert);
        } else {
            snapshot.push_flag(FLAG_HARDNESS_UNCALIBRATED);
        }

        // Capacity guard
        let outcome = next.guard.evaluate(
            &cycle.detail,
            cycle.regenerating(),
            cycle.timestamp,
            &self.config.diagnostics,
        );
        snapshot.operating_capacity = outcome.operating_capacity;
        snapshot.hardness_grains = outcome.hardness_grains;
        snapshot.capacity_baseline = next.guard.capacity_baseline;
        snapshot.regen_phase = outcome.phase;
        snapshot.degraded = outcome.degraded;
        if outcome.degraded {
            snapshot.push_flag(FLAG_DEGRADED);
        }
        if outcome.phase == RegenPhase::PossibleRegen {
            snapshot.push_flag(FLAG_POSSIBLE_REGEN);
        }
        if outcome.capacity_reset {
            snapshot.push_flag(FLAG_CAPACITY_RESET);
        }
        if outcome.stale {
            snapshot.push_flag(FLAG_STALE_SNAPSHOT);
        }

        // Pass-through device metrics
        let summary = cycle.summary();
        let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
        let device = &mut next.device;
        snapshot.salt_level_percent = hold_last(
            &mut device.salt_level_percent,
            finite(summary.and_then(|s| s.salt_level_percent)),
        );
        snapshot.flow_lpm = hold_last(&mut device.flow_lpm, finite(summary.and_then(|s| s.flow_lpm)));
        snapshot.treated_today_device_l = hold_last(
            &mut device.treated_today_l,
            finite(summary.and_then(|s| s.treated_today_l)),
        );
        snapshot.regeneration_active =
            hold_last(&mut device.regeneration_active, cycle.regenerating());
        for stat in DeviceStat::ALL {
            let mut last = device.stats.get(&stat).copied();
            let value = hold_last(&mut last, summary.and_then(|s| s.stat(stat)));
            if let Some(v) = last {
                device.stats.insert(stat, v);
            }
            if value.is_available() {
                snapshot.device_stats.insert(stat, value);
            }
        }

        snapshot.held = snapshot.any_held();
        if snapshot.held {
            snapshot.push_flag(FLAG_HOLD_APPLIED);
        }

        // Commit
        self.state = next;
        self.log_guard_outcome(&outcome);
        self.last_output = Some(snapshot.clone());
        snapshot
    }

    fn log_guard_outcome(&self, outcome: &GuardOutcome) {
        if let Some(diag) = &outcome.diagnostic {
            log::warn!(
                "{}: degraded cycle, {}; reusing last known capacity (degraded since {}, {} cycles not logged)",
                self.device_id,
                diag.reason,
                diag.degraded_since.to_rfc3339(),
                diag.suppressed_cycles
            );
        }
        if outcome.recovered {
            log::info!("{}: detail source recovered, leaving degraded mode", self.device_id);
        }
        if outcome.entered_possible_regen {
            log::debug!("{}: capacity drop during regeneration, awaiting confirmation", self.device_id);
        }
        if outcome.capacity_reset {
            log::info!(
                "{}: regeneration confirmed, capacity baseline reset to {:?}",
                self.device_id,
                self.state.guard.capacity_baseline
            );
        }
    }

    /// Forget the smoothed hardness. The next valid sample starts it again.
    pub fn reset_smoother(&mut self) {
        log::info!("{}: smoother reset on request", self.device_id);
        self.state.smoother = None;
    }

    /// Current persisted state.
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Copy of the state for persistence.
    pub fn export_state(&self) -> DeviceState {
        self.state.clone()
    }

    /// Replace the state, e.g. after a restart.
    pub fn import_state(&mut self, state: DeviceState) -> Result<()> {
        if state.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                found: state.version,
                supported: STATE_VERSION,
            }
            .into());
        }
        self.state = state;
        self.last_output = None;
        Ok(())
    }

    /// Total cycles processed for this device, across restarts.
    pub fn cycle_count(&self) -> u64 {
        self.state.cycle_count
    }

    /// Last snapshot output.
    pub fn last_output(&self) -> Option<&MetricsSnapshot> {
        self.last_output.as_ref()
    }

    pub fn house_today_l(&self) -> Option<f64> {
        self.state.derived.house_today_l
    }

    pub fn softened_today_l(&self) -> Option<f64> {
        self.state.derived.softened_today_l
    }

    pub fn raw_today_l(&self) -> Option<f64> {
        self.calibrated(self.state.derived.raw_today_l)
    }

    pub fn raw_fraction_percent(&self) -> Option<f64> {
        self.calibrated(self.state.derived.raw_fraction_percent)
    }

    pub fn treated_hardness_dh(&self) -> Option<f64> {
        self.calibrated(self.state.derived.treated_hardness_dh)
    }

    pub fn smoothed_hardness_dh(&self) -> Option<f64> {
        self.calibrated(self.state.smoother.map(|s| s.value))
    }

    pub fn sodium_mg_l(&self) -> Option<f64> {
        self.sodium().map(|r| r.na_eff_mg_l)
    }

    pub fn sodium_alert(&self) -> bool {
        self.sodium().map_or(false, |r| r.alert)
    }

    fn sodium(&self) -> Option<sodium::SodiumReading> {
        let hardness = &self.config.hardness;
        self.smoothed_hardness_dh()
            .map(|y| sodium::assess(hardness.na_raw_mg_l, hardness.raw_hardness_dh, y))
    }

    pub fn operating_capacity(&self) -> Option<f64> {
        self.state.guard.last_known.map(|v| v.operating_capacity)
    }

    pub fn hardness_grains(&self) -> Option<f64> {
        self.state.guard.last_known.map(|v| v.hardness_grains)
    }

    pub fn capacity_baseline(&self) -> Option<f64> {
        self.state.guard.capacity_baseline
    }

    pub fn regen_phase(&self) -> RegenPhase {
        self.state.guard.phase
    }

    pub fn is_degraded(&self) -> bool {
        self.state.guard.degraded
    }

    pub fn salt_level_percent(&self) -> Option<f64> {
        self.state.device.salt_level_percent
    }

    pub fn flow_lpm(&self) -> Option<f64> {
        self.state.device.flow_lpm
    }

    pub fn treated_today_device_l(&self) -> Option<f64> {
        self.state.device.treated_today_l
    }

    pub fn regeneration_active(&self) -> Option<bool> {
        self.state.device.regeneration_active
    }

    /// Last reported value of a relayed statistic.
    pub fn device_stat(&self, stat: DeviceStat) -> Option<f64> {
        self.state.device.stats.get(&stat).copied()
    }

    pub fn capacity_remaining_percent(&self) -> Option<f64> {
        self.device_stat(DeviceStat::CapacityRemainingPercent)
    }

    /// Weekly average of the device's daily usage pattern (L).
    pub fn usage_average_l(&self) -> Option<f64> {
        self.device_stat(DeviceStat::UsageAverageL)
    }

    fn calibrated(&self, value: Option<f64>) -> Option<f64> {
        value.filter(|_| self.config.hardness.is_calibrated())
    }
}

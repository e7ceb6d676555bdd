// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! MetricsSnapshot - per-cycle output for the display layer.

use crate::guard::RegenPhase;
use crate::hold::MetricValue;
use crate::input::DeviceStat;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Version of the snapshot format.
pub const SNAPSHOT_VERSION: &str = "0.1.0";

/// A derived metric was held at its previous value.
pub const FLAG_HOLD_APPLIED: &str = "HOLD_APPLIED";
/// The detail endpoint was missing or partial.
pub const FLAG_DEGRADED: &str = "DEGRADED";
/// A regeneration is suspected but not yet confirmed.
pub const FLAG_POSSIBLE_REGEN: &str = "POSSIBLE_REGEN";
/// A regeneration was confirmed and the capacity baseline reset.
pub const FLAG_CAPACITY_RESET: &str = "CAPACITY_RESET";
/// Residual hardness not configured; hardness math disabled.
pub const FLAG_HARDNESS_UNCALIBRATED: &str = "HARDNESS_UNCALIBRATED";
/// A counter baseline moved to a new local day.
pub const FLAG_DAY_ROLLOVER: &str = "DAY_ROLLOVER";
/// A counter fell below its baseline mid-day and was re-anchored.
pub const FLAG_BASELINE_REANCHORED: &str = "BASELINE_REANCHORED";
/// A complete detail snapshot was ignored as stale.
pub const FLAG_STALE_SNAPSHOT: &str = "STALE_SNAPSHOT";

/// All derived metrics of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Format version.
    pub version: String,
    /// Poll time of the cycle.
    pub timestamp: DateTime<FixedOffset>,
    /// Input source of the cycle.
    #[serde(default)]
    pub source: String,

    pub house_today_l: MetricValue<f64>,
    pub softened_today_l: MetricValue<f64>,
    pub raw_today_l: MetricValue<f64>,
    pub raw_fraction_percent: MetricValue<f64>,
    pub treated_hardness_dh: MetricValue<f64>,
    pub smoothed_hardness_dh: MetricValue<f64>,
    pub sodium_mg_l: MetricValue<f64>,
    /// Effective sodium above the drinking water limit.
    pub sodium_alert: bool,

    pub operating_capacity: MetricValue<f64>,
    pub hardness_grains: MetricValue<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_baseline: Option<f64>,
    pub regen_phase: RegenPhase,
    pub degraded: bool,

    pub salt_level_percent: MetricValue<f64>,
    pub flow_lpm: MetricValue<f64>,
    pub treated_today_device_l: MetricValue<f64>,
    pub regeneration_active: MetricValue<bool>,
    /// Relayed device statistics; absent entries are unavailable.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub device_stats: BTreeMap<DeviceStat, MetricValue<f64>>,

    /// At least one metric was held this cycle.
    pub held: bool,
    /// Additional flags.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub flags: Vec<String>,
}

impl MetricsSnapshot {
    /// Snapshot with every metric unavailable.
    pub fn empty(timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            version: SNAPSHOT_VERSION.to_string(),
            timestamp,
            source: String::new(),
            house_today_l: MetricValue::unavailable(),
            softened_today_l: MetricValue::unavailable(),
            raw_today_l: MetricValue::unavailable(),
            raw_fraction_percent: MetricValue::unavailable(),
            treated_hardness_dh: MetricValue::unavailable(),
            smoothed_hardness_dh: MetricValue::unavailable(),
            sodium_mg_l: MetricValue::unavailable(),
            sodium_alert: false,
            operating_capacity: MetricValue::unavailable(),
            hardness_grains: MetricValue::unavailable(),
            capacity_baseline: None,
            regen_phase: RegenPhase::Normal,
            degraded: false,
            salt_level_percent: MetricValue::unavailable(),
            flow_lpm: MetricValue::unavailable(),
            treated_today_device_l: MetricValue::unavailable(),
            regeneration_active: MetricValue::unavailable(),
            device_stats: BTreeMap::new(),
            held: false,
            flags: Vec::new(),
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// Add a flag once.
    pub fn push_flag(&mut self, flag: &str) {
        if !self.has_flag(flag) {
            self.flags.push(flag.to_string());
        }
    }

    /// Numeric metrics by name, for exporters.
    pub fn numeric_metrics(&self) -> [(&'static str, &MetricValue<f64>); 12] {
        [
            ("house_today_l", &self.house_today_l),
            ("softened_today_l", &self.softened_today_l),
            ("raw_today_l", &self.raw_today_l),
            ("raw_fraction_percent", &self.raw_fraction_percent),
            ("treated_hardness_dh", &self.treated_hardness_dh),
            ("smoothed_hardness_dh", &self.smoothed_hardness_dh),
            ("sodium_mg_l", &self.sodium_mg_l),
            ("operating_capacity", &self.operating_capacity),
            ("hardness_grains", &self.hardness_grains),
            ("salt_level_percent", &self.salt_level_percent),
            ("flow_lpm", &self.flow_lpm),
            ("treated_today_device_l", &self.treated_today_device_l),
        ]
    }

    /// A relayed statistic; unavailable when never reported.
    pub fn stat(&self, stat: DeviceStat) -> MetricValue<f64> {
        self.device_stats.get(&stat).copied().unwrap_or_default()
    }

    /// Whether any metric reports [`MetricStatus::Held`](crate::hold::MetricStatus::Held).
    pub fn any_held(&self) -> bool {
        self.numeric_metrics().iter().any(|(_, m)| m.is_held())
            || self.regeneration_active.is_held()
            || self.device_stats.values().any(MetricValue::is_held)
    }
}

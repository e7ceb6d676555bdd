// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Poll cycle inputs.
//!
//! One [`PollCycle`] carries everything the HTTP collaborator managed to
//! fetch for a device in one poll:
//! - the house meter reading (raw value + optional unit label)
//! - the cloud summary (or unavailable / rate limited), including the
//!   device statistics relayed as-is
//! - the cloud detail endpoint (or unavailable / skipped)
//!
//! Sources:
//! - builder API on [`PollCycle`]
//! - generic JSON records ([`GenericCycle`])
//! - the cloud's flat key/value payload ([`KvPayload`])

mod generic;
pub mod kv;
pub mod stats;

pub use generic::GenericCycle;
pub use kv::KvPayload;
pub use stats::DeviceStat;

use crate::config::HouseMeterConfig;
use crate::units::normalize_to_liters;
use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single poll's reading for one cumulative counter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CounterSample {
    /// Cumulative quantity (liters).
    pub value: f64,
    /// When the sample was taken, in the house's local offset.
    pub timestamp: DateTime<FixedOffset>,
    /// Upstream call succeeded and the field was present.
    pub valid: bool,
}

impl CounterSample {
    pub fn valid(value: f64, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            value,
            timestamp,
            valid: true,
        }
    }

    pub fn missing(timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            value: 0.0,
            timestamp,
            valid: false,
        }
    }

    pub fn from_option(value: Option<f64>, timestamp: DateTime<FixedOffset>) -> Self {
        match value {
            Some(v) => Self::valid(v, timestamp),
            None => Self::missing(timestamp),
        }
    }

    /// Value if the sample can be trusted.
    pub fn valid_value(&self) -> Option<f64> {
        if self.valid && self.value.is_finite() {
            Some(self.value)
        } else {
            None
        }
    }

    /// Local calendar date of the sample.
    pub fn local_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }
}

/// House meter reading as delivered by its sensor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    /// Unit-of-measure label, e.g. "m³" or "L".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl MeterReading {
    pub fn new(value: f64, unit: Option<&str>) -> Self {
        Self {
            value: Some(value),
            unit: unit.map(str::to_string),
        }
    }

    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Reading converted to liters, `None` if unavailable.
    pub fn liters(&self, config: &HouseMeterConfig) -> Option<f64> {
        normalize_to_liters(self.value, self.unit.as_deref(), config)
    }
}

/// Fields of the cloud summary endpoint. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudSummary {
    /// Treated water totalizer (L).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treated_total_l: Option<f64>,
    /// Treated water today as reported by the device (L).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treated_today_l: Option<f64>,
    /// Salt level (%).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt_level_percent: Option<f64>,
    /// Current flow (L/min).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_lpm: Option<f64>,
    /// Device-reported regeneration flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regenerating: Option<bool>,
    /// Device clock at the time of the report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_time: Option<DateTime<FixedOffset>>,
    /// Statistics relayed without derivation.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub stats: BTreeMap<DeviceStat, f64>,
}

impl CloudSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_treated_total(mut self, liters: f64) -> Self {
        self.treated_total_l = Some(liters);
        self
    }

    pub fn with_treated_today(mut self, liters: f64) -> Self {
        self.treated_today_l = Some(liters);
        self
    }

    pub fn with_salt_level(mut self, percent: f64) -> Self {
        self.salt_level_percent = Some(percent);
        self
    }

    pub fn with_flow(mut self, lpm: f64) -> Self {
        self.flow_lpm = Some(lpm);
        self
    }

    pub fn with_regenerating(mut self, regenerating: bool) -> Self {
        self.regenerating = Some(regenerating);
        self
    }

    pub fn with_device_time(mut self, at: DateTime<FixedOffset>) -> Self {
        self.device_time = Some(at);
        self
    }

    pub fn with_stat(mut self, stat: DeviceStat, value: f64) -> Self {
        self.stats.insert(stat, value);
        self
    }

    /// Reported value of `stat`, if present and finite.
    pub fn stat(&self, stat: DeviceStat) -> Option<f64> {
        self.stats.get(&stat).copied().filter(|v| v.is_finite())
    }
}

/// Outcome of the cloud summary call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryReading {
    #[serde(rename = "ok")]
    Available(CloudSummary),
    #[default]
    Unavailable,
    /// The cloud answered with a rate-limit signal.
    RateLimited,
}

impl SummaryReading {
    pub fn summary(&self) -> Option<&CloudSummary> {
        match self {
            SummaryReading::Available(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SummaryReading::RateLimited)
    }
}

/// Fields of the cloud detail (debug) endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operating_capacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hardness_grains: Option<f64>,
    /// When the cloud last heard from the device for this payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<DateTime<FixedOffset>>,
}

impl CloudDetail {
    pub fn new(operating_capacity: f64, hardness_grains: f64) -> Self {
        Self {
            operating_capacity: Some(operating_capacity),
            hardness_grains: Some(hardness_grains),
            observed_at: None,
        }
    }

    pub fn observed_at(mut self, at: DateTime<FixedOffset>) -> Self {
        self.observed_at = Some(at);
        self
    }

    /// Both numbers present and finite.
    pub fn is_complete(&self) -> bool {
        matches!(
            (self.operating_capacity, self.hardness_grains),
            (Some(c), Some(h)) if c.is_finite() && h.is_finite()
        )
    }
}

/// Outcome of the cloud detail call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetailReading {
    #[serde(rename = "ok")]
    Available(CloudDetail),
    #[default]
    Unavailable,
    /// Not fetched because the summary call signalled rate limiting.
    Skipped,
}

/// Everything fetched for one device in one poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollCycle {
    /// Poll time in the house's local offset; decides the calendar day.
    pub timestamp: DateTime<FixedOffset>,
    pub house: MeterReading,
    pub summary: SummaryReading,
    pub detail: DetailReading,
    /// Source identifier for debugging/logging.
    pub source: String,
}

impl PollCycle {
    /// Empty cycle: every source unavailable.
    pub fn at(timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            timestamp,
            house: MeterReading::unavailable(),
            summary: SummaryReading::Unavailable,
            detail: DetailReading::Unavailable,
            source: "builder".to_string(),
        }
    }

    /// Builder: house meter reading.
    pub fn with_house(mut self, value: f64, unit: Option<&str>) -> Self {
        self.house = MeterReading::new(value, unit);
        self
    }

    /// Builder: cloud summary.
    pub fn with_summary(mut self, summary: CloudSummary) -> Self {
        self.summary = SummaryReading::Available(summary);
        self
    }

    /// Builder: cloud detail.
    pub fn with_detail(mut self, detail: CloudDetail) -> Self {
        self.detail = DetailReading::Available(detail);
        self
    }

    /// Builder: summary rate limited, detail skipped as a consequence.
    pub fn rate_limited(mut self) -> Self {
        self.summary = SummaryReading::RateLimited;
        self.detail = DetailReading::Skipped;
        self
    }

    /// Builder: detail skipped while the summary went through.
    pub fn detail_skipped(mut self) -> Self {
        self.detail = DetailReading::Skipped;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn summary(&self) -> Option<&CloudSummary> {
        self.summary.summary()
    }

    /// House counter sample in liters.
    pub fn house_sample(&self, config: &HouseMeterConfig) -> CounterSample {
        CounterSample::from_option(self.house.liters(config), self.timestamp)
    }

    /// Softener treated-water counter sample in liters.
    pub fn softened_sample(&self) -> CounterSample {
        let total = self.summary().and_then(|s| s.treated_total_l);
        CounterSample::from_option(total.filter(|v| v.is_finite()), self.timestamp)
    }

    /// Device-reported regeneration flag, if the summary carried one.
    pub fn regenerating(&self) -> Option<bool> {
        self.summary().and_then(|s| s.regenerating)
    }
}

/// Trait for input adapters.
pub trait InputAdapter {
    /// Convert source data to a poll cycle.
    fn to_poll_cycle(&self) -> PollCycle;
}

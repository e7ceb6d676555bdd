// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Cloud key/value payload adapter.
//!
//! The softener cloud flattens its debug view into `key -> value` pairs whose
//! values are often decorated strings ("76.5%", "3.6 Days"). This module
//! parses them and maps the keys the engine cares about onto a [`PollCycle`].
//! Tables delivered next to the key/value map (the weekly usage pattern)
//! are read for the statistics derived from them.

use super::stats::{usage_pattern, DeviceStat, UsagePattern, USAGE_TABLE_KEY};
use super::{
    CloudDetail, CloudSummary, DetailReading, InputAdapter, MeterReading, PollCycle,
    SummaryReading,
};
use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use std::collections::HashMap;

pub const KEY_TREATED_TOTAL: &str = "treated_water";
pub const KEY_TREATED_TODAY: &str = "water_today";
pub const KEY_FLOW: &str = "current_flow_rate";
pub const KEY_SALT_MONITOR: &str = "salt_monitor_level";
pub const KEY_REGEN_REMAINING: &str = "regen_time_rem";
pub const KEY_REGENERATING: &str = "regenerating";
pub const KEY_OPERATING_CAPACITY: &str = "operating_capacity";
pub const KEY_MESSAGE_TIME: &str = "customer.time_message_received";

/// Keys that may carry the programmed hardness, in preference order.
pub const HARDNESS_KEYS: [&str; 6] = [
    "program.hardness_grains",
    "program.hardness",
    "program.hardness_ppm",
    "hardness_grains",
    "hardness",
    "hardness_ppm",
];

/// Full scale of the salt monitor.
pub const SALT_MONITOR_FULL: f64 = 50.0;

/// mg/L CaCO3 per grain per US gallon.
pub const PPM_PER_GPG: f64 = 17.1;

/// mg/L CaCO3 per °dH.
pub const PPM_PER_DH: f64 = 17.848;

/// Values above this are taken to be ppm rather than grains per gallon.
pub const PPM_DETECTION_THRESHOLD: f64 = 60.0;

/// Parse a decorated numeric string ("76.5%", "3.6 Days", "12,5").
pub fn parse_kv_float(raw: &str) -> Option<f64> {
    let s = raw
        .trim()
        .replace('%', "")
        .replace("Days", "")
        .replace("Day", "")
        .replace(',', ".");
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Numeric value of a JSON kv entry, number or decorated string.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_kv_float(s),
        _ => None,
    }
}

/// Boolean value of a JSON kv entry.
pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v != 0.0),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Some(true),
            "false" | "off" | "no" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Salt monitor (0..50) to percent (0..100), clamped.
pub fn salt_monitor_to_percent(level: f64) -> f64 {
    level.clamp(0.0, SALT_MONITOR_FULL) / SALT_MONITOR_FULL * 100.0
}

/// Regeneration is active when the remaining time counter is above zero;
/// an explicit flag wins when present.
pub fn regeneration_active(remaining: Option<f64>, flag: Option<bool>) -> Option<bool> {
    flag.or_else(|| remaining.map(|r| r > 0.0))
}

/// Convert a programmed hardness (grains/gal or ppm) to °dH, one decimal.
pub fn hardness_to_dh(hardness: f64) -> Option<f64> {
    if !hardness.is_finite() || hardness <= 0.0 {
        return None;
    }
    let ppm = if hardness > PPM_DETECTION_THRESHOLD {
        hardness
    } else {
        hardness * PPM_PER_GPG
    };
    Some((ppm / PPM_PER_DH * 10.0).round() / 10.0)
}

/// Cloud key/value payload for one poll.
#[derive(Debug, Clone)]
pub struct KvPayload {
    pub timestamp: DateTime<FixedOffset>,
    pub kv: HashMap<String, Value>,
    /// Tables by name, as delivered next to the key/value map.
    pub tables: HashMap<String, Value>,
    pub house: MeterReading,
    /// Summary call answered with a rate-limit signal.
    pub rate_limited: bool,
    /// Detail endpoint was not fetched.
    pub detail_skipped: bool,
}

impl KvPayload {
    pub fn new(timestamp: DateTime<FixedOffset>, kv: HashMap<String, Value>) -> Self {
        Self {
            timestamp,
            kv,
            tables: HashMap::new(),
            house: MeterReading::unavailable(),
            rate_limited: false,
            detail_skipped: false,
        }
    }

    /// Parse the `kv` object out of a JSON document.
    pub fn from_json(timestamp: DateTime<FixedOffset>, json: &str) -> crate::error::Result<Self> {
        let kv: HashMap<String, Value> = serde_json::from_str(json)
            .map_err(|e| crate::error::InputError::Malformed(e.to_string()))?;
        Ok(Self::new(timestamp, kv))
    }

    /// Parse a full device document: `{"kv": {...}, "tables": {...}}`.
    /// Either part may be missing.
    pub fn from_document_json(
        timestamp: DateTime<FixedOffset>,
        json: &str,
    ) -> crate::error::Result<Self> {
        #[derive(serde::Deserialize)]
        struct Document {
            #[serde(default)]
            kv: HashMap<String, Value>,
            #[serde(default)]
            tables: HashMap<String, Value>,
        }

        let doc: Document = serde_json::from_str(json)
            .map_err(|e| crate::error::InputError::Malformed(e.to_string()))?;
        Ok(Self::new(timestamp, doc.kv).with_tables(doc.tables))
    }

    pub fn with_tables(mut self, tables: HashMap<String, Value>) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_house(mut self, value: f64, unit: Option<&str>) -> Self {
        self.house = MeterReading::new(value, unit);
        self
    }

    pub fn rate_limited(mut self) -> Self {
        self.rate_limited = true;
        self.detail_skipped = true;
        self
    }

    pub fn float(&self, key: &str) -> Option<f64> {
        self.kv.get(key).and_then(value_as_f64)
    }

    /// One row of the weekly usage table.
    pub fn usage_pattern(&self, row_label: &str) -> Option<UsagePattern> {
        self.tables
            .get(USAGE_TABLE_KEY)
            .and_then(|table| usage_pattern(table, row_label))
    }

    /// Value of a relayed statistic, rounded for display.
    pub fn stat(&self, stat: DeviceStat) -> Option<f64> {
        let value = match (stat.kv_key(), stat.usage_row()) {
            (Some(key), _) => self.float(key),
            (None, Some(row)) => self.usage_pattern(row).map(|p| p.average),
            (None, None) => None,
        };
        value.map(|v| stat.round(v))
    }

    /// Programmed hardness converted to °dH.
    pub fn cloud_hardness_dh(&self) -> Option<f64> {
        HARDNESS_KEYS
            .iter()
            .find_map(|k| self.kv.get(*k).filter(|v| !v.is_null()))
            .and_then(value_as_f64)
            .and_then(hardness_to_dh)
    }

    fn hardness_grains(&self) -> Option<f64> {
        HARDNESS_KEYS
            .iter()
            .filter(|k| !k.ends_with("_ppm"))
            .find_map(|k| self.float(k))
    }

    fn message_time(&self) -> Option<DateTime<FixedOffset>> {
        self.kv
            .get(KEY_MESSAGE_TIME)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
    }

    fn summary(&self) -> CloudSummary {
        CloudSummary {
            treated_total_l: self.float(KEY_TREATED_TOTAL),
            treated_today_l: self.float(KEY_TREATED_TODAY),
            salt_level_percent: self.float(KEY_SALT_MONITOR).map(salt_monitor_to_percent),
            flow_lpm: self.float(KEY_FLOW),
            regenerating: regeneration_active(
                self.float(KEY_REGEN_REMAINING),
                self.kv.get(KEY_REGENERATING).and_then(value_as_bool),
            ),
            device_time: self.message_time(),
            stats: DeviceStat::ALL
                .iter()
                .filter_map(|&stat| self.stat(stat).map(|v| (stat, v)))
                .collect(),
        }
    }

    fn detail(&self) -> CloudDetail {
        CloudDetail {
            operating_capacity: self.float(KEY_OPERATING_CAPACITY),
            hardness_grains: self.hardness_grains(),
            observed_at: self.message_time(),
        }
    }
}

impl InputAdapter for KvPayload {
    fn to_poll_cycle(&self) -> PollCycle {
        let summary = if self.rate_limited {
            SummaryReading::RateLimited
        } else if self.kv.is_empty() && self.tables.is_empty() {
            SummaryReading::Unavailable
        } else {
            SummaryReading::Available(self.summary())
        };

        let detail = if self.detail_skipped || self.rate_limited {
            DetailReading::Skipped
        } else if self.kv.is_empty() {
            DetailReading::Unavailable
        } else {
            DetailReading::Available(self.detail())
        };

        PollCycle {
            timestamp: self.timestamp,
            house: self.house.clone(),
            summary,
            detail,
            source: "cloud-kv".to_string(),
        }
    }
}

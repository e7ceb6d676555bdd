// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Device statistics reported by the cloud and passed through unchanged.
//!
//! Unlike the counters the engine derives from, these are only relayed to
//! the display layer under the hold policy. Most come straight from the
//! key/value payload; the two usage-pattern figures are weekly averages of
//! a row in the cloud's usage table.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Table holding the per-weekday water usage pattern.
pub const USAGE_TABLE_KEY: &str = "daily_water_usage_patterns";
/// Row of [`USAGE_TABLE_KEY`] with the average usage per weekday.
pub const USAGE_AVERAGE_ROW: &str = "Average Usage (Liters)";
/// Row of [`USAGE_TABLE_KEY`] with the reserve per weekday.
pub const USAGE_RESERVED_ROW: &str = "Reserved (Liters)";

/// A cloud-reported device statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStat {
    CapacityRemainingPercent,
    AverageCapacityAtRegenPercent,
    AverageDailyUseL,
    WaterTotalizerL,
    TreatedWaterLeftL,
    UntreatedWaterL,
    PeakFlowLpm,
    UsageAverageL,
    UsageReservedL,
    SaltTotalKg,
    SaltEfficiencyPpmPerKg,
    OutOfSaltDays,
    SaltDosePerRegenKg,
    RockRemovedTotalKg,
    RockRemovedDailyKg,
    RockRemovedSinceRegenKg,
}

impl DeviceStat {
    pub const ALL: [DeviceStat; 16] = [
        DeviceStat::CapacityRemainingPercent,
        DeviceStat::AverageCapacityAtRegenPercent,
        DeviceStat::AverageDailyUseL,
        DeviceStat::WaterTotalizerL,
        DeviceStat::TreatedWaterLeftL,
        DeviceStat::UntreatedWaterL,
        DeviceStat::PeakFlowLpm,
        DeviceStat::UsageAverageL,
        DeviceStat::UsageReservedL,
        DeviceStat::SaltTotalKg,
        DeviceStat::SaltEfficiencyPpmPerKg,
        DeviceStat::OutOfSaltDays,
        DeviceStat::SaltDosePerRegenKg,
        DeviceStat::RockRemovedTotalKg,
        DeviceStat::RockRemovedDailyKg,
        DeviceStat::RockRemovedSinceRegenKg,
    ];

    /// Metric name for exporters.
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStat::CapacityRemainingPercent => "capacity_remaining_percent",
            DeviceStat::AverageCapacityAtRegenPercent => "average_capacity_at_regen_percent",
            DeviceStat::AverageDailyUseL => "average_daily_use_l",
            DeviceStat::WaterTotalizerL => "water_totalizer_l",
            DeviceStat::TreatedWaterLeftL => "treated_water_left_l",
            DeviceStat::UntreatedWaterL => "untreated_water_l",
            DeviceStat::PeakFlowLpm => "peak_flow_lpm",
            DeviceStat::UsageAverageL => "usage_average_l",
            DeviceStat::UsageReservedL => "usage_reserved_l",
            DeviceStat::SaltTotalKg => "salt_total_kg",
            DeviceStat::SaltEfficiencyPpmPerKg => "salt_efficiency_ppm_per_kg",
            DeviceStat::OutOfSaltDays => "out_of_salt_days",
            DeviceStat::SaltDosePerRegenKg => "salt_dose_per_regen_kg",
            DeviceStat::RockRemovedTotalKg => "rock_removed_total_kg",
            DeviceStat::RockRemovedDailyKg => "rock_removed_daily_kg",
            DeviceStat::RockRemovedSinceRegenKg => "rock_removed_since_regen_kg",
        }
    }

    /// Key in the cloud's key/value payload; `None` for table-derived stats.
    pub fn kv_key(&self) -> Option<&'static str> {
        let key = match self {
            DeviceStat::CapacityRemainingPercent => "capacity_remaining_percent",
            DeviceStat::AverageCapacityAtRegenPercent => "average_capacity_remaining_at_regen",
            DeviceStat::AverageDailyUseL => "average_daily_use",
            DeviceStat::WaterTotalizerL => "water_totalizer",
            DeviceStat::TreatedWaterLeftL => "treated_water_left",
            DeviceStat::UntreatedWaterL => "untreated_water",
            DeviceStat::PeakFlowLpm => "peak_flow",
            DeviceStat::SaltTotalKg => "salt_total",
            DeviceStat::SaltEfficiencyPpmPerKg => "total_salt_efficiency",
            DeviceStat::OutOfSaltDays => "out_of_salt_days",
            DeviceStat::SaltDosePerRegenKg => "average_salt_dose_per_recharge",
            DeviceStat::RockRemovedTotalKg => "total_rock_removed",
            DeviceStat::RockRemovedDailyKg => "daily_average_rock_removed",
            DeviceStat::RockRemovedSinceRegenKg => "since_regen_rock_removed",
            DeviceStat::UsageAverageL | DeviceStat::UsageReservedL => return None,
        };
        Some(key)
    }

    /// Row of the usage table the stat averages, if table-derived.
    pub fn usage_row(&self) -> Option<&'static str> {
        match self {
            DeviceStat::UsageAverageL => Some(USAGE_AVERAGE_ROW),
            DeviceStat::UsageReservedL => Some(USAGE_RESERVED_ROW),
            _ => None,
        }
    }

    /// Decimals kept when the value is relayed.
    pub fn decimals(&self) -> i32 {
        match self {
            DeviceStat::SaltEfficiencyPpmPerKg | DeviceStat::OutOfSaltDays => 0,
            DeviceStat::SaltTotalKg => 2,
            DeviceStat::SaltDosePerRegenKg
            | DeviceStat::RockRemovedTotalKg
            | DeviceStat::RockRemovedDailyKg
            | DeviceStat::RockRemovedSinceRegenKg => 3,
            _ => 1,
        }
    }

    /// Round `value` to [`decimals`](Self::decimals).
    pub fn round(&self, value: f64) -> f64 {
        round_to(value, self.decimals())
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

/// One row of the usage table, keyed by weekday column title.
#[derive(Debug, Clone, PartialEq)]
pub struct UsagePattern {
    pub days: Vec<(String, f64)>,
    /// Mean of `days`, one decimal.
    pub average: f64,
}

/// Read `row_label` out of a usage table.
///
/// The table is `{"column_titles": [...], "rows": [{"label", "values"}]}`.
/// Cells that do not parse as numbers are skipped; a row with no numeric
/// cell yields `None`.
pub fn usage_pattern(table: &Value, row_label: &str) -> Option<UsagePattern> {
    let titles = table.get("column_titles")?.as_array()?;
    let row = table
        .get("rows")?
        .as_array()?
        .iter()
        .find(|r| r.get("label").and_then(Value::as_str) == Some(row_label))?;
    let values = row.get("values")?.as_array()?;

    let days: Vec<(String, f64)> = titles
        .iter()
        .zip(values)
        .filter_map(|(day, cell)| {
            let value = cell_as_f64(cell)?;
            Some((title_text(day), round_to(value, 1)))
        })
        .collect();
    if days.is_empty() {
        return None;
    }

    let sum: f64 = days.iter().map(|(_, v)| v).sum();
    Some(UsagePattern {
        average: round_to(sum / days.len() as f64, 1),
        days,
    })
}

fn cell_as_f64(cell: &Value) -> Option<f64> {
    let value = match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    value.filter(|v| v.is_finite())
}

fn title_text(title: &Value) -> String {
    match title {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

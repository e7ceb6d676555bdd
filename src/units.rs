// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! House meter unit normalization.

use crate::config::{HouseMeterConfig, UnitMode};

/// Liters per cubic meter.
pub const LITERS_PER_M3: f64 = 1000.0;

/// Unit recognised from a meter's unit-of-measure label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedUnit {
    CubicMeters,
    Liters,
}

/// Recognise a unit-of-measure label. Unknown labels yield `None`.
pub fn detect_unit(label: &str) -> Option<DetectedUnit> {
    match label.trim().to_lowercase().as_str() {
        "m³" | "m3" | "m^3" => Some(DetectedUnit::CubicMeters),
        "l" | "liter" | "liters" | "litre" | "litres" => Some(DetectedUnit::Liters),
        _ => None,
    }
}

/// Multiplier turning a raw reading into liters.
pub fn liters_per_unit(config: &HouseMeterConfig, label: Option<&str>) -> f64 {
    match config.unit_mode {
        UnitMode::CubicMeters => LITERS_PER_M3,
        UnitMode::Liters => 1.0,
        UnitMode::Factor => config.factor,
        UnitMode::Auto => match label.and_then(detect_unit) {
            Some(DetectedUnit::CubicMeters) => LITERS_PER_M3,
            // Fails closed to liters.
            Some(DetectedUnit::Liters) | None => 1.0,
        },
    }
}

/// Convert a raw house meter reading to liters.
///
/// Returns `None` when the source reading is unavailable or not a finite
/// number.
pub fn normalize_to_liters(
    raw: Option<f64>,
    label: Option<&str>,
    config: &HouseMeterConfig,
) -> Option<f64> {
    let raw = raw.filter(|v| v.is_finite())?;
    Some(raw * liters_per_unit(config, label))
}

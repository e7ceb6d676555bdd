// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Raw-water fraction and blended hardness.
//!
//! ```text
//! raw_today_l         = max(0, house_today_l - softened_today_l - regen_offset_l)
//! raw_fraction_pct    = 0 if house_today_l <= 0, else 100 * raw / house in [0, 100]
//! treated_hardness_dh = raw_dh * p + softened_dh * (1 - p),  p = raw_fraction_pct / 100
//! ```

use crate::config::HardnessConfig;
use serde::{Deserialize, Serialize};

/// Output of one mixing computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixingResult {
    pub raw_today_l: f64,
    pub raw_fraction_percent: f64,
    pub treated_hardness_dh: f64,
}

/// House water that bypassed the softener today.
pub fn raw_today_l(house_today_l: f64, softened_today_l: f64, regen_offset_l: f64) -> f64 {
    (house_today_l - softened_today_l - regen_offset_l).max(0.0)
}

/// Share of today's house consumption that was raw water.
pub fn raw_fraction_percent(raw_today_l: f64, house_today_l: f64) -> f64 {
    if house_today_l <= 0.0 {
        return 0.0;
    }
    (100.0 * raw_today_l / house_today_l).clamp(0.0, 100.0)
}

/// Hardness of the blend.
pub fn blended_hardness_dh(raw_hardness_dh: f64, softened_hardness_dh: f64, raw_fraction_percent: f64) -> f64 {
    let p = raw_fraction_percent / 100.0;
    raw_hardness_dh * p + softened_hardness_dh * (1.0 - p)
}

/// Full mixing block with an explicit softened hardness.
pub fn compute(
    house_today_l: f64,
    softened_today_l: f64,
    regen_offset_l: f64,
    raw_hardness_dh: f64,
    softened_hardness_dh: f64,
) -> MixingResult {
    let raw = raw_today_l(house_today_l, softened_today_l, regen_offset_l);
    let pct = raw_fraction_percent(raw, house_today_l);
    MixingResult {
        raw_today_l: raw,
        raw_fraction_percent: pct,
        treated_hardness_dh: blended_hardness_dh(raw_hardness_dh, softened_hardness_dh, pct),
    }
}

/// Mixing block as configured. `None` until residual hardness is set.
pub fn mix(
    house_today_l: f64,
    softened_today_l: f64,
    hardness: &HardnessConfig,
    regen_offset_l: f64,
) -> Option<MixingResult> {
    let softened_dh = hardness.softened_hardness_dh?;
    Some(compute(
        house_today_l,
        softened_today_l,
        regen_offset_l,
        hardness.raw_hardness_dh,
        softened_dh,
    ))
}

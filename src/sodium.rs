// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Sodium load of softened water.
//!
//! Ion exchange swaps calcium and magnesium for sodium, adding about
//! 8 mg/L of sodium per °dH removed. The drinking water limit is 200 mg/L.
//! Both constants are fixed.

use serde::{Deserialize, Serialize};

/// Sodium added per °dH of hardness removed (mg/L).
pub const SODIUM_MG_L_PER_DH: f64 = 8.0;

/// Sodium concentration above which the alert fires (mg/L).
pub const SODIUM_LIMIT_MG_L: f64 = 200.0;

/// Effective sodium and the derived alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SodiumReading {
    pub na_eff_mg_l: f64,
    pub alert: bool,
}

pub fn effective_sodium_mg_l(na_raw_mg_l: f64, raw_hardness_dh: f64, effective_hardness_dh: f64) -> f64 {
    na_raw_mg_l + (raw_hardness_dh - effective_hardness_dh) * SODIUM_MG_L_PER_DH
}

pub fn exceeds_limit(na_eff_mg_l: f64) -> bool {
    na_eff_mg_l > SODIUM_LIMIT_MG_L
}

pub fn assess(na_raw_mg_l: f64, raw_hardness_dh: f64, smoothed_hardness_dh: f64) -> SodiumReading {
    let na_eff_mg_l = effective_sodium_mg_l(na_raw_mg_l, raw_hardness_dh, smoothed_hardness_dh);
    SodiumReading {
        na_eff_mg_l,
        alert: exceeds_limit(na_eff_mg_l),
    }
}

// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Engine configuration.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default raw water hardness (°dH).
pub const DEFAULT_RAW_HARDNESS_DH: f64 = 22.2;

/// Default sodium content of the raw water (mg/L).
pub const DEFAULT_RAW_SODIUM_MG_L: f64 = 69.2;

/// Default water the softener spends on its own regeneration (L/day).
pub const DEFAULT_REGEN_SELF_CONSUMPTION_L: f64 = 100.0;

/// Upper bounds accepted for user-entered values.
pub const MAX_RAW_HARDNESS_DH: f64 = 40.0;
pub const MAX_SOFTENED_HARDNESS_DH: f64 = 20.0;
pub const MAX_RAW_SODIUM_MG_L: f64 = 500.0;

/// Degraded-cycle diagnostics are logged at most once per this many seconds.
pub const MIN_DEGRADED_LOG_INTERVAL_SECS: i64 = 3600;

/// Master configuration for the derived metrics engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hardness and sodium constants of the installation.
    pub hardness: HardnessConfig,

    /// How to read the house water meter.
    pub house_meter: HouseMeterConfig,

    /// Daily regeneration self-consumption subtracted before mixing (L).
    pub regen_self_consumption_l: f64,

    /// Diagnostic logging behaviour.
    pub diagnostics: DiagnosticsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hardness: HardnessConfig::default(),
            house_meter: HouseMeterConfig::default(),
            regen_self_consumption_l: DEFAULT_REGEN_SELF_CONSUMPTION_L,
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse from a JSON document. Missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reject values that would make the derived metrics meaningless.
    pub fn validate(&self) -> Result<()> {
        self.hardness.validate()?;
        self.house_meter.validate()?;

        if !self.regen_self_consumption_l.is_finite() || self.regen_self_consumption_l < 0.0 {
            return Err(ConfigError::InvalidRegenOffset(self.regen_self_consumption_l).into());
        }

        self.diagnostics.validate()
    }
}

/// Hardness and sodium constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardnessConfig {
    /// Hardness of the untreated supply (°dH).
    pub raw_hardness_dh: f64,

    /// Residual hardness behind the softener (°dH).
    ///
    /// `None` until the user calibrates it; hardness math stays disabled
    /// until then.
    pub softened_hardness_dh: Option<f64>,

    /// Sodium content of the untreated supply (mg/L).
    pub na_raw_mg_l: f64,
}

impl Default for HardnessConfig {
    fn default() -> Self {
        Self {
            raw_hardness_dh: DEFAULT_RAW_HARDNESS_DH,
            softened_hardness_dh: None,
            na_raw_mg_l: DEFAULT_RAW_SODIUM_MG_L,
        }
    }
}

impl HardnessConfig {
    /// Defaults, with the raw hardness seeded from the value the cloud
    /// programmed into the softener when one is known.
    pub fn from_cloud(cloud_raw_hardness_dh: Option<f64>) -> Self {
        Self {
            raw_hardness_dh: cloud_raw_hardness_dh.unwrap_or(DEFAULT_RAW_HARDNESS_DH),
            ..Default::default()
        }
    }

    /// Builder: set the calibrated residual hardness.
    pub fn with_softened(mut self, softened_hardness_dh: f64) -> Self {
        self.softened_hardness_dh = Some(softened_hardness_dh);
        self
    }

    /// Whether the blended hardness can be computed at all.
    pub fn is_calibrated(&self) -> bool {
        self.softened_hardness_dh.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        check_hardness("raw_hardness_dh", self.raw_hardness_dh, MAX_RAW_HARDNESS_DH)?;

        if let Some(softened) = self.softened_hardness_dh {
            check_hardness("softened_hardness_dh", softened, MAX_SOFTENED_HARDNESS_DH)?;
            if softened > self.raw_hardness_dh {
                return Err(ConfigError::SoftenedAboveRaw {
                    softened,
                    raw: self.raw_hardness_dh,
                }
                .into());
            }
        }

        if !self.na_raw_mg_l.is_finite()
            || self.na_raw_mg_l < 0.0
            || self.na_raw_mg_l > MAX_RAW_SODIUM_MG_L
        {
            return Err(ConfigError::SodiumOutOfRange {
                value: self.na_raw_mg_l,
                max: MAX_RAW_SODIUM_MG_L,
            }
            .into());
        }

        Ok(())
    }
}

fn check_hardness(field: &'static str, value: f64, max: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 || value > max {
        return Err(ConfigError::InvalidHardness { field, value }.into());
    }
    Ok(())
}

/// Unit the house meter reports in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnitMode {
    /// Detect from the unit-of-measure label, liters if undetectable.
    #[default]
    #[serde(rename = "auto")]
    Auto,
    /// Cubic meters.
    #[serde(rename = "m3")]
    CubicMeters,
    /// Liters.
    #[serde(rename = "l")]
    Liters,
    /// Opaque ticks multiplied by [`HouseMeterConfig::factor`].
    #[serde(rename = "factor")]
    Factor,
}

impl UnitMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitMode::Auto => "auto",
            UnitMode::CubicMeters => "m3",
            UnitMode::Liters => "l",
            UnitMode::Factor => "factor",
        }
    }
}

impl fmt::Display for UnitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(UnitMode::Auto),
            "m3" | "m³" => Ok(UnitMode::CubicMeters),
            "l" => Ok(UnitMode::Liters),
            "factor" => Ok(UnitMode::Factor),
            other => Err(ConfigError::UnknownUnitMode(other.to_string())),
        }
    }
}

/// House water meter settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HouseMeterConfig {
    pub unit_mode: UnitMode,
    /// Liters per raw unit when `unit_mode` is `factor`.
    pub factor: f64,
}

impl Default for HouseMeterConfig {
    fn default() -> Self {
        Self {
            unit_mode: UnitMode::Auto,
            factor: 1.0,
        }
    }
}

impl HouseMeterConfig {
    pub fn with_factor(factor: f64) -> Self {
        Self {
            unit_mode: UnitMode::Factor,
            factor,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.unit_mode == UnitMode::Factor && !(self.factor.is_finite() && self.factor > 0.0) {
            return Err(ConfigError::InvalidFactor(self.factor).into());
        }
        Ok(())
    }
}

/// Diagnostic logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Minimum spacing between degraded-cycle log entries per device (s).
    pub degraded_log_interval_secs: i64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            degraded_log_interval_secs: MIN_DEGRADED_LOG_INTERVAL_SECS,
        }
    }
}

impl DiagnosticsConfig {
    /// Longer spacing is allowed, shorter is not.
    pub fn validate(&self) -> Result<()> {
        if self.degraded_log_interval_secs < MIN_DEGRADED_LOG_INTERVAL_SECS {
            return Err(ConfigError::LogIntervalTooShort {
                value: self.degraded_log_interval_secs,
                min: MIN_DEGRADED_LOG_INTERVAL_SECS,
            }
            .into());
        }
        Ok(())
    }

    /// Interval the throttle applies. Engines built without validation
    /// still never log more often than the minimum.
    pub fn effective_interval_secs(&self) -> i64 {
        self.degraded_log_interval_secs.max(MIN_DEGRADED_LOG_INTERVAL_SECS)
    }
}

// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Persisted per-device state.
//!
//! Everything the engine needs to survive a restart: both counter
//! baselines, the smoother, the guard, and the last value of every derived
//! metric (the hold policy's memory). A cold start is simply
//! [`DeviceState::new`].

use crate::baseline::DayTracker;
use crate::error::{Result, StateError};
use crate::guard::GuardState;
use crate::input::DeviceStat;
use crate::smoother::SmoothedSample;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Current persisted state format.
pub const STATE_VERSION: u32 = 1;

/// Last computed day-scoped metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DerivedDailyMetrics {
    pub house_today_l: Option<f64>,
    pub softened_today_l: Option<f64>,
    pub raw_today_l: Option<f64>,
    pub raw_fraction_percent: Option<f64>,
    pub treated_hardness_dh: Option<f64>,
}

/// Last values passed through from the cloud summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceMetrics {
    pub salt_level_percent: Option<f64>,
    pub flow_lpm: Option<f64>,
    pub treated_today_l: Option<f64>,
    pub regeneration_active: Option<bool>,
    /// Last seen value of every relayed statistic.
    pub stats: BTreeMap<DeviceStat, f64>,
}

/// All state owned by one device's engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub version: u32,
    #[serde(default)]
    pub house: DayTracker,
    #[serde(default)]
    pub softened: DayTracker,
    #[serde(default)]
    pub smoother: Option<SmoothedSample>,
    #[serde(default)]
    pub guard: GuardState,
    #[serde(default)]
    pub derived: DerivedDailyMetrics,
    #[serde(default)]
    pub device: DeviceMetrics,
    #[serde(default)]
    pub cycle_count: u64,
    #[serde(default)]
    pub last_cycle_at: Option<DateTime<FixedOffset>>,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceState {
    /// Cold-start state: nothing captured yet.
    pub fn new() -> Self {
        Self {
            version: STATE_VERSION,
            house: DayTracker::new(),
            softened: DayTracker::new(),
            smoother: None,
            guard: GuardState::new(),
            derived: DerivedDailyMetrics::default(),
            device: DeviceMetrics::default(),
            cycle_count: 0,
            last_cycle_at: None,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self).map_err(StateError::from)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let state: Self = serde_json::from_str(json).map_err(StateError::from)?;
        if state.version > STATE_VERSION {
            return Err(StateError::UnsupportedVersion {
                found: state.version,
                supported: STATE_VERSION,
            }
            .into());
        }
        Ok(state)
    }

    /// Load from `path`. A missing file yields a cold-start state.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("no state at {}, starting cold", path.display());
                Ok(Self::new())
            }
            Err(e) => Err(io_error(path, e)),
        }
    }

    /// Write to `path` through a sibling temp file and a rename, so a crash
    /// leaves either the old or the new state on disk.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = self.to_json()?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "state".to_string());
        let tmp = path.with_file_name(format!(".{}.tmp", file_name));

        fs::write(&tmp, json).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
        Ok(())
    }
}

fn io_error(path: &Path, err: std::io::Error) -> crate::error::SoftenerError {
    StateError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
    .into()
}

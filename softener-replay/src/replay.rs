// Softener Replay - Recorded poll cycle replay
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Replay of recorded poll cycles through the softener metrics engine.
//!
//! A recording is a CSV file with one poll per row:
//!
//! ```text
//! timestamp,house_value,house_unit,summary,treated_total_l,treated_today_l,salt_level,flow_lpm,regenerating,detail,operating_capacity,hardness_grains
//! 2024-01-01T08:00:00+01:00,812.345,m³,ok,104220,35,70,0,false,ok,1500,22
//! 2024-01-01T08:05:00+01:00,812.360,m³,rate_limited,,,,,,skipped,,
//! ```
//!
//! Empty cells are missing fields. An empty status cell means `ok` when the
//! row carries any field of that source and `unavailable` otherwise.
//! Two optional trailing columns, `capacity_remaining` and `usage_average_l`,
//! carry the device's own statistics as part of the summary.

use crate::metrics::{increment_cycles_processed, update_snapshot_metrics};
use chrono::DateTime;
use serde::Deserialize;
use softener_metrics::{
    CloudDetail, CloudSummary, DetailReading, DeviceStat, DeviceState, EngineConfig, InputError,
    MetricsSnapshot, PollCycle, SoftenerEngine, SoftenerError, SummaryReading,
};
use std::path::Path;
use tracing::{debug, info};

/// Source identifier stamped on replayed cycles.
pub const SOURCE: &str = "csv-replay";

/// Configuration for a replay run.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Path to the CSV recording.
    pub csv_path: String,
    /// Device label for logs and metrics.
    pub device_id: String,
    /// Engine configuration.
    pub engine: EngineConfig,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            csv_path: String::new(),
            device_id: softener_metrics::engine::DEFAULT_DEVICE_ID.to_string(),
            engine: EngineConfig::default(),
        }
    }
}

/// One CSV row as recorded.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReplayRow {
    pub timestamp: String,
    pub house_value: Option<f64>,
    pub house_unit: Option<String>,
    pub summary: Option<String>,
    pub treated_total_l: Option<f64>,
    pub treated_today_l: Option<f64>,
    pub salt_level: Option<f64>,
    pub flow_lpm: Option<f64>,
    pub regenerating: Option<String>,
    pub detail: Option<String>,
    pub operating_capacity: Option<f64>,
    pub hardness_grains: Option<f64>,
    #[serde(default)]
    pub capacity_remaining: Option<f64>,
    #[serde(default)]
    pub usage_average_l: Option<f64>,
}

impl ReplayRow {
    /// Convert the row to a poll cycle.
    pub fn to_poll_cycle(&self) -> Result<PollCycle, InputError> {
        let timestamp = DateTime::parse_from_rfc3339(self.timestamp.trim())
            .map_err(|_| InputError::InvalidTimestamp(self.timestamp.clone()))?;

        let mut cycle = PollCycle::at(timestamp).with_source(SOURCE);
        if let Some(value) = self.house_value {
            let unit = self.house_unit.as_deref().map(str::trim).filter(|u| !u.is_empty());
            cycle = cycle.with_house(value, unit);
        }
        cycle.summary = self.summary_reading()?;
        cycle.detail = self.detail_reading()?;
        Ok(cycle)
    }

    fn summary_reading(&self) -> Result<SummaryReading, InputError> {
        let stats = [
            (DeviceStat::CapacityRemainingPercent, self.capacity_remaining),
            (DeviceStat::UsageAverageL, self.usage_average_l),
        ];
        let summary = CloudSummary {
            treated_total_l: self.treated_total_l,
            treated_today_l: self.treated_today_l,
            salt_level_percent: self.salt_level,
            flow_lpm: self.flow_lpm,
            regenerating: self.regenerating.as_deref().map(parse_bool).transpose()?,
            stats: stats
                .into_iter()
                .filter_map(|(stat, value)| value.map(|v| (stat, v)))
                .collect(),
            ..Default::default()
        };
        let has_fields = summary != CloudSummary::default();

        match status(&self.summary, has_fields) {
            "ok" => Ok(SummaryReading::Available(summary)),
            "unavailable" => Ok(SummaryReading::Unavailable),
            "rate_limited" => Ok(SummaryReading::RateLimited),
            other => Err(InputError::UnknownStatus {
                source_name: "summary",
                value: other.to_string(),
            }),
        }
    }

    fn detail_reading(&self) -> Result<DetailReading, InputError> {
        let has_fields = self.operating_capacity.is_some() || self.hardness_grains.is_some();

        match status(&self.detail, has_fields) {
            "ok" => Ok(DetailReading::Available(CloudDetail {
                operating_capacity: self.operating_capacity,
                hardness_grains: self.hardness_grains,
                observed_at: None,
            })),
            "unavailable" => Ok(DetailReading::Unavailable),
            "skipped" => Ok(DetailReading::Skipped),
            other => Err(InputError::UnknownStatus {
                source_name: "detail",
                value: other.to_string(),
            }),
        }
    }
}

fn status(cell: &Option<String>, has_fields: bool) -> &str {
    match cell.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ if has_fields => "ok",
        _ => "unavailable",
    }
}

fn parse_bool(raw: &str) -> Result<bool, InputError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(InputError::Malformed(format!(
            "regenerating must be a boolean, got {:?}",
            other
        ))),
    }
}

/// Replay engine feeding a recording through one device engine.
pub struct ReplayEngine {
    config: ReplayConfig,
    engine: SoftenerEngine,
    cycles: Vec<PollCycle>,
}

impl ReplayEngine {
    /// Create a replay engine from a CSV file.
    pub fn from_csv(config: ReplayConfig) -> Result<Self, ReplayError> {
        let path = Path::new(&config.csv_path);
        if !path.exists() {
            return Err(ReplayError::FileNotFound(config.csv_path.clone()));
        }

        let cycles = Self::parse_csv(path)?;
        if cycles.is_empty() {
            return Err(ReplayError::EmptyDataset);
        }

        let engine = SoftenerEngine::try_new(config.engine.clone())?
            .with_device_id(config.device_id.clone());

        info!(
            "Loaded recording: {} cycles for device {}",
            cycles.len(),
            config.device_id
        );

        Ok(Self {
            config,
            engine,
            cycles,
        })
    }

    /// Parse a CSV file into poll cycles.
    fn parse_csv(path: &Path) -> Result<Vec<PollCycle>, ReplayError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)?;

        let mut cycles = Vec::new();
        for (index, result) in reader.deserialize::<ReplayRow>().enumerate() {
            // Header is line 1.
            let line = index + 2;
            let row = result?;
            let cycle = row
                .to_poll_cycle()
                .map_err(|source| ReplayError::Row { line, source })?;
            cycles.push(cycle);
        }
        Ok(cycles)
    }

    /// Resume from persisted state.
    pub fn import_state(&mut self, state: DeviceState) -> Result<(), ReplayError> {
        self.engine.import_state(state)?;
        Ok(())
    }

    /// State after the cycles replayed so far.
    pub fn export_state(&self) -> DeviceState {
        self.engine.export_state()
    }

    /// Replay every cycle, handing each snapshot to `on_snapshot`.
    ///
    /// Returns the number of cycles processed.
    pub fn run<F>(&mut self, mut on_snapshot: F) -> Result<usize, ReplayError>
    where
        F: FnMut(&MetricsSnapshot) -> Result<(), ReplayError>,
    {
        let device = self.config.device_id.as_str();
        for (position, cycle) in self.cycles.iter().enumerate() {
            debug!("Processing cycle {} at {}", position, cycle.timestamp);
            let snapshot = self.engine.process(cycle);
            update_snapshot_metrics(device, &snapshot);
            increment_cycles_processed(device);
            on_snapshot(&snapshot)?;
        }
        info!(
            "Replay complete: {} cycles, {} total for device {}",
            self.cycles.len(),
            self.engine.cycle_count(),
            device
        );
        Ok(self.cycles.len())
    }

    /// Get recording info.
    pub fn dataset_info(&self) -> DatasetInfo {
        let first = self.cycles.first().map(|c| c.timestamp.to_rfc3339());
        let last = self.cycles.last().map(|c| c.timestamp.to_rfc3339());
        DatasetInfo {
            cycle_count: self.cycles.len(),
            first,
            last,
        }
    }
}

/// Recording information.
#[derive(Debug, Clone)]
pub struct DatasetInfo {
    pub cycle_count: usize,
    pub first: Option<String>,
    pub last: Option<String>,
}

/// Replay errors.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Line {line}: {source}")]
    Row { line: usize, source: InputError },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error(transparent)]
    Engine(#[from] SoftenerError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Generic JSON input adapter.
//!
//! Accepts a simple JSON record for integration with any poller.

use super::{DetailReading, InputAdapter, MeterReading, PollCycle, SummaryReading};
use crate::error::{InputError, Result};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Generic JSON poll record.
///
/// Example JSON:
/// ```json
/// {
///   "timestamp": "2024-01-02T07:30:00+01:00",
///   "house": { "value": 812.345, "unit": "m³" },
///   "summary": { "status": "ok", "treated_total_l": 104220.0, "regenerating": false },
///   "detail": { "status": "skipped" }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenericCycle {
    pub timestamp: DateTime<FixedOffset>,

    #[serde(default)]
    pub house: MeterReading,

    #[serde(default)]
    pub summary: SummaryReading,

    #[serde(default)]
    pub detail: DetailReading,
}

impl GenericCycle {
    /// Parse from JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| InputError::Malformed(e.to_string()).into())
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Convert to a poll cycle.
    pub fn build(self) -> PollCycle {
        self.to_poll_cycle()
    }
}

impl From<&PollCycle> for GenericCycle {
    fn from(cycle: &PollCycle) -> Self {
        Self {
            timestamp: cycle.timestamp,
            house: cycle.house.clone(),
            summary: cycle.summary.clone(),
            detail: cycle.detail.clone(),
        }
    }
}

impl InputAdapter for GenericCycle {
    fn to_poll_cycle(&self) -> PollCycle {
        PollCycle {
            timestamp: self.timestamp,
            house: self.house.clone(),
            summary: self.summary.clone(),
            detail: self.detail.clone(),
            source: "generic-json".to_string(),
        }
    }
}

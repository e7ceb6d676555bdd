// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Missing-data hold policy.
//!
//! Every derived metric goes through [`hold_last`]: it is recomputed only
//! when all of its direct inputs are valid this cycle, otherwise the stored
//! value is kept and reported as [`MetricStatus::Held`]. A metric that was
//! never computed is [`MetricStatus::Unavailable`], never zero.

use serde::{Deserialize, Serialize};

/// How a metric's value was obtained this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricStatus {
    /// Recomputed from this cycle's inputs.
    Fresh,
    /// Previous value kept because an input was missing.
    Held,
    /// Never computed, or gated off.
    Unavailable,
}

/// A metric value together with its provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricValue<T> {
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub value: Option<T>,
    pub status: MetricStatus,
}

impl<T: Copy> MetricValue<T> {
    pub fn fresh(value: T) -> Self {
        Self {
            value: Some(value),
            status: MetricStatus::Fresh,
        }
    }

    pub fn held(value: T) -> Self {
        Self {
            value: Some(value),
            status: MetricStatus::Held,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            value: None,
            status: MetricStatus::Unavailable,
        }
    }

    /// Held value if one exists, unavailable otherwise.
    pub fn from_previous(previous: Option<T>) -> Self {
        previous.map_or_else(Self::unavailable, Self::held)
    }

    pub fn get(&self) -> Option<T> {
        self.value
    }

    pub fn is_fresh(&self) -> bool {
        self.status == MetricStatus::Fresh
    }

    pub fn is_held(&self) -> bool {
        self.status == MetricStatus::Held
    }

    pub fn is_available(&self) -> bool {
        self.value.is_some()
    }

    /// Transform the value, keeping the status.
    pub fn map<U: Copy>(self, f: impl FnOnce(T) -> U) -> MetricValue<U> {
        MetricValue {
            value: self.value.map(f),
            status: self.status,
        }
    }
}

impl<T: Copy> Default for MetricValue<T> {
    fn default() -> Self {
        Self::unavailable()
    }
}

/// Apply the hold policy to one stored metric.
///
/// `fresh` is `Some` only when every input of the metric was valid. The slot
/// is overwritten on a fresh value and left untouched otherwise.
pub fn hold_last<T: Copy>(slot: &mut Option<T>, fresh: Option<T>) -> MetricValue<T> {
    match fresh {
        Some(value) => {
            *slot = Some(value);
            MetricValue::fresh(value)
        }
        None => MetricValue::from_previous(*slot),
    }
}

/// Recompute a metric from its inputs, or hold.
pub fn recompute_or_hold<I, T: Copy>(
    slot: &mut Option<T>,
    inputs: Option<I>,
    compute: impl FnOnce(I) -> T,
) -> MetricValue<T> {
    hold_last(slot, inputs.map(compute))
}

// Softener Replay - Prometheus metrics definitions
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Prometheus metrics for replayed softener snapshots.
//!
//! Every series carries a `device` label so one process can replay
//! several installations into the same registry.

use lazy_static::lazy_static;
use prometheus::{
    register_gauge_vec, register_int_counter_vec, Encoder, GaugeVec, IntCounterVec, TextEncoder,
};
use softener_metrics::{DeviceStat, MetricStatus, MetricsSnapshot, RegenPhase};

lazy_static! {
    // ============================================================
    // Derived metrics (from MetricsSnapshot)
    // ============================================================

    /// Value of each numeric metric. Absent while the metric is unavailable.
    pub static ref METRIC_VALUE: GaugeVec = register_gauge_vec!(
        "softener_metric_value",
        "Derived softener metric value",
        &["device", "metric"]
    ).expect("softener_metric_value registers once");

    /// Hold status of each metric (0=fresh, 1=held, 2=unavailable).
    pub static ref METRIC_STATUS: GaugeVec = register_gauge_vec!(
        "softener_metric_status",
        "Metric status (0=fresh, 1=held, 2=unavailable)",
        &["device", "metric"]
    ).expect("softener_metric_status registers once");

    /// Sodium above the drinking water limit (1 = alert).
    pub static ref SODIUM_ALERT: GaugeVec = register_gauge_vec!(
        "softener_sodium_alert",
        "Effective sodium above the drinking water limit (1=alert)",
        &["device"]
    ).expect("softener_sodium_alert registers once");

    // ============================================================
    // Regeneration guard
    // ============================================================

    /// Guard phase (0=normal, 1=possible regeneration).
    pub static ref REGEN_PHASE: GaugeVec = register_gauge_vec!(
        "softener_regen_phase",
        "Regeneration guard phase (0=normal, 1=possible_regen)",
        &["device"]
    ).expect("softener_regen_phase registers once");

    /// Detail source degraded (1 = degraded).
    pub static ref DEGRADED: GaugeVec = register_gauge_vec!(
        "softener_detail_degraded",
        "Cloud detail source degraded (1=degraded)",
        &["device"]
    ).expect("softener_detail_degraded registers once");

    /// Capacity recorded at the last confirmed reset.
    pub static ref CAPACITY_BASELINE: GaugeVec = register_gauge_vec!(
        "softener_capacity_baseline",
        "Operating capacity at the last confirmed regeneration",
        &["device"]
    ).expect("softener_capacity_baseline registers once");

    // ============================================================
    // Replay progress
    // ============================================================

    /// Poll cycles replayed.
    pub static ref CYCLES_PROCESSED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "softener_cycles_processed_total",
        "Poll cycles processed",
        &["device"]
    ).expect("softener_cycles_processed_total registers once");
}

fn status_code(status: MetricStatus) -> f64 {
    match status {
        MetricStatus::Fresh => 0.0,
        MetricStatus::Held => 1.0,
        MetricStatus::Unavailable => 2.0,
    }
}

fn flag(on: bool) -> f64 {
    if on {
        1.0
    } else {
        0.0
    }
}

fn set_metric(device: &str, name: &str, status: MetricStatus, value: Option<f64>) {
    METRIC_STATUS
        .with_label_values(&[device, name])
        .set(status_code(status));
    match value {
        Some(value) => METRIC_VALUE.with_label_values(&[device, name]).set(value),
        None => {
            // Not an error when the series was never exported.
            let _ = METRIC_VALUE.remove_label_values(&[device, name]);
        }
    }
}

/// Update every gauge of a device from one snapshot.
pub fn update_snapshot_metrics(device: &str, snapshot: &MetricsSnapshot) {
    for (name, metric) in snapshot.numeric_metrics() {
        set_metric(device, name, metric.status, metric.get());
    }
    for stat in DeviceStat::ALL {
        let metric = snapshot.stat(stat);
        set_metric(device, stat.as_str(), metric.status, metric.get());
    }

    let regen = &snapshot.regeneration_active;
    set_metric(device, "regeneration_active", regen.status, regen.get().map(flag));

    SODIUM_ALERT
        .with_label_values(&[device])
        .set(flag(snapshot.sodium_alert));
    REGEN_PHASE
        .with_label_values(&[device])
        .set(flag(snapshot.regen_phase == RegenPhase::PossibleRegen));
    DEGRADED
        .with_label_values(&[device])
        .set(flag(snapshot.degraded));
    if let Some(baseline) = snapshot.capacity_baseline {
        CAPACITY_BASELINE.with_label_values(&[device]).set(baseline);
    }
}

/// Increment the processed cycle counter.
pub fn increment_cycles_processed(device: &str) {
    CYCLES_PROCESSED_TOTAL.with_label_values(&[device]).inc();
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

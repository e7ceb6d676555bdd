// Softener Metrics - Integration Tests
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Integration tests for the derived metrics engine.

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, FixedOffset};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use softener_metrics::snapshot::*;
use softener_metrics::*;

// ============================================================================
// Helper Functions
// ============================================================================

fn at(ts: &str) -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339(ts).unwrap()
}

fn calibrated_config() -> EngineConfig {
    EngineConfig {
        hardness: HardnessConfig::default().with_softened(0.0),
        ..Default::default()
    }
}

fn full_cycle(ts: DateTime<FixedOffset>, house_l: f64, softened_l: f64) -> PollCycle {
    PollCycle::at(ts)
        .with_house(house_l, Some("L"))
        .with_summary(
            CloudSummary::new()
                .with_treated_total(softened_l)
                .with_salt_level(80.0)
                .with_flow(0.0)
                .with_regenerating(false),
        )
        .with_detail(CloudDetail::new(1500.0, 22.0))
}

/// Engine at the reference day: 1000 L house, 850 L softened since midnight.
fn reference_day_engine() -> (SoftenerEngine, MetricsSnapshot) {
    let mut engine = SoftenerEngine::new(calibrated_config());
    engine.process(&full_cycle(at("2024-01-01T00:05:00+01:00"), 10_000.0, 5_000.0));
    let out = engine.process(&full_cycle(at("2024-01-01T20:00:00+01:00"), 11_000.0, 5_850.0));
    (engine, out)
}

// ============================================================================
// Section 1: Configuration Tests
// ============================================================================

#[test]
fn test_default_config_is_valid_and_uncalibrated() {
    let config = EngineConfig::default();
    assert!(config.validate().is_ok());
    assert!(!config.hardness.is_calibrated());
}

#[test]
fn test_config_from_json() {
    let config = EngineConfig::from_json(
        r#"{
            "hardness": { "raw_hardness_dh": 18.0, "softened_hardness_dh": 1.5, "na_raw_mg_l": 20.0 },
            "house_meter": { "unit_mode": "factor", "factor": 0.5 },
            "regen_self_consumption_l": 60.0
        }"#,
    )
    .unwrap();
    assert_eq!(config.house_meter.unit_mode, UnitMode::Factor);
    assert_eq!(config.regen_self_consumption_l, 60.0);
    assert!(SoftenerEngine::try_new(config).is_ok());
}

#[test]
fn test_invalid_config_rejected() {
    let config = EngineConfig {
        hardness: HardnessConfig::default().with_softened(25.0),
        ..Default::default()
    };
    assert!(matches!(
        SoftenerEngine::try_new(config),
        Err(SoftenerError::Config(_))
    ));
}

#[test]
fn test_short_degraded_log_interval_rejected() {
    let json = r#"{ "diagnostics": { "degraded_log_interval_secs": 0 } }"#;
    assert!(matches!(
        EngineConfig::from_json(json),
        Err(SoftenerError::Config(ConfigError::LogIntervalTooShort { .. }))
    ));

    let mut config = calibrated_config();
    config.diagnostics.degraded_log_interval_secs = 600;
    assert!(SoftenerEngine::try_new(config).is_err());
}

// ============================================================================
// Section 2: Day Boundary Tests
// ============================================================================

#[test]
fn test_day_rollover_reference() {
    // Baseline (100 L, 2024-01-01), first sample of 2024-01-02 at 105 L.
    let mut engine = SoftenerEngine::new(calibrated_config());
    engine.process(&full_cycle(at("2024-01-01T08:00:00+01:00"), 100.0, 100.0));

    let out = engine.process(&full_cycle(at("2024-01-02T00:01:00+01:00"), 105.0, 105.0));
    let baseline = engine.state().house.baseline().unwrap();
    assert_eq!(baseline.baseline_value, 105.0);
    assert_eq!(baseline.baseline_date.to_string(), "2024-01-02");
    assert_eq!(out.house_today_l, MetricValue::fresh(0.0));
    assert!(out.has_flag(FLAG_DAY_ROLLOVER));
}

#[test]
fn test_silent_across_midnight() {
    let mut engine = SoftenerEngine::new(calibrated_config());
    engine.process(&full_cycle(at("2024-01-01T22:00:00+01:00"), 1_000.0, 500.0));

    // Nothing during the night.
    let empty = PollCycle::at(at("2024-01-02T00:30:00+01:00"));
    let out = engine.process(&empty);
    assert_eq!(out.house_today_l, MetricValue::held(0.0));

    // First sample of the new day starts it at zero, whatever the jump.
    let out = engine.process(&full_cycle(at("2024-01-02T07:00:00+01:00"), 1_350.0, 700.0));
    assert_eq!(out.house_today_l, MetricValue::fresh(0.0));
    assert_eq!(out.softened_today_l, MetricValue::fresh(0.0));
}

#[test]
fn test_counters_roll_over_independently() {
    let mut engine = SoftenerEngine::new(calibrated_config());
    engine.process(&full_cycle(at("2024-01-01T22:00:00+01:00"), 1_000.0, 500.0));

    // Next day: house only; the softener summary is rate limited.
    let cycle = PollCycle::at(at("2024-01-02T06:00:00+01:00"))
        .with_house(1_200.0, Some("L"))
        .rate_limited();
    engine.process(&cycle);

    let state = engine.state();
    assert_eq!(state.house.baseline().unwrap().baseline_date.to_string(), "2024-01-02");
    assert_eq!(state.softened.baseline().unwrap().baseline_date.to_string(), "2024-01-01");

    engine.process(&full_cycle(at("2024-01-02T07:00:00+01:00"), 1_260.0, 620.0));
    assert_eq!(engine.house_today_l(), Some(60.0));
    assert_eq!(engine.softened_today_l(), Some(0.0));
}

// ============================================================================
// Section 3: Non-Negativity Tests
// ============================================================================

#[test]
fn test_counter_reset_reanchors() {
    let mut engine = SoftenerEngine::new(calibrated_config());
    engine.process(&full_cycle(at("2024-01-01T08:00:00+01:00"), 500.0, 200.0));
    engine.process(&full_cycle(at("2024-01-01T09:00:00+01:00"), 600.0, 250.0));

    let out = engine.process(&full_cycle(at("2024-01-01T10:00:00+01:00"), 20.0, 260.0));
    assert_eq!(out.house_today_l, MetricValue::fresh(0.0));
    assert_eq!(engine.state().house.baseline().unwrap().baseline_value, 20.0);
    assert!(out.has_flag(FLAG_BASELINE_REANCHORED));

    let out = engine.process(&full_cycle(at("2024-01-01T11:00:00+01:00"), 45.0, 270.0));
    assert_eq!(out.house_today_l, MetricValue::fresh(25.0));
}

#[test]
fn test_random_counters_never_go_negative() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut engine = SoftenerEngine::new(calibrated_config());
    let mut ts = at("2024-01-01T00:00:00+01:00");
    let (mut house, mut softened) = (10_000.0f64, 4_000.0f64);

    for _ in 0..2_000 {
        ts = ts + Duration::minutes(rng.gen_range(1..90));
        house += rng.gen_range(0.0..40.0);
        softened += rng.gen_range(0.0..35.0);
        if rng.gen_bool(0.01) {
            house = rng.gen_range(0.0..100.0);
        }
        if rng.gen_bool(0.01) {
            softened -= rng.gen_range(0.0..500.0);
        }

        let mut cycle = PollCycle::at(ts);
        if rng.gen_bool(0.9) {
            cycle = cycle.with_house(house, Some("L"));
        }
        if rng.gen_bool(0.85) {
            cycle = cycle.with_summary(CloudSummary::new().with_treated_total(softened));
        }

        let out = engine.process(&cycle);
        for (name, metric) in out.numeric_metrics() {
            if let Some(v) = metric.get() {
                if name != "sodium_mg_l" {
                    assert!(v >= 0.0, "{} went negative: {}", name, v);
                }
            }
        }
        if let Some(p) = out.raw_fraction_percent.get() {
            assert!((0.0..=100.0).contains(&p));
        }
    }
}

// ============================================================================
// Section 4: Hold Policy Tests
// ============================================================================

#[test]
fn test_hold_on_missing_softened() {
    let (mut engine, before) = reference_day_engine();

    let cycle = PollCycle::at(at("2024-01-01T21:00:00+01:00"))
        .with_house(11_500.0, Some("L"))
        .rate_limited();
    let out = engine.process(&cycle);

    assert_eq!(out.house_today_l, MetricValue::fresh(1_500.0));
    assert!(out.softened_today_l.is_held());
    assert_eq!(out.raw_today_l, MetricValue::held(before.raw_today_l.get().unwrap()));
    assert_eq!(
        out.raw_fraction_percent,
        MetricValue::held(before.raw_fraction_percent.get().unwrap())
    );
    assert_eq!(
        out.treated_hardness_dh,
        MetricValue::held(before.treated_hardness_dh.get().unwrap())
    );
    assert!(out.held);
    assert!(out.has_flag(FLAG_HOLD_APPLIED));
}

#[test]
fn test_never_computed_is_unavailable() {
    let mut engine = SoftenerEngine::new(calibrated_config());
    let cycle = PollCycle::at(at("2024-01-01T08:00:00+01:00")).with_house(100.0, Some("L"));
    let out = engine.process(&cycle);

    assert!(out.house_today_l.is_fresh());
    assert_eq!(out.softened_today_l.status, MetricStatus::Unavailable);
    assert_eq!(out.raw_fraction_percent.status, MetricStatus::Unavailable);
    assert_eq!(out.salt_level_percent.status, MetricStatus::Unavailable);
    assert!(!out.held);
}

#[test]
fn test_pass_through_metrics_hold() {
    let (mut engine, _) = reference_day_engine();
    let out = engine.process(&PollCycle::at(at("2024-01-01T21:00:00+01:00")).rate_limited());
    assert_eq!(out.salt_level_percent, MetricValue::held(80.0));
    assert_eq!(out.regeneration_active, MetricValue::held(false));
    assert_eq!(engine.salt_level_percent(), Some(80.0));
}

// ============================================================================
// Section 5: Mixing Tests
// ============================================================================

#[test]
fn test_mixing_reference() {
    let (engine, out) = reference_day_engine();
    assert_relative_eq!(out.house_today_l.get().unwrap(), 1000.0);
    assert_relative_eq!(out.softened_today_l.get().unwrap(), 850.0);
    assert_relative_eq!(out.raw_today_l.get().unwrap(), 50.0);
    assert_relative_eq!(out.raw_fraction_percent.get().unwrap(), 5.0);
    assert_relative_eq!(out.treated_hardness_dh.get().unwrap(), 1.11, epsilon = 1e-9);
    assert_relative_eq!(engine.treated_hardness_dh().unwrap(), 1.11, epsilon = 1e-9);
}

#[test]
fn test_cubic_meter_house_meter() {
    let mut engine = SoftenerEngine::new(calibrated_config());
    let cycle = |ts: &str, m3: f64, l: f64| {
        PollCycle::at(at(ts))
            .with_house(m3, Some("m³"))
            .with_summary(CloudSummary::new().with_treated_total(l))
    };
    engine.process(&cycle("2024-01-01T00:05:00+01:00", 10.0, 5_000.0));
    let out = engine.process(&cycle("2024-01-01T20:00:00+01:00", 11.0, 5_850.0));
    assert_relative_eq!(out.raw_fraction_percent.get().unwrap(), 5.0);
}

#[test]
fn test_factor_house_meter() {
    let config = EngineConfig {
        house_meter: HouseMeterConfig::with_factor(10.0),
        ..calibrated_config()
    };
    let mut engine = SoftenerEngine::new(config);
    let cycle = |ts: &str, ticks: f64, l: f64| {
        PollCycle::at(at(ts))
            .with_house(ticks, None)
            .with_summary(CloudSummary::new().with_treated_total(l))
    };
    engine.process(&cycle("2024-01-01T00:05:00+01:00", 1_000.0, 5_000.0));
    let out = engine.process(&cycle("2024-01-01T20:00:00+01:00", 1_100.0, 5_850.0));
    assert_relative_eq!(out.house_today_l.get().unwrap(), 1000.0);
}

#[test]
fn test_uncalibrated_hardness_unavailable() {
    let mut engine = SoftenerEngine::new(EngineConfig::default());
    engine.process(&full_cycle(at("2024-01-01T00:05:00+01:00"), 10_000.0, 5_000.0));
    let out = engine.process(&full_cycle(at("2024-01-01T20:00:00+01:00"), 11_000.0, 5_850.0));

    assert!(out.house_today_l.is_fresh());
    for metric in [
        out.raw_today_l,
        out.raw_fraction_percent,
        out.treated_hardness_dh,
        out.smoothed_hardness_dh,
        out.sodium_mg_l,
    ] {
        assert_eq!(metric.status, MetricStatus::Unavailable);
    }
    assert!(out.has_flag(FLAG_HARDNESS_UNCALIBRATED));
}

// ============================================================================
// Section 6: Smoothing and Sodium Tests
// ============================================================================

#[test]
fn test_smoother_first_value_no_lag() {
    let mut engine = SoftenerEngine::new(calibrated_config());
    let out = engine.process(&full_cycle(at("2024-01-01T08:00:00+01:00"), 1_000.0, 500.0));
    assert_eq!(out.smoothed_hardness_dh, out.treated_hardness_dh);
}

#[test]
fn test_smoother_converges_over_cycles() {
    // Constant 15 % raw share every 5 minutes.
    let mut engine = SoftenerEngine::new(calibrated_config());
    let start = at("2024-01-01T00:00:00+01:00");
    engine.process(&full_cycle(start, 0.0, 0.0));

    let mut prev = 0.0;
    for i in 1..=200 {
        let house = 1_000.0 * i as f64;
        let softened = 850.0 * i as f64 - 100.0;
        let out = engine.process(&full_cycle(start + Duration::minutes(5 * i), house, softened));
        let y = out.smoothed_hardness_dh.get().unwrap();
        assert!(y + 1e-12 >= prev);
        prev = y;
    }
    let target = engine.treated_hardness_dh().unwrap();
    assert_relative_eq!(prev, target, epsilon = 1e-3);
}

#[test]
fn test_sodium_reference() {
    let (_, out) = reference_day_engine();
    // The second sample is ~20 h after the first, so the smoother sits on 1.11.
    assert_relative_eq!(out.smoothed_hardness_dh.get().unwrap(), 1.11, epsilon = 1e-6);
    assert_relative_eq!(out.sodium_mg_l.get().unwrap(), 237.92, epsilon = 1e-4);
    assert!(out.sodium_alert);
}

#[test]
fn test_sodium_below_limit_with_residual_hardness() {
    let config = EngineConfig {
        hardness: HardnessConfig::default().with_softened(12.0),
        ..Default::default()
    };
    let mut engine = SoftenerEngine::new(config);
    let out = engine.process(&full_cycle(at("2024-01-01T08:00:00+01:00"), 1_000.0, 500.0));
    // 69.2 + (22.2 - 12.0) * 8 = 150.8
    assert_relative_eq!(out.sodium_mg_l.get().unwrap(), 150.8, epsilon = 1e-9);
    assert!(!out.sodium_alert);
    assert!(!engine.sodium_alert());
}

#[test]
fn test_reset_smoother_restarts_without_lag() {
    let (mut engine, _) = reference_day_engine();
    engine.reset_smoother();
    let out = engine.process(&full_cycle(at("2024-01-01T20:05:00+01:00"), 11_100.0, 5_950.0));
    assert_eq!(out.smoothed_hardness_dh.get(), out.treated_hardness_dh.get());
}

// ============================================================================
// Section 7: Capacity Guard Tests
// ============================================================================

#[test]
fn test_degraded_cycle_reuses_capacity() {
    let (mut engine, before) = reference_day_engine();
    let out = engine.process(&PollCycle::at(at("2024-01-01T20:05:00+01:00")).rate_limited());

    assert!(out.degraded);
    assert!(out.has_flag(FLAG_DEGRADED));
    assert_eq!(out.operating_capacity.get(), before.operating_capacity.get());
    assert_eq!(out.hardness_grains.get(), before.hardness_grains.get());
    assert!(out.operating_capacity.is_held());
}

#[test]
fn test_degraded_diagnostics_throttled_per_device() {
    let mut engine = SoftenerEngine::new(calibrated_config());
    engine.process(&full_cycle(at("2024-01-01T06:00:00+01:00"), 100.0, 50.0));

    // Two hours of rate limiting, every five minutes.
    let start = at("2024-01-01T06:05:00+01:00");
    let mut log_times = Vec::new();
    let mut last_log = engine.state().guard.last_degraded_log;
    for i in 0..24 {
        let ts = start + Duration::minutes(5 * i);
        engine.process(&PollCycle::at(ts).rate_limited());
        let current = engine.state().guard.last_degraded_log;
        if current != last_log {
            log_times.push(ts);
            last_log = current;
        }
    }

    assert_eq!(log_times.len(), 2);
    assert!(log_times[1] - log_times[0] >= Duration::hours(1));
}

/// Cycles over which the persisted last-log time changed.
fn degraded_log_count(engine: &mut SoftenerEngine, cycles: i64) -> usize {
    let start = at("2024-01-01T06:05:00+01:00");
    let mut count = 0;
    let mut last_log = engine.state().guard.last_degraded_log;
    for i in 0..cycles {
        engine.process(&PollCycle::at(start + Duration::minutes(5 * i)).rate_limited());
        let current = engine.state().guard.last_degraded_log;
        if current != last_log {
            count += 1;
            last_log = current;
        }
    }
    count
}

#[test]
fn test_degraded_diagnostics_custom_interval() {
    let mut config = calibrated_config();
    config.diagnostics.degraded_log_interval_secs = 7200;
    let mut engine = SoftenerEngine::try_new(config).unwrap();
    engine.process(&full_cycle(at("2024-01-01T06:00:00+01:00"), 100.0, 50.0));

    // Three hours of rate limiting: logged at 06:05 and 08:05.
    assert_eq!(degraded_log_count(&mut engine, 36), 2);
}

#[test]
fn test_unvalidated_short_interval_still_hourly() {
    let mut config = calibrated_config();
    config.diagnostics.degraded_log_interval_secs = 0;
    let mut engine = SoftenerEngine::new(config);
    engine.process(&full_cycle(at("2024-01-01T06:00:00+01:00"), 100.0, 50.0));

    assert_eq!(degraded_log_count(&mut engine, 12), 1);
}

#[test]
fn test_degraded_clears_on_complete_detail() {
    let (mut engine, _) = reference_day_engine();
    engine.process(&PollCycle::at(at("2024-01-01T20:05:00+01:00")).rate_limited());
    assert!(engine.is_degraded());

    let out = engine.process(&full_cycle(at("2024-01-01T20:10:00+01:00"), 11_010.0, 5_860.0));
    assert!(!out.degraded);
    assert!(!engine.is_degraded());
}

#[test]
fn test_regeneration_cycle() {
    let mut engine = SoftenerEngine::new(calibrated_config());
    let summary = |regen: bool| CloudSummary::new().with_treated_total(500.0).with_regenerating(regen);
    let t0 = at("2024-01-01T02:00:00+01:00");

    engine.process(
        &PollCycle::at(t0)
            .with_summary(summary(false))
            .with_detail(CloudDetail::new(120.0, 22.0).observed_at(t0)),
    );

    let t1 = t0 + Duration::minutes(5);
    let out = engine.process(
        &PollCycle::at(t1)
            .with_summary(summary(true))
            .with_detail(CloudDetail::new(0.0, 22.0).observed_at(t1)),
    );
    assert_eq!(out.regen_phase, RegenPhase::PossibleRegen);
    assert!(out.has_flag(FLAG_POSSIBLE_REGEN));
    assert_eq!(out.regeneration_active, MetricValue::fresh(true));

    // Rate limited mid-regeneration: phase kept, values held.
    let t2 = t1 + Duration::minutes(5);
    let out = engine.process(&PollCycle::at(t2).rate_limited());
    assert_eq!(out.regen_phase, RegenPhase::PossibleRegen);
    assert_eq!(out.operating_capacity, MetricValue::held(0.0));

    // Stale echo of the pre-regeneration snapshot.
    let t3 = t2 + Duration::minutes(5);
    let out = engine.process(
        &PollCycle::at(t3)
            .with_summary(summary(false))
            .with_detail(CloudDetail::new(120.0, 22.0).observed_at(t3)),
    );
    assert!(!out.has_flag(FLAG_CAPACITY_RESET));
    assert!(out.has_flag(FLAG_STALE_SNAPSHOT));

    // Fresh post-regeneration snapshot.
    let t4 = t3 + Duration::minutes(30);
    let out = engine.process(
        &PollCycle::at(t4)
            .with_summary(summary(false))
            .with_detail(CloudDetail::new(1_600.0, 22.0).observed_at(t4)),
    );
    assert!(out.has_flag(FLAG_CAPACITY_RESET));
    assert_eq!(out.regen_phase, RegenPhase::Normal);
    assert_eq!(out.capacity_baseline, Some(1_600.0));
    assert_eq!(engine.capacity_baseline(), Some(1_600.0));
}

#[test]
fn test_regeneration_cycle_without_observation_times() {
    let mut engine = SoftenerEngine::new(calibrated_config());
    let cycle = |ts: DateTime<FixedOffset>, capacity: f64, regen: bool| {
        PollCycle::at(ts)
            .with_summary(CloudSummary::new().with_treated_total(500.0).with_regenerating(regen))
            .with_detail(CloudDetail::new(capacity, 22.0))
    };
    let t0 = at("2024-01-01T02:00:00+01:00");

    engine.process(&cycle(t0, 300.0, false));
    let out = engine.process(&cycle(t0 + Duration::minutes(5), 0.0, true));
    assert_eq!(out.regen_phase, RegenPhase::PossibleRegen);

    // Same trigger reading while the device still regenerates.
    let out = engine.process(&cycle(t0 + Duration::minutes(10), 0.0, true));
    assert!(!out.has_flag(FLAG_CAPACITY_RESET));
    assert!(out.has_flag(FLAG_STALE_SNAPSHOT));
    assert_eq!(out.regen_phase, RegenPhase::PossibleRegen);
    assert_eq!(engine.capacity_baseline(), Some(300.0));

    let out = engine.process(&cycle(t0 + Duration::minutes(40), 1_600.0, false));
    assert!(out.has_flag(FLAG_CAPACITY_RESET));
    assert_eq!(out.regen_phase, RegenPhase::Normal);
    assert_eq!(engine.capacity_baseline(), Some(1_600.0));
}

#[test]
fn test_partial_detail_does_not_trigger_regen() {
    let mut engine = SoftenerEngine::new(calibrated_config());
    let t0 = at("2024-01-01T02:00:00+01:00");
    engine.process(&PollCycle::at(t0).with_detail(CloudDetail::new(120.0, 22.0)));

    let partial = CloudDetail {
        operating_capacity: Some(0.0),
        ..Default::default()
    };
    let out = engine.process(
        &PollCycle::at(t0 + Duration::minutes(5))
            .with_summary(CloudSummary::new().with_regenerating(true))
            .with_detail(partial),
    );
    assert_eq!(out.regen_phase, RegenPhase::Normal);
    assert!(out.degraded);
    assert_eq!(out.operating_capacity, MetricValue::held(120.0));
}

// ============================================================================
// Section 8: Idempotence and Persistence Tests
// ============================================================================

#[test]
fn test_replaying_same_cycle_is_idempotent() {
    let (mut engine, _) = reference_day_engine();
    let cycle = full_cycle(at("2024-01-01T21:00:00+01:00"), 11_200.0, 5_990.0);

    let first = engine.process(&cycle);
    let second = engine.process(&cycle);
    for ((name, a), (_, b)) in first.numeric_metrics().iter().zip(second.numeric_metrics().iter()) {
        assert_eq!(a.get(), b.get(), "{} changed on replay", name);
    }
    assert_eq!(first.sodium_alert, second.sodium_alert);
}

#[test]
fn test_restart_resumes_from_saved_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("softener.json");

    let (engine, _) = reference_day_engine();
    engine.export_state().save(&path).unwrap();

    let restored = DeviceState::load(&path).unwrap();
    let mut resumed = SoftenerEngine::with_state(calibrated_config(), restored);
    assert_eq!(resumed.cycle_count(), 2);
    assert_relative_eq!(resumed.raw_fraction_percent().unwrap(), 5.0);

    let out = resumed.process(&full_cycle(at("2024-01-01T21:00:00+01:00"), 11_100.0, 5_950.0));
    assert_relative_eq!(out.house_today_l.get().unwrap(), 1_100.0);
}

#[test]
fn test_cold_start_when_no_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let state = DeviceState::load(dir.path().join("missing.json")).unwrap();
    let mut engine = SoftenerEngine::with_state(calibrated_config(), state);
    let out = engine.process(&full_cycle(at("2024-01-01T08:00:00+01:00"), 100.0, 50.0));
    assert_eq!(out.house_today_l, MetricValue::fresh(0.0));
}

#[test]
fn test_future_dated_state_is_recaptured() {
    let (engine, _) = reference_day_engine();
    let mut state = engine.export_state();
    state.house = DayTracker::from_baseline(DailyBaseline::capture(
        9_999.0,
        chrono::NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
    ));

    let mut engine = SoftenerEngine::with_state(calibrated_config(), state);
    let out = engine.process(&full_cycle(at("2024-01-01T21:00:00+01:00"), 11_100.0, 5_950.0));
    assert_eq!(out.house_today_l, MetricValue::fresh(0.0));
    assert_eq!(
        engine.state().house.baseline().unwrap().baseline_date.to_string(),
        "2024-01-01"
    );
}

#[test]
fn test_snapshot_json_roundtrip() {
    let (_, out) = reference_day_engine();
    let parsed = MetricsSnapshot::from_json(&out.to_json().unwrap()).unwrap();
    assert_eq!(parsed, out);
}

// ============================================================================
// Section 9: Input Adapter Tests
// ============================================================================

#[test]
fn test_generic_json_cycle() {
    let mut engine = SoftenerEngine::new(calibrated_config());
    let first = GenericCycle::from_json(
        r#"{
            "timestamp": "2024-01-01T00:05:00+01:00",
            "house": { "value": 10.0, "unit": "m³" },
            "summary": { "status": "ok", "treated_total_l": 5000.0 },
            "detail": { "status": "ok", "operating_capacity": 1500.0, "hardness_grains": 22.0 }
        }"#,
    )
    .unwrap();
    let second = GenericCycle::from_json(
        r#"{
            "timestamp": "2024-01-01T20:00:00+01:00",
            "house": { "value": 11.0, "unit": "m³" },
            "summary": { "status": "rate_limited" },
            "detail": { "status": "skipped" }
        }"#,
    )
    .unwrap();

    engine.process(&first.build());
    let out = engine.process(&second.to_poll_cycle());
    assert_eq!(out.source, "generic-json");
    assert_eq!(out.house_today_l, MetricValue::fresh(1000.0));
    assert!(out.degraded);
}

#[test]
fn test_kv_payload_cycle() {
    let payload = KvPayload::from_json(
        at("2024-01-01T08:00:00+01:00"),
        r#"{
            "treated_water": "5000",
            "water_today": "120",
            "salt_monitor_level": "38",
            "current_flow_rate": "1.5",
            "regen_time_rem": "0",
            "operating_capacity": "1450",
            "hardness_grains": "13"
        }"#,
    )
    .unwrap()
    .with_house(10.0, Some("m³"));

    let mut engine = SoftenerEngine::new(calibrated_config());
    let out = engine.process(&payload.to_poll_cycle());
    assert_eq!(out.source, "cloud-kv");
    assert!(out.salt_level_percent.is_fresh());
    assert_relative_eq!(out.salt_level_percent.get().unwrap(), 76.0, epsilon = 1e-9);
    assert_eq!(out.treated_today_device_l, MetricValue::fresh(120.0));
    assert_eq!(out.regeneration_active, MetricValue::fresh(false));
    assert_eq!(out.operating_capacity, MetricValue::fresh(1450.0));
}

#[test]
fn test_kv_document_device_stats_survive_restart() {
    let payload = KvPayload::from_document_json(
        at("2024-01-01T08:00:00+01:00"),
        r#"{
            "kv": {
                "treated_water": "5000",
                "capacity_remaining_percent": "81.26%",
                "out_of_salt_days": "41 Days"
            },
            "tables": {
                "daily_water_usage_patterns": {
                    "column_titles": ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"],
                    "rows": [{
                        "label": "Average Usage (Liters)",
                        "values": ["310", "250", "240", "260", "250", "270", "320"]
                    }]
                }
            }
        }"#,
    )
    .unwrap()
    .with_house(10.0, Some("m³"));

    let mut engine = SoftenerEngine::new(calibrated_config());
    let out = engine.process(&payload.to_poll_cycle());
    assert_eq!(out.stat(DeviceStat::CapacityRemainingPercent), MetricValue::fresh(81.3));
    assert_eq!(out.stat(DeviceStat::OutOfSaltDays), MetricValue::fresh(41.0));
    assert_eq!(out.stat(DeviceStat::UsageAverageL), MetricValue::fresh(271.4));

    let state = DeviceState::from_json(&engine.export_state().to_json().unwrap()).unwrap();
    let mut resumed = SoftenerEngine::with_state(calibrated_config(), state);
    let out = resumed.process(&PollCycle::at(at("2024-01-01T08:05:00+01:00")).rate_limited());
    assert_eq!(out.stat(DeviceStat::CapacityRemainingPercent), MetricValue::held(81.3));
    assert_eq!(out.stat(DeviceStat::UsageAverageL), MetricValue::held(271.4));
    assert!(!out.stat(DeviceStat::SaltTotalKg).is_available());
    assert!(out.has_flag(FLAG_HOLD_APPLIED));
    assert_eq!(resumed.usage_average_l(), Some(271.4));
}

// ============================================================================
// Section 10: Fleet Tests
// ============================================================================

#[test]
fn test_fleet_keeps_devices_apart() {
    let mut fleet = Fleet::new();
    fleet.register("north", calibrated_config()).unwrap();
    fleet.register("south", EngineConfig::default()).unwrap();

    fleet.process("north", &full_cycle(at("2024-01-01T00:05:00+01:00"), 10_000.0, 5_000.0));
    fleet.process("north", &full_cycle(at("2024-01-01T20:00:00+01:00"), 11_000.0, 5_850.0));
    fleet.process("south", &PollCycle::at(at("2024-01-01T20:00:00+01:00")).rate_limited());

    let stats = fleet.stats();
    assert_eq!(stats.device_count, 2);
    assert_eq!(stats.total_cycles, 3);
    assert_eq!(stats.degraded_devices, 1);
    assert_eq!(stats.sodium_alerts, 1);
}

// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # Softener Metrics
//!
//! Derived daily water metrics for a household water meter paired with a
//! cloud-connected water softener.
//!
//! Both sources are polled by the host; this crate turns their noisy,
//! sometimes missing, sometimes rate-limited samples into stable day-scoped
//! quantities:
//!
//! - **Daily usage**: house and softened water since local midnight
//! - **Mixing**: raw-water fraction and blended hardness of the day
//! - **Smoothing**: time-constant filter on the blended hardness
//! - **Sodium**: effective sodium load and a drinking water alert
//! - **Capacity guard**: regeneration tracking that ignores stale or
//!   partial cloud snapshots
//! - **Device statistics**: capacity, usage pattern and salt figures the
//!   cloud reports, relayed under the same hold policy
//!
//! ## Quick Start
//!
//! ```rust
//! use softener_metrics::{CloudDetail, CloudSummary, EngineConfig, HardnessConfig, PollCycle, SoftenerEngine};
//! use chrono::DateTime;
//!
//! let config = EngineConfig {
//!     hardness: HardnessConfig::default().with_softened(0.0),
//!     ..Default::default()
//! };
//! let mut engine = SoftenerEngine::new(config);
//!
//! let morning = DateTime::parse_from_rfc3339("2024-01-01T00:05:00+01:00").unwrap();
//! engine.process(
//!     &PollCycle::at(morning)
//!         .with_house(10.0, Some("m³"))
//!         .with_summary(CloudSummary::new().with_treated_total(5_000.0))
//!         .with_detail(CloudDetail::new(1500.0, 22.0)),
//! );
//!
//! let evening = DateTime::parse_from_rfc3339("2024-01-01T20:00:00+01:00").unwrap();
//! let snapshot = engine.process(
//!     &PollCycle::at(evening)
//!         .with_house(11.0, Some("m³"))
//!         .with_summary(CloudSummary::new().with_treated_total(5_850.0))
//!         .with_detail(CloudDetail::new(1400.0, 22.0)),
//! );
//!
//! assert_eq!(snapshot.house_today_l.get(), Some(1000.0));
//! assert_eq!(snapshot.raw_today_l.get(), Some(50.0));
//! assert_eq!(snapshot.raw_fraction_percent.get(), Some(5.0));
//! assert!(snapshot.sodium_alert);
//! ```
//!
//! ## Modules
//!
//! - [`units`]: house meter unit normalization
//! - [`baseline`]: day boundary tracking per counter
//! - [`delta`]: daily usage per counter
//! - [`hold`]: missing-data hold policy
//! - [`mixing`]: raw fraction and blended hardness
//! - [`smoother`]: exponential smoothing
//! - [`sodium`]: sodium load and alert
//! - [`guard`]: regeneration and capacity guard
//! - [`engine`]: per-device pipeline
//! - [`fleet`]: several devices side by side

// Modules
pub mod baseline;
pub mod config;
pub mod delta;
pub mod engine;
pub mod error;
pub mod fleet;
pub mod guard;
pub mod hold;
pub mod input;
pub mod mixing;
pub mod smoother;
pub mod snapshot;
pub mod sodium;
pub mod state;
pub mod units;

// Re-exports for convenient access
pub use baseline::{BaselineState, BaselineTransition, DailyBaseline, DayTracker};
pub use config::{DiagnosticsConfig, EngineConfig, HardnessConfig, HouseMeterConfig, UnitMode};
pub use engine::SoftenerEngine;
pub use error::{ConfigError, InputError, Result, SoftenerError, StateError};
pub use fleet::{DeviceId, Fleet, FleetStats};
pub use guard::{CapacitySnapshot, DegradedReason, GuardState, RegenPhase};
pub use hold::{MetricStatus, MetricValue};
pub use input::{
    CloudDetail, CloudSummary, CounterSample, DetailReading, DeviceStat, GenericCycle,
    InputAdapter, KvPayload, MeterReading, PollCycle, SummaryReading,
};
pub use mixing::MixingResult;
pub use smoother::{ExpSmoother, SmoothedSample};
pub use snapshot::MetricsSnapshot;
pub use sodium::{SodiumReading, SODIUM_LIMIT_MG_L, SODIUM_MG_L_PER_DH};
pub use state::DeviceState;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

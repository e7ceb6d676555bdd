// Softener Metrics - Derived water metrics engine
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Fleet management for several softener installations
//!
//! Each device gets its own engine behind its own lock. Cycles of one device
//! are serialized by that lock; distinct devices share nothing and can be
//! processed from different threads at the same time.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::EngineConfig;
use crate::engine::SoftenerEngine;
use crate::error::Result;
use crate::input::PollCycle;
use crate::snapshot::MetricsSnapshot;
use crate::state::DeviceState;

/// Unique identifier for a device
pub type DeviceId = String;

/// Fleet-wide statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetStats {
    /// Number of registered devices
    pub device_count: usize,
    /// Cycles processed across all devices
    pub total_cycles: u64,
    /// Devices whose detail source is currently degraded
    pub degraded_devices: usize,
    /// Devices above the sodium limit
    pub sodium_alerts: usize,
}

/// Registry of independent per-device engines
#[derive(Debug, Default)]
pub struct Fleet {
    devices: HashMap<DeviceId, Arc<Mutex<SoftenerEngine>>>,
}

impl Fleet {
    /// Create an empty fleet
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device with a cold-start state. Replaces an existing
    /// registration with the same id.
    pub fn register(&mut self, id: impl Into<DeviceId>, config: EngineConfig) -> Result<()> {
        self.register_with_state(id, config, DeviceState::new())
    }

    /// Register a device resuming from persisted state
    pub fn register_with_state(
        &mut self,
        id: impl Into<DeviceId>,
        config: EngineConfig,
        state: DeviceState,
    ) -> Result<()> {
        config.validate()?;
        let id = id.into();
        let mut engine = SoftenerEngine::new(config).with_device_id(id.clone());
        engine.import_state(state)?;
        self.devices.insert(id, Arc::new(Mutex::new(engine)));
        Ok(())
    }

    /// Remove a device, returning its final state
    pub fn remove(&mut self, id: &str) -> Option<DeviceState> {
        let engine = self.devices.remove(id)?;
        let state = lock(&engine).export_state();
        Some(state)
    }

    /// Handle to one device's engine, for processing outside the registry
    pub fn device(&self, id: &str) -> Option<Arc<Mutex<SoftenerEngine>>> {
        self.devices.get(id).cloned()
    }

    /// Process a cycle for a registered device
    pub fn process(&self, id: &str, cycle: &PollCycle) -> Option<MetricsSnapshot> {
        self.devices.get(id).map(|engine| lock(engine).process(cycle))
    }

    /// Persistable state of a device
    pub fn export_state(&self, id: &str) -> Option<DeviceState> {
        self.devices.get(id).map(|engine| lock(engine).export_state())
    }

    /// Number of registered devices
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Registered device ids, sorted
    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.devices.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Fleet-wide statistics
    pub fn stats(&self) -> FleetStats {
        let mut stats = FleetStats {
            device_count: self.devices.len(),
            ..Default::default()
        };
        for engine in self.devices.values() {
            let engine = lock(engine);
            stats.total_cycles += engine.cycle_count();
            if engine.is_degraded() {
                stats.degraded_devices += 1;
            }
            if engine.sodium_alert() {
                stats.sodium_alerts += 1;
            }
        }
        stats
    }
}

/// A panic inside one cycle leaves the engine's committed state intact, so
/// a poisoned lock is still safe to use.
fn lock(engine: &Mutex<SoftenerEngine>) -> std::sync::MutexGuard<'_, SoftenerEngine> {
    engine.lock().unwrap_or_else(PoisonError::into_inner)
}

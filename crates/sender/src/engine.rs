//! Modelo sintético de motor para o simulador.
//!
//! Ciclo determinístico de [`CYCLE_TICKS`] leituras: a RPM sobe de marcha
//! lenta até passar de 6000 e volta. A cada [`LIMP_EVERY`] ciclos a TCU entra
//! em proteção no topo da rampa e, no último, em limp mode.

use chrono::{DateTime, Utc};
use ecu_core::TelemetrySnapshot;

/// Leituras por ciclo de aceleração.
pub const CYCLE_TICKS: u64 = 200;

/// A cada quantos ciclos a TCU simula uma falha.
pub const LIMP_EVERY: u64 = 5;

const IDLE_RPM: f64 = 900.0;
const PEAK_RPM: f64 = 6800.0;

#[derive(Debug, Default)]
pub struct EngineModel {
    tick: u64,
}

impl EngineModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Próxima leitura do ciclo.
    pub fn next_snapshot(&mut self, now: DateTime<Utc>) -> TelemetrySnapshot {
        let cycle = self.tick / CYCLE_TICKS;
        let phase = self.tick % CYCLE_TICKS;
        self.tick += 1;

        // Onda triangular 0 → 1 → 0
        let half = (CYCLE_TICKS / 2) as f64;
        let load = 1.0 - ((phase as f64 - half).abs() / half);

        let engine_rpm = IDLE_RPM + (PEAK_RPM - IDLE_RPM) * load;
        let fault_cycle = cycle % LIMP_EVERY == LIMP_EVERY - 1;
        let near_peak = load > 0.9;

        TelemetrySnapshot {
            map_pressure: 1.0 + 1.2 * load,
            wastegate_position: 100.0 - 80.0 * load,
            tps_position: 100.0 * load,
            engine_rpm,
            target_boost: 1.0 + 1.1 * load,
            torque_request: 50.0 + 350.0 * load,
            tcu_protection_active: near_peak,
            tcu_limp_mode: fault_cycle && near_peak,
            timestamp: now,
        }
    }
}

//! Tipos compartilhados do link com a ECU.
//!
//! Tudo aqui é imutável depois de construído: cada frame de telemetria gera
//! um [`TelemetrySnapshot`] novo e cada evento gera um [`LogEntry`] novo.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Telemetria
// ──────────────────────────────────────────────

/// Leitura completa enviada pela ponte ESP32.
///
/// Sempre total: campos ausentes no frame chegam aqui como `0` / `false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetrySnapshot {
    /// Pressão absoluta do coletor (sensor MAP)
    pub map_pressure: f64,
    /// Posição da wastegate (%)
    pub wastegate_position: f64,
    /// Posição do acelerador (%)
    pub tps_position: f64,
    /// Rotação do motor (RPM)
    pub engine_rpm: f64,
    /// Pressão de boost alvo
    pub target_boost: f64,
    /// Torque solicitado pela TCU
    pub torque_request: f64,
    /// Proteção da TCU ativa
    pub tcu_protection_active: bool,
    /// TCU em modo de emergência (limp mode)
    pub tcu_limp_mode: bool,
    /// Instante da leitura (payload ou relógio local)
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySnapshot {
    /// Snapshot zerado com o timestamp informado.
    pub fn zeroed(timestamp: DateTime<Utc>) -> Self {
        Self {
            map_pressure: 0.0,
            wastegate_position: 0.0,
            tps_position: 0.0,
            engine_rpm: 0.0,
            target_boost: 0.0,
            torque_request: 0.0,
            tcu_protection_active: false,
            tcu_limp_mode: false,
            timestamp,
        }
    }
}

// ──────────────────────────────────────────────
// Status da conexão
// ──────────────────────────────────────────────

/// Resumo observável da máquina de estados da conexão.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub message: String,
}

impl ConnectionStatus {
    pub fn connected(message: impl Into<String>) -> Self {
        Self {
            connected: true,
            message: message.into(),
        }
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            message: message.into(),
        }
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::disconnected("Disconnected")
    }
}

// ──────────────────────────────────────────────
// Log de eventos
// ──────────────────────────────────────────────

/// Severidade de uma entrada do log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Warning,
    Error,
}

impl LogKind {
    pub fn label(self) -> &'static str {
        match self {
            LogKind::Info => "INFO",
            LogKind::Success => "OK",
            LogKind::Warning => "WARN",
            LogKind::Error => "ERRO",
        }
    }
}

/// Uma linha do log de eventos, legível pelo operador.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub kind: LogKind,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, kind: LogKind) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            kind,
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

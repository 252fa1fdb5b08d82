//! Protocolo de texto da ponte ESP32.
//!
//! O ESP32 expõe um WebSocket em `ws://{host}:{port}/ws` e troca apenas
//! frames de texto:
//!
//! ```text
//! cliente → ESP32   "ping" | comando livre
//! ESP32 → cliente   "pong" | {"engineRpm": 3500, "mapPressure": 1.4, ...}
//! ```
//!
//! Um registro só é telemetria se trouxer `engineRpm` ou `mapPressure`.
//! Todo o resto cai em [`DecodeError`], nunca em pânico.

use crate::types::TelemetrySnapshot;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Frame de keepalive enviado pelo cliente.
pub const KEEPALIVE_PING: &str = "ping";

/// Resposta de keepalive do ESP32.
pub const KEEPALIVE_PONG: &str = "pong";

/// Caminho do endpoint WebSocket no ESP32.
pub const WS_PATH: &str = "/ws";

/// Chaves que identificam um registro de telemetria.
const TELEMETRY_KEYS: [&str; 2] = ["engineRpm", "mapPressure"];

/// Erros de decodificação de um frame recebido.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("JSON inválido: {0}")]
    Malformed(String),

    #[error("Frame não é um objeto JSON")]
    NotARecord,

    #[error("Registro sem campos de telemetria (engineRpm/mapPressure)")]
    UnrecognizedRecord,

    #[error("Frame binário inesperado ({0} bytes)")]
    BinaryFrame(usize),
}

/// Resultado de um frame decodificado com sucesso.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// `"pong"` literal – não altera estado.
    KeepaliveAck,
    /// Nova leitura completa.
    Telemetry(TelemetrySnapshot),
}

/// Monta a URL do endpoint WebSocket.
pub fn endpoint_url(host: &str, port: u16) -> String {
    format!("ws://{host}:{port}{WS_PATH}")
}

/// Decodifica um frame de texto recebido do ESP32.
///
/// Timestamps ausentes (ou inutilizáveis) usam o relógio local no momento
/// da decodificação.
pub fn decode_frame(text: &str) -> Result<InboundFrame, DecodeError> {
    if text == KEEPALIVE_PONG {
        return Ok(InboundFrame::KeepaliveAck);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    let record = value.as_object().ok_or(DecodeError::NotARecord)?;

    if !TELEMETRY_KEYS.iter().any(|k| record.contains_key(*k)) {
        return Err(DecodeError::UnrecognizedRecord);
    }

    Ok(InboundFrame::Telemetry(TelemetrySnapshot {
        map_pressure: number(record, "mapPressure"),
        wastegate_position: number(record, "wastegatePosition"),
        tps_position: number(record, "tpsPosition"),
        engine_rpm: number(record, "engineRpm"),
        target_boost: number(record, "targetBoost"),
        torque_request: number(record, "torqueRequest"),
        tcu_protection_active: flag(record, "tcuProtectionActive"),
        tcu_limp_mode: flag(record, "tcuLimpMode"),
        timestamp: timestamp(record).unwrap_or_else(Utc::now),
    }))
}

/// Serializa um snapshot no formato do ESP32 (camelCase, epoch em ms).
pub fn encode_snapshot(snapshot: &TelemetrySnapshot) -> String {
    serde_json::json!({
        "mapPressure": snapshot.map_pressure,
        "wastegatePosition": snapshot.wastegate_position,
        "tpsPosition": snapshot.tps_position,
        "engineRpm": snapshot.engine_rpm,
        "targetBoost": snapshot.target_boost,
        "torqueRequest": snapshot.torque_request,
        "tcuProtectionActive": snapshot.tcu_protection_active,
        "tcuLimpMode": snapshot.tcu_limp_mode,
        "timestamp": snapshot.timestamp.timestamp_millis(),
    })
    .to_string()
}

fn number(record: &Map<String, Value>, key: &str) -> f64 {
    record
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn flag(record: &Map<String, Value>, key: &str) -> bool {
    match record.get(key) {
        Some(Value::Bool(b)) => *b,
        // Firmwares antigos mandam 0/1
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        _ => false,
    }
}

fn timestamp(record: &Map<String, Value>) -> Option<DateTime<Utc>> {
    match record.get("timestamp")? {
        Value::Number(n) => {
            let millis = n.as_f64()?;
            if millis == 0.0 || !millis.is_finite() {
                return None;
            }
            DateTime::from_timestamp_millis(millis as i64)
        }
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

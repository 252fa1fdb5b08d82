//! # ECU Core
//!
//! Núcleo sem I/O do link com a ponte ESP32: modelo de dados, decodificação
//! dos frames de texto, alertas de segurança, log de eventos limitado e a
//! máquina de estados da conexão.
//!
//! ## Módulos
//! - [`types`] – Snapshot de telemetria, status da conexão, entradas do log
//! - [`protocol`] – Decode/encode dos frames de texto (`ping`/`pong`/JSON)
//! - [`alerts`] – Limp mode, proteção da TCU e RPM alta
//! - [`event_log`] – Log circular de 100 entradas, mais novo primeiro
//! - [`connection`] – [`ConnectionManager`] e as [`Action`]s que o driver executa
//! - [`config`] – Configuração unificada via TOML

pub mod alerts;
pub mod config;
pub mod connection;
pub mod event_log;
pub mod protocol;
pub mod types;

// Re-exports convenientes
pub use config::{AlertThresholds, AppConfig, ConnectionConfig, ConnectionConfigUpdate};
pub use connection::{Action, ConnectionManager, ConnectionState, SocketEvent, SocketId, TimerToken};
pub use event_log::{EventLog, LOG_CAPACITY};
pub use protocol::{decode_frame, encode_snapshot, DecodeError, InboundFrame};
pub use types::{ConnectionStatus, LogEntry, LogKind, TelemetrySnapshot};

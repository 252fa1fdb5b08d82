//! Máquina de estados da conexão com a ponte ESP32.
//!
//! O [`ConnectionManager`] não abre sockets nem arma timers: cada evento de
//! transporte, disparo de timer ou chamada do consumidor entra como uma
//! chamada síncrona, e os efeitos colaterais saem como [`Action`]s que o
//! driver executa. Sockets levam um [`SocketId`] e timers um [`TimerToken`];
//! eventos com id/token antigo são descartados.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──open──▶ Open ──close──▶ Reconnecting ──timer──▶ Connecting
//!   ▲                    │                 │                  (tentativas < max)
//!   │                    └──────close──────┤
//!   └──── Closing ◀──disconnect────────────┘──close (tentativas ≥ max)──▶ Failed
//! ```

use crate::alerts::evaluate_alerts;
use crate::config::{AlertThresholds, ConnectionConfig, ConnectionConfigUpdate};
use crate::event_log::EventLog;
use crate::protocol::{self, InboundFrame, KEEPALIVE_PING};
use crate::types::{ConnectionStatus, LogEntry, LogKind, TelemetrySnapshot};
use std::time::Duration;
use tracing::{debug, info};

/// Período fixo do keepalive enquanto conectado.
pub const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);

/// Código de fechamento normal (RFC 6455).
pub const NORMAL_CLOSURE: u16 = 1000;

/// Motivo enviado no fechamento manual.
pub const MANUAL_DISCONNECT_REASON: &str = "Manual disconnect";

/// Motivo usado quando o servidor fecha sem explicar.
const DEFAULT_CLOSE_REASON: &str = "Connection lost";

/// Identifica um socket aberto pelo driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

/// Identifica um timer agendado pelo driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// Estado interno da conexão.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Reconnecting,
    Failed,
}

/// Evento vindo de um socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Opened,
    Text(String),
    /// Frame binário (só o tamanho interessa)
    Binary(usize),
    Error(String),
    Closed { reason: String },
}

/// Efeito colateral que o driver deve executar.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    OpenSocket { socket: SocketId, url: String },
    SendText { socket: SocketId, text: String },
    CloseSocket { socket: SocketId, code: u16, reason: String },
    ScheduleReconnect { token: TimerToken, delay: Duration },
    CancelReconnect { token: TimerToken },
    StartKeepalive { token: TimerToken, period: Duration },
    StopKeepalive { token: TimerToken },
}

/// Dono único do estado da conexão, do último snapshot e do log.
#[derive(Debug)]
pub struct ConnectionManager {
    config: ConnectionConfig,
    thresholds: AlertThresholds,
    state: ConnectionState,
    status: ConnectionStatus,
    telemetry: Option<TelemetrySnapshot>,
    log: EventLog,

    should_stay_connected: bool,
    reconnect_attempts: u32,
    socket: Option<SocketId>,
    closing_socket: Option<SocketId>,
    pending_reconnect: Option<TimerToken>,
    keepalive: Option<TimerToken>,
    next_id: u64,
}

impl ConnectionManager {
    pub fn new(config: ConnectionConfig, thresholds: AlertThresholds) -> Self {
        Self {
            config,
            thresholds,
            state: ConnectionState::Idle,
            status: ConnectionStatus::default(),
            telemetry: None,
            log: EventLog::new(),
            should_stay_connected: false,
            reconnect_attempts: 0,
            socket: None,
            closing_socket: None,
            pending_reconnect: None,
            keepalive: None,
            next_id: 0,
        }
    }

    // ── Projeção somente leitura ──

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn status(&self) -> &ConnectionStatus {
        &self.status
    }

    pub fn telemetry(&self) -> Option<&TelemetrySnapshot> {
        self.telemetry.as_ref()
    }

    pub fn log(&self) -> &EventLog {
        &self.log
    }

    pub fn log_entries(&self) -> Vec<LogEntry> {
        self.log.entries()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn endpoint(&self) -> String {
        protocol::endpoint_url(&self.config.host, self.config.port)
    }

    // ── Operações do consumidor ──

    /// Conecta explicitamente, zerando o contador de tentativas.
    pub fn connect(&mut self) -> Vec<Action> {
        let mut out = Vec::new();

        match self.state {
            ConnectionState::Open => {
                self.log.append("Already connected to ECU bridge", LogKind::Info);
            }
            ConnectionState::Connecting => {
                self.log
                    .append("Connection attempt already in progress", LogKind::Info);
            }
            _ => {
                self.should_stay_connected = true;
                self.reconnect_attempts = 0;
                self.cancel_reconnect(&mut out);
                self.open_socket(&mut out);
            }
        }

        out
    }

    /// Desconecta manualmente; seguro de chamar em qualquer estado.
    pub fn disconnect(&mut self) -> Vec<Action> {
        let mut out = Vec::new();

        self.should_stay_connected = false;
        self.cancel_reconnect(&mut out);

        match self.socket.take() {
            Some(socket) => {
                out.push(Action::CloseSocket {
                    socket,
                    code: NORMAL_CLOSURE,
                    reason: MANUAL_DISCONNECT_REASON.into(),
                });
                self.closing_socket = Some(socket);
                self.state = ConnectionState::Closing;
            }
            None => self.state = ConnectionState::Idle,
        }

        self.set_status(ConnectionStatus::disconnected("Disconnected"), &mut out);
        self.log
            .append("Manually disconnected from ECU bridge", LogKind::Info);
        info!("Desconexão manual de {}", self.endpoint());

        out
    }

    /// Caminho de encerramento: mesma semântica de [`Self::disconnect`].
    pub fn shutdown(&mut self) -> Vec<Action> {
        debug!("Encerrando ConnectionManager (estado {:?})", self.state);
        self.disconnect()
    }

    /// Envia um comando de texto; rejeitado (nunca enfileirado) se não estiver aberto.
    pub fn send_command(&mut self, text: &str) -> Vec<Action> {
        let mut out = Vec::new();

        match (self.state, self.socket) {
            (ConnectionState::Open, Some(socket)) => {
                out.push(Action::SendText {
                    socket,
                    text: text.to_string(),
                });
                self.log.append(format!("Sent command: {text}"), LogKind::Info);
            }
            _ => {
                self.log
                    .append("Cannot send command: not connected", LogKind::Warning);
            }
        }

        out
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
    }

    /// Merge raso da configuração; vale só para as próximas conexões.
    pub fn update_config(&mut self, update: &ConnectionConfigUpdate) {
        let merged = update.merged_into(&self.config);
        let errors = merged.validate();

        if errors.is_empty() {
            self.config = merged;
            self.log
                .append("ECU bridge connection config updated", LogKind::Info);
        } else {
            self.log.append(
                format!("Config update rejected: {}", errors.join("; ")),
                LogKind::Warning,
            );
        }
    }

    // ── Entradas do driver ──

    /// Processa um evento de socket. Eventos de sockets antigos são ignorados.
    pub fn handle_socket_event(&mut self, socket: SocketId, event: SocketEvent) -> Vec<Action> {
        let mut out = Vec::new();

        if self.closing_socket == Some(socket) {
            if let SocketEvent::Closed { .. } = event {
                self.closing_socket = None;
                if self.state == ConnectionState::Closing {
                    self.state = ConnectionState::Idle;
                    self.log.append("Disconnected from ECU bridge", LogKind::Info);
                }
            }
            return out;
        }

        if self.socket != Some(socket) {
            debug!("Evento de socket antigo {socket:?} ignorado: {event:?}");
            return out;
        }

        match event {
            SocketEvent::Opened => self.on_open(socket, &mut out),
            SocketEvent::Text(text) => self.on_text(&text),
            SocketEvent::Binary(len) => {
                let e = protocol::DecodeError::BinaryFrame(len);
                self.log.append(
                    format!("Error parsing data from ECU bridge: {e}"),
                    LogKind::Error,
                );
            }
            SocketEvent::Error(detail) => {
                let message = if detail.is_empty() {
                    "WebSocket connection error".to_string()
                } else {
                    format!("WebSocket connection error: {detail}")
                };
                self.log.append(message, LogKind::Error);
                self.set_status(ConnectionStatus::disconnected("Connection error"), &mut out);
            }
            SocketEvent::Closed { reason } => self.on_closed(&reason, &mut out),
        }

        out
    }

    /// Disparo do timer de reconexão.
    pub fn on_reconnect_timer(&mut self, token: TimerToken) -> Vec<Action> {
        let mut out = Vec::new();

        if self.pending_reconnect != Some(token) {
            debug!("Timer de reconexão antigo {token:?} ignorado");
            return out;
        }

        self.pending_reconnect = None;
        self.reconnect_attempts += 1;
        info!(
            "Tentativa de reconexão {}/{}",
            self.reconnect_attempts, self.config.max_reconnect_attempts
        );
        self.open_socket(&mut out);

        out
    }

    /// Tick do keepalive periódico.
    pub fn on_keepalive_tick(&mut self, token: TimerToken) -> Vec<Action> {
        let mut out = Vec::new();

        if self.keepalive == Some(token) && self.state == ConnectionState::Open {
            if let Some(socket) = self.socket {
                out.push(Action::SendText {
                    socket,
                    text: KEEPALIVE_PING.into(),
                });
            }
        }

        out
    }

    // ── Internos ──

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn open_socket(&mut self, out: &mut Vec<Action>) {
        let socket = SocketId(self.next_id());
        let url = self.endpoint();

        self.socket = Some(socket);
        self.state = ConnectionState::Connecting;
        self.log
            .append(format!("Connecting to ECU bridge at {url}..."), LogKind::Info);
        self.set_status(
            ConnectionStatus::disconnected(format!("Connecting to {}...", self.config.host)),
            out,
        );

        out.push(Action::OpenSocket { socket, url });
    }

    fn on_open(&mut self, socket: SocketId, out: &mut Vec<Action>) {
        self.reconnect_attempts = 0;
        self.state = ConnectionState::Open;
        self.set_status(
            ConnectionStatus::connected(format!("Connected to ECU bridge at {}", self.config.host)),
            out,
        );
        self.log
            .append("Connected to ECU bridge WebSocket", LogKind::Success);

        out.push(Action::SendText {
            socket,
            text: KEEPALIVE_PING.into(),
        });

        let token = TimerToken(self.next_id());
        self.keepalive = Some(token);
        out.push(Action::StartKeepalive {
            token,
            period: KEEPALIVE_PERIOD,
        });
    }

    fn on_text(&mut self, text: &str) {
        match protocol::decode_frame(text) {
            Ok(InboundFrame::KeepaliveAck) => {}
            Ok(InboundFrame::Telemetry(snapshot)) => {
                for alert in evaluate_alerts(&snapshot, &self.thresholds) {
                    debug!(metric = alert.metric, rpm = snapshot.engine_rpm, "Alerta disparado");
                    self.log.append(alert.message, alert.kind);
                }
                self.telemetry = Some(snapshot);
            }
            Err(e) => {
                self.log.append(
                    format!("Error parsing data from ECU bridge: {e}"),
                    LogKind::Error,
                );
            }
        }
    }

    fn on_closed(&mut self, reason: &str, out: &mut Vec<Action>) {
        self.socket = None;
        self.set_status(
            ConnectionStatus::disconnected("Disconnected from ECU bridge"),
            out,
        );

        if !self.should_stay_connected {
            self.state = ConnectionState::Idle;
            self.log.append("Disconnected from ECU bridge", LogKind::Info);
            return;
        }

        if self.reconnect_attempts < self.config.max_reconnect_attempts {
            let reason = if reason.is_empty() {
                DEFAULT_CLOSE_REASON
            } else {
                reason
            };
            self.log.append(
                format!("Connection lost: {reason}. Reconnecting..."),
                LogKind::Warning,
            );

            let token = TimerToken(self.next_id());
            self.pending_reconnect = Some(token);
            self.state = ConnectionState::Reconnecting;
            out.push(Action::ScheduleReconnect {
                token,
                delay: Duration::from_millis(self.config.reconnect_interval_ms),
            });
        } else {
            self.state = ConnectionState::Failed;
            self.log
                .append("Max reconnection attempts reached", LogKind::Error);
            self.set_status(
                ConnectionStatus::disconnected("Failed to reconnect to ECU bridge"),
                out,
            );
        }
    }

    fn cancel_reconnect(&mut self, out: &mut Vec<Action>) {
        if let Some(token) = self.pending_reconnect.take() {
            out.push(Action::CancelReconnect { token });
        }
    }

    /// Atualiza o status; o keepalive morre assim que o status deixa de ser "conectado".
    fn set_status(&mut self, status: ConnectionStatus, out: &mut Vec<Action>) {
        if !status.connected {
            if let Some(token) = self.keepalive.take() {
                out.push(Action::StopKeepalive { token });
            }
        }
        self.status = status;
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(max_attempts: u32) -> ConnectionManager {
        let config = ConnectionConfig {
            host: "10.0.0.7".into(),
            port: 81,
            reconnect_interval_ms: 250,
            max_reconnect_attempts: max_attempts,
        };
        ConnectionManager::new(config, AlertThresholds::default())
    }

    fn opened_socket(actions: &[Action]) -> SocketId {
        actions
            .iter()
            .find_map(|a| match a {
                Action::OpenSocket { socket, .. } => Some(*socket),
                _ => None,
            })
            .expect("nenhum OpenSocket nas ações")
    }

    fn scheduled(actions: &[Action]) -> Vec<(TimerToken, Duration)> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::ScheduleReconnect { token, delay } => Some((*token, *delay)),
                _ => None,
            })
            .collect()
    }

    fn closed(reason: &str) -> SocketEvent {
        SocketEvent::Closed {
            reason: reason.into(),
        }
    }

    /// connect + open, retorna o socket aberto.
    fn open(m: &mut ConnectionManager) -> SocketId {
        let socket = opened_socket(&m.connect());
        m.handle_socket_event(socket, SocketEvent::Opened);
        socket
    }

    #[test]
    fn connect_opens_socket_on_ws_path() {
        let mut m = manager(3);
        let actions = m.connect();
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(!m.status().connected);
        assert_eq!(m.status().message, "Connecting to 10.0.0.7...");
        assert!(matches!(
            &actions[..],
            [Action::OpenSocket { url, .. }] if url == "ws://10.0.0.7:81/ws"
        ));
    }

    #[test]
    fn open_pings_and_starts_keepalive() {
        let mut m = manager(3);
        let socket = opened_socket(&m.connect());
        let actions = m.handle_socket_event(socket, SocketEvent::Opened);

        assert_eq!(m.state(), ConnectionState::Open);
        assert!(m.status().connected);
        assert_eq!(m.log().latest().unwrap().kind, LogKind::Success);
        assert_eq!(
            actions[0],
            Action::SendText {
                socket,
                text: "ping".into()
            }
        );
        let token = match actions[1] {
            Action::StartKeepalive { token, period } => {
                assert_eq!(period, KEEPALIVE_PERIOD);
                token
            }
            ref other => panic!("esperava StartKeepalive, veio {other:?}"),
        };

        assert_eq!(
            m.on_keepalive_tick(token),
            vec![Action::SendText {
                socket,
                text: "ping".into()
            }]
        );
    }

    #[test]
    fn connect_is_idempotent_while_open() {
        let mut m = manager(3);
        open(&mut m);
        let log_len = m.log().len();

        assert!(m.connect().is_empty());
        assert_eq!(m.state(), ConnectionState::Open);
        assert_eq!(m.reconnect_attempts(), 0);
        assert_eq!(m.log().len(), log_len + 1);
        assert_eq!(m.log().latest().unwrap().message, "Already connected to ECU bridge");
    }

    #[test]
    fn connect_is_idempotent_while_connecting() {
        let mut m = manager(3);
        m.connect();
        assert!(m.connect().is_empty());
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn close_schedules_exactly_one_reconnect() {
        let mut m = manager(3);
        let socket = open(&mut m);

        let actions = m.handle_socket_event(socket, closed("server reboot"));
        let timers = scheduled(&actions);
        assert_eq!(timers.len(), 1);
        assert_eq!(timers[0].1, Duration::from_millis(250));
        assert_eq!(m.state(), ConnectionState::Reconnecting);
        assert!(!m.status().connected);
        assert!(actions.iter().any(|a| matches!(a, Action::StopKeepalive { .. })));
        assert_eq!(
            m.log().latest().unwrap().message,
            "Connection lost: server reboot. Reconnecting..."
        );
        // Contador só anda quando o timer dispara
        assert_eq!(m.reconnect_attempts(), 0);

        let actions = m.on_reconnect_timer(timers[0].0);
        assert_eq!(m.reconnect_attempts(), 1);
        assert_eq!(m.state(), ConnectionState::Connecting);
        opened_socket(&actions);
    }

    #[test]
    fn empty_close_reason_uses_default() {
        let mut m = manager(3);
        let socket = open(&mut m);
        m.handle_socket_event(socket, closed(""));
        assert_eq!(
            m.log().latest().unwrap().message,
            "Connection lost: Connection lost. Reconnecting..."
        );
    }

    #[test]
    fn successful_open_resets_attempts() {
        let mut m = manager(5);
        let mut socket = open(&mut m);

        for expected in 1..=3 {
            let timers = scheduled(&m.handle_socket_event(socket, closed("")));
            socket = opened_socket(&m.on_reconnect_timer(timers[0].0));
            assert_eq!(m.reconnect_attempts(), expected);
        }

        m.handle_socket_event(socket, SocketEvent::Opened);
        assert_eq!(m.reconnect_attempts(), 0);
        assert!(m.status().connected);
    }

    #[test]
    fn exhausted_reconnects_end_in_failed() {
        let mut m = manager(2);
        let mut socket = opened_socket(&m.connect());

        // Conexão inicial + 2 reconexões falham
        for _ in 0..2 {
            let timers = scheduled(&m.handle_socket_event(socket, closed("")));
            assert_eq!(timers.len(), 1);
            socket = opened_socket(&m.on_reconnect_timer(timers[0].0));
        }

        let actions = m.handle_socket_event(socket, closed(""));
        assert!(scheduled(&actions).is_empty());
        assert_eq!(m.state(), ConnectionState::Failed);
        assert_eq!(m.status().message, "Failed to reconnect to ECU bridge");
        assert_eq!(m.log().latest().unwrap().kind, LogKind::Error);

        // Failed só sai com connect() explícito
        let actions = m.connect();
        opened_socket(&actions);
        assert_eq!(m.reconnect_attempts(), 0);
    }

    #[test]
    fn zero_max_attempts_fails_immediately() {
        let mut m = manager(0);
        let socket = open(&mut m);
        assert!(scheduled(&m.handle_socket_event(socket, closed(""))).is_empty());
        assert_eq!(m.state(), ConnectionState::Failed);
    }

    #[test]
    fn disconnect_cancels_pending_reconnect() {
        let mut m = manager(3);
        let socket = open(&mut m);
        let timers = scheduled(&m.handle_socket_event(socket, closed("")));

        let actions = m.disconnect();
        assert!(actions.contains(&Action::CancelReconnect { token: timers[0].0 }));
        assert_eq!(m.state(), ConnectionState::Idle);
        assert_eq!(m.status(), &ConnectionStatus::disconnected("Disconnected"));

        // Um disparo atrasado não pode reabrir nada
        assert!(m.on_reconnect_timer(timers[0].0).is_empty());
        assert_eq!(m.state(), ConnectionState::Idle);
    }

    #[test]
    fn disconnect_closes_socket_normally() {
        let mut m = manager(3);
        let socket = open(&mut m);

        let actions = m.disconnect();
        assert!(actions.contains(&Action::CloseSocket {
            socket,
            code: 1000,
            reason: "Manual disconnect".into()
        }));
        assert!(actions.iter().any(|a| matches!(a, Action::StopKeepalive { .. })));
        assert_eq!(m.state(), ConnectionState::Closing);
        assert!(!m.status().connected);

        // O close do socket manual leva a Idle sem agendar reconexão
        let actions = m.handle_socket_event(socket, closed("Manual disconnect"));
        assert!(actions.is_empty());
        assert_eq!(m.state(), ConnectionState::Idle);
        assert_eq!(m.log().latest().unwrap().message, "Disconnected from ECU bridge");
    }

    #[test]
    fn disconnect_when_idle_is_safe() {
        let mut m = manager(3);
        assert!(m.disconnect().is_empty());
        assert_eq!(m.state(), ConnectionState::Idle);
        assert!(!m.status().connected);
    }

    #[test]
    fn reconnect_after_manual_disconnect_ignores_old_socket() {
        let mut m = manager(3);
        let old = open(&mut m);
        m.disconnect();
        let new = opened_socket(&m.connect());
        assert_ne!(old, new);

        // Close atrasado do socket antigo não derruba a conexão nova
        m.handle_socket_event(old, closed("Manual disconnect"));
        assert_eq!(m.state(), ConnectionState::Connecting);
        m.handle_socket_event(new, SocketEvent::Opened);
        assert_eq!(m.state(), ConnectionState::Open);
    }

    #[test]
    fn error_event_does_not_schedule_reconnect() {
        let mut m = manager(3);
        let socket = open(&mut m);

        let actions = m.handle_socket_event(socket, SocketEvent::Error("reset".into()));
        assert!(scheduled(&actions).is_empty());
        assert!(actions.iter().any(|a| matches!(a, Action::StopKeepalive { .. })));
        assert_eq!(m.status().message, "Connection error");
        assert_eq!(m.log().latest().unwrap().kind, LogKind::Error);

        // O close seguinte é que agenda
        assert_eq!(scheduled(&m.handle_socket_event(socket, closed(""))).len(), 1);
    }

    #[test]
    fn pong_changes_nothing() {
        let mut m = manager(3);
        let socket = open(&mut m);
        m.handle_socket_event(socket, SocketEvent::Text(r#"{"engineRpm":2000}"#.into()));
        let telemetry = m.telemetry().cloned();
        let log_len = m.log().len();

        assert!(m.handle_socket_event(socket, SocketEvent::Text("pong".into())).is_empty());
        assert_eq!(m.telemetry().cloned(), telemetry);
        assert_eq!(m.log().len(), log_len);
    }

    #[test]
    fn limp_mode_and_high_rpm_are_logged_in_order() {
        let mut m = manager(3);
        let socket = open(&mut m);
        let log_len = m.log().len();

        m.handle_socket_event(
            socket,
            SocketEvent::Text(r#"{"engineRpm":7000,"tcuLimpMode":true}"#.into()),
        );

        assert_eq!(m.telemetry().unwrap().engine_rpm, 7000.0);
        let entries = m.log_entries();
        assert_eq!(entries.len(), log_len + 2);
        // Mais novo primeiro: RPM no topo, limp mode logo abaixo
        assert_eq!(entries[1].message, "TCU LIMP MODE ACTIVE!");
        assert_eq!(entries[1].kind, LogKind::Error);
        assert_eq!(entries[0].message, "High RPM: 7000");
        assert_eq!(entries[0].kind, LogKind::Warning);
    }

    #[test]
    fn protection_logs_single_warning() {
        let mut m = manager(3);
        let socket = open(&mut m);
        let log_len = m.log().len();

        m.handle_socket_event(
            socket,
            SocketEvent::Text(r#"{"tcuProtectionActive":true,"engineRpm":1000}"#.into()),
        );

        assert_eq!(m.log().len(), log_len + 1);
        assert_eq!(m.log().latest().unwrap().message, "TCU Protection Active");
    }

    #[test]
    fn new_frame_replaces_snapshot_entirely() {
        let mut m = manager(3);
        let socket = open(&mut m);
        m.handle_socket_event(
            socket,
            SocketEvent::Text(r#"{"engineRpm":3000,"mapPressure":1.5}"#.into()),
        );
        m.handle_socket_event(socket, SocketEvent::Text(r#"{"engineRpm":3100}"#.into()));

        let t = m.telemetry().unwrap();
        assert_eq!(t.engine_rpm, 3100.0);
        assert_eq!(t.map_pressure, 0.0);
    }

    #[test]
    fn unrecognized_record_logs_error_and_keeps_telemetry() {
        let mut m = manager(3);
        let socket = open(&mut m);

        m.handle_socket_event(
            socket,
            SocketEvent::Text(r#"{"engineRpm":2500,"mapPressure":1.1}"#.into()),
        );
        let before = m.telemetry().cloned().unwrap();

        let actions = m.handle_socket_event(socket, SocketEvent::Text("{}".into()));
        assert!(actions.is_empty());
        assert_eq!(m.telemetry(), Some(&before));
        assert_eq!(m.log().latest().unwrap().kind, LogKind::Error);
        assert_eq!(m.state(), ConnectionState::Open);
    }

    #[test]
    fn binary_frame_is_a_decode_error() {
        let mut m = manager(3);
        let socket = open(&mut m);
        m.handle_socket_event(socket, SocketEvent::Binary(12));
        assert_eq!(m.log().latest().unwrap().kind, LogKind::Error);
        assert_eq!(m.state(), ConnectionState::Open);
    }

    #[test]
    fn send_command_requires_open_socket() {
        let mut m = manager(3);
        assert!(m.send_command("x").is_empty());
        assert_eq!(m.log().latest().unwrap().kind, LogKind::Warning);

        let socket = open(&mut m);
        assert_eq!(
            m.send_command("boost 1.2"),
            vec![Action::SendText {
                socket,
                text: "boost 1.2".into()
            }]
        );
        assert_eq!(m.log().latest().unwrap().message, "Sent command: boost 1.2");
    }

    #[test]
    fn update_config_applies_to_next_connect_only() {
        let mut m = manager(3);
        open(&mut m);

        m.update_config(&ConnectionConfigUpdate {
            host: Some("10.0.0.99".into()),
            ..Default::default()
        });
        assert_eq!(m.config().host, "10.0.0.99");
        assert_eq!(m.state(), ConnectionState::Open);
        assert!(m.status().message.contains("10.0.0.7"));

        m.disconnect();
        let actions = m.connect();
        assert!(matches!(
            &actions[..],
            [Action::OpenSocket { url, .. }] if url == "ws://10.0.0.99:81/ws"
        ));
    }

    #[test]
    fn invalid_config_update_is_rejected() {
        let mut m = manager(3);
        m.update_config(&ConnectionConfigUpdate {
            reconnect_interval_ms: Some(0),
            ..Default::default()
        });
        assert_eq!(m.config().reconnect_interval_ms, 250);
        assert_eq!(m.log().latest().unwrap().kind, LogKind::Warning);
    }

    #[test]
    fn clear_log_leaves_notice() {
        let mut m = manager(3);
        open(&mut m);
        m.clear_log();
        let entries = m.log_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "Log cleared");
    }

    #[test]
    fn connect_while_reconnecting_cancels_timer() {
        let mut m = manager(3);
        let socket = open(&mut m);
        let timers = scheduled(&m.handle_socket_event(socket, closed("")));

        let actions = m.connect();
        assert!(actions.contains(&Action::CancelReconnect { token: timers[0].0 }));
        opened_socket(&actions);
        assert!(m.on_reconnect_timer(timers[0].0).is_empty());
    }

    #[test]
    fn shutdown_releases_everything() {
        let mut m = manager(3);
        let socket = open(&mut m);
        let actions = m.shutdown();
        assert!(actions.iter().any(|a| matches!(a, Action::CloseSocket { socket: s, .. } if *s == socket)));
        assert!(actions.iter().any(|a| matches!(a, Action::StopKeepalive { .. })));
        assert!(!m.status().connected);
    }
}

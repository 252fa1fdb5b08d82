//! Thread de rede que mantém o WebSocket com a ponte ESP32.
//!
//! Um runtime tokio single-thread roda o [`ConnectionManager`]: comandos do
//! console, eventos dos sockets e os dois timers (reconexão e keepalive)
//! entram um de cada vez via `select!`, e as [`Action`]s devolvidas viram
//! I/O real. A UI só enxerga o [`LinkView`] publicado num canal `watch`.

use ecu_core::{
    Action, AlertThresholds, ConnectionConfig, ConnectionConfigUpdate, ConnectionManager,
    ConnectionState, ConnectionStatus, LogEntry, SocketEvent, SocketId, TelemetrySnapshot,
    TimerToken,
};
use futures_util::{SinkExt, StreamExt};
use std::future::pending;
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tracing::{debug, error, info, warn};

/// Tempo máximo para o frame de close sair no encerramento.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Erros ao subir a thread de rede.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Falha ao criar runtime tokio: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Falha ao criar thread de rede: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Comando do consumidor para a thread de rede.
#[derive(Debug, Clone)]
pub enum LinkCommand {
    Connect,
    Disconnect,
    Send(String),
    ClearLog,
    UpdateConfig(ConnectionConfigUpdate),
    Shutdown,
}

/// Projeção somente leitura publicada a cada evento processado.
#[derive(Debug, Clone)]
pub struct LinkView {
    pub state: ConnectionState,
    pub status: ConnectionStatus,
    pub telemetry: Option<TelemetrySnapshot>,
    pub log: Vec<LogEntry>,
    pub endpoint: String,
    pub reconnect_attempts: u32,
}

impl LinkView {
    fn of(manager: &ConnectionManager) -> Self {
        Self {
            state: manager.state(),
            status: manager.status().clone(),
            telemetry: manager.telemetry().cloned(),
            log: manager.log_entries(),
            endpoint: manager.endpoint(),
            reconnect_attempts: manager.reconnect_attempts(),
        }
    }
}

/// Handle do consumidor. Ao ser dropado, desconecta e espera a thread terminar.
pub struct LinkHandle {
    commands: mpsc::UnboundedSender<LinkCommand>,
    view: watch::Receiver<LinkView>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl LinkHandle {
    pub fn connect(&self) {
        self.send(LinkCommand::Connect);
    }

    pub fn disconnect(&self) {
        self.send(LinkCommand::Disconnect);
    }

    pub fn send_command(&self, text: impl Into<String>) {
        self.send(LinkCommand::Send(text.into()));
    }

    pub fn clear_log(&self) {
        self.send(LinkCommand::ClearLog);
    }

    pub fn update_config(&self, update: ConnectionConfigUpdate) {
        self.send(LinkCommand::UpdateConfig(update));
    }

    /// Cópia do estado mais recente.
    pub fn view(&self) -> LinkView {
        self.view.borrow().clone()
    }

    /// Retorna o estado só se mudou desde a última chamada.
    pub fn poll_view(&mut self) -> Option<LinkView> {
        match self.view.has_changed() {
            Ok(true) => Some(self.view.borrow_and_update().clone()),
            _ => None,
        }
    }

    fn send(&self, command: LinkCommand) {
        if self.commands.send(command).is_err() {
            warn!("Thread de rede encerrada, comando descartado");
        }
    }
}

impl Drop for LinkHandle {
    fn drop(&mut self) {
        let _ = self.commands.send(LinkCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Thread de rede terminou em pânico");
            }
        }
    }
}

/// Inicia a thread de rede ("ecu-link") e retorna o handle do consumidor.
pub fn spawn_link_thread(
    config: ConnectionConfig,
    thresholds: AlertThresholds,
) -> Result<LinkHandle, LinkError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(LinkError::Runtime)?;

    let manager = ConnectionManager::new(config, thresholds);
    let (view_tx, view_rx) = watch::channel(LinkView::of(&manager));
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

    let thread = std::thread::Builder::new()
        .name("ecu-link".into())
        .spawn(move || {
            let (events_tx, events_rx) = mpsc::unbounded_channel();
            let driver = LinkDriver::new(manager, view_tx, events_tx);
            runtime.block_on(driver.run(cmd_rx, events_rx));
        })
        .map_err(LinkError::Spawn)?;

    Ok(LinkHandle {
        commands: cmd_tx,
        view: view_rx,
        thread: Some(thread),
    })
}

// ──────────────────────────────────────────────
// Driver
// ──────────────────────────────────────────────

type SocketEventTx = mpsc::UnboundedSender<(SocketId, SocketEvent)>;

/// Frame de saída para a task do socket.
enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Task dona de um WebSocket; abortada ao ser dropada.
struct SocketTask {
    id: SocketId,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: Option<JoinHandle<()>>,
}

impl SocketTask {
    fn spawn(id: SocketId, url: String, events: SocketEventTx) -> Self {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(id, url, outbound_rx, events));
        Self {
            id,
            outbound,
            task: Some(task),
        }
    }

    fn push(&self, frame: Outbound) {
        if self.outbound.send(frame).is_err() {
            debug!("Socket {:?} já encerrado, frame descartado", self.id);
        }
    }

    /// Espera a task terminar (com limite) em vez de abortá-la.
    async fn finish(mut self, grace: Duration) {
        if let Some(task) = self.task.take() {
            if tokio::time::timeout(grace, task).await.is_err() {
                debug!("Socket {:?} não fechou em {grace:?}", self.id);
            }
        }
    }
}

impl Drop for SocketTask {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

struct LinkDriver {
    manager: ConnectionManager,
    view: watch::Sender<LinkView>,
    events_tx: SocketEventTx,
    socket: Option<SocketTask>,
    closing: Option<SocketTask>,
    reconnect: Option<(TimerToken, Pin<Box<Sleep>>)>,
    keepalive: Option<(TimerToken, Interval)>,
}

impl LinkDriver {
    fn new(
        manager: ConnectionManager,
        view: watch::Sender<LinkView>,
        events_tx: SocketEventTx,
    ) -> Self {
        Self {
            manager,
            view,
            events_tx,
            socket: None,
            closing: None,
            reconnect: None,
            keepalive: None,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<LinkCommand>,
        mut events: mpsc::UnboundedReceiver<(SocketId, SocketEvent)>,
    ) {
        info!("Thread de rede iniciada ({})", self.manager.endpoint());

        loop {
            let actions = tokio::select! {
                command = commands.recv() => match command {
                    Some(LinkCommand::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some((socket, event)) = events.recv() => self.on_socket_event(socket, event),
                token = reconnect_fired(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.manager.on_reconnect_timer(token)
                }
                token = keepalive_ticked(&mut self.keepalive) => {
                    self.manager.on_keepalive_tick(token)
                }
            };

            self.execute(actions);
            self.publish();
        }

        // Encerramento: mesmo caminho do disconnect manual
        let actions = self.manager.shutdown();
        self.execute(actions);
        self.publish();

        if let Some(socket) = self.closing.take() {
            socket.finish(CLOSE_GRACE).await;
        }
        info!("Thread de rede encerrada");
    }

    fn handle_command(&mut self, command: LinkCommand) -> Vec<Action> {
        debug!("Comando: {command:?}");
        match command {
            LinkCommand::Connect => self.manager.connect(),
            LinkCommand::Disconnect => self.manager.disconnect(),
            LinkCommand::Send(text) => self.manager.send_command(&text),
            LinkCommand::ClearLog => {
                self.manager.clear_log();
                Vec::new()
            }
            LinkCommand::UpdateConfig(update) => {
                self.manager.update_config(&update);
                Vec::new()
            }
            LinkCommand::Shutdown => Vec::new(),
        }
    }

    fn on_socket_event(&mut self, socket: SocketId, event: SocketEvent) -> Vec<Action> {
        // A task já terminou; solta o handle
        if matches!(event, SocketEvent::Closed { .. }) {
            self.closing.take_if(|t| t.id == socket);
            self.socket.take_if(|t| t.id == socket);
        }
        self.manager.handle_socket_event(socket, event)
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::OpenSocket { socket, url } => {
                    info!("Abrindo WebSocket {url}");
                    self.socket = Some(SocketTask::spawn(socket, url, self.events_tx.clone()));
                }
                Action::SendText { socket, text } => match &self.socket {
                    Some(task) if task.id == socket => task.push(Outbound::Text(text)),
                    _ => debug!("Envio para socket inexistente {socket:?} ignorado"),
                },
                Action::CloseSocket {
                    socket,
                    code,
                    reason,
                } => {
                    if let Some(task) = self.socket.take_if(|t| t.id == socket) {
                        task.push(Outbound::Close { code, reason });
                        self.closing = Some(task);
                    }
                }
                Action::ScheduleReconnect { token, delay } => {
                    debug!("Reconexão agendada em {delay:?}");
                    self.reconnect = Some((token, Box::pin(tokio::time::sleep(delay))));
                }
                Action::CancelReconnect { token } => {
                    self.reconnect.take_if(|(t, _)| *t == token);
                }
                Action::StartKeepalive { token, period } => {
                    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.keepalive = Some((token, interval));
                }
                Action::StopKeepalive { token } => {
                    self.keepalive.take_if(|(t, _)| *t == token);
                }
            }
        }
    }

    fn publish(&self) {
        self.view.send_replace(LinkView::of(&self.manager));
    }
}

async fn reconnect_fired(timer: &mut Option<(TimerToken, Pin<Box<Sleep>>)>) -> TimerToken {
    match timer {
        Some((token, sleep)) => {
            sleep.as_mut().await;
            *token
        }
        None => pending().await,
    }
}

async fn keepalive_ticked(keepalive: &mut Option<(TimerToken, Interval)>) -> TimerToken {
    match keepalive {
        Some((token, interval)) => {
            interval.tick().await;
            *token
        }
        None => pending().await,
    }
}

/// Ciclo de vida de um socket: conecta, repassa frames e reporta o close.
async fn run_socket(
    id: SocketId,
    url: String,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: SocketEventTx,
) {
    let emit = |event: SocketEvent| {
        let _ = events.send((id, event));
    };

    let ws = match connect_async(url.as_str()).await {
        Ok((ws, response)) => {
            debug!("Handshake com {url} concluído (HTTP {})", response.status());
            ws
        }
        Err(e) => {
            warn!("Falha ao conectar em {url}: {e}");
            emit(SocketEvent::Error(e.to_string()));
            emit(SocketEvent::Closed {
                reason: String::new(),
            });
            return;
        }
    };

    emit(SocketEvent::Opened);
    let (mut sink, mut stream) = ws.split();

    let reason = loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(Outbound::Text(text)) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        emit(SocketEvent::Error(e.to_string()));
                        break String::new();
                    }
                }
                Some(Outbound::Close { code, reason }) => {
                    let frame = CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.clone().into(),
                    };
                    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                        debug!("Close frame não enviado: {e}");
                    }
                    break reason;
                }
                None => break String::new(),
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => emit(SocketEvent::Text(text)),
                Some(Ok(Message::Binary(bytes))) => emit(SocketEvent::Binary(bytes.len())),
                Some(Ok(Message::Close(frame))) => {
                    break frame.map(|f| f.reason.into_owned()).unwrap_or_default();
                }
                // Ping/Pong de controle são respondidos pelo tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    emit(SocketEvent::Error(e.to_string()));
                    break String::new();
                }
                None => break String::new(),
            },
        }
    };

    emit(SocketEvent::Closed { reason });
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

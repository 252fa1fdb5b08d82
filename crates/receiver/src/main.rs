//! # ECU Receiver
//!
//! Console de monitoramento da ponte ESP32: mantém o WebSocket com
//! reconexão automática, mostra a última leitura da ECU e o log de eventos.
//!
//! ## Comandos
//! - `connect` / `disconnect`
//! - `send <texto>`: comando livre para o ESP32
//! - `set host=… port=… interval=… max_attempts=…`
//! - `clear`, `status`, `quit`

mod console;
mod link_thread;

use console::{ConsoleCommand, format_entry, format_telemetry, parse_line};
use crossbeam_channel::{Receiver, select, tick, unbounded};
use ecu_core::config::AppConfig;
use ecu_core::LogEntry;
use link_thread::{LinkHandle, LinkView, spawn_link_thread};
use std::io::BufRead;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

const RENDER_INTERVAL: Duration = Duration::from_millis(500);

enum ConsoleEvent {
    /// `None` quando o stdin fecha
    Line(Option<String>),
    Tick,
}

fn main() -> ExitCode {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }
    for problem in config.validate() {
        warn!("Config: {problem}");
    }

    // ── Thread de rede ──
    let mut link = match spawn_link_thread(config.connection.clone(), config.alerts.clone()) {
        Ok(link) => link,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   ⚡ ECU RECEIVER – ESP32 WebSocket");
    println!("══════════════════════════════════════════════");
    println!("  Endpoint:   {}", link.view().endpoint);
    println!(
        "  Reconexão:  {} ms × {}",
        config.connection.reconnect_interval_ms, config.connection.max_reconnect_attempts
    );
    println!("  Alerta RPM: > {:.0}", config.alerts.high_rpm);
    println!("══════════════════════════════════════════════");
    println!("{}", console::HELP);
    println!();

    link.connect();

    let input = spawn_stdin_thread();
    let ticker = tick(RENDER_INTERVAL);
    let mut last_seen: Option<LogEntry> = None;
    let mut last_telemetry = None;

    // ── Loop principal ──
    loop {
        let event = select! {
            recv(input) -> line => ConsoleEvent::Line(line.ok()),
            recv(ticker) -> _ => ConsoleEvent::Tick,
        };

        match event {
            ConsoleEvent::Line(None) => {
                info!("stdin encerrado");
                break;
            }
            ConsoleEvent::Line(Some(line)) => match parse_line(&line) {
                None => {}
                Some(Ok(ConsoleCommand::Quit)) => break,
                Some(Ok(command)) => run_command(&link, command),
                Some(Err(e)) => println!("  {e}"),
            },
            ConsoleEvent::Tick => {
                if let Some(view) = link.poll_view() {
                    render(&view, &mut last_seen, &mut last_telemetry);
                }
            }
        }
    }

    // Drop do handle desconecta e espera a thread de rede
    drop(link);
    ExitCode::SUCCESS
}

fn run_command(link: &LinkHandle, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Connect => link.connect(),
        ConsoleCommand::Disconnect => link.disconnect(),
        ConsoleCommand::Send(text) => link.send_command(text),
        ConsoleCommand::Clear => link.clear_log(),
        ConsoleCommand::Set(update) => link.update_config(update),
        ConsoleCommand::Status => print_status(&link.view()),
        ConsoleCommand::Help => println!("{}", console::HELP),
        ConsoleCommand::Quit => {}
    }
}

/// Imprime entradas novas do log e a leitura atual, se mudou.
fn render(
    view: &LinkView,
    last_seen: &mut Option<LogEntry>,
    last_telemetry: &mut Option<ecu_core::TelemetrySnapshot>,
) {
    for entry in console::unseen_entries(&view.log, last_seen.as_ref()) {
        println!("{}", format_entry(entry));
    }
    *last_seen = view.log.first().cloned();

    if view.telemetry != *last_telemetry {
        if let Some(t) = &view.telemetry {
            println!("  {}", format_telemetry(t));
        }
        *last_telemetry = view.telemetry.clone();
    }
}

fn print_status(view: &LinkView) {
    let dot = if view.status.connected { "●" } else { "○" };
    println!(
        "  {dot} {} [{:?}] {} | tentativas: {}",
        view.status.message, view.state, view.endpoint, view.reconnect_attempts
    );
    match &view.telemetry {
        Some(t) => println!("  {}", format_telemetry(t)),
        None => println!("  (sem telemetria)"),
    }
}

/// Lê o stdin numa thread própria e repassa as linhas.
fn spawn_stdin_thread() -> Receiver<String> {
    let (tx, rx) = unbounded();

    let spawned = std::thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Erro lendo stdin: {e}");
                        break;
                    }
                }
            }
        });

    if let Err(e) = spawned {
        // O canal fecha junto e o loop principal encerra
        error!("Falha ao criar thread de stdin: {e}");
    }

    rx
}
